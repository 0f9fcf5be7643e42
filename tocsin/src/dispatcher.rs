//! Typed event dispatchers: one lazily created signal and event queue per event type.

use std::{
	any::{type_name, Any, TypeId},
	collections::BTreeMap,
	sync::Arc,
};

use parking_lot::RwLock;

mod asynchronous;
mod synchronized;

pub use asynchronous::AsyncEventDispatcher;
pub use synchronized::EventDispatcher;

struct Entry<D: ?Sized> {
	erased: Arc<D>,
	typed: Arc<dyn Any + Send + Sync>,
}

/// Maps event types to their per-type dispatchers.
///
/// `D` is the type-erased view used when dispatching all types at once.
struct TypeRegistry<D: ?Sized> {
	entries: RwLock<BTreeMap<TypeId, Entry<D>>>,
}

impl<D: ?Sized> Default for TypeRegistry<D> {
	fn default() -> Self {
		Self {
			entries: RwLock::new(BTreeMap::new()),
		}
	}
}

impl<D: ?Sized + Send + Sync> TypeRegistry<D> {
	/// The per-type dispatcher for the event type `T` is keyed by, if it exists yet.
	fn get<T: 'static, X: 'static + Send + Sync>(&self) -> Option<Arc<X>> {
		let typed = Arc::clone(&self.entries.read().get(&TypeId::of::<T>())?.typed);
		Some(downcast(typed))
	}

	/// Looks up the per-type dispatcher for `T`, creating it on first use.
	///
	/// Concurrent first uses create at most one dispatcher: the write path checks again.
	fn get_or_create<T: 'static, X: 'static + Send + Sync>(
		&self,
		create: impl FnOnce() -> X,
		erase: impl FnOnce(Arc<X>) -> Arc<D>,
	) -> Arc<X> {
		if let Some(existing) = self.get::<T, X>() {
			return existing;
		}

		let typed = {
			let mut entries = self.entries.write();
			let entry = entries.entry(TypeId::of::<T>()).or_insert_with(|| {
				tracing::debug!(event = type_name::<T>(), "Registering event type.");
				let created = Arc::new(create());
				Entry {
					erased: erase(Arc::clone(&created)),
					typed: created,
				}
			});
			Arc::clone(&entry.typed)
		};
		downcast(typed)
	}

	/// The type-erased dispatchers, in [`TypeId`] order.
	///
	/// This is a copy, so that no lock is held while their listeners run.
	fn snapshot(&self) -> Vec<Arc<D>> {
		self.entries
			.read()
			.values()
			.map(|entry| Arc::clone(&entry.erased))
			.collect()
	}
}

fn downcast<X: 'static + Send + Sync>(typed: Arc<dyn Any + Send + Sync>) -> Arc<X> {
	match typed.downcast() {
		Ok(typed) => typed,
		Err(_) => unreachable!("per-type dispatcher registered under a foreign `TypeId`"),
	}
}
