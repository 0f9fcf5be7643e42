use std::{
	fmt::{self, Debug, Formatter},
	sync::Arc,
};

use crate::{
	snapshot::{Snapshot, SnapshotRegistry},
	Connection, ScopedConnection,
};

/// The listener type of signals with argument `A` and result `R`.
pub type Listener<A, R> = dyn 'static + Send + Sync + Fn(&A) -> R;

/// A thread-safe synchronous signal.
///
/// [`publish`](`Signal::publish`) calls every listener on the current thread, in connection order,
/// without holding any lock. Listeners may therefore connect and disconnect listeners (and publish)
/// reentrantly: changes take effect from the next [`publish`](`Signal::publish`) on.
///
/// [`Clone`]s are handles to the same registry. Use [`duplicate`](`Signal::duplicate`) for a separate one.
///
/// # Panics
///
/// A panicking listener unwinds out of [`publish`](`Signal::publish`), skipping the remaining listeners.
pub struct Signal<A: ?Sized, R = ()> {
	registry: Arc<SnapshotRegistry<Listener<A, R>>>,
}

impl<A: ?Sized, R> Clone for Signal<A, R> {
	fn clone(&self) -> Self {
		Self {
			registry: Arc::clone(&self.registry),
		}
	}
}

impl<A: ?Sized + 'static, R: 'static> Default for Signal<A, R> {
	fn default() -> Self {
		Self::new()
	}
}

impl<A: ?Sized, R> Debug for Signal<A, R> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Signal")
			.field("len", &self.registry.len())
			.finish_non_exhaustive()
	}
}

impl<A: ?Sized + 'static, R: 'static> Signal<A, R> {
	/// Creates a new [`Signal`] without listeners.
	#[must_use]
	pub fn new() -> Self {
		Self {
			registry: Arc::default(),
		}
	}

	/// Registers `listener`.
	///
	/// The returned [`Connection`] stays valid (as a no-op) after all handles to this signal are dropped.
	pub fn connect(&self, listener: impl 'static + Send + Sync + Fn(&A) -> R) -> Connection {
		self.registry.connect(Arc::new(listener))
	}

	/// Like [`connect`](`Signal::connect`), but the listener is disconnected when the
	/// [`ScopedConnection`] is dropped.
	pub fn connect_scoped(&self, listener: impl 'static + Send + Sync + Fn(&A) -> R) -> ScopedConnection {
		self.connect(listener).scoped()
	}

	/// Calls each currently connected listener with `args`.
	///
	/// **Returns** the listeners' results in connection order.
	pub fn publish(&self, args: &A) -> Vec<R> {
		let snapshot = self.registry.snapshot();
		tracing::trace!(listeners = snapshot.len(), "Publishing.");
		snapshot.iter().map(|listener| listener(args)).collect()
	}

	/// The number of connected listeners.
	#[must_use]
	pub fn len(&self) -> usize {
		self.registry.len()
	}

	/// Whether no listeners are connected.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Disconnects all listeners. Their [`Connection`]s become no-ops.
	pub fn disconnect_all(&self) {
		let removed = self.registry.clear();
		tracing::trace!(listeners = removed.len(), "Disconnected all listeners.");
	}

	/// The current listener list.
	///
	/// It won't change, even as listeners are connected or disconnected from this signal.
	#[must_use]
	pub fn snapshot(&self) -> Snapshot<Listener<A, R>> {
		self.registry.snapshot()
	}

	/// Creates a separate signal with the same listeners.
	///
	/// [`Connection`]s made on `self` still only refer to `self`.
	#[must_use]
	pub fn duplicate(&self) -> Self {
		let duplicate = Self::new();
		duplicate.registry.assign(&self.snapshot());
		duplicate
	}
}
