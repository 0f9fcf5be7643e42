//! Copy-on-write listener lists.

use std::{
	fmt::{self, Debug, Formatter},
	iter, mem,
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
};

use parking_lot::RwLock;
use tap::Tap;

use crate::Connection;

type ListenerId = u64;

struct Entry<L: ?Sized> {
	id: ListenerId,
	listener: Arc<L>,
}

impl<L: ?Sized> Clone for Entry<L> {
	fn clone(&self) -> Self {
		Self {
			id: self.id,
			listener: Arc::clone(&self.listener),
		}
	}
}

/// An immutable listener list, in connection order.
///
/// Once taken, a [`Snapshot`] never changes. Connecting or disconnecting listeners
/// installs a new one in the registry instead.
pub struct Snapshot<L: ?Sized> {
	/// [`None`] iff empty.
	entries: Option<Arc<[Entry<L>]>>,
}

impl<L: ?Sized> Clone for Snapshot<L> {
	fn clone(&self) -> Self {
		Self {
			entries: self.entries.clone(),
		}
	}
}

impl<L: ?Sized> Default for Snapshot<L> {
	fn default() -> Self {
		Self { entries: None }
	}
}

impl<L: ?Sized> Debug for Snapshot<L> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Snapshot")
			.field("len", &self.len())
			.finish_non_exhaustive()
	}
}

impl<L: ?Sized> Snapshot<L> {
	fn from_entries(entries: impl IntoIterator<Item = Entry<L>>) -> Self {
		let entries: Arc<[Entry<L>]> = entries.into_iter().collect();
		Self {
			entries: (!entries.is_empty()).then_some(entries),
		}
	}

	/// The number of listeners.
	#[must_use]
	pub fn len(&self) -> usize {
		self.entries.as_deref().map_or(0, <[_]>::len)
	}

	/// Whether there are no listeners.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_none()
	}

	/// Iterates over the listeners in connection order.
	pub fn iter(&self) -> impl '_ + ExactSizeIterator<Item = &L> {
		self.entries().iter().map(|entry| &*entry.listener)
	}

	/// Whether `self` and `other` are the same snapshot (not just equal).
	#[must_use]
	pub fn ptr_eq(&self, other: &Self) -> bool {
		match (&self.entries, &other.entries) {
			(None, None) => true,
			(Some(a), Some(b)) => Arc::ptr_eq(a, b),
			_ => false,
		}
	}

	fn entries(&self) -> &[Entry<L>] {
		self.entries.as_deref().unwrap_or(&[])
	}

	pub(crate) fn listeners(&self) -> impl '_ + ExactSizeIterator<Item = &Arc<L>> {
		self.entries().iter().map(|entry| &entry.listener)
	}
}

/// The registry behind [`Signal`](`crate::Signal`) and [`ConcurrentSignal`](`crate::ConcurrentSignal`).
///
/// Mutations build a new [`Snapshot`] and swap it in under the write lock.
/// Listeners are never called, or dropped, while the lock is held.
pub(crate) struct SnapshotRegistry<L: ?Sized> {
	current: RwLock<Snapshot<L>>,
	next_id: AtomicU64,
}

impl<L: ?Sized> Default for SnapshotRegistry<L> {
	fn default() -> Self {
		Self {
			current: RwLock::new(Snapshot::default()),
			next_id: AtomicU64::new(0),
		}
	}
}

impl<L: ?Sized> SnapshotRegistry<L> {
	pub(crate) fn snapshot(&self) -> Snapshot<L> {
		self.current.read().clone()
	}

	pub(crate) fn len(&self) -> usize {
		self.current.read().len()
	}

	fn connect_id(&self, listener: Arc<L>) -> ListenerId {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let previous = {
			let mut current = self.current.write();
			let next = Snapshot::from_entries(
				current
					.entries()
					.iter()
					.cloned()
					.chain(iter::once(Entry { id, listener })),
			);
			mem::replace(&mut *current, next)
		};
		drop(previous);
		id
	}

	/// **Returns** whether the listener was still registered.
	pub(crate) fn disconnect(&self, id: ListenerId) -> bool {
		let previous = {
			let mut current = self.current.write();
			if !current.entries().iter().any(|entry| entry.id == id) {
				return false;
			}
			let next = Snapshot::from_entries(
				current.entries().iter().filter(|entry| entry.id != id).cloned(),
			);
			mem::replace(&mut *current, next)
		};
		drop(previous);
		true
	}

	/// **Returns** the removed listeners, so that the caller can drop them outside any lock.
	pub(crate) fn clear(&self) -> Snapshot<L> {
		mem::take(&mut *self.current.write())
	}

	/// Replaces the contents with those of `snapshot`. Existing ids are invalidated.
	pub(crate) fn assign(&self, snapshot: &Snapshot<L>) -> Snapshot<L> {
		let next = Snapshot::from_entries(snapshot.listeners().map(|listener| Entry {
			id: self.next_id.fetch_add(1, Ordering::Relaxed),
			listener: Arc::clone(listener),
		}));
		mem::replace(&mut *self.current.write(), next)
	}
}

impl<L: ?Sized + 'static + Send + Sync> SnapshotRegistry<L> {
	/// Connects `listener` and returns a [`Connection`] that only holds a weak reference to `self`.
	pub(crate) fn connect(self: &Arc<Self>, listener: Arc<L>) -> Connection {
		let id = self.connect_id(listener);
		let registry = Arc::downgrade(self);
		Connection::new(move || {
			if let Some(registry) = registry.upgrade() {
				if registry.disconnect(id) {
					tracing::trace!(id, "Listener disconnected.");
				}
			}
		})
		.tap(|_| tracing::trace!(id, "Listener connected."))
	}
}
