use std::{
	fmt::{self, Debug, Formatter},
	mem,
	sync::Arc,
};

use parking_lot::Mutex;

use super::TypeRegistry;
use crate::{Connection, Signal};

trait ErasedQueue: Send + Sync {
	/// **Returns** how many events were dispatched.
	fn dispatch(&self) -> usize;
	/// **Returns** how many events were discarded.
	fn clear(&self) -> usize;
}

struct TypedQueue<T> {
	signal: Signal<T>,
	queue: Mutex<Vec<T>>,
}

impl<T: 'static + Send + Sync> TypedQueue<T> {
	fn new() -> Self {
		Self {
			signal: Signal::new(),
			queue: Mutex::new(Vec::new()),
		}
	}
}

impl<T: 'static + Send + Sync> ErasedQueue for TypedQueue<T> {
	fn dispatch(&self) -> usize {
		// Swapped out, so listeners can enqueue more events (for the next dispatch) meanwhile.
		let events = mem::take(&mut *self.queue.lock());
		for event in &events {
			self.signal.publish(event);
		}
		events.len()
	}

	fn clear(&self) -> usize {
		let events = mem::take(&mut *self.queue.lock());
		events.len()
	}
}

/// A thread-safe event dispatcher with one [`Signal`] and one event queue per event type.
///
/// Per-type state is created on first use of a type. No lock is held while listeners run,
/// so they may connect listeners, send or enqueue events (also of new types) and dispatch.
///
/// [`Clone`]s are handles to the same dispatcher.
#[derive(Clone, Default)]
pub struct EventDispatcher {
	types: Arc<TypeRegistry<dyn ErasedQueue>>,
}

impl Debug for EventDispatcher {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("EventDispatcher")
			.field("types", &self.types.entries.read().len())
			.finish_non_exhaustive()
	}
}

impl EventDispatcher {
	/// Creates a new [`EventDispatcher`] without event types.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	fn typed<T: 'static + Send + Sync>(&self) -> Arc<TypedQueue<T>> {
		self.types
			.get_or_create::<T, _>(TypedQueue::<T>::new, |typed| typed as Arc<dyn ErasedQueue>)
	}

	fn existing<T: 'static + Send + Sync>(&self) -> Option<Arc<TypedQueue<T>>> {
		self.types.get::<T, TypedQueue<T>>()
	}

	/// Registers `listener` for events of type `T`.
	pub fn connect<T: 'static + Send + Sync>(&self, listener: impl 'static + Send + Sync + Fn(&T)) -> Connection {
		self.typed::<T>().signal.connect(listener)
	}

	/// Queues `event` for the next [`dispatch`](`EventDispatcher::dispatch`).
	pub fn enqueue<T: 'static + Send + Sync>(&self, event: T) {
		self.typed::<T>().queue.lock().push(event);
	}

	/// Queues `events`, in order, for the next [`dispatch`](`EventDispatcher::dispatch`).
	pub fn enqueue_all<T: 'static + Send + Sync>(&self, events: impl IntoIterator<Item = T>) {
		self.typed::<T>().queue.lock().extend(events);
	}

	/// Calls the listeners for `T` with `event` right away.
	pub fn send<T: 'static + Send + Sync>(&self, event: &T) {
		if let Some(typed) = self.existing::<T>() {
			typed.signal.publish(event);
		}
	}

	/// Calls the listeners for `T` with each of `events` right away, in order.
	pub fn send_all<T: 'static + Send + Sync>(&self, events: impl IntoIterator<Item = T>) {
		if let Some(typed) = self.existing::<T>() {
			for event in events {
				typed.signal.publish(&event);
			}
		}
	}

	/// Drains each event type's queue through its listeners.
	///
	/// Events enqueued while this runs are left for the next call.
	///
	/// **Returns** how many events were dispatched.
	pub fn dispatch(&self) -> usize {
		let dispatched: usize = self.types.snapshot().iter().map(|typed| typed.dispatch()).sum();
		tracing::trace!(dispatched, "Dispatched queued events.");
		dispatched
	}

	/// Discards the queued events of type `T`.
	///
	/// **Returns** how many were discarded.
	pub fn clear<T: 'static + Send + Sync>(&self) -> usize {
		self.existing::<T>().map_or(0, |typed| typed.clear())
	}

	/// Discards all queued events.
	///
	/// **Returns** how many were discarded.
	pub fn clear_all(&self) -> usize {
		self.types.snapshot().iter().map(|typed| typed.clear()).sum()
	}

	/// How many events of type `T` are queued.
	#[must_use]
	pub fn queue_size<T: 'static + Send + Sync>(&self) -> usize {
		self.existing::<T>().map_or(0, |typed| typed.queue.lock().len())
	}

	/// How many listeners are connected for events of type `T`.
	#[must_use]
	pub fn listener_count<T: 'static + Send + Sync>(&self) -> usize {
		self.existing::<T>().map_or(0, |typed| typed.signal.len())
	}
}
