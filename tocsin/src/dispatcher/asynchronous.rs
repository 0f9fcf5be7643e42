use std::{
	fmt::{self, Debug, Formatter},
	marker::PhantomData,
	mem,
	sync::Arc,
};

use parking_lot::Mutex;
use tocsin_runtime::{
	completion::{completion_future, Completion, CompletionFuture},
	executor::{AnyExecutor, Executor},
	group::{Completer, Operation},
	publish::parallel_publish_void,
};

use super::TypeRegistry;
use crate::{AsyncSignal, CallbackPolicy, Concurrent, Connection};

trait ErasedAsyncQueue: Send + Sync {
	fn dispatch(&self) -> usize;
	fn async_dispatch(&self) -> usize;
	fn async_dispatch_into(self: Arc<Self>, completer: Completer<()>);
	fn clear(&self) -> usize;
}

struct AsyncTypedQueue<T, P, E>
where
	T: 'static + Send + Sync,
	P: CallbackPolicy,
	E: Executor,
{
	signal: P::Signal<T, (), E>,
	queue: Mutex<Vec<T>>,
}

impl<T, P, E> AsyncTypedQueue<T, P, E>
where
	T: 'static + Send + Sync,
	P: CallbackPolicy,
	E: Executor,
{
	fn new(executor: E) -> Self {
		Self {
			signal: <P::Signal<T, (), E> as AsyncSignal<T>>::with_executor(executor),
			queue: Mutex::new(Vec::new()),
		}
	}

	fn take(&self) -> Vec<T> {
		mem::take(&mut *self.queue.lock())
	}

	/// Publishes each event with a completion, then completes `completion` once all of them have.
	fn publish_all_with(self: &Arc<Self>, events: Vec<T>, completion: impl Completion<()>) {
		let operations = events
			.into_iter()
			.map(|event| {
				let typed = Arc::clone(self);
				Operation::new(move |completer: Completer<()>| typed.signal.async_publish_with(event, completer))
			})
			.collect();
		parallel_publish_void(self.signal.executor(), operations, completion);
	}
}

impl<T, P, E> ErasedAsyncQueue for AsyncTypedQueue<T, P, E>
where
	T: 'static + Send + Sync,
	P: CallbackPolicy,
	E: Executor,
{
	fn dispatch(&self) -> usize {
		let events = self.take();
		for event in &events {
			self.signal.publish(event);
		}
		events.len()
	}

	fn async_dispatch(&self) -> usize {
		let events = self.take();
		let count = events.len();
		for event in events {
			self.signal.async_publish(event);
		}
		count
	}

	fn async_dispatch_into(self: Arc<Self>, completer: Completer<()>) {
		let events = self.take();
		self.publish_all_with(events, completer);
	}

	fn clear(&self) -> usize {
		self.take().len()
	}
}

/// An event dispatcher with one [`AsyncSignal`] (selected by the [`CallbackPolicy`] `P`)
/// and one event queue per event type.
///
/// Like [`EventDispatcher`](`crate::EventDispatcher`), it never holds a lock while listeners run.
///
/// [`Clone`]s are handles to the same dispatcher.
pub struct AsyncEventDispatcher<P: CallbackPolicy = Concurrent, E: Executor = AnyExecutor> {
	types: Arc<TypeRegistry<dyn ErasedAsyncQueue>>,
	executor: E,
	_policy: PhantomData<fn() -> P>,
}

impl<P: CallbackPolicy, E: Executor> Clone for AsyncEventDispatcher<P, E> {
	fn clone(&self) -> Self {
		Self {
			types: Arc::clone(&self.types),
			executor: self.executor.clone(),
			_policy: PhantomData,
		}
	}
}

impl<P: CallbackPolicy, E: Executor + Debug> Debug for AsyncEventDispatcher<P, E> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("AsyncEventDispatcher")
			.field("executor", &self.executor)
			.field("types", &self.types.entries.read().len())
			.finish_non_exhaustive()
	}
}

impl<P: CallbackPolicy, E: Executor> AsyncEventDispatcher<P, E> {
	/// Creates a new dispatcher without event types. Its signals post to `executor`.
	#[must_use]
	pub fn new(executor: E) -> Self {
		Self {
			types: Arc::default(),
			executor,
			_policy: PhantomData,
		}
	}

	/// The executor listeners and completions are posted to.
	pub fn executor(&self) -> &E {
		&self.executor
	}

	fn typed<T: 'static + Send + Sync>(&self) -> Arc<AsyncTypedQueue<T, P, E>> {
		self.types.get_or_create::<T, _>(
			|| AsyncTypedQueue::<T, P, E>::new(self.executor.clone()),
			|typed| typed as Arc<dyn ErasedAsyncQueue>,
		)
	}

	fn existing<T: 'static + Send + Sync>(&self) -> Option<Arc<AsyncTypedQueue<T, P, E>>> {
		self.types.get::<T, AsyncTypedQueue<T, P, E>>()
	}

	/// Registers `listener` for events of type `T`.
	pub fn connect<T: 'static + Send + Sync>(&self, listener: impl 'static + Send + Sync + Fn(&T)) -> Connection {
		self.typed::<T>().signal.connect(listener)
	}

	/// Queues `event` for the next dispatch.
	pub fn enqueue<T: 'static + Send + Sync>(&self, event: T) {
		self.typed::<T>().queue.lock().push(event);
	}

	/// Queues `events`, in order, for the next dispatch.
	pub fn enqueue_all<T: 'static + Send + Sync>(&self, events: impl IntoIterator<Item = T>) {
		self.typed::<T>().queue.lock().extend(events);
	}

	/// Calls the eligible listeners for `T` with `event` on the current thread.
	pub fn send<T: 'static + Send + Sync>(&self, event: &T) {
		if let Some(typed) = self.existing::<T>() {
			typed.signal.publish(event);
		}
	}

	/// Calls the eligible listeners for `T` with each of `events` on the current thread, in order.
	pub fn send_all<T: 'static + Send + Sync>(&self, events: impl IntoIterator<Item = T>) {
		if let Some(typed) = self.existing::<T>() {
			for event in events {
				typed.signal.publish(&event);
			}
		}
	}

	/// Posts the eligible listeners for `T` with `event` to the executor.
	pub fn async_send<T: 'static + Send + Sync>(&self, event: T) {
		if let Some(typed) = self.existing::<T>() {
			typed.signal.async_publish(event);
		}
	}

	/// Like [`async_send`](`AsyncEventDispatcher::async_send`), and calls `completion` once all
	/// posted listeners have finished.
	pub fn async_send_with<T: 'static + Send + Sync>(&self, event: T, completion: impl Completion<()>) {
		self.typed::<T>().signal.async_publish_with(event, completion);
	}

	/// Posts the eligible listeners for each of `events`, and calls `completion` once all of
	/// them have finished.
	pub fn async_send_all_with<T: 'static + Send + Sync>(
		&self,
		events: impl IntoIterator<Item = T>,
		completion: impl Completion<()>,
	) {
		self.typed::<T>()
			.publish_all_with(events.into_iter().collect(), completion);
	}

	/// Drains each event type's queue through its eligible listeners, on the current thread.
	///
	/// **Returns** how many events were dispatched.
	pub fn dispatch(&self) -> usize {
		let dispatched: usize = self.types.snapshot().iter().map(|typed| typed.dispatch()).sum();
		tracing::trace!(dispatched, "Dispatched queued events.");
		dispatched
	}

	/// Drains each event type's queue, posting the eligible listeners to the executor.
	///
	/// **Returns** how many events were dispatched.
	pub fn async_dispatch(&self) -> usize {
		let dispatched: usize = self
			.types
			.snapshot()
			.iter()
			.map(|typed| typed.async_dispatch())
			.sum();
		tracing::trace!(dispatched, "Posted queued events.");
		dispatched
	}

	/// Like [`async_dispatch`](`AsyncEventDispatcher::async_dispatch`), and calls `completion`
	/// once the listeners for every drained event have finished.
	///
	/// Each event type's queue is drained when its turn comes up during this call.
	pub fn async_dispatch_with(&self, completion: impl Completion<()>) {
		let operations = self
			.types
			.snapshot()
			.into_iter()
			.map(|typed| Operation::new(move |completer: Completer<()>| typed.async_dispatch_into(completer)))
			.collect();
		parallel_publish_void(&self.executor, operations, completion);
	}

	/// [`async_dispatch_with`](`AsyncEventDispatcher::async_dispatch_with`), as a future.
	///
	/// # Panics
	///
	/// The future panics when polled if the executor drops the posted work that would complete it.
	pub fn async_dispatch_future(&self) -> CompletionFuture<()> {
		let (completion, future) = completion_future();
		self.async_dispatch_with(completion);
		future
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
