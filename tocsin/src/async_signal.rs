//! Signals that run their listeners on an [`Executor`].
//!
//! Two [`CallbackPolicy`]s decide what happens when a signal fires while a listener is still
//! busy with a previous firing:
//!
//! - [`DropIfBusy`] ([`DropSignal`]) skips that listener for the new firing,
//! - [`Concurrent`] ([`ConcurrentSignal`]) runs it again regardless.
//!
//! # Panics
//!
//! Listener panics are not caught here. On a [`ThreadPool`](`tocsin_runtime::executor::ThreadPool`)
//! they are caught and logged by the worker, on a [`LocalQueue`](`tocsin_runtime::executor::LocalQueue`)
//! they unwind out of the draining call. Either way the affected listener's result is absent
//! from collected results, and a [`DropSignal`] listener becomes idle again.

use std::sync::Arc;

use tocsin_runtime::{
	completion::{completion_future, Completion, CompletionFuture},
	executor::Executor,
	group::Operation,
	publish::{parallel_publish, parallel_publish_void},
};

use crate::{signal::Listener, Connection};

mod concurrent;
mod drop_if_busy;

pub use concurrent::ConcurrentSignal;
pub use drop_if_busy::DropSignal;

/// Common interface of [`DropSignal`] and [`ConcurrentSignal`].
///
/// Arguments are shared between listeners through an [`Arc`], so `A` only has to be [`Sync`], not [`Clone`].
pub trait AsyncSignal<A: 'static + Send + Sync, R: 'static + Send = ()>: Send + Sync {
	/// The executor listeners are posted to.
	type Executor: Executor;

	/// Creates a new signal without listeners.
	fn with_executor(executor: Self::Executor) -> Self
	where
		Self: Sized;

	/// The executor listeners are posted to.
	fn executor(&self) -> &Self::Executor;

	/// Registers `listener`.
	fn connect(&self, listener: impl 'static + Send + Sync + Fn(&A) -> R) -> Connection
	where
		Self: Sized;

	/// The number of connected listeners.
	fn len(&self) -> usize;

	/// Whether no listeners are connected.
	fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Disconnects all listeners.
	fn disconnect_all(&self);

	/// Calls the eligible listeners on the current thread, in connection order.
	///
	/// **Returns** their results.
	fn publish(&self, args: &A) -> Vec<R>;

	/// Posts each eligible listener to the executor and returns immediately.
	fn async_publish_shared(&self, args: Arc<A>);

	/// Posts each eligible listener to the executor and returns immediately.
	fn async_publish(&self, args: A) {
		self.async_publish_shared(Arc::new(args));
	}

	/// Like [`async_publish`](`AsyncSignal::async_publish`), and calls `completion` once every posted
	/// listener has finished.
	///
	/// Without eligible listeners, `completion` is posted to the executor.
	fn async_publish_with(&self, args: A, completion: impl Completion<()>)
	where
		Self: Sized;

	/// Like [`async_publish_with`](`AsyncSignal::async_publish_with`), but `completion` receives the
	/// listeners' results in connection order. Absent results (see [module docs](self)) are omitted.
	fn async_publish_collect(&self, args: A, completion: impl Completion<Vec<R>>)
	where
		Self: Sized;

	/// [`async_publish_collect`](`AsyncSignal::async_publish_collect`), as a future.
	///
	/// # Panics
	///
	/// The future panics when polled if the executor drops the posted work that would complete it.
	fn async_publish_future(&self, args: A) -> CompletionFuture<Vec<R>>
	where
		Self: Sized,
	{
		let (completion, future) = completion_future();
		self.async_publish_collect(args, completion);
		future
	}
}

/// Selects an [`AsyncSignal`] implementation, for example for
/// [`AsyncEventDispatcher`](`crate::AsyncEventDispatcher`).
pub trait CallbackPolicy: 'static + Send + Sync {
	/// The signal type implementing this policy.
	type Signal<A: 'static + Send + Sync, R: 'static + Send, E: Executor>: 'static + AsyncSignal<A, R, Executor = E>;
}

/// Skips listeners that are still running. See [`DropSignal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DropIfBusy {}

/// Always runs every listener. See [`ConcurrentSignal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Concurrent {}

impl CallbackPolicy for DropIfBusy {
	type Signal<A: 'static + Send + Sync, R: 'static + Send, E: Executor> = DropSignal<A, R, E>;
}

impl CallbackPolicy for Concurrent {
	type Signal<A: 'static + Send + Sync, R: 'static + Send, E: Executor> = ConcurrentSignal<A, R, E>;
}

/// A listener selected by a firing, with whatever has to be dropped once it returns.
type Pending<A, R, C> = (Arc<Listener<A, R>>, C);

fn post_listener<A, R, E, C>(executor: &E, (listener, claim): Pending<A, R, C>, args: Arc<A>)
where
	A: 'static + Send + Sync,
	R: 'static,
	E: Executor,
	C: 'static + Send,
{
	executor.post(move || {
		listener(&args);
		drop(claim);
	});
}

fn listener_operation<A, R, E, C>(executor: &E, (listener, claim): Pending<A, R, C>, args: Arc<A>) -> Operation<R>
where
	A: 'static + Send + Sync,
	R: 'static + Send,
	E: Executor,
	C: 'static + Send,
{
	let executor = executor.clone();
	Operation::new(move |completer| {
		executor.post(move || {
			let value = listener(&args);
			drop(claim);
			completer.complete(value);
		});
	})
}

fn publish_inline<A: 'static, R: 'static, C>(pending: Vec<Pending<A, R, C>>, args: &A) -> Vec<R> {
	// On unwind, the claims of listeners that didn't run yet are dropped along with the iterator.
	pending
		.into_iter()
		.map(|(listener, claim)| {
			let value = listener(args);
			drop(claim);
			value
		})
		.collect()
}

fn post_all<A, R, E, C>(executor: &E, pending: Vec<Pending<A, R, C>>, args: &Arc<A>)
where
	A: 'static + Send + Sync,
	R: 'static,
	E: Executor,
	C: 'static + Send,
{
	tracing::trace!(listeners = pending.len(), "Posting listeners.");
	for pending in pending {
		post_listener(executor, pending, Arc::clone(args));
	}
}

fn operations<A, R, E, C>(executor: &E, pending: Vec<Pending<A, R, C>>, args: A) -> Vec<Operation<R>>
where
	A: 'static + Send + Sync,
	R: 'static + Send,
	E: Executor,
	C: 'static + Send,
{
	let args = Arc::new(args);
	tracing::trace!(listeners = pending.len(), "Posting listeners as parallel group.");
	pending
		.into_iter()
		.map(|pending| listener_operation(executor, pending, Arc::clone(&args)))
		.collect()
}

fn publish_void<A, R, E, C>(executor: &E, pending: Vec<Pending<A, R, C>>, args: A, completion: impl Completion<()>)
where
	A: 'static + Send + Sync,
	R: 'static + Send,
	E: Executor,
	C: 'static + Send,
{
	parallel_publish_void(executor, operations(executor, pending, args), completion);
}

fn publish_collect<A, R, E, C>(
	executor: &E,
	pending: Vec<Pending<A, R, C>>,
	args: A,
	completion: impl Completion<Vec<R>>,
) where
	A: 'static + Send + Sync,
	R: 'static + Send,
	E: Executor,
	C: 'static + Send,
{
	parallel_publish(executor, operations(executor, pending, args), completion);
}
