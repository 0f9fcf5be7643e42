use std::{
	fmt::{self, Debug, Formatter},
	sync::Arc,
};

use tocsin_runtime::{
	completion::Completion,
	executor::{AnyExecutor, Executor},
};

use super::{post_all, publish_collect, publish_inline, publish_void, AsyncSignal, Pending};
use crate::{
	signal::Listener,
	snapshot::{Snapshot, SnapshotRegistry},
	Connection,
};

/// An [`AsyncSignal`] that posts every listener on every firing.
///
/// The same listener may run concurrently with itself, so listeners **must** tolerate that.
///
/// [`Clone`]s are handles to the same registry.
pub struct ConcurrentSignal<A, R = (), E = AnyExecutor> {
	registry: Arc<SnapshotRegistry<Listener<A, R>>>,
	executor: E,
}

impl<A, R, E: Clone> Clone for ConcurrentSignal<A, R, E> {
	fn clone(&self) -> Self {
		Self {
			registry: Arc::clone(&self.registry),
			executor: self.executor.clone(),
		}
	}
}

impl<A, R, E: Debug> Debug for ConcurrentSignal<A, R, E> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("ConcurrentSignal")
			.field("executor", &self.executor)
			.field("listeners", &self.registry.len())
			.finish_non_exhaustive()
	}
}

impl<A, R, E> ConcurrentSignal<A, R, E>
where
	A: 'static + Send + Sync,
	R: 'static + Send,
	E: Executor,
{
	/// Creates a new signal without listeners that posts to `executor`.
	#[must_use]
	pub fn new(executor: E) -> Self {
		Self {
			registry: Arc::default(),
			executor,
		}
	}

	/// The current listener list.
	#[must_use]
	pub fn snapshot(&self) -> Snapshot<Listener<A, R>> {
		self.registry.snapshot()
	}

	fn pending(&self) -> Vec<Pending<A, R, ()>> {
		self.registry
			.snapshot()
			.listeners()
			.map(|listener| (Arc::clone(listener), ()))
			.collect()
	}
}

impl<A, R, E> AsyncSignal<A, R> for ConcurrentSignal<A, R, E>
where
	A: 'static + Send + Sync,
	R: 'static + Send,
	E: Executor,
{
	type Executor = E;

	fn with_executor(executor: E) -> Self {
		Self::new(executor)
	}

	fn executor(&self) -> &E {
		&self.executor
	}

	fn connect(&self, listener: impl 'static + Send + Sync + Fn(&A) -> R) -> Connection {
		self.registry.connect(Arc::new(listener))
	}

	fn len(&self) -> usize {
		self.registry.len()
	}

	fn disconnect_all(&self) {
		let removed = self.registry.clear();
		tracing::trace!(listeners = removed.len(), "Disconnected all listeners.");
	}

	fn publish(&self, args: &A) -> Vec<R> {
		publish_inline(self.pending(), args)
	}

	fn async_publish_shared(&self, args: Arc<A>) {
		post_all(&self.executor, self.pending(), &args);
	}

	fn async_publish_with(&self, args: A, completion: impl Completion<()>) {
		publish_void(&self.executor, self.pending(), args, completion);
	}

	fn async_publish_collect(&self, args: A, completion: impl Completion<Vec<R>>) {
		publish_collect(&self.executor, self.pending(), args, completion);
	}
}
