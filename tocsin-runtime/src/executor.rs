//! The work-submission substrate that asynchronous signals post listener invocations to.
//!
//! An [`Executor`] only has to accept [`Work`]. Whether that work then runs on a
//! single-threaded run-loop, a thread pool or immediately is opaque to the callers.

use std::{
	collections::VecDeque,
	fmt::{self, Debug, Formatter},
	sync::Arc,
};

use parking_lot::Mutex;

/// A zero-argument unit of work.
pub type Work = Box<dyn 'static + Send + FnOnce()>;

/// Trait for handles that accept [`Work`] for later execution.
///
/// # Logic
///
/// Implementations **should** run each submitted unit of work exactly once.
/// Work that is dropped without running **must** be dropped normally, so that any
/// guards it captured get to clean up.
///
/// [`submit`](`Executor::submit`) **must not** run `work` while holding a lock that
/// `work` could try to take through the same executor.
pub trait Executor: 'static + Send + Sync + Clone {
	/// Submits `work` for execution.
	fn submit(&self, work: Work);

	/// Convenience wrapper around [`submit`](`Executor::submit`) that boxes `f`.
	fn post(&self, f: impl 'static + Send + FnOnce())
	where
		Self: Sized,
	{
		self.submit(Box::new(f));
	}
}

/// Runs submitted work immediately on the submitting thread.
///
/// Useful in tests and for signals whose listeners are cheap.
/// Note that this makes every "asynchronous" publish synchronous.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Immediate;

impl Executor for Immediate {
	fn submit(&self, work: Work) {
		work();
	}
}

/// A manually-driven run-loop.
///
/// Submitted work is queued until one of [`run_one`](`LocalQueue::run_one`),
/// [`run`](`LocalQueue::run`) or [`run_for`](`LocalQueue::run_for`) is called.
/// Clones share the same queue.
///
/// # Panics
///
/// A panic in a unit of work propagates out of the `run…` call that executed it.
/// Work still queued at that point stays queued.
#[derive(Clone, Default)]
pub struct LocalQueue {
	queue: Arc<Mutex<VecDeque<Work>>>,
}

impl Debug for LocalQueue {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("LocalQueue")
			.field("len", &self.len())
			.finish_non_exhaustive()
	}
}

impl LocalQueue {
	/// Creates a new empty [`LocalQueue`].
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// The number of queued units of work.
	#[must_use]
	pub fn len(&self) -> usize {
		self.queue.lock().len()
	}

	/// Whether no work is queued.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.queue.lock().is_empty()
	}

	/// Runs the oldest queued unit of work, if any.
	///
	/// **Returns** whether work was run.
	pub fn run_one(&self) -> bool {
		// The guard is a temporary here, so the lock is released before `work` runs.
		let next = self.queue.lock().pop_front();
		match next {
			Some(work) => {
				work();
				true
			}
			None => false,
		}
	}

	/// Runs queued work until the queue is empty, including work submitted meanwhile.
	///
	/// **Returns** how many units of work ran.
	pub fn run(&self) -> usize {
		let mut count = 0;
		while self.run_one() {
			count += 1;
		}
		count
	}

	/// Runs at most `limit` units of work.
	///
	/// **Returns** how many units of work ran.
	pub fn run_for(&self, limit: usize) -> usize {
		(0..limit).take_while(|_| self.run_one()).count()
	}
}

impl Executor for LocalQueue {
	fn submit(&self, work: Work) {
		self.queue.lock().push_back(work);
	}
}

/// A type-erased [`Executor`] handle.
#[derive(Clone)]
pub struct AnyExecutor {
	submit: Arc<dyn 'static + Send + Sync + Fn(Work)>,
}

impl Debug for AnyExecutor {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("AnyExecutor").finish_non_exhaustive()
	}
}

impl AnyExecutor {
	/// Erases the type of `executor`.
	pub fn new(executor: impl Executor) -> Self {
		Self {
			submit: Arc::new(move |work| executor.submit(work)),
		}
	}
}

impl Executor for AnyExecutor {
	fn submit(&self, work: Work) {
		(self.submit)(work);
	}
}

#[cfg(feature = "thread_pool")]
mod thread_pool;
#[cfg(feature = "thread_pool")]
pub use thread_pool::{ThreadPool, ThreadPoolBuilder};
