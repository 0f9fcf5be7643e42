use std::{
	collections::VecDeque,
	fmt::{self, Debug, Formatter},
	io,
	num::NonZeroUsize,
	panic::{catch_unwind, AssertUnwindSafe},
	sync::{
		atomic::{AtomicBool, AtomicUsize, Ordering},
		Arc,
	},
	thread::{self, JoinHandle},
};

use event_listener::{Event, Listener};
use parking_lot::Mutex;

use super::{Executor, Work};

/// A fixed-size pool of worker threads.
///
/// Clones share the same workers. Workers keep running until [`join`](`ThreadPool::join`)
/// is called, so at least one handle should eventually be joined.
///
/// # Panics
///
/// A panicking unit of work does not take its worker down.
/// The panic is caught and logged at `error` level, and the work counts as finished.
#[derive(Clone)]
pub struct ThreadPool {
	shared: Arc<Shared>,
}

struct Shared {
	queue: Mutex<VecDeque<Work>>,
	work_available: Event,
	shutdown: AtomicBool,
	closed: AtomicBool,
	panicked: AtomicUsize,
	workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Debug for ThreadPool {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("ThreadPool")
			.field("queued", &self.shared.queue.lock().len())
			.field("workers", &self.shared.workers.lock().len())
			.field("shutdown", &self.shared.shutdown.load(Ordering::Relaxed))
			.finish_non_exhaustive()
	}
}

/// Configures and spawns a [`ThreadPool`].
#[derive(Debug, Clone)]
#[must_use = "Call `.build()` to spawn the pool."]
pub struct ThreadPoolBuilder {
	workers: Option<NonZeroUsize>,
	thread_name: String,
}

impl Default for ThreadPoolBuilder {
	fn default() -> Self {
		Self {
			workers: None,
			thread_name: "tocsin-worker".to_owned(),
		}
	}
}

impl ThreadPoolBuilder {
	/// Sets the number of worker threads.
	///
	/// Defaults to [`available_parallelism`](`thread::available_parallelism`), or 1 if that is unknown.
	pub fn workers(mut self, workers: NonZeroUsize) -> Self {
		self.workers = Some(workers);
		self
	}

	/// Sets the worker thread name prefix. Each worker appends `-{index}`.
	pub fn thread_name(mut self, prefix: impl Into<String>) -> Self {
		self.thread_name = prefix.into();
		self
	}

	/// Spawns the worker threads.
	///
	/// # Errors
	///
	/// Iff a worker thread can't be spawned. Workers spawned before that are shut down again.
	pub fn build(self) -> io::Result<ThreadPool> {
		let workers = self
			.workers
			.or_else(|| thread::available_parallelism().ok())
			.map_or(1, NonZeroUsize::get);

		let shared = Arc::new(Shared {
			queue: Mutex::new(VecDeque::new()),
			work_available: Event::new(),
			shutdown: AtomicBool::new(false),
			closed: AtomicBool::new(false),
			panicked: AtomicUsize::new(0),
			workers: Mutex::new(Vec::with_capacity(workers)),
		});
		let pool = ThreadPool { shared };

		for index in 0..workers {
			let shared = Arc::clone(&pool.shared);
			let spawned = thread::Builder::new()
				.name(format!("{}-{index}", self.thread_name))
				.spawn(move || shared.work());
			match spawned {
				Ok(handle) => pool.shared.workers.lock().push(handle),
				Err(error) => {
					pool.join();
					return Err(error);
				}
			}
		}

		tracing::debug!(workers, "Thread pool started.");
		Ok(pool)
	}
}

impl ThreadPool {
	/// Starts configuring a new [`ThreadPool`].
	pub fn builder() -> ThreadPoolBuilder {
		ThreadPoolBuilder::default()
	}

	/// Spawns a pool with `workers` worker threads.
	///
	/// # Errors
	///
	/// Iff a worker thread can't be spawned.
	pub fn new(workers: NonZeroUsize) -> io::Result<Self> {
		Self::builder().workers(workers).build()
	}

	/// How many units of work panicked on this pool so far.
	#[must_use]
	pub fn panicked(&self) -> usize {
		self.shared.panicked.load(Ordering::Acquire)
	}

	/// Lets the workers drain the queue and waits for them to exit.
	///
	/// Work submitted by draining work still runs. Work that is submitted after this call
	/// returns is dropped without running.
	/// **Idempotent.** Calling this from a worker thread only initiates the shutdown,
	/// since a worker can't wait for itself.
	pub fn join(&self) {
		self.shared.shutdown.store(true, Ordering::Release);
		self.shared.work_available.notify(usize::MAX);

		let current = thread::current().id();
		let workers = std::mem::take(&mut *self.shared.workers.lock());
		let (own, others): (Vec<_>, Vec<_>) =
			workers.into_iter().partition(|handle| handle.thread().id() == current);
		for handle in others {
			if handle.join().is_err() {
				tracing::error!("Thread pool worker exited abnormally.");
			}
		}
		// A worker joining its own pool: keep its handle around so a later `join` from elsewhere sees it.
		let own_pool = !own.is_empty();
		self.shared.workers.lock().extend(own);
		if own_pool {
			return;
		}

		self.shared.closed.store(true, Ordering::Release);
		let stranded = std::mem::take(&mut *self.shared.queue.lock());
		if !stranded.is_empty() {
			tracing::warn!(count = stranded.len(), "Work stranded in a joined thread pool was dropped.");
		}
		drop(stranded);
	}
}

impl Executor for ThreadPool {
	fn submit(&self, work: Work) {
		if self.shared.closed.load(Ordering::Acquire) {
			tracing::warn!("Work submitted to a joined thread pool was dropped.");
			drop(work);
			return;
		}
		self.shared.queue.lock().push_back(work);
		self.shared.work_available.notify(1);
	}
}

impl Shared {
	fn work(&self) {
		loop {
			let next = self.queue.lock().pop_front();
			if let Some(work) = next {
				self.run(work);
				continue;
			}

			if self.shutdown.load(Ordering::Acquire) {
				break;
			}

			let listener = self.work_available.listen();

			// Re-check after registering, so a notification in between isn't missed.
			if !self.queue.lock().is_empty() || self.shutdown.load(Ordering::Acquire) {
				continue;
			}
			listener.wait();
		}
	}

	fn run(&self, work: Work) {
		if let Err(payload) = catch_unwind(AssertUnwindSafe(work)) {
			self.panicked.fetch_add(1, Ordering::AcqRel);
			let message = payload
				.downcast_ref::<&str>()
				.copied()
				.or_else(|| payload.downcast_ref::<String>().map(String::as_str))
				.unwrap_or("(non-string panic payload)");
			tracing::error!(message, "Unit of work panicked on a thread pool worker.");
		}
	}
}
