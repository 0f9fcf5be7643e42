//! Runs a fixed set of operations in parallel and completes once, after all of them have.
//!
//! An operation's result may request cancellation of its siblings through a
//! [`CancellationCondition`]. The group then emits on each *other* operation's
//! [`CancellationSlot`] exactly once. Cancellation stays cooperative: the group still
//! waits for every operation to report before it completes.

use std::{
	fmt::{self, Debug, Formatter},
	marker::PhantomData,
	sync::{
		atomic::{AtomicU8, AtomicUsize, Ordering},
		Arc,
	},
};

use parking_lot::Mutex;

use crate::{
	cancellation::{CancellationKind, CancellationSignal, CancellationSlot},
	completion::{completion_future, Completion, CompletionFuture},
	condition::CancellationCondition,
	executor::Executor,
};

/// One member of a [`ParallelGroup`].
///
/// An operation is started exactly once, with a [`Completer`] that it **must** eventually
/// complete or drop. Dropping the [`Completer`] counts as finishing without a result.
#[must_use = "Operations do nothing until their group is awaited."]
pub struct Operation<T: 'static> {
	start: Box<dyn 'static + Send + FnOnce(Completer<T>)>,
}

impl<T: 'static> Debug for Operation<T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Operation").finish_non_exhaustive()
	}
}

impl<T: 'static + Send> Operation<T> {
	/// Wraps a starter function. `start` runs on the thread that launches the group.
	pub fn new(start: impl 'static + Send + FnOnce(Completer<T>)) -> Self {
		Self {
			start: Box::new(start),
		}
	}

	/// An operation that posts `f` to `executor` and completes with its return value.
	pub fn post<E: Executor>(executor: &E, f: impl 'static + Send + FnOnce() -> T) -> Self {
		let executor = executor.clone();
		Self::new(move |completer| executor.post(move || completer.complete(f())))
	}

	/// Like [`post`](`Operation::post`), but `f` can observe the operation's [`CancellationSlot`].
	pub fn post_cancellable<E: Executor>(
		executor: &E,
		f: impl 'static + Send + FnOnce(&CancellationSlot) -> T,
	) -> Self {
		let executor = executor.clone();
		Self::new(move |completer| {
			executor.post(move || {
				let value = f(&completer.slot());
				completer.complete(value);
			});
		})
	}

	/// An operation that completes with `value` as soon as it is started.
	pub fn ready(value: T) -> Self {
		Self::new(move |completer| completer.complete(value))
	}

	fn start(self, completer: Completer<T>) {
		(self.start)(completer);
	}
}

trait Sink<T>: 'static + Send + Sync {
	fn report(&self, index: usize, value: Option<T>);
}

/// Handed to each started [`Operation`] to report its result.
///
/// Dropping it without calling [`complete`](`Completer::complete`) reports "no result",
/// which shows up as [`None`] in the group's output.
#[must_use = "Dropping a `Completer` finishes its operation without a result."]
pub struct Completer<T: 'static> {
	sink: Option<Arc<dyn Sink<T>>>,
	slot: CancellationSlot,
	index: usize,
}

impl<T: 'static> Debug for Completer<T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Completer")
			.field("index", &self.index)
			.field("pending", &self.sink.is_some())
			.finish()
	}
}

impl<T: 'static> Completer<T> {
	/// The operation's position within its group.
	#[must_use]
	pub fn index(&self) -> usize {
		self.index
	}

	/// The [`CancellationSlot`] the group emits on when this operation should stop.
	#[must_use]
	pub fn slot(&self) -> CancellationSlot {
		self.slot.clone()
	}

	/// Whether the group requested cancellation of this operation.
	#[must_use]
	pub fn is_cancelled(&self) -> bool {
		self.slot.is_cancelled()
	}

	/// Reports `value` as this operation's result.
	pub fn complete(mut self, value: T) {
		if let Some(sink) = self.sink.take() {
			sink.report(self.index, Some(value));
		}
	}
}

impl<T: 'static> Drop for Completer<T> {
	fn drop(&mut self) {
		if let Some(sink) = self.sink.take() {
			sink.report(self.index, None);
		}
	}
}

/// Lets a [`Completer`] be passed straight into another completion-based operation,
/// including a nested group, which then observes this operation's cancellation.
impl<T: 'static + Send> Completion<T> for Completer<T> {
	fn complete(self, value: T) {
		Completer::complete(self, value);
	}

	fn cancellation_slot(&self) -> Option<CancellationSlot> {
		Some(self.slot())
	}
}

trait Aggregate<T>: 'static + Send + Sync {
	type Output: 'static + Send;
	fn store(&self, index: usize, value: T);
	fn finish(&self) -> Self::Output;
}

struct Collect<T>(Box<[Mutex<Option<T>>]>);

impl<T> Collect<T> {
	fn new(len: usize) -> Self {
		Self((0..len).map(|_| Mutex::new(None)).collect())
	}
}

impl<T: 'static + Send> Aggregate<T> for Collect<T> {
	type Output = Vec<Option<T>>;

	fn store(&self, index: usize, value: T) {
		*self.0[index].lock() = Some(value);
	}

	fn finish(&self) -> Self::Output {
		self.0.iter().map(|slot| slot.lock().take()).collect()
	}
}

struct Discard;

impl<T> Aggregate<T> for Discard {
	type Output = ();

	fn store(&self, _: usize, value: T) {
		drop(value);
	}

	fn finish(&self) {}
}

const NO_REQUESTER: usize = usize::MAX;

struct GroupState<T, C, A, H> {
	/// Starts at the operation count so that requests made while launching are deferred.
	cancellations_requested: AtomicUsize,
	outstanding: AtomicUsize,
	cancel_kind: AtomicU8,
	requester: AtomicUsize,
	signals: Box<[CancellationSignal]>,
	condition: C,
	results: A,
	handler: Mutex<Option<H>>,
	_phantom: PhantomData<fn(T)>,
}

impl<T, C, A, H> GroupState<T, C, A, H>
where
	T: 'static + Send,
	C: CancellationCondition<T>,
	A: Aggregate<T>,
	H: Completion<A::Output>,
{
	fn request_cancellation(&self, from: Option<usize>, kind: CancellationKind) {
		// Only the first request's kind and origin are kept for a deferred emission.
		let first = self
			.cancel_kind
			.compare_exchange(0, kind as u8, Ordering::AcqRel, Ordering::Acquire)
			.is_ok();
		if let (true, Some(from)) = (first, from) {
			self.requester.store(from, Ordering::Release);
		}

		if self.cancellations_requested.fetch_add(1, Ordering::AcqRel) == 0 {
			tracing::debug!(?from, ?kind, "Cancelling parallel group.");
			self.emit(kind, from);
		}
	}

	fn emit(&self, kind: CancellationKind, skip: Option<usize>) {
		for (index, signal) in self.signals.iter().enumerate() {
			if Some(index) != skip {
				signal.emit(kind);
			}
		}
	}

	fn finish(&self) {
		// Handlers operations left installed may own resources of their own.
		for signal in &*self.signals {
			signal.slot().clear();
		}

		let Some(handler) = self.handler.lock().take() else {
			tracing::error!("Parallel group finished twice.");
			return;
		};
		let output = self.results.finish();
		tracing::debug!(operations = self.signals.len(), "Parallel group completed.");
		handler.complete(output);
	}
}

impl<T, C, A, H> Sink<T> for GroupState<T, C, A, H>
where
	T: 'static + Send,
	C: CancellationCondition<T>,
	A: Aggregate<T>,
	H: Completion<A::Output>,
{
	fn report(&self, index: usize, value: Option<T>) {
		let kind = value.as_ref().and_then(|value| self.condition.evaluate(value));
		if let Some(value) = value {
			self.results.store(index, value);
		}
		if let Some(kind) = kind {
			self.request_cancellation(Some(index), kind);
		}

		if self.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
			self.finish();
		}
	}
}

fn launch<T, C, A, H>(operations: Vec<Operation<T>>, condition: C, results: A, handler: H)
where
	T: 'static + Send,
	C: CancellationCondition<T>,
	A: Aggregate<T>,
	H: Completion<A::Output>,
{
	let n = operations.len();
	let caller_slot = handler.cancellation_slot();
	let state = Arc::new(GroupState {
		cancellations_requested: AtomicUsize::new(n),
		outstanding: AtomicUsize::new(n),
		cancel_kind: AtomicU8::new(0),
		requester: AtomicUsize::new(NO_REQUESTER),
		signals: (0..n).map(|_| CancellationSignal::new()).collect(),
		condition,
		results,
		handler: Mutex::new(Some(handler)),
		_phantom: PhantomData,
	});

	if n == 0 {
		state.finish();
		return;
	}

	tracing::trace!(operations = n, "Launching parallel group.");
	for (index, operation) in operations.into_iter().enumerate() {
		let sink: Arc<dyn Sink<T>> = Arc::clone(&state) as _;
		operation.start(Completer {
			sink: Some(sink),
			slot: state.signals[index].slot(),
			index,
		});
	}

	if state.cancellations_requested.fetch_sub(n, Ordering::AcqRel) > n {
		let kind = CancellationKind::from_raw(state.cancel_kind.load(Ordering::Acquire))
			.unwrap_or(CancellationKind::Terminal);
		let requester = state.requester.load(Ordering::Acquire);
		tracing::debug!(?kind, "Cancelling parallel group after launch.");
		state.emit(kind, (requester != NO_REQUESTER).then_some(requester));
	}

	if let Some(caller_slot) = caller_slot.filter(|_| state.outstanding.load(Ordering::Acquire) > 0) {
		let state = Arc::downgrade(&state);
		caller_slot.assign(move |kind| {
			if let Some(state) = state.upgrade() {
				state.request_cancellation(None, kind);
			}
		});
	}
}

/// A not-yet-started set of [`Operation`]s whose results are collected in launch order.
///
/// See [`make_parallel_group`].
#[must_use = "A parallel group does nothing until awaited."]
pub struct ParallelGroup<T: 'static> {
	operations: Vec<Operation<T>>,
}

impl<T: 'static> Debug for ParallelGroup<T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("ParallelGroup")
			.field("len", &self.operations.len())
			.finish()
	}
}

/// Groups `operations` for a single parallel wait.
pub fn make_parallel_group<T: 'static + Send>(
	operations: impl IntoIterator<Item = Operation<T>>,
) -> ParallelGroup<T> {
	ParallelGroup::new(operations)
}

impl<T: 'static + Send> FromIterator<Operation<T>> for ParallelGroup<T> {
	fn from_iter<I: IntoIterator<Item = Operation<T>>>(iter: I) -> Self {
		Self::new(iter)
	}
}

impl<T: 'static + Send> ParallelGroup<T> {
	/// Groups `operations`. Nothing starts until [`async_wait`](`ParallelGroup::async_wait`).
	pub fn new(operations: impl IntoIterator<Item = Operation<T>>) -> Self {
		Self {
			operations: operations.into_iter().collect(),
		}
	}

	/// The number of operations in the group.
	#[must_use]
	pub fn len(&self) -> usize {
		self.operations.len()
	}

	/// Whether the group is empty.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.operations.is_empty()
	}

	/// Adds another operation.
	pub fn push(&mut self, operation: Operation<T>) {
		self.operations.push(operation);
	}

	/// Starts all operations, in order, on the current thread.
	///
	/// `completion` runs exactly once, on whichever thread reports the last result
	/// (or right here if the group is empty), with one entry per operation in launch order.
	/// [`None`] marks an operation that finished without a result.
	///
	/// If `completion` carries a [`CancellationSlot`], emitting on it cancels every operation.
	pub fn async_wait(
		self,
		condition: impl CancellationCondition<T>,
		completion: impl Completion<Vec<Option<T>>>,
	) {
		let results = Collect::new(self.operations.len());
		launch(self.operations, condition, results, completion);
	}

	/// [`async_wait`](`ParallelGroup::async_wait`), as a future.
	///
	/// # Panics
	///
	/// The future panics when polled if the executor drops the posted work that would complete it.
	pub fn wait(self, condition: impl CancellationCondition<T>) -> CompletionFuture<Vec<Option<T>>> {
		let (completion, future) = completion_future();
		self.async_wait(condition, completion);
		future
	}

	/// Converts this into a [`VoidParallelGroup`] that only reports completion.
	pub fn discard_results(self) -> VoidParallelGroup<T> {
		VoidParallelGroup {
			operations: self.operations,
		}
	}
}

/// Like [`ParallelGroup`], but completes with `()`. Results are still
/// shown to the [`CancellationCondition`] before they are dropped.
#[must_use = "A parallel group does nothing until awaited."]
pub struct VoidParallelGroup<T: 'static> {
	operations: Vec<Operation<T>>,
}

impl<T: 'static> Debug for VoidParallelGroup<T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("VoidParallelGroup")
			.field("len", &self.operations.len())
			.finish()
	}
}

impl<T: 'static + Send> FromIterator<Operation<T>> for VoidParallelGroup<T> {
	fn from_iter<I: IntoIterator<Item = Operation<T>>>(iter: I) -> Self {
		Self::new(iter)
	}
}

impl<T: 'static + Send> VoidParallelGroup<T> {
	/// Groups `operations`.
	pub fn new(operations: impl IntoIterator<Item = Operation<T>>) -> Self {
		Self {
			operations: operations.into_iter().collect(),
		}
	}

	/// The number of operations in the group.
	#[must_use]
	pub fn len(&self) -> usize {
		self.operations.len()
	}

	/// Whether the group is empty.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.operations.is_empty()
	}

	/// Starts all operations. See [`ParallelGroup::async_wait`].
	pub fn async_wait(self, condition: impl CancellationCondition<T>, completion: impl Completion<()>) {
		launch(self.operations, condition, Discard, completion);
	}

	/// [`async_wait`](`VoidParallelGroup::async_wait`), as a future.
	///
	/// # Panics
	///
	/// Like [`ParallelGroup::wait`].
	pub fn wait(self, condition: impl CancellationCondition<T>) -> CompletionFuture<()> {
		let (completion, future) = completion_future();
		self.async_wait(condition, completion);
		future
	}
}
