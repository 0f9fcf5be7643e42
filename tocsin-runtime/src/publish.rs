//! Fan-out helpers that asynchronous signals route collecting publishes through.

use crate::{
	cancellation::CancellationSlot,
	completion::Completion,
	condition::WaitForAll,
	executor::Executor,
	group::{Operation, ParallelGroup, VoidParallelGroup},
};

/// Runs `operations` as a [`ParallelGroup`] that waits for all of them, then completes with
/// the results that were reported, in launch order.
///
/// Operations that finished without a result are skipped.
/// With no operations, `completion` is posted to `executor` with an empty [`Vec`] instead of
/// being called inline, so callers never observe their completion re-entrantly.
pub fn parallel_publish<T: 'static + Send, E: Executor>(
	executor: &E,
	operations: Vec<Operation<T>>,
	completion: impl Completion<Vec<T>>,
) {
	if operations.is_empty() {
		tracing::trace!("Nothing to publish, posting completion.");
		executor.post(move || completion.complete(Vec::new()));
	} else {
		ParallelGroup::new(operations).async_wait(WaitForAll, Flatten(completion));
	}
}

/// Like [`parallel_publish`], but only reports that all operations finished.
pub fn parallel_publish_void<T: 'static + Send, E: Executor>(
	executor: &E,
	operations: Vec<Operation<T>>,
	completion: impl Completion<()>,
) {
	if operations.is_empty() {
		tracing::trace!("Nothing to publish, posting completion.");
		executor.post(move || completion.complete(()));
	} else {
		VoidParallelGroup::new(operations).async_wait(WaitForAll, completion);
	}
}

struct Flatten<C>(C);

impl<T: 'static + Send, C: Completion<Vec<T>>> Completion<Vec<Option<T>>> for Flatten<C> {
	fn complete(self, value: Vec<Option<T>>) {
		self.0.complete(value.into_iter().flatten().collect());
	}

	fn cancellation_slot(&self) -> Option<CancellationSlot> {
		self.0.cancellation_slot()
	}
}
