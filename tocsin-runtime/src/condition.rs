//! Decides, per finished operation, whether the rest of a [`ParallelGroup`](`crate::group::ParallelGroup`) should be cancelled.

use crate::cancellation::CancellationKind;

/// Evaluated once for each operation result within a group.
///
/// Returning [`Some`] requests cancellation of the group's other operations.
/// Only the first request has an effect.
pub trait CancellationCondition<T>: 'static + Send + Sync {
	/// Inspects one operation's `result`.
	fn evaluate(&self, result: &T) -> Option<CancellationKind>;
}

impl<T, F: 'static + Send + Sync + Fn(&T) -> Option<CancellationKind>> CancellationCondition<T> for F {
	fn evaluate(&self, result: &T) -> Option<CancellationKind> {
		self(result)
	}
}

/// Never cancels. The group completes once every operation has.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WaitForAll;

impl<T> CancellationCondition<T> for WaitForAll {
	fn evaluate(&self, _: &T) -> Option<CancellationKind> {
		None
	}
}

/// Cancels the others as soon as any operation finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WaitForOne(pub CancellationKind);

impl Default for WaitForOne {
	fn default() -> Self {
		Self(CancellationKind::Terminal)
	}
}

impl<T> CancellationCondition<T> for WaitForOne {
	fn evaluate(&self, _: &T) -> Option<CancellationKind> {
		Some(self.0)
	}
}

/// Cancels the others as soon as any operation finishes with [`Ok`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WaitForOneSuccess(pub CancellationKind);

impl Default for WaitForOneSuccess {
	fn default() -> Self {
		Self(CancellationKind::Terminal)
	}
}

impl<T, E> CancellationCondition<Result<T, E>> for WaitForOneSuccess {
	fn evaluate(&self, result: &Result<T, E>) -> Option<CancellationKind> {
		result.is_ok().then_some(self.0)
	}
}

/// Cancels the others as soon as any operation finishes with [`Err`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WaitForOneError(pub CancellationKind);

impl Default for WaitForOneError {
	fn default() -> Self {
		Self(CancellationKind::Terminal)
	}
}

impl<T, E> CancellationCondition<Result<T, E>> for WaitForOneError {
	fn evaluate(&self, result: &Result<T, E>) -> Option<CancellationKind> {
		result.is_err().then_some(self.0)
	}
}
