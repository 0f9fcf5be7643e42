use thiserror::Error;

/// Refusals of checked preconditions.
///
/// Misuse that has a harmless reading, like disconnecting twice or after the signal is gone,
/// is a no-op rather than an [`Error`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
#[non_exhaustive]
pub enum Error {
	/// Listeners were still executing, so their registry couldn't be transferred.
	#[error("{running} listener(s) still executing")]
	InFlight {
		/// How many listeners were executing across both sides of the transfer.
		running: usize,
	},
}
