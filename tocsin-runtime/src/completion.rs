//! Caller-supplied continuations.

use std::{
	future::Future,
	pin::Pin,
	task::{Context, Poll},
};

use futures_channel::oneshot;
use pin_project::pin_project;

use crate::cancellation::CancellationSlot;

/// A continuation that receives the outcome of an asynchronous operation exactly once.
///
/// Implemented for `FnOnce(T)` closures, [`Detached`], [`oneshot::Sender`]s and
/// [`WithCancellation`] (see [`bind_cancellation_slot`]).
pub trait Completion<T>: 'static + Send {
	/// Consumes the completion with the operation's outcome.
	fn complete(self, value: T);

	/// The [`CancellationSlot`] through which the caller may cancel the operation, if any.
	///
	/// Operations that support cancellation install their own handler into this slot.
	fn cancellation_slot(&self) -> Option<CancellationSlot> {
		None
	}
}

impl<T, F: 'static + Send + FnOnce(T)> Completion<T> for F {
	fn complete(self, value: T) {
		self(value);
	}
}

/// Discards the outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Detached;

impl<T> Completion<T> for Detached {
	fn complete(self, value: T) {
		drop(value);
	}
}

/// Sends the outcome through a oneshot channel. A dropped receiver discards it.
impl<T: 'static + Send> Completion<T> for oneshot::Sender<T> {
	fn complete(self, value: T) {
		// The receiver going away just means nobody is interested anymore.
		let _ = self.send(value);
	}
}

/// A [`Completion`] with an associated [`CancellationSlot`].
#[derive(Debug, Clone)]
pub struct WithCancellation<C> {
	slot: CancellationSlot,
	completion: C,
}

/// Associates `slot` with `completion`, so that emitting on the slot's
/// [`CancellationSignal`](`crate::cancellation::CancellationSignal`) cancels the
/// operation `completion` is passed to.
pub fn bind_cancellation_slot<C>(slot: CancellationSlot, completion: C) -> WithCancellation<C> {
	WithCancellation { slot, completion }
}

impl<C> WithCancellation<C> {
	/// Splits this back into its parts.
	pub fn into_parts(self) -> (CancellationSlot, C) {
		(self.slot, self.completion)
	}
}

impl<T, C: Completion<T>> Completion<T> for WithCancellation<C> {
	fn complete(self, value: T) {
		self.completion.complete(value);
	}

	fn cancellation_slot(&self) -> Option<CancellationSlot> {
		Some(self.slot.clone())
	}
}

/// Creates a [`Completion`] and the [`CompletionFuture`] that resolves with its outcome.
///
/// This turns any completion-based API in this crate (and in `tocsin`) into a future.
///
/// # Panics
///
/// The future panics when polled if the completion is dropped without completing,
/// for example because the work that would have called it was dropped by its executor.
#[must_use]
pub fn completion_future<T: 'static + Send>() -> (oneshot::Sender<T>, CompletionFuture<T>) {
	let (sender, receiver) = oneshot::channel();
	(sender, CompletionFuture { receiver })
}

/// Resolves with the value passed to the matching [`Completion`].
///
/// See [`completion_future`].
#[pin_project]
#[derive(Debug)]
#[must_use = "Futures do nothing unless polled."]
pub struct CompletionFuture<T> {
	#[pin]
	receiver: oneshot::Receiver<T>,
}

impl<T> Future for CompletionFuture<T> {
	type Output = T;

	/// # Panics
	///
	/// Iff the completion was dropped without being completed.
	/// Operations in this crate complete unless their executor drops posted work,
	/// as a joined `ThreadPool` does.
	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		self.project()
			.receiver
			.poll(cx)
			.map(|received| received.expect("completion dropped without completing"))
	}
}
