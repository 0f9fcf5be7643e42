#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]
#![doc = include_str!("../README.md")]
//!
//! # Threading Notes
//!
//! Every type here is [`Send`] and [`Sync`]. No lock is held while a listener runs,
//! so listeners may freely connect, disconnect and publish on the signal that called them.

mod connection;
mod error;
mod signal;
mod snapshot;

pub mod async_signal;
pub mod dispatcher;

pub use async_signal::{AsyncSignal, CallbackPolicy, Concurrent, ConcurrentSignal, DropIfBusy, DropSignal};
pub use connection::{Connection, ScopedConnection};
pub use dispatcher::{AsyncEventDispatcher, EventDispatcher};
pub use error::Error;
pub use signal::{Listener, Signal};
pub use snapshot::Snapshot;

/// The executor and completion-group framework backing this crate's asynchronous signals.
pub use tocsin_runtime as runtime;

#[doc = include_str!("../README.md")]
mod readme {}
