#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]
#![doc = include_str!("../README.md")]
//!
//! # Threading Notes
//!
//! Nothing in this crate blocks a thread waiting on another, except
//! [`ThreadPool`](`executor::ThreadPool`) workers idling for work and
//! [`ThreadPool::join`](`executor::ThreadPool::join`).
//! Locks are held only for short structural critical sections and never across user code.

pub mod cancellation;
pub mod completion;
pub mod condition;
pub mod executor;
pub mod group;
pub mod publish;

#[doc = include_str!("../README.md")]
mod readme {}
