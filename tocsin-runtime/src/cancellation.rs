//! Cooperative cancellation: a [`CancellationSignal`] emits, its [`CancellationSlot`]s observe.
//!
//! Nothing here aborts running work. An operation that wants to be cancellable has to
//! install a handler on its slot, poll [`CancellationSlot::is_cancelled`] or await
//! [`CancellationSlot::cancelled`].

use std::{
	fmt::{self, Debug, Formatter},
	mem,
	sync::{
		atomic::{AtomicU8, Ordering},
		Arc,
	},
};

use event_listener::Event;
use parking_lot::Mutex;

/// How much of an operation's progress a cancellation may discard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum CancellationKind {
	/// The operation may be left in an unspecified state and can't be resumed.
	Terminal = 1,
	/// The operation may have had side effects, but its state is well-defined.
	Partial = 2,
	/// The operation had no observable side effects.
	Total = 3,
}

impl CancellationKind {
	pub(crate) fn from_raw(raw: u8) -> Option<Self> {
		match raw {
			1 => Some(Self::Terminal),
			2 => Some(Self::Partial),
			3 => Some(Self::Total),
			_ => None,
		}
	}
}

type Handler = Box<dyn 'static + Send + FnMut(CancellationKind)>;

struct Shared {
	requested: AtomicU8,
	installed: Mutex<Installed>,
	cancelled: Event,
}

struct Installed {
	/// Bumped on each assignment so that an emission doesn't restore a replaced handler.
	generation: u64,
	handler: Option<Handler>,
}

/// The emitting side of a cancellation channel.
///
/// Not [`Clone`]: exactly one party decides when to cancel.
pub struct CancellationSignal {
	shared: Arc<Shared>,
}

/// The observing side of a [`CancellationSignal`]. Cheaply [`Clone`]able.
#[derive(Clone)]
pub struct CancellationSlot {
	shared: Arc<Shared>,
}

impl Debug for CancellationSignal {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("CancellationSignal")
			.field("requested", &self.slot().requested())
			.finish_non_exhaustive()
	}
}

impl Debug for CancellationSlot {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("CancellationSlot")
			.field("requested", &self.requested())
			.field("connected", &self.is_connected())
			.finish()
	}
}

impl Default for CancellationSignal {
	fn default() -> Self {
		Self::new()
	}
}

impl CancellationSignal {
	/// Creates a new signal that hasn't been emitted yet.
	#[must_use]
	pub fn new() -> Self {
		Self {
			shared: Arc::new(Shared {
				requested: AtomicU8::new(0),
				installed: Mutex::new(Installed {
					generation: 0,
					handler: None,
				}),
				cancelled: Event::new(),
			}),
		}
	}

	/// Creates a [`CancellationSlot`] observing this signal.
	#[must_use]
	pub fn slot(&self) -> CancellationSlot {
		CancellationSlot {
			shared: Arc::clone(&self.shared),
		}
	}

	/// Requests cancellation of `kind`.
	///
	/// Runs the installed handler (if any) on the current thread, with no lock held,
	/// and wakes tasks awaiting [`CancellationSlot::cancelled`].
	///
	/// Emitting again replaces the recorded [`CancellationKind`] and runs the handler again.
	/// Emissions racing each other on different threads may coalesce into one handler call.
	pub fn emit(&self, kind: CancellationKind) {
		self.shared.requested.store(kind as u8, Ordering::Release);

		let (generation, handler) = {
			let mut installed = self.shared.installed.lock();
			(installed.generation, installed.handler.take())
		};

		if let Some(mut handler) = handler {
			handler(kind);

			let stale = {
				let mut installed = self.shared.installed.lock();
				if installed.generation == generation && installed.handler.is_none() {
					installed.handler = Some(handler);
					None
				} else {
					Some(handler)
				}
			};
			drop(stale);
		}

		self.shared.cancelled.notify(usize::MAX);
	}
}

impl CancellationSlot {
	/// Installs `handler`, replacing (and dropping) any previous one.
	///
	/// The handler only sees emissions that happen after it was installed.
	/// Check [`is_cancelled`](`CancellationSlot::is_cancelled`) afterwards to catch an earlier one.
	pub fn assign(&self, handler: impl 'static + Send + FnMut(CancellationKind)) {
		let previous = {
			let mut installed = self.shared.installed.lock();
			installed.generation += 1;
			mem::replace(&mut installed.handler, Some(Box::new(handler)))
		};
		drop(previous);
	}

	/// Removes (and drops) the installed handler, if any.
	pub fn clear(&self) {
		let previous = {
			let mut installed = self.shared.installed.lock();
			installed.generation += 1;
			installed.handler.take()
		};
		drop(previous);
	}

	/// Whether a handler is currently installed.
	///
	/// Reports `false` while the handler is running.
	#[must_use]
	pub fn is_connected(&self) -> bool {
		self.shared.installed.lock().handler.is_some()
	}

	/// Whether cancellation was requested.
	#[must_use]
	pub fn is_cancelled(&self) -> bool {
		self.requested().is_some()
	}

	/// The most recently requested [`CancellationKind`], if any.
	#[must_use]
	pub fn requested(&self) -> Option<CancellationKind> {
		CancellationKind::from_raw(self.shared.requested.load(Ordering::Acquire))
	}

	/// Resolves once cancellation has been requested.
	pub async fn cancelled(&self) -> CancellationKind {
		loop {
			if let Some(kind) = self.requested() {
				return kind;
			}

			let listener = self.shared.cancelled.listen();

			// Re-check after registering, so an emission in between isn't missed.
			if let Some(kind) = self.requested() {
				return kind;
			}
			listener.await;
		}
	}
}
