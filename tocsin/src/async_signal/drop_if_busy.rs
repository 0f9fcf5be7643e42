use std::{
	fmt::{self, Debug, Formatter},
	mem,
	sync::Arc,
};

use parking_lot::Mutex;
use scopeguard::ScopeGuard;
use slotmap::{new_key_type, SlotMap};
use tocsin_runtime::{
	completion::Completion,
	executor::{AnyExecutor, Executor},
};

use super::{post_all, publish_collect, publish_inline, publish_void, AsyncSignal, Pending};
use crate::{signal::Listener, Connection, Error};

new_key_type! {
	struct ListenerKey;
}

struct WorkingEntry<A, R> {
	listener: Arc<Listener<A, R>>,
	executing: bool,
}

struct WorkingSet<A, R> {
	listeners: SlotMap<ListenerKey, WorkingEntry<A, R>>,
	/// Disconnected while executing. Swept at the start of the next firing after they finish.
	to_remove: Vec<ListenerKey>,
}

impl<A, R> WorkingSet<A, R> {
	fn running(&self) -> usize {
		self.listeners.values().filter(|entry| entry.executing).count()
	}
}

struct DropCore<A, R, E> {
	executor: E,
	working_set: Mutex<WorkingSet<A, R>>,
}

/// An [`AsyncSignal`] that skips listeners still busy with a previous firing.
///
/// Each firing first claims every idle listener (marking it as executing), then runs the
/// claimed ones. A claimed listener becomes idle again as soon as it returns, unwinds or its
/// posted work is dropped by the executor.
/// Skipped firings are not queued or retried. This bounds the work a slow listener can pile up.
///
/// [`Clone`]s are handles to the same registry.
pub struct DropSignal<A, R = (), E = AnyExecutor> {
	core: Arc<DropCore<A, R, E>>,
}

impl<A, R, E> Clone for DropSignal<A, R, E> {
	fn clone(&self) -> Self {
		Self {
			core: Arc::clone(&self.core),
		}
	}
}

impl<A, R, E: Debug> Debug for DropSignal<A, R, E> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let (len, running) = {
			let working_set = self.core.working_set.lock();
			(working_set.listeners.len(), working_set.running())
		};
		f.debug_struct("DropSignal")
			.field("executor", &self.core.executor)
			.field("listeners", &len)
			.field("running", &running)
			.finish_non_exhaustive()
	}
}

impl<A, R, E> DropCore<A, R, E>
where
	A: 'static + Send + Sync,
	R: 'static + Send,
	E: Executor,
{
	fn claim(self: &Arc<Self>, key: ListenerKey) -> ScopeGuard<ListenerKey, impl 'static + Send + FnOnce(ListenerKey)> {
		let core = Arc::clone(self);
		scopeguard::guard(key, move |key| core.release(key))
	}

	fn release(&self, key: ListenerKey) {
		if let Some(entry) = self.working_set.lock().listeners.get_mut(key) {
			entry.executing = false;
		}
	}

	/// Sweeps listeners that were disconnected while executing, then claims all idle ones.
	fn prune_and_get_pending(
		self: &Arc<Self>,
	) -> Vec<Pending<A, R, ScopeGuard<ListenerKey, impl 'static + Send + FnOnce(ListenerKey)>>> {
		let mut removed = Vec::new();
		let mut skipped = 0_usize;
		let claimed = {
			let mut guard = self.working_set.lock();
			let working_set = &mut *guard;

			for key in mem::take(&mut working_set.to_remove) {
				match working_set.listeners.get(key).map(|entry| entry.executing) {
					Some(true) => working_set.to_remove.push(key),
					Some(false) => removed.extend(working_set.listeners.remove(key)),
					None => (),
				}
			}

			let mut claimed = Vec::new();
			for (key, entry) in &mut working_set.listeners {
				if entry.executing {
					skipped += 1;
					tracing::trace!(?key, "Listener still executing, dropping firing for it.");
				} else {
					entry.executing = true;
					claimed.push((key, Arc::clone(&entry.listener)));
				}
			}
			claimed
		};
		drop(removed);

		tracing::trace!(claimed = claimed.len(), skipped, "Claimed idle listeners.");
		claimed
			.into_iter()
			.map(|(key, listener)| (listener, self.claim(key)))
			.collect()
	}

	fn disconnect(&self, key: ListenerKey) {
		let removed = {
			let mut guard = self.working_set.lock();
			let working_set = &mut *guard;
			match working_set.listeners.get(key).map(|entry| entry.executing) {
				Some(true) => {
					if !working_set.to_remove.contains(&key) {
						working_set.to_remove.push(key);
					}
					tracing::trace!(?key, "Listener disconnected while executing, removal deferred.");
					None
				}
				Some(false) => {
					// A clone of its connection may have queued it while it was executing.
					working_set.to_remove.retain(|queued| *queued != key);
					working_set.listeners.remove(key)
				}
				None => None,
			}
		};
		if removed.is_some() {
			tracing::trace!(?key, "Listener disconnected.");
		}
	}
}

impl<A, R, E> DropSignal<A, R, E>
where
	A: 'static + Send + Sync,
	R: 'static + Send,
	E: Executor,
{
	/// Creates a new signal without listeners that posts to `executor`.
	#[must_use]
	pub fn new(executor: E) -> Self {
		Self {
			core: Arc::new(DropCore {
				executor,
				working_set: Mutex::new(WorkingSet {
					listeners: SlotMap::with_key(),
					to_remove: Vec::new(),
				}),
			}),
		}
	}

	/// How many listeners are executing right now.
	#[must_use]
	pub fn running(&self) -> usize {
		self.core.working_set.lock().running()
	}

	/// Creates a separate signal with the same (connected) listeners and executor.
	///
	/// All listeners start out idle in the duplicate, even if they are executing for `self`.
	#[must_use]
	pub fn duplicate(&self) -> Self {
		let duplicate = Self::new(self.core.executor.clone());
		{
			let source = self.core.working_set.lock();
			let mut target = duplicate.core.working_set.lock();
			for (key, entry) in &source.listeners {
				if !source.to_remove.contains(&key) {
					target.listeners.insert(WorkingEntry {
						listener: Arc::clone(&entry.listener),
						executing: false,
					});
				}
			}
		}
		duplicate
	}

	/// Moves all of `other`'s listeners into `self`, replacing `self`'s.
	///
	/// Existing [`Connection`]s of both signals become no-ops.
	///
	/// # Errors
	///
	/// Iff any listener of either signal is executing, with nothing changed.
	pub fn try_take_from(&self, other: &Self) -> Result<(), Error> {
		if Arc::ptr_eq(&self.core, &other.core) {
			return Ok(());
		}

		let (replaced, moved) = {
			// Lock in address order, so that two opposing transfers can't deadlock.
			let (mut target, mut source) = if Arc::as_ptr(&self.core) < Arc::as_ptr(&other.core) {
				let target = self.core.working_set.lock();
				(target, other.core.working_set.lock())
			} else {
				let source = other.core.working_set.lock();
				(self.core.working_set.lock(), source)
			};

			let running = target.running() + source.running();
			if running > 0 {
				tracing::warn!(running, "Refused to transfer listeners while they are executing.");
				return Err(Error::InFlight { running });
			}

			// `drain` (unlike replacing the map) retires the keys, so old connections stay inert.
			let replaced: Vec<_> = target.listeners.drain().map(|(_, entry)| entry).collect();
			target.to_remove.clear();
			let source = &mut *source;
			let mut moved = 0_usize;
			for (key, entry) in source.listeners.drain() {
				if !source.to_remove.contains(&key) {
					target.listeners.insert(entry);
					moved += 1;
				}
			}
			source.to_remove.clear();
			(replaced, moved)
		};

		tracing::debug!(moved, replaced = replaced.len(), "Transferred listeners.");
		drop(replaced);
		Ok(())
	}
}

impl<A, R, E> AsyncSignal<A, R> for DropSignal<A, R, E>
where
	A: 'static + Send + Sync,
	R: 'static + Send,
	E: Executor,
{
	type Executor = E;

	fn with_executor(executor: E) -> Self {
		Self::new(executor)
	}

	fn executor(&self) -> &E {
		&self.core.executor
	}

	fn connect(&self, listener: impl 'static + Send + Sync + Fn(&A) -> R) -> Connection {
		let key = self.core.working_set.lock().listeners.insert(WorkingEntry {
			listener: Arc::new(listener),
			executing: false,
		});
		tracing::trace!(?key, "Listener connected.");

		let core = Arc::downgrade(&self.core);
		Connection::new(move || {
			if let Some(core) = core.upgrade() {
				core.disconnect(key);
			}
		})
	}

	/// Excludes listeners disconnected while executing, even before they are swept.
	fn len(&self) -> usize {
		let working_set = self.core.working_set.lock();
		working_set
			.listeners
			.keys()
			.filter(|key| !working_set.to_remove.contains(key))
			.count()
	}

	/// Idle listeners are removed immediately, executing ones once they finish.
	fn disconnect_all(&self) {
		let mut removed = Vec::new();
		{
			let mut guard = self.core.working_set.lock();
			let working_set = &mut *guard;
			let to_remove = &mut working_set.to_remove;
			working_set.listeners.retain(|key, entry| {
				if entry.executing {
					if !to_remove.contains(&key) {
						to_remove.push(key);
					}
					true
				} else {
					removed.push(Arc::clone(&entry.listener));
					false
				}
			});
			let listeners = &working_set.listeners;
			to_remove.retain(|key| listeners.contains_key(*key));
		}
		tracing::trace!(removed = removed.len(), "Disconnected all listeners.");
	}

	fn publish(&self, args: &A) -> Vec<R> {
		publish_inline(self.core.prune_and_get_pending(), args)
	}

	fn async_publish_shared(&self, args: Arc<A>) {
		post_all(&self.core.executor, self.core.prune_and_get_pending(), &args);
	}

	fn async_publish_with(&self, args: A, completion: impl Completion<()>) {
		publish_void(&self.core.executor, self.core.prune_and_get_pending(), args, completion);
	}

	fn async_publish_collect(&self, args: A, completion: impl Completion<Vec<R>>) {
		publish_collect(&self.core.executor, self.core.prune_and_get_pending(), args, completion);
	}
}
