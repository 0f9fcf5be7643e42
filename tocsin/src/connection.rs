use std::{
	fmt::{self, Debug, Formatter},
	mem,
	sync::Arc,
};

type Disconnect = Arc<dyn 'static + Send + Sync + Fn()>;

/// A capability to disconnect exactly one listener.
///
/// Dropping a [`Connection`] does **not** disconnect its listener. Use [`ScopedConnection`] for that.
///
/// [`Clone`]s share the capability, but each clone tracks its own
/// [`is_connected`](`Connection::is_connected`) state.
/// A [`Default`] [`Connection`] is inert.
#[derive(Clone, Default)]
pub struct Connection {
	disconnect: Option<Disconnect>,
}

impl Debug for Connection {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Connection")
			.field("connected", &self.is_connected())
			.finish()
	}
}

impl Connection {
	/// Wraps a `disconnect` callback.
	///
	/// # Logic
	///
	/// `disconnect` **should** be idempotent, since clones of this [`Connection`] may each call it once.
	/// It **should** also be a no-op once the registry it refers to is gone.
	pub fn new(disconnect: impl 'static + Send + Sync + Fn()) -> Self {
		Self {
			disconnect: Some(Arc::new(disconnect)),
		}
	}

	/// Removes the listener if it's still registered.
	///
	/// Calling this again is a no-op.
	pub fn disconnect(&mut self) {
		if let Some(disconnect) = self.disconnect.take() {
			disconnect();
		}
	}

	/// Whether this handle can still disconnect, i.e. [`disconnect`](`Connection::disconnect`)
	/// hasn't been called on it yet.
	///
	/// This doesn't track whether the listener is still registered.
	#[must_use]
	pub fn is_connected(&self) -> bool {
		self.disconnect.is_some()
	}

	/// Converts this into a [`ScopedConnection`] that disconnects when dropped.
	pub fn scoped(self) -> ScopedConnection {
		ScopedConnection(self)
	}
}

/// A [`Connection`] that disconnects when dropped. Not [`Clone`].
#[derive(Debug, Default)]
#[must_use = "Dropping a `ScopedConnection` disconnects it immediately."]
pub struct ScopedConnection(Connection);

impl From<Connection> for ScopedConnection {
	fn from(connection: Connection) -> Self {
		connection.scoped()
	}
}

impl ScopedConnection {
	/// Disconnects early.
	pub fn disconnect(&mut self) {
		self.0.disconnect();
	}

	/// See [`Connection::is_connected`].
	#[must_use]
	pub fn is_connected(&self) -> bool {
		self.0.is_connected()
	}

	/// Gives up the scope, so that the listener stays connected after this is dropped.
	pub fn release(mut self) -> Connection {
		mem::take(&mut self.0)
	}
}

impl Drop for ScopedConnection {
	fn drop(&mut self) {
		self.0.disconnect();
	}
}
