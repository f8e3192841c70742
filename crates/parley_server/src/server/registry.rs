#![forbid(unsafe_code)]

use indexmap::IndexMap;
use parley_domain::{ConnectionId, DisplayName};

/// Joined users keyed by connection id, in join order.
///
/// Owned by the broadcaster; no internal locking.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
	users: IndexMap<ConnectionId, DisplayName>,
}

impl ConnectionRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Insert or overwrite the entry for `conn_id`.
	///
	/// Re-registering keeps the original roster position and replaces the name.
	/// Returns the previous name, if any.
	pub fn register(&mut self, conn_id: ConnectionId, name: DisplayName) -> Option<DisplayName> {
		self.users.insert(conn_id, name)
	}

	/// Remove the entry for `conn_id`, returning its name.
	///
	/// `None` means the connection never joined. Remaining entries keep their order.
	pub fn unregister(&mut self, conn_id: &ConnectionId) -> Option<DisplayName> {
		self.users.shift_remove(conn_id)
	}

	/// Current roster, in join order.
	pub fn snapshot(&self) -> Vec<DisplayName> {
		self.users.values().cloned().collect()
	}

	/// Name of a joined connection, resolved at call time.
	pub fn display_name(&self, conn_id: &ConnectionId) -> Option<&DisplayName> {
		self.users.get(conn_id)
	}

	#[allow(dead_code)]
	pub fn contains(&self, conn_id: &ConnectionId) -> bool {
		self.users.contains_key(conn_id)
	}

	pub fn len(&self) -> usize {
		self.users.len()
	}

	#[allow(dead_code)]
	pub fn is_empty(&self) -> bool {
		self.users.is_empty()
	}
}
