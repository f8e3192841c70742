#![forbid(unsafe_code)]

use std::collections::HashMap;

use parley_domain::{ConnectionId, ConnectionState, DisplayName, is_blank};
use parley_protocol::{ChatMessagePayload, PresencePayload, ServerEvent};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::server::registry::ConnectionRegistry;
use crate::util::time::iso8601_now;

/// Sender half of a connection's outbound queue.
pub type OutboundTx = mpsc::Sender<ServerEvent>;

/// Receiver half of a connection's outbound queue, drained by the socket writer.
pub type OutboundRx = mpsc::Receiver<ServerEvent>;

/// Configuration for `Broadcaster`.
#[derive(Debug, Clone)]
pub struct BroadcasterConfig {
	/// Maximum number of queued events per connection before new ones are dropped.
	pub outbound_queue_capacity: usize,

	pub debug_logs: bool,
}

impl Default for BroadcasterConfig {
	fn default() -> Self {
		Self {
			outbound_queue_capacity: 256,
			debug_logs: false,
		}
	}
}

/// Inputs of the per-connection state machine.
#[derive(Debug)]
pub enum InboundEvent {
	/// Transport session established.
	Connected {
		conn_id: ConnectionId,
		outbound: OutboundTx,
	},

	Join {
		conn_id: ConnectionId,
		username: String,
	},

	Message {
		conn_id: ConnectionId,
		text: String,
	},

	/// Transport session ended (clean close or failure).
	Disconnected {
		conn_id: ConnectionId,
	},

	/// Observed only; a later `Disconnected` drives cleanup.
	TransportError {
		conn_id: ConnectionId,
		error: String,
	},
}

impl InboundEvent {
	pub fn conn_id(&self) -> ConnectionId {
		match self {
			InboundEvent::Connected { conn_id, .. }
			| InboundEvent::Join { conn_id, .. }
			| InboundEvent::Message { conn_id, .. }
			| InboundEvent::Disconnected { conn_id }
			| InboundEvent::TransportError { conn_id, .. } => *conn_id,
		}
	}

	pub const fn kind(&self) -> &'static str {
		match self {
			InboundEvent::Connected { .. } => "connected",
			InboundEvent::Join { .. } => "join",
			InboundEvent::Message { .. } => "message",
			InboundEvent::Disconnected { .. } => "disconnected",
			InboundEvent::TransportError { .. } => "transport_error",
		}
	}
}

#[derive(Debug)]
struct Session {
	state: ConnectionState,
	outbound: OutboundTx,
}

/// Protocol state machine and fan-out for the chat.
///
/// Owns the `ConnectionRegistry` and the set of live sessions. Each call to
/// [`Broadcaster::handle`] runs to completion, including every send it decides on,
/// so callers get serialized transitions by feeding it from a single queue.
///
/// Sessions are removed on disconnect, so a connection that reached `Closed` is simply
/// absent and every later event for it is dropped as stale.
#[derive(Debug)]
pub struct Broadcaster {
	cfg: BroadcasterConfig,
	registry: ConnectionRegistry,
	sessions: HashMap<ConnectionId, Session>,
	clock: fn() -> String,
}

impl Broadcaster {
	pub fn new(cfg: BroadcasterConfig) -> Self {
		Self {
			cfg,
			registry: ConnectionRegistry::new(),
			sessions: HashMap::new(),
			clock: iso8601_now,
		}
	}

	/// Replace the timestamp source used for chat messages.
	#[allow(dead_code)]
	pub fn with_clock(mut self, clock: fn() -> String) -> Self {
		self.clock = clock;
		self
	}

	/// Apply one inbound event.
	pub fn handle(&mut self, event: InboundEvent) {
		match event {
			InboundEvent::Connected { conn_id, outbound } => self.on_connect(conn_id, outbound),
			InboundEvent::Join { conn_id, username } => self.on_join(conn_id, username),
			InboundEvent::Message { conn_id, text } => self.on_message(conn_id, text),
			InboundEvent::Disconnected { conn_id } => self.on_disconnect(conn_id),
			InboundEvent::TransportError { conn_id, error } => self.on_transport_error(conn_id, &error),
		}
	}

	/// Current roster, in join order.
	#[allow(dead_code)]
	pub fn roster(&self) -> Vec<DisplayName> {
		self.registry.snapshot()
	}

	/// State of a live connection; `None` once it is closed or if it never connected.
	pub fn connection_state(&self, conn_id: &ConnectionId) -> Option<ConnectionState> {
		self.sessions.get(conn_id).map(|s| s.state)
	}

	/// Number of live transport sessions, joined or not.
	pub fn live_connections(&self) -> usize {
		self.sessions.len()
	}

	#[allow(dead_code)]
	pub fn joined_count(&self) -> usize {
		self.registry.len()
	}

	fn on_connect(&mut self, conn_id: ConnectionId, outbound: OutboundTx) {
		if self.sessions.contains_key(&conn_id) {
			warn!(%conn_id, "duplicate connect for live connection; ignoring");
			ignored("duplicate_connect");
			return;
		}

		self.sessions.insert(
			conn_id,
			Session {
				state: ConnectionState::Connected,
				outbound,
			},
		);
		debug!(%conn_id, live = self.sessions.len(), "connection established");

		self.send_to(&conn_id, ServerEvent::UserList(self.registry.snapshot()));
	}

	fn on_join(&mut self, conn_id: ConnectionId, username: String) {
		let Some(session) = self.sessions.get_mut(&conn_id) else {
			debug!(%conn_id, "join for closed connection; ignoring");
			ignored("stale");
			return;
		};

		let Ok(name) = DisplayName::new(username) else {
			debug!(%conn_id, "join with blank display name; ignoring");
			ignored("blank_name");
			return;
		};

		let Some(next) = session.state.on_join() else {
			ignored("stale");
			return;
		};
		session.state = next;

		match self.registry.register(conn_id, name.clone()) {
			Some(previous) => info!(%conn_id, from = %previous, to = %name, "user renamed by repeated join"),
			None => info!(%conn_id, username = %name, "user joined"),
		}
		metrics::counter!("parley_server_joins_total").increment(1);

		self.broadcast(ServerEvent::UserJoined(PresencePayload {
			id: conn_id,
			username: name,
		}));
		self.broadcast_roster();
	}

	fn on_message(&mut self, conn_id: ConnectionId, text: String) {
		let Some(session) = self.sessions.get(&conn_id) else {
			debug!(%conn_id, "message for closed connection; ignoring");
			ignored("stale");
			return;
		};

		if !session.state.can_send_message() {
			debug!(%conn_id, state = %session.state, "message before join; ignoring");
			ignored("not_joined");
			return;
		}

		if is_blank(&text) {
			debug!(%conn_id, "blank message text; ignoring");
			ignored("blank_text");
			return;
		}

		// Resolved now rather than at join time so a rename is reflected.
		let Some(username) = self.registry.display_name(&conn_id).cloned() else {
			warn!(%conn_id, "joined connection missing from registry; ignoring message");
			ignored("not_joined");
			return;
		};

		if self.cfg.debug_logs {
			debug!(%conn_id, username = %username, len = text.len(), "broadcasting chat message");
		}
		metrics::counter!("parley_server_messages_total").increment(1);

		self.broadcast(ServerEvent::Message(ChatMessagePayload {
			id: conn_id,
			username,
			text,
			timestamp: (self.clock)(),
		}));
	}

	fn on_disconnect(&mut self, conn_id: ConnectionId) {
		let Some(session) = self.sessions.remove(&conn_id) else {
			debug!(%conn_id, "duplicate disconnect; ignoring");
			ignored("stale");
			return;
		};
		debug_assert_eq!(session.state.on_disconnect(), Some(ConnectionState::Closed));

		let Some(name) = self.registry.unregister(&conn_id) else {
			debug!(%conn_id, "connection closed before joining");
			return;
		};

		info!(%conn_id, username = %name, remaining = self.registry.len(), "user left");

		self.broadcast(ServerEvent::UserLeft(PresencePayload {
			id: conn_id,
			username: name,
		}));
		self.broadcast_roster();
	}

	fn on_transport_error(&self, conn_id: ConnectionId, error: &str) {
		let state = self.connection_state(&conn_id);
		warn!(%conn_id, ?state, error = %error, "transport error");
	}

	fn broadcast_roster(&self) {
		self.broadcast(ServerEvent::UserList(self.registry.snapshot()));
	}

	fn send_to(&self, conn_id: &ConnectionId, event: ServerEvent) {
		let Some(session) = self.sessions.get(conn_id) else {
			return;
		};

		if let Err(mpsc::error::TrySendError::Full(ev)) = session.outbound.try_send(event) {
			metrics::counter!("parley_server_outbound_dropped_total").increment(1);
			debug!(%conn_id, event = ev.name(), "outbound queue full; dropped");
		}
	}

	/// Enqueue `event` for every live session at this instant.
	fn broadcast(&self, event: ServerEvent) {
		let mut dropped: u64 = 0;

		for (conn_id, session) in &self.sessions {
			match session.outbound.try_send(event.clone()) {
				Ok(()) => {}
				Err(mpsc::error::TrySendError::Full(_)) => {
					dropped += 1;
					if self.cfg.debug_logs {
						debug!(%conn_id, event = event.name(), "outbound queue full; dropped");
					}
				}
				// Writer already gone; the pending disconnect cleans up.
				Err(mpsc::error::TrySendError::Closed(_)) => {}
			}
		}

		if dropped > 0 {
			metrics::counter!("parley_server_outbound_dropped_total").increment(dropped);
			debug!(
				event = event.name(),
				dropped,
				recipients = self.sessions.len(),
				"broadcast: dropped due to full outbound queues"
			);
		}
	}
}

fn ignored(reason: &'static str) {
	metrics::counter!("parley_server_ignored_events_total", "reason" => reason).increment(1);
}
