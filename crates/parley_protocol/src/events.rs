#![forbid(unsafe_code)]

//! Wire events.
//!
//! Every frame is one JSON object of the form `{"event": <name>, "data": <payload>}`.

use parley_domain::{ConnectionId, DisplayName};
use serde::{Deserialize, Serialize};

/// Events sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
	/// Join the chat under a display name.
	///
	/// Kept as raw text: a blank name is a valid frame that the server ignores.
	Join(String),

	/// Post a chat message.
	Message(MessagePayload),
}

/// Payload of a client `message` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
	pub text: String,
}

/// Events sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
	/// Full roster snapshot, in join order.
	UserList(Vec<DisplayName>),

	UserJoined(PresencePayload),

	UserLeft(PresencePayload),

	/// A chat message, echoed to every session including the sender.
	Message(ChatMessagePayload),
}

impl ServerEvent {
	/// Stable event name as it appears on the wire.
	pub const fn name(&self) -> &'static str {
		match self {
			ServerEvent::UserList(_) => "userList",
			ServerEvent::UserJoined(_) => "userJoined",
			ServerEvent::UserLeft(_) => "userLeft",
			ServerEvent::Message(_) => "message",
		}
	}
}

impl ClientEvent {
	/// Stable event name as it appears on the wire.
	pub const fn name(&self) -> &'static str {
		match self {
			ClientEvent::Join(_) => "join",
			ClientEvent::Message(_) => "message",
		}
	}
}

/// Payload of `userJoined` / `userLeft`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresencePayload {
	pub id: ConnectionId,
	pub username: DisplayName,
}

/// Payload of a server `message` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessagePayload {
	pub id: ConnectionId,
	pub username: DisplayName,
	pub text: String,
	/// Server-assigned ISO-8601 UTC timestamp.
	pub timestamp: String,
}
