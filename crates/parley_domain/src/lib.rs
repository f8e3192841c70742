#![forbid(unsafe_code)]

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors for validating client-supplied values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
	#[error("empty value")]
	Empty,
	#[error("invalid connection id: {0}")]
	InvalidConnectionId(String),
}

/// True for empty or whitespace-only input.
#[inline]
pub fn is_blank(s: &str) -> bool {
	s.trim().is_empty()
}

/// Identity of one live transport session.
///
/// Valid only for the lifetime of that session: a reconnecting client gets a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub uuid::Uuid);

impl ConnectionId {
	/// Allocate a fresh random connection id.
	pub fn new_v4() -> Self {
		Self(uuid::Uuid::new_v4())
	}

	pub fn as_uuid(&self) -> &uuid::Uuid {
		&self.0
	}
}

impl fmt::Display for ConnectionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for ConnectionId {
	type Err = ValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.is_empty() {
			return Err(ValidationError::Empty);
		}
		uuid::Uuid::parse_str(s)
			.map(Self)
			.map_err(|_| ValidationError::InvalidConnectionId(s.to_string()))
	}
}

/// Name a user chose when joining.
///
/// Only blank names are rejected; uniqueness and content are not checked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DisplayName(String);

impl DisplayName {
	/// Create a non-blank `DisplayName`. The text is kept as given.
	pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
		let name = name.into();
		if is_blank(&name) {
			return Err(ValidationError::Empty);
		}
		Ok(Self(name))
	}
	pub fn as_str(&self) -> &str {
		&self.0
	}
	pub fn into_string(self) -> String {
		self.0
	}
}

impl fmt::Display for DisplayName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for DisplayName {
	type Err = ValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		DisplayName::new(s.to_string())
	}
}

impl TryFrom<String> for DisplayName {
	type Error = ValidationError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		DisplayName::new(value)
	}
}

impl From<DisplayName> for String {
	fn from(value: DisplayName) -> Self {
		value.0
	}
}

/// Protocol state of a connection.
///
/// `Connected -> Joined -> Closed`, or `Connected -> Closed` for a session that never joined.
/// `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
	Connected,
	Joined,
	Closed,
}

impl ConnectionState {
	/// Stable string identifier.
	pub const fn as_str(self) -> &'static str {
		match self {
			ConnectionState::Connected => "connected",
			ConnectionState::Joined => "joined",
			ConnectionState::Closed => "closed",
		}
	}

	/// State after an accepted join, or `None` when the connection is already closed.
	///
	/// A second join from a joined connection stays `Joined` (rename).
	pub const fn on_join(self) -> Option<Self> {
		match self {
			ConnectionState::Connected | ConnectionState::Joined => Some(ConnectionState::Joined),
			ConnectionState::Closed => None,
		}
	}

	/// State after a disconnect, or `None` for a duplicate disconnect.
	pub const fn on_disconnect(self) -> Option<Self> {
		match self {
			ConnectionState::Connected | ConnectionState::Joined => Some(ConnectionState::Closed),
			ConnectionState::Closed => None,
		}
	}

	/// Only joined connections have an attributable sender name.
	pub const fn can_send_message(self) -> bool {
		matches!(self, ConnectionState::Joined)
	}

	pub const fn is_closed(self) -> bool {
		matches!(self, ConnectionState::Closed)
	}
}

impl fmt::Display for ConnectionState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
