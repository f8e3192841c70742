#![forbid(unsafe_code)]

use std::time::Duration;

use futures::{SinkExt as _, StreamExt as _};
use parley_domain::{DisplayName, ValidationError, is_blank};
use parley_protocol::{
	ClientEvent, DEFAULT_MAX_FRAME_SIZE, MAX_SERVER_FRAME_SIZE, MessagePayload, ProtocolError, ServerEvent, decode_frame,
	encode_frame,
};
use parley_util::endpoint::WsEndpoint;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

/// Default server endpoint for the standalone client.
pub const DEFAULT_SERVER_ENDPOINT_WS: &str = "ws://127.0.0.1:5000";

/// Bounded reconnection schedule: a fixed delay before each of `max_attempts` tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
	pub max_attempts: u32,
	pub delay: Duration,
}

impl ReconnectPolicy {
	/// Delay before the 1-based `attempt`, or `None` once attempts are exhausted.
	pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
		(attempt >= 1 && attempt <= self.max_attempts).then_some(self.delay)
	}
}

impl Default for ReconnectPolicy {
	fn default() -> Self {
		Self {
			max_attempts: 5,
			delay: Duration::from_secs(1),
		}
	}
}

/// Client session configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
	/// Remote server endpoint.
	pub endpoint: WsEndpoint,

	/// Maximum size of a frame this client sends.
	pub max_frame_bytes: usize,

	/// Maximum size of a server event frame; rosters and wrapped messages exceed `max_frame_bytes`.
	pub max_server_frame_bytes: usize,

	/// Timeout for TCP connect + WebSocket handshake.
	pub connect_timeout: Duration,

	pub reconnect: ReconnectPolicy,
}

impl ClientConfig {
	/// Create a config from `ws://host:port`, defaults for everything else.
	pub fn from_ws_endpoint(endpoint: &str) -> Result<Self, ClientCoreError> {
		let endpoint = WsEndpoint::parse(endpoint)
			.map_err(|msg| ClientCoreError::InvalidEndpoint(format!("expected ws://host:port: {msg}")))?;
		Ok(Self {
			endpoint,
			..Self::default()
		})
	}
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			endpoint: WsEndpoint {
				host: "127.0.0.1".to_string(),
				port: 5000,
			},
			max_frame_bytes: DEFAULT_MAX_FRAME_SIZE,
			max_server_frame_bytes: MAX_SERVER_FRAME_SIZE,
			connect_timeout: Duration::from_secs(10),
			reconnect: ReconnectPolicy::default(),
		}
	}
}

/// Errors for client core operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientCoreError {
	#[error("invalid endpoint: {0}")]
	InvalidEndpoint(String),

	/// Connection establishment failed.
	#[error("failed to connect: {0}")]
	Connect(String),

	#[error("timed out after {0:?}")]
	Timeout(Duration),

	/// Frame encode/decode error.
	#[error(transparent)]
	Protocol(#[from] ProtocolError),

	/// WebSocket I/O error.
	#[error("websocket error: {0}")]
	WebSocket(String),

	/// Blank name or message text rejected before sending.
	#[error("invalid input: {0}")]
	Validation(#[from] ValidationError),

	#[error("gave up reconnecting after {attempts} attempts")]
	ReconnectExhausted { attempts: u32 },
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One live connection to the chat server.
///
/// Each session is a fresh identity on the server side; a reconnected session starts un-joined.
pub struct ChatSession {
	ws: WsStream,
	max_frame_bytes: usize,
	max_server_frame_bytes: usize,
}

impl ChatSession {
	/// Connect and complete the WebSocket handshake.
	pub async fn connect(cfg: &ClientConfig) -> Result<Self, ClientCoreError> {
		let url = cfg.endpoint.url();
		let connect_timeout = cfg.connect_timeout;

		let (ws, _response) = tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(url.as_str()))
			.await
			.map_err(|_| ClientCoreError::Timeout(connect_timeout))?
			.map_err(|e| ClientCoreError::Connect(format!("{url}: {e}")))?;

		info!(%url, "connected");

		Ok(Self {
			ws,
			max_frame_bytes: cfg.max_frame_bytes,
			max_server_frame_bytes: cfg.max_server_frame_bytes,
		})
	}

	/// Announce a display name. Calling it again renames this session.
	pub async fn join(&mut self, name: &str) -> Result<(), ClientCoreError> {
		let name = DisplayName::new(name)?;
		debug!(username = %name, "sending join");
		self.send(&ClientEvent::Join(name.into_string())).await
	}

	/// Post a chat message; the text is sent verbatim.
	pub async fn send_message(&mut self, text: &str) -> Result<(), ClientCoreError> {
		if is_blank(text) {
			return Err(ValidationError::Empty.into());
		}
		self.send(&ClientEvent::Message(MessagePayload { text: text.to_string() }))
			.await
	}

	/// Next server event, or `None` once the server closed the connection.
	///
	/// Control frames are skipped; binary frames are logged and skipped.
	pub async fn next_event(&mut self) -> Result<Option<ServerEvent>, ClientCoreError> {
		loop {
			let msg = match self.ws.next().await {
				Some(Ok(msg)) => msg,
				Some(Err(e)) => return Err(ClientCoreError::WebSocket(e.to_string())),
				None => return Ok(None),
			};

			match msg {
				Message::Text(text) => {
					let ev: ServerEvent = decode_frame(text.as_str(), self.max_server_frame_bytes)?;
					debug!(event = ev.name(), "received event");
					return Ok(Some(ev));
				}
				Message::Close(frame) => {
					debug!(?frame, "server closed connection");
					return Ok(None);
				}
				Message::Binary(bytes) => warn!(len = bytes.len(), "ignoring binary frame"),
				_ => {}
			}
		}
	}

	/// Send a close frame and flush it.
	pub async fn close(mut self) -> Result<(), ClientCoreError> {
		self.ws
			.close(None)
			.await
			.map_err(|e| ClientCoreError::WebSocket(e.to_string()))
	}

	async fn send(&mut self, ev: &ClientEvent) -> Result<(), ClientCoreError> {
		let frame = encode_frame(ev, self.max_frame_bytes)?;
		self.ws
			.send(Message::Text(frame.into()))
			.await
			.map_err(|e| ClientCoreError::WebSocket(e.to_string()))
	}
}

/// Open a new session following `cfg.reconnect`, sleeping before every attempt.
pub async fn reconnect(cfg: &ClientConfig) -> Result<ChatSession, ClientCoreError> {
	let mut attempt = 0u32;
	loop {
		attempt += 1;
		let Some(delay) = cfg.reconnect.delay_for(attempt) else {
			return Err(ClientCoreError::ReconnectExhausted { attempts: attempt - 1 });
		};

		tokio::time::sleep(delay).await;

		match ChatSession::connect(cfg).await {
			Ok(session) => {
				info!(attempt, "reconnected");
				return Ok(session);
			}
			Err(e) => warn!(attempt, max_attempts = cfg.reconnect.max_attempts, error = %e, "reconnect attempt failed"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_config_is_sane() {
		let cfg = ClientConfig::default();
		assert_eq!(cfg.endpoint.url(), format!("{DEFAULT_SERVER_ENDPOINT_WS}/"));
		assert!(cfg.max_frame_bytes > 0);
		assert!(cfg.max_server_frame_bytes > cfg.max_frame_bytes);
		assert_eq!(cfg.reconnect.max_attempts, 5);
	}

	#[test]
	fn from_ws_endpoint_rejects_other_schemes() {
		assert!(matches!(
			ClientConfig::from_ws_endpoint("quic://127.0.0.1:5000"),
			Err(ClientCoreError::InvalidEndpoint(_))
		));

		let cfg = ClientConfig::from_ws_endpoint("ws://localhost:8080").expect("valid endpoint");
		assert_eq!(cfg.endpoint.host, "localhost");
		assert_eq!(cfg.endpoint.port, 8080);
	}
}
