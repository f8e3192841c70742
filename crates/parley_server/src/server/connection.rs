#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use futures::stream::SplitStream;
use futures::{SinkExt as _, StreamExt as _};
use parley_domain::ConnectionId;
use parley_protocol::framing::{DEFAULT_MAX_FRAME_SIZE, MAX_SERVER_FRAME_SIZE, decode_frame, encode_frame};
use parley_protocol::{ClientEvent, ServerEvent};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::server::broadcaster::{InboundEvent, OutboundRx};
use crate::server::hub::HubHandle;

/// How long to wait for the writer to flush after the session is closed.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = WebSocketStream<TcpStream>;

/// Per-connection settings.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
	/// Maximum size of a client text frame. Server events are bounded by `MAX_SERVER_FRAME_SIZE`.
	pub max_frame_bytes: usize,
}

impl Default for ConnectionSettings {
	fn default() -> Self {
		Self {
			max_frame_bytes: DEFAULT_MAX_FRAME_SIZE,
		}
	}
}

/// Drive one WebSocket client from handshake to close.
///
/// Enqueues `Connected` before reading any client frame and always finishes with exactly one
/// `Disconnected`, whatever ended the session.
pub async fn handle_connection(
	stream: TcpStream,
	remote: SocketAddr,
	hub: HubHandle,
	settings: ConnectionSettings,
) -> anyhow::Result<()> {
	let ws = match tokio_tungstenite::accept_async(stream).await {
		Ok(ws) => ws,
		Err(e) => {
			metrics::counter!("parley_server_handshake_failures_total").increment(1);
			return Err(anyhow!(e).context("websocket handshake"));
		}
	};

	struct ConnectionGaugeGuard;
	impl Drop for ConnectionGaugeGuard {
		fn drop(&mut self) {
			metrics::gauge!("parley_server_active_connections").decrement(1.0);
		}
	}

	metrics::gauge!("parley_server_active_connections").increment(1.0);
	let _conn_guard = ConnectionGaugeGuard;

	let conn_id = ConnectionId::new_v4();
	info!(%conn_id, %remote, "accepted websocket connection");

	let (sink, mut frames) = ws.split();
	let (outbound_tx, outbound_rx) = hub.outbound_channel();

	if !hub
		.send(InboundEvent::Connected {
			conn_id,
			outbound: outbound_tx,
		})
		.await
	{
		return Err(anyhow!("event hub stopped"));
	}

	let writer = tokio::spawn(write_events(conn_id, sink, outbound_rx));

	let result = read_frames(conn_id, &mut frames, &hub, &settings).await;

	// The hub drops this connection's outbound sender on disconnect, which ends the writer.
	if !hub.send(InboundEvent::Disconnected { conn_id }).await {
		debug!(%conn_id, "event hub already stopped; disconnect not delivered");
	}

	drain_writer(conn_id, writer, WRITER_DRAIN_TIMEOUT).await;

	info!(%conn_id, "connection closed");

	result
}

async fn read_frames(
	conn_id: ConnectionId,
	frames: &mut SplitStream<WsStream>,
	hub: &HubHandle,
	settings: &ConnectionSettings,
) -> anyhow::Result<()> {
	while let Some(msg) = frames.next().await {
		let text = match msg {
			Ok(Message::Text(text)) => text,
			Ok(Message::Close(frame)) => {
				debug!(%conn_id, ?frame, "client closed websocket");
				break;
			}
			Ok(Message::Binary(data)) => {
				debug!(%conn_id, len = data.len(), "ignoring binary frame");
				metrics::counter!("parley_server_frame_decode_errors_total").increment(1);
				continue;
			}
			Ok(_) => continue,
			Err(e) => {
				let error = e.to_string();
				hub.send(InboundEvent::TransportError { conn_id, error }).await;
				return Err(anyhow!(e).context("websocket read failed"));
			}
		};

		metrics::counter!("parley_server_frames_in_total").increment(1);

		let event = match decode_frame::<ClientEvent>(text.as_str(), settings.max_frame_bytes) {
			Ok(ev) => ev,
			Err(e) => {
				metrics::counter!("parley_server_frame_decode_errors_total").increment(1);
				debug!(%conn_id, error = %e, "ignoring malformed frame");
				continue;
			}
		};

		let inbound = match event {
			ClientEvent::Join(username) => InboundEvent::Join { conn_id, username },
			ClientEvent::Message(payload) => InboundEvent::Message {
				conn_id,
				text: payload.text,
			},
		};

		if !hub.send(inbound).await {
			return Err(anyhow!("event hub stopped"));
		}
	}

	Ok(())
}

/// Wait for the writer to flush; abort it if the peer stopped reading.
///
/// An aborted writer drops its half of the socket, so a stalled peer cannot pin it.
async fn drain_writer(conn_id: ConnectionId, mut writer: JoinHandle<()>, timeout: Duration) {
	match tokio::time::timeout(timeout, &mut writer).await {
		Ok(Ok(())) => {}
		Ok(Err(e)) => warn!(%conn_id, error = %e, "writer task failed"),
		Err(_) => {
			debug!(%conn_id, "writer did not finish in time; aborting");
			writer.abort();
		}
	}
}

async fn write_events(
	conn_id: ConnectionId,
	mut sink: futures::stream::SplitSink<WsStream, Message>,
	mut outbound_rx: OutboundRx,
) {
	while let Some(event) = outbound_rx.recv().await {
		let text = match encode_frame::<ServerEvent>(&event, MAX_SERVER_FRAME_SIZE) {
			Ok(text) => text,
			Err(e) => {
				warn!(%conn_id, event = event.name(), error = %e, "failed to encode outbound event; skipping");
				continue;
			}
		};

		if let Err(e) = sink.send(Message::Text(text.into())).await {
			debug!(%conn_id, error = %e, "websocket write failed; stopping writer");
			return;
		}
	}

	if let Err(e) = sink.close().await.context("close websocket") {
		debug!(%conn_id, error = %e, "websocket close failed");
	}
}
