#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;

use futures::{SinkExt as _, StreamExt as _};
use parley_client_core::{ChatSession, ClientConfig};
use parley_domain::DisplayName;
use parley_protocol::{DEFAULT_MAX_FRAME_SIZE, PresencePayload, ServerEvent, decode_frame};
use parley_util::endpoint::WsEndpoint;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use crate::server::connection::ConnectionSettings;
use crate::server::hub::{HubConfig, spawn_event_hub};
use crate::server::listener::serve;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

static LOG_INIT: OnceLock<()> = OnceLock::new();

fn init_test_logging() {
	LOG_INIT.get_or_init(|| {
		if std::env::var_os("PARLEY_TEST_LOG").is_none() {
			return;
		}

		let _ = tracing_subscriber::fmt()
			.with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "debug".to_string()))
			.with_target(false)
			.try_init();
	});
}

async fn start_server() -> SocketAddr {
	init_test_logging();

	let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
	let addr = listener.local_addr().expect("local addr");
	let hub = spawn_event_hub(HubConfig::default());

	tokio::spawn(async move {
		if let Err(e) = serve(listener, hub, ConnectionSettings::default(), std::future::pending::<()>()).await {
			tracing::error!(error = %e, "test server exited");
		}
	});

	addr
}

fn client_config(addr: SocketAddr) -> ClientConfig {
	ClientConfig {
		endpoint: WsEndpoint {
			host: addr.ip().to_string(),
			port: addr.port(),
		},
		..ClientConfig::default()
	}
}

fn name(s: &str) -> DisplayName {
	DisplayName::new(s).expect("valid DisplayName")
}

fn roster(names: &[&str]) -> ServerEvent {
	ServerEvent::UserList(names.iter().map(|n| name(n)).collect())
}

async fn recv(session: &mut ChatSession) -> ServerEvent {
	tokio::time::timeout(RECV_TIMEOUT, session.next_event())
		.await
		.expect("timed out waiting for event")
		.expect("next_event failed")
		.expect("connection closed unexpectedly")
}

fn joined_name(ev: &ServerEvent) -> Option<&DisplayName> {
	match ev {
		ServerEvent::UserJoined(PresencePayload { username, .. }) => Some(username),
		_ => None,
	}
}

#[tokio::test]
async fn alice_and_bob_chat_over_websockets() {
	let addr = start_server().await;
	let cfg = client_config(addr);

	let mut alice = ChatSession::connect(&cfg).await.expect("alice connect");
	assert_eq!(recv(&mut alice).await, roster(&[]));

	alice.join("alice").await.expect("alice join");
	let ev = recv(&mut alice).await;
	assert_eq!(joined_name(&ev), Some(&name("alice")));
	assert_eq!(recv(&mut alice).await, roster(&["alice"]));

	let mut bob = ChatSession::connect(&cfg).await.expect("bob connect");
	assert_eq!(recv(&mut bob).await, roster(&["alice"]));

	bob.join("bob").await.expect("bob join");
	for session in [&mut alice, &mut bob] {
		let ev = recv(session).await;
		assert_eq!(joined_name(&ev), Some(&name("bob")));
		assert_eq!(recv(session).await, roster(&["alice", "bob"]));
	}

	alice.send_message("hi").await.expect("alice send");
	for session in [&mut alice, &mut bob] {
		match recv(session).await {
			ServerEvent::Message(m) => {
				assert_eq!(m.username, name("alice"));
				assert_eq!(m.text, "hi");
				assert!(m.timestamp.ends_with('Z'), "timestamp is UTC ISO-8601: {}", m.timestamp);
			}
			other => panic!("expected message, got {other:?}"),
		}
	}

	bob.close().await.expect("bob close");

	match recv(&mut alice).await {
		ServerEvent::UserLeft(p) => assert_eq!(p.username, name("bob")),
		other => panic!("expected userLeft, got {other:?}"),
	}
	assert_eq!(recv(&mut alice).await, roster(&["alice"]));
}

#[tokio::test]
async fn malformed_frames_do_not_end_the_session() {
	let addr = start_server().await;

	let url = format!("ws://{addr}/");
	let (mut raw, _) = tokio_tungstenite::connect_async(url.as_str()).await.expect("raw connect");

	let first = tokio::time::timeout(RECV_TIMEOUT, raw.next())
		.await
		.expect("timeout")
		.expect("stream ended")
		.expect("read");
	assert_eq!(first, Message::Text(r#"{"event":"userList","data":[]}"#.to_string().into()));

	for garbage in ["not json", r#"{"event":"dance","data":null}"#, r#"{"event":"join","data":"  "}"#] {
		raw.send(Message::Text(garbage.to_string().into())).await.expect("send garbage");
	}
	raw.send(Message::Binary(vec![1, 2, 3].into())).await.expect("send binary");
	raw.send(Message::Text(r#"{"event":"join","data":"dave"}"#.to_string().into()))
		.await
		.expect("send join");

	let next = tokio::time::timeout(RECV_TIMEOUT, raw.next())
		.await
		.expect("timeout")
		.expect("stream ended")
		.expect("read");
	let text = match next {
		Message::Text(text) => text,
		other => panic!("expected text frame, got {other:?}"),
	};
	let ev: ServerEvent = decode_frame(text.as_str(), DEFAULT_MAX_FRAME_SIZE).expect("server frame is valid JSON");
	assert_eq!(joined_name(&ev), Some(&name("dave")), "blank join was ignored, valid join accepted");
}

#[tokio::test]
async fn unjoined_disconnect_is_silent() {
	let addr = start_server().await;
	let cfg = client_config(addr);

	let mut alice = ChatSession::connect(&cfg).await.expect("alice connect");
	assert_eq!(recv(&mut alice).await, roster(&[]));
	alice.join("alice").await.expect("alice join");
	recv(&mut alice).await;
	recv(&mut alice).await;

	let mut lurker = ChatSession::connect(&cfg).await.expect("lurker connect");
	assert_eq!(recv(&mut lurker).await, roster(&["alice"]));
	lurker.close().await.expect("lurker close");

	alice.send_message("still here").await.expect("send");
	match recv(&mut alice).await {
		ServerEvent::Message(m) => assert_eq!(m.text, "still here"),
		other => panic!("expected only alice's own message, got {other:?}"),
	}
}

#[tokio::test]
async fn near_limit_message_is_echoed_to_everyone() {
	let addr = start_server().await;
	let cfg = client_config(addr);

	let mut alice = ChatSession::connect(&cfg).await.expect("alice connect");
	recv(&mut alice).await;
	alice.join("alice").await.expect("alice join");
	recv(&mut alice).await;
	recv(&mut alice).await;

	let mut bob = ChatSession::connect(&cfg).await.expect("bob connect");
	recv(&mut bob).await;

	// Fits the client frame limit; the broadcast adds id, username and timestamp on top.
	let text = "x".repeat(DEFAULT_MAX_FRAME_SIZE - 100);
	alice.send_message(&text).await.expect("alice send");

	for session in [&mut alice, &mut bob] {
		match recv(session).await {
			ServerEvent::Message(m) => assert_eq!(m.text.len(), text.len()),
			other => panic!("expected message, got {other:?}"),
		}
	}
}

#[tokio::test]
async fn roster_larger_than_client_frame_limit_is_delivered() {
	let addr = start_server().await;
	let cfg = client_config(addr);
	let long_a = "a".repeat(40_000);
	let long_b = "b".repeat(40_000);

	let mut a = ChatSession::connect(&cfg).await.expect("a connect");
	recv(&mut a).await;
	a.join(&long_a).await.expect("a join");
	recv(&mut a).await;
	assert_eq!(recv(&mut a).await, roster(&[long_a.as_str()]));

	let mut b = ChatSession::connect(&cfg).await.expect("b connect");
	assert_eq!(recv(&mut b).await, roster(&[long_a.as_str()]));
	b.join(&long_b).await.expect("b join");

	for session in [&mut a, &mut b] {
		let ev = recv(session).await;
		assert_eq!(joined_name(&ev), Some(&name(&long_b)));
		assert_eq!(recv(session).await, roster(&[long_a.as_str(), long_b.as_str()]));
	}

	let mut late = ChatSession::connect(&cfg).await.expect("late connect");
	assert_eq!(recv(&mut late).await, roster(&[long_a.as_str(), long_b.as_str()]), "initial roster reaches a newcomer");
}
