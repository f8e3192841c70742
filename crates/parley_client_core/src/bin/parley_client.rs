#![forbid(unsafe_code)]

use anyhow::Context as _;
use parley_client_core::{ChatSession, ClientConfig, DEFAULT_SERVER_ENDPOINT_WS, reconnect};
use parley_domain::{DisplayName, is_blank};
use parley_protocol::ServerEvent;
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tracing::{info, warn};

fn usage_and_exit() -> ! {
	eprintln!(
		"Usage: parley_client --name <name> [--connect ws://host:port]\n\
\n\
Options:\n\
	--connect   Server endpoint (alias: --endpoint) (default: ws://127.0.0.1:5000)\n\
	            Format: ws://host:port\n\
	--name      Display name to join with (required)\n\
	--help      Show this help\n\
\n\
Notes:\n\
	Every line read from stdin is sent as a chat message.\n\
	On connection loss the client reconnects up to 5 times and joins again.\n\
\n\
Examples:\n\
	parley_client --name alice\n\
	parley_client --connect ws://chat.example.com:5000 --name bob\n"
	);
	std::process::exit(2)
}

fn init_tracing() {
	let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,parley_client_core=debug".to_string());
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(false)
		.with_writer(std::io::stderr)
		.init();
}

fn parse_args() -> (ClientConfig, DisplayName) {
	let mut endpoint = DEFAULT_SERVER_ENDPOINT_WS.to_string();
	let mut name: Option<String> = None;

	let mut it = std::env::args().skip(1);
	while let Some(arg) = it.next() {
		match arg.as_str() {
			"--help" | "-h" => usage_and_exit(),
			"--connect" | "--endpoint" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				if v.trim().is_empty() {
					eprintln!("--connect must be non-empty (expected ws://host:port)");
					usage_and_exit();
				}
				endpoint = v;
			}
			"--name" => {
				name = Some(it.next().unwrap_or_else(|| usage_and_exit()));
			}
			other => {
				eprintln!("Unknown argument: {other}");
				usage_and_exit();
			}
		}
	}

	let cfg = ClientConfig::from_ws_endpoint(&endpoint).unwrap_or_else(|e| {
		eprintln!("Invalid --connect value: {endpoint}\n{e}");
		usage_and_exit();
	});

	let name = name.unwrap_or_else(|| {
		eprintln!("--name is required");
		usage_and_exit();
	});
	let name = DisplayName::new(name).unwrap_or_else(|_| {
		eprintln!("--name must be non-empty");
		usage_and_exit();
	});

	(cfg, name)
}

fn print_event(ev: &ServerEvent) {
	match ev {
		ServerEvent::UserList(names) => {
			let names: Vec<&str> = names.iter().map(DisplayName::as_str).collect();
			println!("* online ({}): {}", names.len(), names.join(", "));
		}
		ServerEvent::UserJoined(p) => println!("* {} joined", p.username),
		ServerEvent::UserLeft(p) => println!("* {} left", p.username),
		ServerEvent::Message(m) => println!("[{}] {}: {}", m.timestamp, m.username, m.text),
	}
}

async fn rejoin(cfg: &ClientConfig, name: &DisplayName) -> anyhow::Result<ChatSession> {
	let mut session = reconnect(cfg).await.context("connection lost")?;
	session.join(name.as_str()).await.context("join after reconnect")?;
	Ok(session)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_tracing();
	let (cfg, name) = parse_args();

	info!(endpoint = %cfg.endpoint.url(), username = %name, "connecting");

	let mut session = ChatSession::connect(&cfg).await?;
	session.join(name.as_str()).await?;

	let mut lines = BufReader::new(tokio::io::stdin()).lines();

	loop {
		tokio::select! {
			line = lines.next_line() => match line.context("read stdin")? {
				Some(line) if is_blank(&line) => {}
				Some(line) => {
					if let Err(e) = session.send_message(&line).await {
						warn!(error = %e, "send failed; reconnecting");
						session = rejoin(&cfg, &name).await?;
					}
				}
				None => {
					info!("stdin closed; leaving");
					if let Err(e) = session.close().await {
						warn!(error = %e, "close failed");
					}
					return Ok(());
				}
			},
			ev = session.next_event() => match ev {
				Ok(Some(ev)) => print_event(&ev),
				Ok(None) => {
					warn!("server closed the connection; reconnecting");
					session = rejoin(&cfg, &name).await?;
				}
				Err(e) => {
					warn!(error = %e, "connection error; reconnecting");
					session = rejoin(&cfg, &name).await?;
				}
			},
		}
	}
}
