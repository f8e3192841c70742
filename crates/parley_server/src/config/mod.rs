#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, anyhow};
use parley_protocol::DEFAULT_MAX_FRAME_SIZE;
use serde::Deserialize;
use tracing::{info, warn};

use crate::server::broadcaster::BroadcasterConfig;
use crate::server::connection::ConnectionSettings;
use crate::server::hub::HubConfig;

/// Default config path: `~/.parley/config.toml`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
	let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
	Ok(home.join(".parley").join("config.toml"))
}

/// Load the server config from TOML and env overrides.
pub fn load_server_config_from_path(path: &Path) -> anyhow::Result<ServerConfig> {
	let file_cfg = read_toml_if_exists(path)
		.with_context(|| format!("read config from {}", path.display()))?
		.unwrap_or_default();

	let mut cfg = ServerConfig::from_file(file_cfg);

	apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());

	Ok(cfg)
}

/// Server config (v1).
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub server: ServerSettings,
}

/// Server settings loaded by the server.
#[derive(Debug, Clone)]
pub struct ServerSettings {
	/// Optional metrics exporter bind address (host:port).
	pub metrics_bind: Option<String>,
	/// Maximum inbound/outbound text frame size.
	pub max_frame_bytes: usize,
	/// Per-connection outbound queue capacity.
	pub outbound_queue_capacity: usize,
	/// Capacity of the hub's inbound event queue.
	pub event_queue_capacity: usize,
	/// Log every hub event at debug level.
	pub debug_log_events: bool,
}

impl Default for ServerSettings {
	fn default() -> Self {
		let hub = HubConfig::default();
		Self {
			metrics_bind: None,
			max_frame_bytes: DEFAULT_MAX_FRAME_SIZE,
			outbound_queue_capacity: hub.broadcaster.outbound_queue_capacity,
			event_queue_capacity: hub.event_queue_capacity,
			debug_log_events: hub.debug_log_events,
		}
	}
}

impl ServerConfig {
	pub fn hub_config(&self) -> HubConfig {
		HubConfig {
			event_queue_capacity: self.server.event_queue_capacity,
			debug_log_events: self.server.debug_log_events,
			broadcaster: BroadcasterConfig {
				outbound_queue_capacity: self.server.outbound_queue_capacity,
				debug_logs: self.server.debug_log_events,
			},
		}
	}

	pub fn connection_settings(&self) -> ConnectionSettings {
		ConnectionSettings {
			max_frame_bytes: self.server.max_frame_bytes,
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
	#[serde(default)]
	server: FileServerSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileServerSettings {
	metrics_bind: Option<String>,
	max_frame_bytes: Option<usize>,
	outbound_queue_capacity: Option<usize>,
	event_queue_capacity: Option<usize>,
	debug_log_events: Option<bool>,
}

impl ServerConfig {
	fn from_file(file: FileConfig) -> Self {
		let defaults = ServerSettings::default();

		Self {
			server: ServerSettings {
				metrics_bind: file.server.metrics_bind.filter(|s| !s.trim().is_empty()),
				max_frame_bytes: file
					.server
					.max_frame_bytes
					.filter(|v| *v > 0)
					.unwrap_or(defaults.max_frame_bytes),
				outbound_queue_capacity: file
					.server
					.outbound_queue_capacity
					.filter(|v| *v > 0)
					.unwrap_or(defaults.outbound_queue_capacity),
				event_queue_capacity: file
					.server
					.event_queue_capacity
					.filter(|v| *v > 0)
					.unwrap_or(defaults.event_queue_capacity),
				debug_log_events: file.server.debug_log_events.unwrap_or(defaults.debug_log_events),
			},
		}
	}
}

fn parse_env_bool(v: &str) -> Option<bool> {
	match v.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Some(true),
		"0" | "false" | "no" | "off" => Some(false),
		_ => None,
	}
}

fn parse_env_capacity(v: &str) -> Option<usize> {
	v.trim().parse::<usize>().ok().filter(|n| *n > 0)
}

fn read_toml_if_exists(path: &Path) -> anyhow::Result<Option<FileConfig>> {
	match fs::read_to_string(path) {
		Ok(s) => {
			let cfg: FileConfig = toml::from_str(&s).context("parse TOML")?;
			Ok(Some(cfg))
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(anyhow!(e).context("read config file")),
	}
}

fn apply_env_overrides(cfg: &mut ServerConfig, env: impl Fn(&str) -> Option<String>) {
	if let Some(v) = env("PARLEY_METRICS_BIND") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.server.metrics_bind = Some(v);
			info!("server config: metrics_bind overridden by env");
		}
	}

	if let Some(v) = env("PARLEY_MAX_FRAME_BYTES") {
		match parse_env_capacity(&v) {
			Some(bytes) => {
				cfg.server.max_frame_bytes = bytes;
				info!(bytes, "server config: max_frame_bytes overridden by env");
			}
			None => warn!(value = %v, "server config: ignoring invalid PARLEY_MAX_FRAME_BYTES"),
		}
	}

	if let Some(v) = env("PARLEY_OUTBOUND_QUEUE_CAPACITY") {
		match parse_env_capacity(&v) {
			Some(capacity) => {
				cfg.server.outbound_queue_capacity = capacity;
				info!(capacity, "server config: outbound_queue_capacity overridden by env");
			}
			None => warn!(value = %v, "server config: ignoring invalid PARLEY_OUTBOUND_QUEUE_CAPACITY"),
		}
	}

	if let Some(v) = env("PARLEY_EVENT_QUEUE_CAPACITY") {
		match parse_env_capacity(&v) {
			Some(capacity) => {
				cfg.server.event_queue_capacity = capacity;
				info!(capacity, "server config: event_queue_capacity overridden by env");
			}
			None => warn!(value = %v, "server config: ignoring invalid PARLEY_EVENT_QUEUE_CAPACITY"),
		}
	}

	if let Some(v) = env("PARLEY_DEBUG_LOG_EVENTS")
		&& let Some(enabled) = parse_env_bool(&v)
	{
		cfg.server.debug_log_events = enabled;
		info!(enabled, "server config: debug_log_events overridden by env");
	}
}
