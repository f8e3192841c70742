#![forbid(unsafe_code)]

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::server::broadcaster::{Broadcaster, BroadcasterConfig, InboundEvent, OutboundRx, OutboundTx};

/// Settings for the event hub.
#[derive(Debug, Clone)]
pub struct HubConfig {
	/// Capacity of the single inbound event queue.
	pub event_queue_capacity: usize,

	pub debug_log_events: bool,

	pub broadcaster: BroadcasterConfig,
}

impl Default for HubConfig {
	fn default() -> Self {
		Self {
			event_queue_capacity: 1024,
			debug_log_events: false,
			broadcaster: BroadcasterConfig::default(),
		}
	}
}

/// Cloneable handle for feeding events into the hub.
#[derive(Debug, Clone)]
pub struct HubHandle {
	events_tx: mpsc::Sender<InboundEvent>,
	outbound_queue_capacity: usize,
}

impl HubHandle {
	/// Enqueue an event. Returns `false` once the hub has stopped.
	pub async fn send(&self, event: InboundEvent) -> bool {
		self.events_tx.send(event).await.is_ok()
	}

	/// Create a per-connection outbound queue.
	pub fn outbound_channel(&self) -> (OutboundTx, OutboundRx) {
		mpsc::channel(self.outbound_queue_capacity)
	}
}

/// Single consumer of every inbound event; owns the `Broadcaster`.
#[derive(Debug)]
pub struct EventHub {
	cfg: HubConfig,
	broadcaster: Broadcaster,
	events_rx: mpsc::Receiver<InboundEvent>,
}

impl EventHub {
	pub fn new(cfg: HubConfig) -> (Self, HubHandle) {
		let (events_tx, events_rx) = mpsc::channel(cfg.event_queue_capacity);
		let handle = HubHandle {
			events_tx,
			outbound_queue_capacity: cfg.broadcaster.outbound_queue_capacity,
		};
		let broadcaster = Broadcaster::new(cfg.broadcaster.clone());

		(
			Self {
				cfg,
				broadcaster,
				events_rx,
			},
			handle,
		)
	}

	/// Run until every `HubHandle` has been dropped.
	pub async fn run(mut self) {
		info!("event hub started");

		while let Some(event) = self.events_rx.recv().await {
			if self.cfg.debug_log_events {
				debug!(conn_id = %event.conn_id(), kind = event.kind(), "hub: processing event");
			}

			self.broadcaster.handle(event);
		}

		info!(
			live = self.broadcaster.live_connections(),
			"event hub exiting (all handles dropped)"
		);
	}
}

/// Spawn the hub task and return a handle to it.
pub fn spawn_event_hub(cfg: HubConfig) -> HubHandle {
	let (hub, handle) = EventHub::new(cfg);

	tokio::spawn(async move {
		hub.run().await;
	});

	handle
}
