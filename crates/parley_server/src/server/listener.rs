#![forbid(unsafe_code)]

use std::future::Future;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::server::connection::{ConnectionSettings, handle_connection};
use crate::server::hub::HubHandle;

/// Pause after a failed `accept()`; errors such as EMFILE repeat until descriptors free up.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Accept TCP connections and spawn a WebSocket handler for each until `shutdown` resolves.
pub async fn serve(
	listener: TcpListener,
	hub: HubHandle,
	settings: ConnectionSettings,
	shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
	let local = listener.local_addr()?;
	info!(addr = %local, "parley_server: websocket listener ready");

	tokio::pin!(shutdown);

	loop {
		let (stream, remote) = tokio::select! {
			accepted = listener.accept() => match accepted {
				Ok(pair) => pair,
				Err(e) => {
					warn!(error = %e, backoff = ?ACCEPT_ERROR_BACKOFF, "accept failed");
					tokio::select! {
						_ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => continue,
						_ = &mut shutdown => {
							info!("listener shutting down");
							break;
						}
					}
				}
			},
			_ = &mut shutdown => {
				info!("listener shutting down");
				break;
			}
		};

		metrics::counter!("parley_server_connections_total").increment(1);

		if let Err(e) = stream.set_nodelay(true) {
			warn!(%remote, error = %e, "failed to set TCP_NODELAY");
		}

		let hub = hub.clone();
		let settings = settings.clone();
		tokio::spawn(async move {
			if let Err(e) = handle_connection(stream, remote, hub, settings).await {
				warn!(%remote, error = %e, "connection handler exited with error");
			}
		});
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use tokio::sync::oneshot;

	use super::*;
	use crate::server::hub::{HubConfig, spawn_event_hub};

	#[tokio::test]
	async fn serve_returns_once_shutdown_resolves() {
		let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
		let hub = spawn_event_hub(HubConfig::default());
		let (stop_tx, stop_rx) = oneshot::channel::<()>();

		let server = tokio::spawn(serve(listener, hub, ConnectionSettings::default(), async move {
			let _ = stop_rx.await;
		}));

		stop_tx.send(()).expect("listener still running");
		let result = tokio::time::timeout(Duration::from_secs(2), server)
			.await
			.expect("serve did not stop")
			.expect("serve task panicked");
		assert!(result.is_ok());
	}
}
