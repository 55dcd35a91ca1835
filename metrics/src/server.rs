use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, extract::State, routing::get};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::Metrics;

#[derive(Clone, Debug)]
pub struct MetricsServerConfig {
    pub metrics_address: IpAddr,
    pub metrics_port: u16,
}

impl MetricsServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.metrics_address, self.metrics_port)
    }
}

async fn sync_metrics(State(metrics): State<Arc<Metrics>>) -> String {
    metrics.gather()
}

fn router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/metrics", get(sync_metrics))
        .with_state(metrics)
}

/// Serve the sync counters at `/metrics` until `cancel` fires.
pub async fn run_metrics_server(
    config: MetricsServerConfig,
    metrics: Arc<Metrics>,
    cancel: CancellationToken,
) -> Result<()> {
    let addr = config.socket_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {addr}"))?;
    info!(addr = %listener.local_addr()?, "Metrics server listening");

    axum::serve(listener, router(metrics))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("metrics server failed")?;

    info!("Metrics server stopped");
    Ok(())
}
