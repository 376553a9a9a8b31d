use crate::config::MetricsConfig;
use axum::{routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Serves `/metrics` and `/health` until cancelled
pub struct MetricsServer {
    config: MetricsConfig,
}

impl MetricsServer {
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    /// Install the global Prometheus recorder and serve until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) -> crate::Result<()> {
        let addr = self.config.socket_addr()?;
        let handle = install_recorder()?;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| crate::MetricsError::Server(e.to_string()))?;
        info!(address = %addr, "Metrics server listening");

        axum::serve(listener, router(handle))
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
            .map_err(|e| crate::MetricsError::Server(e.to_string()))?;

        info!("Metrics server stopped");
        Ok(())
    }
}

fn install_recorder() -> crate::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| crate::MetricsError::Recorder(e.to_string()))?;
    crate::describe_all();
    Ok(handle)
}

fn router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(move || render(handle.clone())))
        .route("/health", get(|| async { "OK" }))
}

async fn render(handle: PrometheusHandle) -> String {
    handle.render()
}
