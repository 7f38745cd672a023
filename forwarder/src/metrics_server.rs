//! HTTP server for the Prometheus metrics and health endpoints
//!
//! ```ignore
//! let server = MetricsServer::bind("127.0.0.1:19111".parse()?, metrics).await?;
//! let handle = server.spawn();
//! ```

use crate::error::Result;
use crate::metrics::Metrics;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Metrics HTTP server bound to a local address
pub struct MetricsServer {
    listener: TcpListener,
    metrics: Arc<Metrics>,
}

impl MetricsServer {
    /// Bind the listener; fails if the address is in use
    pub async fn bind(addr: SocketAddr, metrics: Arc<Metrics>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, metrics })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the task is aborted or the process exits
    pub fn spawn(self) -> JoinHandle<()> {
        let app = router(self.metrics);
        let listener = self.listener;

        tokio::spawn(async move {
            if let Ok(addr) = listener.local_addr() {
                info!(%addr, "metrics server listening");
            }
            if let Err(e) = axum::serve(listener, app).await {
                error!(error = %e, "metrics server error");
            }
        })
    }
}

fn router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(metrics)
}

async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        metrics.gather(),
    )
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
