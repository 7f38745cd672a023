//! System metrics forwarder binary
//!
//! ## Usage
//!
//! ```bash
//! FORWARDER_DIRECTOR_URL=https://10.0.0.6:25555 \
//! FORWARDER_AUTH_CLIENT_ID=system_metrics_client \
//! FORWARDER_AUTH_CLIENT_SECRET=... \
//! FORWARDER_METRICS_SERVER_URL=https://10.0.0.6:25595 \
//! system-metrics-forwarder
//! ```
//!
//! Set `RUST_LOG=debug` for verbose output and `FORWARDER_LOG_FORMAT=json` for
//! structured logs.

use std::sync::Arc;
use system_metrics_forwarder::auth::{AddressProvider, Auth};
use system_metrics_forwarder::config::{Config, LogFormat};
use system_metrics_forwarder::metrics::Metrics;
use system_metrics_forwarder::metrics_server::MetricsServer;
use system_metrics_forwarder::transport::grpc::{GrpcDownstream, GrpcUpstream};
use system_metrics_forwarder::{Components, Forwarder};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    info!(
        director = %config.director_url,
        metrics_server = %config.metrics_server.url,
        agent = %config.agent.url,
        queue_capacity = config.queue_capacity,
        "starting system metrics forwarder"
    );

    let metrics = Arc::new(Metrics::new()?);
    let metrics_server = MetricsServer::bind(config.health_addr, Arc::clone(&metrics))
        .await?
        .spawn();

    let addresser = Arc::new(AddressProvider::new(
        &config.director_url,
        config.director_ca.as_deref(),
    )?);
    let tokener = Arc::new(Auth::new(
        addresser,
        config.client_id.clone(),
        config.client_secret.clone(),
        config.director_ca.as_deref(),
    )?);

    let components = Components {
        upstream: Arc::new(GrpcUpstream::new(&config.metrics_server)?),
        downstream: Arc::new(GrpcDownstream::new(&config.agent)?),
        tokener,
        metrics,
    };

    let forwarder = Forwarder::start(components, &config).await?;

    let outcome = tokio::select! {
        _ = shutdown_signal() => Ok(()),
        result = forwarder.wait() => result,
    };

    forwarder.stop().await;
    metrics_server.abort();

    if let Err(e) = &outcome {
        error!(error = %e, "forwarder failed");
    } else {
        info!("shutdown complete");
    }
    outcome.map_err(Into::into)
}

fn init_tracing(format: LogFormat) {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = ?e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = ?e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
