//! Prometheus metrics for the forwarder
//!
//! Metrics live in their own [`Registry`] rather than the process global one so
//! that every pipeline (and every test) counts independently.

use crate::error::{ForwarderError, Result};
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

/// All forwarder metrics
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,

    /// Upstream stream could not be opened
    pub ingress_stream_conn_err: IntCounter,

    /// Upstream stream failed while receiving
    pub ingress_stream_receive_err: IntCounter,

    /// Events that could not be converted
    pub ingress_stream_convert_err: IntCounter,

    /// Events received from upstream
    pub ingress_received: IntCounter,

    /// Envelopes dropped because the relay queue was full
    pub ingress_dropped: IntCounter,

    /// Downstream stream open or send failures
    pub egress_send_err: IntCounter,

    /// Envelopes delivered downstream
    pub egress_sent: IntCounter,

    /// Envelopes given up on after retries
    pub egress_dropped: IntCounter,

    /// Envelopes currently waiting in the relay queue
    pub relay_queue_depth: IntGauge,
}

impl Metrics {
    /// Create and register all metrics in a fresh registry
    #[allow(clippy::result_large_err)]
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let metrics = Self {
            ingress_stream_conn_err: counter(
                &registry,
                "ingress_stream_conn_err",
                "Failures opening the upstream metrics stream",
            )?,
            ingress_stream_receive_err: counter(
                &registry,
                "ingress_stream_receive_err",
                "Failures receiving from the upstream metrics stream",
            )?,
            ingress_stream_convert_err: counter(
                &registry,
                "ingress_stream_convert_err",
                "Upstream events that could not be converted to envelopes",
            )?,
            ingress_received: counter(
                &registry,
                "ingress_received",
                "Events received from the upstream metrics stream",
            )?,
            ingress_dropped: counter(
                &registry,
                "ingress_dropped",
                "Envelopes dropped because the relay queue was full",
            )?,
            egress_send_err: counter(
                &registry,
                "egress_send_err",
                "Failures opening or sending on the downstream stream",
            )?,
            egress_sent: counter(&registry, "egress_sent", "Envelopes sent downstream")?,
            egress_dropped: counter(
                &registry,
                "egress_dropped",
                "Envelopes dropped after exhausting send retries",
            )?,
            relay_queue_depth: {
                let gauge = IntGauge::new(
                    "relay_queue_depth",
                    "Envelopes waiting in the relay queue",
                )
                .map_err(|e| ForwarderError::Metrics(format!("relay_queue_depth: {e}")))?;
                registry
                    .register(Box::new(gauge.clone()))
                    .map_err(|e| ForwarderError::Metrics(format!("relay_queue_depth: {e}")))?;
                gauge
            },
            registry,
        };

        Ok(metrics)
    }

    /// The registry holding these metrics
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Update queue depth
    pub fn set_queue_depth(&self, depth: usize) {
        self.relay_queue_depth.set(depth as i64);
    }

    /// Encode all metrics as Prometheus text format
    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if encoder.encode(&metric_families, &mut buffer).is_ok() {
            String::from_utf8(buffer).unwrap_or_default()
        } else {
            String::new()
        }
    }
}

#[allow(clippy::result_large_err)]
fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter> {
    let counter =
        IntCounter::new(name, help).map_err(|e| ForwarderError::Metrics(format!("{name}: {e}")))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| ForwarderError::Metrics(format!("{name}: {e}")))?;
    Ok(counter)
}
