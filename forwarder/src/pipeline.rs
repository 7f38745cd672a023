//! Wiring of ingress, relay queue and egress
//!
//! ```text
//! metrics server ──► Ingress ──► RelayQueue ──► Egress ──► agent
//! ```
//!
//! Shutdown runs front to back: ingress stops first so nothing new enters the
//! queue, the queue is closed, and egress drains what is left before it closes
//! its stream.

use crate::auth::Tokener;
use crate::config::Config;
use crate::egress::Egress;
use crate::error::Result;
use crate::ingress::Ingress;
use crate::mapper::Mapper;
use crate::metrics::Metrics;
use crate::relay::RelayQueue;
use crate::task::TaskHandle;
use crate::transport::{DownstreamConnector, UpstreamConnector};
use std::sync::Arc;
use tracing::info;

/// External collaborators of a forwarder
pub struct Components {
    pub upstream: Arc<dyn UpstreamConnector>,
    pub downstream: Arc<dyn DownstreamConnector>,
    pub tokener: Arc<dyn Tokener>,
    pub metrics: Arc<Metrics>,
}

/// A running forwarder
pub struct Forwarder {
    queue: Arc<RelayQueue>,
    ingress: TaskHandle,
    egress: TaskHandle,
}

impl Forwarder {
    /// Build the queue and both stages and start them
    ///
    /// Fails when the initial token cannot be obtained; nothing is left
    /// running in that case.
    pub async fn start(components: Components, config: &Config) -> Result<Self> {
        let Components {
            upstream,
            downstream,
            tokener,
            metrics,
        } = components;

        let queue = Arc::new(RelayQueue::new(config.queue_capacity));
        let mapper = match &config.ip_tag {
            Some(ip) => Mapper::with_ip_tag(ip.clone()),
            None => Mapper::new(),
        };

        let ingress = Ingress::new(
            upstream,
            tokener,
            mapper,
            Arc::clone(&queue),
            Arc::clone(&metrics),
            config.subscription_id.clone(),
            config.ingress.clone(),
        )
        .start()
        .await?;

        let egress = Egress::new(
            downstream,
            Arc::clone(&queue),
            metrics,
            config.egress.clone(),
        )
        .start();

        info!(capacity = config.queue_capacity, "forwarder started");
        Ok(Self {
            queue,
            ingress,
            egress,
        })
    }

    /// Stop ingress, close the queue, then drain and stop egress. Idempotent.
    pub async fn stop(&self) {
        self.ingress.stop().await;
        self.queue.close();
        self.egress.stop().await;
        info!(
            remaining = self.queue.len(),
            dropped_at_queue = self.queue.total_dropped(),
            "forwarder stopped"
        );
    }

    /// Resolves when ingress exits on its own, with the error that ended it
    pub async fn wait(&self) -> Result<()> {
        self.ingress.wait().await
    }

    /// The relay queue between the stages
    pub fn queue(&self) -> &Arc<RelayQueue> {
        &self.queue
    }
}
