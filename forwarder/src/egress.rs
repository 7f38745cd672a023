//! Downstream side of the forwarder
//!
//! Pops envelopes from the relay queue and sends them to the ingestion agent.
//! A send is retried a bounded number of times on the same stream; after that
//! the stream is abandoned, the envelope parked in a single pending slot and a
//! new stream opened. Once the queue is closed the loop drains what is left
//! and closes the stream cleanly, reconnecting as often as needed until the
//! drain timeout cancels it.

use crate::config::EgressConfig;
use crate::error::{Result, StreamError};
use crate::metrics::Metrics;
use crate::proto::loggregator_v2::Envelope;
use crate::relay::RelayQueue;
use crate::task::{ActiveStream, StopMode, TaskHandle};
use crate::transport::{DownstreamConnector, EnvelopeSink};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Sends envelopes from the relay queue to the ingestion agent
pub struct Egress {
    connector: Arc<dyn DownstreamConnector>,
    queue: Arc<RelayQueue>,
    metrics: Arc<Metrics>,
    config: EgressConfig,
}

/// Why a stream was given up
enum Abandon {
    /// Stream could not be used; reconnect unless stopping
    Failed,
    /// Queue closed and drained
    Drained,
}

impl Egress {
    pub fn new(
        connector: Arc<dyn DownstreamConnector>,
        queue: Arc<RelayQueue>,
        metrics: Arc<Metrics>,
        config: EgressConfig,
    ) -> Self {
        Self {
            connector,
            queue,
            metrics,
            config,
        }
    }

    /// Start the send loop
    pub fn start(self) -> TaskHandle {
        info!(
            max_send_attempts = self.config.max_send_attempts,
            retry_delay_ms = self.config.retry_delay.as_millis() as u64,
            "starting egress"
        );

        let stop = CancellationToken::new();
        let streams = CancellationToken::new();
        let active = Arc::new(ActiveStream::new());
        let mode = StopMode::Drain {
            queue: Arc::clone(&self.queue),
            active: Arc::clone(&active),
            streams: streams.clone(),
            timeout: self.config.drain_timeout,
        };
        let task = self.send_loop(streams, active);
        TaskHandle::spawn("egress", stop, mode, task)
    }

    async fn send_loop(
        self,
        streams: CancellationToken,
        active: Arc<ActiveStream>,
    ) -> Result<()> {
        let mut pending: Option<Envelope> = None;

        loop {
            // None only once the drain timeout has shut the streams down.
            let Some(stream_token) = active.begin(&streams) else {
                self.abandon(pending.take());
                break;
            };

            let opened = tokio::select! {
                _ = stream_token.cancelled() => Err(StreamError::Cancelled),
                r = self.connector.connect() => r,
            };
            let mut sink = match opened {
                Ok(sink) => sink,
                Err(e) => {
                    self.metrics.egress_send_err.inc();
                    warn!(error = %e, "error opening stream to agent");
                    self.backoff(&stream_token).await;
                    continue;
                }
            };
            debug!("connected to agent");

            match self
                .pump(sink.as_mut(), &mut pending, &stream_token)
                .await
            {
                Abandon::Drained => {
                    let closed = tokio::select! {
                        _ = stream_token.cancelled() => Err(StreamError::Cancelled),
                        r = sink.close_and_recv() => r,
                    };
                    if let Err(e) = closed {
                        warn!(error = %e, "error closing stream to agent");
                    }
                    break;
                }
                Abandon::Failed => {
                    drop(sink);
                    self.backoff(&stream_token).await;
                }
            }
        }

        self.metrics.set_queue_depth(self.queue.len());
        info!(
            sent = self.metrics.egress_sent.get(),
            dropped = self.metrics.egress_dropped.get(),
            "egress stopped"
        );
        Ok(())
    }

    /// Send the pending envelope, then everything the queue yields
    async fn pump(
        &self,
        sink: &mut dyn EnvelopeSink,
        pending: &mut Option<Envelope>,
        stream_token: &CancellationToken,
    ) -> Abandon {
        if let Some(envelope) = pending.take() {
            match self.send_with_retry(sink, &envelope, stream_token).await {
                Ok(()) => self.metrics.egress_sent.inc(),
                Err(e) => {
                    self.metrics.egress_send_err.inc();
                    self.metrics.egress_dropped.inc();
                    warn!(error = %e, "dropping envelope that failed on two streams");
                    return Abandon::Failed;
                }
            }
        }

        loop {
            let Some(envelope) = self.queue.pop().await else {
                return Abandon::Drained;
            };
            self.metrics.set_queue_depth(self.queue.len());

            match self.send_with_retry(sink, &envelope, stream_token).await {
                Ok(()) => self.metrics.egress_sent.inc(),
                Err(e) => {
                    self.metrics.egress_send_err.inc();
                    warn!(
                        error = %e,
                        attempts = self.config.max_send_attempts,
                        "send failed, reconnecting"
                    );
                    if pending.is_some() {
                        self.metrics.egress_dropped.inc();
                    } else {
                        *pending = Some(envelope);
                    }
                    return Abandon::Failed;
                }
            }
        }
    }

    async fn send_with_retry(
        &self,
        sink: &mut dyn EnvelopeSink,
        envelope: &Envelope,
        stream_token: &CancellationToken,
    ) -> std::result::Result<(), StreamError> {
        let mut attempt = 1;
        loop {
            let sent = tokio::select! {
                _ = stream_token.cancelled() => return Err(StreamError::Cancelled),
                r = sink.send(envelope) => r,
            };
            match sent {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= self.config.max_send_attempts => return Err(e),
                Err(e) => {
                    debug!(error = %e, attempt, "send failed, retrying");
                    attempt += 1;
                    tokio::select! {
                        _ = stream_token.cancelled() => return Err(StreamError::Cancelled),
                        _ = tokio::time::sleep(self.config.retry_delay) => {}
                    }
                }
            }
        }
    }

    /// Count the pending envelope and whatever is still queued as dropped
    fn abandon(&self, pending: Option<Envelope>) {
        let mut dropped = u64::from(pending.is_some());
        while self.queue.try_pop().is_some() {
            dropped += 1;
        }
        if dropped > 0 {
            self.metrics.egress_dropped.inc_by(dropped);
            warn!(dropped, "drain timed out, dropping remaining envelopes");
        }
    }

    async fn backoff(&self, cancel: &CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(self.config.reconnect_wait) => {}
        }
    }
}
