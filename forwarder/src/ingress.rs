//! Upstream side of the forwarder
//!
//! Keeps a stream to the metrics server open for as long as the process runs,
//! converts every event it receives and offers the result to the relay queue.
//! A full queue costs the newest envelope, never a stall of the stream.

use crate::auth::Tokener;
use crate::config::IngressConfig;
use crate::error::{ForwarderError, RelayError, Result, StreamError};
use crate::mapper::Mapper;
use crate::metrics::Metrics;
use crate::proto::definitions::Event;
use crate::relay::RelayQueue;
use crate::task::{ActiveStream, StopMode, TaskHandle};
use crate::transport::UpstreamConnector;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Reads events from the metrics server into the relay queue
pub struct Ingress {
    connector: Arc<dyn UpstreamConnector>,
    tokener: Arc<dyn Tokener>,
    mapper: Mapper,
    queue: Arc<RelayQueue>,
    metrics: Arc<Metrics>,
    subscription_id: String,
    config: IngressConfig,
}

impl Ingress {
    pub fn new(
        connector: Arc<dyn UpstreamConnector>,
        tokener: Arc<dyn Tokener>,
        mapper: Mapper,
        queue: Arc<RelayQueue>,
        metrics: Arc<Metrics>,
        subscription_id: impl Into<String>,
        config: IngressConfig,
    ) -> Self {
        Self {
            connector,
            tokener,
            mapper,
            queue,
            metrics,
            subscription_id: subscription_id.into(),
            config,
        }
    }

    /// Fetch the first token and start the receive loop
    ///
    /// Fails without spawning anything when no token can be obtained.
    pub async fn start(self) -> Result<TaskHandle> {
        let token = self.tokener.token().await.map_err(|e| {
            error!(error = %e, "unable to get token, cannot establish stream");
            ForwarderError::Auth(e)
        })?;

        info!(
            subscription_id = %self.subscription_id,
            capacity = self.queue.capacity(),
            "starting ingress"
        );

        let stop = CancellationToken::new();
        let active = Arc::new(ActiveStream::new());
        let task = self.receive_loop(token, stop.clone(), Arc::clone(&active));
        Ok(TaskHandle::spawn(
            "ingress",
            stop,
            StopMode::Cancel { active },
            task,
        ))
    }

    async fn receive_loop(
        self,
        mut token: String,
        stop: CancellationToken,
        active: Arc<ActiveStream>,
    ) -> Result<()> {
        while let Some(stream_token) = active.begin(&stop) {
            let deadline = self.config.stream_timeout.map(|t| Instant::now() + t);

            let connected = tokio::select! {
                _ = stream_token.cancelled() => break,
                r = until(deadline, self.connector.connect(&token, &self.subscription_id)) => r,
            };

            let mut stream = match connected {
                Ok(stream) => stream,
                Err(StreamError::DeadlineExceeded) => {
                    debug!("stream timeout reached while connecting, reconnecting");
                    if !self.backoff(&stream_token).await {
                        break;
                    }
                    continue;
                }
                Err(e) => {
                    self.metrics.ingress_stream_conn_err.inc();
                    if e.is_authorization_denied() {
                        warn!(error = %e, "authorization failure, retrieving token");
                        match self.refresh(&stop).await? {
                            Some(fresh) => token = fresh,
                            None => break,
                        }
                        continue;
                    }
                    warn!(error = %e, "error creating stream connection to metrics server");
                    if !self.backoff(&stream_token).await {
                        break;
                    }
                    continue;
                }
            };
            debug!("connected to metrics server");

            let failure = loop {
                let next = tokio::select! {
                    _ = stream_token.cancelled() => None,
                    r = until(deadline, stream.recv()) => Some(r),
                };
                match next {
                    None => break None,
                    Some(Ok(event)) => self.forward(event),
                    Some(Err(e)) => break Some(e),
                }
            };
            drop(stream);

            let Some(e) = failure else {
                break;
            };

            match e {
                StreamError::DeadlineExceeded => {
                    debug!("stream timeout reached, reconnecting");
                }
                e if e.is_authorization_denied() => {
                    self.metrics.ingress_stream_receive_err.inc();
                    warn!(error = %e, "authorization failure while receiving, retrieving token");
                    match self.refresh(&stop).await? {
                        Some(fresh) => token = fresh,
                        None => break,
                    }
                }
                e => {
                    self.metrics.ingress_stream_receive_err.inc();
                    warn!(error = %e, "error receiving from metrics server");
                }
            }

            if !self.backoff(&stop).await {
                break;
            }
        }

        info!("ingress stopped");
        Ok(())
    }

    /// Convert one event and offer it to the queue
    fn forward(&self, event: Event) {
        self.metrics.ingress_received.inc();

        let envelope = match self.mapper.map(&event) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.metrics.ingress_stream_convert_err.inc();
                trace!(error = %e, event_id = %event.id, "skipping event");
                return;
            }
        };

        match self.queue.try_push(envelope) {
            Ok(()) => {}
            Err(RelayError::Full(_)) => {
                self.metrics.ingress_dropped.inc();
                trace!(capacity = self.queue.capacity(), "relay queue full, dropping envelope");
            }
            Err(RelayError::Closed(_)) => {
                self.metrics.ingress_dropped.inc();
                trace!("relay queue closed, dropping envelope");
            }
        }
        self.metrics.set_queue_depth(self.queue.len());
    }

    /// Fetch a replacement token; `None` when stopped while waiting
    ///
    /// A failure here is fatal for the task.
    async fn refresh(&self, stop: &CancellationToken) -> Result<Option<String>> {
        let fetched = tokio::select! {
            _ = stop.cancelled() => return Ok(None),
            r = self.tokener.token() => r,
        };
        match fetched {
            Ok(token) => {
                debug!("token refreshed");
                Ok(Some(token))
            }
            Err(e) => {
                error!(error = %e, "unable to refresh token");
                Err(ForwarderError::Auth(e))
            }
        }
    }

    /// Wait the reconnect interval; false when cancelled first
    async fn backoff(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.config.reconnect_wait) => true,
        }
    }
}

/// Bound `fut` by the stream deadline, if any
async fn until<T, F>(deadline: Option<Instant>, fut: F) -> std::result::Result<T, StreamError>
where
    F: Future<Output = std::result::Result<T, StreamError>>,
{
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut)
            .await
            .unwrap_or_else(|_| Err(StreamError::DeadlineExceeded)),
        None => fut.await,
    }
}
