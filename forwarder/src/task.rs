//! Background task handles and stream cancellation

use crate::error::{ForwarderError, Result};
use crate::relay::RelayQueue;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Cancellation handle of the stream currently in use
///
/// Stop runs in a different task than the loop that opens streams. Both go
/// through this mutex, so a stream opened concurrently with stop is either
/// cancelled by it or never opened.
#[derive(Default)]
pub struct ActiveStream {
    slot: Mutex<Slot>,
}

#[derive(Default)]
struct Slot {
    current: Option<CancellationToken>,
    stopped: bool,
}

impl ActiveStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a token for a new stream, derived from `parent`
    ///
    /// Returns `None` once [`shutdown`](Self::shutdown) has run.
    pub fn begin(&self, parent: &CancellationToken) -> Option<CancellationToken> {
        let mut slot = self.slot.lock();
        if slot.stopped || parent.is_cancelled() {
            return None;
        }
        let token = parent.child_token();
        if let Some(previous) = slot.current.replace(token.clone()) {
            previous.cancel();
        }
        Some(token)
    }

    /// Cancel `root` and the current stream, and refuse new streams
    pub fn shutdown(&self, root: &CancellationToken) {
        let mut slot = self.slot.lock();
        slot.stopped = true;
        root.cancel();
        if let Some(current) = slot.current.take() {
            current.cancel();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.slot.lock().stopped
    }
}

/// How a task is asked to stop
pub(crate) enum StopMode {
    /// Cancel the stop token and the active stream at once
    Cancel { active: Arc<ActiveStream> },
    /// Close the queue and let the task drain it, cancelling the active
    /// stream only if draining outlasts `timeout`
    Drain {
        queue: Arc<RelayQueue>,
        active: Arc<ActiveStream>,
        streams: CancellationToken,
        timeout: Duration,
    },
}

/// Handle to a running ingress or egress loop
pub struct TaskHandle {
    name: &'static str,
    stop: CancellationToken,
    done: CancellationToken,
    error: Arc<Mutex<Option<ForwarderError>>>,
    mode: StopMode,
}

impl TaskHandle {
    /// Spawn `task`; `stop` is the token the task watches
    pub(crate) fn spawn<F>(
        name: &'static str,
        stop: CancellationToken,
        mode: StopMode,
        task: F,
    ) -> Self
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let done = CancellationToken::new();
        let error = Arc::new(Mutex::new(None));

        let guard = done.clone().drop_guard();
        let slot = Arc::clone(&error);
        let inner = tokio::spawn(task);
        tokio::spawn(async move {
            let _guard = guard;
            let outcome = match inner.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(task = name, error = %e, "task panicked");
                    Err(ForwarderError::Panicked(name))
                }
            };
            if let Err(e) = outcome {
                *slot.lock() = Some(e);
            }
        });

        Self {
            name,
            stop,
            done,
            error,
            mode,
        }
    }

    /// Ask the task to stop and wait until it has exited. Idempotent.
    pub async fn stop(&self) {
        match &self.mode {
            StopMode::Cancel { active } => {
                active.shutdown(&self.stop);
                self.done.cancelled().await;
            }
            StopMode::Drain {
                queue,
                active,
                streams,
                timeout,
            } => {
                self.stop.cancel();
                queue.close();
                if tokio::time::timeout(*timeout, self.done.cancelled())
                    .await
                    .is_err()
                {
                    warn!(
                        task = self.name,
                        timeout_ms = timeout.as_millis() as u64,
                        remaining = queue.len(),
                        "drain timed out, cancelling stream"
                    );
                    active.shutdown(streams);
                    self.done.cancelled().await;
                }
            }
        }
    }

    /// Wait for the task to exit on its own
    ///
    /// Yields the error that ended the task, if any. The error is handed out
    /// once.
    pub async fn wait(&self) -> Result<()> {
        self.done.cancelled().await;
        match self.error.lock().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.done.is_cancelled()
    }
}
