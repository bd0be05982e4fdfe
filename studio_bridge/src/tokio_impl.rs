//! Worker implementation of ChartTransport using Tokio.

use crate::error::BridgeError;
use crate::protocol::{ChartRegistry, ChartRequest, ChartResponse};
use crate::transport::ChartTransport;
use crate::types::ChartId;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Default request queue depth
pub const DEFAULT_BUFFER: usize = 64;

struct Envelope {
    request: ChartRequest,
    reply: oneshot::Sender<ChartResponse>,
}

/// Transport to a spawned worker task that owns every chart.
///
/// The worker handles requests strictly in arrival order and exits once
/// every transport handle has been dropped.
#[derive(Clone)]
pub struct WorkerTransport {
    sender: mpsc::Sender<Envelope>,
    timeout: Option<Duration>,
}

impl WorkerTransport {
    /// Spawns the worker on the current Tokio runtime.
    pub fn spawn() -> Self {
        Self::spawn_with_handle(DEFAULT_BUFFER).0
    }

    /// Spawns the worker and returns its join handle. The handle resolves
    /// to the number of requests handled.
    pub fn spawn_with_handle(buffer: usize) -> (Self, JoinHandle<u64>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let handle = tokio::spawn(run_worker(receiver));
        (
            Self {
                sender,
                timeout: None,
            },
            handle,
        )
    }

    /// Creates an Arc-wrapped transport for sharing across chart handles.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::spawn())
    }

    /// Fail requests that take longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn round_trip(&self, request: ChartRequest) -> Result<ChartResponse, BridgeError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(Envelope { request, reply })
            .await
            .map_err(|_| BridgeError::unavailable("worker channel closed"))?;
        response
            .await
            .map_err(|_| BridgeError::unavailable("worker dropped the reply"))
    }
}

async fn run_worker(mut receiver: mpsc::Receiver<Envelope>) -> u64 {
    let mut registry = ChartRegistry::new();
    let mut handled = 0u64;
    tracing::debug!("chart worker started");

    while let Some(Envelope { request, reply }) = receiver.recv().await {
        let response = registry.handle(request);
        handled += 1;
        if reply.send(response).is_err() {
            tracing::debug!("requester went away before the reply");
        }
    }

    tracing::debug!(handled, live = registry.len(), "chart worker stopped");
    handled
}

#[async_trait]
impl ChartTransport for WorkerTransport {
    async fn request(&self, request: ChartRequest) -> Result<ChartResponse, BridgeError> {
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.round_trip(request))
                .await
                .map_err(|_| BridgeError::Timeout(timeout.as_millis() as u64))?,
            None => self.round_trip(request).await,
        }
    }

    fn release(&self, id: ChartId) {
        // Nobody waits for the reply
        let (reply, _) = oneshot::channel();
        let request = ChartRequest::Destroy { id };
        if let Err(e) = self.sender.try_send(Envelope { request, reply }) {
            tracing::warn!(chart = %id, error = %e, "could not queue release of dropped chart");
        }
    }
}
