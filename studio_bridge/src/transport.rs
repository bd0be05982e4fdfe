//! Transport abstraction for the chart worker boundary.

use crate::error::BridgeError;
use crate::protocol::{ChartRegistry, ChartRequest, ChartResponse};
use crate::types::ChartId;
use async_trait::async_trait;
use std::sync::Mutex;

/// Carries requests to whatever owns the chart instances.
///
/// # Implementations
///
/// - **Worker**: `WorkerTransport` - a tokio task reached over mpsc
/// - **In-process**: `InProcessTransport` - direct dispatch, for tests
///
/// # Request Flow
///
/// ```text
/// Host                       Transport                   Worker
///   |                           |                          |
///   |-- request(req) ---------->|-- (req, reply_tx) ------>|
///   |                           |                          |-- registry.handle(req)
///   |<-- response --------------|<-- reply_tx.send(resp) --|
/// ```
#[async_trait]
pub trait ChartTransport: Send + Sync + 'static {
    /// Sends one request and waits for its response.
    ///
    /// # Returns
    /// * `Ok(response)` - The worker handled the request
    /// * `Err(BridgeError::WorkerUnavailable)` - The worker is gone
    async fn request(&self, request: ChartRequest) -> Result<ChartResponse, BridgeError>;

    /// Queues teardown of `id` without waiting. Used when a handle is
    /// dropped while its chart is still live.
    fn release(&self, id: ChartId);
}

/// Transport that handles requests on the caller's task.
#[derive(Debug, Default)]
pub struct InProcessTransport {
    registry: Mutex<ChartRegistry>,
}

impl InProcessTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live charts.
    pub fn chart_count(&self) -> usize {
        self.registry.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ChartTransport for InProcessTransport {
    async fn request(&self, request: ChartRequest) -> Result<ChartResponse, BridgeError> {
        let mut registry = self
            .registry
            .lock()
            .map_err(|_| BridgeError::unavailable("chart registry lock poisoned"))?;
        Ok(registry.handle(request))
    }

    fn release(&self, id: ChartId) {
        if let Ok(mut registry) = self.registry.lock() {
            registry.handle(ChartRequest::Destroy { id });
        }
    }
}
