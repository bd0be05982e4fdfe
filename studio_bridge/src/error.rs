//! Error types for the chart bridge.

use crate::types::ChartId;
use thiserror::Error;

/// Errors that can occur crossing the chart bridge boundary.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The worker task is gone (shut down or panicked)
    #[error("Worker unavailable: {0}")]
    WorkerUnavailable(String),

    /// No chart with this id lives on the worker
    #[error("Chart not constructed: {0}")]
    ChartNotFound(ChartId),

    /// The worker answered with a response of the wrong kind
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Request or response could not be encoded
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Operation timed out
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl BridgeError {
    /// Creates a worker-unavailable error.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::WorkerUnavailable(msg.into())
    }

    /// Creates an unexpected-response error.
    pub fn unexpected(response: impl std::fmt::Debug) -> Self {
        Self::UnexpectedResponse(format!("{:?}", response))
    }
}
