//! Error types for the simulation harness.

use studio_bridge::BridgeError;
use studio_core::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    /// A scene, diagnostics or chart invariant did not hold
    #[error("Invariant violated at tick {tick}: {message}")]
    Invariant { tick: u64, message: String },

    #[error("Chart bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Panel config error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SimError {
    pub fn invariant(tick: u64, message: impl Into<String>) -> Self {
        SimError::Invariant {
            tick,
            message: message.into(),
        }
    }
}
