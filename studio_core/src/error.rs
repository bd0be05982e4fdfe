//! Error types for the studio core.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from loading or saving persisted panel configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading or writing the config file failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config text is not valid JSON for a panel config
    #[error("Malformed config: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    /// Creates an I/O error for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
