//! Persisted panel configuration.
//!
//! One flat JSON object: the per-topic settings overrides under `topics`
//! plus the diagnostics view state. Loading only fills in defaults, so a
//! saved config loads back to an identical value and saves to identical
//! bytes.

use crate::diagnostics::DiagnosticsConfig;
use crate::error::ConfigError;
use crate::settings::TopicSettingsStore;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Per-topic partial settings
    pub topics: TopicSettingsStore,

    #[serde(flatten)]
    pub diagnostics: DiagnosticsConfig,
}

impl PanelConfig {
    pub fn new(topics: TopicSettingsStore, diagnostics: DiagnosticsConfig) -> Self {
        Self { topics, diagnostics }
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        let config = Self::from_json(&text)?;
        tracing::debug!(path = %path.display(), topics = config.topics.len(), "loaded panel config");
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let text = self.to_json()?;
        std::fs::write(path, text).map_err(|e| ConfigError::io(path, e))?;
        tracing::debug!(path = %path.display(), "saved panel config");
        Ok(())
    }
}
