//! Rerun recording of simulation runs.
//!
//! Only records with the `visualization` feature; without it every method
//! is a no-op.

#[cfg(feature = "visualization")]
use studio_core::SceneVisualizer;
use studio_core::{DiagnosticsAggregator, DiagnosticsConfig, SceneExtension};

/// Application id shown in the Rerun viewer
pub const APP_ID: &str = "studio_sim";

/// Rerun logger for simulation runs.
pub struct RerunLogger {
    #[cfg(feature = "visualization")]
    visualizer: Option<SceneVisualizer>,
}

impl RerunLogger {
    pub fn disabled() -> Self {
        Self {
            #[cfg(feature = "visualization")]
            visualizer: None,
        }
    }

    /// Records to an `.rrd` file.
    #[cfg(feature = "visualization")]
    pub fn to_file(path: &str) -> Self {
        match SceneVisualizer::new_to_file(APP_ID, path) {
            Ok(visualizer) => {
                tracing::info!("Recording scene to {}", path);
                Self {
                    visualizer: Some(visualizer),
                }
            }
            Err(e) => {
                tracing::warn!("Failed to initialize Rerun: {:?}", e);
                Self::disabled()
            }
        }
    }

    #[cfg(not(feature = "visualization"))]
    pub fn to_file(_path: &str) -> Self {
        tracing::info!("Rerun recording not available (compile with --features visualization)");
        Self::disabled()
    }

    pub fn is_enabled(&self) -> bool {
        #[cfg(feature = "visualization")]
        {
            self.visualizer.is_some()
        }
        #[cfg(not(feature = "visualization"))]
        {
            false
        }
    }

    #[cfg(feature = "visualization")]
    pub fn log_scene(&self, tick: u64, scene: &SceneExtension) {
        if let Some(visualizer) = &self.visualizer {
            visualizer.set_tick(tick);
            if let Err(e) = visualizer.log_scene(scene) {
                tracing::warn!(tick, "failed to log scene: {}", e);
            }
            if let Err(e) = visualizer.log_stats(&scene.stats()) {
                tracing::warn!(tick, "failed to log stats: {}", e);
            }
        }
    }

    #[cfg(not(feature = "visualization"))]
    pub fn log_scene(&self, _tick: u64, _scene: &SceneExtension) {}

    #[cfg(feature = "visualization")]
    pub fn log_diagnostics(&self, tick: u64, aggregator: &DiagnosticsAggregator, config: &DiagnosticsConfig) {
        if let Some(visualizer) = &self.visualizer {
            visualizer.set_tick(tick);
            if let Err(e) = visualizer.log_diagnostics(aggregator, config) {
                tracing::warn!(tick, "failed to log diagnostics: {}", e);
            }
        }
    }

    #[cfg(not(feature = "visualization"))]
    pub fn log_diagnostics(&self, _tick: u64, _aggregator: &DiagnosticsAggregator, _config: &DiagnosticsConfig) {}
}

impl Default for RerunLogger {
    fn default() -> Self {
        Self::disabled()
    }
}
