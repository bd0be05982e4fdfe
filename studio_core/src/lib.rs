//! Studio Core - scene extension for robot pose topics
//!
//! Turns a stream of loosely-typed robot messages into a retained 3D scene:
//! 1. **Normalization**: partial wire messages become fully-defined poses
//! 2. **Settings**: per-topic overrides merged onto defaults, edited copy-on-write
//! 3. **Scene**: one renderable per topic, primitives mutated in place
//! 4. **Diagnostics**: latest status per entity with pinning and filtering

pub mod color;
pub mod diagnostics;
pub mod error;
pub mod messages;
pub mod panel_config;
pub mod registry;
pub mod renderable;
pub mod scene_extension;
pub mod scene_graph;
pub mod settings;
pub mod settings_tree;

#[cfg(feature = "visualization")]
pub mod visualization;

// Re-export key types for convenience
pub use color::Rgba;
pub use diagnostics::{DiagnosticId, DiagnosticInfo, DiagnosticsAggregator, DiagnosticsConfig};
pub use error::ConfigError;
pub use messages::{Covariance, DiagnosticArray, DiagnosticLevel, DiagnosticStatus, PoseMessage};
pub use panel_config::PanelConfig;
pub use registry::{DatatypeRegistry, MessageEvent, PoseSchema, Topic};
pub use renderable::{Capabilities, PoseRenderable, RenderableKind};
pub use scene_extension::{SceneConfig, SceneExtension, SceneStats};
pub use scene_graph::{PrimitiveId, SceneGraph};
pub use settings::{PartialPoseSettings, PoseSettings, SettingsPath, SettingsValue, TopicSettingsStore};
pub use settings_tree::{SettingsAction, SettingsTree, SettingsTreeNode};

#[cfg(feature = "visualization")]
pub use visualization::SceneVisualizer;
