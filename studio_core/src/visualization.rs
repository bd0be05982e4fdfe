//! Visualization module for the scene using Rerun.io
//!
//! Logs the retained scene graph of a `SceneExtension`:
//! - pose arrows (one per renderable)
//! - covariance ellipsoids (when visible)
//! - diagnostics as text log entries
//!
//! Enable with the `visualization` feature flag.

use crate::diagnostics::{DiagnosticSummary, DiagnosticsAggregator, DiagnosticsConfig};
use crate::messages::DiagnosticLevel;
use crate::renderable::PoseRenderable;
use crate::scene_extension::{SceneExtension, SceneStats};
use crate::scene_graph::SceneNode;
use nalgebra::Vector3;
use rerun::{RecordingStream, RecordingStreamBuilder};

fn entity_path(topic: &str) -> String {
    format!("world/topics/{}", topic.trim_start_matches('/'))
}

fn to_f32(v: &Vector3<f64>) -> [f32; 3] {
    [v.x as f32, v.y as f32, v.z as f32]
}

fn quaternion(node: &SceneNode) -> [f32; 4] {
    let q = node.orientation.as_ref();
    [q.i as f32, q.j as f32, q.k as f32, q.w as f32]
}

/// Rerun-based visualizer for the pose scene
pub struct SceneVisualizer {
    rec: RecordingStream,
}

impl SceneVisualizer {
    /// Create a new visualizer that spawns the Rerun viewer
    pub fn new(app_id: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let rec = RecordingStreamBuilder::new(app_id).spawn()?;
        rec.log_static("world", &rerun::ViewCoordinates::RIGHT_HAND_Z_UP())?;
        Ok(Self { rec })
    }

    /// Create a visualizer that saves to a file
    pub fn new_to_file(app_id: &str, path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let rec = RecordingStreamBuilder::new(app_id).save(path)?;
        rec.log_static("world", &rerun::ViewCoordinates::RIGHT_HAND_Z_UP())?;
        Ok(Self { rec })
    }

    /// Set the current tick for timeline scrubbing
    pub fn set_tick(&self, tick: u64) {
        self.rec.set_time_sequence("tick", tick as i64);
    }

    /// Log every renderable of `scene`
    pub fn log_scene(&self, scene: &SceneExtension) -> Result<(), Box<dyn std::error::Error>> {
        for renderable in scene.renderables() {
            self.log_renderable(scene, renderable)?;
        }
        self.log_stats(&scene.stats())
    }

    /// Log the arrow and, when visible, the covariance ellipsoid of one topic
    pub fn log_renderable(
        &self,
        scene: &SceneExtension,
        renderable: &PoseRenderable,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let path = entity_path(renderable.topic());
        let graph = scene.graph();

        if let Some(arrow) = graph.node(renderable.arrow()) {
            if arrow.visible {
                let direction = arrow.orientation * Vector3::x() * arrow.scale.x;
                self.rec.log(
                    format!("{}/arrow", path),
                    &rerun::Arrows3D::from_vectors([to_f32(&direction)])
                        .with_origins([to_f32(&arrow.position)])
                        .with_radii([(arrow.scale.y * 0.5) as f32])
                        .with_colors([arrow.color.to_u8()])
                        .with_labels([renderable.frame_id()]),
                )?;
            } else {
                self.rec.log(format!("{}/arrow", path), &rerun::Clear::flat())?;
            }
        }

        if let Some(sphere) = renderable.sphere().and_then(|id| graph.node(id)) {
            if sphere.visible {
                self.rec.log(
                    format!("{}/covariance", path),
                    &rerun::Ellipsoids3D::from_centers_and_half_sizes(
                        [to_f32(&sphere.position)],
                        [to_f32(&sphere.scale)],
                    )
                    .with_quaternions([quaternion(sphere)])
                    .with_colors([sphere.color.to_u8()])
                    .with_fill_mode(rerun::FillMode::Solid),
                )?;
            } else {
                self.rec.log(format!("{}/covariance", path), &rerun::Clear::flat())?;
            }
        }

        Ok(())
    }

    /// Log the rendered diagnostics view as text entries
    pub fn log_diagnostics(
        &self,
        aggregator: &DiagnosticsAggregator,
        config: &DiagnosticsConfig,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let summary: DiagnosticSummary<'_> = aggregator.summary(config);
        for info in summary.ordered() {
            let level = match info.level() {
                DiagnosticLevel::Ok => rerun::TextLogLevel::INFO,
                DiagnosticLevel::Warn => rerun::TextLogLevel::WARN,
                DiagnosticLevel::Error => rerun::TextLogLevel::ERROR,
                DiagnosticLevel::Stale => rerun::TextLogLevel::DEBUG,
            };
            self.rec.log(
                "logs/diagnostics",
                &rerun::TextLog::new(format!("{}: {}", info.display_name, info.status.message))
                    .with_level(level),
            )?;
        }
        Ok(())
    }

    /// Log scene counters
    pub fn log_stats(&self, stats: &SceneStats) -> Result<(), Box<dyn std::error::Error>> {
        self.rec.log(
            "stats/renderables",
            &rerun::Scalars::new([stats.renderables as f64]),
        )?;
        self.rec.log(
            "stats/live_primitives",
            &rerun::Scalars::new([stats.live_primitives as f64]),
        )?;
        self.rec.log(
            "stats/allocations",
            &rerun::Scalars::new([stats.allocations as f64]),
        )?;
        Ok(())
    }
}
