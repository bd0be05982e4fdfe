//! JSON exporter for simulation runs.
//!
//! Captures the scene once per recorded tick so a run can be replayed or
//! inspected offline.

use crate::error::SimError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use studio_core::{PoseRenderable, SceneExtension, SceneStats};

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Simulation time in seconds
    pub time_sec: f64,

    pub renderables: Vec<RenderableFrame>,

    pub stats: SceneStats,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<SimEvent>,
}

impl SimFrame {
    /// Snapshot of every renderable, sorted by topic.
    pub fn capture(time_sec: f64, scene: &SceneExtension) -> Self {
        let mut renderables: Vec<RenderableFrame> = scene
            .renderables()
            .map(|r| RenderableFrame::capture(r, scene))
            .collect();
        renderables.sort_by(|a, b| a.topic.cmp(&b.topic));

        Self {
            time_sec,
            renderables,
            stats: scene.stats(),
            events: Vec::new(),
        }
    }

    pub fn with_events(mut self, events: Vec<SimEvent>) -> Self {
        self.events = events;
        self
    }
}

/// State of one pose renderable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderableFrame {
    pub topic: String,
    pub frame_id: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub visible: bool,

    /// Sphere diameters, when the sphere is shown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sphere_scale: Option<[f64; 3]>,
}

impl RenderableFrame {
    fn capture(renderable: &PoseRenderable, scene: &SceneExtension) -> Self {
        let graph = scene.graph();
        let arrow = graph.node(renderable.arrow());
        let position = renderable.message().pose.position;

        let sphere_scale = renderable
            .sphere()
            .and_then(|id| graph.node(id))
            .filter(|node| node.visible)
            .map(|node| [node.scale.x, node.scale.y, node.scale.z]);

        Self {
            topic: renderable.topic().to_string(),
            frame_id: renderable.frame_id().to_string(),
            x: position.x,
            y: position.y,
            z: position.z,
            visible: arrow.map(|n| n.visible).unwrap_or(false),
            sphere_scale,
        }
    }
}

/// Simulation event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimEvent {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl SimEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: None,
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    pub scenario: String,
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    pub frames: Vec<SimFrame>,

    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SimExport {
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
        }
    }

    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MessageSource;

    #[test]
    fn test_frame_captures_each_renderable() {
        let mut source = MessageSource::with_robots(1, 3);
        let mut scene = SceneExtension::default();
        scene.set_topics(&source.topics());
        for (event, _) in source.publish_all(1_000) {
            scene.handle_event(&event);
        }

        let frame = SimFrame::capture(0.5, &scene);
        assert_eq!(frame.renderables.len(), 3);
        assert_eq!(frame.stats.renderables, 3);
        assert!(frame.renderables.windows(2).all(|w| w[0].topic < w[1].topic));
        assert!(frame.renderables.iter().all(|r| r.visible));
    }

    #[test]
    fn test_write_and_read_back() {
        let mut export = SimExport::new("steady_stream", 42);
        export.add_frame(SimFrame::capture(1.0, &SceneExtension::default()).with_events(vec![
            SimEvent::info("started"),
        ]));
        export.finalize(true, None);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        export.write_to_file(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let back: SimExport = serde_json::from_str(&text).unwrap();
        assert_eq!(back.duration_sec, 1.0);
        assert_eq!(back.frames[0].events[0].message, "started");
        assert!(back.passed);
    }
}
