//! Ground truth oracle for simulation.
//!
//! The Oracle remembers what was published on every topic and checks the
//! scene against it:
//! - One renderable per topic that has received a message
//! - Primitive accounting (live = allocated - released, no leaks)
//! - Transforms and sphere scales derived from the latest message
//! - Covariance spheres created once and reused until disposal

use crate::error::SimError;
use crate::source::PublishedPose;
use nalgebra::Vector3;
use std::collections::HashMap;
use studio_core::diagnostics::DiagnosticSummary;
use studio_core::{DiagnosticsConfig, PoseRenderable, PrimitiveId, SceneExtension};

/// Tolerance for float comparisons against published values
const EPSILON: f64 = 1e-9;

fn close(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() <= epsilon * a.abs().max(b.abs()).max(1.0)
}

/// What the oracle knows about the last message sent on a topic.
#[derive(Debug, Clone)]
enum LastSent {
    /// Well-formed message with known content
    Intact(PublishedPose),

    /// Damaged message; only structural invariants apply
    Damaged,
}

/// Ground truth oracle.
#[derive(Debug, Default)]
pub struct Oracle {
    sent: HashMap<String, LastSent>,

    /// First sphere seen per topic
    spheres: HashMap<String, PrimitiveId>,

    /// Number of completed scene checks
    checks: u64,
}

impl Oracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a delivered message. `None` marks a damaged one.
    pub fn record(&mut self, topic: &str, published: Option<PublishedPose>) {
        let last = match published {
            Some(pose) => LastSent::Intact(pose),
            None => LastSent::Damaged,
        };
        self.sent.insert(topic.to_string(), last);
    }

    /// Forget a topic whose renderable was disposed.
    pub fn forget(&mut self, topic: &str) {
        self.sent.remove(topic);
        self.spheres.remove(topic);
    }

    pub fn forget_all(&mut self) {
        self.sent.clear();
        self.spheres.clear();
    }

    pub fn tracked_topics(&self) -> usize {
        self.sent.len()
    }

    pub fn checks(&self) -> u64 {
        self.checks
    }

    /// Check every scene invariant.
    pub fn check_scene(&mut self, tick: u64, scene: &SceneExtension) -> Result<(), SimError> {
        let stats = scene.stats();

        if stats.live_primitives as u64 != stats.allocations - stats.releases {
            return Err(SimError::invariant(
                tick,
                format!(
                    "live primitives {} != allocations {} - releases {}",
                    stats.live_primitives, stats.allocations, stats.releases
                ),
            ));
        }
        if stats.live_primitives != stats.renderables + stats.spheres {
            return Err(SimError::invariant(
                tick,
                format!(
                    "{} live primitives for {} renderables and {} spheres",
                    stats.live_primitives, stats.renderables, stats.spheres
                ),
            ));
        }
        if stats.renderables != self.sent.len() {
            return Err(SimError::invariant(
                tick,
                format!(
                    "{} renderables but {} topics received messages",
                    stats.renderables,
                    self.sent.len()
                ),
            ));
        }

        for (topic, last) in &self.sent {
            let renderable = scene
                .renderable(topic)
                .ok_or_else(|| SimError::invariant(tick, format!("no renderable for {}", topic)))?;
            check_renderable(tick, scene, renderable)?;
            if let LastSent::Intact(published) = last {
                check_published(tick, renderable, published)?;
            }
        }

        for renderable in scene.renderables() {
            let Some(sphere) = renderable.sphere() else {
                continue;
            };
            let first = *self
                .spheres
                .entry(renderable.topic().to_string())
                .or_insert(sphere);
            if first != sphere {
                return Err(SimError::invariant(
                    tick,
                    format!("sphere for {} reallocated ({} -> {})", renderable.topic(), first, sphere),
                ));
            }
        }

        self.checks += 1;
        Ok(())
    }
}

fn check_renderable(tick: u64, scene: &SceneExtension, renderable: &PoseRenderable) -> Result<(), SimError> {
    let topic = renderable.topic();
    let graph = scene.graph();
    let message = renderable.message();
    let settings = renderable.settings();

    if *settings != scene.effective_settings(topic) {
        return Err(SimError::invariant(tick, format!("stale settings on {}", topic)));
    }

    let arrow = graph
        .node(renderable.arrow())
        .ok_or_else(|| SimError::invariant(tick, format!("arrow of {} not in graph", topic)))?;

    if arrow.frame_id != message.header.frame_id || renderable.frame_id() != message.header.frame_id {
        return Err(SimError::invariant(
            tick,
            format!("{} drawn in '{}', message frame '{}'", topic, arrow.frame_id, message.header.frame_id),
        ));
    }
    if arrow.position != message.pose.position || !arrow.position.iter().all(|v| v.is_finite()) {
        return Err(SimError::invariant(tick, format!("arrow of {} not at message position", topic)));
    }
    if !close(arrow.orientation.norm(), 1.0, 1e-6) {
        return Err(SimError::invariant(tick, format!("non-unit orientation on {}", topic)));
    }
    if arrow.visible != settings.visible {
        return Err(SimError::invariant(tick, format!("arrow visibility of {} ignores settings", topic)));
    }
    if arrow.scale != Vector3::from(settings.scale) {
        return Err(SimError::invariant(tick, format!("arrow scale of {} ignores settings", topic)));
    }

    let expects_sphere = settings.show_covariance && message.covariance.is_some();
    match (renderable.sphere(), message.covariance) {
        (Some(id), covariance) => {
            let sphere = graph
                .node(id)
                .ok_or_else(|| SimError::invariant(tick, format!("sphere of {} not in graph", topic)))?;
            let visible = expects_sphere && settings.visible;
            if sphere.visible != visible {
                return Err(SimError::invariant(
                    tick,
                    format!("sphere of {} visible={} expected {}", topic, sphere.visible, visible),
                ));
            }
            if let (true, Some(covariance)) = (expects_sphere, covariance) {
                let expected = covariance.position_variances().map(|v| v.max(0.0).sqrt());
                let matches = sphere
                    .scale
                    .iter()
                    .zip(expected.iter())
                    .all(|(a, b)| close(*a, *b, EPSILON));
                if !matches || sphere.position != message.pose.position {
                    return Err(SimError::invariant(tick, format!("sphere of {} out of date", topic)));
                }
            }
        }
        (None, _) if expects_sphere => {
            return Err(SimError::invariant(tick, format!("{} has covariance but no sphere", topic)));
        }
        (None, _) => {}
    }
    Ok(())
}

fn check_published(tick: u64, renderable: &PoseRenderable, published: &PublishedPose) -> Result<(), SimError> {
    let topic = renderable.topic();
    let message = renderable.message();

    if message.header.frame_id != published.frame_id || message.header.stamp_ns != published.stamp_ns {
        return Err(SimError::invariant(tick, format!("{} header differs from published", topic)));
    }
    let position_matches = message
        .pose
        .position
        .iter()
        .zip(published.position.iter())
        .all(|(a, b)| close(*a, *b, EPSILON));
    if !position_matches {
        return Err(SimError::invariant(tick, format!("{} position differs from published", topic)));
    }
    if message.covariance.map(|c| c.0) != published.covariance {
        return Err(SimError::invariant(tick, format!("{} covariance differs from published", topic)));
    }
    Ok(())
}

/// Check a diagnostics summary against its config.
pub fn check_summary(
    tick: u64,
    summary: &DiagnosticSummary<'_>,
    config: &DiagnosticsConfig,
) -> Result<(), SimError> {
    // Pinned entries keep pin order
    let mut pin_positions = summary.pinned.iter().map(|info| {
        config
            .pinned_ids
            .iter()
            .position(|id| *id == info.id)
            .unwrap_or(usize::MAX)
    });
    let mut previous = None;
    for position in &mut pin_positions {
        if position == usize::MAX || previous.is_some_and(|p| p >= position) {
            return Err(SimError::invariant(tick, "pinned entries out of pin order"));
        }
        previous = Some(position);
    }

    let filter = config.hardware_id_filter.to_lowercase();
    for info in &summary.entries {
        if config.is_pinned(&info.id) {
            return Err(SimError::invariant(tick, format!("{} listed twice", info.id)));
        }
        if info.level() < config.min_level {
            return Err(SimError::invariant(tick, format!("{} below minimum level", info.id)));
        }
        if !info.id.hardware_id.to_lowercase().contains(&filter) {
            return Err(SimError::invariant(tick, format!("{} fails hardware filter", info.id)));
        }
    }

    let sorted = summary.entries.windows(2).all(|w| {
        if config.sort_by_level {
            (w[1].level(), &w[0].display_name) <= (w[0].level(), &w[1].display_name)
        } else {
            w[0].display_name <= w[1].display_name
        }
    });
    if !sorted {
        return Err(SimError::invariant(tick, "diagnostic entries out of order"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MessageSource;
    use studio_core::{DiagnosticId, DiagnosticLevel, DiagnosticsAggregator};

    fn scene_with(source: &mut MessageSource, oracle: &mut Oracle) -> SceneExtension {
        let mut scene = SceneExtension::default();
        scene.set_topics(&source.topics());
        for (event, published) in source.publish_all(1_000_000) {
            scene.handle_event(&event);
            oracle.record(&event.topic, Some(published));
        }
        scene
    }

    #[test]
    fn test_consistent_scene_passes() {
        let mut source = MessageSource::with_robots(5, 9);
        let mut oracle = Oracle::new();
        let scene = scene_with(&mut source, &mut oracle);

        oracle.check_scene(0, &scene).unwrap();
        assert_eq!(oracle.checks(), 1);
        assert_eq!(oracle.tracked_topics(), 9);
    }

    #[test]
    fn test_missing_renderable_is_detected() {
        let mut source = MessageSource::with_robots(5, 3);
        let mut oracle = Oracle::new();
        let mut scene = scene_with(&mut source, &mut oracle);

        scene.dispose("/robot_0/pose");
        assert!(matches!(
            oracle.check_scene(1, &scene),
            Err(SimError::Invariant { tick: 1, .. })
        ));

        oracle.forget("/robot_0/pose");
        oracle.check_scene(2, &scene).unwrap();
    }

    #[test]
    fn test_unreported_message_is_detected() {
        let mut source = MessageSource::with_robots(5, 1);
        let mut oracle = Oracle::new();
        let mut scene = scene_with(&mut source, &mut oracle);

        source.step(1.0);
        let (event, _) = source.publish(0, 2_000_000).unwrap();
        scene.handle_event(&event);
        assert!(oracle.check_scene(0, &scene).is_err());
    }

    #[test]
    fn test_summary_check() {
        let mut source = MessageSource::new(9);
        let mut agg = DiagnosticsAggregator::new();
        for _ in 0..10 {
            agg.ingest_value(&source.diagnostic_array(0, &["imu", "lidar", "gps"], 8));
        }

        let mut config = DiagnosticsConfig::default();
        config.pin(DiagnosticId::new("lidar", "check_1"));
        config.pin(DiagnosticId::new("imu", "check_0"));
        config.min_level = DiagnosticLevel::Warn;
        config.hardware_id_filter = "I".to_string();

        check_summary(0, &agg.summary(&config), &config).unwrap();
    }
}
