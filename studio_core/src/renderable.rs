//! Renderable entities - one per pose topic.
//!
//! A renderable owns exactly one arrow primitive and at most one covariance
//! sphere. Both live in the `SceneGraph`; the renderable only holds their
//! handles and mutates the nodes in place on every message or settings
//! change.

use crate::color::Rgba;
use crate::messages::{Covariance, PoseMessage};
use crate::registry::PoseSchema;
use crate::scene_graph::{PrimitiveId, PrimitiveKind, SceneGraph, SceneNode};
use crate::settings::{PoseSettings, DEFAULT_COLOR, DEFAULT_COVARIANCE_COLOR};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identity of a renderable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenderableId(pub Uuid);

impl std::fmt::Display for RenderableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Which message schema a renderable was built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderableKind {
    Pose,
    PoseWithCovariance,
    PoseInFrame,
}

impl From<PoseSchema> for RenderableKind {
    fn from(schema: PoseSchema) -> Self {
        match schema {
            PoseSchema::PoseStamped => RenderableKind::Pose,
            PoseSchema::PoseWithCovarianceStamped => RenderableKind::PoseWithCovariance,
            PoseSchema::PoseInFrame => RenderableKind::PoseInFrame,
        }
    }
}

/// Primitives a renderable currently owns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub has_arrow: bool,
    pub has_sphere: bool,
}

// ============================================================================
// GEOMETRY SYNTHESIS
// ============================================================================

/// Arrow appearance derived from settings only
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArrowGeometry {
    pub scale: Vector3<f64>,
    pub color: Rgba,
}

/// Covariance sphere appearance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereGeometry {
    /// Per-axis standard deviation
    pub scale: Vector3<f64>,
    pub color: Rgba,
}

fn default_color() -> Rgba {
    Rgba::parse(DEFAULT_COLOR).unwrap_or(Rgba::WHITE)
}

fn default_covariance_color() -> Rgba {
    Rgba::parse(DEFAULT_COVARIANCE_COLOR).unwrap_or(Rgba::WHITE)
}

pub fn arrow_geometry(settings: &PoseSettings) -> ArrowGeometry {
    let [x, y, z] = settings.scale;
    ArrowGeometry {
        scale: Vector3::new(x, y, z),
        color: Rgba::parse_or(&settings.color, default_color()),
    }
}

/// Standard deviation per position axis. Negative variances clamp to zero.
pub fn covariance_sphere_scale(covariance: &Covariance) -> Vector3<f64> {
    covariance
        .position_variances()
        .map(|variance| variance.max(0.0).sqrt())
}

pub fn sphere_geometry(covariance: &Covariance, settings: &PoseSettings) -> SphereGeometry {
    SphereGeometry {
        scale: covariance_sphere_scale(covariance),
        color: Rgba::parse_or(&settings.covariance_color, default_covariance_color()),
    }
}

// ============================================================================
// RENDERABLE
// ============================================================================

/// Retained visual state of one pose topic
#[derive(Debug)]
pub struct PoseRenderable {
    id: RenderableId,
    topic: String,
    kind: RenderableKind,

    /// Latest normalized message
    message: PoseMessage,

    receive_time_ns: u64,
    settings: PoseSettings,

    arrow: PrimitiveId,
    sphere: Option<PrimitiveId>,
}

impl PoseRenderable {
    /// Renderable for a `geometry_msgs/PoseStamped` topic.
    pub fn pose(
        graph: &mut SceneGraph,
        topic: &str,
        message: PoseMessage,
        receive_time_ns: u64,
        settings: PoseSettings,
    ) -> Self {
        Self::create(graph, RenderableKind::Pose, topic, message, receive_time_ns, settings)
    }

    /// Renderable for a `geometry_msgs/PoseWithCovarianceStamped` topic.
    pub fn pose_with_covariance(
        graph: &mut SceneGraph,
        topic: &str,
        message: PoseMessage,
        receive_time_ns: u64,
        settings: PoseSettings,
    ) -> Self {
        Self::create(
            graph,
            RenderableKind::PoseWithCovariance,
            topic,
            message,
            receive_time_ns,
            settings,
        )
    }

    /// Renderable for a `foxglove.PoseInFrame` topic.
    pub fn pose_in_frame(
        graph: &mut SceneGraph,
        topic: &str,
        message: PoseMessage,
        receive_time_ns: u64,
        settings: PoseSettings,
    ) -> Self {
        Self::create(graph, RenderableKind::PoseInFrame, topic, message, receive_time_ns, settings)
    }

    /// Dispatch to the construction function for `schema`.
    pub fn for_schema(
        graph: &mut SceneGraph,
        schema: PoseSchema,
        topic: &str,
        message: PoseMessage,
        receive_time_ns: u64,
        settings: PoseSettings,
    ) -> Self {
        match schema {
            PoseSchema::PoseStamped => Self::pose(graph, topic, message, receive_time_ns, settings),
            PoseSchema::PoseWithCovarianceStamped => {
                Self::pose_with_covariance(graph, topic, message, receive_time_ns, settings)
            }
            PoseSchema::PoseInFrame => {
                Self::pose_in_frame(graph, topic, message, receive_time_ns, settings)
            }
        }
    }

    fn create(
        graph: &mut SceneGraph,
        kind: RenderableKind,
        topic: &str,
        message: PoseMessage,
        receive_time_ns: u64,
        settings: PoseSettings,
    ) -> Self {
        let arrow = graph.allocate(SceneNode::new(PrimitiveKind::Arrow));
        let mut renderable = Self {
            id: RenderableId(Uuid::new_v4()),
            topic: topic.to_string(),
            kind,
            message,
            receive_time_ns,
            settings,
            arrow,
            sphere: None,
        };
        renderable.sync(graph);
        tracing::debug!(topic, id = %renderable.id, ?kind, "created renderable");
        renderable
    }

    /// Store a new message and refresh the primitives in place.
    pub fn update_message(&mut self, graph: &mut SceneGraph, message: PoseMessage, receive_time_ns: u64) {
        self.message = message;
        self.receive_time_ns = receive_time_ns;
        self.sync(graph);
    }

    /// Apply new effective settings. The stored message is left untouched.
    pub fn update_settings(&mut self, graph: &mut SceneGraph, settings: PoseSettings) {
        self.settings = settings;
        self.sync(graph);
    }

    /// Push the current message and settings into the scene graph.
    fn sync(&mut self, graph: &mut SceneGraph) {
        let header = &self.message.header;
        let pose = &self.message.pose;
        let visible = self.settings.visible;

        let arrow = arrow_geometry(&self.settings);
        if let Some(node) = graph.node_mut(self.arrow) {
            node.frame_id.clone_from(&header.frame_id);
            node.position = pose.position;
            node.orientation = pose.orientation;
            node.scale = arrow.scale;
            node.color = arrow.color;
            node.visible = visible;
        }

        let covariance = match self.message.covariance {
            Some(covariance) if self.settings.show_covariance => Some(covariance),
            _ => None,
        };

        match (covariance, self.sphere) {
            (Some(covariance), existing) => {
                let id = match existing {
                    Some(id) => id,
                    None => {
                        let id = graph.allocate(SceneNode::new(PrimitiveKind::Sphere));
                        tracing::debug!(topic = %self.topic, "allocated covariance sphere");
                        self.sphere = Some(id);
                        id
                    }
                };
                let geometry = sphere_geometry(&covariance, &self.settings);
                if let Some(node) = graph.node_mut(id) {
                    node.frame_id.clone_from(&header.frame_id);
                    node.position = pose.position;
                    node.orientation = pose.orientation;
                    node.scale = geometry.scale;
                    node.color = geometry.color;
                    node.visible = visible;
                }
            }
            (None, Some(id)) => {
                if let Some(node) = graph.node_mut(id) {
                    node.visible = false;
                }
            }
            (None, None) => {}
        }
    }

    /// Release every owned primitive. Returns how many were released.
    pub fn dispose(self, graph: &mut SceneGraph) -> usize {
        let mut released = 0;
        if graph.release(self.arrow) {
            released += 1;
        }
        if let Some(sphere) = self.sphere {
            if graph.release(sphere) {
                released += 1;
            }
        }
        tracing::debug!(topic = %self.topic, id = %self.id, released, "disposed renderable");
        released
    }

    pub fn id(&self) -> RenderableId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn kind(&self) -> RenderableKind {
        self.kind
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            has_arrow: true,
            has_sphere: self.sphere.is_some(),
        }
    }

    pub fn frame_id(&self) -> &str {
        &self.message.header.frame_id
    }

    pub fn receive_time_ns(&self) -> u64 {
        self.receive_time_ns
    }

    /// Timestamp carried in the message header.
    pub fn message_time_ns(&self) -> u64 {
        self.message.header.stamp_ns
    }

    pub fn message(&self) -> &PoseMessage {
        &self.message
    }

    pub fn settings(&self) -> &PoseSettings {
        &self.settings
    }

    pub fn arrow(&self) -> PrimitiveId {
        self.arrow
    }

    pub fn sphere(&self) -> Option<PrimitiveId> {
        self.sphere
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn covariance_message(frame: &str, x: f64, y: f64, z: f64) -> PoseMessage {
        let mut values = [0.0; 36];
        values[0] = x;
        values[7] = y;
        values[14] = z;
        let mut message = PoseMessage::default();
        message.header.frame_id = frame.to_string();
        message.covariance = Some(Covariance(values));
        message
    }

    #[test]
    fn test_sphere_scale_is_standard_deviation() {
        let message = covariance_message("map", 0.04, 0.09, 0.01);
        let scale = covariance_sphere_scale(message.covariance.as_ref().unwrap());
        assert_relative_eq!(scale.x, 0.2, epsilon = 1e-12);
        assert_relative_eq!(scale.y, 0.3, epsilon = 1e-12);
        assert_relative_eq!(scale.z, 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_negative_variance_clamps() {
        let message = covariance_message("map", -1.0, 4.0, 0.0);
        let scale = covariance_sphere_scale(message.covariance.as_ref().unwrap());
        assert_eq!(scale, Vector3::new(0.0, 2.0, 0.0));
    }

    #[test]
    fn test_pose_has_arrow_only() {
        let mut graph = SceneGraph::new();
        let renderable = PoseRenderable::pose(
            &mut graph,
            "/pose",
            PoseMessage::default(),
            10,
            PoseSettings::default(),
        );

        assert_eq!(
            renderable.capabilities(),
            Capabilities { has_arrow: true, has_sphere: false }
        );
        assert_eq!(graph.live_count(), 1);
        assert!(graph.node(renderable.arrow()).unwrap().visible);
    }

    #[test]
    fn test_covariance_sphere_toggle_keeps_identity() {
        let mut graph = SceneGraph::new();
        let mut renderable = PoseRenderable::pose_with_covariance(
            &mut graph,
            "/pose",
            covariance_message("map", 0.04, 0.09, 0.01),
            0,
            PoseSettings::default(),
        );
        let sphere = renderable.sphere().unwrap();

        let mut hidden = PoseSettings::default();
        hidden.show_covariance = false;
        renderable.update_settings(&mut graph, hidden);
        assert_eq!(renderable.sphere(), Some(sphere));
        assert!(!graph.node(sphere).unwrap().visible);

        renderable.update_settings(&mut graph, PoseSettings::default());
        assert_eq!(renderable.sphere(), Some(sphere));
        assert!(graph.node(sphere).unwrap().visible);
        assert_eq!(graph.allocations(), 2);
    }

    #[test]
    fn test_sphere_created_lazily() {
        let mut graph = SceneGraph::new();
        let mut hidden = PoseSettings::default();
        hidden.show_covariance = false;

        let mut renderable = PoseRenderable::pose_with_covariance(
            &mut graph,
            "/pose",
            covariance_message("map", 1.0, 1.0, 1.0),
            0,
            hidden,
        );
        assert!(renderable.sphere().is_none());

        renderable.update_settings(&mut graph, PoseSettings::default());
        assert!(renderable.capabilities().has_sphere);
    }

    #[test]
    fn test_invalid_color_falls_back_to_default() {
        let mut settings = PoseSettings::default();
        settings.color = "not a color".to_string();
        let geometry = arrow_geometry(&settings);
        assert_eq!(geometry.color, Rgba::parse(DEFAULT_COLOR).unwrap());
    }

    #[test]
    fn test_update_message_preserves_primitives() {
        let mut graph = SceneGraph::new();
        let mut renderable = PoseRenderable::pose(
            &mut graph,
            "/pose",
            PoseMessage::default(),
            1,
            PoseSettings::default(),
        );
        let arrow = renderable.arrow();

        let mut next = PoseMessage::default();
        next.header.frame_id = "odom".to_string();
        next.header.stamp_ns = 42;
        next.pose.position = Vector3::new(1.0, 2.0, 3.0);
        renderable.update_message(&mut graph, next, 2);

        assert_eq!(renderable.arrow(), arrow);
        assert_eq!(renderable.frame_id(), "odom");
        assert_eq!(renderable.message_time_ns(), 42);
        assert_eq!(renderable.receive_time_ns(), 2);
        assert_eq!(graph.node(arrow).unwrap().position, Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(graph.allocations(), 1);
    }

    #[test]
    fn test_dispose_releases_everything() {
        let mut graph = SceneGraph::new();
        let renderable = PoseRenderable::pose_with_covariance(
            &mut graph,
            "/pose",
            covariance_message("map", 1.0, 1.0, 1.0),
            0,
            PoseSettings::default(),
        );
        assert_eq!(renderable.dispose(&mut graph), 2);
        assert_eq!(graph.live_count(), 0);
    }
}
