//! Datatype registry and subscription types.
//!
//! Maps datatype names to the schema (and thus normalizer) that handles
//! them. The lookup happens once, when a topic is subscribed; message
//! delivery afterwards goes straight to the resolved normalizer.

use crate::messages::{
    normalize_pose_in_frame, normalize_pose_stamped, normalize_pose_with_covariance_stamped,
    PoseMessage,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub const POSE_STAMPED_DATATYPES: &[&str] = &[
    "geometry_msgs/PoseStamped",
    "geometry_msgs/msg/PoseStamped",
    "ros.geometry_msgs.PoseStamped",
];

pub const POSE_WITH_COVARIANCE_STAMPED_DATATYPES: &[&str] = &[
    "geometry_msgs/PoseWithCovarianceStamped",
    "geometry_msgs/msg/PoseWithCovarianceStamped",
    "ros.geometry_msgs.PoseWithCovarianceStamped",
];

pub const POSE_IN_FRAME_DATATYPES: &[&str] = &[
    "foxglove.PoseInFrame",
    "foxglove_msgs/PoseInFrame",
    "foxglove_msgs/msg/PoseInFrame",
];

pub const DIAGNOSTIC_ARRAY_DATATYPES: &[&str] = &[
    "diagnostic_msgs/DiagnosticArray",
    "diagnostic_msgs/msg/DiagnosticArray",
    "ros.diagnostic_msgs.DiagnosticArray",
];

/// Normalizer signature shared by all pose schemas
pub type PoseNormalizer = fn(&Value) -> PoseMessage;

/// Pose-bearing message schemas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoseSchema {
    PoseStamped,
    PoseWithCovarianceStamped,
    PoseInFrame,
}

impl PoseSchema {
    pub fn normalizer(self) -> PoseNormalizer {
        match self {
            PoseSchema::PoseStamped => normalize_pose_stamped,
            PoseSchema::PoseWithCovarianceStamped => normalize_pose_with_covariance_stamped,
            PoseSchema::PoseInFrame => normalize_pose_in_frame,
        }
    }

    pub fn normalize(self, value: &Value) -> PoseMessage {
        (self.normalizer())(value)
    }

    /// Whether messages of this schema carry a covariance matrix.
    pub fn has_covariance(self) -> bool {
        matches!(self, PoseSchema::PoseWithCovarianceStamped)
    }

    pub fn name(self) -> &'static str {
        match self {
            PoseSchema::PoseStamped => "PoseStamped",
            PoseSchema::PoseWithCovarianceStamped => "PoseWithCovarianceStamped",
            PoseSchema::PoseInFrame => "PoseInFrame",
        }
    }
}

/// A named channel of one datatype
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    pub datatype: String,
}

impl Topic {
    pub fn new(name: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            datatype: datatype.into(),
        }
    }
}

/// One delivery from the message pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub topic: String,

    /// Time the message was received, in nanoseconds
    pub receive_time_ns: u64,

    /// Raw, possibly partial message body
    pub message: Value,
}

/// Registry mapping datatype names to pose schemas
#[derive(Debug, Clone, Default)]
pub struct DatatypeRegistry {
    schemas: HashMap<String, PoseSchema>,
}

impl DatatypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-populated with every supported pose datatype.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for datatype in POSE_STAMPED_DATATYPES {
            registry.register(datatype, PoseSchema::PoseStamped);
        }
        for datatype in POSE_WITH_COVARIANCE_STAMPED_DATATYPES {
            registry.register(datatype, PoseSchema::PoseWithCovarianceStamped);
        }
        for datatype in POSE_IN_FRAME_DATATYPES {
            registry.register(datatype, PoseSchema::PoseInFrame);
        }
        registry
    }

    pub fn register(&mut self, datatype: &str, schema: PoseSchema) {
        self.schemas.insert(datatype.to_string(), schema);
    }

    pub fn resolve(&self, datatype: &str) -> Option<PoseSchema> {
        self.schemas.get(datatype).copied()
    }

    pub fn is_supported(&self, datatype: &str) -> bool {
        self.schemas.contains_key(datatype)
    }

    /// Registered datatype names, sorted.
    pub fn datatypes(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_cover_ros1_and_ros2() {
        let registry = DatatypeRegistry::with_defaults();
        assert_eq!(
            registry.resolve("geometry_msgs/PoseStamped"),
            Some(PoseSchema::PoseStamped)
        );
        assert_eq!(
            registry.resolve("geometry_msgs/msg/PoseWithCovarianceStamped"),
            Some(PoseSchema::PoseWithCovarianceStamped)
        );
        assert_eq!(
            registry.resolve("foxglove.PoseInFrame"),
            Some(PoseSchema::PoseInFrame)
        );
        assert!(!registry.is_supported("sensor_msgs/Image"));
        assert_eq!(registry.datatypes().len(), 9);
    }

    #[test]
    fn test_schema_dispatch() {
        let value = json!({ "pose": { "covariance": [1.0] } });
        assert!(PoseSchema::PoseWithCovarianceStamped
            .normalize(&value)
            .covariance
            .is_some());
        assert!(PoseSchema::PoseStamped.normalize(&value).covariance.is_none());
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = DatatypeRegistry::new();
        registry.register("my_msgs/Pose", PoseSchema::PoseStamped);
        assert!(registry.is_supported("my_msgs/Pose"));
        assert!(!registry.is_supported("geometry_msgs/PoseStamped"));
    }
}
