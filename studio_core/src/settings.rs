//! The "SETTINGS" Resolver - per-topic appearance settings
//!
//! Effective settings are always `defaults` overridden field-by-field by
//! whatever partial settings the user saved for a topic. Saved overrides are
//! never mutated in place: an edit builds a new record from the old one and
//! replaces it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default arrow color (opaque violet)
pub const DEFAULT_COLOR: &str = "#7c6bffff";

/// Default covariance sphere color (translucent magenta)
pub const DEFAULT_COVARIANCE_COLOR: &str = "#c66bff40";

// ============================================================================
// EFFECTIVE SETTINGS
// ============================================================================

/// Fully-resolved appearance of one pose topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoseSettings {
    /// Whether the renderable is drawn at all
    pub visible: bool,

    /// Arrow scale [length, width, height]
    pub scale: [f64; 3],

    /// Arrow color as an RGBA string
    pub color: String,

    /// Whether the covariance sphere is drawn (when the message has one)
    pub show_covariance: bool,

    /// Covariance sphere color as an RGBA string
    pub covariance_color: String,
}

impl Default for PoseSettings {
    fn default() -> Self {
        Self {
            visible: true,
            scale: [1.0, 0.15, 0.15],
            color: DEFAULT_COLOR.to_string(),
            show_covariance: true,
            covariance_color: DEFAULT_COVARIANCE_COLOR.to_string(),
        }
    }
}

// ============================================================================
// PARTIAL (USER) SETTINGS
// ============================================================================

/// User-saved overrides for one topic. Unset fields fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartialPoseSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<[f64; 3]>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_covariance: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub covariance_color: Option<String>,
}

impl PartialPoseSettings {
    /// Field-wise merge where `later` wins.
    pub fn merge(&self, later: &PartialPoseSettings) -> PartialPoseSettings {
        PartialPoseSettings {
            visible: later.visible.or(self.visible),
            scale: later.scale.or(self.scale),
            color: later.color.clone().or_else(|| self.color.clone()),
            show_covariance: later.show_covariance.or(self.show_covariance),
            covariance_color: later
                .covariance_color
                .clone()
                .or_else(|| self.covariance_color.clone()),
        }
    }

    /// Overlay onto fully-populated settings.
    pub fn apply_to(&self, base: &PoseSettings) -> PoseSettings {
        PoseSettings {
            visible: self.visible.unwrap_or(base.visible),
            scale: self.scale.unwrap_or(base.scale),
            color: self.color.clone().unwrap_or_else(|| base.color.clone()),
            show_covariance: self.show_covariance.unwrap_or(base.show_covariance),
            covariance_color: self
                .covariance_color
                .clone()
                .unwrap_or_else(|| base.covariance_color.clone()),
        }
    }

    /// Copy-on-write edit: a new record with `field` set to `value`, or
    /// `None` when the value's type does not fit the field.
    pub fn with_field(&self, field: PoseField, value: &SettingsValue) -> Option<PartialPoseSettings> {
        let mut next = self.clone();
        match (field, value) {
            (PoseField::Visible, SettingsValue::Bool(v)) => next.visible = Some(*v),
            (PoseField::ShowCovariance, SettingsValue::Bool(v)) => next.show_covariance = Some(*v),
            (PoseField::Scale, SettingsValue::Vec3(v)) if v.iter().all(|c| c.is_finite()) => {
                next.scale = Some(*v)
            }
            (PoseField::Color, SettingsValue::String(v)) => next.color = Some(v.clone()),
            (PoseField::CovarianceColor, SettingsValue::String(v)) => {
                next.covariance_color = Some(v.clone())
            }
            _ => return None,
        }
        Some(next)
    }

    pub fn is_empty(&self) -> bool {
        *self == PartialPoseSettings::default()
    }
}

/// Resolve the effective settings for `topic`.
///
/// Pure and idempotent: `defaults` overridden by any saved `overrides`.
pub fn resolve(
    topic: &str,
    overrides: Option<&PartialPoseSettings>,
    defaults: &PoseSettings,
) -> PoseSettings {
    match overrides {
        Some(partial) => {
            tracing::trace!(topic, "resolving settings with user overrides");
            partial.apply_to(defaults)
        }
        None => defaults.clone(),
    }
}

// ============================================================================
// STRUCTURED EDIT PATHS
// ============================================================================

/// Editable per-topic fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoseField {
    Visible,
    Scale,
    Color,
    ShowCovariance,
    CovarianceColor,
}

impl PoseField {
    pub const ALL: [PoseField; 5] = [
        PoseField::Visible,
        PoseField::Scale,
        PoseField::Color,
        PoseField::ShowCovariance,
        PoseField::CovarianceColor,
    ];

    /// Wire name used in settings paths and persisted config.
    pub fn key(self) -> &'static str {
        match self {
            PoseField::Visible => "visible",
            PoseField::Scale => "scale",
            PoseField::Color => "color",
            PoseField::ShowCovariance => "showCovariance",
            PoseField::CovarianceColor => "covarianceColor",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        PoseField::ALL.into_iter().find(|f| f.key() == key)
    }
}

/// Values carried by settings edit actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingsValue {
    Bool(bool),
    Number(f64),
    Vec3([f64; 3]),
    String(String),
}

/// Address of one editable setting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsPath {
    /// `["topics", topic, field]`
    Topic { topic: String, field: PoseField },
}

impl SettingsPath {
    /// Root segment of every per-topic path
    pub const TOPICS: &'static str = "topics";

    /// Parse a hierarchical path. Any other shape yields `None`.
    pub fn parse<S: AsRef<str>>(path: &[S]) -> Option<Self> {
        match path {
            [root, topic, field] if root.as_ref() == Self::TOPICS => {
                let field = PoseField::from_key(field.as_ref())?;
                Some(SettingsPath::Topic {
                    topic: topic.as_ref().to_string(),
                    field,
                })
            }
            _ => None,
        }
    }

    pub fn topic(&self) -> &str {
        match self {
            SettingsPath::Topic { topic, .. } => topic,
        }
    }

    /// Back to the hierarchical form.
    pub fn segments(&self) -> Vec<String> {
        match self {
            SettingsPath::Topic { topic, field } => vec![
                Self::TOPICS.to_string(),
                topic.clone(),
                field.key().to_string(),
            ],
        }
    }
}

// ============================================================================
// SETTINGS STORE
// ============================================================================

/// Persisted per-topic overrides, keyed by topic name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicSettingsStore {
    topics: BTreeMap<String, PartialPoseSettings>,
}

impl TopicSettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, topic: &str) -> Option<&PartialPoseSettings> {
        self.topics.get(topic)
    }

    /// Replace the overrides for `topic`.
    pub fn set(&mut self, topic: &str, settings: PartialPoseSettings) {
        self.topics.insert(topic.to_string(), settings);
    }

    /// Apply an edit. Returns `false` (and changes nothing) when the value
    /// does not fit the addressed field.
    pub fn apply_edit(&mut self, path: &SettingsPath, value: &SettingsValue) -> bool {
        match path {
            SettingsPath::Topic { topic, field } => {
                let current = self.topics.get(topic).cloned().unwrap_or_default();
                match current.with_field(*field, value) {
                    Some(next) => {
                        self.topics.insert(topic.clone(), next);
                        true
                    }
                    None => false,
                }
            }
        }
    }

    /// Effective settings for `topic` against `defaults`.
    pub fn effective(&self, topic: &str, defaults: &PoseSettings) -> PoseSettings {
        resolve(topic, self.get(topic), defaults)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PartialPoseSettings)> {
        self.topics.iter()
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_resolve_without_overrides_is_defaults() {
        let defaults = PoseSettings::default();
        assert_eq!(resolve("/pose", None, &defaults), defaults);
    }

    #[test]
    fn test_unset_fields_fall_back_to_defaults() {
        let defaults = PoseSettings::default();
        let partial = PartialPoseSettings {
            color: Some("#ff0000ff".to_string()),
            ..Default::default()
        };

        let effective = resolve("/pose", Some(&partial), &defaults);
        assert_eq!(effective.color, "#ff0000ff");
        assert_eq!(effective.scale, defaults.scale);
        assert_eq!(effective.covariance_color, defaults.covariance_color);
        assert!(effective.show_covariance);
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let defaults = PoseSettings::default();
        let partial = PartialPoseSettings {
            visible: Some(false),
            ..Default::default()
        };
        let once = resolve("/a", Some(&partial), &defaults);
        let twice = resolve("/a", Some(&partial), &once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_with_field_rejects_mismatched_types() {
        let partial = PartialPoseSettings::default();
        assert!(partial
            .with_field(PoseField::Visible, &SettingsValue::String("yes".into()))
            .is_none());
        assert!(partial
            .with_field(PoseField::Scale, &SettingsValue::Number(2.0))
            .is_none());
        assert!(partial
            .with_field(PoseField::Scale, &SettingsValue::Vec3([1.0, f64::NAN, 1.0]))
            .is_none());
    }

    #[test]
    fn test_with_field_is_copy_on_write() {
        let original = PartialPoseSettings::default();
        let edited = original
            .with_field(PoseField::ShowCovariance, &SettingsValue::Bool(false))
            .unwrap();
        assert!(original.is_empty());
        assert_eq!(edited.show_covariance, Some(false));
    }

    #[test]
    fn test_path_parsing() {
        assert_eq!(
            SettingsPath::parse(&["topics", "/pose", "showCovariance"]),
            Some(SettingsPath::Topic {
                topic: "/pose".into(),
                field: PoseField::ShowCovariance
            })
        );
        assert!(SettingsPath::parse(&["topics", "/pose"]).is_none());
        assert!(SettingsPath::parse(&["layers", "/pose", "color"]).is_none());
        assert!(SettingsPath::parse(&["topics", "/pose", "nope"]).is_none());
        assert!(SettingsPath::parse::<&str>(&[]).is_none());
    }

    #[test]
    fn test_path_segments_round_trip() {
        let path = SettingsPath::Topic {
            topic: "/odom".into(),
            field: PoseField::CovarianceColor,
        };
        let segments = path.segments();
        assert_eq!(SettingsPath::parse(segments.as_slice()), Some(path));
    }

    #[test]
    fn test_store_apply_edit() {
        let mut store = TopicSettingsStore::new();
        let path = SettingsPath::parse(&["topics", "/pose", "scale"]).unwrap();

        assert!(store.apply_edit(&path, &SettingsValue::Vec3([2.0, 0.5, 0.5])));
        assert!(!store.apply_edit(&path, &SettingsValue::Bool(true)));

        let effective = store.effective("/pose", &PoseSettings::default());
        assert_eq!(effective.scale, [2.0, 0.5, 0.5]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_partial_serializes_only_set_fields() {
        let partial = PartialPoseSettings {
            show_covariance: Some(false),
            ..Default::default()
        };
        let json = serde_json::to_string(&partial).unwrap();
        assert_eq!(json, r#"{"showCovariance":false}"#);
    }

    fn arb_partial() -> impl Strategy<Value = PartialPoseSettings> {
        (
            proptest::option::of(any::<bool>()),
            proptest::option::of(proptest::array::uniform3(-100.0f64..100.0)),
            proptest::option::of("#[0-9a-f]{8}"),
            proptest::option::of(any::<bool>()),
            proptest::option::of("#[0-9a-f]{8}"),
        )
            .prop_map(|(visible, scale, color, show_covariance, covariance_color)| {
                PartialPoseSettings {
                    visible,
                    scale,
                    color,
                    show_covariance,
                    covariance_color,
                }
            })
    }

    proptest! {
        #[test]
        fn prop_sequential_resolution_equals_merged(o1 in arb_partial(), o2 in arb_partial()) {
            let defaults = PoseSettings::default();
            let sequential = resolve("/t", Some(&o2), &resolve("/t", Some(&o1), &defaults));
            let merged = resolve("/t", Some(&o1.merge(&o2)), &defaults);
            prop_assert_eq!(sequential, merged);
        }

        #[test]
        fn prop_merge_is_associative(a in arb_partial(), b in arb_partial(), c in arb_partial()) {
            prop_assert_eq!(a.merge(&b).merge(&c), a.merge(&b.merge(&c)));
        }
    }
}
