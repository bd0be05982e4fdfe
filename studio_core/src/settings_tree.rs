//! Settings tree adapter.
//!
//! Describes the editable per-topic settings as a declarative tree for the
//! host UI, and routes the edits that come back into the scene extension.

use crate::color::Rgba;
use crate::registry::PoseSchema;
use crate::scene_extension::SceneExtension;
use crate::settings::{PoseField, PoseSettings, SettingsPath, SettingsValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Error shown next to a color field that could not be parsed
pub const INVALID_COLOR: &str = "Invalid color, using default";

/// Input widget for one field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "input", rename_all = "lowercase")]
pub enum FieldInput {
    Boolean,
    Vec3 {
        labels: [&'static str; 3],
        step: f64,
        precision: u8,
        min: Option<f64>,
    },
    Rgba,
    Number {
        step: f64,
        min: Option<f64>,
        max: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingsField {
    /// Wire name, the last segment of the edit path
    pub name: &'static str,
    pub label: &'static str,
    #[serde(flatten)]
    pub input: FieldInput,
    pub value: SettingsValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Node for one topic, fields in display order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingsTreeNode {
    pub label: String,
    pub visible: bool,
    pub fields: Vec<SettingsField>,
}

impl SettingsTreeNode {
    pub fn field(&self, name: &str) -> Option<&SettingsField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// `topics` root of the tree
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SettingsTree {
    pub topics: BTreeMap<String, SettingsTreeNode>,
}

/// An edit coming back from the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsAction {
    pub path: Vec<String>,
    pub value: SettingsValue,
}

impl SettingsAction {
    pub fn new(path: &SettingsPath, value: SettingsValue) -> Self {
        Self {
            path: path.segments(),
            value,
        }
    }
}

fn color_error(value: &str) -> Option<String> {
    match Rgba::parse(value) {
        Some(_) => None,
        None => Some(INVALID_COLOR.to_string()),
    }
}

fn build_field(field: PoseField, settings: &PoseSettings) -> SettingsField {
    let (label, input, value, error) = match field {
        PoseField::Visible => (
            "Visible",
            FieldInput::Boolean,
            SettingsValue::Bool(settings.visible),
            None,
        ),
        PoseField::Scale => (
            "Scale",
            FieldInput::Vec3 {
                labels: ["X", "Y", "Z"],
                step: 0.1,
                precision: 3,
                min: Some(0.0),
            },
            SettingsValue::Vec3(settings.scale),
            None,
        ),
        PoseField::Color => (
            "Color",
            FieldInput::Rgba,
            SettingsValue::String(settings.color.clone()),
            color_error(&settings.color),
        ),
        PoseField::ShowCovariance => (
            "Covariance",
            FieldInput::Boolean,
            SettingsValue::Bool(settings.show_covariance),
            None,
        ),
        PoseField::CovarianceColor => (
            "Covariance color",
            FieldInput::Rgba,
            SettingsValue::String(settings.covariance_color.clone()),
            color_error(&settings.covariance_color),
        ),
    };
    SettingsField {
        name: field.key(),
        label,
        input,
        value,
        error,
    }
}

/// Node for one topic. Covariance fields appear only for schemas that
/// carry a covariance.
pub fn topic_node(topic: &str, schema: PoseSchema, settings: &PoseSettings) -> SettingsTreeNode {
    let fields = PoseField::ALL
        .into_iter()
        .filter(|field| {
            schema.has_covariance()
                || !matches!(field, PoseField::ShowCovariance | PoseField::CovarianceColor)
        })
        .map(|field| build_field(field, settings))
        .collect();

    SettingsTreeNode {
        label: topic.to_string(),
        visible: settings.visible,
        fields,
    }
}

impl SceneExtension {
    /// Tree covering every subscribed topic.
    pub fn settings_tree(&self) -> SettingsTree {
        let topics = self
            .subscriptions()
            .map(|(topic, schema)| {
                let effective = self.effective_settings(topic);
                (topic.clone(), topic_node(topic, *schema, &effective))
            })
            .collect();
        SettingsTree { topics }
    }

    /// Route a UI edit.
    pub fn handle_action(&mut self, action: &SettingsAction) -> bool {
        self.on_settings_edit(action.path.as_slice(), &action.value)
    }
}
