//! The "SCENE" Extension - topic-keyed registry of pose renderables
//!
//! Consumes the message pipeline and keeps one `PoseRenderable` per
//! subscribed topic. The extension owns the scene graph, the datatype
//! registry and the persisted per-topic settings; everything is mutated only
//! through `&mut self`.

use crate::registry::{DatatypeRegistry, MessageEvent, PoseSchema, Topic};
use crate::renderable::{PoseRenderable, RenderableKind};
use crate::scene_graph::SceneGraph;
use crate::settings::{PoseSettings, SettingsPath, SettingsValue, TopicSettingsStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Configuration for the scene extension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    /// Settings used for fields a topic has no override for
    pub defaults: PoseSettings,

    /// Debug-log topics whose datatype has no registered schema
    pub log_unsupported: bool,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            defaults: PoseSettings::default(),
            log_unsupported: true,
        }
    }
}

/// Counters for the harness and UI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneStats {
    pub subscriptions: usize,
    pub renderables: usize,
    pub spheres: usize,
    pub live_primitives: usize,
    pub allocations: u64,
    pub releases: u64,
}

/// Topic-keyed registry of pose renderables
#[derive(Debug)]
pub struct SceneExtension {
    config: SceneConfig,
    registry: DatatypeRegistry,

    /// Subscribed topic -> schema resolved at subscription time
    subscriptions: BTreeMap<String, PoseSchema>,

    renderables: HashMap<String, PoseRenderable>,
    settings: TopicSettingsStore,
    graph: SceneGraph,
}

impl Default for SceneExtension {
    fn default() -> Self {
        Self::new(SceneConfig::default())
    }
}

impl SceneExtension {
    pub fn new(config: SceneConfig) -> Self {
        Self::with_registry(config, DatatypeRegistry::with_defaults())
    }

    pub fn with_registry(config: SceneConfig, registry: DatatypeRegistry) -> Self {
        Self {
            config,
            registry,
            subscriptions: BTreeMap::new(),
            renderables: HashMap::new(),
            settings: TopicSettingsStore::new(),
            graph: SceneGraph::new(),
        }
    }

    /// Start from previously persisted per-topic settings.
    pub fn with_settings(mut self, settings: TopicSettingsStore) -> Self {
        self.settings = settings;
        self
    }

    // ========================================================================
    // SUBSCRIPTIONS
    // ========================================================================

    /// Replace the subscription set. Topics whose datatype is registered are
    /// subscribed; topics no longer present are disposed.
    pub fn set_topics(&mut self, topics: &[Topic]) {
        let mut next = BTreeMap::new();
        for topic in topics {
            match self.registry.resolve(&topic.datatype) {
                Some(schema) => {
                    next.insert(topic.name.clone(), schema);
                }
                None => {
                    if self.config.log_unsupported {
                        tracing::debug!(
                            topic = %topic.name,
                            datatype = %topic.datatype,
                            "unsupported datatype, not subscribing"
                        );
                    }
                }
            }
        }

        let removed: Vec<String> = self
            .subscriptions
            .keys()
            .filter(|name| !next.contains_key(*name))
            .cloned()
            .collect();
        for name in &removed {
            self.dispose(name);
        }

        // A topic that changed datatype gets a fresh renderable
        let changed: Vec<String> = next
            .iter()
            .filter(|(name, schema)| {
                self.subscriptions
                    .get(*name)
                    .is_some_and(|previous| previous != *schema)
            })
            .map(|(name, _)| name.clone())
            .collect();
        for name in &changed {
            self.dispose(name);
        }

        tracing::info!(
            subscribed = next.len(),
            removed = removed.len(),
            "updated topic subscriptions"
        );
        self.subscriptions = next;
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.subscriptions.contains_key(topic)
    }

    pub fn subscriptions(&self) -> impl Iterator<Item = (&String, &PoseSchema)> {
        self.subscriptions.iter()
    }

    // ========================================================================
    // MESSAGES
    // ========================================================================

    pub fn handle_event(&mut self, event: &MessageEvent) -> bool {
        self.on_message(&event.topic, &event.message, event.receive_time_ns)
    }

    /// Normalize `raw` and create or update the renderable for `topic`.
    /// Returns `false` when the topic is not subscribed.
    pub fn on_message(&mut self, topic: &str, raw: &Value, receive_time_ns: u64) -> bool {
        let Some(&schema) = self.subscriptions.get(topic) else {
            tracing::debug!(topic, "message on unsubscribed topic ignored");
            return false;
        };

        let message = schema.normalize(raw);
        match self.renderables.get_mut(topic) {
            Some(renderable) => {
                renderable.update_message(&mut self.graph, message, receive_time_ns);
            }
            None => {
                let settings = self.settings.effective(topic, &self.config.defaults);
                let renderable = PoseRenderable::for_schema(
                    &mut self.graph,
                    schema,
                    topic,
                    message,
                    receive_time_ns,
                    settings,
                );
                self.renderables.insert(topic.to_string(), renderable);
            }
        }
        true
    }

    // ========================================================================
    // SETTINGS
    // ========================================================================

    /// Persist an edit addressed by a hierarchical path and refresh the
    /// affected renderable. Invalid paths and mistyped values are ignored.
    pub fn on_settings_edit<S: AsRef<str>>(&mut self, path: &[S], value: &SettingsValue) -> bool {
        let Some(path) = SettingsPath::parse(path) else {
            tracing::debug!(
                path = ?path.iter().map(AsRef::as_ref).collect::<Vec<_>>(),
                "ignoring edit with invalid settings path"
            );
            return false;
        };
        self.apply_settings_edit(&path, value)
    }

    pub fn apply_settings_edit(&mut self, path: &SettingsPath, value: &SettingsValue) -> bool {
        if !self.settings.apply_edit(path, value) {
            tracing::debug!(path = ?path.segments(), ?value, "ignoring mistyped settings value");
            return false;
        }

        let topic = path.topic();
        if let Some(renderable) = self.renderables.get_mut(topic) {
            let effective = self.settings.effective(topic, &self.config.defaults);
            renderable.update_settings(&mut self.graph, effective);
        }
        true
    }

    /// Effective settings for `topic`, whether or not it has rendered yet.
    pub fn effective_settings(&self, topic: &str) -> PoseSettings {
        self.settings.effective(topic, &self.config.defaults)
    }

    pub fn settings_store(&self) -> &TopicSettingsStore {
        &self.settings
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Dispose the renderable for `topic`. No-op for unknown topics.
    pub fn dispose(&mut self, topic: &str) -> bool {
        match self.renderables.remove(topic) {
            Some(renderable) => {
                renderable.dispose(&mut self.graph);
                true
            }
            None => false,
        }
    }

    /// Dispose every renderable. Returns how many were disposed.
    pub fn dispose_all(&mut self) -> usize {
        let mut topics: Vec<String> = self.renderables.keys().cloned().collect();
        topics.sort();
        for topic in &topics {
            self.dispose(topic);
        }
        tracing::debug!(count = topics.len(), "disposed all renderables");
        topics.len()
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn renderable(&self, topic: &str) -> Option<&PoseRenderable> {
        self.renderables.get(topic)
    }

    pub fn renderables(&self) -> impl Iterator<Item = &PoseRenderable> {
        self.renderables.values()
    }

    pub fn renderable_kind(&self, topic: &str) -> Option<RenderableKind> {
        self.renderables.get(topic).map(PoseRenderable::kind)
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    pub fn stats(&self) -> SceneStats {
        SceneStats {
            subscriptions: self.subscriptions.len(),
            renderables: self.renderables.len(),
            spheres: self
                .renderables
                .values()
                .filter(|r| r.capabilities().has_sphere)
                .count(),
            live_primitives: self.graph.live_count(),
            allocations: self.graph.allocations(),
            releases: self.graph.releases(),
        }
    }
}
