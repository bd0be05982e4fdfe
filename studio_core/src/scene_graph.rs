//! Retained scene graph - the owner of every visual primitive.
//!
//! Renderables hold `PrimitiveId` handles and mutate their nodes in place.
//! Allocation and release counters let callers verify that primitives are
//! not churned when only their appearance changes.

use crate::color::Rgba;
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Stable identity of one primitive in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrimitiveId(pub Uuid);

impl PrimitiveId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for PrimitiveId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveKind {
    Arrow,
    Sphere,
}

/// State of one retained primitive
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub kind: PrimitiveKind,

    /// Frame the transform is expressed in
    pub frame_id: String,

    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,

    /// Per-axis scale (arrow: length/width/height, sphere: standard deviations used as radii)
    pub scale: Vector3<f64>,

    pub color: Rgba,
    pub visible: bool,
}

impl SceneNode {
    /// A hidden, unit-scaled node at the origin.
    pub fn new(kind: PrimitiveKind) -> Self {
        Self {
            kind,
            frame_id: String::new(),
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            scale: Vector3::new(1.0, 1.0, 1.0),
            color: Rgba::WHITE,
            visible: false,
        }
    }
}

/// Retained graph of primitives
#[derive(Debug, Default)]
pub struct SceneGraph {
    nodes: HashMap<PrimitiveId, SceneNode>,
    allocations: u64,
    releases: u64,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node and return its handle.
    pub fn allocate(&mut self, node: SceneNode) -> PrimitiveId {
        let id = PrimitiveId::new();
        self.nodes.insert(id, node);
        self.allocations += 1;
        id
    }

    pub fn node(&self, id: PrimitiveId) -> Option<&SceneNode> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: PrimitiveId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(&id)
    }

    /// Remove a node. Releasing an id that is not live is a contract
    /// violation and panics in debug builds.
    pub fn release(&mut self, id: PrimitiveId) -> bool {
        let removed = self.nodes.remove(&id).is_some();
        debug_assert!(removed, "primitive {} released twice or never allocated", id);
        if removed {
            self.releases += 1;
        }
        removed
    }

    pub fn contains(&self, id: PrimitiveId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Number of live primitives.
    pub fn live_count(&self) -> usize {
        self.nodes.len()
    }

    /// Total primitives ever allocated.
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    /// Total primitives ever released.
    pub fn releases(&self) -> u64 {
        self.releases
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&PrimitiveId, &SceneNode)> {
        self.nodes.iter()
    }
}
