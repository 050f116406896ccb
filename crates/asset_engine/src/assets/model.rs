//! Loaded model hierarchies and the model loader boundary
//!
//! A [`ModelLoader`] turns a path into a [`LoadedModel`]: a tree of
//! [`ModelNode`]s plus optional explicit physics metadata. The analyzers only
//! ever see this tree, never the file format behind it.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::AssetError;
use crate::analysis::{ColliderKind, JointConstraint, NodeRole, RotationLimits};
use crate::foundation::math::{Transform, Vec3};
use crate::physics::ColliderDesc;
use crate::render::{BoundingBox, Mesh};

/// Explicit per-node metadata authored alongside a model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeMetadata {
    /// Role override for the classifier
    pub role: Option<NodeRole>,
    /// Marks the node as collision geometry of this kind
    pub collider: Option<ColliderKind>,
    /// Joint constraint for a bone
    pub constraint: Option<JointConstraint>,
    /// Rotation limits for a bone
    pub rotation_limits: Option<RotationLimits>,
    /// Free-form authoring data (`joint`, `parent_bone`, ...)
    pub extras: Map<String, Value>,
}

/// Node of a loaded model hierarchy
#[derive(Debug, Clone)]
pub struct ModelNode {
    /// Node name as authored
    pub name: String,
    /// Whether the node is drawn
    pub visible: bool,
    /// Explicit bone flag
    pub is_bone: bool,
    /// Transform relative to the parent
    pub transform: Transform,
    /// Geometry, shared with spawned scene nodes
    pub mesh: Option<Arc<Mesh>>,
    /// Explicit metadata
    pub metadata: NodeMetadata,
    /// Child nodes
    pub children: Vec<ModelNode>,
}

impl ModelNode {
    /// Empty node without geometry
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visible: true,
            is_bone: false,
            transform: Transform::identity(),
            mesh: None,
            metadata: NodeMetadata::default(),
            children: Vec::new(),
        }
    }

    /// Node carrying geometry
    pub fn with_mesh(name: impl Into<String>, mesh: Mesh) -> Self {
        Self {
            mesh: Some(Arc::new(mesh)),
            ..Self::group(name)
        }
    }

    /// Set the local transform
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Set explicit metadata
    pub fn with_metadata(mut self, metadata: NodeMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Attach a child
    pub fn with_child(mut self, child: ModelNode) -> Self {
        self.children.push(child);
        self
    }

    /// Bounds of all geometry in the subtree, in this node's frame
    pub fn subtree_bounds(&self) -> Option<BoundingBox> {
        let mut points: Vec<[f32; 3]> = Vec::new();
        let mut stack = vec![(self, Transform::identity())];
        while let Some((node, transform)) = stack.pop() {
            if let Some(bounds) = node.mesh.as_ref().and_then(|m| m.bounds()) {
                for corner in corners(&bounds) {
                    let p = transform.position
                        + transform.rotation * transform.scale.component_mul(&corner);
                    points.push([p.x, p.y, p.z]);
                }
            }
            for child in &node.children {
                stack.push((child, transform.combine(&child.transform)));
            }
        }
        BoundingBox::from_points(points.iter())
    }
}

fn corners(bounds: &BoundingBox) -> [Vec3; 8] {
    let (a, b) = (bounds.min, bounds.max);
    [
        Vec3::new(a.x, a.y, a.z),
        Vec3::new(b.x, a.y, a.z),
        Vec3::new(a.x, b.y, a.z),
        Vec3::new(b.x, b.y, a.z),
        Vec3::new(a.x, a.y, b.z),
        Vec3::new(b.x, a.y, b.z),
        Vec3::new(a.x, b.y, b.z),
        Vec3::new(b.x, b.y, b.z),
    ]
}

/// Model-wide explicit metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelMetadata {
    /// Authored colliders; when present no colliders are synthesized
    pub colliders: Vec<ColliderDesc>,
}

impl ModelMetadata {
    /// Whether the model carries its own physics description
    pub fn has_physics(&self) -> bool {
        !self.colliders.is_empty()
    }
}

/// Result of loading a model
#[derive(Debug, Clone)]
pub struct LoadedModel {
    /// Root of the node hierarchy
    pub root: ModelNode,
    /// Model-wide metadata
    pub metadata: ModelMetadata,
}

impl LoadedModel {
    /// Single-node model without explicit metadata
    pub fn from_mesh(name: impl Into<String>, mesh: Mesh) -> Self {
        Self {
            root: ModelNode::with_mesh(name, mesh),
            metadata: ModelMetadata::default(),
        }
    }
}

/// Model loading collaborator
pub trait ModelLoader {
    /// Load a model hierarchy from a path
    fn load(&self, path: &Path) -> Result<LoadedModel, AssetError>;
}
