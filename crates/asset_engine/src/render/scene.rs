//! Render scene boundary
//!
//! The session never draws anything itself. It hands [`SceneNode`] trees to a
//! [`RenderScene`], which owns them until they are removed again, and pushes
//! simulated poses into them once per frame.
//!
//! [`HeadlessScene`] is an in-memory implementation for tools and tests.

use std::sync::Arc;

use slotmap::{new_key_type, SlotMap};

use super::material::Material;
use super::mesh::Mesh;
use crate::foundation::math::{Quat, Transform, Vec3};

new_key_type! {
    /// Handle of a root node owned by a render scene
    pub struct NodeId;
}

/// Drawable node tree handed to a render scene
#[derive(Debug, Clone)]
pub struct SceneNode {
    /// Node name (asset type or model node name)
    pub name: String,
    /// Transform relative to the parent
    pub transform: Transform,
    /// Geometry, shared between instances of the same asset type
    pub mesh: Option<Arc<Mesh>>,
    /// Surface description, required for the node to be drawn
    pub material: Option<Material>,
    /// Whether the node is drawn
    pub visible: bool,
    /// Child nodes
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    /// Empty group node
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Transform::identity(),
            mesh: None,
            material: None,
            visible: true,
            children: Vec::new(),
        }
    }

    /// Drawable node with geometry and material
    pub fn drawable(name: impl Into<String>, mesh: Arc<Mesh>, material: Material) -> Self {
        Self {
            mesh: Some(mesh),
            material: Some(material),
            ..Self::group(name)
        }
    }

    /// Set the local transform
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Attach a child
    pub fn with_child(mut self, child: SceneNode) -> Self {
        self.children.push(child);
        self
    }

    /// Number of nodes in this subtree including itself
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(SceneNode::subtree_len).sum::<usize>()
    }

    /// Find a descendant (or self) by name
    pub fn find(&self, name: &str) -> Option<&SceneNode> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(name))
    }
}

/// Render scene collaborator
///
/// The scene owns every node added to it. Callers keep only the [`NodeId`].
pub trait RenderScene {
    /// Take ownership of a node tree and make it drawable
    fn add_node(&mut self, node: SceneNode) -> NodeId;

    /// Remove a node tree, returning it if it existed
    fn remove_node(&mut self, id: NodeId) -> Option<SceneNode>;

    /// Whether a node is currently part of the scene
    fn contains(&self, id: NodeId) -> bool;

    /// Current root transform of a node
    fn transform(&self, id: NodeId) -> Option<Transform>;

    /// Replace the root transform of a node; `false` if the node is unknown
    fn set_transform(&mut self, id: NodeId, transform: Transform) -> bool;

    /// Number of root nodes in the scene
    fn node_count(&self) -> usize;

    /// Update position and rotation, keeping scale
    fn set_pose(&mut self, id: NodeId, position: Vec3, rotation: Quat) -> bool {
        match self.transform(id) {
            Some(mut transform) => {
                transform.position = position;
                transform.rotation = rotation;
                self.set_transform(id, transform)
            }
            None => false,
        }
    }
}

/// In-memory render scene without any GPU backing
#[derive(Default)]
pub struct HeadlessScene {
    nodes: SlotMap<NodeId, SceneNode>,
}

impl HeadlessScene {
    /// Create an empty scene
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow a root node
    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id)
    }

    /// Iterate over all root nodes
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &SceneNode)> {
        self.nodes.iter()
    }

    /// Total node count including descendants
    pub fn total_nodes(&self) -> usize {
        self.nodes.values().map(SceneNode::subtree_len).sum()
    }

    /// Remove every node
    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}

impl RenderScene for HeadlessScene {
    fn add_node(&mut self, node: SceneNode) -> NodeId {
        log::trace!("Scene: adding node '{}'", node.name);
        self.nodes.insert(node)
    }

    fn remove_node(&mut self, id: NodeId) -> Option<SceneNode> {
        self.nodes.remove(id)
    }

    fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    fn transform(&self, id: NodeId) -> Option<Transform> {
        self.nodes.get(id).map(|node| node.transform)
    }

    fn set_transform(&mut self, id: NodeId, transform: Transform) -> bool {
        match self.nodes.get_mut(id) {
            Some(node) => {
                node.transform = transform;
                true
            }
            None => false,
        }
    }

    fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
