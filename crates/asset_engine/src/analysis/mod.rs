//! Model hierarchy analysis
//!
//! Both analyzers walk a [`ModelNode`] tree through [`HierarchyIter`], a lazy
//! pre-order traversal that classifies each node with the configured
//! [`ClassificationStrategy`]. Results are cached per asset type for the
//! lifetime of the analyzer.

pub mod collision;
pub mod rig;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::assets::model::ModelNode;
use crate::foundation::math::Transform;

pub use collision::{
    is_collision_name, ColliderKind, CollisionAnalyzer, CollisionDescriptor, CollisionMesh,
    KindSource,
};
pub use rig::{
    validate_rig, Bone, BoneConstraint, BoneLink, ConstraintSource, JointConstraint, JointKind, RigAnalyzer,
    RigDescriptor, RigValidation, RotationLimits,
};

/// What a node represents for the analyzers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// Collision proxy geometry
    Collision,
    /// Skeleton bone
    Bone,
    /// Container of the skeleton
    Armature,
    /// Visible interaction trigger
    Activator,
    /// Drawable geometry
    Mesh,
    /// Anything else
    Group,
}

/// How node roles are decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationStrategy {
    /// Explicit metadata first, then naming conventions
    #[default]
    NameHeuristic,
    /// Only explicit metadata and bone flags; names are ignored
    ExplicitMetadata,
}

impl ClassificationStrategy {
    /// Classify a single node
    pub fn classify(self, node: &ModelNode) -> NodeRole {
        if let Some(role) = node.metadata.role {
            return role;
        }
        if node.metadata.collider.is_some() {
            return NodeRole::Collision;
        }
        if node.is_bone {
            return NodeRole::Bone;
        }
        if self == Self::NameHeuristic {
            let lower = node.name.to_ascii_lowercase();
            if is_collision_name(&lower) {
                return NodeRole::Collision;
            }
            if lower.contains("bone") {
                return NodeRole::Bone;
            }
            if ["rig", "armature", "skeleton"].iter().any(|k| lower.contains(k)) {
                return NodeRole::Armature;
            }
            if node.visible && lower.starts_with("activate_") {
                return NodeRole::Activator;
            }
        }
        if node.mesh.is_some() {
            NodeRole::Mesh
        } else {
            NodeRole::Group
        }
    }

    /// Lazily classify every node of a hierarchy in pre-order
    pub fn walk(self, root: &ModelNode) -> HierarchyIter<'_> {
        HierarchyIter::new(root, self)
    }
}

/// One classified node produced by [`HierarchyIter`]
#[derive(Debug, Clone, Copy)]
pub struct Visit<'a> {
    /// Pre-order index, the root is 0
    pub index: usize,
    /// Index of the parent visit
    pub parent: Option<usize>,
    /// Distance from the root
    pub depth: usize,
    /// The node itself
    pub node: &'a ModelNode,
    /// Role assigned by the strategy
    pub role: NodeRole,
    /// Transform relative to the root's frame (identity for the root)
    pub transform: Transform,
}

/// Pre-order traversal with an explicit stack
pub struct HierarchyIter<'a> {
    stack: Vec<(&'a ModelNode, Option<usize>, usize, Transform)>,
    next_index: usize,
    strategy: ClassificationStrategy,
}

impl<'a> HierarchyIter<'a> {
    /// Start a traversal at `root`
    pub fn new(root: &'a ModelNode, strategy: ClassificationStrategy) -> Self {
        Self {
            stack: vec![(root, None, 0, Transform::identity())],
            next_index: 0,
            strategy,
        }
    }
}

impl<'a> Iterator for HierarchyIter<'a> {
    type Item = Visit<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (node, parent, depth, transform) = self.stack.pop()?;
        let index = self.next_index;
        self.next_index += 1;
        for child in node.children.iter().rev() {
            self.stack.push((child, Some(index), depth + 1, transform.combine(&child.transform)));
        }
        Some(Visit {
            index,
            parent,
            depth,
            node,
            role: self.strategy.classify(node),
            transform,
        })
    }
}

/// Non-fatal finding recorded in a descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisWarning {
    /// Node the warning is about
    pub node: String,
    /// What was wrong
    pub message: String,
}

impl AnalysisWarning {
    pub(crate) fn new(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for AnalysisWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.node, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use approx::assert_relative_eq;

    fn tree() -> ModelNode {
        ModelNode::group("root")
            .with_child(
                ModelNode::group("Armature")
                    .with_transform(Transform::from_position(Vec3::new(0.0, 1.0, 0.0)))
                    .with_child(ModelNode::group("bone_hip").with_transform(Transform::from_position(Vec3::new(0.0, 2.0, 0.0)))),
            )
            .with_child(ModelNode::group("COL_Body"))
            .with_child(ModelNode::group("activate_door"))
    }

    #[test]
    fn test_walk_is_preorder() {
        let root = tree();
        let names: Vec<&str> = ClassificationStrategy::NameHeuristic
            .walk(&root)
            .map(|v| v.node.name.as_str())
            .collect();
        assert_eq!(names, ["root", "Armature", "bone_hip", "COL_Body", "activate_door"]);
    }

    #[test]
    fn test_walk_accumulates_transforms() {
        let root = tree();
        let hip = ClassificationStrategy::NameHeuristic
            .walk(&root)
            .find(|v| v.node.name == "bone_hip")
            .unwrap();
        assert_eq!(hip.depth, 2);
        assert_eq!(hip.parent, Some(1));
        assert_relative_eq!(hip.transform.position, Vec3::new(0.0, 3.0, 0.0));
    }

    #[test]
    fn test_name_heuristic_roles() {
        let root = tree();
        let roles: Vec<NodeRole> = ClassificationStrategy::NameHeuristic.walk(&root).map(|v| v.role).collect();
        assert_eq!(
            roles,
            [NodeRole::Group, NodeRole::Armature, NodeRole::Bone, NodeRole::Collision, NodeRole::Activator]
        );
    }

    #[test]
    fn test_explicit_metadata_ignores_names() {
        let root = tree();
        let roles: Vec<NodeRole> = ClassificationStrategy::ExplicitMetadata.walk(&root).map(|v| v.role).collect();
        assert!(roles.iter().all(|r| *r == NodeRole::Group));

        let mut bone = ModelNode::group("joint");
        bone.is_bone = true;
        assert_eq!(ClassificationStrategy::ExplicitMetadata.classify(&bone), NodeRole::Bone);
    }

    #[test]
    fn test_hidden_activator_is_not_classified() {
        let mut node = ModelNode::group("activate_lever");
        node.visible = false;
        assert_eq!(ClassificationStrategy::NameHeuristic.classify(&node), NodeRole::Group);
    }
}
