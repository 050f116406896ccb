//! Skeleton detection and joint constraint inference
//!
//! A node is a bone when it carries the explicit bone flag or, under the name
//! heuristic, its name contains "bone". Bones form their own parent/child
//! graph: a bone's parent is its nearest bone ancestor, or the bone named by
//! an `extras.parent_bone` entry.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{AnalysisWarning, ClassificationStrategy, NodeRole};
use crate::assets::model::ModelNode;
use crate::core::config::JointDefaults;
use crate::foundation::collections::{CacheArena, TypeInterner};
use crate::foundation::math::{Quat, Vec3};

/// Joint type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointKind {
    /// No relative motion
    Fixed,
    /// Rotation about one axis
    Hinge,
    /// Rotation about all axes within limits
    Ball,
    /// Elastic attachment
    Spring,
}

/// Per-axis rotation range in radians
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RotationLimits {
    /// Lower bound per axis
    pub min: Vec3,
    /// Upper bound per axis
    pub max: Vec3,
}

/// Joint constraint attached to a bone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointConstraint {
    /// Joint type
    pub kind: JointKind,
    /// Hinge axis in the bone's frame
    #[serde(default)]
    pub axis: Option<Vec3>,
    /// Angular range for hinge and ball joints
    #[serde(default)]
    pub limits: Option<RotationLimits>,
    /// Spring stiffness
    #[serde(default)]
    pub stiffness: Option<f32>,
    /// Spring damping
    #[serde(default)]
    pub damping: Option<f32>,
}

impl JointConstraint {
    /// Constraint of a kind with no parameters
    pub fn new(kind: JointKind) -> Self {
        Self {
            kind,
            axis: None,
            limits: None,
            stiffness: None,
            damping: None,
        }
    }

    /// Hinge about `axis` with a symmetric limit in radians
    pub fn hinge(axis: Vec3, limit: f32) -> Self {
        let range = axis * limit;
        Self {
            axis: Some(axis),
            limits: Some(RotationLimits { min: -range, max: range }),
            ..Self::new(JointKind::Hinge)
        }
    }

    /// Spring with explicit parameters
    pub fn spring(stiffness: f32, damping: f32) -> Self {
        Self {
            stiffness: Some(stiffness),
            damping: Some(damping),
            ..Self::new(JointKind::Spring)
        }
    }

    /// Constraint implied by rotation limits
    ///
    /// No range on any axis is a fixed joint, range on one axis a hinge,
    /// range on several a ball joint.
    pub fn from_limits(limits: RotationLimits) -> Self {
        let range = limits.max - limits.min;
        let free: Vec<usize> = (0..3).filter(|&i| range[i].abs() > f32::EPSILON).collect();
        match free.as_slice() {
            [] => Self::new(JointKind::Fixed),
            [axis] => Self {
                axis: Some(Vec3::ith(*axis, 1.0)),
                limits: Some(limits),
                ..Self::new(JointKind::Hinge)
            },
            _ => Self {
                limits: Some(limits),
                ..Self::new(JointKind::Ball)
            },
        }
    }
}

/// Which source produced a bone's constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintSource {
    /// Explicit constraint metadata
    Explicit,
    /// Rotation-limit metadata
    RotationLimits,
    /// `joint` entry in node extras
    Extras,
    /// Keyword in the bone name
    Name,
}

/// One bone of a rig
#[derive(Debug, Clone, PartialEq)]
pub struct Bone {
    /// Node name
    pub name: String,
    /// Local position at analysis time
    pub initial_position: Vec3,
    /// Local rotation at analysis time
    pub initial_rotation: Quat,
    /// Index of the parent bone in [`RigDescriptor::bones`]
    pub parent: Option<usize>,
    /// Indices of child bones
    pub children: Vec<usize>,
    /// Whether the bone is a root of the skeleton
    pub is_root: bool,
    /// Parent named through `extras.parent_bone`
    pub declared_parent: Option<String>,
}

/// Constraint inferred for a bone
#[derive(Debug, Clone, PartialEq)]
pub struct BoneConstraint {
    /// Bone name
    pub bone: String,
    /// The constraint
    pub constraint: JointConstraint,
    /// Where it came from
    pub source: ConstraintSource,
}

/// Entry of [`RigDescriptor::bone_hierarchy`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoneLink {
    /// Index into [`RigDescriptor::bones`]
    pub bone: usize,
    /// Parent bone name
    pub parent: Option<String>,
    /// Child bone names
    pub children: Vec<String>,
}

/// Rig analysis result for one asset type
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RigDescriptor {
    /// Bones in traversal order
    pub bones: Vec<Bone>,
    /// Names of root bones
    pub roots: Vec<String>,
    /// First armature node found
    pub armature: Option<String>,
    /// Visible activator nodes
    pub activators: Vec<String>,
    /// Inferred joint constraints
    pub constraints: Vec<BoneConstraint>,
    /// Bone graph keyed by bone name
    pub bone_hierarchy: BTreeMap<String, BoneLink>,
    /// Anomalies found along the way
    pub warnings: Vec<AnalysisWarning>,
}

impl RigDescriptor {
    /// Look up a bone by name
    pub fn bone(&self, name: &str) -> Option<&Bone> {
        self.bone_hierarchy.get(name).and_then(|link| self.bones.get(link.bone))
    }

    /// Constraint of a bone
    pub fn constraint_for(&self, bone: &str) -> Option<&BoneConstraint> {
        self.constraints.iter().find(|c| c.bone == bone)
    }
}

/// Outcome of [`validate_rig`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RigValidation {
    /// False only when there is no bone structure
    pub is_valid: bool,
    /// Fatal problems
    pub errors: Vec<String>,
    /// Non-fatal problems
    pub warnings: Vec<String>,
}

/// Check a rig for orphaned bones and missing roots
///
/// Only a missing or empty rig is an error.
pub fn validate_rig(rig: Option<&RigDescriptor>) -> RigValidation {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    match rig {
        Some(rig) if !rig.bones.is_empty() => {
            if rig.roots.is_empty() {
                warnings.push("rig has no root bone".to_string());
            }
            for bone in &rig.bones {
                if let Some(declared) = &bone.declared_parent {
                    if !rig.bone_hierarchy.contains_key(declared) {
                        warnings.push(format!("bone '{}' is orphaned: parent '{}' does not exist", bone.name, declared));
                    }
                }
            }
        }
        _ => errors.push("no bone structure found".to_string()),
    }
    RigValidation {
        is_valid: errors.is_empty(),
        errors,
        warnings,
    }
}

type RigResult = Option<Arc<RigDescriptor>>;

/// Finds skeletons in model hierarchies, cached per asset type
pub struct RigAnalyzer {
    strategy: ClassificationStrategy,
    joints: JointDefaults,
    types: Arc<TypeInterner>,
    cache: CacheArena<RigResult>,
}

impl RigAnalyzer {
    /// Create an analyzer sharing a type interner with the rest of the session
    pub fn new(strategy: ClassificationStrategy, joints: JointDefaults, types: Arc<TypeInterner>) -> Self {
        Self {
            strategy,
            joints,
            types,
            cache: CacheArena::new(),
        }
    }

    /// Analyze a hierarchy; `None` when it has no bones
    ///
    /// The `None` outcome is cached like any other.
    pub fn analyze(&self, root: &ModelNode, asset_type: &str) -> Option<Arc<RigDescriptor>> {
        let key = self.types.intern(asset_type);
        let result = self.cache.get_or_insert_with(key, || {
            let rig = self.analyze_uncached(root);
            match &rig {
                Some(rig) => log::debug!(
                    "Rig analysis for '{}': {} bones, {} roots, {} constraints",
                    asset_type,
                    rig.bones.len(),
                    rig.roots.len(),
                    rig.constraints.len()
                ),
                None => log::trace!("Rig analysis for '{}': no bones", asset_type),
            }
            rig.map(Arc::new)
        });
        (*result).clone()
    }

    /// Whether a result (including "no rig") is cached for an asset type
    pub fn is_cached(&self, asset_type: &str) -> bool {
        self.types.get(asset_type).and_then(|key| self.cache.get(key)).is_some()
    }

    /// Analyze without touching the cache
    pub fn analyze_uncached(&self, root: &ModelNode) -> Option<RigDescriptor> {
        let mut rig = RigDescriptor::default();
        // Nearest bone at or above each visited node
        let mut nearest_bone: Vec<Option<usize>> = Vec::new();

        for visit in self.strategy.walk(root) {
            let inherited = visit.parent.and_then(|p| nearest_bone.get(p).copied().flatten());
            let node = visit.node;
            match visit.role {
                NodeRole::Armature if rig.armature.is_none() => rig.armature = Some(node.name.clone()),
                NodeRole::Activator => rig.activators.push(node.name.clone()),
                _ => {}
            }
            if visit.role != NodeRole::Bone {
                nearest_bone.push(inherited);
                continue;
            }

            let index = rig.bones.len();
            let declared_parent = node.metadata.extras.get("parent_bone").and_then(Value::as_str).map(str::to_string);
            rig.bones.push(Bone {
                name: node.name.clone(),
                initial_position: node.transform.position,
                initial_rotation: node.transform.rotation,
                parent: if declared_parent.is_some() { None } else { inherited },
                children: Vec::new(),
                is_root: false,
                declared_parent,
            });
            nearest_bone.push(Some(index));

            if let Some((constraint, source)) = self.infer_constraint(node, &mut rig.warnings) {
                log::trace!("Bone '{}': {:?} joint from {:?}", node.name, constraint.kind, source);
                rig.constraints.push(BoneConstraint {
                    bone: node.name.clone(),
                    constraint,
                    source,
                });
            }
        }

        if rig.bones.is_empty() {
            return None;
        }
        link_bones(&mut rig);
        Some(rig)
    }

    fn infer_constraint(&self, node: &ModelNode, warnings: &mut Vec<AnalysisWarning>) -> Option<(JointConstraint, ConstraintSource)> {
        let metadata = &node.metadata;
        if let Some(constraint) = &metadata.constraint {
            return Some((constraint.clone(), ConstraintSource::Explicit));
        }
        if let Some(limits) = metadata.rotation_limits {
            return Some((JointConstraint::from_limits(limits), ConstraintSource::RotationLimits));
        }
        if let Some(joint) = metadata.extras.get("joint") {
            let parsed = match joint {
                Value::String(keyword) => self.from_keyword(keyword, &node.name),
                other => serde_json::from_value::<JointConstraint>(other.clone()).ok(),
            };
            match parsed {
                Some(constraint) => return Some((constraint, ConstraintSource::Extras)),
                None => warnings.push(AnalysisWarning::new(&node.name, "unrecognized joint entry in extras")),
            }
        }
        self.from_keyword(&node.name, &node.name).map(|c| (c, ConstraintSource::Name))
    }

    /// Constraint named by a keyword; hinge axis comes from a `_x`/`_y`/`_z` suffix
    fn from_keyword(&self, keyword: &str, bone_name: &str) -> Option<JointConstraint> {
        let lower = keyword.to_ascii_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
        if has(&["fixed", "rigid"]) {
            Some(JointConstraint::new(JointKind::Fixed))
        } else if has(&["hinge", "elbow", "knee"]) {
            let limit = self.joints.hinge_limit_degrees.to_radians();
            Some(JointConstraint::hinge(hinge_axis(bone_name), limit))
        } else if has(&["spring", "bounce"]) {
            Some(JointConstraint::spring(self.joints.spring_stiffness, self.joints.spring_damping))
        } else {
            None
        }
    }

    /// Drop every cached descriptor
    pub fn dispose(&self) {
        self.cache.clear();
    }
}

fn hinge_axis(name: &str) -> Vec3 {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with("_y") {
        Vec3::y()
    } else if lower.ends_with("_z") {
        Vec3::z()
    } else {
        Vec3::x()
    }
}

fn is_root_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    ["root", "hip", "pelvis"].iter().any(|w| lower.contains(w))
}

/// Resolve declared parents, fill children, roots and the name-keyed graph
fn link_bones(rig: &mut RigDescriptor) {
    for (index, bone) in rig.bones.iter().enumerate() {
        if rig.bone_hierarchy.contains_key(&bone.name) {
            rig.warnings.push(AnalysisWarning::new(&bone.name, "duplicate bone name"));
            continue;
        }
        rig.bone_hierarchy.insert(
            bone.name.clone(),
            BoneLink {
                bone: index,
                parent: None,
                children: Vec::new(),
            },
        );
    }

    for index in 0..rig.bones.len() {
        let declared = rig.bones[index].declared_parent.clone();
        if let Some(declared) = declared {
            match rig.bone_hierarchy.get(&declared).map(|link| link.bone) {
                Some(parent) if parent != index => rig.bones[index].parent = Some(parent),
                _ => rig.warnings.push(AnalysisWarning::new(
                    &rig.bones[index].name,
                    format!("declared parent bone '{declared}' not found"),
                )),
            }
        }
    }

    for index in 0..rig.bones.len() {
        if let Some(parent) = rig.bones[index].parent {
            rig.bones[parent].children.push(index);
        }
    }

    for index in 0..rig.bones.len() {
        let bone = &rig.bones[index];
        let is_root = bone.parent.is_none() || is_root_name(&bone.name);
        rig.bones[index].is_root = is_root;
        if is_root {
            rig.roots.push(rig.bones[index].name.clone());
        }
    }

    let names: Vec<String> = rig.bones.iter().map(|b| b.name.clone()).collect();
    for (index, bone) in rig.bones.iter().enumerate() {
        if let Some(link) = rig.bone_hierarchy.get_mut(&bone.name) {
            if link.bone != index {
                continue;
            }
            link.parent = bone.parent.map(|p| names[p].clone());
            link.children = bone.children.iter().map(|&c| names[c].clone()).collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::model::NodeMetadata;
    use crate::foundation::math::{quat_from_euler, Transform};
    use approx::assert_relative_eq;
    use serde_json::json;

    fn analyzer() -> RigAnalyzer {
        RigAnalyzer::new(ClassificationStrategy::NameHeuristic, JointDefaults::default(), Arc::new(TypeInterner::new()))
    }

    fn extras(value: serde_json::Value) -> NodeMetadata {
        NodeMetadata {
            extras: value.as_object().cloned().unwrap_or_default(),
            ..Default::default()
        }
    }

    fn arm() -> ModelNode {
        let rotation = quat_from_euler(Vec3::new(0.0, 0.5, 0.0));
        ModelNode::group("character")
            .with_child(
                ModelNode::group("Armature").with_child(
                    ModelNode::group("bone_hip").with_child(
                        ModelNode::group("joint_holder").with_child(
                            ModelNode::group("bone_elbow_z")
                                .with_transform(Transform::from_position_rotation(Vec3::new(0.0, 1.0, 0.0), rotation))
                                .with_child(ModelNode::group("bone_spring_tail")),
                        ),
                    ),
                ),
            )
            .with_child(ModelNode::group("activate_switch"))
            .with_child(ModelNode::group("skeleton_extra"))
    }

    #[test]
    fn test_bone_free_hierarchy_has_no_rig() {
        let root = ModelNode::group("crate").with_child(ModelNode::group("lid"));
        let analyzer = analyzer();
        assert!(analyzer.analyze(&root, "crate").is_none());
        assert!(analyzer.is_cached("crate"));
        assert!(!validate_rig(None).is_valid);
    }

    #[test]
    fn test_bone_graph_skips_non_bones() {
        let rig = analyzer().analyze(&arm(), "character").unwrap();
        assert_eq!(rig.bones.len(), 3);
        assert_eq!(rig.armature.as_deref(), Some("Armature"));
        assert_eq!(rig.activators, ["activate_switch"]);

        let elbow = rig.bone_hierarchy.get("bone_elbow_z").unwrap();
        assert_eq!(elbow.parent.as_deref(), Some("bone_hip"));
        assert_eq!(elbow.children, ["bone_spring_tail"]);
        assert_eq!(rig.roots, ["bone_hip"]);
    }

    #[test]
    fn test_initial_rotation_snapshot() {
        let rig = analyzer().analyze(&arm(), "character").unwrap();
        let elbow = rig.bone("bone_elbow_z").unwrap();
        let (_, pitch, _) = elbow.initial_rotation.euler_angles();
        assert_relative_eq!(pitch, 0.5, epsilon = 1e-5);
        assert_relative_eq!(elbow.initial_position, Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_name_keyword_constraints() {
        let rig = analyzer().analyze(&arm(), "character").unwrap();
        let elbow = rig.constraint_for("bone_elbow_z").unwrap();
        assert_eq!(elbow.source, ConstraintSource::Name);
        assert_eq!(elbow.constraint.kind, JointKind::Hinge);
        assert_eq!(elbow.constraint.axis, Some(Vec3::z()));
        let limits = elbow.constraint.limits.unwrap();
        assert_relative_eq!(limits.max.z, std::f32::consts::FRAC_PI_2);

        let tail = rig.constraint_for("bone_spring_tail").unwrap();
        assert_eq!(tail.constraint.kind, JointKind::Spring);
        assert_eq!(tail.constraint.stiffness, Some(100.0));
        assert_eq!(tail.constraint.damping, Some(10.0));

        assert!(rig.constraint_for("bone_hip").is_none());
    }

    #[test]
    fn test_constraint_priority() {
        let mut explicit = extras(json!({ "joint": "spring" }));
        explicit.constraint = Some(JointConstraint::new(JointKind::Ball));
        explicit.rotation_limits = Some(RotationLimits { min: Vec3::zeros(), max: Vec3::zeros() });

        let mut limits = extras(json!({ "joint": "spring" }));
        limits.rotation_limits = Some(RotationLimits { min: Vec3::new(0.0, -1.0, 0.0), max: Vec3::new(0.0, 1.0, 0.0) });

        let root = ModelNode::group("root_bone")
            .with_child(ModelNode::group("bone_a_hinge").with_metadata(explicit))
            .with_child(ModelNode::group("bone_b_hinge").with_metadata(limits))
            .with_child(ModelNode::group("bone_c_hinge").with_metadata(extras(json!({ "joint": "fixed" }))))
            .with_child(ModelNode::group("bone_d_hinge").with_metadata(extras(json!({ "joint": { "kind": "ball" } }))))
            .with_child(ModelNode::group("bone_e_hinge"));
        let rig = analyzer().analyze(&root, "priority").unwrap();

        let a = rig.constraint_for("bone_a_hinge").unwrap();
        assert_eq!((a.constraint.kind, a.source), (JointKind::Ball, ConstraintSource::Explicit));
        let b = rig.constraint_for("bone_b_hinge").unwrap();
        assert_eq!((b.constraint.kind, b.source), (JointKind::Hinge, ConstraintSource::RotationLimits));
        assert_eq!(b.constraint.axis, Some(Vec3::y()));
        let c = rig.constraint_for("bone_c_hinge").unwrap();
        assert_eq!((c.constraint.kind, c.source), (JointKind::Fixed, ConstraintSource::Extras));
        let d = rig.constraint_for("bone_d_hinge").unwrap();
        assert_eq!((d.constraint.kind, d.source), (JointKind::Ball, ConstraintSource::Extras));
        let e = rig.constraint_for("bone_e_hinge").unwrap();
        assert_eq!((e.constraint.kind, e.source), (JointKind::Hinge, ConstraintSource::Name));
        assert_eq!(e.constraint.axis, Some(Vec3::x()));
    }

    #[test]
    fn test_unrecognized_extras_falls_through_with_warning() {
        let root = ModelNode::group("bone_knee").with_metadata(extras(json!({ "joint": 42 })));
        let rig = analyzer().analyze_uncached(&root).unwrap();
        assert_eq!(rig.constraints[0].source, ConstraintSource::Name);
        assert_eq!(rig.warnings.len(), 1);
    }

    #[test]
    fn test_orphan_bone_is_a_warning() {
        let root = ModelNode::group("bone_root")
            .with_child(ModelNode::group("bone_orphan").with_metadata(extras(json!({ "parent_bone": "bone_missing" }))));
        let rig = analyzer().analyze_uncached(&root).unwrap();
        let orphan = rig.bone("bone_orphan").unwrap();
        assert!(orphan.parent.is_none());
        assert!(orphan.is_root);

        let validation = validate_rig(Some(&rig));
        assert!(validation.is_valid);
        assert_eq!(validation.warnings.len(), 1);
        assert!(validation.warnings[0].contains("bone_orphan"));
    }

    #[test]
    fn test_declared_parent_cycle_has_no_roots() {
        let root = ModelNode::group("rig")
            .with_child(ModelNode::group("bone_a").with_metadata(extras(json!({ "parent_bone": "bone_b" }))))
            .with_child(ModelNode::group("bone_b").with_metadata(extras(json!({ "parent_bone": "bone_a" }))));
        let rig = analyzer().analyze_uncached(&root).unwrap();
        assert!(rig.roots.is_empty());
        let validation = validate_rig(Some(&rig));
        assert!(validation.is_valid);
        assert_eq!(validation.warnings, ["rig has no root bone"]);
    }

    #[test]
    fn test_dispose_clears_cache() {
        let analyzer = analyzer();
        analyzer.analyze(&arm(), "character");
        assert!(analyzer.is_cached("character"));
        analyzer.dispose();
        analyzer.dispose();
        assert!(!analyzer.is_cached("character"));
    }
}
