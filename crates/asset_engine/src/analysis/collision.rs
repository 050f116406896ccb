//! Collision mesh detection and collider inference
//!
//! Collision proxies are found by naming convention (`col_`/`collision_`
//! prefix, `_col_` infix or `_col` suffix, any case) or explicit metadata.
//! Each proxy gets a [`ColliderKind`] from, in order: explicit metadata, name
//! keywords, then its triangle and vertex counts against
//! [`CollisionThresholds`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{AnalysisWarning, ClassificationStrategy, NodeRole};
use crate::assets::model::ModelNode;
use crate::core::config::CollisionThresholds;
use crate::foundation::collections::{CacheArena, TypeInterner};
use crate::foundation::math::Transform;
use crate::render::{BoundingBox, Mesh};

/// Inferred collider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColliderKind {
    /// Oriented box
    Box,
    /// Sphere
    Sphere,
    /// Capsule
    Capsule,
    /// Cylinder
    Cylinder,
    /// Flat ground plane (built as a thin box)
    Plane,
    /// Convex hull of the node's vertices
    Convex,
    /// Exact triangle mesh
    TriMesh,
}

impl ColliderKind {
    const KEYWORDS: [(&'static [&'static str], ColliderKind); 7] = [
        (&["box", "cube"], ColliderKind::Box),
        (&["sphere", "ball"], ColliderKind::Sphere),
        (&["capsule"], ColliderKind::Capsule),
        (&["cylinder"], ColliderKind::Cylinder),
        (&["plane", "ground", "floor"], ColliderKind::Plane),
        (&["convex"], ColliderKind::Convex),
        (&["trimesh", "mesh"], ColliderKind::TriMesh),
    ];

    /// Kind named by a keyword in a node name, first keyword group wins
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        Self::KEYWORDS
            .iter()
            .find(|(words, _)| words.iter().any(|w| lower.contains(w)))
            .map(|(_, kind)| *kind)
    }

    /// Kind implied by geometry size
    pub fn from_counts(triangles: usize, vertices: usize, thresholds: &CollisionThresholds) -> Self {
        if triangles <= thresholds.box_max_triangles && vertices <= thresholds.box_max_vertices {
            Self::Box
        } else if triangles <= thresholds.convex_max_triangles && vertices <= thresholds.convex_max_vertices {
            Self::Convex
        } else {
            Self::TriMesh
        }
    }

    /// Lower-case name used in logs and JSON
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Box => "box",
            Self::Sphere => "sphere",
            Self::Capsule => "capsule",
            Self::Cylinder => "cylinder",
            Self::Plane => "plane",
            Self::Convex => "convex",
            Self::TriMesh => "trimesh",
        }
    }
}

/// Where a collision mesh's kind came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KindSource {
    /// Explicit node metadata
    Metadata,
    /// Keyword in the node name
    Keyword,
    /// Triangle and vertex counts
    Geometry,
    /// Nothing to go on, box assumed
    Fallback,
}

/// Whether a node name follows the collision naming convention
pub fn is_collision_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.starts_with("col_")
        || lower.starts_with("collision_")
        || lower.contains("_col_")
        || lower.ends_with("_col")
}

/// One detected collision proxy
#[derive(Debug, Clone)]
pub struct CollisionMesh {
    /// Node name
    pub name: String,
    /// Inferred collider kind
    pub kind: ColliderKind,
    /// How the kind was decided
    pub kind_source: KindSource,
    /// Vertex count, absent without geometry
    pub vertex_count: Option<usize>,
    /// Triangle count, absent without geometry or with broken indices
    pub triangle_count: Option<usize>,
    /// Local bounds, absent without finite vertices
    pub bounds: Option<BoundingBox>,
    /// Transform relative to the model root
    pub transform: Transform,
    /// Proxy geometry for hull and trimesh colliders
    pub mesh: Option<Arc<Mesh>>,
}

/// Collision analysis result for one asset type
#[derive(Debug, Clone, Default)]
pub struct CollisionDescriptor {
    /// Whether any collision proxy was found
    pub has_collision_meshes: bool,
    /// Detected proxies in traversal order
    pub collision_meshes: Vec<CollisionMesh>,
    /// Number of nodes carrying geometry
    pub total_meshes: usize,
    /// Names of all nodes carrying geometry
    pub all_meshes: Vec<String>,
    /// Anomalies found along the way
    pub warnings: Vec<AnalysisWarning>,
}

/// Finds collision proxies in model hierarchies, cached per asset type
pub struct CollisionAnalyzer {
    strategy: ClassificationStrategy,
    thresholds: CollisionThresholds,
    types: Arc<TypeInterner>,
    cache: CacheArena<CollisionDescriptor>,
}

impl CollisionAnalyzer {
    /// Create an analyzer sharing a type interner with the rest of the session
    pub fn new(strategy: ClassificationStrategy, thresholds: CollisionThresholds, types: Arc<TypeInterner>) -> Self {
        Self {
            strategy,
            thresholds,
            types,
            cache: CacheArena::new(),
        }
    }

    /// Analyze a hierarchy, reusing the cached result for `asset_type`
    pub fn analyze(&self, root: &ModelNode, asset_type: &str) -> Arc<CollisionDescriptor> {
        let key = self.types.intern(asset_type);
        self.cache.get_or_insert_with(key, || {
            let descriptor = self.analyze_uncached(root);
            log::debug!(
                "Collision analysis for '{}': {} proxies among {} meshes",
                asset_type,
                descriptor.collision_meshes.len(),
                descriptor.total_meshes
            );
            for warning in &descriptor.warnings {
                log::warn!("Collision analysis for '{}': {}", asset_type, warning);
            }
            descriptor
        })
    }

    /// Previously computed result for an asset type
    pub fn cached(&self, asset_type: &str) -> Option<Arc<CollisionDescriptor>> {
        self.types.get(asset_type).and_then(|key| self.cache.get(key))
    }

    /// Number of cached asset types
    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    /// Analyze without touching the cache
    pub fn analyze_uncached(&self, root: &ModelNode) -> CollisionDescriptor {
        let mut descriptor = CollisionDescriptor::default();

        for visit in self.strategy.walk(root) {
            let node = visit.node;
            if node.mesh.is_some() {
                descriptor.total_meshes += 1;
                descriptor.all_meshes.push(node.name.clone());
            }
            if visit.role != NodeRole::Collision {
                continue;
            }
            log::trace!("Collision proxy '{}' at depth {}", node.name, visit.depth);
            descriptor
                .collision_meshes
                .push(self.describe(node, visit.transform, &mut descriptor.warnings));
        }

        descriptor.has_collision_meshes = !descriptor.collision_meshes.is_empty();
        descriptor
    }

    fn describe(&self, node: &ModelNode, transform: Transform, warnings: &mut Vec<AnalysisWarning>) -> CollisionMesh {
        let mesh = node.mesh.as_ref();
        let vertex_count = mesh.map(|m| m.vertex_count());
        let triangle_count = mesh.and_then(|m| {
            let count = triangle_count(m);
            if count.is_none() {
                warnings.push(AnalysisWarning::new(&node.name, "index buffer references missing vertices"));
            }
            count
        });
        let bounds = mesh.and_then(|m| {
            let bounds = m.bounds();
            if bounds.is_none() {
                warnings.push(AnalysisWarning::new(&node.name, "bounding box not computable"));
            }
            bounds
        });
        if mesh.is_none() {
            warnings.push(AnalysisWarning::new(&node.name, "collision node has no geometry"));
        }

        let (kind, kind_source) = if let Some(kind) = node.metadata.collider {
            (kind, KindSource::Metadata)
        } else if let Some(kind) = ColliderKind::from_name(&node.name) {
            (kind, KindSource::Keyword)
        } else if let (Some(tris), Some(verts)) = (triangle_count, vertex_count) {
            (ColliderKind::from_counts(tris, verts, &self.thresholds), KindSource::Geometry)
        } else {
            (ColliderKind::Box, KindSource::Fallback)
        };

        CollisionMesh {
            name: node.name.clone(),
            kind,
            kind_source,
            vertex_count,
            triangle_count,
            bounds,
            transform,
            mesh: node.mesh.clone(),
        }
    }

    /// Drop every cached descriptor
    pub fn dispose(&self) {
        self.cache.clear();
    }
}

/// `index_count / 3` for indexed meshes, `vertex_count / 3` otherwise
///
/// `None` when an index points past the vertex buffer.
fn triangle_count(mesh: &Mesh) -> Option<usize> {
    let count = mesh.vertex_count();
    if mesh.indices.iter().any(|&i| i as usize >= count) {
        return None;
    }
    Some(mesh.triangle_count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::NodeRole;
    use crate::assets::model::NodeMetadata;
    use crate::render::Mesh;

    fn analyzer() -> CollisionAnalyzer {
        CollisionAnalyzer::new(
            ClassificationStrategy::NameHeuristic,
            CollisionThresholds::default(),
            Arc::new(TypeInterner::new()),
        )
    }

    /// Non-indexed soup with the given triangle count over `vertices` distinct points
    fn soup(triangles: usize, vertices: usize) -> Mesh {
        let mut mesh = Mesh::from_positions(&vec![[0.0, 0.0, 0.0]; vertices]);
        for (i, v) in mesh.vertices.iter_mut().enumerate() {
            v.position = [i as f32, (i % 3) as f32, (i % 5) as f32];
        }
        mesh.indices = (0..triangles * 3).map(|i| (i % vertices) as u32).collect();
        mesh
    }

    #[test]
    fn test_naming_convention() {
        assert!(is_collision_name("col_wheel"));
        assert!(is_collision_name("COLLISION_hull"));
        assert!(is_collision_name("body_col_left"));
        assert!(is_collision_name("mesh_Col"));
        assert!(!is_collision_name("collar"));
        assert!(!is_collision_name("wheel"));
    }

    #[test]
    fn test_small_proxy_is_box() {
        let root = ModelNode::group("car").with_child(ModelNode::with_mesh("col_wheel", soup(12, 8)));
        let descriptor = analyzer().analyze(&root, "car");
        assert!(descriptor.has_collision_meshes);
        let wheel = &descriptor.collision_meshes[0];
        assert_eq!(wheel.kind, ColliderKind::Box);
        assert_eq!(wheel.kind_source, KindSource::Geometry);
        assert_eq!(wheel.triangle_count, Some(12));
        assert_eq!(wheel.vertex_count, Some(8));
    }

    #[test]
    fn test_large_proxy_is_trimesh() {
        let root = ModelNode::group("rock").with_child(ModelNode::with_mesh("rock_col", soup(200, 120)));
        let descriptor = analyzer().analyze(&root, "rock");
        assert_eq!(descriptor.collision_meshes[0].kind, ColliderKind::TriMesh);
        assert_eq!(descriptor.collision_meshes[0].kind_source, KindSource::Geometry);

        let root = ModelNode::group("wall").with_child(ModelNode::with_mesh("mesh_col", soup(200, 120)));
        assert_eq!(analyzer().analyze(&root, "wall").collision_meshes[0].kind, ColliderKind::TriMesh);
    }

    #[test]
    fn test_medium_proxy_is_convex() {
        let root = ModelNode::group("barrel").with_child(ModelNode::with_mesh("col_hull", soup(40, 24)));
        assert_eq!(analyzer().analyze(&root, "barrel").collision_meshes[0].kind, ColliderKind::Convex);
    }

    #[test]
    fn test_keyword_beats_geometry() {
        let root = ModelNode::group("ball").with_child(ModelNode::with_mesh("col_sphere", soup(200, 120)));
        let mesh = &analyzer().analyze(&root, "ball").collision_meshes[0];
        assert_eq!(mesh.kind, ColliderKind::Sphere);
        assert_eq!(mesh.kind_source, KindSource::Keyword);
    }

    #[test]
    fn test_metadata_beats_keyword() {
        let metadata = NodeMetadata {
            collider: Some(ColliderKind::Capsule),
            ..Default::default()
        };
        let root = ModelNode::group("npc").with_child(ModelNode::with_mesh("body_box", soup(12, 8)).with_metadata(metadata));
        let mesh = &analyzer().analyze(&root, "npc").collision_meshes[0];
        assert_eq!(mesh.kind, ColliderKind::Capsule);
        assert_eq!(mesh.kind_source, KindSource::Metadata);
    }

    #[test]
    fn test_counts_meshes() {
        let root = ModelNode::with_mesh("crate", soup(12, 8))
            .with_child(ModelNode::with_mesh("lid", soup(2, 4)))
            .with_child(ModelNode::with_mesh("col_crate", soup(12, 8)))
            .with_child(ModelNode::group("empty"));
        let descriptor = analyzer().analyze(&root, "crate");
        assert_eq!(descriptor.total_meshes, 3);
        assert_eq!(descriptor.all_meshes, ["crate", "lid", "col_crate"]);
        assert_eq!(descriptor.collision_meshes.len(), 1);
    }

    #[test]
    fn test_malformed_geometry_warns_without_panicking() {
        let mut broken = soup(4, 4);
        broken.indices.push(99);
        broken.vertices[0].position = [f32::NAN, 0.0, 0.0];
        let root = ModelNode::group("junk")
            .with_child(ModelNode::with_mesh("col_junk", broken))
            .with_child(ModelNode::group("col_nothing"));
        let descriptor = analyzer().analyze(&root, "junk");

        let junk = &descriptor.collision_meshes[0];
        assert_eq!(junk.triangle_count, None);
        assert!(junk.bounds.is_none());
        assert_eq!(junk.kind_source, KindSource::Fallback);

        let nothing = &descriptor.collision_meshes[1];
        assert_eq!(nothing.vertex_count, None);
        assert_eq!(nothing.kind, ColliderKind::Box);
        assert_eq!(descriptor.warnings.len(), 3);
    }

    #[test]
    fn test_cache_per_type_and_dispose() {
        let analyzer = analyzer();
        let with_col = ModelNode::group("a").with_child(ModelNode::with_mesh("col_a", soup(12, 8)));
        let first = analyzer.analyze(&with_col, "crate");
        // A different hierarchy under the same type returns the cached result
        let second = analyzer.analyze(&ModelNode::group("b"), "crate");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(analyzer.cached_count(), 1);

        analyzer.dispose();
        assert!(analyzer.cached("crate").is_none());
        assert!(!analyzer.analyze(&ModelNode::group("b"), "crate").has_collision_meshes);
    }

    #[test]
    fn test_explicit_role_marks_collision() {
        let metadata = NodeMetadata {
            role: Some(NodeRole::Collision),
            ..Default::default()
        };
        let root = ModelNode::group("door").with_child(ModelNode::with_mesh("frame", soup(12, 8)).with_metadata(metadata));
        let analyzer = CollisionAnalyzer::new(
            ClassificationStrategy::ExplicitMetadata,
            CollisionThresholds::default(),
            Arc::new(TypeInterner::new()),
        );
        assert_eq!(analyzer.analyze(&root, "door").collision_meshes.len(), 1);
    }
}
