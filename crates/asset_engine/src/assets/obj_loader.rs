//! OBJ file loader for 3D models
//!
//! Every `o` or `g` statement starts a named child node of the model root;
//! faces before the first statement belong to the root itself. Vertices are
//! deduplicated per node by their `position/texcoord/normal` index triple.
//!
//! An optional JSON sidecar next to the model (`wheel.obj.meta.json` for
//! `wheel.obj`) carries what OBJ cannot express:
//!
//! ```json
//! {
//!   "colliders": [{ "shape": { "type": "ball", "radius": 0.5 } }],
//!   "nodes": {
//!     "bone_forearm": { "is_bone": true, "parent": "bone_upper", "extras": { "joint": "hinge" } }
//!   }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::model::{LoadedModel, ModelLoader, ModelMetadata, ModelNode, NodeMetadata};
use super::AssetError;
use crate::foundation::math::{quat_from_euler, Vec3};
use crate::physics::ColliderDesc;
use crate::render::{Mesh, Vertex};

type IndexTriple = (usize, Option<usize>, Option<usize>);

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Sidecar {
    colliders: Vec<ColliderDesc>,
    nodes: BTreeMap<String, NodeOverride>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NodeOverride {
    is_bone: Option<bool>,
    visible: Option<bool>,
    parent: Option<String>,
    position: Option<Vec3>,
    /// XYZ Euler angles in radians
    rotation: Option<Vec3>,
    scale: Option<Vec3>,
    #[serde(flatten)]
    metadata: NodeMetadata,
}

struct NodeBuilder {
    name: String,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    lookup: HashMap<IndexTriple, u32>,
}

impl NodeBuilder {
    fn new(name: String) -> Self {
        Self {
            name,
            vertices: Vec::new(),
            indices: Vec::new(),
            lookup: HashMap::new(),
        }
    }

    fn into_node(self) -> ModelNode {
        if self.vertices.is_empty() {
            ModelNode::group(self.name)
        } else {
            ModelNode::with_mesh(self.name, Mesh::new(self.vertices, self.indices))
        }
    }
}

/// Wavefront OBJ implementation of [`ModelLoader`]
#[derive(Debug, Clone)]
pub struct ObjModelLoader {
    read_sidecar: bool,
}

impl Default for ObjModelLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjModelLoader {
    /// Loader that also reads `<file>.meta.json` sidecars
    pub fn new() -> Self {
        Self { read_sidecar: true }
    }

    /// Loader that ignores sidecars
    pub fn without_sidecar() -> Self {
        Self { read_sidecar: false }
    }

    /// Sidecar path for a model path
    pub fn sidecar_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".meta.json");
        PathBuf::from(name)
    }

    /// Parse OBJ text into a hierarchy whose root is called `root_name`
    pub fn parse<R: BufRead>(root_name: &str, reader: R) -> Result<ModelNode, AssetError> {
        let mut positions: Vec<[f32; 3]> = Vec::new();
        let mut normals: Vec<[f32; 3]> = Vec::new();
        let mut tex_coords: Vec<[f32; 2]> = Vec::new();
        let mut builders = vec![NodeBuilder::new(root_name.to_string())];
        let mut current = 0usize;

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parts: Vec<&str> = line.split_whitespace().collect();
            let err = |message: &str| AssetError::Parse {
                line: line_no + 1,
                message: message.to_string(),
            };

            match parts[0] {
                "v" => positions.push(parse_floats::<3>(&parts[1..]).ok_or_else(|| err("invalid vertex"))?),
                "vn" => normals.push(parse_floats::<3>(&parts[1..]).ok_or_else(|| err("invalid normal"))?),
                "vt" => tex_coords.push(parse_floats::<2>(&parts[1..]).ok_or_else(|| err("invalid texture coordinate"))?),
                "o" | "g" => {
                    let name = if parts.len() > 1 {
                        parts[1..].join(" ")
                    } else {
                        format!("unnamed_{}", builders.len())
                    };
                    // Re-entering an existing group appends to it
                    current = match builders.iter().position(|b| b.name == name) {
                        Some(index) => index,
                        None => {
                            builders.push(NodeBuilder::new(name));
                            builders.len() - 1
                        }
                    };
                }
                "f" => {
                    if parts.len() < 4 {
                        return Err(err("face needs at least three vertices"));
                    }
                    let builder = &mut builders[current];
                    let mut face = Vec::with_capacity(parts.len() - 1);
                    for token in &parts[1..] {
                        let mut fields = token.split('/');
                        let pos = fields
                            .next()
                            .and_then(|f| resolve_index(f, positions.len()))
                            .ok_or_else(|| err("position index out of bounds"))?;
                        let tex = fields
                            .next()
                            .filter(|f| !f.is_empty())
                            .and_then(|f| resolve_index(f, tex_coords.len()));
                        let normal = fields
                            .next()
                            .filter(|f| !f.is_empty())
                            .and_then(|f| resolve_index(f, normals.len()));

                        let key = (pos, tex, normal);
                        let index = match builder.lookup.get(&key) {
                            Some(&index) => index,
                            None => {
                                let vertex = Vertex::new(
                                    positions[pos],
                                    normal.map_or([0.0, 1.0, 0.0], |i| normals[i]),
                                    tex.map_or([0.0, 0.0], |i| tex_coords[i]),
                                );
                                let index = builder.vertices.len() as u32;
                                builder.vertices.push(vertex);
                                builder.lookup.insert(key, index);
                                index
                            }
                        };
                        face.push(index);
                    }
                    // Fan triangulation
                    for i in 1..face.len() - 1 {
                        builder.indices.extend_from_slice(&[face[0], face[i], face[i + 1]]);
                    }
                }
                _ => {}
            }
        }

        if builders.iter().all(|b| b.vertices.is_empty()) {
            return Err(AssetError::InvalidFormat("No faces found in OBJ data".to_string()));
        }

        let mut builders = builders.into_iter();
        let mut root = builders
            .next()
            .map(NodeBuilder::into_node)
            .unwrap_or_else(|| ModelNode::group(root_name));
        root.children = builders.map(NodeBuilder::into_node).collect();
        Ok(root)
    }

    fn read_sidecar(path: &Path) -> Result<Sidecar, AssetError> {
        let sidecar_path = Self::sidecar_path(path);
        if !sidecar_path.exists() {
            return Ok(Sidecar::default());
        }
        log::debug!("Reading model sidecar {:?}", sidecar_path);
        let text = std::fs::read_to_string(&sidecar_path)?;
        serde_json::from_str(&text).map_err(|e| AssetError::Sidecar {
            path: sidecar_path.display().to_string(),
            message: e.to_string(),
        })
    }
}

impl ModelLoader for ObjModelLoader {
    fn load(&self, path: &Path) -> Result<LoadedModel, AssetError> {
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AssetError::NotFound(path.display().to_string()),
            _ => AssetError::IoError(e),
        })?;
        let root_name = path
            .file_stem()
            .map_or_else(|| "model".to_string(), |s| s.to_string_lossy().into_owned());
        let root = Self::parse(&root_name, BufReader::new(file))?;

        let sidecar = if self.read_sidecar {
            Self::read_sidecar(path)?
        } else {
            Sidecar::default()
        };
        let root = apply_overrides(root, sidecar.nodes);

        log::info!("Loaded OBJ model {:?} ({} child nodes)", path, root.children.len());
        Ok(LoadedModel {
            root,
            metadata: ModelMetadata { colliders: sidecar.colliders },
        })
    }
}

fn parse_floats<const N: usize>(fields: &[&str]) -> Option<[f32; N]> {
    let mut out = [0.0f32; N];
    for (slot, field) in out.iter_mut().zip(fields) {
        *slot = field.parse().ok()?;
    }
    (fields.len() >= N).then_some(out)
}

/// Resolve a 1-based or negative (relative) OBJ index
fn resolve_index(field: &str, len: usize) -> Option<usize> {
    let raw: i64 = field.parse().ok()?;
    let index = match raw {
        0 => return None,
        r if r > 0 => r as usize - 1,
        r => len.checked_sub(r.unsigned_abs() as usize)?,
    };
    (index < len).then_some(index)
}

fn apply_override(node: &mut ModelNode, ov: &NodeOverride) {
    if let Some(is_bone) = ov.is_bone {
        node.is_bone = is_bone;
    }
    if let Some(visible) = ov.visible {
        node.visible = visible;
    }
    if let Some(position) = ov.position {
        node.transform.position = position;
    }
    if let Some(rotation) = ov.rotation {
        node.transform.rotation = quat_from_euler(rotation);
    }
    if let Some(scale) = ov.scale {
        node.transform.scale = scale;
    }
    node.metadata = ov.metadata.clone();
}

/// Apply sidecar node overrides and rebuild the hierarchy from `parent` links
///
/// Unknown parents and parent cycles leave the node directly under the root.
fn apply_overrides(mut root: ModelNode, overrides: BTreeMap<String, NodeOverride>) -> ModelNode {
    if overrides.is_empty() {
        return root;
    }
    if let Some(ov) = overrides.get(&root.name) {
        apply_override(&mut root, ov);
    }

    let mut flat = std::mem::take(&mut root.children);
    let mut by_name: HashMap<String, usize> = HashMap::new();
    for (index, node) in flat.iter_mut().enumerate() {
        if let Some(ov) = overrides.get(&node.name) {
            apply_override(node, ov);
        }
        by_name.entry(node.name.clone()).or_insert(index);
    }

    let mut parents: Vec<Option<usize>> = flat
        .iter()
        .map(|node| {
            let parent = overrides.get(&node.name)?.parent.as_ref()?;
            let found = by_name.get(parent).copied();
            if found.is_none() && *parent != root.name {
                log::warn!("Model node '{}' names unknown parent '{}'", node.name, parent);
            }
            found
        })
        .collect();

    for i in 0..parents.len() {
        let mut cursor = parents[i];
        let mut steps = 0;
        while let Some(p) = cursor {
            if p == i {
                log::warn!("Model node '{}' is part of a parent cycle", flat[i].name);
                parents[i] = None;
                break;
            }
            steps += 1;
            if steps > parents.len() {
                break;
            }
            cursor = parents[p];
        }
    }

    let mut children_of: Vec<Vec<usize>> = vec![Vec::new(); flat.len()];
    let mut top_level = Vec::new();
    for (index, parent) in parents.iter().enumerate() {
        match parent {
            Some(p) => children_of[*p].push(index),
            None => top_level.push(index),
        }
    }

    let mut slots: Vec<Option<ModelNode>> = flat.into_iter().map(Some).collect();
    root.children = top_level
        .into_iter()
        .filter_map(|index| assemble(index, &mut slots, &children_of))
        .collect();
    root
}

fn assemble(index: usize, slots: &mut [Option<ModelNode>], children_of: &[Vec<usize>]) -> Option<ModelNode> {
    let mut node = slots[index].take()?;
    for &child in &children_of[index] {
        if let Some(child) = assemble(child, slots, children_of) {
            node.children.push(child);
        }
    }
    Some(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const CUBE_GROUPS: &str = "\
v -1 -1 -1
v 1 -1 -1
v 1 1 -1
v -1 1 -1
o body
f 1 2 3 4
o col_body_box
f 1 2 3
f -4 -2 -1
";

    #[test]
    fn test_parse_splits_objects() {
        let root = ObjModelLoader::parse("crate", Cursor::new(CUBE_GROUPS)).unwrap();
        assert_eq!(root.name, "crate");
        assert!(root.mesh.is_none());
        let names: Vec<&str> = root.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["body", "col_body_box"]);

        let body = root.children[0].mesh.as_ref().unwrap();
        assert_eq!(body.vertex_count(), 4);
        assert_eq!(body.triangle_count(), 2);

        let col = root.children[1].mesh.as_ref().unwrap();
        assert_eq!(col.triangle_count(), 2);
        assert_eq!(col.vertex_count(), 4);
    }

    #[test]
    fn test_parse_errors_carry_line_numbers() {
        let err = ObjModelLoader::parse("bad", Cursor::new("v 0 0 0\nf 1 2 9\n")).unwrap_err();
        assert!(matches!(err, AssetError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_parse_rejects_empty_model() {
        let err = ObjModelLoader::parse("empty", Cursor::new("v 0 0 0\n")).unwrap_err();
        assert!(matches!(err, AssetError::InvalidFormat(_)));
    }

    #[test]
    fn test_resolve_negative_index() {
        assert_eq!(resolve_index("-1", 4), Some(3));
        assert_eq!(resolve_index("0", 4), None);
        assert_eq!(resolve_index("5", 4), None);
        assert_eq!(resolve_index("-5", 4), None);
    }

    #[test]
    fn test_overrides_rebuild_hierarchy() {
        let root = ModelNode::group("arm")
            .with_child(ModelNode::group("bone_upper"))
            .with_child(ModelNode::group("bone_lower"))
            .with_child(ModelNode::group("loop_a"))
            .with_child(ModelNode::group("loop_b"));
        let overrides: BTreeMap<String, NodeOverride> = serde_json::from_str(
            r#"{
                "bone_lower": { "is_bone": true, "parent": "bone_upper", "extras": { "joint": "hinge" } },
                "loop_a": { "parent": "loop_b" },
                "loop_b": { "parent": "loop_a" }
            }"#,
        )
        .unwrap();
        let root = apply_overrides(root, overrides);

        let upper = root.children.iter().find(|c| c.name == "bone_upper").unwrap();
        assert_eq!(upper.children.len(), 1);
        assert!(upper.children[0].is_bone);
        assert_eq!(upper.children[0].metadata.extras["joint"], "hinge");
        // The cycle is broken at loop_a, loop_b stays reachable below it
        let loop_a = root.children.iter().find(|c| c.name == "loop_a").unwrap();
        assert_eq!(loop_a.children[0].name, "loop_b");
        assert_eq!(root.children.len(), 2);
    }

    #[test]
    fn test_load_with_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ball.obj");
        std::fs::write(&path, CUBE_GROUPS).unwrap();
        std::fs::write(
            ObjModelLoader::sidecar_path(&path),
            r#"{ "colliders": [{ "shape": { "type": "ball", "radius": 0.5 } }] }"#,
        )
        .unwrap();

        let model = ObjModelLoader::new().load(&path).unwrap();
        assert_eq!(model.root.name, "ball");
        assert!(model.metadata.has_physics());
        assert_eq!(model.metadata.colliders[0].friction, 0.5);

        let plain = ObjModelLoader::without_sidecar().load(&path).unwrap();
        assert!(!plain.metadata.has_physics());
    }

    #[test]
    fn test_load_missing_file() {
        let err = ObjModelLoader::new().load(Path::new("/nonexistent/thing.obj")).unwrap_err();
        assert!(matches!(err, AssetError::NotFound(_)));
    }
}
