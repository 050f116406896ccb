//! Asset spawning
//!
//! [`AssetHandler`] turns a [`SpawnRequest`] into a live instance: a node tree
//! in the render scene, optionally a rigid body with colliders in the physics
//! world, and an [`InstanceId`] in [`AssetStorage`] tying the two together.
//!
//! # Architecture
//!
//! ```text
//! SpawnRequest → resolve type → SpawnOptions → geometry + colliders
//!                    |                              |
//!        primitive or custom type        model loader → analyzers
//!                                                   |
//!                          physics body → scene node → storage.add
//! ```
//!
//! The physics body is built first so a collider failure can be rolled back
//! before anything becomes visible. Adding the scene node and registering the
//! id cannot fail, so callers only ever observe complete instances.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use super::model::{LoadedModel, ModelLoader, ModelNode};
use super::storage::{AssetStorage, InstanceId};
use super::AssetError;
use crate::analysis::{
    validate_rig, ClassificationStrategy, ColliderKind, CollisionAnalyzer, CollisionDescriptor,
    CollisionMesh, NodeRole, RigAnalyzer, RigDescriptor,
};
use crate::core::config::{AnalysisSettings, SpawnSettings};
use crate::foundation::collections::{CacheArena, TypeInterner};
use crate::foundation::math::{Quat, Transform, Vec3};
use crate::manifest::{AssetEntry, CustomType, Primitive, SizeSpec};
use crate::physics::{
    BodyHandle, ColliderDesc, ColliderShape, CollisionLayers, LayerRef, PhysicsWorld, RigidBodyDesc,
    SleepPolicy,
};
use crate::render::{parse_color, Material, Mesh, NodeId, RenderScene, SceneNode};

/// Thickness given to plane colliders
const PLANE_HALF_THICKNESS: f32 = 0.01;

impl Primitive {
    fn collider_kind(self) -> ColliderKind {
        match self {
            Self::Box => ColliderKind::Box,
            Self::Sphere => ColliderKind::Sphere,
            Self::Capsule => ColliderKind::Capsule,
            Self::Cylinder => ColliderKind::Cylinder,
        }
    }

    /// Half extents of the visual mesh
    pub fn half_extents(self, size: &SizeSpec) -> Vec3 {
        let size = size.or(self.default_size());
        let radius = size.radius.unwrap_or(0.5);
        let height = size.height.unwrap_or(1.0);
        match self {
            Self::Box => Vec3::new(size.width.unwrap_or(1.0), height, size.depth.unwrap_or(1.0)) * 0.5,
            Self::Sphere => Vec3::repeat(radius),
            Self::Capsule | Self::Cylinder => Vec3::new(radius, height * 0.5, radius),
        }
    }

    /// Parametric geometry
    pub fn mesh(self, size: &SizeSpec, settings: &SpawnSettings) -> Mesh {
        let half = self.half_extents(size);
        match self {
            Self::Box => Mesh::cuboid(half.x * 2.0, half.y * 2.0, half.z * 2.0),
            Self::Sphere => Mesh::sphere(half.x, settings.radial_segments, settings.rings),
            Self::Capsule => Mesh::capsule(half.x, half.y * 2.0, settings.radial_segments, settings.rings),
            Self::Cylinder => Mesh::cylinder(half.x, half.y * 2.0, settings.radial_segments),
        }
    }

    /// Matching analytic collider; `half_extents` overrides the visual size
    pub fn collider(self, size: &SizeSpec, half_extents: Option<Vec3>) -> ColliderShape {
        analytic_shape(self.collider_kind(), half_extents.unwrap_or_else(|| self.half_extents(size)))
    }
}

/// Analytic shape fitted to half extents
///
/// Spheres take the largest extent; capsules and cylinders take the larger
/// horizontal extent as radius.
fn analytic_shape(kind: ColliderKind, half: Vec3) -> ColliderShape {
    let radial = half.x.max(half.z);
    match kind {
        ColliderKind::Sphere => ColliderShape::Ball { radius: half.max() },
        ColliderKind::Capsule => ColliderShape::Capsule {
            half_height: (half.y - radial).max(0.0),
            radius: radial,
        },
        ColliderKind::Cylinder => ColliderShape::Cylinder {
            half_height: half.y,
            radius: radial,
        },
        ColliderKind::Plane => ColliderShape::Cuboid {
            half_extents: Vec3::new(half.x, half.y.max(PLANE_HALF_THICKNESS), half.z),
        },
        ColliderKind::Box | ColliderKind::Convex | ColliderKind::TriMesh => {
            ColliderShape::Cuboid { half_extents: half }
        }
    }
}

fn scale_shape(shape: ColliderShape, scale: Vec3) -> ColliderShape {
    let s = scale.abs();
    let radial = s.x.max(s.z);
    match shape {
        ColliderShape::Cuboid { half_extents } => ColliderShape::Cuboid {
            half_extents: half_extents.component_mul(&s),
        },
        ColliderShape::Ball { radius } => ColliderShape::Ball { radius: radius * s.max() },
        ColliderShape::Capsule { half_height, radius } => ColliderShape::Capsule {
            half_height: half_height * s.y,
            radius: radius * radial,
        },
        ColliderShape::Cylinder { half_height, radius } => ColliderShape::Cylinder {
            half_height: half_height * s.y,
            radius: radius * radial,
        },
        ColliderShape::ConvexHull { points } => ColliderShape::ConvexHull {
            points: points.into_iter().map(|p| p.component_mul(&scale)).collect(),
        },
        ColliderShape::TriMesh { vertices, indices } => ColliderShape::TriMesh {
            vertices: vertices.into_iter().map(|p| p.component_mul(&scale)).collect(),
            indices,
        },
    }
}

/// Errors that abort a spawn
#[derive(Debug, Error)]
pub enum SpawnError {
    /// Neither a primitive nor a spawnable custom type
    #[error("Unknown asset type: {0}")]
    NotFound(String),

    /// Model file could not be loaded
    #[error("Failed to load model for '{asset_type}': {source}")]
    Model {
        /// Asset type being spawned
        asset_type: String,
        /// Loader error
        #[source]
        source: AssetError,
    },

    /// Pose cannot be placed in the world
    #[error("Invalid spawn parameters: {0}")]
    InvalidParameters(String),
}

/// Conditions that do not abort a spawn
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpawnWarning {
    /// No physics world was available; the instance is visual-only
    #[error("No physics world available, instance is visual-only")]
    NoPhysicsWorld,

    /// Collider creation failed and the body was discarded
    #[error("Collider '{shape}' rejected ({reason}), instance is visual-only")]
    ColliderFailed {
        /// Shape kind
        shape: String,
        /// Physics world message
        reason: String,
    },

    /// No collider could be derived for a collidable model
    #[error("No collider derived for '{0}', instance is visual-only")]
    NoCollider(String),

    /// An option was present but unusable and its default was kept
    #[error("Option '{key}' ignored: {reason}")]
    MalformedOption {
        /// Option key
        key: String,
        /// What was wrong
        reason: String,
    },

    /// A collision layer name or index does not exist
    #[error("Unknown collision layer {0:?}")]
    UnknownLayer(LayerRef),
}

impl SpawnWarning {
    /// Whether the instance lost its physics representation
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::NoPhysicsWorld | Self::ColliderFailed { .. } | Self::NoCollider(_))
    }
}

/// Fully resolved spawn parameters
///
/// Layered from [`SpawnSettings`], then the custom type, then the per-request
/// option map. Unusable option values keep the lower layer's value.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnOptions {
    /// Mass, `<= 0` makes the body fixed
    pub mass: f32,
    /// Whether gravity acts on the body
    pub gravity: bool,
    /// Gravity multiplier for dynamic bodies
    pub gravity_scale: f32,
    /// Primitive or model dimensions
    pub size: SizeSpec,
    /// Instance scale
    pub scale: Vec3,
    /// Collider half extents overriding the visual size
    pub collider_dimensions: Option<Vec3>,
    /// Bounciness
    pub restitution: f32,
    /// Surface friction
    pub friction: f32,
    /// Sleep behaviour
    pub sleep: SleepPolicy,
    /// Collider layer bits
    pub collision_groups: u32,
    /// Collider mask bits
    pub collision_mask: u32,
    /// Whether a physics body is built at all
    pub collidable: bool,
    /// Whether the instance is drawn
    pub visible: bool,
    /// Surface material
    pub material: Material,
    /// Keep collision nodes visible as an overlay
    pub show_collision: bool,
    /// Overlay material for collision nodes
    pub debug_material: Material,
}

impl SpawnOptions {
    /// Layer the defaults, a custom type and an option map
    pub fn resolve(
        settings: &SpawnSettings,
        custom: Option<&CustomType>,
        options: &Map<String, Value>,
    ) -> (Self, Vec<SpawnWarning>) {
        let mut reader = OptionReader {
            options,
            warnings: Vec::new(),
        };
        let physics = custom.map(|c| c.physics.clone()).unwrap_or_default();
        let visual = custom.map(|c| c.visual.clone()).unwrap_or_default();
        let layers = custom.map(|c| c.load_layers).unwrap_or_default();

        let gravity_scale = reader
            .number("gravity_scale")
            .or(physics.gravity_scale)
            .unwrap_or(1.0);
        let gravity = reader.boolean("gravity").unwrap_or(gravity_scale != 0.0);

        let mut size = custom.map(|c| c.size).unwrap_or_default();
        size = reader.size().or(size);

        let scale = reader
            .vector("scale")
            .filter(|s| {
                let ok = s.iter().all(|v| *v > 0.0);
                if !ok {
                    reader_warn(&mut reader.warnings, "scale", "components must be positive");
                }
                ok
            })
            .or_else(|| custom.map(|c| c.scale.to_vec3()))
            .unwrap_or_else(|| Vec3::repeat(1.0));

        let collider_dimensions = reader.vector("collider_dimensions").filter(|d| {
            let ok = d.iter().all(|v| *v > 0.0);
            if !ok {
                reader_warn(&mut reader.warnings, "collider_dimensions", "half extents must be positive");
            }
            ok
        });

        let groups = reader.layers("collision_groups").unwrap_or(physics.collision_groups);
        let mask = reader.layers("collision_mask").unwrap_or(physics.collision_mask);
        let (collision_groups, unknown_groups) = CollisionLayers::resolve(&groups);
        let (collision_mask, unknown_mask) = CollisionLayers::resolve(&mask);
        reader
            .warnings
            .extend(unknown_groups.into_iter().chain(unknown_mask).map(SpawnWarning::UnknownLayer));

        let color = reader
            .color("color")
            .or_else(|| visual.color.as_ref().and_then(|c| c.resolve()))
            .unwrap_or(settings.default_color);
        let opacity = reader.number("opacity").unwrap_or(visual.opacity);
        let mut material = Material::new(color)
            .with_opacity(opacity)
            .with_shadows(visual.cast_shadow, visual.receive_shadow);
        if visual.emitting {
            material = material.with_emission(
                visual.emission_color.resolve().unwrap_or(color),
                visual.emission_intensity,
            );
        }
        let debug_material = Material::debug_overlay(
            visual.debug.color.resolve().unwrap_or(0x00_FF_00),
            visual.debug.opacity,
        );

        let resolved = Self {
            mass: reader.number("mass").or(physics.mass).unwrap_or(settings.default_mass),
            gravity,
            gravity_scale,
            size,
            scale,
            collider_dimensions,
            restitution: reader
                .number("restitution")
                .or(physics.restitution)
                .unwrap_or(0.0)
                .clamp(0.0, 1.0),
            friction: reader.number("friction").or(physics.friction).unwrap_or(0.5).max(0.0),
            sleep: SleepPolicy {
                can_sleep: reader.boolean("can_sleep").unwrap_or(true),
                sleep_timer: reader
                    .number("sleep_timer")
                    .or(physics.sleep_timer)
                    .unwrap_or(SleepPolicy::default().sleep_timer),
            },
            collision_groups,
            collision_mask,
            collidable: layers.collision && reader.boolean("collidable").unwrap_or(true),
            visible: layers.viewable && reader.boolean("visible").unwrap_or(true),
            material,
            show_collision: reader
                .boolean("show_collision")
                .unwrap_or(settings.show_collision_meshes || visual.debug.enabled),
            debug_material,
        };
        (resolved, reader.warnings)
    }

    /// Whether the body is fixed: `mass <= 0` or gravity disabled
    pub fn is_fixed(&self) -> bool {
        self.mass <= 0.0 || !self.gravity
    }

    /// Rigid body description at a pose
    pub fn body_desc(&self, position: Vec3, rotation: Quat) -> RigidBodyDesc {
        if self.is_fixed() {
            RigidBodyDesc {
                sleep: self.sleep,
                ..RigidBodyDesc::fixed(position, rotation)
            }
        } else {
            RigidBodyDesc {
                gravity_scale: self.gravity_scale,
                sleep: self.sleep,
                ..RigidBodyDesc::dynamic(position, rotation, self.mass)
            }
        }
    }

    /// Collider description carrying this instance's surface and layers
    fn collider_desc(&self, shape: ColliderShape, offset: Vec3) -> ColliderDesc {
        ColliderDesc {
            restitution: self.restitution,
            friction: self.friction,
            collision_groups: self.collision_groups,
            collision_mask: self.collision_mask,
            ..ColliderDesc::new(shape).with_offset(offset)
        }
    }
}

fn reader_warn(warnings: &mut Vec<SpawnWarning>, key: &str, reason: &str) {
    log::warn!("Spawn option '{}' ignored: {}", key, reason);
    warnings.push(SpawnWarning::MalformedOption {
        key: key.to_string(),
        reason: reason.to_string(),
    });
}

/// Lenient typed access to an option map
struct OptionReader<'a> {
    options: &'a Map<String, Value>,
    warnings: Vec<SpawnWarning>,
}

impl OptionReader<'_> {
    fn read<T>(&mut self, key: &str, expected: &str, parse: impl FnOnce(&Value) -> Option<T>) -> Option<T> {
        let value = self.options.get(key)?;
        if value.is_null() {
            return None;
        }
        let parsed = parse(value);
        if parsed.is_none() {
            reader_warn(&mut self.warnings, key, &format!("expected {expected}, got {value}"));
        }
        parsed
    }

    fn number(&mut self, key: &str) -> Option<f32> {
        self.read(key, "a finite number", as_f32)
    }

    fn boolean(&mut self, key: &str) -> Option<bool> {
        self.read(key, "a boolean", Value::as_bool)
    }

    fn color(&mut self, key: &str) -> Option<u32> {
        self.read(key, "a colour", parse_color)
    }

    /// Number (uniform), `[x, y, z]` or `{x, y, z}`
    fn vector(&mut self, key: &str) -> Option<Vec3> {
        self.read(key, "a number or {x, y, z}", |value| match value {
            Value::Array(items) if items.len() == 3 => {
                let v: Option<Vec<f32>> = items.iter().map(as_f32).collect();
                v.map(|v| Vec3::new(v[0], v[1], v[2]))
            }
            Value::Object(map) => {
                let axis = |k: &str| map.get(k).map_or(Some(0.0), as_f32);
                Some(Vec3::new(axis("x")?, axis("y")?, axis("z")?))
            }
            other => as_f32(other).map(Vec3::repeat),
        })
    }

    fn layers(&mut self, key: &str) -> Option<Vec<LayerRef>> {
        self.read(key, "a list of layer names or indices", |value| {
            serde_json::from_value(value.clone()).ok()
        })
    }

    /// `size` object plus top-level `radius`/`width`/`height`/`depth`
    fn size(&mut self) -> SizeSpec {
        let nested = self
            .read("size", "{radius, width, height, depth}", |value| {
                serde_json::from_value::<SizeSpec>(value.clone()).ok()
            })
            .unwrap_or_default();
        let flat = SizeSpec {
            radius: self.number("radius"),
            width: self.number("width"),
            height: self.number("height"),
            depth: self.number("depth"),
        };
        let merged = flat.or(nested);
        let mut checked = SizeSpec::default();
        for (name, value) in merged.values() {
            if value > 0.0 && value.is_finite() {
                match name {
                    "radius" => checked.radius = Some(value),
                    "width" => checked.width = Some(value),
                    "height" => checked.height = Some(value),
                    _ => checked.depth = Some(value),
                }
            } else {
                reader_warn(&mut self.warnings, name, "dimensions must be positive");
            }
        }
        checked
    }
}

fn as_f32(value: &Value) -> Option<f32> {
    value.as_f64().map(|v| v as f32).filter(|v| v.is_finite())
}

/// One spawn call
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRequest {
    /// Primitive name or custom type name
    pub asset_type: String,
    /// World position
    pub position: Vec3,
    /// World orientation
    pub rotation: Quat,
    /// Per-instance options
    pub options: Map<String, Value>,
}

impl SpawnRequest {
    /// Request at a position with identity rotation and no options
    pub fn new(asset_type: impl Into<String>, position: Vec3) -> Self {
        Self {
            asset_type: asset_type.into(),
            position,
            rotation: Quat::identity(),
            options: Map::new(),
        }
    }

    /// Set the orientation
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    /// Set one option
    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// Request described by a manifest entry
    pub fn from_entry(entry: &AssetEntry) -> Self {
        Self {
            asset_type: entry.asset_type.clone(),
            position: entry.position.to_vec3(),
            rotation: entry.rotation_quat(),
            options: entry.config.clone(),
        }
    }

    fn validate(&self) -> Result<(), SpawnError> {
        if !self.position.iter().all(|v| v.is_finite()) {
            return Err(SpawnError::InvalidParameters(format!(
                "position contains invalid values: {:?}",
                self.position
            )));
        }
        if !self.rotation.coords.iter().all(|v| v.is_finite()) {
            return Err(SpawnError::InvalidParameters("rotation contains invalid values".to_string()));
        }
        Ok(())
    }
}

/// A live instance as returned by [`AssetHandler::spawn`]
#[derive(Debug, Clone)]
pub struct SpawnedInstance {
    /// Stable external handle
    pub instance_id: InstanceId,
    /// Root node in the render scene
    pub mesh: NodeId,
    /// Body in the physics world
    pub physics_body: Option<BodyHandle>,
    /// Requested asset type
    pub asset_type: String,
    /// Resolved options
    pub options: SpawnOptions,
    /// Shapes attached to the body
    pub colliders: Vec<ColliderShape>,
    /// Collision analysis of a model-backed type
    pub collision: Option<Arc<CollisionDescriptor>>,
    /// Rig of a model-backed type
    pub rig: Option<Arc<RigDescriptor>>,
    /// Non-fatal problems
    pub warnings: Vec<SpawnWarning>,
}

impl SpawnedInstance {
    /// Whether the instance ended up without its physics body
    pub fn is_degraded(&self) -> bool {
        self.warnings.iter().any(SpawnWarning::is_degraded)
    }
}

enum Source<'a> {
    Primitive(Primitive),
    Model(&'a str),
}

/// Geometry and colliders before anything is registered
struct Blueprint {
    node: SceneNode,
    colliders: Vec<ColliderDesc>,
    collision: Option<Arc<CollisionDescriptor>>,
    rig: Option<Arc<RigDescriptor>>,
}

/// Builds instances from primitives and model-backed custom types
pub struct AssetHandler {
    settings: SpawnSettings,
    strategy: ClassificationStrategy,
    asset_root: PathBuf,
    loader: Box<dyn ModelLoader>,
    paths: TypeInterner,
    models: CacheArena<LoadedModel>,
    collision: CollisionAnalyzer,
    rig: RigAnalyzer,
}

impl AssetHandler {
    /// Create a handler; model paths are resolved against the working directory
    pub fn new(settings: SpawnSettings, analysis: &AnalysisSettings, loader: Box<dyn ModelLoader>) -> Self {
        let types = Arc::new(TypeInterner::new());
        Self {
            settings,
            strategy: analysis.classifier,
            asset_root: PathBuf::new(),
            loader,
            paths: TypeInterner::new(),
            models: CacheArena::new(),
            collision: CollisionAnalyzer::new(analysis.classifier, analysis.collision, Arc::clone(&types)),
            rig: RigAnalyzer::new(analysis.classifier, analysis.joints, types),
        }
    }

    /// Resolve model paths against a directory
    pub fn with_asset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.set_asset_root(root);
        self
    }

    /// Change the directory model paths are resolved against
    pub fn set_asset_root(&mut self, root: impl Into<PathBuf>) {
        self.asset_root = root.into();
    }

    /// Directory model paths are resolved against
    pub fn asset_root(&self) -> &Path {
        &self.asset_root
    }

    /// Collision analyzer and its cache
    pub fn collision_analyzer(&self) -> &CollisionAnalyzer {
        &self.collision
    }

    /// Rig analyzer and its cache
    pub fn rig_analyzer(&self) -> &RigAnalyzer {
        &self.rig
    }

    /// Number of cached models
    pub fn cached_models(&self) -> usize {
        self.models.len()
    }

    /// Spawn an instance
    ///
    /// Without a physics world the instance is visual-only and carries a
    /// [`SpawnWarning::NoPhysicsWorld`].
    pub fn spawn(
        &self,
        request: &SpawnRequest,
        custom_types: &[CustomType],
        scene: &mut dyn RenderScene,
        physics: Option<&mut dyn PhysicsWorld>,
        storage: &mut AssetStorage,
    ) -> Result<SpawnedInstance, SpawnError> {
        request.validate()?;
        let asset_type = request.asset_type.as_str();
        let custom = custom_types.iter().find(|t| t.name == asset_type);
        let source = Self::source(asset_type, custom)?;

        let (options, mut warnings) = SpawnOptions::resolve(&self.settings, custom, &request.options);
        let mut blueprint = match source {
            Source::Primitive(primitive) => self.primitive_blueprint(asset_type, primitive, &options),
            Source::Model(path) => self.model_blueprint(asset_type, path, &options)?,
        };

        let mut body = None;
        let mut colliders = Vec::new();
        if options.collidable {
            match physics {
                None => warnings.push(SpawnWarning::NoPhysicsWorld),
                Some(_) if blueprint.colliders.is_empty() => {
                    warnings.push(SpawnWarning::NoCollider(asset_type.to_string()));
                }
                Some(world) => match Self::build_body(world, request, &options, &blueprint.colliders) {
                    Ok(handle) => {
                        body = Some(handle);
                        colliders = blueprint.colliders.iter().map(|c| c.shape.clone()).collect();
                    }
                    Err(warning) => warnings.push(warning),
                },
            }
        }

        blueprint.node.transform = Transform {
            position: request.position,
            rotation: request.rotation,
            scale: options.scale,
        };
        blueprint.node.visible = options.visible;
        let mesh = scene.add_node(blueprint.node);
        let instance_id = storage.add(mesh, body);

        for warning in warnings.iter().filter(|w| w.is_degraded()) {
            log::warn!("Spawned '{}' as {} degraded: {}", asset_type, instance_id, warning);
        }
        log::debug!(
            "Spawned '{}' as {} at {:?} ({}, {} colliders)",
            asset_type,
            instance_id,
            request.position,
            if body.is_none() { "visual-only" } else if options.is_fixed() { "fixed" } else { "dynamic" },
            colliders.len()
        );

        Ok(SpawnedInstance {
            instance_id,
            mesh,
            physics_body: body,
            asset_type: asset_type.to_string(),
            options,
            colliders,
            collision: blueprint.collision,
            rig: blueprint.rig,
            warnings,
        })
    }

    fn source<'a>(asset_type: &str, custom: Option<&'a CustomType>) -> Result<Source<'a>, SpawnError> {
        let Some(custom) = custom else {
            return Primitive::from_name(asset_type)
                .map(Source::Primitive)
                .ok_or_else(|| SpawnError::NotFound(asset_type.to_string()));
        };
        if let Some(path) = custom.paths.asset.as_deref().filter(|p| !p.is_empty()) {
            return Ok(Source::Model(path));
        }
        custom
            .primitive
            .or_else(|| Primitive::from_name(&custom.name))
            .map(Source::Primitive)
            .ok_or_else(|| SpawnError::NotFound(asset_type.to_string()))
    }

    /// Create the body and attach every collider, removing the body again on failure
    fn build_body(
        world: &mut dyn PhysicsWorld,
        request: &SpawnRequest,
        options: &SpawnOptions,
        colliders: &[ColliderDesc],
    ) -> Result<BodyHandle, SpawnWarning> {
        let body = world.create_rigid_body(&options.body_desc(request.position, request.rotation));
        for collider in colliders {
            if let Err(e) = world.create_collider(collider, body) {
                world.remove_rigid_body(body);
                return Err(SpawnWarning::ColliderFailed {
                    shape: collider.shape.kind_name().to_string(),
                    reason: e.to_string(),
                });
            }
        }
        Ok(body)
    }

    fn primitive_blueprint(&self, asset_type: &str, primitive: Primitive, options: &SpawnOptions) -> Blueprint {
        let mesh = Arc::new(primitive.mesh(&options.size, &self.settings));
        let shape = scale_shape(primitive.collider(&options.size, options.collider_dimensions), options.scale);
        Blueprint {
            node: SceneNode::drawable(asset_type, mesh, options.material.clone()),
            colliders: vec![options.collider_desc(shape, Vec3::zeros())],
            collision: None,
            rig: None,
        }
    }

    fn model_blueprint(
        &self,
        asset_type: &str,
        path: &str,
        options: &SpawnOptions,
    ) -> Result<Blueprint, SpawnError> {
        let model = self.load_model(asset_type, path)?;
        let root = &model.root;
        let collision = self.collision.analyze(root, asset_type);
        let rig = self.rig.analyze(root, asset_type);
        if let Some(rig) = &rig {
            for warning in validate_rig(Some(rig)).warnings {
                log::warn!("Rig of '{}': {}", asset_type, warning);
            }
        }

        let colliders = if let Some(half) = options.collider_dimensions {
            let center = root.subtree_bounds().map_or_else(Vec3::zeros, |b| b.center());
            vec![(analytic_shape(ColliderKind::Box, half), transform_point(&root.transform, center))]
        } else if model.metadata.has_physics() {
            // Authored colliders are used as they are
            model
                .metadata
                .colliders
                .iter()
                .map(|c| (c.shape.clone(), c.offset))
                .collect()
        } else if collision.has_collision_meshes {
            collision
                .collision_meshes
                .iter()
                .filter_map(|cm| {
                    let fitted = fit_collider(cm, &root.transform);
                    if fitted.is_none() {
                        log::warn!("No collider for proxy '{}' of '{}'", cm.name, asset_type);
                    }
                    fitted
                })
                .collect()
        } else if self.settings.fallback_collider {
            root.subtree_bounds()
                .map(|b| {
                    let offset = transform_point(&root.transform, b.center());
                    let half = b.half_extents().component_mul(&root.transform.scale.abs());
                    vec![(analytic_shape(ColliderKind::Box, half), offset)]
                })
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        let colliders = colliders
            .into_iter()
            .map(|(shape, offset)| {
                options.collider_desc(scale_shape(shape, options.scale), offset.component_mul(&options.scale))
            })
            .collect();

        let strategy = self.strategy;
        let node = SceneNode::group(asset_type).with_child(model_node(root, strategy, options));
        Ok(Blueprint {
            node,
            colliders,
            collision: Some(collision),
            rig,
        })
    }

    /// Load a model once per path
    pub fn load_model(&self, asset_type: &str, path: &str) -> Result<Arc<LoadedModel>, SpawnError> {
        let key = self.paths.intern(path);
        if let Some(model) = self.models.get(key) {
            return Ok(model);
        }
        let full = self.asset_root.join(path);
        let model = self.loader.load(&full).map_err(|source| SpawnError::Model {
            asset_type: asset_type.to_string(),
            source,
        })?;
        log::info!("Loaded model for '{}' from {}", asset_type, full.display());
        Ok(self.models.insert(key, model))
    }

    /// Drop cached models and analysis results
    pub fn dispose(&self) {
        self.models.clear();
        self.collision.dispose();
        self.rig.dispose();
    }
}

fn transform_point(transform: &Transform, point: Vec3) -> Vec3 {
    transform.position + transform.rotation * transform.scale.component_mul(&point)
}

/// Collider for one collision proxy in the instance frame
///
/// Analytic kinds are fitted axis-aligned to the proxy bounds; convex and
/// trimesh kinds use the proxy vertices.
fn fit_collider(proxy: &CollisionMesh, root: &Transform) -> Option<(ColliderShape, Vec3)> {
    let frame = root.combine(&proxy.transform);
    let bounds = proxy.bounds?;
    let points = || -> Vec<Vec3> {
        proxy
            .mesh
            .as_ref()
            .map(|m| m.positions().into_iter().map(|p| transform_point(&frame, p)).collect())
            .unwrap_or_default()
    };
    let analytic = || {
        let half = bounds.half_extents().component_mul(&frame.scale.abs());
        (analytic_shape(proxy.kind, half), transform_point(&frame, bounds.center()))
    };
    let fitted = match proxy.kind {
        ColliderKind::Convex => {
            let points = points();
            if points.len() >= 4 {
                (ColliderShape::ConvexHull { points }, Vec3::zeros())
            } else {
                analytic()
            }
        }
        ColliderKind::TriMesh => match proxy.mesh.as_ref().map(|m| m.triangles()) {
            Some(indices) if !indices.is_empty() => (
                ColliderShape::TriMesh {
                    vertices: points(),
                    indices,
                },
                Vec3::zeros(),
            ),
            _ => analytic(),
        },
        _ => analytic(),
    };
    Some(fitted)
}

/// Scene node tree mirroring a model hierarchy
///
/// Collision proxies are hidden unless the overlay is requested, in which case
/// they are drawn with the debug material.
fn model_node(node: &ModelNode, strategy: ClassificationStrategy, options: &SpawnOptions) -> SceneNode {
    let is_collision = strategy.classify(node) == NodeRole::Collision;
    let material = if is_collision {
        options.debug_material.clone()
    } else {
        options.material.clone()
    };
    let mut scene_node = match &node.mesh {
        Some(mesh) => SceneNode::drawable(&node.name, Arc::clone(mesh), material),
        None => SceneNode::group(&node.name),
    };
    scene_node.transform = node.transform;
    scene_node.visible = if is_collision { options.show_collision } else { node.visible };
    scene_node.children = node
        .children
        .iter()
        .map(|child| model_node(child, strategy, options))
        .collect();
    scene_node
}
