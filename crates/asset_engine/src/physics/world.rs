//! Physics world boundary
//!
//! Describes rigid bodies and colliders in solver-neutral terms. A
//! [`PhysicsWorld`] owns every body created through it; the session only
//! keeps [`BodyHandle`]s.

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use thiserror::Error;

use super::collision_layers::CollisionLayers;
use crate::foundation::math::{Quat, Vec3};

new_key_type! {
    /// Handle of a rigid body owned by a physics world
    pub struct BodyHandle;

    /// Handle of a collider owned by a physics world
    pub struct ColliderHandle;
}

/// Physics world errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PhysicsError {
    /// Body handle does not refer to a live body
    #[error("Unknown rigid body {0:?}")]
    UnknownBody(BodyHandle),

    /// Collider parameters cannot form a valid shape
    #[error("Invalid collider shape: {0}")]
    InvalidShape(String),
}

/// Simulation behaviour of a rigid body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyType {
    /// Never moves
    Fixed,
    /// Integrated by the solver
    Dynamic,
}

/// When a resting body may be put to sleep
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SleepPolicy {
    /// Whether the body may sleep at all
    pub can_sleep: bool,
    /// Seconds at rest before sleeping
    pub sleep_timer: f32,
}

impl Default for SleepPolicy {
    fn default() -> Self {
        Self {
            can_sleep: true,
            sleep_timer: 1.0,
        }
    }
}

/// Rigid body creation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigidBodyDesc {
    /// Fixed or dynamic
    pub body_type: BodyType,
    /// Initial position
    pub translation: Vec3,
    /// Initial orientation
    pub rotation: Quat,
    /// Mass in kilograms, zero for fixed bodies
    pub mass: f32,
    /// Multiplier applied to world gravity
    pub gravity_scale: f32,
    /// Sleep behaviour
    pub sleep: SleepPolicy,
}

impl RigidBodyDesc {
    /// Fixed body at a pose
    pub fn fixed(translation: Vec3, rotation: Quat) -> Self {
        Self {
            body_type: BodyType::Fixed,
            translation,
            rotation,
            mass: 0.0,
            gravity_scale: 0.0,
            sleep: SleepPolicy::default(),
        }
    }

    /// Dynamic body with a mass
    pub fn dynamic(translation: Vec3, rotation: Quat, mass: f32) -> Self {
        Self {
            body_type: BodyType::Dynamic,
            mass,
            gravity_scale: 1.0,
            ..Self::fixed(translation, rotation)
        }
    }
}

/// Collision geometry in body-local space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColliderShape {
    /// Box given by half extents
    Cuboid {
        /// Half size along each axis
        half_extents: Vec3,
    },
    /// Sphere
    Ball {
        /// Radius
        radius: f32,
    },
    /// Capsule along Y
    Capsule {
        /// Half length of the cylindrical part
        half_height: f32,
        /// Cap radius
        radius: f32,
    },
    /// Cylinder along Y
    Cylinder {
        /// Half height
        half_height: f32,
        /// Radius
        radius: f32,
    },
    /// Convex hull of a point cloud
    ConvexHull {
        /// Hull points
        points: Vec<Vec3>,
    },
    /// Arbitrary triangle mesh
    TriMesh {
        /// Vertex positions
        vertices: Vec<Vec3>,
        /// Triangle indices
        indices: Vec<[u32; 3]>,
    },
}

impl ColliderShape {
    /// Short name for logging
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Cuboid { .. } => "cuboid",
            Self::Ball { .. } => "ball",
            Self::Capsule { .. } => "capsule",
            Self::Cylinder { .. } => "cylinder",
            Self::ConvexHull { .. } => "convex_hull",
            Self::TriMesh { .. } => "trimesh",
        }
    }

    /// Check that the shape can be built
    pub fn validate(&self) -> Result<(), PhysicsError> {
        let positive = |v: f32| v.is_finite() && v > 0.0;
        let ok = match self {
            Self::Cuboid { half_extents } => half_extents.iter().all(|v| positive(*v)),
            Self::Ball { radius } => positive(*radius),
            Self::Capsule { half_height, radius } | Self::Cylinder { half_height, radius } => {
                positive(*radius) && half_height.is_finite() && *half_height >= 0.0
            }
            Self::ConvexHull { points } => {
                points.len() >= 4 && points.iter().all(|p| p.iter().all(|v| v.is_finite()))
            }
            Self::TriMesh { vertices, indices } => {
                !indices.is_empty()
                    && indices.iter().flatten().all(|&i| (i as usize) < vertices.len())
            }
        };
        if ok {
            Ok(())
        } else {
            Err(PhysicsError::InvalidShape(format!("degenerate {}", self.kind_name())))
        }
    }
}

/// Collider creation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColliderDesc {
    /// Geometry
    pub shape: ColliderShape,
    /// Offset from the body origin
    #[serde(default = "Vec3::zeros")]
    pub offset: Vec3,
    /// Surface friction
    #[serde(default = "default_friction")]
    pub friction: f32,
    /// Bounciness in `[0, 1]`
    #[serde(default)]
    pub restitution: f32,
    /// Layers this collider belongs to
    #[serde(default = "all_layers")]
    pub collision_groups: u32,
    /// Layers this collider collides with
    #[serde(default = "all_layers")]
    pub collision_mask: u32,
    /// Reports overlaps without a physical response
    #[serde(default)]
    pub sensor: bool,
}

fn default_friction() -> f32 {
    0.5
}

fn all_layers() -> u32 {
    CollisionLayers::ALL
}

impl ColliderDesc {
    /// Collider with default material and layers
    pub fn new(shape: ColliderShape) -> Self {
        Self {
            shape,
            offset: Vec3::zeros(),
            friction: default_friction(),
            restitution: 0.0,
            collision_groups: all_layers(),
            collision_mask: all_layers(),
            sensor: false,
        }
    }

    /// Set the offset from the body origin
    pub fn with_offset(mut self, offset: Vec3) -> Self {
        self.offset = offset;
        self
    }
}

/// World-wide simulation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicsSettings {
    /// Whether stepping advances the simulation
    pub enabled: bool,
    /// Gravity acceleration
    pub gravity: Vec3,
    /// Substeps per `step` call
    pub substeps: u32,
}

impl Default for PhysicsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            gravity: Vec3::new(0.0, -9.81, 0.0),
            substeps: 1,
        }
    }
}

/// Read-only view of a body for inspection and tests
#[derive(Debug, Clone, PartialEq)]
pub struct BodySnapshot {
    /// Fixed or dynamic
    pub body_type: BodyType,
    /// Mass
    pub mass: f32,
    /// Current position
    pub translation: Vec3,
    /// Current orientation
    pub rotation: Quat,
    /// Current linear velocity
    pub linear_velocity: Vec3,
    /// Whether the body is asleep
    pub sleeping: bool,
    /// Attached collider shapes
    pub colliders: Vec<ColliderShape>,
}

/// Physics world collaborator
pub trait PhysicsWorld {
    /// Create a rigid body and take ownership of it
    fn create_rigid_body(&mut self, desc: &RigidBodyDesc) -> BodyHandle;

    /// Attach a collider to a body
    fn create_collider(
        &mut self,
        desc: &ColliderDesc,
        body: BodyHandle,
    ) -> Result<ColliderHandle, PhysicsError>;

    /// Destroy a body and its colliders; `false` if it did not exist
    fn remove_rigid_body(&mut self, body: BodyHandle) -> bool;

    /// Whether a body is alive
    fn contains_body(&self, body: BodyHandle) -> bool;

    /// Simulated position and orientation of a body
    fn body_pose(&self, body: BodyHandle) -> Option<(Vec3, Quat)>;

    /// Full state of a body
    fn body_snapshot(&self, body: BodyHandle) -> Option<BodySnapshot>;

    /// Apply world-wide parameters
    fn configure(&mut self, settings: &PhysicsSettings);

    /// Replace gravity, keeping the other settings
    fn set_gravity(&mut self, gravity: Vec3);

    /// Advance the simulation by `dt` seconds
    fn step(&mut self, dt: f32);

    /// Number of live bodies
    fn body_count(&self) -> usize;
}
