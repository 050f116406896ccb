//! Physics module
//!
//! Solver-neutral body and collider descriptions, the [`PhysicsWorld`]
//! collaborator trait, collision layer resolution, and a small
//! contact-free world used by tools and tests.

pub mod collision_layers;
pub mod simple_world;
pub mod world;

pub use collision_layers::{CollisionLayers, LayerRef};
pub use simple_world::SimplePhysicsWorld;
pub use world::{
    BodyHandle, BodySnapshot, BodyType, ColliderDesc, ColliderHandle, ColliderShape,
    PhysicsError, PhysicsSettings, PhysicsWorld, RigidBodyDesc, SleepPolicy,
};
