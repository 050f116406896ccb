//! # Asset Engine
//!
//! Manifest-driven asset lifecycle for 3D scenes: declare custom asset types,
//! groups and placed assets in a JSON manifest, then spawn them as render
//! nodes with matching physics bodies.
//!
//! ## Features
//!
//! - **Manifests**: Load, edit, validate and save scene manifests
//! - **Spawning**: Primitives and model-backed types with layered options
//! - **Collision Analysis**: Collider proxies detected by naming convention or metadata
//! - **Rig Analysis**: Bone hierarchies, joint constraints and activators
//! - **Texture Atlases**: Shelf-packed RGBA atlases with UV remapping
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use asset_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = AssetSession::new(
//!         SessionConfig::default(),
//!         Box::new(HeadlessScene::new()),
//!         Box::new(ObjModelLoader::new()),
//!     )?
//!     .with_physics(Box::new(SimplePhysicsWorld::default()));
//!
//!     let report = session.load_manifest("scene.json")?;
//!     for error in &report.errors {
//!         eprintln!("{error}");
//!     }
//!     session.spawn_active_groups();
//!     session.step(1.0 / 60.0);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

// Core modules
pub mod config;
pub mod core;
pub mod foundation;

// Collaborator boundaries
pub mod physics;
pub mod render;

// Asset pipeline
pub mod analysis;
pub mod assets;
pub mod manifest;

mod session;

pub use session::{AssetSession, GroupSpawnReport, SessionError};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        analysis::{ClassificationStrategy, CollisionAnalyzer, RigAnalyzer},
        assets::{
            AssetHandler, AssetStorage, InstanceId, ModelLoader, ObjModelLoader, SpawnRequest,
            SpawnedInstance, TextureAtlasManager,
        },
        core::config::{Config, SessionConfig},
        foundation::math::{Quat, Transform, Vec3},
        manifest::{Manifest, ManifestManager},
        physics::{PhysicsWorld, SimplePhysicsWorld},
        render::{HeadlessScene, RenderScene},
        AssetSession, GroupSpawnReport, SessionError,
    };
}
