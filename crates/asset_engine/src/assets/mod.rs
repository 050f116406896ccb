//! Asset lifecycle: loading, spawning, tracking and texture atlasing

pub mod atlas;
pub mod handler;
pub mod image_loader;
pub mod model;
pub mod obj_loader;
pub mod storage;

pub use atlas::{AtlasEntry, AtlasError, TextureAtlas, TextureAtlasManager, TextureSource};
pub use crate::manifest::Primitive;
pub use handler::{AssetHandler, SpawnError, SpawnOptions, SpawnRequest, SpawnWarning, SpawnedInstance};
pub use image_loader::ImageData;
pub use model::{LoadedModel, ModelLoader, ModelMetadata, ModelNode, NodeMetadata};
pub use obj_loader::ObjModelLoader;
pub use storage::{AssetStorage, InstanceId, InstanceIdGenerator, TrackedInstance};

use thiserror::Error;

/// Asset loading errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// Asset file not found
    #[error("Asset not found: {0}")]
    NotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Malformed line in a text format
    #[error("Parse error at line {line}: {message}")]
    Parse {
        /// 1-based line number
        line: usize,
        /// What was wrong
        message: String,
    },

    /// File parsed but holds nothing usable
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Metadata sidecar could not be read
    #[error("Invalid metadata sidecar {path}: {message}")]
    Sidecar {
        /// Sidecar path
        path: String,
        /// Decoder message
        message: String,
    },

    /// Image decoding failed
    #[error("Image decoding failed: {0}")]
    Image(String),
}
