//! # Core Engine Module
//!
//! Shared abstractions used by every subsystem.
//!
//! ## Organization
//!
//! - **Config**: Unified configuration for the session and its components
//! - **Foundation**: Low-level utilities (math, interning, time, logging)

pub mod config;

// Re-export foundation modules for convenience
pub use crate::foundation;

// Re-export commonly used config types
pub use config::{
    SessionConfig,
    EngineSettings,
    SpawnSettings,
    AnalysisSettings,
    CollisionThresholds,
    JointDefaults,
    AtlasSettings,
    ManifestSettings,
    StorageMode,
    Config,
    ConfigError,
};
