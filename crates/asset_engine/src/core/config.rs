//! # Unified Configuration System
//!
//! All tunables of an [`AssetSession`](crate::session::AssetSession) live here:
//! logging, spawn defaults, analyzer heuristics, atlas packing, and manifest
//! persistence.
//!
//! ## Design Goals
//!
//! - **Centralized**: All configuration types in one place for easy discovery
//! - **Serializable**: TOML, RON or JSON through the [`Config`] trait
//! - **Type Safe**: Strong typing with validation and defaults

use serde::{Serialize, Deserialize};

use crate::analysis::ClassificationStrategy;

pub use crate::config::{Config, ConfigError};

/// # Engine Settings
///
/// Core behavior shared by the whole session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Default log filter (overridden by `RUST_LOG`)
    pub log_level: String,
    /// Simulation rate used by drivers that step at a fixed rate
    pub fixed_timestep_hz: f32,
}

impl EngineSettings {
    /// Create engine settings with defaults
    pub fn new() -> Self {
        Self {
            log_level: "info".to_string(),
            fixed_timestep_hz: 60.0,
        }
    }

    /// Set log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::new()
    }
}

/// # Spawn Settings
///
/// Defaults applied when a spawn request or custom type leaves a field out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnSettings {
    /// Mass used when no mass is given
    pub default_mass: f32,
    /// Material colour used when no colour is given (0xRRGGBB)
    pub default_color: u32,
    /// Longitude segments for sphere, capsule and cylinder geometry
    pub radial_segments: u32,
    /// Latitude rings for sphere and capsule caps
    pub rings: u32,
    /// Build a bounding-box collider for models without collision nodes
    pub fallback_collider: bool,
    /// Keep collision nodes visible in the render scene
    pub show_collision_meshes: bool,
}

impl SpawnSettings {
    /// Create spawn settings with defaults
    pub fn new() -> Self {
        Self {
            default_mass: 1.0,
            default_color: 0x80_80_80,
            radial_segments: 16,
            rings: 8,
            fallback_collider: true,
            show_collision_meshes: false,
        }
    }
}

impl Default for SpawnSettings {
    fn default() -> Self {
        Self::new()
    }
}

/// Geometric fallback limits used to infer a collider kind
///
/// A node with at most `box_max_triangles` triangles and `box_max_vertices`
/// vertices is a box; within the convex limits it is a convex hull; anything
/// larger is a triangle mesh.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionThresholds {
    /// Box triangle limit
    pub box_max_triangles: usize,
    /// Box vertex limit
    pub box_max_vertices: usize,
    /// Convex hull triangle limit
    pub convex_max_triangles: usize,
    /// Convex hull vertex limit
    pub convex_max_vertices: usize,
}

impl Default for CollisionThresholds {
    fn default() -> Self {
        Self {
            box_max_triangles: 12,
            box_max_vertices: 8,
            convex_max_triangles: 50,
            convex_max_vertices: 30,
        }
    }
}

/// Joint parameters used when a constraint is inferred from a bone name
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JointDefaults {
    /// Symmetric hinge limit in degrees
    pub hinge_limit_degrees: f32,
    /// Spring stiffness
    pub spring_stiffness: f32,
    /// Spring damping
    pub spring_damping: f32,
}

impl Default for JointDefaults {
    fn default() -> Self {
        Self {
            hinge_limit_degrees: 90.0,
            spring_stiffness: 100.0,
            spring_damping: 10.0,
        }
    }
}

/// # Analysis Settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// How nodes are classified as collision, bone, armature or activator
    pub classifier: ClassificationStrategy,
    /// Geometric fallback for collider kinds
    pub collision: CollisionThresholds,
    /// Name-inferred joint parameters
    pub joints: JointDefaults,
}

/// # Atlas Settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasSettings {
    /// Maximum atlas edge in pixels
    pub max_size: u32,
    /// Pixels reserved on every side of a packed texture
    pub padding: u32,
}

impl Default for AtlasSettings {
    fn default() -> Self {
        Self {
            max_size: 4096,
            padding: 2,
        }
    }
}

/// Where manifests are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    /// Write to the local filesystem
    #[default]
    Filesystem,
    /// No writable storage; saves become pending payloads
    Unavailable,
}

/// # Manifest Settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestSettings {
    /// Persistence backend
    pub storage: StorageMode,
    /// Pretty-print saved manifests
    pub pretty: bool,
}

/// # Complete Session Configuration
///
/// Top-level configuration that encompasses all session components.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Engine core settings
    pub engine: EngineSettings,
    /// Spawn defaults
    pub spawn: SpawnSettings,
    /// Analyzer tunables
    pub analysis: AnalysisSettings,
    /// Atlas packing
    pub atlas: AtlasSettings,
    /// Manifest persistence
    pub manifest: ManifestSettings,
}

impl SessionConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the analysis settings
    pub fn with_analysis(mut self, analysis: AnalysisSettings) -> Self {
        self.analysis = analysis;
        self
    }

    /// Replace the atlas settings
    pub fn with_atlas(mut self, atlas: AtlasSettings) -> Self {
        self.atlas = atlas;
        self
    }

    /// Replace the manifest storage mode
    pub fn with_storage(mut self, storage: StorageMode) -> Self {
        self.manifest.storage = storage;
        self
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.engine.fixed_timestep_hz.is_finite() && self.engine.fixed_timestep_hz > 0.0) {
            return Err(ConfigError::Invalid("fixed_timestep_hz must be positive".to_string()));
        }
        if self.spawn.radial_segments < 3 {
            return Err(ConfigError::Invalid("radial_segments must be at least 3".to_string()));
        }
        if self.spawn.rings < 2 {
            return Err(ConfigError::Invalid("rings must be at least 2".to_string()));
        }
        let collision = &self.analysis.collision;
        if collision.box_max_triangles > collision.convex_max_triangles
            || collision.box_max_vertices > collision.convex_max_vertices
        {
            return Err(ConfigError::Invalid(
                "box thresholds must not exceed convex thresholds".to_string(),
            ));
        }
        if self.atlas.max_size == 0 || !self.atlas.max_size.is_power_of_two() {
            return Err(ConfigError::Invalid("atlas max_size must be a power of two".to_string()));
        }
        if self.atlas.padding.saturating_mul(2) >= self.atlas.max_size {
            return Err(ConfigError::Invalid("atlas padding leaves no room".to_string()));
        }
        Ok(())
    }
}

impl Config for SessionConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.atlas.max_size, 4096);
        assert_eq!(config.atlas.padding, 2);
        assert_eq!(config.analysis.collision.box_max_triangles, 12);
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let mut config = SessionConfig::default();
        config.analysis.collision.box_max_triangles = 100;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        let path = path.to_str().unwrap();

        let config = SessionConfig::default().with_storage(StorageMode::Unavailable);
        config.save_to_file(path).unwrap();
        let loaded = SessionConfig::load_from_file(path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        let config: SessionConfig = ron::from_str("(atlas: (max_size: 1024))").unwrap();
        assert_eq!(config.atlas.max_size, 1024);
        assert_eq!(config.atlas.padding, 2);
        assert_eq!(config.spawn.default_mass, 1.0);
    }
}
