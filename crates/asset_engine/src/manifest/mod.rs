//! Declarative scene manifests
//!
//! [`types`] holds the document model, [`validation`] the referential
//! integrity pass and [`manager`] the session-owned [`ManifestManager`].

pub mod manager;
pub mod types;
pub mod validation;

pub use manager::{ManifestError, ManifestManager, PendingSave, SaveOutcome};
pub use types::{
    AmbientLight, AssetEntry, AssetGroup, AssetPaths, ColorValue, CustomType, DebugVisual,
    Environment, Fog, LoadLayers, Manifest, PhysicsDefaults, Primitive, SceneData, ScenePhysics, SizeSpec,
    TogglePolicy, Vector3Spec, VisualDefaults, MANIFEST_VERSION,
};
pub use validation::{validate_manifest, ValidationError, ValidationErrorKind, ValidationReport};
