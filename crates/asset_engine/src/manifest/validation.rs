//! Validation for cross-references and value ranges in a manifest.
//!
//! One pass over the whole document; every problem is collected, nothing is
//! thrown mid-pass.

use std::collections::HashSet;
use std::fmt;

use super::types::{ColorValue, Manifest, Primitive, Vector3Spec};

/// What is wrong with a field
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationErrorKind {
    /// Reference to an id that does not exist
    MissingReference {
        /// Kind of the referenced item
        target_type: &'static str,
        /// The unresolved id
        missing_id: String,
    },
    /// Id or name already used by an earlier item
    Duplicate,
    /// Number outside its allowed range
    OutOfRange {
        /// Offending value
        value: f32,
        /// Human-readable range
        expected: &'static str,
    },
    /// Value that cannot be interpreted
    Invalid(String),
}

/// A validation error with context about what failed.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Kind of the item holding the bad field
    pub source_type: &'static str,
    /// Id or name of that item
    pub source_id: String,
    /// Field path inside the item
    pub field: String,
    /// The problem
    pub kind: ValidationErrorKind,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ValidationErrorKind::MissingReference { target_type, missing_id } => write!(
                f,
                "{} '{}' references missing {} '{}' in field '{}'",
                self.source_type, self.source_id, target_type, missing_id, self.field
            ),
            ValidationErrorKind::Duplicate => write!(
                f,
                "{} '{}' is defined more than once ({})",
                self.source_type, self.source_id, self.field
            ),
            ValidationErrorKind::OutOfRange { value, expected } => write!(
                f,
                "{} '{}' field '{}' is {} but must be {}",
                self.source_type, self.source_id, self.field, value, expected
            ),
            ValidationErrorKind::Invalid(message) => write!(
                f,
                "{} '{}' field '{}' is invalid: {}",
                self.source_type, self.source_id, self.field, message
            ),
        }
    }
}

/// Result of validating a manifest
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidationReport {
    /// True when `errors` is empty
    pub is_valid: bool,
    /// Every problem found
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<ValidationError>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

/// Accumulates errors for one source item
struct Checker<'a> {
    errors: &'a mut Vec<ValidationError>,
    source_type: &'static str,
    source_id: &'a str,
}

impl Checker<'_> {
    fn push(&mut self, field: impl Into<String>, kind: ValidationErrorKind) {
        self.errors.push(ValidationError {
            source_type: self.source_type,
            source_id: self.source_id.to_string(),
            field: field.into(),
            kind,
        });
    }

    fn missing(&mut self, field: impl Into<String>, target_type: &'static str, missing_id: &str) {
        self.push(
            field,
            ValidationErrorKind::MissingReference {
                target_type,
                missing_id: missing_id.to_string(),
            },
        );
    }

    fn range(&mut self, field: &str, value: f32, ok: bool, expected: &'static str) {
        if !(value.is_finite() && ok) {
            self.push(field, ValidationErrorKind::OutOfRange { value, expected });
        }
    }

    fn finite(&mut self, field: &str, v: Vector3Spec) {
        if !v.is_finite() {
            self.push(field, ValidationErrorKind::Invalid("non-finite component".to_string()));
        }
    }

    fn color(&mut self, field: &str, color: &ColorValue) {
        if color.resolve().is_none() {
            self.push(field, ValidationErrorKind::Invalid(format!("unrecognized colour {color:?}")));
        }
    }
}

/// Validate all cross-references and numeric ranges in the manifest.
pub fn validate_manifest(manifest: &Manifest) -> ValidationReport {
    let mut errors = Vec::new();

    // Custom types
    let mut type_names = HashSet::new();
    for custom in &manifest.custom_types {
        let mut check = Checker {
            errors: &mut errors,
            source_type: "CustomType",
            source_id: &custom.name,
        };
        if custom.name.trim().is_empty() {
            check.push("name", ValidationErrorKind::Invalid("empty name".to_string()));
        } else if !type_names.insert(custom.name.as_str()) {
            check.push("name", ValidationErrorKind::Duplicate);
        }
        for (name, value) in custom.size.values() {
            check.range(&format!("size.{name}"), value, value > 0.0, "> 0");
        }
        let scale = custom.scale;
        for (axis, value) in [("x", scale.x), ("y", scale.y), ("z", scale.z)] {
            check.range(&format!("scale.{axis}"), value, value > 0.0, "> 0");
        }
        let physics = &custom.physics;
        if let Some(mass) = physics.mass {
            check.range("physics.mass", mass, true, "finite");
        }
        if let Some(restitution) = physics.restitution {
            check.range("physics.restitution", restitution, (0.0..=1.0).contains(&restitution), "in [0, 1]");
        }
        if let Some(friction) = physics.friction {
            check.range("physics.friction", friction, friction >= 0.0, ">= 0");
        }
        if let Some(timer) = physics.sleep_timer {
            check.range("physics.sleep_timer", timer, timer >= 0.0, ">= 0");
        }
        if let Some(scale) = physics.gravity_scale {
            check.range("physics.gravity_scale", scale, true, "finite");
        }
        let visual = &custom.visual;
        check.range("visual.opacity", visual.opacity, (0.0..=1.0).contains(&visual.opacity), "in [0, 1]");
        check.range("visual.emission_intensity", visual.emission_intensity, visual.emission_intensity >= 0.0, ">= 0");
        check.range("visual.debug.opacity", visual.debug.opacity, (0.0..=1.0).contains(&visual.debug.opacity), "in [0, 1]");
        if let Some(color) = &visual.color {
            check.color("visual.color", color);
        }
        check.color("visual.emission_color", &visual.emission_color);
        check.color("visual.debug.color", &visual.debug.color);
        if custom.primitive.is_none() && custom.paths.asset.as_deref().map_or(true, str::is_empty) && Primitive::from_name(&custom.name).is_none() {
            check.push("paths.asset", ValidationErrorKind::Invalid("no model path and no primitive".to_string()));
        }
    }

    // Groups
    let mut group_ids = HashSet::new();
    for group in &manifest.asset_groups {
        let mut check = Checker {
            errors: &mut errors,
            source_type: "AssetGroup",
            source_id: &group.id,
        };
        if !group_ids.insert(group.id.as_str()) {
            check.push("id", ValidationErrorKind::Duplicate);
        }
        for asset_id in &group.assets {
            if !manifest.assets.contains_key(asset_id) {
                check.missing("assets", "Asset", asset_id);
            }
        }
    }

    // Assets
    for (id, asset) in &manifest.assets {
        let mut check = Checker {
            errors: &mut errors,
            source_type: "Asset",
            source_id: id,
        };
        if Primitive::from_name(&asset.asset_type).is_none() && manifest.custom_type(&asset.asset_type).is_none() {
            check.missing("type", "CustomType", &asset.asset_type);
        }
        if let Some(group_id) = &asset.group_id {
            if !group_ids.contains(group_id.as_str()) {
                check.missing("group_id", "AssetGroup", group_id);
            }
        }
        check.finite("position", asset.position);
        check.finite("rotation", asset.rotation);
    }

    // Scene
    let scene = &manifest.scene_data;
    let mut check = Checker {
        errors: &mut errors,
        source_type: "Scene",
        source_id: &manifest.name,
    };
    check.finite("environment.gravity", scene.environment.gravity);
    let light = &scene.environment.ambient_light;
    check.range("environment.ambient_light.intensity", light.intensity, light.intensity >= 0.0, ">= 0");
    check.color("environment.ambient_light.color", &light.color);
    if let Some(fog) = &scene.environment.fog {
        check.range("environment.fog.near", fog.near, fog.near >= 0.0, ">= 0");
        check.range("environment.fog.far", fog.far, fog.far > fog.near, "> fog.near");
        check.color("environment.fog.color", &fog.color);
    }
    let physics = &scene.physics;
    check.range("physics.update_rate", physics.update_rate, physics.update_rate > 0.0, "> 0");
    check.range("physics.substeps", physics.substeps as f32, physics.substeps >= 1, ">= 1");

    ValidationReport::from_errors(errors)
}
