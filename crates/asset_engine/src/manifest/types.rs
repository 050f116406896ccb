//! Manifest document types
//!
//! Mirrors the JSON layout of a scene manifest. Every field has a default so
//! hand-written manifests can leave most of it out.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::foundation::math::{quat_from_euler, Quat, Vec3};
use crate::physics::LayerRef;
use crate::render::parse_color_str;

/// Current manifest format version
pub const MANIFEST_VERSION: &str = "1.0.0";

/// `{x, y, z}` triple as written in manifests
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Vector3Spec {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
}

impl Vector3Spec {
    /// Create from components
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Convert to a vector
    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    /// Whether every component is finite
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<Vec3> for Vector3Spec {
    fn from(v: Vec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

/// Colour given either as a number or a hex string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColorValue {
    /// Packed 0xRRGGBB
    Number(u32),
    /// `0xRRGGBB`, `#RRGGBB` or `#RGB`
    Text(String),
}

impl ColorValue {
    /// Normalized 0xRRGGBB value, `None` when malformed
    pub fn resolve(&self) -> Option<u32> {
        match self {
            Self::Number(n) => (*n <= 0xFF_FF_FF).then_some(*n),
            Self::Text(text) => parse_color_str(text),
        }
    }
}

impl Default for ColorValue {
    fn default() -> Self {
        Self::Number(0xFF_FF_FF)
    }
}

/// Which layers of a custom type are built at spawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadLayers {
    /// Drawable geometry is visible
    pub viewable: bool,
    /// Physics colliders are built
    pub collision: bool,
    /// Display extras (labels, overlays) are wanted
    pub display: bool,
}

impl Default for LoadLayers {
    fn default() -> Self {
        Self {
            viewable: true,
            collision: true,
            display: true,
        }
    }
}

/// Files backing a custom type
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetPaths {
    /// Model file, relative to the asset root
    pub asset: Option<String>,
    /// Behaviour script
    pub script: Option<String>,
}

/// Primitive or model dimensions
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SizeSpec {
    /// Sphere, capsule and cylinder radius
    pub radius: Option<f32>,
    /// Extent along X
    pub width: Option<f32>,
    /// Extent along Y (total height for capsules)
    pub height: Option<f32>,
    /// Extent along Z
    pub depth: Option<f32>,
}

impl SizeSpec {
    /// Every present dimension
    pub fn values(&self) -> impl Iterator<Item = (&'static str, f32)> + '_ {
        [("radius", self.radius), ("width", self.width), ("height", self.height), ("depth", self.depth)]
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name, v)))
    }

    /// Fill missing fields from `fallback`
    pub fn or(self, fallback: SizeSpec) -> SizeSpec {
        SizeSpec {
            radius: self.radius.or(fallback.radius),
            width: self.width.or(fallback.width),
            height: self.height.or(fallback.height),
            depth: self.depth.or(fallback.depth),
        }
    }
}

/// Analytic shapes that need no model file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Primitive {
    /// Box of width, height and depth
    Box,
    /// Sphere of a radius
    Sphere,
    /// Capsule along Y; height includes both caps
    Capsule,
    /// Cylinder along Y
    Cylinder,
}

impl Primitive {
    /// Primitive named by an asset type (`cube` and `ball` are accepted aliases)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "box" | "cube" => Some(Self::Box),
            "sphere" | "ball" => Some(Self::Sphere),
            "capsule" => Some(Self::Capsule),
            "cylinder" => Some(Self::Cylinder),
            _ => None,
        }
    }

    /// Canonical name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Box => "box",
            Self::Sphere => "sphere",
            Self::Capsule => "capsule",
            Self::Cylinder => "cylinder",
        }
    }

    /// Dimensions used when none are given
    pub fn default_size(self) -> SizeSpec {
        let (radius, edge, height) = match self {
            Self::Box => (None, Some(1.0), 1.0),
            Self::Sphere => (Some(0.5), None, 1.0),
            Self::Capsule => (Some(0.5), None, 2.0),
            Self::Cylinder => (Some(0.5), None, 1.0),
        };
        SizeSpec {
            radius,
            width: edge,
            height: Some(height),
            depth: edge,
        }
    }
}

/// Physics defaults of a custom type
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsDefaults {
    /// Bounciness
    pub restitution: Option<f32>,
    /// Seconds at rest before sleeping
    pub sleep_timer: Option<f32>,
    /// Mass, `<= 0` for static bodies
    pub mass: Option<f32>,
    /// Gravity multiplier, zero disables gravity
    pub gravity_scale: Option<f32>,
    /// Surface friction
    pub friction: Option<f32>,
    /// Layers the collider belongs to
    pub collision_groups: Vec<LayerRef>,
    /// Layers the collider collides with
    pub collision_mask: Vec<LayerRef>,
}

/// Collision mesh overlay settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugVisual {
    /// Draw collision meshes as a wireframe overlay
    pub enabled: bool,
    /// Overlay opacity
    pub opacity: f32,
    /// Overlay colour
    pub color: ColorValue,
}

impl Default for DebugVisual {
    fn default() -> Self {
        Self {
            enabled: false,
            opacity: 0.3,
            color: ColorValue::Number(0x00_FF_00),
        }
    }
}

/// Visual defaults of a custom type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualDefaults {
    /// Base colour
    pub color: Option<ColorValue>,
    /// Whether the material glows
    pub emitting: bool,
    /// Glow colour
    pub emission_color: ColorValue,
    /// Glow strength
    pub emission_intensity: f32,
    /// Opacity in `[0, 1]`
    pub opacity: f32,
    /// Casts shadows
    pub cast_shadow: bool,
    /// Receives shadows
    pub receive_shadow: bool,
    /// Collision overlay
    pub debug: DebugVisual,
}

impl Default for VisualDefaults {
    fn default() -> Self {
        Self {
            color: None,
            emitting: false,
            emission_color: ColorValue::Number(0),
            emission_intensity: 0.0,
            opacity: 1.0,
            cast_shadow: true,
            receive_shadow: true,
            debug: DebugVisual::default(),
        }
    }
}

/// Named template referenced by asset entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomType {
    /// Type name used by `AssetEntry::asset_type`
    pub name: String,
    /// Author-controlled version string
    pub version: String,
    /// Analytic shape when the type has no model file
    pub primitive: Option<Primitive>,
    /// Layers built at spawn
    pub load_layers: LoadLayers,
    /// Backing files
    pub paths: AssetPaths,
    /// Dimensions
    pub size: SizeSpec,
    /// Scale applied to the whole instance
    pub scale: Vector3Spec,
    /// Physics defaults
    pub physics: PhysicsDefaults,
    /// Visual defaults
    pub visual: VisualDefaults,
}

impl Default for CustomType {
    fn default() -> Self {
        Self {
            name: String::new(),
            version: "1.0".to_string(),
            primitive: None,
            load_layers: LoadLayers::default(),
            paths: AssetPaths::default(),
            size: SizeSpec::default(),
            scale: Vector3Spec::new(1.0, 1.0, 1.0),
            physics: PhysicsDefaults::default(),
            visual: VisualDefaults::default(),
        }
    }
}

impl CustomType {
    /// Named type with defaults
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Model-backed type
    pub fn with_asset_path(mut self, path: impl Into<String>) -> Self {
        self.paths.asset = Some(path.into());
        self
    }

    /// Primitive-backed type
    pub fn with_primitive(mut self, primitive: Primitive) -> Self {
        self.primitive = Some(primitive);
        self
    }
}

/// Declarative instance descriptor
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetEntry {
    /// Primitive name or custom type name
    #[serde(rename = "type")]
    pub asset_type: String,
    /// World position
    pub position: Vector3Spec,
    /// XYZ Euler angles in radians
    pub rotation: Vector3Spec,
    /// Spawn options and flags
    pub config: Map<String, Value>,
    /// Free-form labels
    pub tags: Vec<String>,
    /// Group the asset belongs to
    pub group_id: Option<String>,
}

impl AssetEntry {
    /// Entry of a type at a position
    pub fn new(asset_type: impl Into<String>, position: Vec3) -> Self {
        Self {
            asset_type: asset_type.into(),
            position: position.into(),
            ..Self::default()
        }
    }

    /// Set rotation from Euler angles in radians
    pub fn with_rotation(mut self, euler: Vec3) -> Self {
        self.rotation = euler.into();
        self
    }

    /// Set one config value
    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    /// Add a tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Rotation as a quaternion
    pub fn rotation_quat(&self) -> Quat {
        quat_from_euler(self.rotation.to_vec3())
    }

    /// Config flag, `default` when absent or not a boolean
    pub fn flag(&self, key: &str, default: bool) -> bool {
        self.config.get(key).and_then(Value::as_bool).unwrap_or(default)
    }
}

/// What activating a group does to other groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TogglePolicy {
    /// Always active; deactivation is refused
    Always,
    /// Freely switched on and off
    #[default]
    Toggle,
    /// Activating deactivates every other exclusive group
    Exclusive,
}

/// Named set of assets with an activation policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetGroup {
    /// Unique group id
    pub id: String,
    /// Display name
    pub name: String,
    /// Member asset ids
    pub assets: Vec<String>,
    /// Whether the group is currently spawned
    pub active: bool,
    /// Activation policy
    pub toggle: TogglePolicy,
}

impl Default for AssetGroup {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            assets: Vec::new(),
            active: true,
            toggle: TogglePolicy::default(),
        }
    }
}

impl AssetGroup {
    /// Empty active group
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Add member ids
    pub fn with_assets<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.assets.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Set the toggle policy
    pub fn with_toggle(mut self, toggle: TogglePolicy) -> Self {
        self.toggle = toggle;
        self
    }
}

/// Ambient light
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmbientLight {
    /// Light colour
    pub color: ColorValue,
    /// Light intensity
    pub intensity: f32,
}

impl Default for AmbientLight {
    fn default() -> Self {
        Self {
            color: ColorValue::Number(0xFF_FF_FF),
            intensity: 0.5,
        }
    }
}

/// Distance fog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fog {
    /// Fog colour
    pub color: ColorValue,
    /// Distance where fog starts
    pub near: f32,
    /// Distance of full fog
    pub far: f32,
}

impl Default for Fog {
    fn default() -> Self {
        Self {
            color: ColorValue::Number(0xCC_CC_CC),
            near: 10.0,
            far: 100.0,
        }
    }
}

/// Scene environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Environment {
    /// Gravity acceleration
    pub gravity: Vector3Spec,
    /// Ambient light
    pub ambient_light: AmbientLight,
    /// Optional fog
    pub fog: Option<Fog>,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            gravity: Vector3Spec::new(0.0, -9.81, 0.0),
            ambient_light: AmbientLight::default(),
            fog: None,
        }
    }
}

/// Physics world parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenePhysics {
    /// Whether the simulation runs
    pub enabled: bool,
    /// Simulation steps per second
    pub update_rate: f32,
    /// Substeps per simulation step
    pub substeps: u32,
    /// Draw collider outlines
    pub debug_draw: bool,
}

impl Default for ScenePhysics {
    fn default() -> Self {
        Self {
            enabled: true,
            update_rate: 60.0,
            substeps: 1,
            debug_draw: false,
        }
    }
}

/// Scene-wide data
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneData {
    /// Environment
    pub environment: Environment,
    /// Physics parameters
    pub physics: ScenePhysics,
    /// Renderer-specific settings, passed through untouched
    pub rendering: Map<String, Value>,
}

/// The declarative scene document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    /// Scene name
    pub name: String,
    /// Scene description
    pub description: String,
    /// Format version
    pub manifest_version: String,
    /// Author
    pub author: String,
    /// ISO-8601 creation time
    pub created_date: String,
    /// ISO-8601 time of the last save
    pub updated_date: String,
    /// Custom type templates
    pub custom_types: Vec<CustomType>,
    /// Asset groups
    pub asset_groups: Vec<AssetGroup>,
    /// Asset entries by id
    #[serde(deserialize_with = "unique_assets")]
    pub assets: BTreeMap<String, AssetEntry>,
    /// Scene-wide data
    pub scene_data: SceneData,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            manifest_version: MANIFEST_VERSION.to_string(),
            author: String::new(),
            created_date: String::new(),
            updated_date: String::new(),
            custom_types: Vec::new(),
            asset_groups: Vec::new(),
            assets: BTreeMap::new(),
            scene_data: SceneData::default(),
        }
    }
}

impl Manifest {
    /// Custom type by name
    pub fn custom_type(&self, name: &str) -> Option<&CustomType> {
        self.custom_types.iter().find(|t| t.name == name)
    }

    /// Group by id
    pub fn group(&self, id: &str) -> Option<&AssetGroup> {
        self.asset_groups.iter().find(|g| g.id == id)
    }
}

/// Reject duplicate asset ids instead of silently keeping the last one
fn unique_assets<'de, D>(deserializer: D) -> Result<BTreeMap<String, AssetEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    struct AssetsVisitor;

    impl<'de> Visitor<'de> for AssetsVisitor {
        type Value = BTreeMap<String, AssetEntry>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of asset id to asset entry")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut assets = BTreeMap::new();
            while let Some((id, entry)) = access.next_entry::<String, AssetEntry>()? {
                if assets.contains_key(&id) {
                    return Err(serde::de::Error::custom(format!("duplicate asset id '{id}'")));
                }
                assets.insert(id, entry);
            }
            Ok(assets)
        }
    }

    deserializer.deserialize_map(AssetsVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_document_uses_defaults() {
        let manifest: Manifest = serde_json::from_str(r#"{ "name": "empty" }"#).unwrap();
        assert_eq!(manifest.manifest_version, MANIFEST_VERSION);
        assert_eq!(manifest.scene_data.environment.gravity, Vector3Spec::new(0.0, -9.81, 0.0));
        assert_eq!(manifest.scene_data.physics.substeps, 1);
        assert!(manifest.assets.is_empty());
    }

    #[test]
    fn test_duplicate_asset_ids_rejected() {
        let text = r#"{ "assets": { "a": { "type": "box" }, "a": { "type": "sphere" } } }"#;
        let err = serde_json::from_str::<Manifest>(text).unwrap_err();
        assert!(err.to_string().contains("duplicate asset id 'a'"));
    }

    #[test]
    fn test_primitive_names_and_defaults() {
        assert_eq!(Primitive::from_name("Cube"), Some(Primitive::Box));
        assert_eq!(Primitive::from_name("ball"), Some(Primitive::Sphere));
        assert_eq!(Primitive::from_name("barrel"), None);
        assert_eq!(Primitive::Capsule.default_size().height, Some(2.0));
        let parsed: Primitive = serde_json::from_value(json!("cylinder")).unwrap();
        assert_eq!(parsed.as_str(), "cylinder");
    }

    #[test]
    fn test_custom_type_layout() {
        let value = json!({
            "name": "lamp",
            "paths": { "asset": "models/lamp.obj" },
            "size": { "radius": 0.25 },
            "physics": { "mass": 2.0, "collision_groups": ["environment", 4] },
            "visual": { "emitting": true, "emission_color": "#ffaa00", "debug": { "enabled": true } }
        });
        let lamp: CustomType = serde_json::from_value(value).unwrap();
        assert_eq!(lamp.paths.asset.as_deref(), Some("models/lamp.obj"));
        assert_eq!(lamp.scale, Vector3Spec::new(1.0, 1.0, 1.0));
        assert_eq!(lamp.physics.collision_groups, vec![LayerRef::Name("environment".into()), LayerRef::Index(4)]);
        assert_eq!(lamp.visual.emission_color.resolve(), Some(0xffaa00));
        assert!(lamp.load_layers.collision);
    }

    #[test]
    fn test_asset_entry_type_field() {
        let entry: AssetEntry = serde_json::from_value(json!({
            "type": "box",
            "position": { "x": 1.0, "y": 2.0 },
            "config": { "mass": 0 },
            "group_id": "props"
        }))
        .unwrap();
        assert_eq!(entry.asset_type, "box");
        assert_eq!(entry.position, Vector3Spec::new(1.0, 2.0, 0.0));
        assert_eq!(entry.group_id.as_deref(), Some("props"));
        assert!(entry.flag("missing", true));
    }
}
