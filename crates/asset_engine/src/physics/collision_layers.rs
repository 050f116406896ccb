//! Collision layer system for filtering collision detection
//!
//! Manifests list `collision_groups` (what a collider is) and
//! `collision_mask` (what it collides with) as layer names or bit indices.
//! [`CollisionLayers::resolve`] folds such a list into a `u32` bitmask.

use serde::{Deserialize, Serialize};

/// One entry of a manifest layer list: a bit index or a well-known name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LayerRef {
    /// Bit index in `0..32`
    Index(u32),
    /// Layer name such as `"player"` or `"environment"`
    Name(String),
}

/// Collision layer definitions
pub struct CollisionLayers;

impl CollisionLayers {
    /// No collision layer
    pub const NONE: u32 = 0;

    /// All collision layers
    pub const ALL: u32 = 0xFFFF_FFFF;

    /// Player character layer
    pub const PLAYER: u32 = 1 << 0;

    /// Enemy character layer
    pub const ENEMY: u32 = 1 << 1;

    /// Projectiles (bullets, missiles, etc.)
    pub const PROJECTILE: u32 = 1 << 2;

    /// Static environment geometry
    pub const ENVIRONMENT: u32 = 1 << 3;

    /// Trigger volumes (no physical response)
    pub const TRIGGER: u32 = 1 << 4;

    /// Debris and small physics objects
    pub const DEBRIS: u32 = 1 << 5;

    /// Vehicles
    pub const VEHICLE: u32 = 1 << 6;

    /// Pickups and collectibles
    pub const PICKUP: u32 = 1 << 7;

    /// Bit for a well-known layer name (case-insensitive)
    pub fn by_name(name: &str) -> Option<u32> {
        match name.trim().to_ascii_lowercase().as_str() {
            "none" => Some(Self::NONE),
            "all" => Some(Self::ALL),
            "player" => Some(Self::PLAYER),
            "enemy" => Some(Self::ENEMY),
            "projectile" => Some(Self::PROJECTILE),
            "environment" | "static" => Some(Self::ENVIRONMENT),
            "trigger" => Some(Self::TRIGGER),
            "debris" => Some(Self::DEBRIS),
            "vehicle" => Some(Self::VEHICLE),
            "pickup" => Some(Self::PICKUP),
            other => other
                .strip_prefix("layer_")
                .and_then(|n| n.parse::<u32>().ok())
                .and_then(Self::bit),
        }
    }

    /// Bit for an index, `None` outside `0..32`
    pub fn bit(index: u32) -> Option<u32> {
        (index < 32).then(|| 1 << index)
    }

    /// Resolve a layer list into a bitmask
    ///
    /// An empty list means [`Self::ALL`]. Unknown entries are skipped and
    /// returned so callers can report them.
    pub fn resolve(layers: &[LayerRef]) -> (u32, Vec<LayerRef>) {
        if layers.is_empty() {
            return (Self::ALL, Vec::new());
        }
        let mut mask = Self::NONE;
        let mut unknown = Vec::new();
        for layer in layers {
            let bit = match layer {
                LayerRef::Index(i) => Self::bit(*i),
                LayerRef::Name(name) => Self::by_name(name),
            };
            match bit {
                Some(bit) => mask |= bit,
                None => unknown.push(layer.clone()),
            }
        }
        (mask, unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_mixed_list() {
        let layers = vec![
            LayerRef::Name("Player".to_string()),
            LayerRef::Index(3),
            LayerRef::Name("layer_9".to_string()),
        ];
        let (mask, unknown) = CollisionLayers::resolve(&layers);
        assert_eq!(mask, CollisionLayers::PLAYER | CollisionLayers::ENVIRONMENT | (1 << 9));
        assert!(unknown.is_empty());
    }

    #[test]
    fn test_resolve_reports_unknown() {
        let layers = vec![LayerRef::Name("ghosts".to_string()), LayerRef::Index(40)];
        let (mask, unknown) = CollisionLayers::resolve(&layers);
        assert_eq!(mask, CollisionLayers::NONE);
        assert_eq!(unknown.len(), 2);
    }

    #[test]
    fn test_empty_list_is_all() {
        assert_eq!(CollisionLayers::resolve(&[]).0, CollisionLayers::ALL);
    }

    #[test]
    fn test_untagged_deserialize() {
        let layers: Vec<LayerRef> = serde_json::from_str(r#"["enemy", 2]"#).unwrap();
        assert_eq!(layers, vec![LayerRef::Name("enemy".to_string()), LayerRef::Index(2)]);
    }
}
