//! Material description handed to the render scene
//!
//! Colours arrive from manifests either as numbers or as hex strings
//! (`"0xff8800"`, `"#ff8800"`, `"#f80"`); [`parse_color`] normalizes them to
//! a packed `0xRRGGBB` value before a [`Material`] is built.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Surface description for one drawable node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Base colour as 0xRRGGBB
    pub color: u32,
    /// Opacity in `[0, 1]`
    pub opacity: f32,
    /// Emission colour as 0xRRGGBB
    pub emission_color: u32,
    /// Emission strength, zero when the material does not glow
    pub emission_intensity: f32,
    /// Whether the node casts shadows
    pub cast_shadow: bool,
    /// Whether the node receives shadows
    pub receive_shadow: bool,
    /// Render as wireframe overlay
    pub wireframe: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            color: 0x80_80_80,
            opacity: 1.0,
            emission_color: 0x00_00_00,
            emission_intensity: 0.0,
            cast_shadow: true,
            receive_shadow: true,
            wireframe: false,
        }
    }
}

impl Material {
    /// Create a material with the given base colour
    pub fn new(color: u32) -> Self {
        Self {
            color,
            ..Default::default()
        }
    }

    /// Set opacity, clamped to `[0, 1]`
    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = if opacity.is_finite() { opacity.clamp(0.0, 1.0) } else { 1.0 };
        self
    }

    /// Set emission colour and intensity
    pub fn with_emission(mut self, color: u32, intensity: f32) -> Self {
        self.emission_color = color;
        self.emission_intensity = intensity.max(0.0);
        self
    }

    /// Set shadow flags
    pub fn with_shadows(mut self, cast: bool, receive: bool) -> Self {
        self.cast_shadow = cast;
        self.receive_shadow = receive;
        self
    }

    /// Translucent wireframe used to visualise collision geometry
    pub fn debug_overlay(color: u32, opacity: f32) -> Self {
        Self {
            wireframe: true,
            cast_shadow: false,
            receive_shadow: false,
            ..Self::new(color).with_opacity(opacity)
        }
    }

    /// Whether blending is needed
    pub fn is_transparent(&self) -> bool {
        self.opacity < 1.0
    }

    /// Base colour as linear RGBA floats
    pub fn rgba(&self) -> [f32; 4] {
        let [r, g, b] = color_to_rgb(self.color);
        [r, g, b, self.opacity]
    }
}

/// Parse a colour given as a number or hex string
///
/// Accepts `0xRRGGBB`, `#RRGGBB`, `#RGB` and non-negative integers up to
/// `0xFFFFFF`. Anything else yields `None`.
pub fn parse_color(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
            .filter(|v| *v <= 0xFF_FF_FF)
            .map(|v| v as u32),
        Value::String(s) => parse_color_str(s),
        _ => None,
    }
}

/// Parse a hex colour string (`0x...` or `#...`)
pub fn parse_color_str(text: &str) -> Option<u32> {
    let text = text.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .or_else(|| text.strip_prefix('#'))?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match digits.len() {
        3 => {
            let short = u32::from_str_radix(digits, 16).ok()?;
            let (r, g, b) = ((short >> 8) & 0xF, (short >> 4) & 0xF, short & 0xF);
            Some((r * 17) << 16 | (g * 17) << 8 | (b * 17))
        }
        1..=6 => u32::from_str_radix(digits, 16).ok(),
        _ => None,
    }
}

/// Split a packed colour into `[r, g, b]` floats in `[0, 1]`
pub fn color_to_rgb(color: u32) -> [f32; 3] {
    [
        ((color >> 16) & 0xFF) as f32 / 255.0,
        ((color >> 8) & 0xFF) as f32 / 255.0,
        (color & 0xFF) as f32 / 255.0,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_hex_forms() {
        assert_eq!(parse_color(&json!("0xff8800")), Some(0xff8800));
        assert_eq!(parse_color(&json!("#FF8800")), Some(0xff8800));
        assert_eq!(parse_color(&json!("#f80")), Some(0xff8800));
        assert_eq!(parse_color(&json!(16_711_680)), Some(0xff0000));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_color(&json!("red")), None);
        assert_eq!(parse_color(&json!("#12345678")), None);
        assert_eq!(parse_color(&json!("#zzz")), None);
        assert_eq!(parse_color(&json!(-1)), None);
        assert_eq!(parse_color(&json!(true)), None);
    }

    #[test]
    fn test_rgba_uses_opacity() {
        let material = Material::new(0xff0000).with_opacity(0.5);
        assert_eq!(material.rgba(), [1.0, 0.0, 0.0, 0.5]);
        assert!(material.is_transparent());
    }
}
