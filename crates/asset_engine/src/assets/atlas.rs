//! Texture atlas packing
//!
//! Textures are grouped per channel (diffuse, normal, ...) and packed into one
//! RGBA canvas per channel with a shelf packer: largest area first, left to
//! right, wrapping to a new row at the maximum edge. Every texture keeps a
//! normalized rectangle so existing UVs can be remapped into the atlas.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use image::{imageops, RgbaImage};
use thiserror::Error;

use super::image_loader::ImageData;
use super::AssetError;
use crate::core::config::AtlasSettings;
use crate::foundation::math::next_power_of_two;
use crate::render::Mesh;

/// Atlas creation errors
#[derive(Debug, Error)]
pub enum AtlasError {
    /// Nothing to pack
    #[error("No textures given for channel '{0}'")]
    Empty(String),

    /// A single texture does not fit the maximum edge
    #[error("Texture '{id}' ({width}x{height}) exceeds the maximum atlas size {max}")]
    TextureTooLarge {
        /// Texture id
        id: String,
        /// Width in pixels
        width: u32,
        /// Height in pixels
        height: u32,
        /// Maximum atlas edge
        max: u32,
    },

    /// The packed rows grow past the maximum edge
    #[error("Atlas for channel '{channel}' needs {required}px of height, maximum is {max}")]
    Overflow {
        /// Channel being packed
        channel: String,
        /// Height the rows need
        required: u32,
        /// Maximum atlas edge
        max: u32,
    },

    /// The same id appears twice in one channel
    #[error("Duplicate texture id '{0}'")]
    DuplicateTexture(String),

    /// Pixel buffer does not match its dimensions
    #[error("Texture '{0}' has inconsistent pixel data")]
    InvalidImage(String),

    /// Texture could not be loaded
    #[error(transparent)]
    Load(#[from] AssetError),
}

/// A texture to pack
#[derive(Debug, Clone)]
pub struct TextureSource {
    /// Identifier used for UV lookups
    pub id: String,
    /// Pixels
    pub image: ImageData,
}

impl TextureSource {
    /// Wrap decoded pixels
    pub fn new(id: impl Into<String>, image: ImageData) -> Self {
        Self { id: id.into(), image }
    }
}

/// Normalized rectangle of one texture inside its atlas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtlasEntry {
    /// Left edge in `[0, 1]`
    pub x: f32,
    /// Top edge in `[0, 1]`
    pub y: f32,
    /// Width in `[0, 1]`
    pub width: f32,
    /// Height in `[0, 1]`
    pub height: f32,
}

impl AtlasEntry {
    /// Map a UV in the source texture into the atlas
    pub fn remap(&self, uv: [f32; 2]) -> [f32; 2] {
        [uv[0] * self.width + self.x, uv[1] * self.height + self.y]
    }

    /// Whether two rectangles share any area
    pub fn overlaps(&self, other: &Self) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }
}

/// One packed channel
#[derive(Debug, Clone)]
pub struct TextureAtlas {
    /// Composited canvas, power-of-two on both axes
    pub image: ImageData,
    /// Rectangles by texture id
    pub entries: BTreeMap<String, AtlasEntry>,
}

impl TextureAtlas {
    /// Canvas width
    pub fn width(&self) -> u32 {
        self.image.width
    }

    /// Canvas height
    pub fn height(&self) -> u32 {
        self.image.height
    }

    /// Rectangle of a texture
    pub fn entry(&self, id: &str) -> Option<AtlasEntry> {
        self.entries.get(id).copied()
    }
}

struct Placement {
    x: u32,
    y: u32,
}

/// Edge of a texture plus padding on both sides
fn padded(edge: u32, pad: u32) -> Option<u32> {
    pad.checked_mul(2)?.checked_add(edge)
}

/// Shelf-pack cells, returning pixel positions and the used extent
fn pack(
    channel: &str,
    textures: &[&TextureSource],
    settings: &AtlasSettings,
) -> Result<(Vec<Placement>, u32, u32), AtlasError> {
    let pad = settings.padding;
    let max = settings.max_size;
    let (mut cursor_x, mut cursor_y, mut row_height) = (0u32, 0u32, 0u32);
    let mut used_width = 0;
    let mut placements = Vec::with_capacity(textures.len());

    for texture in textures {
        let cell = padded(texture.image.width, pad).zip(padded(texture.image.height, pad));
        let Some((cell_w, cell_h)) = cell.filter(|(w, h)| *w <= max && *h <= max) else {
            return Err(AtlasError::TextureTooLarge {
                id: texture.id.clone(),
                width: texture.image.width,
                height: texture.image.height,
                max,
            });
        };
        if cursor_x.checked_add(cell_w).map_or(true, |end| end > max) {
            cursor_y = cursor_y.saturating_add(row_height);
            cursor_x = 0;
            row_height = 0;
        }
        placements.push(Placement {
            x: cursor_x + pad,
            y: cursor_y + pad,
        });
        cursor_x += cell_w;
        row_height = row_height.max(cell_h);
        used_width = used_width.max(cursor_x);
    }

    let used_height = cursor_y.saturating_add(row_height);
    if used_height > max {
        return Err(AtlasError::Overflow {
            channel: channel.to_string(),
            required: used_height,
            max,
        });
    }
    Ok((placements, used_width, used_height))
}

/// Builds and owns the atlases of every channel
///
/// Entries are keyed by texture id within a channel, so one id may appear in
/// several channels with different rectangles.
#[derive(Debug, Default)]
pub struct TextureAtlasManager {
    settings: AtlasSettings,
    atlases: BTreeMap<String, TextureAtlas>,
}

impl TextureAtlasManager {
    /// Empty manager
    pub fn new(settings: AtlasSettings) -> Self {
        Self {
            settings,
            atlases: BTreeMap::new(),
        }
    }

    /// Pack textures into the atlas for `channel`, replacing any previous one
    pub fn create_atlas(&mut self, textures: &[TextureSource], channel: &str) -> Result<&TextureAtlas, AtlasError> {
        if textures.is_empty() {
            return Err(AtlasError::Empty(channel.to_string()));
        }
        let mut sorted: Vec<&TextureSource> = textures.iter().collect();
        sorted.sort_by(|a, b| b.image.area().cmp(&a.image.area()).then_with(|| a.id.cmp(&b.id)));
        let mut seen = HashSet::new();
        if let Some(dup) = sorted.iter().find(|t| !seen.insert(t.id.as_str())) {
            return Err(AtlasError::DuplicateTexture(dup.id.clone()));
        }

        let (placements, used_width, used_height) = pack(channel, &sorted, &self.settings)?;
        let (Some(width), Some(height)) = (next_power_of_two(used_width), next_power_of_two(used_height)) else {
            return Err(AtlasError::Overflow {
                channel: channel.to_string(),
                required: used_height,
                max: self.settings.max_size,
            });
        };

        let mut canvas = RgbaImage::new(width, height);
        let mut entries = BTreeMap::new();
        for (texture, placement) in sorted.iter().zip(&placements) {
            let pixels = texture
                .image
                .to_rgba_image()
                .ok_or_else(|| AtlasError::InvalidImage(texture.id.clone()))?;
            imageops::replace(&mut canvas, &pixels, i64::from(placement.x), i64::from(placement.y));
            entries.insert(
                texture.id.clone(),
                AtlasEntry {
                    x: placement.x as f32 / width as f32,
                    y: placement.y as f32 / height as f32,
                    width: texture.image.width as f32 / width as f32,
                    height: texture.image.height as f32 / height as f32,
                },
            );
        }

        log::info!(
            "Packed {} textures into {}x{} atlas for channel '{}'",
            entries.len(),
            width,
            height,
            channel
        );

        let atlas = TextureAtlas {
            image: ImageData {
                data: canvas.into_raw(),
                width,
                height,
            },
            entries,
        };
        self.atlases.insert(channel.to_string(), atlas);
        self.atlases
            .get(channel)
            .ok_or_else(|| AtlasError::Empty(channel.to_string()))
    }

    /// Rectangle of a texture, searching channels in name order
    ///
    /// Use [`Self::get_uvs_in`] when the same id is packed into more than one
    /// channel.
    pub fn get_uvs(&self, texture: &str) -> Option<AtlasEntry> {
        self.atlases.values().find_map(|atlas| atlas.entry(texture))
    }

    /// Rectangle of a texture in one channel
    pub fn get_uvs_in(&self, channel: &str, texture: &str) -> Option<AtlasEntry> {
        self.atlases.get(channel)?.entry(texture)
    }

    /// Map a source UV into the atlas
    pub fn remap_uv(&self, texture: &str, uv: [f32; 2]) -> Option<[f32; 2]> {
        self.get_uvs(texture).map(|entry| entry.remap(uv))
    }

    /// Map a source UV into one channel's atlas
    pub fn remap_uv_in(&self, channel: &str, texture: &str, uv: [f32; 2]) -> Option<[f32; 2]> {
        self.get_uvs_in(channel, texture).map(|entry| entry.remap(uv))
    }

    /// Remap every texture coordinate of a mesh; `false` if the texture is unknown
    pub fn remap_mesh_uvs(&self, mesh: &mut Mesh, texture: &str) -> bool {
        let Some(entry) = self.get_uvs(texture) else {
            log::warn!("No atlas entry for texture '{}'", texture);
            return false;
        };
        for vertex in &mut mesh.vertices {
            vertex.tex_coord = entry.remap(vertex.tex_coord);
        }
        true
    }

    /// Atlas of a channel
    pub fn atlas(&self, channel: &str) -> Option<&TextureAtlas> {
        self.atlases.get(channel)
    }

    /// Channels with an atlas, sorted
    pub fn channels(&self) -> Vec<&str> {
        self.atlases.keys().map(String::as_str).collect()
    }

    /// Decode a texture file, using its file stem as id
    pub fn load_texture(&self, path: impl AsRef<Path>) -> Result<TextureSource, AtlasError> {
        let path = path.as_ref();
        let image = ImageData::from_file(path)?;
        let id = path
            .file_stem()
            .map_or_else(|| path.display().to_string(), |s| s.to_string_lossy().into_owned());
        Ok(TextureSource::new(id, image))
    }

    /// Release every atlas; safe to call repeatedly
    pub fn dispose(&mut self) {
        if !self.atlases.is_empty() {
            log::debug!("Disposing {} texture atlases", self.atlases.len());
        }
        self.atlases.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn solid(id: &str, w: u32, h: u32, shade: u8) -> TextureSource {
        TextureSource::new(id, ImageData::solid_color(w, h, [shade, shade, shade, 255]))
    }

    fn manager(max_size: u32, padding: u32) -> TextureAtlasManager {
        TextureAtlasManager::new(AtlasSettings { max_size, padding })
    }

    #[test]
    fn test_rectangles_fit_and_do_not_overlap() {
        let mut atlases = manager(256, 2);
        let textures = [
            solid("grass", 64, 64, 10),
            solid("rock", 32, 32, 20),
            solid("sand", 100, 20, 30),
            solid("bark", 16, 48, 40),
            solid("leaf", 8, 8, 50),
        ];
        let atlas = atlases.create_atlas(&textures, "diffuse").unwrap();
        assert!(atlas.width().is_power_of_two());
        assert!(atlas.height().is_power_of_two());

        let entries: Vec<AtlasEntry> = atlas.entries.values().copied().collect();
        assert_eq!(entries.len(), 5);
        for (i, a) in entries.iter().enumerate() {
            assert!(a.x >= 0.0 && a.y >= 0.0 && a.x + a.width <= 1.0 && a.y + a.height <= 1.0);
            for b in &entries[i + 1..] {
                assert!(!a.overlaps(b));
            }
        }
    }

    #[test]
    fn test_largest_texture_is_placed_first() {
        let mut atlases = manager(512, 2);
        let textures = [solid("small", 16, 16, 1), solid("big", 64, 64, 2)];
        atlases.create_atlas(&textures, "diffuse").unwrap();
        let big = atlases.get_uvs("big").unwrap();
        let small = atlases.get_uvs("small").unwrap();
        assert!(big.x < small.x);
        // Padding offsets the first texture from the corner
        assert_relative_eq!(big.x, 2.0 / 128.0);
    }

    #[test]
    fn test_rows_wrap_at_max_size() {
        let mut atlases = manager(64, 0);
        let textures = [solid("a", 32, 32, 1), solid("b", 32, 32, 2), solid("c", 32, 32, 3)];
        let atlas = atlases.create_atlas(&textures, "diffuse").unwrap();
        assert_eq!((atlas.width(), atlas.height()), (64, 64));
        let c = atlas.entry("c").unwrap();
        assert_relative_eq!(c.y, 0.5);
        assert_relative_eq!(c.x, 0.0);
    }

    #[test]
    fn test_pixels_are_composited() {
        let mut atlases = manager(64, 1);
        let atlas = atlases.create_atlas(&[solid("red", 4, 4, 200)], "diffuse").unwrap();
        assert_eq!(atlas.image.pixel(1, 1), Some([200, 200, 200, 255]));
        assert_eq!(atlas.image.pixel(0, 0), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_overflow_is_an_error() {
        let mut atlases = manager(64, 0);
        let textures: Vec<TextureSource> = (0..5).map(|i| solid(&format!("t{i}"), 32, 32, 1)).collect();
        let err = atlases.create_atlas(&textures, "diffuse").unwrap_err();
        assert!(matches!(err, AtlasError::Overflow { required: 96, .. }));

        let err = atlases.create_atlas(&[solid("huge", 80, 8, 1)], "diffuse").unwrap_err();
        assert!(matches!(err, AtlasError::TextureTooLarge { .. }));
        assert!(atlases.atlas("diffuse").is_none());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut atlases = manager(256, 0);
        let err = atlases
            .create_atlas(&[solid("x", 8, 8, 1), solid("x", 16, 16, 1)], "diffuse")
            .unwrap_err();
        assert!(matches!(err, AtlasError::DuplicateTexture(id) if id == "x"));
        assert!(matches!(atlases.create_atlas(&[], "diffuse"), Err(AtlasError::Empty(_))));
    }

    #[test]
    fn test_remap_uvs() {
        let mut atlases = manager(128, 0);
        atlases
            .create_atlas(&[solid("a", 64, 64, 1), solid("b", 64, 64, 2)], "diffuse")
            .unwrap();
        let b = atlases.get_uvs("b").unwrap();
        assert_eq!(atlases.remap_uv("b", [0.0, 0.0]), Some([b.x, b.y]));
        assert_eq!(atlases.remap_uv("b", [1.0, 1.0]), Some([b.x + b.width, b.y + b.height]));
        assert_eq!(atlases.remap_uv("missing", [0.5, 0.5]), None);

        let mut mesh = Mesh::cuboid(1.0, 1.0, 1.0);
        assert!(atlases.remap_mesh_uvs(&mut mesh, "b"));
        assert!(mesh.vertices.iter().all(|v| v.tex_coord[0] >= b.x && v.tex_coord[0] <= b.x + b.width));
        assert!(!atlases.remap_mesh_uvs(&mut mesh, "missing"));
    }

    #[test]
    fn test_channels_and_dispose() {
        let mut atlases = manager(128, 0);
        atlases.create_atlas(&[solid("a", 8, 8, 1)], "normal").unwrap();
        atlases.create_atlas(&[solid("b", 8, 8, 1)], "diffuse").unwrap();
        assert_eq!(atlases.channels(), ["diffuse", "normal"]);

        // Rebuilding a channel drops its old entries
        atlases.create_atlas(&[solid("c", 8, 8, 1)], "diffuse").unwrap();
        assert!(atlases.get_uvs("b").is_none());
        assert!(atlases.get_uvs("c").is_some());

        atlases.dispose();
        atlases.dispose();
        assert!(atlases.channels().is_empty());
        assert!(atlases.get_uvs("a").is_none());
    }

    #[test]
    fn test_same_id_in_two_channels() {
        let mut atlases = manager(256, 2);
        atlases.create_atlas(&[solid("brick", 64, 64, 1)], "diffuse").unwrap();
        atlases
            .create_atlas(&[solid("big", 128, 128, 2), solid("brick", 64, 64, 3)], "normal")
            .unwrap();

        let diffuse = atlases.get_uvs_in("diffuse", "brick").unwrap();
        let normal = atlases.get_uvs_in("normal", "brick").unwrap();
        assert_relative_eq!(diffuse.x, 2.0 / 128.0);
        assert!(normal.x > diffuse.x);
        assert_eq!(atlases.get_uvs("brick"), Some(diffuse));
        assert_eq!(
            atlases.remap_uv_in("normal", "brick", [0.0, 0.0]),
            Some([normal.x, normal.y])
        );

        // Repacking one channel without the id leaves the other intact
        atlases.create_atlas(&[solid("big", 128, 128, 2)], "normal").unwrap();
        assert!(atlases.get_uvs_in("normal", "brick").is_none());
        assert_eq!(atlases.get_uvs("brick"), Some(diffuse));
    }

    #[test]
    fn test_huge_padding_is_too_large_not_a_panic() {
        let mut atlases = manager(4096, u32::MAX / 2);
        let err = atlases.create_atlas(&[solid("a", 8, 8, 1)], "diffuse").unwrap_err();
        assert!(matches!(err, AtlasError::TextureTooLarge { .. }));
    }

    #[test]
    fn test_load_texture_uses_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brick.png");
        RgbaImage::new(4, 2).save(&path).unwrap();
        let source = manager(64, 0).load_texture(&path).unwrap();
        assert_eq!(source.id, "brick");
        assert_eq!((source.image.width, source.image.height), (4, 2));
        assert!(matches!(manager(64, 0).load_texture(dir.path().join("none.png")), Err(AtlasError::Load(_))));
    }
}
