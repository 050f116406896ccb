//! Texture image loading
//!
//! Everything is decoded to tightly packed RGBA8 so the atlas packer can blit
//! sources of any format into one canvas.

use std::path::Path;

use image::RgbaImage;

use crate::assets::AssetError;

/// Decoded RGBA8 texture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    /// Row-major RGBA pixels
    pub data: Vec<u8>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl ImageData {
    /// Decode an image file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AssetError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AssetError::NotFound(path.display().to_string()));
        }
        let img = image::open(path).map_err(|e| AssetError::Image(format!("{}: {}", path.display(), e)))?;
        let data = Self::from_rgba(img.to_rgba8());
        log::debug!("Loaded texture {}x{} from {:?}", data.width, data.height, path);
        Ok(data)
    }

    /// Decode an in-memory image
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AssetError> {
        let img = image::load_from_memory(bytes).map_err(|e| AssetError::Image(e.to_string()))?;
        Ok(Self::from_rgba(img.to_rgba8()))
    }

    fn from_rgba(rgba: RgbaImage) -> Self {
        let (width, height) = rgba.dimensions();
        Self {
            data: rgba.into_raw(),
            width,
            height,
        }
    }

    /// Image filled with one colour
    pub fn solid_color(width: u32, height: u32, color: [u8; 4]) -> Self {
        Self {
            data: color.repeat(pixel_count(width, height)),
            width,
            height,
        }
    }

    /// Pixel area
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Whether both edges are powers of two
    pub fn is_power_of_two(&self) -> bool {
        self.width.is_power_of_two() && self.height.is_power_of_two()
    }

    /// View as an `image` buffer; `None` if the pixel data is the wrong length
    pub fn to_rgba_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.data.clone())
    }

    /// RGBA value at a pixel
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = pixel_count(self.width, y).checked_add(x as usize)?.checked_mul(4)?;
        let px = self.data.get(offset..offset.checked_add(4)?)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}

fn pixel_count(width: u32, height: u32) -> usize {
    (width as usize).saturating_mul(height as usize)
}
