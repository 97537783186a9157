//! TrueType fonts baked into single-channel glyph atlases
//!
//! Glyphs 32..128 are rasterized with `fontdue` at a fixed pixel size and
//! packed left to right in shelves with one pixel of padding. The atlas image
//! is registered with the [`ImageManager`] under the font's texture type; this
//! manager keeps only the glyph table.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ash::vk;
use fontdue::{Font, FontSettings};
use thiserror::Error;

use crate::core::config::{AssetConfig, AssetPolicy};
use crate::foundation::math::{Vec2, Vec4};
use crate::render::context::GraphicsContext;
use crate::render::error::VulkanError;
use crate::render::resources::image::{ImageError, ImageManager};
use crate::render::types::{FontAssetType, TextureType};

/// Width and height of every atlas
pub const ATLAS_SIZE: u32 = 1024;
/// Glyphs baked per font
pub const GLYPH_COUNT: u32 = 96;
/// Code point of the first baked glyph
pub const FIRST_GLYPH: u32 = 32;
/// Rasterization size in pixels
pub const GLYPH_PIXEL_SIZE: f32 = 126.0;

/// Font load and bake errors
#[derive(Error, Debug)]
pub enum FontError {
    /// The font file could not be read
    #[error("Failed to read font \"{path}\": {source}")]
    Io {
        /// Font path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The bytes are not a usable font, or the atlas could not be built
    #[error("Failed to load font: {0}")]
    LoadError(String),

    /// The glyphs do not fit in the atlas
    #[error("Glyph '{glyph}' does not fit in the {size}x{size} atlas")]
    AtlasFull {
        /// First glyph that did not fit
        glyph: char,
        /// Atlas edge length
        size: u32,
    },

    /// Uploading the atlas failed
    #[error(transparent)]
    Device(#[from] VulkanError),
}

impl From<ImageError> for FontError {
    fn from(error: ImageError) -> Self {
        match error {
            ImageError::Device(e) => Self::Device(e),
            other => Self::LoadError(other.to_string()),
        }
    }
}

/// Placement and metrics of one glyph
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GlyphData {
    /// Atlas rectangle in pixels: x, y, width, height
    pub rect: Vec4,
    /// Offset from the pen position to the glyph's top-left corner, y down
    pub offset: Vec2,
    /// Horizontal pen advance in pixels
    pub advance_x: f32,
}

/// Glyph table of a baked font
#[derive(Debug, Clone, PartialEq)]
pub struct FontAtlas {
    /// Texture the atlas image is registered under
    pub texture: TextureType,
    /// Rasterization size in pixels
    pub font_size: f32,
    /// Glyphs for consecutive code points from `first_glyph`
    pub glyphs: Vec<GlyphData>,
    /// Code point of `glyphs[0]`
    pub first_glyph: u32,
}

impl FontAtlas {
    /// Metrics for `ch`, if it was baked
    pub fn glyph(&self, ch: char) -> Option<&GlyphData> {
        let index = u32::from(ch).checked_sub(self.first_glyph)?;
        self.glyphs.get(index as usize)
    }
}

/// Row-by-row rectangle packer
///
/// Starts at (1, 1), leaves one pixel between glyphs and starts a new shelf
/// below the tallest glyph of the current one when a row fills up.
#[derive(Debug, Clone)]
pub struct ShelfPacker {
    width: u32,
    height: u32,
    x: u32,
    y: u32,
    bottom: u32,
}

impl ShelfPacker {
    /// Packer for a `width` × `height` area
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            x: 1,
            y: 1,
            bottom: 1,
        }
    }

    /// Top-left corner for a `width` × `height` rectangle, or `None` when the area is full
    pub fn pack(&mut self, width: u32, height: u32) -> Option<(u32, u32)> {
        if self.x + width + 1 >= self.width {
            self.y = self.bottom;
            self.x = 1;
        }
        if self.y + height + 1 >= self.height {
            return None;
        }

        let position = (self.x, self.y);
        self.x += width + 1;
        self.bottom = self.bottom.max(self.y + height + 1);
        Some(position)
    }
}

/// Rasterize the baked glyph range of `font_bytes` into an R8 atlas
///
/// Returns the `ATLAS_SIZE`² coverage bitmap and one [`GlyphData`] per glyph.
pub fn bake_atlas(font_bytes: &[u8]) -> Result<(Vec<u8>, Vec<GlyphData>), FontError> {
    let font = Font::from_bytes(font_bytes, FontSettings::default())
        .map_err(|e| FontError::LoadError(format!("fontdue error: {e}")))?;

    let mut bitmap = vec![0u8; (ATLAS_SIZE * ATLAS_SIZE) as usize];
    let mut glyphs = Vec::with_capacity(GLYPH_COUNT as usize);
    let mut packer = ShelfPacker::new(ATLAS_SIZE, ATLAS_SIZE);

    for code_point in FIRST_GLYPH..FIRST_GLYPH + GLYPH_COUNT {
        let ch = char::from_u32(code_point).unwrap_or(' ');
        let (metrics, coverage) = font.rasterize(ch, GLYPH_PIXEL_SIZE);
        let (width, height) = (metrics.width as u32, metrics.height as u32);

        let (x, y) = packer.pack(width, height).ok_or(FontError::AtlasFull {
            glyph: ch,
            size: ATLAS_SIZE,
        })?;

        for row in 0..metrics.height {
            let src = &coverage[row * metrics.width..(row + 1) * metrics.width];
            let dst_start = (y as usize + row) * ATLAS_SIZE as usize + x as usize;
            bitmap[dst_start..dst_start + metrics.width].copy_from_slice(src);
        }

        glyphs.push(GlyphData {
            rect: Vec4::new(x as f32, y as f32, width as f32, height as f32),
            offset: Vec2::new(metrics.xmin as f32, -(metrics.ymin as f32 + metrics.height as f32)),
            advance_x: metrics.advance_width,
        });
    }

    Ok((bitmap, glyphs))
}

/// Bakes fonts and keeps their glyph tables
#[derive(Debug, Default)]
pub struct FontManager {
    atlases: HashMap<FontAssetType, FontAtlas>,
}

impl FontManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the configured default font, substituting an empty atlas under [`AssetPolicy::Fallback`]
    pub fn load_fonts(
        &mut self,
        context: &GraphicsContext,
        images: &mut ImageManager,
        assets: &AssetConfig,
    ) -> Result<(), FontError> {
        match self.load_font(context, images, FontAssetType::Default, TextureType::DefaultFont, &assets.font_path) {
            Ok(()) => Ok(()),
            Err(e) if assets.policy == AssetPolicy::Fallback => {
                log::error!("Font Manager: {e}, using an empty atlas");
                self.create_placeholder_atlas(context, images, FontAssetType::Default, TextureType::DefaultFont)
            }
            Err(e) => Err(e),
        }
    }

    /// Read a font file and bake it
    pub fn load_font(
        &mut self,
        context: &GraphicsContext,
        images: &mut ImageManager,
        font_type: FontAssetType,
        texture_type: TextureType,
        path: &Path,
    ) -> Result<(), FontError> {
        let bytes = std::fs::read(path).map_err(|source| FontError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.create_font_atlas(context, images, &bytes, font_type, texture_type)?;
        log::info!("Font Manager: Loading Asset \"{}\"", path.display());
        Ok(())
    }

    /// Bake `font_bytes`, upload the atlas image and store the glyph table
    pub fn create_font_atlas(
        &mut self,
        context: &GraphicsContext,
        images: &mut ImageManager,
        font_bytes: &[u8],
        font_type: FontAssetType,
        texture_type: TextureType,
    ) -> Result<(), FontError> {
        let (bitmap, glyphs) = bake_atlas(font_bytes)?;
        let image = images.create_image(
            context,
            &bitmap,
            ATLAS_SIZE,
            ATLAS_SIZE,
            1,
            vk::Format::R8_UNORM,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
        )?;
        images.set_texture(texture_type, image);

        self.atlases.insert(
            font_type,
            FontAtlas {
                texture: texture_type,
                font_size: GLYPH_PIXEL_SIZE,
                glyphs,
                first_glyph: FIRST_GLYPH,
            },
        );
        Ok(())
    }

    fn create_placeholder_atlas(
        &mut self,
        context: &GraphicsContext,
        images: &mut ImageManager,
        font_type: FontAssetType,
        texture_type: TextureType,
    ) -> Result<(), FontError> {
        let image = images.create_image(
            context,
            &[0],
            1,
            1,
            1,
            vk::Format::R8_UNORM,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
        )?;
        images.set_texture(texture_type, image);

        self.atlases.insert(
            font_type,
            FontAtlas {
                texture: texture_type,
                font_size: GLYPH_PIXEL_SIZE,
                glyphs: vec![GlyphData::default(); GLYPH_COUNT as usize],
                first_glyph: FIRST_GLYPH,
            },
        );
        Ok(())
    }

    /// Glyph table of `font_type`, if loaded
    pub fn atlas(&self, font_type: FontAssetType) -> Option<&FontAtlas> {
        self.atlases.get(&font_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::core::config::RendererConfig;
    use crate::render::backends::HeadlessDevice;
    use crate::render::resources::buffer::BufferManager;

    #[test]
    fn test_packer_starts_at_one_and_pads() {
        let mut packer = ShelfPacker::new(64, 64);
        assert_eq!(packer.pack(10, 8), Some((1, 1)));
        assert_eq!(packer.pack(10, 12), Some((12, 1)));
        assert_eq!(packer.pack(4, 4), Some((23, 1)));
    }

    #[test]
    fn test_packer_wraps_below_tallest_glyph() {
        let mut packer = ShelfPacker::new(32, 64);
        assert_eq!(packer.pack(14, 5), Some((1, 1)));
        assert_eq!(packer.pack(14, 9), Some((16, 1)));
        // 31 + 2 + 1 >= 32 starts a new shelf at 1 + 9 + 1
        assert_eq!(packer.pack(2, 3), Some((1, 11)));
    }

    #[test]
    fn test_packer_reports_full() {
        let mut packer = ShelfPacker::new(16, 16);
        assert_eq!(packer.pack(13, 13), Some((1, 1)));
        assert_eq!(packer.pack(13, 1), None);
        assert_eq!(ShelfPacker::new(16, 16).pack(4, 14), None);
    }

    #[test]
    fn test_invalid_font_bytes_are_a_load_error() {
        let result = bake_atlas(b"definitely not a font");
        assert!(matches!(result, Err(FontError::LoadError(_))));
    }

    #[test]
    fn test_glyph_lookup_by_code_point() {
        let mut glyphs = vec![GlyphData::default(); GLYPH_COUNT as usize];
        glyphs[(u32::from('A') - FIRST_GLYPH) as usize].advance_x = 7.0;
        let atlas = FontAtlas {
            texture: TextureType::DefaultFont,
            font_size: GLYPH_PIXEL_SIZE,
            glyphs,
            first_glyph: FIRST_GLYPH,
        };

        assert_eq!(atlas.glyph('A').map(|g| g.advance_x), Some(7.0));
        assert!(atlas.glyph('\n').is_none());
        assert!(atlas.glyph('\u{80}').is_none());
        assert!(atlas.glyph('~').is_some());
    }

    fn context(device: &Arc<HeadlessDevice>, images: &ImageManager) -> (BufferManager, GraphicsContext) {
        let buffers = BufferManager::new(device.clone());
        let context = GraphicsContext::new(device.clone(), &RendererConfig::default(), &buffers, images).unwrap();
        (buffers, context)
    }

    #[test]
    fn test_missing_font_falls_back_to_empty_atlas() {
        let device = Arc::new(HeadlessDevice::new(64, 64));
        let mut images = ImageManager::new(device.clone());
        let (_buffers, context) = context(&device, &images);
        let assets = AssetConfig {
            font_path: PathBuf::from("missing/font.ttf"),
            ..AssetConfig::default()
        };

        let mut fonts = FontManager::new();
        fonts.load_fonts(&context, &mut images, &assets).unwrap();

        let atlas = fonts.atlas(FontAssetType::Default).unwrap();
        assert_eq!(atlas.glyphs.len(), GLYPH_COUNT as usize);
        assert_eq!(atlas.glyph('a').unwrap().advance_x, 0.0);
        let texture = images.texture(TextureType::DefaultFont).unwrap();
        assert_eq!((texture.width, texture.height, texture.format), (1, 1, vk::Format::R8_UNORM));
    }

    #[test]
    fn test_missing_font_is_an_error_when_strict() {
        let device = Arc::new(HeadlessDevice::new(64, 64));
        let mut images = ImageManager::new(device.clone());
        let (_buffers, context) = context(&device, &images);
        let assets = AssetConfig {
            font_path: PathBuf::from("missing/font.ttf"),
            ..AssetConfig::default()
        }
        .with_policy(AssetPolicy::Strict);

        let mut fonts = FontManager::new();
        let result = fonts.load_fonts(&context, &mut images, &assets);
        assert!(matches!(result, Err(FontError::Io { .. })));
        assert!(fonts.atlas(FontAssetType::Default).is_none());
        assert!(images.texture(TextureType::DefaultFont).is_none());
    }
}
