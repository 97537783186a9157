//! Text layout into glyph instances

use crate::foundation::math::{Mat4, Vec3, Vec4};
use crate::render::resources::font::FontAtlas;
use crate::render::types::{FontAssetType, GlyphInstance, RenderableDatapack};

/// Pen advance of a space, in atlas pixels
pub const SPACE_ADVANCE: f32 = 32.0;

/// Offset of the screen-space drop shadow from its glyph
pub const SHADOW_OFFSET: Vec3 = Vec3::new(0.0, -1.0, 0.0);

/// Color of the screen-space drop shadow
pub const SHADOW_COLOR: Vec4 = Vec4::new(0.0, 0.0, 0.0, 1.0);

/// Where a text is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSpace {
    /// Placed in the world, sized in world units per atlas pixel
    World,
    /// Placed in pixels over the screen, with a drop shadow
    Screen,
}

/// A string drawn with one font
#[derive(Debug, Clone, PartialEq)]
pub struct Text {
    /// Font to draw with
    pub font: FontAssetType,
    /// Requested size in pixels
    pub font_size: f32,
    /// Glyph color
    pub color: Vec4,
    /// The string
    pub content: String,
}

impl Text {
    /// Text in the default font
    pub fn new(content: impl Into<String>, font_size: f32, color: Vec4) -> Self {
        Self {
            font: FontAssetType::Default,
            font_size,
            color,
            content: content.into(),
        }
    }
}

/// Lay `text` out along the local X axis of `model`
///
/// Each glyph quad is centered on its atlas rectangle shifted by the glyph
/// offset. Characters the atlas does not cover are skipped without advancing.
/// Screen-space glyphs are followed by their shadow.
pub fn layout_text(atlas: &FontAtlas, model: &Mat4, text: &Text, space: TextSpace) -> Vec<GlyphInstance> {
    let font_scale = text.font_size / atlas.font_size;
    let pen_scale = match space {
        TextSpace::Screen => font_scale,
        TextSpace::World => font_scale / atlas.font_size,
    };
    let glyph_scale = Mat4::new_scaling(font_scale);

    let mut instances = Vec::with_capacity(text.content.len() * 2);
    let mut pen = 0.0;

    for ch in text.content.chars() {
        if ch == ' ' {
            pen += SPACE_ADVANCE * pen_scale;
            continue;
        }
        let Some(glyph) = atlas.glyph(ch) else {
            continue;
        };

        let align_x = (glyph.rect.z * 0.5 + glyph.offset.x) * pen_scale;
        let align_y = -(glyph.rect.w * 0.5 + glyph.offset.y) * pen_scale;
        let position = Vec3::new(pen + align_x, align_y, 0.0);

        let glyph_model = model * Mat4::new_translation(&position) * glyph_scale;
        instances.push(GlyphInstance::new(&glyph_model, glyph.rect, text.color));

        if space == TextSpace::Screen {
            let shadow_model = model * Mat4::new_translation(&(position + SHADOW_OFFSET)) * glyph_scale;
            instances.push(GlyphInstance::new(&shadow_model, glyph.rect, SHADOW_COLOR));
        }

        pen += glyph.advance_x * pen_scale;
    }

    instances
}

/// Lay `text` out and append it to the datapack batch for its font and space
pub fn push_text(datapack: &mut RenderableDatapack, atlas: &FontAtlas, model: &Mat4, text: &Text, space: TextSpace) {
    let instances = layout_text(atlas, model, text, space);
    let batches = match space {
        TextSpace::World => &mut datapack.world_glyph_batches,
        TextSpace::Screen => &mut datapack.screen_glyph_batches,
    };
    batches.entry(text.font).or_default().instances.extend(instances);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec2;
    use crate::render::resources::font::GlyphData;
    use crate::render::types::TextureType;
    use approx::assert_relative_eq;

    fn atlas() -> FontAtlas {
        let mut glyphs = vec![GlyphData::default(); 96];
        // 'A'
        glyphs[33] = GlyphData {
            rect: Vec4::new(10.0, 20.0, 8.0, 12.0),
            offset: Vec2::new(1.0, -12.0),
            advance_x: 10.0,
        };
        FontAtlas {
            texture: TextureType::DefaultFont,
            font_size: 10.0,
            glyphs,
            first_glyph: 32,
        }
    }

    fn translation(instance: &GlyphInstance) -> Vec3 {
        let model = Mat4::from(instance.model);
        Vec3::new(model[(0, 3)], model[(1, 3)], model[(2, 3)])
    }

    #[test]
    fn test_screen_text_adds_shadow_after_each_glyph() {
        let text = Text::new("AA", 20.0, Vec4::new(1.0, 1.0, 0.0, 1.0));
        let instances = layout_text(&atlas(), &Mat4::identity(), &text, TextSpace::Screen);

        assert_eq!(instances.len(), 4);
        assert_eq!(instances[0].color, [1.0, 1.0, 0.0, 1.0]);
        assert_eq!(instances[1].color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(instances[0].rect, [10.0, 20.0, 8.0, 12.0]);

        // Scale 2: align x = (4 + 1) * 2, align y = -(6 - 12) * 2
        assert_relative_eq!(translation(&instances[0]), Vec3::new(10.0, 12.0, 0.0), epsilon = 1e-5);
        assert_relative_eq!(translation(&instances[1]), Vec3::new(10.0, 11.0, 0.0), epsilon = 1e-5);
        // Second glyph starts one advance (10 * 2) later
        assert_relative_eq!(translation(&instances[2]), Vec3::new(30.0, 12.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_space_advances_and_unknown_characters_are_skipped() {
        let text = Text::new(" \u{e9}A", 10.0, Vec4::repeat(1.0));
        let instances = layout_text(&atlas(), &Mat4::identity(), &text, TextSpace::Screen);

        assert_eq!(instances.len(), 2);
        assert_relative_eq!(translation(&instances[0]).x, SPACE_ADVANCE + 5.0, epsilon = 1e-5);
    }

    #[test]
    fn test_world_text_scales_pen_by_atlas_size_without_shadow() {
        let text = Text::new("A", 10.0, Vec4::repeat(1.0));
        let model = Mat4::new_translation(&Vec3::new(0.0, 10.0, 10.0));
        let instances = layout_text(&atlas(), &model, &text, TextSpace::World);

        assert_eq!(instances.len(), 1);
        assert_relative_eq!(translation(&instances[0]), Vec3::new(0.5, 10.6, 10.0), epsilon = 1e-5);
    }

    #[test]
    fn test_push_text_fills_the_matching_batch() {
        let mut datapack = RenderableDatapack::default();
        let text = Text::new("A A", 10.0, Vec4::repeat(1.0));

        push_text(&mut datapack, &atlas(), &Mat4::identity(), &text, TextSpace::World);
        push_text(&mut datapack, &atlas(), &Mat4::identity(), &text, TextSpace::Screen);

        assert_eq!(datapack.world_glyph_batches[&FontAssetType::Default].len(), 2);
        assert_eq!(datapack.screen_glyph_batches[&FontAssetType::Default].len(), 4);
    }
}
