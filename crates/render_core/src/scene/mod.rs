//! Scene-side systems that feed the renderer
//!
//! Transforms are culled and refreshed every frame, then the visible ones are
//! turned into instances in a [`RenderableDatapack`]. Text is laid out into
//! glyph instances against a baked font atlas.

mod text;
mod transform;

pub use text::{layout_text, push_text, Text, TextSpace, SHADOW_COLOR, SHADOW_OFFSET, SPACE_ADVANCE};
pub use transform::{update_screen_transforms, update_world_transform, update_world_transforms, Transform};

use crate::render::types::{MeshAssetType, MeshInstance, RenderableDatapack};

/// Append one instance of `mesh` per visible transform
pub fn push_visible_meshes<'a>(
    datapack: &mut RenderableDatapack,
    mesh: MeshAssetType,
    transforms: impl IntoIterator<Item = &'a Transform>,
) {
    for transform in transforms.into_iter().filter(|t| t.visible) {
        datapack.push_mesh(mesh, MeshInstance::new(&transform.model));
    }
}
