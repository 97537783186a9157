//! Data crossing the world → renderer boundary and the GPU-layout structs shaders read
//!
//! Everything here is plain data. GPU-visible structs are `#[repr(C)]` + [`Pod`]
//! so they can be written into mapped memory with [`bytemuck::bytes_of`] /
//! [`bytemuck::cast_slice`] without any per-field packing.

use std::collections::BTreeMap;
use std::fmt;

use ash::vk;
use bytemuck::{Pod, Zeroable};

use crate::foundation::math::{Mat4, Vec2, Vec3, Vec4};

/// Per-frame uniform block read by every shader
///
/// # Memory Layout
/// Matches the `GlobalData` block in `resources/shaders/GlobalData.glsl` under
/// std140 rules: every vec3/vec2 is padded out to the next 16-byte boundary.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GlobalData {
    /// Screen width, screen height, camera near, camera far
    pub screen_size: [f32; 4],
    /// Perspective view-projection (column-major)
    pub perspective_view_projection: [[f32; 4]; 4],
    /// Orthographic view-projection for screen-space text (column-major)
    pub orthographic_view_projection: [[f32; 4]; 4],
    /// Fog and clear color
    pub sky_color: [f32; 4],
    /// RGB light color, alpha is the ambient strength
    pub light_color: [f32; 4],
    /// Direction towards the light
    pub light_direction: [f32; 3],
    _padding0: u32,
    /// Fog start and end as fractions of the far plane
    pub fog_params: [f32; 2],
    _padding1: [u32; 2],
    /// [`RenderMode`] as its shader value
    pub render_mode: u32,
    /// Seconds since startup
    pub time: f32,
    _padding2: [u32; 2],
}

impl Default for GlobalData {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl GlobalData {
    /// Set the perspective view-projection
    pub fn set_perspective_view_projection(&mut self, matrix: &Mat4) {
        self.perspective_view_projection = (*matrix).into();
    }

    /// Set the orthographic view-projection
    pub fn set_orthographic_view_projection(&mut self, matrix: &Mat4) {
        self.orthographic_view_projection = (*matrix).into();
    }

    /// Set screen size and camera clip planes
    pub fn set_screen(&mut self, width: f32, height: f32, near: f32, far: f32) {
        self.screen_size = [width, height, near, far];
    }

    /// Set sky, light and fog parameters
    pub fn set_environment(&mut self, sky: Vec4, light: Vec4, light_direction: Vec3, fog: Vec2) {
        self.sky_color = sky.into();
        self.light_color = light.into();
        self.light_direction = light_direction.into();
        self.fog_params = fog.into();
    }
}

/// Mesh vertex: position, normal, texture coordinate
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Object-space normal
    pub normal: [f32; 3],
    /// Texture coordinate
    pub uv: [f32; 2],
}

impl Vertex {
    /// Construct a vertex
    pub const fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self { position, normal, uv }
    }
}

/// Per-instance data for mesh draws
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MeshInstance {
    /// Model matrix (column-major)
    pub model: [[f32; 4]; 4],
}

impl MeshInstance {
    /// Instance from a model matrix
    pub fn new(model: &Mat4) -> Self {
        Self { model: (*model).into() }
    }
}

/// Per-instance data for glyph draws
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GlyphInstance {
    /// Model matrix placing the glyph quad (column-major)
    pub model: [[f32; 4]; 4],
    /// Atlas rectangle in pixels: x, y, width, height
    pub rect: [f32; 4],
    /// Text color
    pub color: [f32; 4],
}

impl GlyphInstance {
    /// Instance from a model matrix, atlas rectangle and color
    pub fn new(model: &Mat4, rect: Vec4, color: Vec4) -> Self {
        Self {
            model: (*model).into(),
            rect: rect.into(),
            color: color.into(),
        }
    }
}

/// Instances of one asset drawn with a single instanced call
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceBatch<T> {
    /// Instance data uploaded contiguously
    pub instances: Vec<T>,
    /// Index of the first instance within its region of the instance buffer
    ///
    /// Written by the renderer during upload.
    pub first_instance: u32,
}

impl<T> Default for InstanceBatch<T> {
    fn default() -> Self {
        Self {
            instances: Vec::new(),
            first_instance: 0,
        }
    }
}

impl<T> InstanceBatch<T> {
    /// Number of instances
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Whether the batch has no instances
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

/// Built-in meshes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MeshAssetType {
    /// Unit quad facing -Z, used for glyphs
    Quad,
    /// Unit cube
    Cube,
}

impl MeshAssetType {
    /// Every built-in mesh
    pub const ALL: [Self; 2] = [Self::Quad, Self::Cube];
}

/// Fonts baked at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FontAssetType {
    /// The configured default font
    Default,
}

/// Textures the renderer knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TextureType {
    /// Glyph atlas of the default font
    DefaultFont,
    /// Dirt block
    BlockDirt,
    /// Sand block
    BlockSand,
    /// White tile block
    BlockWhiteTile,
}

impl TextureType {
    /// DDS file name for block textures, `None` for generated textures
    pub const fn file_name(self) -> Option<&'static str> {
        match self {
            Self::DefaultFont => None,
            Self::BlockDirt => Some("T_Block_Dirt.dds"),
            Self::BlockSand => Some("T_Block_Sand.dds"),
            Self::BlockWhiteTile => Some("T_Block_WhiteTile.dds"),
        }
    }
}

/// Everything the world hands the renderer for one frame
///
/// Batches are kept in ordered maps so upload order, and therefore every
/// `first_instance`, is deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderableDatapack {
    /// Clear color of the geometry pass (alpha is forced to 1)
    pub clear_color: [f32; 4],
    /// Mesh instances by mesh
    pub mesh_batches: BTreeMap<MeshAssetType, InstanceBatch<MeshInstance>>,
    /// Byte offset of the mesh region in the instance buffer
    pub mesh_batches_offset: vk::DeviceSize,
    /// World-space glyph instances by font
    pub world_glyph_batches: BTreeMap<FontAssetType, InstanceBatch<GlyphInstance>>,
    /// Byte offset of the world-space glyph region
    pub world_glyph_batches_offset: vk::DeviceSize,
    /// Screen-space glyph instances by font
    pub screen_glyph_batches: BTreeMap<FontAssetType, InstanceBatch<GlyphInstance>>,
    /// Byte offset of the screen-space glyph region
    pub screen_glyph_batches_offset: vk::DeviceSize,
}

impl Default for RenderableDatapack {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            mesh_batches: BTreeMap::new(),
            mesh_batches_offset: 0,
            world_glyph_batches: BTreeMap::new(),
            world_glyph_batches_offset: 0,
            screen_glyph_batches: BTreeMap::new(),
            screen_glyph_batches_offset: 0,
        }
    }
}

impl RenderableDatapack {
    /// Empty every batch but keep the keys and their allocations
    pub fn clear(&mut self) {
        self.mesh_batches.values_mut().for_each(|batch| batch.instances.clear());
        self.world_glyph_batches.values_mut().for_each(|batch| batch.instances.clear());
        self.screen_glyph_batches.values_mut().for_each(|batch| batch.instances.clear());
    }

    /// Add a mesh instance
    pub fn push_mesh(&mut self, mesh: MeshAssetType, instance: MeshInstance) {
        self.mesh_batches.entry(mesh).or_default().instances.push(instance);
    }

    /// Add a world-space glyph
    pub fn push_world_glyph(&mut self, font: FontAssetType, instance: GlyphInstance) {
        self.world_glyph_batches.entry(font).or_default().instances.push(instance);
    }

    /// Add a screen-space glyph
    pub fn push_screen_glyph(&mut self, font: FontAssetType, instance: GlyphInstance) {
        self.screen_glyph_batches.entry(font).or_default().instances.push(instance);
    }

    /// Total bytes the instance data occupies in the instance buffer
    pub fn instance_bytes(&self) -> usize {
        let meshes: usize = self.mesh_batches.values().map(InstanceBatch::len).sum();
        let glyphs: usize = self
            .world_glyph_batches
            .values()
            .chain(self.screen_glyph_batches.values())
            .map(InstanceBatch::len)
            .sum();
        meshes * std::mem::size_of::<MeshInstance>() + glyphs * std::mem::size_of::<GlyphInstance>()
    }
}

/// Debug visualization selected by the shaders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Lit color output
    #[default]
    Color,
    /// Linearized depth
    Depth,
    /// World-space normals
    Normals,
    /// Per-triangle colors
    Triangles,
    /// Line polygon mode
    Wireframe,
}

impl RenderMode {
    /// Every mode in cycling order
    pub const ALL: [Self; 5] = [Self::Color, Self::Depth, Self::Normals, Self::Triangles, Self::Wireframe];

    /// Upper-case name used in logs
    pub const fn name(self) -> &'static str {
        match self {
            Self::Color => "COLOR",
            Self::Depth => "DEPTH",
            Self::Normals => "NORMALS",
            Self::Triangles => "TRIANGLES",
            Self::Wireframe => "WIREFRAME",
        }
    }

    /// Value written to [`GlobalData::render_mode`]
    pub const fn shader_value(self) -> u32 {
        self as u32
    }

    /// The mode after this one, wrapping around
    pub fn next(self) -> Self {
        let index = Self::ALL.iter().position(|mode| *mode == self).unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Graphics pipelines built at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PipelineType {
    /// Lit, textured meshes
    DefaultLit,
    /// [`PipelineType::DefaultLit`] in line polygon mode
    DefaultLitWireframe,
    /// Glyph quads placed in the world
    WorldSpaceText,
    /// [`PipelineType::WorldSpaceText`] in line polygon mode
    WorldSpaceTextWireframe,
    /// Glyph quads in screen space
    ScreenSpaceText,
    /// Full-screen pass reading the geometry attachments
    PostProcessing,
}

impl PipelineType {
    /// Every pipeline type
    pub const ALL: [Self; 6] = [
        Self::DefaultLit,
        Self::DefaultLitWireframe,
        Self::WorldSpaceText,
        Self::WorldSpaceTextWireframe,
        Self::ScreenSpaceText,
        Self::PostProcessing,
    ];
}

/// Shader programs, one vertex + fragment pair each
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShaderProgramType {
    /// `DefaultLit.vert` + `DefaultLit.frag`
    DefaultLit,
    /// `WorldSpaceGlyph.vert` + `WorldSpaceGlyph.frag`
    WorldSpaceText,
    /// `ScreenSpaceGlyph.vert` + `ScreenSpaceGlyph.frag`
    ScreenSpaceText,
    /// `PostProcessing.vert` + `PostProcessing.frag`
    PostProcessing,
}

impl ShaderProgramType {
    /// Base file name of both stages
    pub const fn file_stem(self) -> &'static str {
        match self {
            Self::DefaultLit => "DefaultLit",
            Self::WorldSpaceText => "WorldSpaceGlyph",
            Self::ScreenSpaceText => "ScreenSpaceGlyph",
            Self::PostProcessing => "PostProcessing",
        }
    }
}

/// Kind of resource a descriptor binding expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundResourceType {
    /// Sampled image
    Image,
    /// Uniform buffer
    UniformBuffer,
    /// Storage buffer
    StorageBuffer,
    /// Color attachment read as an input attachment
    ColorInputAttachment,
    /// Depth attachment read as an input attachment
    DepthInputAttachment,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_struct_sizes_match_shader_layout() {
        assert_eq!(std::mem::size_of::<GlobalData>(), 224);
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
        assert_eq!(std::mem::size_of::<MeshInstance>(), 64);
        assert_eq!(std::mem::size_of::<GlyphInstance>(), 96);
    }

    #[test]
    fn test_global_data_field_offsets() {
        let data = GlobalData::default();
        let base = std::ptr::addr_of!(data) as usize;
        assert_eq!(std::ptr::addr_of!(data.light_direction) as usize - base, 176);
        assert_eq!(std::ptr::addr_of!(data.fog_params) as usize - base, 192);
        assert_eq!(std::ptr::addr_of!(data.render_mode) as usize - base, 208);
        assert_eq!(std::ptr::addr_of!(data.time) as usize - base, 212);
    }

    #[test]
    fn test_datapack_clear_keeps_keys() {
        let mut datapack = RenderableDatapack::default();
        datapack.push_mesh(MeshAssetType::Cube, MeshInstance::new(&Mat4::identity()));
        datapack.push_screen_glyph(
            FontAssetType::Default,
            GlyphInstance::new(&Mat4::identity(), Vec4::zeros(), Vec4::zeros()),
        );
        assert_eq!(datapack.instance_bytes(), 64 + 96);

        datapack.clear();
        assert_eq!(datapack.instance_bytes(), 0);
        assert!(datapack.mesh_batches.contains_key(&MeshAssetType::Cube));
        assert!(datapack.screen_glyph_batches.contains_key(&FontAssetType::Default));
    }

    #[test]
    fn test_render_mode_cycles() {
        assert_eq!(RenderMode::Color.next(), RenderMode::Depth);
        assert_eq!(RenderMode::Wireframe.next(), RenderMode::Color);
        assert_eq!(RenderMode::Normals.to_string(), "NORMALS");
        assert_eq!(RenderMode::Wireframe.shader_value(), 4);
    }
}
