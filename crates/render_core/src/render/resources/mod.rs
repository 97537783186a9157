//! GPU resource managers
//!
//! Each manager owns the driver objects it creates and releases them when
//! dropped. Managers that need the shared staging buffers or command pool
//! borrow the [`GraphicsContext`](crate::render::context::GraphicsContext) per call.

pub mod buffer;
pub mod dds;
pub mod font;
pub mod image;
pub mod mesh;
pub mod pipeline;
pub mod shader;

pub use buffer::{Buffer, BufferManager};
pub use font::{FontAtlas, FontError, FontManager, GlyphData};
pub use image::{Image, ImageError, ImageManager};
pub use mesh::{MeshAsset, MeshGpuData, MeshManager};
pub use pipeline::{PipelineCreateInfo, PipelineManager, PipelineMask};
pub use shader::{ShaderError, ShaderManager, ShaderModule, ShaderProgram};
