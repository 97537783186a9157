//! # Rendering System
//!
//! Vulkan rendering core: a device seam with an ash-backed and a headless
//! implementation, the shared [`GraphicsContext`], GPU resource managers and
//! the instanced two-subpass [`Renderer`].
//!
//! ## Architecture
//!
//! - **Backends**: [`GpuDevice`] trait, [`VulkanDevice`] and [`HeadlessDevice`]
//! - **Context**: formats, render pass, swapchain set, sync objects, shared buffers
//! - **Resources**: buffer, image, shader, pipeline, mesh and font managers
//! - **Renderer**: frame protocol, instance batching, swapchain recreation
//!
//! The world talks to the renderer through [`RenderableDatapack`] and
//! [`GlobalData`] only.

pub mod backends;
pub mod context;
pub mod culling;
pub mod error;
pub mod gpu_timer;
pub mod render_pass;
pub mod renderer;
pub mod resources;
pub mod swapchain;
pub mod types;
pub mod utils;

pub use backends::{
    DeviceCapabilities, EnabledFeatures, GpuDevice, HeadlessDevice, RecordedCommand, VulkanDevice, Window, WindowEvent,
};
pub use context::GraphicsContext;
pub use error::{RenderError, RenderResult, VulkanError, VulkanResult};
pub use renderer::Renderer;
pub use types::{
    FontAssetType, GlobalData, GlyphInstance, InstanceBatch, MeshAssetType, MeshInstance, PipelineType, RenderMode,
    RenderableDatapack, TextureType, Vertex,
};
