//! # Render Core
//!
//! A Vulkan rendering core that draws instanced meshes and text in two
//! subpasses: a geometry pass into color and depth attachments, then a
//! full-screen post-processing pass that reads them back as input attachments.
//!
//! ## Features
//!
//! - **Resource managers**: buffers, images, shaders, pipelines, meshes and fonts
//! - **Instance batching**: one draw per mesh or font, instances staged in one buffer
//! - **Swapchain recreation**: on resize, out-of-date and suboptimal results
//! - **Parallel transforms**: frustum culling on a fixed worker pool
//! - **Headless device**: the whole frame protocol runs without a GPU
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use render_core::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RendererConfig::default();
//!     let device = Arc::new(HeadlessDevice::new(1600, 900));
//!     let mut renderer = Renderer::new(device, &config)?;
//!
//!     let mut datapack = RenderableDatapack::default();
//!     let cube = Transform::from_position(Vec3::new(0.0, 0.0, 5.0));
//!     datapack.push_mesh(MeshAssetType::Cube, MeshInstance::new(&cube.model));
//!
//!     renderer.render(&mut datapack)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod core;
pub mod foundation;
pub mod render;
pub mod scene;

/// Common imports for renderer users
pub mod prelude {
    pub use crate::{
        core::config::{AssetConfig, AssetPolicy, RendererConfig, WindowConfig},
        foundation::{
            jobs::JobPool,
            math::{Mat4, Mat4Ext, Vec2, Vec3, Vec4},
            stats::StatsTracker,
        },
        render::{
            FontAssetType, GlobalData, GlyphInstance, GpuDevice, HeadlessDevice, MeshAssetType, MeshInstance,
            RenderError, RenderMode, RenderResult, RenderableDatapack, Renderer, VulkanDevice, Window,
        },
        scene::{
            push_text, push_visible_meshes, update_screen_transforms, update_world_transforms, Text, TextSpace,
            Transform,
        },
    };
}
