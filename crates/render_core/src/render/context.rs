//! GraphicsContext - the GPU handle set shared by every manager
//!
//! The renderer owns exactly one context. Managers borrow it for the duration
//! of a call: image uploads use its staging buffer and command pool, pipelines
//! use its render pass and descriptor pool, the frame loop uses everything.
//!
//! # Teardown
//!
//! Dropping the context waits for the device to go idle and then releases the
//! swapchain set, buffers, sync objects, pools, sampler and render pass.
//! Objects owned by managers must be gone before the context is dropped.

use std::sync::Arc;

use ash::vk;

use crate::core::config::RendererConfig;
use crate::render::backends::{EnabledFeatures, GpuDevice};
use crate::render::error::VulkanResult;
use crate::render::render_pass::create_render_pass;
use crate::render::resources::buffer::{Buffer, BufferManager};
use crate::render::resources::image::{Image, ImageManager};
use crate::render::types::{GlobalData, GlyphInstance};
use crate::render::utils::{find_depth_format, find_surface_format};

/// Upper bound on swapchain images
pub const MAX_SWAPCHAIN_IMAGES: usize = 4;

/// Descriptor sets the pool can hand out, one per pipeline with headroom
const MAX_DESCRIPTOR_SETS: u32 = 16;

/// Swapchain and the per-image attachments built on top of it
///
/// Every per-image vector has one entry per swapchain image and is only valid
/// between `create_swapchain` and the next `destroy_swapchain`.
#[derive(Debug, Default)]
pub struct SwapchainResources {
    /// Swapchain handle
    pub handle: vk::SwapchainKHR,
    /// Size of every image in the set
    pub extent: vk::Extent2D,
    /// Off-screen color targets written by the geometry subpass
    pub geometry_color_images: Vec<Image>,
    /// Depth targets
    pub depth_images: Vec<Image>,
    /// Presentable images, wrapped
    pub swapchain_images: Vec<Image>,
    /// One framebuffer per image over color, depth and swapchain views
    pub framebuffers: Vec<vk::Framebuffer>,
}

impl SwapchainResources {
    /// Number of images in the set
    pub fn image_count(&self) -> usize {
        self.framebuffers.len()
    }
}

/// Device handles, per-frame sync objects and shared GPU buffers
pub struct GraphicsContext {
    device: Arc<dyn GpuDevice>,

    /// Presentation format
    pub surface_format: vk::SurfaceFormatKHR,
    /// Depth attachment format
    pub depth_format: vk::Format,
    /// Optional features the device enabled
    pub enabled_features: EnabledFeatures,

    /// Geometry + post-processing render pass
    pub render_pass: vk::RenderPass,
    /// Pool for the frame command buffer and one-shot uploads
    pub command_pool: vk::CommandPool,
    /// The single primary command buffer re-recorded every frame
    pub command_buffer: vk::CommandBuffer,
    /// Nearest-filtering sampler shared by all textures
    pub sampler: vk::Sampler,
    /// Pool every pipeline's descriptor set comes from
    pub descriptor_pool: vk::DescriptorPool,

    /// Swapchain set
    pub swapchain: SwapchainResources,
    /// Set when acquire, present or a resize reported a stale swapchain
    pub swapchain_stale: bool,
    /// FIFO instead of IMMEDIATE presentation
    pub vsync: bool,

    /// Signaled when the acquired image is ready
    pub acquire_semaphore: vk::Semaphore,
    /// Signaled when rendering finished, waited on by present
    pub submit_semaphore: vk::Semaphore,
    /// Signaled when the frame's submission completed
    pub in_flight_fence: vk::Fence,

    /// Y-flipped viewport covering the screen
    pub viewport: vk::Viewport,
    /// Scissor covering the screen
    pub scissor: vk::Rect2D,
    /// Requested drawable size
    pub screen_size: vk::Extent2D,

    /// Host-visible staging for texture uploads
    pub image_staging_buffer: Buffer,
    /// Host-visible staging for [`GlobalData`]
    pub global_staging_buffer: Buffer,
    /// Device-local uniform buffer holding [`GlobalData`]
    pub global_buffer: Buffer,
    /// Host-visible staging for per-frame instance data
    pub instance_staging_buffer: Buffer,
    /// Device-local storage buffer holding per-frame instance data
    pub instance_buffer: Buffer,
}

impl GraphicsContext {
    /// Bring up everything the frame loop needs that does not depend on assets
    ///
    /// Order: formats, render pass, command pool, sampler, swapchain,
    /// descriptor pool, buffers, command buffer, semaphores and the fence
    /// (created signaled so the first frame does not block). If a step fails
    /// the partly built context is dropped and releases what it created.
    pub fn new(
        device: Arc<dyn GpuDevice>,
        config: &RendererConfig,
        buffers: &BufferManager,
        images: &ImageManager,
    ) -> VulkanResult<Self> {
        let enabled_features = device.capabilities().enabled_features;
        let mut context = Self {
            device,
            surface_format: vk::SurfaceFormatKHR::default(),
            depth_format: vk::Format::UNDEFINED,
            enabled_features,
            render_pass: vk::RenderPass::null(),
            command_pool: vk::CommandPool::null(),
            command_buffer: vk::CommandBuffer::null(),
            sampler: vk::Sampler::null(),
            descriptor_pool: vk::DescriptorPool::null(),
            swapchain: SwapchainResources::default(),
            swapchain_stale: false,
            vsync: config.vsync,
            acquire_semaphore: vk::Semaphore::null(),
            submit_semaphore: vk::Semaphore::null(),
            in_flight_fence: vk::Fence::null(),
            viewport: vk::Viewport::default(),
            scissor: vk::Rect2D::default(),
            screen_size: vk::Extent2D {
                width: config.window.width,
                height: config.window.height,
            },
            image_staging_buffer: Buffer::default(),
            global_staging_buffer: Buffer::default(),
            global_buffer: Buffer::default(),
            instance_staging_buffer: Buffer::default(),
            instance_buffer: Buffer::default(),
        };

        let device = context.device.clone();
        let device = device.as_ref();

        context.surface_format = find_surface_format(&device.surface_formats()?);
        context.depth_format = find_depth_format(device)?;
        log::debug!(
            "Surface format {:?}, depth format {:?}",
            context.surface_format.format,
            context.depth_format
        );

        context.render_pass = create_render_pass(device, context.surface_format.format, context.depth_format)?;
        context.command_pool = device.create_command_pool(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)?;
        context.sampler = Self::create_sampler(device)?;

        context.create_swapchain(images)?;
        context.descriptor_pool = Self::create_descriptor_pool(device)?;
        context.create_buffers(config, buffers)?;

        context.command_buffer = device.allocate_command_buffer(context.command_pool)?;
        context.acquire_semaphore = device.create_semaphore()?;
        context.submit_semaphore = device.create_semaphore()?;
        context.in_flight_fence = device.create_fence(true)?;

        Ok(context)
    }

    /// Device the context was built on
    pub fn device(&self) -> &dyn GpuDevice {
        self.device.as_ref()
    }

    /// Shared handle to the device
    pub fn device_arc(&self) -> Arc<dyn GpuDevice> {
        self.device.clone()
    }

    fn create_sampler(device: &dyn GpuDevice) -> VulkanResult<vk::Sampler> {
        let capabilities = device.capabilities();
        let anisotropy = capabilities.enabled_features.sampler_anisotropy;

        let sampler_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::NEAREST)
            .min_filter(vk::Filter::NEAREST)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(anisotropy)
            .max_anisotropy(if anisotropy {
                capabilities.max_sampler_anisotropy.min(16.0)
            } else {
                1.0
            })
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK);

        device.create_sampler(&sampler_info)
    }

    fn create_descriptor_pool(device: &dyn GpuDevice) -> VulkanResult<vk::DescriptorPool> {
        let pool_sizes = [
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::DescriptorType::STORAGE_BUFFER,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            vk::DescriptorType::INPUT_ATTACHMENT,
        ]
        .map(|ty| vk::DescriptorPoolSize {
            ty,
            descriptor_count: MAX_DESCRIPTOR_SETS,
        });

        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(MAX_DESCRIPTOR_SETS)
            .pool_sizes(&pool_sizes);

        device.create_descriptor_pool(&pool_info)
    }

    fn create_buffers(&mut self, config: &RendererConfig, buffers: &BufferManager) -> VulkanResult<()> {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let global_size = std::mem::size_of::<GlobalData>() as vk::DeviceSize;
        let instance_size =
            vk::DeviceSize::from(config.max_entities) * std::mem::size_of::<GlyphInstance>() as vk::DeviceSize;

        self.image_staging_buffer =
            buffers.allocate_buffer(config.staging_buffer_size, vk::BufferUsageFlags::TRANSFER_SRC, host)?;
        self.global_staging_buffer = buffers.allocate_buffer(global_size, vk::BufferUsageFlags::TRANSFER_SRC, host)?;
        self.global_buffer = buffers.allocate_buffer(
            global_size,
            vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        self.instance_staging_buffer =
            buffers.allocate_buffer(instance_size, vk::BufferUsageFlags::TRANSFER_SRC, host)?;
        self.instance_buffer = buffers.allocate_buffer(
            instance_size,
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        Ok(())
    }
}

impl Drop for GraphicsContext {
    fn drop(&mut self) {
        let device = self.device.clone();
        let device = device.as_ref();

        if let Err(e) = device.device_wait_idle() {
            log::error!("Failed to wait for device idle during teardown: {e}");
        }

        self.destroy_swapchain();

        for buffer in [
            &mut self.image_staging_buffer,
            &mut self.global_staging_buffer,
            &mut self.global_buffer,
            &mut self.instance_staging_buffer,
            &mut self.instance_buffer,
        ] {
            buffer.destroy(device);
        }

        device.destroy_fence(self.in_flight_fence);
        device.destroy_semaphore(self.submit_semaphore);
        device.destroy_semaphore(self.acquire_semaphore);
        if self.command_buffer != vk::CommandBuffer::null() {
            device.free_command_buffer(self.command_pool, self.command_buffer);
        }
        device.destroy_descriptor_pool(self.descriptor_pool);
        device.destroy_sampler(self.sampler);
        device.destroy_command_pool(self.command_pool);
        device.destroy_render_pass(self.render_pass);

        log::debug!("Graphics context destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::HeadlessDevice;

    fn build(width: u32, height: u32) -> (Arc<HeadlessDevice>, BufferManager, ImageManager, GraphicsContext) {
        let device = Arc::new(HeadlessDevice::new(width, height));
        let buffers = BufferManager::new(device.clone());
        let images = ImageManager::new(device.clone());
        let config = RendererConfig::default().with_window_size(width, height);
        let context = GraphicsContext::new(device.clone(), &config, &buffers, &images).unwrap();
        (device, buffers, images, context)
    }

    #[test]
    fn test_context_builds_full_swapchain_set() {
        let (_device, _buffers, _images, context) = build(1600, 900);
        let swapchain = &context.swapchain;

        assert!(swapchain.image_count() >= 2 && swapchain.image_count() <= MAX_SWAPCHAIN_IMAGES);
        assert_eq!(swapchain.geometry_color_images.len(), swapchain.image_count());
        assert_eq!(swapchain.depth_images.len(), swapchain.image_count());
        assert_eq!(swapchain.swapchain_images.len(), swapchain.image_count());
        assert_eq!(swapchain.extent, vk::Extent2D { width: 1600, height: 900 });
        assert_eq!(context.surface_format.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(context.depth_format, vk::Format::D32_SFLOAT);
    }

    #[test]
    fn test_buffers_are_sized_from_config() {
        let (_device, _buffers, _images, context) = build(64, 64);
        let config = RendererConfig::default();

        assert_eq!(context.image_staging_buffer.size, config.staging_buffer_size);
        assert_eq!(context.global_buffer.size, std::mem::size_of::<GlobalData>() as vk::DeviceSize);
        assert_eq!(
            context.instance_buffer.size,
            u64::from(config.max_entities) * std::mem::size_of::<GlyphInstance>() as u64
        );
        assert_eq!(context.instance_staging_buffer.size, context.instance_buffer.size);
    }

    #[test]
    fn test_drop_releases_every_object() {
        let (device, buffers, images, context) = build(32, 32);
        assert!(device.live_object_count() > 0);

        drop(context);
        drop(images);
        drop(buffers);
        assert_eq!(device.live_object_count(), 0);
    }
}
