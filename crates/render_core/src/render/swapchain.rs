//! Swapchain lifecycle on [`GraphicsContext`]
//!
//! Each swapchain image gets an off-screen geometry color target, a depth
//! target and a framebuffer over those two plus the presentable image.
//! Recreation tears the whole set down behind a device-idle wait and builds it
//! again at the surface's current size.

use ash::vk;

use crate::render::context::{GraphicsContext, SwapchainResources, MAX_SWAPCHAIN_IMAGES};
use crate::render::error::{VulkanError, VulkanResult};
use crate::render::render_pass::GEOMETRY_COLOR_FORMAT;
use crate::render::resources::image::ImageManager;

/// Image count to request: one more than the minimum, within both limits
pub fn desired_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        count = count.min(capabilities.max_image_count);
    }
    count.min(MAX_SWAPCHAIN_IMAGES as u32)
}

/// Y-flipped viewport covering a `width` × `height` screen
pub fn flipped_viewport(width: u32, height: u32) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: height as f32,
        width: width as f32,
        height: -(height as f32),
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

impl GraphicsContext {
    /// Create the swapchain and every per-image attachment and framebuffer
    ///
    /// Clears [`GraphicsContext::swapchain_stale`].
    pub fn create_swapchain(&mut self, images: &ImageManager) -> VulkanResult<()> {
        let device = self.device_arc();
        let device = device.as_ref();

        let capabilities = device.surface_capabilities()?;
        let extent = if capabilities.current_extent.width == u32::MAX {
            // Surface size is decided by the swapchain
            vk::Extent2D {
                width: self
                    .screen_size
                    .width
                    .clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
                height: self
                    .screen_size
                    .height
                    .clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
            }
        } else {
            capabilities.current_extent
        };

        let present_mode = if self.vsync {
            vk::PresentModeKHR::FIFO
        } else {
            vk::PresentModeKHR::IMMEDIATE
        };

        let swapchain_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(device.surface())
            .min_image_count(desired_image_count(&capabilities))
            .image_format(self.surface_format.format)
            .image_color_space(self.surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        self.swapchain.handle = device.create_swapchain(&swapchain_info)?;
        self.swapchain.extent = extent;
        self.screen_size = extent;
        self.viewport = flipped_viewport(extent.width, extent.height);
        self.scissor = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent,
        };

        let presentable = device.swapchain_images(self.swapchain.handle)?;
        if presentable.len() > MAX_SWAPCHAIN_IMAGES {
            return Err(VulkanError::InitializationFailed(format!(
                "swapchain has {} images, at most {MAX_SWAPCHAIN_IMAGES} are supported",
                presentable.len()
            )));
        }

        // Pushed one by one so a failure part-way leaves only valid entries to destroy
        for handle in presentable {
            let mut color = images.allocate_image(
                extent.width,
                extent.height,
                1,
                GEOMETRY_COLOR_FORMAT,
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::INPUT_ATTACHMENT,
            )?;
            let view = images.create_image_view(&mut color, vk::ImageAspectFlags::COLOR);
            self.swapchain.geometry_color_images.push(color);
            view?;

            let mut depth = images.allocate_image(
                extent.width,
                extent.height,
                1,
                self.depth_format,
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::INPUT_ATTACHMENT,
            )?;
            let view = images.create_image_view(&mut depth, vk::ImageAspectFlags::DEPTH);
            self.swapchain.depth_images.push(depth);
            view?;

            let mut swapchain_image =
                images.wrap_image(handle, extent.width, extent.height, self.surface_format.format);
            let view = images.create_image_view(&mut swapchain_image, vk::ImageAspectFlags::COLOR);
            self.swapchain.swapchain_images.push(swapchain_image);
            view?;

            let attachments = [color.view, depth.view, swapchain_image.view];
            let framebuffer_info = vk::FramebufferCreateInfo::builder()
                .render_pass(self.render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);
            self.swapchain.framebuffers.push(device.create_framebuffer(&framebuffer_info)?);
        }

        self.swapchain_stale = false;
        log::debug!(
            "Swapchain created: {}x{}, {} images, {:?}",
            extent.width,
            extent.height,
            self.swapchain.image_count(),
            present_mode
        );
        Ok(())
    }

    /// Destroy the swapchain and every per-image resource
    pub fn destroy_swapchain(&mut self) {
        let device = self.device_arc();
        let device = device.as_ref();
        let mut swapchain = std::mem::take(&mut self.swapchain);

        for image in swapchain
            .geometry_color_images
            .iter_mut()
            .chain(swapchain.depth_images.iter_mut())
            .chain(swapchain.swapchain_images.iter_mut())
        {
            image.destroy(device);
        }
        for framebuffer in swapchain.framebuffers.drain(..) {
            device.destroy_framebuffer(framebuffer);
        }
        device.destroy_swapchain(swapchain.handle);
        self.swapchain = SwapchainResources {
            extent: swapchain.extent,
            ..SwapchainResources::default()
        };
    }

    /// Wait for the device, then rebuild the swapchain set at the current surface size
    pub fn recreate_swapchain(&mut self, images: &ImageManager) -> VulkanResult<()> {
        log::debug!("Recreating swapchain");
        self.device().device_wait_idle()?;
        self.destroy_swapchain();
        self.create_swapchain(images)
    }

    /// Record a new drawable size and flag the swapchain for recreation
    pub fn set_screen_size(&mut self, width: u32, height: u32) {
        self.screen_size = vk::Extent2D { width, height };
        self.viewport = flipped_viewport(width, height);
        self.scissor = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: self.screen_size,
        };
        self.swapchain_stale = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::core::config::RendererConfig;
    use crate::render::backends::{GpuDevice, HeadlessDevice};
    use crate::render::resources::buffer::BufferManager;

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            ..Default::default()
        }
    }

    #[test]
    fn test_image_count_is_min_plus_one_within_limits() {
        assert_eq!(desired_image_count(&caps(2, 0)), 3);
        assert_eq!(desired_image_count(&caps(2, 2)), 2);
        assert_eq!(desired_image_count(&caps(4, 8)), 4);
        assert_eq!(desired_image_count(&caps(1, 0)), 2);
    }

    #[test]
    fn test_viewport_is_flipped() {
        let viewport = flipped_viewport(1600, 900);
        assert_eq!(viewport.y, 900.0);
        assert_eq!(viewport.height, -900.0);
        assert_eq!(viewport.width, 1600.0);
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));
    }

    #[test]
    fn test_recreate_follows_surface_size_and_keeps_object_count() {
        let device = Arc::new(HeadlessDevice::new(800, 600));
        let buffers = BufferManager::new(device.clone());
        let images = ImageManager::new(device.clone());
        let mut context =
            GraphicsContext::new(device.clone(), &RendererConfig::default(), &buffers, &images).unwrap();
        let live = device.live_object_count();
        let old_framebuffers = context.swapchain.framebuffers.clone();

        device.set_surface_extent(1024, 768);
        context.set_screen_size(1024, 768);
        assert!(context.swapchain_stale);

        context.recreate_swapchain(&images).unwrap();
        assert!(!context.swapchain_stale);
        assert_eq!(context.swapchain.extent, vk::Extent2D { width: 1024, height: 768 });
        assert_eq!(context.scissor.extent, context.swapchain.extent);
        assert_eq!(device.live_object_count(), live);
        assert!(context
            .swapchain
            .framebuffers
            .iter()
            .all(|framebuffer| !old_framebuffers.contains(framebuffer)));
        assert_ne!(context.swapchain.handle, vk::SwapchainKHR::null());
        assert!(device.swapchain_images(context.swapchain.handle).is_ok());
    }

    #[test]
    fn test_too_many_driver_images_is_an_error() {
        let device = Arc::new(HeadlessDevice::new(800, 600));
        let buffers = BufferManager::new(device.clone());
        let images = ImageManager::new(device.clone());
        let mut context =
            GraphicsContext::new(device.clone(), &RendererConfig::default(), &buffers, &images).unwrap();

        device.set_extra_swapchain_images(MAX_SWAPCHAIN_IMAGES as u32);
        context.set_screen_size(800, 600);

        let result = context.recreate_swapchain(&images);
        assert!(matches!(result, Err(VulkanError::InitializationFailed(_))));
    }

    #[test]
    fn test_swapchain_images_are_color_attachments_only() {
        let device = Arc::new(HeadlessDevice::new(800, 600));
        let buffers = BufferManager::new(device.clone());
        let images = ImageManager::new(device.clone());
        let _context = GraphicsContext::new(device.clone(), &RendererConfig::default(), &buffers, &images).unwrap();

        assert_eq!(device.last_swapchain_usage(), Some(vk::ImageUsageFlags::COLOR_ATTACHMENT));
    }
}
