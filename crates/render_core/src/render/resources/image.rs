//! Image and texture management
//!
//! Owned images get device-local memory and are uploaded through the context's
//! shared image staging buffer with a blocking one-shot command buffer. That
//! path is for load time only; nothing per-frame goes through it.
//!
//! Swapchain images are wrapped instead: the presentation engine owns the
//! handle and only the view belongs to us.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ash::vk;
use thiserror::Error;

use super::buffer::BufferManager;
use super::dds::DdsImage;
use crate::core::config::{AssetConfig, AssetPolicy};
use crate::render::backends::GpuDevice;
use crate::render::context::GraphicsContext;
use crate::render::error::{VulkanError, VulkanResult};
use crate::render::types::TextureType;
use crate::render::utils::{find_memory_type, format_size, SingleTimeCommands};

/// Texture load and upload errors
#[derive(Error, Debug)]
pub enum ImageError {
    /// The file could not be read
    #[error("Failed to read image {path}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The file is not a DDS container this renderer understands
    #[error("Invalid DDS file: {0}")]
    InvalidDds(String),

    /// Pixel data does not match the requested dimensions or does not fit the staging buffer
    #[error("Invalid image data: {0}")]
    InvalidData(String),

    /// A device call failed during allocation or upload
    #[error(transparent)]
    Device(#[from] VulkanError),
}

/// GPU image, its default view and its memory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Image {
    /// Image handle
    pub handle: vk::Image,
    /// View over every mip level
    pub view: vk::ImageView,
    /// Dedicated allocation, null for wrapped images
    pub memory: vk::DeviceMemory,
    /// Texel format
    pub format: vk::Format,
    /// Width of mip 0
    pub width: u32,
    /// Height of mip 0
    pub height: u32,
    /// Mip levels
    pub mip_levels: u32,
    /// Handle belongs to someone else (swapchain images)
    pub external: bool,
}

impl Image {
    /// Destroy whatever this image owns, leaving the handles null
    ///
    /// View, image and memory are each checked separately, so partially built
    /// and wrapped images are handled. Calling this twice is harmless.
    pub fn destroy(&mut self, device: &dyn GpuDevice) {
        if self.view != vk::ImageView::null() {
            device.destroy_image_view(self.view);
            self.view = vk::ImageView::null();
        }
        if self.handle != vk::Image::null() {
            if !self.external {
                device.destroy_image(self.handle);
            }
            self.handle = vk::Image::null();
        }
        if self.memory != vk::DeviceMemory::null() {
            device.free_memory(self.memory);
            self.memory = vk::DeviceMemory::null();
        }
    }
}

/// Byte offset and extent of every mip level in a tightly packed chain
pub fn mip_chain_layout(
    width: u32,
    height: u32,
    mip_levels: u32,
    format: vk::Format,
) -> Vec<(vk::DeviceSize, u32, u32)> {
    let texel_size = vk::DeviceSize::from(format_size(format));
    let (mut offset, mut mip_width, mut mip_height) = (0, width, height);

    (0..mip_levels)
        .map(|_| {
            let level = (offset, mip_width, mip_height);
            offset += vk::DeviceSize::from(mip_width) * vk::DeviceSize::from(mip_height) * texel_size;
            mip_width = (mip_width / 2).max(1);
            mip_height = (mip_height / 2).max(1);
            level
        })
        .collect()
}

/// Total bytes of a tightly packed mip chain
pub fn mip_chain_size(width: u32, height: u32, mip_levels: u32, format: vk::Format) -> vk::DeviceSize {
    let texel_size = vk::DeviceSize::from(format_size(format));
    mip_chain_layout(width, height, mip_levels, format)
        .last()
        .map_or(0, |(offset, w, h)| offset + vk::DeviceSize::from(*w) * vk::DeviceSize::from(*h) * texel_size)
}

/// Allocates images, uploads pixel data and owns the named textures
pub struct ImageManager {
    device: Arc<dyn GpuDevice>,
    buffers: BufferManager,
    textures: HashMap<TextureType, Image>,
}

impl ImageManager {
    /// Create a manager for `device`
    pub fn new(device: Arc<dyn GpuDevice>) -> Self {
        Self {
            buffers: BufferManager::new(device.clone()),
            device,
            textures: HashMap::new(),
        }
    }

    /// Create an image with bound device-local memory, without a view
    pub fn allocate_image(
        &self,
        width: u32,
        height: u32,
        mip_levels: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> VulkanResult<Image> {
        let device = self.device.as_ref();

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D { width, height, depth: 1 })
            .mip_levels(mip_levels)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let mut image = Image {
            handle: device.create_image(&image_info)?,
            format,
            width,
            height,
            mip_levels,
            ..Image::default()
        };

        let requirements = device.image_memory_requirements(image.handle);
        let allocated = find_memory_type(
            &device.capabilities().memory_properties,
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .and_then(|memory_type_index| {
            let alloc_info = vk::MemoryAllocateInfo::builder()
                .allocation_size(requirements.size)
                .memory_type_index(memory_type_index);
            device.allocate_memory(&alloc_info)
        })
        .and_then(|memory| {
            image.memory = memory;
            device.bind_image_memory(image.handle, memory, 0)
        });

        if let Err(e) = allocated {
            image.destroy(device);
            return Err(e);
        }

        Ok(image)
    }

    /// Wrap an image owned by the presentation engine
    ///
    /// No memory is allocated and [`Image::destroy`] will leave the handle alone.
    pub fn wrap_image(&self, handle: vk::Image, width: u32, height: u32, format: vk::Format) -> Image {
        Image {
            handle,
            format,
            width,
            height,
            mip_levels: 1,
            external: true,
            ..Image::default()
        }
    }

    /// Create the 2D view covering every mip level of `image`
    pub fn create_image_view(&self, image: &mut Image, aspect_mask: vk::ImageAspectFlags) -> VulkanResult<()> {
        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image.handle)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(image.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask,
                base_mip_level: 0,
                level_count: image.mip_levels,
                base_array_layer: 0,
                layer_count: 1,
            });
        image.view = self.device.create_image_view(&view_info)?;
        Ok(())
    }

    /// Create a sampled image from a packed mip chain
    ///
    /// `data` is copied into the context's image staging buffer before this
    /// returns, so the caller may drop it afterwards.
    pub fn create_image(
        &self,
        context: &GraphicsContext,
        data: &[u8],
        width: u32,
        height: u32,
        mip_levels: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> Result<Image, ImageError> {
        let chain_size = mip_chain_size(width, height, mip_levels, format);
        if (data.len() as vk::DeviceSize) < chain_size {
            return Err(ImageError::InvalidData(format!(
                "{width}x{height} with {mip_levels} mips needs {chain_size} bytes, got {}",
                data.len()
            )));
        }
        if chain_size > context.image_staging_buffer.size {
            return Err(ImageError::InvalidData(format!(
                "{chain_size} bytes exceed the {} byte staging buffer",
                context.image_staging_buffer.size
            )));
        }

        self.buffers
            .upload_bytes(&context.image_staging_buffer, &data[..chain_size as usize], 0)?;

        let mut image = self.allocate_image(width, height, mip_levels, format, usage)?;
        if let Err(e) = self.upload_image_to_gpu(context, &mut image) {
            image.destroy(self.device.as_ref());
            return Err(e.into());
        }

        Ok(image)
    }

    /// Load a DDS file and create a sampled image from it
    pub fn create_image_from_file(
        &self,
        context: &GraphicsContext,
        path: &Path,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> Result<Image, ImageError> {
        let bytes = std::fs::read(path).map_err(|source| ImageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let dds = DdsImage::parse(&bytes)?;
        self.create_image(context, dds.data, dds.width, dds.height, dds.mip_levels, format, usage)
    }

    /// Copy the staged mip chain into `image` and create its view
    ///
    /// Records transfer-dst transition, one copy per mip, shader-read-only
    /// transition; submits and waits.
    pub fn upload_image_to_gpu(&self, context: &GraphicsContext, image: &mut Image) -> VulkanResult<()> {
        let device = self.device.as_ref();
        let commands = SingleTimeCommands::begin(device, context.command_pool)?;
        let cmd = commands.handle();

        let range = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: image.mip_levels,
            base_array_layer: 0,
            layer_count: 1,
        };

        let to_transfer = vk::ImageMemoryBarrier::builder()
            .image(image.handle)
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .subresource_range(range)
            .build();
        device.cmd_image_barrier(
            cmd,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::TRANSFER,
            &to_transfer,
        );

        for (mip_level, (offset, width, height)) in
            mip_chain_layout(image.width, image.height, image.mip_levels, image.format)
                .into_iter()
                .enumerate()
        {
            let region = vk::BufferImageCopy {
                buffer_offset: offset,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: mip_level as u32,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                image_offset: vk::Offset3D::default(),
                image_extent: vk::Extent3D { width, height, depth: 1 },
            };
            device.cmd_copy_buffer_to_image(
                cmd,
                context.image_staging_buffer.handle,
                image.handle,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }

        let to_shader_read = vk::ImageMemoryBarrier {
            old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            src_access_mask: vk::AccessFlags::TRANSFER_WRITE,
            dst_access_mask: vk::AccessFlags::SHADER_READ,
            ..to_transfer
        };
        device.cmd_image_barrier(
            cmd,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            &to_shader_read,
        );

        self.create_image_view(image, vk::ImageAspectFlags::COLOR)?;
        commands.submit()
    }

    /// 1×1 RGBA8 texture of a single color
    pub fn create_solid_color(&self, context: &GraphicsContext, rgba: [u8; 4]) -> Result<Image, ImageError> {
        self.create_image(
            context,
            &rgba,
            1,
            1,
            1,
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        )
    }

    /// Load every block texture from `assets.texture_dir`
    ///
    /// With [`AssetPolicy::Fallback`] a texture that fails to load is replaced
    /// by a 1×1 white texture; with [`AssetPolicy::Strict`] the first failure
    /// is returned.
    pub fn load_textures(&mut self, context: &GraphicsContext, assets: &AssetConfig) -> Result<(), ImageError> {
        let usage = vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED;

        for texture_type in [TextureType::BlockDirt, TextureType::BlockSand, TextureType::BlockWhiteTile] {
            let Some(file_name) = texture_type.file_name() else {
                continue;
            };
            let path = assets.texture_dir.join(file_name);

            let image = match self.create_image_from_file(context, &path, vk::Format::R8G8B8A8_UNORM, usage) {
                Ok(image) => {
                    log::info!("Image Manager: Loading Asset \"{}\"", path.display());
                    image
                }
                Err(e) if assets.policy == AssetPolicy::Fallback => {
                    log::error!("Image Manager: {e}, using a white placeholder");
                    self.create_solid_color(context, [255; 4])?
                }
                Err(e) => return Err(e),
            };
            self.set_texture(texture_type, image);
        }

        Ok(())
    }

    /// Register `image` as the texture for `texture_type`, destroying any previous one
    pub fn set_texture(&mut self, texture_type: TextureType, image: Image) {
        if let Some(mut previous) = self.textures.insert(texture_type, image) {
            previous.destroy(self.device.as_ref());
        }
    }

    /// Texture registered for `texture_type`
    pub fn texture(&self, texture_type: TextureType) -> Option<&Image> {
        self.textures.get(&texture_type)
    }

    /// Free `image`
    pub fn destroy_image(&self, image: &mut Image) {
        image.destroy(self.device.as_ref());
    }
}

impl Drop for ImageManager {
    fn drop(&mut self) {
        for image in self.textures.values_mut() {
            image.destroy(self.device.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::RendererConfig;
    use crate::render::backends::{HeadlessDevice, RecordedCommand};
    use crate::render::resources::dds;
    use ash::vk::Handle;

    fn setup() -> (Arc<HeadlessDevice>, BufferManager, ImageManager, GraphicsContext) {
        let device = Arc::new(HeadlessDevice::new(320, 240));
        let buffers = BufferManager::new(device.clone());
        let images = ImageManager::new(device.clone());
        let context = GraphicsContext::new(device.clone(), &RendererConfig::default(), &buffers, &images).unwrap();
        (device, buffers, images, context)
    }

    #[test]
    fn test_mip_chain_layout_halves_and_floors_at_one() {
        let layout = mip_chain_layout(8, 2, 4, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(layout, vec![(0, 8, 2), (64, 4, 1), (80, 2, 1), (88, 1, 1)]);
        assert_eq!(mip_chain_size(8, 2, 4, vk::Format::R8G8B8A8_UNORM), 92);
    }

    #[test]
    fn test_upload_copies_each_mip_at_accumulated_offset() {
        let (device, _buffers, images, context) = setup();
        device.clear_commands();

        let pixels = vec![0xAB; mip_chain_size(4, 4, 3, vk::Format::R8G8B8A8_UNORM) as usize];
        let mut image = images
            .create_image(
                &context,
                &pixels,
                4,
                4,
                3,
                vk::Format::R8G8B8A8_UNORM,
                vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            )
            .unwrap();

        let copies: Vec<(u32, vk::DeviceSize, u32)> = device
            .commands()
            .into_iter()
            .filter_map(|command| match command {
                RecordedCommand::CopyBufferToImage {
                    mip_level,
                    buffer_offset,
                    extent,
                    ..
                } => Some((mip_level, buffer_offset, extent.width)),
                _ => None,
            })
            .collect();
        assert_eq!(copies, vec![(0, 0, 4), (1, 64, 2), (2, 80, 1)]);

        let layouts: Vec<vk::ImageLayout> = device
            .commands()
            .into_iter()
            .filter_map(|command| match command {
                RecordedCommand::ImageBarrier { new_layout, .. } => Some(new_layout),
                _ => None,
            })
            .collect();
        assert_eq!(
            layouts,
            vec![vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL]
        );
        assert_ne!(image.view, vk::ImageView::null());

        images.destroy_image(&mut image);
    }

    #[test]
    fn test_short_pixel_data_is_rejected() {
        let (_device, _buffers, images, context) = setup();
        let result = images.create_image(
            &context,
            &[0; 12],
            2,
            2,
            1,
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::SAMPLED,
        );
        assert!(matches!(result, Err(ImageError::InvalidData(_))));
    }

    #[test]
    fn test_wrapped_image_keeps_external_handle() {
        let (device, _buffers, images, _context) = setup();
        let live_before = device.live_object_count();

        let mut image = images.wrap_image(vk::Image::from_raw(0xDEAD), 16, 16, vk::Format::B8G8R8A8_SRGB);
        images.create_image_view(&mut image, vk::ImageAspectFlags::COLOR).unwrap();
        assert_eq!(device.live_object_count(), live_before + 1);

        images.destroy_image(&mut image);
        assert_eq!(device.live_object_count(), live_before);
        assert_eq!(image.memory, vk::DeviceMemory::null());
    }

    #[test]
    fn test_missing_texture_falls_back_to_white() {
        let (_device, _buffers, mut images, context) = setup();
        let assets = AssetConfig {
            texture_dir: PathBuf::from("does/not/exist"),
            ..AssetConfig::default()
        };

        images.load_textures(&context, &assets).unwrap();
        let white = images.texture(TextureType::BlockWhiteTile).unwrap();
        assert_eq!((white.width, white.height), (1, 1));
    }

    #[test]
    fn test_missing_texture_is_fatal_when_strict() {
        let (_device, _buffers, mut images, context) = setup();
        let assets = AssetConfig {
            texture_dir: PathBuf::from("does/not/exist"),
            ..AssetConfig::default()
        }
        .with_policy(AssetPolicy::Strict);

        let result = images.load_textures(&context, &assets);
        assert!(matches!(result, Err(ImageError::Io { .. })));
    }

    #[test]
    fn test_texture_loads_from_dds_file() {
        let (_device, _buffers, mut images, context) = setup();
        let dir = std::env::temp_dir().join(format!("render_core_dds_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        for texture_type in [TextureType::BlockDirt, TextureType::BlockSand, TextureType::BlockWhiteTile] {
            let file = dds::encode(2, 2, 2, &[0x7F; 16 + 4]);
            std::fs::write(dir.join(texture_type.file_name().unwrap()), file).unwrap();
        }

        let assets = AssetConfig {
            texture_dir: dir.clone(),
            ..AssetConfig::default()
        }
        .with_policy(AssetPolicy::Strict);
        images.load_textures(&context, &assets).unwrap();

        let dirt = images.texture(TextureType::BlockDirt).unwrap();
        assert_eq!((dirt.width, dirt.height, dirt.mip_levels), (2, 2, 2));

        std::fs::remove_dir_all(&dir).ok();
    }
}
