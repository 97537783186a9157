//! Vulkan helper functions shared by the resource managers
//!
//! Format tables, memory type lookup, reflection merging and one-shot command
//! buffers.

use std::collections::HashMap;

use ash::vk;

use crate::render::backends::GpuDevice;
use crate::render::error::{VulkanError, VulkanResult};

/// Size in bytes of one texel or vertex attribute of `format`
///
/// Only the formats this renderer uploads are known; anything else logs an
/// error and returns 0.
pub fn format_size(format: vk::Format) -> u32 {
    match format {
        vk::Format::R8_UNORM => 1,
        vk::Format::R32_SFLOAT | vk::Format::B8G8R8A8_UNORM | vk::Format::R8G8B8A8_UNORM => 4,
        vk::Format::R32G32_SFLOAT => 8,
        vk::Format::R32G32B32_SFLOAT => 12,
        vk::Format::R32G32B32A32_SFLOAT => 16,
        other => {
            log::error!("Unsupported VkFormat: {:?}", other);
            0
        }
    }
}

/// Index of the first memory type allowed by `type_bits` that has every flag in `flags`
pub fn find_memory_type(
    properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    properties.memory_types[..properties.memory_type_count as usize]
        .iter()
        .enumerate()
        .find(|(index, memory_type)| {
            type_bits & (1 << *index) != 0 && memory_type.property_flags.contains(flags)
        })
        .map(|(index, _)| index as u32)
        .ok_or_else(|| {
            log::error!("No memory type with properties {:?} in mask {:#b}", flags, type_bits);
            VulkanError::NoSuitableMemoryType
        })
}

/// Merge one stage's descriptor bindings into `merged`
///
/// A binding number already present gets `stage` OR'd into its stage flags;
/// new binding numbers are appended with `stage` as their only stage. The
/// result is sorted by binding number.
pub fn merge_descriptor_bindings(
    merged: &mut Vec<vk::DescriptorSetLayoutBinding>,
    incoming: &[vk::DescriptorSetLayoutBinding],
    stage: vk::ShaderStageFlags,
) {
    let mut index_of: HashMap<u32, usize> = merged
        .iter()
        .enumerate()
        .map(|(index, binding)| (binding.binding, index))
        .collect();

    for binding in incoming {
        if let Some(&index) = index_of.get(&binding.binding) {
            merged[index].stage_flags |= stage;
        } else {
            let mut binding = *binding;
            binding.stage_flags = stage;
            index_of.insert(binding.binding, merged.len());
            merged.push(binding);
        }
    }

    merged.sort_by_key(|binding| binding.binding);
}

/// Merge one stage's push-constant ranges into `merged`
///
/// Ranges merge only when offset and size are identical; overlapping ranges
/// with different bounds stay separate.
pub fn merge_push_constant_ranges(
    merged: &mut Vec<vk::PushConstantRange>,
    incoming: &[vk::PushConstantRange],
    stage: vk::ShaderStageFlags,
) {
    for range in incoming {
        if let Some(existing) = merged
            .iter_mut()
            .find(|existing| existing.offset == range.offset && existing.size == range.size)
        {
            existing.stage_flags |= stage;
        } else {
            merged.push(vk::PushConstantRange {
                stage_flags: stage,
                ..*range
            });
        }
    }
}

/// Pick the presentation format, preferring `B8G8R8A8_SRGB`
pub fn find_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    if let Some(format) = formats.iter().find(|f| f.format == vk::Format::B8G8R8A8_SRGB) {
        return *format;
    }

    match formats.first() {
        Some(first) => {
            log::warn!("B8G8R8A8_SRGB surface format unavailable, using {:?}", first.format);
            *first
        }
        None => {
            log::warn!("Surface reported no formats, assuming B8G8R8A8_UNORM");
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }
        }
    }
}

/// First depth format usable as an optimal-tiling depth attachment
pub fn find_depth_format(device: &dyn GpuDevice) -> VulkanResult<vk::Format> {
    const CANDIDATES: [vk::Format; 3] = [
        vk::Format::D32_SFLOAT,
        vk::Format::D32_SFLOAT_S8_UINT,
        vk::Format::D24_UNORM_S8_UINT,
    ];

    CANDIDATES
        .into_iter()
        .find(|format| {
            device
                .format_properties(*format)
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
        .ok_or_else(|| VulkanError::InitializationFailed("No supported depth format".to_string()))
}

/// Command buffer recorded once, submitted, and waited on
///
/// Dropping it without calling [`SingleTimeCommands::submit`] returns the
/// buffer to its pool unsubmitted.
pub struct SingleTimeCommands<'a> {
    device: &'a dyn GpuDevice,
    pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
}

impl<'a> SingleTimeCommands<'a> {
    /// Allocate a primary command buffer from `pool` and begin it with ONE_TIME_SUBMIT
    pub fn begin(device: &'a dyn GpuDevice, pool: vk::CommandPool) -> VulkanResult<Self> {
        let command_buffer = device.allocate_command_buffer(pool)?;
        let commands = Self {
            device,
            pool,
            command_buffer,
        };
        device.begin_command_buffer(command_buffer, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        Ok(commands)
    }

    /// Command buffer to record into
    pub fn handle(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// End, submit with a fresh fence and block until the GPU is done
    pub fn submit(self) -> VulkanResult<()> {
        self.device.end_command_buffer(self.command_buffer)?;

        let fence = self.device.create_fence(false)?;
        let command_buffers = [self.command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers).build();

        let result = self
            .device
            .queue_submit(&[submit_info], fence)
            .and_then(|()| self.device.wait_for_fence(fence, u64::MAX));
        self.device.destroy_fence(fence);
        result
    }
}

impl Drop for SingleTimeCommands<'_> {
    fn drop(&mut self) {
        self.device.free_command_buffer(self.pool, self.command_buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::HeadlessDevice;

    fn binding(number: u32, ty: vk::DescriptorType) -> vk::DescriptorSetLayoutBinding {
        vk::DescriptorSetLayoutBinding {
            binding: number,
            descriptor_type: ty,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::empty(),
            ..Default::default()
        }
    }

    #[test]
    fn test_format_size_table() {
        assert_eq!(format_size(vk::Format::R8_UNORM), 1);
        assert_eq!(format_size(vk::Format::R32_SFLOAT), 4);
        assert_eq!(format_size(vk::Format::B8G8R8A8_UNORM), 4);
        assert_eq!(format_size(vk::Format::R8G8B8A8_UNORM), 4);
        assert_eq!(format_size(vk::Format::R32G32_SFLOAT), 8);
        assert_eq!(format_size(vk::Format::R32G32B32_SFLOAT), 12);
        assert_eq!(format_size(vk::Format::R32G32B32A32_SFLOAT), 16);
        assert_eq!(format_size(vk::Format::D32_SFLOAT), 0);
        assert_eq!(format_size(vk::Format::R16G16_SFLOAT), 0);
    }

    #[test]
    fn test_merge_descriptor_bindings_ors_shared_binding_and_sorts() {
        let mut merged = Vec::new();
        let vertex = [
            binding(1, vk::DescriptorType::STORAGE_BUFFER),
            binding(0, vk::DescriptorType::UNIFORM_BUFFER),
        ];
        let fragment = [
            binding(2, vk::DescriptorType::COMBINED_IMAGE_SAMPLER),
            binding(0, vk::DescriptorType::UNIFORM_BUFFER),
        ];

        merge_descriptor_bindings(&mut merged, &vertex, vk::ShaderStageFlags::VERTEX);
        merge_descriptor_bindings(&mut merged, &fragment, vk::ShaderStageFlags::FRAGMENT);

        let numbers: Vec<u32> = merged.iter().map(|b| b.binding).collect();
        assert_eq!(numbers, vec![0, 1, 2]);
        assert_eq!(
            merged[0].stage_flags,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
        );
        assert_eq!(merged[1].stage_flags, vk::ShaderStageFlags::VERTEX);
        assert_eq!(merged[2].stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn test_merge_push_constant_ranges_requires_exact_match() {
        let mut merged = Vec::new();
        let vertex = [vk::PushConstantRange { stage_flags: vk::ShaderStageFlags::empty(), offset: 0, size: 64 }];
        let fragment = [
            vk::PushConstantRange { stage_flags: vk::ShaderStageFlags::empty(), offset: 0, size: 64 },
            vk::PushConstantRange { stage_flags: vk::ShaderStageFlags::empty(), offset: 0, size: 32 },
            vk::PushConstantRange { stage_flags: vk::ShaderStageFlags::empty(), offset: 16, size: 64 },
        ];

        merge_push_constant_ranges(&mut merged, &vertex, vk::ShaderStageFlags::VERTEX);
        merge_push_constant_ranges(&mut merged, &fragment, vk::ShaderStageFlags::FRAGMENT);

        assert_eq!(merged.len(), 3);
        assert_eq!(
            merged[0].stage_flags,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
        );
        assert_eq!((merged[1].offset, merged[1].size), (0, 32));
        assert_eq!(merged[1].stage_flags, vk::ShaderStageFlags::FRAGMENT);
        assert_eq!((merged[2].offset, merged[2].size), (16, 64));
    }

    #[test]
    fn test_find_memory_type_respects_mask_and_flags() {
        let device = HeadlessDevice::new(4, 4);
        let properties = &device.capabilities().memory_properties;

        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        assert_eq!(find_memory_type(properties, 0b11, host).unwrap(), 1);
        assert_eq!(
            find_memory_type(properties, 0b11, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            0
        );
        assert_eq!(
            find_memory_type(properties, 0b01, host).unwrap_err(),
            VulkanError::NoSuitableMemoryType
        );
    }

    #[test]
    fn test_find_surface_format_prefers_srgb() {
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(find_surface_format(&[unorm, srgb]).format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(find_surface_format(&[unorm]).format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(find_surface_format(&[]).format, vk::Format::B8G8R8A8_UNORM);
    }

    #[test]
    fn test_single_time_commands_submit_and_release() {
        let device = HeadlessDevice::new(4, 4);
        let pool = device.create_command_pool(vk::CommandPoolCreateFlags::empty()).unwrap();
        let live_before = device.live_object_count();

        let commands = SingleTimeCommands::begin(&device, pool).unwrap();
        commands.submit().unwrap();

        assert_eq!(device.live_object_count(), live_before);
        assert!(device
            .commands()
            .iter()
            .any(|command| matches!(command, crate::render::backends::RecordedCommand::Submit { .. })));
        device.destroy_command_pool(pool);
    }
}
