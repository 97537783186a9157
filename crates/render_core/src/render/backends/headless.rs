//! Headless device: an in-memory [`GpuDevice`] for tests and offscreen tooling
//!
//! Host memory is real: allocations are byte vectors and mapping returns a
//! pointer into them, so uploads and buffer-to-buffer copies can be read back.
//! Copies execute at record time and submissions complete immediately. Every
//! recorded command, acquire, submit and present is appended to a log that tests
//! inspect with [`HeadlessDevice::commands`]. Out-of-date swapchain results can
//! be scripted with [`HeadlessDevice::fail_next_acquire`] and
//! [`HeadlessDevice::fail_next_present`].

use std::collections::HashMap;

use ash::vk::{self, Handle};
use parking_lot::{Mutex, MutexGuard};

use super::device::{DeviceCapabilities, EnabledFeatures, GpuDevice};
use crate::render::error::{VulkanError, VulkanResult};

/// Memory type 0: device-local, type 1: host-visible + coherent
const DEVICE_LOCAL_TYPE: u32 = 0;
const HOST_VISIBLE_TYPE: u32 = 1;
const ALL_MEMORY_TYPES: u32 = 0b11;

/// Raw timestamp ticks reported for the two GPU timer queries
const FAKE_TIMESTAMPS: [u64; 2] = [1_000, 2_001_000];

/// One entry in the headless command log
#[derive(Debug, Clone)]
pub enum RecordedCommand {
    /// Command buffer recording started
    Begin(vk::CommandBuffer),
    /// Command buffer recording ended
    End(vk::CommandBuffer),
    /// Buffer-to-buffer copy
    CopyBuffer {
        /// Source buffer
        src: vk::Buffer,
        /// Destination buffer
        dst: vk::Buffer,
        /// Total bytes across all regions
        size: vk::DeviceSize,
    },
    /// One buffer-to-image region
    CopyBufferToImage {
        /// Destination image
        image: vk::Image,
        /// Mip level written
        mip_level: u32,
        /// Offset into the source buffer
        buffer_offset: vk::DeviceSize,
        /// Region size
        extent: vk::Extent3D,
    },
    /// Image layout transition
    ImageBarrier {
        /// Image transitioned
        image: vk::Image,
        /// Layout before
        old_layout: vk::ImageLayout,
        /// Layout after
        new_layout: vk::ImageLayout,
    },
    /// Buffer memory barrier
    BufferBarrier {
        /// Buffer guarded
        buffer: vk::Buffer,
    },
    /// Render pass begin
    BeginRenderPass {
        /// Target framebuffer
        framebuffer: vk::Framebuffer,
        /// Render area size
        extent: vk::Extent2D,
        /// Number of clear values supplied
        clear_value_count: u32,
    },
    /// Advance to the next subpass
    NextSubpass,
    /// Render pass end
    EndRenderPass,
    /// Pipeline bind
    BindPipeline(vk::Pipeline),
    /// Descriptor set bind
    BindDescriptorSet(vk::DescriptorSet),
    /// Vertex buffer bind
    BindVertexBuffer(vk::Buffer),
    /// Index buffer bind
    BindIndexBuffer(vk::Buffer),
    /// Dynamic viewport
    SetViewport(vk::Viewport),
    /// Dynamic scissor
    SetScissor(vk::Rect2D),
    /// Non-indexed draw
    Draw {
        /// Vertices per instance
        vertex_count: u32,
        /// Instances
        instance_count: u32,
        /// First vertex
        first_vertex: u32,
        /// First instance
        first_instance: u32,
    },
    /// Indexed draw
    DrawIndexed {
        /// Indices per instance
        index_count: u32,
        /// Instances
        instance_count: u32,
        /// First index
        first_index: u32,
        /// Vertex offset
        vertex_offset: i32,
        /// First instance
        first_instance: u32,
    },
    /// Query pool reset
    ResetQueryPool,
    /// Timestamp write
    WriteTimestamp(vk::PipelineStageFlags),
    /// Queue submission
    Submit {
        /// Fence signaled on completion
        fence: vk::Fence,
    },
    /// Swapchain image acquired
    Acquire {
        /// Acquired index
        image_index: u32,
    },
    /// Image presented
    Present {
        /// Presented index
        image_index: u32,
    },
}

struct MemoryRecord {
    bytes: Vec<u8>,
    host_visible: bool,
}

#[derive(Default)]
struct HeadlessState {
    next_handle: u64,
    memories: HashMap<u64, MemoryRecord>,
    buffer_sizes: HashMap<u64, vk::DeviceSize>,
    buffer_bindings: HashMap<u64, (u64, vk::DeviceSize)>,
    live_objects: HashMap<u64, &'static str>,
    fences: HashMap<u64, bool>,
    swapchain_images: HashMap<u64, Vec<vk::Image>>,
    commands: Vec<RecordedCommand>,
    descriptor_writes: Vec<usize>,
    next_image: u32,
    surface_extent: vk::Extent2D,
    fail_next_acquire: bool,
    fail_next_present: bool,
    extra_swapchain_images: u32,
    last_swapchain_usage: Option<vk::ImageUsageFlags>,
}

impl HeadlessState {
    fn create(&mut self, kind: &'static str) -> u64 {
        self.next_handle += 1;
        let raw = self.next_handle;
        self.live_objects.insert(raw, kind);
        raw
    }

    fn destroy(&mut self, raw: u64) {
        if raw != 0 {
            self.live_objects.remove(&raw);
        }
    }
}

/// In-memory GPU device
pub struct HeadlessDevice {
    capabilities: DeviceCapabilities,
    state: Mutex<HeadlessState>,
}

impl HeadlessDevice {
    /// Create a headless device whose surface reports the given size
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_features(
            width,
            height,
            EnabledFeatures {
                sampler_anisotropy: true,
                fill_mode_non_solid: true,
            },
        )
    }

    /// Create a headless device with specific optional features
    pub fn with_features(width: u32, height: u32, enabled_features: EnabledFeatures) -> Self {
        let mut memory_properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 2,
            memory_heap_count: 2,
            ..Default::default()
        };
        memory_properties.memory_types[DEVICE_LOCAL_TYPE as usize] = vk::MemoryType {
            property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            heap_index: 0,
        };
        memory_properties.memory_types[HOST_VISIBLE_TYPE as usize] = vk::MemoryType {
            property_flags: vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            heap_index: 1,
        };
        memory_properties.memory_heaps[0] = vk::MemoryHeap {
            size: 1 << 30,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };
        memory_properties.memory_heaps[1] = vk::MemoryHeap {
            size: 1 << 30,
            flags: vk::MemoryHeapFlags::empty(),
        };

        let state = HeadlessState {
            surface_extent: vk::Extent2D { width, height },
            ..HeadlessState::default()
        };

        Self {
            capabilities: DeviceCapabilities {
                device_name: "Headless Device".to_string(),
                memory_properties,
                enabled_features,
                max_sampler_anisotropy: 16.0,
                timestamp_period: 1.0,
            },
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HeadlessState> {
        self.state.lock()
    }

    fn record(&self, command: RecordedCommand) {
        self.lock().commands.push(command);
    }

    /// Snapshot of the command log
    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.lock().commands.clone()
    }

    /// Empty the command log
    pub fn clear_commands(&self) {
        self.lock().commands.clear();
    }

    /// Number of writes in each `update_descriptor_sets` call so far
    pub fn descriptor_write_batches(&self) -> Vec<usize> {
        self.lock().descriptor_writes.clone()
    }

    /// Objects created and not yet destroyed
    pub fn live_object_count(&self) -> usize {
        self.lock().live_objects.len()
    }

    /// Change the size the surface reports, as a window resize would
    pub fn set_surface_extent(&self, width: u32, height: u32) {
        self.lock().surface_extent = vk::Extent2D { width, height };
    }

    /// Make the next acquire report an out-of-date swapchain
    pub fn fail_next_acquire(&self) {
        self.lock().fail_next_acquire = true;
    }

    /// Make the next present report an out-of-date swapchain
    pub fn fail_next_present(&self) {
        self.lock().fail_next_present = true;
    }

    /// Give every later swapchain `count` more images than it asks for
    pub fn set_extra_swapchain_images(&self, count: u32) {
        self.lock().extra_swapchain_images = count;
    }

    /// Image usage requested by the most recent swapchain
    pub fn last_swapchain_usage(&self) -> Option<vk::ImageUsageFlags> {
        self.lock().last_swapchain_usage
    }

    /// Copy of the bytes currently stored in a buffer's memory
    pub fn buffer_contents(&self, buffer: vk::Buffer) -> Option<Vec<u8>> {
        let state = self.lock();
        let size = *state.buffer_sizes.get(&buffer.as_raw())?;
        let (memory, offset) = *state.buffer_bindings.get(&buffer.as_raw())?;
        let record = state.memories.get(&memory)?;
        let start = offset as usize;
        record.bytes.get(start..start + size as usize).map(<[u8]>::to_vec)
    }

    fn memory_requirements(size: vk::DeviceSize) -> vk::MemoryRequirements {
        vk::MemoryRequirements {
            size,
            alignment: 16,
            memory_type_bits: ALL_MEMORY_TYPES,
        }
    }
}

impl GpuDevice for HeadlessDevice {
    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn surface(&self) -> vk::SurfaceKHR {
        vk::SurfaceKHR::from_raw(u64::MAX)
    }

    fn surface_capabilities(&self) -> VulkanResult<vk::SurfaceCapabilitiesKHR> {
        let extent = self.lock().surface_extent;
        Ok(vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 4,
            current_extent: extent,
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 16384, height: 16384 },
            max_image_array_layers: 1,
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::INPUT_ATTACHMENT
                | vk::ImageUsageFlags::TRANSFER_DST,
        })
    }

    fn surface_formats(&self) -> VulkanResult<Vec<vk::SurfaceFormatKHR>> {
        Ok(vec![vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }])
    }

    fn format_properties(&self, _format: vk::Format) -> vk::FormatProperties {
        vk::FormatProperties {
            optimal_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
                | vk::FormatFeatureFlags::COLOR_ATTACHMENT
                | vk::FormatFeatureFlags::SAMPLED_IMAGE,
            ..Default::default()
        }
    }

    fn allocate_memory(&self, info: &vk::MemoryAllocateInfo) -> VulkanResult<vk::DeviceMemory> {
        let memory_type = info.memory_type_index;
        if memory_type >= self.capabilities.memory_properties.memory_type_count {
            return Err(VulkanError::Api(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
        }
        let mut state = self.lock();
        let raw = state.create("memory");
        state.memories.insert(
            raw,
            MemoryRecord {
                bytes: vec![0; info.allocation_size as usize],
                host_visible: memory_type == HOST_VISIBLE_TYPE,
            },
        );
        Ok(vk::DeviceMemory::from_raw(raw))
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        let mut state = self.lock();
        state.memories.remove(&memory.as_raw());
        state.destroy(memory.as_raw());
    }

    fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> VulkanResult<*mut u8> {
        let mut state = self.lock();
        let record = state
            .memories
            .get_mut(&memory.as_raw())
            .ok_or(VulkanError::Api(vk::Result::ERROR_MEMORY_MAP_FAILED))?;
        if !record.host_visible {
            return Err(VulkanError::Api(vk::Result::ERROR_MEMORY_MAP_FAILED));
        }
        let len = record.bytes.len() as vk::DeviceSize;
        let end = if size == vk::WHOLE_SIZE { len } else { offset + size };
        if offset > len || end > len {
            return Err(VulkanError::Api(vk::Result::ERROR_MEMORY_MAP_FAILED));
        }
        // The vector is never resized after allocation, so the pointer stays valid until freed
        Ok(record.bytes[offset as usize..].as_mut_ptr())
    }

    fn unmap_memory(&self, _memory: vk::DeviceMemory) {}

    fn create_buffer(&self, info: &vk::BufferCreateInfo) -> VulkanResult<vk::Buffer> {
        if info.size == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "buffer size must be non-zero".to_string(),
            });
        }
        let mut state = self.lock();
        let raw = state.create("buffer");
        state.buffer_sizes.insert(raw, info.size);
        Ok(vk::Buffer::from_raw(raw))
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        let mut state = self.lock();
        state.buffer_sizes.remove(&buffer.as_raw());
        state.buffer_bindings.remove(&buffer.as_raw());
        state.destroy(buffer.as_raw());
    }

    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        let size = self.lock().buffer_sizes.get(&buffer.as_raw()).copied().unwrap_or(0);
        Self::memory_requirements(size)
    }

    fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VulkanResult<()> {
        let mut state = self.lock();
        if !state.memories.contains_key(&memory.as_raw()) {
            return Err(VulkanError::Api(vk::Result::ERROR_UNKNOWN));
        }
        state.buffer_bindings.insert(buffer.as_raw(), (memory.as_raw(), offset));
        Ok(())
    }

    fn create_image(&self, info: &vk::ImageCreateInfo) -> VulkanResult<vk::Image> {
        if info.extent.width == 0 || info.extent.height == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "image extent must be non-zero".to_string(),
            });
        }
        Ok(vk::Image::from_raw(self.lock().create("image")))
    }

    fn destroy_image(&self, image: vk::Image) {
        self.lock().destroy(image.as_raw());
    }

    fn image_memory_requirements(&self, _image: vk::Image) -> vk::MemoryRequirements {
        Self::memory_requirements(256)
    }

    fn bind_image_memory(
        &self,
        _image: vk::Image,
        memory: vk::DeviceMemory,
        _offset: vk::DeviceSize,
    ) -> VulkanResult<()> {
        if self.lock().memories.contains_key(&memory.as_raw()) {
            Ok(())
        } else {
            Err(VulkanError::Api(vk::Result::ERROR_UNKNOWN))
        }
    }

    fn create_image_view(&self, _info: &vk::ImageViewCreateInfo) -> VulkanResult<vk::ImageView> {
        Ok(vk::ImageView::from_raw(self.lock().create("image view")))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.lock().destroy(view.as_raw());
    }

    fn create_sampler(&self, _info: &vk::SamplerCreateInfo) -> VulkanResult<vk::Sampler> {
        Ok(vk::Sampler::from_raw(self.lock().create("sampler")))
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        self.lock().destroy(sampler.as_raw());
    }

    fn create_shader_module(&self, code: &[u32]) -> VulkanResult<vk::ShaderModule> {
        if code.first() != Some(&0x0723_0203) {
            return Err(VulkanError::Api(vk::Result::ERROR_INVALID_SHADER_NV));
        }
        Ok(vk::ShaderModule::from_raw(self.lock().create("shader module")))
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.lock().destroy(module.as_raw());
    }

    fn create_descriptor_set_layout(
        &self,
        _info: &vk::DescriptorSetLayoutCreateInfo,
    ) -> VulkanResult<vk::DescriptorSetLayout> {
        Ok(vk::DescriptorSetLayout::from_raw(self.lock().create("descriptor set layout")))
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.lock().destroy(layout.as_raw());
    }

    fn create_descriptor_pool(
        &self,
        _info: &vk::DescriptorPoolCreateInfo,
    ) -> VulkanResult<vk::DescriptorPool> {
        Ok(vk::DescriptorPool::from_raw(self.lock().create("descriptor pool")))
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        self.lock().destroy(pool.as_raw());
    }

    fn allocate_descriptor_sets(
        &self,
        info: &vk::DescriptorSetAllocateInfo,
    ) -> VulkanResult<Vec<vk::DescriptorSet>> {
        let mut state = self.lock();
        Ok((0..info.descriptor_set_count)
            .map(|_| {
                state.next_handle += 1;
                vk::DescriptorSet::from_raw(state.next_handle)
            })
            .collect())
    }

    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet]) {
        self.lock().descriptor_writes.push(writes.len());
    }

    fn create_pipeline_layout(
        &self,
        _info: &vk::PipelineLayoutCreateInfo,
    ) -> VulkanResult<vk::PipelineLayout> {
        Ok(vk::PipelineLayout::from_raw(self.lock().create("pipeline layout")))
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.lock().destroy(layout.as_raw());
    }

    fn create_graphics_pipeline(
        &self,
        _info: &vk::GraphicsPipelineCreateInfo,
    ) -> VulkanResult<vk::Pipeline> {
        Ok(vk::Pipeline::from_raw(self.lock().create("pipeline")))
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.lock().destroy(pipeline.as_raw());
    }

    fn create_render_pass(&self, _info: &vk::RenderPassCreateInfo) -> VulkanResult<vk::RenderPass> {
        Ok(vk::RenderPass::from_raw(self.lock().create("render pass")))
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.lock().destroy(render_pass.as_raw());
    }

    fn create_framebuffer(&self, _info: &vk::FramebufferCreateInfo) -> VulkanResult<vk::Framebuffer> {
        Ok(vk::Framebuffer::from_raw(self.lock().create("framebuffer")))
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.lock().destroy(framebuffer.as_raw());
    }

    fn create_command_pool(&self, _flags: vk::CommandPoolCreateFlags) -> VulkanResult<vk::CommandPool> {
        Ok(vk::CommandPool::from_raw(self.lock().create("command pool")))
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        self.lock().destroy(pool.as_raw());
    }

    fn allocate_command_buffer(&self, _pool: vk::CommandPool) -> VulkanResult<vk::CommandBuffer> {
        let mut state = self.lock();
        state.next_handle += 1;
        Ok(vk::CommandBuffer::from_raw(state.next_handle))
    }

    fn free_command_buffer(&self, _pool: vk::CommandPool, _command_buffer: vk::CommandBuffer) {}

    fn begin_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        _flags: vk::CommandBufferUsageFlags,
    ) -> VulkanResult<()> {
        self.record(RecordedCommand::Begin(command_buffer));
        Ok(())
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        self.record(RecordedCommand::End(command_buffer));
        Ok(())
    }

    fn reset_command_buffer(&self, _command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        Ok(())
    }

    fn cmd_copy_buffer(
        &self,
        _command_buffer: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: &[vk::BufferCopy],
    ) {
        let mut state = self.lock();
        let src_binding = state.buffer_bindings.get(&src.as_raw()).copied();
        let dst_binding = state.buffer_bindings.get(&dst.as_raw()).copied();

        if let (Some((src_memory, src_base)), Some((dst_memory, dst_base))) = (src_binding, dst_binding) {
            for region in regions {
                let from = (src_base + region.src_offset) as usize;
                let to = (dst_base + region.dst_offset) as usize;
                let len = region.size as usize;
                let bytes = state
                    .memories
                    .get(&src_memory)
                    .and_then(|record| record.bytes.get(from..from + len))
                    .map(<[u8]>::to_vec);
                let slot = state
                    .memories
                    .get_mut(&dst_memory)
                    .and_then(|record| record.bytes.get_mut(to..to + len));
                match (bytes, slot) {
                    (Some(bytes), Some(slot)) => slot.copy_from_slice(&bytes),
                    _ => log::error!("Headless copy of {len} bytes falls outside its buffers"),
                }
            }
        }

        state.commands.push(RecordedCommand::CopyBuffer {
            src,
            dst,
            size: regions.iter().map(|region| region.size).sum(),
        });
    }

    fn cmd_copy_buffer_to_image(
        &self,
        _command_buffer: vk::CommandBuffer,
        _src: vk::Buffer,
        dst: vk::Image,
        _layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        let mut state = self.lock();
        for region in regions {
            state.commands.push(RecordedCommand::CopyBufferToImage {
                image: dst,
                mip_level: region.image_subresource.mip_level,
                buffer_offset: region.buffer_offset,
                extent: region.image_extent,
            });
        }
    }

    fn cmd_image_barrier(
        &self,
        _command_buffer: vk::CommandBuffer,
        _src_stage: vk::PipelineStageFlags,
        _dst_stage: vk::PipelineStageFlags,
        barrier: &vk::ImageMemoryBarrier,
    ) {
        self.record(RecordedCommand::ImageBarrier {
            image: barrier.image,
            old_layout: barrier.old_layout,
            new_layout: barrier.new_layout,
        });
    }

    fn cmd_buffer_barrier(
        &self,
        _command_buffer: vk::CommandBuffer,
        _src_stage: vk::PipelineStageFlags,
        _dst_stage: vk::PipelineStageFlags,
        barrier: &vk::BufferMemoryBarrier,
    ) {
        self.record(RecordedCommand::BufferBarrier { buffer: barrier.buffer });
    }

    fn cmd_begin_render_pass(&self, _command_buffer: vk::CommandBuffer, info: &vk::RenderPassBeginInfo) {
        self.record(RecordedCommand::BeginRenderPass {
            framebuffer: info.framebuffer,
            extent: info.render_area.extent,
            clear_value_count: info.clear_value_count,
        });
    }

    fn cmd_next_subpass(&self, _command_buffer: vk::CommandBuffer) {
        self.record(RecordedCommand::NextSubpass);
    }

    fn cmd_end_render_pass(&self, _command_buffer: vk::CommandBuffer) {
        self.record(RecordedCommand::EndRenderPass);
    }

    fn cmd_bind_pipeline(&self, _command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.record(RecordedCommand::BindPipeline(pipeline));
    }

    fn cmd_bind_descriptor_set(
        &self,
        _command_buffer: vk::CommandBuffer,
        _layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    ) {
        self.record(RecordedCommand::BindDescriptorSet(set));
    }

    fn cmd_bind_vertex_buffer(
        &self,
        _command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        _offset: vk::DeviceSize,
    ) {
        self.record(RecordedCommand::BindVertexBuffer(buffer));
    }

    fn cmd_bind_index_buffer(
        &self,
        _command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        _offset: vk::DeviceSize,
        _index_type: vk::IndexType,
    ) {
        self.record(RecordedCommand::BindIndexBuffer(buffer));
    }

    fn cmd_set_viewport(&self, _command_buffer: vk::CommandBuffer, viewport: &vk::Viewport) {
        self.record(RecordedCommand::SetViewport(*viewport));
    }

    fn cmd_set_scissor(&self, _command_buffer: vk::CommandBuffer, scissor: &vk::Rect2D) {
        self.record(RecordedCommand::SetScissor(*scissor));
    }

    fn cmd_draw(
        &self,
        _command_buffer: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        self.record(RecordedCommand::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
    }

    fn cmd_draw_indexed(
        &self,
        _command_buffer: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.record(RecordedCommand::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        });
    }

    fn cmd_reset_query_pool(
        &self,
        _command_buffer: vk::CommandBuffer,
        _pool: vk::QueryPool,
        _first_query: u32,
        _query_count: u32,
    ) {
        self.record(RecordedCommand::ResetQueryPool);
    }

    fn cmd_write_timestamp(
        &self,
        _command_buffer: vk::CommandBuffer,
        stage: vk::PipelineStageFlags,
        _pool: vk::QueryPool,
        _query: u32,
    ) {
        self.record(RecordedCommand::WriteTimestamp(stage));
    }

    fn create_fence(&self, signaled: bool) -> VulkanResult<vk::Fence> {
        let mut state = self.lock();
        let raw = state.create("fence");
        state.fences.insert(raw, signaled);
        Ok(vk::Fence::from_raw(raw))
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.lock();
        state.fences.remove(&fence.as_raw());
        state.destroy(fence.as_raw());
    }

    fn wait_for_fence(&self, fence: vk::Fence, _timeout: u64) -> VulkanResult<()> {
        match self.lock().fences.get(&fence.as_raw()) {
            Some(true) => Ok(()),
            // Nothing was submitted with this fence, a real device would never wake up
            Some(false) => Err(VulkanError::Api(vk::Result::TIMEOUT)),
            None => Err(VulkanError::Api(vk::Result::ERROR_DEVICE_LOST)),
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VulkanResult<()> {
        match self.lock().fences.get_mut(&fence.as_raw()) {
            Some(signaled) => {
                *signaled = false;
                Ok(())
            }
            None => Err(VulkanError::Api(vk::Result::ERROR_DEVICE_LOST)),
        }
    }

    fn create_semaphore(&self) -> VulkanResult<vk::Semaphore> {
        Ok(vk::Semaphore::from_raw(self.lock().create("semaphore")))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.lock().destroy(semaphore.as_raw());
    }

    fn queue_submit(&self, _submits: &[vk::SubmitInfo], fence: vk::Fence) -> VulkanResult<()> {
        let mut state = self.lock();
        if fence != vk::Fence::null() {
            if let Some(signaled) = state.fences.get_mut(&fence.as_raw()) {
                *signaled = true;
            }
        }
        state.commands.push(RecordedCommand::Submit { fence });
        Ok(())
    }

    fn queue_wait_idle(&self) -> VulkanResult<()> {
        Ok(())
    }

    fn device_wait_idle(&self) -> VulkanResult<()> {
        Ok(())
    }

    fn create_timestamp_query_pool(&self, _query_count: u32) -> VulkanResult<vk::QueryPool> {
        Ok(vk::QueryPool::from_raw(self.lock().create("query pool")))
    }

    fn destroy_query_pool(&self, pool: vk::QueryPool) {
        self.lock().destroy(pool.as_raw());
    }

    fn query_results(&self, _pool: vk::QueryPool, first_query: u32, query_count: u32) -> VulkanResult<Vec<u64>> {
        Ok((first_query..first_query + query_count)
            .map(|query| FAKE_TIMESTAMPS[query as usize % FAKE_TIMESTAMPS.len()])
            .collect())
    }

    fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR) -> VulkanResult<vk::SwapchainKHR> {
        let mut state = self.lock();
        let raw = state.create("swapchain");
        state.last_swapchain_usage = Some(info.image_usage);
        let images = (0..info.min_image_count + state.extra_swapchain_images)
            .map(|_| {
                state.next_handle += 1;
                vk::Image::from_raw(state.next_handle)
            })
            .collect();
        state.swapchain_images.insert(raw, images);
        state.next_image = 0;
        Ok(vk::SwapchainKHR::from_raw(raw))
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut state = self.lock();
        state.swapchain_images.remove(&swapchain.as_raw());
        state.destroy(swapchain.as_raw());
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VulkanResult<Vec<vk::Image>> {
        self.lock()
            .swapchain_images
            .get(&swapchain.as_raw())
            .cloned()
            .ok_or(VulkanError::Api(vk::Result::ERROR_SURFACE_LOST_KHR))
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _signal: vk::Semaphore,
    ) -> VulkanResult<(u32, bool)> {
        let mut state = self.lock();
        if std::mem::take(&mut state.fail_next_acquire) {
            return Err(VulkanError::Api(vk::Result::ERROR_OUT_OF_DATE_KHR));
        }
        let count = state
            .swapchain_images
            .get(&swapchain.as_raw())
            .map(Vec::len)
            .ok_or(VulkanError::Api(vk::Result::ERROR_SURFACE_LOST_KHR))? as u32;
        let image_index = state.next_image % count.max(1);
        state.next_image = state.next_image.wrapping_add(1);
        state.commands.push(RecordedCommand::Acquire { image_index });
        Ok((image_index, false))
    }

    fn queue_present(
        &self,
        _swapchain: vk::SwapchainKHR,
        image_index: u32,
        _wait: vk::Semaphore,
    ) -> VulkanResult<bool> {
        let mut state = self.lock();
        state.commands.push(RecordedCommand::Present { image_index });
        if std::mem::take(&mut state.fail_next_present) {
            return Err(VulkanError::Api(vk::Result::ERROR_OUT_OF_DATE_KHR));
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_local_memory_cannot_be_mapped() {
        let device = HeadlessDevice::new(8, 8);
        let info = vk::MemoryAllocateInfo::builder()
            .allocation_size(64)
            .memory_type_index(DEVICE_LOCAL_TYPE);
        let memory = device.allocate_memory(&info).unwrap();
        assert!(device.map_memory(memory, 0, vk::WHOLE_SIZE).is_err());
        device.free_memory(memory);
        assert_eq!(device.live_object_count(), 0);
    }

    #[test]
    fn test_scripted_out_of_date_acquire_happens_once() {
        let device = HeadlessDevice::new(8, 8);
        let info = vk::SwapchainCreateInfoKHR::builder().min_image_count(3);
        let swapchain = device.create_swapchain(&info).unwrap();

        device.fail_next_acquire();
        let first = device.acquire_next_image(swapchain, vk::Semaphore::null());
        assert!(first.unwrap_err().is_out_of_date());
        assert_eq!(device.acquire_next_image(swapchain, vk::Semaphore::null()).unwrap(), (0, false));
        assert_eq!(device.acquire_next_image(swapchain, vk::Semaphore::null()).unwrap(), (1, false));
    }

    #[test]
    fn test_unsubmitted_fence_times_out() {
        let device = HeadlessDevice::new(8, 8);
        let fence = device.create_fence(false).unwrap();
        assert!(device.wait_for_fence(fence, u64::MAX).is_err());
        device.queue_submit(&[], fence).unwrap();
        assert!(device.wait_for_fence(fence, u64::MAX).is_ok());
    }
}
