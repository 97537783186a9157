//! Device abstraction used by every resource manager
//!
//! [`GpuDevice`] mirrors the device-level Vulkan entry points the renderer calls
//! after bring-up. The ash-backed [`VulkanDevice`] forwards them to the driver;
//! [`HeadlessDevice`] services them in memory and records the command stream.
//!
//! Methods take the plain `vk` create-info structs so builders from the call
//! sites pass straight through. All handles belong to the device that created
//! them; destroying a null handle is a no-op on every implementation.
//!
//! [`VulkanDevice`]: crate::render::backends::vulkan::VulkanDevice
//! [`HeadlessDevice`]: crate::render::backends::headless::HeadlessDevice

use ash::vk;

use crate::render::error::VulkanResult;

/// Optional device features the renderer turns on when available
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnabledFeatures {
    /// Anisotropic texture filtering
    pub sampler_anisotropy: bool,
    /// Line polygon mode, required for wireframe pipelines
    pub fill_mode_non_solid: bool,
}

/// Properties of the selected physical device
#[derive(Debug, Clone)]
pub struct DeviceCapabilities {
    /// Human-readable device name
    pub device_name: String,
    /// Memory types and heaps
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Features enabled on the logical device
    pub enabled_features: EnabledFeatures,
    /// Maximum sampler anisotropy
    pub max_sampler_anisotropy: f32,
    /// Nanoseconds per timestamp tick
    pub timestamp_period: f32,
}

/// Device-level GPU operations
pub trait GpuDevice: Send + Sync {
    // === Capabilities ===

    /// Properties of the selected GPU
    fn capabilities(&self) -> &DeviceCapabilities;

    /// The presentation surface this device was created for
    fn surface(&self) -> vk::SurfaceKHR;

    /// Current surface capabilities (extent, image counts)
    fn surface_capabilities(&self) -> VulkanResult<vk::SurfaceCapabilitiesKHR>;

    /// Surface formats supported for presentation
    fn surface_formats(&self) -> VulkanResult<Vec<vk::SurfaceFormatKHR>>;

    /// Format features for a format
    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties;

    // === Memory ===

    /// Allocate device memory
    fn allocate_memory(&self, info: &vk::MemoryAllocateInfo) -> VulkanResult<vk::DeviceMemory>;

    /// Free device memory
    fn free_memory(&self, memory: vk::DeviceMemory);

    /// Map a range of host-visible memory
    fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> VulkanResult<*mut u8>;

    /// Unmap previously mapped memory
    fn unmap_memory(&self, memory: vk::DeviceMemory);

    // === Buffers and images ===

    /// Create a buffer without memory
    fn create_buffer(&self, info: &vk::BufferCreateInfo) -> VulkanResult<vk::Buffer>;

    /// Destroy a buffer
    fn destroy_buffer(&self, buffer: vk::Buffer);

    /// Memory requirements of a buffer
    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements;

    /// Bind memory to a buffer
    fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VulkanResult<()>;

    /// Create an image without memory
    fn create_image(&self, info: &vk::ImageCreateInfo) -> VulkanResult<vk::Image>;

    /// Destroy an image
    fn destroy_image(&self, image: vk::Image);

    /// Memory requirements of an image
    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements;

    /// Bind memory to an image
    fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VulkanResult<()>;

    /// Create an image view
    fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> VulkanResult<vk::ImageView>;

    /// Destroy an image view
    fn destroy_image_view(&self, view: vk::ImageView);

    /// Create a sampler
    fn create_sampler(&self, info: &vk::SamplerCreateInfo) -> VulkanResult<vk::Sampler>;

    /// Destroy a sampler
    fn destroy_sampler(&self, sampler: vk::Sampler);

    // === Shaders, descriptors and pipelines ===

    /// Create a shader module from SPIR-V words
    fn create_shader_module(&self, code: &[u32]) -> VulkanResult<vk::ShaderModule>;

    /// Destroy a shader module
    fn destroy_shader_module(&self, module: vk::ShaderModule);

    /// Create a descriptor set layout
    fn create_descriptor_set_layout(
        &self,
        info: &vk::DescriptorSetLayoutCreateInfo,
    ) -> VulkanResult<vk::DescriptorSetLayout>;

    /// Destroy a descriptor set layout
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);

    /// Create a descriptor pool
    fn create_descriptor_pool(
        &self,
        info: &vk::DescriptorPoolCreateInfo,
    ) -> VulkanResult<vk::DescriptorPool>;

    /// Destroy a descriptor pool and every set allocated from it
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);

    /// Allocate descriptor sets
    fn allocate_descriptor_sets(
        &self,
        info: &vk::DescriptorSetAllocateInfo,
    ) -> VulkanResult<Vec<vk::DescriptorSet>>;

    /// Write descriptor sets in one batched call
    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet]);

    /// Create a pipeline layout
    fn create_pipeline_layout(
        &self,
        info: &vk::PipelineLayoutCreateInfo,
    ) -> VulkanResult<vk::PipelineLayout>;

    /// Destroy a pipeline layout
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);

    /// Create one graphics pipeline
    fn create_graphics_pipeline(
        &self,
        info: &vk::GraphicsPipelineCreateInfo,
    ) -> VulkanResult<vk::Pipeline>;

    /// Destroy a pipeline
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    /// Create a render pass
    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo) -> VulkanResult<vk::RenderPass>;

    /// Destroy a render pass
    fn destroy_render_pass(&self, render_pass: vk::RenderPass);

    /// Create a framebuffer
    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo) -> VulkanResult<vk::Framebuffer>;

    /// Destroy a framebuffer
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    // === Command buffers ===

    /// Create a command pool on the graphics queue family
    fn create_command_pool(&self, flags: vk::CommandPoolCreateFlags) -> VulkanResult<vk::CommandPool>;

    /// Destroy a command pool
    fn destroy_command_pool(&self, pool: vk::CommandPool);

    /// Allocate one primary command buffer
    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> VulkanResult<vk::CommandBuffer>;

    /// Return a command buffer to its pool
    fn free_command_buffer(&self, pool: vk::CommandPool, command_buffer: vk::CommandBuffer);

    /// Begin recording
    fn begin_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> VulkanResult<()>;

    /// End recording
    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()>;

    /// Reset a command buffer for re-recording
    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()>;

    /// Record a buffer-to-buffer copy
    fn cmd_copy_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: &[vk::BufferCopy],
    );

    /// Record a buffer-to-image copy
    fn cmd_copy_buffer_to_image(
        &self,
        command_buffer: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    );

    /// Record a single image layout barrier
    fn cmd_image_barrier(
        &self,
        command_buffer: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barrier: &vk::ImageMemoryBarrier,
    );

    /// Record a single buffer memory barrier
    fn cmd_buffer_barrier(
        &self,
        command_buffer: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barrier: &vk::BufferMemoryBarrier,
    );

    /// Begin a render pass with inline subpass contents
    fn cmd_begin_render_pass(&self, command_buffer: vk::CommandBuffer, info: &vk::RenderPassBeginInfo);

    /// Advance to the next subpass
    fn cmd_next_subpass(&self, command_buffer: vk::CommandBuffer);

    /// End the render pass
    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer);

    /// Bind a graphics pipeline
    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline);

    /// Bind one descriptor set at set index 0
    fn cmd_bind_descriptor_set(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    );

    /// Bind a vertex buffer at binding 0
    fn cmd_bind_vertex_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
    );

    /// Bind an index buffer
    fn cmd_bind_index_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    );

    /// Set the dynamic viewport
    fn cmd_set_viewport(&self, command_buffer: vk::CommandBuffer, viewport: &vk::Viewport);

    /// Set the dynamic scissor
    fn cmd_set_scissor(&self, command_buffer: vk::CommandBuffer, scissor: &vk::Rect2D);

    /// Record a non-indexed draw
    fn cmd_draw(
        &self,
        command_buffer: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    );

    /// Record an indexed draw
    fn cmd_draw_indexed(
        &self,
        command_buffer: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );

    /// Reset a range of queries
    fn cmd_reset_query_pool(
        &self,
        command_buffer: vk::CommandBuffer,
        pool: vk::QueryPool,
        first_query: u32,
        query_count: u32,
    );

    /// Write a timestamp when `stage` completes
    fn cmd_write_timestamp(
        &self,
        command_buffer: vk::CommandBuffer,
        stage: vk::PipelineStageFlags,
        pool: vk::QueryPool,
        query: u32,
    );

    // === Synchronization and queues ===

    /// Create a fence
    fn create_fence(&self, signaled: bool) -> VulkanResult<vk::Fence>;

    /// Destroy a fence
    fn destroy_fence(&self, fence: vk::Fence);

    /// Block until the fence is signaled
    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> VulkanResult<()>;

    /// Return a fence to the unsignaled state
    fn reset_fence(&self, fence: vk::Fence) -> VulkanResult<()>;

    /// Create a binary semaphore
    fn create_semaphore(&self) -> VulkanResult<vk::Semaphore>;

    /// Destroy a semaphore
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    /// Submit work to the graphics queue
    fn queue_submit(&self, submits: &[vk::SubmitInfo], fence: vk::Fence) -> VulkanResult<()>;

    /// Wait for the graphics queue to drain
    fn queue_wait_idle(&self) -> VulkanResult<()>;

    /// Wait for the whole device to go idle
    fn device_wait_idle(&self) -> VulkanResult<()>;

    /// Create a timestamp query pool
    fn create_timestamp_query_pool(&self, query_count: u32) -> VulkanResult<vk::QueryPool>;

    /// Destroy a query pool
    fn destroy_query_pool(&self, pool: vk::QueryPool);

    /// Read 64-bit query results, waiting for availability
    fn query_results(&self, pool: vk::QueryPool, first_query: u32, query_count: u32) -> VulkanResult<Vec<u64>>;

    // === Presentation ===

    /// Create a swapchain on this device's surface
    fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR) -> VulkanResult<vk::SwapchainKHR>;

    /// Destroy a swapchain
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);

    /// Images owned by the swapchain
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VulkanResult<Vec<vk::Image>>;

    /// Acquire the next presentable image
    ///
    /// Returns the image index and whether the swapchain is suboptimal. An
    /// out-of-date swapchain is reported as `VulkanError::Api(ERROR_OUT_OF_DATE_KHR)`.
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> VulkanResult<(u32, bool)>;

    /// Present an image, returning whether the swapchain is suboptimal
    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VulkanResult<bool>;
}
