//! ash-backed [`GpuDevice`]
//!
//! Bring-up runs instance -> debug messenger -> surface -> GPU selection ->
//! logical device + queue. Everything after that goes through the trait.

use ash::extensions::khr::{Surface, Swapchain};
use ash::{vk, Device, Instance};
use std::ffi::{c_char, CStr};

use super::instance::VulkanInstance;
use super::window::Window;
use crate::core::config::RendererConfig;
use crate::render::backends::device::{DeviceCapabilities, EnabledFeatures, GpuDevice};
use crate::render::error::{VulkanError, VulkanResult};

/// Physical device selection and capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features
    pub features: vk::PhysicalDeviceFeatures,
    /// Index of the queue family used for graphics and presentation
    pub graphics_family: u32,
}

impl PhysicalDeviceInfo {
    /// Pick the first device with a queue family that supports graphics and presenting to `surface`
    pub fn select_suitable_device(
        instance: &Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
    ) -> VulkanResult<Self> {
        let devices = unsafe { instance.enumerate_physical_devices() }.map_err(VulkanError::Api)?;

        for device in devices {
            if let Some(info) = Self::evaluate_device(instance, device, surface, surface_loader)? {
                log::info!("Selected GPU: {}", info.name());
                return Ok(info);
            }
        }

        log::error!("No GPU exposes a graphics queue with present support");
        Err(VulkanError::NoSuitableDevice)
    }

    fn evaluate_device(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
    ) -> VulkanResult<Option<Self>> {
        let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };

        let mut graphics_family = None;
        for (index, family) in queue_families.iter().enumerate() {
            let index = index as u32;
            let present_support = unsafe {
                surface_loader.get_physical_device_surface_support(device, index, surface)
            }
            .map_err(VulkanError::Api)?;

            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && present_support {
                graphics_family = Some(index);
                break;
            }
        }

        let Some(graphics_family) = graphics_family else {
            return Ok(None);
        };

        let extensions =
            unsafe { instance.enumerate_device_extension_properties(device) }.map_err(VulkanError::Api)?;
        let has_swapchain = extensions.iter().any(|available| {
            let name = unsafe { CStr::from_ptr(available.extension_name.as_ptr()) };
            name == Swapchain::name()
        });
        if !has_swapchain {
            return Ok(None);
        }

        Ok(Some(Self {
            device,
            properties: unsafe { instance.get_physical_device_properties(device) },
            features: unsafe { instance.get_physical_device_features(device) },
            graphics_family,
        }))
    }

    /// Device name reported by the driver
    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }
}

/// GPU device driven through ash
pub struct VulkanDevice {
    device: Device,
    graphics_queue: vk::Queue,
    graphics_family: u32,
    physical_device: vk::PhysicalDevice,
    swapchain_loader: Swapchain,
    surface: vk::SurfaceKHR,
    surface_loader: Surface,
    capabilities: DeviceCapabilities,
    instance: VulkanInstance,
}

impl VulkanDevice {
    /// Bring up Vulkan for `window`
    pub fn new(window: &mut Window, config: &RendererConfig) -> VulkanResult<Self> {
        let extensions = window
            .required_instance_extensions()
            .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;
        let instance = VulkanInstance::new(&config.application_name, &extensions, config.validation_enabled())?;

        let surface_loader = Surface::new(&instance.entry, &instance.instance);
        let surface = window
            .create_vulkan_surface(instance.instance.handle())
            .map_err(|e| VulkanError::InitializationFailed(format!("Surface creation: {e}")))?;

        let physical = match PhysicalDeviceInfo::select_suitable_device(&instance.instance, surface, &surface_loader) {
            Ok(physical) => physical,
            Err(e) => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                return Err(e);
            }
        };

        let enabled_features = EnabledFeatures {
            sampler_anisotropy: physical.features.sampler_anisotropy == vk::TRUE,
            fill_mode_non_solid: physical.features.fill_mode_non_solid == vk::TRUE,
        };
        if !enabled_features.fill_mode_non_solid {
            log::warn!("GPU lacks fillModeNonSolid, wireframe rendering unavailable");
        }

        let device = match Self::create_logical_device(&instance.instance, &physical, enabled_features) {
            Ok(device) => device,
            Err(e) => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                return Err(e);
            }
        };
        let graphics_queue = unsafe { device.get_device_queue(physical.graphics_family, 0) };
        let swapchain_loader = Swapchain::new(&instance.instance, &device);

        let memory_properties =
            unsafe { instance.instance.get_physical_device_memory_properties(physical.device) };

        let capabilities = DeviceCapabilities {
            device_name: physical.name(),
            memory_properties,
            enabled_features,
            max_sampler_anisotropy: physical.properties.limits.max_sampler_anisotropy,
            timestamp_period: physical.properties.limits.timestamp_period,
        };

        Ok(Self {
            device,
            graphics_queue,
            graphics_family: physical.graphics_family,
            physical_device: physical.device,
            swapchain_loader,
            surface,
            surface_loader,
            capabilities,
            instance,
        })
    }

    fn create_logical_device(
        instance: &Instance,
        physical: &PhysicalDeviceInfo,
        enabled: EnabledFeatures,
    ) -> VulkanResult<Device> {
        let priorities = [1.0];
        let queue_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(physical.graphics_family)
            .queue_priorities(&priorities)
            .build();

        let extensions: [*const c_char; 1] = [Swapchain::name().as_ptr()];
        let features = vk::PhysicalDeviceFeatures::builder()
            .sampler_anisotropy(enabled.sampler_anisotropy)
            .fill_mode_non_solid(enabled.fill_mode_non_solid);

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(std::slice::from_ref(&queue_info))
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        unsafe { instance.create_device(physical.device, &create_info, None) }.map_err(VulkanError::Api)
    }

    /// Raw ash device, for code outside the renderer that needs direct access
    pub fn raw(&self) -> &Device {
        &self.device
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            // Ignore the result, nothing useful can be done about a lost device here
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

impl GpuDevice for VulkanDevice {
    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    fn surface_capabilities(&self) -> VulkanResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.physical_device, self.surface)
        }
        .map_err(VulkanError::Api)
    }

    fn surface_formats(&self) -> VulkanResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(self.physical_device, self.surface)
        }
        .map_err(VulkanError::Api)
    }

    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .instance
                .get_physical_device_format_properties(self.physical_device, format)
        }
    }

    fn allocate_memory(&self, info: &vk::MemoryAllocateInfo) -> VulkanResult<vk::DeviceMemory> {
        unsafe { self.device.allocate_memory(info, None) }.map_err(VulkanError::Api)
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        if memory != vk::DeviceMemory::null() {
            unsafe { self.device.free_memory(memory, None) };
        }
    }

    fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> VulkanResult<*mut u8> {
        unsafe { self.device.map_memory(memory, offset, size, vk::MemoryMapFlags::empty()) }
            .map(|ptr| ptr.cast::<u8>())
            .map_err(VulkanError::Api)
    }

    fn unmap_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.device.unmap_memory(memory) };
    }

    fn create_buffer(&self, info: &vk::BufferCreateInfo) -> VulkanResult<vk::Buffer> {
        unsafe { self.device.create_buffer(info, None) }.map_err(VulkanError::Api)
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        if buffer != vk::Buffer::null() {
            unsafe { self.device.destroy_buffer(buffer, None) };
        }
    }

    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        unsafe { self.device.get_buffer_memory_requirements(buffer) }
    }

    fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VulkanResult<()> {
        unsafe { self.device.bind_buffer_memory(buffer, memory, offset) }.map_err(VulkanError::Api)
    }

    fn create_image(&self, info: &vk::ImageCreateInfo) -> VulkanResult<vk::Image> {
        unsafe { self.device.create_image(info, None) }.map_err(VulkanError::Api)
    }

    fn destroy_image(&self, image: vk::Image) {
        if image != vk::Image::null() {
            unsafe { self.device.destroy_image(image, None) };
        }
    }

    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        unsafe { self.device.get_image_memory_requirements(image) }
    }

    fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VulkanResult<()> {
        unsafe { self.device.bind_image_memory(image, memory, offset) }.map_err(VulkanError::Api)
    }

    fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> VulkanResult<vk::ImageView> {
        unsafe { self.device.create_image_view(info, None) }.map_err(VulkanError::Api)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        if view != vk::ImageView::null() {
            unsafe { self.device.destroy_image_view(view, None) };
        }
    }

    fn create_sampler(&self, info: &vk::SamplerCreateInfo) -> VulkanResult<vk::Sampler> {
        unsafe { self.device.create_sampler(info, None) }.map_err(VulkanError::Api)
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        if sampler != vk::Sampler::null() {
            unsafe { self.device.destroy_sampler(sampler, None) };
        }
    }

    fn create_shader_module(&self, code: &[u32]) -> VulkanResult<vk::ShaderModule> {
        let info = vk::ShaderModuleCreateInfo::builder().code(code);
        unsafe { self.device.create_shader_module(&info, None) }.map_err(VulkanError::Api)
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        if module != vk::ShaderModule::null() {
            unsafe { self.device.destroy_shader_module(module, None) };
        }
    }

    fn create_descriptor_set_layout(
        &self,
        info: &vk::DescriptorSetLayoutCreateInfo,
    ) -> VulkanResult<vk::DescriptorSetLayout> {
        unsafe { self.device.create_descriptor_set_layout(info, None) }.map_err(VulkanError::Api)
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        if layout != vk::DescriptorSetLayout::null() {
            unsafe { self.device.destroy_descriptor_set_layout(layout, None) };
        }
    }

    fn create_descriptor_pool(
        &self,
        info: &vk::DescriptorPoolCreateInfo,
    ) -> VulkanResult<vk::DescriptorPool> {
        unsafe { self.device.create_descriptor_pool(info, None) }.map_err(VulkanError::Api)
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        if pool != vk::DescriptorPool::null() {
            unsafe { self.device.destroy_descriptor_pool(pool, None) };
        }
    }

    fn allocate_descriptor_sets(
        &self,
        info: &vk::DescriptorSetAllocateInfo,
    ) -> VulkanResult<Vec<vk::DescriptorSet>> {
        unsafe { self.device.allocate_descriptor_sets(info) }.map_err(VulkanError::Api)
    }

    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet]) {
        unsafe { self.device.update_descriptor_sets(writes, &[]) };
    }

    fn create_pipeline_layout(
        &self,
        info: &vk::PipelineLayoutCreateInfo,
    ) -> VulkanResult<vk::PipelineLayout> {
        unsafe { self.device.create_pipeline_layout(info, None) }.map_err(VulkanError::Api)
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        if layout != vk::PipelineLayout::null() {
            unsafe { self.device.destroy_pipeline_layout(layout, None) };
        }
    }

    fn create_graphics_pipeline(
        &self,
        info: &vk::GraphicsPipelineCreateInfo,
    ) -> VulkanResult<vk::Pipeline> {
        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(info), None)
        }
        .map_err(|(_, result)| VulkanError::Api(result))?;

        pipelines.into_iter().next().ok_or(VulkanError::InvalidOperation {
            reason: "driver returned no pipeline".to_string(),
        })
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        if pipeline != vk::Pipeline::null() {
            unsafe { self.device.destroy_pipeline(pipeline, None) };
        }
    }

    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo) -> VulkanResult<vk::RenderPass> {
        unsafe { self.device.create_render_pass(info, None) }.map_err(VulkanError::Api)
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        if render_pass != vk::RenderPass::null() {
            unsafe { self.device.destroy_render_pass(render_pass, None) };
        }
    }

    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo) -> VulkanResult<vk::Framebuffer> {
        unsafe { self.device.create_framebuffer(info, None) }.map_err(VulkanError::Api)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        if framebuffer != vk::Framebuffer::null() {
            unsafe { self.device.destroy_framebuffer(framebuffer, None) };
        }
    }

    fn create_command_pool(&self, flags: vk::CommandPoolCreateFlags) -> VulkanResult<vk::CommandPool> {
        let info = vk::CommandPoolCreateInfo::builder()
            .flags(flags)
            .queue_family_index(self.graphics_family);
        unsafe { self.device.create_command_pool(&info, None) }.map_err(VulkanError::Api)
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        if pool != vk::CommandPool::null() {
            unsafe { self.device.destroy_command_pool(pool, None) };
        }
    }

    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> VulkanResult<vk::CommandBuffer> {
        let info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe { self.device.allocate_command_buffers(&info) }.map_err(VulkanError::Api)?;
        buffers.into_iter().next().ok_or(VulkanError::InvalidOperation {
            reason: "driver returned no command buffer".to_string(),
        })
    }

    fn free_command_buffer(&self, pool: vk::CommandPool, command_buffer: vk::CommandBuffer) {
        if command_buffer != vk::CommandBuffer::null() {
            unsafe { self.device.free_command_buffers(pool, &[command_buffer]) };
        }
    }

    fn begin_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> VulkanResult<()> {
        let info = vk::CommandBufferBeginInfo::builder().flags(flags);
        unsafe { self.device.begin_command_buffer(command_buffer, &info) }.map_err(VulkanError::Api)
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        unsafe { self.device.end_command_buffer(command_buffer) }.map_err(VulkanError::Api)
    }

    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        unsafe {
            self.device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
        }
        .map_err(VulkanError::Api)
    }

    fn cmd_copy_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: &[vk::BufferCopy],
    ) {
        unsafe { self.device.cmd_copy_buffer(command_buffer, src, dst, regions) };
    }

    fn cmd_copy_buffer_to_image(
        &self,
        command_buffer: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        unsafe {
            self.device
                .cmd_copy_buffer_to_image(command_buffer, src, dst, layout, regions);
        }
    }

    fn cmd_image_barrier(
        &self,
        command_buffer: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barrier: &vk::ImageMemoryBarrier,
    ) {
        unsafe {
            self.device.cmd_pipeline_barrier(
                command_buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                std::slice::from_ref(barrier),
            );
        }
    }

    fn cmd_buffer_barrier(
        &self,
        command_buffer: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barrier: &vk::BufferMemoryBarrier,
    ) {
        unsafe {
            self.device.cmd_pipeline_barrier(
                command_buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                std::slice::from_ref(barrier),
                &[],
            );
        }
    }

    fn cmd_begin_render_pass(&self, command_buffer: vk::CommandBuffer, info: &vk::RenderPassBeginInfo) {
        unsafe {
            self.device
                .cmd_begin_render_pass(command_buffer, info, vk::SubpassContents::INLINE);
        }
    }

    fn cmd_next_subpass(&self, command_buffer: vk::CommandBuffer) {
        unsafe { self.device.cmd_next_subpass(command_buffer, vk::SubpassContents::INLINE) };
    }

    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(command_buffer) };
    }

    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
    }

    fn cmd_bind_descriptor_set(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &[set],
                &[],
            );
        }
    }

    fn cmd_bind_vertex_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
    ) {
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(command_buffer, 0, &[buffer], &[offset]);
        }
    }

    fn cmd_bind_index_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    ) {
        unsafe {
            self.device
                .cmd_bind_index_buffer(command_buffer, buffer, offset, index_type);
        }
    }

    fn cmd_set_viewport(&self, command_buffer: vk::CommandBuffer, viewport: &vk::Viewport) {
        unsafe {
            self.device
                .cmd_set_viewport(command_buffer, 0, std::slice::from_ref(viewport));
        }
    }

    fn cmd_set_scissor(&self, command_buffer: vk::CommandBuffer, scissor: &vk::Rect2D) {
        unsafe {
            self.device
                .cmd_set_scissor(command_buffer, 0, std::slice::from_ref(scissor));
        }
    }

    fn cmd_draw(
        &self,
        command_buffer: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        unsafe {
            self.device
                .cmd_draw(command_buffer, vertex_count, instance_count, first_vertex, first_instance);
        }
    }

    fn cmd_draw_indexed(
        &self,
        command_buffer: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.cmd_draw_indexed(
                command_buffer,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
    }

    fn cmd_reset_query_pool(
        &self,
        command_buffer: vk::CommandBuffer,
        pool: vk::QueryPool,
        first_query: u32,
        query_count: u32,
    ) {
        unsafe {
            self.device
                .cmd_reset_query_pool(command_buffer, pool, first_query, query_count);
        }
    }

    fn cmd_write_timestamp(
        &self,
        command_buffer: vk::CommandBuffer,
        stage: vk::PipelineStageFlags,
        pool: vk::QueryPool,
        query: u32,
    ) {
        unsafe { self.device.cmd_write_timestamp(command_buffer, stage, pool, query) };
    }

    fn create_fence(&self, signaled: bool) -> VulkanResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::builder().flags(flags);
        unsafe { self.device.create_fence(&info, None) }.map_err(VulkanError::Api)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        if fence != vk::Fence::null() {
            unsafe { self.device.destroy_fence(fence, None) };
        }
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> VulkanResult<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, timeout) }.map_err(VulkanError::Api)
    }

    fn reset_fence(&self, fence: vk::Fence) -> VulkanResult<()> {
        unsafe { self.device.reset_fences(&[fence]) }.map_err(VulkanError::Api)
    }

    fn create_semaphore(&self) -> VulkanResult<vk::Semaphore> {
        let info = vk::SemaphoreCreateInfo::builder();
        unsafe { self.device.create_semaphore(&info, None) }.map_err(VulkanError::Api)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        if semaphore != vk::Semaphore::null() {
            unsafe { self.device.destroy_semaphore(semaphore, None) };
        }
    }

    fn queue_submit(&self, submits: &[vk::SubmitInfo], fence: vk::Fence) -> VulkanResult<()> {
        unsafe { self.device.queue_submit(self.graphics_queue, submits, fence) }.map_err(VulkanError::Api)
    }

    fn queue_wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.queue_wait_idle(self.graphics_queue) }.map_err(VulkanError::Api)
    }

    fn device_wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle() }.map_err(VulkanError::Api)
    }

    fn create_timestamp_query_pool(&self, query_count: u32) -> VulkanResult<vk::QueryPool> {
        let info = vk::QueryPoolCreateInfo::builder()
            .query_type(vk::QueryType::TIMESTAMP)
            .query_count(query_count);
        unsafe { self.device.create_query_pool(&info, None) }.map_err(VulkanError::Api)
    }

    fn destroy_query_pool(&self, pool: vk::QueryPool) {
        if pool != vk::QueryPool::null() {
            unsafe { self.device.destroy_query_pool(pool, None) };
        }
    }

    fn query_results(&self, pool: vk::QueryPool, first_query: u32, query_count: u32) -> VulkanResult<Vec<u64>> {
        let mut results = vec![0_u64; query_count as usize];
        unsafe {
            self.device.get_query_pool_results(
                pool,
                first_query,
                query_count,
                &mut results,
                vk::QueryResultFlags::TYPE_64 | vk::QueryResultFlags::WAIT,
            )
        }
        .map_err(VulkanError::Api)?;
        Ok(results)
    }

    fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR) -> VulkanResult<vk::SwapchainKHR> {
        unsafe { self.swapchain_loader.create_swapchain(info, None) }.map_err(VulkanError::Api)
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        if swapchain != vk::SwapchainKHR::null() {
            unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) };
        }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VulkanResult<Vec<vk::Image>> {
        unsafe { self.swapchain_loader.get_swapchain_images(swapchain) }.map_err(VulkanError::Api)
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> VulkanResult<(u32, bool)> {
        unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, u64::MAX, signal, vk::Fence::null())
        }
        .map_err(VulkanError::Api)
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VulkanResult<bool> {
        let wait_semaphores = [wait];
        let swapchains = [swapchain];
        let image_indices = [image_index];
        let info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        unsafe { self.swapchain_loader.queue_present(self.graphics_queue, &info) }.map_err(VulkanError::Api)
    }
}
