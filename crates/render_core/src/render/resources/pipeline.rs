//! Graphics pipelines and their descriptor sets
//!
//! Every [`PipelineType`] owns one pipeline, one layout, one descriptor-set
//! layout and one descriptor set, all derived from the merged reflection of its
//! [`ShaderProgram`]. Resources are registered per binding up front with
//! [`PipelineManager::prepare_resource_binding`]; the bind calls fill in the
//! descriptor payload, and [`PipelineManager::update_descriptor_sets`] pushes
//! the payload of every active pipeline to the driver.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use ash::vk;
use bitflags::bitflags;

use crate::render::backends::GpuDevice;
use crate::render::context::GraphicsContext;
use crate::render::error::{VulkanError, VulkanResult};
use crate::render::resources::buffer::Buffer;
use crate::render::resources::image::Image;
use crate::render::resources::shader::ShaderProgram;
use crate::render::types::{BoundResourceType, PipelineType};

bitflags! {
    /// Set of pipelines whose descriptor sets are refreshed this frame
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PipelineMask: u32 {
        /// [`PipelineType::DefaultLit`]
        const DEFAULT_LIT = 1 << 0;
        /// [`PipelineType::DefaultLitWireframe`]
        const DEFAULT_LIT_WIREFRAME = 1 << 1;
        /// [`PipelineType::WorldSpaceText`]
        const WORLD_SPACE_TEXT = 1 << 2;
        /// [`PipelineType::WorldSpaceTextWireframe`]
        const WORLD_SPACE_TEXT_WIREFRAME = 1 << 3;
        /// [`PipelineType::ScreenSpaceText`]
        const SCREEN_SPACE_TEXT = 1 << 4;
        /// [`PipelineType::PostProcessing`]
        const POST_PROCESSING = 1 << 5;
    }
}

impl PipelineMask {
    /// Mask with the single bit for `pipeline_type`
    pub const fn of(pipeline_type: PipelineType) -> Self {
        match pipeline_type {
            PipelineType::DefaultLit => Self::DEFAULT_LIT,
            PipelineType::DefaultLitWireframe => Self::DEFAULT_LIT_WIREFRAME,
            PipelineType::WorldSpaceText => Self::WORLD_SPACE_TEXT,
            PipelineType::WorldSpaceTextWireframe => Self::WORLD_SPACE_TEXT_WIREFRAME,
            PipelineType::ScreenSpaceText => Self::SCREEN_SPACE_TEXT,
            PipelineType::PostProcessing => Self::POST_PROCESSING,
        }
    }

    /// Union of the bits for every type in `types`
    pub fn from_types(types: &[PipelineType]) -> Self {
        types
            .iter()
            .fold(Self::empty(), |mask, pipeline_type| mask | Self::of(*pipeline_type))
    }
}

/// Everything needed to build one graphics pipeline
#[derive(Clone)]
pub struct PipelineCreateInfo {
    /// Name used in logs
    pub name: String,
    /// Slot the pipeline is stored under
    pub pipeline_type: PipelineType,
    /// Linked vertex + fragment program
    pub program: Arc<ShaderProgram>,
    /// Render pass the pipeline is compatible with
    pub render_pass: vk::RenderPass,
    /// Subpass index within `render_pass`
    pub subpass: u32,
    /// Primitive topology
    pub topology: vk::PrimitiveTopology,
    /// Rasterization samples
    pub samples: vk::SampleCountFlags,
    /// Face culling
    pub cull_mode: vk::CullModeFlags,
    /// Winding of front faces
    pub front_face: vk::FrontFace,
    /// Fill or line rasterization
    pub polygon_mode: vk::PolygonMode,
    /// Source-alpha blending
    pub enable_blending: bool,
    /// Depth test + write with LESS
    pub enable_depth: bool,
}

impl PipelineCreateInfo {
    /// Triangle-list, back-face culled, clockwise, filled, blended, depth-tested pipeline
    pub fn new(
        name: impl Into<String>,
        pipeline_type: PipelineType,
        program: Arc<ShaderProgram>,
        render_pass: vk::RenderPass,
        subpass: u32,
    ) -> Self {
        Self {
            name: name.into(),
            pipeline_type,
            program,
            render_pass,
            subpass,
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            samples: vk::SampleCountFlags::TYPE_1,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::CLOCKWISE,
            polygon_mode: vk::PolygonMode::FILL,
            enable_blending: true,
            enable_depth: true,
        }
    }

    /// Set the polygon mode
    pub fn with_polygon_mode(mut self, polygon_mode: vk::PolygonMode) -> Self {
        self.polygon_mode = polygon_mode;
        self
    }

    /// Turn depth testing and writing off
    pub fn without_depth(mut self) -> Self {
        self.enable_depth = false;
        self
    }
}

/// Descriptor payload for one binding
#[derive(Debug, Clone, Copy)]
pub struct BoundResource {
    /// Kind of resource the binding expects
    pub resource_type: BoundResourceType,
    /// Descriptor type written
    pub descriptor_type: vk::DescriptorType,
    /// Image payload, used by image and input-attachment bindings
    pub image_info: vk::DescriptorImageInfo,
    /// Buffer payload, used by uniform and storage bindings
    pub buffer_info: vk::DescriptorBufferInfo,
}

impl BoundResource {
    fn uses_image_info(&self) -> bool {
        matches!(
            self.resource_type,
            BoundResourceType::Image
                | BoundResourceType::ColorInputAttachment
                | BoundResourceType::DepthInputAttachment
        )
    }
}

/// Driver objects and bindings of one pipeline
#[derive(Debug, Default)]
pub struct PipelineResources {
    /// Graphics pipeline
    pub pipeline: vk::Pipeline,
    /// Pipeline layout
    pub layout: vk::PipelineLayout,
    /// Layout of the single descriptor set
    pub descriptor_set_layout: vk::DescriptorSetLayout,
    /// Descriptor set, owned by the context's pool
    pub descriptor_set: vk::DescriptorSet,
    /// Registered bindings by binding number
    pub bound_resources: BTreeMap<u32, BoundResource>,
}

impl PipelineResources {
    fn destroy(&mut self, device: &dyn GpuDevice) {
        device.destroy_pipeline(self.pipeline);
        device.destroy_pipeline_layout(self.layout);
        device.destroy_descriptor_set_layout(self.descriptor_set_layout);
        self.pipeline = vk::Pipeline::null();
        self.layout = vk::PipelineLayout::null();
        self.descriptor_set_layout = vk::DescriptorSetLayout::null();
    }
}

/// Builds and binds the renderer's pipelines
pub struct PipelineManager {
    device: Arc<dyn GpuDevice>,
    pipelines: HashMap<PipelineType, PipelineResources>,
    active: PipelineMask,
    current_bound: Option<PipelineType>,
}

impl PipelineManager {
    /// Create an empty manager for `device`
    pub fn new(device: Arc<dyn GpuDevice>) -> Self {
        Self {
            device,
            pipelines: HashMap::new(),
            active: PipelineMask::empty(),
            current_bound: None,
        }
    }

    /// Build the pipeline described by `info` and store it under its type
    ///
    /// A pipeline already stored under the same type is destroyed first.
    pub fn create_pipeline(&mut self, context: &GraphicsContext, info: &PipelineCreateInfo) -> VulkanResult<()> {
        if let Some(mut previous) = self.pipelines.remove(&info.pipeline_type) {
            previous.destroy(self.device.as_ref());
        }

        let mut resources = PipelineResources::default();
        match self.build_pipeline(context, info, &mut resources) {
            Ok(()) => {
                log::info!("Pipeline Manager: Loading Asset \"{}\"", info.name);
                self.pipelines.insert(info.pipeline_type, resources);
                Ok(())
            }
            Err(e) => {
                log::error!("Pipeline Manager: failed to build \"{}\": {e}", info.name);
                resources.destroy(self.device.as_ref());
                Err(e)
            }
        }
    }

    fn build_pipeline(
        &self,
        context: &GraphicsContext,
        info: &PipelineCreateInfo,
        resources: &mut PipelineResources,
    ) -> VulkanResult<()> {
        let device = self.device.as_ref();
        let program = &info.program;

        let layout_info =
            vk::DescriptorSetLayoutCreateInfo::builder().bindings(&program.merged_descriptor_bindings);
        resources.descriptor_set_layout = device.create_descriptor_set_layout(&layout_info)?;

        let set_layouts = [resources.descriptor_set_layout];
        let allocate_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(context.descriptor_pool)
            .set_layouts(&set_layouts);
        resources.descriptor_set = device
            .allocate_descriptor_sets(&allocate_info)?
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: "descriptor pool returned no set".to_string(),
            })?;

        let pipeline_layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&program.merged_push_constant_ranges);
        resources.layout = device.create_pipeline_layout(&pipeline_layout_info)?;

        // A vertex stage without inputs gets no binding at all
        let vertex_bindings: &[vk::VertexInputBindingDescription] = if program.vertex.vertex_attributes.is_empty() {
            &[]
        } else {
            &program.vertex.vertex_bindings
        };
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(vertex_bindings)
            .vertex_attribute_descriptions(&program.vertex.vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(info.topology)
            .primitive_restart_enable(false);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .polygon_mode(info.polygon_mode)
            .cull_mode(info.cull_mode)
            .front_face(info.front_face)
            .line_width(1.0);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder().rasterization_samples(info.samples);

        let depth_stencil = if info.enable_depth {
            vk::PipelineDepthStencilStateCreateInfo::builder()
                .depth_test_enable(true)
                .depth_write_enable(true)
                .depth_compare_op(vk::CompareOp::LESS)
        } else {
            vk::PipelineDepthStencilStateCreateInfo::builder()
                .depth_test_enable(false)
                .depth_write_enable(false)
                .depth_compare_op(vk::CompareOp::ALWAYS)
        }
        .depth_bounds_test_enable(false);

        let mut blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(
                vk::ColorComponentFlags::R
                    | vk::ColorComponentFlags::G
                    | vk::ColorComponentFlags::B
                    | vk::ColorComponentFlags::A,
            )
            .blend_enable(info.enable_blending);
        if info.enable_blending {
            blend_attachment = blend_attachment
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
                .alpha_blend_op(vk::BlendOp::ADD);
        }
        let blend_attachments = [blend_attachment.build()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder().attachments(&blend_attachments);

        let viewports = [context.viewport];
        let scissors = [context.scissor];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(&viewports)
            .scissors(&scissors);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(program.vertex.handle)
                .name(&program.vertex.entry_point)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(program.fragment.handle)
                .name(&program.fragment.entry_point)
                .build(),
        ];

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .viewport_state(&viewport_state)
            .dynamic_state(&dynamic_state)
            .layout(resources.layout)
            .render_pass(info.render_pass)
            .subpass(info.subpass);

        resources.pipeline = device.create_graphics_pipeline(&pipeline_info)?;
        Ok(())
    }

    /// Register the kind of resource `binding` of `pipeline_type` expects
    ///
    /// Resets any payload previously bound to that slot.
    pub fn prepare_resource_binding(
        &mut self,
        pipeline_type: PipelineType,
        binding: u32,
        resource_type: BoundResourceType,
        descriptor_type: vk::DescriptorType,
    ) -> VulkanResult<()> {
        self.resources_mut(pipeline_type)?.bound_resources.insert(
            binding,
            BoundResource {
                resource_type,
                descriptor_type,
                image_info: vk::DescriptorImageInfo::default(),
                buffer_info: vk::DescriptorBufferInfo::default(),
            },
        );
        Ok(())
    }

    /// Point an image binding at `image`'s view with the shared sampler
    pub fn bind_image_resource(
        &mut self,
        pipeline_type: PipelineType,
        binding: u32,
        image: &Image,
        sampler: vk::Sampler,
    ) -> VulkanResult<()> {
        self.bound_resource_mut(pipeline_type, binding)?.image_info = vk::DescriptorImageInfo {
            sampler,
            image_view: image.view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };
        Ok(())
    }

    /// Point an input-attachment binding at `image`'s view in `layout`
    pub fn bind_input_attachment_resource(
        &mut self,
        pipeline_type: PipelineType,
        binding: u32,
        image: &Image,
        layout: vk::ImageLayout,
    ) -> VulkanResult<()> {
        self.bound_resource_mut(pipeline_type, binding)?.image_info = vk::DescriptorImageInfo {
            sampler: vk::Sampler::null(),
            image_view: image.view,
            image_layout: layout,
        };
        Ok(())
    }

    /// Point a buffer binding at `range` bytes of `buffer` from `offset`
    ///
    /// Pass `vk::WHOLE_SIZE` as `range` to cover the rest of the buffer.
    pub fn bind_buffer_resource(
        &mut self,
        pipeline_type: PipelineType,
        binding: u32,
        buffer: &Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    ) -> VulkanResult<()> {
        self.bound_resource_mut(pipeline_type, binding)?.buffer_info = vk::DescriptorBufferInfo {
            buffer: buffer.handle,
            offset,
            range,
        };
        Ok(())
    }

    /// Move a bound buffer's offset without touching its buffer or range
    pub fn update_pipeline_bound_buffer_offset(
        &mut self,
        pipeline_type: PipelineType,
        binding: u32,
        offset: vk::DeviceSize,
    ) -> VulkanResult<()> {
        self.bound_resource_mut(pipeline_type, binding)?.buffer_info.offset = offset;
        Ok(())
    }

    /// Write every registered binding of every active pipeline
    ///
    /// One driver call per active pipeline; inactive pipelines are untouched.
    pub fn update_descriptor_sets(&self) {
        for pipeline_type in PipelineType::ALL {
            if !self.active.contains(PipelineMask::of(pipeline_type)) {
                continue;
            }
            let Some(resources) = self.pipelines.get(&pipeline_type) else {
                continue;
            };

            let writes: Vec<vk::WriteDescriptorSet> = resources
                .bound_resources
                .iter()
                .map(|(binding, resource)| {
                    let write = vk::WriteDescriptorSet::builder()
                        .dst_set(resources.descriptor_set)
                        .dst_binding(*binding)
                        .descriptor_type(resource.descriptor_type);
                    if resource.uses_image_info() {
                        write.image_info(std::slice::from_ref(&resource.image_info)).build()
                    } else {
                        write.buffer_info(std::slice::from_ref(&resource.buffer_info)).build()
                    }
                })
                .collect();

            self.device.update_descriptor_sets(&writes);
        }
    }

    /// Bind `pipeline_type`'s descriptor set and then the pipeline itself
    pub fn bind_pipeline(
        &mut self,
        command_buffer: vk::CommandBuffer,
        pipeline_type: PipelineType,
    ) -> VulkanResult<()> {
        let resources = self.pipelines.get(&pipeline_type).ok_or_else(|| missing(pipeline_type))?;
        self.current_bound = Some(pipeline_type);

        self.device
            .cmd_bind_descriptor_set(command_buffer, resources.layout, resources.descriptor_set);
        self.device.cmd_bind_pipeline(command_buffer, resources.pipeline);
        Ok(())
    }

    /// Replace the active set with exactly the pipelines in `types`
    pub fn set_active_pipelines(&mut self, types: &[PipelineType]) {
        self.active = PipelineMask::from_types(types);
    }

    /// Pipelines refreshed by [`PipelineManager::update_descriptor_sets`]
    pub fn active_pipelines(&self) -> PipelineMask {
        self.active
    }

    /// Type passed to the last [`PipelineManager::bind_pipeline`]
    pub fn current_bound(&self) -> Option<PipelineType> {
        self.current_bound
    }

    /// Resources of `pipeline_type`, if created
    pub fn pipeline(&self, pipeline_type: PipelineType) -> Option<&PipelineResources> {
        self.pipelines.get(&pipeline_type)
    }

    /// Destroy every pipeline
    pub fn destroy_all(&mut self) {
        for resources in self.pipelines.values_mut() {
            resources.destroy(self.device.as_ref());
        }
        self.pipelines.clear();
        self.current_bound = None;
    }

    fn resources_mut(&mut self, pipeline_type: PipelineType) -> VulkanResult<&mut PipelineResources> {
        self.pipelines.get_mut(&pipeline_type).ok_or_else(|| missing(pipeline_type))
    }

    fn bound_resource_mut(&mut self, pipeline_type: PipelineType, binding: u32) -> VulkanResult<&mut BoundResource> {
        self.resources_mut(pipeline_type)?
            .bound_resources
            .get_mut(&binding)
            .ok_or_else(|| VulkanError::ResourceNotFound {
                what: format!("binding {binding} of {pipeline_type:?}"),
            })
    }
}

impl Drop for PipelineManager {
    fn drop(&mut self) {
        self.destroy_all();
    }
}

fn missing(pipeline_type: PipelineType) -> VulkanError {
    VulkanError::ResourceNotFound {
        what: format!("pipeline {pipeline_type:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    use crate::core::config::RendererConfig;
    use crate::render::backends::{HeadlessDevice, RecordedCommand};
    use crate::render::resources::buffer::BufferManager;
    use crate::render::resources::image::ImageManager;
    use crate::render::resources::shader::ShaderModule;

    fn module(stage: vk::ShaderStageFlags) -> Arc<ShaderModule> {
        Arc::new(ShaderModule {
            handle: vk::ShaderModule::null(),
            stage,
            entry_point: CString::new("main").unwrap(),
            descriptor_bindings: Vec::new(),
            push_constant_ranges: Vec::new(),
            vertex_attributes: Vec::new(),
            vertex_bindings: Vec::new(),
        })
    }

    fn program() -> Arc<ShaderProgram> {
        Arc::new(ShaderProgram {
            vertex: module(vk::ShaderStageFlags::VERTEX),
            fragment: module(vk::ShaderStageFlags::FRAGMENT),
            merged_descriptor_bindings: Vec::new(),
            merged_push_constant_ranges: Vec::new(),
        })
    }

    struct Fixture {
        device: Arc<HeadlessDevice>,
        context: GraphicsContext,
        images: ImageManager,
        buffers: BufferManager,
    }

    fn fixture() -> Fixture {
        let device = Arc::new(HeadlessDevice::new(320, 240));
        let buffers = BufferManager::new(device.clone());
        let images = ImageManager::new(device.clone());
        let context = GraphicsContext::new(device.clone(), &RendererConfig::default(), &buffers, &images).unwrap();
        Fixture {
            device,
            context,
            images,
            buffers,
        }
    }

    fn create(manager: &mut PipelineManager, context: &GraphicsContext, pipeline_type: PipelineType) {
        let info =
            PipelineCreateInfo::new(format!("{pipeline_type:?}"), pipeline_type, program(), context.render_pass, 0);
        manager.create_pipeline(context, &info).unwrap();
    }

    #[test]
    fn test_mask_from_types() {
        let mask = PipelineMask::from_types(&[PipelineType::DefaultLit, PipelineType::PostProcessing]);
        assert!(mask.contains(PipelineMask::DEFAULT_LIT));
        assert!(mask.contains(PipelineMask::POST_PROCESSING));
        assert!(!mask.contains(PipelineMask::DEFAULT_LIT_WIREFRAME));
        assert_eq!(PipelineMask::from_types(&PipelineType::ALL), PipelineMask::all());
    }

    #[test]
    fn test_create_info_defaults() {
        let info = PipelineCreateInfo::new("Post", PipelineType::PostProcessing, program(), vk::RenderPass::null(), 1)
            .without_depth();
        assert_eq!(info.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(info.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(info.front_face, vk::FrontFace::CLOCKWISE);
        assert_eq!(info.polygon_mode, vk::PolygonMode::FILL);
        assert!(info.enable_blending);
        assert!(!info.enable_depth);
        assert_eq!(info.subpass, 1);
    }

    #[test]
    fn test_update_descriptor_sets_only_touches_active_pipelines() {
        let fx = fixture();
        let mut manager = PipelineManager::new(fx.device.clone());
        for pipeline_type in [PipelineType::DefaultLit, PipelineType::DefaultLitWireframe] {
            create(&mut manager, &fx.context, pipeline_type);
            manager
                .prepare_resource_binding(
                    pipeline_type,
                    0,
                    BoundResourceType::UniformBuffer,
                    vk::DescriptorType::UNIFORM_BUFFER,
                )
                .unwrap();
            manager
                .prepare_resource_binding(
                    pipeline_type,
                    1,
                    BoundResourceType::StorageBuffer,
                    vk::DescriptorType::STORAGE_BUFFER,
                )
                .unwrap();
            manager
                .bind_buffer_resource(pipeline_type, 0, &fx.context.global_buffer, 0, vk::WHOLE_SIZE)
                .unwrap();
        }

        manager.set_active_pipelines(&[PipelineType::DefaultLit]);
        manager.update_descriptor_sets();
        assert_eq!(fx.device.descriptor_write_batches(), vec![2]);

        manager.set_active_pipelines(&[PipelineType::DefaultLit, PipelineType::DefaultLitWireframe]);
        manager.update_descriptor_sets();
        assert_eq!(fx.device.descriptor_write_batches(), vec![2, 2, 2]);
    }

    #[test]
    fn test_buffer_offset_update_keeps_buffer_and_range() {
        let fx = fixture();
        let mut manager = PipelineManager::new(fx.device.clone());
        create(&mut manager, &fx.context, PipelineType::WorldSpaceText);
        manager
            .prepare_resource_binding(
                PipelineType::WorldSpaceText,
                1,
                BoundResourceType::StorageBuffer,
                vk::DescriptorType::STORAGE_BUFFER,
            )
            .unwrap();
        manager
            .bind_buffer_resource(PipelineType::WorldSpaceText, 1, &fx.context.instance_buffer, 0, vk::WHOLE_SIZE)
            .unwrap();

        manager
            .update_pipeline_bound_buffer_offset(PipelineType::WorldSpaceText, 1, 640)
            .unwrap();

        let info = manager.pipeline(PipelineType::WorldSpaceText).unwrap().bound_resources[&1].buffer_info;
        assert_eq!(info.offset, 640);
        assert_eq!(info.range, vk::WHOLE_SIZE);
        assert_eq!(info.buffer, fx.context.instance_buffer.handle);
    }

    #[test]
    fn test_binding_unprepared_slot_is_an_error() {
        let fx = fixture();
        let mut manager = PipelineManager::new(fx.device.clone());
        create(&mut manager, &fx.context, PipelineType::DefaultLit);

        let result = manager.bind_buffer_resource(PipelineType::DefaultLit, 7, &fx.context.global_buffer, 0, 16);
        assert!(matches!(result, Err(VulkanError::ResourceNotFound { .. })));
        let result = manager.update_pipeline_bound_buffer_offset(PipelineType::ScreenSpaceText, 1, 0);
        assert!(matches!(result, Err(VulkanError::ResourceNotFound { .. })));
    }

    #[test]
    fn test_input_attachment_binding_has_no_sampler() {
        let fx = fixture();
        let mut manager = PipelineManager::new(fx.device.clone());
        create(&mut manager, &fx.context, PipelineType::PostProcessing);
        manager
            .prepare_resource_binding(
                PipelineType::PostProcessing,
                4,
                BoundResourceType::DepthInputAttachment,
                vk::DescriptorType::INPUT_ATTACHMENT,
            )
            .unwrap();

        let depth = fx.context.swapchain.depth_images[0];
        manager
            .bind_input_attachment_resource(
                PipelineType::PostProcessing,
                4,
                &depth,
                vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            )
            .unwrap();

        let resource = manager.pipeline(PipelineType::PostProcessing).unwrap().bound_resources[&4];
        assert!(resource.uses_image_info());
        assert_eq!(resource.image_info.sampler, vk::Sampler::null());
        assert_eq!(resource.image_info.image_view, depth.view);
        assert_eq!(resource.image_info.image_layout, vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn test_bind_pipeline_binds_set_then_pipeline_every_time() {
        let fx = fixture();
        let mut manager = PipelineManager::new(fx.device.clone());
        create(&mut manager, &fx.context, PipelineType::DefaultLit);
        let resources = manager.pipeline(PipelineType::DefaultLit).unwrap();
        let (set, pipeline) = (resources.descriptor_set, resources.pipeline);
        fx.device.clear_commands();

        let cmd = fx.context.command_buffer;
        manager.bind_pipeline(cmd, PipelineType::DefaultLit).unwrap();
        manager.bind_pipeline(cmd, PipelineType::DefaultLit).unwrap();

        let commands = fx.device.commands();
        assert_eq!(commands.len(), 4);
        assert!(matches!(commands[0], RecordedCommand::BindDescriptorSet(s) if s == set));
        assert!(matches!(commands[1], RecordedCommand::BindPipeline(p) if p == pipeline));
        assert!(matches!(commands[2], RecordedCommand::BindDescriptorSet(s) if s == set));
        assert!(matches!(commands[3], RecordedCommand::BindPipeline(p) if p == pipeline));
        assert_eq!(manager.current_bound(), Some(PipelineType::DefaultLit));
        assert!(manager.bind_pipeline(cmd, PipelineType::ScreenSpaceText).is_err());
    }

    #[test]
    fn test_drop_destroys_pipeline_objects() {
        let fx = fixture();
        let live = fx.device.live_object_count();
        let mut manager = PipelineManager::new(fx.device.clone());
        create(&mut manager, &fx.context, PipelineType::DefaultLit);
        create(&mut manager, &fx.context, PipelineType::PostProcessing);
        // Layout, pipeline layout and pipeline per pipeline
        assert_eq!(fx.device.live_object_count(), live + 6);

        create(&mut manager, &fx.context, PipelineType::DefaultLit);
        assert_eq!(fx.device.live_object_count(), live + 6);

        drop(manager);
        assert_eq!(fx.device.live_object_count(), live);
    }
}
