//! Frame renderer
//!
//! Owns every manager and the [`GraphicsContext`], builds the six pipelines
//! with their static bindings, and drives one frame at a time through
//! acquire, record, submit and present.
//!
//! # Frame protocol
//!
//! 1. Wait for the single in-flight fence, acquire the next image. An
//!    out-of-date surface flags the swapchain stale and skips the frame.
//! 2. Stage every non-empty instance batch into the instance staging buffer,
//!    one region per batch kind, and copy the used range to the device-local
//!    instance buffer with one copy.
//! 3. Subpass 0 draws meshes, then world-space and screen-space glyphs over
//!    the shared unit quad. Subpass 1 runs the full-screen post-processing pass
//!    over the geometry attachments of the acquired image.
//! 4. Submit waiting on the acquire semaphore, present waiting on the submit
//!    semaphore, then read the GPU timestamps into the stats.
//!
//! # Teardown
//!
//! Fields are declared in release order: pipelines, fonts, meshes, images,
//! shaders, the GPU timer, then the context. [`Drop`] waits for the device
//! before any of them go.

use std::collections::BTreeMap;
use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;

use crate::core::config::RendererConfig;
use crate::foundation::stats::StatsTracker;
use crate::render::backends::GpuDevice;
use crate::render::context::GraphicsContext;
use crate::render::error::{RenderResult, VulkanError, VulkanResult};
use crate::render::gpu_timer::GpuTimer;
use crate::render::render_pass::{GEOMETRY_SUBPASS, POST_PROCESSING_SUBPASS};
use crate::render::resources::buffer::{Buffer, BufferManager};
use crate::render::resources::font::FontManager;
use crate::render::resources::image::ImageManager;
use crate::render::resources::mesh::MeshManager;
use crate::render::resources::pipeline::{PipelineCreateInfo, PipelineManager};
use crate::render::resources::shader::ShaderManager;
use crate::render::types::{
    BoundResourceType, GlobalData, InstanceBatch, MeshAssetType, PipelineType, RenderMode, RenderableDatapack,
    ShaderProgramType, TextureType,
};
use crate::render::utils::SingleTimeCommands;

/// Start of every instance region in the instance buffer is a multiple of this
///
/// 256 bytes is the largest `minStorageBufferOffsetAlignment` Vulkan allows.
pub const INSTANCE_REGION_ALIGNMENT: vk::DeviceSize = 256;

/// Binding of the [`GlobalData`] uniform buffer in every pipeline
pub const GLOBAL_DATA_BINDING: u32 = 0;
/// Binding of the instance storage buffer
pub const INSTANCE_BINDING: u32 = 1;
/// Binding of the pipeline's texture
pub const TEXTURE_BINDING: u32 = 2;
/// Post-processing binding of the geometry color attachment
pub const COLOR_INPUT_BINDING: u32 = 3;
/// Post-processing binding of the depth attachment
pub const DEPTH_INPUT_BINDING: u32 = 4;

/// Vertices of the full-screen quad baked into the post-processing shader
const POST_PROCESSING_VERTEX_COUNT: u32 = 6;

/// Bind order used outside wireframe mode: meshes, world text, screen text, post-processing
const SOLID_BIND_ORDER: [PipelineType; 4] = [
    PipelineType::DefaultLit,
    PipelineType::WorldSpaceText,
    PipelineType::ScreenSpaceText,
    PipelineType::PostProcessing,
];

/// Instanced two-subpass renderer
pub struct Renderer {
    pipelines: PipelineManager,
    fonts: FontManager,
    meshes: MeshManager,
    images: ImageManager,
    shaders: ShaderManager,
    timer: GpuTimer,
    context: GraphicsContext,
    buffers: BufferManager,

    stats: StatsTracker,
    bind_order: [PipelineType; 4],
    render_mode: RenderMode,
    current_image: u32,
    minimized: bool,
}

impl Renderer {
    /// Bring the renderer up on `device`
    ///
    /// Order: managers, graphics context, textures, meshes, fonts, shaders,
    /// pipelines and their static bindings. Any failure is logged and
    /// returned; whatever was built so far is released.
    pub fn new(device: Arc<dyn GpuDevice>, config: &RendererConfig) -> RenderResult<Self> {
        Self::build(device, config).map_err(|e| {
            log::error!("Renderer initialization failed: {e}");
            e
        })
    }

    fn build(device: Arc<dyn GpuDevice>, config: &RendererConfig) -> RenderResult<Self> {
        config.validate()?;
        log::info!("Renderer: initializing on \"{}\"", device.capabilities().device_name);

        let buffers = BufferManager::new(device.clone());
        let mut images = ImageManager::new(device.clone());
        let mut meshes = MeshManager::new(device.clone());
        let mut fonts = FontManager::new();
        let mut shaders = ShaderManager::new(device.clone());
        let mut pipelines = PipelineManager::new(device.clone());
        let timer = GpuTimer::new(device.clone())?;

        let context = GraphicsContext::new(device, config, &buffers, &images)?;

        images.load_textures(&context, &config.assets)?;
        meshes.load_builtin_meshes(&context)?;
        fonts.load_fonts(&context, &mut images, &config.assets)?;

        shaders.load_programs(&config.assets.shader_dir)?;
        create_pipelines(&mut pipelines, &context, &shaders)?;
        bind_static_resources(&mut pipelines, &context, &images)?;

        let mut renderer = Self {
            pipelines,
            fonts,
            meshes,
            images,
            shaders,
            timer,
            context,
            buffers,
            stats: StatsTracker::new(),
            bind_order: SOLID_BIND_ORDER,
            render_mode: RenderMode::Color,
            current_image: 0,
            minimized: false,
        };
        renderer.set_render_mode(RenderMode::Color);

        log::info!("Renderer: initialization complete");
        Ok(renderer)
    }

    /// Render and present one frame
    ///
    /// Returns `Ok(false)` when nothing was submitted: the window is minimized
    /// or the swapchain went out of date during acquire. Each batch's
    /// `first_instance` and the datapack's region offsets are written during
    /// upload.
    pub fn render(&mut self, datapack: &mut RenderableDatapack) -> RenderResult<bool> {
        if self.minimized {
            return Ok(false);
        }

        if self.context.swapchain_stale {
            self.recreate_swapchain()?;
        }

        self.stats.begin_cpu_frame();

        if !self.begin_frame(datapack)? {
            return Ok(false);
        }

        let draw_calls = self.record_commands(datapack)?;
        self.end_frame()?;

        self.stats.set_draw_calls(draw_calls);
        self.stats.end_cpu_frame();
        Ok(true)
    }

    /// Write `global_data` into the device-local uniform buffer
    pub fn upload_global_data(&self, global_data: &GlobalData) -> RenderResult<()> {
        let size = std::mem::size_of::<GlobalData>() as vk::DeviceSize;
        self.buffers
            .upload_data(&self.context.global_staging_buffer, std::slice::from_ref(global_data), 0)?;

        let commands = SingleTimeCommands::begin(self.context.device(), self.context.command_pool)?;
        self.buffers.copy_data(
            commands.handle(),
            &self.context.global_staging_buffer,
            &self.context.global_buffer,
            size,
            0,
            0,
        );
        commands.submit()?;
        Ok(())
    }

    /// Switch the debug visualization
    ///
    /// Wireframe swaps in the line-mode pipelines and needs non-solid fill
    /// support; without it the request is ignored and `false` is returned.
    /// The caller writes [`RenderMode::shader_value`] into [`GlobalData`].
    pub fn set_render_mode(&mut self, mode: RenderMode) -> bool {
        if mode == RenderMode::Wireframe {
            if !self.context.enabled_features.fill_mode_non_solid {
                log::warn!("Renderer: {mode}_MODE needs fillModeNonSolid, which this GPU lacks");
                return false;
            }
            self.bind_order[0] = PipelineType::DefaultLitWireframe;
            self.bind_order[1] = PipelineType::WorldSpaceTextWireframe;
        } else {
            self.bind_order[0] = PipelineType::DefaultLit;
            self.bind_order[1] = PipelineType::WorldSpaceText;
        }

        self.pipelines.set_active_pipelines(&self.bind_order);
        self.render_mode = mode;
        log::info!("Renderer: {mode}_MODE enabled!");
        true
    }

    /// Current debug visualization
    pub fn render_mode(&self) -> RenderMode {
        self.render_mode
    }

    /// React to a new drawable size
    ///
    /// A zero dimension marks the window minimized and frames are skipped
    /// until a non-zero size arrives; the swapchain is left alone meanwhile.
    pub fn on_window_resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            self.minimized = true;
            return;
        }
        self.minimized = false;
        self.context.set_screen_size(width, height);
    }

    /// Skip frames while the window is iconified
    pub fn set_minimized(&mut self, minimized: bool) {
        self.minimized = minimized;
    }

    /// Whether frames are currently skipped
    pub fn is_minimized(&self) -> bool {
        self.minimized
    }

    /// Rebuild the swapchain set at the surface's current size
    pub fn recreate_swapchain(&mut self) -> VulkanResult<()> {
        self.context.recreate_swapchain(&self.images)?;
        self.current_image = 0;
        Ok(())
    }

    /// Frame statistics
    pub fn stats(&self) -> &StatsTracker {
        &self.stats
    }

    /// Device handles and shared buffers
    pub fn context(&self) -> &GraphicsContext {
        &self.context
    }

    /// Baked fonts, for laying out text
    pub fn fonts(&self) -> &FontManager {
        &self.fonts
    }

    /// Uploaded meshes
    pub fn meshes(&self) -> &MeshManager {
        &self.meshes
    }

    /// Pipelines and their bindings
    pub fn pipelines(&self) -> &PipelineManager {
        &self.pipelines
    }

    /// Loaded shader modules and programs
    pub fn shaders(&self) -> &ShaderManager {
        &self.shaders
    }

    /// Pipelines drawn this frame, in bind order
    pub fn bind_order(&self) -> [PipelineType; 4] {
        self.bind_order
    }

    /// Wait for the previous frame, stage the instances and acquire an image
    ///
    /// Staging happens before the acquire so a staging error never leaves the
    /// acquire semaphore signaled. The fence is only reset once the frame is
    /// certain to be submitted, so an out-of-date acquire never leaves it unsignaled.
    fn begin_frame(&mut self, datapack: &mut RenderableDatapack) -> VulkanResult<bool> {
        let device = self.context.device_arc();
        let device = device.as_ref();
        device.wait_for_fence(self.context.in_flight_fence, u64::MAX)?;

        stage_renderable_datapack(&self.buffers, &self.context.instance_staging_buffer, datapack)?;

        match device.acquire_next_image(self.context.swapchain.handle, self.context.acquire_semaphore) {
            Ok((image_index, suboptimal)) => {
                if suboptimal {
                    self.context.swapchain_stale = true;
                }
                self.current_image = image_index;
            }
            Err(e) if e.is_out_of_date() => {
                log::debug!("Swapchain out of date on acquire");
                self.context.swapchain_stale = true;
                return Ok(false);
            }
            Err(e) => return Err(e),
        }

        device.reset_fence(self.context.in_flight_fence)?;
        device.reset_command_buffer(self.context.command_buffer)?;
        Ok(true)
    }

    /// Record the whole frame, returning the number of draw calls
    fn record_commands(&mut self, datapack: &RenderableDatapack) -> VulkanResult<u32> {
        let device = self.context.device_arc();
        let device = device.as_ref();
        let cmd = self.context.command_buffer;
        let image = self.current_image as usize;

        device.begin_command_buffer(cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        self.timer.start(cmd);

        self.copy_instances_to_device(cmd, datapack)?;

        let color = self.context.swapchain.geometry_color_images.get(image).ok_or_else(|| missing_image(image))?;
        let depth = self.context.swapchain.depth_images.get(image).ok_or_else(|| missing_image(image))?;
        self.pipelines.bind_input_attachment_resource(
            PipelineType::PostProcessing,
            COLOR_INPUT_BINDING,
            color,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;
        self.pipelines.bind_input_attachment_resource(
            PipelineType::PostProcessing,
            DEPTH_INPUT_BINDING,
            depth,
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        )?;
        self.pipelines.update_descriptor_sets();

        let framebuffer = *self.context.swapchain.framebuffers.get(image).ok_or_else(|| missing_image(image))?;
        let [r, g, b, _] = datapack.clear_color;
        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue { float32: [r, g, b, 1.0] },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            },
        ];
        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.context.render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: self.context.swapchain.extent,
            })
            .clear_values(&clear_values);
        device.cmd_begin_render_pass(cmd, &render_pass_info);

        let mut draw_calls = 0;

        // Geometry subpass
        self.set_viewport(cmd);
        self.pipelines.bind_pipeline(cmd, self.bind_order[0])?;
        for (mesh_type, batch) in &datapack.mesh_batches {
            if batch.is_empty() {
                continue;
            }
            let mesh = self
                .meshes
                .gpu_data(*mesh_type)
                .ok_or_else(|| VulkanError::ResourceNotFound {
                    what: format!("mesh {mesh_type:?}"),
                })?;
            device.cmd_bind_vertex_buffer(cmd, mesh.vertex_buffer.handle, 0);
            device.cmd_bind_index_buffer(cmd, mesh.index_buffer.handle, 0, vk::IndexType::UINT32);
            device.cmd_draw_indexed(cmd, mesh.index_count, batch.len() as u32, 0, 0, batch.first_instance);
            draw_calls += 1;
        }

        let quad = *self
            .meshes
            .gpu_data(MeshAssetType::Quad)
            .ok_or_else(|| VulkanError::ResourceNotFound {
                what: "quad mesh".to_string(),
            })?;
        device.cmd_bind_vertex_buffer(cmd, quad.vertex_buffer.handle, 0);
        device.cmd_bind_index_buffer(cmd, quad.index_buffer.handle, 0, vk::IndexType::UINT32);

        for (pipeline_type, batches) in [
            (self.bind_order[1], &datapack.world_glyph_batches),
            (self.bind_order[2], &datapack.screen_glyph_batches),
        ] {
            self.pipelines.bind_pipeline(cmd, pipeline_type)?;
            for batch in batches.values().filter(|batch| !batch.is_empty()) {
                device.cmd_draw_indexed(cmd, quad.index_count, batch.len() as u32, 0, 0, batch.first_instance);
                draw_calls += 1;
            }
        }

        // Post-processing subpass
        device.cmd_next_subpass(cmd);
        self.set_viewport(cmd);
        self.pipelines.bind_pipeline(cmd, self.bind_order[3])?;
        device.cmd_draw(cmd, POST_PROCESSING_VERTEX_COUNT, 1, 0, 0);
        draw_calls += 1;

        Ok(draw_calls)
    }

    /// Copy the staged instances and point the glyph pipelines at their regions
    fn copy_instances_to_device(&mut self, cmd: vk::CommandBuffer, datapack: &RenderableDatapack) -> VulkanResult<()> {
        let used = staged_instance_bytes(datapack);
        if used > self.context.instance_buffer.size {
            return Err(instance_overflow(used, self.context.instance_buffer.size));
        }
        if used > 0 {
            self.buffers.copy_data(
                cmd,
                &self.context.instance_staging_buffer,
                &self.context.instance_buffer,
                used,
                0,
                0,
            );

            let barrier = vk::BufferMemoryBarrier::builder()
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::SHADER_READ)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .buffer(self.context.instance_buffer.handle)
                .offset(0)
                .size(used)
                .build();
            self.context.device().cmd_buffer_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::VERTEX_SHADER,
                &barrier,
            );
        }

        self.pipelines.update_pipeline_bound_buffer_offset(
            self.bind_order[1],
            INSTANCE_BINDING,
            datapack.world_glyph_batches_offset,
        )?;
        self.pipelines.update_pipeline_bound_buffer_offset(
            self.bind_order[2],
            INSTANCE_BINDING,
            datapack.screen_glyph_batches_offset,
        )
    }

    fn set_viewport(&self, cmd: vk::CommandBuffer) {
        let device = self.context.device();
        device.cmd_set_viewport(cmd, &self.context.viewport);
        device.cmd_set_scissor(cmd, &self.context.scissor);
    }

    /// Close the frame, submit it and present
    fn end_frame(&mut self) -> VulkanResult<()> {
        let device = self.context.device_arc();
        let device = device.as_ref();
        let cmd = self.context.command_buffer;

        device.cmd_end_render_pass(cmd);
        self.timer.stop(cmd);
        device.end_command_buffer(cmd)?;

        let wait_semaphores = [self.context.acquire_semaphore];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [self.context.submit_semaphore];
        let command_buffers = [cmd];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();
        device.queue_submit(&[submit_info], self.context.in_flight_fence)?;

        match device.queue_present(
            self.context.swapchain.handle,
            self.current_image,
            self.context.submit_semaphore,
        ) {
            Ok(suboptimal) => {
                if suboptimal {
                    self.context.swapchain_stale = true;
                }
            }
            Err(e) if e.is_out_of_date() => {
                log::debug!("Swapchain out of date on present");
                self.context.swapchain_stale = true;
            }
            Err(e) => return Err(e),
        }

        self.stats.set_gpu_time(self.timer.elapsed_ms()?);
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.context.device().device_wait_idle() {
            log::error!("Failed to wait for device idle during renderer teardown: {e}");
        }
        self.pipelines.destroy_all();
        log::debug!("Renderer destroyed");
    }
}

fn missing_image(index: usize) -> VulkanError {
    VulkanError::ResourceNotFound {
        what: format!("swapchain image {index}"),
    }
}

fn create_pipelines(
    pipelines: &mut PipelineManager,
    context: &GraphicsContext,
    shaders: &ShaderManager,
) -> VulkanResult<()> {
    let program = |program_type: ShaderProgramType| {
        shaders
            .program(program_type)
            .cloned()
            .ok_or_else(|| VulkanError::ResourceNotFound {
                what: format!("shader program {program_type:?}"),
            })
    };
    let render_pass = context.render_pass;
    let wireframe = context.enabled_features.fill_mode_non_solid;

    let default_lit = program(ShaderProgramType::DefaultLit)?;
    let world_text = program(ShaderProgramType::WorldSpaceText)?;

    let mut infos = vec![
        PipelineCreateInfo::new(
            "Default Lit",
            PipelineType::DefaultLit,
            default_lit.clone(),
            render_pass,
            GEOMETRY_SUBPASS,
        ),
        PipelineCreateInfo::new(
            "World-space Text",
            PipelineType::WorldSpaceText,
            world_text.clone(),
            render_pass,
            GEOMETRY_SUBPASS,
        ),
        PipelineCreateInfo::new(
            "Screen-space Text",
            PipelineType::ScreenSpaceText,
            program(ShaderProgramType::ScreenSpaceText)?,
            render_pass,
            GEOMETRY_SUBPASS,
        ),
        PipelineCreateInfo::new(
            "Post-processing",
            PipelineType::PostProcessing,
            program(ShaderProgramType::PostProcessing)?,
            render_pass,
            POST_PROCESSING_SUBPASS,
        )
        .without_depth(),
    ];

    if wireframe {
        infos.push(
            PipelineCreateInfo::new(
                "Default Lit Wireframe",
                PipelineType::DefaultLitWireframe,
                default_lit,
                render_pass,
                GEOMETRY_SUBPASS,
            )
            .with_polygon_mode(vk::PolygonMode::LINE),
        );
        infos.push(
            PipelineCreateInfo::new(
                "World-space Text Wireframe",
                PipelineType::WorldSpaceTextWireframe,
                world_text,
                render_pass,
                GEOMETRY_SUBPASS,
            )
            .with_polygon_mode(vk::PolygonMode::LINE),
        );
    } else {
        log::warn!("Renderer: fillModeNonSolid unavailable, wireframe pipelines skipped");
    }

    for info in &infos {
        pipelines.create_pipeline(context, info)?;
    }
    Ok(())
}

/// Bind the global buffer, instance buffer, textures and input attachment slots
fn bind_static_resources(
    pipelines: &mut PipelineManager,
    context: &GraphicsContext,
    images: &ImageManager,
) -> VulkanResult<()> {
    let texture = |texture_type: TextureType| {
        images.texture(texture_type).ok_or_else(|| VulkanError::ResourceNotFound {
            what: format!("texture {texture_type:?}"),
        })
    };

    let textured = [
        (PipelineType::DefaultLit, TextureType::BlockWhiteTile),
        (PipelineType::DefaultLitWireframe, TextureType::BlockWhiteTile),
        (PipelineType::WorldSpaceText, TextureType::DefaultFont),
        (PipelineType::WorldSpaceTextWireframe, TextureType::DefaultFont),
        (PipelineType::ScreenSpaceText, TextureType::DefaultFont),
    ];

    for (pipeline_type, texture_type) in textured {
        if pipelines.pipeline(pipeline_type).is_none() {
            continue;
        }
        bind_global_data(pipelines, pipeline_type, &context.global_buffer)?;

        pipelines.prepare_resource_binding(
            pipeline_type,
            INSTANCE_BINDING,
            BoundResourceType::StorageBuffer,
            vk::DescriptorType::STORAGE_BUFFER,
        )?;
        pipelines.bind_buffer_resource(pipeline_type, INSTANCE_BINDING, &context.instance_buffer, 0, vk::WHOLE_SIZE)?;

        pipelines.prepare_resource_binding(
            pipeline_type,
            TEXTURE_BINDING,
            BoundResourceType::Image,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        )?;
        pipelines.bind_image_resource(pipeline_type, TEXTURE_BINDING, texture(texture_type)?, context.sampler)?;
    }

    bind_global_data(pipelines, PipelineType::PostProcessing, &context.global_buffer)?;
    pipelines.prepare_resource_binding(
        PipelineType::PostProcessing,
        COLOR_INPUT_BINDING,
        BoundResourceType::ColorInputAttachment,
        vk::DescriptorType::INPUT_ATTACHMENT,
    )?;
    pipelines.prepare_resource_binding(
        PipelineType::PostProcessing,
        DEPTH_INPUT_BINDING,
        BoundResourceType::DepthInputAttachment,
        vk::DescriptorType::INPUT_ATTACHMENT,
    )
}

fn bind_global_data(pipelines: &mut PipelineManager, pipeline_type: PipelineType, global: &Buffer) -> VulkanResult<()> {
    pipelines.prepare_resource_binding(
        pipeline_type,
        GLOBAL_DATA_BINDING,
        BoundResourceType::UniformBuffer,
        vk::DescriptorType::UNIFORM_BUFFER,
    )?;
    pipelines.bind_buffer_resource(pipeline_type, GLOBAL_DATA_BINDING, global, 0, vk::WHOLE_SIZE)
}

fn instance_overflow(needed: vk::DeviceSize, capacity: vk::DeviceSize) -> VulkanError {
    VulkanError::InvalidOperation {
        reason: format!("instance data needs {needed} bytes but the instance buffer holds {capacity}"),
    }
}

const fn align_up(value: vk::DeviceSize, alignment: vk::DeviceSize) -> vk::DeviceSize {
    (value + alignment - 1) / alignment * alignment
}

/// Write every batch kind into `staging`, filling in offsets and first instances
///
/// Regions are laid out mesh, world-space glyph, screen-space glyph, each
/// starting on [`INSTANCE_REGION_ALIGNMENT`]. A kind with no instances takes
/// no space and gets offset 0. Returns the end of the last written region.
pub fn stage_renderable_datapack(
    buffers: &BufferManager,
    staging: &Buffer,
    datapack: &mut RenderableDatapack,
) -> VulkanResult<vk::DeviceSize> {
    let mut cursor = 0;
    datapack.mesh_batches_offset = stage_instance_batches(buffers, staging, &mut datapack.mesh_batches, &mut cursor)?;
    datapack.world_glyph_batches_offset =
        stage_instance_batches(buffers, staging, &mut datapack.world_glyph_batches, &mut cursor)?;
    datapack.screen_glyph_batches_offset =
        stage_instance_batches(buffers, staging, &mut datapack.screen_glyph_batches, &mut cursor)?;
    Ok(cursor)
}

/// Bytes of the instance buffer a staged datapack occupies
fn staged_instance_bytes(datapack: &RenderableDatapack) -> vk::DeviceSize {
    fn region_end<K, T>(offset: vk::DeviceSize, batches: &BTreeMap<K, InstanceBatch<T>>) -> vk::DeviceSize {
        let count: usize = batches.values().map(InstanceBatch::len).sum();
        offset + (count * std::mem::size_of::<T>()) as vk::DeviceSize
    }

    region_end(datapack.mesh_batches_offset, &datapack.mesh_batches)
        .max(region_end(datapack.world_glyph_batches_offset, &datapack.world_glyph_batches))
        .max(region_end(datapack.screen_glyph_batches_offset, &datapack.screen_glyph_batches))
}

/// Write the non-empty batches of one kind contiguously from the aligned `cursor`
///
/// Returns the region's byte offset. Each batch's `first_instance` counts the
/// instances written before it in this region; empty batches write nothing.
/// When every batch is empty the cursor stays put and the offset is 0.
pub fn stage_instance_batches<K, T: Pod>(
    buffers: &BufferManager,
    staging: &Buffer,
    batches: &mut BTreeMap<K, InstanceBatch<T>>,
    cursor: &mut vk::DeviceSize,
) -> VulkanResult<vk::DeviceSize> {
    if batches.values().all(InstanceBatch::is_empty) {
        return Ok(0);
    }

    let stride = std::mem::size_of::<T>() as vk::DeviceSize;
    let region_start = align_up(*cursor, INSTANCE_REGION_ALIGNMENT);
    if region_start >= staging.size {
        return Err(instance_overflow(region_start + stride, staging.size));
    }
    *cursor = region_start;

    for batch in batches.values_mut() {
        if batch.is_empty() {
            continue;
        }

        let size = stride * batch.len() as vk::DeviceSize;
        if *cursor + size > staging.size {
            return Err(instance_overflow(*cursor + size, staging.size));
        }

        buffers.upload_data(staging, &batch.instances, *cursor)?;
        batch.first_instance = ((*cursor - region_start) / stride) as u32;
        *cursor += size;
    }

    Ok(region_start)
}
