//! Two-subpass render pass
//!
//! Subpass 0 renders geometry into an off-screen color target and depth.
//! Subpass 1 reads both as input attachments and writes the swapchain image.

use ash::vk;

use crate::render::backends::GpuDevice;
use crate::render::error::VulkanResult;

/// Format of the off-screen geometry color target
pub const GEOMETRY_COLOR_FORMAT: vk::Format = vk::Format::B8G8R8A8_UNORM;

/// Attachment index of the geometry color target
pub const GEOMETRY_COLOR_ATTACHMENT: u32 = 0;
/// Attachment index of the depth target
pub const DEPTH_ATTACHMENT: u32 = 1;
/// Attachment index of the swapchain image
pub const SWAPCHAIN_ATTACHMENT: u32 = 2;

/// Subpass drawing meshes and text
pub const GEOMETRY_SUBPASS: u32 = 0;
/// Subpass drawing the full-screen post-processing pass
pub const POST_PROCESSING_SUBPASS: u32 = 1;

/// Create the geometry + post-processing render pass
pub fn create_render_pass(
    device: &dyn GpuDevice,
    surface_format: vk::Format,
    depth_format: vk::Format,
) -> VulkanResult<vk::RenderPass> {
    let geometry_color = vk::AttachmentDescription::builder()
        .format(GEOMETRY_COLOR_FORMAT)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .build();

    let depth = vk::AttachmentDescription::builder()
        .format(depth_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
        .build();

    let swapchain = vk::AttachmentDescription::builder()
        .format(surface_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::DONT_CARE)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .build();

    let attachments = [geometry_color, depth, swapchain];

    // Subpass 0
    let geometry_color_refs = [vk::AttachmentReference {
        attachment: GEOMETRY_COLOR_ATTACHMENT,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }];
    let depth_ref = vk::AttachmentReference {
        attachment: DEPTH_ATTACHMENT,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };

    // Subpass 1
    let input_refs = [
        vk::AttachmentReference {
            attachment: GEOMETRY_COLOR_ATTACHMENT,
            layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        },
        vk::AttachmentReference {
            attachment: DEPTH_ATTACHMENT,
            layout: vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        },
    ];
    let swapchain_refs = [vk::AttachmentReference {
        attachment: SWAPCHAIN_ATTACHMENT,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }];

    let subpasses = [
        vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&geometry_color_refs)
            .depth_stencil_attachment(&depth_ref)
            .build(),
        vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .input_attachments(&input_refs)
            .color_attachments(&swapchain_refs)
            .build(),
    ];

    let dependencies = [
        // Attachment writes wait for the previous frame and the acquired image
        vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(GEOMETRY_SUBPASS)
            .src_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            )
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )
            .build(),
        // Color written in subpass 0 is read as an input attachment in subpass 1
        vk::SubpassDependency::builder()
            .src_subpass(GEOMETRY_SUBPASS)
            .dst_subpass(POST_PROCESSING_SUBPASS)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
            .dst_access_mask(vk::AccessFlags::INPUT_ATTACHMENT_READ)
            .dependency_flags(vk::DependencyFlags::BY_REGION)
            .build(),
        // Same for depth
        vk::SubpassDependency::builder()
            .src_subpass(GEOMETRY_SUBPASS)
            .dst_subpass(POST_PROCESSING_SUBPASS)
            .src_stage_mask(vk::PipelineStageFlags::LATE_FRAGMENT_TESTS)
            .src_access_mask(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
            .dst_access_mask(vk::AccessFlags::INPUT_ATTACHMENT_READ)
            .dependency_flags(vk::DependencyFlags::BY_REGION)
            .build(),
    ];

    let render_pass_info = vk::RenderPassCreateInfo::builder()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    device.create_render_pass(&render_pass_info)
}
