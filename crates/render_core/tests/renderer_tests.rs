//! Frame protocol tests against the headless device

use std::path::PathBuf;
use std::sync::Arc;

use render_core::core::config::{AssetConfig, AssetPolicy, RendererConfig};
use render_core::foundation::math::{Mat4, Vec3, Vec4};
use render_core::render::{
    EnabledFeatures, FontAssetType, HeadlessDevice, MeshAssetType, MeshInstance, PipelineType, RecordedCommand,
    RenderMode, RenderableDatapack, Renderer,
};
use render_core::scene::{push_text, Text, TextSpace};

const OP_CAPABILITY: u32 = 17;
const OP_MEMORY_MODEL: u32 = 14;
const OP_ENTRY_POINT: u32 = 15;
const OP_EXECUTION_MODE: u32 = 16;
const OP_TYPE_VOID: u32 = 19;
const OP_TYPE_FUNCTION: u32 = 33;
const OP_FUNCTION: u32 = 54;
const OP_FUNCTION_END: u32 = 56;
const OP_LABEL: u32 = 248;
const OP_RETURN: u32 = 253;

const EXECUTION_MODEL_VERTEX: u32 = 0;
const EXECUTION_MODEL_FRAGMENT: u32 = 4;
const EXECUTION_MODE_ORIGIN_UPPER_LEFT: u32 = 7;

fn instruction(words: &mut Vec<u32>, opcode: u32, operands: &[u32]) {
    words.push(((operands.len() as u32 + 1) << 16) | opcode);
    words.extend_from_slice(operands);
}

/// Smallest module with an empty `main` for the given execution model
fn empty_shader(execution_model: u32) -> Vec<u8> {
    let (main, void, function_type, label) = (1, 2, 3, 4);
    let mut words = vec![0x0723_0203, 0x0001_0000, 0, 5, 0];

    instruction(&mut words, OP_CAPABILITY, &[1]);
    instruction(&mut words, OP_MEMORY_MODEL, &[0, 1]);
    // "main" plus its terminator fills two words
    instruction(&mut words, OP_ENTRY_POINT, &[execution_model, main, u32::from_le_bytes(*b"main"), 0]);
    if execution_model == EXECUTION_MODEL_FRAGMENT {
        instruction(&mut words, OP_EXECUTION_MODE, &[main, EXECUTION_MODE_ORIGIN_UPPER_LEFT]);
    }
    instruction(&mut words, OP_TYPE_VOID, &[void]);
    instruction(&mut words, OP_TYPE_FUNCTION, &[function_type, void]);
    instruction(&mut words, OP_FUNCTION, &[void, main, 0, function_type]);
    instruction(&mut words, OP_LABEL, &[label]);
    instruction(&mut words, OP_RETURN, &[]);
    instruction(&mut words, OP_FUNCTION_END, &[]);

    words.iter().flat_map(|word| word.to_le_bytes()).collect()
}

/// Write every program's stages into a fresh directory
fn shader_dir(test_name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("render_core_{}_{test_name}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();

    for stem in ["DefaultLit", "WorldSpaceGlyph", "ScreenSpaceGlyph", "PostProcessing"] {
        std::fs::write(dir.join(format!("{stem}.vert.spv")), empty_shader(EXECUTION_MODEL_VERTEX)).unwrap();
        std::fs::write(dir.join(format!("{stem}.frag.spv")), empty_shader(EXECUTION_MODEL_FRAGMENT)).unwrap();
    }
    dir
}

fn config(test_name: &str) -> RendererConfig {
    RendererConfig::default().with_window_size(1600, 900).with_assets(
        AssetConfig::default()
            .with_shader_dir(shader_dir(test_name))
            .with_policy(AssetPolicy::Fallback),
    )
}

fn renderer(test_name: &str) -> (Arc<HeadlessDevice>, Renderer) {
    let device = Arc::new(HeadlessDevice::new(1600, 900));
    let renderer = Renderer::new(device.clone(), &config(test_name)).unwrap();
    device.clear_commands();
    (device, renderer)
}

fn one_cube() -> RenderableDatapack {
    let mut datapack = RenderableDatapack::default();
    datapack.push_mesh(MeshAssetType::Cube, MeshInstance::new(&Mat4::new_translation(&Vec3::new(0.0, 0.0, 5.0))));
    datapack
}

fn indexed_draws(commands: &[RecordedCommand]) -> Vec<(u32, u32)> {
    commands
        .iter()
        .filter_map(|command| match command {
            RecordedCommand::DrawIndexed {
                instance_count,
                first_instance,
                ..
            } => Some((*instance_count, *first_instance)),
            _ => None,
        })
        .collect()
}

fn position(commands: &[RecordedCommand], wanted: impl Fn(&RecordedCommand) -> bool) -> Option<usize> {
    commands.iter().position(wanted)
}

#[test]
fn test_single_cube_is_one_instanced_draw() {
    let (device, mut renderer) = renderer("single_cube");
    let mut datapack = one_cube();

    assert!(renderer.render(&mut datapack).unwrap());

    let commands = device.commands();
    assert_eq!(indexed_draws(&commands), vec![(1, 0)]);

    let draw = position(&commands, |c| matches!(c, RecordedCommand::DrawIndexed { .. })).unwrap();
    let next_subpass = position(&commands, |c| matches!(c, RecordedCommand::NextSubpass)).unwrap();
    let post = position(&commands, |c| {
        matches!(
            c,
            RecordedCommand::Draw {
                vertex_count: 6,
                instance_count: 1,
                ..
            }
        )
    })
    .unwrap();
    let submit = position(&commands, |c| matches!(c, RecordedCommand::Submit { .. })).unwrap();
    let present = position(&commands, |c| matches!(c, RecordedCommand::Present { .. })).unwrap();

    assert!(draw < next_subpass && next_subpass < post && post < submit && submit < present);
    assert_eq!(renderer.stats().draw_calls(), 2);
}

#[test]
fn test_instances_are_copied_then_guarded_by_a_barrier() {
    let (device, mut renderer) = renderer("instance_copy");
    let mut datapack = one_cube();

    renderer.render(&mut datapack).unwrap();

    let instance_buffer = renderer.context().instance_buffer.handle;
    let commands = device.commands();
    let copy = position(&commands, |c| {
        matches!(c, RecordedCommand::CopyBuffer { dst, size, .. }
            if *dst == instance_buffer && *size == std::mem::size_of::<MeshInstance>() as u64)
    })
    .unwrap();
    let barrier = position(&commands, |c| {
        matches!(c, RecordedCommand::BufferBarrier { buffer } if *buffer == instance_buffer)
    })
    .unwrap();
    let render_pass = position(&commands, |c| matches!(c, RecordedCommand::BeginRenderPass { .. })).unwrap();

    assert!(copy < barrier && barrier < render_pass);
}

#[test]
fn test_empty_frame_only_runs_post_processing() {
    let (device, mut renderer) = renderer("empty_frame");
    let mut datapack = RenderableDatapack::default();

    assert!(renderer.render(&mut datapack).unwrap());

    let commands = device.commands();
    assert!(indexed_draws(&commands).is_empty());
    assert!(!commands.iter().any(|c| matches!(c, RecordedCommand::CopyBuffer { .. })));
    assert!(commands.iter().any(|c| matches!(c, RecordedCommand::Present { .. })));
}

#[test]
fn test_text_batches_follow_meshes_with_region_offsets() {
    let (device, mut renderer) = renderer("text_batches");
    let mut datapack = one_cube();

    let atlas = renderer.fonts().atlas(FontAssetType::Default).unwrap().clone();
    let text = Text::new("AB", 16.0, Vec4::repeat(1.0));
    push_text(&mut datapack, &atlas, &Mat4::identity(), &text, TextSpace::World);
    push_text(&mut datapack, &atlas, &Mat4::identity(), &text, TextSpace::Screen);

    renderer.render(&mut datapack).unwrap();

    // One cube, then two world glyphs ending at 256 + 2 * 96
    assert_eq!(datapack.mesh_batches_offset, 0);
    assert_eq!(datapack.world_glyph_batches_offset, 256);
    assert_eq!(datapack.screen_glyph_batches_offset, 512);
    assert_eq!(indexed_draws(&device.commands()), vec![(1, 0), (2, 0), (4, 0)]);
    assert_eq!(renderer.stats().draw_calls(), 4);
}

#[test]
fn test_empty_batches_are_not_drawn() {
    let (device, mut renderer) = renderer("empty_batches");
    let mut datapack = RenderableDatapack::default();
    let model = Mat4::new_translation(&Vec3::new(0.0, 0.0, 5.0));
    for _ in 0..3 {
        datapack.push_mesh(MeshAssetType::Quad, MeshInstance::new(&model));
    }
    datapack.mesh_batches.entry(MeshAssetType::Cube).or_default();
    datapack.world_glyph_batches.entry(FontAssetType::Default).or_default();

    let atlas = renderer.fonts().atlas(FontAssetType::Default).unwrap().clone();
    push_text(&mut datapack, &atlas, &Mat4::identity(), &Text::new("A", 16.0, Vec4::repeat(1.0)), TextSpace::Screen);

    assert!(renderer.render(&mut datapack).unwrap());

    assert_eq!(indexed_draws(&device.commands()), vec![(3, 0), (2, 0)]);
    assert_eq!(datapack.world_glyph_batches_offset, 0);
    assert_eq!(datapack.screen_glyph_batches_offset, 256);
    assert_eq!(renderer.stats().draw_calls(), 3);
}

#[test]
fn test_later_batches_start_after_earlier_ones() {
    let (device, mut renderer) = renderer("batch_first_instance");
    let mut datapack = RenderableDatapack::default();
    let model = Mat4::new_translation(&Vec3::new(0.0, 0.0, 5.0));
    for _ in 0..3 {
        datapack.push_mesh(MeshAssetType::Quad, MeshInstance::new(&model));
    }
    for _ in 0..5 {
        datapack.push_mesh(MeshAssetType::Cube, MeshInstance::new(&model));
    }

    assert!(renderer.render(&mut datapack).unwrap());

    assert_eq!(indexed_draws(&device.commands()), vec![(3, 0), (5, 3)]);
}

#[test]
fn test_instance_overflow_fails_before_acquire() {
    let device = Arc::new(HeadlessDevice::new(1600, 900));
    let mut renderer = Renderer::new(device.clone(), &config("overflow").with_max_entities(7)).unwrap();
    device.clear_commands();

    // 7 glyph-sized slots hold 672 bytes, 11 cubes need 704
    let mut datapack = RenderableDatapack::default();
    for _ in 0..11 {
        datapack.push_mesh(MeshAssetType::Cube, MeshInstance::new(&Mat4::identity()));
    }

    assert!(renderer.render(&mut datapack).is_err());
    assert!(!device.commands().iter().any(|c| matches!(c, RecordedCommand::Acquire { .. })));

    assert!(renderer.render(&mut one_cube()).unwrap());
}

#[test]
fn test_instance_buffer_too_small_for_regions_is_rejected() {
    let device = Arc::new(HeadlessDevice::new(1600, 900));
    assert!(Renderer::new(device, &config("tiny_instances").with_max_entities(1)).is_err());
}

#[test]
fn test_minimized_window_skips_frames() {
    let (device, mut renderer) = renderer("minimized");
    let mut datapack = one_cube();

    renderer.on_window_resize(0, 0);
    assert!(renderer.is_minimized());
    assert!(!renderer.render(&mut datapack).unwrap());
    assert!(device.commands().is_empty());

    renderer.on_window_resize(800, 600);
    assert!(!renderer.is_minimized());
}

#[test]
fn test_out_of_date_acquire_skips_frame_and_recreates_next() {
    let (device, mut renderer) = renderer("acquire_out_of_date");
    let mut datapack = one_cube();
    let old_swapchain = renderer.context().swapchain.handle;

    device.fail_next_acquire();
    assert!(!renderer.render(&mut datapack).unwrap());
    assert!(renderer.context().swapchain_stale);
    assert!(!device.commands().iter().any(|c| matches!(c, RecordedCommand::Submit { .. })));

    assert!(renderer.render(&mut datapack).unwrap());
    assert!(!renderer.context().swapchain_stale);
    assert_ne!(renderer.context().swapchain.handle, old_swapchain);
}

#[test]
fn test_out_of_date_present_flags_swapchain() {
    let (device, mut renderer) = renderer("present_out_of_date");
    let mut datapack = one_cube();

    device.fail_next_present();
    assert!(renderer.render(&mut datapack).unwrap());
    assert!(renderer.context().swapchain_stale);

    assert!(renderer.render(&mut datapack).unwrap());
    assert!(!renderer.context().swapchain_stale);
}

#[test]
fn test_resize_rebuilds_swapchain_at_new_extent() {
    let (device, mut renderer) = renderer("resize");
    let mut datapack = one_cube();

    device.set_surface_extent(1024, 768);
    renderer.on_window_resize(1024, 768);
    assert!(renderer.render(&mut datapack).unwrap());

    let extent = renderer.context().swapchain.extent;
    assert_eq!((extent.width, extent.height), (1024, 768));

    let begin = device
        .commands()
        .into_iter()
        .rev()
        .find_map(|c| match c {
            RecordedCommand::BeginRenderPass { extent, .. } => Some(extent),
            _ => None,
        })
        .unwrap();
    assert_eq!((begin.width, begin.height), (1024, 768));
}

#[test]
fn test_wireframe_swaps_geometry_pipelines() {
    let (_device, mut renderer) = renderer("wireframe");

    assert!(renderer.set_render_mode(RenderMode::Wireframe));
    assert_eq!(renderer.bind_order()[0], PipelineType::DefaultLitWireframe);
    assert_eq!(renderer.bind_order()[1], PipelineType::WorldSpaceTextWireframe);
    assert_eq!(renderer.bind_order()[2], PipelineType::ScreenSpaceText);

    assert!(renderer.set_render_mode(RenderMode::Color));
    assert_eq!(renderer.bind_order()[0], PipelineType::DefaultLit);
}

#[test]
fn test_wireframe_refused_without_non_solid_fill() {
    let features = EnabledFeatures {
        sampler_anisotropy: true,
        fill_mode_non_solid: false,
    };
    let device = Arc::new(HeadlessDevice::with_features(1600, 900, features));
    let mut renderer = Renderer::new(device, &config("no_wireframe")).unwrap();

    assert!(!renderer.set_render_mode(RenderMode::Wireframe));
    assert_eq!(renderer.render_mode(), RenderMode::Color);
    assert!(renderer.pipelines().pipeline(PipelineType::DefaultLitWireframe).is_none());
}

#[test]
fn test_missing_shaders_fail_initialization() {
    let device = Arc::new(HeadlessDevice::new(1600, 900));
    let config = RendererConfig::default()
        .with_assets(AssetConfig::default().with_shader_dir(std::env::temp_dir().join("render_core_no_shaders_here")));

    assert!(Renderer::new(device, &config).is_err());
}

#[test]
fn test_drop_releases_every_object() {
    let device = Arc::new(HeadlessDevice::new(1600, 900));
    {
        let mut renderer = Renderer::new(device.clone(), &config("teardown")).unwrap();
        renderer.render(&mut one_cube()).unwrap();
        assert!(device.live_object_count() > 0);
    }
    assert_eq!(device.live_object_count(), 0);
}
