//! Cube field demo
//!
//! A grid of spinning cubes seen from a slowly orbiting camera, with a
//! world-space label and a screen-space frame counter. `M` cycles the debug
//! render modes, `Space` pauses the cubes, `Escape` quits.

use std::sync::Arc;
use std::time::Instant;

use glfw::Key;
use render_core::core::config::Config;
use render_core::foundation::jobs::JobError;
use render_core::foundation::logging;
use render_core::prelude::*;
use render_core::render::WindowEvent;
use thiserror::Error;

const CONFIG_PATH: &str = "renderer.toml";
const GRID_SIZE: usize = 12;
const GRID_SPACING: f32 = 3.0;
const FOV_DEGREES: f32 = 60.0;
const NEAR_PLANE: f32 = 0.1;
const FAR_PLANE: f32 = 500.0;
const CAMERA_DISTANCE: f32 = 45.0;

#[derive(Error, Debug)]
enum DemoError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("Transform update failed: {0}")]
    Jobs(#[from] JobError),
}

struct CubeField {
    // Dropped before the window that owns the surface
    renderer: Renderer,
    window: Window,
    jobs: JobPool,

    transforms: Vec<Transform>,
    camera: usize,
    datapack: RenderableDatapack,
    global_data: GlobalData,

    width: u32,
    height: u32,
    paused: bool,
    started: Instant,
}

impl CubeField {
    fn new(config: &RendererConfig) -> Result<Self, DemoError> {
        let mut window = Window::new(&config.window).map_err(RenderError::from)?;
        let device = VulkanDevice::new(&mut window, config).map_err(RenderError::from)?;
        let renderer = Renderer::new(Arc::new(device), config)?;

        let jobs = config.worker_threads.map_or_else(JobPool::new, JobPool::with_threads);
        log::info!("Demo: {} worker threads", jobs.thread_count());

        let half = (GRID_SIZE as f32 - 1.0) * GRID_SPACING * 0.5;
        let mut transforms: Vec<Transform> = (0..GRID_SIZE * GRID_SIZE)
            .map(|i| {
                let (row, column) = (i / GRID_SIZE, i % GRID_SIZE);
                let mut transform = Transform::from_position(Vec3::new(
                    column as f32 * GRID_SPACING - half,
                    0.0,
                    row as f32 * GRID_SPACING - half,
                ));
                transform.set_rotation(0.0, (i * 7 % 360) as f32, 0.0);
                transform
            })
            .collect();

        let camera = transforms.len();
        let mut camera_transform = Transform::from_position(Vec3::new(0.0, 20.0, -CAMERA_DISTANCE));
        camera_transform.set_rotation(-25.0, 0.0, 0.0);
        transforms.push(camera_transform);

        let mut global_data = GlobalData::default();
        global_data.set_environment(
            Vec4::new(0.45, 0.6, 0.85, 1.0),
            Vec4::new(1.0, 0.95, 0.85, 1.0),
            Vec3::new(-0.4, -1.0, 0.3).normalize(),
            Vec2::new(60.0, 200.0),
        );

        let mut datapack = RenderableDatapack::default();
        datapack.clear_color = [0.45, 0.6, 0.85, 1.0];

        Ok(Self {
            renderer,
            window,
            jobs,
            transforms,
            camera,
            datapack,
            global_data,
            width: config.window.width,
            height: config.window.height,
            paused: false,
            started: Instant::now(),
        })
    }

    fn run(&mut self) -> Result<(), DemoError> {
        let mut last_frame = Instant::now();

        while !self.window.should_close() {
            for event in self.window.poll_events() {
                self.handle_event(event);
            }

            let now = Instant::now();
            let delta = now.duration_since(last_frame).as_secs_f32();
            last_frame = now;

            self.update(delta)?;
            self.build_datapack();

            self.renderer.upload_global_data(&self.global_data)?;
            self.renderer.render(&mut self.datapack)?;
        }

        log::info!("Demo: {} frames rendered", self.renderer.stats().frame_count());
        Ok(())
    }

    fn handle_event(&mut self, event: WindowEvent) {
        match event {
            WindowEvent::Resized(width, height) => {
                self.width = width;
                self.height = height;
                self.renderer.on_window_resize(width, height);
            }
            WindowEvent::KeyPressed(Key::Escape) | WindowEvent::CloseRequested => {
                self.window.set_should_close(true);
            }
            WindowEvent::KeyPressed(Key::M) => {
                let mut mode = self.renderer.render_mode().next();
                if !self.renderer.set_render_mode(mode) {
                    mode = mode.next();
                    self.renderer.set_render_mode(mode);
                }
                self.global_data.render_mode = self.renderer.render_mode().shader_value();
            }
            WindowEvent::KeyPressed(Key::Space) => self.paused = !self.paused,
            WindowEvent::KeyPressed(_) => {}
        }
    }

    fn update(&mut self, delta: f32) -> Result<(), DemoError> {
        let elapsed = self.started.elapsed().as_secs_f32();

        if !self.paused {
            for (i, transform) in self.transforms[..self.camera].iter_mut().enumerate() {
                let speed = 20.0 + (i % 5) as f32 * 15.0;
                transform.rotate(0.0, speed * delta, 0.0);
            }
        }

        let orbit = elapsed * 0.1;
        let camera = &mut self.transforms[self.camera];
        camera.set_position(Vec3::new(orbit.sin() * CAMERA_DISTANCE, 20.0, -orbit.cos() * CAMERA_DISTANCE));
        camera.set_rotation(-25.0, -orbit.to_degrees(), 0.0);

        let (width, height) = (self.width.max(1) as f32, self.height.max(1) as f32);
        let camera = &self.transforms[self.camera];
        let view = Mat4::look_at(camera.position, camera.position + camera.forward, Vec3::y());
        let projection = Mat4::perspective(FOV_DEGREES.to_radians(), width / height, NEAR_PLANE, FAR_PLANE);
        let view_projection = projection * view;

        update_world_transforms(&self.jobs, &mut self.transforms, &view_projection, Some(self.camera))?;

        self.global_data.set_perspective_view_projection(&view_projection);
        self.global_data
            .set_orthographic_view_projection(&Mat4::orthographic(width, height, -1.0, 1.0));
        self.global_data.set_screen(width, height, NEAR_PLANE, FAR_PLANE);
        self.global_data.time = elapsed;
        Ok(())
    }

    fn build_datapack(&mut self) {
        self.datapack.clear();
        push_visible_meshes(&mut self.datapack, MeshAssetType::Cube, &self.transforms[..self.camera]);

        let Some(atlas) = self.renderer.fonts().atlas(FontAssetType::Default) else {
            return;
        };

        let label = Text::new("render_core", 48.0, Vec4::new(1.0, 1.0, 1.0, 1.0));
        let label_model = Mat4::new_translation(&Vec3::new(-4.0, 6.0, 0.0));
        push_text(&mut self.datapack, atlas, &label_model, &label, TextSpace::World);

        let stats = self.renderer.stats();
        let overlay = Text::new(
            format!(
                "{} | cpu {:.2} ms | gpu {:.2} ms | draws {}",
                self.renderer.render_mode(),
                stats.cpu_time_ms(),
                stats.gpu_time_ms(),
                stats.draw_calls()
            ),
            20.0,
            Vec4::new(1.0, 1.0, 0.4, 1.0),
        );
        let overlay_model = Mat4::new_translation(&Vec3::new(16.0, self.height as f32 - 24.0, 0.0));
        push_text(&mut self.datapack, atlas, &overlay_model, &overlay, TextSpace::Screen);
    }
}

fn main() {
    let config = match RendererConfig::load_or_default(CONFIG_PATH) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to read {CONFIG_PATH}: {e}");
            std::process::exit(1);
        }
    };
    logging::init_with_level(&config.log_level);

    let result = CubeField::new(&config).and_then(|mut demo| demo.run());
    if let Err(e) = result {
        log::error!("Demo failed: {e}");
        std::process::exit(1);
    }
}
