// =============================================================================
// DUO RENDERER DEMO - a spinning cube and a 2D badge on either backend
// =============================================================================
//
// The backend is picked from config.toml (`graphics.backend`). Everything
// below talks to it through `dyn GraphicsBackend` only.
//
// FRAME FLOW:
// 1. winit asks for a redraw
// 2. Animate the scene (cube rotation)
// 3. backend.render_frame(camera, renderables, overlays)
// 4. Update the FPS title once per second
//
// Controls: ESC quits, F11 toggles fullscreen.
//
// =============================================================================

use anyhow::{bail, Context, Result};
use duo_renderer::{create_backend, BackendKind, BufferKind, Config, FrameState, GraphicsBackend, Handle};
use duo_renderer::{OverlayCallback, Renderable, ShaderStage};
use glam::{Mat4, Vec2, Vec3};
use std::path::{Path, PathBuf};
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::Fullscreen,
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let config = Config::load();

    init_logging(&config);
    log::info!("Starting duo renderer ({} backend)", config.graphics.backend.name());
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

/// `RUST_LOG` wins over the configured level when set.
fn init_logging(config: &Config) {
    let mut builder = env_logger::Builder::from_default_env();
    if std::env::var_os("RUST_LOG").is_none() {
        builder.filter_level(config.debug.level_filter());
    }
    builder.init();
}

// =============================================================================
// SCENE
// =============================================================================

/// Positions, colors, UVs, normals and indices of a unit cube, one quad per
/// face so every face gets its own color and normal.
struct Mesh {
    positions: Vec<Vec3>,
    colors: Vec<Vec3>,
    uvs: Vec<Vec2>,
    normals: Vec<Vec3>,
    indices: Vec<u32>,
}

impl Mesh {
    fn cube() -> Self {
        // (normal, u, v) with u x v == normal, so corners wind CCW from outside
        let faces = [
            (Vec3::X, Vec3::NEG_Z, Vec3::Y, Vec3::new(0.9, 0.3, 0.3)),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y, Vec3::new(0.3, 0.9, 0.3)),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z, Vec3::new(0.3, 0.3, 0.9)),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z, Vec3::new(0.9, 0.9, 0.3)),
            (Vec3::Z, Vec3::X, Vec3::Y, Vec3::new(0.9, 0.3, 0.9)),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y, Vec3::new(0.3, 0.9, 0.9)),
        ];
        let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

        let mut mesh = Mesh {
            positions: Vec::with_capacity(24),
            colors: Vec::with_capacity(24),
            uvs: Vec::with_capacity(24),
            normals: Vec::with_capacity(24),
            indices: Vec::with_capacity(36),
        };

        for (normal, u, v, color) in faces {
            let base = mesh.positions.len() as u32;
            for (su, sv) in corners {
                mesh.positions.push((normal + u * su + v * sv) * 0.5);
                mesh.colors.push(color);
                mesh.uvs.push(Vec2::new((su + 1.0) * 0.5, (sv + 1.0) * 0.5));
                mesh.normals.push(normal);
            }
            mesh.indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        mesh
    }

    /// Front face of the cube only: a quad in the XY plane facing +Z.
    fn quad() -> Self {
        let mut mesh = Self::cube();
        let start = 4 * 4;
        mesh.positions = mesh.positions[start..start + 4].to_vec();
        mesh.colors = vec![Vec3::ONE; 4];
        mesh.uvs = mesh.uvs[start..start + 4].to_vec();
        mesh.normals = mesh.normals[start..start + 4].to_vec();
        mesh.indices = vec![0, 1, 2, 0, 2, 3];
        mesh
    }

    fn upload(&self, backend: &mut dyn GraphicsBackend) -> Result<[Handle; 5]> {
        let handles = [
            backend.create_buffer(BufferKind::Vertex, bytemuck::cast_slice(&self.positions)),
            backend.create_buffer(BufferKind::Vertex, bytemuck::cast_slice(&self.colors)),
            backend.create_buffer(BufferKind::Vertex, bytemuck::cast_slice(&self.uvs)),
            backend.create_buffer(BufferKind::Vertex, bytemuck::cast_slice(&self.normals)),
            backend.create_buffer(BufferKind::Index, bytemuck::cast_slice(&self.indices)),
        ];
        if handles.iter().any(|h| h.is_none()) {
            bail!("Failed to upload mesh buffers");
        }
        Ok(handles)
    }
}

struct Scene {
    renderables: Vec<Renderable>,
}

impl Scene {
    fn load(backend: &mut dyn GraphicsBackend) -> Result<Self> {
        let dir = match backend.kind() {
            BackendKind::OpenGl => Path::new("shaders/opengl"),
            BackendKind::Vulkan => Path::new("shaders/vulkan"),
        };

        let vertex = backend.load_shader(&shader_path(dir, "basic.vert"), ShaderStage::Vertex);
        let fragment = backend.load_shader(&shader_path(dir, "basic.frag"), ShaderStage::Fragment);
        if vertex.is_none() || fragment.is_none() {
            bail!("Failed to load shaders from {:?}", dir);
        }

        let program = backend.create_program(vertex, fragment)?;
        if program.is_none() {
            bail!("Failed to link the basic program");
        }

        let texture_path = checker_texture().context("Failed to prepare checker texture")?;
        let texture = backend.load_texture(&texture_path);
        if texture.is_none() {
            log::warn!("Rendering without a texture");
        }

        let cube = Mesh::cube();
        let [vertex_buffer, color_buffer, uv_buffer, normal_buffer, index_buffer] = cube.upload(backend)?;
        let cube = Renderable {
            shader_program: program,
            vertex_buffer,
            color_buffer,
            uv_buffer,
            normal_buffer,
            index_buffer,
            index_count: cube.indices.len() as u32,
            texture,
            ..Default::default()
        };

        let quad = Mesh::quad();
        let [vertex_buffer, color_buffer, uv_buffer, normal_buffer, index_buffer] = quad.upload(backend)?;
        let badge = Renderable {
            shader_program: program,
            vertex_buffer,
            color_buffer,
            uv_buffer,
            normal_buffer,
            index_buffer,
            index_count: quad.indices.len() as u32,
            transform: Mat4::from_translation(Vec3::new(-0.8, 0.4, -1.0)),
            scale: Mat4::from_scale(Vec3::splat(0.2)),
            texture,
            test_depth: false,
            is_3d: false,
            ..Default::default()
        };

        Ok(Self {
            renderables: vec![cube, badge],
        })
    }

    fn animate(&mut self, seconds: f32) {
        if let Some(cube) = self.renderables.first_mut() {
            cube.rotate = Mat4::from_rotation_y(seconds) * Mat4::from_rotation_x(seconds * 0.5);
        }
    }
}

/// Prefer the precompiled module next to a source file when the build made one.
fn shader_path(dir: &Path, name: &str) -> PathBuf {
    let source = dir.join(name);
    let binary = dir.join(format!("{name}.spv"));
    if binary.exists() {
        binary
    } else {
        source
    }
}

/// Write a small checkerboard PNG to the temp directory.
fn checker_texture() -> Result<PathBuf> {
    const SIZE: u32 = 64;
    let path = std::env::temp_dir().join("duo-renderer-checker.png");
    if path.exists() {
        return Ok(path);
    }

    let image = image::RgbaImage::from_fn(SIZE, SIZE, |x, y| {
        if (x / 8 + y / 8) % 2 == 0 {
            image::Rgba([255, 255, 255, 255])
        } else {
            image::Rgba([200, 200, 200, 255])
        }
    });
    image.save(&path)?;
    Ok(path)
}

// =============================================================================
// FPS TRACKING
// =============================================================================

struct FpsCounter {
    frame_count: u32,
    last_update: Instant,
    last_frame: Instant,
    frame_time: f32,
}

impl FpsCounter {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            frame_count: 0,
            last_update: now,
            last_frame: now,
            frame_time: 0.0,
        }
    }

    fn tick(&mut self) {
        let now = Instant::now();
        self.frame_time = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.frame_count += 1;
    }

    /// Frames per second, once at least a second has passed since the last report.
    fn report(&mut self) -> Option<f32> {
        let elapsed = self.last_update.elapsed().as_secs_f32();
        if elapsed < 1.0 {
            return None;
        }
        let fps = self.frame_count as f32 / elapsed;
        self.frame_count = 0;
        self.last_update = Instant::now();
        Some(fps)
    }
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

struct App {
    config: Config,
    /// Scene handles belong to this backend; both go away together
    backend: Option<Box<dyn GraphicsBackend>>,
    scene: Option<Scene>,
    is_fullscreen: bool,
    fps: FpsCounter,
    started: Instant,
}

impl App {
    fn new(config: Config) -> Self {
        let is_fullscreen = config.window.fullscreen;
        Self {
            config,
            backend: None,
            scene: None,
            is_fullscreen,
            fps: FpsCounter::new(),
            started: Instant::now(),
        }
    }

    fn render(&mut self) -> Result<()> {
        let (Some(backend), Some(scene)) = (self.backend.as_mut(), self.scene.as_mut()) else {
            return Ok(());
        };

        scene.animate(self.started.elapsed().as_secs_f32());

        let size = backend.window().inner_size();
        let eye = Vec3::new(0.0, 1.5, 4.0);
        let frame = FrameState {
            view: Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y),
            camera_position: eye,
            camera_direction: (Vec3::ZERO - eye).normalize(),
            fov_degrees: 45.0,
            viewport_width: size.width,
            viewport_height: size.height,
        };

        let fps = &mut self.fps;
        let mut count_frame = || fps.tick();
        let mut overlays: [OverlayCallback<'_>; 1] = [&mut count_frame];
        backend.render_frame(&frame, &scene.renderables, &mut overlays)?;

        if self.config.debug.show_fps {
            if let Some(fps) = self.fps.report() {
                let mode = if self.is_fullscreen { "fullscreen" } else { "windowed" };
                backend.window().set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms) [{}, {}]",
                    self.config.window.title,
                    fps,
                    self.fps.frame_time * 1000.0,
                    backend.kind().name(),
                    mode
                ));
            }
        }
        Ok(())
    }

    fn toggle_fullscreen(&mut self) {
        if let Some(backend) = &self.backend {
            self.is_fullscreen = !self.is_fullscreen;
            let fullscreen = self.is_fullscreen.then_some(Fullscreen::Borderless(None));
            backend.window().set_fullscreen(fullscreen);
            log::info!("Fullscreen: {}", self.is_fullscreen);
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.scene = None;
        if let Some(backend) = self.backend.take() {
            backend.deinit();
        }
        event_loop.exit();
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.backend.is_some() {
            return;
        }

        let mut backend = match create_backend(self.config.graphics.backend, event_loop, &self.config) {
            Ok(backend) => backend,
            Err(e) => {
                log::error!("Failed to initialize graphics: {}", e);
                event_loop.exit();
                return;
            }
        };

        match Scene::load(backend.as_mut()) {
            Ok(scene) => self.scene = Some(scene),
            Err(e) => {
                log::error!("Failed to load scene: {:#}", e);
                backend.deinit();
                event_loop.exit();
                return;
            }
        }

        self.backend = Some(backend);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: winit::window::WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(size) => {
                if let Some(backend) = self.backend.as_mut() {
                    backend.resize(size.width, size.height);
                }
            }

            WindowEvent::RedrawRequested => {
                if let Err(e) = self.render() {
                    log::error!("Render error: {:#}", e);
                    self.shutdown(event_loop);
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() {
                    match event.physical_key {
                        PhysicalKey::Code(KeyCode::Escape) => {
                            log::info!("ESC pressed, exiting...");
                            self.shutdown(event_loop);
                        }
                        PhysicalKey::Code(KeyCode::F11) => self.toggle_fullscreen(),
                        _ => {}
                    }
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(backend) = &self.backend {
            backend.window().request_redraw();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_faces_wind_counter_clockwise_from_outside() {
        let mesh = Mesh::cube();
        assert_eq!(mesh.positions.len(), 24);
        assert_eq!(mesh.indices.len(), 36);

        for triangle in mesh.indices.chunks(3) {
            let [a, b, c] = [0, 1, 2].map(|i| mesh.positions[triangle[i] as usize]);
            let face_normal = (b - a).cross(c - a).normalize();
            assert!((face_normal - mesh.normals[triangle[0] as usize]).length() < 1e-5);
        }
    }

    #[test]
    fn test_quad_faces_the_camera() {
        let mesh = Mesh::quad();
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
        assert!(mesh.normals.iter().all(|n| *n == Vec3::Z));
        assert!(mesh.positions.iter().all(|p| (p.z - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_fps_report_waits_a_full_second() {
        let mut fps = FpsCounter::new();
        fps.tick();
        assert_eq!(fps.report(), None);

        fps.last_update = Instant::now() - std::time::Duration::from_secs(2);
        let reported = fps.report().unwrap();
        assert!(reported > 0.0 && reported < 1.0);
        assert_eq!(fps.frame_count, 0);
    }

    #[test]
    fn test_shader_path_prefers_precompiled_module() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(shader_path(dir.path(), "basic.vert"), dir.path().join("basic.vert"));

        std::fs::write(dir.path().join("basic.vert.spv"), [0u8; 4]).unwrap();
        assert_eq!(shader_path(dir.path(), "basic.vert"), dir.path().join("basic.vert.spv"));
    }
}
