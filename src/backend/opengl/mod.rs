// OpenGL 4.1 backend - implicit API, driver-managed state
//
// Handles are the driver's own object names. Each table below records which
// names this backend created, so stale or foreign handles are caught before
// they reach the driver.
//
// FRAME FLOW:
// 1. Run overlay callbacks
// 2. Clear color + depth together
// 3. Walk the frame plan: toggle depth test, switch programs, draw
// 4. Swap buffers
//
// Uniforms are looked up by name on every draw:
//   matrices[4]         mvp, translation, rotation, scale
//   cameraProperties[2] camera position, camera direction
//   ambience            ambient light

mod context;

use self::context::GlContext;
use super::{window_attributes, BufferKind, GraphicsBackend};
use crate::config::{BackendKind, Config};
use crate::error::{BackendError, BackendResult};
use crate::frame::{plan_frame, ClipSpace, DrawCall, DrawCommand, PlanOptions};
use crate::handle::Handle;
use crate::renderable::{FrameState, OverlayCallback, Renderable};
use crate::shader::{self, ShaderSource, ShaderStage};
use crate::texture_data::{self, Pixels};
use glam::Vec3;
use glow::HasContext;
use std::collections::HashMap;
use std::path::Path;
use winit::event_loop::ActiveEventLoop;
use winit::window::Window;

/// Attribute location and float component count of each vertex stream
const ATTRIBUTES: [(u32, i32); 4] = [(0, 3), (1, 3), (2, 2), (3, 3)];

/// Texture binding points a draw sets on unit 0
const SAMPLED_TARGETS: [u32; 2] = [glow::TEXTURE_2D, glow::TEXTURE_CUBE_MAP];

fn handle_of(name: std::num::NonZeroU32) -> Handle {
    Handle::from_raw(name.get())
}

/// What each sampled target on unit 0 holds for a draw. Every target other
/// than the texture's own is cleared, so no sampler reads a previous draw's
/// texture.
fn unit_bindings<T: Copy>(texture: Option<(u32, T)>) -> [(u32, Option<T>); 2] {
    SAMPLED_TARGETS.map(|target| {
        let name = texture.filter(|(bound, _)| *bound == target).map(|(_, name)| name);
        (target, name)
    })
}

struct Texture {
    target: u32,
    texture: glow::NativeTexture,
}

pub struct OpenGlBackend {
    shaders: HashMap<Handle, glow::NativeShader>,
    programs: HashMap<Handle, glow::NativeProgram>,
    textures: HashMap<Handle, Texture>,
    buffers: HashMap<Handle, glow::NativeBuffer>,
    vao: glow::NativeVertexArray,

    context: GlContext,

    size: (u32, u32),
    camera_affects_2d: bool,
    ambience: Vec3,
}

impl OpenGlBackend {
    fn gl(&self) -> &glow::Context {
        &self.context.gl
    }

    fn compile(&self, source: &str, stage: ShaderStage) -> Result<glow::NativeShader, String> {
        let gl = self.gl();
        let kind = match stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        };

        unsafe {
            let shader = gl.create_shader(kind)?;
            gl.shader_source(shader, source);
            gl.compile_shader(shader);

            let log = gl.get_shader_info_log(shader);
            if !gl.get_shader_compile_status(shader) {
                gl.delete_shader(shader);
                return Err(log);
            }
            if !log.trim().is_empty() {
                log::warn!("{}", log.trim_end());
            }
            Ok(shader)
        }
    }

    /// Upload one image to mip level 0 of `target`.
    ///
    /// # Safety
    /// The texture being filled must be bound to the matching binding point.
    unsafe fn upload_face(&self, target: u32, pixels: &Pixels) {
        self.gl().tex_image_2d(
            target,
            0,
            glow::RGBA8 as i32,
            pixels.width as i32,
            pixels.height as i32,
            0,
            glow::RGBA,
            glow::UNSIGNED_BYTE,
            glow::PixelUnpackData::Slice(Some(&pixels.rgba)),
        );
    }

    fn draw(&self, program: glow::NativeProgram, call: &DrawCall<'_>, frame: &FrameState) {
        let gl = self.gl();
        let r = call.renderable;

        let streams = [r.vertex_buffer, r.color_buffer, r.uv_buffer, r.normal_buffer];
        let mut buffers = [None; 4];
        for (slot, handle) in buffers.iter_mut().zip(streams) {
            *slot = self.buffers.get(&handle).copied();
        }
        let index_buffer = self.buffers.get(&r.index_buffer).copied();
        if buffers.iter().any(Option::is_none) || index_buffer.is_none() {
            log::trace!("Renderable references an unknown buffer; skipped");
            return;
        }

        let matrices = call.matrices();
        let camera = [frame.camera_position, frame.camera_direction];

        unsafe {
            let location = gl.get_uniform_location(program, "matrices");
            gl.uniform_matrix_4_f32_slice(location.as_ref(), false, bytemuck::cast_slice(&matrices));

            let location = gl.get_uniform_location(program, "cameraProperties");
            gl.uniform_3_f32_slice(location.as_ref(), bytemuck::cast_slice(&camera));

            let location = gl.get_uniform_location(program, "ambience");
            gl.uniform_3_f32_slice(location.as_ref(), &self.ambience.to_array());

            let texture = self.textures.get(&r.texture).map(|t| (t.target, t.texture));
            for (target, name) in unit_bindings(texture) {
                gl.bind_texture(target, name);
            }

            for ((location, size), buffer) in ATTRIBUTES.into_iter().zip(buffers) {
                gl.bind_buffer(glow::ARRAY_BUFFER, buffer);
                gl.vertex_attrib_pointer_f32(location, size, glow::FLOAT, false, 0, 0);
            }

            gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, index_buffer);
            gl.draw_elements(glow::TRIANGLES, r.index_count as i32, glow::UNSIGNED_INT, 0);
        }
    }
}

impl GraphicsBackend for OpenGlBackend {
    fn init(event_loop: &ActiveEventLoop, config: &Config) -> BackendResult<Self> {
        let context = GlContext::new(
            event_loop,
            window_attributes(config),
            config.graphics.msaa_samples,
            config.graphics.vsync,
        )?;
        let gl = &context.gl;

        log::info!(
            "OpenGL {} on {} ({})",
            unsafe { gl.get_parameter_string(glow::VERSION) },
            unsafe { gl.get_parameter_string(glow::RENDERER) },
            unsafe { gl.get_parameter_string(glow::VENDOR) }
        );

        let vao = unsafe {
            let vao = gl
                .create_vertex_array()
                .map_err(|e| BackendError::Context(format!("failed to create vertex array: {e}")))?;
            gl.bind_vertex_array(Some(vao));
            for (location, _) in ATTRIBUTES {
                gl.enable_vertex_attrib_array(location);
            }

            gl.enable(glow::DEPTH_TEST);
            gl.depth_func(glow::LESS);
            gl.enable(glow::CULL_FACE);
            gl.cull_face(glow::BACK);

            if config.graphics.msaa_samples > 1 {
                gl.enable(glow::MULTISAMPLE);
            }
            if config.graphics.srgb_framebuffer {
                gl.enable(glow::FRAMEBUFFER_SRGB);
            }

            let [r, g, b, a] = config.graphics.clear_color;
            gl.clear_color(r, g, b, a);
            vao
        };

        let size = context.window().inner_size();
        let ambience = config.lighting.ambient_light();
        log::info!("Ambient light: {:?}", ambience);

        Ok(Self {
            shaders: HashMap::new(),
            programs: HashMap::new(),
            textures: HashMap::new(),
            buffers: HashMap::new(),
            vao,
            context,
            size: (size.width, size.height),
            camera_affects_2d: config.graphics.camera_affects_2d,
            ambience,
        })
    }

    fn load_shader(&mut self, path: &Path, stage: ShaderStage) -> Handle {
        let source = match ShaderSource::load(path) {
            Ok(ShaderSource::Text(source)) => source,
            Ok(ShaderSource::Binary(_)) => {
                log::warn!("{:?}: precompiled SPIR-V cannot be used with OpenGL 4.1", path);
                return Handle::NONE;
            }
            Err(e) => {
                log::warn!("Couldn't open {:?}: {}", path, e);
                return Handle::NONE;
            }
        };

        let source = match shader::translate(&source) {
            Some(translated) => {
                log::debug!("Translating {:?} (GLSL 4.20 -> 4.10)", path);
                translated
            }
            None => source,
        };

        log::debug!("Compiling {:?}", path);
        match self.compile(&source, stage) {
            Ok(shader) => {
                let handle = handle_of(shader.0);
                self.shaders.insert(handle, shader);
                handle
            }
            Err(log) => {
                log::warn!("Failed to compile {} shader {:?}:\n{}", stage, path, log.trim_end());
                Handle::NONE
            }
        }
    }

    fn create_program(&mut self, vertex: Handle, fragment: Handle) -> BackendResult<Handle> {
        let (Some(&vertex_shader), Some(&fragment_shader)) = (self.shaders.get(&vertex), self.shaders.get(&fragment))
        else {
            log::warn!("Cannot link program from unknown shaders {} / {}", vertex, fragment);
            return Ok(Handle::NONE);
        };

        let gl = self.gl();
        let program = unsafe {
            let program = match gl.create_program() {
                Ok(program) => program,
                Err(e) => {
                    log::warn!("Failed to create program: {}", e);
                    return Ok(Handle::NONE);
                }
            };
            gl.attach_shader(program, vertex_shader);
            gl.attach_shader(program, fragment_shader);
            gl.link_program(program);
            gl.detach_shader(program, vertex_shader);
            gl.detach_shader(program, fragment_shader);

            let log = gl.get_program_info_log(program);
            if !gl.get_program_link_status(program) {
                log::warn!("Failed to link {} + {}:\n{}", vertex, fragment, log.trim_end());
                gl.delete_program(program);
                return Ok(Handle::NONE);
            }
            if !log.trim().is_empty() {
                log::warn!("{}", log.trim_end());
            }
            program
        };

        let handle = handle_of(program.0);
        self.programs.insert(handle, program);
        log::debug!("Linked program {} from {} + {}", handle, vertex, fragment);
        Ok(handle)
    }

    fn load_texture(&mut self, path: &Path) -> Handle {
        let pixels = match texture_data::load_rgba8(path, true) {
            Ok(pixels) => pixels,
            Err(e) => {
                log::warn!("Failed to load texture {:?}: {}", path, e);
                return Handle::NONE;
            }
        };

        let gl = self.gl();
        let texture = unsafe {
            let texture = match gl.create_texture() {
                Ok(texture) => texture,
                Err(e) => {
                    log::warn!("Failed to create texture {:?}: {}", path, e);
                    return Handle::NONE;
                }
            };
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::REPEAT as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::REPEAT as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::LINEAR_MIPMAP_LINEAR as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
            self.upload_face(glow::TEXTURE_2D, &pixels);
            gl.generate_mipmap(glow::TEXTURE_2D);
            texture
        };

        let handle = handle_of(texture.0);
        self.textures.insert(
            handle,
            Texture {
                target: glow::TEXTURE_2D,
                texture,
            },
        );
        log::debug!("Loaded texture {:?} as {}", path, handle);
        handle
    }

    fn load_cubemap(&mut self, faces: &[&Path; 6]) -> Handle {
        // Cube faces keep their stored orientation
        let pixels = match texture_data::load_cube_faces(faces) {
            Ok(pixels) => pixels,
            Err(e) => {
                log::warn!("Failed to load cubemap {:?}: {}", faces[0], e);
                return Handle::NONE;
            }
        };

        let gl = self.gl();
        let texture = unsafe {
            let texture = match gl.create_texture() {
                Ok(texture) => texture,
                Err(e) => {
                    log::warn!("Failed to create cubemap: {}", e);
                    return Handle::NONE;
                }
            };
            gl.bind_texture(glow::TEXTURE_CUBE_MAP, Some(texture));
            for (i, face) in pixels.iter().enumerate() {
                self.upload_face(glow::TEXTURE_CUBE_MAP_POSITIVE_X + i as u32, face);
            }
            gl.tex_parameter_i32(glow::TEXTURE_CUBE_MAP, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
            gl.tex_parameter_i32(glow::TEXTURE_CUBE_MAP, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
            for wrap in [glow::TEXTURE_WRAP_S, glow::TEXTURE_WRAP_T, glow::TEXTURE_WRAP_R] {
                gl.tex_parameter_i32(glow::TEXTURE_CUBE_MAP, wrap, glow::CLAMP_TO_EDGE as i32);
            }
            texture
        };

        let handle = handle_of(texture.0);
        self.textures.insert(
            handle,
            Texture {
                target: glow::TEXTURE_CUBE_MAP,
                texture,
            },
        );
        log::debug!("Loaded cubemap {:?} as {}", faces[0], handle);
        handle
    }

    fn create_buffer(&mut self, kind: BufferKind, data: &[u8]) -> Handle {
        if data.is_empty() {
            log::warn!("Refusing to create an empty {:?} buffer", kind);
            return Handle::NONE;
        }

        let target = match kind {
            BufferKind::Vertex => glow::ARRAY_BUFFER,
            BufferKind::Index => glow::ELEMENT_ARRAY_BUFFER,
        };

        let gl = self.gl();
        let buffer = unsafe {
            let buffer = match gl.create_buffer() {
                Ok(buffer) => buffer,
                Err(e) => {
                    log::warn!("Failed to create {:?} buffer: {}", kind, e);
                    return Handle::NONE;
                }
            };
            gl.bind_buffer(target, Some(buffer));
            gl.buffer_data_u8_slice(target, data, glow::STATIC_DRAW);
            buffer
        };

        let handle = handle_of(buffer.0);
        self.buffers.insert(handle, buffer);
        log::debug!("Created {:?} buffer {} ({} bytes)", kind, handle, data.len());
        handle
    }

    fn render_frame(
        &mut self,
        frame: &FrameState,
        renderables: &[Renderable],
        overlays: &mut [OverlayCallback<'_>],
    ) -> BackendResult<()> {
        for overlay in overlays.iter_mut() {
            overlay();
        }

        let (width, height) = self.size;
        if width == 0 || height == 0 {
            return Ok(());
        }

        let gl = self.gl();
        unsafe {
            gl.viewport(0, 0, width as i32, height as i32);
            // The plan starts from depth testing on
            gl.enable(glow::DEPTH_TEST);
            gl.clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT);
        }

        let options = PlanOptions {
            clip_space: ClipSpace::OpenGl,
            camera_affects_2d: self.camera_affects_2d,
        };
        let plan = plan_frame(frame, renderables, options);
        if plan.skipped > 0 {
            log::trace!("Skipped {} malformed renderables", plan.skipped);
        }

        let mut program = None;
        for command in &plan.commands {
            match command {
                DrawCommand::SetDepthTest(true) => unsafe { gl.enable(glow::DEPTH_TEST) },
                DrawCommand::SetDepthTest(false) => unsafe { gl.disable(glow::DEPTH_TEST) },
                DrawCommand::UseProgram(handle) => {
                    program = self.programs.get(handle).copied();
                    if program.is_none() {
                        log::warn!("Unknown program {}; its renderables are skipped", handle);
                    }
                    unsafe { gl.use_program(program) };
                }
                DrawCommand::Draw(call) => {
                    if let Some(program) = program {
                        self.draw(program, call, frame);
                    }
                }
            }
        }

        self.context.swap_buffers()
    }

    fn resize(&mut self, width: u32, height: u32) {
        log::debug!("Resize to {}x{}", width, height);
        self.size = (width, height);
        self.context.resize(width, height);
    }

    fn window(&self) -> &Window {
        self.context.window()
    }

    fn kind(&self) -> BackendKind {
        BackendKind::OpenGl
    }

    fn deinit(self: Box<Self>) {
        log::info!("Shutting down OpenGL backend");
        drop(self);
    }
}

impl Drop for OpenGlBackend {
    fn drop(&mut self) {
        let gl = &self.context.gl;
        unsafe {
            gl.use_program(None);
            for (_, texture) in self.textures.drain() {
                gl.delete_texture(texture.texture);
            }
            for (_, buffer) in self.buffers.drain() {
                gl.delete_buffer(buffer);
            }
            for (_, program) in self.programs.drain() {
                gl.delete_program(program);
            }
            for (_, shader) in self.shaders.drain() {
                gl.delete_shader(shader);
            }
            gl.delete_vertex_array(self.vao);
        }
        log::info!("OpenGL backend destroyed");
    }
}
