// Backend module - the rendering contract and its two implementations
//
// The application only ever talks to `dyn GraphicsBackend`. Which
// implementation sits behind it is decided once, at startup, from the
// configured `BackendKind`. Each implementation is compiled in through its
// own cargo feature.

#[cfg(feature = "opengl")]
pub mod opengl;
#[cfg(feature = "vulkan")]
pub mod vulkan;

use crate::config::{BackendKind, Config};
use crate::error::{BackendError, BackendResult};
use crate::handle::Handle;
use crate::renderable::{FrameState, OverlayCallback, Renderable};
use crate::shader::ShaderStage;
use std::path::Path;
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Fullscreen, Window, WindowAttributes};

/// What a buffer created with [`GraphicsBackend::create_buffer`] feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// Per-vertex attribute data (positions, colors, UVs or normals)
    Vertex,
    /// `u32` triangle-list indices
    Index,
}

/// Uniform interface over a graphics API.
///
/// Asset calls report recoverable failures by logging and returning
/// [`Handle::NONE`]; only environment or hardware mismatches come back as
/// [`BackendError`].
pub trait GraphicsBackend {
    /// Create the window and the API context behind it.
    fn init(event_loop: &ActiveEventLoop, config: &Config) -> BackendResult<Self>
    where
        Self: Sized;

    /// Read and compile one shader stage.
    fn load_shader(&mut self, path: &Path, stage: ShaderStage) -> Handle;

    /// Link a vertex and a fragment module into a program.
    ///
    /// Link errors and unknown modules give `Ok(Handle::NONE)`.
    fn create_program(&mut self, vertex: Handle, fragment: Handle) -> BackendResult<Handle>;

    fn load_texture(&mut self, path: &Path) -> Handle;

    /// Faces are given in +X, -X, +Y, -Y, +Z, -Z order.
    fn load_cubemap(&mut self, faces: &[&Path; 6]) -> Handle;

    /// Upload vertex attribute or index data. Empty data gives `Handle::NONE`.
    fn create_buffer(&mut self, kind: BufferKind, data: &[u8]) -> Handle;

    /// Draw and present exactly one frame.
    ///
    /// Every overlay callback runs once, in order, before any scene draw.
    fn render_frame(
        &mut self,
        frame: &FrameState,
        renderables: &[Renderable],
        overlays: &mut [OverlayCallback<'_>],
    ) -> BackendResult<()>;

    /// Notify the backend that the window's framebuffer changed size.
    fn resize(&mut self, width: u32, height: u32);

    fn window(&self) -> &Window;

    fn kind(&self) -> BackendKind;

    /// Release every resource. Consuming the box makes a second call impossible.
    fn deinit(self: Box<Self>);
}

/// Window settings shared by both backends.
pub(crate) fn window_attributes(config: &Config) -> WindowAttributes {
    let mut attributes = WindowAttributes::default()
        .with_title(&config.window.title)
        .with_inner_size(PhysicalSize::new(config.window.width, config.window.height));

    if config.window.fullscreen {
        attributes = attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
    }

    attributes
}

/// Create the backend named by `kind`.
pub fn create_backend(
    kind: BackendKind,
    _event_loop: &ActiveEventLoop,
    _config: &Config,
) -> BackendResult<Box<dyn GraphicsBackend>> {
    log::info!("Creating {} backend", kind.name());

    match kind {
        #[cfg(feature = "opengl")]
        BackendKind::OpenGl => Ok(Box::new(opengl::OpenGlBackend::init(_event_loop, _config)?)),
        #[cfg(feature = "vulkan")]
        BackendKind::Vulkan => Ok(Box::new(vulkan::VulkanBackend::init(_event_loop, _config)?)),
        #[allow(unreachable_patterns)]
        other => Err(BackendError::Unavailable(other.name())),
    }
}
