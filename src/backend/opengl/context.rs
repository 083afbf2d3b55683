// Window + OpenGL 4.1 core context
//
// glutin-winit picks a framebuffer config while the window is created, then
// a core-profile context is made current on a window surface. The `glow`
// function table is loaded from that display.

use crate::error::{BackendError, BackendResult};
use glutin::config::{Config as FramebufferConfig, ConfigTemplateBuilder, GlConfig};
use glutin::context::{
    ContextApi, ContextAttributesBuilder, GlProfile, NotCurrentGlContext, PossiblyCurrentContext, Version,
};
use glutin::display::{GetGlDisplay, GlDisplay};
use glutin::surface::{GlSurface, Surface, SwapInterval, WindowSurface};
use glutin_winit::{DisplayBuilder, GlWindow};
use raw_window_handle::HasWindowHandle;
use std::num::NonZeroU32;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window, WindowAttributes};

/// A current GL context bound to its window.
///
/// Field order is drop order: the function table, then the surface and
/// context, and the window last.
pub struct GlContext {
    pub gl: glow::Context,
    surface: Surface<WindowSurface>,
    context: PossiblyCurrentContext,
    window: Window,
}

impl GlContext {
    pub fn new(
        event_loop: &ActiveEventLoop,
        attributes: WindowAttributes,
        msaa_samples: u32,
        vsync: bool,
    ) -> BackendResult<Self> {
        let requested = msaa_samples.min(u8::MAX as u32) as u8;
        let mut template = ConfigTemplateBuilder::new().with_alpha_size(8).with_depth_size(24);
        if requested > 1 {
            template = template.with_multisampling(requested);
        }

        let (window, config) = DisplayBuilder::new()
            .with_window_attributes(Some(attributes))
            .build(event_loop, template, |configs| {
                // glutin reports an error before calling the picker when nothing matches
                pick_config(configs, requested).expect("display offered no framebuffer configs")
            })
            .map_err(|e| BackendError::Context(format!("no usable framebuffer config: {e}")))?;
        let window = window.ok_or_else(|| BackendError::Window("display builder returned no window".into()))?;

        log::info!(
            "GL framebuffer config: {} samples, depth {}, srgb {}",
            config.num_samples(),
            config.depth_size(),
            config.srgb_capable()
        );

        let display = config.display();
        let raw_window = window.window_handle().ok().map(|handle| handle.as_raw());
        let context_attributes = ContextAttributesBuilder::new()
            .with_profile(GlProfile::Core)
            .with_context_api(ContextApi::OpenGl(Some(Version::new(4, 1))))
            .build(raw_window);

        let not_current = unsafe { display.create_context(&config, &context_attributes) }
            .map_err(|e| BackendError::Context(format!("OpenGL 4.1 core context unavailable: {e}")))?;

        let surface_attributes = window
            .build_surface_attributes(Default::default())
            .map_err(|e| BackendError::Context(format!("window handle unavailable: {e}")))?;
        let surface = unsafe { display.create_window_surface(&config, &surface_attributes) }
            .map_err(|e| BackendError::Context(format!("failed to create window surface: {e}")))?;

        let context = not_current
            .make_current(&surface)
            .map_err(|e| BackendError::Context(format!("failed to make context current: {e}")))?;

        let interval = if vsync {
            SwapInterval::Wait(NonZeroU32::MIN)
        } else {
            SwapInterval::DontWait
        };
        if let Err(e) = surface.set_swap_interval(&context, interval) {
            log::warn!("Could not set swap interval {:?}: {}", interval, e);
        }

        let gl = unsafe { glow::Context::from_loader_function_cstr(|name| display.get_proc_address(name)) };

        Ok(Self {
            gl,
            surface,
            context,
            window,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn resize(&self, width: u32, height: u32) {
        if let (Some(width), Some(height)) = (NonZeroU32::new(width), NonZeroU32::new(height)) {
            self.surface.resize(&self.context, width, height);
        }
    }

    pub fn swap_buffers(&self) -> BackendResult<()> {
        self.surface
            .swap_buffers(&self.context)
            .map_err(|e| BackendError::Frame(format!("swap buffers: {e}")))
    }
}

/// Highest sample count not above `requested`; the first config otherwise.
fn pick_config(configs: Box<dyn Iterator<Item = FramebufferConfig> + '_>, requested: u8) -> Option<FramebufferConfig> {
    configs.reduce(|best, candidate| {
        let better = candidate.num_samples() > best.num_samples() && candidate.num_samples() <= requested.max(1);
        if better {
            candidate
        } else {
            best
        }
    })
}
