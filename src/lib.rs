// =============================================================================
// DUO RENDERER - one rendering contract over OpenGL 4.1 and Vulkan
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  Application (window events, scene, overlays)                   │
// │    └── Box<dyn GraphicsBackend>  (chosen from config.toml)      │
// │          ├── OpenGlBackend  -> driver state machine             │
// │          └── VulkanBackend  -> explicit device/swapchain/sync   │
// │                                                                 │
// │  Shared, backend-free pieces:                                   │
// │    handle       - non-zero resource handles + arenas            │
// │    shader       - file loading + 4.20 -> 4.10 GLSL translation  │
// │    frame        - state-minimized per-frame draw plan           │
// │    texture_data - image decoding to RGBA8                       │
// └─────────────────────────────────────────────────────────────────┘
//
// =============================================================================

pub mod backend;
pub mod config;
pub mod error;
pub mod frame;
pub mod handle;
pub mod renderable;
pub mod shader;
pub mod texture_data;

pub use backend::{create_backend, BufferKind, GraphicsBackend};
pub use config::{BackendKind, Config};
pub use error::{BackendError, BackendResult};
pub use handle::Handle;
pub use renderable::{FrameState, OverlayCallback, Renderable};
pub use shader::ShaderStage;
