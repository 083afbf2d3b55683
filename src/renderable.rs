// Draw descriptors and per-frame camera state
//
// Both are plain values produced outside the graphics core. The render loop
// only reads them; nothing here is persisted between frames.

use crate::handle::Handle;
use glam::{Mat4, Vec3};

/// Descriptor of one drawable object.
///
/// Vertex data is laid out as a structure of arrays: one buffer per
/// attribute, all indexed by the same `u32` index buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Renderable {
    pub shader_program: Handle,

    /// `vec3` positions, attribute location 0
    pub vertex_buffer: Handle,
    /// `vec3` colors, attribute location 1
    pub color_buffer: Handle,
    /// `vec2` texture coordinates, attribute location 2
    pub uv_buffer: Handle,
    /// `vec3` normals, attribute location 3
    pub normal_buffer: Handle,
    /// `u32` triangle-list indices
    pub index_buffer: Handle,
    pub index_count: u32,

    pub transform: Mat4,
    pub rotate: Mat4,
    pub scale: Mat4,

    pub texture: Handle,

    pub enabled: bool,
    pub test_depth: bool,
    pub is_3d: bool,
}

impl Default for Renderable {
    fn default() -> Self {
        Self {
            shader_program: Handle::NONE,
            vertex_buffer: Handle::NONE,
            color_buffer: Handle::NONE,
            uv_buffer: Handle::NONE,
            normal_buffer: Handle::NONE,
            index_buffer: Handle::NONE,
            index_count: 0,
            transform: Mat4::IDENTITY,
            rotate: Mat4::IDENTITY,
            scale: Mat4::IDENTITY,
            texture: Handle::NONE,
            enabled: true,
            test_depth: true,
            is_3d: true,
        }
    }
}

impl Renderable {
    /// Model matrix: translation, then rotation, then scale.
    pub fn object_matrix(&self) -> Mat4 {
        self.transform * self.rotate * self.scale
    }

    /// A renderable missing its program, geometry or indices cannot be drawn.
    ///
    /// Such entries are skipped by the render loop instead of failing the frame.
    pub fn is_drawable(&self) -> bool {
        self.shader_program.is_some()
            && self.vertex_buffer.is_some()
            && self.color_buffer.is_some()
            && self.uv_buffer.is_some()
            && self.normal_buffer.is_some()
            && self.index_buffer.is_some()
            && self.index_count > 0
    }
}

/// Camera and viewport for a single `render_frame` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameState {
    pub view: Mat4,
    pub camera_position: Vec3,
    pub camera_direction: Vec3,
    /// Vertical field of view in degrees
    pub fov_degrees: f32,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl FrameState {
    pub fn aspect_ratio(&self) -> f32 {
        self.viewport_width as f32 / self.viewport_height.max(1) as f32
    }

    /// A zero-sized viewport (minimized window) renders nothing.
    pub fn is_empty(&self) -> bool {
        self.viewport_width == 0 || self.viewport_height == 0
    }
}

impl Default for FrameState {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            camera_position: Vec3::ZERO,
            camera_direction: Vec3::NEG_Z,
            fov_degrees: 45.0,
            viewport_width: 1280,
            viewport_height: 720,
        }
    }
}

/// UI overlay hook run once per frame, before any scene draw.
///
/// Callbacks must not block indefinitely; they cannot reach the backend
/// because it is mutably borrowed for the whole frame.
pub type OverlayCallback<'a> = &'a mut dyn FnMut();

#[cfg(test)]
mod tests {
    use super::*;

    fn drawable() -> Renderable {
        Renderable {
            shader_program: Handle::from_raw(1),
            vertex_buffer: Handle::from_raw(2),
            color_buffer: Handle::from_raw(3),
            uv_buffer: Handle::from_raw(4),
            normal_buffer: Handle::from_raw(5),
            index_buffer: Handle::from_raw(6),
            index_count: 6,
            ..Default::default()
        }
    }

    #[test]
    fn test_object_matrix_applies_scale_then_rotation_then_translation() {
        let r = Renderable {
            transform: Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0)),
            rotate: Mat4::from_rotation_z(std::f32::consts::FRAC_PI_2),
            scale: Mat4::from_scale(Vec3::splat(2.0)),
            ..Default::default()
        };
        let p = r.object_matrix().transform_point3(Vec3::X);
        assert!((p - Vec3::new(10.0, 2.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_complete_renderable_is_drawable() {
        assert!(drawable().is_drawable());
    }

    #[test]
    fn test_missing_program_or_buffers_is_not_drawable() {
        let mut r = drawable();
        r.shader_program = Handle::NONE;
        assert!(!r.is_drawable());

        let mut r = drawable();
        r.normal_buffer = Handle::NONE;
        assert!(!r.is_drawable());

        let mut r = drawable();
        r.index_count = 0;
        assert!(!r.is_drawable());
    }

    #[test]
    fn test_texture_is_optional() {
        let mut r = drawable();
        r.texture = Handle::NONE;
        assert!(r.is_drawable());
    }

    #[test]
    fn test_frame_state_aspect_and_emptiness() {
        let frame = FrameState {
            viewport_width: 800,
            viewport_height: 400,
            ..Default::default()
        };
        assert_eq!(frame.aspect_ratio(), 2.0);
        assert!(!frame.is_empty());

        let minimized = FrameState {
            viewport_width: 0,
            ..frame
        };
        assert!(minimized.is_empty());
    }
}
