// Per-frame draw planning with redundant-state elimination
//
// Both backends walk the renderable list the same way, so the walk lives here
// as a pure function producing a command list. The OpenGL backend maps each
// command to driver calls; the Vulkan backend records them into a command
// buffer.
//
// Tracked state is the bound program and the depth-test switch. The list is
// NOT sorted: state changes are only saved between adjacent renderables that
// already share state, so interleaved flags toggle on every item.

use crate::handle::Handle;
use crate::renderable::{FrameState, Renderable};
use glam::{Mat4, Vec3};

/// Near plane of the 3D perspective projection
pub const PERSPECTIVE_NEAR: f32 = 0.01;
/// Far plane of the 3D perspective projection
pub const PERSPECTIVE_FAR: f32 = 500.0;
/// Depth range of the 2D orthographic projection
pub const ORTHO_NEAR: f32 = 0.0;
pub const ORTHO_FAR: f32 = 100.0;

/// Clip-space convention of the target API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipSpace {
    /// Depth in [-1, 1], +Y up
    OpenGl,
    /// Depth in [0, 1], +Y down
    Vulkan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanOptions {
    pub clip_space: ClipSpace,
    /// Multiply 2D renderables by the camera view matrix too
    pub camera_affects_2d: bool,
}

/// One draw: the renderable plus its final model-view-projection matrix
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall<'a> {
    pub renderable: &'a Renderable,
    pub mvp: Mat4,
}

impl DrawCall<'_> {
    /// The four matrices uploaded per draw: MVP, model, rotation, scale.
    pub fn matrices(&self) -> [Mat4; 4] {
        [
            self.mvp,
            self.renderable.transform,
            self.renderable.rotate,
            self.renderable.scale,
        ]
    }

    pub fn model(&self) -> Mat4 {
        self.renderable.object_matrix()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand<'a> {
    SetDepthTest(bool),
    UseProgram(Handle),
    Draw(DrawCall<'a>),
}

/// Ordered commands for one frame
#[derive(Debug, Default)]
pub struct FramePlan<'a> {
    pub commands: Vec<DrawCommand<'a>>,
    /// Enabled renderables dropped because they were not drawable
    pub skipped: usize,
}

impl FramePlan<'_> {
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::Draw(_)))
            .count()
    }

    pub fn depth_toggle_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::SetDepthTest(_)))
            .count()
    }

    pub fn program_bind_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::UseProgram(_)))
            .count()
    }
}

/// Projection matrices shared by every draw of a frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projections {
    pub perspective: Mat4,
    pub orthographic: Mat4,
}

impl Projections {
    pub fn new(frame: &FrameState, clip_space: ClipSpace) -> Self {
        let fov = frame.fov_degrees.to_radians();
        let aspect = frame.aspect_ratio();
        // 2D space spans [-1, 1] horizontally and keeps the window's aspect.
        let half_width = 1.0;
        let half_height = frame.viewport_height as f32 / frame.viewport_width.max(1) as f32;

        match clip_space {
            ClipSpace::OpenGl => Self {
                perspective: Mat4::perspective_rh_gl(fov, aspect, PERSPECTIVE_NEAR, PERSPECTIVE_FAR),
                orthographic: Mat4::orthographic_rh_gl(
                    -half_width,
                    half_width,
                    -half_height,
                    half_height,
                    ORTHO_NEAR,
                    ORTHO_FAR,
                ),
            },
            ClipSpace::Vulkan => {
                let flip_y = Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0));
                Self {
                    perspective: flip_y
                        * Mat4::perspective_rh(fov, aspect, PERSPECTIVE_NEAR, PERSPECTIVE_FAR),
                    orthographic: flip_y
                        * Mat4::orthographic_rh(
                            -half_width,
                            half_width,
                            -half_height,
                            half_height,
                            ORTHO_NEAR,
                            ORTHO_FAR,
                        ),
                }
            }
        }
    }

    pub fn mvp(&self, frame: &FrameState, renderable: &Renderable, camera_affects_2d: bool) -> Mat4 {
        let model = renderable.object_matrix();
        if renderable.is_3d {
            self.perspective * frame.view * model
        } else if camera_affects_2d {
            self.orthographic * frame.view * model
        } else {
            self.orthographic * model
        }
    }
}

/// Walk `renderables` in order and emit the minimal state changes plus draws.
///
/// Depth testing starts enabled (the backends enable it at init) and no
/// program starts bound. Disabled renderables produce nothing; enabled but
/// malformed ones are counted in `skipped` and leave the tracked state alone.
pub fn plan_frame<'a>(
    frame: &FrameState,
    renderables: &'a [Renderable],
    options: PlanOptions,
) -> FramePlan<'a> {
    let projections = Projections::new(frame, options.clip_space);
    let mut plan = FramePlan {
        commands: Vec::with_capacity(renderables.len() * 2),
        skipped: 0,
    };

    let mut current_program = Handle::NONE;
    let mut depth_test = true;

    for renderable in renderables.iter().filter(|r| r.enabled) {
        if !renderable.is_drawable() {
            log::trace!("Skipping malformed renderable: {:?}", renderable);
            plan.skipped += 1;
            continue;
        }

        if renderable.test_depth != depth_test {
            depth_test = renderable.test_depth;
            plan.commands.push(DrawCommand::SetDepthTest(depth_test));
        }

        if renderable.shader_program != current_program {
            current_program = renderable.shader_program;
            plan.commands.push(DrawCommand::UseProgram(current_program));
        }

        plan.commands.push(DrawCommand::Draw(DrawCall {
            renderable,
            mvp: projections.mvp(frame, renderable, options.camera_affects_2d),
        }));
    }

    plan
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
