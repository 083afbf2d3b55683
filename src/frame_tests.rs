use super::*;

const GL: PlanOptions = PlanOptions {
    clip_space: ClipSpace::OpenGl,
    camera_affects_2d: false,
};

fn renderable(program: u32) -> Renderable {
    Renderable {
        shader_program: Handle::from_raw(program),
        vertex_buffer: Handle::from_raw(10),
        color_buffer: Handle::from_raw(11),
        uv_buffer: Handle::from_raw(12),
        normal_buffer: Handle::from_raw(13),
        index_buffer: Handle::from_raw(14),
        index_count: 36,
        ..Default::default()
    }
}

fn with_depth(test_depth: bool) -> Renderable {
    Renderable {
        test_depth,
        ..renderable(1)
    }
}

fn frame() -> FrameState {
    FrameState {
        view: Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y),
        camera_position: Vec3::new(0.0, 0.0, 5.0),
        camera_direction: Vec3::NEG_Z,
        fov_degrees: 45.0,
        viewport_width: 1280,
        viewport_height: 720,
    }
}

fn assert_mat_eq(a: Mat4, b: Mat4) {
    assert!(a.abs_diff_eq(b, 1e-5), "{a:?} != {b:?}");
}

// ============================================================================
// Enabled filtering
// ============================================================================

#[test]
fn test_only_enabled_renderables_are_drawn() {
    let list = vec![
        renderable(1),
        Renderable {
            enabled: false,
            ..renderable(1)
        },
        renderable(1),
    ];
    let plan = plan_frame(&frame(), &list, GL);
    assert_eq!(plan.draw_count(), 2);
    assert_eq!(plan.skipped, 0);
}

#[test]
fn test_empty_list_produces_no_commands() {
    let plan = plan_frame(&frame(), &[], GL);
    assert!(plan.commands.is_empty());
}

#[test]
fn test_disabled_renderable_does_not_touch_state() {
    let list = vec![Renderable {
        enabled: false,
        test_depth: false,
        ..renderable(3)
    }];
    let plan = plan_frame(&frame(), &list, GL);
    assert!(plan.commands.is_empty());
}

// ============================================================================
// Depth-test toggling
// ============================================================================

#[test]
fn test_depth_toggles_only_on_change() {
    let list: Vec<_> = [true, true, false, false, true]
        .into_iter()
        .map(with_depth)
        .collect();
    let plan = plan_frame(&frame(), &list, GL);
    assert_eq!(plan.depth_toggle_count(), 2);

    let toggles: Vec<_> = plan
        .commands
        .iter()
        .filter_map(|c| match c {
            DrawCommand::SetDepthTest(on) => Some(*on),
            _ => None,
        })
        .collect();
    assert_eq!(toggles, vec![false, true]);
}

#[test]
fn test_interleaved_depth_flags_toggle_every_item() {
    let list: Vec<_> = [false, true, false, true].into_iter().map(with_depth).collect();
    let plan = plan_frame(&frame(), &list, GL);
    assert_eq!(plan.depth_toggle_count(), 4);
}

#[test]
fn test_depth_state_starts_enabled() {
    let list = [with_depth(true)];
    let plan = plan_frame(&frame(), &list, GL);
    assert_eq!(plan.depth_toggle_count(), 0);
}

#[test]
fn test_toggle_precedes_its_draw() {
    let list = vec![with_depth(false)];
    let plan = plan_frame(&frame(), &list, GL);
    assert!(matches!(plan.commands[0], DrawCommand::SetDepthTest(false)));
    assert!(matches!(plan.commands.last(), Some(DrawCommand::Draw(_))));
}

// ============================================================================
// Program binding
// ============================================================================

#[test]
fn test_program_rebinds_only_when_it_changes() {
    let list = vec![renderable(1), renderable(1), renderable(2), renderable(1)];
    let plan = plan_frame(&frame(), &list, GL);
    assert_eq!(plan.program_bind_count(), 3);
    let bound: Vec<_> = plan
        .commands
        .iter()
        .filter_map(|c| match c {
            DrawCommand::UseProgram(h) => Some(h.raw()),
            _ => None,
        })
        .collect();
    assert_eq!(bound, vec![1, 2, 1]);
}

// ============================================================================
// Malformed renderables
// ============================================================================

#[test]
fn test_malformed_renderables_are_skipped_not_fatal() {
    let list = vec![
        renderable(1),
        Renderable {
            shader_program: Handle::NONE,
            ..renderable(1)
        },
        Renderable {
            index_buffer: Handle::NONE,
            ..renderable(1)
        },
        renderable(1),
    ];
    let plan = plan_frame(&frame(), &list, GL);
    assert_eq!(plan.draw_count(), 2);
    assert_eq!(plan.skipped, 2);
}

#[test]
fn test_skipped_renderable_leaves_depth_state_alone() {
    let list = vec![
        with_depth(true),
        Renderable {
            index_count: 0,
            test_depth: false,
            ..renderable(1)
        },
        with_depth(true),
    ];
    let plan = plan_frame(&frame(), &list, GL);
    assert_eq!(plan.depth_toggle_count(), 0);
    assert_eq!(plan.draw_count(), 2);
}

// ============================================================================
// Projections
// ============================================================================

#[test]
fn test_3d_mvp_is_perspective_view_model() {
    let f = frame();
    let r = Renderable {
        transform: Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)),
        ..renderable(1)
    };
    let list = [r.clone()];
    let plan = plan_frame(&f, &list, GL);
    let DrawCommand::Draw(call) = plan.commands.last().unwrap() else {
        panic!("expected a draw");
    };
    let expected = Mat4::perspective_rh_gl(45f32.to_radians(), 1280.0 / 720.0, 0.01, 500.0)
        * f.view
        * r.object_matrix();
    assert_mat_eq(call.mvp, expected);
}

#[test]
fn test_2d_ignores_camera_by_default() {
    let f = frame();
    let list = [Renderable {
        is_3d: false,
        ..renderable(1)
    }];
    let plan = plan_frame(&f, &list, GL);
    let DrawCommand::Draw(call) = plan.commands.last().unwrap() else {
        panic!("expected a draw");
    };
    let ortho = Mat4::orthographic_rh_gl(-1.0, 1.0, -720.0 / 1280.0, 720.0 / 1280.0, 0.0, 100.0);
    assert_mat_eq(call.mvp, ortho);
}

#[test]
fn test_2d_can_follow_camera() {
    let f = frame();
    let list = [Renderable {
        is_3d: false,
        ..renderable(1)
    }];
    let options = PlanOptions {
        camera_affects_2d: true,
        ..GL
    };
    let plan = plan_frame(&f, &list, options);
    let DrawCommand::Draw(call) = plan.commands.last().unwrap() else {
        panic!("expected a draw");
    };
    let ortho = Mat4::orthographic_rh_gl(-1.0, 1.0, -720.0 / 1280.0, 720.0 / 1280.0, 0.0, 100.0);
    assert_mat_eq(call.mvp, ortho * f.view);
}

#[test]
fn test_vulkan_projection_flips_y() {
    let f = frame();
    let gl = Projections::new(&f, ClipSpace::OpenGl);
    let vk = Projections::new(&f, ClipSpace::Vulkan);
    let p = Vec3::new(0.0, 0.5, -10.0);
    let gl_clip = gl.perspective.project_point3(p);
    let vk_clip = vk.perspective.project_point3(p);
    assert!(gl_clip.y > 0.0);
    assert!(vk_clip.y < 0.0);
    assert!((gl_clip.y + vk_clip.y).abs() < 1e-5);
}

#[test]
fn test_vulkan_depth_range_is_zero_to_one() {
    let f = frame();
    let vk = Projections::new(&f, ClipSpace::Vulkan);
    let near = vk.perspective.project_point3(Vec3::new(0.0, 0.0, -PERSPECTIVE_NEAR));
    let far = vk.perspective.project_point3(Vec3::new(0.0, 0.0, -PERSPECTIVE_FAR));
    assert!(near.z.abs() < 1e-4);
    assert!((far.z - 1.0).abs() < 1e-4);
}

#[test]
fn test_draw_call_packs_four_matrices() {
    let r = Renderable {
        transform: Mat4::from_translation(Vec3::X),
        rotate: Mat4::from_rotation_y(1.0),
        scale: Mat4::from_scale(Vec3::splat(3.0)),
        ..renderable(1)
    };
    let call = DrawCall {
        renderable: &r,
        mvp: Mat4::IDENTITY,
    };
    let m = call.matrices();
    assert_eq!(m[0], Mat4::IDENTITY);
    assert_eq!(m[1], r.transform);
    assert_eq!(m[2], r.rotate);
    assert_eq!(m[3], r.scale);
}
