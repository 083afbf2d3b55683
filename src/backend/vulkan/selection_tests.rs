use super::*;
use std::ffi::c_char;

fn candidate() -> DeviceCandidate {
    DeviceCandidate {
        name: "test gpu".into(),
        device_type: vk::PhysicalDeviceType::INTEGRATED_GPU,
        max_image_dimension_2d: 16384,
        queue_families: QueueFamilyIndices {
            graphics: Some(0),
            present: Some(0),
        },
        extensions_supported: true,
        format_count: 2,
        present_mode_count: 1,
    }
}

fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
    vk::QueueFamilyProperties {
        queue_flags: flags,
        queue_count: 1,
        ..Default::default()
    }
}

fn extension(name: &CStr) -> vk::ExtensionProperties {
    let mut props = vk::ExtensionProperties::default();
    for (dst, src) in props.extension_name.iter_mut().zip(name.to_bytes()) {
        *dst = *src as c_char;
    }
    props
}

fn caps(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
    vk::SurfaceCapabilitiesKHR {
        current_extent: vk::Extent2D {
            width: current.0,
            height: current.1,
        },
        min_image_extent: vk::Extent2D {
            width: min.0,
            height: min.1,
        },
        max_image_extent: vk::Extent2D {
            width: max.0,
            height: max.1,
        },
        ..Default::default()
    }
}

// ============================================================================
// Device scoring
// ============================================================================

#[test]
fn test_integrated_score_is_image_dimension_share() {
    assert_eq!(score_device(&candidate()), 16384 / 25);
}

#[test]
fn test_discrete_gpu_gets_bonus() {
    let discrete = DeviceCandidate {
        device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
        ..candidate()
    };
    assert_eq!(score_device(&discrete), 1000 + 16384 / 25);
}

#[test]
fn test_incomplete_queue_families_score_zero() {
    let no_present = DeviceCandidate {
        device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
        queue_families: QueueFamilyIndices {
            graphics: Some(0),
            present: None,
        },
        ..candidate()
    };
    assert_eq!(score_device(&no_present), 0);

    let no_graphics = DeviceCandidate {
        queue_families: QueueFamilyIndices {
            graphics: None,
            present: Some(1),
        },
        ..candidate()
    };
    assert_eq!(score_device(&no_graphics), 0);
}

#[test]
fn test_missing_extensions_score_zero() {
    let device = DeviceCandidate {
        device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
        extensions_supported: false,
        ..candidate()
    };
    assert_eq!(score_device(&device), 0);
}

#[test]
fn test_inadequate_swapchain_scores_zero() {
    let no_formats = DeviceCandidate {
        format_count: 0,
        ..candidate()
    };
    let no_modes = DeviceCandidate {
        present_mode_count: 0,
        ..candidate()
    };
    assert_eq!(score_device(&no_formats), 0);
    assert_eq!(score_device(&no_modes), 0);
}

#[test]
fn test_discrete_beats_larger_integrated() {
    let discrete = DeviceCandidate {
        name: "discrete".into(),
        device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
        max_image_dimension_2d: 4096,
        ..candidate()
    };
    let integrated = DeviceCandidate {
        name: "integrated".into(),
        max_image_dimension_2d: 16384,
        ..candidate()
    };
    let picked = pick_best(
        [integrated, discrete]
            .into_iter()
            .map(|c| {
                let score = score_device(&c);
                (c.name, score)
            }),
    );
    assert_eq!(picked.as_deref(), Some("discrete"));
}

#[test]
fn test_pick_best_prefers_first_on_tie() {
    assert_eq!(pick_best([("a", 10), ("b", 10), ("c", 3)]), Some("a"));
}

#[test]
fn test_pick_best_takes_strictly_higher_later_score() {
    assert_eq!(pick_best([("a", 10), ("b", 11)]), Some("b"));
}

#[test]
fn test_pick_best_rejects_all_zero() {
    assert_eq!(pick_best([("a", 0), ("b", 0)]), None);
    assert_eq!(pick_best(Vec::<(&str, u32)>::new()), None);
}

// ============================================================================
// Queue families
// ============================================================================

#[test]
fn test_queue_families_take_first_match() {
    let families = [
        family(vk::QueueFlags::TRANSFER),
        family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        family(vk::QueueFlags::GRAPHICS),
    ];
    let indices = QueueFamilyIndices::find(&families, |i| i >= 1);
    assert_eq!(indices.graphics, Some(1));
    assert_eq!(indices.present, Some(1));
    assert_eq!(indices.unique().len(), 1);
}

#[test]
fn test_later_family_that_presents_replaces_graphics_only_family() {
    let families = [family(vk::QueueFlags::GRAPHICS), family(vk::QueueFlags::GRAPHICS)];
    let indices = QueueFamilyIndices::find(&families, |i| i == 1);
    assert_eq!(indices.graphics, Some(1));
    assert_eq!(indices.present, Some(1));
    assert_eq!(indices.unique().into_iter().collect::<Vec<_>>(), vec![1]);
}

#[test]
fn test_scan_stops_once_both_roles_are_filled() {
    let families = [
        family(vk::QueueFlags::GRAPHICS),
        family(vk::QueueFlags::GRAPHICS),
        family(vk::QueueFlags::GRAPHICS),
    ];
    let indices = QueueFamilyIndices::find(&families, |_| true);
    assert_eq!(indices.graphics, Some(0));
    assert_eq!(indices.present, Some(0));
}

#[test]
fn test_separate_present_family_yields_two_unique_indices() {
    let families = [family(vk::QueueFlags::GRAPHICS), family(vk::QueueFlags::TRANSFER)];
    let indices = QueueFamilyIndices::find(&families, |i| i == 1);
    assert_eq!(indices.graphics, Some(0));
    assert_eq!(indices.present, Some(1));
    assert_eq!(indices.unique().into_iter().collect::<Vec<_>>(), vec![0, 1]);
}

#[test]
fn test_no_present_support_is_incomplete() {
    let families = [family(vk::QueueFlags::GRAPHICS)];
    let indices = QueueFamilyIndices::find(&families, |_| false);
    assert!(!indices.is_complete());
    assert_eq!(indices.unique().len(), 1);
}

// ============================================================================
// Extensions
// ============================================================================

#[test]
fn test_required_extensions_found() {
    let available = [
        extension(c"VK_KHR_maintenance1"),
        extension(c"VK_KHR_swapchain"),
    ];
    assert!(extensions_supported(&available, &[c"VK_KHR_swapchain"]));
    assert!(!extensions_supported(
        &available,
        &[c"VK_KHR_swapchain", c"VK_KHR_portability_subset"]
    ));
    assert!(extensions_supported(&available, &[]));
}

// ============================================================================
// Surface format and present mode
// ============================================================================

#[test]
fn test_prefers_bgra_srgb_nonlinear() {
    let formats = [
        vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        },
        vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        },
    ];
    assert_eq!(choose_surface_format(&formats), Some(formats[1]));
}

#[test]
fn test_falls_back_to_first_format() {
    let formats = [
        vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        },
        vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
        },
    ];
    assert_eq!(choose_surface_format(&formats), Some(formats[0]));
    assert_eq!(choose_surface_format(&[]), None);
}

#[test]
fn test_mailbox_whenever_available() {
    let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
    assert_eq!(choose_present_mode(&modes, true), vk::PresentModeKHR::MAILBOX);
}

#[test]
fn test_fifo_without_mailbox() {
    let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO];
    assert_eq!(choose_present_mode(&modes, true), vk::PresentModeKHR::FIFO);
}

#[test]
fn test_immediate_only_without_vsync() {
    let modes = [
        vk::PresentModeKHR::FIFO,
        vk::PresentModeKHR::MAILBOX,
        vk::PresentModeKHR::IMMEDIATE,
    ];
    assert_eq!(choose_present_mode(&modes, false), vk::PresentModeKHR::IMMEDIATE);

    let no_immediate = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
    assert_eq!(choose_present_mode(&no_immediate, false), vk::PresentModeKHR::MAILBOX);
}

// ============================================================================
// Extent, image count, samples
// ============================================================================

#[test]
fn test_defined_extent_is_used_verbatim() {
    let c = caps((800, 600), (1, 1), (4096, 4096));
    assert_eq!(
        choose_extent(&c, 1920, 1080),
        vk::Extent2D {
            width: 800,
            height: 600
        }
    );
}

#[test]
fn test_undefined_extent_clamps_to_bounds() {
    let c = caps((u32::MAX, u32::MAX), (100, 100), (1000, 800));
    assert_eq!(
        choose_extent(&c, 5000, 50),
        vk::Extent2D {
            width: 1000,
            height: 100
        }
    );
    assert_eq!(
        choose_extent(&c, 640, 480),
        vk::Extent2D {
            width: 640,
            height: 480
        }
    );
}

#[test]
fn test_image_count_is_min_plus_one() {
    let c = vk::SurfaceCapabilitiesKHR {
        min_image_count: 2,
        max_image_count: 0,
        ..Default::default()
    };
    assert_eq!(choose_image_count(&c), 3);
}

#[test]
fn test_image_count_respects_max() {
    let c = vk::SurfaceCapabilitiesKHR {
        min_image_count: 3,
        max_image_count: 3,
        ..Default::default()
    };
    assert_eq!(choose_image_count(&c), 3);
}

#[test]
fn test_sample_count_is_capped_by_request_and_support() {
    let supported = vk::SampleCountFlags::TYPE_1
        | vk::SampleCountFlags::TYPE_2
        | vk::SampleCountFlags::TYPE_4
        | vk::SampleCountFlags::TYPE_8;
    assert_eq!(choose_sample_count(supported, 4), vk::SampleCountFlags::TYPE_4);
    assert_eq!(choose_sample_count(supported, 16), vk::SampleCountFlags::TYPE_8);
    assert_eq!(choose_sample_count(supported, 3), vk::SampleCountFlags::TYPE_2);
    assert_eq!(choose_sample_count(supported, 1), vk::SampleCountFlags::TYPE_1);
    assert_eq!(choose_sample_count(supported, 0), vk::SampleCountFlags::TYPE_1);
}
