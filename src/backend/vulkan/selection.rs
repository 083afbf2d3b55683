// Physical device scoring and swapchain property choices
//
// Pure functions over data already queried from the driver, so the rules can
// be exercised without a GPU. `device.rs` and `swapchain.rs` do the querying.

use ash::vk;
use std::collections::BTreeSet;
use std::ffi::CStr;

/// Score bonus for a discrete GPU
pub const DISCRETE_GPU_BONUS: u32 = 1000;
/// `maxImageDimension2D` is divided by this before being added to the score
pub const IMAGE_DIMENSION_DIVISOR: u32 = 25;

/// Queue families a device must offer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Scans families in order, taking each qualifying family as it is seen,
    /// and stops once both roles are filled. A later family that does both
    /// replaces an earlier graphics-only pick.
    pub fn find(
        families: &[vk::QueueFamilyProperties],
        mut supports_present: impl FnMut(u32) -> bool,
    ) -> Self {
        let mut indices = Self::default();

        for (index, family) in families.iter().enumerate() {
            let index = index as u32;
            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                indices.graphics = Some(index);
            }
            if supports_present(index) {
                indices.present = Some(index);
            }
            if indices.is_complete() {
                break;
            }
        }

        indices
    }

    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Distinct family indices; one queue create info is built per entry.
    pub fn unique(&self) -> BTreeSet<u32> {
        self.graphics.into_iter().chain(self.present).collect()
    }
}

/// Everything the scoring rule looks at for one physical device
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub max_image_dimension_2d: u32,
    pub queue_families: QueueFamilyIndices,
    pub extensions_supported: bool,
    pub format_count: usize,
    pub present_mode_count: usize,
}

impl DeviceCandidate {
    pub fn swapchain_adequate(&self) -> bool {
        self.format_count > 0 && self.present_mode_count > 0
    }
}

/// Suitability score; zero means the device cannot be used at all.
pub fn score_device(candidate: &DeviceCandidate) -> u32 {
    let mut score = 0;

    if candidate.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
        score += DISCRETE_GPU_BONUS;
    }
    score += candidate.max_image_dimension_2d / IMAGE_DIMENSION_DIVISOR;

    if !(candidate.queue_families.is_complete()
        && candidate.extensions_supported
        && candidate.swapchain_adequate())
    {
        score = 0;
    }

    score
}

/// Highest scoring item; the first one seen wins ties. `None` when every
/// score is zero.
pub fn pick_best<T>(scored: impl IntoIterator<Item = (T, u32)>) -> Option<T> {
    let mut best: Option<(T, u32)> = None;

    for (item, score) in scored {
        if score == 0 {
            continue;
        }
        match &best {
            Some((_, best_score)) if *best_score >= score => {}
            _ => best = Some((item, score)),
        }
    }

    best.map(|(item, _)| item)
}

/// Whether every `required` extension appears in `available`.
pub fn extensions_supported(available: &[vk::ExtensionProperties], required: &[&CStr]) -> bool {
    required.iter().all(|needed| {
        available
            .iter()
            .any(|ext| ext.extension_name_as_c_str().is_ok_and(|name| name == *needed))
    })
}

/// BGRA8 sRGB with the non-linear sRGB color space, else the first format.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

/// Present mode for the swapchain.
///
/// MAILBOX: no tearing, lowest latency with vsync
/// FIFO: always supported
/// IMMEDIATE: only considered when vsync is off, may tear
pub fn choose_present_mode(modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if !vsync && modes.contains(&vk::PresentModeKHR::IMMEDIATE) {
        return vk::PresentModeKHR::IMMEDIATE;
    }
    if modes.contains(&vk::PresentModeKHR::MAILBOX) {
        return vk::PresentModeKHR::MAILBOX;
    }
    vk::PresentModeKHR::FIFO
}

/// Swapchain extent. A `u32::MAX` current extent means the surface lets us
/// pick, so the framebuffer size is clamped into the allowed range.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }

    vk::Extent2D {
        width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// One more image than the minimum, capped by the maximum (0 = unbounded).
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = caps.min_image_count + 1;
    if caps.max_image_count > 0 && count > caps.max_image_count {
        caps.max_image_count
    } else {
        count
    }
}

/// Highest sample count the device supports that does not exceed `requested`.
///
/// `supported` should already be the intersection of the color and depth
/// framebuffer sample counts.
pub fn choose_sample_count(supported: vk::SampleCountFlags, requested: u32) -> vk::SampleCountFlags {
    const CANDIDATES: [(u32, vk::SampleCountFlags); 7] = [
        (64, vk::SampleCountFlags::TYPE_64),
        (32, vk::SampleCountFlags::TYPE_32),
        (16, vk::SampleCountFlags::TYPE_16),
        (8, vk::SampleCountFlags::TYPE_8),
        (4, vk::SampleCountFlags::TYPE_4),
        (2, vk::SampleCountFlags::TYPE_2),
        (1, vk::SampleCountFlags::TYPE_1),
    ];

    CANDIDATES
        .iter()
        .find(|(count, flag)| *count <= requested && supported.contains(*flag))
        .map(|(_, flag)| *flag)
        .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

#[cfg(test)]
#[path = "selection_tests.rs"]
mod tests;
