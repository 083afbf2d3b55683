// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// Recreated whole (swapchain + views) on resize or out-of-date results.

use super::device::{Surface, VulkanDevice, VulkanInstance};
use super::selection;
use crate::error::{BackendError, BackendResult};
use ash::vk;
use std::sync::Arc;

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub loader: ash::khr::swapchain::Device,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    device: Arc<VulkanDevice>,
}

impl Swapchain {
    /// Create the swapchain. Image views are created separately with
    /// [`Swapchain::create_image_views`] so each step reports its own error.
    pub fn new(
        vulkan: &VulkanInstance,
        device: Arc<VulkanDevice>,
        surface: &Surface,
        width: u32,
        height: u32,
        vsync: bool,
    ) -> BackendResult<Self> {
        let caps = surface
            .capabilities(device.physical_device)
            .map_err(|e| BackendError::Swapchain(format!("surface capabilities: {e}")))?;
        let formats = surface
            .formats(device.physical_device)
            .map_err(|e| BackendError::Swapchain(format!("surface formats: {e}")))?;
        let present_modes = surface
            .present_modes(device.physical_device)
            .map_err(|e| BackendError::Swapchain(format!("present modes: {e}")))?;

        let surface_format = selection::choose_surface_format(&formats)
            .ok_or_else(|| BackendError::Swapchain("no surface formats".into()))?;
        let present_mode = selection::choose_present_mode(&present_modes, vsync);
        let extent = selection::choose_extent(&caps, width, height);
        let image_count = selection::choose_image_count(&caps);

        let family_indices = [device.graphics_family, device.present_family];
        let (sharing_mode, shared_families): (_, &[u32]) = if device.graphics_family != device.present_family {
            (vk::SharingMode::CONCURRENT, &family_indices)
        } else {
            (vk::SharingMode::EXCLUSIVE, &[])
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(shared_families)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let loader = ash::khr::swapchain::Device::new(&vulkan.instance, &device.device);
        let swapchain = unsafe { loader.create_swapchain(&create_info, None) }
            .map_err(|e| BackendError::Swapchain(e.to_string()))?;

        // From here on Drop owns the handle
        let mut chain = Self {
            swapchain,
            loader,
            images: Vec::new(),
            image_views: Vec::new(),
            format: surface_format.format,
            extent,
            present_mode,
            device,
        };

        chain.images = unsafe { chain.loader.get_swapchain_images(swapchain) }
            .map_err(|e| BackendError::Swapchain(format!("swapchain images: {e}")))?;

        log::info!(
            "Swapchain: {}x{}, {} images, {:?} / {:?}, {:?}",
            extent.width,
            extent.height,
            chain.images.len(),
            surface_format.format,
            surface_format.color_space,
            present_mode
        );

        Ok(chain)
    }

    pub fn create_image_views(&mut self) -> BackendResult<()> {
        for &image in &self.images {
            let create_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            let view = unsafe { self.device.device.create_image_view(&create_info, None) }
                .map_err(|e| BackendError::ImageViews(e.to_string()))?;
            self.image_views.push(view);
        }
        Ok(())
    }

    /// Acquire next image for rendering.
    ///
    /// `Ok(None)` means the swapchain is out of date and must be recreated.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<Option<(u32, bool)>, vk::Result> {
        let result = unsafe {
            self.loader
                .acquire_next_image(self.swapchain, u64::MAX, semaphore, vk::Fence::null())
        };

        match result {
            Ok((index, suboptimal)) => Ok(Some((index, suboptimal))),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Present rendered image to screen. Returns `true` when the swapchain
    /// should be recreated.
    pub fn present(&self, queue: vk::Queue, image_index: u32, wait_semaphore: vk::Semaphore) -> Result<bool, vk::Result> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.loader.queue_present(queue, &present_info) } {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(e) => Err(e),
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        log::debug!("Destroying swapchain ({} views)", self.image_views.len());
        unsafe {
            for &view in &self.image_views {
                self.device.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}
