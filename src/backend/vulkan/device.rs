// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation with validation layers and portability extensions
// - Window surface creation
// - Physical device selection (scored, see selection.rs)
// - Logical device + queue creation
// - Memory allocator setup
//
// Each wrapper destroys its own handle on drop. The backend declares them in
// reverse creation order so a failed init unwinds correctly.

use super::selection::{self, DeviceCandidate, QueueFamilyIndices};
use crate::error::{BackendError, BackendResult};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc};
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use std::ffi::{c_char, CStr, CString};
use std::mem::ManuallyDrop;
use winit::window::Window;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Device extensions every candidate must offer
const REQUIRED_DEVICE_EXTENSIONS: [&CStr; 1] = [ash::khr::swapchain::NAME];

/// Must be enabled whenever a (MoltenVK-style) device advertises it
const PORTABILITY_SUBSET: &CStr = c"VK_KHR_portability_subset";

// =============================================================================
// INSTANCE
// =============================================================================

pub struct VulkanInstance {
    pub entry: ash::Entry,
    pub instance: ash::Instance,
    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    pub fn new(app_name: &str, display: RawDisplayHandle, enable_validation: bool) -> BackendResult<Self> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| BackendError::Instance(format!("failed to load the Vulkan library: {e}")))?;

        if enable_validation && !validation_layer_available(&entry)? {
            return Err(BackendError::Instance(
                "validation layers requested but VK_LAYER_KHRONOS_validation is not available".into(),
            ));
        }

        let app_name_cstr = CString::new(app_name).unwrap_or_else(|_| c"duo-renderer".to_owned());
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"duo-renderer")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_1);

        // Platform surface extensions
        let mut extensions: Vec<*const c_char> = ash_window::enumerate_required_extensions(display)
            .map_err(|e| BackendError::Instance(format!("no surface extensions for this display: {e}")))?
            .to_vec();

        if enable_validation {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        // Portability drivers (MoltenVK) are only enumerated when asked for
        let available = unsafe { entry.enumerate_instance_extension_properties(None) }
            .map_err(|e| BackendError::Instance(format!("failed to enumerate extensions: {e}")))?;
        let mut flags = vk::InstanceCreateFlags::empty();
        if selection::extensions_supported(&available, &[ash::khr::portability_enumeration::NAME]) {
            log::debug!("Enabling portability enumeration");
            extensions.push(ash::khr::portability_enumeration::NAME.as_ptr());
            extensions.push(ash::khr::get_physical_device_properties2::NAME.as_ptr());
            flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
        }

        let layer_names = if enable_validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::default()
            .flags(flags)
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .map_err(|e| BackendError::Instance(e.to_string()))?;

        let mut vulkan = Self {
            entry,
            instance,
            debug_utils: None,
        };

        if enable_validation {
            vulkan.debug_utils = Some(vulkan.setup_debug_messenger()?);
        }

        Ok(vulkan)
    }

    fn setup_debug_messenger(
        &self,
    ) -> BackendResult<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = ash::ext::debug_utils::Instance::new(&self.entry, &self.instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .map_err(|e| BackendError::Instance(format!("failed to create debug messenger: {e}")))?;

        Ok((debug_utils, messenger))
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        log::debug!("Destroying Vulkan instance");
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

fn validation_layer_available(entry: &ash::Entry) -> BackendResult<bool> {
    let layers = unsafe { entry.enumerate_instance_layer_properties() }
        .map_err(|e| BackendError::Instance(format!("failed to enumerate layers: {e}")))?;

    Ok(layers
        .iter()
        .any(|layer| layer.layer_name_as_c_str().is_ok_and(|name| name == VALIDATION_LAYER)))
}

// Validation messages are routed into the `log` facade by severity
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message).to_string_lossy();

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::error!("[Vulkan] {}", message),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!("[Vulkan] {}", message),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::debug!("[Vulkan] {}", message),
        _ => log::trace!("[Vulkan] {}", message),
    }

    vk::FALSE
}

// =============================================================================
// SURFACE
// =============================================================================

pub struct Surface {
    pub loader: ash::khr::surface::Instance,
    pub surface: vk::SurfaceKHR,
}

impl Surface {
    pub fn new(vulkan: &VulkanInstance, window: &Window) -> BackendResult<Self> {
        let display = window
            .display_handle()
            .map_err(|e| BackendError::Surface(format!("no display handle: {e}")))?;
        let handle = window
            .window_handle()
            .map_err(|e| BackendError::Surface(format!("no window handle: {e}")))?;

        let surface = unsafe {
            ash_window::create_surface(
                &vulkan.entry,
                &vulkan.instance,
                display.as_raw(),
                handle.as_raw(),
                None,
            )
        }
        .map_err(|e| BackendError::Surface(e.to_string()))?;

        Ok(Self {
            loader: ash::khr::surface::Instance::new(&vulkan.entry, &vulkan.instance),
            surface,
        })
    }

    pub fn capabilities(&self, physical_device: vk::PhysicalDevice) -> ash::prelude::VkResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)
        }
    }

    pub fn formats(&self, physical_device: vk::PhysicalDevice) -> ash::prelude::VkResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.loader
                .get_physical_device_surface_formats(physical_device, self.surface)
        }
    }

    pub fn present_modes(&self, physical_device: vk::PhysicalDevice) -> ash::prelude::VkResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.loader
                .get_physical_device_surface_present_modes(physical_device, self.surface)
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        log::debug!("Destroying window surface");
        unsafe { self.loader.destroy_surface(self.surface, None) };
    }
}

// =============================================================================
// PHYSICAL DEVICE
// =============================================================================

/// Chosen GPU plus what was learned while scoring it
pub struct PhysicalDeviceChoice {
    pub physical_device: vk::PhysicalDevice,
    pub queue_families: QueueFamilyIndices,
    pub name: String,
}

/// Score every enumerated GPU and keep the best one.
pub fn pick_physical_device(vulkan: &VulkanInstance, surface: &Surface) -> BackendResult<PhysicalDeviceChoice> {
    let instance = &vulkan.instance;
    let devices = unsafe { instance.enumerate_physical_devices() }
        .map_err(|e| BackendError::Instance(format!("failed to enumerate GPUs: {e}")))?;

    if devices.is_empty() {
        return Err(BackendError::NoSuitableGpu);
    }

    let scored = devices.into_iter().map(|device| {
        let candidate = describe_device(instance, surface, device);
        let score = selection::score_device(&candidate);
        log::info!("GPU candidate '{}' ({:?}): score {}", candidate.name, candidate.device_type, score);
        (
            PhysicalDeviceChoice {
                physical_device: device,
                queue_families: candidate.queue_families,
                name: candidate.name,
            },
            score,
        )
    });

    selection::pick_best(scored).ok_or(BackendError::NoSuitableGpu)
}

fn describe_device(instance: &ash::Instance, surface: &Surface, device: vk::PhysicalDevice) -> DeviceCandidate {
    let props = unsafe { instance.get_physical_device_properties(device) };
    let name = props
        .device_name_as_c_str()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".into());

    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let queue_families = QueueFamilyIndices::find(&families, |index| unsafe {
        surface
            .loader
            .get_physical_device_surface_support(device, index, surface.surface)
            .unwrap_or(false)
    });

    let extensions_supported = unsafe { instance.enumerate_device_extension_properties(device) }
        .map(|available| selection::extensions_supported(&available, &REQUIRED_DEVICE_EXTENSIONS))
        .unwrap_or(false);

    // Swapchain support is only queried when the extension exists
    let (format_count, present_mode_count) = if extensions_supported {
        (
            surface.formats(device).map(|f| f.len()).unwrap_or(0),
            surface.present_modes(device).map(|m| m.len()).unwrap_or(0),
        )
    } else {
        (0, 0)
    };

    DeviceCandidate {
        name,
        device_type: props.device_type,
        max_image_dimension_2d: props.limits.max_image_dimension2_d,
        queue_families,
        extensions_supported,
        format_count,
        present_mode_count,
    }
}

// =============================================================================
// LOGICAL DEVICE
// =============================================================================

/// Logical device, its queues and the memory allocator
pub struct VulkanDevice {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub graphics_queue: vk::Queue,
    pub graphics_family: u32,
    pub present_queue: vk::Queue,
    pub present_family: u32,
    pub properties: vk::PhysicalDeviceProperties,
    /// MSAA sample count used by every render target and pipeline
    pub samples: vk::SampleCountFlags,
    pub sampler_anisotropy: bool,
    allocator: ManuallyDrop<Mutex<Allocator>>,
}

impl VulkanDevice {
    pub fn new(vulkan: &VulkanInstance, choice: &PhysicalDeviceChoice, requested_samples: u32) -> BackendResult<Self> {
        let instance = &vulkan.instance;
        let physical_device = choice.physical_device;

        let (Some(graphics_family), Some(present_family)) =
            (choice.queue_families.graphics, choice.queue_families.present)
        else {
            return Err(BackendError::NoSuitableGpu);
        };

        // One create info per distinct family
        let queue_priorities = [1.0];
        let queue_create_infos: Vec<_> = choice
            .queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        let mut extensions: Vec<*const c_char> = REQUIRED_DEVICE_EXTENSIONS.iter().map(|e| e.as_ptr()).collect();
        let available = unsafe { instance.enumerate_device_extension_properties(physical_device) }
            .map_err(|e| BackendError::Device(format!("failed to enumerate device extensions: {e}")))?;
        if selection::extensions_supported(&available, &[PORTABILITY_SUBSET]) {
            extensions.push(PORTABILITY_SUBSET.as_ptr());
        }

        let features = unsafe { instance.get_physical_device_features(physical_device) };
        let sampler_anisotropy = features.sampler_anisotropy == vk::TRUE;
        let enabled_features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(sampler_anisotropy);

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&enabled_features);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .map_err(|e| BackendError::Device(e.to_string()))?;

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let supported_samples = properties.limits.framebuffer_color_sample_counts
            & properties.limits.framebuffer_depth_sample_counts;
        let samples = selection::choose_sample_count(supported_samples, requested_samples);

        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );
        log::info!("MSAA: {:?} (requested {})", samples, requested_samples);

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        });
        let allocator = match allocator {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(BackendError::Device(format!("failed to create allocator: {e}")));
            }
        };

        Ok(Self {
            device,
            physical_device,
            graphics_queue,
            graphics_family,
            present_queue,
            present_family,
            properties,
            samples,
            sampler_anisotropy,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
        })
    }

    pub fn allocate(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> gpu_allocator::Result<Allocation> {
        self.allocator.lock().allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })
    }

    pub fn free(&self, allocation: Allocation) {
        if let Err(e) = self.allocator.lock().free(allocation) {
            log::warn!("Failed to free GPU allocation: {}", e);
        }
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) {
        if let Err(e) = unsafe { self.device.device_wait_idle() } {
            log::warn!("device_wait_idle failed: {}", e);
        }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::debug!("Destroying logical device");
        self.wait_idle();

        unsafe {
            // Allocator must go before the device it allocates from
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
        }
    }
}
