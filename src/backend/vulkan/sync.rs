// Synchronization primitives
//
// Fences and semaphores for GPU-CPU and GPU-GPU sync, one set per frame in
// flight, plus the command buffer and uniform buffer that frame slot owns.

use super::buffer::GpuBuffer;
use super::device::VulkanDevice;
use anyhow::Result;
use ash::vk;

/// Everything one frame in flight needs
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
    pub command_buffer: vk::CommandBuffer,
    /// Per-frame camera and ambience block
    pub uniforms: GpuBuffer,
    pub descriptor_set: vk::DescriptorSet,
}

impl FrameSync {
    pub fn new(
        device: &VulkanDevice,
        command_buffer: vk::CommandBuffer,
        uniforms: GpuBuffer,
        descriptor_set: vk::DescriptorSet,
    ) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED); // Start signaled

        unsafe {
            let image_available = device.device.create_semaphore(&semaphore_info, None)?;
            let render_finished = match device.device.create_semaphore(&semaphore_info, None) {
                Ok(s) => s,
                Err(e) => {
                    device.device.destroy_semaphore(image_available, None);
                    return Err(e.into());
                }
            };
            let in_flight_fence = match device.device.create_fence(&fence_info, None) {
                Ok(f) => f,
                Err(e) => {
                    device.device.destroy_semaphore(image_available, None);
                    device.device.destroy_semaphore(render_finished, None);
                    return Err(e.into());
                }
            };

            Ok(Self {
                image_available,
                render_finished,
                in_flight_fence,
                command_buffer,
                uniforms,
                descriptor_set,
            })
        }
    }

    /// Destroy the sync objects. The command buffer and descriptor set go
    /// with their pools; the uniform buffer frees itself on drop.
    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_fence(self.in_flight_fence, None);
        }
    }
}
