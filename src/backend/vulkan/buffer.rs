// Buffer utilities for vertex, index, uniform and staging buffers
//
// Memory comes from the shared gpu-allocator instance. Geometry is uploaded
// once through a host-visible staging buffer into device-local memory.

use super::device::VulkanDevice;
use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::Allocation;
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

/// A `vk::Buffer` and the memory behind it
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub size: vk::DeviceSize,
    allocation: Option<Allocation>,
    device: Arc<VulkanDevice>,
}

impl GpuBuffer {
    pub fn new(
        device: Arc<VulkanDevice>,
        name: &str,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Result<Self> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.device.create_buffer(&buffer_info, None) }
            .with_context(|| format!("Failed to create buffer '{name}'"))?;

        let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };
        let allocation = match device.allocate(name, requirements, location, true) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.device.destroy_buffer(buffer, None) };
                return Err(e).with_context(|| format!("Failed to allocate {size} bytes for '{name}'"));
            }
        };

        let gpu_buffer = Self {
            buffer,
            size,
            allocation: Some(allocation),
            device,
        };

        if let Some(allocation) = &gpu_buffer.allocation {
            unsafe {
                gpu_buffer
                    .device
                    .device
                    .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
            }
            .with_context(|| format!("Failed to bind memory for '{name}'"))?;
        }

        Ok(gpu_buffer)
    }

    /// Copy `data` to the start of a host-visible buffer.
    pub fn write(&self, data: &[u8]) -> Result<()> {
        anyhow::ensure!(
            data.len() as vk::DeviceSize <= self.size,
            "write of {} bytes into a {} byte buffer",
            data.len(),
            self.size
        );

        let ptr = self
            .allocation
            .as_ref()
            .and_then(|a| a.mapped_ptr())
            .context("Buffer is not CPU-accessible")?;

        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.as_ptr().cast::<u8>(), data.len());
        }
        Ok(())
    }

    /// Host-visible buffer pre-filled with `data`, used as a copy source.
    pub fn staging(device: Arc<VulkanDevice>, data: &[u8]) -> Result<Self> {
        let staging = Self::new(
            device,
            "staging",
            data.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
        )?;
        staging.write(data)?;
        Ok(staging)
    }

    /// Device-local buffer filled with `data` through a staging copy.
    pub fn device_local(
        device: Arc<VulkanDevice>,
        command_pool: vk::CommandPool,
        name: &str,
        usage: vk::BufferUsageFlags,
        data: &[u8],
    ) -> Result<Self> {
        let size = data.len() as vk::DeviceSize;
        let staging = Self::staging(device.clone(), data)?;
        let target = Self::new(
            device.clone(),
            name,
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuOnly,
        )?;

        immediate_submit(&device, command_pool, |cmd| unsafe {
            let region = vk::BufferCopy::default().size(size);
            device.device.cmd_copy_buffer(cmd, staging.buffer, target.buffer, &[region]);
        })?;

        Ok(target)
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        unsafe { self.device.device.destroy_buffer(self.buffer, None) };
        if let Some(allocation) = self.allocation.take() {
            self.device.free(allocation);
        }
    }
}

/// Record commands into a throwaway command buffer, submit them and wait.
///
/// Used for uploads only; the render loop never blocks on the queue.
pub fn immediate_submit(
    device: &VulkanDevice,
    command_pool: vk::CommandPool,
    record: impl FnOnce(vk::CommandBuffer),
) -> Result<()> {
    let alloc_info = vk::CommandBufferAllocateInfo::default()
        .command_pool(command_pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);

    let cmd = unsafe { device.device.allocate_command_buffers(&alloc_info) }
        .context("Failed to allocate upload command buffer")?[0];

    let result = (|| -> Result<()> {
        let begin_info =
            vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { device.device.begin_command_buffer(cmd, &begin_info) }?;

        record(cmd);

        unsafe { device.device.end_command_buffer(cmd) }?;

        let command_buffers = [cmd];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        unsafe {
            device
                .device
                .queue_submit(device.graphics_queue, &[submit_info], vk::Fence::null())?;
            device.device.queue_wait_idle(device.graphics_queue)?;
        }
        Ok(())
    })();

    unsafe { device.device.free_command_buffers(command_pool, &[cmd]) };
    result.context("Upload submission failed")
}
