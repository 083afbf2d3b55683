// Images: render targets and sampled textures
//
// `GpuImage` owns an image, its view and its memory. Sampled textures are
// uploaded from decoded RGBA8 pixels; cubemaps are six array layers of a
// cube-compatible image.

use super::buffer::{immediate_submit, GpuBuffer};
use super::device::VulkanDevice;
use crate::texture_data::{self, Pixels};
use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::Allocation;
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

/// Format of every sampled texture
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Depth attachment format
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

#[derive(Debug, Clone, Copy)]
pub struct ImageDesc {
    pub width: u32,
    pub height: u32,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub samples: vk::SampleCountFlags,
    pub aspect: vk::ImageAspectFlags,
    /// Six layers viewed as a cube
    pub cube: bool,
}

impl ImageDesc {
    fn layers(&self) -> u32 {
        if self.cube {
            6
        } else {
            1
        }
    }
}

pub struct GpuImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub desc: ImageDesc,
    allocation: Option<Allocation>,
    device: Arc<VulkanDevice>,
}

impl GpuImage {
    pub fn new(device: Arc<VulkanDevice>, name: &str, desc: ImageDesc) -> Result<Self> {
        let flags = if desc.cube {
            vk::ImageCreateFlags::CUBE_COMPATIBLE
        } else {
            vk::ImageCreateFlags::empty()
        };

        let image_info = vk::ImageCreateInfo::default()
            .flags(flags)
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(desc.layers())
            .format(desc.format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(desc.usage)
            .samples(desc.samples)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe { device.device.create_image(&image_info, None) }
            .with_context(|| format!("Failed to create image '{name}'"))?;

        let requirements = unsafe { device.device.get_image_memory_requirements(image) };
        let allocation = match device.allocate(name, requirements, MemoryLocation::GpuOnly, false) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.device.destroy_image(image, None) };
                return Err(e).with_context(|| format!("Failed to allocate memory for '{name}'"));
            }
        };

        // From here on Drop owns the image and its memory
        let mut gpu_image = Self {
            image,
            view: vk::ImageView::null(),
            desc,
            allocation: Some(allocation),
            device,
        };

        if let Some(allocation) = &gpu_image.allocation {
            unsafe {
                gpu_image
                    .device
                    .device
                    .bind_image_memory(image, allocation.memory(), allocation.offset())
            }
            .with_context(|| format!("Failed to bind memory for '{name}'"))?;
        }

        let view_type = if desc.cube {
            vk::ImageViewType::CUBE
        } else {
            vk::ImageViewType::TYPE_2D
        };
        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(view_type)
            .format(desc.format)
            .subresource_range(subresource_range(desc.aspect, desc.layers()));

        gpu_image.view = unsafe { gpu_image.device.device.create_image_view(&view_info, None) }
            .with_context(|| format!("Failed to create view for '{name}'"))?;

        Ok(gpu_image)
    }

    /// Upload one 2D texture (one face) or a cubemap (six faces).
    pub fn upload_rgba8(
        device: Arc<VulkanDevice>,
        command_pool: vk::CommandPool,
        name: &str,
        faces: &[Pixels],
    ) -> Result<Self> {
        let first = faces.first().context("No pixel data to upload")?;
        anyhow::ensure!(
            faces.len() == 1 || faces.len() == 6,
            "expected 1 or 6 faces, got {}",
            faces.len()
        );
        texture_data::check_same_size(faces)?;

        let bytes: Vec<u8> = faces.iter().flat_map(|f| f.rgba.iter().copied()).collect();
        let staging = GpuBuffer::staging(device.clone(), &bytes)?;

        let image = Self::new(
            device.clone(),
            name,
            ImageDesc {
                width: first.width,
                height: first.height,
                format: TEXTURE_FORMAT,
                usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
                samples: vk::SampleCountFlags::TYPE_1,
                aspect: vk::ImageAspectFlags::COLOR,
                cube: faces.len() == 6,
            },
        )?;

        let layers = faces.len() as u32;
        let range = subresource_range(vk::ImageAspectFlags::COLOR, layers);
        let regions: Vec<vk::BufferImageCopy> = faces
            .iter()
            .enumerate()
            .map(|(layer, face)| {
                vk::BufferImageCopy::default()
                    .buffer_offset((layer * face.byte_len()) as vk::DeviceSize)
                    .image_subresource(vk::ImageSubresourceLayers {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        mip_level: 0,
                        base_array_layer: layer as u32,
                        layer_count: 1,
                    })
                    .image_extent(vk::Extent3D {
                        width: face.width,
                        height: face.height,
                        depth: 1,
                    })
            })
            .collect();

        immediate_submit(&device, command_pool, |cmd| unsafe {
            let to_transfer = vk::ImageMemoryBarrier::default()
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image.image)
                .subresource_range(range)
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE);
            device.device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_transfer],
            );

            device.device.cmd_copy_buffer_to_image(
                cmd,
                staging.buffer,
                image.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &regions,
            );

            let to_shader = vk::ImageMemoryBarrier::default()
                .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image.image)
                .subresource_range(range)
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::SHADER_READ);
            device.device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_shader],
            );
        })?;

        Ok(image)
    }
}

impl Drop for GpuImage {
    fn drop(&mut self) {
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device.device.destroy_image_view(self.view, None);
            }
            self.device.device.destroy_image(self.image, None);
        }
        if let Some(allocation) = self.allocation.take() {
            self.device.free(allocation);
        }
    }
}

fn subresource_range(aspect: vk::ImageAspectFlags, layers: u32) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: layers,
    }
}

/// Linear, repeating sampler shared by every texture
pub fn create_sampler(device: &VulkanDevice) -> Result<vk::Sampler> {
    let anisotropy = if device.sampler_anisotropy {
        device.properties.limits.max_sampler_anisotropy.min(16.0)
    } else {
        1.0
    };
    let sampler_info = vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(anisotropy > 1.0)
        .max_anisotropy(anisotropy.max(1.0))
        .max_lod(0.0);

    unsafe { device.device.create_sampler(&sampler_info, None) }.context("Failed to create sampler")
}
