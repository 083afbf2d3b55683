// Render pass, render targets and graphics pipelines
//
// The render pass has one subpass: a (possibly multisampled) color attachment
// and a depth attachment, resolved into the swapchain image when MSAA is on.
// Every program is built twice, once with depth testing and once without, so
// the frame plan's depth toggles become pipeline switches.

use super::device::VulkanDevice;
use super::texture::{GpuImage, ImageDesc, DEPTH_FORMAT};
use anyhow::{Context, Result};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};
use std::sync::Arc;

// =============================================================================
// SHADER INTERFACE
// =============================================================================

/// Pushed once per draw, read by the vertex stage
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct PushConstants {
    pub mvp: Mat4,
    pub model: Mat4,
}

/// Set 0, binding 0: per-frame uniform block. `w` components are padding.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct FrameUniforms {
    pub camera_position: Vec4,
    pub camera_direction: Vec4,
    pub ambience: Vec4,
}

pub const FRAME_SET: u32 = 0;
pub const TEXTURE_SET: u32 = 1;

/// Per-attribute strides: position, color, uv, normal
const ATTRIBUTES: [(vk::Format, u32); 4] = [
    (vk::Format::R32G32B32_SFLOAT, 12),
    (vk::Format::R32G32B32_SFLOAT, 12),
    (vk::Format::R32G32_SFLOAT, 8),
    (vk::Format::R32G32B32_SFLOAT, 12),
];

// =============================================================================
// RENDER PASS
// =============================================================================

pub struct RenderPass {
    pub render_pass: vk::RenderPass,
    pub samples: vk::SampleCountFlags,
    device: Arc<VulkanDevice>,
}

impl RenderPass {
    pub fn new(device: Arc<VulkanDevice>, color_format: vk::Format) -> Result<Self> {
        let samples = device.samples;
        let multisampled = samples != vk::SampleCountFlags::TYPE_1;

        // Color attachment: the swapchain image itself, or the MSAA image
        let color_attachment = vk::AttachmentDescription::default()
            .format(color_format)
            .samples(samples)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(if multisampled {
                vk::AttachmentStoreOp::DONT_CARE
            } else {
                vk::AttachmentStoreOp::STORE
            })
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(if multisampled {
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
            } else {
                vk::ImageLayout::PRESENT_SRC_KHR
            });

        let depth_attachment = vk::AttachmentDescription::default()
            .format(DEPTH_FORMAT)
            .samples(samples)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

        let resolve_attachment = vk::AttachmentDescription::default()
            .format(color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::DONT_CARE)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);

        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };
        let resolve_refs = [vk::AttachmentReference {
            attachment: 2,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .depth_stencil_attachment(&depth_ref);
        if multisampled {
            subpass = subpass.resolve_attachments(&resolve_refs);
        }

        let dependency = vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                    | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            )
            .src_access_mask(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
            .dst_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                    | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            )
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            );

        let all_attachments = [color_attachment, depth_attachment, resolve_attachment];
        let attachments = if multisampled {
            &all_attachments[..]
        } else {
            &all_attachments[..2]
        };
        let subpasses = [subpass];
        let dependencies = [dependency];

        let render_pass_info = vk::RenderPassCreateInfo::default()
            .attachments(attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { device.device.create_render_pass(&render_pass_info, None) }
            .context("Failed to create render pass")?;

        Ok(Self {
            render_pass,
            samples,
            device,
        })
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        log::debug!("Destroying render pass");
        unsafe { self.device.device.destroy_render_pass(self.render_pass, None) };
    }
}

// =============================================================================
// RENDER TARGETS
// =============================================================================

/// Depth buffer, optional MSAA color buffer and one framebuffer per
/// swapchain image. Rebuilt together with the swapchain.
pub struct RenderTargets {
    pub framebuffers: Vec<vk::Framebuffer>,
    pub depth: GpuImage,
    pub color: Option<GpuImage>,
    device: Arc<VulkanDevice>,
}

impl RenderTargets {
    pub fn new(
        device: Arc<VulkanDevice>,
        render_pass: &RenderPass,
        color_format: vk::Format,
        swapchain_views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let samples = render_pass.samples;

        let depth = GpuImage::new(
            device.clone(),
            "depth",
            ImageDesc {
                width: extent.width,
                height: extent.height,
                format: DEPTH_FORMAT,
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                samples,
                aspect: vk::ImageAspectFlags::DEPTH,
                cube: false,
            },
        )?;

        let color = if samples != vk::SampleCountFlags::TYPE_1 {
            Some(GpuImage::new(
                device.clone(),
                "msaa_color",
                ImageDesc {
                    width: extent.width,
                    height: extent.height,
                    format: color_format,
                    usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
                    samples,
                    aspect: vk::ImageAspectFlags::COLOR,
                    cube: false,
                },
            )?)
        } else {
            None
        };

        let mut targets = Self {
            framebuffers: Vec::with_capacity(swapchain_views.len()),
            depth,
            color,
            device,
        };

        for &swapchain_view in swapchain_views {
            let attachments: Vec<vk::ImageView> = match &targets.color {
                Some(color) => vec![color.view, targets.depth.view, swapchain_view],
                None => vec![swapchain_view, targets.depth.view],
            };

            let framebuffer_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass.render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            let framebuffer = unsafe { targets.device.device.create_framebuffer(&framebuffer_info, None) }
                .context("Failed to create framebuffer")?;
            targets.framebuffers.push(framebuffer);
        }

        Ok(targets)
    }
}

impl Drop for RenderTargets {
    fn drop(&mut self) {
        unsafe {
            for &framebuffer in &self.framebuffers {
                self.device.device.destroy_framebuffer(framebuffer, None);
            }
        }
    }
}

// =============================================================================
// DESCRIPTOR SET LAYOUTS
// =============================================================================

/// Set 0 holds the frame uniforms, set 1 the texture sampler.
pub fn create_set_layouts(device: &VulkanDevice) -> Result<[vk::DescriptorSetLayout; 2]> {
    let frame_bindings = [vk::DescriptorSetLayoutBinding::default()
        .binding(0)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .descriptor_count(1)
        .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)];
    let texture_bindings = [vk::DescriptorSetLayoutBinding::default()
        .binding(0)
        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .descriptor_count(1)
        .stage_flags(vk::ShaderStageFlags::FRAGMENT)];

    let frame_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&frame_bindings);
    let texture_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&texture_bindings);

    unsafe {
        let frame = device
            .device
            .create_descriptor_set_layout(&frame_info, None)
            .context("Failed to create frame set layout")?;
        let texture = match device.device.create_descriptor_set_layout(&texture_info, None) {
            Ok(layout) => layout,
            Err(e) => {
                device.device.destroy_descriptor_set_layout(frame, None);
                return Err(e).context("Failed to create texture set layout");
            }
        };
        Ok([frame, texture])
    }
}

// =============================================================================
// PROGRAMS
// =============================================================================

/// A linked shader pair: its layout and the depth-on / depth-off pipelines
pub struct Program {
    pub layout: vk::PipelineLayout,
    pub with_depth: vk::Pipeline,
    pub without_depth: vk::Pipeline,
}

impl Program {
    pub fn pipeline(&self, depth_test: bool) -> vk::Pipeline {
        if depth_test {
            self.with_depth
        } else {
            self.without_depth
        }
    }
}

fn vertex_input() -> (Vec<vk::VertexInputBindingDescription>, Vec<vk::VertexInputAttributeDescription>) {
    // One binding per attribute buffer
    ATTRIBUTES
        .iter()
        .enumerate()
        .map(|(i, &(format, stride))| {
            let binding = vk::VertexInputBindingDescription::default()
                .binding(i as u32)
                .stride(stride)
                .input_rate(vk::VertexInputRate::VERTEX);
            let attribute = vk::VertexInputAttributeDescription::default()
                .binding(i as u32)
                .location(i as u32)
                .format(format)
                .offset(0);
            (binding, attribute)
        })
        .unzip()
}

pub fn create_program(
    device: &VulkanDevice,
    render_pass: &RenderPass,
    set_layouts: &[vk::DescriptorSetLayout],
    vertex: vk::ShaderModule,
    fragment: vk::ShaderModule,
) -> Result<Program> {
    let push_constant_ranges = [vk::PushConstantRange::default()
        .stage_flags(vk::ShaderStageFlags::VERTEX)
        .offset(0)
        .size(std::mem::size_of::<PushConstants>() as u32)];

    let layout_info = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(set_layouts)
        .push_constant_ranges(&push_constant_ranges);

    let layout = unsafe { device.device.create_pipeline_layout(&layout_info, None) }
        .context("Failed to create pipeline layout")?;

    let shader_stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex)
            .name(c"main"),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(fragment)
            .name(c"main"),
    ];

    let (bindings, attributes) = vertex_input();
    let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&bindings)
        .vertex_attribute_descriptions(&attributes);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    // Viewport and scissor are set per frame
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);
    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    // The Y-flipped projection keeps counter-clockwise front faces
    let rasterizer = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::BACK)
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .depth_bias_enable(false);

    let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
        .sample_shading_enable(false)
        .rasterization_samples(render_pass.samples);

    let depth_on = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(true)
        .depth_write_enable(true)
        .depth_compare_op(vk::CompareOp::LESS)
        .depth_bounds_test_enable(false)
        .stencil_test_enable(false);
    let depth_off = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(false)
        .depth_write_enable(false)
        .depth_compare_op(vk::CompareOp::ALWAYS)
        .depth_bounds_test_enable(false)
        .stencil_test_enable(false);

    let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(false)];
    let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .attachments(&color_blend_attachments);

    let base = vk::GraphicsPipelineCreateInfo::default()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input_info)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterizer)
        .multisample_state(&multisampling)
        .color_blend_state(&color_blending)
        .dynamic_state(&dynamic_state)
        .layout(layout)
        .render_pass(render_pass.render_pass)
        .subpass(0);
    let infos = [base.depth_stencil_state(&depth_on), base.depth_stencil_state(&depth_off)];

    let result = unsafe {
        device
            .device
            .create_graphics_pipelines(vk::PipelineCache::null(), &infos, None)
    };

    match result {
        Ok(pipelines) => Ok(Program {
            layout,
            with_depth: pipelines[0],
            without_depth: pipelines[1],
        }),
        Err((partial, e)) => {
            unsafe {
                for pipeline in partial.into_iter().filter(|p| *p != vk::Pipeline::null()) {
                    device.device.destroy_pipeline(pipeline, None);
                }
                device.device.destroy_pipeline_layout(layout, None);
            }
            Err(e).context("Failed to create graphics pipelines")
        }
    }
}
