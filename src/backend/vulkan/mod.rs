// Vulkan backend - explicit API, manual synchronization
//
// INIT STAGES (each one logged, each failure a typed fatal error):
//   Uninitialized -> InstanceCreated -> SurfaceCreated -> PhysicalDeviceChosen
//   -> DeviceCreated -> SwapchainCreated -> ImageViewsCreated
//   -> RenderPassCreated -> FrameResourcesCreated
//
// Resources acquired before a failure are released by their RAII wrappers in
// reverse order. Shutdown tears down in strict reverse creation order:
//   sync -> command pool -> textures -> buffers -> descriptor pool
//   -> pipelines -> pipeline layouts -> set layouts -> shader modules
//   -> render targets -> render pass -> image views -> swapchain
//   -> logical device -> surface -> instance
//
// FRAME FLOW:
// 1. Run overlay callbacks
// 2. Recreate the swapchain if a resize is pending
// 3. Wait for the frame slot's fence, acquire a swapchain image
// 4. Record the frame plan into the slot's command buffer
// 5. Submit, present, advance the slot

pub mod buffer;
pub mod device;
pub mod pipeline;
pub mod selection;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;

use self::buffer::GpuBuffer;
use self::device::{Surface, VulkanDevice, VulkanInstance};
use self::pipeline::{FrameUniforms, Program, PushConstants, RenderPass, RenderTargets, FRAME_SET, TEXTURE_SET};
use self::swapchain::Swapchain;
use self::sync::FrameSync;
use self::texture::GpuImage;
use super::{window_attributes, BufferKind, GraphicsBackend};
use crate::config::{BackendKind, Config};
use crate::error::{BackendError, BackendResult};
use crate::frame::{plan_frame, ClipSpace, DrawCall, DrawCommand, PlanOptions};
use crate::handle::{Handle, HandleTable};
use crate::renderable::{FrameState, OverlayCallback, Renderable};
use crate::shader::ShaderStage;
use crate::texture_data::{self, Pixels, TextureKind};
use anyhow::Context;
use ash::vk;
use glam::Vec4;
use gpu_allocator::MemoryLocation;
use raw_window_handle::HasDisplayHandle;
use std::path::Path;
use std::sync::Arc;
use winit::event_loop::ActiveEventLoop;
use winit::window::Window;

/// Upper bound on textures (and cubemaps) per session
const MAX_TEXTURES: u32 = 1024;

/// Startup progress, in creation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InitStage {
    Uninitialized,
    InstanceCreated,
    SurfaceCreated,
    PhysicalDeviceChosen,
    DeviceCreated,
    SwapchainCreated,
    ImageViewsCreated,
    RenderPassCreated,
    FrameResourcesCreated,
}

fn advance(stage: &mut InitStage, next: InitStage) {
    debug_assert!(next > *stage, "init stages only move forward");
    log::info!("Vulkan init: {:?} -> {:?}", stage, next);
    *stage = next;
}

/// A sampled image and the descriptor set that binds it
struct Texture {
    image: GpuImage,
    kind: TextureKind,
    descriptor_set: vk::DescriptorSet,
}

/// Texture for the `sampler2D` slot of set 1. Cubemaps and unknown handles
/// fall back to `fallback`.
fn flat_texture<'a, T>(
    entry: Option<&'a T>,
    kind: impl Fn(&T) -> TextureKind,
    fallback: Option<&'a T>,
) -> Option<&'a T> {
    match entry {
        Some(texture) if kind(texture) == TextureKind::Flat => Some(texture),
        Some(_) => {
            log::trace!("Cubemap cannot be bound as a 2D texture; using the default");
            fallback
        }
        None => fallback,
    }
}

pub struct VulkanBackend {
    // ─────────────────────────────────────────────────────────────────────────
    // Destroyed explicitly in Drop, after the device is idle
    // ─────────────────────────────────────────────────────────────────────────
    frames: Vec<FrameSync>,
    command_pool: vk::CommandPool,
    textures: HandleTable<Texture>,
    /// Bound when a renderable has no (or an unknown) texture
    default_texture: Option<Texture>,
    buffers: HandleTable<GpuBuffer>,
    descriptor_pool: vk::DescriptorPool,
    sampler: vk::Sampler,
    programs: HandleTable<Program>,
    set_layouts: [vk::DescriptorSetLayout; 2],
    shader_modules: HandleTable<vk::ShaderModule>,
    targets: Option<RenderTargets>,

    // ─────────────────────────────────────────────────────────────────────────
    // RAII, dropped in declaration order
    // ─────────────────────────────────────────────────────────────────────────
    render_pass: RenderPass,
    swapchain: Option<Swapchain>,
    device: Arc<VulkanDevice>,
    surface: Surface,
    vulkan: VulkanInstance,
    window: Window,

    // ─────────────────────────────────────────────────────────────────────────
    // State
    // ─────────────────────────────────────────────────────────────────────────
    stage: InitStage,
    current_frame: usize,
    /// Set on resize or out-of-date/suboptimal results
    needs_resize: bool,
    size: (u32, u32),
    vsync: bool,
    clear_color: [f32; 4],
    camera_affects_2d: bool,
    ambience: Vec4,
}

impl VulkanBackend {
    // =========================================================================
    // INITIALIZATION
    // =========================================================================

    fn create_frame_resources(&mut self, frames_in_flight: usize) -> anyhow::Result<()> {
        let device = self.device.clone();

        self.set_layouts = pipeline::create_set_layouts(&device)?;

        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(device.graphics_family);
        self.command_pool = unsafe { device.device.create_command_pool(&pool_info, None) }
            .context("Failed to create command pool")?;

        let frames_in_flight = frames_in_flight.max(1) as u32;
        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: frames_in_flight,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: MAX_TEXTURES + 1,
            },
        ];
        let descriptor_pool_info = vk::DescriptorPoolCreateInfo::default()
            .pool_sizes(&pool_sizes)
            .max_sets(frames_in_flight + MAX_TEXTURES + 1);
        self.descriptor_pool = unsafe { device.device.create_descriptor_pool(&descriptor_pool_info, None) }
            .context("Failed to create descriptor pool")?;

        self.sampler = texture::create_sampler(&device)?;

        // Per-frame command buffers, uniform buffers and sync objects
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(frames_in_flight);
        let command_buffers = unsafe { device.device.allocate_command_buffers(&alloc_info) }
            .context("Failed to allocate command buffers")?;

        for command_buffer in command_buffers {
            let uniforms = GpuBuffer::new(
                device.clone(),
                "frame_uniforms",
                std::mem::size_of::<FrameUniforms>() as vk::DeviceSize,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                MemoryLocation::CpuToGpu,
            )?;
            let descriptor_set = self.allocate_set(FRAME_SET)?;

            let buffer_info = [vk::DescriptorBufferInfo::default()
                .buffer(uniforms.buffer)
                .offset(0)
                .range(vk::WHOLE_SIZE)];
            let write = vk::WriteDescriptorSet::default()
                .dst_set(descriptor_set)
                .dst_binding(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&buffer_info);
            unsafe { device.device.update_descriptor_sets(&[write], &[]) };

            self.frames
                .push(FrameSync::new(&device, command_buffer, uniforms, descriptor_set)?);
        }

        let white = Pixels {
            width: 1,
            height: 1,
            rgba: vec![255; 4],
        };
        self.default_texture = Some(self.upload_texture("default_white", &[white])?);

        Ok(())
    }

    fn allocate_set(&self, set: u32) -> anyhow::Result<vk::DescriptorSet> {
        let layouts = [self.set_layouts[set as usize]];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.descriptor_pool)
            .set_layouts(&layouts);

        let sets = unsafe { self.device.device.allocate_descriptor_sets(&alloc_info) }
            .context("Failed to allocate descriptor set")?;
        sets.into_iter().next().context("Driver returned no descriptor set")
    }

    fn upload_texture(&self, name: &str, faces: &[Pixels]) -> anyhow::Result<Texture> {
        let image = GpuImage::upload_rgba8(self.device.clone(), self.command_pool, name, faces)?;
        let descriptor_set = self.allocate_set(TEXTURE_SET)?;

        let image_info = [vk::DescriptorImageInfo::default()
            .sampler(self.sampler)
            .image_view(image.view)
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(descriptor_set)
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&image_info);
        unsafe { self.device.device.update_descriptor_sets(&[write], &[]) };

        Ok(Texture {
            image,
            kind: TextureKind::of_faces(faces.len()),
            descriptor_set,
        })
    }

    // =========================================================================
    // SWAPCHAIN RECREATION
    // =========================================================================

    fn recreate_swapchain(&mut self) -> BackendResult<()> {
        let (width, height) = self.size;
        if width == 0 || height == 0 {
            return Ok(());
        }

        log::debug!("Recreating swapchain at {}x{}", width, height);
        self.device.wait_idle();

        let previous_format = self.swapchain.as_ref().map(|s| s.format);

        // Old targets and views go before the old swapchain
        self.targets = None;
        self.swapchain = None;

        let mut swapchain = Swapchain::new(
            &self.vulkan,
            self.device.clone(),
            &self.surface,
            width,
            height,
            self.vsync,
        )?;
        swapchain.create_image_views()?;

        if let Some(previous) = previous_format.filter(|f| *f != swapchain.format) {
            log::warn!(
                "Surface format changed from {:?} to {:?}; existing pipelines may be incompatible",
                previous,
                swapchain.format
            );
        }

        self.targets = Some(
            RenderTargets::new(
                self.device.clone(),
                &self.render_pass,
                swapchain.format,
                &swapchain.image_views,
                swapchain.extent,
            )
            .map_err(|e| BackendError::FrameResources(format!("{e:#}")))?,
        );
        self.swapchain = Some(swapchain);
        self.needs_resize = false;
        Ok(())
    }

    // =========================================================================
    // COMMAND RECORDING
    // =========================================================================

    fn record(
        &self,
        frame_sync: &FrameSync,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        frame: &FrameState,
        renderables: &[Renderable],
    ) -> Result<(), vk::Result> {
        let device = &self.device.device;
        let cmd = frame_sync.command_buffer;

        unsafe {
            device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
            let begin_info =
                vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device.begin_command_buffer(cmd, &begin_info)?;

            // Color and depth are cleared jointly by the render pass
            let clear_values = [
                vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: self.clear_color,
                    },
                },
                vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
                },
            ];
            let render_area = vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            };
            let pass_info = vk::RenderPassBeginInfo::default()
                .render_pass(self.render_pass.render_pass)
                .framebuffer(framebuffer)
                .render_area(render_area)
                .clear_values(&clear_values);
            device.cmd_begin_render_pass(cmd, &pass_info, vk::SubpassContents::INLINE);

            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            device.cmd_set_viewport(cmd, 0, &[viewport]);
            device.cmd_set_scissor(cmd, 0, &[render_area]);
        }

        let options = PlanOptions {
            clip_space: ClipSpace::Vulkan,
            camera_affects_2d: self.camera_affects_2d,
        };
        let plan = plan_frame(frame, renderables, options);
        if plan.skipped > 0 {
            log::trace!("Skipped {} malformed renderables", plan.skipped);
        }

        let mut depth_test = true;
        let mut program: Option<&Program> = None;

        for command in &plan.commands {
            match command {
                DrawCommand::SetDepthTest(on) => {
                    depth_test = *on;
                    if let Some(program) = program {
                        unsafe {
                            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, program.pipeline(depth_test))
                        };
                    }
                }
                DrawCommand::UseProgram(handle) => {
                    program = self.programs.get(*handle);
                    match program {
                        Some(program) => unsafe {
                            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, program.pipeline(depth_test));
                            device.cmd_bind_descriptor_sets(
                                cmd,
                                vk::PipelineBindPoint::GRAPHICS,
                                program.layout,
                                FRAME_SET,
                                &[frame_sync.descriptor_set],
                                &[],
                            );
                        },
                        None => log::warn!("Unknown program {}; its renderables are skipped", handle),
                    }
                }
                DrawCommand::Draw(call) => {
                    if let Some(program) = program {
                        self.record_draw(cmd, program, call);
                    }
                }
            }
        }

        unsafe {
            device.cmd_end_render_pass(cmd);
            device.end_command_buffer(cmd)?;
        }
        Ok(())
    }

    fn record_draw(&self, cmd: vk::CommandBuffer, program: &Program, call: &DrawCall<'_>) {
        let r = call.renderable;
        let handles = [r.vertex_buffer, r.color_buffer, r.uv_buffer, r.normal_buffer, r.index_buffer];
        let mut buffers = [vk::Buffer::null(); 5];
        for (slot, handle) in buffers.iter_mut().zip(handles) {
            match self.buffers.get(handle) {
                Some(buffer) => *slot = buffer.buffer,
                None => {
                    log::trace!("Renderable references unknown buffer {}; skipped", handle);
                    return;
                }
            }
        }

        let entry = self.textures.get(r.texture);
        let Some(texture) = flat_texture(entry, |t| t.kind, self.default_texture.as_ref()) else {
            return;
        };

        let push = PushConstants {
            mvp: call.mvp,
            model: call.model(),
        };

        let device = &self.device.device;
        unsafe {
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                program.layout,
                TEXTURE_SET,
                &[texture.descriptor_set],
                &[],
            );
            device.cmd_push_constants(
                cmd,
                program.layout,
                vk::ShaderStageFlags::VERTEX,
                0,
                bytemuck::bytes_of(&push),
            );
            device.cmd_bind_vertex_buffers(cmd, 0, &buffers[..4], &[0; 4]);
            device.cmd_bind_index_buffer(cmd, buffers[4], 0, vk::IndexType::UINT32);
            device.cmd_draw_indexed(cmd, r.index_count, 1, 0, 0, 0);
        }
    }
}

impl GraphicsBackend for VulkanBackend {
    fn init(event_loop: &ActiveEventLoop, config: &Config) -> BackendResult<Self> {
        let mut stage = InitStage::Uninitialized;

        let window = event_loop
            .create_window(window_attributes(config))
            .map_err(|e| BackendError::Window(e.to_string()))?;
        let display = window
            .display_handle()
            .map_err(|e| BackendError::Window(format!("no display handle: {e}")))?
            .as_raw();

        let vulkan = VulkanInstance::new(&config.window.title, display, config.debug.validation_layers)?;
        advance(&mut stage, InitStage::InstanceCreated);

        let surface = Surface::new(&vulkan, &window)?;
        advance(&mut stage, InitStage::SurfaceCreated);

        let choice = device::pick_physical_device(&vulkan, &surface)?;
        log::info!("Selected GPU: {}", choice.name);
        advance(&mut stage, InitStage::PhysicalDeviceChosen);

        let device = Arc::new(VulkanDevice::new(&vulkan, &choice, config.graphics.msaa_samples)?);
        advance(&mut stage, InitStage::DeviceCreated);

        let size = window.inner_size();
        let mut swapchain = Swapchain::new(
            &vulkan,
            device.clone(),
            &surface,
            size.width,
            size.height,
            config.graphics.vsync,
        )?;
        advance(&mut stage, InitStage::SwapchainCreated);

        swapchain.create_image_views()?;
        advance(&mut stage, InitStage::ImageViewsCreated);

        let render_pass = RenderPass::new(device.clone(), swapchain.format)
            .map_err(|e| BackendError::RenderPass(format!("{e:#}")))?;
        advance(&mut stage, InitStage::RenderPassCreated);

        let ambience = config.lighting.ambient_light();
        log::info!("Ambient light: {:?}", ambience);

        let mut backend = Self {
            frames: Vec::new(),
            command_pool: vk::CommandPool::null(),
            textures: HandleTable::new(),
            default_texture: None,
            buffers: HandleTable::new(),
            descriptor_pool: vk::DescriptorPool::null(),
            sampler: vk::Sampler::null(),
            programs: HandleTable::new(),
            set_layouts: [vk::DescriptorSetLayout::null(); 2],
            shader_modules: HandleTable::new(),
            targets: None,
            render_pass,
            swapchain: None,
            device,
            surface,
            vulkan,
            window,
            stage,
            current_frame: 0,
            needs_resize: false,
            size: (size.width, size.height),
            vsync: config.graphics.vsync,
            clear_color: config.graphics.clear_color,
            camera_affects_2d: config.graphics.camera_affects_2d,
            ambience: ambience.extend(0.0),
        };

        // From here on the backend's Drop releases partial frame resources
        let targets = RenderTargets::new(
            backend.device.clone(),
            &backend.render_pass,
            swapchain.format,
            &swapchain.image_views,
            swapchain.extent,
        )
        .map_err(|e| BackendError::FrameResources(format!("{e:#}")))?;
        backend.targets = Some(targets);
        backend.swapchain = Some(swapchain);

        backend
            .create_frame_resources(config.graphics.max_frames_in_flight)
            .map_err(|e| BackendError::FrameResources(format!("{e:#}")))?;
        advance(&mut backend.stage, InitStage::FrameResourcesCreated);

        Ok(backend)
    }

    fn load_shader(&mut self, path: &Path, stage: ShaderStage) -> Handle {
        let module = shader::load_spirv(path, stage)
            .and_then(|code| shader::create_shader_module(&self.device, &code));

        match module {
            Ok(module) => {
                let handle = self.shader_modules.insert(module);
                log::debug!("Loaded {} shader {:?} as {}", stage, path, handle);
                handle
            }
            Err(e) => {
                log::warn!("Failed to load {} shader {:?}: {:#}", stage, path, e);
                Handle::NONE
            }
        }
    }

    fn create_program(&mut self, vertex: Handle, fragment: Handle) -> BackendResult<Handle> {
        let (Some(&vertex_module), Some(&fragment_module)) =
            (self.shader_modules.get(vertex), self.shader_modules.get(fragment))
        else {
            log::warn!("Cannot create program from unknown modules {} / {}", vertex, fragment);
            return Ok(Handle::NONE);
        };

        let program = pipeline::create_program(
            &self.device,
            &self.render_pass,
            &self.set_layouts,
            vertex_module,
            fragment_module,
        )
        .map_err(|e| BackendError::Pipeline(format!("{e:#}")))?;

        let handle = self.programs.insert(program);
        log::debug!("Created program {} from {} + {}", handle, vertex, fragment);
        Ok(handle)
    }

    fn load_texture(&mut self, path: &Path) -> Handle {
        let pixels = match texture_data::load_rgba8(path, true) {
            Ok(pixels) => pixels,
            Err(e) => {
                log::warn!("Failed to decode texture {:?}: {}", path, e);
                return Handle::NONE;
            }
        };

        match self.upload_texture(&path.to_string_lossy(), &[pixels]) {
            Ok(texture) => {
                let handle = self.textures.insert(texture);
                log::debug!("Loaded texture {:?} as {}", path, handle);
                handle
            }
            Err(e) => {
                log::warn!("Failed to upload texture {:?}: {:#}", path, e);
                Handle::NONE
            }
        }
    }

    fn load_cubemap(&mut self, faces: &[&Path; 6]) -> Handle {
        let pixels = match texture_data::load_cube_faces(faces) {
            Ok(pixels) => pixels,
            Err(e) => {
                log::warn!("Failed to load cubemap {:?}: {}", faces[0], e);
                return Handle::NONE;
            }
        };

        match self.upload_texture("cubemap", &pixels) {
            Ok(texture) => {
                let handle = self.textures.insert(texture);
                log::debug!("Loaded cubemap {:?} as {}", faces[0], handle);
                handle
            }
            Err(e) => {
                log::warn!("Failed to upload cubemap {:?}: {:#}", faces[0], e);
                Handle::NONE
            }
        }
    }

    fn create_buffer(&mut self, kind: BufferKind, data: &[u8]) -> Handle {
        if data.is_empty() {
            log::warn!("Refusing to create an empty {:?} buffer", kind);
            return Handle::NONE;
        }

        let usage = match kind {
            BufferKind::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
            BufferKind::Index => vk::BufferUsageFlags::INDEX_BUFFER,
        };

        match GpuBuffer::device_local(self.device.clone(), self.command_pool, "geometry", usage, data) {
            Ok(buffer) => {
                let handle = self.buffers.insert(buffer);
                log::debug!("Created {:?} buffer {} ({} bytes)", kind, handle, data.len());
                handle
            }
            Err(e) => {
                log::warn!("Failed to create {:?} buffer: {:#}", kind, e);
                Handle::NONE
            }
        }
    }

    fn render_frame(
        &mut self,
        frame: &FrameState,
        renderables: &[Renderable],
        overlays: &mut [OverlayCallback<'_>],
    ) -> BackendResult<()> {
        for overlay in overlays.iter_mut() {
            overlay();
        }

        if self.size.0 == 0 || self.size.1 == 0 {
            return Ok(());
        }
        if self.needs_resize || self.swapchain.is_none() {
            self.recreate_swapchain()?;
        }

        let (Some(swapchain), Some(targets)) = (&self.swapchain, &self.targets) else {
            return Ok(());
        };
        let Some(frame_sync) = self.frames.get(self.current_frame) else {
            return Err(BackendError::Frame("no frame resources".into()));
        };
        let device = &self.device.device;

        unsafe { device.wait_for_fences(&[frame_sync.in_flight_fence], true, u64::MAX) }
            .map_err(|e| BackendError::Frame(format!("wait for fence: {e}")))?;

        let image_index = match swapchain.acquire_next_image(frame_sync.image_available) {
            Ok(Some((index, suboptimal))) => {
                if suboptimal {
                    self.needs_resize = true;
                }
                index
            }
            Ok(None) => {
                self.needs_resize = true;
                return Ok(());
            }
            Err(e) => return Err(BackendError::Frame(format!("acquire: {e}"))),
        };

        // Only reset once we know work will be submitted
        unsafe { device.reset_fences(&[frame_sync.in_flight_fence]) }
            .map_err(|e| BackendError::Frame(format!("reset fence: {e}")))?;

        let uniforms = FrameUniforms {
            camera_position: frame.camera_position.extend(0.0),
            camera_direction: frame.camera_direction.extend(0.0),
            ambience: self.ambience,
        };
        frame_sync
            .uniforms
            .write(bytemuck::bytes_of(&uniforms))
            .map_err(|e| BackendError::Frame(format!("{e:#}")))?;

        let framebuffer = targets.framebuffers[image_index as usize];
        self.record(frame_sync, framebuffer, swapchain.extent, frame, renderables)
            .map_err(|e| BackendError::Frame(format!("record: {e}")))?;

        let wait_semaphores = [frame_sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [frame_sync.command_buffer];
        let signal_semaphores = [frame_sync.render_finished];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe { device.queue_submit(self.device.graphics_queue, &[submit_info], frame_sync.in_flight_fence) }
            .map_err(|e| BackendError::Frame(format!("submit: {e}")))?;

        let needs_recreate = swapchain
            .present(self.device.present_queue, image_index, frame_sync.render_finished)
            .map_err(|e| BackendError::Frame(format!("present: {e}")))?;
        if needs_recreate {
            self.needs_resize = true;
        }

        self.current_frame = (self.current_frame + 1) % self.frames.len();
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        log::debug!("Resize to {}x{}", width, height);
        self.size = (width, height);
        self.needs_resize = true;
    }

    fn window(&self) -> &Window {
        &self.window
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Vulkan
    }

    fn deinit(self: Box<Self>) {
        log::info!("Shutting down Vulkan backend (reached {:?})", self.stage);
        drop(self);
    }
}

// =============================================================================
// CLEANUP
// =============================================================================

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        self.device.wait_idle();
        let device = self.device.clone();

        unsafe {
            // 1. Sync objects (uniform buffers free themselves)
            for frame in self.frames.drain(..) {
                frame.destroy(&device.device);
            }

            // 2. Command pool (also frees command buffers)
            if self.command_pool != vk::CommandPool::null() {
                device.device.destroy_command_pool(self.command_pool, None);
            }

            // 3. Textures and buffers
            self.textures.drain_rev().for_each(drop);
            self.default_texture = None;
            self.buffers.drain_rev().for_each(drop);

            // 4. Descriptor pool (also frees sets) and sampler
            if self.descriptor_pool != vk::DescriptorPool::null() {
                device.device.destroy_descriptor_pool(self.descriptor_pool, None);
            }
            if self.sampler != vk::Sampler::null() {
                device.device.destroy_sampler(self.sampler, None);
            }

            // 5. Pipelines, then their layouts
            let programs: Vec<Program> = self.programs.drain_rev().collect();
            for program in &programs {
                device.device.destroy_pipeline(program.with_depth, None);
                device.device.destroy_pipeline(program.without_depth, None);
            }
            for program in &programs {
                device.device.destroy_pipeline_layout(program.layout, None);
            }
            for layout in self.set_layouts {
                if layout != vk::DescriptorSetLayout::null() {
                    device.device.destroy_descriptor_set_layout(layout, None);
                }
            }

            // 6. Shader modules
            for module in self.shader_modules.drain_rev() {
                device.device.destroy_shader_module(module, None);
            }
        }

        // 7. Framebuffers and attachments; the rest drops in field order
        self.targets = None;
        log::info!("Vulkan backend destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind_of(entry: &(&str, TextureKind)) -> TextureKind {
        entry.1
    }

    #[test]
    fn test_flat_texture_binds_its_own_entry() {
        let brick = ("brick", TextureKind::Flat);
        let white = ("white", TextureKind::Flat);
        let picked = flat_texture(Some(&brick), kind_of, Some(&white));
        assert_eq!(picked.map(|t| t.0), Some("brick"));
    }

    #[test]
    fn test_cubemap_falls_back_to_default_texture() {
        let sky = ("sky", TextureKind::Cube);
        let white = ("white", TextureKind::Flat);
        let picked = flat_texture(Some(&sky), kind_of, Some(&white));
        assert_eq!(picked.map(|t| t.0), Some("white"));
    }

    #[test]
    fn test_unknown_handle_falls_back_to_default_texture() {
        let white = ("white", TextureKind::Flat);
        let picked = flat_texture(None, kind_of, Some(&white));
        assert_eq!(picked.map(|t| t.0), Some("white"));
    }

    #[test]
    fn test_cubemap_without_default_binds_nothing() {
        let sky = ("sky", TextureKind::Cube);
        assert!(flat_texture(Some(&sky), kind_of, None).is_none());
    }
}
