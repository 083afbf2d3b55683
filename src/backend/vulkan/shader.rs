// Shader module loading
//
// Vulkan consumes SPIR-V. `.spv` files are used as they are; any other file
// is treated as GLSL and compiled with `glslc` from the Vulkan SDK.

use super::device::VulkanDevice;
use crate::shader::{ShaderSource, ShaderStage};
use anyhow::{bail, Context, Result};
use ash::vk;
use std::io::Cursor;
use std::path::Path;
use std::process::Command;

/// Read or compile `path` into SPIR-V words.
pub fn load_spirv(path: &Path, stage: ShaderStage) -> Result<Vec<u32>> {
    let bytes = match ShaderSource::load(path).with_context(|| format!("Failed to read {:?}", path))? {
        ShaderSource::Binary(bytes) => bytes,
        ShaderSource::Text(_) => compile_glsl(path, stage)?,
    };

    // read_spv checks the magic number and handles alignment
    ash::util::read_spv(&mut Cursor::new(bytes)).with_context(|| format!("{:?} is not valid SPIR-V", path))
}

fn compile_glsl(path: &Path, stage: ShaderStage) -> Result<Vec<u8>> {
    let output = Command::new("glslc")
        .arg(format!("-fshader-stage={}", stage.glslc_name()))
        .arg(path)
        .arg("-o")
        .arg("-")
        .output()
        .context("glslc not found; install the Vulkan SDK or ship precompiled .spv files")?;

    if !output.status.success() {
        bail!(
            "glslc failed on {:?}:\n{}",
            path,
            String::from_utf8_lossy(&output.stderr).trim_end()
        );
    }

    Ok(output.stdout)
}

pub fn create_shader_module(device: &VulkanDevice, code: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::default().code(code);

    unsafe { device.device.create_shader_module(&create_info, None) }.context("Failed to create shader module")
}
