// Build script: precompile the Vulkan demo shaders to SPIR-V
//
// Missing glslc is not an error. The Vulkan backend compiles GLSL sources at
// load time when no `.spv` sits next to them.

use std::path::Path;
use std::process::Command;

const SHADER_DIR: &str = "shaders/vulkan";

fn main() {
    println!("cargo:rerun-if-changed={SHADER_DIR}");

    if std::env::var_os("CARGO_FEATURE_VULKAN").is_none() {
        return;
    }

    let Ok(entries) = std::fs::read_dir(SHADER_DIR) else {
        println!("cargo:warning=no {SHADER_DIR} directory; skipping shader compilation");
        return;
    };

    for entry in entries.flatten() {
        let input = entry.path();
        let is_stage = matches!(
            input.extension().and_then(|ext| ext.to_str()),
            Some("vert" | "frag")
        );
        if is_stage {
            let output = input.with_file_name(format!("{}.spv", entry.file_name().to_string_lossy()));
            compile_shader(&input, &output);
        }
    }
}

fn compile_shader(input: &Path, output: &Path) {
    let result = Command::new("glslc").arg(input).arg("-o").arg(output).status();

    match result {
        Ok(status) if status.success() => {}
        Ok(status) => {
            println!(
                "cargo:warning=glslc failed on {} (exit code {:?})",
                input.display(),
                status.code()
            );
        }
        Err(e) => {
            println!("cargo:warning=glslc not found ({e}); {} will be compiled at load time", input.display());
        }
    }
}
