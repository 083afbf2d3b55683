// Shader source loading shared by both backends
//
// A shader file is either GLSL text or a precompiled SPIR-V blob, told apart
// by extension. Text marked for translation is rewritten by `translate`.

pub mod translate;

use std::fmt;
use std::path::Path;

pub use translate::{translate, TRANSLATION_MARKER};

/// Extension of precompiled binary shader modules
pub const BINARY_EXTENSION: &str = "spv";

/// Pipeline stage a shader module is compiled for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    /// Stage name as understood by `glslc -fshader-stage=`
    pub fn glslc_name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vert",
            ShaderStage::Fragment => "frag",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Fragment => write!(f, "fragment"),
        }
    }
}

/// Raw contents of a shader file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderSource {
    /// GLSL text, possibly carrying the translation marker
    Text(String),
    /// Precompiled SPIR-V, handed to module creation untouched
    Binary(Vec<u8>),
}

impl ShaderSource {
    /// Read a shader file. `.spv` files are read as bytes, anything else as text.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        if is_binary_path(path) {
            Ok(ShaderSource::Binary(std::fs::read(path)?))
        } else {
            Ok(ShaderSource::Text(std::fs::read_to_string(path)?))
        }
    }
}

/// Whether `path` names a precompiled binary module.
pub fn is_binary_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(BINARY_EXTENSION))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_binary_path_detection() {
        assert!(is_binary_path(Path::new("shaders/basic.vert.spv")));
        assert!(is_binary_path(Path::new("BASIC.SPV")));
        assert!(!is_binary_path(Path::new("shaders/basic.vert")));
        assert!(!is_binary_path(Path::new("spv")));
    }

    #[test]
    fn test_load_text_source() {
        let mut file = tempfile::Builder::new().suffix(".frag").tempfile().unwrap();
        write!(file, "#version 410\nvoid main() {{}}\n").unwrap();
        let source = ShaderSource::load(file.path()).unwrap();
        assert_eq!(source, ShaderSource::Text("#version 410\nvoid main() {}\n".into()));
    }

    #[test]
    fn test_load_binary_source_keeps_bytes() {
        let mut file = tempfile::Builder::new().suffix(".spv").tempfile().unwrap();
        let bytes = [0x03, 0x02, 0x23, 0x07, 0xff, 0x00];
        file.write_all(&bytes).unwrap();
        let source = ShaderSource::load(file.path()).unwrap();
        assert_eq!(source, ShaderSource::Binary(bytes.to_vec()));
    }

    #[test]
    fn test_load_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ShaderSource::load(&dir.path().join("nope.vert")).is_err());
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(ShaderStage::Vertex.glslc_name(), "vert");
        assert_eq!(ShaderStage::Fragment.to_string(), "fragment");
    }
}
