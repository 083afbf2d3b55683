// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Everything the graphics core reads at startup: which backend to run,
// multisampling, clear color, vsync, validation layers and the ambient light
// base color. Missing file or missing keys fall back to defaults.

use anyhow::{Context, Result};
use glam::Vec3;
use serde::Deserialize;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub lighting: LightingConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Duo Renderer".to_string(),
            width: 1280,
            height: 720,
            fullscreen: false,
        }
    }
}

/// Which graphics API drives the frame
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[serde(alias = "gl", alias = "opengl41")]
    OpenGl,
    #[serde(alias = "vk")]
    Vulkan,
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::OpenGl => "opengl",
            BackendKind::Vulkan => "vulkan",
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GraphicsConfig {
    pub backend: BackendKind,
    /// Requested MSAA sample count (1 disables multisampling)
    pub msaa_samples: u32,
    pub clear_color: [f32; 4],
    pub vsync: bool,
    /// Render OpenGL into an sRGB framebuffer so both backends match
    pub srgb_framebuffer: bool,
    /// Apply the camera view matrix to 2D renderables as well
    pub camera_affects_2d: bool,
    pub max_frames_in_flight: usize,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::OpenGl,
            msaa_samples: 4,
            clear_color: [0.75, 0.75, 0.8, 1.0],
            vsync: true,
            srgb_framebuffer: true,
            camera_affects_2d: false,
            max_frames_in_flight: 2,
        }
    }
}

/// Scene lighting settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LightingConfig {
    /// Base color the ambient term is derived from
    pub ambient: [f32; 3],
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            ambient: [0.75, 0.75, 0.8],
        }
    }
}

impl LightingConfig {
    /// Ambient light vector: `max(base - 0.5, 0.1)` per channel.
    ///
    /// Backends compute this once at init and never change it afterwards.
    pub fn ambient_light(&self) -> Vec3 {
        (Vec3::from_array(self.ambient) - Vec3::splat(0.5)).max(Vec3::splat(0.1))
    }
}

/// Debug settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_level: String,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: cfg!(debug_assertions),
            log_level: "info".to_string(),
            show_fps: true,
        }
    }
}

impl DebugConfig {
    pub fn level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or_else(|_| {
            log::warn!("Unknown log level '{}', defaulting to info", self.log_level);
            log::LevelFilter::Info
        })
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.graphics.backend, BackendKind::OpenGl);
        assert_eq!(config.graphics.msaa_samples, 4);
        assert_eq!(config.window.width, 1280);
        assert!(config.graphics.vsync);
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = Config::parse(
            r#"
            [graphics]
            backend = "vulkan"
            vsync = false

            [window]
            title = "Demo"
            "#,
        )
        .unwrap();
        assert_eq!(config.graphics.backend, BackendKind::Vulkan);
        assert!(!config.graphics.vsync);
        assert_eq!(config.graphics.clear_color, [0.75, 0.75, 0.8, 1.0]);
        assert_eq!(config.window.title, "Demo");
        assert_eq!(config.window.height, 720);
    }

    #[test]
    fn test_backend_aliases() {
        let gl = Config::parse("[graphics]\nbackend = \"gl\"").unwrap();
        let vk = Config::parse("[graphics]\nbackend = \"vk\"").unwrap();
        assert_eq!(gl.graphics.backend, BackendKind::OpenGl);
        assert_eq!(vk.graphics.backend, BackendKind::Vulkan);
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        assert!(Config::parse("[graphics]\nbackend = \"metal\"").is_err());
    }

    #[test]
    fn test_ambient_light_subtracts_half() {
        let lighting = LightingConfig {
            ambient: [0.75, 0.9, 1.0],
        };
        let ambient = lighting.ambient_light();
        assert!((ambient.x - 0.25).abs() < 1e-6);
        assert!((ambient.y - 0.4).abs() < 1e-6);
        assert!((ambient.z - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_ambient_light_is_clamped_to_minimum() {
        let lighting = LightingConfig {
            ambient: [0.0, 0.55, 0.6],
        };
        let ambient = lighting.ambient_light();
        assert!((ambient.x - 0.1).abs() < 1e-6);
        assert!((ambient.y - 0.1).abs() < 1e-6);
        assert!((ambient.z - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_level_filter_parses_and_falls_back() {
        let mut debug = DebugConfig::default();
        debug.log_level = "debug".into();
        assert_eq!(debug.level_filter(), log::LevelFilter::Debug);
        debug.log_level = "chatty".into();
        assert_eq!(debug.level_filter(), log::LevelFilter::Info);
    }

    #[test]
    fn test_load_from_missing_path_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_path(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.graphics.max_frames_in_flight, 2);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[lighting]\nambient = [1.0, 1.0, 1.0]").unwrap();
        let config = Config::load_from_path(file.path()).unwrap();
        assert_eq!(config.lighting.ambient, [1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_load_from_malformed_file_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[graphics\nbackend = ").unwrap();
        let err = Config::load_from_path(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config file"));
    }
}
