//! # Renderer Configuration
//!
//! Settings for window creation, Vulkan bring-up, the frame clear values and
//! where content and compiled shaders are found. Every field has a default so
//! the entry point can run with `RendererConfig::default()`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use crate::config::{Config, ConfigError};

/// Directory name searched next to the executable for content
pub const CONTENT_DIR_NAME: &str = "Content";

/// # Shader Configuration
///
/// Paths of the SPIR-V binaries used by the geometry pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaderConfig {
    /// Path to the vertex shader SPIR-V file
    pub vertex_shader_path: String,
    /// Path to the fragment shader SPIR-V file
    pub fragment_shader_path: String,
}

impl ShaderConfig {
    /// Create a new shader configuration
    pub fn new(vertex_path: impl Into<String>, fragment_path: impl Into<String>) -> Self {
        Self {
            vertex_shader_path: vertex_path.into(),
            fragment_shader_path: fragment_path.into(),
        }
    }

    /// Create shader config with automatic path resolution
    ///
    /// Tries the common build output locations so the renderer works when run
    /// from the workspace root or from an app directory.
    pub fn with_path_resolution(base_vertex: &str, base_fragment: &str) -> Self {
        let shader_dirs = [
            "target/shaders/",
            "../target/shaders/",
            "shaders/",
            "resources/shaders/",
            "./",
        ];

        let find = |name: &str| {
            shader_dirs
                .iter()
                .map(|dir| format!("{}{}", dir, name))
                .find(|candidate| Path::new(candidate).exists())
                .unwrap_or_else(|| format!("target/shaders/{}", name))
        };

        Self {
            vertex_shader_path: find(base_vertex),
            fragment_shader_path: find(base_fragment),
        }
    }

    /// Whether both shader binaries are present on disk
    pub fn exists(&self) -> bool {
        Path::new(&self.vertex_shader_path).exists()
            && Path::new(&self.fragment_shader_path).exists()
    }

    /// Validate that shader files exist
    pub fn validate(&self) -> Result<(), String> {
        if !Path::new(&self.vertex_shader_path).exists() {
            return Err(format!("Vertex shader not found: {}", self.vertex_shader_path));
        }
        if !Path::new(&self.fragment_shader_path).exists() {
            return Err(format!("Fragment shader not found: {}", self.fragment_shader_path));
        }
        Ok(())
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self::with_path_resolution("gbuffer.vert.spv", "gbuffer.frag.spv")
    }
}

/// Window title and initial drawable size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Requested width in pixels
    pub width: u32,
    /// Requested height in pixels
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Rainbow".to_string(),
            width: 1920,
            height: 1080,
        }
    }
}

/// # Renderer Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Window settings
    pub window: WindowConfig,
    /// Clear colour of the main pass (RGBA)
    pub clear_color: [f32; 4],
    /// Depth clear value
    pub clear_depth: f32,
    /// Stencil clear value
    pub clear_stencil: u32,
    /// Whether to enable Vulkan validation layers, `None` follows the build type
    pub enable_validation: Option<bool>,
    /// Content directory override, `None` resolves next to the executable
    pub content_dir: Option<PathBuf>,
    /// Mesh file loaded by the default world
    pub mesh_file: String,
    /// Geometry pass shaders
    pub shaders: ShaderConfig,
}

impl RendererConfig {
    /// Create a new renderer configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            window: WindowConfig::default(),
            clear_color: [0.2, 1.0, 0.2, 1.0],
            clear_depth: 1.0,
            clear_stencil: 0,
            enable_validation: None,
            content_dir: None,
            mesh_file: "Suzan.obj".to_string(),
            shaders: ShaderConfig::default(),
        }
    }

    /// Set window title and size
    pub fn with_window(mut self, title: impl Into<String>, width: u32, height: u32) -> Self {
        self.window = WindowConfig {
            title: title.into(),
            width,
            height,
        };
        self
    }

    /// Set the main pass clear colour
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Enable or disable validation layers
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Load content from an explicit directory
    pub fn with_content_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.content_dir = Some(dir.into());
        self
    }

    /// Set custom shader configuration
    pub fn with_shaders(mut self, shaders: ShaderConfig) -> Self {
        self.shaders = shaders;
        self
    }

    /// Effective validation setting
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Directory the default world loads its mesh from
    ///
    /// An explicit `content_dir` wins. Otherwise `<exe dir>/Content` is used
    /// when it exists, falling back to `resources/content`.
    pub fn resolve_content_dir(&self) -> PathBuf {
        if let Some(dir) = &self.content_dir {
            return dir.clone();
        }

        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(CONTENT_DIR_NAME)))
            .filter(|dir| dir.is_dir())
            .unwrap_or_else(|| PathBuf::from("resources/content"))
    }

    /// Full path of the default world's mesh
    pub fn mesh_path(&self) -> PathBuf {
        self.resolve_content_dir().join(&self.mesh_file)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_name.is_empty() {
            return Err(ConfigError::Invalid("Application name cannot be empty".to_string()));
        }
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "Window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        if self.mesh_file.is_empty() {
            return Err(ConfigError::Invalid("Mesh file cannot be empty".to_string()));
        }
        Ok(())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new("Rainbow")
    }
}

impl Config for RendererConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_window_contract() {
        let config = RendererConfig::default();
        assert_eq!(config.window.title, "Rainbow");
        assert_eq!((config.window.width, config.window.height), (1920, 1080));
        assert_eq!(config.clear_color, [0.2, 1.0, 0.2, 1.0]);
        assert_eq!(config.clear_depth, 1.0);
        assert_eq!(config.clear_stencil, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_follows_override() {
        assert!(RendererConfig::default().with_validation(true).validation_enabled());
        assert!(!RendererConfig::default().with_validation(false).validation_enabled());
        assert_eq!(RendererConfig::default().validation_enabled(), cfg!(debug_assertions));
    }

    #[test]
    fn test_explicit_content_dir_wins() {
        let config = RendererConfig::default().with_content_dir("/tmp/rainbow_content");
        assert_eq!(config.resolve_content_dir(), PathBuf::from("/tmp/rainbow_content"));
        assert_eq!(config.mesh_path(), PathBuf::from("/tmp/rainbow_content/Suzan.obj"));
    }

    #[test]
    fn test_zero_sized_window_is_rejected() {
        let config = RendererConfig::default().with_window("Rainbow", 0, 1080);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = RendererConfig::default()
            .with_clear_color([0.0, 0.0, 0.0, 1.0])
            .with_shaders(ShaderConfig::new("a.vert.spv", "a.frag.spv"));
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: RendererConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_save_and_load_ron_file() {
        let path = std::env::temp_dir().join(format!("rainbow_config_{}.ron", std::process::id()));
        let config = RendererConfig::new("ron test").with_validation(false);
        config.save_to_file(&path).unwrap();
        let loaded = RendererConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_shaders_do_not_exist() {
        let shaders = ShaderConfig::new("does/not/exist.vert.spv", "does/not/exist.frag.spv");
        assert!(!shaders.exists());
        assert!(shaders.validate().is_err());
    }
}
