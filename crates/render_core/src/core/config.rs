//! # Renderer Configuration
//!
//! Serializable settings consumed by [`crate::render::Renderer`] and the demo
//! application. Every struct has sensible defaults so a missing config file is
//! never an error; files can be TOML or RON (see [`Config`]).
//!
//! ## Asset policy
//!
//! Shader loads always fail fast because pipelines cannot exist without them.
//! Texture and font loads follow [`AssetPolicy`]: `Strict` aborts renderer
//! initialization, `Fallback` logs the failure and substitutes a placeholder.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::render::renderer::INSTANCE_REGION_ALIGNMENT;
use crate::render::types::GlyphInstance;

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The file could not be read or written
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file contents did not parse
    #[error("Parse error: {0}")]
    Parse(String),

    /// The value could not be written out
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Neither `.toml` nor `.ron`
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A value failed validation
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    Toml,
    Ron,
}

impl FileFormat {
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("ron") => Ok(Self::Ron),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// A settings struct stored as TOML or RON, picked by file extension
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Read and parse `path`
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let format = FileFormat::from_path(path)?;
        let contents = std::fs::read_to_string(path)?;

        match format {
            FileFormat::Toml => toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            FileFormat::Ron => ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
        }
    }

    /// Like [`Config::load_from_file`], with defaults when the file does not exist
    fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match Self::load_from_file(path) {
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("Config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Write to `path` in the format its extension names
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = match FileFormat::from_path(path)? {
            FileFormat::Toml => toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?,
            FileFormat::Ron => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?,
        };
        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// What to do when a texture or font fails to load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AssetPolicy {
    /// Abort initialization with the load error
    Strict,
    /// Log the error and substitute a placeholder resource
    #[default]
    Fallback,
}

/// Window creation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Initial width in pixels
    pub width: u32,
    /// Initial height in pixels
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Render Core".to_string(),
            width: 1600,
            height: 900,
        }
    }
}

/// # Asset Configuration
///
/// Locations of compiled shaders, DDS textures and the font used for text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetConfig {
    /// Directory holding `<Name>.vert.spv` / `<Name>.frag.spv`
    pub shader_dir: PathBuf,
    /// Directory holding the block textures
    pub texture_dir: PathBuf,
    /// TrueType font baked into the glyph atlas
    pub font_path: PathBuf,
    /// Failure policy for textures and fonts
    pub policy: AssetPolicy,
}

impl AssetConfig {
    /// Resolve the shader directory from common locations
    ///
    /// Useful when the binary can be started from the workspace root or from a crate directory.
    pub fn with_path_resolution() -> Self {
        let shader_dirs = ["target/shaders", "../target/shaders", "../../target/shaders", "shaders"];
        let shader_dir = shader_dirs
            .iter()
            .map(Path::new)
            .find(|dir| dir.join("DefaultLit.vert.spv").exists())
            .map_or_else(|| PathBuf::from("target/shaders"), Path::to_path_buf);

        Self {
            shader_dir,
            ..Self::default()
        }
    }

    /// Set the shader directory
    pub fn with_shader_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shader_dir = dir.into();
        self
    }

    /// Set the failure policy
    pub fn with_policy(mut self, policy: AssetPolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            shader_dir: PathBuf::from("target/shaders"),
            texture_dir: PathBuf::from("resources/textures"),
            font_path: PathBuf::from("resources/fonts/Mx437_Verite_9x14.ttf"),
            policy: AssetPolicy::Fallback,
        }
    }
}

/// # Renderer Configuration
///
/// Application metadata, debug features and buffer sizing for the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Window settings
    pub window: WindowConfig,
    /// Whether to enable Vulkan validation layers (`None` = debug builds only)
    pub enable_validation: Option<bool>,
    /// Default log filter when `RUST_LOG` is not set
    pub log_level: String,
    /// Asset locations
    pub assets: AssetConfig,
    /// Capacity of the shared instance buffer, in mesh instances
    pub max_entities: u32,
    /// Size of the shared image staging buffer in bytes
    pub staging_buffer_size: u64,
    /// FIFO presentation instead of immediate
    pub vsync: bool,
    /// Worker threads for the job pool (`None` = hardware concurrency)
    pub worker_threads: Option<usize>,
}

impl RendererConfig {
    /// Create a configuration with defaults and the given application name
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            ..Self::default()
        }
    }

    /// Set the initial window size
    pub fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.window.width = width;
        self.window.height = height;
        self
    }

    /// Set asset locations
    pub fn with_assets(mut self, assets: AssetConfig) -> Self {
        self.assets = assets;
        self
    }

    /// Set the instance buffer capacity
    pub fn with_max_entities(mut self, max_entities: u32) -> Self {
        self.max_entities = max_entities;
        self
    }

    /// Enable or disable validation layers
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Whether validation layers should be requested
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
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
        let glyph_size = std::mem::size_of::<GlyphInstance>() as u64;
        let instance_bytes = u64::from(self.max_entities) * glyph_size;
        // Mesh, world text and screen text each get an aligned region
        let required = 2 * INSTANCE_REGION_ALIGNMENT + glyph_size;
        if instance_bytes < required {
            return Err(ConfigError::Invalid(format!(
                "max_entities {} gives a {instance_bytes} byte instance buffer, at least {required} bytes are needed",
                self.max_entities
            )));
        }
        if self.staging_buffer_size == 0 {
            return Err(ConfigError::Invalid("staging_buffer_size must be non-zero".to_string()));
        }
        Ok(())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            application_name: "Render Core Application".to_string(),
            window: WindowConfig::default(),
            enable_validation: None,
            log_level: "info".to_string(),
            assets: AssetConfig::default(),
            max_entities: 10_000,
            staging_buffer_size: 8 * 1024 * 1024,
            vsync: false,
            worker_threads: None,
        }
    }
}

impl Config for RendererConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RendererConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.staging_buffer_size, 8 * 1024 * 1024);
        assert_eq!(config.assets.policy, AssetPolicy::Fallback);
    }

    #[test]
    fn test_zero_window_is_rejected() {
        let config = RendererConfig::default().with_window_size(0, 900);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_instance_buffer_must_fit_three_regions() {
        assert!(matches!(
            RendererConfig::default().with_max_entities(1).validate(),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RendererConfig::default().with_max_entities(6).validate(),
            Err(ConfigError::Invalid(_))
        ));
        assert!(RendererConfig::default().with_max_entities(7).validate().is_ok());
    }

    #[test]
    fn test_toml_round_trip_keeps_values() {
        let config = RendererConfig::new("Cubes")
            .with_window_size(1280, 720)
            .with_max_entities(64)
            .with_assets(AssetConfig::default().with_policy(AssetPolicy::Strict));

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: RendererConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_file_is_rejected_without_all_fields() {
        let result: Result<RendererConfig, _> = toml::from_str("application_name = \"x\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_unsupported_extension() {
        let result = RendererConfig::load_from_file("renderer.ini");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("render_core_missing_config_7f3a.ron");
        let config = RendererConfig::load_or_default(&path).unwrap();
        assert_eq!(config, RendererConfig::default());
    }

    #[test]
    fn test_ron_file_round_trip() {
        let path = std::env::temp_dir().join(format!("render_core_config_{}.ron", std::process::id()));
        let config = RendererConfig::new("Ron").with_max_entities(7);

        config.save_to_file(&path).unwrap();
        let loaded = RendererConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded, config);
    }
}
