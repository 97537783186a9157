//! Renderer error types
//!
//! Two tiers: [`VulkanError`] covers driver calls and device capabilities and is
//! fatal during initialization; asset errors ([`ShaderError`], [`ImageError`],
//! [`FontError`]) are recoverable and callers decide what to do with them.
//!
//! [`ShaderError`]: crate::render::resources::shader::ShaderError
//! [`ImageError`]: crate::render::resources::image::ImageError
//! [`FontError`]: crate::render::resources::font::FontError

use ash::vk;
use thiserror::Error;

use crate::core::config::ConfigError;
use crate::render::backends::vulkan::WindowError;
use crate::render::resources::font::FontError;
use crate::render::resources::image::ImageError;
use crate::render::resources::shader::ShaderError;

/// Vulkan-specific error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// No memory type satisfies the requested property flags
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// No physical device exposes a graphics queue with present support
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// A resource the operation depends on has not been created
    #[error("Resource not found: {what}")]
    ResourceNotFound {
        /// Which resource was missing
        what: String,
    },
}

impl VulkanError {
    /// Whether this is the recoverable out-of-date swapchain condition
    pub fn is_out_of_date(&self) -> bool {
        matches!(self, Self::Api(vk::Result::ERROR_OUT_OF_DATE_KHR))
    }
}

impl From<vk::Result> for VulkanError {
    fn from(result: vk::Result) -> Self {
        Self::Api(result)
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

/// Top-level renderer errors
#[derive(Error, Debug)]
pub enum RenderError {
    /// Device or driver failure
    #[error(transparent)]
    Vulkan(#[from] VulkanError),

    /// Shader load or reflection failure
    #[error(transparent)]
    Shader(#[from] ShaderError),

    /// Texture load or upload failure
    #[error(transparent)]
    Image(#[from] ImageError),

    /// Font load or atlas failure
    #[error(transparent)]
    Font(#[from] FontError),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Window creation failure
    #[error(transparent)]
    Window(#[from] WindowError),
}

/// Result type for renderer operations
pub type RenderResult<T> = Result<T, RenderError>;
