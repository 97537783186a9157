//! Vulkan backend implementation
//!
//! Organized into instance creation, the GLFW window and the logical device.

/// Vulkan instance and validation messenger
pub mod instance;

/// GLFW window and surface creation
pub mod window;

/// Physical device selection and the ash-backed device
pub mod device;

pub use device::{PhysicalDeviceInfo, VulkanDevice};
pub use instance::VulkanInstance;
pub use window::{Window, WindowError, WindowEvent, WindowResult};
