//! Device implementations behind the [`GpuDevice`] seam
//!
//! The ash-backed Vulkan device drives real hardware; the headless device is an
//! in-memory implementation used by tests and offscreen tooling.

/// Device trait and capability types
pub mod device;

/// In-memory device that records commands
pub mod headless;

/// Vulkan backend (instance, window, device)
pub mod vulkan;

pub use device::{DeviceCapabilities, EnabledFeatures, GpuDevice};
pub use headless::{HeadlessDevice, RecordedCommand};
pub use vulkan::{VulkanDevice, Window, WindowEvent};
