//! Vulkan bring-up: instance, surface, devices and the device context

pub mod context;
pub mod surface;

pub use context::{DeviceContext, PhysicalDeviceInfo, VulkanError, VulkanResult};
pub use surface::PresentationSurface;
