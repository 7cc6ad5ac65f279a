//! Vulkan surface management
//!
//! The presentation surface plus the pure decisions made from what it reports:
//! swapchain format, extent, image count and sharing mode.

use ash::extensions::khr;
use ash::{vk, Entry, Instance};

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// The only swapchain format the renderer accepts
pub const REQUIRED_SURFACE_FORMAT: vk::Format = vk::Format::B8G8R8A8_UNORM;

/// Vulkan surface wrapper for presentation
pub struct PresentationSurface {
    surface_loader: khr::Surface,
    surface: vk::SurfaceKHR,
}

impl PresentationSurface {
    /// Take ownership of a surface created by the window
    pub fn new(entry: &Entry, instance: &Instance, surface: vk::SurfaceKHR) -> Self {
        Self {
            surface_loader: khr::Surface::new(entry, instance),
            surface,
        }
    }

    /// Get the underlying surface handle
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Whether a queue family of the device can present to this surface
    pub fn supports_present(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
    ) -> VulkanResult<bool> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_support(physical_device, queue_family, self.surface)
                .map_err(VulkanError::Api)
        }
    }

    /// Get surface capabilities for a physical device
    pub fn capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VulkanResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)
                .map_err(VulkanError::Api)
        }
    }

    /// Get supported surface formats for a physical device
    pub fn formats(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VulkanResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(physical_device, self.surface)
                .map_err(VulkanError::Api)
        }
    }
}

impl Drop for PresentationSurface {
    fn drop(&mut self) {
        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

/// Find [`REQUIRED_SURFACE_FORMAT`] among the formats the surface offers
pub fn select_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> VulkanResult<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|format| format.format == REQUIRED_SURFACE_FORMAT)
        .ok_or(VulkanError::UnsupportedSurfaceFormat {
            required: REQUIRED_SURFACE_FORMAT,
        })
}

/// Clamp the drawable size into the surface's supported extent range
///
/// `current_extent` is ignored; the drawable size is authoritative.
pub fn choose_viewport_extent(
    drawable: vk::Extent2D,
    capabilities: &vk::SurfaceCapabilitiesKHR,
) -> vk::Extent2D {
    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    vk::Extent2D {
        width: drawable.width.max(min.width).min(max.width),
        height: drawable.height.max(min.height).min(max.height),
    }
}

/// One more image than the minimum, capped at the maximum when there is one
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

/// Concurrent sharing across both families when they differ
pub fn choose_sharing_mode(
    graphics_family: u32,
    present_family: u32,
) -> (vk::SharingMode, Vec<u32>) {
    if graphics_family == present_family {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (vk::SharingMode::CONCURRENT, vec![graphics_family, present_family])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            current_extent: vk::Extent2D { width: 17, height: 17 },
            min_image_extent: vk::Extent2D { width: min.0, height: min.1 },
            max_image_extent: vk::Extent2D { width: max.0, height: max.1 },
            ..Default::default()
        }
    }

    #[test]
    fn test_extent_within_range_is_unchanged() {
        let extent = choose_viewport_extent(
            vk::Extent2D { width: 1920, height: 1080 },
            &caps((1, 1), (4096, 4096)),
        );
        assert_eq!((extent.width, extent.height), (1920, 1080));
    }

    #[test]
    fn test_extent_clamps_to_max() {
        let extent = choose_viewport_extent(
            vk::Extent2D { width: 1920, height: 1080 },
            &caps((1, 1), (800, 600)),
        );
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn test_extent_clamps_to_min() {
        let extent = choose_viewport_extent(
            vk::Extent2D { width: 0, height: 0 },
            &caps((64, 32), (800, 600)),
        );
        assert_eq!((extent.width, extent.height), (64, 32));
    }

    #[test]
    fn test_image_count_is_min_plus_one_without_max() {
        assert_eq!(choose_image_count(&caps((1, 1), (1, 1))), 3);
    }

    #[test]
    fn test_image_count_respects_max() {
        let mut capabilities = caps((1, 1), (1, 1));
        capabilities.max_image_count = 2;
        assert_eq!(choose_image_count(&capabilities), 2);
    }

    #[test]
    fn test_required_format_is_found_anywhere_in_list() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        assert_eq!(select_surface_format(&formats).unwrap().format, vk::Format::B8G8R8A8_UNORM);
    }

    #[test]
    fn test_missing_required_format_is_rejected() {
        let formats = [vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        assert!(matches!(
            select_surface_format(&formats),
            Err(VulkanError::UnsupportedSurfaceFormat { .. })
        ));
        assert!(select_surface_format(&[]).is_err());
    }

    #[test]
    fn test_sharing_mode_by_family() {
        assert_eq!(choose_sharing_mode(0, 0), (vk::SharingMode::EXCLUSIVE, vec![]));
        assert_eq!(choose_sharing_mode(0, 2), (vk::SharingMode::CONCURRENT, vec![0, 2]));
    }
}
