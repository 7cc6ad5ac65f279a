//! Framebuffers and the main depth buffer

use ash::{vk, Device};

use crate::render::backends::vulkan::resources::texture::{allocate_image, ImageAllocation};
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Depth-stencil format of the main pass
pub const MAIN_DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT_S8_UINT;

/// Framebuffer wrapper with RAII cleanup
pub struct Framebuffer {
    device: Device,
    framebuffer: vk::Framebuffer,
}

impl Framebuffer {
    /// Create a new framebuffer
    pub fn new(
        device: Device,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let framebuffer_create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe {
            device
                .create_framebuffer(&framebuffer_create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, framebuffer })
    }

    /// Get the framebuffer handle
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.framebuffer, None);
        }
    }
}

/// Device-local depth-stencil image shared by every main-pass framebuffer
pub struct DepthBuffer {
    device: Device,
    allocation: ImageAllocation,
    format: vk::Format,
}

impl DepthBuffer {
    /// Create a depth buffer at `extent`
    pub fn new(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        extent: vk::Extent2D,
        format: vk::Format,
    ) -> VulkanResult<Self> {
        let allocation = allocate_image(
            &device,
            memory_properties,
            extent,
            format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            depth_aspect(format),
        )?;

        Ok(Self {
            device,
            allocation,
            format,
        })
    }

    /// Get the image view handle
    pub fn image_view(&self) -> vk::ImageView {
        self.allocation.view
    }

    /// Depth-stencil format
    pub fn format(&self) -> vk::Format {
        self.format
    }
}

impl Drop for DepthBuffer {
    fn drop(&mut self) {
        self.allocation.destroy(&self.device);
    }
}

/// Whether a depth format also carries a stencil component
pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::S8_UINT
    )
}

/// Image aspect of a depth attachment view
pub fn depth_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    if has_stencil_component(format) {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else {
        vk::ImageAspectFlags::DEPTH
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_depth_format_has_stencil() {
        assert!(has_stencil_component(MAIN_DEPTH_FORMAT));
        assert_eq!(
            depth_aspect(MAIN_DEPTH_FORMAT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }

    #[test]
    fn test_depth_only_formats() {
        assert!(!has_stencil_component(vk::Format::D32_SFLOAT));
        assert_eq!(depth_aspect(vk::Format::D16_UNORM), vk::ImageAspectFlags::DEPTH);
    }
}
