//! Device-local images, their views and samplers
//!
//! Textures here are render targets that are later sampled: every texture is
//! created with `SAMPLED` usage on top of the attachment usage it was asked for.

use ash::{vk, Device};

use crate::render::backends::vulkan::resources::buffer::find_memory_type;
use crate::render::backends::vulkan::state::framebuffer::depth_aspect;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Raw image, memory and view triple
///
/// Destroyed explicitly by its owner through [`ImageAllocation::destroy`].
pub(crate) struct ImageAllocation {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
}

impl ImageAllocation {
    pub fn destroy(&self, device: &Device) {
        unsafe {
            device.destroy_image_view(self.view, None);
            device.destroy_image(self.image, None);
            device.free_memory(self.memory, None);
        }
    }
}

/// Create a 2D optimal-tiling device-local image with a matching view
pub(crate) fn allocate_image(
    device: &Device,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    extent: vk::Extent2D,
    format: vk::Format,
    usage: vk::ImageUsageFlags,
    aspect: vk::ImageAspectFlags,
) -> VulkanResult<ImageAllocation> {
    let image_create_info = vk::ImageCreateInfo::builder()
        .image_type(vk::ImageType::TYPE_2D)
        .extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .format(format)
        .tiling(vk::ImageTiling::OPTIMAL)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .samples(vk::SampleCountFlags::TYPE_1);

    let image = unsafe { device.create_image(&image_create_info, None).map_err(VulkanError::Api)? };

    let memory_requirements = unsafe { device.get_image_memory_requirements(image) };
    let memory = find_memory_type(
        memory_properties,
        memory_requirements.memory_type_bits,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )
    .and_then(|memory_type_index| {
        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(memory_requirements.size)
            .memory_type_index(memory_type_index);
        unsafe { device.allocate_memory(&alloc_info, None).map_err(VulkanError::Api) }
    });
    let memory = match memory {
        Ok(memory) => memory,
        Err(e) => {
            unsafe { device.destroy_image(image, None) };
            return Err(e);
        }
    };

    let view = unsafe {
        device.bind_image_memory(image, memory, 0).map_err(VulkanError::Api).and_then(|()| {
            let view_create_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: aspect,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            device.create_image_view(&view_create_info, None).map_err(VulkanError::Api)
        })
    };

    match view {
        Ok(view) => Ok(ImageAllocation { image, memory, view }),
        Err(e) => {
            unsafe {
                device.destroy_image(image, None);
                device.free_memory(memory, None);
            }
            Err(e)
        }
    }
}

/// Aspect and attachment layout implied by a texture's usage
///
/// Exactly one of `COLOR_ATTACHMENT` and `DEPTH_STENCIL_ATTACHMENT` must be set.
pub fn texture_aspect(
    format: vk::Format,
    usage: vk::ImageUsageFlags,
) -> VulkanResult<(vk::ImageAspectFlags, vk::ImageLayout)> {
    let color = usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT);
    let depth = usage.contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT);

    match (color, depth) {
        (true, false) => Ok((
            vk::ImageAspectFlags::COLOR,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        )),
        (false, true) => Ok((
            depth_aspect(format),
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )),
        _ => Err(VulkanError::UnsupportedTextureUsage(usage)),
    }
}

/// Depth formats tried in order of preference
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 5] = [
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D32_SFLOAT,
    vk::Format::D24_UNORM_S8_UINT,
    vk::Format::D16_UNORM_S8_UINT,
    vk::Format::D16_UNORM,
];

/// Features a depth texture needs: attachment use plus the `SAMPLED` usage
/// every [`Texture`] carries
pub const DEPTH_FORMAT_FEATURES: vk::FormatFeatureFlags = vk::FormatFeatureFlags::from_raw(
    vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT.as_raw()
        | vk::FormatFeatureFlags::SAMPLED_IMAGE.as_raw(),
);

/// First candidate depth format usable as an optimal-tiling, sampled attachment
pub fn pick_depth_format(query: impl Fn(vk::Format) -> vk::FormatProperties) -> Option<vk::Format> {
    DEPTH_FORMAT_CANDIDATES
        .iter()
        .copied()
        .find(|&format| query(format).optimal_tiling_features.contains(DEPTH_FORMAT_FEATURES))
}

/// Render target texture
pub struct Texture {
    device: Device,
    allocation: ImageAllocation,
    format: vk::Format,
    extent: vk::Extent2D,
    aspect: vk::ImageAspectFlags,
    attachment_layout: vk::ImageLayout,
}

impl Texture {
    /// Create a texture usable as an attachment and as a sampled image
    pub fn new(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> VulkanResult<Self> {
        let (aspect, attachment_layout) = texture_aspect(format, usage)?;
        let allocation = allocate_image(
            &device,
            memory_properties,
            extent,
            format,
            usage | vk::ImageUsageFlags::SAMPLED,
            aspect,
        )?;

        log::debug!(
            "Created {}x{} {:?} texture ({:?})",
            extent.width,
            extent.height,
            format,
            aspect
        );

        Ok(Self {
            device,
            allocation,
            format,
            extent,
            aspect,
            attachment_layout,
        })
    }

    /// Image handle
    pub fn image(&self) -> vk::Image {
        self.allocation.image
    }

    /// View handle
    pub fn image_view(&self) -> vk::ImageView {
        self.allocation.view
    }

    /// Image format
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Image size
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Aspect covered by the view
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.aspect
    }

    /// Layout the texture is in while used as an attachment
    pub fn attachment_layout(&self) -> vk::ImageLayout {
        self.attachment_layout
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.allocation.destroy(&self.device);
    }
}

/// Sampler wrapper with RAII cleanup
pub struct Sampler {
    device: Device,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Nearest filtering, clamped to edge; reads G-buffer texels one to one
    pub fn new_nearest_clamp(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::NEAREST)
            .min_filter(vk::Filter::NEAREST)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .max_anisotropy(1.0)
            .border_color(vk::BorderColor::FLOAT_OPAQUE_BLACK)
            .compare_op(vk::CompareOp::ALWAYS)
            .min_lod(0.0)
            .max_lod(1.0);

        let sampler = unsafe {
            device
                .create_sampler(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, sampler })
    }

    /// Sampler handle
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_attachment_usage() {
        let usage = vk::ImageUsageFlags::COLOR_ATTACHMENT;
        let (aspect, layout) = texture_aspect(vk::Format::R8G8B8A8_UNORM, usage).unwrap();
        assert_eq!(aspect, vk::ImageAspectFlags::COLOR);
        assert_eq!(layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn test_depth_attachment_usage_with_stencil() {
        let usage = vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
        let (aspect, layout) = texture_aspect(vk::Format::D24_UNORM_S8_UINT, usage).unwrap();
        assert_eq!(aspect, vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL);
        assert_eq!(layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn test_depth_attachment_usage_without_stencil() {
        let usage = vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
        let (aspect, _) = texture_aspect(vk::Format::D32_SFLOAT, usage).unwrap();
        assert_eq!(aspect, vk::ImageAspectFlags::DEPTH);
    }

    #[test]
    fn test_usage_without_attachment_bit_is_rejected() {
        let result = texture_aspect(vk::Format::R8G8B8A8_UNORM, vk::ImageUsageFlags::SAMPLED);
        assert!(matches!(result, Err(VulkanError::UnsupportedTextureUsage(_))));
    }

    fn supports_only(supported: vk::Format) -> impl Fn(vk::Format) -> vk::FormatProperties {
        move |format| {
            let mut props = vk::FormatProperties::default();
            if format == supported {
                props.optimal_tiling_features = DEPTH_FORMAT_FEATURES;
            }
            props
        }
    }

    #[test]
    fn test_depth_format_falls_back_to_supported_candidate() {
        assert_eq!(
            pick_depth_format(supports_only(vk::Format::D16_UNORM)),
            Some(vk::Format::D16_UNORM)
        );
        assert_eq!(
            pick_depth_format(supports_only(vk::Format::D24_UNORM_S8_UINT)),
            Some(vk::Format::D24_UNORM_S8_UINT)
        );
    }

    #[test]
    fn test_depth_format_prefers_first_candidate() {
        let all = |_| vk::FormatProperties {
            optimal_tiling_features: DEPTH_FORMAT_FEATURES,
            ..Default::default()
        };
        assert_eq!(pick_depth_format(all), Some(vk::Format::D32_SFLOAT_S8_UINT));
    }

    #[test]
    fn test_depth_format_must_be_sampleable() {
        // Attachment-only on the preferred formats, sampleable from D24 down
        let query = |format: vk::Format| {
            let mut props = vk::FormatProperties {
                optimal_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                ..Default::default()
            };
            if format != vk::Format::D32_SFLOAT_S8_UINT && format != vk::Format::D32_SFLOAT {
                props.optimal_tiling_features |= vk::FormatFeatureFlags::SAMPLED_IMAGE;
            }
            props
        };
        assert_eq!(pick_depth_format(query), Some(vk::Format::D24_UNORM_S8_UINT));
    }

    #[test]
    fn test_no_depth_format_supported() {
        assert_eq!(pick_depth_format(|_| vk::FormatProperties::default()), None);
    }

    #[test]
    fn test_usage_with_both_attachment_bits_is_rejected() {
        let usage =
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
        assert!(texture_aspect(vk::Format::D32_SFLOAT, usage).is_err());
    }
}
