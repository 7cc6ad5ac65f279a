//! Swapchain management
//!
//! FIFO presentation of `B8G8R8A8_UNORM` images sized to the drawable,
//! clamped to what the surface allows.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

use crate::render::backends::vulkan::initialization::surface::{
    choose_image_count, choose_sharing_mode, choose_viewport_extent, select_surface_format,
    PresentationSurface,
};
use crate::render::backends::vulkan::{PhysicalDeviceInfo, VulkanError, VulkanResult};

/// Swapchain management wrapper with RAII cleanup
pub struct Swapchain {
    device: Device,
    swapchain_loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create the swapchain and one view per image
    pub fn new(
        device: Device,
        swapchain_loader: SwapchainLoader,
        surface: &PresentationSurface,
        physical_device_info: &PhysicalDeviceInfo,
        drawable: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let surface_caps = surface.capabilities(physical_device_info.device)?;
        let format = select_surface_format(&surface.formats(physical_device_info.device)?)?;
        let extent = choose_viewport_extent(drawable, &surface_caps);
        let image_count = choose_image_count(&surface_caps);
        let (sharing_mode, queue_families) = choose_sharing_mode(
            physical_device_info.graphics_family,
            physical_device_info.present_family,
        );

        log::debug!(
            "Creating swapchain: {:?}, {}x{}, {} images, {:?}",
            format.format,
            extent.width,
            extent.height,
            image_count,
            sharing_mode
        );

        let swapchain_create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.handle())
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(&queue_families)
            .pre_transform(surface_caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(vk::PresentModeKHR::FIFO)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let swapchain = unsafe {
            swapchain_loader
                .create_swapchain(&swapchain_create_info, None)
                .map_err(VulkanError::Api)?
        };

        // Owned from here so a failing view creation still destroys the swapchain
        let mut this = Self {
            device,
            swapchain_loader,
            swapchain,
            images: Vec::new(),
            image_views: Vec::new(),
            format,
            extent,
        };

        this.images = unsafe {
            this.swapchain_loader
                .get_swapchain_images(swapchain)
                .map_err(VulkanError::Api)?
        };

        for &image in &this.images {
            let create_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format.format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            let view = unsafe {
                this.device
                    .create_image_view(&create_info, None)
                    .map_err(VulkanError::Api)?
            };
            this.image_views.push(view);
        }

        Ok(this)
    }

    /// Acquire the next image, signalling `signal` once it is ready
    ///
    /// Blocks without a timeout.
    pub fn acquire_next_image(&self, signal: vk::Semaphore) -> VulkanResult<u32> {
        let (index, suboptimal) = unsafe {
            self.swapchain_loader
                .acquire_next_image(self.swapchain, u64::MAX, signal, vk::Fence::null())
                .map_err(VulkanError::Api)?
        };
        if suboptimal {
            log::debug!("Swapchain is suboptimal for the surface");
        }
        Ok(index)
    }

    /// Queue image `index` for presentation after `wait` is signalled
    pub fn present(&self, queue: vk::Queue, wait: vk::Semaphore, index: u32) -> VulkanResult<()> {
        let wait_semaphores = [wait];
        let swapchains = [self.swapchain];
        let image_indices = [index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe {
            self.swapchain_loader
                .queue_present(queue, &present_info)
                .map_err(VulkanError::Api)?;
        }
        Ok(())
    }

    /// Get swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Get swapchain surface format
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Swapchain images
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// One view per swapchain image
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Number of swapchain images
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Raw swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}
