//! Vulkan device context
//!
//! Owns everything the frame loop needs that lives for the whole run: the
//! instance and debug messenger, the presentation surface, the physical and
//! logical device, the swapchain with its depth buffer, the main render pass,
//! one framebuffer and one primary command buffer per swapchain image, and the
//! frame synchronization objects.
//!
//! Bring-up happens in a fixed order inside [`DeviceContext::new`]; teardown is
//! the reverse of that order and falls out of field declaration order once
//! `Drop` has waited for the device to go idle.

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device, Entry, Instance};
use std::collections::HashSet;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use thiserror::Error;

use crate::core::RendererConfig;
use crate::render::backends::vulkan::initialization::surface::PresentationSurface;
use crate::render::backends::vulkan::rendering::commands::CommandPool;
use crate::render::backends::vulkan::rendering::render_pass::RenderPass;
use crate::render::backends::vulkan::state::framebuffer::{
    DepthBuffer, Framebuffer, MAIN_DEPTH_FORMAT,
};
use crate::render::backends::vulkan::state::swapchain::Swapchain;
use crate::render::backends::vulkan::state::sync::FrameSync;
use crate::render::window::Window;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No suitable memory type found for allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// The surface does not offer the required swapchain format
    #[error("Surface does not support {required:?}")]
    UnsupportedSurfaceFormat {
        /// Format the swapchain requires
        required: vk::Format,
    },

    /// Texture usage must name exactly one of colour or depth-stencil attachment
    #[error("Unsupported texture usage: {0:?}")]
    UnsupportedTextureUsage(vk::ImageUsageFlags),

    /// None of the candidate depth formats can be used as an attachment
    #[error("No supported depth format")]
    NoDepthFormat,

    /// A SPIR-V binary could not be read or is malformed
    #[error("Shader {path}: {reason}")]
    ShaderLoad {
        /// File that failed
        path: String,
        /// What went wrong
        reason: String,
    },
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

const VALIDATION_LAYER: &CStr =
    unsafe { CStr::from_bytes_with_nul_unchecked(b"VK_LAYER_KHRONOS_validation\0") };

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
    debug: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Create a new Vulkan instance, optionally with validation and a debug messenger
    pub fn new(window: &Window, app_name: &str, enable_validation: bool) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }.map_err(|e| {
            VulkanError::InitializationFailed(format!("Failed to load Vulkan: {:?}", e))
        })?;

        let app_name_cstr = CString::new(app_name).map_err(|_| {
            VulkanError::InitializationFailed("Application name contains a NUL byte".to_string())
        })?;
        let engine_name_cstr = CString::new("Rainbow").map_err(|_| {
            VulkanError::InitializationFailed("Engine name contains a NUL byte".to_string())
        })?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name_cstr)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let required_extensions = window.get_required_instance_extensions().map_err(|e| {
            VulkanError::InitializationFailed(format!("Failed to get required extensions: {}", e))
        })?;

        let mut extension_names = required_extensions
            .into_iter()
            .map(CString::new)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| {
                VulkanError::InitializationFailed("Extension name contains a NUL byte".to_string())
            })?;
        if enable_validation {
            extension_names.push(DebugUtils::name().to_owned());
        }
        let extensions: Vec<*const c_char> =
            extension_names.iter().map(|ext| ext.as_ptr()).collect();

        let layers: Vec<*const c_char> = if enable_validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            Vec::new()
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe {
            entry
                .create_instance(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        let debug = if enable_validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            match Self::setup_debug_messenger(&debug_utils) {
                Ok(messenger) => Some((debug_utils, messenger)),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        log::info!(
            "Created Vulkan instance for '{}' (validation {})",
            app_name,
            if enable_validation { "on" } else { "off" }
        );

        Ok(Self { entry, instance, debug })
    }

    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe {
            debug_utils
                .create_debug_utils_messenger(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Routes validation layer output into `log` by severity
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::INFO {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::trace!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// Pick the first graphics family and the first family that can present
///
/// The two may be the same family. `supports_present` is asked once per
/// family until a presenting family is found.
pub fn find_queue_families<F>(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: F,
) -> VulkanResult<(u32, u32)>
where
    F: FnMut(u32) -> VulkanResult<bool>,
{
    let mut graphics_family = None;
    let mut present_family = None;

    for (index, family) in families.iter().enumerate() {
        let index = index as u32;

        if graphics_family.is_none()
            && family.queue_count > 0
            && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        {
            graphics_family = Some(index);
        }
        if present_family.is_none() && family.queue_count > 0 && supports_present(index)? {
            present_family = Some(index);
        }
        if graphics_family.is_some() && present_family.is_some() {
            break;
        }
    }

    let graphics_family = graphics_family.ok_or_else(|| {
        VulkanError::InitializationFailed("No graphics queue family found".to_string())
    })?;
    let present_family = present_family.ok_or_else(|| {
        VulkanError::InitializationFailed("No present queue family found".to_string())
    })?;

    Ok((graphics_family, present_family))
}

/// The physical device in use and what was learned about it
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory heaps and types, cached for allocations
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Index of the graphics queue family
    pub graphics_family: u32,
    /// Index of the presentation queue family
    pub present_family: u32,
}

impl PhysicalDeviceInfo {
    /// Take the first enumerated physical device
    ///
    /// Every device is logged; no scoring is done.
    pub fn select_first(instance: &Instance, surface: &PresentationSurface) -> VulkanResult<Self> {
        let devices = unsafe { instance.enumerate_physical_devices().map_err(VulkanError::Api)? };

        for (index, &device) in devices.iter().enumerate() {
            let properties = unsafe { instance.get_physical_device_properties(device) };
            log::info!("Physical device {}: {}", index, device_name(&properties));
        }

        let device = *devices.first().ok_or_else(|| {
            VulkanError::InitializationFailed("No Vulkan physical devices found".to_string())
        })?;

        let properties = unsafe { instance.get_physical_device_properties(device) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(device) };

        let (graphics_family, present_family) =
            find_queue_families(&queue_families, |index| surface.supports_present(device, index))?;

        log::info!(
            "Selected GPU: {} (graphics family {}, present family {})",
            device_name(&properties),
            graphics_family,
            present_family
        );

        Ok(Self {
            device,
            properties,
            memory_properties,
            graphics_family,
            present_family,
        })
    }

    /// Human readable device name
    pub fn name(&self) -> String {
        device_name(&self.properties)
    }
}

fn device_name(properties: &vk::PhysicalDeviceProperties) -> String {
    unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// Graphics operations queue
    pub graphics_queue: vk::Queue,
    /// Surface presentation queue
    pub present_queue: vk::Queue,
    /// Swapchain extension loader
    pub swapchain_loader: SwapchainLoader,
}

impl LogicalDevice {
    /// Create the logical device with one queue per distinct family
    pub fn new(
        instance: &Instance,
        physical_device_info: &PhysicalDeviceInfo,
    ) -> VulkanResult<Self> {
        let unique_families: HashSet<u32> = [
            physical_device_info.graphics_family,
            physical_device_info.present_family,
        ]
        .into_iter()
        .collect();

        let priorities = [1.0];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let required_extensions = [SwapchainLoader::name().as_ptr()];

        let device_features = vk::PhysicalDeviceFeatures::builder()
            .sampler_anisotropy(true)
            .build();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&required_extensions)
            .enabled_features(&device_features);

        let device = unsafe {
            instance
                .create_device(physical_device_info.device, &create_info, None)
                .map_err(VulkanError::Api)?
        };

        let graphics_queue =
            unsafe { device.get_device_queue(physical_device_info.graphics_family, 0) };
        let present_queue =
            unsafe { device.get_device_queue(physical_device_info.present_family, 0) };
        let swapchain_loader = SwapchainLoader::new(instance, &device);

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            swapchain_loader,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

/// Every long-lived Vulkan object of the renderer
///
/// Fields are declared in reverse creation order so they drop in reverse
/// creation order.
pub struct DeviceContext {
    frame_sync: FrameSync,
    command_buffers: Vec<vk::CommandBuffer>,
    command_pool: CommandPool,
    framebuffers: Vec<Framebuffer>,
    render_pass: RenderPass,
    depth_buffer: DepthBuffer,
    swapchain: Swapchain,
    device: LogicalDevice,
    physical_device: PhysicalDeviceInfo,
    surface: PresentationSurface,
    instance: VulkanInstance,
}

impl DeviceContext {
    /// Bring up Vulkan for the window
    pub fn new(window: &mut Window, config: &RendererConfig) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(
            window,
            &config.application_name,
            config.validation_enabled(),
        )?;

        let surface_handle = window
            .create_vulkan_surface(instance.instance.handle())
            .map_err(|e| VulkanError::InitializationFailed(format!("Surface creation: {}", e)))?;
        let surface = PresentationSurface::new(&instance.entry, &instance.instance, surface_handle);

        let physical_device = PhysicalDeviceInfo::select_first(&instance.instance, &surface)?;
        let device = LogicalDevice::new(&instance.instance, &physical_device)?;
        let raw = device.device.clone();

        let (width, height) = window.get_framebuffer_size();
        let swapchain = Swapchain::new(
            raw.clone(),
            device.swapchain_loader.clone(),
            &surface,
            &physical_device,
            vk::Extent2D { width, height },
        )?;
        let extent = swapchain.extent();

        let depth_buffer = DepthBuffer::new(
            raw.clone(),
            &physical_device.memory_properties,
            extent,
            MAIN_DEPTH_FORMAT,
        )?;
        let render_pass = RenderPass::new_main_pass(
            raw.clone(),
            swapchain.format().format,
            depth_buffer.format(),
        )?;

        let framebuffers = swapchain
            .image_views()
            .iter()
            .map(|&view| {
                let attachments = [view, depth_buffer.image_view()];
                Framebuffer::new(raw.clone(), render_pass.handle(), &attachments, extent)
            })
            .collect::<VulkanResult<Vec<_>>>()?;

        let command_pool = CommandPool::new(raw.clone(), physical_device.graphics_family)?;
        let command_buffers = command_pool.allocate_command_buffers(
            vk::CommandBufferLevel::PRIMARY,
            swapchain.image_count() as u32,
        )?;

        let frame_sync = FrameSync::new(raw, swapchain.image_count())?;

        log::info!(
            "Device context ready: {} swapchain images at {}x{}",
            swapchain.image_count(),
            extent.width,
            extent.height
        );

        Ok(Self {
            frame_sync,
            command_buffers,
            command_pool,
            framebuffers,
            render_pass,
            depth_buffer,
            swapchain,
            device,
            physical_device,
            surface,
            instance,
        })
    }

    /// Vulkan instance
    pub fn instance(&self) -> &Instance {
        &self.instance.instance
    }

    /// Logical device
    pub fn device(&self) -> &Device {
        &self.device.device
    }

    /// Physical device handle
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device.device
    }

    /// Name of the physical device in use
    pub fn device_name(&self) -> String {
        self.physical_device.name()
    }

    /// Memory heaps and types of the physical device
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.physical_device.memory_properties
    }

    /// Graphics queue
    pub fn graphics_queue(&self) -> vk::Queue {
        self.device.graphics_queue
    }

    /// Present queue
    pub fn present_queue(&self) -> vk::Queue {
        self.device.present_queue
    }

    /// Graphics queue family index
    pub fn graphics_family(&self) -> u32 {
        self.physical_device.graphics_family
    }

    /// Present queue family index
    pub fn present_family(&self) -> u32 {
        self.physical_device.present_family
    }

    /// Presentation surface
    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface.handle()
    }

    /// Swapchain
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// Number of swapchain images, which is also the number of frames
    pub fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    /// Extent every frame renders at
    pub fn viewport_extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Format of the main depth buffer
    pub fn depth_format(&self) -> vk::Format {
        self.depth_buffer.format()
    }

    /// Main render pass
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.handle()
    }

    /// Framebuffer of one swapchain image
    pub fn framebuffer(&self, index: usize) -> Option<vk::Framebuffer> {
        self.framebuffers.get(index).map(Framebuffer::handle)
    }

    /// Number of framebuffers
    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    /// Per-frame primary command buffers
    pub fn command_buffers(&self) -> &[vk::CommandBuffer] {
        &self.command_buffers
    }

    /// Shared command pool on the graphics family
    pub fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }

    /// Frame semaphores and fences
    pub fn frame_sync(&self) -> &FrameSync {
        &self.frame_sync
    }

    /// Block until the device has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device.device_wait_idle().map_err(VulkanError::Api) }
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        if let Err(e) = self.wait_idle() {
            log::error!("Device wait idle failed during teardown: {}", e);
        }
        self.command_pool.free_command_buffers(&self.command_buffers);
        self.command_buffers.clear();
        log::info!("Destroying device context");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_same_family_for_graphics_and_present() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)];
        assert_eq!(find_queue_families(&families, |_| Ok(true)).unwrap(), (0, 0));
    }

    #[test]
    fn test_separate_present_family() {
        let families = [family(vk::QueueFlags::GRAPHICS), family(vk::QueueFlags::TRANSFER)];
        let found = find_queue_families(&families, |index| Ok(index == 1)).unwrap();
        assert_eq!(found, (0, 1));
    }

    #[test]
    fn test_missing_graphics_family_fails() {
        let families = [family(vk::QueueFlags::COMPUTE)];
        assert!(matches!(
            find_queue_families(&families, |_| Ok(true)),
            Err(VulkanError::InitializationFailed(_))
        ));
    }

    #[test]
    fn test_present_query_errors_propagate() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let result = find_queue_families(&families, |_| {
            Err(VulkanError::Api(vk::Result::ERROR_SURFACE_LOST_KHR))
        });
        assert!(matches!(result, Err(VulkanError::Api(vk::Result::ERROR_SURFACE_LOST_KHR))));
    }
}
