//! Vulkan backend implementation
//!
//! Organized into initialization, resources, rendering and state modules, with
//! the G-buffer and the frame-loop renderer on top.

/// Instance, surface, devices and the device context
pub mod initialization;

/// Buffers, textures, descriptor layouts and resource tables
pub mod resources;

/// Render passes, command recording, shaders and pipelines
pub mod rendering;

/// Swapchain, framebuffers and synchronization
pub mod state;

/// Deferred shading geometry buffer
pub mod gbuffer;

/// Frame loop driver
pub mod renderer;

pub use gbuffer::{DrawSubmission, GBuffer};
pub use initialization::{
    DeviceContext, PhysicalDeviceInfo, PresentationSurface, VulkanError, VulkanResult,
};
pub use renderer::Renderer;
pub use rendering::{
    CommandList, CommandPool, GraphicsPipeline, PipelineLayout, RenderPass, ShaderModule,
};
pub use resources::{Buffer, MeshKey, ResourceTable, Texture, VertexBuffer};
pub use state::{Fence, FrameState, FrameSync, FrameTracker, Semaphore, Swapchain};
