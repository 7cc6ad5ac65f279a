//! Vulkan resource management
//!
//! Buffers, render target textures, descriptor layouts and the keyed table
//! uploaded meshes live in.

/// Buffers and memory type selection
pub mod buffer;

/// Render target textures and samplers
pub mod texture;

/// Descriptor set layouts
pub mod descriptor_set;

/// Generational resource storage
pub mod resource_table;

pub use buffer::{Buffer, UploadLayout, VertexBuffer};
pub use descriptor_set::{layout_binding, DescriptorSetLayout, DescriptorSetLayoutBuilder};
pub use resource_table::{MeshKey, ResourceTable};
pub use texture::{pick_depth_format, texture_aspect, Sampler, Texture};
