//! Vulkan rendering components: render passes, commands, shaders and pipelines

pub mod command_list;
pub mod commands;
pub mod render_pass;
pub mod shader;
pub mod vertex_layout;

pub use command_list::CommandList;
pub use commands::CommandPool;
pub use render_pass::RenderPass;
pub use shader::{GraphicsPipeline, PipelineLayout, ShaderModule};
pub use vertex_layout::VulkanVertexLayout;
