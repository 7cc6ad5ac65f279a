//! # Rendering System
//!
//! Window, vertex formats and the Vulkan backend. [`RenderError`] is the
//! umbrella error every fallible renderer entry point returns.

pub mod backends;
pub mod vertex;
pub mod window;

pub use backends::vulkan::{
    CommandList, DeviceContext, DrawSubmission, GBuffer, Renderer, Texture, VertexBuffer,
    VulkanError, VulkanResult,
};
pub use vertex::StaticVertex;
pub use window::{Window, WindowError};

use crate::assets::ImportError;
use crate::config::ConfigError;
use thiserror::Error;

/// Errors surfaced by the renderer and the scene layer
#[derive(Error, Debug)]
pub enum RenderError {
    /// Window or surface creation failed
    #[error("Window error: {0}")]
    Window(#[from] WindowError),

    /// A Vulkan call or resource operation failed
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] VulkanError),

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A mesh could not be imported
    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    /// A scene operation was applied to the wrong kind of actor
    #[error("Scene error: {0}")]
    Scene(String),
}
