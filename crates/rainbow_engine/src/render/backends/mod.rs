//! Graphics backends
//!
//! Vulkan is the only backend.

/// Vulkan rendering backend implementation
pub mod vulkan;
