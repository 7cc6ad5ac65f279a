//! # Core Engine Module
//!
//! Shared configuration consumed by the renderer and the scene layer.

pub mod config;

pub use config::{Config, ConfigError, RendererConfig, ShaderConfig, WindowConfig};
