//! # Rainbow Engine
//!
//! A minimal Vulkan deferred renderer: device bring-up, a per-frame command
//! list, a geometry buffer with its geometry pass, and a flat actor world fed
//! from OBJ meshes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rainbow_engine::prelude::*;
//!
//! fn main() -> Result<(), RenderError> {
//!     logging::init();
//!     let config = RendererConfig::default();
//!     let (width, height) = (config.window.width, config.window.height);
//!     let mut window = Window::new(&config.window.title, width, height)?;
//!     let mut renderer = Renderer::init(&mut window, config)?;
//!     renderer.run(&mut window)?;
//!     renderer.shutdown();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod core;

pub mod assets;
pub mod config;
pub mod foundation;
pub mod render;
pub mod scene;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        assets::{ImportError, MeshImporter},
        core::{Config, RendererConfig, ShaderConfig, WindowConfig},
        foundation::{
            logging,
            math::{Mat4, Quat, Transform, Vec3},
        },
        render::{RenderError, Renderer, StaticVertex, VulkanError, Window},
        scene::{Actor, ActorKind, Camera, World},
    };
}
