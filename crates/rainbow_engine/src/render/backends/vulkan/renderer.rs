//! Frame loop driver
//!
//! [`Renderer`] owns the device context, the command list, the G-buffer and
//! the world, in that order of creation. [`Renderer::shutdown`] releases them
//! in the reverse order and is safe to call any number of times.

use std::sync::Arc;

use ash::vk;

use crate::core::RendererConfig;
use crate::render::backends::vulkan::{CommandList, DeviceContext, GBuffer};
use crate::render::window::Window;
use crate::render::RenderError;
use crate::scene::World;

/// Deferred renderer bound to one window
pub struct Renderer {
    world: Option<World>,
    gbuffer: Option<GBuffer>,
    command_list: Option<CommandList>,
    context: Option<Arc<DeviceContext>>,
    config: RendererConfig,
}

impl Renderer {
    /// Bring up Vulkan, the G-buffer and the default world
    pub fn init(window: &mut Window, config: RendererConfig) -> Result<Self, RenderError> {
        config.validate()?;

        let context = Arc::new(DeviceContext::new(window, &config)?);
        log::info!("Rendering on {}", context.device_name());

        let command_list = CommandList::new(Arc::clone(&context));
        let gbuffer = GBuffer::new(&command_list, &config.shaders)?;

        let mut renderer = Self {
            world: None,
            gbuffer: Some(gbuffer),
            command_list: Some(command_list),
            context: Some(context),
            config,
        };
        renderer.load_world()?;

        Ok(renderer)
    }

    fn load_world(&mut self) -> Result<(), RenderError> {
        let command_list = self.command_list.as_ref().ok_or_else(not_initialized)?;
        let content_dir = self.config.resolve_content_dir();

        let mut world = World::new();
        world.load_world(command_list, &content_dir, &self.config.mesh_file)?;
        log::info!("World {:?} loaded with {} actors", world.id(), world.actor_count());

        self.world = Some(world);
        Ok(())
    }

    /// Draw frames until the window asks to close
    pub fn run(&mut self, window: &mut Window) -> Result<(), RenderError> {
        while !window.poll_quit() {
            self.draw_frame()?;
        }
        log::info!("Close requested, leaving frame loop");
        Ok(())
    }

    /// Record, submit and present one frame
    pub fn draw_frame(&mut self) -> Result<(), RenderError> {
        let (Some(world), Some(gbuffer), Some(command_list), Some(context)) = (
            self.world.as_ref(),
            self.gbuffer.as_mut(),
            self.command_list.as_mut(),
            self.context.as_ref(),
        ) else {
            return Err(not_initialized());
        };

        let extent = context.viewport_extent();
        command_list.acquire_next_image()?;

        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let draws = world.render();
        gbuffer.record_geometry_pass(command_list, &draws, &world.view_projection(aspect))?;

        command_list.reset_command_buffer()?;
        command_list.begin_command_buffer()?;
        command_list.begin_render_pass(
            self.config.clear_color,
            self.config.clear_depth,
            self.config.clear_stencil,
        )?;
        command_list.set_viewport(extent.width, extent.height);
        command_list.set_scissor(extent.width, extent.height);
        command_list.end_render_pass();
        command_list.end_command_buffer()?;

        let geometry_done = gbuffer.submit_geometry_pass(command_list)?;
        let geometry_wait = (geometry_done, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        command_list.queue_submit_after(&[geometry_wait])?;
        command_list.queue_present()?;

        Ok(())
    }

    /// Wait for the GPU and release everything in reverse creation order
    ///
    /// Does nothing when already shut down.
    pub fn shutdown(&mut self) {
        let Some(context) = self.context.as_ref() else {
            return;
        };

        if let Err(e) = context.wait_idle() {
            log::error!("Device wait idle failed during shutdown: {}", e);
        }

        if let Some(mut world) = self.world.take() {
            world.clear();
        }
        drop(self.gbuffer.take());
        drop(self.command_list.take());

        // Last strong reference, so the device context drops here
        drop(self.context.take());
        log::info!("Renderer shut down");
    }

    /// Whether the renderer still holds its GPU objects
    pub fn is_initialized(&self) -> bool {
        self.context.is_some()
    }

    /// Scene being rendered
    pub fn world(&self) -> Option<&World> {
        self.world.as_ref()
    }

    /// Device context, while initialized
    pub fn context(&self) -> Option<&Arc<DeviceContext>> {
        self.context.as_ref()
    }

    /// Active configuration
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn not_initialized() -> RenderError {
    RenderError::Vulkan(crate::render::backends::vulkan::VulkanError::InvalidOperation {
        reason: "Renderer is not initialized".to_string(),
    })
}
