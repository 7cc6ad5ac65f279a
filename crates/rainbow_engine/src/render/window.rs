//! GLFW presentation window
//!
//! The renderer only needs four things from the window: the instance
//! extensions required for presentation, a `VkSurfaceKHR`, the drawable size
//! and a quit signal. Escape or the close button raise the quit signal.

use ash::vk;
use thiserror::Error;

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    /// GLFW could not be initialised
    #[error("GLFW initialization failed")]
    InitializationFailed,

    /// The window could not be created
    #[error("Window creation failed")]
    CreationFailed,

    /// GLFW reported a Vulkan related failure
    #[error("GLFW error: {0}")]
    GlfwError(String),
}

/// Result type for window operations
pub type WindowResult<T> = Result<T, WindowError>;

/// GLFW window wrapper
pub struct Window {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
}

impl Window {
    /// Create a window without a client API so Vulkan can present to it
    pub fn new(title: &str, width: u32, height: u32) -> WindowResult<Self> {
        let mut glfw =
            glfw::init(glfw::fail_on_errors).map_err(|_| WindowError::InitializationFailed)?;

        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(false));

        let (mut window, events) = glfw
            .create_window(width, height, title, glfw::WindowMode::Windowed)
            .ok_or(WindowError::CreationFailed)?;

        window.set_key_polling(true);
        window.set_close_polling(true);

        log::info!("Created window '{}' ({}x{})", title, width, height);

        Ok(Self { glfw, window, events })
    }

    /// Whether a quit has been requested
    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// Pump pending events without blocking and report whether to quit
    pub fn poll_quit(&mut self) -> bool {
        self.glfw.poll_events();
        for (_, event) in glfw::flush_messages(&self.events) {
            match event {
                glfw::WindowEvent::Close
                | glfw::WindowEvent::Key(glfw::Key::Escape, _, glfw::Action::Press, _) => {
                    self.window.set_should_close(true);
                }
                _ => {}
            }
        }
        self.window.should_close()
    }

    /// Drawable size in pixels
    pub fn get_framebuffer_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (width.max(0) as u32, height.max(0) as u32)
    }

    /// Get required Vulkan instance extensions from GLFW
    pub fn get_required_instance_extensions(&self) -> WindowResult<Vec<String>> {
        self.glfw.get_required_instance_extensions().ok_or_else(|| {
            WindowError::GlfwError("Vulkan is not supported by this GLFW build".to_string())
        })
    }

    /// Create a Vulkan surface for this window
    pub fn create_vulkan_surface(
        &mut self,
        instance: vk::Instance,
    ) -> WindowResult<vk::SurfaceKHR> {
        let mut surface = vk::SurfaceKHR::null();
        let result = self.window.create_window_surface(instance, std::ptr::null(), &mut surface);

        if result == vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(WindowError::GlfwError(format!("Failed to create Vulkan surface: {:?}", result)))
        }
    }
}
