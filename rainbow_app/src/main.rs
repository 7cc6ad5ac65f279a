//! Rainbow viewer
//!
//! Opens a window, renders the default world until the window is closed and
//! exits with status 1 when initialization or a frame fails.

use rainbow_engine::core::RendererConfig;
use rainbow_engine::foundation::logging;
use rainbow_engine::render::{RenderError, Renderer, Window};

fn run() -> Result<(), RenderError> {
    let config = RendererConfig::default();
    log::info!("Starting {}", config.application_name);

    let mut window = Window::new(&config.window.title, config.window.width, config.window.height)?;
    let mut renderer = Renderer::init(&mut window, config)?;

    let result = renderer.run(&mut window);
    renderer.shutdown();
    result
}

fn main() {
    logging::init();

    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
    log::info!("Exiting");
}
