//! Device integration tests
//!
//! Need a Vulkan device and a display. Run with `cargo test -- --ignored`.

use rainbow_engine::core::RendererConfig;
use rainbow_engine::render::backends::vulkan::{CommandList, DeviceContext, FrameState};
use rainbow_engine::render::Window;
use std::sync::Arc;

fn context() -> (Window, Arc<DeviceContext>) {
    let config = RendererConfig::default().with_window("Rainbow test", 640, 480);
    let window_config = &config.window;
    let mut window =
        Window::new(&window_config.title, window_config.width, window_config.height).unwrap();
    let context = DeviceContext::new(&mut window, &config).unwrap();
    (window, Arc::new(context))
}

#[test]
#[ignore = "requires a Vulkan device and a display"]
fn frame_resources_match_swapchain_image_count() {
    let (_window, context) = context();
    let images = context.image_count();

    assert!(images >= 2);
    assert_eq!(context.frame_sync().in_flight.len(), images);
    assert_eq!(context.framebuffer_count(), images);
    assert_eq!(context.command_buffers().len(), images);
}

#[test]
#[ignore = "requires a Vulkan device and a display"]
fn frames_cycle_through_submit_and_present() {
    let (_window, context) = context();
    let mut command_list = CommandList::new(Arc::clone(&context));
    let extent = context.viewport_extent();

    for _ in 0..(context.image_count() * 3) {
        let index = command_list.acquire_next_image().unwrap();
        assert_eq!(command_list.frames().state(index), Some(FrameState::Recording));

        command_list.reset_command_buffer().unwrap();
        command_list.begin_command_buffer().unwrap();
        command_list.begin_render_pass([0.0, 0.0, 0.0, 1.0], 1.0, 0).unwrap();
        command_list.set_viewport(extent.width, extent.height);
        command_list.set_scissor(extent.width, extent.height);
        command_list.end_render_pass();
        command_list.end_command_buffer().unwrap();
        command_list.queue_submit().unwrap();
        command_list.queue_present().unwrap();

        assert_eq!(command_list.frames().state(index), Some(FrameState::InFlight));
    }

    context.wait_idle().unwrap();
}

#[test]
#[ignore = "requires a Vulkan device and a display"]
fn uploaded_mesh_reports_counts() {
    let (_window, context) = context();
    let command_list = CommandList::new(Arc::clone(&context));

    let vertices = vec![rainbow_engine::render::StaticVertex::default(); 7];
    let indices: Vec<u32> = (0..12).map(|i| i % 7).collect();
    let mesh = command_list.create_vertex_buffer(&vertices, &indices).unwrap();

    assert_eq!(mesh.vertex_count(), 7);
    assert_eq!(mesh.index_count(), 12);
    drop(mesh);
    context.wait_idle().unwrap();
}
