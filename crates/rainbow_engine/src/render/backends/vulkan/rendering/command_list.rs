//! Per-frame command recording and submission
//!
//! A [`CommandList`] is built once from a shared [`DeviceContext`] and rebound
//! to a new frame by every [`CommandList::acquire_next_image`]. It also carries
//! the resource helpers that need a queue round trip (buffer uploads) or the
//! shared command pool.
//!
//! Per frame:
//! ```text
//! acquire_next_image ─▶ reset/begin ─▶ begin_render_pass ─▶ ... ─▶ end_render_pass
//!        ─▶ end_command_buffer ─▶ queue_submit ─▶ queue_present
//! ```

use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;

use crate::render::backends::vulkan::resources::buffer::{Buffer, UploadLayout, VertexBuffer};
use crate::render::backends::vulkan::resources::descriptor_set::layout_binding;
use crate::render::backends::vulkan::resources::texture::{pick_depth_format, Texture};
use crate::render::backends::vulkan::state::sync::FrameTracker;
use crate::render::backends::vulkan::{DeviceContext, VulkanError, VulkanResult};

/// Recording state of the frame currently bound to the list
pub struct CommandList {
    context: Arc<DeviceContext>,
    frames: FrameTracker,
    frame_index: usize,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
}

impl CommandList {
    /// Bind to `context`; nothing is recorded until an image is acquired
    pub fn new(context: Arc<DeviceContext>) -> Self {
        let frames = FrameTracker::new(context.image_count());
        let command_buffer = context.command_buffers().first().copied().unwrap_or_default();
        let image = context.swapchain().images().first().copied().unwrap_or_default();

        Self {
            context,
            frames,
            frame_index: 0,
            command_buffer,
            image,
        }
    }

    /// Acquire the next swapchain image and make its frame current
    ///
    /// Blocks until the image is available and until the frame's previous
    /// submission has finished, then resets that frame's fence.
    pub fn acquire_next_image(&mut self) -> VulkanResult<usize> {
        let sync = self.context.frame_sync();
        let index = self
            .context
            .swapchain()
            .acquire_next_image(sync.image_available.handle())? as usize;

        let fence = sync.fence(index)?;
        fence.wait(u64::MAX)?;
        fence.reset()?;
        self.frames.begin_frame(index)?;

        let (command_buffer, image) = frame_handles(
            self.context.command_buffers(),
            self.context.swapchain().images(),
            index,
        )?;
        self.command_buffer = command_buffer;
        self.image = image;
        self.frame_index = index;

        Ok(index)
    }

    /// Reset the current command buffer
    pub fn reset_command_buffer(&self) -> VulkanResult<()> {
        unsafe {
            self.context
                .device()
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(VulkanError::Api)
        }
    }

    /// Begin recording the current command buffer
    pub fn begin_command_buffer(&self) -> VulkanResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE);
        unsafe {
            self.context
                .device()
                .begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(VulkanError::Api)
        }
    }

    /// Finish recording the current command buffer
    pub fn end_command_buffer(&self) -> VulkanResult<()> {
        unsafe {
            self.context
                .device()
                .end_command_buffer(self.command_buffer)
                .map_err(VulkanError::Api)
        }
    }

    /// Begin the main render pass on the current framebuffer
    pub fn begin_render_pass(
        &self,
        clear_color: [f32; 4],
        clear_depth: f32,
        clear_stencil: u32,
    ) -> VulkanResult<()> {
        let framebuffer = self
            .context
            .framebuffer(self.frame_index)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("No framebuffer for frame {}", self.frame_index),
            })?;

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue { float32: clear_color },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: clear_depth,
                    stencil: clear_stencil,
                },
            },
        ];

        let render_pass_begin = vk::RenderPassBeginInfo::builder()
            .render_pass(self.context.render_pass())
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.context.viewport_extent(),
            })
            .clear_values(&clear_values);

        unsafe {
            self.context.device().cmd_begin_render_pass(
                self.command_buffer,
                &render_pass_begin,
                vk::SubpassContents::INLINE,
            );
        }
        Ok(())
    }

    /// End the main render pass
    pub fn end_render_pass(&self) {
        unsafe {
            self.context.device().cmd_end_render_pass(self.command_buffer);
        }
    }

    /// Dynamic viewport covering `width` x `height`
    pub fn set_viewport(&self, width: u32, height: u32) {
        record_viewport(self.context.device(), self.command_buffer, width, height);
    }

    /// Dynamic scissor covering `width` x `height`
    pub fn set_scissor(&self, width: u32, height: u32) {
        record_scissor(self.context.device(), self.command_buffer, width, height);
    }

    /// Submit the current command buffer
    ///
    /// Waits for the acquired image, signals render-finished and the frame fence.
    pub fn queue_submit(&mut self) -> VulkanResult<()> {
        self.queue_submit_after(&[])
    }

    /// Same as [`CommandList::queue_submit`], additionally waiting on `extra_waits`
    pub fn queue_submit_after(
        &mut self,
        extra_waits: &[(vk::Semaphore, vk::PipelineStageFlags)],
    ) -> VulkanResult<()> {
        let sync = self.context.frame_sync();

        let mut wait_semaphores = vec![sync.image_available.handle()];
        let mut wait_stages = vec![
            vk::PipelineStageFlags::TRANSFER | vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ];
        for &(semaphore, stage) in extra_waits {
            wait_semaphores.push(semaphore);
            wait_stages.push(stage);
        }

        let command_buffers = [self.command_buffer];
        let signal_semaphores = [sync.render_finished.handle()];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        // The ledger refuses a frame whose fence was not waited on at acquire
        self.frames.mark_submitted(self.frame_index)?;

        let fence = sync.fence(self.frame_index)?;
        unsafe {
            self.context
                .device()
                .queue_submit(self.context.graphics_queue(), &[submit_info], fence.handle())
                .map_err(VulkanError::Api)
        }
    }

    /// Present the current image and wait for the present queue to drain
    pub fn queue_present(&self) -> VulkanResult<()> {
        let render_finished = self.context.frame_sync().render_finished.handle();
        self.context
            .swapchain()
            .present(self.context.present_queue(), render_finished, self.frame_index as u32)?;

        unsafe {
            self.context
                .device()
                .queue_wait_idle(self.context.present_queue())
                .map_err(VulkanError::Api)
        }
    }

    /// Upload a mesh into device-local vertex and index buffers
    pub fn create_vertex_buffer<V: Pod>(
        &self,
        vertices: &[V],
        indices: &[u32],
    ) -> VulkanResult<VertexBuffer> {
        let layout = UploadLayout::of(vertices, indices)?;

        let vertex_buffer =
            self.upload(vertices, layout.vertex_bytes, vk::BufferUsageFlags::VERTEX_BUFFER)?;
        let index_buffer =
            self.upload(indices, layout.index_bytes, vk::BufferUsageFlags::INDEX_BUFFER)?;

        log::debug!(
            "Uploaded mesh: {} vertices, {} indices",
            layout.vertex_count,
            layout.index_count
        );

        Ok(VertexBuffer::from_parts(vertex_buffer, index_buffer, layout))
    }

    /// Staging buffer, copy into a device-local buffer, staging dropped on return
    fn upload<T: Pod>(
        &self,
        data: &[T],
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> VulkanResult<Buffer> {
        let staging = self.create_buffer(
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        staging.write_data(data)?;

        let buffer = self.create_buffer(
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        self.copy_buffer(&staging, &buffer, size)?;

        Ok(buffer)
    }

    /// Create a render target texture sized `width` x `height`
    pub fn create_texture(
        &self,
        width: u32,
        height: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> VulkanResult<Texture> {
        Texture::new(
            self.context.device().clone(),
            self.context.memory_properties(),
            vk::Extent2D { width, height },
            format,
            usage,
        )
    }

    /// Best depth format the device can render to, if any
    pub fn supported_depth_format(&self) -> Option<vk::Format> {
        let instance = self.context.instance();
        let physical_device = self.context.physical_device();
        pick_depth_format(|format| unsafe {
            instance.get_physical_device_format_properties(physical_device, format)
        })
    }

    /// Allocate one command buffer from the shared pool, optionally begun
    pub fn create_command_buffer(
        &self,
        level: vk::CommandBufferLevel,
        begin: bool,
    ) -> VulkanResult<vk::CommandBuffer> {
        let command_buffer = self
            .context
            .command_pool()
            .allocate_command_buffers(level, 1)?
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: "Command buffer allocation returned nothing".to_string(),
            })?;

        if begin {
            let begin_info = vk::CommandBufferBeginInfo::builder();
            let begun = unsafe {
                self.context
                    .device()
                    .begin_command_buffer(command_buffer, &begin_info)
                    .map_err(VulkanError::Api)
            };
            if let Err(e) = begun {
                self.free_command_buffer(command_buffer);
                return Err(e);
            }
        }

        Ok(command_buffer)
    }

    /// Return a command buffer to the shared pool
    pub fn free_command_buffer(&self, command_buffer: vk::CommandBuffer) {
        self.context.command_pool().free_command_buffers(&[command_buffer]);
    }

    /// Descriptor set layout binding helper
    pub fn descriptor_set_layout_binding(
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
        binding: u32,
        count: u32,
    ) -> vk::DescriptorSetLayoutBinding {
        layout_binding(descriptor_type, stage_flags, binding, count)
    }

    fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Buffer> {
        Buffer::new(
            self.context.device().clone(),
            self.context.memory_properties(),
            size,
            usage,
            properties,
        )
    }

    /// One-shot copy; blocks until the graphics queue is idle
    fn copy_buffer(&self, src: &Buffer, dst: &Buffer, size: vk::DeviceSize) -> VulkanResult<()> {
        let command_buffer = self.create_command_buffer(vk::CommandBufferLevel::PRIMARY, false)?;
        let result = self.record_and_submit_copy(command_buffer, src, dst, size);
        self.free_command_buffer(command_buffer);
        result
    }

    fn record_and_submit_copy(
        &self,
        command_buffer: vk::CommandBuffer,
        src: &Buffer,
        dst: &Buffer,
        size: vk::DeviceSize,
    ) -> VulkanResult<()> {
        let device = self.context.device();
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };

        unsafe {
            device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;
            device.cmd_copy_buffer(command_buffer, src.handle(), dst.handle(), &[region]);
            device.end_command_buffer(command_buffer).map_err(VulkanError::Api)?;

            let command_buffers = [command_buffer];
            let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers).build();
            device
                .queue_submit(self.context.graphics_queue(), &[submit_info], vk::Fence::null())
                .map_err(VulkanError::Api)?;
            device
                .queue_wait_idle(self.context.graphics_queue())
                .map_err(VulkanError::Api)
        }
    }

    /// Shared device context
    pub fn context(&self) -> &Arc<DeviceContext> {
        &self.context
    }

    /// Index of the current frame
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    /// Command buffer of the current frame
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// Swapchain image of the current frame
    pub fn image(&self) -> vk::Image {
        self.image
    }

    /// Frame ledger
    pub fn frames(&self) -> &FrameTracker {
        &self.frames
    }
}

/// Full-extent viewport with a 0..1 depth range
pub fn viewport(width: u32, height: u32) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: width as f32,
        height: height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Full-extent scissor rectangle
pub fn scissor(width: u32, height: u32) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent: vk::Extent2D { width, height },
    }
}

pub(crate) fn record_viewport(
    device: &ash::Device,
    command_buffer: vk::CommandBuffer,
    width: u32,
    height: u32,
) {
    unsafe {
        device.cmd_set_viewport(command_buffer, 0, &[viewport(width, height)]);
    }
}

pub(crate) fn record_scissor(
    device: &ash::Device,
    command_buffer: vk::CommandBuffer,
    width: u32,
    height: u32,
) {
    unsafe {
        device.cmd_set_scissor(command_buffer, 0, &[scissor(width, height)]);
    }
}

/// Command buffer and swapchain image belonging to frame `index`
pub(crate) fn frame_handles(
    command_buffers: &[vk::CommandBuffer],
    images: &[vk::Image],
    index: usize,
) -> VulkanResult<(vk::CommandBuffer, vk::Image)> {
    let command_buffer = command_buffers
        .get(index)
        .copied()
        .ok_or_else(|| VulkanError::InvalidOperation {
            reason: format!("No command buffer for frame {}", index),
        })?;
    let image = images
        .get(index)
        .copied()
        .ok_or_else(|| VulkanError::InvalidOperation {
            reason: format!("No swapchain image for frame {}", index),
        })?;
    Ok((command_buffer, image))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_viewport_covers_extent() {
        let vp = viewport(1920, 1080);
        assert_relative_eq!(vp.width, 1920.0);
        assert_relative_eq!(vp.height, 1080.0);
        assert_relative_eq!(vp.x, 0.0);
        assert_relative_eq!(vp.max_depth, 1.0);
    }

    #[test]
    fn test_scissor_covers_extent() {
        let rect = scissor(800, 600);
        assert_eq!(rect.offset, vk::Offset2D { x: 0, y: 0 });
        assert_eq!(rect.extent, vk::Extent2D { width: 800, height: 600 });
    }

    #[test]
    fn test_frame_handles_by_index() {
        use ash::vk::Handle;

        let command_buffers = [vk::CommandBuffer::from_raw(10), vk::CommandBuffer::from_raw(11)];
        let images = [vk::Image::from_raw(20), vk::Image::from_raw(21)];

        let (command_buffer, image) = frame_handles(&command_buffers, &images, 1).unwrap();
        assert_eq!(command_buffer.as_raw(), 11);
        assert_eq!(image.as_raw(), 21);
    }

    #[test]
    fn test_frame_without_image_is_an_error() {
        use ash::vk::Handle;

        let command_buffers = [vk::CommandBuffer::from_raw(10), vk::CommandBuffer::from_raw(11)];
        let images = [vk::Image::from_raw(20)];

        let result = frame_handles(&command_buffers, &images, 1);
        assert!(matches!(result, Err(VulkanError::InvalidOperation { .. })));
        assert!(frame_handles(&command_buffers, &images, 2).is_err());
    }

    #[test]
    fn test_layout_binding_helper() {
        let binding = CommandList::descriptor_set_layout_binding(
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            vk::ShaderStageFlags::FRAGMENT,
            3,
            2,
        );
        assert_eq!(binding.binding, 3);
        assert_eq!(binding.descriptor_count, 2);
        assert_eq!(binding.descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(binding.stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }
}
