//! Deferred shading geometry buffer
//!
//! Holds the albedo, normal and material targets plus depth, the render pass
//! and framebuffer writing them, the sampler and descriptor set layout a
//! composition pass reads them through, and the geometry pass itself.
//!
//! The geometry pass records into its own command buffer and signals its own
//! semaphore; the frame's main submission waits on that semaphore.

use std::sync::Arc;

use ash::vk;

use crate::core::ShaderConfig;
use crate::foundation::math::Mat4;
use crate::render::backends::vulkan::rendering::command_list::{record_scissor, record_viewport};
use crate::render::backends::vulkan::rendering::{
    CommandList, GraphicsPipeline, PipelineLayout, RenderPass, ShaderModule,
};
use crate::render::backends::vulkan::resources::{
    DescriptorSetLayout, DescriptorSetLayoutBuilder, Sampler, Texture,
};
use crate::render::backends::vulkan::state::{Fence, Framebuffer, Semaphore};
use crate::render::backends::vulkan::{DeviceContext, VulkanError, VulkanResult};

/// Albedo target format
pub const ALBEDO_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
/// World-space normal target format
pub const NORMAL_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
/// Material parameter target format
pub const MATERIAL_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Size of the per-draw push constant block: one `mat4`
pub const PUSH_CONSTANT_SIZE: u32 = std::mem::size_of::<[f32; 16]>() as u32;

/// One indexed draw of the geometry pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawSubmission {
    /// Vertex buffer bound at binding 0
    pub vertex_buffer: vk::Buffer,
    /// `u32` index buffer
    pub index_buffer: vk::Buffer,
    /// Number of indices to draw
    pub index_count: u32,
    /// Model matrix of the drawn actor
    pub transform: Mat4,
}

/// Command buffer, semaphore and fence of the geometry pass
struct GeometrySync {
    command_buffer: vk::CommandBuffer,
    finished: Semaphore,
    fence: Fence,
}

/// Geometry buffer of the deferred pipeline
pub struct GBuffer {
    geometry: Option<GeometrySync>,
    pipeline: Option<GraphicsPipeline>,
    pipeline_layout: PipelineLayout,
    descriptor_set_layout: DescriptorSetLayout,
    sampler: Sampler,
    framebuffer: Framebuffer,
    render_pass: RenderPass,
    depth: Texture,
    material: Texture,
    normal: Texture,
    albedo: Texture,
    extent: vk::Extent2D,
    context: Arc<DeviceContext>,
}

impl GBuffer {
    /// Create the targets and pass objects at the viewport extent
    ///
    /// The geometry pipeline is only built when both shader binaries exist;
    /// without it the pass still clears every target.
    pub fn new(command_list: &CommandList, shaders: &ShaderConfig) -> VulkanResult<Self> {
        let context = Arc::clone(command_list.context());
        let device = context.device().clone();
        let extent = context.viewport_extent();

        let (width, height) = (extent.width, extent.height);
        let color_usage = vk::ImageUsageFlags::COLOR_ATTACHMENT;
        let albedo = command_list.create_texture(width, height, ALBEDO_FORMAT, color_usage)?;
        let normal = command_list.create_texture(width, height, NORMAL_FORMAT, color_usage)?;
        let material = command_list.create_texture(width, height, MATERIAL_FORMAT, color_usage)?;

        let depth_format = command_list.supported_depth_format().ok_or(VulkanError::NoDepthFormat)?;
        let depth = command_list.create_texture(
            width,
            height,
            depth_format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        )?;

        let render_pass = RenderPass::new_gbuffer_pass(
            device.clone(),
            [ALBEDO_FORMAT, NORMAL_FORMAT, MATERIAL_FORMAT],
            depth_format,
        )?;

        let attachments = [
            albedo.image_view(),
            normal.image_view(),
            material.image_view(),
            depth.image_view(),
        ];
        let framebuffer =
            Framebuffer::new(device.clone(), render_pass.handle(), &attachments, extent)?;

        let sampler = Sampler::new_nearest_clamp(device.clone())?;

        let descriptor_set_layout = gbuffer_set_layout().build(&device)?;

        let push_constant_ranges = [vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX,
            offset: 0,
            size: PUSH_CONSTANT_SIZE,
        }];
        let pipeline_layout = PipelineLayout::new(
            device.clone(),
            &[descriptor_set_layout.handle()],
            &push_constant_ranges,
        )?;

        let pipeline = if shaders.exists() {
            let vertex = ShaderModule::from_file(&device, &shaders.vertex_shader_path)?;
            let fragment = ShaderModule::from_file(&device, &shaders.fragment_shader_path)?;
            Some(GraphicsPipeline::new_geometry(
                &device,
                render_pass.handle(),
                &vertex,
                &fragment,
                pipeline_layout.handle(),
                render_pass.color_attachment_count(),
            )?)
        } else {
            log::warn!(
                "Geometry shaders not found ({}, {}); the G-buffer pass will only clear",
                shaders.vertex_shader_path,
                shaders.fragment_shader_path
            );
            None
        };

        log::info!(
            "G-buffer ready: {}x{}, depth {:?}, pipeline {}",
            extent.width,
            extent.height,
            depth_format,
            if pipeline.is_some() { "built" } else { "absent" }
        );

        Ok(Self {
            geometry: None,
            pipeline,
            pipeline_layout,
            descriptor_set_layout,
            sampler,
            framebuffer,
            render_pass,
            depth,
            material,
            normal,
            albedo,
            extent,
            context,
        })
    }

    /// Record the geometry pass for `draws`
    ///
    /// Allocates the pass's command buffer, semaphore and fence on first use,
    /// and waits for the previous geometry submission before re-recording.
    pub fn record_geometry_pass(
        &mut self,
        command_list: &CommandList,
        draws: &[DrawSubmission],
        view_projection: &Mat4,
    ) -> VulkanResult<()> {
        let command_buffer = self.geometry_sync(command_list)?.command_buffer;
        if let Some(sync) = &self.geometry {
            sync.fence.wait(u64::MAX)?;
        }

        let device = self.context.device();
        let begin_info = vk::CommandBufferBeginInfo::builder();
        unsafe {
            device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(VulkanError::Api)?;
            device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }

        let clear_values = gbuffer_clear_values();
        let render_pass_begin = vk::RenderPassBeginInfo::builder()
            .render_pass(self.render_pass.handle())
            .framebuffer(self.framebuffer.handle())
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.extent,
            })
            .clear_values(&clear_values);

        unsafe {
            device.cmd_begin_render_pass(
                command_buffer,
                &render_pass_begin,
                vk::SubpassContents::INLINE,
            );
        }
        record_viewport(device, command_buffer, self.extent.width, self.extent.height);
        record_scissor(device, command_buffer, self.extent.width, self.extent.height);

        if let Some(pipeline) = &self.pipeline {
            unsafe {
                device.cmd_bind_pipeline(
                    command_buffer,
                    vk::PipelineBindPoint::GRAPHICS,
                    pipeline.handle(),
                );
                for draw in draws {
                    let model_view_projection = view_projection * draw.transform;
                    device.cmd_push_constants(
                        command_buffer,
                        self.pipeline_layout.handle(),
                        vk::ShaderStageFlags::VERTEX,
                        0,
                        bytemuck::cast_slice(model_view_projection.as_slice()),
                    );
                    device.cmd_bind_vertex_buffers(command_buffer, 0, &[draw.vertex_buffer], &[0]);
                    device.cmd_bind_index_buffer(
                        command_buffer,
                        draw.index_buffer,
                        0,
                        vk::IndexType::UINT32,
                    );
                    device.cmd_draw_indexed(command_buffer, draw.index_count, 1, 0, 0, 0);
                }
            }
        }

        unsafe {
            device.cmd_end_render_pass(command_buffer);
            device.end_command_buffer(command_buffer).map_err(VulkanError::Api)?;
        }
        Ok(())
    }

    /// Submit the recorded geometry pass and return the semaphore it signals
    pub fn submit_geometry_pass(&self, command_list: &CommandList) -> VulkanResult<vk::Semaphore> {
        let sync = self.geometry.as_ref().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "Geometry pass submitted before it was recorded".to_string(),
        })?;

        let command_buffers = [sync.command_buffer];
        let signal_semaphores = [sync.finished.handle()];
        let submit_info = vk::SubmitInfo::builder()
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        sync.fence.reset()?;
        let context = command_list.context();
        unsafe {
            context
                .device()
                .queue_submit(context.graphics_queue(), &[submit_info], sync.fence.handle())
                .map_err(VulkanError::Api)?;
        }
        Ok(sync.finished.handle())
    }

    fn geometry_sync(&mut self, command_list: &CommandList) -> VulkanResult<&GeometrySync> {
        if self.geometry.is_none() {
            let device = self.context.device().clone();
            let command_buffer =
                command_list.create_command_buffer(vk::CommandBufferLevel::PRIMARY, false)?;
            let objects = Semaphore::new(device.clone()).and_then(|finished| {
                Fence::new(device, true).map(|fence| (finished, fence))
            });
            match objects {
                Ok((finished, fence)) => {
                    self.geometry = Some(GeometrySync {
                        command_buffer,
                        finished,
                        fence,
                    });
                }
                Err(e) => {
                    command_list.free_command_buffer(command_buffer);
                    return Err(e);
                }
            }
        }
        self.geometry.as_ref().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "Geometry pass objects missing".to_string(),
        })
    }

    /// Albedo target
    pub fn albedo(&self) -> &Texture {
        &self.albedo
    }

    /// Normal target
    pub fn normal(&self) -> &Texture {
        &self.normal
    }

    /// Material target
    pub fn material(&self) -> &Texture {
        &self.material
    }

    /// Depth target
    pub fn depth(&self) -> &Texture {
        &self.depth
    }

    /// G-buffer render pass
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.handle()
    }

    /// G-buffer framebuffer
    pub fn framebuffer(&self) -> vk::Framebuffer {
        self.framebuffer.handle()
    }

    /// Sampler for reading the targets
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler.handle()
    }

    /// Layout of the composition descriptor set
    pub fn descriptor_set_layout(&self) -> &DescriptorSetLayout {
        &self.descriptor_set_layout
    }

    /// Pipeline layout shared by the geometry pipeline
    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout.handle()
    }

    /// Whether geometry can be drawn, or only cleared
    pub fn has_geometry_pipeline(&self) -> bool {
        self.pipeline.is_some()
    }
}

impl Drop for GBuffer {
    fn drop(&mut self) {
        // Owners wait for the device to go idle before dropping the G-buffer
        if let Some(sync) = self.geometry.take() {
            self.context.command_pool().free_command_buffers(&[sync.command_buffer]);
        }
        log::debug!("Destroying G-buffer");
    }
}

/// Composition set layout: vertex UBO, the three targets, fragment UBO
pub fn gbuffer_set_layout() -> DescriptorSetLayoutBuilder {
    let uniform = vk::DescriptorType::UNIFORM_BUFFER;
    let target = vk::DescriptorType::COMBINED_IMAGE_SAMPLER;
    let vertex = vk::ShaderStageFlags::VERTEX;
    let fragment = vk::ShaderStageFlags::FRAGMENT;
    let binding = CommandList::descriptor_set_layout_binding;

    DescriptorSetLayoutBuilder::new()
        .add_binding(binding(uniform, vertex, 0, 1))
        .add_binding(binding(target, fragment, 1, 1))
        .add_binding(binding(target, fragment, 2, 1))
        .add_binding(binding(target, fragment, 3, 1))
        .add_binding(binding(uniform, fragment, 4, 1))
}

/// Clear values in attachment order: albedo, normal, material, depth
pub fn gbuffer_clear_values() -> [vk::ClearValue; 4] {
    let black = vk::ClearValue {
        color: vk::ClearColorValue {
            float32: [0.0, 0.0, 0.0, 0.0],
        },
    };
    [
        black,
        black,
        black,
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_push_constant_holds_one_matrix() {
        assert_eq!(PUSH_CONSTANT_SIZE, 64);
        assert_eq!(std::mem::size_of::<Mat4>() as u32, PUSH_CONSTANT_SIZE);
    }

    #[test]
    fn test_clear_values_end_with_far_depth() {
        let values = gbuffer_clear_values();
        let depth = unsafe { values[3].depth_stencil };
        assert_relative_eq!(depth.depth, 1.0);
        assert_eq!(depth.stencil, 0);
    }

    #[test]
    fn test_set_layout_has_five_bindings() {
        let builder = gbuffer_set_layout();
        let bindings: Vec<_> = builder
            .bindings()
            .iter()
            .map(|b| (b.binding, b.descriptor_type, b.stage_flags, b.descriptor_count))
            .collect();

        let uniform = vk::DescriptorType::UNIFORM_BUFFER;
        let target = vk::DescriptorType::COMBINED_IMAGE_SAMPLER;
        let fragment = vk::ShaderStageFlags::FRAGMENT;
        assert_eq!(
            bindings,
            vec![
                (0, uniform, vk::ShaderStageFlags::VERTEX, 1),
                (1, target, fragment, 1),
                (2, target, fragment, 1),
                (3, target, fragment, 1),
                (4, uniform, fragment, 1),
            ]
        );
        assert!(builder.bindings().iter().all(|b| b.p_immutable_samplers.is_null()));
    }
}
