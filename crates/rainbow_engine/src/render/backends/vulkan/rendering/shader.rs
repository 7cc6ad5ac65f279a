//! SPIR-V shader modules, pipeline layouts and the geometry-pass pipeline

use std::ffi::CStr;
use std::io::Cursor;
use std::path::Path;

use ash::{vk, Device};

use crate::render::backends::vulkan::rendering::vertex_layout::VulkanVertexLayout;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

const SHADER_ENTRY: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

/// SPIR-V shader module wrapper with automatic resource management
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create shader module from SPIR-V bytecode
    ///
    /// `bytes` must hold whole 32-bit words starting with the SPIR-V magic
    /// number, in either byte order.
    pub fn from_bytes(device: &Device, bytes: &[u8]) -> VulkanResult<Self> {
        Self::from_named_bytes(device, "<memory>", bytes)
    }

    /// Load shader from SPIR-V file
    pub fn from_file<P: AsRef<Path>>(device: &Device, path: P) -> VulkanResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| VulkanError::ShaderLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        log::debug!("Read {} bytes of SPIR-V from {}", bytes.len(), path.display());
        Self::from_named_bytes(device, &path.display().to_string(), &bytes)
    }

    fn from_named_bytes(device: &Device, name: &str, bytes: &[u8]) -> VulkanResult<Self> {
        let words = spirv_words(bytes).map_err(|reason| VulkanError::ShaderLoad {
            path: name.to_string(),
            reason,
        })?;

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&words);
        let module = unsafe {
            device
                .create_shader_module(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device: device.clone(),
            module,
        })
    }

    /// Get shader module handle
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    /// Stage description using the `main` entry point
    pub fn stage_info(&self, stage: vk::ShaderStageFlags) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(stage)
            .module(self.module)
            .name(SHADER_ENTRY)
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

/// Decode SPIR-V bytes into aligned words
pub fn spirv_words(bytes: &[u8]) -> Result<Vec<u32>, String> {
    ash::util::read_spv(&mut Cursor::new(bytes)).map_err(|e| e.to_string())
}

/// Pipeline layout wrapper with RAII cleanup
pub struct PipelineLayout {
    device: Device,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Create a layout over `set_layouts` and `push_constant_ranges`
    pub fn new(
        device: Device,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> VulkanResult<Self> {
        let layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constant_ranges);
        let layout = unsafe {
            device
                .create_pipeline_layout(&layout_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, layout })
    }

    /// Get the pipeline layout handle
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// Graphics pipeline wrapper with RAII cleanup
///
/// Does not own its layout.
pub struct GraphicsPipeline {
    device: Device,
    pipeline: vk::Pipeline,
}

impl GraphicsPipeline {
    /// Opaque geometry pipeline writing `color_attachment_count` targets
    ///
    /// Static vertices, triangle lists, back-face culling, depth test and
    /// write, viewport and scissor left dynamic.
    pub fn new_geometry(
        device: &Device,
        render_pass: vk::RenderPass,
        vertex_shader: &ShaderModule,
        fragment_shader: &ShaderModule,
        layout: vk::PipelineLayout,
        color_attachment_count: u32,
    ) -> VulkanResult<Self> {
        let shader_stages = [
            vertex_shader.stage_info(vk::ShaderStageFlags::VERTEX),
            fragment_shader.stage_info(vk::ShaderStageFlags::FRAGMENT),
        ];

        let (binding, attributes) = VulkanVertexLayout::get_input_state();
        let bindings = [binding];
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            // OBJ winding
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachments = opaque_blend_attachments(color_attachment_count);
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0)
            .build();

        let pipelines = unsafe {
            device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, e)| VulkanError::Api(e))?
        };
        let pipeline = pipelines.into_iter().next().ok_or_else(|| {
            VulkanError::InitializationFailed("Pipeline creation returned no pipeline".to_string())
        })?;

        Ok(Self {
            device: device.clone(),
            pipeline,
        })
    }

    /// Get the pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
        }
    }
}

/// One blending-disabled RGBA attachment state per colour target
pub fn opaque_blend_attachments(count: u32) -> Vec<vk::PipelineColorBlendAttachmentState> {
    (0..count)
        .map(|_| {
            vk::PipelineColorBlendAttachmentState::builder()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .blend_enable(false)
                .build()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spirv_words_either_byte_order() {
        let little = [0x03, 0x02, 0x23, 0x07, 0x00, 0x00, 0x01, 0x00];
        let big = [0x07, 0x23, 0x02, 0x03, 0x00, 0x01, 0x00, 0x00];
        let expected = vec![0x0723_0203, 0x0001_0000];
        assert_eq!(spirv_words(&little).unwrap(), expected);
        assert_eq!(spirv_words(&big).unwrap(), expected);
    }

    #[test]
    fn test_spirv_words_rejects_bad_input() {
        assert!(spirv_words(&[0x03, 0x02, 0x23]).is_err());
        assert!(spirv_words(&[0xde, 0xad, 0xbe, 0xef]).is_err());
    }

    #[test]
    fn test_one_blend_state_per_target() {
        let states = opaque_blend_attachments(3);
        assert_eq!(states.len(), 3);
        assert!(states.iter().all(|s| {
            s.blend_enable == vk::FALSE && s.color_write_mask == vk::ColorComponentFlags::RGBA
        }));
    }
}
