//! Render pass management
//!
//! Two passes exist: the main pass drawing into swapchain images and the
//! G-buffer pass writing the three geometry targets plus depth.

use ash::{vk, Device};

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Cleared and stored attachment moving from `UNDEFINED` to `final_layout`
pub fn cleared_attachment(
    format: vk::Format,
    final_layout: vk::ImageLayout,
) -> vk::AttachmentDescription {
    vk::AttachmentDescription::builder()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(final_layout)
        .build()
}

/// Depth-stencil attachment; the stencil is cleared but not kept
pub fn depth_attachment(format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription {
        stencil_load_op: vk::AttachmentLoadOp::CLEAR,
        ..cleared_attachment(format, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
    }
}

/// External to subpass 0 dependency shared by both passes
pub fn external_to_first_subpass() -> vk::SubpassDependency {
    vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::MEMORY_READ)
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        )
        .dependency_flags(vk::DependencyFlags::BY_REGION)
        .build()
}

/// Subpass 0 back to external, making the written targets readable later
pub fn first_subpass_to_external() -> vk::SubpassDependency {
    vk::SubpassDependency::builder()
        .src_subpass(0)
        .dst_subpass(vk::SUBPASS_EXTERNAL)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
        .src_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        )
        .dst_access_mask(vk::AccessFlags::MEMORY_READ)
        .dependency_flags(vk::DependencyFlags::BY_REGION)
        .build()
}

/// Main pass attachments: presentable colour, then depth
pub fn main_pass_attachments(
    color_format: vk::Format,
    depth_format: vk::Format,
) -> [vk::AttachmentDescription; 2] {
    [
        cleared_attachment(color_format, vk::ImageLayout::PRESENT_SRC_KHR),
        depth_attachment(depth_format),
    ]
}

/// Main pass dependencies
pub fn main_pass_dependencies() -> [vk::SubpassDependency; 1] {
    [external_to_first_subpass()]
}

/// G-buffer attachments: the colour targets left for sampling, then depth
pub fn gbuffer_pass_attachments(
    color_formats: [vk::Format; 3],
    depth_format: vk::Format,
) -> [vk::AttachmentDescription; 4] {
    let [albedo, normal, material] = color_formats
        .map(|format| cleared_attachment(format, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL));
    [albedo, normal, material, depth_attachment(depth_format)]
}

/// G-buffer dependencies, into and out of the subpass
pub fn gbuffer_pass_dependencies() -> [vk::SubpassDependency; 2] {
    [external_to_first_subpass(), first_subpass_to_external()]
}

/// Subpass references: colour attachments `0..count`, depth at `count`
pub fn subpass_references(
    color_attachment_count: u32,
) -> (Vec<vk::AttachmentReference>, vk::AttachmentReference) {
    let color_refs = (0..color_attachment_count)
        .map(|attachment| vk::AttachmentReference {
            attachment,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        })
        .collect();
    let depth_ref = vk::AttachmentReference {
        attachment: color_attachment_count,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };
    (color_refs, depth_ref)
}

/// Render pass wrapper with RAII cleanup
pub struct RenderPass {
    device: Device,
    render_pass: vk::RenderPass,
    color_attachment_count: u32,
}

impl RenderPass {
    /// Main pass: one presentable colour target and a depth-stencil target
    pub fn new_main_pass(
        device: Device,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> VulkanResult<Self> {
        let attachments = main_pass_attachments(color_format, depth_format);
        Self::with_single_subpass(device, &attachments, 1, &main_pass_dependencies())
    }

    /// G-buffer pass: albedo, normal and material targets left ready for sampling
    pub fn new_gbuffer_pass(
        device: Device,
        color_formats: [vk::Format; 3],
        depth_format: vk::Format,
    ) -> VulkanResult<Self> {
        let attachments = gbuffer_pass_attachments(color_formats, depth_format);
        Self::with_single_subpass(
            device,
            &attachments,
            color_formats.len() as u32,
            &gbuffer_pass_dependencies(),
        )
    }

    /// Colour attachments come first, the depth attachment last
    fn with_single_subpass(
        device: Device,
        attachments: &[vk::AttachmentDescription],
        color_attachment_count: u32,
        dependencies: &[vk::SubpassDependency],
    ) -> VulkanResult<Self> {
        let (color_refs, depth_ref) = subpass_references(color_attachment_count);

        let subpasses = [vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .depth_stencil_attachment(&depth_ref)
            .build()];

        let render_pass_create_info = vk::RenderPassCreateInfo::builder()
            .attachments(attachments)
            .subpasses(&subpasses)
            .dependencies(dependencies);

        let render_pass = unsafe {
            device
                .create_render_pass(&render_pass_create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device,
            render_pass,
            color_attachment_count,
        })
    }

    /// Get the render pass handle
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Number of colour attachments in the subpass
    pub fn color_attachment_count(&self) -> u32 {
        self.color_attachment_count
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_render_pass(self.render_pass, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presentable_colour_attachment() {
        let desc = cleared_attachment(vk::Format::B8G8R8A8_UNORM, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(desc.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(desc.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(desc.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(desc.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn test_depth_attachment_clears_stencil() {
        let desc = depth_attachment(vk::Format::D32_SFLOAT_S8_UINT);
        assert_eq!(desc.format, vk::Format::D32_SFLOAT_S8_UINT);
        assert_eq!(desc.stencil_load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(desc.stencil_store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(desc.final_layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn test_dependencies_mirror_each_other() {
        let into = external_to_first_subpass();
        let out = first_subpass_to_external();
        assert_eq!(into.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(out.dst_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(into.src_stage_mask, out.dst_stage_mask);
        assert_eq!(into.dst_access_mask, out.src_access_mask);
        assert_eq!(into.dependency_flags, vk::DependencyFlags::BY_REGION);
    }

    #[test]
    fn test_main_pass_is_colour_then_depth() {
        let attachments =
            main_pass_attachments(vk::Format::B8G8R8A8_UNORM, vk::Format::D32_SFLOAT_S8_UINT);
        assert_eq!(attachments.len(), 2);
        assert_eq!(attachments[0].format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(attachments[0].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(attachments[1].format, vk::Format::D32_SFLOAT_S8_UINT);
        assert_eq!(attachments[1].final_layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

        let dependencies = main_pass_dependencies();
        assert_eq!(dependencies.len(), 1);
        assert_eq!(dependencies[0].src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(dependencies[0].dst_subpass, 0);
        assert_eq!(dependencies[0].src_stage_mask, vk::PipelineStageFlags::BOTTOM_OF_PIPE);
        assert_eq!(dependencies[0].dst_stage_mask, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
    }

    #[test]
    fn test_gbuffer_pass_leaves_targets_readable() {
        let colors = [
            vk::Format::R8G8B8A8_UNORM,
            vk::Format::R16G16B16A16_SFLOAT,
            vk::Format::R8G8B8A8_UNORM,
        ];
        let attachments = gbuffer_pass_attachments(colors, vk::Format::D24_UNORM_S8_UINT);
        assert_eq!(attachments.len(), 4);
        for (attachment, format) in attachments.iter().zip(colors) {
            assert_eq!(attachment.format, format);
            assert_eq!(attachment.load_op, vk::AttachmentLoadOp::CLEAR);
            assert_eq!(attachment.store_op, vk::AttachmentStoreOp::STORE);
            assert_eq!(attachment.initial_layout, vk::ImageLayout::UNDEFINED);
            assert_eq!(attachment.final_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        }
        assert_eq!(attachments[3].format, vk::Format::D24_UNORM_S8_UINT);
        assert_eq!(attachments[3].final_layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

        let dependencies = gbuffer_pass_dependencies();
        assert_eq!(dependencies.len(), 2);
        assert_eq!(dependencies[0].src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(dependencies[0].dst_subpass, 0);
        assert_eq!(dependencies[1].src_subpass, 0);
        assert_eq!(dependencies[1].dst_subpass, vk::SUBPASS_EXTERNAL);
    }

    #[test]
    fn test_depth_reference_follows_colour_references() {
        let (color_refs, depth_ref) = subpass_references(3);
        let indices: Vec<u32> = color_refs.iter().map(|r| r.attachment).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(color_refs.iter().all(|r| r.layout == vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL));
        assert_eq!(depth_ref.attachment, 3);
        assert_eq!(depth_ref.layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

        let (main_refs, main_depth) = subpass_references(1);
        assert_eq!(main_refs.len(), 1);
        assert_eq!(main_depth.attachment, 1);
    }
}
