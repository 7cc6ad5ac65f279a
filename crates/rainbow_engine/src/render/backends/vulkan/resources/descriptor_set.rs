//! Descriptor set layouts

use ash::{vk, Device};

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Plain descriptor set layout binding without immutable samplers
pub fn layout_binding(
    descriptor_type: vk::DescriptorType,
    stage_flags: vk::ShaderStageFlags,
    binding: u32,
    count: u32,
) -> vk::DescriptorSetLayoutBinding {
    vk::DescriptorSetLayoutBinding::builder()
        .binding(binding)
        .descriptor_type(descriptor_type)
        .descriptor_count(count)
        .stage_flags(stage_flags)
        .build()
}

/// Descriptor set layout builder for creating reusable layouts
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an arbitrary binding
    pub fn add_binding(mut self, binding: vk::DescriptorSetLayoutBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Add a uniform buffer binding
    pub fn add_uniform_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add_binding(layout_binding(
            vk::DescriptorType::UNIFORM_BUFFER,
            stage_flags,
            binding,
            1,
        ))
    }

    /// Add a combined image sampler binding
    pub fn add_combined_image_sampler(
        self,
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.add_binding(layout_binding(
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            stage_flags,
            binding,
            1,
        ))
    }

    /// Bindings added so far
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }

    /// Build the descriptor set layout
    pub fn build(self, device: &Device) -> VulkanResult<DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&self.bindings);

        let layout = unsafe {
            device
                .create_descriptor_set_layout(&layout_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(DescriptorSetLayout {
            layout,
            device: device.clone(),
            bindings: self.bindings,
        })
    }
}

/// Descriptor set layout wrapper with automatic cleanup
pub struct DescriptorSetLayout {
    layout: vk::DescriptorSetLayout,
    device: Device,
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayout {
    /// Get the Vulkan descriptor set layout handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Get the bindings used in this layout
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_binding_fields() {
        let binding = layout_binding(
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            vk::ShaderStageFlags::FRAGMENT,
            3,
            1,
        );
        assert_eq!(binding.binding, 3);
        assert_eq!(binding.descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(binding.descriptor_count, 1);
        assert_eq!(binding.stage_flags, vk::ShaderStageFlags::FRAGMENT);
        assert!(binding.p_immutable_samplers.is_null());
    }

    #[test]
    fn test_builder_keeps_binding_order() {
        let builder = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .add_combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT)
            .add_uniform_buffer(2, vk::ShaderStageFlags::FRAGMENT);

        let kinds: Vec<_> = builder
            .bindings()
            .iter()
            .map(|b| (b.binding, b.descriptor_type))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (0, vk::DescriptorType::UNIFORM_BUFFER),
                (1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER),
                (2, vk::DescriptorType::UNIFORM_BUFFER),
            ]
        );
    }
}
