//! Vulkan vertex input descriptions for [`StaticVertex`]

use std::mem::{offset_of, size_of};

use ash::vk;

use crate::render::vertex::StaticVertex;

/// Vulkan vertex layout of the engine's static vertex
pub struct VulkanVertexLayout;

impl VulkanVertexLayout {
    /// Binding 0, advanced per vertex
    pub fn get_binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<StaticVertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Locations 0..=3: position, normal, uv0, colour
    pub fn get_attribute_descriptions() -> [vk::VertexInputAttributeDescription; 4] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(StaticVertex, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(StaticVertex, normal) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(StaticVertex, uv0) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 3,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(StaticVertex, color) as u32,
            },
        ]
    }

    /// Binding plus attributes for pipeline creation
    pub fn get_input_state() -> (
        vk::VertexInputBindingDescription,
        [vk::VertexInputAttributeDescription; 4],
    ) {
        (Self::get_binding_description(), Self::get_attribute_descriptions())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_offsets_are_packed() {
        let offsets: Vec<u32> = VulkanVertexLayout::get_attribute_descriptions()
            .iter()
            .map(|a| a.offset)
            .collect();
        assert_eq!(offsets, vec![0, 12, 24, 32]);
    }

    #[test]
    fn test_stride_matches_vertex_size() {
        assert_eq!(VulkanVertexLayout::get_binding_description().stride, 44);
    }
}
