//! GPU buffers and memory type selection
//!
//! [`Buffer`] owns a `VkBuffer` plus its dedicated allocation. [`VertexBuffer`]
//! is the device-local vertex/index pair a mesh is drawn from.

use ash::{vk, Device};
use bytemuck::Pod;

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// First memory type allowed by `type_filter` whose flags contain `properties`
///
/// Returns `None` when nothing matches.
pub fn try_find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..memory_properties.memory_type_count).find(|&i| {
        let flags = memory_properties.memory_types[i as usize].property_flags;
        (type_filter & (1 << i)) != 0 && flags.contains(properties)
    })
}

/// Same as [`try_find_memory_type`] but a miss is an error
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    try_find_memory_type(memory_properties, type_filter, properties)
        .ok_or(VulkanError::NoSuitableMemoryType)
}

/// Buffer wrapper with memory management
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Create a new buffer with memory allocation
    pub fn new(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        if size == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "Cannot create a zero-sized buffer".to_string(),
            });
        }

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.create_buffer(&buffer_info, None).map_err(VulkanError::Api)? };

        let mem_requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let type_bits = mem_requirements.memory_type_bits;
        let memory = find_memory_type(memory_properties, type_bits, properties).and_then(|index| {
            let alloc_info = vk::MemoryAllocateInfo::builder()
                .allocation_size(mem_requirements.size)
                .memory_type_index(index);
            unsafe { device.allocate_memory(&alloc_info, None).map_err(VulkanError::Api) }
        });

        let memory = match memory {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        // Dropping `this` on a bind failure releases both handles
        let this = Self {
            device,
            buffer,
            memory,
            size,
        };

        unsafe {
            this.device
                .bind_buffer_memory(buffer, memory, 0)
                .map_err(VulkanError::Api)?;
        }

        Ok(this)
    }

    /// Copy `data` to the start of a host-visible buffer
    pub fn write_data<T: Pod>(&self, data: &[T]) -> VulkanResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.len() as vk::DeviceSize > self.size {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Write of {} bytes exceeds buffer size {}", bytes.len(), self.size),
            });
        }

        unsafe {
            let ptr = self
                .device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
            self.device.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get size
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Element counts and byte sizes of a vertex/index upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLayout {
    /// Number of vertices
    pub vertex_count: u32,
    /// Number of indices
    pub index_count: u32,
    /// Size of the vertex data in bytes
    pub vertex_bytes: vk::DeviceSize,
    /// Size of the index data in bytes
    pub index_bytes: vk::DeviceSize,
}

impl UploadLayout {
    /// Measure a vertex and index slice
    ///
    /// Both must be non-empty since Vulkan has no zero-sized buffers.
    pub fn of<V: Pod>(vertices: &[V], indices: &[u32]) -> VulkanResult<Self> {
        if vertices.is_empty() || indices.is_empty() {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "Mesh upload needs vertices and indices, got {} and {}",
                    vertices.len(),
                    indices.len()
                ),
            });
        }

        let count = |n: usize| {
            u32::try_from(n).map_err(|_| VulkanError::InvalidOperation {
                reason: format!("{} elements do not fit a 32-bit count", n),
            })
        };

        Ok(Self {
            vertex_count: count(vertices.len())?,
            index_count: count(indices.len())?,
            vertex_bytes: std::mem::size_of_val(vertices) as vk::DeviceSize,
            index_bytes: std::mem::size_of_val(indices) as vk::DeviceSize,
        })
    }
}

/// Device-local vertex and index buffers of one mesh
pub struct VertexBuffer {
    vertices: Buffer,
    indices: Buffer,
    vertex_count: u32,
    index_count: u32,
}

impl VertexBuffer {
    /// Pair two uploaded buffers with their element counts
    pub(crate) fn from_parts(vertices: Buffer, indices: Buffer, layout: UploadLayout) -> Self {
        Self {
            vertices,
            indices,
            vertex_count: layout.vertex_count,
            index_count: layout.index_count,
        }
    }

    /// Vertex buffer handle
    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.vertices.handle()
    }

    /// Index buffer handle, `u32` indices
    pub fn index_buffer(&self) -> vk::Buffer {
        self.indices.handle()
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Number of indices
    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::vertex::StaticVertex;

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (i, flags) in types.iter().enumerate() {
            props.memory_types[i].property_flags = *flags;
        }
        props
    }

    #[test]
    fn test_finds_first_matching_type() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);
        let wanted = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        assert_eq!(try_find_memory_type(&props, 0b111, wanted), Some(1));
        assert_eq!(find_memory_type(&props, 0b100, wanted).unwrap(), 2);
    }

    #[test]
    fn test_flags_must_be_contained() {
        let props = memory_properties(&[vk::MemoryPropertyFlags::HOST_VISIBLE]);
        let wanted = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        assert_eq!(try_find_memory_type(&props, 0b1, wanted), None);
    }

    #[test]
    fn test_empty_filter_finds_nothing() {
        let props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        assert_eq!(try_find_memory_type(&props, 0, vk::MemoryPropertyFlags::DEVICE_LOCAL), None);
        assert!(matches!(
            find_memory_type(&props, 0, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            Err(VulkanError::NoSuitableMemoryType)
        ));
    }

    #[test]
    fn test_upload_layout_counts() {
        let vertices = vec![StaticVertex::default(); 5];
        let indices = [0u32, 1, 2, 2, 3, 4, 4, 0, 1];
        let layout = UploadLayout::of(&vertices, &indices).unwrap();
        assert_eq!(layout.vertex_count, 5);
        assert_eq!(layout.index_count, 9);
        assert_eq!(layout.vertex_bytes, 5 * 44);
        assert_eq!(layout.index_bytes, 9 * 4);
    }

    #[test]
    fn test_upload_layout_rejects_empty_input() {
        let vertices: Vec<StaticVertex> = Vec::new();
        assert!(UploadLayout::of(&vertices, &[0, 1, 2]).is_err());
        assert!(UploadLayout::of(&[StaticVertex::default()], &[]).is_err());
    }
}
