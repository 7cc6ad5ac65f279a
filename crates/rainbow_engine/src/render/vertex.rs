//! Vertex formats uploaded to the GPU

use bytemuck::{Pod, Zeroable};

/// Interleaved vertex of a static mesh
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct StaticVertex {
    /// Object space position
    pub position: [f32; 3],
    /// Object space normal
    pub normal: [f32; 3],
    /// First texture coordinate set
    pub uv0: [f32; 2],
    /// Vertex colour
    pub color: [f32; 3],
}

impl StaticVertex {
    /// Create a vertex from its attributes
    pub fn new(position: [f32; 3], normal: [f32; 3], uv0: [f32; 2], color: [f32; 3]) -> Self {
        Self { position, normal, uv0, color }
    }
}

impl Default for StaticVertex {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            normal: [0.0; 3],
            uv0: [0.0; 2],
            color: [1.0; 3],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<StaticVertex>(), 44);
        assert_eq!(std::mem::offset_of!(StaticVertex, normal), 12);
        assert_eq!(std::mem::offset_of!(StaticVertex, uv0), 24);
        assert_eq!(std::mem::offset_of!(StaticVertex, color), 32);
    }

    #[test]
    fn test_casts_to_bytes() {
        let vertices = [StaticVertex::default(); 3];
        assert_eq!(bytemuck::cast_slice::<_, u8>(&vertices).len(), 132);
    }
}
