//! Perspective camera
//!
//! Right-handed, Y-up in view space; the projection converts to Vulkan clip
//! space (Y down, depth 0..1).

use crate::foundation::math::{look_at, perspective, Mat4, Vec3};

/// Perspective camera looking at a target point
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// Camera position in world space
    pub position: Vec3,
    /// Point the camera looks at
    pub target: Vec3,
    /// Up direction, usually +Y
    pub up: Vec3,
    /// Vertical field of view in radians
    pub fov_y: f32,
    /// Near clipping plane distance
    pub near: f32,
    /// Far clipping plane distance
    pub far: f32,
}

impl Camera {
    /// Camera at `position` looking at `target` with a vertical fov in degrees
    pub fn perspective(
        position: Vec3,
        target: Vec3,
        fov_degrees: f32,
        near: f32,
        far: f32,
    ) -> Self {
        Self {
            position,
            target,
            up: Vec3::y(),
            fov_y: fov_degrees.to_radians(),
            near,
            far,
        }
    }

    /// World to view transform
    pub fn view_matrix(&self) -> Mat4 {
        look_at(self.position, self.target, self.up)
    }

    /// View to clip transform for a viewport of the given aspect ratio
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        perspective(self.fov_y, aspect, self.near, self.far)
    }

    /// Projection times view
    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        self.projection_matrix(aspect) * self.view_matrix()
    }
}

impl Default for Camera {
    /// Three units in front of the origin, looking at it
    fn default() -> Self {
        Self::perspective(Vec3::new(0.0, 0.0, 3.0), Vec3::zeros(), 60.0, 0.1, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector4;

    #[test]
    fn test_target_projects_to_screen_center() {
        let camera = Camera::default();
        let clip = camera.view_projection(16.0 / 9.0) * Vector4::new(0.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(clip.x / clip.w, 0.0, epsilon = 1e-5);
        assert_relative_eq!(clip.y / clip.w, 0.0, epsilon = 1e-5);
        let depth = clip.z / clip.w;
        assert!(depth > 0.0 && depth < 1.0);
    }
}
