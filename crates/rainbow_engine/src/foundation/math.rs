//! Math utilities and types
//!
//! Thin aliases over nalgebra plus the projection helpers the renderer needs.
//! Projections target Vulkan clip space: Y points down and depth maps to [0, 1].

pub use nalgebra::{Matrix4, Quaternion, Unit, Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Location, rotation and scale of something placed in a world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Position in world space
    pub location: Vec3,
    /// Orientation
    pub rotation: Quat,
    /// Per-axis scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            location: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a transform from its three components
    pub fn new(location: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self { location, rotation, scale }
    }

    /// Model matrix: translation * rotation * scale
    pub fn model_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.location)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }
}

/// Build a rotation from pitch (X), yaw (Y) and roll (Z) in degrees
pub fn rotation_from_degrees(pitch: f32, yaw: f32, roll: f32) -> Quat {
    Quat::from_euler_angles(pitch.to_radians(), yaw.to_radians(), roll.to_radians())
}

/// Right-handed perspective projection for Vulkan clip space
///
/// `fov_y` is in radians. The Y axis is flipped and depth runs from 0 at the
/// near plane to 1 at the far plane.
pub fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let f = 1.0 / (fov_y * 0.5).tan();
    Mat4::new(
        f / aspect, 0.0, 0.0, 0.0,
        0.0, -f, 0.0, 0.0,
        0.0, 0.0, far / (near - far), (near * far) / (near - far),
        0.0, 0.0, -1.0, 0.0,
    )
}

/// Right-handed view matrix looking from `eye` at `target`
pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
    Mat4::look_at_rh(&Point3::from(eye), &Point3::from(target), &up)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const EPSILON: f32 = 1e-5;

    fn project(m: &Mat4, p: Vec3) -> Vec3 {
        let clip = m * nalgebra::Vector4::new(p.x, p.y, p.z, 1.0);
        Vec3::new(clip.x / clip.w, clip.y / clip.w, clip.z / clip.w)
    }

    #[test]
    fn test_identity_transform_is_identity_matrix() {
        let matrix = Transform::default().model_matrix();
        assert_relative_eq!(matrix, Mat4::identity(), epsilon = EPSILON);
    }

    #[test]
    fn test_model_matrix_applies_scale_then_translation() {
        let transform = Transform::new(
            Vec3::new(1.0, 2.0, 3.0),
            Quat::identity(),
            Vec3::new(2.0, 2.0, 2.0),
        );
        let moved = transform.model_matrix().transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(moved, Point3::new(3.0, 2.0, 3.0), epsilon = EPSILON);
    }

    #[test]
    fn test_yaw_rotates_around_y() {
        let transform = Transform::new(
            Vec3::zeros(),
            rotation_from_degrees(0.0, 90.0, 0.0),
            Vec3::new(1.0, 1.0, 1.0),
        );
        let rotated = transform.model_matrix().transform_vector(&Vec3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(rotated, Vec3::new(0.0, 0.0, -1.0), epsilon = EPSILON);
    }

    #[test]
    fn test_perspective_depth_range() {
        let proj = perspective(60f32.to_radians(), 16.0 / 9.0, 0.1, 100.0);
        assert_relative_eq!(project(&proj, Vec3::new(0.0, 0.0, -0.1)).z, 0.0, epsilon = EPSILON);
        assert_relative_eq!(project(&proj, Vec3::new(0.0, 0.0, -100.0)).z, 1.0, epsilon = EPSILON);
    }

    #[test]
    fn test_perspective_flips_y() {
        let proj = perspective(90f32.to_radians(), 1.0, 0.1, 10.0);
        let up = project(&proj, Vec3::new(0.0, 1.0, -1.0));
        assert!(up.y < 0.0);
    }

    #[test]
    fn test_look_at_moves_target_onto_negative_z() {
        let view = look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::zeros(), Vec3::y());
        let origin = view.transform_point(&Point3::origin());
        assert_relative_eq!(origin, Point3::new(0.0, 0.0, -5.0), epsilon = EPSILON);
    }
}
