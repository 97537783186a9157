//! Math utilities and types
//!
//! Thin aliases over nalgebra plus the projection helpers the renderer needs.
//! All matrices are column-major, matching the GPU-side layout.

pub use nalgebra::{Matrix4, Quaternion, Unit, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Extension trait for Mat4 with projection and view constructors
pub trait Mat4Ext {
    /// Perspective projection with depth mapped to [0, 1]
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// Orthographic projection over `[0, width] x [0, height]` with depth mapped to [0, 1]
    fn orthographic(width: f32, height: f32, near: f32, far: f32) -> Mat4;

    /// Left-handed look-at view matrix (+Z forward)
    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4;
}

impl Mat4Ext for Mat4 {
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        let tan_half_fovy = (fov_y * 0.5).tan();

        let mut result = Mat4::zeros();
        result[(0, 0)] = 1.0 / (aspect * tan_half_fovy);
        result[(1, 1)] = 1.0 / tan_half_fovy;
        result[(2, 2)] = far / (far - near);
        result[(2, 3)] = -(near * far) / (far - near);
        result[(3, 2)] = 1.0;
        result
    }

    fn orthographic(width: f32, height: f32, near: f32, far: f32) -> Mat4 {
        let mut result = Mat4::identity();
        result[(0, 0)] = 2.0 / width;
        result[(1, 1)] = 2.0 / height;
        result[(2, 2)] = 1.0 / (far - near);
        result[(0, 3)] = -1.0;
        result[(1, 3)] = -1.0;
        result[(2, 3)] = -near / (far - near);
        result
    }

    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
        let forward = (target - eye).normalize();
        let right = up.cross(&forward).normalize();
        let camera_up = forward.cross(&right);

        Mat4::new(
            right.x, right.y, right.z, -right.dot(&eye),
            camera_up.x, camera_up.y, camera_up.z, -camera_up.dot(&eye),
            forward.x, forward.y, forward.z, -forward.dot(&eye),
            0.0, 0.0, 0.0, 1.0,
        )
    }
}

/// Model matrix composed as translation * rotation * scale
pub fn compose_model_matrix(position: &Vec3, rotation: &Quat, scale: &Vec3) -> Mat4 {
    Mat4::new_translation(position) * rotation.to_homogeneous() * Mat4::new_nonuniform_scaling(scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_compose_model_matrix_applies_scale_then_translation() {
        let model = compose_model_matrix(
            &Vec3::new(1.0, 2.0, 3.0),
            &Quat::identity(),
            &Vec3::new(2.0, 2.0, 2.0),
        );
        let point = model * Vec4::new(1.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(point, Vec4::new(3.0, 2.0, 3.0, 1.0));
    }

    #[test]
    fn test_perspective_maps_near_and_far_to_unit_depth() {
        let projection = Mat4::perspective(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
        let near = projection * Vec4::new(0.0, 0.0, 0.1, 1.0);
        let far = projection * Vec4::new(0.0, 0.0, 100.0, 1.0);
        assert_relative_eq!(near.z / near.w, 0.0, epsilon = 1e-6);
        assert_relative_eq!(far.z / far.w, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_orthographic_maps_screen_corners() {
        let projection = Mat4::orthographic(1600.0, 900.0, -1.0, 1.0);
        let corner = projection * Vec4::new(1600.0, 900.0, 0.0, 1.0);
        assert_relative_eq!(corner.x, 1.0);
        assert_relative_eq!(corner.y, 1.0);
    }

    #[test]
    fn test_look_at_places_target_on_positive_z() {
        let view = Mat4::look_at(Vec3::zeros(), Vec3::new(0.0, 0.0, 5.0), Vec3::y());
        let target = view * Vec4::new(0.0, 0.0, 5.0, 1.0);
        assert_relative_eq!(target, Vec4::new(0.0, 0.0, 5.0, 1.0), epsilon = 1e-6);
    }
}
