//! Frustum culling against bounding spheres
//!
//! Planes are extracted from a view-projection matrix with the Gribb-Hartmann
//! method. Projections in this crate map depth to `[0, 1]`, so the near plane is
//! row 2 on its own rather than row 3 + row 2.

use crate::foundation::math::{Mat4, Vec3, Vec4};

/// A plane `dot(normal, p) + distance = 0`, positive side facing into the frustum
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Unit normal
    pub normal: Vec3,
    /// Signed distance term
    pub distance: f32,
}

impl Plane {
    fn from_row(row: Vec4) -> Self {
        let normal = Vec3::new(row.x, row.y, row.z);
        let length = normal.norm();
        if length <= f32::EPSILON {
            return Self {
                normal,
                distance: row.w,
            };
        }
        Self {
            normal: normal / length,
            distance: row.w / length,
        }
    }

    /// Signed distance from `point` to the plane
    pub fn signed_distance(&self, point: &Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

/// Frustum planes in the order left, right, bottom, top, near, far
pub fn extract_frustum_planes(view_projection: &Mat4) -> [Plane; 6] {
    let row = |index: usize| -> Vec4 { view_projection.row(index).transpose() };
    let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

    [
        Plane::from_row(r3 + r0),
        Plane::from_row(r3 - r0),
        Plane::from_row(r3 + r1),
        Plane::from_row(r3 - r1),
        Plane::from_row(r2),
        Plane::from_row(r3 - r2),
    ]
}

/// Whether a sphere is at least partly on the inner side of every plane
pub fn is_sphere_inside_frustum(center: &Vec3, radius: f32, planes: &[Plane; 6]) -> bool {
    planes
        .iter()
        .all(|plane| plane.signed_distance(center) >= -radius)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Mat4Ext;
    use approx::assert_relative_eq;

    fn camera_planes() -> [Plane; 6] {
        let projection = Mat4::perspective(90.0_f32.to_radians(), 1.0, 0.1, 100.0);
        let view = Mat4::look_at(Vec3::zeros(), Vec3::new(0.0, 0.0, 1.0), Vec3::new(0.0, 1.0, 0.0));
        extract_frustum_planes(&(projection * view))
    }

    #[test]
    fn test_planes_are_normalized() {
        for plane in camera_planes() {
            assert_relative_eq!(plane.normal.norm(), 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_sphere_in_front_of_camera_is_visible() {
        let planes = camera_planes();
        assert!(is_sphere_inside_frustum(&Vec3::new(0.0, 0.0, 10.0), 0.5, &planes));
    }

    #[test]
    fn test_sphere_behind_camera_is_culled() {
        let planes = camera_planes();
        assert!(!is_sphere_inside_frustum(&Vec3::new(0.0, 0.0, -10.0), 0.5, &planes));
    }

    #[test]
    fn test_sphere_beyond_far_plane_is_culled() {
        let planes = camera_planes();
        assert!(!is_sphere_inside_frustum(&Vec3::new(0.0, 0.0, 150.0), 1.0, &planes));
        assert!(is_sphere_inside_frustum(&Vec3::new(0.0, 0.0, 100.5), 1.0, &planes));
    }

    #[test]
    fn test_radius_threshold_is_inclusive() {
        // Axis-aligned box |x|,|y|,|z| <= 1 expressed as six planes
        let plane = |normal: Vec3| Plane { normal, distance: 1.0 };
        let planes = [
            plane(Vec3::new(1.0, 0.0, 0.0)),
            plane(Vec3::new(-1.0, 0.0, 0.0)),
            plane(Vec3::new(0.0, 1.0, 0.0)),
            plane(Vec3::new(0.0, -1.0, 0.0)),
            plane(Vec3::new(0.0, 0.0, 1.0)),
            plane(Vec3::new(0.0, 0.0, -1.0)),
        ];

        // Signed distance to the +x face is 1 - 3 = -2
        let center = Vec3::new(3.0, 0.0, 0.0);
        assert!(is_sphere_inside_frustum(&center, 2.0, &planes));
        assert!(!is_sphere_inside_frustum(&center, 1.99, &planes));
        assert!(is_sphere_inside_frustum(&Vec3::zeros(), 0.0, &planes));
    }
}
