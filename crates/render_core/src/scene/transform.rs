//! Transforms and the systems that refresh them each frame
//!
//! World-space transforms are updated on the [`JobPool`]: the vector is cut
//! into contiguous chunks, one per worker, and each job locks only its own
//! chunk. Chunks never overlap, so the locks are uncontended, and the call
//! only returns once every chunk has been put back in order.

use crate::foundation::jobs::{partition_ranges, JobError, JobPool};
use crate::foundation::math::{compose_model_matrix, Mat4, Quat, Vec3};
use crate::render::culling::{extract_frustum_planes, is_sphere_inside_frustum, Plane};

use std::sync::Arc;

use nalgebra::Rotation3;
use parking_lot::Mutex;

/// Position, orientation and scale of one entity plus its derived state
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// World (or screen) position
    pub position: Vec3,
    /// Pitch, yaw, roll in degrees
    pub rotation: Vec3,
    /// Per-axis scale
    pub scale: Vec3,

    /// Unit forward vector, derived from pitch and yaw
    pub forward: Vec3,
    /// Unit up vector
    pub up: Vec3,
    /// Unit right vector
    pub right: Vec3,
    /// Model matrix, translation * rotation * scale
    pub model: Mat4,

    /// Radius of the sphere used for culling
    pub bounding_radius: f32,
    /// Active and inside the view after the last update
    pub visible: bool,
    /// Inactive transforms are never visible
    pub active: bool,
    /// Derived state needs recomputing
    pub dirty: bool,
}

impl Default for Transform {
    fn default() -> Self {
        Self::from_position(Vec3::zeros())
    }
}

impl Transform {
    /// Unit-scale, unrotated transform at `position`
    pub fn from_position(position: Vec3) -> Self {
        let scale = Vec3::repeat(1.0);
        Self {
            position,
            rotation: Vec3::zeros(),
            scale,
            forward: Vec3::z(),
            up: Vec3::y(),
            right: Vec3::x(),
            model: Mat4::new_translation(&position),
            bounding_radius: scale.norm() * 0.5,
            visible: false,
            active: true,
            dirty: true,
        }
    }

    /// Move to `position`
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.dirty = true;
    }

    /// Move by `offset`
    pub fn translate(&mut self, offset: Vec3) {
        self.position += offset;
        self.dirty = true;
    }

    /// Set pitch, yaw and roll in degrees
    pub fn set_rotation(&mut self, pitch: f32, yaw: f32, roll: f32) {
        self.rotation = Vec3::new(pitch, yaw, roll);
        self.dirty = true;
    }

    /// Add to pitch, yaw and roll in degrees
    pub fn rotate(&mut self, pitch: f32, yaw: f32, roll: f32) {
        self.rotation += Vec3::new(pitch, yaw, roll);
        self.dirty = true;
    }

    /// Set the per-axis scale
    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
        self.dirty = true;
    }

    /// Set the same scale on every axis
    pub fn set_uniform_scale(&mut self, scale: f32) {
        self.set_scale(Vec3::repeat(scale));
    }

    /// Flip the active flag
    pub fn toggle(&mut self) {
        self.active = !self.active;
        self.dirty = true;
    }

    /// Recompute the direction vectors, model matrix and bounding radius
    pub fn recompute(&mut self) {
        let (pitch, yaw) = (self.rotation.x.to_radians(), self.rotation.y.to_radians());
        let forward = Vec3::new(pitch.cos() * yaw.sin(), pitch.sin(), pitch.cos() * yaw.cos());

        self.forward = forward.try_normalize(f32::EPSILON).unwrap_or_else(Vec3::z);
        // Straight up or down has no horizontal heading, keep the previous right vector
        self.right = self
            .forward
            .cross(&-Vec3::y())
            .try_normalize(f32::EPSILON)
            .unwrap_or(self.right);
        self.up = self.forward.cross(&self.right).normalize();

        let basis = Rotation3::from_basis_unchecked(&[self.right, self.up, self.forward]);
        let rotation = Quat::from_rotation_matrix(&basis);

        self.model = compose_model_matrix(&self.position, &rotation, &self.scale);
        self.bounding_radius = self.scale.norm() * 0.5;
        self.dirty = false;
    }
}

/// Cull and recompute one world-space transform
///
/// `always_recompute` refreshes the transform even when it is clean or
/// culled, which the active camera needs.
pub fn update_world_transform(transform: &mut Transform, planes: &[Plane; 6], always_recompute: bool) {
    transform.visible =
        transform.active && is_sphere_inside_frustum(&transform.position, transform.bounding_radius, planes);

    if (transform.dirty && transform.visible) || always_recompute {
        transform.recompute();
    }
}

/// Cull and recompute every world-space transform in parallel
///
/// `camera` is the index of the transform to refresh unconditionally. The
/// chunks are processed on `pool` and the call blocks until all of them are
/// back. Every chunk is restored in its original place even when its job
/// panicked or was discarded; the first such error is returned.
pub fn update_world_transforms(
    pool: &JobPool,
    transforms: &mut Vec<Transform>,
    view_projection: &Mat4,
    camera: Option<usize>,
) -> Result<(), JobError> {
    let planes = extract_frustum_planes(view_projection);
    let ranges = partition_ranges(transforms.len(), pool.thread_count());

    let mut chunks = Vec::with_capacity(ranges.len());
    for &(start, _) in ranges.iter().rev() {
        chunks.push((start, Arc::new(Mutex::new(transforms.split_off(start)))));
    }
    chunks.reverse();

    let handles: Vec<_> = chunks
        .iter()
        .map(|(start, chunk)| {
            let chunk = Arc::clone(chunk);
            let camera = camera.and_then(|index| index.checked_sub(*start));
            pool.submit(move || {
                let mut chunk = chunk.lock();
                for (index, transform) in chunk.iter_mut().enumerate() {
                    update_world_transform(transform, &planes, camera == Some(index));
                }
            })
        })
        .collect();

    let mut result = Ok(());
    for handle in handles {
        if let Err(e) = handle.join() {
            log::error!("World transform batch failed: {e}");
            if result.is_ok() {
                result = Err(e);
            }
        }
    }

    for (_, chunk) in chunks {
        transforms.append(&mut chunk.lock());
    }
    result
}

/// Cull and recompute screen-space transforms against the screen rectangle
///
/// Screen-space transforms ignore rotation: the model matrix is translation * scale.
pub fn update_screen_transforms(transforms: &mut [Transform], screen_width: f32, screen_height: f32) {
    for transform in transforms {
        let position = transform.position;
        transform.visible = transform.active
            && (0.0..=screen_width).contains(&position.x)
            && (0.0..=screen_height).contains(&position.y);

        if !transform.dirty || !transform.visible {
            continue;
        }
        transform.model = Mat4::new_translation(&position) * Mat4::new_nonuniform_scaling(&transform.scale);
        transform.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Mat4Ext, Vec4};
    use approx::assert_relative_eq;

    fn view_projection() -> Mat4 {
        let projection = Mat4::perspective(90.0_f32.to_radians(), 1.0, 0.1, 100.0);
        let view = Mat4::look_at(Vec3::zeros(), Vec3::z(), Vec3::y());
        projection * view
    }

    #[test]
    fn test_recompute_unrotated_is_translation_times_scale() {
        let mut transform = Transform::from_position(Vec3::new(1.0, 2.0, 3.0));
        transform.set_uniform_scale(2.0);
        transform.recompute();

        let point = transform.model * Vec4::new(1.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(point, Vec4::new(3.0, 2.0, 3.0, 1.0), epsilon = 1e-5);
        assert_relative_eq!(transform.bounding_radius, 12.0_f32.sqrt() * 0.5, epsilon = 1e-6);
        assert!(!transform.dirty);
    }

    #[test]
    fn test_yaw_turns_forward_around_up() {
        let mut transform = Transform::default();
        transform.set_rotation(0.0, 90.0, 0.0);
        transform.recompute();

        assert_relative_eq!(transform.forward, Vec3::x(), epsilon = 1e-5);
        assert_relative_eq!(transform.up, Vec3::y(), epsilon = 1e-5);
        assert_relative_eq!(transform.right, -Vec3::z(), epsilon = 1e-5);
    }

    #[test]
    fn test_looking_straight_up_keeps_a_valid_basis() {
        let mut transform = Transform::default();
        transform.set_rotation(90.0, 0.0, 0.0);
        transform.recompute();

        assert!(transform.model.iter().all(|value| value.is_finite()));
        assert_relative_eq!(transform.forward, Vec3::y(), epsilon = 1e-5);
    }

    #[test]
    fn test_culled_and_inactive_transforms_are_invisible() {
        let planes = extract_frustum_planes(&view_projection());

        let mut ahead = Transform::from_position(Vec3::new(0.0, 0.0, 10.0));
        let mut behind = Transform::from_position(Vec3::new(0.0, 0.0, -10.0));
        let mut inactive = Transform::from_position(Vec3::new(0.0, 0.0, 10.0));
        inactive.toggle();

        update_world_transform(&mut ahead, &planes, false);
        update_world_transform(&mut behind, &planes, false);
        update_world_transform(&mut inactive, &planes, false);

        assert!(ahead.visible && !ahead.dirty);
        assert!(!behind.visible && behind.dirty, "culled transforms are not recomputed");
        assert!(!inactive.visible);
    }

    #[test]
    fn test_parallel_update_preserves_order_and_matches_serial() {
        let pool = JobPool::with_threads(3);
        let planes = extract_frustum_planes(&view_projection());

        let mut transforms: Vec<Transform> = (0..10)
            .map(|i| Transform::from_position(Vec3::new(i as f32 - 5.0, 0.0, 20.0 - i as f32 * 3.0)))
            .collect();
        let mut expected = transforms.clone();
        for (index, transform) in expected.iter_mut().enumerate() {
            update_world_transform(transform, &planes, index == 7);
        }

        update_world_transforms(&pool, &mut transforms, &view_projection(), Some(7)).unwrap();

        assert_eq!(transforms, expected);
    }

    #[test]
    fn test_camera_is_recomputed_even_when_culled() {
        let pool = JobPool::with_threads(2);
        let mut transforms = vec![
            Transform::from_position(Vec3::new(0.0, 0.0, -50.0)),
            Transform::from_position(Vec3::new(0.0, 0.0, -50.0)),
        ];

        update_world_transforms(&pool, &mut transforms, &view_projection(), Some(1)).unwrap();

        assert!(transforms[0].dirty);
        assert!(!transforms[1].dirty);
        assert!(!transforms[1].visible);
    }

    #[test]
    fn test_discarded_batches_keep_every_transform_in_place() {
        let mut pool = JobPool::with_threads(2);
        pool.shutdown();

        let mut transforms: Vec<Transform> =
            (0..10).map(|i| Transform::from_position(Vec3::new(0.0, 0.0, i as f32))).collect();
        let before = transforms.clone();

        let result = update_world_transforms(&pool, &mut transforms, &view_projection(), Some(3));

        assert_eq!(result, Err(JobError::Discarded));
        assert_eq!(transforms, before);
    }

    #[test]
    fn test_empty_update_is_a_no_op() {
        let pool = JobPool::with_threads(2);
        let mut transforms = Vec::new();
        update_world_transforms(&pool, &mut transforms, &view_projection(), None).unwrap();
        assert!(transforms.is_empty());
    }

    #[test]
    fn test_screen_transforms_cull_against_screen_rect() {
        let mut transforms = vec![
            Transform::from_position(Vec3::new(10.0, 10.0, 0.0)),
            Transform::from_position(Vec3::new(-1.0, 10.0, 0.0)),
        ];
        transforms[0].set_uniform_scale(2.0);

        update_screen_transforms(&mut transforms, 800.0, 600.0);

        assert!(transforms[0].visible);
        assert!(!transforms[1].visible);
        let corner = transforms[0].model * Vec4::new(1.0, 1.0, 0.0, 1.0);
        assert_relative_eq!(corner, Vec4::new(12.0, 12.0, 0.0, 1.0), epsilon = 1e-5);
    }
}
