//! Cameras as seen by the composer.
//!
//! The composer only needs three things from a camera: a view matrix, a
//! projection matrix and the eye position. [`SceneCamera`] is that contract;
//! [`Camera`] is a simple implementation of it.

use glam::{Mat4, Vec3};

/// What the composer reads from a camera at the start of a frame.
pub trait SceneCamera {
    /// World-to-view transform.
    fn view_matrix(&self) -> Mat4;
    /// View-to-clip transform (wgpu depth range, 0..1).
    fn projection_matrix(&self) -> Mat4;
    /// Eye position in world space, used for specular lighting.
    fn position(&self) -> Vec3;
}

/// A snapshot of a camera taken by `begin_scene`.
///
/// Later changes to the camera do not affect a frame already in flight.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraView {
    pub projection: Mat4,
    pub view: Mat4,
    pub position: Vec3,
}

impl CameraView {
    pub fn of<C: SceneCamera + ?Sized>(camera: &C) -> Self {
        Self {
            projection: camera.projection_matrix(),
            view: camera.view_matrix(),
            position: camera.position(),
        }
    }
}

/// A perspective camera defined by position, orientation and field of view.
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
    pub fov: f32, // radians
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            forward: Vec3::NEG_Z,
            up: Vec3::Y,
            fov: 45f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(mut self, x: f32, y: f32, z: f32) -> Self {
        self.position = Vec3::new(x, y, z);
        self
    }

    pub fn looking_at(mut self, target_x: f32, target_y: f32, target_z: f32) -> Self {
        let forward = (Vec3::new(target_x, target_y, target_z) - self.position).normalize_or_zero();
        if forward != Vec3::ZERO {
            self.forward = forward;
        }
        self
    }

    pub fn with_fov(mut self, fov_degrees: f32) -> Self {
        self.fov = fov_degrees.to_radians();
        self
    }

    pub fn with_clip(mut self, near: f32, far: f32) -> Self {
        self.near = near;
        self.far = far;
        self
    }

    /// Updates the aspect ratio from a viewport size. Zero heights are ignored.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    /// Compute the right vector from forward and up.
    pub fn right(&self) -> Vec3 {
        self.forward.cross(self.up).normalize_or_zero()
    }

    /// Recompute up to be orthogonal to forward and right.
    pub fn orthogonal_up(&self) -> Vec3 {
        self.right().cross(self.forward).normalize_or_zero()
    }

    /// Rotates the view direction by yaw (around world up) and pitch (around right).
    ///
    /// Pitch is clamped just short of straight up/down so `forward` never
    /// becomes parallel to `up`.
    pub fn rotate(&mut self, yaw: f32, pitch: f32) {
        let current_pitch = self.forward.dot(self.up).clamp(-1.0, 1.0).asin();
        let limit = 89f32.to_radians();
        let pitch = (current_pitch + pitch).clamp(-limit, limit) - current_pitch;

        let yawed = glam::Quat::from_axis_angle(self.up, -yaw) * self.forward;
        let right = yawed.cross(self.up).normalize_or_zero();
        self.forward = (glam::Quat::from_axis_angle(right, pitch) * yawed).normalize_or_zero();
    }
}

impl SceneCamera for Camera {
    fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward, self.up)
    }

    fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far)
    }

    fn position(&self) -> Vec3 {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looking_at_points_forward_to_target() {
        let camera = Camera::new().at(0.0, 0.0, 10.0).looking_at(0.0, 0.0, 0.0);
        assert!((camera.forward - Vec3::NEG_Z).length() < 1e-6);
    }

    #[test]
    fn view_matrix_moves_eye_to_origin() {
        let camera = Camera::new().at(1.0, 2.0, 3.0);
        let eye = camera.view_matrix().transform_point3(camera.position);
        assert!(eye.length() < 1e-5);
    }

    #[test]
    fn snapshot_copies_camera_state() {
        let mut camera = Camera::new().at(4.0, 0.0, 0.0);
        let view = CameraView::of(&camera);
        camera.position = Vec3::ZERO;
        assert_eq!(view.position, Vec3::new(4.0, 0.0, 0.0));
    }

    #[test]
    fn pitch_is_clamped_below_vertical() {
        let mut camera = Camera::new();
        camera.rotate(0.0, 10.0);
        assert!(camera.forward.dot(camera.up) < 1.0);
        assert!(camera.right().length() > 0.9);
    }

    #[test]
    fn zero_height_viewport_keeps_aspect() {
        let mut camera = Camera::new();
        camera.set_viewport(800, 600);
        let aspect = camera.aspect;
        camera.set_viewport(800, 0);
        assert_eq!(camera.aspect, aspect);
    }
}
