//! Camera and viewer abstractions
//!
//! The cascade pipeline reads a camera as an immutable per-frame snapshot
//! through the [`Viewer`] trait.

use glam::{Mat4, Vec3};

/// Projection mode for a camera.
#[derive(Debug, Clone, Copy)]
pub enum Projection {
    /// Perspective projection.
    Perspective {
        /// Field of view in radians.
        fov: f32,
        /// Aspect ratio (width / height).
        aspect: f32,
        /// Near clipping plane.
        near: f32,
        /// Far clipping plane.
        far: f32,
    },
    /// Orthographic projection.
    Orthographic {
        /// Width of the view.
        width: f32,
        /// Height of the view.
        height: f32,
        /// Near clipping plane.
        near: f32,
        /// Far clipping plane.
        far: f32,
    },
}

impl Projection {
    /// Create a perspective projection.
    pub fn perspective(fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self::Perspective {
            fov: fov_degrees.to_radians(),
            aspect,
            near,
            far,
        }
    }

    /// Create an orthographic projection.
    pub fn orthographic(width: f32, height: f32, near: f32, far: f32) -> Self {
        Self::Orthographic {
            width,
            height,
            near,
            far,
        }
    }

    /// Get the projection matrix.
    pub fn matrix(&self) -> Mat4 {
        match *self {
            Projection::Perspective {
                fov,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh(fov, aspect, near, far),
            Projection::Orthographic {
                width,
                height,
                near,
                far,
            } => Mat4::orthographic_rh(
                -width / 2.0,
                width / 2.0,
                -height / 2.0,
                height / 2.0,
                near,
                far,
            ),
        }
    }

    /// Near and far clip distances.
    pub fn clip_planes(&self) -> (f32, f32) {
        match *self {
            Projection::Perspective { near, far, .. }
            | Projection::Orthographic { near, far, .. } => (near, far),
        }
    }

    /// Update the aspect ratio.
    pub fn set_aspect(&mut self, aspect: f32) {
        if let Projection::Perspective { aspect: a, .. } = self {
            *a = aspect;
        }
    }
}

/// Trait for objects that can view a scene.
pub trait Viewer {
    /// Get the camera position.
    fn position(&self) -> Vec3;

    /// Get the view matrix.
    fn view_matrix(&self) -> Mat4;

    /// Get the projection matrix.
    fn projection_matrix(&self) -> Mat4;

    /// Near clip distance.
    fn near(&self) -> f32;

    /// Far clip distance.
    fn far(&self) -> f32;

    /// Get the combined view-projection matrix.
    fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

/// A 3D camera.
#[derive(Debug, Clone)]
pub struct Camera {
    /// Camera position.
    pub position: Vec3,
    /// Point the camera is looking at.
    pub target: Vec3,
    /// Up vector.
    pub up: Vec3,
    /// Projection mode.
    pub projection: Projection,
}

impl Camera {
    /// Create a new perspective camera.
    pub fn new_perspective(
        position: Vec3,
        target: Vec3,
        up: Vec3,
        fov_degrees: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Self {
        Self {
            position,
            target,
            up,
            projection: Projection::perspective(fov_degrees, aspect, near, far),
        }
    }

    /// Create a new orthographic camera.
    pub fn new_orthographic(
        position: Vec3,
        target: Vec3,
        up: Vec3,
        width: f32,
        height: f32,
        near: f32,
        far: f32,
    ) -> Self {
        Self {
            position,
            target,
            up,
            projection: Projection::orthographic(width, height, near, far),
        }
    }

    /// Rotate the view direction about the camera's own position.
    pub fn rotate_about_eye(&mut self, rotation: glam::Quat) {
        let offset = self.target - self.position;
        self.target = self.position + rotation * offset;
    }
}

impl Viewer for Camera {
    fn position(&self) -> Vec3 {
        self.position
    }

    fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    fn projection_matrix(&self) -> Mat4 {
        self.projection.matrix()
    }

    fn near(&self) -> f32 {
        self.projection.clip_planes().0
    }

    fn far(&self) -> f32 {
        self.projection.clip_planes().1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_planes() {
        let cam = Camera::new_perspective(Vec3::ZERO, -Vec3::Z, Vec3::Y, 60.0, 1.5, 0.1, 50.0);
        assert_eq!(cam.near(), 0.1);
        assert_eq!(cam.far(), 50.0);
    }

    #[test]
    fn test_orthographic_camera() {
        let mut cam =
            Camera::new_orthographic(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y, 4.0, 2.0, 1.0, 9.0);
        assert_eq!((cam.near(), cam.far()), (1.0, 9.0));

        // The target maps to the centre of clip space.
        let clip = cam.view_projection_matrix().project_point3(Vec3::ZERO);
        assert!(clip.x.abs() < 1e-6 && clip.y.abs() < 1e-6);

        cam.projection.set_aspect(2.0);
        assert_eq!((cam.near(), cam.far()), (1.0, 9.0));
    }

    #[test]
    fn test_rotate_about_eye_keeps_position() {
        let mut cam =
            Camera::new_perspective(Vec3::new(1.0, 2.0, 3.0), Vec3::ZERO, Vec3::Y, 60.0, 1.0, 0.1, 10.0);
        let dist = (cam.target - cam.position).length();
        cam.rotate_about_eye(glam::Quat::from_rotation_y(1.0));
        assert_eq!(cam.position, Vec3::new(1.0, 2.0, 3.0));
        assert!(((cam.target - cam.position).length() - dist).abs() < 1e-5);
    }
}
