use glam::{Mat4, Vec3};

/// Projection and view matrices shared by every draw of a frame.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Camera {
    pub projection: Mat4,
    pub view: Mat4,
}

impl Camera {
    pub const fn new(projection: Mat4, view: Mat4) -> Self {
        Self { projection, view }
    }

    /// Right-handed perspective camera with a 0..1 depth range.
    pub fn perspective(fov_y_radians: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            projection: Mat4::perspective_rh(fov_y_radians, aspect, near, far),
            view: Mat4::IDENTITY,
        }
    }

    pub fn looking_at(mut self, eye: Vec3, target: Vec3, up: Vec3) -> Self {
        self.view = Mat4::look_at_rh(eye, target, up);
        self
    }

    /// Replaces the projection, typically after a resize. The view is kept.
    pub fn set_perspective(&mut self, fov_y_radians: f32, aspect: f32, near: f32, far: f32) {
        self.projection = Mat4::perspective_rh(fov_y_radians, aspect, near, far);
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY)
    }
}
