//! Orbit camera and bounding-box framing for the model viewport.

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Extra room left around a framed model
const FRAME_MARGIN: f32 = 1.5;

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Bounds {
    /// Bounds of a flat `[x, y, z, x, y, z, ...]` buffer. `None` when empty.
    pub fn from_flat(positions: &[f32]) -> Option<Self> {
        Self::from_points(positions.chunks_exact(3).map(|p| [p[0], p[1], p[2]]))
    }

    pub fn from_points(points: impl IntoIterator<Item = [f32; 3]>) -> Option<Self> {
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        let mut any = false;
        for p in points {
            let v = Vec3::from(p);
            if !v.is_finite() {
                continue;
            }
            min = min.min(v);
            max = max.max(v);
            any = true;
        }
        any.then(|| Self {
            min: min.into(),
            max: max.into(),
        })
    }

    pub fn center(&self) -> Vec3 {
        (Vec3::from(self.min) + Vec3::from(self.max)) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        Vec3::from(self.max) - Vec3::from(self.min)
    }

    pub fn max_dimension(&self) -> f32 {
        self.size().max_element()
    }
}

/// Serializable camera placement for a framed model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraFraming {
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub distance: f32,
    pub near: f32,
    pub far: f32,
}

/// Orbit camera: yaw/pitch around a target point
#[derive(Debug, Clone)]
pub struct OrbitCamera {
    /// Horizontal rotation angle (radians)
    pub yaw: f32,
    /// Vertical rotation angle (radians)
    pub pitch: f32,
    /// Distance from target
    pub distance: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    /// Camera target point
    pub target: Vec3,
    /// Vertical field of view (radians)
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl OrbitCamera {
    pub fn new() -> Self {
        Self {
            yaw: 0.6,
            pitch: 0.4,
            distance: 6.0,
            min_distance: 0.5,
            max_distance: 100.0,
            target: Vec3::ZERO,
            fov: 45.0_f32.to_radians(),
            near: 0.1,
            far: 200.0,
        }
    }

    /// Rotate by mouse delta, in degrees
    pub fn rotate(&mut self, dx: f32, dy: f32) {
        self.yaw += dx.to_radians();
        self.pitch = (self.pitch + dy.to_radians()).clamp(-1.5, 1.5);
    }

    /// Positive delta moves closer
    pub fn zoom(&mut self, delta: f32) {
        self.distance = (self.distance * (1.0 - delta)).clamp(self.min_distance, self.max_distance);
    }

    pub fn pan(&mut self, dx: f32, dy: f32) {
        let offset = self.right_vector() * dx + self.up_vector() * dy;
        self.target += offset;
    }

    /// Point the camera at `bounds` from the current yaw/pitch, far enough
    /// back that the whole box fits in the vertical field of view.
    pub fn frame_bounds(&mut self, bounds: &Bounds) {
        let max_dim = bounds.max_dimension();
        let distance = if max_dim.is_finite() && max_dim > f32::EPSILON {
            (max_dim / 2.0 / (self.fov / 2.0).tan()).abs() * FRAME_MARGIN
        } else {
            1.0
        };

        self.target = bounds.center();
        self.distance = distance;
        self.min_distance = distance / 100.0;
        self.max_distance = distance * 10.0;
        self.near = (distance / 100.0).max(0.001);
        self.far = distance * 100.0;
    }

    pub fn framing(&self) -> CameraFraming {
        CameraFraming {
            position: self.eye_position().into(),
            target: self.target.into(),
            distance: self.distance,
            near: self.near,
            far: self.far,
        }
    }

    /// Camera position in world space
    pub fn eye_position(&self) -> Vec3 {
        let cy = self.yaw.cos();
        let sy = self.yaw.sin();
        let cp = self.pitch.cos();
        let sp = self.pitch.sin();

        self.target
            + Vec3::new(
                self.distance * cp * sy,
                self.distance * sp,
                self.distance * cp * cy,
            )
    }

    /// View matrix (world -> camera)
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye_position(), self.target, Vec3::Y)
    }

    /// Projection matrix (camera -> clip)
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh_gl(self.fov, aspect, self.near, self.far)
    }

    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        self.projection_matrix(aspect) * self.view_matrix()
    }

    fn right_vector(&self) -> Vec3 {
        let fwd = (self.target - self.eye_position()).normalize_or_zero();
        fwd.cross(Vec3::Y).normalize_or_zero()
    }

    fn up_vector(&self) -> Vec3 {
        let fwd = (self.target - self.eye_position()).normalize_or_zero();
        self.right_vector().cross(fwd).normalize_or_zero()
    }
}

/// Framing for a model with the default view angles
pub fn frame(bounds: &Bounds) -> CameraFraming {
    let mut camera = OrbitCamera::new();
    camera.frame_bounds(bounds);
    camera.framing()
}
