use glam::{Mat4, Vec3};

pub const FOV_Y_DEGREES: f32 = 55.0;
pub const NEAR: f32 = 0.1;
pub const FAR: f32 = 100.0;
pub const POSITION: Vec3 = Vec3::new(0.0, 0.6, 4.2);

/// Perspective camera looking down -Z from a fixed position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerspectiveCamera {
    pub fov_y_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
    projection: Mat4,
}

impl PerspectiveCamera {
    pub fn new(aspect: f32) -> Self {
        let mut camera = Self {
            fov_y_degrees: FOV_Y_DEGREES,
            aspect: 1.0,
            near: NEAR,
            far: FAR,
            position: POSITION,
            projection: Mat4::IDENTITY,
        };
        camera.set_aspect(aspect);
        camera
    }

    /// Updates the aspect ratio and rebuilds the projection.
    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = if aspect.is_finite() && aspect > 0.0 {
            aspect
        } else {
            1.0
        };
        self.projection = Mat4::perspective_rh(
            self.fov_y_degrees.to_radians(),
            self.aspect,
            self.near,
            self.far,
        );
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, Vec3::NEG_Z, Vec3::Y)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view()
    }
}

impl Default for PerspectiveCamera {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_sets_aspect_without_drift() {
        let mut camera = PerspectiveCamera::new(800.0 / 600.0);
        camera.set_aspect(400.0 / 300.0);
        let first = camera.projection();
        camera.set_aspect(400.0 / 300.0);
        assert_eq!(camera.aspect, 400.0 / 300.0);
        assert_eq!(camera.projection(), first);
    }

    #[test]
    fn degenerate_aspect_falls_back_to_square() {
        let mut camera = PerspectiveCamera::new(0.0);
        assert_eq!(camera.aspect, 1.0);
        camera.set_aspect(f32::NAN);
        assert_eq!(camera.aspect, 1.0);
    }

    #[test]
    fn scene_origin_projects_in_front_of_the_camera() {
        let camera = PerspectiveCamera::new(16.0 / 9.0);
        let clip = camera.view_projection() * glam::Vec4::new(0.0, 0.0, -1.0, 1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(clip.w > 0.0);
        assert!(ndc.x.abs() < 1e-5);
        assert!(ndc.y < 0.0 && ndc.y > -1.0);
        assert!((0.0..1.0).contains(&ndc.z));
    }

    #[test]
    fn points_beyond_far_plane_are_clipped() {
        let camera = PerspectiveCamera::default();
        let clip = camera.view_projection() * glam::Vec4::new(0.0, 0.6, -200.0, 1.0);
        assert!(clip.z / clip.w > 1.0);
    }
}
