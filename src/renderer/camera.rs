use glam::Vec3;

/// View description used to slice the camera frustum into cascade bands.
#[derive(Debug, Clone, Copy)]
pub struct ShadowCamera {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
}

impl ShadowCamera {
    pub fn from_look_at(eye: Vec3, target: Vec3, up: Vec3, fov_y: f32, aspect: f32, near: f32) -> Self {
        let forward = (target - eye).normalize_or_zero();
        Self {
            position: eye,
            forward,
            up,
            fov_y,
            aspect,
            near,
        }
    }

    pub(crate) fn right(&self) -> Vec3 {
        self.forward.cross(self.up).normalize_or_zero()
    }

    /// World-space corners of the frustum slice covering [near, far].
    pub(crate) fn slice_corners(&self, near: f32, far: f32) -> [Vec3; 8] {
        let tan_half_fov = (self.fov_y * 0.5).tan();
        let right = self.right();
        let up = right.cross(self.forward).normalize_or_zero();

        let near_height = near * tan_half_fov;
        let near_width = near_height * self.aspect;
        let far_height = far * tan_half_fov;
        let far_width = far_height * self.aspect;

        let near_center = self.position + self.forward * near;
        let far_center = self.position + self.forward * far;

        [
            near_center - up * near_height - right * near_width,
            near_center - up * near_height + right * near_width,
            near_center + up * near_height + right * near_width,
            near_center + up * near_height - right * near_width,
            far_center - up * far_height - right * far_width,
            far_center - up * far_height + right * far_width,
            far_center + up * far_height + right * far_width,
            far_center + up * far_height - right * far_width,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_corners_straddle_the_view_axis() {
        let camera = ShadowCamera::from_look_at(
            Vec3::ZERO,
            Vec3::NEG_Z,
            Vec3::Y,
            60_f32.to_radians(),
            16.0 / 9.0,
            0.1,
        );
        let corners = camera.slice_corners(1.0, 10.0);

        let center = corners.iter().copied().sum::<Vec3>() / 8.0;
        assert!(center.z < 0.0);
        assert!(corners[..4].iter().all(|c| (c.z + 1.0).abs() < 1e-4));
        assert!(corners[4..].iter().all(|c| (c.z + 10.0).abs() < 1e-4));
    }
}
