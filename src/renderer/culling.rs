use glam::{Mat4, Vec3, Vec4};

use crate::renderer::camera::ShadowCamera;
use crate::settings::MAX_CASCADES;

/// Axis-aligned bounds of a light's visible shadow casters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CasterBounds {
    pub center: Vec3,
    pub extents: Vec3,
}

impl CasterBounds {
    pub fn radius(&self) -> f32 {
        self.extents.length()
    }
}

/// One cascade's worth of culling output: the sphere used both for caster
/// culling and for run-time distance-based cascade selection.
#[derive(Debug, Clone, Copy)]
pub struct SplitData {
    /// xyz = world-space center, w = radius (pre-shrink).
    pub culling_sphere: Vec4,
    pub blend_culling_factor: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct CascadeSlice {
    pub view: Mat4,
    pub proj: Mat4,
    pub split: SplitData,
}

impl CascadeSlice {
    pub fn view_proj(&self) -> Mat4 {
        self.proj * self.view
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CascadeRequest {
    pub light_index: u32,
    pub cascade_index: u32,
    pub cascade_count: u32,
    pub split_ratios: [f32; MAX_CASCADES - 1],
    pub tile_size: u32,
    pub near_plane_offset: f32,
    pub blend_culling_factor: f32,
}

/// Culling collaborator seam. The renderer's visibility system answers which
/// lights have visible casters and how each cascade projects onto them.
pub trait CullingProvider {
    fn caster_bounds(&self, light_index: u32) -> Option<CasterBounds>;
    fn cascade_slice(&self, request: &CascadeRequest) -> CascadeSlice;
}

struct CulledLight {
    direction: Vec3,
    caster_bounds: Option<CasterBounds>,
}

/// CPU cascade culling over a camera frustum.
///
/// Slices the view frustum into distance bands, wraps each band in a
/// bounding sphere, and builds a light-space orthographic projection over
/// it. Sphere centers snap to the cascade texel grid to stop shadow
/// swimming when the camera translates.
pub struct FrustumCulling {
    camera: ShadowCamera,
    max_distance: f32,
    lights: Vec<CulledLight>,
}

impl FrustumCulling {
    pub fn new(camera: ShadowCamera, max_distance: f32) -> Self {
        Self {
            camera,
            max_distance,
            lights: Vec::new(),
        }
    }

    /// Registers a visible light and returns its index in the visible set.
    pub fn push_light(&mut self, direction: Vec3, caster_bounds: Option<CasterBounds>) -> u32 {
        let index = self.lights.len() as u32;
        self.lights.push(CulledLight {
            direction: direction.normalize_or_zero(),
            caster_bounds,
        });
        index
    }

    fn light(&self, index: u32) -> &CulledLight {
        let clamped = (index as usize).min(self.lights.len().saturating_sub(1));
        if clamped != index as usize {
            log::warn!(
                "Light index {} clamped to {} (visible lights: {})",
                index,
                clamped,
                self.lights.len()
            );
        }
        &self.lights[clamped]
    }

    fn band(&self, cascade_index: u32, cascade_count: u32, ratios: &[f32; MAX_CASCADES - 1]) -> (f32, f32) {
        let near = if cascade_index == 0 {
            self.camera.near
        } else {
            ratios[cascade_index as usize - 1] * self.max_distance
        };
        let far = if cascade_index + 1 >= cascade_count {
            self.max_distance
        } else {
            ratios[cascade_index as usize] * self.max_distance
        };
        (near, far.max(near + 1e-3))
    }
}

impl CullingProvider for FrustumCulling {
    fn caster_bounds(&self, light_index: u32) -> Option<CasterBounds> {
        self.lights
            .get(light_index as usize)
            .and_then(|light| light.caster_bounds)
    }

    fn cascade_slice(&self, request: &CascadeRequest) -> CascadeSlice {
        let (near, far) = self.band(
            request.cascade_index,
            request.cascade_count,
            &request.split_ratios,
        );
        let corners = self.camera.slice_corners(near, far);

        let center = corners.iter().copied().sum::<Vec3>() / 8.0;
        let radius = corners
            .iter()
            .map(|corner| (*corner - center).length())
            .fold(0.0f32, f32::max);

        // Snap the sphere center to whole shadow texels.
        let texel = (2.0 * radius) / request.tile_size.max(1) as f32;
        let center = Vec3::new(
            (center.x / texel).floor() * texel,
            (center.y / texel).floor() * texel,
            (center.z / texel).floor() * texel,
        );

        let light = self.light(request.light_index);
        let mut direction = light.direction;
        if direction.length_squared() < 1e-6 {
            direction = Vec3::NEG_Y;
        }
        let up = if direction.dot(Vec3::Y).abs() > 0.95 {
            Vec3::Z
        } else {
            Vec3::Y
        };

        let eye = center - direction * (radius + request.near_plane_offset);
        let view = Mat4::look_at_rh(eye, center, up);
        // -1..1 clip depth; the atlas matrix and depth shader remap to 0..1.
        let proj = Mat4::orthographic_rh_gl(
            -radius,
            radius,
            -radius,
            radius,
            0.0,
            2.0 * radius + request.near_plane_offset,
        );

        CascadeSlice {
            view,
            proj,
            split: SplitData {
                culling_sphere: center.extend(radius),
                blend_culling_factor: request.blend_culling_factor,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> ShadowCamera {
        ShadowCamera::from_look_at(
            Vec3::new(0.0, 2.0, 8.0),
            Vec3::ZERO,
            Vec3::Y,
            60_f32.to_radians(),
            16.0 / 9.0,
            0.1,
        )
    }

    fn request(cascade_index: u32) -> CascadeRequest {
        CascadeRequest {
            light_index: 0,
            cascade_index,
            cascade_count: 4,
            split_ratios: [0.1, 0.25, 0.5],
            tile_size: 512,
            near_plane_offset: 0.0,
            blend_culling_factor: 0.7,
        }
    }

    #[test]
    fn cascade_sphere_encloses_its_frustum_slice() {
        let mut culling = FrustumCulling::new(camera(), 50.0);
        culling.push_light(Vec3::new(0.3, -1.0, 0.2), None);

        let slice = culling.cascade_slice(&request(1));
        let sphere = slice.split.culling_sphere;
        let center = sphere.truncate();
        let radius = sphere.w;

        // Texel snapping moves the center by less than one texel per axis.
        let texel = 2.0 * radius / 512.0;
        let slack = texel * 3.0_f32.sqrt();
        for corner in camera().slice_corners(0.1 * 50.0, 0.25 * 50.0) {
            assert!((corner - center).length() <= radius + slack);
        }
    }

    #[test]
    fn cascade_bands_are_monotone() {
        let culling = FrustumCulling::new(camera(), 50.0);
        let ratios = [0.1, 0.25, 0.5];
        let mut previous_far = 0.0;
        for cascade in 0..4 {
            let (near, far) = culling.band(cascade, 4, &ratios);
            assert!(far > near);
            assert!(near >= previous_far - 1e-3);
            previous_far = far;
        }
        assert_eq!(previous_far, 50.0);
    }

    #[test]
    fn vertical_light_direction_still_builds_a_finite_view() {
        let mut culling = FrustumCulling::new(camera(), 50.0);
        culling.push_light(Vec3::NEG_Y, None);

        let slice = culling.cascade_slice(&request(0));
        assert!(slice
            .view_proj()
            .to_cols_array()
            .iter()
            .all(|value| value.is_finite()));
    }

    #[test]
    fn caster_bounds_round_trip() {
        let mut culling = FrustumCulling::new(camera(), 50.0);
        let bounds = CasterBounds {
            center: Vec3::splat(1.0),
            extents: Vec3::splat(2.0),
        };
        let with_bounds = culling.push_light(Vec3::NEG_Y, Some(bounds));
        let without = culling.push_light(Vec3::NEG_Y, None);

        assert_eq!(culling.caster_bounds(with_bounds), Some(bounds));
        assert_eq!(culling.caster_bounds(without), None);
        assert_eq!(culling.caster_bounds(99), None);
    }
}
