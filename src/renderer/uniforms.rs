use bytemuck::{Pod, Zeroable};

use crate::renderer::shadows::{ShadowGlobals, MAX_TILES};
use crate::settings::MAX_CASCADES;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct DirectionalShadowUniform {
    pub atlas_matrices: [[[f32; 4]; 4]; MAX_TILES],
    pub cascade_culling_spheres: [[f32; 4]; MAX_CASCADES],
    pub cascade_data: [[f32; 4]; MAX_CASCADES],
    pub distance_fade: [f32; 4],
    pub atlas_size: [f32; 4],
    /// (cascade count, filter selector, blend selector, mask selector).
    pub selectors: [u32; 4],
}

impl DirectionalShadowUniform {
    pub fn from_globals(globals: &ShadowGlobals) -> Self {
        let mut uniform = Self::zeroed();

        for (dst, src) in uniform
            .atlas_matrices
            .iter_mut()
            .zip(globals.atlas_matrices.iter())
        {
            *dst = src.to_cols_array_2d();
        }
        for (dst, src) in uniform
            .cascade_culling_spheres
            .iter_mut()
            .zip(globals.cascade_culling_spheres.iter())
        {
            *dst = src.to_array();
        }
        for (dst, src) in uniform
            .cascade_data
            .iter_mut()
            .zip(globals.cascade_data.iter())
        {
            *dst = src.to_array();
        }

        uniform.distance_fade = globals.distance_fade.to_array();
        uniform.atlas_size = globals.atlas_size.to_array();
        uniform.selectors = [
            globals.cascade_count,
            globals.filter.ordinal(),
            globals.blend.ordinal(),
            globals.mask_mode.ordinal(),
        ];

        uniform
    }
}
