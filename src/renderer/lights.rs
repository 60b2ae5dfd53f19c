use glam::Vec4;

pub const MAX_SHADOWED_DIRECTIONAL_LIGHTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadowMode {
    #[default]
    None,
    Hard,
    Soft,
}

/// Per-light description consumed during reservation. Direction and caster
/// geometry live with the culling provider; this is only what shadow
/// reservation itself needs to know.
#[derive(Debug, Clone, Copy)]
pub struct DirectionalLight {
    pub shadow_mode: ShadowMode,
    pub shadow_strength: f32,
    pub slope_scale_bias: f32,
    pub near_plane_offset: f32,
    pub normal_bias: f32,
    /// Some(channel) when the light is baked with mixed lighting and owns a
    /// shadow-mask occlusion channel.
    pub shadowmask_channel: Option<i32>,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            shadow_mode: ShadowMode::Soft,
            shadow_strength: 1.0,
            slope_scale_bias: 1.0,
            near_plane_offset: 0.0,
            normal_bias: 1.0,
            shadowmask_channel: None,
        }
    }
}

/// Per-light shading parameters returned from reservation.
///
/// The encoding is what the shading stage decodes: `strength == 0` means the
/// light casts no shadow at all, `strength < 0` means no real-time
/// contribution this frame but baked mask data may still apply, and
/// `mask_channel == -1` means no mask channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowParams {
    pub strength: f32,
    pub tile_offset: f32,
    pub normal_bias: f32,
    pub mask_channel: f32,
}

impl ShadowParams {
    pub const DISABLED: ShadowParams = ShadowParams {
        strength: 0.0,
        tile_offset: 0.0,
        normal_bias: 0.0,
        mask_channel: -1.0,
    };

    pub(crate) fn mask_only(strength: f32, mask_channel: f32) -> Self {
        Self {
            strength: -strength,
            tile_offset: 0.0,
            normal_bias: 0.0,
            mask_channel,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.strength == 0.0
    }

    pub fn is_mask_only(&self) -> bool {
        self.strength < 0.0
    }

    pub fn to_vec4(&self) -> Vec4 {
        Vec4::new(
            self.strength,
            self.tile_offset,
            self.normal_bias,
            self.mask_channel,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_params_encode_as_zero_strength_no_channel() {
        let params = ShadowParams::DISABLED;
        assert!(params.is_disabled());
        assert!(!params.is_mask_only());
        assert_eq!(params.to_vec4(), Vec4::new(0.0, 0.0, 0.0, -1.0));
    }

    #[test]
    fn mask_only_params_negate_strength_and_keep_channel() {
        let params = ShadowParams::mask_only(0.75, 2.0);
        assert!(params.is_mask_only());
        assert!(!params.is_disabled());
        assert_eq!(params.to_vec4(), Vec4::new(-0.75, 0.0, 0.0, 2.0));
    }
}
