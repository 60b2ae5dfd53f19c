use glam::{Mat4, Vec2, Vec4};
use thiserror::Error;

use crate::renderer::culling::{CascadeRequest, CascadeSlice, CullingProvider};
use crate::renderer::lights::{
    DirectionalLight, ShadowMode, ShadowParams, MAX_SHADOWED_DIRECTIONAL_LIGHTS,
};
use crate::settings::{CascadeBlend, FilterQuality, ShadowSettings, ShadowmaskQuality, MAX_CASCADES};

pub const MAX_TILES: usize = MAX_SHADOWED_DIRECTIONAL_LIGHTS * MAX_CASCADES;

const SQRT_2: f32 = std::f32::consts::SQRT_2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FramePhase {
    #[default]
    Idle,
    Reserving,
    Rendered,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("reserve is only valid between begin_frame and render (frame phase: {phase:?})")]
    ReserveOutsidePhase { phase: FramePhase },
    #[error("render is allowed once per frame, after begin_frame (frame phase: {phase:?})")]
    RenderOutsidePhase { phase: FramePhase },
}

/// Shadow-mask selector published to the shading stage. Mutually exclusive;
/// Always/Distance come from settings and apply only when some reserved or
/// mask-baked light carries an occlusion channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskMode {
    Off,
    Always,
    Distance,
}

impl MaskMode {
    pub fn ordinal(self) -> u32 {
        match self {
            MaskMode::Off => 0,
            MaskMode::Always => 1,
            MaskMode::Distance => 2,
        }
    }
}

/// Pixel-space atlas tile rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileViewport {
    pub x: u32,
    pub y: u32,
    pub size: u32,
}

/// Everything the shading stage reads once a frame's atlas is rendered.
#[derive(Debug, Clone, Copy)]
pub struct ShadowGlobals {
    pub cascade_count: u32,
    pub cascade_culling_spheres: [Vec4; MAX_CASCADES],
    pub cascade_data: [Vec4; MAX_CASCADES],
    pub atlas_matrices: [Mat4; MAX_TILES],
    /// (1/maxDistance, 1/fadeFraction, 1/(1 - f^2)) with f = 1 - cascadeFade.
    pub distance_fade: Vec4,
    /// (atlasSize, 1/atlasSize, 0, 0).
    pub atlas_size: Vec4,
    pub filter: FilterQuality,
    pub blend: CascadeBlend,
    pub mask_mode: MaskMode,
}

/// Command-recording seam toward the GPU backend.
///
/// Calls arrive in strict program order: `publish_mask_mode` on every render
/// call (including zero-light frames that never touch the atlas), then
/// `begin_atlas` once, per tile viewport / bias / draw / bias-reset, and
/// finally `publish`.
pub trait ShadowRecorder {
    fn uses_reversed_z(&self) -> bool;
    fn begin_atlas(&mut self, size: u32);
    fn set_viewport(&mut self, viewport: TileViewport);
    fn set_depth_bias(&mut self, constant: f32, slope_scale: f32);
    fn draw_shadows(&mut self, light_index: u32, slice: &CascadeSlice);
    fn publish(&mut self, globals: &ShadowGlobals);
    fn publish_mask_mode(&mut self, mode: MaskMode);
}

#[derive(Debug, Clone, Copy, Default)]
struct ReservedLight {
    visible_index: u32,
    slope_scale_bias: f32,
    near_plane_offset: f32,
}

/// Per-frame scratch state, owned by the caller and handed to every
/// reservation/render call. Nothing in here survives `begin_frame`.
pub struct ShadowFrame {
    phase: FramePhase,
    reserved: [ReservedLight; MAX_SHADOWED_DIRECTIONAL_LIGHTS],
    reserved_count: usize,
    uses_shadow_mask: bool,
    cascade_culling_spheres: [Vec4; MAX_CASCADES],
    cascade_data: [Vec4; MAX_CASCADES],
    atlas_matrices: [Mat4; MAX_TILES],
}

impl ShadowFrame {
    pub fn new() -> Self {
        Self {
            phase: FramePhase::Idle,
            reserved: [ReservedLight::default(); MAX_SHADOWED_DIRECTIONAL_LIGHTS],
            reserved_count: 0,
            uses_shadow_mask: false,
            cascade_culling_spheres: [Vec4::ZERO; MAX_CASCADES],
            cascade_data: [Vec4::ZERO; MAX_CASCADES],
            atlas_matrices: [Mat4::IDENTITY; MAX_TILES],
        }
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub fn reserved_lights(&self) -> usize {
        self.reserved_count
    }

    pub fn uses_shadow_mask(&self) -> bool {
        self.uses_shadow_mask
    }

    pub fn atlas_matrices(&self) -> &[Mat4; MAX_TILES] {
        &self.atlas_matrices
    }

    fn reset(&mut self) {
        self.phase = FramePhase::Reserving;
        self.reserved_count = 0;
        self.uses_shadow_mask = false;
    }
}

impl Default for ShadowFrame {
    fn default() -> Self {
        Self::new()
    }
}

/// Directional shadow atlas planner.
///
/// Reservation runs once per visible shadow-casting light and decides,
/// before any GPU work, whether the light gets atlas tiles; rendering runs
/// once per frame, packs every reserved light's cascades into the atlas and
/// publishes the shading globals.
pub struct ShadowAtlas {
    settings: ShadowSettings,
}

impl ShadowAtlas {
    pub fn new(settings: ShadowSettings) -> Self {
        Self {
            settings: settings.validate(),
        }
    }

    pub fn settings(&self) -> &ShadowSettings {
        &self.settings
    }

    pub fn begin_frame(&self, frame: &mut ShadowFrame) {
        frame.reset();
    }

    pub fn reserve<C: CullingProvider>(
        &self,
        frame: &mut ShadowFrame,
        culling: &C,
        light: &DirectionalLight,
        visible_index: u32,
    ) -> Result<ShadowParams, FrameError> {
        if frame.phase != FramePhase::Reserving {
            return Err(FrameError::ReserveOutsidePhase { phase: frame.phase });
        }

        if frame.reserved_count >= MAX_SHADOWED_DIRECTIONAL_LIGHTS {
            return Ok(ShadowParams::DISABLED);
        }
        if light.shadow_mode == ShadowMode::None || light.shadow_strength <= 0.0 {
            return Ok(ShadowParams::DISABLED);
        }

        let mut mask_channel = -1.0;
        if let Some(channel) = light.shadowmask_channel {
            frame.uses_shadow_mask = true;
            mask_channel = channel as f32;
        }

        if culling.caster_bounds(visible_index).is_none() {
            // Shadow-enabled but nothing casts this frame; the shading stage
            // can still apply the baked mask.
            return Ok(ShadowParams::mask_only(light.shadow_strength, mask_channel));
        }

        let slot = frame.reserved_count;
        frame.reserved[slot] = ReservedLight {
            visible_index,
            slope_scale_bias: light.slope_scale_bias,
            near_plane_offset: light.near_plane_offset,
        };
        frame.reserved_count += 1;

        Ok(ShadowParams {
            strength: light.shadow_strength,
            tile_offset: (self.settings.cascade_count as usize * slot) as f32,
            normal_bias: light.normal_bias,
            mask_channel,
        })
    }

    pub fn render<C: CullingProvider, R: ShadowRecorder>(
        &self,
        frame: &mut ShadowFrame,
        culling: &C,
        recorder: &mut R,
    ) -> Result<(), FrameError> {
        if frame.phase != FramePhase::Reserving {
            return Err(FrameError::RenderOutsidePhase { phase: frame.phase });
        }
        frame.phase = FramePhase::Rendered;

        let mask_mode = if frame.uses_shadow_mask {
            match self.settings.shadowmask {
                ShadowmaskQuality::Always => MaskMode::Always,
                ShadowmaskQuality::Distance => MaskMode::Distance,
            }
        } else {
            MaskMode::Off
        };
        recorder.publish_mask_mode(mask_mode);

        if frame.reserved_count == 0 {
            return Ok(());
        }

        let cascade_count = self.settings.cascade_count;
        let tiles = self.settings.tile_count(frame.reserved_count as u32);
        let split = split_factor(tiles);
        let tile_size = self.settings.atlas_size / split;
        log::debug!(
            "Shadow atlas: {} lights, {} tiles, split {}, tile size {}",
            frame.reserved_count,
            tiles,
            split,
            tile_size
        );

        recorder.begin_atlas(self.settings.atlas_size);
        let blend_culling_factor = (0.8 - self.settings.cascade_fade).max(0.0);
        let reversed_z = recorder.uses_reversed_z();

        for index in 0..frame.reserved_count {
            let light = frame.reserved[index];
            let tile_offset = index as u32 * cascade_count;

            for cascade in 0..cascade_count {
                let slice = culling.cascade_slice(&CascadeRequest {
                    light_index: light.visible_index,
                    cascade_index: cascade,
                    cascade_count,
                    split_ratios: self.settings.cascade_ratios,
                    tile_size,
                    near_plane_offset: light.near_plane_offset,
                    blend_culling_factor,
                });

                // Cascades are camera distance bands shared by every light;
                // the first reserved light's spheres define the fade data.
                if index == 0 {
                    self.set_cascade_data(
                        frame,
                        cascade as usize,
                        slice.split.culling_sphere,
                        tile_size,
                    );
                }

                let tile_index = tile_offset + cascade;
                let offset = Vec2::new((tile_index % split) as f32, (tile_index / split) as f32);
                recorder.set_viewport(tile_viewport(tile_index, split, tile_size));
                frame.atlas_matrices[tile_index as usize] =
                    to_atlas_matrix(slice.view_proj(), offset, split, reversed_z);

                // Depth bias is global render state, not draw-scoped.
                recorder.set_depth_bias(0.0, light.slope_scale_bias);
                recorder.draw_shadows(light.visible_index, &slice);
                recorder.set_depth_bias(0.0, 0.0);
            }
        }

        recorder.publish(&ShadowGlobals {
            cascade_count,
            cascade_culling_spheres: frame.cascade_culling_spheres,
            cascade_data: frame.cascade_data,
            atlas_matrices: frame.atlas_matrices,
            distance_fade: self.distance_fade_vector(),
            atlas_size: Vec4::new(
                self.settings.atlas_size as f32,
                1.0 / self.settings.atlas_size as f32,
                0.0,
                0.0,
            ),
            filter: self.settings.filter,
            blend: self.settings.blend,
            mask_mode,
        });

        Ok(())
    }

    fn set_cascade_data(
        &self,
        frame: &mut ShadowFrame,
        index: usize,
        culling_sphere: Vec4,
        tile_size: u32,
    ) {
        let texel_size = 2.0 * culling_sphere.w / tile_size as f32;
        let filter_size = texel_size * (self.settings.filter.ordinal() + 1) as f32;
        let mut sphere = culling_sphere;
        // Wide PCF kernels must never tap outside the cascade sphere.
        sphere.w -= filter_size;
        sphere.w *= sphere.w;
        frame.cascade_culling_spheres[index] = sphere;
        frame.cascade_data[index] = Vec4::new(1.0 / sphere.w, filter_size * SQRT_2, 0.0, 0.0);
    }

    fn distance_fade_vector(&self) -> Vec4 {
        let f = 1.0 - self.settings.cascade_fade;
        Vec4::new(
            1.0 / self.settings.max_distance,
            1.0 / self.settings.distance_fade,
            1.0 / (1.0 - f * f),
            0.0,
        )
    }
}

/// Atlas grid subdivision for a given tile count: 1, 2 or 4 per axis.
pub fn split_factor(tile_count: u32) -> u32 {
    if tile_count <= 1 {
        1
    } else if tile_count <= 4 {
        2
    } else {
        4
    }
}

pub fn tile_viewport(tile_index: u32, split: u32, tile_size: u32) -> TileViewport {
    TileViewport {
        x: (tile_index % split) * tile_size,
        y: (tile_index / split) * tile_size,
        size: tile_size,
    }
}

/// Maps a light-space view-projection into normalized atlas coordinates for
/// one tile, folding in the clip-to-texture remap so a world-space point
/// multiplied by the result samples the atlas directly.
pub fn to_atlas_matrix(mut m: Mat4, tile_offset: Vec2, split: u32, reversed_z: bool) -> Mat4 {
    if reversed_z {
        // Normalize all platforms to one shadow-map depth convention.
        m.x_axis.z = -m.x_axis.z;
        m.y_axis.z = -m.y_axis.z;
        m.z_axis.z = -m.z_axis.z;
        m.w_axis.z = -m.w_axis.z;
    }

    let scale = 1.0 / split as f32;
    let mut scale_offset = Mat4::IDENTITY;
    scale_offset.x_axis.x = 0.5 * scale;
    scale_offset.y_axis.y = 0.5 * scale;
    scale_offset.w_axis.x = (0.5 + tile_offset.x) * scale;
    scale_offset.w_axis.y = (0.5 + tile_offset.y) * scale;
    scale_offset.z_axis.z = 0.5;
    scale_offset.w_axis.z = 0.5;

    scale_offset * m
}
