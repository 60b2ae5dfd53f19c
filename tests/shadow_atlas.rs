use std::cell::RefCell;

use glam::{Mat4, Vec3, Vec4};
use shadow_atlas::{
    CascadeRequest, CascadeSlice, CasterBounds, CullingProvider, DirectionalLight, FrameError,
    FramePhase, MaskMode, ShadowAtlas, ShadowFrame, ShadowGlobals, ShadowMode, ShadowParams,
    ShadowRecorder, ShadowSettings, ShadowmaskQuality, SplitData, TileViewport,
};

const EPSILON: f32 = 1e-5;

struct FakeCulling {
    bounds: Vec<Option<CasterBounds>>,
    sphere_radius: f32,
    requests: RefCell<Vec<CascadeRequest>>,
}

impl FakeCulling {
    fn with_casters(light_count: usize) -> Self {
        let bounds = CasterBounds {
            center: Vec3::ZERO,
            extents: Vec3::splat(5.0),
        };
        Self {
            bounds: vec![Some(bounds); light_count],
            sphere_radius: 16.0,
            requests: RefCell::new(Vec::new()),
        }
    }

    fn without_casters(light_count: usize) -> Self {
        Self {
            bounds: vec![None; light_count],
            sphere_radius: 16.0,
            requests: RefCell::new(Vec::new()),
        }
    }
}

impl CullingProvider for FakeCulling {
    fn caster_bounds(&self, light_index: u32) -> Option<CasterBounds> {
        self.bounds.get(light_index as usize).copied().flatten()
    }

    fn cascade_slice(&self, request: &CascadeRequest) -> CascadeSlice {
        self.requests.borrow_mut().push(*request);
        CascadeSlice {
            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
            split: SplitData {
                culling_sphere: Vec4::new(0.0, 0.0, 0.0, self.sphere_radius),
                blend_culling_factor: request.blend_culling_factor,
            },
        }
    }
}

#[derive(Default)]
struct RecordingSink {
    reversed_z: bool,
    atlas: Option<u32>,
    viewports: Vec<TileViewport>,
    biases: Vec<(f32, f32)>,
    draws: Vec<u32>,
    globals: Option<ShadowGlobals>,
    mask_modes: Vec<MaskMode>,
}

impl ShadowRecorder for RecordingSink {
    fn uses_reversed_z(&self) -> bool {
        self.reversed_z
    }

    fn begin_atlas(&mut self, size: u32) {
        self.atlas = Some(size);
    }

    fn set_viewport(&mut self, viewport: TileViewport) {
        self.viewports.push(viewport);
    }

    fn set_depth_bias(&mut self, constant: f32, slope_scale: f32) {
        self.biases.push((constant, slope_scale));
    }

    fn draw_shadows(&mut self, light_index: u32, _slice: &CascadeSlice) {
        self.draws.push(light_index);
    }

    fn publish(&mut self, globals: &ShadowGlobals) {
        self.globals = Some(*globals);
    }

    fn publish_mask_mode(&mut self, mode: MaskMode) {
        self.mask_modes.push(mode);
    }
}

fn settings(cascade_count: u32) -> ShadowSettings {
    ShadowSettings {
        atlas_size: 2048,
        cascade_count,
        ..ShadowSettings::default()
    }
}

fn caster_light(strength: f32) -> DirectionalLight {
    DirectionalLight {
        shadow_mode: ShadowMode::Soft,
        shadow_strength: strength,
        slope_scale_bias: 3.0,
        normal_bias: 0.5,
        ..DirectionalLight::default()
    }
}

#[test]
fn fifth_light_is_rejected_without_mutating_reservations() {
    let atlas = ShadowAtlas::new(settings(4));
    let culling = FakeCulling::with_casters(8);
    let mut frame = ShadowFrame::new();
    atlas.begin_frame(&mut frame);

    for index in 0..4 {
        let params = atlas
            .reserve(&mut frame, &culling, &caster_light(1.0), index)
            .unwrap();
        assert!(!params.is_disabled());
        assert_eq!(params.tile_offset, (index * 4) as f32);
    }

    let fifth = atlas
        .reserve(&mut frame, &culling, &caster_light(1.0), 4)
        .unwrap();
    assert_eq!(fifth, ShadowParams::DISABLED);
    assert_eq!(frame.reserved_lights(), 4);
}

#[test]
fn zero_strength_or_disabled_mode_yields_the_disabled_sentinel() {
    let atlas = ShadowAtlas::new(settings(4));
    let culling = FakeCulling::with_casters(2);
    let mut frame = ShadowFrame::new();
    atlas.begin_frame(&mut frame);

    let zero_strength = atlas
        .reserve(&mut frame, &culling, &caster_light(0.0), 0)
        .unwrap();
    assert_eq!(zero_strength.to_vec4(), Vec4::new(0.0, 0.0, 0.0, -1.0));

    let mode_none = atlas
        .reserve(
            &mut frame,
            &culling,
            &DirectionalLight {
                shadow_mode: ShadowMode::None,
                ..caster_light(1.0)
            },
            1,
        )
        .unwrap();
    assert_eq!(mode_none, ShadowParams::DISABLED);
    assert_eq!(frame.reserved_lights(), 0);
}

#[test]
fn mask_only_light_keeps_its_channel_and_raises_the_mask_flag() {
    let atlas = ShadowAtlas::new(settings(4));
    let culling = FakeCulling::without_casters(1);
    let mut frame = ShadowFrame::new();
    atlas.begin_frame(&mut frame);

    let params = atlas
        .reserve(
            &mut frame,
            &culling,
            &DirectionalLight {
                shadowmask_channel: Some(2),
                ..caster_light(0.6)
            },
            0,
        )
        .unwrap();

    assert!(params.is_mask_only());
    assert_eq!(params.to_vec4(), Vec4::new(-0.6, 0.0, 0.0, 2.0));
    assert!(frame.uses_shadow_mask());
    assert_eq!(frame.reserved_lights(), 0);

    // The light occupies no tile, yet the mask selector still goes out.
    let mut sink = RecordingSink::default();
    atlas.render(&mut frame, &culling, &mut sink).unwrap();
    assert_eq!(sink.atlas, None);
    assert!(sink.draws.is_empty());
    assert_eq!(sink.mask_modes, vec![MaskMode::Distance]);
    assert!(sink.globals.is_none());
}

#[test]
fn mask_mode_follows_the_shadowmask_quality_setting() {
    let atlas = ShadowAtlas::new(ShadowSettings {
        shadowmask: ShadowmaskQuality::Always,
        ..settings(4)
    });
    let culling = FakeCulling::without_casters(1);
    let mut frame = ShadowFrame::new();
    atlas.begin_frame(&mut frame);
    atlas
        .reserve(
            &mut frame,
            &culling,
            &DirectionalLight {
                shadowmask_channel: Some(0),
                ..caster_light(1.0)
            },
            0,
        )
        .unwrap();

    let mut sink = RecordingSink::default();
    atlas.render(&mut frame, &culling, &mut sink).unwrap();
    assert_eq!(sink.mask_modes, vec![MaskMode::Always]);
}

#[test]
fn render_without_reservations_publishes_mask_off_and_skips_the_atlas() {
    let atlas = ShadowAtlas::new(settings(4));
    let culling = FakeCulling::with_casters(0);
    let mut frame = ShadowFrame::new();
    atlas.begin_frame(&mut frame);

    let mut sink = RecordingSink::default();
    atlas.render(&mut frame, &culling, &mut sink).unwrap();

    assert_eq!(sink.atlas, None);
    assert_eq!(sink.mask_modes, vec![MaskMode::Off]);
    assert!(sink.viewports.is_empty());
    assert!(sink.globals.is_none());
}

#[test]
fn two_lights_with_four_cascades_pack_a_512px_grid() {
    let atlas = ShadowAtlas::new(settings(4));
    let culling = FakeCulling::with_casters(2);
    let mut frame = ShadowFrame::new();
    atlas.begin_frame(&mut frame);
    atlas
        .reserve(&mut frame, &culling, &caster_light(1.0), 0)
        .unwrap();
    atlas
        .reserve(&mut frame, &culling, &caster_light(1.0), 1)
        .unwrap();

    let mut sink = RecordingSink::default();
    atlas.render(&mut frame, &culling, &mut sink).unwrap();

    // 8 tiles force a 4-way split of the 2048 atlas.
    assert_eq!(sink.atlas, Some(2048));
    assert_eq!(sink.viewports.len(), 8);
    assert_eq!(
        sink.viewports[5],
        TileViewport {
            x: 512,
            y: 512,
            size: 512
        }
    );

    // One draw per cascade, light 0's cascades strictly first.
    assert_eq!(sink.draws, vec![0, 0, 0, 0, 1, 1, 1, 1]);

    // Bias is set for the draw and reset right after, every time.
    assert_eq!(sink.biases.len(), 16);
    for pair in sink.biases.chunks(2) {
        assert_eq!(pair[0], (0.0, 3.0));
        assert_eq!(pair[1], (0.0, 0.0));
    }

    // The culling collaborator saw the final tile size.
    assert!(culling
        .requests
        .borrow()
        .iter()
        .all(|request| request.tile_size == 512));
}

#[test]
fn atlas_matrices_map_clip_center_into_each_tile() {
    // One light, four cascades: 4 tiles, split 2.
    let atlas = ShadowAtlas::new(settings(4));
    let culling = FakeCulling::with_casters(1);
    let mut frame = ShadowFrame::new();
    atlas.begin_frame(&mut frame);
    atlas
        .reserve(&mut frame, &culling, &caster_light(1.0), 0)
        .unwrap();

    let mut sink = RecordingSink::default();
    atlas.render(&mut frame, &culling, &mut sink).unwrap();

    // The fake slice is the identity, so each matrix is the pure tile remap.
    let expected_centers = [
        (0.25, 0.25),
        (0.75, 0.25),
        (0.25, 0.75),
        (0.75, 0.75),
    ];
    for (tile, (x, y)) in expected_centers.iter().enumerate() {
        let mapped = frame.atlas_matrices()[tile] * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!((mapped.x - x).abs() < EPSILON, "tile {tile}");
        assert!((mapped.y - y).abs() < EPSILON, "tile {tile}");
        assert!((mapped.z - 0.5).abs() < EPSILON, "tile {tile}");
    }
}

#[test]
fn published_globals_carry_fade_vectors_and_shrunk_spheres() {
    let atlas = ShadowAtlas::new(ShadowSettings {
        max_distance: 50.0,
        distance_fade: 0.2,
        cascade_fade: 0.1,
        ..settings(4)
    });
    let culling = FakeCulling::with_casters(1);
    let mut frame = ShadowFrame::new();
    atlas.begin_frame(&mut frame);
    atlas
        .reserve(&mut frame, &culling, &caster_light(1.0), 0)
        .unwrap();

    let mut sink = RecordingSink::default();
    atlas.render(&mut frame, &culling, &mut sink).unwrap();

    let globals = sink.globals.expect("globals published");
    assert_eq!(globals.cascade_count, 4);
    assert_eq!(globals.atlas_size, Vec4::new(2048.0, 1.0 / 2048.0, 0.0, 0.0));
    assert!((globals.distance_fade.x - 1.0 / 50.0).abs() < EPSILON);
    assert!((globals.distance_fade.y - 5.0).abs() < EPSILON);

    // 4 tiles -> split 2 -> 1024px tiles; hard filter shrinks by one texel.
    let texel = 2.0 * 16.0 / 1024.0;
    let shrunk = 16.0 - texel;
    for cascade in 0..4 {
        let sphere = globals.cascade_culling_spheres[cascade];
        assert!((sphere.w - shrunk * shrunk).abs() < 1e-3, "cascade {cascade}");
        assert!(
            (globals.cascade_data[cascade].x - 1.0 / (shrunk * shrunk)).abs() < 1e-4,
            "cascade {cascade}"
        );
    }

    // Blend culling factor reaches the culling collaborator.
    assert!(culling
        .requests
        .borrow()
        .iter()
        .all(|request| (request.blend_culling_factor - 0.7).abs() < EPSILON));
}

#[test]
fn reserve_is_rejected_outside_the_reservation_phase() {
    let atlas = ShadowAtlas::new(settings(4));
    let culling = FakeCulling::with_casters(1);
    let mut frame = ShadowFrame::new();

    let before_begin = atlas.reserve(&mut frame, &culling, &caster_light(1.0), 0);
    assert_eq!(
        before_begin,
        Err(FrameError::ReserveOutsidePhase {
            phase: FramePhase::Idle
        })
    );

    atlas.begin_frame(&mut frame);
    let mut sink = RecordingSink::default();
    atlas.render(&mut frame, &culling, &mut sink).unwrap();

    let after_render = atlas.reserve(&mut frame, &culling, &caster_light(1.0), 0);
    assert_eq!(
        after_render,
        Err(FrameError::ReserveOutsidePhase {
            phase: FramePhase::Rendered
        })
    );
}

#[test]
fn render_is_a_single_call_per_frame() {
    let atlas = ShadowAtlas::new(settings(4));
    let culling = FakeCulling::with_casters(1);
    let mut frame = ShadowFrame::new();
    atlas.begin_frame(&mut frame);

    let mut sink = RecordingSink::default();
    atlas.render(&mut frame, &culling, &mut sink).unwrap();
    let second = atlas.render(&mut frame, &culling, &mut sink);
    assert_eq!(
        second,
        Err(FrameError::RenderOutsidePhase {
            phase: FramePhase::Rendered
        })
    );

    // A new frame makes the state machine usable again.
    atlas.begin_frame(&mut frame);
    assert_eq!(frame.phase(), FramePhase::Reserving);
    assert_eq!(frame.reserved_lights(), 0);
    assert!(!frame.uses_shadow_mask());
    atlas.render(&mut frame, &culling, &mut sink).unwrap();
}

#[test]
fn tile_offsets_step_by_cascade_count() {
    let atlas = ShadowAtlas::new(settings(2));
    let culling = FakeCulling::with_casters(3);
    let mut frame = ShadowFrame::new();
    atlas.begin_frame(&mut frame);

    for index in 0..3 {
        let params = atlas
            .reserve(&mut frame, &culling, &caster_light(1.0), index)
            .unwrap();
        assert_eq!(params.tile_offset, (index * 2) as f32);
        assert_eq!(params.normal_bias, 0.5);
    }
}

#[test]
fn reversed_z_platforms_get_a_flipped_depth_row() {
    let atlas = ShadowAtlas::new(settings(1));
    let culling = FakeCulling::with_casters(1);

    let mut standard_frame = ShadowFrame::new();
    atlas.begin_frame(&mut standard_frame);
    atlas
        .reserve(&mut standard_frame, &culling, &caster_light(1.0), 0)
        .unwrap();
    let mut standard = RecordingSink::default();
    atlas
        .render(&mut standard_frame, &culling, &mut standard)
        .unwrap();

    let mut reversed_frame = ShadowFrame::new();
    atlas.begin_frame(&mut reversed_frame);
    atlas
        .reserve(&mut reversed_frame, &culling, &caster_light(1.0), 0)
        .unwrap();
    let mut reversed = RecordingSink {
        reversed_z: true,
        ..RecordingSink::default()
    };
    atlas
        .render(&mut reversed_frame, &culling, &mut reversed)
        .unwrap();

    let near = Vec4::new(0.0, 0.0, -1.0, 1.0);
    let standard_z = (standard_frame.atlas_matrices()[0] * near).z;
    let reversed_z = (reversed_frame.atlas_matrices()[0] * near).z;
    assert!((standard_z - 0.0).abs() < EPSILON);
    assert!((reversed_z - 1.0).abs() < EPSILON);
}
