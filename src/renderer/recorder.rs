use std::mem;
use std::num::NonZeroU64;
use std::ops::Range;

use bytemuck::{Pod, Zeroable};
use glam::Vec4;

use crate::renderer::culling::{CascadeSlice, CasterBounds};
use crate::renderer::internal::{comparison_sampler, AtlasTexture, ShadowPipelineKey, ShadowPipelines};
use crate::renderer::shadows::{MaskMode, ShadowGlobals, ShadowRecorder, TileViewport, MAX_TILES};
use crate::renderer::uniforms::DirectionalShadowUniform;

// Dynamic-offset slots must respect the default uniform alignment.
const TILE_UNIFORM_STRIDE: u64 = 256;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct TileUniform {
    view_proj: [[f32; 4]; 4],
}

/// One caster draw for the atlas pass. Bounds, when present, let tiles skip
/// casters entirely outside their culling sphere.
pub struct ShadowCasterDraw<'a> {
    pub vertex_buffer: &'a wgpu::Buffer,
    pub index_buffer: &'a wgpu::Buffer,
    pub index_format: wgpu::IndexFormat,
    pub index_count: u32,
    pub instances: Range<u32>,
    pub bounds: Option<CasterBounds>,
}

struct TileJob {
    viewport: TileViewport,
    bias: (f32, f32),
    culling_sphere: Vec4,
    slot: u32,
}

/// wgpu backend for the atlas planner's command stream.
///
/// Planner calls are recorded as tile jobs; `execute` replays them in a
/// single render pass over the atlas with per-tile viewport and scissor.
/// The atlas texture only exists between `begin_atlas` and `end_frame`, so
/// zero-light frames allocate nothing.
pub struct AtlasRecorder {
    device: wgpu::Device,
    queue: wgpu::Queue,
    atlas: Option<AtlasTexture>,
    atlas_size: u32,
    sampler: wgpu::Sampler,
    tile_layout: wgpu::BindGroupLayout,
    tile_buffer: wgpu::Buffer,
    tile_bind_group: wgpu::BindGroup,
    globals_buffer: wgpu::Buffer,
    pipelines: ShadowPipelines,
    jobs: Vec<TileJob>,
    pending_viewport: Option<TileViewport>,
    pending_bias: (f32, f32),
    mask_mode: MaskMode,
}

impl AtlasRecorder {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let tile_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ShadowTileLayout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: Some(
                        NonZeroU64::new(mem::size_of::<TileUniform>() as u64).unwrap(),
                    ),
                },
                count: None,
            }],
        });

        let tile_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("ShadowTileBuffer"),
            size: TILE_UNIFORM_STRIDE * MAX_TILES as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let tile_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ShadowTileBindGroup"),
            layout: &tile_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &tile_buffer,
                    offset: 0,
                    size: NonZeroU64::new(mem::size_of::<TileUniform>() as u64),
                }),
            }],
        });

        let globals_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("ShadowGlobalsBuffer"),
            size: mem::size_of::<DirectionalShadowUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let pipelines = ShadowPipelines::new(device, &tile_layout);
        let sampler = comparison_sampler(device);

        Self {
            device: device.clone(),
            queue: queue.clone(),
            atlas: None,
            atlas_size: 0,
            sampler,
            tile_layout,
            tile_buffer,
            tile_bind_group,
            globals_buffer,
            pipelines,
            jobs: Vec::with_capacity(MAX_TILES),
            pending_viewport: None,
            pending_bias: (0.0, 0.0),
            mask_mode: MaskMode::Off,
        }
    }

    /// Depth view of the current frame's atlas, None outside the atlas scope.
    pub fn atlas_view(&self) -> Option<&wgpu::TextureView> {
        self.atlas.as_ref().map(AtlasTexture::view)
    }

    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    pub fn globals_buffer(&self) -> &wgpu::Buffer {
        &self.globals_buffer
    }

    pub fn tile_layout(&self) -> &wgpu::BindGroupLayout {
        &self.tile_layout
    }

    pub fn mask_mode(&self) -> MaskMode {
        self.mask_mode
    }

    /// Replays the recorded tile jobs into `encoder`. Casters with bounds
    /// outside a tile's culling sphere are skipped for that tile.
    pub fn execute(&mut self, encoder: &mut wgpu::CommandEncoder, casters: &[ShadowCasterDraw]) {
        let Some(atlas) = self.atlas.as_ref() else {
            return;
        };
        if self.jobs.is_empty() || casters.is_empty() {
            return;
        }

        for job in &self.jobs {
            self.pipelines
                .ensure(&self.device, ShadowPipelineKey::new(job.bias.0, job.bias.1));
        }

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("ShadowAtlasPass"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: atlas.view(),
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for job in &self.jobs {
            let rect = job.viewport;
            pass.set_viewport(
                rect.x as f32,
                rect.y as f32,
                rect.size as f32,
                rect.size as f32,
                0.0,
                1.0,
            );
            pass.set_scissor_rect(rect.x, rect.y, rect.size, rect.size);

            let key = ShadowPipelineKey::new(job.bias.0, job.bias.1);
            let Some(pipeline) = self.pipelines.get(key) else {
                continue;
            };
            pass.set_pipeline(pipeline);
            pass.set_bind_group(
                0,
                &self.tile_bind_group,
                &[(job.slot as u64 * TILE_UNIFORM_STRIDE) as u32],
            );

            for caster in casters {
                if let Some(bounds) = caster.bounds {
                    let center = job.culling_sphere.truncate();
                    let distance = (bounds.center - center).length();
                    if distance > job.culling_sphere.w + bounds.radius() {
                        continue;
                    }
                }

                pass.set_vertex_buffer(0, caster.vertex_buffer.slice(..));
                pass.set_index_buffer(caster.index_buffer.slice(..), caster.index_format);
                pass.draw_indexed(0..caster.index_count, 0, caster.instances.clone());
            }
        }
    }

    /// Ends the atlas scope: the texture is dropped here (or on Drop),
    /// whichever comes first.
    pub fn end_frame(&mut self) {
        self.atlas = None;
        self.atlas_size = 0;
        self.jobs.clear();
        self.pending_viewport = None;
        self.pending_bias = (0.0, 0.0);
    }
}

impl ShadowRecorder for AtlasRecorder {
    fn uses_reversed_z(&self) -> bool {
        false
    }

    fn begin_atlas(&mut self, size: u32) {
        log::debug!("Acquiring {size}x{size} shadow atlas");
        self.atlas = Some(AtlasTexture::new(&self.device, size));
        self.atlas_size = size;
        self.jobs.clear();
    }

    fn set_viewport(&mut self, viewport: TileViewport) {
        self.pending_viewport = Some(viewport);
    }

    fn set_depth_bias(&mut self, constant: f32, slope_scale: f32) {
        self.pending_bias = (constant, slope_scale);
    }

    fn draw_shadows(&mut self, light_index: u32, slice: &CascadeSlice) {
        let slot = self.jobs.len() as u32;
        if slot as usize >= MAX_TILES {
            log::warn!(
                "Shadow draw for light {} dropped: tile capacity {} exceeded",
                light_index,
                MAX_TILES
            );
            return;
        }

        let uniform = TileUniform {
            view_proj: slice.view_proj().to_cols_array_2d(),
        };
        self.queue.write_buffer(
            &self.tile_buffer,
            slot as u64 * TILE_UNIFORM_STRIDE,
            bytemuck::bytes_of(&uniform),
        );

        let viewport = self.pending_viewport.take().unwrap_or(TileViewport {
            x: 0,
            y: 0,
            size: self.atlas_size,
        });
        self.jobs.push(TileJob {
            viewport,
            bias: self.pending_bias,
            culling_sphere: slice.split.culling_sphere,
            slot,
        });
    }

    fn publish(&mut self, globals: &ShadowGlobals) {
        let uniform = DirectionalShadowUniform::from_globals(globals);
        self.queue
            .write_buffer(&self.globals_buffer, 0, bytemuck::bytes_of(&uniform));
    }

    fn publish_mask_mode(&mut self, mode: MaskMode) {
        self.mask_mode = mode;
        // Mask selection must reach the shading stage even on frames that
        // never render a tile, so the selector word is written on its own.
        let offset =
            mem::offset_of!(DirectionalShadowUniform, selectors) + 3 * mem::size_of::<u32>();
        self.queue.write_buffer(
            &self.globals_buffer,
            offset as u64,
            bytemuck::bytes_of(&mode.ordinal()),
        );
    }
}
