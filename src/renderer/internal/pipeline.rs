use std::collections::HashMap;

use crate::renderer::vertex::ShadowVertex;

/// wgpu bakes depth bias into pipeline state, so the per-light slope-scale
/// bias becomes a pipeline variant keyed by its bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ShadowPipelineKey {
    constant: i32,
    slope_scale_bits: u32,
}

impl ShadowPipelineKey {
    pub(crate) fn new(constant: f32, slope_scale: f32) -> Self {
        Self {
            constant: constant as i32,
            slope_scale_bits: slope_scale.to_bits(),
        }
    }
}

pub(crate) struct ShadowPipelines {
    layout: wgpu::PipelineLayout,
    shader: wgpu::ShaderModule,
    pipelines: HashMap<ShadowPipelineKey, wgpu::RenderPipeline>,
}

impl ShadowPipelines {
    pub(crate) fn new(device: &wgpu::Device, tile_layout: &wgpu::BindGroupLayout) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("ShadowAtlasShader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../shader/shadow.wgsl").into()),
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("ShadowAtlasPipelineLayout"),
            bind_group_layouts: &[tile_layout],
            push_constant_ranges: &[],
        });

        Self {
            layout,
            shader,
            pipelines: HashMap::new(),
        }
    }

    pub(crate) fn ensure(&mut self, device: &wgpu::Device, key: ShadowPipelineKey) {
        if self.pipelines.contains_key(&key) {
            return;
        }

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("ShadowAtlasPipeline"),
            layout: Some(&self.layout),
            vertex: wgpu::VertexState {
                module: &self.shader,
                entry_point: Some("vs_main"),
                buffers: &[ShadowVertex::layout()],
                compilation_options: Default::default(),
            },
            fragment: None,
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: Some(wgpu::Face::Back),
                front_face: wgpu::FrontFace::Ccw,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: wgpu::TextureFormat::Depth32Float,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState {
                    constant: key.constant,
                    slope_scale: f32::from_bits(key.slope_scale_bits),
                    clamp: 0.0,
                },
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        self.pipelines.insert(key, pipeline);
    }

    pub(crate) fn get(&self, key: ShadowPipelineKey) -> Option<&wgpu::RenderPipeline> {
        self.pipelines.get(&key)
    }
}
