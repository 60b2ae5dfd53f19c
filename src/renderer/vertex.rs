use bytemuck::{Pod, Zeroable};
use std::mem;

/// Caster vertex for the depth-only atlas pass. Shadow casters contribute
/// positions only.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct ShadowVertex {
    pub pos: [f32; 3],
}

impl ShadowVertex {
    pub const ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![
        0 => Float32x3
    ];

    pub fn layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<ShadowVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn vertex_stride_matches_struct_size() {
        assert_eq!(
            ShadowVertex::layout().array_stride,
            std::mem::size_of::<ShadowVertex>() as wgpu::BufferAddress
        );
    }
}
