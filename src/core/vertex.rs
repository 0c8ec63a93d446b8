//! Vertex types
//!
//! Shadow and depth passes only need positions; debug lines carry a color.

use bytemuck::{Pod, Zeroable};

/// Vertex with position and color only.
/// Used for cascade debug lines.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct VertexPC {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

impl VertexPC {
    pub const fn new(position: [f32; 3], color: [f32; 4]) -> Self {
        Self { position, color }
    }

    /// Get the vertex buffer layout for this vertex type.
    pub const fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<VertexPC>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                // position
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                // color
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x4,
                },
            ],
        }
    }
}

/// Vertex with position only.
/// Used for shadow map rendering and depth-only passes.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct VertexP {
    pub position: [f32; 3],
}

impl VertexP {
    pub const fn new(position: [f32; 3]) -> Self {
        Self { position }
    }

    /// Get the vertex buffer layout for this vertex type.
    pub const fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<VertexP>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_sizes() {
        assert_eq!(std::mem::size_of::<VertexPC>(), 28); // 3+4 floats
        assert_eq!(std::mem::size_of::<VertexP>(), 12); // 3 floats
    }

    #[test]
    fn test_layout_strides_match_sizes() {
        assert_eq!(VertexP::layout().array_stride, 12);
        assert_eq!(VertexPC::layout().array_stride, 28);
    }
}
