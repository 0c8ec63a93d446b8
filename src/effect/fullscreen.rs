//! Full-screen triangle shared by the moment passes

use crate::context::WgpuContext;
use crate::core::buffer::VertexBuffer;
use crate::core::vertex::VertexPC;

/// One oversized triangle covering the whole target.
///
/// The texture coordinate rides in the color attribute so every full-screen
/// shader can use the regular [`VertexPC`] layout.
pub struct FullscreenTriangle {
    vertex_buffer: VertexBuffer,
}

impl FullscreenTriangle {
    pub fn new(ctx: &WgpuContext) -> Self {
        let vertices = Self::vertices();
        let vertex_buffer = VertexBuffer::new(ctx, &vertices, Some("fullscreen triangle"));
        Self { vertex_buffer }
    }

    /// Clip-space corners with their texture coordinates in `color.xy`.
    pub fn vertices() -> [VertexPC; 3] {
        [
            VertexPC::new([-1.0, -1.0, 0.0], [0.0, 1.0, 0.0, 0.0]),
            VertexPC::new([3.0, -1.0, 0.0], [2.0, 1.0, 0.0, 0.0]),
            VertexPC::new([-1.0, 3.0, 0.0], [0.0, -1.0, 0.0, 0.0]),
        ]
    }

    pub fn draw(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        render_pass.set_vertex_buffer(0, self.vertex_buffer.slice());
        render_pass.draw(0..3, 0..1);
    }
}
