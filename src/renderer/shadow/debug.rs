//! Cascade debug lines
//!
//! Wireframes of every cascade's light volume and of the camera frustum,
//! reconstructed from the inverse view-projections retained by the
//! cascade builder.

use super::cascade::CascadeSet;
use super::NUM_CASCADES;
use crate::context::WgpuContext;
use crate::core::binding::{create_layout, uniform_entry};
use crate::core::pipeline::PipelineBuilder;
use crate::core::render_states::CullState;
use crate::core::vertex::VertexPC;
use crate::core::{IndexBuffer, RawUniformBuffer, VertexBuffer};
use glam::{Mat4, Vec3};

/// Unit volume corners in line-list order: near face TL, TR, BL, BR, then far.
const BOX_CORNERS: [Vec3; 8] = [
    Vec3::new(-1.0, 1.0, 0.0),
    Vec3::new(1.0, 1.0, 0.0),
    Vec3::new(-1.0, -1.0, 0.0),
    Vec3::new(1.0, -1.0, 0.0),
    Vec3::new(-1.0, 1.0, 1.0),
    Vec3::new(1.0, 1.0, 1.0),
    Vec3::new(-1.0, -1.0, 1.0),
    Vec3::new(1.0, -1.0, 1.0),
];

/// Twelve edges of a box as a line list.
pub const FRUSTUM_LINE_INDICES: [u32; 24] = [
    0, 1, 1, 3, 3, 2, 2, 0, 0, 4, 1, 5, 2, 6, 3, 7, 4, 5, 5, 7, 7, 6, 6, 4,
];

pub const CASCADE_COLORS: [[f32; 4]; NUM_CASCADES] = [
    [1.0, 0.0, 0.0, 1.0],
    [0.0, 1.0, 0.0, 1.0],
    [0.0, 0.0, 1.0, 1.0],
    [1.0, 1.0, 0.0, 1.0],
];

pub const CAMERA_COLOR: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

/// Vertices of one volume, given its inverse view-projection.
pub fn frustum_line_vertices(inverse_view_projection: Mat4, color: [f32; 4]) -> [VertexPC; 8] {
    BOX_CORNERS.map(|c| VertexPC::new(inverse_view_projection.project_point3(c).to_array(), color))
}

/// Line geometry for all cascades plus the camera.
#[derive(Debug, Clone, Default)]
pub struct CascadeDebugLines {
    pub vertices: Vec<VertexPC>,
    pub indices: Vec<u32>,
}

impl CascadeDebugLines {
    pub fn build(set: &CascadeSet, camera_inverse_view_projection: Mat4) -> Self {
        let mut lines = Self::default();
        for (cascade, color) in set.cascades.iter().zip(CASCADE_COLORS) {
            lines.push(cascade.inverse_view_projection, color);
        }
        lines.push(camera_inverse_view_projection, CAMERA_COLOR);
        lines
    }

    fn push(&mut self, inverse_view_projection: Mat4, color: [f32; 4]) {
        let base = self.vertices.len() as u32;
        self.vertices
            .extend(frustum_line_vertices(inverse_view_projection, color));
        self.indices
            .extend(FRUSTUM_LINE_INDICES.iter().map(|i| base + i));
    }
}

/// Draws [`CascadeDebugLines`] over a color target.
pub struct DebugLineRenderer {
    pipeline: wgpu::RenderPipeline,
    camera: RawUniformBuffer,
    bind_group: wgpu::BindGroup,
    geometry: Option<(VertexBuffer, IndexBuffer)>,
}

impl DebugLineRenderer {
    pub fn new(ctx: &WgpuContext, format: wgpu::TextureFormat) -> anyhow::Result<Self> {
        let layout = create_layout(
            ctx,
            "debug line layout",
            &[uniform_entry(0, wgpu::ShaderStages::VERTEX)],
        );
        let pipeline = PipelineBuilder::new(ctx)
            .label("debug line pipeline")
            .shader(include_str!("../../shaders/debug_lines.wgsl"))
            .vertex_layout(VertexPC::layout())
            .bind_group_layout(&layout)
            .color_format(format)
            .topology(wgpu::PrimitiveTopology::LineList)
            .cull(CullState::None)
            .build()?;

        let camera = RawUniformBuffer::for_type::<[[f32; 4]; 4]>(ctx, Some("debug line camera"));
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("debug line bind group"),
            layout: &layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera.buffer().as_entire_binding(),
            }],
        });

        Ok(Self {
            pipeline,
            camera,
            bind_group,
            geometry: None,
        })
    }

    /// Upload this frame's lines, seen through `view_projection`.
    pub fn update(&mut self, ctx: &WgpuContext, lines: &CascadeDebugLines, view_projection: Mat4) {
        self.camera.write(ctx, &view_projection.to_cols_array_2d());
        self.geometry = (!lines.indices.is_empty()).then(|| {
            (
                VertexBuffer::new(ctx, &lines.vertices, Some("debug line vertices")),
                IndexBuffer::new(ctx, &lines.indices, Some("debug line indices")),
            )
        });
    }

    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        let Some((vertices, indices)) = &self.geometry else {
            return;
        };
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.set_vertex_buffer(0, vertices.slice());
        pass.set_index_buffer(indices.slice(), IndexBuffer::FORMAT);
        pass.draw_indexed(0..indices.count(), 0, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::shadow::cascade::CascadeBuilder;
    use crate::renderer::shadow::settings::ShadowSettings;
    use crate::renderer::viewer::{Camera, Viewer};

    #[test]
    fn test_indices_trace_box_edges() {
        // Every edge joins corners differing in exactly one NDC coordinate.
        for edge in FRUSTUM_LINE_INDICES.chunks(2) {
            let a = BOX_CORNERS[edge[0] as usize];
            let b = BOX_CORNERS[edge[1] as usize];
            let differing = (a - b).to_array().iter().filter(|d| d.abs() > 0.0).count();
            assert_eq!(differing, 1, "{edge:?} is not a box edge");
        }
    }

    #[test]
    fn test_lines_for_all_cascades_and_camera() {
        let settings = ShadowSettings::default();
        let camera = Camera::new_perspective(
            Vec3::new(0.0, 4.0, 10.0),
            Vec3::ZERO,
            Vec3::Y,
            60.0,
            1.5,
            0.5,
            80.0,
        );
        let set = CascadeBuilder::new(&settings).build(&settings, &camera, 0.0, 1.0);
        let inverse = camera.view_projection_matrix().inverse();
        let lines = CascadeDebugLines::build(&set, inverse);

        assert_eq!(lines.vertices.len(), 8 * (NUM_CASCADES + 1));
        assert_eq!(lines.indices.len(), 24 * (NUM_CASCADES + 1));
        assert_eq!(lines.vertices[0].color, CASCADE_COLORS[0]);
        assert_eq!(lines.vertices[8 * NUM_CASCADES].color, CAMERA_COLOR);
        assert_eq!(*lines.indices.last().unwrap_or(&0), 8 * NUM_CASCADES as u32 + 4);

        let near_top_left = Vec3::from_array(lines.vertices[8 * NUM_CASCADES].position);
        let expected = inverse.project_point3(Vec3::new(-1.0, 1.0, 0.0));
        assert!((near_top_left - expected).length() < 1e-4);
    }
}
