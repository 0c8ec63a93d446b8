//! Shadow depth rendering
//!
//! Renders shadow casters into each cascade and the camera depth prepass
//! that feeds the depth reduction. With CPU submission every part is culled
//! against the pass frustum on the CPU and drawn directly. With GPU
//! submission the frustum and matrices come from the cascade setup output
//! and each mesh is drawn through its batched indirect arguments.

use super::batch::{GpuBatcher, CAMERA_SLOT, PASS_SLOTS};
use super::cascade::CascadeTransform;
use super::scene::{MeshGroup, ShadowScene};
use super::setup::GpuCascadeSetup;
use super::ShadowError;
use crate::context::WgpuContext;
use crate::core::binding::{create_layout, uniform_entry};
use crate::core::pipeline::PipelineBuilder;
use crate::core::render_states::{ClearState, CullState, DepthState};
use crate::core::vertex::VertexP;
use crate::core::{DepthTexture, IndexBuffer, RawUniformBuffer};
use crate::renderer::culling::Frustum;
use glam::Mat4;
use std::mem::offset_of;

const DEPTH_SHADER: &str = include_str!("../../shaders/depth_only.wgsl");

/// Uniform for one mesh group in one pass.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DepthPassUniform {
    pub world: [[f32; 4]; 4],
    pub view_projection: [[f32; 4]; 4],
}

impl DepthPassUniform {
    pub fn new(world: Mat4, view_projection: Mat4) -> Self {
        Self {
            world: world.to_cols_array_2d(),
            view_projection: view_projection.to_cols_array_2d(),
        }
    }
}

/// Where a cascade's matrix and frustum come from.
#[derive(Clone, Copy)]
pub enum CascadeSource<'a> {
    Cpu(&'a CascadeTransform),
    Gpu {
        setup: &'a GpuCascadeSetup,
        batcher: &'a GpuBatcher,
    },
}

/// The camera view for the depth prepass.
#[derive(Clone, Copy)]
pub struct CameraPass<'a> {
    pub view_projection: Mat4,
    pub frustum: &'a Frustum,
    /// Cull and batch on the GPU instead of per part on the CPU.
    pub batcher: Option<&'a GpuBatcher>,
}

struct PassUniform {
    buffer: RawUniformBuffer,
    bind_group: wgpu::BindGroup,
}

/// Depth pass pipelines and per-group, per-pass uniforms.
pub struct ShadowRasterizer {
    layout: wgpu::BindGroupLayout,
    shadow_pipeline: wgpu::RenderPipeline,
    prepass_pipeline: wgpu::RenderPipeline,
    depth_format: wgpu::TextureFormat,
    sample_count: u32,
    // Indexed by group, then pass slot. Queue writes land before the encoder
    // runs, so no two passes may share a uniform within a frame.
    uniforms: Vec<Vec<PassUniform>>,
}

impl ShadowRasterizer {
    /// Pipelines for a shadow target of `depth_format` with `sample_count` samples.
    pub fn new(
        ctx: &WgpuContext,
        depth_format: wgpu::TextureFormat,
        sample_count: u32,
    ) -> anyhow::Result<Self> {
        let layout = create_layout(
            ctx,
            "depth pass layout",
            &[uniform_entry(0, wgpu::ShaderStages::VERTEX)],
        );

        // Casters behind the cascade's near plane clamp to depth 0 rather than
        // vanish, and both faces are drawn so thin geometry still casts.
        let shadow_pipeline = PipelineBuilder::new(ctx)
            .label("shadow depth pipeline")
            .shader(DEPTH_SHADER)
            .vertex_layout(VertexP::layout())
            .bind_group_layout(&layout)
            .depth(DepthState::default())
            .depth_format(depth_format)
            .cull(CullState::None)
            .unclipped_depth(true)
            .sample_count(sample_count)
            .build_depth_only()?;

        let prepass_pipeline = PipelineBuilder::new(ctx)
            .label("depth prepass pipeline")
            .shader(DEPTH_SHADER)
            .vertex_layout(VertexP::layout())
            .bind_group_layout(&layout)
            .depth(DepthState::default())
            .depth_format(DepthTexture::FORMAT)
            .cull(CullState::Back)
            .build_depth_only()?;

        if !ctx.has_feature(wgpu::Features::DEPTH_CLIP_CONTROL) {
            tracing::warn!("depth clip control unavailable, near casters may be clipped");
        }

        Ok(Self {
            layout,
            shadow_pipeline,
            prepass_pipeline,
            depth_format,
            sample_count,
            uniforms: Vec::new(),
        })
    }

    pub fn depth_format(&self) -> wgpu::TextureFormat {
        self.depth_format
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    fn ensure_groups(&mut self, ctx: &WgpuContext, count: usize) {
        while self.uniforms.len() < count {
            let group = self.uniforms.len();
            let slots = (0..PASS_SLOTS)
                .map(|slot| {
                    let buffer = RawUniformBuffer::for_type::<DepthPassUniform>(
                        ctx,
                        Some(&format!("depth pass uniform {group}/{slot}")),
                    );
                    let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some("depth pass bind group"),
                        layout: &self.layout,
                        entries: &[wgpu::BindGroupEntry {
                            binding: 0,
                            resource: buffer.buffer().as_entire_binding(),
                        }],
                    });
                    PassUniform { buffer, bind_group }
                })
                .collect();
            self.uniforms.push(slots);
        }
    }

    /// Render one cascade's casters into `target`. Returns the number of
    /// draws issued (parts on the CPU path, meshes on the GPU path).
    pub fn render_cascade(
        &mut self,
        ctx: &WgpuContext,
        encoder: &mut wgpu::CommandEncoder,
        scene: &ShadowScene,
        cascade: usize,
        target: &wgpu::TextureView,
        source: CascadeSource<'_>,
    ) -> Result<usize, ShadowError> {
        let groups: Vec<&MeshGroup> = scene.groups().collect();
        self.ensure_groups(ctx, groups.len());

        match source {
            CascadeSource::Cpu(transform) => {
                for (g, group) in groups.iter().enumerate() {
                    let uniform = DepthPassUniform::new(group.world, transform.view_projection);
                    self.uniforms[g][cascade].buffer.write(ctx, &uniform);
                }
                let frustum = transform.frustum();
                let mut pass = self.begin_pass(encoder, "shadow depth pass", target);
                pass.set_pipeline(&self.shadow_pipeline);
                Ok(self.draw_culled(&mut pass, &groups, cascade, &frustum, true))
            }
            CascadeSource::Gpu { setup, batcher } => {
                let vp_offset = offset_of!(DepthPassUniform, view_projection) as u64;
                let placeholder = Frustum::from_view_projection(Mat4::IDENTITY);
                for (g, group) in groups.iter().enumerate() {
                    let uniform = &self.uniforms[g][cascade].buffer;
                    uniform.write(ctx, &DepthPassUniform::new(group.world, Mat4::IDENTITY));
                    setup.copy_view_projection(encoder, cascade, uniform.buffer(), vp_offset);

                    // Planes are replaced by the setup output before the cull runs.
                    group.mesh.write_cull_params(ctx, cascade, &placeholder, group.world, true);
                    setup.copy_planes(encoder, cascade, group.mesh.cull_params_buffer(cascade), 0);
                    batcher.record(encoder, &group.mesh, cascade)?;
                }
                let mut pass = self.begin_pass(encoder, "shadow depth pass", target);
                pass.set_pipeline(&self.shadow_pipeline);
                Ok(self.draw_batched(&mut pass, &groups, cascade))
            }
        }
    }

    /// Render the camera depth prepass into `target`.
    pub fn render_depth(
        &mut self,
        ctx: &WgpuContext,
        encoder: &mut wgpu::CommandEncoder,
        scene: &ShadowScene,
        target: &DepthTexture,
        camera: CameraPass<'_>,
    ) -> Result<usize, ShadowError> {
        let groups: Vec<&MeshGroup> = scene.groups().collect();
        self.ensure_groups(ctx, groups.len());

        for (g, group) in groups.iter().enumerate() {
            let uniform = DepthPassUniform::new(group.world, camera.view_projection);
            self.uniforms[g][CAMERA_SLOT].buffer.write(ctx, &uniform);
        }

        match camera.batcher {
            None => {
                let mut pass = self.begin_pass(encoder, "depth prepass", target.view());
                pass.set_pipeline(&self.prepass_pipeline);
                Ok(self.draw_culled(&mut pass, &groups, CAMERA_SLOT, camera.frustum, false))
            }
            Some(batcher) => {
                for group in &groups {
                    group.mesh.write_cull_params(
                        ctx,
                        CAMERA_SLOT,
                        camera.frustum,
                        group.world,
                        false,
                    );
                    batcher.record(encoder, &group.mesh, CAMERA_SLOT)?;
                }
                let mut pass = self.begin_pass(encoder, "depth prepass", target.view());
                pass.set_pipeline(&self.prepass_pipeline);
                Ok(self.draw_batched(&mut pass, &groups, CAMERA_SLOT))
            }
        }
    }

    fn begin_pass<'e>(
        &self,
        encoder: &'e mut wgpu::CommandEncoder,
        label: &str,
        target: &wgpu::TextureView,
    ) -> wgpu::RenderPass<'e> {
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: target,
                depth_ops: Some(ClearState::default().depth_ops()),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        })
    }

    fn draw_culled(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        groups: &[&MeshGroup],
        slot: usize,
        frustum: &Frustum,
        shadow_casters: bool,
    ) -> usize {
        let mut draws = 0;
        for (g, group) in groups.iter().enumerate() {
            pass.set_bind_group(0, &self.uniforms[g][slot].bind_group, &[]);
            pass.set_vertex_buffer(0, group.mesh.vertex_slice());
            pass.set_index_buffer(group.mesh.index_slice(), IndexBuffer::FORMAT);
            for part in group.mesh.visible_parts(frustum, group.world, shadow_casters) {
                let range = part.index_start..part.index_start + part.index_count;
                pass.draw_indexed(range, 0, 0..1);
                draws += 1;
            }
        }
        draws
    }

    fn draw_batched(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        groups: &[&MeshGroup],
        slot: usize,
    ) -> usize {
        for (g, group) in groups.iter().enumerate() {
            pass.set_bind_group(0, &self.uniforms[g][slot].bind_group, &[]);
            GpuBatcher::draw(pass, &group.mesh);
        }
        groups.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn test_uniform_layout() {
        assert_eq!(size_of::<DepthPassUniform>(), 128);
        assert_eq!(offset_of!(DepthPassUniform, view_projection), 64);
    }

    #[test]
    fn test_uniform_applies_world_then_view_projection() {
        let world = Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0));
        let vp = Mat4::from_scale(glam::Vec3::splat(2.0));
        let uniform = DepthPassUniform::new(world, vp);
        let w = Mat4::from_cols_array_2d(&uniform.world);
        let v = Mat4::from_cols_array_2d(&uniform.view_projection);
        let p = (v * w).transform_point3(glam::Vec3::ZERO);
        assert_eq!(p, glam::Vec3::new(2.0, 4.0, 6.0));
    }
}
