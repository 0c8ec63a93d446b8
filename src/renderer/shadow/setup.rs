//! Cascade setup on the GPU
//!
//! With GPU scene submission the depth bounds never reach the CPU, so the
//! cascades are rebuilt by a single compute thread that reads the last
//! reduction level directly. Its output is copied with buffer-to-buffer
//! copies into every uniform that would otherwise be written from the CPU:
//! depth-pass matrices, cull planes, moment conversion scales and the
//! compositor constants.

use super::cascade::CascadeSet;
use super::settings::ShadowSettings;
use super::NUM_CASCADES;
use crate::compute::{read_back, ComputeDispatcher, ReadbackError};
use crate::context::WgpuContext;
use crate::core::binding::{create_layout, storage_entry, uniform_entry};
use crate::core::{build_stage, RawUniformBuffer, ShaderStage, StageDesc, StorageBuffer};
use crate::renderer::viewer::Viewer;
use glam::Mat4;
use std::mem::{offset_of, size_of};

/// Uniform block of the setup shader.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SetupParams {
    pub inverse_view_projection: [[f32; 4]; 4],
    pub global_shadow_matrix: [[f32; 4]; 4],
    pub split_distances: [f32; 4],
    pub light_direction: [f32; 4],
    pub near_clip: f32,
    pub far_clip: f32,
    pub pssm_lambda: f32,
    pub resolution: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub kernel_size: f32,
    pub partition_mode: u32,
    pub stabilize: u32,
    pub auto_bounds: u32,
    pub _padding: [u32; 2],
}

impl SetupParams {
    pub fn new(settings: &ShadowSettings, camera: &impl Viewer, global_shadow_matrix: Mat4) -> Self {
        Self {
            inverse_view_projection: camera
                .view_projection_matrix()
                .inverse()
                .to_cols_array_2d(),
            global_shadow_matrix: global_shadow_matrix.to_cols_array_2d(),
            split_distances: settings.split_distances,
            light_direction: settings.light_dir().extend(0.0).to_array(),
            near_clip: camera.near(),
            far_clip: camera.far(),
            pssm_lambda: settings.pssm_lambda,
            resolution: settings.resolution() as f32,
            min_distance: settings.min_cascade_distance,
            max_distance: settings.max_cascade_distance,
            kernel_size: settings.fixed_kernel_size(),
            partition_mode: settings.partition_mode.shader_index(),
            stabilize: u32::from(settings.stabilize_cascades),
            auto_bounds: u32::from(settings.auto_compute_depth_bounds),
            _padding: [0; 2],
        }
    }
}

/// One cascade as written by the setup shader.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CascadeOutput {
    pub view_projection: [[f32; 4]; 4],
    pub planes: [[f32; 4]; 6],
    pub offset: [f32; 4],
    pub scale: [f32; 4],
}

/// Everything the setup shader writes.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SetupOutput {
    pub cascades: [CascadeOutput; NUM_CASCADES],
    pub split_depths: [f32; 4],
}

impl SetupOutput {
    /// What the shader writes for a CPU-built cascade set.
    pub fn from_cascade_set(set: &CascadeSet) -> Self {
        Self {
            cascades: set.cascades.map(|c| CascadeOutput {
                view_projection: c.view_projection.to_cols_array_2d(),
                planes: c.frustum().to_vec4_array(),
                offset: c.offset.extend(0.0).to_array(),
                scale: c.scale.extend(1.0).to_array(),
            }),
            split_depths: set.split_depths(),
        }
    }

    fn cascade_offset(cascade: usize) -> u64 {
        (offset_of!(SetupOutput, cascades) + cascade * size_of::<CascadeOutput>()) as u64
    }
}

/// Compute pass that rebuilds the cascades from GPU depth bounds.
pub struct GpuCascadeSetup {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    params: RawUniformBuffer,
    output: StorageBuffer,
    bind_group: Option<wgpu::BindGroup>,
}

impl GpuCascadeSetup {
    pub fn new(ctx: &WgpuContext) -> anyhow::Result<Self> {
        let compute = wgpu::ShaderStages::COMPUTE;
        let layout = create_layout(
            ctx,
            "cascade setup layout",
            &[
                uniform_entry(0, compute),
                storage_entry(1, compute, true),
                storage_entry(2, compute, false),
            ],
        );

        let pipeline = build_stage(
            ctx,
            &StageDesc {
                label: "cascade setup",
                source: include_str!("../../shaders/setup_cascades.wgsl"),
                bind_group_layouts: &[&layout],
                constants: &[],
            },
            ShaderStage::Compute { entry: "cs_main" },
        )?
        .into_compute()?;

        Ok(Self {
            pipeline,
            layout,
            params: RawUniformBuffer::for_type::<SetupParams>(ctx, Some("cascade setup params")),
            output: StorageBuffer::new(
                ctx,
                size_of::<SetupOutput>() as u64,
                Some("cascade setup output"),
            ),
            bind_group: None,
        })
    }

    /// Point the setup at the reduction's final level. Call after every
    /// reduction resize.
    pub fn bind_depth_bounds(&mut self, ctx: &WgpuContext, depth_bounds: &StorageBuffer) {
        self.bind_group = Some(ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("cascade setup bind group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.params.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: depth_bounds.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.output.as_entire_binding(),
                },
            ],
        }));
    }

    /// Record the setup dispatch. Does nothing until depth bounds are bound.
    pub fn record(
        &self,
        ctx: &WgpuContext,
        encoder: &mut wgpu::CommandEncoder,
        params: &SetupParams,
    ) -> bool {
        let Some(bind_group) = &self.bind_group else {
            tracing::warn!("cascade setup skipped: no depth bounds bound");
            return false;
        };
        self.params.write(ctx, params);
        ComputeDispatcher::new(Some("cascade setup")).record(
            encoder,
            &self.pipeline,
            &[bind_group],
            [1, 1, 1],
        );
        true
    }

    fn copy(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        src_offset: u64,
        size: u64,
        dst: &wgpu::Buffer,
        dst_offset: u64,
    ) {
        encoder.copy_buffer_to_buffer(self.output.buffer(), src_offset, dst, dst_offset, size);
    }

    /// Copy a cascade's view-projection (64 bytes).
    pub fn copy_view_projection(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        cascade: usize,
        dst: &wgpu::Buffer,
        dst_offset: u64,
    ) {
        let src = SetupOutput::cascade_offset(cascade)
            + offset_of!(CascadeOutput, view_projection) as u64;
        self.copy(encoder, src, 64, dst, dst_offset);
    }

    /// Copy a cascade's six frustum planes (96 bytes).
    pub fn copy_planes(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        cascade: usize,
        dst: &wgpu::Buffer,
        dst_offset: u64,
    ) {
        let src = SetupOutput::cascade_offset(cascade) + offset_of!(CascadeOutput, planes) as u64;
        self.copy(encoder, src, 96, dst, dst_offset);
    }

    /// Copy a cascade's offset (16 bytes).
    pub fn copy_offset(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        cascade: usize,
        dst: &wgpu::Buffer,
        dst_offset: u64,
    ) {
        let src = SetupOutput::cascade_offset(cascade) + offset_of!(CascadeOutput, offset) as u64;
        self.copy(encoder, src, 16, dst, dst_offset);
    }

    /// Copy a cascade's scale (16 bytes).
    pub fn copy_scale(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        cascade: usize,
        dst: &wgpu::Buffer,
        dst_offset: u64,
    ) {
        let src = SetupOutput::cascade_offset(cascade) + offset_of!(CascadeOutput, scale) as u64;
        self.copy(encoder, src, 16, dst, dst_offset);
    }

    /// Copy the view-space split depths (16 bytes).
    pub fn copy_split_depths(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        dst: &wgpu::Buffer,
        dst_offset: u64,
    ) {
        self.copy(
            encoder,
            offset_of!(SetupOutput, split_depths) as u64,
            16,
            dst,
            dst_offset,
        );
    }

    /// Read the last setup result back. Blocks on the device.
    pub fn read_back(&self, ctx: &WgpuContext) -> Result<SetupOutput, ReadbackError> {
        let words = read_back::<SetupOutput>(ctx, &self.output)?;
        Ok(words.first().copied().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::shadow::cascade::CascadeBuilder;
    use crate::renderer::viewer::Camera;
    use glam::Vec3;

    #[test]
    fn test_layouts_match_wgsl() {
        assert_eq!(size_of::<SetupParams>(), 208);
        assert_eq!(size_of::<CascadeOutput>(), 192);
        assert_eq!(size_of::<SetupOutput>(), 784);
        assert_eq!(offset_of!(CascadeOutput, planes), 64);
        assert_eq!(offset_of!(CascadeOutput, offset), 160);
        assert_eq!(offset_of!(CascadeOutput, scale), 176);
        assert_eq!(offset_of!(SetupOutput, split_depths), 768);
        assert_eq!(SetupOutput::cascade_offset(3), 576);
    }

    #[test]
    fn test_output_mirrors_cascade_set() {
        let settings = ShadowSettings::default();
        let camera = Camera::new_perspective(
            Vec3::new(0.0, 5.0, 12.0),
            Vec3::ZERO,
            Vec3::Y,
            60.0,
            16.0 / 9.0,
            0.5,
            100.0,
        );
        let set = CascadeBuilder::new(&settings).build(&settings, &camera, 0.0, 1.0);
        let output = SetupOutput::from_cascade_set(&set);

        for (c, cascade) in set.cascades.iter().enumerate() {
            assert_eq!(output.split_depths[c], cascade.split_depth);
            assert_eq!(output.cascades[c].scale[3], 1.0);
            assert_eq!(output.cascades[c].offset[..3], cascade.offset.to_array());
        }
    }

    #[test]
    fn test_params_flags() {
        let settings = ShadowSettings {
            stabilize_cascades: false,
            auto_compute_depth_bounds: true,
            ..Default::default()
        };
        let camera = Camera::new_perspective(Vec3::Z * 5.0, Vec3::ZERO, Vec3::Y, 60.0, 1.0, 0.1, 50.0);
        let params = SetupParams::new(&settings, &camera, Mat4::IDENTITY);
        assert_eq!(params.stabilize, 0);
        assert_eq!(params.auto_bounds, 1);
        assert_eq!(params.near_clip, 0.1);
        assert_eq!(params.resolution, 2048.0);
        let dir = Vec3::from_slice(&params.light_direction[..3]);
        assert!((dir.length() - 1.0).abs() < 1e-5);
    }
}
