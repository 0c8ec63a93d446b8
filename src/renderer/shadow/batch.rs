//! GPU-driven culling and draw batching
//!
//! With GPU scene submission every depth pass over a [`SceneMesh`] is four
//! steps recorded into the frame's encoder:
//!
//! 1. reset the indirect arguments from a constant baseline buffer,
//! 2. cull every draw call's bounding sphere against the pass frustum and
//!    append survivors with an atomic counter,
//! 3. copy the survivor count into the x dimension of an indirect dispatch,
//! 4. copy each survivor's index range into one compacted index buffer.
//!
//! The mesh is then drawn with a single indexed indirect draw.

use super::scene::SceneMesh;
use super::{ShadowError, NUM_CASCADES};
use crate::compute::ComputeDispatcher;
use crate::context::WgpuContext;
use crate::core::binding::{create_layout, storage_entry, uniform_entry};
use crate::core::{ComputePipelineBuilder, StorageBuffer};
use crate::renderer::culling::Frustum;
use crate::renderer::geometry::{max_axis_scale, BoundingSphere, MeshPart};
use glam::{Mat4, Vec3, Vec4};

/// Threads per workgroup of the cull pass.
pub const CULL_TG_SIZE: u32 = 128;

/// Threads per workgroup of the index batching pass.
pub const BATCH_TG_SIZE: u32 = 256;

/// Per-pass uniform slot used by the main camera depth prepass.
pub const CAMERA_SLOT: usize = NUM_CASCADES;

/// One uniform slot per cascade plus the camera prepass.
pub const PASS_SLOTS: usize = NUM_CASCADES + 1;

/// Byte offset of `draw_count` inside [`BatchArgs`].
const DRAW_COUNT_OFFSET: u64 = 20;

/// A mesh part as the cull shader sees it.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawCall {
    pub sphere_center: [f32; 3],
    pub sphere_radius: f32,
    pub start_index: u32,
    pub num_indices: u32,
    pub _padding: [u32; 2],
}

impl DrawCall {
    pub fn new(part: &MeshPart, bounds: BoundingSphere) -> Self {
        Self {
            sphere_center: bounds.center.to_array(),
            sphere_radius: bounds.radius,
            start_index: part.index_start,
            num_indices: part.index_count,
            _padding: [0; 2],
        }
    }

    pub fn bounds(&self) -> BoundingSphere {
        BoundingSphere::new(Vec3::from(self.sphere_center), self.sphere_radius)
    }
}

/// A draw call that survived culling, with its place in the compacted
/// index buffer.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CulledDraw {
    pub src_index_start: u32,
    pub dst_index_start: u32,
    pub num_indices: u32,
}

/// Indexed indirect draw arguments followed by the survivor count.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BatchArgs {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
    pub draw_count: u32,
    pub _padding: [u32; 2],
}

impl BatchArgs {
    /// Nothing drawn yet, one instance.
    pub const BASELINE: BatchArgs = BatchArgs {
        index_count: 0,
        instance_count: 1,
        first_index: 0,
        base_vertex: 0,
        first_instance: 0,
        draw_count: 0,
        _padding: [0; 2],
    };
}

/// Indirect dispatch arguments for the batch pass, padded to 16 bytes.
const DISPATCH_BASELINE: [u32; 4] = [0, 1, 1, 0];

/// Uniform block of the cull shader.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CullParams {
    pub planes: [[f32; 4]; 6],
    pub world: [[f32; 4]; 4],
    pub num_draw_calls: u32,
    pub cull_near_z: u32,
    pub radius_scale: f32,
    pub _padding: u32,
}

impl CullParams {
    /// Params for culling `num_draw_calls` draws placed by `world`.
    ///
    /// Shadow caster passes keep geometry in front of the near plane.
    pub fn new(frustum: &Frustum, world: Mat4, num_draw_calls: u32, shadow_casters: bool) -> Self {
        Self {
            planes: frustum.to_vec4_array(),
            world: world.to_cols_array_2d(),
            num_draw_calls,
            cull_near_z: u32::from(!shadow_casters),
            radius_scale: max_axis_scale(world),
            _padding: 0,
        }
    }
}

/// CPU model of the cull shader.
///
/// Returns the indices of the draw calls that pass, in draw order.
pub fn cull_draw_calls(draw_calls: &[DrawCall], params: &CullParams) -> Vec<usize> {
    let world = Mat4::from_cols_array_2d(&params.world);
    let plane_count = if params.cull_near_z != 0 {
        6
    } else {
        Frustum::NEAR_PLANE
    };

    draw_calls
        .iter()
        .enumerate()
        .filter(|(_, draw)| {
            let center = world.transform_point3(Vec3::from(draw.sphere_center));
            let radius = draw.sphere_radius * params.radius_scale;
            params.planes[..plane_count]
                .iter()
                .all(|p| Vec4::from(*p).truncate().dot(center) + p[3] >= -radius)
        })
        .map(|(i, _)| i)
        .collect()
}

/// CPU model of the atomic append.
///
/// `append_order` is the order in which surviving draws reach the atomics.
pub fn compact_draw_calls(
    draw_calls: &[DrawCall],
    append_order: impl IntoIterator<Item = usize>,
) -> (Vec<CulledDraw>, BatchArgs) {
    let mut args = BatchArgs::BASELINE;
    let mut culled = Vec::new();
    for i in append_order {
        let draw = &draw_calls[i];
        culled.push(CulledDraw {
            src_index_start: draw.start_index,
            dst_index_start: args.index_count,
            num_indices: draw.num_indices,
        });
        args.index_count += draw.num_indices;
        args.draw_count += 1;
    }
    (culled, args)
}

/// Fail when `requested` draw calls do not fit a batch sized for `capacity`.
pub fn check_capacity(requested: usize, capacity: usize) -> Result<(), ShadowError> {
    if requested > capacity {
        return Err(ShadowError::CapacityExceeded {
            requested,
            capacity,
        });
    }
    Ok(())
}

/// Compute pipelines and layouts shared by every [`SceneMesh`].
pub struct GpuBatcher {
    cull_pipeline: wgpu::ComputePipeline,
    batch_pipeline: wgpu::ComputePipeline,
    cull_layout: wgpu::BindGroupLayout,
    batch_layout: wgpu::BindGroupLayout,
    /// [`BatchArgs::BASELINE`] followed by [`DISPATCH_BASELINE`].
    baseline: StorageBuffer,
}

impl GpuBatcher {
    pub fn new(ctx: &WgpuContext) -> anyhow::Result<Self> {
        let compute = wgpu::ShaderStages::COMPUTE;

        let cull_layout = create_layout(
            ctx,
            "draw cull layout",
            &[
                uniform_entry(0, compute),
                storage_entry(1, compute, true),
                storage_entry(2, compute, false),
                storage_entry(3, compute, false),
            ],
        );
        let batch_layout = create_layout(
            ctx,
            "index batch layout",
            &[
                storage_entry(0, compute, true),
                storage_entry(1, compute, true),
                storage_entry(2, compute, false),
            ],
        );

        let cull_pipeline = ComputePipelineBuilder::new(ctx)
            .label("draw cull")
            .shader(include_str!("../../shaders/cull_draws.wgsl"))
            .entry_point("cs_main")
            .bind_group_layout(&cull_layout)
            .constants(&[("WORKGROUP_SIZE", f64::from(CULL_TG_SIZE))])
            .build()?;
        let batch_pipeline = ComputePipelineBuilder::new(ctx)
            .label("index batch")
            .shader(include_str!("../../shaders/batch_indices.wgsl"))
            .entry_point("cs_main")
            .bind_group_layout(&batch_layout)
            .constants(&[("WORKGROUP_SIZE", f64::from(BATCH_TG_SIZE))])
            .build()?;

        let mut words: Vec<u32> = bytemuck::cast_slice(&[BatchArgs::BASELINE]).to_vec();
        words.extend_from_slice(&DISPATCH_BASELINE);
        let baseline = StorageBuffer::from_slice(ctx, &words, Some("batch args baseline"));

        Ok(Self {
            cull_pipeline,
            batch_pipeline,
            cull_layout,
            batch_layout,
            baseline,
        })
    }

    pub(crate) fn cull_layout(&self) -> &wgpu::BindGroupLayout {
        &self.cull_layout
    }

    pub(crate) fn batch_layout(&self) -> &wgpu::BindGroupLayout {
        &self.batch_layout
    }

    /// Record clear, cull, count copy and batch for one pass over `mesh`.
    ///
    /// The cull params of `slot` must already hold this pass's frustum.
    pub fn record(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        mesh: &SceneMesh,
        slot: usize,
    ) -> Result<(), ShadowError> {
        let draw_count = mesh.draw_count();
        debug_assert!(
            draw_count <= mesh.capacity(),
            "{draw_count} draw calls exceed batch capacity {}",
            mesh.capacity()
        );
        check_capacity(draw_count, mesh.capacity())?;

        let args_size = std::mem::size_of::<BatchArgs>() as u64;
        let dispatch_size = std::mem::size_of_val(&DISPATCH_BASELINE) as u64;

        encoder.copy_buffer_to_buffer(
            self.baseline.buffer(),
            0,
            mesh.args_buffer(),
            0,
            args_size,
        );
        encoder.copy_buffer_to_buffer(
            self.baseline.buffer(),
            args_size,
            mesh.dispatch_buffer(),
            0,
            dispatch_size,
        );

        let dispatcher = ComputeDispatcher::new(Some("draw cull"));
        dispatcher.record_1d(
            encoder,
            &self.cull_pipeline,
            &[mesh.cull_bind_group(slot)],
            draw_count as u32,
            CULL_TG_SIZE,
        );

        encoder.copy_buffer_to_buffer(
            mesh.args_buffer(),
            DRAW_COUNT_OFFSET,
            mesh.dispatch_buffer(),
            0,
            4,
        );

        ComputeDispatcher::new(Some("index batch")).record_indirect(
            encoder,
            &self.batch_pipeline,
            &[mesh.batch_bind_group()],
            mesh.dispatch_buffer(),
            0,
        );
        Ok(())
    }

    /// Draw everything the last [`GpuBatcher::record`] on `mesh` kept.
    pub fn draw(pass: &mut wgpu::RenderPass<'_>, mesh: &SceneMesh) {
        pass.set_vertex_buffer(0, mesh.vertex_slice());
        pass.set_index_buffer(mesh.culled_index_slice(), crate::core::IndexBuffer::FORMAT);
        pass.draw_indexed_indirect(mesh.args_buffer(), 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::culling::FrustumCuller;
    use std::collections::HashSet;

    fn scene_draws() -> Vec<DrawCall> {
        // A 9x9 grid of spheres on the ground plane, several far off-screen.
        let mut draws = Vec::new();
        let mut start = 0;
        for z in -4i32..=4 {
            for x in -4..=4 {
                let center = Vec3::new(x as f32 * 6.0, 0.5, z as f32 * 6.0);
                let count = 36 + 6 * ((x + z).unsigned_abs() % 3);
                let part = MeshPart {
                    index_start: start,
                    index_count: count,
                };
                draws.push(DrawCall::new(&part, BoundingSphere::new(center, 0.9)));
                start += count;
            }
        }
        draws
    }

    fn view_projection() -> Mat4 {
        let proj = Mat4::perspective_rh(50f32.to_radians(), 1.6, 1.0, 30.0);
        let view = Mat4::look_at_rh(Vec3::new(0.0, 4.0, 12.0), Vec3::ZERO, Vec3::Y);
        proj * view
    }

    /// A deterministic shuffle standing in for GPU thread scheduling.
    fn scrambled(mut indices: Vec<usize>, seed: u64) -> Vec<usize> {
        let mut state = seed;
        for i in (1..indices.len()).rev() {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let j = (state >> 33) as usize % (i + 1);
            indices.swap(i, j);
        }
        indices
    }

    #[test]
    fn test_struct_layouts() {
        assert_eq!(std::mem::size_of::<DrawCall>(), 32);
        assert_eq!(std::mem::size_of::<CulledDraw>(), 12);
        assert_eq!(std::mem::size_of::<BatchArgs>(), 32);
        assert_eq!(std::mem::size_of::<CullParams>(), 176);
        assert_eq!(std::mem::offset_of!(BatchArgs, draw_count) as u64, DRAW_COUNT_OFFSET);
    }

    #[test]
    fn test_gpu_cull_matches_cpu_culler() {
        let draws = scene_draws();
        let vp = view_projection();
        let world = Mat4::from_translation(Vec3::new(1.5, 0.0, -2.0));

        for shadow_casters in [false, true] {
            let frustum = Frustum::from_view_projection(vp);
            let params = CullParams::new(&frustum, world, draws.len() as u32, shadow_casters);
            let survivors = cull_draw_calls(&draws, &params);

            let culler = FrustumCuller::new(vp, shadow_casters);
            let world_bounds: Vec<BoundingSphere> =
                draws.iter().map(|d| d.bounds().transformed(world)).collect();
            let expected: Vec<usize> = culler.filter_visible(&world_bounds).collect();

            assert_eq!(survivors, expected);
            assert!(!survivors.is_empty());
            assert!(survivors.len() < draws.len());
        }
    }

    #[test]
    fn test_compaction_is_order_independent_as_a_set() {
        let draws = scene_draws();
        let frustum = Frustum::from_view_projection(view_projection());
        let params = CullParams::new(&frustum, Mat4::IDENTITY, draws.len() as u32, true);
        let survivors = cull_draw_calls(&draws, &params);

        let (reference, reference_args) = compact_draw_calls(&draws, survivors.iter().copied());
        let key = |c: &CulledDraw| (c.src_index_start, c.num_indices);
        let expected: HashSet<_> = reference.iter().map(key).collect();

        for seed in [1, 7, 42, 1234] {
            let (culled, args) = compact_draw_calls(&draws, scrambled(survivors.clone(), seed));
            let got: HashSet<_> = culled.iter().map(key).collect();
            assert_eq!(got, expected);
            assert_eq!(args, reference_args);

            // Destination ranges tile [0, index_count) without overlap.
            let mut ranges: Vec<_> = culled
                .iter()
                .map(|c| (c.dst_index_start, c.dst_index_start + c.num_indices))
                .collect();
            ranges.sort_unstable();
            let mut cursor = 0;
            for (start, end) in ranges {
                assert_eq!(start, cursor);
                cursor = end;
            }
            assert_eq!(cursor, args.index_count);
        }
    }

    #[test]
    fn test_near_plane_kept_for_shadow_casters() {
        let vp = view_projection();
        let frustum = Frustum::from_view_projection(vp);
        // Between the eye and the near plane, inside every side plane.
        let eye = Vec3::new(0.0, 4.0, 12.0);
        let forward = (Vec3::ZERO - eye).normalize();
        let part = MeshPart {
            index_start: 0,
            index_count: 3,
        };
        let draws = [DrawCall::new(
            &part,
            BoundingSphere::new(eye + forward * 0.5, 0.2),
        )];

        let casters = CullParams::new(&frustum, Mat4::IDENTITY, 1, true);
        let receivers = CullParams::new(&frustum, Mat4::IDENTITY, 1, false);
        assert_eq!(cull_draw_calls(&draws, &casters), vec![0]);
        assert!(cull_draw_calls(&draws, &receivers).is_empty());
    }

    #[test]
    fn test_empty_cull_leaves_baseline() {
        let (culled, args) = compact_draw_calls(&scene_draws(), std::iter::empty());
        assert!(culled.is_empty());
        assert_eq!(args, BatchArgs::BASELINE);
        assert_eq!(args.instance_count, 1);
    }

    #[test]
    fn test_capacity_check() {
        assert!(check_capacity(4, 4).is_ok());
        assert!(matches!(
            check_capacity(5, 4),
            Err(ShadowError::CapacityExceeded {
                requested: 5,
                capacity: 4
            })
        ));
    }
}
