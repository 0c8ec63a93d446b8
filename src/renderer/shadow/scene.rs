//! Shadow-casting scene geometry
//!
//! A [`SceneMesh`] owns everything both submission paths need for one mesh:
//! the vertex and index buffers, per-part bounding spheres, and the draw
//! call, culled draw, compacted index and indirect argument buffers used by
//! [`GpuBatcher`]. Buffers are sized once for the worst case where every
//! draw call survives culling.

use super::batch::{
    check_capacity, BatchArgs, CullParams, CulledDraw, DrawCall, GpuBatcher, PASS_SLOTS,
};
use super::ShadowError;
use crate::context::WgpuContext;
use crate::core::{IndexBuffer, RawUniformBuffer, StorageBuffer, VertexBuffer};
use crate::renderer::culling::{is_draw_visible, Frustum};
use crate::renderer::geometry::{MeshData, MeshPart};
use glam::Mat4;

struct CullSlot {
    params: RawUniformBuffer,
    bind_group: wgpu::BindGroup,
}

/// GPU resources for one shadow-casting mesh.
pub struct SceneMesh {
    vertices: VertexBuffer,
    indices: IndexBuffer,
    parts: Vec<MeshPart>,
    /// Object-space bounds, transformed by the group's world matrix at cull time.
    draw_calls: Vec<DrawCall>,
    // Only referenced through the bind groups.
    _draw_call_buffer: StorageBuffer,
    _culled_draws: StorageBuffer,
    culled_indices: IndexBuffer,
    args: StorageBuffer,
    dispatch: StorageBuffer,
    cull_slots: Vec<CullSlot>,
    batch_bind_group: wgpu::BindGroup,
    capacity: usize,
}

impl SceneMesh {
    /// Upload `mesh` with room for exactly its own draw calls.
    pub fn new(
        ctx: &WgpuContext,
        batcher: &GpuBatcher,
        mesh: &MeshData,
        label: &str,
    ) -> Result<Self, ShadowError> {
        Self::with_capacity(ctx, batcher, mesh, mesh.parts.len(), label)
    }

    /// Upload `mesh` with batch buffers sized for `capacity` draw calls.
    pub fn with_capacity(
        ctx: &WgpuContext,
        batcher: &GpuBatcher,
        mesh: &MeshData,
        capacity: usize,
        label: &str,
    ) -> Result<Self, ShadowError> {
        check_capacity(mesh.parts.len(), capacity)?;

        let draw_calls = object_draw_calls(mesh);

        let vertices = VertexBuffer::new(ctx, &mesh.vertices(), Some(&format!("{label} vertices")));
        let indices = IndexBuffer::new(ctx, &mesh.indices, Some(&format!("{label} indices")));
        let draw_call_buffer =
            StorageBuffer::from_slice(ctx, &draw_calls, Some(&format!("{label} draw calls")));
        let culled_draws = StorageBuffer::new(
            ctx,
            (capacity * std::mem::size_of::<CulledDraw>()) as u64,
            Some(&format!("{label} culled draws")),
        );
        let culled_indices = IndexBuffer::new_writable(
            ctx,
            mesh.index_count(),
            Some(&format!("{label} culled indices")),
        );
        let args = StorageBuffer::with_usage(
            ctx,
            std::mem::size_of::<BatchArgs>() as u64,
            wgpu::BufferUsages::INDIRECT,
            Some(&format!("{label} batch args")),
        );
        let dispatch = StorageBuffer::with_usage(
            ctx,
            16,
            wgpu::BufferUsages::INDIRECT,
            Some(&format!("{label} batch dispatch")),
        );

        let cull_slots = (0..PASS_SLOTS)
            .map(|slot| {
                let params = RawUniformBuffer::for_type::<CullParams>(
                    ctx,
                    Some(&format!("{label} cull params {slot}")),
                );
                let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("draw cull bind group"),
                    layout: batcher.cull_layout(),
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: params.buffer().as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: draw_call_buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: culled_draws.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: args.as_entire_binding(),
                        },
                    ],
                });
                CullSlot { params, bind_group }
            })
            .collect();

        let batch_bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("index batch bind group"),
            layout: batcher.batch_layout(),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: culled_draws.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: indices.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: culled_indices.buffer().as_entire_binding(),
                },
            ],
        });

        tracing::info!(
            label,
            draw_calls = draw_calls.len(),
            indices = mesh.index_count(),
            "uploaded shadow caster mesh"
        );

        Ok(Self {
            vertices,
            indices,
            parts: mesh.parts.clone(),
            draw_calls,
            _draw_call_buffer: draw_call_buffer,
            _culled_draws: culled_draws,
            culled_indices,
            args,
            dispatch,
            cull_slots,
            batch_bind_group,
            capacity,
        })
    }

    pub fn draw_count(&self) -> usize {
        self.draw_calls.len()
    }

    /// Draw calls the batch buffers were sized for.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn draw_calls(&self) -> &[DrawCall] {
        &self.draw_calls
    }

    /// Set the frustum and world transform the next cull of `slot` uses.
    pub fn write_cull_params(
        &self,
        ctx: &WgpuContext,
        slot: usize,
        frustum: &Frustum,
        world: Mat4,
        shadow_casters: bool,
    ) {
        let params = CullParams::new(frustum, world, self.draw_calls.len() as u32, shadow_casters);
        self.cull_slots[slot].params.write(ctx, &params);
    }

    /// Uniform of `slot`. Its first 96 bytes are the frustum planes.
    pub fn cull_params_buffer(&self, slot: usize) -> &wgpu::Buffer {
        self.cull_slots[slot].params.buffer()
    }

    /// Parts whose world-space bounds intersect `frustum`.
    pub fn visible_parts<'a>(
        &'a self,
        frustum: &'a Frustum,
        world: Mat4,
        shadow_casters: bool,
    ) -> impl Iterator<Item = &'a MeshPart> + 'a {
        visible_parts_in(&self.parts, &self.draw_calls, frustum, world, shadow_casters)
    }

    pub(crate) fn cull_bind_group(&self, slot: usize) -> &wgpu::BindGroup {
        &self.cull_slots[slot].bind_group
    }

    pub(crate) fn batch_bind_group(&self) -> &wgpu::BindGroup {
        &self.batch_bind_group
    }

    pub(crate) fn args_buffer(&self) -> &wgpu::Buffer {
        self.args.buffer()
    }

    pub(crate) fn dispatch_buffer(&self) -> &wgpu::Buffer {
        self.dispatch.buffer()
    }

    pub fn vertex_slice(&self) -> wgpu::BufferSlice<'_> {
        self.vertices.slice()
    }

    pub fn index_slice(&self) -> wgpu::BufferSlice<'_> {
        self.indices.slice()
    }

    pub(crate) fn culled_index_slice(&self) -> wgpu::BufferSlice<'_> {
        self.culled_indices.slice()
    }
}

/// One draw call per part, bounded in object space.
///
/// The group's world matrix is applied to the spheres every frame, so a
/// moving mesh never re-runs the bounding pass.
fn object_draw_calls(mesh: &MeshData) -> Vec<DrawCall> {
    mesh.parts
        .iter()
        .map(|part| DrawCall::new(part, mesh.part_bounds(part, Mat4::IDENTITY)))
        .collect()
}

fn visible_parts_in<'a>(
    parts: &'a [MeshPart],
    draw_calls: &'a [DrawCall],
    frustum: &'a Frustum,
    world: Mat4,
    shadow_casters: bool,
) -> impl Iterator<Item = &'a MeshPart> + 'a {
    parts
        .iter()
        .zip(draw_calls)
        .filter(move |(_, draw)| {
            is_draw_visible(frustum, &draw.bounds().transformed(world), shadow_casters)
        })
        .map(|(part, _)| part)
}

/// A mesh and the transform it is drawn with this frame.
pub struct MeshGroup {
    pub mesh: SceneMesh,
    pub world: Mat4,
}

impl MeshGroup {
    pub fn new(mesh: SceneMesh, world: Mat4) -> Self {
        Self { mesh, world }
    }
}

/// Shadow casters: the static scene plus an optional moving character.
pub struct ShadowScene {
    pub scene: MeshGroup,
    pub character: Option<MeshGroup>,
}

impl ShadowScene {
    pub fn new(scene: MeshGroup) -> Self {
        Self {
            scene,
            character: None,
        }
    }

    pub fn with_character(mut self, character: MeshGroup) -> Self {
        self.character = Some(character);
        self
    }

    /// Every group, the static scene first.
    pub fn groups(&self) -> impl Iterator<Item = &MeshGroup> {
        std::iter::once(&self.scene).chain(self.character.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn frustum_around(target: Vec3) -> Frustum {
        let proj = Mat4::perspective_rh(50f32.to_radians(), 1.6, 0.5, 50.0);
        let view = Mat4::look_at_rh(target + Vec3::new(0.0, 0.0, 10.0), target, Vec3::Y);
        Frustum::from_view_projection(proj * view)
    }

    #[test]
    fn test_draw_bounds_are_object_space() {
        let mesh = MeshData::cuboid(Vec3::ZERO, Vec3::ONE);
        let draws = object_draw_calls(&mesh);
        assert_eq!(draws.len(), 1);
        let bounds = draws[0].bounds();
        assert!(bounds.center.length() < 0.5);
        for corner in mesh.positions.iter() {
            assert!(bounds.contains(*corner, 1e-4));
        }
        assert_eq!(draws[0].num_indices, mesh.index_count());
    }

    #[test]
    fn test_visible_parts_apply_world_transform() {
        let mesh = MeshData::cuboid(Vec3::ZERO, Vec3::ONE);
        let draws = object_draw_calls(&mesh);
        let target = Vec3::new(20.0, 0.0, 0.0);
        let frustum = frustum_around(target);

        for shadow_casters in [false, true] {
            let at_origin: Vec<_> =
                visible_parts_in(&mesh.parts, &draws, &frustum, Mat4::IDENTITY, shadow_casters)
                    .collect();
            assert!(at_origin.is_empty());

            let moved = Mat4::from_translation(target);
            let visible: Vec<_> =
                visible_parts_in(&mesh.parts, &draws, &frustum, moved, shadow_casters).collect();
            assert_eq!(visible, vec![&mesh.parts[0]]);
        }
    }

    #[test]
    fn test_transformed_bounds_match_world_bounds() {
        let mesh = MeshData::cuboid(Vec3::new(0.5, 1.0, -0.5), Vec3::new(1.0, 0.5, 2.0));
        let world = Mat4::from_translation(Vec3::new(-3.0, 2.0, 7.0));
        let draws = object_draw_calls(&mesh);

        let moved = draws[0].bounds().transformed(world);
        let direct = mesh.part_bounds(&mesh.parts[0], world);
        assert!((moved.center - direct.center).length() < 1e-3);
        assert!((moved.radius - direct.radius).abs() < 1e-3);
    }
}
