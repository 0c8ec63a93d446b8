//! Compute shader dispatch utilities.
//!
//! Provides `ComputeDispatcher` for recording compute passes into a frame's
//! encoder, plus readback helpers for GPU-to-CPU data transfer.

mod readback;

pub use readback::ReadbackRing;

use crate::context::WgpuContext;
use crate::core::StorageBuffer;

/// Errors from mapping a GPU buffer for CPU access.
#[derive(Debug, thiserror::Error)]
pub enum ReadbackError {
    #[error("buffer map failed: {0}")]
    Map(#[from] wgpu::BufferAsyncError),
    #[error("buffer map callback was dropped before completing")]
    CallbackDropped,
    #[error("device poll failed: {0}")]
    Poll(#[from] wgpu::PollError),
}

/// Helper for recording compute shader workloads.
///
/// Wraps the boilerplate of beginning a compute pass, setting pipeline and
/// bind groups, and dispatching workgroups. Passes are recorded into a
/// caller-owned encoder so a frame's passes execute in recording order.
pub struct ComputeDispatcher<'a> {
    label: Option<&'a str>,
}

impl<'a> ComputeDispatcher<'a> {
    /// Create a new compute dispatcher.
    pub fn new(label: Option<&'a str>) -> Self {
        Self { label }
    }

    fn bind<'p>(
        &self,
        encoder: &'p mut wgpu::CommandEncoder,
        pipeline: &wgpu::ComputePipeline,
        bind_groups: &[&wgpu::BindGroup],
    ) -> wgpu::ComputePass<'p> {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: self.label,
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        for (i, bg) in bind_groups.iter().enumerate() {
            pass.set_bind_group(i as u32, *bg, &[]);
        }
        pass
    }

    /// Record a single compute pass.
    pub fn record(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::ComputePipeline,
        bind_groups: &[&wgpu::BindGroup],
        workgroups: [u32; 3],
    ) {
        let mut pass = self.bind(encoder, pipeline, bind_groups);
        pass.dispatch_workgroups(workgroups[0], workgroups[1], workgroups[2]);
    }

    /// Record a 1D compute workload.
    ///
    /// Automatically calculates the number of workgroups needed to cover
    /// `total_invocations` with the given `workgroup_size`.
    pub fn record_1d(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::ComputePipeline,
        bind_groups: &[&wgpu::BindGroup],
        total_invocations: u32,
        workgroup_size: u32,
    ) {
        let workgroups_x = compute_workgroup_count(total_invocations, workgroup_size);
        self.record(encoder, pipeline, bind_groups, [workgroups_x, 1, 1]);
    }

    /// Record a compute pass whose workgroup counts come from `indirect`.
    pub fn record_indirect(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::ComputePipeline,
        bind_groups: &[&wgpu::BindGroup],
        indirect: &wgpu::Buffer,
        offset: wgpu::BufferAddress,
    ) {
        let mut pass = self.bind(encoder, pipeline, bind_groups);
        pass.dispatch_workgroups_indirect(indirect, offset);
    }
}

/// Calculate the number of workgroups needed to cover `total_items`
/// with a given `workgroup_size`. Rounds up.
pub fn compute_workgroup_count(total_items: u32, workgroup_size: u32) -> u32 {
    total_items.div_ceil(workgroup_size)
}

/// Create a `MAP_READ | COPY_DST` staging buffer.
pub fn create_staging_buffer(ctx: &WgpuContext, size: u64, label: Option<&str>) -> wgpu::Buffer {
    ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label,
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Map a staging buffer, copy its contents out and unmap it.
///
/// Blocks on the device until the map completes.
pub fn map_read<T: bytemuck::Pod>(
    ctx: &WgpuContext,
    staging: &wgpu::Buffer,
) -> Result<Vec<T>, ReadbackError> {
    let slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    ctx.device.poll(wgpu::PollType::wait_indefinitely())?;
    rx.recv().map_err(|_| ReadbackError::CallbackDropped)??;

    let data = slice.get_mapped_range();
    let result: Vec<T> = bytemuck::cast_slice(&data).to_vec();
    drop(data);
    staging.unmap();

    Ok(result)
}

/// Read data back from a `StorageBuffer` to the CPU synchronously.
pub fn read_back<T: bytemuck::Pod>(
    ctx: &WgpuContext,
    buffer: &StorageBuffer,
) -> Result<Vec<T>, ReadbackError> {
    let size = buffer.size();
    let staging = create_staging_buffer(ctx, size, Some("staging_readback"));

    let mut encoder = ctx.create_encoder(Some("readback copy"));
    encoder.copy_buffer_to_buffer(buffer.buffer(), 0, &staging, 0, size);
    ctx.submit([encoder.finish()]);

    map_read(ctx, &staging)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_workgroup_count() {
        assert_eq!(compute_workgroup_count(100, 64), 2);
        assert_eq!(compute_workgroup_count(128, 64), 2);
        assert_eq!(compute_workgroup_count(129, 64), 3);
        assert_eq!(compute_workgroup_count(1, 64), 1);
        assert_eq!(compute_workgroup_count(0, 64), 0);
        assert_eq!(compute_workgroup_count(64, 64), 1);
    }

    #[test]
    fn test_reduction_sized_dispatch() {
        // 1920x1080 at 16x16 groups
        assert_eq!(compute_workgroup_count(1920, 16), 120);
        assert_eq!(compute_workgroup_count(1080, 16), 68);
    }
}
