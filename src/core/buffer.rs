//! GPU buffer abstractions
//!
//! Provides typed wrappers for vertex, index, uniform, and storage buffers.

use crate::context::WgpuContext;
use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

/// A GPU buffer containing vertex data.
pub struct VertexBuffer {
    pub(crate) buffer: wgpu::Buffer,
    pub(crate) count: u32,
    pub(crate) stride: u64,
}

impl VertexBuffer {
    /// Create a new vertex buffer from a slice of vertices.
    pub fn new<V: Pod + Zeroable>(ctx: &WgpuContext, vertices: &[V], label: Option<&str>) -> Self {
        let buffer = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label,
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        Self {
            buffer,
            count: vertices.len() as u32,
            stride: std::mem::size_of::<V>() as u64,
        }
    }

    /// Get the raw wgpu buffer.
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Get the number of vertices.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Get the stride (size of one vertex in bytes).
    pub fn stride(&self) -> u64 {
        self.stride
    }

    /// Create a buffer slice for the entire buffer.
    pub fn slice(&self) -> wgpu::BufferSlice<'_> {
        self.buffer.slice(..)
    }
}

/// Smallest buffer size able to back a binding of `bytes` bytes.
///
/// Zero-sized buffers cannot be bound, so empty contents keep one word.
pub(crate) fn binding_size(bytes: u64) -> u64 {
    bytes.max(wgpu::COPY_BUFFER_ALIGNMENT)
}

/// Byte size of an index buffer holding `count` indices.
pub(crate) fn index_buffer_size(count: u32) -> u64 {
    binding_size(u64::from(count) * std::mem::size_of::<u32>() as u64)
}

/// A GPU buffer containing 32-bit index data.
///
/// Index buffers are also bindable as read-only storage so compute passes can
/// gather from them.
pub struct IndexBuffer {
    pub(crate) buffer: wgpu::Buffer,
    pub(crate) count: u32,
}

impl IndexBuffer {
    /// The index format used by every index buffer in the crate.
    pub const FORMAT: wgpu::IndexFormat = wgpu::IndexFormat::Uint32;

    /// Create a new index buffer from u32 indices.
    pub fn new(ctx: &WgpuContext, indices: &[u32], label: Option<&str>) -> Self {
        if indices.is_empty() {
            return Self::new_writable(ctx, 0, label);
        }
        let buffer = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label,
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::STORAGE,
            });
        Self {
            buffer,
            count: indices.len() as u32,
        }
    }

    /// Create an uninitialized index buffer that compute passes write into.
    pub fn new_writable(ctx: &WgpuContext, count: u32, label: Option<&str>) -> Self {
        let buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label,
            size: index_buffer_size(count),
            usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });
        Self { buffer, count }
    }

    /// Get the raw wgpu buffer.
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Get the number of indices.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Create a buffer slice for the entire buffer.
    pub fn slice(&self) -> wgpu::BufferSlice<'_> {
        self.buffer.slice(..)
    }
}

/// Raw uniform buffer without type information.
///
/// Also a copy destination, so GPU-produced values (cascade matrices, planes,
/// scales) can be copied straight into it.
pub struct RawUniformBuffer {
    pub(crate) buffer: wgpu::Buffer,
    pub(crate) size: u64,
}

impl RawUniformBuffer {
    /// Create a new raw uniform buffer with specified size.
    pub fn new(ctx: &WgpuContext, size: u64, label: Option<&str>) -> Self {
        let buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label,
            size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self { buffer, size }
    }

    /// Create a raw uniform buffer sized for `T`.
    pub fn for_type<T: Pod>(ctx: &WgpuContext, label: Option<&str>) -> Self {
        Self::new(ctx, std::mem::size_of::<T>() as u64, label)
    }

    /// Write data to the buffer.
    pub fn write<T: Pod>(&self, ctx: &WgpuContext, data: &T) {
        ctx.queue
            .write_buffer(&self.buffer, 0, bytemuck::bytes_of(data));
    }

    /// Get the raw wgpu buffer.
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Get the buffer size.
    pub fn size(&self) -> u64 {
        self.size
    }
}

/// An untyped GPU storage buffer.
pub struct StorageBuffer {
    pub(crate) buffer: wgpu::Buffer,
    pub(crate) size: u64,
}

impl StorageBuffer {
    /// Storage buffers can always be copied from, copied to and read back.
    const BASE_USAGE: wgpu::BufferUsages = wgpu::BufferUsages::STORAGE
        .union(wgpu::BufferUsages::COPY_SRC)
        .union(wgpu::BufferUsages::COPY_DST);

    /// Create a zeroed storage buffer of `size` bytes.
    pub fn new(ctx: &WgpuContext, size: u64, label: Option<&str>) -> Self {
        Self::with_usage(ctx, size, wgpu::BufferUsages::empty(), label)
    }

    /// Create a zeroed storage buffer with extra usages (e.g. `INDIRECT`).
    pub fn with_usage(
        ctx: &WgpuContext,
        size: u64,
        extra_usage: wgpu::BufferUsages,
        label: Option<&str>,
    ) -> Self {
        let size = binding_size(size);
        let buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label,
            size,
            usage: Self::BASE_USAGE | extra_usage,
            mapped_at_creation: false,
        });
        Self { buffer, size }
    }

    /// Create a storage buffer initialised with `data`.
    pub fn from_slice<T: Pod>(ctx: &WgpuContext, data: &[T], label: Option<&str>) -> Self {
        if data.is_empty() {
            return Self::new(ctx, 0, label);
        }
        let buffer = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label,
                contents: bytemuck::cast_slice(data),
                usage: Self::BASE_USAGE,
            });
        Self {
            size: std::mem::size_of_val(data) as u64,
            buffer,
        }
    }

    /// Write a slice of data to the start of the buffer.
    pub fn write<T: Pod>(&self, ctx: &WgpuContext, data: &[T]) {
        ctx.queue
            .write_buffer(&self.buffer, 0, bytemuck::cast_slice(data));
    }

    /// Get the raw wgpu buffer.
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Get the buffer size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Binding resource covering the whole buffer.
    pub fn as_entire_binding(&self) -> wgpu::BindingResource<'_> {
        self.buffer.as_entire_binding()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_bindings_keep_one_word() {
        assert_eq!(binding_size(0), 4);
        assert_eq!(binding_size(48), 48);
    }

    #[test]
    fn test_index_buffer_size() {
        assert_eq!(index_buffer_size(0), 4);
        assert_eq!(index_buffer_size(1), 4);
        assert_eq!(index_buffer_size(36), 144);
    }
}
