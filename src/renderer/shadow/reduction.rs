//! Depth bounds reduction
//!
//! Reduces the prepass depth buffer to the normalized `[min, max]` view depth
//! of visible geometry. Each level of the pyramid shrinks the previous one by
//! [`REDUCTION_TG_SIZE`] in both axes until one texel is left. The final
//! texel is copied into a [`ReadbackRing`] and read on the CPU a configurable
//! number of frames later, so the map never waits on in-flight GPU work.
//!
//! With GPU scene submission the pyramid still runs, but its result is
//! consumed on the GPU by the cascade setup pass and never mapped.

use super::settings::ShadowSettings;
use super::ShadowError;
use crate::compute::{create_staging_buffer, map_read, ComputeDispatcher, ReadbackRing};
use crate::context::WgpuContext;
use crate::core::binding::{create_layout, depth_texture_entry, storage_entry, uniform_entry};
use crate::core::{ComputePipelineBuilder, RawUniformBuffer, StorageBuffer};
use crate::renderer::viewer::Viewer;
use glam::{Mat4, Vec4};

/// Edge length of the square block reduced by one workgroup.
///
/// Fed to the shader's `TG_SIZE` override; its square must be a power of two
/// within the shader's shared arrays.
pub const REDUCTION_TG_SIZE: u32 = 16;

/// Length of the shader's workgroup-shared arrays.
const MAX_GROUP_THREADS: u32 = 1024;

const _: () = assert!(REDUCTION_TG_SIZE * REDUCTION_TG_SIZE <= MAX_GROUP_THREADS);

/// Bytes copied out of the final level.
const RESULT_SIZE: u64 = 4;

/// Staging buffers are padded to the map alignment.
const STAGING_SIZE: u64 = wgpu::MAP_ALIGNMENT;

/// Normalized view-depth bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthRange {
    pub min: f32,
    pub max: f32,
}

impl DepthRange {
    /// The whole view range, reported until real measurements arrive.
    pub const FULL: DepthRange = DepthRange { min: 0.0, max: 1.0 };

    /// Decode a `(min, max)` pair packed as two 16-bit unorm values.
    ///
    /// A reduction that saw no geometry decodes to `min > max` and yields
    /// [`DepthRange::FULL`].
    pub fn decode(packed: u32) -> Self {
        let [min, max] = unpack_unorm16x2(packed);
        if min > max {
            Self::FULL
        } else {
            Self { min, max }
        }
    }
}

impl Default for DepthRange {
    fn default() -> Self {
        Self::FULL
    }
}

/// `pack2x16unorm` as WGSL defines it.
pub fn pack_unorm16x2(v: [f32; 2]) -> u32 {
    let q = |x: f32| (x.clamp(0.0, 1.0) * 65535.0 + 0.5).floor() as u32;
    q(v[0]) | (q(v[1]) << 16)
}

/// `unpack2x16unorm` as WGSL defines it.
pub fn unpack_unorm16x2(packed: u32) -> [f32; 2] {
    [
        (packed & 0xffff) as f32 / 65535.0,
        (packed >> 16) as f32 / 65535.0,
    ]
}

/// Sizes of every pyramid level for a `width` x `height` source.
///
/// There is always at least one level and the last one is 1x1.
pub fn reduction_level_sizes(width: u32, height: u32, group_size: u32) -> Vec<(u32, u32)> {
    let (mut w, mut h) = (width.max(1), height.max(1));
    let mut sizes = Vec::new();
    loop {
        w = w.div_ceil(group_size);
        h = h.div_ceil(group_size);
        sizes.push((w, h));
        if w == 1 && h == 1 {
            return sizes;
        }
    }
}

/// Device depth to normalized view depth, as the reduction shader does it.
pub fn normalized_view_depth(inv_projection: Mat4, near: f32, far: f32, device_depth: f32) -> f32 {
    let view = inv_projection * Vec4::new(0.0, 0.0, device_depth, 1.0);
    let z = -view.z / view.w;
    ((z - near) / (far - near)).clamp(0.0, 1.0)
}

/// CPU model of the reduction pyramid.
///
/// Runs the same level structure and packing as the shader for any group
/// size, and returns the packed value of the final texel.
pub fn reduce_depth_reference(
    depth: &[f32],
    width: u32,
    height: u32,
    inv_projection: Mat4,
    near: f32,
    far: f32,
    group_size: u32,
) -> u32 {
    const EMPTY: [f32; 2] = [1.0, 0.0];

    let sizes = reduction_level_sizes(width, height, group_size);
    let mut src_size = (width, height);
    let mut src: Vec<u32> = Vec::new();

    for (level, &(w, h)) in sizes.iter().enumerate() {
        let mut dst = Vec::with_capacity((w * h) as usize);
        for gy in 0..h {
            for gx in 0..w {
                let mut bounds = EMPTY;
                for ty in 0..group_size {
                    for tx in 0..group_size {
                        let (x, y) = (gx * group_size + tx, gy * group_size + ty);
                        if x >= src_size.0 || y >= src_size.1 {
                            continue;
                        }
                        let idx = (y * src_size.0 + x) as usize;
                        let sample = if level == 0 {
                            let d = depth[idx];
                            if d < 1.0 {
                                let z = normalized_view_depth(inv_projection, near, far, d);
                                [z, z]
                            } else {
                                EMPTY
                            }
                        } else {
                            unpack_unorm16x2(src[idx])
                        };
                        bounds = [bounds[0].min(sample[0]), bounds[1].max(sample[1])];
                    }
                }
                dst.push(pack_unorm16x2(bounds));
            }
        }
        src = dst;
        src_size = (w, h);
    }

    src.first().copied().unwrap_or(pack_unorm16x2([1.0, 0.0]))
}

/// Remembers the manual cascade distances while auto depth bounds are on.
///
/// Auto bounds overwrite the min/max cascade distances every frame. The
/// values in effect when auto bounds were switched on are saved and written
/// back when they are switched off.
#[derive(Debug, Clone, Default)]
pub struct DepthBoundsTracker {
    saved_manual: Option<(f32, f32)>,
}

impl DepthBoundsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply this frame's measured range to `settings`.
    ///
    /// Returns `true` when the readback frame counter must restart, which is
    /// whenever CPU readback is not feeding the settings.
    pub fn apply(&mut self, settings: &mut ShadowSettings, measured: DepthRange) -> bool {
        if settings.auto_compute_depth_bounds && !settings.gpu_scene_submission {
            self.saved_manual.get_or_insert((
                settings.min_cascade_distance,
                settings.max_cascade_distance,
            ));
            settings.min_cascade_distance = measured.min;
            settings.max_cascade_distance = measured.max;
            return false;
        }

        if !settings.auto_compute_depth_bounds {
            if let Some((min, max)) = self.saved_manual.take() {
                settings.min_cascade_distance = min;
                settings.max_cascade_distance = max;
            }
        }
        true
    }

    /// Manual distances saved while auto bounds are active.
    pub fn saved_manual(&self) -> Option<(f32, f32)> {
        self.saved_manual
    }
}

/// Frame counter and staging ring behind the CPU depth bounds readback.
///
/// Generic over the slot type so the frame schedule runs without a device.
struct DepthReadback<T> {
    ring: ReadbackRing<T>,
    frame: u64,
}

impl<T> DepthReadback<T> {
    fn new(latency: usize, make_slot: impl FnMut(usize) -> T) -> Self {
        Self {
            ring: ReadbackRing::new(latency, make_slot),
            frame: 0,
        }
    }

    /// Rebuild the ring and restart the frame count when the latency changed.
    fn set_latency(&mut self, latency: usize, make_slot: impl FnMut(usize) -> T) {
        if self.ring.latency() != latency {
            self.ring = ReadbackRing::new(latency, make_slot);
            self.frame = 0;
        }
    }

    fn restart(&mut self) {
        self.frame = 0;
    }

    /// Decode the copy that is due, then hand out the slot for this frame's copy.
    ///
    /// `read` returns the packed word of a slot. Frames with nothing due, and
    /// empty reads, yield [`DepthRange::FULL`].
    fn step<E>(
        &mut self,
        read: impl FnOnce(&T) -> Result<Option<u32>, E>,
    ) -> Result<(DepthRange, &mut T), E> {
        let frame = self.frame;
        self.frame += 1;
        let (packed, slot) = self.ring.advance(frame, read);
        let range = packed
            .transpose()?
            .flatten()
            .map_or(DepthRange::FULL, DepthRange::decode);
        Ok((range, slot))
    }
}

/// Uniform block of the reduction shader.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ReductionParams {
    pub inv_projection: [[f32; 4]; 4],
    pub near_clip: f32,
    pub far_clip: f32,
    pub source_size: [u32; 2],
}

struct ReductionLevel {
    output: StorageBuffer,
    params: RawUniformBuffer,
    bind_group: wgpu::BindGroup,
    size: (u32, u32),
}

/// GPU min/max depth reducer with latency-bounded readback.
pub struct DepthReducer {
    initial_pipeline: wgpu::ComputePipeline,
    reduce_pipeline: wgpu::ComputePipeline,
    initial_layout: wgpu::BindGroupLayout,
    reduce_layout: wgpu::BindGroupLayout,
    levels: Vec<ReductionLevel>,
    source_size: (u32, u32),
    readback: DepthReadback<wgpu::Buffer>,
    depth_range: DepthRange,
    tracker: DepthBoundsTracker,
}

impl DepthReducer {
    pub fn new(ctx: &WgpuContext, readback_latency: u32) -> anyhow::Result<Self> {
        let shader = include_str!("../../shaders/depth_reduction.wgsl");
        let compute = wgpu::ShaderStages::COMPUTE;

        let initial_layout = create_layout(
            ctx,
            "depth reduction initial layout",
            &[
                uniform_entry(0, compute),
                depth_texture_entry(1, compute, wgpu::TextureViewDimension::D2, false),
                storage_entry(2, compute, false),
            ],
        );
        let reduce_layout = create_layout(
            ctx,
            "depth reduction layout",
            &[
                uniform_entry(0, compute),
                storage_entry(2, compute, false),
                storage_entry(3, compute, true),
            ],
        );

        let initial_pipeline = ComputePipelineBuilder::new(ctx)
            .label("depth reduction initial")
            .shader(shader)
            .entry_point("cs_initial")
            .constants(&[("TG_SIZE", f64::from(REDUCTION_TG_SIZE))])
            .bind_group_layout(&initial_layout)
            .build()?;
        let reduce_pipeline = ComputePipelineBuilder::new(ctx)
            .label("depth reduction")
            .shader(shader)
            .entry_point("cs_reduce")
            .constants(&[("TG_SIZE", f64::from(REDUCTION_TG_SIZE))])
            .bind_group_layout(&reduce_layout)
            .build()?;

        Ok(Self {
            initial_pipeline,
            reduce_pipeline,
            initial_layout,
            reduce_layout,
            levels: Vec::new(),
            source_size: (0, 0),
            readback: DepthReadback::new(readback_latency as usize, |slot| {
                Self::make_staging(ctx, slot)
            }),
            depth_range: DepthRange::FULL,
            tracker: DepthBoundsTracker::new(),
        })
    }

    fn make_staging(ctx: &WgpuContext, slot: usize) -> wgpu::Buffer {
        let label = format!("depth reduction staging {slot}");
        create_staging_buffer(ctx, STAGING_SIZE, Some(&label))
    }

    /// Rebuild the pyramid for a depth buffer of the given size.
    pub fn resize(
        &mut self,
        ctx: &WgpuContext,
        depth_view: &wgpu::TextureView,
        width: u32,
        height: u32,
    ) {
        let sizes = reduction_level_sizes(width, height, REDUCTION_TG_SIZE);
        tracing::info!(width, height, levels = sizes.len(), "allocating depth reduction targets");

        let mut levels: Vec<ReductionLevel> = Vec::with_capacity(sizes.len());
        let mut source_size = (width, height);
        for (i, &size) in sizes.iter().enumerate() {
            let output = StorageBuffer::new(
                ctx,
                u64::from(size.0 * size.1) * 4,
                Some(&format!("depth reduction level {i}")),
            );
            let params = RawUniformBuffer::for_type::<ReductionParams>(
                ctx,
                Some(&format!("depth reduction params {i}")),
            );
            params.write(
                ctx,
                &ReductionParams {
                    inv_projection: Mat4::IDENTITY.to_cols_array_2d(),
                    near_clip: 0.0,
                    far_clip: 1.0,
                    source_size: [source_size.0, source_size.1],
                },
            );

            let bind_group = match levels.last() {
                None => ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("depth reduction initial bind group"),
                    layout: &self.initial_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: params.buffer().as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(depth_view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: output.as_entire_binding(),
                        },
                    ],
                }),
                Some(prev) => ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("depth reduction bind group"),
                    layout: &self.reduce_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: params.buffer().as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: output.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: prev.output.as_entire_binding(),
                        },
                    ],
                }),
            };

            levels.push(ReductionLevel {
                output,
                params,
                bind_group,
                size,
            });
            source_size = size;
        }

        self.levels = levels;
        self.source_size = (width, height);
    }

    /// Record the reduction and, unless GPU submission is on, read back the
    /// result written `readback_latency` frames ago.
    ///
    /// Maps a staging buffer, so call it before this frame's encoder is
    /// submitted and after the previous frame's encoder was.
    pub fn reduce(
        &mut self,
        ctx: &WgpuContext,
        encoder: &mut wgpu::CommandEncoder,
        camera: &impl Viewer,
        settings: &ShadowSettings,
    ) -> Result<DepthRange, ShadowError> {
        let Some(first) = self.levels.first() else {
            return Ok(DepthRange::FULL);
        };

        let (width, height) = self.source_size;
        first.params.write(
            ctx,
            &ReductionParams {
                inv_projection: camera.projection_matrix().inverse().to_cols_array_2d(),
                near_clip: camera.near(),
                far_clip: camera.far(),
                source_size: [width, height],
            },
        );

        let dispatcher = ComputeDispatcher::new(Some("depth reduction"));
        for (i, level) in self.levels.iter().enumerate() {
            let pipeline = if i == 0 {
                &self.initial_pipeline
            } else {
                &self.reduce_pipeline
            };
            dispatcher.record(
                encoder,
                pipeline,
                &[&level.bind_group],
                [level.size.0, level.size.1, 1],
            );
        }

        if settings.gpu_scene_submission {
            return Ok(self.depth_range);
        }

        self.readback
            .set_latency(settings.readback_latency as usize, |slot| {
                Self::make_staging(ctx, slot)
            });
        let (range, slot) = self
            .readback
            .step(|staging| map_read::<u32>(ctx, staging).map(|words| words.first().copied()))?;
        if let Some(last) = self.levels.last() {
            encoder.copy_buffer_to_buffer(last.output.buffer(), 0, slot, 0, RESULT_SIZE);
        }
        self.depth_range = range;

        tracing::debug!(
            frame = self.readback.frame,
            min = range.min,
            max = range.max,
            "depth bounds readback"
        );
        Ok(range)
    }

    /// Push the latest measured bounds into `settings` and restore the
    /// manual distances when auto bounds were switched off.
    pub fn update_settings(&mut self, settings: &mut ShadowSettings) {
        if self.tracker.apply(settings, self.depth_range) {
            self.readback.restart();
            self.depth_range = DepthRange::FULL;
        }
    }

    /// Final 1x1 level, read by the GPU cascade setup.
    pub fn result_buffer(&self) -> Option<&StorageBuffer> {
        self.levels.last().map(|level| &level.output)
    }

    /// Most recent CPU-side result.
    pub fn depth_range(&self) -> DepthRange {
        self.depth_range
    }

    /// Number of pyramid levels.
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn projection() -> (Mat4, f32, f32) {
        let (near, far) = (0.5, 80.0);
        (
            Mat4::perspective_rh(60f32.to_radians(), 1.5, near, far),
            near,
            far,
        )
    }

    #[test]
    fn test_level_sizes() {
        assert_eq!(reduction_level_sizes(1920, 1080, 16), vec![(120, 68), (8, 5), (1, 1)]);
        assert_eq!(reduction_level_sizes(16, 16, 16), vec![(1, 1)]);
        assert_eq!(reduction_level_sizes(1, 1, 16), vec![(1, 1)]);
        assert_eq!(reduction_level_sizes(0, 0, 16), vec![(1, 1)]);
    }

    #[test]
    fn test_pack_matches_wgsl_rounding() {
        assert_eq!(pack_unorm16x2([0.0, 1.0]), 0xffff_0000);
        assert_eq!(pack_unorm16x2([1.0, 0.0]), 0x0000_ffff);
        assert_eq!(pack_unorm16x2([-3.0, 7.0]), 0xffff_0000);
        let [a, b] = unpack_unorm16x2(pack_unorm16x2([0.25, 0.75]));
        assert!((a - 0.25).abs() < 1e-4 && (b - 0.75).abs() < 1e-4);
    }

    #[test]
    fn test_view_depth_endpoints() {
        let (proj, near, far) = projection();
        let inv = proj.inverse();
        assert!(normalized_view_depth(inv, near, far, 0.0).abs() < 1e-4);
        assert!((normalized_view_depth(inv, near, far, 1.0) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_uniform_depth_is_idempotent() {
        let (proj, near, far) = projection();
        let inv = proj.inverse();
        let device_depth = 0.97;
        let expected = pack_unorm16x2([normalized_view_depth(inv, near, far, device_depth); 2]);

        for (w, h) in [(1, 1), (17, 5), (64, 64), (300, 211)] {
            let depth = vec![device_depth; (w * h) as usize];
            for group in [2, 8, REDUCTION_TG_SIZE] {
                let packed = reduce_depth_reference(&depth, w, h, inv, near, far, group);
                let range = DepthRange::decode(packed);
                assert_eq!(packed, expected, "{w}x{h} group {group}");
                assert_eq!(range.min, range.max);
            }
        }
    }

    #[test]
    fn test_reduction_finds_extremes() {
        let (proj, near, far) = projection();
        let inv = proj.inverse();
        let (w, h) = (100, 37);
        let mut depth = vec![1.0; (w * h) as usize];
        depth[5] = 0.90;
        depth[(36 * w + 99) as usize] = 0.995;
        depth[1234] = 0.95;

        let range = DepthRange::decode(reduce_depth_reference(&depth, w, h, inv, near, far, 16));
        let lo = normalized_view_depth(inv, near, far, 0.90);
        let hi = normalized_view_depth(inv, near, far, 0.995);
        assert!((range.min - lo).abs() < 1e-4);
        assert!((range.max - hi).abs() < 1e-4);
        assert!(range.min <= range.max);
    }

    #[test]
    fn test_empty_depth_falls_back_to_full_range() {
        let (proj, near, far) = projection();
        let depth = vec![1.0; 40 * 40];
        let packed = reduce_depth_reference(&depth, 40, 40, proj.inverse(), near, far, 16);
        assert_eq!(DepthRange::decode(packed), DepthRange::FULL);
    }

    #[test]
    fn test_tracker_writes_and_restores_manual_bounds() {
        let mut tracker = DepthBoundsTracker::new();
        let mut settings = ShadowSettings {
            min_cascade_distance: 0.02,
            max_cascade_distance: 0.6,
            ..Default::default()
        };

        // Auto off: counter resets, settings untouched.
        assert!(tracker.apply(&mut settings, DepthRange { min: 0.1, max: 0.3 }));
        assert_eq!(settings.min_cascade_distance, 0.02);

        settings.auto_compute_depth_bounds = true;
        assert!(!tracker.apply(&mut settings, DepthRange { min: 0.1, max: 0.3 }));
        assert!(!tracker.apply(&mut settings, DepthRange { min: 0.15, max: 0.4 }));
        assert_eq!(settings.min_cascade_distance, 0.15);
        assert_eq!(settings.max_cascade_distance, 0.4);
        assert_eq!(tracker.saved_manual(), Some((0.02, 0.6)));

        settings.auto_compute_depth_bounds = false;
        assert!(tracker.apply(&mut settings, DepthRange::FULL));
        assert_eq!(settings.min_cascade_distance, 0.02);
        assert_eq!(settings.max_cascade_distance, 0.6);
        assert_eq!(tracker.saved_manual(), None);
    }

    #[test]
    fn test_tracker_ignores_gpu_submission() {
        let mut tracker = DepthBoundsTracker::new();
        let mut settings = ShadowSettings {
            auto_compute_depth_bounds: true,
            gpu_scene_submission: true,
            ..Default::default()
        };
        assert!(tracker.apply(&mut settings, DepthRange { min: 0.3, max: 0.5 }));
        assert_eq!(settings.min_cascade_distance, 0.0);
        assert_eq!(settings.max_cascade_distance, 1.0);
    }

    /// One reducer frame over plain words: read what is due, then "copy" `packed`.
    fn readback_frame(readback: &mut DepthReadback<Option<u32>>, packed: u32) -> DepthRange {
        let (range, slot) = readback
            .step(|staged| Ok::<_, std::convert::Infallible>(*staged))
            .unwrap();
        *slot = Some(packed);
        range
    }

    fn measured(i: u32) -> u32 {
        pack_unorm16x2([0.05 * i as f32, 0.9])
    }

    #[test]
    fn test_readback_latency_zero_returns_previous_frame() {
        let mut readback = DepthReadback::new(0, |_| None);
        assert_eq!(readback_frame(&mut readback, measured(0)), DepthRange::FULL);
        assert_eq!(readback_frame(&mut readback, measured(1)), DepthRange::decode(measured(0)));
        assert_eq!(readback_frame(&mut readback, measured(2)), DepthRange::decode(measured(1)));
    }

    #[test]
    fn test_readback_first_value_arrives_at_latency() {
        let mut readback = DepthReadback::new(3, |_| None);
        let ranges: Vec<_> = (0..6).map(|i| readback_frame(&mut readback, measured(i))).collect();
        assert_eq!(&ranges[..3], &[DepthRange::FULL; 3]);
        assert_eq!(ranges[3], DepthRange::decode(measured(0)));
        assert_eq!(ranges[5], DepthRange::decode(measured(2)));
    }

    #[test]
    fn test_readback_latency_change_restarts() {
        let mut readback = DepthReadback::new(1, |_| None);
        for i in 0..4 {
            readback_frame(&mut readback, measured(i));
        }
        assert_eq!(readback.frame, 4);

        readback.set_latency(2, |_| None);
        assert_eq!(readback.frame, 0);
        assert_eq!(readback_frame(&mut readback, measured(7)), DepthRange::FULL);
        assert_eq!(readback_frame(&mut readback, measured(8)), DepthRange::FULL);
        assert_eq!(readback_frame(&mut readback, measured(9)), DepthRange::decode(measured(7)));

        // Same latency keeps the ring and the count.
        readback.set_latency(2, |_| Some(0));
        assert_eq!(readback.frame, 3);
    }

    #[test]
    fn test_readback_empty_read_is_full_range() {
        let mut readback = DepthReadback::new(0, |_| None);
        readback_frame(&mut readback, pack_unorm16x2([1.0, 0.0]));
        assert_eq!(readback_frame(&mut readback, 0), DepthRange::FULL);
        assert_eq!(readback_frame(&mut readback, 0), DepthRange::decode(0));
    }

    #[test]
    fn test_group_size_fits_shader() {
        let threads = REDUCTION_TG_SIZE * REDUCTION_TG_SIZE;
        assert!(threads.is_power_of_two());
        assert!(threads <= MAX_GROUP_THREADS);

        let shader = include_str!("../../shaders/depth_reduction.wgsl");
        assert!(shader.contains("override TG_SIZE: u32"));
        assert!(shader.contains(&format!("const MAX_THREADS: u32 = {MAX_GROUP_THREADS}u;")));
        assert_eq!(shader.matches("@workgroup_size(TG_SIZE, TG_SIZE, 1)").count(), 2);
    }

    #[test]
    fn test_params_layout() {
        assert_eq!(std::mem::size_of::<ReductionParams>(), 80);
    }
}
