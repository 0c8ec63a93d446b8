//! Cascaded shadow maps
//!
//! The per-frame flow is:
//!
//! 1. depth prepass from the camera ([`ShadowRasterizer::render_depth`]);
//! 2. optional depth reduction to fit the cascades to visible geometry
//!    ([`DepthReducer`]);
//! 3. cascade fitting, on the CPU ([`CascadeBuilder`]) or, with GPU scene
//!    submission, on the GPU ([`GpuCascadeSetup`]);
//! 4. shadow depth rendering per cascade, culled per part on the CPU or
//!    culled and batched on the GPU ([`GpuBatcher`]);
//! 5. for filterable modes, moment conversion and blur ([`MomentConverter`]);
//! 6. compositor constants and resources ([`ShadowConstants`],
//!    [`ShadowResources`]).
//!
//! [`CascadedShadowMaps`] runs the whole flow against a [`ShadowSettings`]
//! snapshot.

pub mod batch;
pub mod cascade;
pub mod debug;
mod error;
pub mod moment;
pub mod rasterizer;
pub mod reduction;
pub mod scene;
pub mod settings;
pub mod setup;

pub use batch::GpuBatcher;
pub use cascade::{CascadeBuilder, CascadeSet, CascadeTransform};
pub use debug::{CascadeDebugLines, DebugLineRenderer};
pub use error::ShadowError;
pub use moment::{BlurPlan, MomentConverter, MomentTargets};
pub use rasterizer::ShadowRasterizer;
pub use reduction::{DepthRange, DepthReducer};
pub use scene::{MeshGroup, SceneMesh, ShadowScene};
pub use settings::{
    CascadeSelectionMode, FixedFilterSize, PartitionMode, ShadowAnisotropy, ShadowDepthFormat,
    ShadowMapSize, ShadowMode, ShadowMsaa, ShadowSettings, SmFormat,
};
pub use setup::GpuCascadeSetup;

use crate::context::WgpuContext;
use crate::core::binding::{depth_texture_entry, sampler_entry, texture_entry, uniform_entry};
use crate::core::texture::{
    create_anisotropic_sampler, create_comparison_sampler, create_point_sampler,
};
use crate::core::{DepthTexture, RawUniformBuffer, Texture2DArray};
use crate::renderer::culling::Frustum;
use crate::renderer::viewer::Viewer;
use moment::{max_exponent, CascadeScales, ConvertRequest, MomentMode};
use rasterizer::{CameraPass, CascadeSource};
use setup::SetupParams;
use std::mem::offset_of;

/// Number of cascades.
pub const NUM_CASCADES: usize = 4;

/// Widest blur, in texels, applied to a moment map.
pub const MAX_KERNEL_SIZE: f32 = 9.0;

/// Largest precompiled blur radius.
pub const MAX_BLUR_RADIUS: u32 = 4;

/// Bits of [`ShadowConstants::flags`].
pub mod flags {
    pub const RECEIVER_PLANE_BIAS: u32 = 1;
    pub const VISUALIZE_CASCADES: u32 = 1 << 1;
    pub const FILTER_ACROSS_CASCADES: u32 = 1 << 2;
    pub const RANDOMIZE_DISC_OFFSETS: u32 = 1 << 3;
    pub const SHADOW_MIPS: u32 = 1 << 4;
}

/// Compositor uniform.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ShadowConstants {
    pub global_shadow_matrix: [[f32; 4]; 4],
    pub split_depths: [f32; 4],
    pub cascade_offsets: [[f32; 4]; NUM_CASCADES],
    pub cascade_scales: [[f32; 4]; NUM_CASCADES],
    pub light_direction: [f32; 4],
    pub bias: f32,
    pub vsm_bias: f32,
    pub offset_scale: f32,
    pub light_bleeding_reduction: f32,
    /// Exponents before the per-cascade rescale, clamped to the moment format.
    pub positive_exponent: f32,
    pub negative_exponent: f32,
    pub msm_depth_bias: f32,
    pub msm_moment_bias: f32,
    pub shadow_map_size: f32,
    pub filter_size: f32,
    pub fixed_kernel_size: f32,
    pub num_disc_samples: u32,
    pub shadow_mode: u32,
    pub flags: u32,
    pub cascade_selection: u32,
    pub _padding: u32,
}

impl ShadowConstants {
    pub fn new(settings: &ShadowSettings, set: &CascadeSet, max_exponent: f32) -> Self {
        let mut bits = 0;
        for (enabled, bit) in [
            (settings.use_receiver_plane_bias, flags::RECEIVER_PLANE_BIAS),
            (settings.visualize_cascades, flags::VISUALIZE_CASCADES),
            (settings.filter_across_cascades, flags::FILTER_ACROSS_CASCADES),
            (settings.randomize_disc_offsets, flags::RANDOMIZE_DISC_OFFSETS),
            (settings.enable_shadow_mips, flags::SHADOW_MIPS),
        ] {
            if enabled {
                bits |= bit;
            }
        }

        Self {
            global_shadow_matrix: set.global_shadow_matrix.to_cols_array_2d(),
            split_depths: set.split_depths(),
            cascade_offsets: set.cascades.map(|c| c.offset.extend(0.0).to_array()),
            cascade_scales: set.cascades.map(|c| c.scale.extend(1.0).to_array()),
            light_direction: settings.light_dir().extend(0.0).to_array(),
            bias: settings.bias,
            vsm_bias: settings.vsm_bias,
            offset_scale: settings.offset_scale,
            light_bleeding_reduction: settings.light_bleeding_reduction,
            positive_exponent: settings.positive_exponent.min(max_exponent),
            negative_exponent: settings.negative_exponent.min(max_exponent),
            msm_depth_bias: settings.msm_depth_bias,
            msm_moment_bias: settings.msm_moment_bias,
            shadow_map_size: settings.resolution() as f32,
            filter_size: settings.filter_size,
            fixed_kernel_size: settings.fixed_kernel_size(),
            num_disc_samples: settings.num_disc_samples,
            shadow_mode: settings.shadow_mode.shader_index(),
            flags: bits,
            cascade_selection: settings.cascade_selection_mode as u32,
            _padding: 0,
        }
    }
}

/// Which sampler the compositor reads the shadow maps with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerKind {
    /// Hardware depth comparison for the PCF modes.
    Comparison,
    /// Trilinear, anisotropic filtering of moment maps.
    Anisotropic,
    /// Unfiltered reads for debug display.
    Point,
}

impl SamplerKind {
    pub fn for_mode(mode: ShadowMode) -> Self {
        if mode.is_filterable() {
            SamplerKind::Anisotropic
        } else {
            SamplerKind::Comparison
        }
    }
}

/// Largest sample count `format` supports that does not exceed `requested`.
pub fn supported_sample_count(format: wgpu::TextureFormat, features: wgpu::Features, requested: u32) -> u32 {
    let supported = format.guaranteed_format_features(features).flags;
    let mut count = requested.max(1);
    while count > 1 && !supported.sample_count_supported(count) {
        count /= 2;
    }
    count
}

/// The textures shadows are rendered into.
pub enum ShadowMaps {
    /// One depth layer per cascade.
    Depth(Texture2DArray),
    /// A depth surface reused per cascade, converted into moments.
    Moments {
        surface: DepthTexture,
        targets: MomentTargets,
    },
}

/// Everything the compositor binds.
pub struct ShadowResources {
    maps: ShadowMaps,
    constants: RawUniformBuffer,
    comparison_sampler: wgpu::Sampler,
    anisotropic_sampler: wgpu::Sampler,
    point_sampler: wgpu::Sampler,
    mode: ShadowMode,
}

impl ShadowResources {
    /// Allocate maps for `settings`. `moment_format` is required for
    /// filterable modes.
    pub fn new(
        ctx: &WgpuContext,
        settings: &ShadowSettings,
        moment_format: Option<wgpu::TextureFormat>,
    ) -> Result<Self, ShadowError> {
        let resolution = settings.resolution();
        let depth_format = settings.depth_format.to_wgpu();

        let maps = match (settings.shadow_mode.is_filterable(), moment_format) {
            (false, _) => ShadowMaps::Depth(Texture2DArray::new_depth(
                ctx,
                resolution,
                NUM_CASCADES as u32,
                depth_format,
            )),
            (true, Some(format)) => {
                let requested = settings.shadow_msaa.sample_count();
                let samples =
                    supported_sample_count(depth_format, ctx.device.features(), requested);
                if samples != requested {
                    tracing::warn!(requested, samples, ?depth_format, "shadow MSAA not supported");
                }
                ShadowMaps::Moments {
                    surface: DepthTexture::with_format(
                        ctx,
                        resolution,
                        resolution,
                        depth_format,
                        samples,
                        Some("shadow depth surface"),
                    ),
                    targets: MomentTargets::new(
                        ctx,
                        resolution,
                        format,
                        settings.enable_shadow_mips,
                    ),
                }
            }
            (true, None) => {
                return Err(ShadowError::invalid(
                    "shadow_mode",
                    format!("{:?} needs a moment format", settings.shadow_mode),
                ))
            }
        };

        tracing::info!(
            resolution,
            mode = ?settings.shadow_mode,
            ?depth_format,
            "allocated shadow maps"
        );

        Ok(Self {
            maps,
            constants: RawUniformBuffer::for_type::<ShadowConstants>(ctx, Some("shadow constants")),
            comparison_sampler: create_comparison_sampler(ctx),
            anisotropic_sampler: create_anisotropic_sampler(
                ctx,
                settings.shadow_anisotropy.samples(),
            ),
            point_sampler: create_point_sampler(ctx),
            mode: settings.shadow_mode,
        })
    }

    pub fn maps(&self) -> &ShadowMaps {
        &self.maps
    }

    /// Array view the compositor samples.
    pub fn view(&self) -> &wgpu::TextureView {
        match &self.maps {
            ShadowMaps::Depth(array) => array.view(),
            ShadowMaps::Moments { targets, .. } => targets.maps().view(),
        }
    }

    pub fn sampler(&self, kind: SamplerKind) -> &wgpu::Sampler {
        match kind {
            SamplerKind::Comparison => &self.comparison_sampler,
            SamplerKind::Anisotropic => &self.anisotropic_sampler,
            SamplerKind::Point => &self.point_sampler,
        }
    }

    /// The sampler matching the mode the maps were allocated for.
    pub fn mode_sampler(&self) -> &wgpu::Sampler {
        self.sampler(SamplerKind::for_mode(self.mode))
    }

    /// Compositor uniform buffer holding [`ShadowConstants`].
    pub fn constants(&self) -> &wgpu::Buffer {
        self.constants.buffer()
    }

    /// Layout for [`Self::create_bind_group`]: maps at 0, the mode's sampler
    /// at 1 and the constants at 2.
    pub fn layout_entries(&self) -> [wgpu::BindGroupLayoutEntry; 3] {
        let fragment = wgpu::ShaderStages::FRAGMENT;
        let array = wgpu::TextureViewDimension::D2Array;
        let (maps, sampler) = match &self.maps {
            ShadowMaps::Depth(_) => (
                depth_texture_entry(0, fragment, array, false),
                wgpu::SamplerBindingType::Comparison,
            ),
            ShadowMaps::Moments { .. } => (
                texture_entry(0, fragment, array, true),
                wgpu::SamplerBindingType::Filtering,
            ),
        };
        [
            maps,
            sampler_entry(1, fragment, sampler),
            uniform_entry(2, fragment),
        ]
    }

    /// Bind group a compositor samples the shadows through.
    pub fn create_bind_group(
        &self,
        ctx: &WgpuContext,
        layout: &wgpu::BindGroupLayout,
    ) -> wgpu::BindGroup {
        ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("shadow compositor bind group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(self.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(self.mode_sampler()),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.constants.buffer().as_entire_binding(),
                },
            ],
        })
    }

    fn sample_count(&self) -> u32 {
        match &self.maps {
            ShadowMaps::Depth(_) => 1,
            ShadowMaps::Moments { surface, .. } => surface.sample_count(),
        }
    }
}

/// What one frame produced.
#[derive(Debug, Clone)]
pub struct ShadowFrame {
    /// CPU-built cascades. With GPU submission the GPU rebuilds them from
    /// its own depth bounds, so these are only an approximation.
    pub cascades: CascadeSet,
    pub depth_range: DepthRange,
    /// Draws issued per cascade.
    pub draws: [usize; NUM_CASCADES],
    /// Blur applied per cascade; `None` for non-filterable modes.
    pub blur: [Option<BlurPlan>; NUM_CASCADES],
}

/// The full cascaded shadow map pipeline.
pub struct CascadedShadowMaps {
    settings: ShadowSettings,
    reducer: DepthReducer,
    batcher: GpuBatcher,
    setup: GpuCascadeSetup,
    rasterizer: ShadowRasterizer,
    converter: Option<MomentConverter>,
    resources: ShadowResources,
    prepass_depth: DepthTexture,
    debug_lines: CascadeDebugLines,
}

impl CascadedShadowMaps {
    /// Build the pipeline for a `width` x `height` camera view.
    pub fn new(
        ctx: &WgpuContext,
        settings: &ShadowSettings,
        width: u32,
        height: u32,
    ) -> anyhow::Result<Self> {
        settings.validate()?;

        let converter = Self::make_converter(ctx, settings, None)?;
        let resources = ShadowResources::new(ctx, settings, Self::moment_format(settings, &converter))?;
        let rasterizer = ShadowRasterizer::new(
            ctx,
            settings.depth_format.to_wgpu(),
            resources.sample_count(),
        )?;

        let mut this = Self {
            settings: settings.clone(),
            reducer: DepthReducer::new(ctx, settings.readback_latency)?,
            batcher: GpuBatcher::new(ctx)?,
            setup: GpuCascadeSetup::new(ctx)?,
            rasterizer,
            converter,
            resources,
            prepass_depth: DepthTexture::new(ctx, width, height, Some("camera depth prepass")),
            debug_lines: CascadeDebugLines::default(),
        };
        this.resize(ctx, width, height);
        Ok(this)
    }

    fn make_converter(
        ctx: &WgpuContext,
        settings: &ShadowSettings,
        current: Option<MomentConverter>,
    ) -> anyhow::Result<Option<MomentConverter>> {
        if !settings.shadow_mode.is_filterable() {
            return Ok(current);
        }
        match current {
            Some(converter) if converter.sm_format() == settings.sm_format => Ok(Some(converter)),
            _ => Ok(Some(MomentConverter::new(ctx, settings.sm_format)?)),
        }
    }

    fn moment_format(
        settings: &ShadowSettings,
        converter: &Option<MomentConverter>,
    ) -> Option<wgpu::TextureFormat> {
        let mode = MomentMode::from_shadow_mode(settings.shadow_mode)?;
        converter.as_ref().map(|c| c.format_for(mode))
    }

    /// Resize the camera depth prepass and the reduction pyramid.
    pub fn resize(&mut self, ctx: &WgpuContext, width: u32, height: u32) {
        self.prepass_depth.resize(ctx, width, height);
        self.reducer
            .resize(ctx, self.prepass_depth.view(), width, height);
        if let Some(result) = self.reducer.result_buffer() {
            self.setup.bind_depth_bounds(ctx, result);
        }
    }

    /// Take a new settings snapshot, reallocating resources when needed.
    /// Returns whether anything was reallocated.
    pub fn apply_settings(
        &mut self,
        ctx: &WgpuContext,
        settings: &ShadowSettings,
    ) -> anyhow::Result<bool> {
        settings.validate()?;
        let realloc = settings.requires_realloc(&self.settings);
        if realloc {
            let converter = Self::make_converter(ctx, settings, self.converter.take())?;
            let resources =
                ShadowResources::new(ctx, settings, Self::moment_format(settings, &converter))?;
            self.rasterizer = ShadowRasterizer::new(
                ctx,
                settings.depth_format.to_wgpu(),
                resources.sample_count(),
            )?;
            self.converter = converter;
            self.resources = resources;
        }
        self.settings = settings.clone();
        Ok(realloc)
    }

    /// Record one frame of shadow rendering into `encoder`.
    ///
    /// `settings` receives the measured depth bounds when auto bounds are on.
    /// Must run before `encoder` is submitted; see [`DepthReducer::reduce`].
    pub fn render(
        &mut self,
        ctx: &WgpuContext,
        encoder: &mut wgpu::CommandEncoder,
        scene: &ShadowScene,
        camera: &impl Viewer,
        settings: &mut ShadowSettings,
    ) -> Result<ShadowFrame, ShadowError> {
        settings.validate()?;
        if settings.requires_realloc(&self.settings) {
            return Err(ShadowError::StaleResources);
        }
        let gpu = settings.gpu_scene_submission;

        let camera_vp = camera.view_projection_matrix();
        let camera_frustum = Frustum::from_view_projection(camera_vp);
        self.rasterizer.render_depth(
            ctx,
            encoder,
            scene,
            &self.prepass_depth,
            CameraPass {
                view_projection: camera_vp,
                frustum: &camera_frustum,
                batcher: gpu.then_some(&self.batcher),
            },
        )?;

        if settings.auto_compute_depth_bounds {
            self.reducer.reduce(ctx, encoder, camera, settings)?;
        }
        self.reducer.update_settings(settings);

        let set = CascadeBuilder::new(settings).build(
            settings,
            camera,
            settings.min_cascade_distance,
            settings.max_cascade_distance,
        );

        if gpu {
            let params = SetupParams::new(settings, camera, set.global_shadow_matrix);
            if !self.setup.record(ctx, encoder, &params) {
                tracing::warn!("GPU cascade setup unavailable, shadows use last frame's cascades");
            }
        }

        let mut draws = [0; NUM_CASCADES];
        let mut blur = [None; NUM_CASCADES];
        for cascade in 0..NUM_CASCADES {
            let source = if gpu {
                CascadeSource::Gpu {
                    setup: &self.setup,
                    batcher: &self.batcher,
                }
            } else {
                CascadeSource::Cpu(&set.cascades[cascade])
            };

            match &self.resources.maps {
                ShadowMaps::Depth(array) => {
                    draws[cascade] = self.rasterizer.render_cascade(
                        ctx,
                        encoder,
                        scene,
                        cascade,
                        array.layer_view(cascade as u32),
                        source,
                    )?;
                }
                ShadowMaps::Moments { surface, targets } => {
                    draws[cascade] = self.rasterizer.render_cascade(
                        ctx,
                        encoder,
                        scene,
                        cascade,
                        surface.view(),
                        source,
                    )?;
                    let converter = self.converter.as_ref().ok_or(ShadowError::StaleResources)?;
                    let scales = if gpu {
                        CascadeScales::Gpu(&self.setup)
                    } else {
                        CascadeScales::Cpu {
                            scale: set.cascades[cascade].scale,
                            scale0: set.cascades[0].scale,
                        }
                    };
                    let msaa = match surface.sample_count() {
                        1 => ShadowMsaa::None,
                        2 => ShadowMsaa::X2,
                        4 => ShadowMsaa::X4,
                        _ => ShadowMsaa::X8,
                    };
                    blur[cascade] = Some(converter.convert(
                        ctx,
                        encoder,
                        settings,
                        targets,
                        &ConvertRequest {
                            cascade,
                            depth: surface.view(),
                            msaa,
                            scales,
                        },
                    )?);
                }
            }
        }

        self.write_constants(ctx, encoder, settings, &set);

        if settings.visualize_cascades {
            self.debug_lines = CascadeDebugLines::build(&set, camera_vp.inverse());
        }

        tracing::debug!(
            splits = ?set.splits,
            ?draws,
            gpu,
            "rendered shadow cascades"
        );

        Ok(ShadowFrame {
            cascades: set,
            depth_range: self.reducer.depth_range(),
            draws,
            blur,
        })
    }

    fn write_constants(
        &self,
        ctx: &WgpuContext,
        encoder: &mut wgpu::CommandEncoder,
        settings: &ShadowSettings,
        set: &CascadeSet,
    ) {
        let max = match &self.resources.maps {
            ShadowMaps::Moments { targets, .. } => max_exponent(targets.format()),
            ShadowMaps::Depth(_) => moment::MAX_EXPONENT_32,
        };
        self.resources
            .constants
            .write(ctx, &ShadowConstants::new(settings, set, max));

        if settings.gpu_scene_submission {
            let dst = self.resources.constants.buffer();
            let offsets = offset_of!(ShadowConstants, cascade_offsets) as u64;
            let scales = offset_of!(ShadowConstants, cascade_scales) as u64;
            for cascade in 0..NUM_CASCADES {
                let stride = (cascade * 16) as u64;
                self.setup.copy_offset(encoder, cascade, dst, offsets + stride);
                self.setup.copy_scale(encoder, cascade, dst, scales + stride);
            }
            self.setup.copy_split_depths(
                encoder,
                dst,
                offset_of!(ShadowConstants, split_depths) as u64,
            );
        }
    }

    pub fn settings(&self) -> &ShadowSettings {
        &self.settings
    }

    pub fn resources(&self) -> &ShadowResources {
        &self.resources
    }

    pub fn reducer(&self) -> &DepthReducer {
        &self.reducer
    }

    pub fn batcher(&self) -> &GpuBatcher {
        &self.batcher
    }

    pub fn setup(&self) -> &GpuCascadeSetup {
        &self.setup
    }

    /// Camera depth from the last prepass.
    pub fn prepass_depth(&self) -> &DepthTexture {
        &self.prepass_depth
    }

    /// Lines from the last frame rendered with cascade visualization on.
    pub fn debug_lines(&self) -> &CascadeDebugLines {
        &self.debug_lines
    }
}
