//! Moment shadow map conversion
//!
//! Filterable modes render hard depth into a single (possibly multisampled)
//! surface per cascade, then convert it into moments with a full-screen pass
//! and blur the result separably: horizontally into a temporary target and
//! vertically back into the cascade's array slice. The final cascade can
//! optionally get a full mip chain.
//!
//! The blur width is the user filter size scaled by the cascade's XY scale
//! relative to the first cascade, so the blur covers the same world-space
//! width in every cascade. With CPU submission the radius is known up front
//! and selects one of the fixed-radius variants; with GPU submission the
//! scale only exists on the GPU and a dynamic-loop variant is used instead.

use super::settings::{ShadowMode, ShadowMsaa, ShadowSettings, SmFormat};
use super::setup::GpuCascadeSetup;
use super::{ShadowError, MAX_BLUR_RADIUS, MAX_KERNEL_SIZE, NUM_CASCADES};
use crate::context::WgpuContext;
use crate::core::binding::{
    create_layout, depth_texture_entry, sampler_entry, texture_entry, uniform_entry,
};
use crate::core::texture::{create_anisotropic_sampler, full_mip_count};
use crate::core::{
    build_stage, ClearState, Permutation, PermutationTable, RawUniformBuffer, ShaderStage,
    StageDesc, Texture2D, Texture2DArray,
};
use crate::effect::FullscreenTriangle;
use glam::Vec3;
use std::mem::offset_of;

/// Largest EVSM exponent a 16-bit float can hold without overflow.
pub const MAX_EXPONENT_16: f32 = 5.54;
/// Largest EVSM exponent a 32-bit float can hold without overflow.
pub const MAX_EXPONENT_32: f32 = 42.0;

const BLUR_SHADER: &str = include_str!("../../shaders/moment_blur.wgsl");
const CONVERT_SHADER: &str = include_str!("../../shaders/moment_convert.wgsl");
const MIPS_SHADER: &str = include_str!("../../shaders/generate_mips.wgsl");

/// The filterable subset of [`ShadowMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MomentMode {
    Vsm,
    Evsm2,
    Evsm4,
    MsmHamburger,
    MsmHausdorff,
}

impl MomentMode {
    pub const ALL: [MomentMode; 5] = [
        MomentMode::Vsm,
        MomentMode::Evsm2,
        MomentMode::Evsm4,
        MomentMode::MsmHamburger,
        MomentMode::MsmHausdorff,
    ];

    pub fn from_shadow_mode(mode: ShadowMode) -> Option<Self> {
        match mode {
            ShadowMode::Vsm => Some(MomentMode::Vsm),
            ShadowMode::Evsm2 => Some(MomentMode::Evsm2),
            ShadowMode::Evsm4 => Some(MomentMode::Evsm4),
            ShadowMode::MsmHamburger => Some(MomentMode::MsmHamburger),
            ShadowMode::MsmHausdorff => Some(MomentMode::MsmHausdorff),
            _ => None,
        }
    }

    /// Number of moments stored per texel.
    pub fn channels(self) -> u32 {
        match self {
            MomentMode::Vsm | MomentMode::Evsm2 => 2,
            _ => 4,
        }
    }

    fn shader_index(self) -> u32 {
        self as u32
    }
}

/// Texture format that stores `mode`'s moments at the requested precision.
///
/// 32-bit moments need filterable float32 textures and fall back to 16-bit
/// float without them. 16-bit VSM and MSM prefer normalized formats, which
/// need `TEXTURE_FORMAT_16BIT_NORM`.
pub fn moment_format(
    mode: MomentMode,
    sm_format: SmFormat,
    features: wgpu::Features,
) -> wgpu::TextureFormat {
    use wgpu::TextureFormat as F;

    let float32 = features.contains(wgpu::Features::FLOAT32_FILTERABLE);
    let norm16 = features.contains(wgpu::Features::TEXTURE_FORMAT_16BIT_NORM);

    match (sm_format, float32, mode.channels()) {
        (SmFormat::Bits32, true, 2) => F::Rg32Float,
        (SmFormat::Bits32, true, _) => F::Rgba32Float,
        _ => match mode {
            MomentMode::Vsm if norm16 => F::Rg16Unorm,
            MomentMode::Vsm | MomentMode::Evsm2 => F::Rg16Float,
            MomentMode::MsmHamburger | MomentMode::MsmHausdorff if norm16 => F::Rgba16Unorm,
            _ => F::Rgba16Float,
        },
    }
}

/// Largest EVSM exponent `format` can represent.
pub fn max_exponent(format: wgpu::TextureFormat) -> f32 {
    match format {
        wgpu::TextureFormat::Rg32Float | wgpu::TextureFormat::Rgba32Float => MAX_EXPONENT_32,
        _ => MAX_EXPONENT_16,
    }
}

/// EVSM exponents for a cascade, scaled by its depth range relative to the
/// first cascade and clamped to what the moment format can hold.
///
/// The conversion shader applies the same rule to the raw exponents in
/// [`MomentParams`], so it also holds for GPU-computed scales.
pub fn evsm_exponents(settings: &ShadowSettings, scale: Vec3, scale0: Vec3, max: f32) -> [f32; 2] {
    let ratio = (scale0.z / scale.z).abs();
    [
        (settings.positive_exponent * ratio).min(max),
        (settings.negative_exponent * ratio).min(max),
    ]
}

/// Blur width in texels along one axis.
///
/// `scale` is the cascade's scale on that axis and `scale0` the first
/// cascade's; the user filter size is capped so that the first cascade never
/// exceeds [`MAX_KERNEL_SIZE`].
pub fn blur_filter_size(filter_size: f32, scale: f32, scale0: f32) -> f32 {
    let max_filter = MAX_KERNEL_SIZE / scale0.abs();
    (filter_size.min(max_filter) * scale.abs()).clamp(1.0, MAX_KERNEL_SIZE)
}

/// Integer sample radius for a blur width, clamped to the precompiled range.
pub fn blur_radius(filter_size: f32) -> u32 {
    ((filter_size / 2.0 + 0.499) as u32).min(MAX_BLUR_RADIUS)
}

/// What the blur does for one cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlurPlan {
    Skip,
    Fixed { horizontal: u32, vertical: u32 },
    /// Radius computed on the GPU from the cascade scale.
    Dynamic,
}

/// Pick the blur for a cascade. GPU submission always blurs since the
/// scale is unknown on the CPU.
pub fn plan_blur(filter_size: f32, scale: Vec3, scale0: Vec3, gpu_submission: bool) -> BlurPlan {
    if gpu_submission {
        return BlurPlan::Dynamic;
    }
    let u = blur_filter_size(filter_size, scale.x, scale0.x);
    let v = blur_filter_size(filter_size, scale.y, scale0.y);
    if u > 1.0 || v > 1.0 {
        BlurPlan::Fixed {
            horizontal: blur_radius(u),
            vertical: blur_radius(v),
        }
    } else {
        BlurPlan::Skip
    }
}

/// Uniform block shared by conversion and blur.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MomentParams {
    pub cascade_scale: [f32; 4],
    pub cascade0_scale: [f32; 4],
    pub shadow_map_size: [f32; 2],
    pub filter_size: f32,
    pub sample_count: u32,
    pub positive_exponent: f32,
    pub negative_exponent: f32,
    pub max_exponent: f32,
    pub _padding: f32,
}

impl MomentParams {
    pub fn new(
        settings: &ShadowSettings,
        scale: Vec3,
        scale0: Vec3,
        sample_count: u32,
        max_exponent: f32,
    ) -> Self {
        let resolution = settings.resolution() as f32;
        // The shader rescales per cascade; see `evsm_exponents`.
        Self {
            cascade_scale: scale.extend(1.0).to_array(),
            cascade0_scale: scale0.extend(1.0).to_array(),
            shadow_map_size: [resolution, resolution],
            filter_size: settings.filter_size,
            sample_count,
            positive_exponent: settings.positive_exponent,
            negative_exponent: settings.negative_exponent,
            max_exponent,
            _padding: 0.0,
        }
    }
}

/// Conversion variant: one per moment mode and MSAA level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertKey {
    pub mode: MomentMode,
    pub msaa: ShadowMsaa,
}

impl Permutation for ConvertKey {
    const COUNT: usize = MomentMode::ALL.len() * ShadowMsaa::ALL.len();

    fn index(self) -> usize {
        self.mode as usize * ShadowMsaa::ALL.len() + self.msaa as usize
    }

    fn all() -> Vec<Self> {
        MomentMode::ALL
            .iter()
            .flat_map(|&mode| ShadowMsaa::ALL.iter().map(move |&msaa| ConvertKey { mode, msaa }))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlurDirection {
    Horizontal,
    Vertical,
}

impl Permutation for BlurDirection {
    const COUNT: usize = 2;

    fn index(self) -> usize {
        self as usize
    }

    fn all() -> Vec<Self> {
        vec![BlurDirection::Horizontal, BlurDirection::Vertical]
    }
}

/// Fixed-radius blur variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlurKey {
    pub direction: BlurDirection,
    pub radius: u32,
}

impl Permutation for BlurKey {
    const COUNT: usize = 2 * (MAX_BLUR_RADIUS as usize + 1);

    fn index(self) -> usize {
        self.direction.index() * (MAX_BLUR_RADIUS as usize + 1) + self.radius as usize
    }

    fn all() -> Vec<Self> {
        BlurDirection::all()
            .into_iter()
            .flat_map(|direction| {
                (0..=MAX_BLUR_RADIUS).map(move |radius| BlurKey { direction, radius })
            })
            .collect()
    }
}

/// Moment array plus the temporary target of the horizontal blur.
pub struct MomentTargets {
    maps: Texture2DArray,
    temp: Texture2D,
}

impl MomentTargets {
    pub fn new(ctx: &WgpuContext, resolution: u32, format: wgpu::TextureFormat, mips: bool) -> Self {
        let usage = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
        let mip_levels = if mips {
            full_mip_count(resolution, resolution)
        } else {
            1
        };
        Self {
            maps: Texture2DArray::new(
                ctx,
                resolution,
                resolution,
                NUM_CASCADES as u32,
                mip_levels,
                format,
                usage,
                Some("moment shadow maps"),
            ),
            temp: Texture2D::new(
                ctx,
                resolution,
                resolution,
                format,
                usage,
                Some("moment blur temp"),
            ),
        }
    }

    pub fn maps(&self) -> &Texture2DArray {
        &self.maps
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.maps.format()
    }
}

/// Where the conversion gets the cascade scales from.
#[derive(Clone, Copy)]
pub enum CascadeScales<'a> {
    Cpu { scale: Vec3, scale0: Vec3 },
    /// Copied from the GPU cascade setup output inside the encoder.
    Gpu(&'a GpuCascadeSetup),
}

/// One conversion request.
pub struct ConvertRequest<'a> {
    pub cascade: usize,
    pub depth: &'a wgpu::TextureView,
    pub msaa: ShadowMsaa,
    pub scales: CascadeScales<'a>,
}

struct FormatPipelines {
    format: wgpu::TextureFormat,
    blur: PermutationTable<BlurKey, wgpu::RenderPipeline>,
    dynamic_blur: PermutationTable<BlurDirection, wgpu::RenderPipeline>,
    downsample: wgpu::RenderPipeline,
}

/// Converts hard shadow depth to blurred moment maps.
pub struct MomentConverter {
    sm_format: SmFormat,
    features: wgpu::Features,
    convert_layout: wgpu::BindGroupLayout,
    convert_msaa_layout: wgpu::BindGroupLayout,
    blur_layout: wgpu::BindGroupLayout,
    mip_layout: wgpu::BindGroupLayout,
    convert: PermutationTable<ConvertKey, wgpu::RenderPipeline>,
    per_format: Vec<FormatPipelines>,
    params: Vec<RawUniformBuffer>,
    mip_sampler: wgpu::Sampler,
    triangle: FullscreenTriangle,
}

impl MomentConverter {
    pub fn new(ctx: &WgpuContext, sm_format: SmFormat) -> anyhow::Result<Self> {
        let features = ctx.device.features();
        if sm_format == SmFormat::Bits32 && !features.contains(wgpu::Features::FLOAT32_FILTERABLE)
        {
            tracing::warn!("32-bit moment maps are not filterable on this device, using 16-bit float");
        }

        let fragment = wgpu::ShaderStages::FRAGMENT;
        let d2 = wgpu::TextureViewDimension::D2;
        let convert_layout = create_layout(
            ctx,
            "moment convert layout",
            &[uniform_entry(0, fragment), depth_texture_entry(1, fragment, d2, false)],
        );
        let convert_msaa_layout = create_layout(
            ctx,
            "moment convert msaa layout",
            &[uniform_entry(0, fragment), depth_texture_entry(2, fragment, d2, true)],
        );
        let blur_layout = create_layout(
            ctx,
            "moment blur layout",
            &[uniform_entry(0, fragment), texture_entry(1, fragment, d2, false)],
        );
        let mip_layout = create_layout(
            ctx,
            "moment mip layout",
            &[
                texture_entry(0, fragment, d2, true),
                sampler_entry(1, fragment, wgpu::SamplerBindingType::Filtering),
            ],
        );

        let convert = PermutationTable::build(|key: ConvertKey| {
            let single = key.msaa == ShadowMsaa::None;
            let (entry, layout) = if single {
                ("fs_convert", &convert_layout)
            } else {
                ("fs_convert_msaa", &convert_msaa_layout)
            };
            let label = format!("moment convert {:?} {:?}", key.mode, key.msaa);
            build_stage(
                ctx,
                &StageDesc {
                    label: &label,
                    source: CONVERT_SHADER,
                    bind_group_layouts: &[layout],
                    constants: &[
                        ("MODE", f64::from(key.mode.shader_index())),
                        ("SAMPLE_COUNT", f64::from(key.msaa.sample_count())),
                    ],
                },
                ShaderStage::Fullscreen {
                    fragment_entry: entry,
                    format: moment_format(key.mode, sm_format, features),
                },
            )?
            .into_render()
        })?;

        let mut formats: Vec<wgpu::TextureFormat> = Vec::new();
        for mode in MomentMode::ALL {
            let format = moment_format(mode, sm_format, features);
            if !formats.contains(&format) {
                formats.push(format);
            }
        }

        let per_format = formats
            .into_iter()
            .map(|format| Self::build_format_pipelines(ctx, format, &blur_layout, &mip_layout))
            .collect::<anyhow::Result<Vec<_>>>()?;

        let params = (0..NUM_CASCADES)
            .map(|c| {
                RawUniformBuffer::for_type::<MomentParams>(ctx, Some(&format!("moment params {c}")))
            })
            .collect();

        tracing::info!(
            ?sm_format,
            conversions = convert.len(),
            formats = per_format.len(),
            "built moment conversion pipelines"
        );

        Ok(Self {
            sm_format,
            features,
            convert_layout,
            convert_msaa_layout,
            blur_layout,
            mip_layout,
            convert,
            per_format,
            params,
            mip_sampler: create_anisotropic_sampler(ctx, 1),
            triangle: FullscreenTriangle::new(ctx),
        })
    }

    fn build_format_pipelines(
        ctx: &WgpuContext,
        format: wgpu::TextureFormat,
        blur_layout: &wgpu::BindGroupLayout,
        mip_layout: &wgpu::BindGroupLayout,
    ) -> anyhow::Result<FormatPipelines> {
        let blur_stage = |label: &str, horizontal: bool, radius: u32, dynamic: bool| {
            build_stage(
                ctx,
                &StageDesc {
                    label,
                    source: BLUR_SHADER,
                    bind_group_layouts: &[blur_layout],
                    constants: &[
                        ("HORIZONTAL", f64::from(u8::from(horizontal))),
                        ("RADIUS", f64::from(radius)),
                        ("DYNAMIC", f64::from(u8::from(dynamic))),
                    ],
                },
                ShaderStage::Fullscreen {
                    fragment_entry: "fs_blur",
                    format,
                },
            )?
            .into_render()
        };

        let blur = PermutationTable::build(|key: BlurKey| {
            let label = format!("moment blur {:?} r{} {format:?}", key.direction, key.radius);
            blur_stage(&label, key.direction == BlurDirection::Horizontal, key.radius, false)
        })?;
        let dynamic_blur = PermutationTable::build(|direction: BlurDirection| {
            let label = format!("moment blur {direction:?} dynamic {format:?}");
            blur_stage(&label, direction == BlurDirection::Horizontal, 0, true)
        })?;

        let downsample = build_stage(
            ctx,
            &StageDesc {
                label: "moment downsample",
                source: MIPS_SHADER,
                bind_group_layouts: &[mip_layout],
                constants: &[],
            },
            ShaderStage::Fullscreen {
                fragment_entry: "fs_downsample",
                format,
            },
        )?
        .into_render()?;

        Ok(FormatPipelines {
            format,
            blur,
            dynamic_blur,
            downsample,
        })
    }

    pub fn sm_format(&self) -> SmFormat {
        self.sm_format
    }

    /// Moment format for `mode` on this device.
    pub fn format_for(&self, mode: MomentMode) -> wgpu::TextureFormat {
        moment_format(mode, self.sm_format, self.features)
    }

    fn pipelines_for(
        &self,
        format: wgpu::TextureFormat,
    ) -> Result<&FormatPipelines, ShadowError> {
        self.per_format
            .iter()
            .find(|p| p.format == format)
            .ok_or_else(|| {
                ShadowError::invalid("sm_format", format!("no moment pipelines for {format:?}"))
            })
    }

    /// Convert and blur one cascade. Returns the blur that was applied.
    pub fn convert(
        &self,
        ctx: &WgpuContext,
        encoder: &mut wgpu::CommandEncoder,
        settings: &ShadowSettings,
        targets: &MomentTargets,
        request: &ConvertRequest<'_>,
    ) -> Result<BlurPlan, ShadowError> {
        let mode = MomentMode::from_shadow_mode(settings.shadow_mode).ok_or_else(|| {
            ShadowError::invalid(
                "shadow_mode",
                format!("{:?} has no moment representation", settings.shadow_mode),
            )
        })?;
        if request.cascade >= NUM_CASCADES {
            return Err(ShadowError::invalid(
                "cascade",
                format!("{} is out of range", request.cascade),
            ));
        }
        let format = targets.format();
        if format != self.format_for(mode) {
            return Err(ShadowError::invalid(
                "sm_format",
                format!("moment targets are {format:?}, {mode:?} needs {:?}", self.format_for(mode)),
            ));
        }
        let pipelines = self.pipelines_for(format)?;

        let cascade = request.cascade;
        let params = &self.params[cascade];
        let sample_count = request.msaa.sample_count();
        let max = max_exponent(format);
        let plan = match request.scales {
            CascadeScales::Cpu { scale, scale0 } => {
                params.write(ctx, &MomentParams::new(settings, scale, scale0, sample_count, max));
                plan_blur(settings.filter_size, scale, scale0, false)
            }
            CascadeScales::Gpu(setup) => {
                params.write(
                    ctx,
                    &MomentParams::new(settings, Vec3::ONE, Vec3::ONE, sample_count, max),
                );
                let scale_offset = offset_of!(MomentParams, cascade_scale) as u64;
                let scale0_offset = offset_of!(MomentParams, cascade0_scale) as u64;
                setup.copy_scale(encoder, cascade, params.buffer(), scale_offset);
                setup.copy_scale(encoder, 0, params.buffer(), scale0_offset);
                BlurPlan::Dynamic
            }
        };

        let layer = cascade as u32;
        let (convert_layout, depth_binding) = if request.msaa == ShadowMsaa::None {
            (&self.convert_layout, 1)
        } else {
            (&self.convert_msaa_layout, 2)
        };
        let convert_bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("moment convert bind group"),
            layout: convert_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: depth_binding,
                    resource: wgpu::BindingResource::TextureView(request.depth),
                },
            ],
        });
        let convert = self.convert.get(ConvertKey {
            mode,
            msaa: request.msaa,
        });
        self.fullscreen_pass(
            encoder,
            "moment convert",
            targets.maps.layer_view(layer),
            convert,
            &convert_bind_group,
        );

        let blur = match plan {
            BlurPlan::Skip => None,
            BlurPlan::Fixed {
                horizontal,
                vertical,
            } => Some((
                pipelines.blur.get(BlurKey {
                    direction: BlurDirection::Horizontal,
                    radius: horizontal,
                }),
                pipelines.blur.get(BlurKey {
                    direction: BlurDirection::Vertical,
                    radius: vertical,
                }),
            )),
            BlurPlan::Dynamic => Some((
                pipelines.dynamic_blur.get(BlurDirection::Horizontal),
                pipelines.dynamic_blur.get(BlurDirection::Vertical),
            )),
        };

        if let Some((horizontal, vertical)) = blur {
            let slice = targets.maps.layer_view(layer);
            let h_group = self.blur_bind_group(ctx, params, slice);
            self.fullscreen_pass(encoder, "moment blur h", targets.temp.view(), horizontal, &h_group);
            let v_group = self.blur_bind_group(ctx, params, targets.temp.view());
            self.fullscreen_pass(encoder, "moment blur v", slice, vertical, &v_group);
        }

        if settings.enable_shadow_mips && cascade == NUM_CASCADES - 1 {
            self.generate_mips(ctx, encoder, &pipelines.downsample, &targets.maps, layer);
        }

        Ok(plan)
    }

    fn blur_bind_group(
        &self,
        ctx: &WgpuContext,
        params: &RawUniformBuffer,
        source: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("moment blur bind group"),
            layout: &self.blur_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(source),
                },
            ],
        })
    }

    fn generate_mips(
        &self,
        ctx: &WgpuContext,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::RenderPipeline,
        maps: &Texture2DArray,
        layer: u32,
    ) {
        for mip in 1..maps.mip_levels() {
            let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("moment mip bind group"),
                layout: &self.mip_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(
                            maps.layer_mip_view(layer, mip - 1),
                        ),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&self.mip_sampler),
                    },
                ],
            });
            self.fullscreen_pass(
                encoder,
                "moment mip",
                maps.layer_mip_view(layer, mip),
                pipeline,
                &bind_group,
            );
        }
    }

    fn fullscreen_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        label: &str,
        target: &wgpu::TextureView,
        pipeline: &wgpu::RenderPipeline,
        bind_group: &wgpu::BindGroup,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: ClearState::color([0.0; 4]).color_load_op(),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        self.triangle.draw(&mut pass);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn test_params_layout() {
        assert_eq!(size_of::<MomentParams>(), 64);
        assert_eq!(offset_of!(MomentParams, cascade0_scale), 16);
        assert_eq!(offset_of!(MomentParams, filter_size), 40);
        assert_eq!(offset_of!(MomentParams, positive_exponent), 48);
    }

    #[test]
    fn test_filter_nine_at_unit_scale_uses_largest_radius() {
        let width = blur_filter_size(9.0, 1.0, 1.0);
        assert_eq!(width, 9.0);
        assert_eq!(blur_radius(width), 4);
    }

    #[test]
    fn test_radius_rounding() {
        assert_eq!(blur_radius(1.0), 0);
        assert_eq!(blur_radius(2.0), 1);
        assert_eq!(blur_radius(3.0), 1);
        // 4.002 / 2 + 0.499 just reaches 2.5 and truncates to 2.
        assert_eq!(blur_radius(4.002), 2);
        assert_eq!(blur_radius(5.0), 2);
        assert_eq!(blur_radius(7.0), 3);
    }

    #[test]
    fn test_radius_clamped() {
        assert_eq!(blur_radius(20.0), MAX_BLUR_RADIUS);
        // A large filter at the first cascade's scale is capped at the kernel size.
        assert_eq!(blur_filter_size(100.0, 1.0, 1.0), MAX_KERNEL_SIZE);
        assert_eq!(blur_filter_size(100.0, 2.0, 1.0), MAX_KERNEL_SIZE);
        assert_eq!(blur_filter_size(0.0, 1.0, 1.0), 1.0);
    }

    #[test]
    fn test_far_cascades_blur_less() {
        // Cascade 0 covers a quarter of the area cascade 3 covers.
        let scale0 = Vec3::new(0.2, 0.2, 0.1);
        let scale3 = Vec3::new(0.04, 0.04, 0.02);
        let first = blur_filter_size(20.0, scale0.x, scale0.x);
        let last = blur_filter_size(20.0, scale3.x, scale0.x);
        assert!((first - 4.0).abs() < 1e-5);
        assert_eq!(last, 1.0);
        assert_eq!(
            plan_blur(20.0, scale0, scale0, false),
            BlurPlan::Fixed {
                horizontal: 2,
                vertical: 2
            }
        );
        assert_eq!(plan_blur(20.0, scale3, scale0, false), BlurPlan::Skip);
        assert_eq!(plan_blur(20.0, scale3, scale0, true), BlurPlan::Dynamic);
    }

    #[test]
    fn test_moment_formats() {
        use wgpu::TextureFormat as F;
        let all = wgpu::Features::FLOAT32_FILTERABLE | wgpu::Features::TEXTURE_FORMAT_16BIT_NORM;
        let none = wgpu::Features::empty();

        assert_eq!(moment_format(MomentMode::Vsm, SmFormat::Bits32, all), F::Rg32Float);
        assert_eq!(moment_format(MomentMode::Evsm4, SmFormat::Bits32, all), F::Rgba32Float);
        assert_eq!(moment_format(MomentMode::Vsm, SmFormat::Bits16, all), F::Rg16Unorm);
        assert_eq!(moment_format(MomentMode::Vsm, SmFormat::Bits16, none), F::Rg16Float);
        assert_eq!(moment_format(MomentMode::Evsm2, SmFormat::Bits16, all), F::Rg16Float);
        assert_eq!(moment_format(MomentMode::MsmHamburger, SmFormat::Bits16, all), F::Rgba16Unorm);
        assert_eq!(moment_format(MomentMode::MsmHausdorff, SmFormat::Bits16, none), F::Rgba16Float);
        // No filterable float32: 32-bit requests fall back to 16-bit float.
        assert_eq!(moment_format(MomentMode::Evsm2, SmFormat::Bits32, none), F::Rg16Float);
        assert_eq!(moment_format(MomentMode::MsmHamburger, SmFormat::Bits32, none), F::Rgba16Float);

        assert_eq!(max_exponent(F::Rgba32Float), MAX_EXPONENT_32);
        assert_eq!(max_exponent(F::Rg16Float), MAX_EXPONENT_16);
    }

    #[test]
    fn test_evsm_exponents_clamped() {
        let settings = ShadowSettings::default();
        let near = Vec3::splat(0.1);
        let far = Vec3::splat(0.05);
        assert_eq!(evsm_exponents(&settings, near, near, MAX_EXPONENT_32), [40.0, 5.0]);
        // Twice the depth range doubles the exponents, then the clamp applies.
        assert_eq!(evsm_exponents(&settings, far, near, MAX_EXPONENT_32), [42.0, 10.0]);
        assert_eq!(evsm_exponents(&settings, near, near, MAX_EXPONENT_16), [5.54, 5.0]);
    }

    #[test]
    fn test_permutation_keys() {
        assert_eq!(ConvertKey::COUNT, 20);
        assert_eq!(BlurKey::COUNT, 10);
        for (i, key) in ConvertKey::all().into_iter().enumerate() {
            assert_eq!(key.index(), i);
        }
        for (i, key) in BlurKey::all().into_iter().enumerate() {
            assert_eq!(key.index(), i);
        }
        assert_eq!(
            MomentMode::from_shadow_mode(ShadowMode::Evsm4),
            Some(MomentMode::Evsm4)
        );
        assert_eq!(MomentMode::from_shadow_mode(ShadowMode::GridPcf), None);
    }
}
