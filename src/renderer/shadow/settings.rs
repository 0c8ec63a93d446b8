//! Shadow settings
//!
//! [`ShadowSettings`] is the per-frame configuration snapshot read by every
//! stage of the cascade pipeline. It is passed by reference; nothing in the
//! pipeline reads settings from anywhere else.

use super::ShadowError;
use glam::Vec3;

/// Shadow filtering technique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShadowMode {
    #[default]
    FixedSizePcf,
    GridPcf,
    RandomDiscPcf,
    OptimizedPcf,
    Vsm,
    Evsm2,
    Evsm4,
    MsmHamburger,
    MsmHausdorff,
}

impl ShadowMode {
    pub const ALL: [ShadowMode; 9] = [
        ShadowMode::FixedSizePcf,
        ShadowMode::GridPcf,
        ShadowMode::RandomDiscPcf,
        ShadowMode::OptimizedPcf,
        ShadowMode::Vsm,
        ShadowMode::Evsm2,
        ShadowMode::Evsm4,
        ShadowMode::MsmHamburger,
        ShadowMode::MsmHausdorff,
    ];

    /// Any of the variance family (VSM, EVSM2, EVSM4).
    pub fn uses_vsm(self) -> bool {
        matches!(self, ShadowMode::Vsm | ShadowMode::Evsm2 | ShadowMode::Evsm4)
    }

    pub fn uses_evsm(self) -> bool {
        matches!(self, ShadowMode::Evsm2 | ShadowMode::Evsm4)
    }

    pub fn uses_msm(self) -> bool {
        matches!(self, ShadowMode::MsmHamburger | ShadowMode::MsmHausdorff)
    }

    /// Whether the shadow map is converted to a filterable moment map.
    pub fn is_filterable(self) -> bool {
        self.uses_vsm() || self.uses_msm()
    }

    /// Index into the shader's mode switch.
    pub fn shader_index(self) -> u32 {
        self as u32
    }
}

/// How the view depth range is split into cascades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PartitionMode {
    #[default]
    Manual,
    Logarithmic,
    Pssm,
}

impl PartitionMode {
    /// Index into the GPU cascade setup's partition switch.
    pub fn shader_index(self) -> u32 {
        self as u32
    }
}

/// Kernel width of the fixed-size PCF mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FixedFilterSize {
    #[default]
    Filter2x2,
    Filter3x3,
    Filter5x5,
    Filter7x7,
    Filter9x9,
}

impl FixedFilterSize {
    pub fn kernel_size(self) -> u32 {
        match self {
            FixedFilterSize::Filter2x2 => 2,
            FixedFilterSize::Filter3x3 => 3,
            FixedFilterSize::Filter5x5 => 5,
            FixedFilterSize::Filter7x7 => 7,
            FixedFilterSize::Filter9x9 => 9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShadowMapSize {
    Size512,
    Size1024,
    #[default]
    Size2048,
}

impl ShadowMapSize {
    /// Width and height of each cascade in texels.
    pub fn resolution(self) -> u32 {
        match self {
            ShadowMapSize::Size512 => 512,
            ShadowMapSize::Size1024 => 1024,
            ShadowMapSize::Size2048 => 2048,
        }
    }
}

/// MSAA level of the shadow depth surface for filterable modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShadowMsaa {
    #[default]
    None,
    X2,
    X4,
    X8,
}

impl ShadowMsaa {
    pub const ALL: [ShadowMsaa; 4] = [ShadowMsaa::None, ShadowMsaa::X2, ShadowMsaa::X4, ShadowMsaa::X8];

    pub fn sample_count(self) -> u32 {
        match self {
            ShadowMsaa::None => 1,
            ShadowMsaa::X2 => 2,
            ShadowMsaa::X4 => 4,
            ShadowMsaa::X8 => 8,
        }
    }
}

/// Bit depth of the moment map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SmFormat {
    Bits16,
    #[default]
    Bits32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShadowAnisotropy {
    #[default]
    X1,
    X2,
    X4,
    X8,
    X16,
}

impl ShadowAnisotropy {
    pub fn samples(self) -> u16 {
        match self {
            ShadowAnisotropy::X1 => 1,
            ShadowAnisotropy::X2 => 2,
            ShadowAnisotropy::X4 => 4,
            ShadowAnisotropy::X8 => 8,
            ShadowAnisotropy::X16 => 16,
        }
    }
}

/// Format of the shadow depth buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShadowDepthFormat {
    Depth16,
    Depth24,
    #[default]
    Depth32,
}

impl ShadowDepthFormat {
    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            ShadowDepthFormat::Depth16 => wgpu::TextureFormat::Depth16Unorm,
            ShadowDepthFormat::Depth24 => wgpu::TextureFormat::Depth24Plus,
            ShadowDepthFormat::Depth32 => wgpu::TextureFormat::Depth32Float,
        }
    }
}

/// How the compositor picks a cascade per pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CascadeSelectionMode {
    #[default]
    SplitDepth,
    Projection,
}

/// Shadow configuration snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowSettings {
    /// Direction towards the light. Normalized before use.
    pub light_direction: Vec3,
    pub shadow_mode: ShadowMode,
    pub shadow_map_size: ShadowMapSize,
    pub fixed_filter_size: FixedFilterSize,
    /// Filter width in shadow-map texels for PCF and moment blur (0..=100).
    pub filter_size: f32,
    pub randomize_disc_offsets: bool,
    /// Sample count for random disc PCF (1..=64).
    pub num_disc_samples: u32,

    pub partition_mode: PartitionMode,
    /// Normalized far edge of each cascade, used by [`PartitionMode::Manual`].
    pub split_distances: [f32; 4],
    /// Blend between uniform (0) and logarithmic (1) splits for PSSM.
    pub pssm_lambda: f32,
    /// Start of the shadowed range as a fraction of the view range.
    pub min_cascade_distance: f32,
    /// End of the shadowed range as a fraction of the view range.
    pub max_cascade_distance: f32,
    pub stabilize_cascades: bool,
    pub cascade_selection_mode: CascadeSelectionMode,
    pub visualize_cascades: bool,
    pub filter_across_cascades: bool,

    /// Fit min/max cascade distance to the depth buffer every frame.
    pub auto_compute_depth_bounds: bool,
    /// Frames between writing and reading back the depth bounds (0..=3).
    pub readback_latency: u32,
    /// Cull, batch and set up cascades on the GPU.
    pub gpu_scene_submission: bool,

    pub use_receiver_plane_bias: bool,
    pub bias: f32,
    pub vsm_bias: f32,
    /// Receiver offset along the surface normal.
    pub offset_scale: f32,

    pub shadow_msaa: ShadowMsaa,
    pub sm_format: SmFormat,
    pub shadow_anisotropy: ShadowAnisotropy,
    pub enable_shadow_mips: bool,
    pub depth_format: ShadowDepthFormat,

    pub positive_exponent: f32,
    pub negative_exponent: f32,
    pub light_bleeding_reduction: f32,
    pub msm_depth_bias: f32,
    pub msm_moment_bias: f32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            light_direction: Vec3::ONE,
            shadow_mode: ShadowMode::FixedSizePcf,
            shadow_map_size: ShadowMapSize::Size2048,
            fixed_filter_size: FixedFilterSize::Filter2x2,
            filter_size: 0.0,
            randomize_disc_offsets: false,
            num_disc_samples: 16,
            partition_mode: PartitionMode::Manual,
            split_distances: [0.05, 0.15, 0.5, 1.0],
            pssm_lambda: 1.0,
            min_cascade_distance: 0.0,
            max_cascade_distance: 1.0,
            stabilize_cascades: false,
            cascade_selection_mode: CascadeSelectionMode::SplitDepth,
            visualize_cascades: false,
            filter_across_cascades: false,
            auto_compute_depth_bounds: false,
            readback_latency: 1,
            gpu_scene_submission: false,
            use_receiver_plane_bias: true,
            bias: 0.005,
            vsm_bias: 0.01,
            offset_scale: 0.0,
            shadow_msaa: ShadowMsaa::None,
            sm_format: SmFormat::Bits32,
            shadow_anisotropy: ShadowAnisotropy::X1,
            enable_shadow_mips: false,
            depth_format: ShadowDepthFormat::Depth32,
            positive_exponent: 40.0,
            negative_exponent: 5.0,
            light_bleeding_reduction: 0.0,
            msm_depth_bias: 0.0,
            msm_moment_bias: 0.003,
        }
    }
}

/// Largest accepted readback latency.
pub const MAX_READBACK_LATENCY: u32 = 3;

/// Largest accepted filter size.
pub const MAX_FILTER_SIZE: f32 = 100.0;

fn check_unit(name: &'static str, value: f32) -> Result<(), ShadowError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ShadowError::invalid(name, format!("{value} is outside [0, 1]")))
    }
}

impl ShadowSettings {
    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ShadowError> {
        for split in self.split_distances {
            check_unit("split_distances", split)?;
        }
        check_unit("pssm_lambda", self.pssm_lambda)?;
        check_unit("min_cascade_distance", self.min_cascade_distance)?;
        check_unit("max_cascade_distance", self.max_cascade_distance)?;

        if self.min_cascade_distance > self.max_cascade_distance {
            return Err(ShadowError::invalid(
                "min_cascade_distance",
                format!(
                    "{} is greater than max_cascade_distance {}",
                    self.min_cascade_distance, self.max_cascade_distance
                ),
            ));
        }
        if self.readback_latency > MAX_READBACK_LATENCY {
            return Err(ShadowError::invalid(
                "readback_latency",
                format!("{} exceeds {MAX_READBACK_LATENCY}", self.readback_latency),
            ));
        }
        if !(0.0..=MAX_FILTER_SIZE).contains(&self.filter_size) {
            return Err(ShadowError::invalid(
                "filter_size",
                format!("{} is outside [0, {MAX_FILTER_SIZE}]", self.filter_size),
            ));
        }
        if !(1..=64).contains(&self.num_disc_samples) {
            return Err(ShadowError::invalid(
                "num_disc_samples",
                format!("{} is outside [1, 64]", self.num_disc_samples),
            ));
        }
        if self.light_direction.length_squared() <= f32::EPSILON {
            return Err(ShadowError::invalid("light_direction", "zero vector"));
        }
        Ok(())
    }

    /// Whether shadow map resources must be recreated after switching from `prev`.
    pub fn requires_realloc(&self, prev: &ShadowSettings) -> bool {
        self.shadow_map_size != prev.shadow_map_size
            || self.shadow_mode != prev.shadow_mode
            || self.shadow_msaa != prev.shadow_msaa
            || self.sm_format != prev.sm_format
            || self.enable_shadow_mips != prev.enable_shadow_mips
            || self.depth_format != prev.depth_format
    }

    /// Normalized light direction.
    pub fn light_dir(&self) -> Vec3 {
        self.light_direction.normalize_or(Vec3::Y)
    }

    /// Shadow map resolution in texels.
    pub fn resolution(&self) -> u32 {
        self.shadow_map_size.resolution()
    }

    /// Kernel width reserved as a border around non-stabilized cascades.
    pub fn fixed_kernel_size(&self) -> f32 {
        self.fixed_filter_size.kernel_size() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = ShadowSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.resolution(), 2048);
        assert_eq!(settings.readback_latency, 1);
        assert_eq!(settings.split_distances, [0.05, 0.15, 0.5, 1.0]);
    }

    #[test]
    fn test_mode_predicates() {
        let filterable: Vec<_> = ShadowMode::ALL
            .iter()
            .filter(|m| m.is_filterable())
            .collect();
        assert_eq!(filterable.len(), 5);
        assert!(ShadowMode::Vsm.uses_vsm() && !ShadowMode::Vsm.uses_evsm());
        assert!(ShadowMode::Evsm4.uses_vsm() && ShadowMode::Evsm4.uses_evsm());
        assert!(ShadowMode::MsmHausdorff.uses_msm() && !ShadowMode::MsmHausdorff.uses_vsm());
        assert!(!ShadowMode::OptimizedPcf.is_filterable());
    }

    #[test]
    fn test_value_tables() {
        assert_eq!(FixedFilterSize::Filter7x7.kernel_size(), 7);
        assert_eq!(ShadowMsaa::X8.sample_count(), 8);
        assert_eq!(ShadowAnisotropy::X16.samples(), 16);
        assert_eq!(ShadowMapSize::Size512.resolution(), 512);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut settings = ShadowSettings {
            readback_latency: 4,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ShadowError::InvalidSetting {
                name: "readback_latency",
                ..
            })
        ));

        settings.readback_latency = 0;
        settings.min_cascade_distance = 0.6;
        settings.max_cascade_distance = 0.5;
        assert!(settings.validate().is_err());

        settings.max_cascade_distance = 1.0;
        settings.split_distances[2] = 1.5;
        assert!(settings.validate().is_err());

        settings.split_distances[2] = 0.5;
        settings.filter_size = 101.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_requires_realloc() {
        let base = ShadowSettings::default();
        let moved_light = ShadowSettings {
            light_direction: Vec3::new(0.0, 1.0, 0.2),
            bias: 0.001,
            ..base.clone()
        };
        assert!(!moved_light.requires_realloc(&base));

        let vsm = ShadowSettings {
            shadow_mode: ShadowMode::Vsm,
            ..base.clone()
        };
        assert!(vsm.requires_realloc(&base));

        let msaa = ShadowSettings {
            shadow_msaa: ShadowMsaa::X4,
            ..base.clone()
        };
        assert!(msaa.requires_realloc(&base));
    }
}
