//! Texture abstractions
//!
//! Provides wrappers for depth surfaces, 2D render targets and the layered
//! textures that hold shadow cascades, plus the samplers the compositor uses.

use crate::context::WgpuContext;

/// Number of mip levels of a full chain down to 1x1.
pub fn full_mip_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// A 2D color texture used as an intermediate render target.
pub struct Texture2D {
    pub(crate) texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    pub(crate) size: wgpu::Extent3d,
    pub(crate) format: wgpu::TextureFormat,
}

impl Texture2D {
    /// Create a new empty texture.
    pub fn new(
        ctx: &WgpuContext,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
        label: Option<&str>,
    ) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label,
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            texture,
            view,
            size,
            format,
        }
    }

    /// Get the raw texture.
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    /// Get the texture view.
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Get the texture size.
    pub fn size(&self) -> (u32, u32) {
        (self.size.width, self.size.height)
    }

    /// Get the texture format.
    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }
}

/// A depth texture for depth testing, optionally multisampled.
///
/// Always sampleable so reduction and moment conversion can read it back.
pub struct DepthTexture {
    pub(crate) texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    pub(crate) size: wgpu::Extent3d,
    pub(crate) format: wgpu::TextureFormat,
    pub(crate) sample_count: u32,
}

impl DepthTexture {
    /// The default depth format.
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    /// Create a new single-sampled depth texture in the default format.
    pub fn new(ctx: &WgpuContext, width: u32, height: u32, label: Option<&str>) -> Self {
        Self::with_format(ctx, width, height, Self::FORMAT, 1, label)
    }

    /// Create a depth texture with an explicit format and sample count.
    pub fn with_format(
        ctx: &WgpuContext,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        sample_count: u32,
        label: Option<&str>,
    ) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label,
            size,
            mip_level_count: 1,
            sample_count,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            aspect: wgpu::TextureAspect::DepthOnly,
            ..Default::default()
        });

        Self {
            texture,
            view,
            size,
            format,
            sample_count,
        }
    }

    /// Resize the depth texture, keeping format and sample count.
    pub fn resize(&mut self, ctx: &WgpuContext, width: u32, height: u32) {
        if self.size.width != width || self.size.height != height {
            *self = Self::with_format(
                ctx,
                width,
                height,
                self.format,
                self.sample_count,
                Some("depth texture"),
            );
        }
    }

    /// Get the raw texture.
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    /// Get the texture view.
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Get the texture size.
    pub fn size(&self) -> (u32, u32) {
        (self.size.width, self.size.height)
    }

    /// Get the depth format.
    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    /// Get the MSAA sample count.
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }
}

/// A 2D texture array for shadow cascades.
///
/// Holds one view over every layer for sampling, plus per-layer and
/// per-layer-per-mip views for rendering.
pub struct Texture2DArray {
    pub(crate) texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    /// `layer_views[layer][mip]`
    pub(crate) layer_views: Vec<Vec<wgpu::TextureView>>,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) layers: u32,
    pub(crate) mip_levels: u32,
    pub(crate) format: wgpu::TextureFormat,
}

impl Texture2DArray {
    /// Create a new texture array.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: &WgpuContext,
        width: u32,
        height: u32,
        layers: u32,
        mip_levels: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
        label: Option<&str>,
    ) -> Self {
        let extent = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: layers,
        };

        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label,
            size: extent,
            mip_level_count: mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });

        let aspect = if format.is_depth_stencil_format() {
            wgpu::TextureAspect::DepthOnly
        } else {
            wgpu::TextureAspect::All
        };

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            aspect,
            ..Default::default()
        });

        let layer_views = (0..layers)
            .map(|layer| {
                (0..mip_levels)
                    .map(|mip| {
                        texture.create_view(&wgpu::TextureViewDescriptor {
                            dimension: Some(wgpu::TextureViewDimension::D2),
                            aspect,
                            base_mip_level: mip,
                            mip_level_count: Some(1),
                            base_array_layer: layer,
                            array_layer_count: Some(1),
                            ..Default::default()
                        })
                    })
                    .collect()
            })
            .collect();

        Self {
            texture,
            view,
            layer_views,
            width,
            height,
            layers,
            mip_levels,
            format,
        }
    }

    /// Create a depth texture array (one layer per shadow cascade).
    pub fn new_depth(
        ctx: &WgpuContext,
        size: u32,
        layers: u32,
        format: wgpu::TextureFormat,
    ) -> Self {
        Self::new(
            ctx,
            size,
            size,
            layers,
            1,
            format,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            Some("shadow depth array"),
        )
    }

    /// Get the raw texture.
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    /// Get the array view (all layers, all mips).
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Get a layer's top-level view.
    pub fn layer_view(&self, layer: u32) -> &wgpu::TextureView {
        self.layer_mip_view(layer, 0)
    }

    /// Get a view of one mip level of one layer.
    pub fn layer_mip_view(&self, layer: u32, mip: u32) -> &wgpu::TextureView {
        &self.layer_views[layer as usize][mip as usize]
    }

    /// Get the texture dimensions.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Get the number of layers.
    pub fn layers(&self) -> u32 {
        self.layers
    }

    /// Get the number of mip levels.
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    /// Get the texture format.
    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }
}

/// Create a comparison sampler for hardware PCF.
pub fn create_comparison_sampler(ctx: &WgpuContext) -> wgpu::Sampler {
    ctx.device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("shadow comparison sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::MipmapFilterMode::Nearest,
        compare: Some(wgpu::CompareFunction::LessEqual),
        ..Default::default()
    })
}

/// Create a trilinear sampler with `anisotropy` samples (1 disables it).
pub fn create_anisotropic_sampler(ctx: &WgpuContext, anisotropy: u16) -> wgpu::Sampler {
    ctx.device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("shadow anisotropic sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::MipmapFilterMode::Linear,
        anisotropy_clamp: anisotropy.max(1),
        ..Default::default()
    })
}

/// Create a nearest-neighbour sampler.
pub fn create_point_sampler(ctx: &WgpuContext) -> wgpu::Sampler {
    ctx.device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("point sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Nearest,
        min_filter: wgpu::FilterMode::Nearest,
        mipmap_filter: wgpu::MipmapFilterMode::Nearest,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_mip_count() {
        assert_eq!(full_mip_count(1, 1), 1);
        assert_eq!(full_mip_count(2, 2), 2);
        assert_eq!(full_mip_count(512, 512), 10);
        assert_eq!(full_mip_count(2048, 1024), 12);
        assert_eq!(full_mip_count(0, 0), 1);
    }
}
