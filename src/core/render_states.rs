//! Render state configurations
//!
//! Small value types for the depth, cull and clear state of the shadow passes.

/// Clear state for render targets.
#[derive(Debug, Clone, Copy)]
pub struct ClearState {
    /// Color to clear to (RGBA), or None to not clear.
    pub color: Option<[f32; 4]>,
    /// Depth value to clear to (0.0-1.0), or None to not clear.
    pub depth: Option<f32>,
}

impl ClearState {
    /// Create a clear state that clears color only.
    pub fn color(color: [f32; 4]) -> Self {
        Self {
            color: Some(color),
            depth: None,
        }
    }

    /// Create a clear state that clears depth only.
    pub fn depth(depth: f32) -> Self {
        Self {
            color: None,
            depth: Some(depth),
        }
    }

    /// Get the wgpu load operation for color.
    pub fn color_load_op(&self) -> wgpu::LoadOp<wgpu::Color> {
        match self.color {
            Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                r: r as f64,
                g: g as f64,
                b: b as f64,
                a: a as f64,
            }),
            None => wgpu::LoadOp::Load,
        }
    }

    /// Get the wgpu load operation for depth.
    pub fn depth_load_op(&self) -> wgpu::LoadOp<f32> {
        match self.depth {
            Some(d) => wgpu::LoadOp::Clear(d),
            None => wgpu::LoadOp::Load,
        }
    }

    /// Depth attachment operations for this clear state, always storing.
    pub fn depth_ops(&self) -> wgpu::Operations<f32> {
        wgpu::Operations {
            load: self.depth_load_op(),
            store: wgpu::StoreOp::Store,
        }
    }
}

impl Default for ClearState {
    fn default() -> Self {
        Self::depth(1.0)
    }
}

/// Depth test configuration.
#[derive(Debug, Clone, Copy)]
pub struct DepthState {
    /// Whether to write to the depth buffer.
    pub write: bool,
    /// Comparison function for depth test.
    pub compare: wgpu::CompareFunction,
}

impl DepthState {
    /// Depth testing enabled with writes.
    pub fn read_write() -> Self {
        Self {
            write: true,
            compare: wgpu::CompareFunction::Less,
        }
    }

    /// Convert to wgpu depth stencil state.
    pub fn to_wgpu(&self, format: wgpu::TextureFormat) -> wgpu::DepthStencilState {
        wgpu::DepthStencilState {
            format,
            depth_write_enabled: self.write,
            depth_compare: self.compare,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }
    }
}

impl Default for DepthState {
    fn default() -> Self {
        Self::read_write()
    }
}

/// Cull mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CullState {
    /// No culling.
    None,
    /// Cull back faces.
    #[default]
    Back,
}

impl CullState {
    /// Convert to wgpu cull mode.
    pub fn to_wgpu(&self) -> Option<wgpu::Face> {
        match self {
            CullState::None => None,
            CullState::Back => Some(wgpu::Face::Back),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_state_depth_only() {
        let clear = ClearState::default();
        assert!(clear.color.is_none());
        assert!(matches!(clear.depth_load_op(), wgpu::LoadOp::Clear(d) if d == 1.0));
        assert!(matches!(
            ClearState::color([0.0; 4]).depth_load_op(),
            wgpu::LoadOp::Load
        ));
    }

    #[test]
    fn test_depth_state_writes_nearest() {
        let ds = DepthState::default().to_wgpu(wgpu::TextureFormat::Depth16Unorm);
        assert_eq!(ds.format, wgpu::TextureFormat::Depth16Unorm);
        assert_eq!(ds.depth_compare, wgpu::CompareFunction::Less);
        assert!(ds.depth_write_enabled);
        assert_eq!(ds.bias, wgpu::DepthBiasState::default());
    }

    #[test]
    fn test_cull_state() {
        assert_eq!(CullState::None.to_wgpu(), None);
        assert_eq!(CullState::default().to_wgpu(), Some(wgpu::Face::Back));
    }
}
