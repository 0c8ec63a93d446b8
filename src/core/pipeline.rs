//! Render and compute pipeline builders
//!
//! Provides a builder pattern for creating wgpu pipelines, and [`ShaderStage`]
//! for building either kind through a single entry point.

use crate::context::WgpuContext;
use crate::core::render_states::{CullState, DepthState};
use crate::core::texture::DepthTexture;
use crate::core::vertex::VertexPC;

/// Builder for creating render pipelines.
pub struct PipelineBuilder<'a> {
    ctx: &'a WgpuContext,
    label: Option<&'a str>,
    shader_source: Option<&'a str>,
    vertex_entry: &'a str,
    fragment_entry: &'a str,
    vertex_layouts: Vec<wgpu::VertexBufferLayout<'a>>,
    bind_group_layouts: Vec<&'a wgpu::BindGroupLayout>,
    color_format: wgpu::TextureFormat,
    depth_state: Option<DepthState>,
    depth_format: wgpu::TextureFormat,
    cull_state: CullState,
    topology: wgpu::PrimitiveTopology,
    constants: Vec<(&'a str, f64)>,
    sample_count: u32,
    unclipped_depth: bool,
}

impl<'a> PipelineBuilder<'a> {
    /// Create a new pipeline builder.
    pub fn new(ctx: &'a WgpuContext) -> Self {
        Self {
            ctx,
            label: None,
            shader_source: None,
            vertex_entry: "vs_main",
            fragment_entry: "fs_main",
            vertex_layouts: Vec::new(),
            bind_group_layouts: Vec::new(),
            color_format: wgpu::TextureFormat::Rgba8Unorm,
            depth_state: None,
            depth_format: DepthTexture::FORMAT,
            cull_state: CullState::Back,
            topology: wgpu::PrimitiveTopology::TriangleList,
            constants: Vec::new(),
            sample_count: 1,
            unclipped_depth: false,
        }
    }

    /// Set the pipeline label.
    pub fn label(mut self, label: &'a str) -> Self {
        self.label = Some(label);
        self
    }

    /// Set the shader source (WGSL).
    pub fn shader(mut self, source: &'a str) -> Self {
        self.shader_source = Some(source);
        self
    }

    /// Set the vertex shader entry point.
    pub fn vertex_entry(mut self, entry: &'a str) -> Self {
        self.vertex_entry = entry;
        self
    }

    /// Set the fragment shader entry point.
    pub fn fragment_entry(mut self, entry: &'a str) -> Self {
        self.fragment_entry = entry;
        self
    }

    /// Add a vertex buffer layout.
    pub fn vertex_layout(mut self, layout: wgpu::VertexBufferLayout<'a>) -> Self {
        self.vertex_layouts.push(layout);
        self
    }

    /// Add a bind group layout.
    pub fn bind_group_layout(mut self, layout: &'a wgpu::BindGroupLayout) -> Self {
        self.bind_group_layouts.push(layout);
        self
    }

    /// Set the color target format.
    pub fn color_format(mut self, format: wgpu::TextureFormat) -> Self {
        self.color_format = format;
        self
    }

    /// Enable depth testing.
    pub fn depth(mut self, state: DepthState) -> Self {
        self.depth_state = Some(state);
        self
    }

    /// Set the depth attachment format.
    pub fn depth_format(mut self, format: wgpu::TextureFormat) -> Self {
        self.depth_format = format;
        self
    }

    /// Set the cull state.
    pub fn cull(mut self, state: CullState) -> Self {
        self.cull_state = state;
        self
    }

    /// Set the primitive topology.
    pub fn topology(mut self, topology: wgpu::PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    /// Set the pipeline-overridable constants.
    pub fn constants(mut self, constants: &[(&'a str, f64)]) -> Self {
        self.constants = constants.to_vec();
        self
    }

    /// Set the MSAA sample count of the attachments.
    pub fn sample_count(mut self, count: u32) -> Self {
        self.sample_count = count;
        self
    }

    /// Disable depth clipping when the device supports it.
    ///
    /// Shadow casters between the light and the cascade's near plane then
    /// clamp to depth 0 instead of being clipped away.
    pub fn unclipped_depth(mut self, enabled: bool) -> Self {
        self.unclipped_depth =
            enabled && self.ctx.has_feature(wgpu::Features::DEPTH_CLIP_CONTROL);
        self
    }

    fn primitive(&self) -> wgpu::PrimitiveState {
        wgpu::PrimitiveState {
            topology: self.topology,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: self.cull_state.to_wgpu(),
            unclipped_depth: self.unclipped_depth,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        }
    }

    fn multisample(&self) -> wgpu::MultisampleState {
        wgpu::MultisampleState {
            count: self.sample_count,
            mask: !0,
            alpha_to_coverage_enabled: false,
        }
    }

    fn module_and_layout(&self) -> anyhow::Result<(wgpu::ShaderModule, wgpu::PipelineLayout)> {
        let shader_source = self
            .shader_source
            .ok_or_else(|| anyhow::anyhow!("Shader source is required"))?;

        let shader_module = self
            .ctx
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: self.label,
                source: wgpu::ShaderSource::Wgsl(shader_source.into()),
            });

        let pipeline_layout =
            self.ctx
                .device
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: self.label,
                    bind_group_layouts: &self.bind_group_layouts,
                    immediate_size: 0,
                });

        Ok((shader_module, pipeline_layout))
    }

    /// Build a depth-only render pipeline (no color output).
    /// Used for shadow map generation and the depth prepass.
    pub fn build_depth_only(self) -> anyhow::Result<wgpu::RenderPipeline> {
        let (shader_module, pipeline_layout) = self.module_and_layout()?;

        let depth_stencil = self
            .depth_state
            .unwrap_or_default()
            .to_wgpu(self.depth_format);

        let compilation_options = wgpu::PipelineCompilationOptions {
            constants: &self.constants,
            ..Default::default()
        };

        let pipeline = self
            .ctx
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: self.label,
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader_module,
                    entry_point: Some(self.vertex_entry),
                    buffers: &self.vertex_layouts,
                    compilation_options: compilation_options.clone(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader_module,
                    entry_point: Some(self.fragment_entry),
                    targets: &[],
                    compilation_options,
                }),
                primitive: self.primitive(),
                depth_stencil: Some(depth_stencil),
                multisample: self.multisample(),
                multiview_mask: None,
                cache: None,
            });

        Ok(pipeline)
    }

    /// Build the render pipeline.
    pub fn build(self) -> anyhow::Result<wgpu::RenderPipeline> {
        let (shader_module, pipeline_layout) = self.module_and_layout()?;

        let depth_stencil = self
            .depth_state
            .map(|state| state.to_wgpu(self.depth_format));

        let compilation_options = wgpu::PipelineCompilationOptions {
            constants: &self.constants,
            ..Default::default()
        };

        let pipeline = self
            .ctx
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: self.label,
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader_module,
                    entry_point: Some(self.vertex_entry),
                    buffers: &self.vertex_layouts,
                    compilation_options: compilation_options.clone(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader_module,
                    entry_point: Some(self.fragment_entry),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.color_format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options,
                }),
                primitive: self.primitive(),
                depth_stencil,
                multisample: self.multisample(),
                multiview_mask: None,
                cache: None,
            });

        Ok(pipeline)
    }
}

/// Builder for creating compute pipelines.
pub struct ComputePipelineBuilder<'a> {
    ctx: &'a WgpuContext,
    label: Option<&'a str>,
    shader_source: Option<&'a str>,
    entry_point: &'a str,
    bind_group_layouts: Vec<&'a wgpu::BindGroupLayout>,
    constants: Vec<(&'a str, f64)>,
}

impl<'a> ComputePipelineBuilder<'a> {
    /// Create a new compute pipeline builder.
    pub fn new(ctx: &'a WgpuContext) -> Self {
        Self {
            ctx,
            label: None,
            shader_source: None,
            entry_point: "cs_main",
            bind_group_layouts: Vec::new(),
            constants: Vec::new(),
        }
    }

    /// Set the pipeline label.
    pub fn label(mut self, label: &'a str) -> Self {
        self.label = Some(label);
        self
    }

    /// Set the shader source (WGSL).
    pub fn shader(mut self, source: &'a str) -> Self {
        self.shader_source = Some(source);
        self
    }

    /// Set the compute shader entry point.
    pub fn entry_point(mut self, entry: &'a str) -> Self {
        self.entry_point = entry;
        self
    }

    /// Add a bind group layout.
    pub fn bind_group_layout(mut self, layout: &'a wgpu::BindGroupLayout) -> Self {
        self.bind_group_layouts.push(layout);
        self
    }

    /// Set the pipeline-overridable constants.
    pub fn constants(mut self, constants: &[(&'a str, f64)]) -> Self {
        self.constants = constants.to_vec();
        self
    }

    /// Build the compute pipeline.
    pub fn build(self) -> anyhow::Result<wgpu::ComputePipeline> {
        let shader_source = self
            .shader_source
            .ok_or_else(|| anyhow::anyhow!("Shader source is required"))?;

        let shader_module = self
            .ctx
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: self.label,
                source: wgpu::ShaderSource::Wgsl(shader_source.into()),
            });

        let pipeline_layout =
            self.ctx
                .device
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: self.label,
                    bind_group_layouts: &self.bind_group_layouts,
                    immediate_size: 0,
                });

        Ok(self
            .ctx
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: self.label,
                layout: Some(&pipeline_layout),
                module: &shader_module,
                entry_point: Some(self.entry_point),
                compilation_options: wgpu::PipelineCompilationOptions {
                    constants: &self.constants,
                    ..Default::default()
                },
                cache: None,
            }))
    }
}

/// The kind of pipeline a shader variant compiles into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage<'a> {
    /// Full-screen triangle (`vs_main`) plus a fragment entry writing one target.
    Fullscreen {
        fragment_entry: &'a str,
        format: wgpu::TextureFormat,
    },
    /// A compute entry point.
    Compute { entry: &'a str },
}

/// Everything a [`ShaderStage`] needs besides its kind.
#[derive(Clone, Copy)]
pub struct StageDesc<'a> {
    pub label: &'a str,
    pub source: &'a str,
    pub bind_group_layouts: &'a [&'a wgpu::BindGroupLayout],
    pub constants: &'a [(&'a str, f64)],
}

/// A compiled pipeline of either kind.
pub enum StagePipeline {
    Render(wgpu::RenderPipeline),
    Compute(wgpu::ComputePipeline),
}

impl StagePipeline {
    pub fn into_render(self) -> anyhow::Result<wgpu::RenderPipeline> {
        match self {
            StagePipeline::Render(p) => Ok(p),
            StagePipeline::Compute(_) => anyhow::bail!("expected a render pipeline"),
        }
    }

    pub fn into_compute(self) -> anyhow::Result<wgpu::ComputePipeline> {
        match self {
            StagePipeline::Compute(p) => Ok(p),
            StagePipeline::Render(_) => anyhow::bail!("expected a compute pipeline"),
        }
    }
}

/// Build a pipeline for `stage`.
pub fn build_stage(
    ctx: &WgpuContext,
    desc: &StageDesc<'_>,
    stage: ShaderStage<'_>,
) -> anyhow::Result<StagePipeline> {
    match stage {
        ShaderStage::Fullscreen {
            fragment_entry,
            format,
        } => {
            let mut builder = PipelineBuilder::new(ctx)
                .label(desc.label)
                .shader(desc.source)
                .fragment_entry(fragment_entry)
                .vertex_layout(VertexPC::layout())
                .color_format(format)
                .cull(CullState::None)
                .constants(desc.constants);
            for layout in desc.bind_group_layouts {
                builder = builder.bind_group_layout(layout);
            }
            Ok(StagePipeline::Render(builder.build()?))
        }
        ShaderStage::Compute { entry } => {
            let mut builder = ComputePipelineBuilder::new(ctx)
                .label(desc.label)
                .shader(desc.source)
                .entry_point(entry)
                .constants(desc.constants);
            for layout in desc.bind_group_layouts {
                builder = builder.bind_group_layout(layout);
            }
            Ok(StagePipeline::Compute(builder.build()?))
        }
    }
}
