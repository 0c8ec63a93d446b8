//! Core rendering abstractions
//!
//! This module provides mid-level abstractions over wgpu primitives.

pub mod binding;
pub mod buffer;
pub mod permutation;
pub mod pipeline;
pub mod render_states;
pub mod texture;
pub mod vertex;

pub use buffer::{IndexBuffer, RawUniformBuffer, StorageBuffer, VertexBuffer};
pub use permutation::{IncompleteTable, Permutation, PermutationTable};
pub use pipeline::{
    build_stage, ComputePipelineBuilder, PipelineBuilder, ShaderStage, StageDesc, StagePipeline,
};
pub use render_states::{ClearState, CullState, DepthState};
pub use texture::{DepthTexture, Texture2D, Texture2DArray};
pub use vertex::{VertexP, VertexPC};
