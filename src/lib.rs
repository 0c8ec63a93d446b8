//! Rein cascaded shadow maps
//!
//! Directional-light shadows built on wgpu: depth reduction, cascade
//! fitting, GPU culling and batching, moment shadow maps and the constants a
//! compositor needs to sample them.
//!
//! # Architecture
//!
//! The library is organized into layers:
//!
//! 1. **context** - Core wgpu wrapper (Device, Queue)
//! 2. **core** - GPU primitives (buffers, textures, pipelines, permutations)
//! 3. **compute** - Compute dispatch and readback utilities
//! 4. **effect** - Fullscreen pass geometry
//! 5. **renderer** - Cameras, culling, mesh data and the shadow pipeline

pub mod compute;
pub mod context;
pub mod core;
pub mod effect;
pub mod renderer;

// Re-export commonly used types
pub use context::WgpuContext;

pub use core::{
    ClearState, ComputePipelineBuilder, CullState, DepthState, DepthTexture, IndexBuffer,
    PipelineBuilder, RawUniformBuffer, StorageBuffer, Texture2D, Texture2DArray, VertexBuffer,
    VertexP, VertexPC,
};

pub use renderer::{
    Aabb, BoundingSphere, Camera, CascadeBuilder, CascadeSet, CascadeTransform,
    CascadedShadowMaps, DepthRange, DepthReducer, Frustum, FrustumCuller, GpuBatcher,
    GpuCascadeSetup, MeshData, MeshGroup, MeshPart, MomentConverter, Plane, Projection,
    SceneMesh, ShadowError, ShadowFrame, ShadowMode, ShadowRasterizer, ShadowResources,
    ShadowScene, ShadowSettings, Viewer,
};

pub use effect::FullscreenTriangle;

pub use compute::{compute_workgroup_count, read_back, ComputeDispatcher, ReadbackError};

// Re-export glam for convenience
pub use glam;
