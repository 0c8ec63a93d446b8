//! Rendering
//!
//! Cameras, culling, CPU mesh data and the cascaded shadow map pipeline.

pub mod culling;
pub mod geometry;
pub mod shadow;
pub mod viewer;

pub use culling::{Frustum, FrustumCuller, Plane};
pub use geometry::{Aabb, BoundingSphere, MeshData, MeshPart};
pub use shadow::{
    CascadeBuilder, CascadeSet, CascadeTransform, CascadedShadowMaps, DepthRange, DepthReducer,
    GpuBatcher, GpuCascadeSetup, MeshGroup, MomentConverter, SceneMesh, ShadowError, ShadowFrame,
    ShadowMode, ShadowRasterizer, ShadowResources, ShadowScene, ShadowSettings,
};
pub use viewer::{Camera, Projection, Viewer};
