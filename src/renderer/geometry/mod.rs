//! Geometry abstractions
//!
//! CPU-side mesh data, axis-aligned boxes and bounding spheres.

mod bounds;
mod mesh;

pub use bounds::{max_axis_scale, BoundingSphere};
pub use mesh::{MeshData, MeshPart};

use glam::Vec3;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Create a new AABB.
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB from a set of points.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);

        for p in points {
            min = min.min(p);
            max = max.max(p);
        }

        Self { min, max }
    }

    /// Get the center of the AABB.
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the size of the AABB.
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Grow each axis to at least `min_size`, keeping the center.
    pub fn with_min_size(&self, min_size: f32) -> Self {
        let center = self.center();
        let half = (self.size() * 0.5).max(Vec3::splat(min_size * 0.5));
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Check if a point is inside the AABB.
    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self {
            min: Vec3::ZERO,
            max: Vec3::ZERO,
        }
    }
}
