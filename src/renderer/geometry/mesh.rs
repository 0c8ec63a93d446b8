//! Mesh data
//!
//! Position-only indexed geometry split into parts. Each part becomes one
//! draw call with its own bounding sphere.

use super::BoundingSphere;
use crate::core::vertex::VertexP;
use glam::{Mat4, Vec3};

/// A contiguous index range drawn as one draw call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshPart {
    pub index_start: u32,
    pub index_count: u32,
}

/// CPU-side indexed mesh.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub positions: Vec<Vec3>,
    pub indices: Vec<u32>,
    pub parts: Vec<MeshPart>,
}

impl MeshData {
    /// Create a single-part mesh.
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        let parts = vec![MeshPart {
            index_start: 0,
            index_count: indices.len() as u32,
        }];
        Self {
            positions,
            indices,
            parts,
        }
    }

    /// Axis-aligned box around `center`.
    pub fn cuboid(center: Vec3, half_extents: Vec3) -> Self {
        let positions = (0..8)
            .map(|i| {
                let corner = Vec3::new(
                    if i & 1 == 0 { -1.0 } else { 1.0 },
                    if i & 2 == 0 { -1.0 } else { 1.0 },
                    if i & 4 == 0 { -1.0 } else { 1.0 },
                );
                center + corner * half_extents
            })
            .collect();

        #[rustfmt::skip]
        let indices = vec![
            1, 3, 7, 1, 7, 5, // +X
            0, 4, 6, 0, 6, 2, // -X
            2, 6, 7, 2, 7, 3, // +Y
            0, 1, 5, 0, 5, 4, // -Y
            4, 5, 7, 4, 7, 6, // +Z
            0, 2, 3, 0, 3, 1, // -Z
        ];

        Self::new(positions, indices)
    }

    /// Square on the XZ plane facing +Y.
    pub fn plane(center: Vec3, half_size: f32) -> Self {
        let h = half_size;
        let positions = vec![
            center + Vec3::new(-h, 0.0, -h),
            center + Vec3::new(h, 0.0, -h),
            center + Vec3::new(h, 0.0, h),
            center + Vec3::new(-h, 0.0, h),
        ];
        Self::new(positions, vec![0, 3, 2, 0, 2, 1])
    }

    /// Append `other` as additional parts.
    pub fn append(&mut self, other: &MeshData) {
        let vertex_offset = self.positions.len() as u32;
        let index_offset = self.indices.len() as u32;

        self.positions.extend_from_slice(&other.positions);
        self.indices
            .extend(other.indices.iter().map(|i| i + vertex_offset));
        self.parts.extend(other.parts.iter().map(|p| MeshPart {
            index_start: p.index_start + index_offset,
            index_count: p.index_count,
        }));
    }

    /// Total number of indices.
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Vertices for upload.
    pub fn vertices(&self) -> Vec<VertexP> {
        self.positions
            .iter()
            .map(|p| VertexP::new(p.to_array()))
            .collect()
    }

    /// Bounding sphere of one part's vertices after `world` is applied.
    pub fn part_bounds(&self, part: &MeshPart, world: Mat4) -> BoundingSphere {
        let start = part.index_start as usize;
        let end = start + part.index_count as usize;
        let points: Vec<Vec3> = self.indices[start..end]
            .iter()
            .map(|&i| world.transform_point3(self.positions[i as usize]))
            .collect();
        BoundingSphere::from_points(&points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cuboid_counts() {
        let cube = MeshData::cuboid(Vec3::ZERO, Vec3::ONE);
        assert_eq!(cube.positions.len(), 8);
        assert_eq!(cube.index_count(), 36);
        assert_eq!(cube.parts.len(), 1);
    }

    #[test]
    fn test_cuboid_faces_point_outward() {
        let cube = MeshData::cuboid(Vec3::ZERO, Vec3::ONE);
        for tri in cube.indices.chunks(3) {
            let [a, b, c] = [0, 1, 2].map(|k| cube.positions[tri[k] as usize]);
            let normal = (b - a).cross(c - a);
            let centroid = (a + b + c) / 3.0;
            assert!(normal.dot(centroid) > 0.0, "inward triangle {tri:?}");
        }
    }

    #[test]
    fn test_plane_faces_up() {
        let plane = MeshData::plane(Vec3::ZERO, 5.0);
        let p = &plane.positions;
        let i = &plane.indices;
        let normal = (p[i[1] as usize] - p[i[0] as usize]).cross(p[i[2] as usize] - p[i[0] as usize]);
        assert!(normal.y > 0.0);
    }

    #[test]
    fn test_append_offsets_parts_and_indices() {
        let mut mesh = MeshData::plane(Vec3::ZERO, 1.0);
        mesh.append(&MeshData::cuboid(Vec3::new(0.0, 1.0, 0.0), Vec3::splat(0.5)));

        assert_eq!(mesh.parts.len(), 2);
        assert_eq!(
            mesh.parts[1],
            MeshPart {
                index_start: 6,
                index_count: 36
            }
        );
        assert!(mesh.indices[6..].iter().all(|&i| i >= 4));
    }

    #[test]
    fn test_part_bounds_follow_world_transform() {
        let cube = MeshData::cuboid(Vec3::ZERO, Vec3::splat(0.5));
        let world = Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0));
        let bounds = cube.part_bounds(&cube.parts[0], world);
        assert!(bounds.center.distance(Vec3::new(10.0, 0.0, 0.0)) < 0.2);
        for p in &cube.positions {
            assert!(bounds.contains(world.transform_point3(*p), 1e-4));
        }
    }
}
