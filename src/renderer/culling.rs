//! Frustum math for visibility determination
//!
//! Frustum planes come either from a view-projection matrix (Gribb/Hartmann)
//! or from the eight world-space corners reconstructed through its inverse.
//! Both the CPU draw loop and the GPU cull shader test bounding spheres
//! against planes in the same order, with the same near-plane policy.

use super::geometry::BoundingSphere;
use glam::{Mat4, Vec3, Vec4};

/// A plane in 3D space defined by the equation ax + by + cz + d = 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Normal vector (a, b, c).
    pub normal: Vec3,
    /// Distance from origin (d).
    pub distance: f32,
}

impl Plane {
    /// Create a new plane from normal and distance.
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self { normal, distance }
    }

    /// Create a plane from a Vec4 (xyz = normal, w = distance).
    pub fn from_vec4(v: Vec4) -> Self {
        Self {
            normal: v.truncate(),
            distance: v.w,
        }
    }

    /// Plane through three points, normal following `(b - a) x (c - a)`.
    pub fn from_points(a: Vec3, b: Vec3, c: Vec3) -> Self {
        let normal = (b - a).cross(c - a).normalize_or_zero();
        Self {
            normal,
            distance: -normal.dot(a),
        }
    }

    /// Pack as (a, b, c, d) for upload.
    pub fn to_vec4(&self) -> Vec4 {
        self.normal.extend(self.distance)
    }

    /// Normalize the plane equation.
    pub fn normalize(&self) -> Self {
        let len = self.normal.length();
        if len > 0.0 {
            Self {
                normal: self.normal / len,
                distance: self.distance / len,
            }
        } else {
            *self
        }
    }

    /// Flip the plane so `point` lies on its positive side.
    pub fn facing(self, point: Vec3) -> Self {
        if self.signed_distance(point) < 0.0 {
            Self {
                normal: -self.normal,
                distance: -self.distance,
            }
        } else {
            self
        }
    }

    /// Get the signed distance from a point to the plane.
    /// Positive = in front (same side as normal), Negative = behind.
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

/// NDC corners of the unit view volume (depth in `[0, 1]`).
///
/// Near face first (top-left, top-right, bottom-right, bottom-left), then
/// the far face in the same winding.
pub const NDC_CORNERS: [Vec3; 8] = [
    Vec3::new(-1.0, 1.0, 0.0),
    Vec3::new(1.0, 1.0, 0.0),
    Vec3::new(1.0, -1.0, 0.0),
    Vec3::new(-1.0, -1.0, 0.0),
    Vec3::new(-1.0, 1.0, 1.0),
    Vec3::new(1.0, 1.0, 1.0),
    Vec3::new(1.0, -1.0, 1.0),
    Vec3::new(-1.0, -1.0, 1.0),
];

/// World-space frustum corners, reconstructed through the inverse view-projection.
pub fn frustum_corners(inverse_view_projection: Mat4) -> [Vec3; 8] {
    NDC_CORNERS.map(|c| inverse_view_projection.project_point3(c))
}

/// View frustum defined by 6 planes.
///
/// The planes are normalized and oriented so that their normals point inward.
#[derive(Debug, Clone, Copy)]
pub struct Frustum {
    /// Left, Right, Bottom, Top, Far, Near.
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Index of the near plane. It is last so it can be skipped by testing
    /// only the first five planes.
    pub const NEAR_PLANE: usize = 5;

    /// Extract frustum planes from a view-projection matrix.
    ///
    /// Gribb/Hartmann extraction for a `[0, 1]` clip-space depth range.
    pub fn from_view_projection(vp: Mat4) -> Self {
        let row0 = vp.row(0);
        let row1 = vp.row(1);
        let row2 = vp.row(2);
        let row3 = vp.row(3);

        let planes = [
            Plane::from_vec4(row3 + row0).normalize(),
            Plane::from_vec4(row3 - row0).normalize(),
            Plane::from_vec4(row3 + row1).normalize(),
            Plane::from_vec4(row3 - row1).normalize(),
            Plane::from_vec4(row3 - row2).normalize(),
            Plane::from_vec4(row2).normalize(),
        ];

        Self { planes }
    }

    /// Build the frustum from its eight corners, ordered like [`NDC_CORNERS`].
    pub fn from_corners(corners: &[Vec3; 8]) -> Self {
        let centroid = corners.iter().copied().sum::<Vec3>() / 8.0;
        let plane = |a: usize, b: usize, c: usize| {
            Plane::from_points(corners[a], corners[b], corners[c]).facing(centroid)
        };

        let planes = [
            plane(0, 3, 7), // left
            plane(1, 2, 6), // right
            plane(3, 2, 6), // bottom
            plane(0, 1, 5), // top
            plane(4, 5, 6), // far
            plane(0, 1, 2), // near
        ];

        Self { planes }
    }

    /// Build the frustum from an inverse view-projection matrix.
    pub fn from_inverse_view_projection(inverse_view_projection: Mat4) -> Self {
        Self::from_corners(&frustum_corners(inverse_view_projection))
    }

    /// Planes packed for GPU upload, in the same order.
    pub fn to_vec4_array(&self) -> [[f32; 4]; 6] {
        self.planes.map(|p| p.to_vec4().to_array())
    }

    /// Test if a point is inside the frustum.
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(point) >= 0.0)
    }

    /// Test if a sphere is at least partially inside the frustum.
    ///
    /// With `ignore_near` the near plane is skipped, so geometry between the
    /// eye and the near plane still counts as visible.
    pub fn intersects_sphere(&self, center: Vec3, radius: f32, ignore_near: bool) -> bool {
        let count = if ignore_near {
            Self::NEAR_PLANE
        } else {
            self.planes.len()
        };
        self.planes[..count]
            .iter()
            .all(|plane| plane.signed_distance(center) >= -radius)
    }
}

/// Whether a draw with `bounds` must be rendered into a pass over `frustum`.
///
/// Shadow casters in front of a cascade's near plane still cast into it, so
/// the near plane is only tested when not rendering shadow casters. The GPU
/// cull shader applies the same rule through its `cull_near_z` flag.
pub fn is_draw_visible(frustum: &Frustum, bounds: &BoundingSphere, shadow_casters: bool) -> bool {
    frustum.intersects_sphere(bounds.center, bounds.radius, shadow_casters)
}

/// Helper struct for culling a list of bounding spheres against a frustum.
pub struct FrustumCuller {
    frustum: Frustum,
    shadow_casters: bool,
}

impl FrustumCuller {
    /// Create a new frustum culler from a view-projection matrix.
    pub fn new(view_projection: Mat4, shadow_casters: bool) -> Self {
        Self {
            frustum: Frustum::from_view_projection(view_projection),
            shadow_casters,
        }
    }

    /// Get the underlying frustum.
    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    /// Test if a sphere should be culled.
    pub fn should_cull(&self, bounds: &BoundingSphere) -> bool {
        !is_draw_visible(&self.frustum, bounds, self.shadow_casters)
    }

    /// Indices of the spheres that survive culling.
    pub fn filter_visible<'a>(
        &'a self,
        spheres: impl IntoIterator<Item = &'a BoundingSphere> + 'a,
    ) -> impl Iterator<Item = usize> + 'a {
        spheres
            .into_iter()
            .enumerate()
            .filter(move |(_, s)| !self.should_cull(s))
            .map(|(i, _)| i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_view_projection() -> Mat4 {
        let proj = Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, 0.5, 40.0);
        let view = Mat4::look_at_rh(Vec3::new(3.0, 4.0, 10.0), Vec3::new(0.0, 1.0, 0.0), Vec3::Y);
        proj * view
    }

    #[test]
    fn test_plane_signed_distance() {
        // Plane at z=0, normal pointing in +Z direction
        let plane = Plane::new(Vec3::Z, 0.0);

        assert!(plane.signed_distance(Vec3::new(0.0, 0.0, 1.0)) > 0.0);
        assert!(plane.signed_distance(Vec3::new(0.0, 0.0, -1.0)) < 0.0);
        assert!((plane.signed_distance(Vec3::ZERO)).abs() < 0.0001);
    }

    #[test]
    fn test_frustum_contains_point() {
        let vp = Mat4::orthographic_rh(-10.0, 10.0, -10.0, 10.0, 0.1, 100.0);
        let frustum = Frustum::from_view_projection(vp);

        assert!(frustum.contains_point(Vec3::new(0.0, 0.0, -50.0)));
        // Beyond far plane
        assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, -150.0)));
        // Behind near plane
        assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, 1.0)));
    }

    #[test]
    fn test_corners_agree_with_matrix_extraction() {
        let vp = test_view_projection();
        let from_matrix = Frustum::from_view_projection(vp);
        let from_corners = Frustum::from_inverse_view_projection(vp.inverse());

        for (a, b) in from_matrix.planes.iter().zip(from_corners.planes.iter()) {
            assert!(
                a.normal.abs_diff_eq(b.normal, 1e-3),
                "normals differ: {:?} vs {:?}",
                a.normal,
                b.normal
            );
            assert!((a.distance - b.distance).abs() < 1e-2);
        }
    }

    #[test]
    fn test_corners_lie_on_planes() {
        let vp = test_view_projection();
        let corners = frustum_corners(vp.inverse());
        let frustum = Frustum::from_view_projection(vp);
        for corner in corners {
            for plane in &frustum.planes {
                assert!(plane.signed_distance(corner) > -1e-2);
            }
        }
    }

    #[test]
    fn test_sphere_outside_side_plane() {
        let frustum = Frustum::from_view_projection(test_view_projection());
        assert!(!frustum.intersects_sphere(Vec3::new(100.0, 0.0, 0.0), 1.0, false));
        assert!(frustum.intersects_sphere(Vec3::new(0.0, 1.0, 0.0), 0.5, false));
        // Straddling a plane counts as visible
        assert!(frustum.intersects_sphere(Vec3::new(0.0, 1.0, -35.0), 10.0, false));
    }

    #[test]
    fn test_near_plane_skipped_for_shadow_casters() {
        let vp = Mat4::orthographic_rh(-10.0, 10.0, -10.0, 10.0, 0.0, 20.0);
        let frustum = Frustum::from_view_projection(vp);
        // Caster between the light and the near plane
        let sphere = BoundingSphere::new(Vec3::new(0.0, 0.0, 5.0), 1.0);

        assert!(is_draw_visible(&frustum, &sphere, true));
        assert!(!is_draw_visible(&frustum, &sphere, false));

        let culler = FrustumCuller::new(vp, true);
        let visible: Vec<_> = culler.filter_visible([&sphere]).collect();
        assert_eq!(visible, vec![0]);
    }

    #[test]
    fn test_near_plane_is_last() {
        let vp = Mat4::orthographic_rh(-1.0, 1.0, -1.0, 1.0, 0.0, 1.0);
        let frustum = Frustum::from_view_projection(vp);
        // For a view looking down -Z the near plane normal points along -Z.
        assert!(frustum.planes[Frustum::NEAR_PLANE]
            .normal
            .abs_diff_eq(-Vec3::Z, 1e-5));
    }
}
