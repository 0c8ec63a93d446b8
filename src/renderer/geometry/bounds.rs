//! Bounding spheres
//!
//! Ritter's approximate minimal enclosing sphere, used per mesh part for
//! culling and per cascade for stable shadow extents.

use glam::{Mat4, Vec3};

/// Smallest radius a bounding sphere may have.
pub const MIN_SPHERE_RADIUS: f32 = 1e-4;

/// A sphere enclosing a set of points.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Fit a sphere around `points` with Ritter's algorithm.
    ///
    /// Starts from the most distant pair among the per-axis extreme points,
    /// then grows to include every point that lies outside. The radius is
    /// never smaller than [`MIN_SPHERE_RADIUS`], and an empty set yields a
    /// sphere of that radius at the origin.
    pub fn from_points(points: &[Vec3]) -> Self {
        let Some(&first) = points.first() else {
            return Self::new(Vec3::ZERO, MIN_SPHERE_RADIUS);
        };

        let mut min_pts = [first; 3];
        let mut max_pts = [first; 3];
        for &p in points {
            for axis in 0..3 {
                if p[axis] < min_pts[axis][axis] {
                    min_pts[axis] = p;
                }
                if p[axis] > max_pts[axis][axis] {
                    max_pts[axis] = p;
                }
            }
        }

        let (mut lo, mut hi) = (min_pts[0], max_pts[0]);
        for axis in 1..3 {
            if min_pts[axis].distance_squared(max_pts[axis]) > lo.distance_squared(hi) {
                lo = min_pts[axis];
                hi = max_pts[axis];
            }
        }

        let mut center = (lo + hi) * 0.5;
        let mut radius = lo.distance(hi) * 0.5;

        for &p in points {
            let delta = p - center;
            let dist = delta.length();
            if dist > radius {
                let new_radius = (radius + dist) * 0.5;
                center += (1.0 - new_radius / dist) * delta;
                radius = new_radius;
            }
        }

        Self::new(center, radius.max(MIN_SPHERE_RADIUS))
    }

    /// The sphere after `world` is applied, grown by the largest axis scale.
    pub fn transformed(&self, world: Mat4) -> Self {
        Self::new(
            world.transform_point3(self.center),
            self.radius * max_axis_scale(world),
        )
    }

    /// Whether `point` lies inside, with `tolerance` slack.
    pub fn contains(&self, point: Vec3, tolerance: f32) -> bool {
        self.center.distance(point) <= self.radius + tolerance
    }
}

/// Largest length among the basis vectors of `world`.
pub fn max_axis_scale(world: Mat4) -> f32 {
    world
        .x_axis
        .truncate()
        .length()
        .max(world.y_axis.truncate().length())
        .max(world.z_axis.truncate().length())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn box_corners(min: Vec3, max: Vec3) -> Vec<Vec3> {
        (0..8)
            .map(|i| {
                Vec3::new(
                    if i & 1 == 0 { min.x } else { max.x },
                    if i & 2 == 0 { min.y } else { max.y },
                    if i & 4 == 0 { min.z } else { max.z },
                )
            })
            .collect()
    }

    #[test]
    fn test_encloses_all_points() {
        let mut points = box_corners(Vec3::new(-1.0, -2.0, -3.0), Vec3::new(4.0, 1.0, 0.5));
        points.push(Vec3::new(6.0, 6.0, 6.0));
        points.push(Vec3::new(-3.0, 0.0, 9.0));

        let sphere = BoundingSphere::from_points(&points);
        for p in &points {
            assert!(sphere.contains(*p, 1e-4), "{p:?} outside {sphere:?}");
        }
    }

    #[test]
    fn test_cube_sphere_is_tight() {
        let points = box_corners(Vec3::splat(-1.0), Vec3::splat(1.0));
        let sphere = BoundingSphere::from_points(&points);
        // Exact answer is sqrt(3); Ritter may overshoot slightly.
        assert!(sphere.radius >= 3f32.sqrt() - 1e-5);
        assert!(sphere.radius < 3f32.sqrt() * 1.2);
        assert!(sphere.center.length() < 0.3);
    }

    #[test]
    fn test_single_point_clamped_radius() {
        let sphere = BoundingSphere::from_points(&[Vec3::new(2.0, 3.0, 4.0)]);
        assert_eq!(sphere.center, Vec3::new(2.0, 3.0, 4.0));
        assert_eq!(sphere.radius, MIN_SPHERE_RADIUS);
    }

    #[test]
    fn test_transformed_scales_radius() {
        let sphere = BoundingSphere::new(Vec3::X, 2.0);
        let world = Mat4::from_scale_rotation_translation(
            Vec3::new(1.0, 3.0, 2.0),
            glam::Quat::from_rotation_y(0.7),
            Vec3::new(0.0, 5.0, 0.0),
        );
        let moved = sphere.transformed(world);
        assert!((moved.radius - 6.0).abs() < 1e-5);
        assert!(moved.center.distance(world.transform_point3(Vec3::X)) < 1e-5);
    }

    #[test]
    fn test_empty_points() {
        let sphere = BoundingSphere::from_points(&[]);
        assert_eq!(sphere.radius, MIN_SPHERE_RADIUS);
    }
}
