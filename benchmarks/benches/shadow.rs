//! Cascade pipeline CPU benchmarks (criterion - wall-clock time).
//!
//! Run all:    cargo bench --manifest-path benchmarks/Cargo.toml --bench shadow
//! Filter:     cargo bench --manifest-path benchmarks/Cargo.toml --bench shadow -- culling

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use glam::{Mat4, Vec3};
use rein_csm::renderer::culling::is_draw_visible;
use rein_csm::renderer::shadow::cascade::compute_splits;
use rein_csm::renderer::shadow::settings::PartitionMode;
use rein_csm::{BoundingSphere, Camera, CascadeBuilder, Frustum, ShadowSettings, Viewer};

fn camera() -> Camera {
    Camera::new_perspective(
        Vec3::new(0.0, 8.0, 30.0),
        Vec3::ZERO,
        Vec3::Y,
        60.0,
        16.0 / 9.0,
        0.5,
        250.0,
    )
}

/// Deterministic scatter of points in a `[-extent, extent]` cube.
fn scatter(n: usize, extent: f32) -> Vec<Vec3> {
    let mut state = 0x2545_f491_u32;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        (state as f32 / u32::MAX as f32) * 2.0 - 1.0
    };
    (0..n)
        .map(|_| Vec3::new(next(), next(), next()) * extent)
        .collect()
}

// ---------------------------------------------------------------------------
// Cascades
// ---------------------------------------------------------------------------

fn bench_cascades(c: &mut Criterion) {
    let camera = camera();

    {
        let mut group = c.benchmark_group("cascades/build");
        for stabilize in [false, true] {
            let settings = ShadowSettings {
                stabilize_cascades: stabilize,
                ..Default::default()
            };
            let builder = CascadeBuilder::new(&settings);
            let name = if stabilize { "stabilized" } else { "fitted" };
            group.bench_function(name, |b| {
                b.iter(|| builder.build(&settings, &camera, 0.0, 1.0));
            });
        }
        group.finish();
    }

    {
        let mut group = c.benchmark_group("cascades/splits");
        for mode in [PartitionMode::Manual, PartitionMode::Logarithmic, PartitionMode::Pssm] {
            let settings = ShadowSettings {
                partition_mode: mode,
                pssm_lambda: 0.7,
                ..Default::default()
            };
            group.bench_function(format!("{mode:?}"), |b| {
                b.iter(|| compute_splits(&settings, 0.02, 0.8, 0.5, 250.0));
            });
        }
        group.finish();
    }
}

// ---------------------------------------------------------------------------
// Bounds and culling
// ---------------------------------------------------------------------------

fn bench_ritter(c: &mut Criterion) {
    let mut group = c.benchmark_group("bounds/ritter");
    for &n in &[8, 64, 512, 4096] {
        let points = scatter(n, 10.0);
        group.bench_with_input(BenchmarkId::from_parameter(n), &points, |b, points| {
            b.iter(|| BoundingSphere::from_points(points));
        });
    }
    group.finish();
}

fn bench_culling(c: &mut Criterion) {
    let settings = ShadowSettings::default();
    let set = CascadeBuilder::new(&settings).build(&settings, &camera(), 0.0, 1.0);
    let cascade = set.cascades[1].frustum();
    let view = Frustum::from_view_projection(camera().view_projection_matrix());

    let mut group = c.benchmark_group("culling/spheres");
    for &n in &[1000, 10_000, 100_000] {
        let spheres: Vec<BoundingSphere> = scatter(n, 120.0)
            .into_iter()
            .map(|center| BoundingSphere::new(center, 1.5))
            .collect();

        group.bench_with_input(BenchmarkId::new("cascade", n), &spheres, |b, spheres| {
            b.iter(|| {
                spheres
                    .iter()
                    .filter(|s| is_draw_visible(&cascade, s, true))
                    .count()
            });
        });
        group.bench_with_input(BenchmarkId::new("camera", n), &spheres, |b, spheres| {
            b.iter(|| {
                spheres
                    .iter()
                    .filter(|s| is_draw_visible(&view, s, false))
                    .count()
            });
        });
    }
    group.finish();

    let world = Mat4::from_scale_rotation_translation(
        Vec3::splat(2.0),
        glam::Quat::from_rotation_y(0.6),
        Vec3::new(4.0, 0.0, -3.0),
    );
    let sphere = BoundingSphere::new(Vec3::ONE, 3.0);
    c.bench_function("culling/transform_sphere", |b| {
        b.iter(|| sphere.transformed(world));
    });
}

criterion_group!(benches, bench_cascades, bench_ritter, bench_culling);
criterion_main!(benches);
