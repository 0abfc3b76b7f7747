//! Collision pipeline benchmarks (criterion - wall-clock time).
//!
//! Run all:    cargo bench --manifest-path benchmarks/Cargo.toml --bench collision
//! Filter:     cargo bench --manifest-path benchmarks/Cargo.toml --bench collision -- broadphase

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::{Mat3, Vec3};
use rein_collision::{Contact, Pose, Shape};
use rein_collision_bench::*;

// ---------------------------------------------------------------------------
// Broadphase
// ---------------------------------------------------------------------------

fn bench_broadphase(c: &mut Criterion) {
    for (name, kind) in strategies() {
        {
            let mut group = c.benchmark_group(format!("broadphase/{name}/uniform_spheres"));
            for &n in &[100, 500, 1000] {
                let (mut world, space) = setup_sphere_world(kind, n).expect("scene setup");
                group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
                    b.iter(|| count_pairs(&mut world, space));
                });
            }
            group.finish();
        }

        {
            let mut group = c.benchmark_group(format!("broadphase/{name}/sparse"));
            for &n in &[100, 500, 1000] {
                let (mut world, space) = setup_sparse_world(kind, n).expect("scene setup");
                group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
                    b.iter(|| count_pairs(&mut world, space));
                });
            }
            group.finish();
        }

        {
            let mut group = c.benchmark_group(format!("broadphase/{name}/moving"));
            let n = 500;
            let (mut world, space) = setup_sphere_world(kind, n).expect("scene setup");
            let members = world.space_geoms(space);
            let mut frame = 0u32;
            group.bench_function(BenchmarkId::from_parameter(n), |b| {
                b.iter(|| {
                    frame += 1;
                    let dy = (frame % 8) as f32 * 0.01;
                    for &id in &members {
                        let p = world.position(id);
                        world.set_position(id, Vec3::new(p.x, dy, p.z));
                    }
                    count_pairs(&mut world, space)
                });
            });
            group.finish();
        }
    }
}

// ---------------------------------------------------------------------------
// Narrowphase
// ---------------------------------------------------------------------------

fn bench_narrowphase(c: &mut Criterion) {
    let mut contacts = [Contact::default(); 8];
    let hit = Pose::from_position(Vec3::new(1.5, 0.0, 0.0));
    let miss = Pose::from_position(Vec3::new(5.0, 0.0, 0.0));
    let rotated = Pose::new(Vec3::new(1.5, 0.2, 0.0), Mat3::from_rotation_y(0.785));

    let pairs = [
        ("sphere_sphere", Shape::sphere(1.0), Shape::sphere(1.0)),
        ("box_box", Shape::cuboid(Vec3::splat(2.0)), Shape::cuboid(Vec3::splat(2.0))),
        ("box_sphere", Shape::cuboid(Vec3::splat(2.0)), Shape::sphere(1.0)),
        ("capsule_box", Shape::capsule(0.5, 2.0), Shape::cuboid(Vec3::splat(2.0))),
        ("cylinder_box", Shape::cylinder(1.0, 2.0), Shape::cuboid(Vec3::splat(2.0))),
        ("cylinder_sphere", Shape::cylinder(1.0, 2.0), Shape::sphere(1.0)),
    ];

    for (name, a, b) in pairs {
        let (Ok(a), Ok(b)) = (a, b) else {
            eprintln!("narrowphase/{name} skipped: invalid shape");
            continue;
        };
        let mut group = c.benchmark_group(format!("narrowphase/{name}"));
        for (label, pose) in [("intersecting", hit), ("separated", miss), ("rotated", rotated)] {
            let (mut world, ga, gb) = setup_pair(a.clone(), b.clone(), pose);
            group.bench_function(label, |bench| {
                bench.iter(|| world.collide_pair(ga, gb, &mut contacts));
            });
        }
        group.finish();
    }

    {
        let mut group = c.benchmark_group("narrowphase/contacts");
        for &n in &[100, 500] {
            let (mut world, space) = setup_mixed_world(Default::default(), n).expect("scene setup");
            group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
                b.iter(|| count_contacts(&mut world, space, 4));
            });
        }
        group.finish();
    }
}

// ---------------------------------------------------------------------------
// LCP
// ---------------------------------------------------------------------------

fn bench_lcp(c: &mut Criterion) {
    {
        let mut group = c.benchmark_group("lcp/contacts");
        for &contacts in &[4, 16, 32, 64] {
            let problem = setup_lcp(contacts, 0.5, 7);
            group.bench_with_input(BenchmarkId::from_parameter(contacts), &problem, |b, p| {
                b.iter(|| p.solve());
            });
        }
        group.finish();
    }

    {
        let mut group = c.benchmark_group("lcp/in_place");
        let problem = setup_lcp(32, 0.5, 11);
        let mut x = vec![0.0; problem.n];
        let mut w = vec![0.0; problem.n];
        group.bench_function("96", |b| {
            b.iter(|| problem.solve_in_place(&mut x, &mut w));
        });
        group.finish();
    }
}

criterion_group!(benches, bench_broadphase, bench_narrowphase, bench_lcp);
criterion_main!(benches);
