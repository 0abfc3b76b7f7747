//! Shared setup helpers for rein-collision benchmarks.
//!
//! ## Running
//!
//! Wall-clock (criterion):
//!   cargo bench --manifest-path benchmarks/Cargo.toml --bench collision
//!
//! iai-callgrind (instruction counts, requires valgrind):
//!   cargo install iai-callgrind-runner
//!   cargo bench --manifest-path benchmarks/Cargo.toml --bench collision_iai
//!
//! Filter by group:
//!   cargo bench --manifest-path benchmarks/Cargo.toml --bench collision -- broadphase
//!   cargo bench --manifest-path benchmarks/Cargo.toml --bench collision -- lcp

use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rein_collision::{Contact, GeomId, LcpProblem, Pose, Shape, SpaceKind, World};

// ---------------------------------------------------------------------------
// Broadphase scenes
// ---------------------------------------------------------------------------

/// Every strategy with the configuration used by the benchmarks.
pub fn strategies() -> Vec<(&'static str, SpaceKind)> {
    vec![
        ("simple", SpaceKind::Simple),
        ("hash", SpaceKind::Hash(Default::default())),
        ("quadtree", SpaceKind::QuadTree(Default::default())),
        ("sap", SpaceKind::Sap(Default::default())),
    ]
}

fn grid_position(i: usize, cols: usize, spacing: f32) -> Vec3 {
    Vec3::new(
        (i % cols) as f32 * spacing,
        0.0,
        (i / cols) as f32 * spacing,
    )
}

fn add_geom(world: &mut World, space: GeomId, shape: Shape, position: Vec3) -> GeomId {
    let id = world.create_geom(shape);
    world.set_position(id, position);
    world.add(space, id);
    id
}

/// `n` unit spheres in a grid so neighbours overlap.
pub fn setup_sphere_world(kind: SpaceKind, n: usize) -> anyhow::Result<(World, GeomId)> {
    let mut world = World::new();
    let space = world.create_space(kind, None);
    let cols = (n as f32).sqrt().ceil() as usize;
    for i in 0..n {
        add_geom(&mut world, space, Shape::sphere(1.0)?, grid_position(i, cols, 1.5));
    }
    Ok((world, space))
}

/// Alternating spheres and boxes in a grid.
pub fn setup_mixed_world(kind: SpaceKind, n: usize) -> anyhow::Result<(World, GeomId)> {
    let mut world = World::new();
    let space = world.create_space(kind, None);
    let cols = (n as f32).sqrt().ceil() as usize;
    for i in 0..n {
        let shape = if i % 2 == 0 {
            Shape::sphere(1.0)?
        } else {
            Shape::cuboid(Vec3::splat(1.0))?
        };
        add_geom(&mut world, space, shape, grid_position(i, cols, 1.5));
    }
    Ok((world, space))
}

/// Small spheres spread far apart (no overlaps).
pub fn setup_sparse_world(kind: SpaceKind, n: usize) -> anyhow::Result<(World, GeomId)> {
    let mut world = World::new();
    let space = world.create_space(kind, None);
    let cols = (n as f32).sqrt().ceil() as usize;
    for i in 0..n {
        add_geom(&mut world, space, Shape::sphere(0.5)?, grid_position(i, cols, 10.0));
    }
    Ok((world, space))
}

/// Candidate pairs reported by one broadphase pass.
pub fn count_pairs(world: &mut World, space: GeomId) -> usize {
    let mut pairs = 0;
    world.collide(space, |_, _, _| pairs += 1);
    pairs
}

/// Broadphase plus narrowphase, at most `max_contacts` per pair.
pub fn count_contacts(world: &mut World, space: GeomId, max_contacts: usize) -> usize {
    let mut buffer = vec![Contact::default(); max_contacts];
    let mut total = 0;
    world.collide(space, |world, a, b| {
        total += world.collide_pair(a, b, &mut buffer);
    });
    total
}

// ---------------------------------------------------------------------------
// Narrowphase pairs
// ---------------------------------------------------------------------------

/// Two geoms, `b` placed at `pose` relative to the origin.
pub fn setup_pair(a: Shape, b: Shape, pose: Pose) -> (World, GeomId, GeomId) {
    let mut world = World::new();
    let ga = world.create_geom(a);
    let gb = world.create_geom(b);
    world.set_pose(gb, pose);
    (world, ga, gb)
}

// ---------------------------------------------------------------------------
// LCP
// ---------------------------------------------------------------------------

/// A contact-shaped problem: `contacts` normal rows with two friction rows
/// each, referencing the normal with coefficient `mu`.
pub fn setup_lcp(contacts: usize, mu: f64, seed: u64) -> LcpProblem {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = contacts * 3;
    let mut problem = LcpProblem::new(n);

    // J M^-1 J' from random rows, plus a little regularization
    let cols = n + 6;
    let jacobian: Vec<f64> = (0..n * cols).map(|_| rng.gen_range(-1.0..1.0)).collect();
    for i in 0..n {
        for j in 0..=i {
            let mut v: f64 = (0..cols)
                .map(|k| jacobian[i * cols + k] * jacobian[j * cols + k])
                .sum();
            if i == j {
                v += 1e-3;
            }
            problem.set(i, j, v);
        }
    }

    for c in 0..contacts {
        let normal = c * 3;
        problem.b[normal] = rng.gen_range(0.0..2.0);
        problem.set_bounds(normal, 0.0, f64::INFINITY);
        for k in 1..3 {
            problem.b[normal + k] = rng.gen_range(-1.0..1.0);
            problem.set_bounds(normal + k, -mu, mu);
            problem.findex[normal + k] = Some(normal);
        }
    }
    problem
}
