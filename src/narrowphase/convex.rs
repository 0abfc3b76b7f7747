//! Convex hull colliders: sphere, plane and hull-hull via separating axes
//! with face clipping. Hull-hull edge axes come from the edges around each
//! hull's support vertices. Hulls against boxes and capsules go through
//! [`super::gjk`].

use glam::Vec3;

use super::util::{clip_polygon, closest_segment_points, emit, keep_deepest};
use super::{shape_params, GeomRef};
use crate::contact::Contact;
use crate::math::Pose;
use crate::shape::{ConvexHull, Shape};

/// Prefer face contacts over edge contacts of similar depth.
const FACE_PREFERENCE: f32 = 1.05;
const MIN_AXIS_LENGTH: f32 = 1e-6;
const CLIP_EPS: f32 = 1e-6;
const SUPPORT_EPS: f32 = 1e-5;

fn closest_point_on_segment(p: Vec3, a: Vec3, b: Vec3) -> Vec3 {
    let ab = b - a;
    let len2 = ab.length_squared();
    if len2 <= f32::EPSILON {
        return a;
    }
    a + ab * ((p - a).dot(ab) / len2).clamp(0.0, 1.0)
}

/// Closest point to `p` on a planar polygon with unit normal `normal`.
fn closest_point_on_polygon(p: Vec3, polygon: &[Vec3], normal: Vec3) -> Vec3 {
    let projected = p - normal * (p - polygon[0]).dot(normal);
    let mut positive = true;
    let mut negative = true;
    for (k, &a) in polygon.iter().enumerate() {
        let b = polygon[(k + 1) % polygon.len()];
        let turn = (b - a).cross(projected - a).dot(normal);
        positive &= turn >= -CLIP_EPS;
        negative &= turn <= CLIP_EPS;
    }
    if positive || negative {
        return projected;
    }

    let mut best = polygon[0];
    let mut best_dist = f32::INFINITY;
    for (k, &a) in polygon.iter().enumerate() {
        let b = polygon[(k + 1) % polygon.len()];
        let q = closest_point_on_segment(p, a, b);
        let dist = (q - p).length_squared();
        if dist < best_dist {
            best_dist = dist;
            best = q;
        }
    }
    best
}

pub fn collide_convex_sphere(
    o1: &GeomRef<'_>,
    o2: &GeomRef<'_>,
    contacts: &mut [Contact],
) -> usize {
    let hull = shape_params!(o1, Shape::Convex(hull) => hull);
    let radius = shape_params!(o2, Shape::Sphere { radius } => *radius);

    let center = o2.pose.position;
    let local = o1.pose.inverse_transform_point(center);

    let mut max_face = 0;
    let mut max_distance = f32::NEG_INFINITY;
    for (i, plane) in hull.planes.iter().enumerate() {
        let distance = plane.distance(local);
        if distance > max_distance {
            max_distance = distance;
            max_face = i;
        }
    }
    if hull.planes.is_empty() {
        return 0;
    }

    if max_distance <= 0.0 {
        // Center inside: leave through the least penetrated face.
        let normal = o1.pose.transform_vector(hull.planes[max_face].normal);
        contacts[0] = Contact::new(center, -normal, radius - max_distance, o1.id, o2.id);
        return 1;
    }
    if max_distance > radius {
        return 0;
    }

    let mut closest = local;
    let mut closest_dist = f32::INFINITY;
    for (i, plane) in hull.planes.iter().enumerate() {
        if plane.distance(local) <= 0.0 {
            continue;
        }
        let polygon: Vec<Vec3> = hull.face_points(i).collect();
        let q = closest_point_on_polygon(local, &polygon, plane.normal);
        let dist = (q - local).length_squared();
        if dist < closest_dist {
            closest_dist = dist;
            closest = q;
        }
    }
    let dist = closest_dist.sqrt();
    if dist > radius {
        return 0;
    }
    let closest = o1.pose.transform_point(closest);
    let normal = if dist > f32::EPSILON {
        (closest - center) / dist
    } else {
        -o1.pose.transform_vector(hull.planes[max_face].normal)
    };
    contacts[0] = Contact::new(closest, normal, radius - dist, o1.id, o2.id);
    1
}

pub fn collide_convex_plane(
    o1: &GeomRef<'_>,
    o2: &GeomRef<'_>,
    contacts: &mut [Contact],
) -> usize {
    let hull = shape_params!(o1, Shape::Convex(hull) => hull);
    let (normal, d) = shape_params!(o2, Shape::Plane { normal, d } => (*normal, *d));

    let mut found = Vec::new();
    for &point in &hull.points {
        let p = o1.pose.transform_point(point);
        let depth = d - normal.dot(p);
        if depth >= 0.0 {
            found.push(Contact::new(p, normal, depth, o1.id, o2.id));
        }
    }
    keep_deepest(&mut found, contacts.len());
    emit(&found, contacts)
}

/// A hull with its vertices and face planes moved to world space.
struct WorldHull<'a> {
    hull: &'a ConvexHull,
    points: Vec<Vec3>,
    normals: Vec<Vec3>,
    offsets: Vec<f32>,
    center: Vec3,
}

impl<'a> WorldHull<'a> {
    fn new(hull: &'a ConvexHull, pose: &Pose) -> Self {
        let points: Vec<Vec3> = hull.points.iter().map(|&p| pose.transform_point(p)).collect();
        let normals: Vec<Vec3> = hull
            .planes
            .iter()
            .map(|plane| pose.transform_vector(plane.normal))
            .collect();
        let offsets = hull
            .planes
            .iter()
            .zip(&normals)
            .map(|(plane, n)| plane.d + n.dot(pose.position))
            .collect();
        let center = points.iter().sum::<Vec3>() / points.len().max(1) as f32;
        Self {
            hull,
            points,
            normals,
            offsets,
            center,
        }
    }

    fn min_along(&self, axis: Vec3) -> f32 {
        self.points
            .iter()
            .map(|p| p.dot(axis))
            .fold(f32::INFINITY, f32::min)
    }

    /// Walk edges uphill from `start` to a vertex farthest along `dir`.
    fn climb(&self, dir: Vec3, start: usize) -> usize {
        let mut current = start;
        let mut height = self.points[current].dot(dir);
        'walk: loop {
            for &e in &self.hull.vertex_edges[current] {
                let next = self.hull.edge_neighbor(e, current);
                let h = self.points[next].dot(dir);
                if h > height {
                    current = next;
                    height = h;
                    continue 'walk;
                }
            }
            return current;
        }
    }

    /// Edges touching a support vertex along one of `dirs`. Neighbours within
    /// `SUPPORT_EPS` of the support height count as support vertices too.
    fn extremal_edges(&self, pose: &Pose, dirs: &[Vec3]) -> Vec<usize> {
        let mut edges = Vec::new();
        for &dir in dirs {
            if dir == Vec3::ZERO {
                continue;
            }
            let top = self.hull.support_index(pose.inverse_transform_vector(dir));
            let height = self.points[top].dot(dir);
            let mut seen = vec![top];
            let mut stack = vec![top];
            while let Some(v) = stack.pop() {
                for &e in &self.hull.vertex_edges[v] {
                    edges.push(e as usize);
                    let n = self.hull.edge_neighbor(e, v);
                    if height - self.points[n].dot(dir) <= SUPPORT_EPS && !seen.contains(&n) {
                        seen.push(n);
                        stack.push(n);
                    }
                }
            }
        }
        edges.sort_unstable();
        edges.dedup();
        edges
    }

    fn face(&self, face: usize) -> Vec<Vec3> {
        self.hull.polygons[face]
            .iter()
            .map(|&i| self.points[i as usize])
            .collect()
    }

    fn edge(&self, edge: usize) -> (Vec3, Vec3) {
        let (a, b) = self.hull.edges[edge];
        (self.points[a as usize], self.points[b as usize])
    }
}

#[derive(Debug, Clone, Copy)]
enum Feature {
    FaceA(usize),
    FaceB(usize),
    Edges(usize, usize),
}

/// Clip the most anti-parallel face of `incident` against the side planes of
/// `reference`'s face `face`.
fn clip_faces(
    reference: &WorldHull<'_>,
    face: usize,
    incident: &WorldHull<'_>,
    normal: Vec3,
    o1: &GeomRef<'_>,
    o2: &GeomRef<'_>,
) -> Vec<Contact> {
    let ref_normal = reference.normals[face];
    let ref_offset = reference.offsets[face];
    let ref_polygon = reference.face(face);
    let ref_centroid = ref_polygon.iter().sum::<Vec3>() / ref_polygon.len() as f32;

    let mut incident_face = 0;
    let mut min_dot = f32::INFINITY;
    for (j, n) in incident.normals.iter().enumerate() {
        let dot = n.dot(ref_normal);
        if dot < min_dot {
            min_dot = dot;
            incident_face = j;
        }
    }

    let mut clipped = incident.face(incident_face);
    for (k, &a) in ref_polygon.iter().enumerate() {
        if clipped.is_empty() {
            break;
        }
        let b = ref_polygon[(k + 1) % ref_polygon.len()];
        let mut side = (b - a).cross(ref_normal).normalize_or_zero();
        if side == Vec3::ZERO {
            continue;
        }
        if side.dot(ref_centroid - a) > 0.0 {
            side = -side;
        }
        clipped = clip_polygon(&clipped, side, side.dot(a));
    }

    clipped
        .into_iter()
        .filter_map(|p| {
            let depth = ref_offset - ref_normal.dot(p);
            (depth >= 0.0).then(|| Contact::new(p, normal, depth, o1.id, o2.id))
        })
        .collect()
}

pub fn collide_convex_convex(
    o1: &GeomRef<'_>,
    o2: &GeomRef<'_>,
    contacts: &mut [Contact],
) -> usize {
    let hull_a = shape_params!(o1, Shape::Convex(hull) => hull);
    let hull_b = shape_params!(o2, Shape::Convex(hull) => hull);
    if hull_a.points.is_empty() || hull_b.points.is_empty() {
        return 0;
    }
    let a = WorldHull::new(hull_a, &o1.pose);
    let b = WorldHull::new(hull_b, &o2.pose);

    let mut best_depth = f32::INFINITY;
    let mut best: Option<(Feature, Vec3)> = None;

    for (i, (&n, &d)) in a.normals.iter().zip(&a.offsets).enumerate() {
        let depth = d - b.min_along(n);
        if depth < 0.0 {
            return 0;
        }
        if depth < best_depth {
            best_depth = depth;
            best = Some((Feature::FaceA(i), -n));
        }
    }
    for (j, (&n, &d)) in b.normals.iter().zip(&b.offsets).enumerate() {
        let depth = d - a.min_along(n);
        if depth < 0.0 {
            return 0;
        }
        if depth < best_depth {
            best_depth = depth;
            best = Some((Feature::FaceB(j), n));
        }
    }

    // Edge pairs are only tried among edges touching the support vertices
    // facing the other hull, along the center line and the best face axis.
    let face_depth = best_depth;
    let towards_b = (b.center - a.center).normalize_or_zero();
    let face_normal = best.map_or(Vec3::ZERO, |(_, n)| n);
    let edges_a = a.extremal_edges(&o1.pose, &[towards_b, -face_normal]);
    let edges_b = b.extremal_edges(&o2.pose, &[-towards_b, face_normal]);
    for &ea in &edges_a {
        let (a0, a1) = a.edge(ea);
        for &eb in &edges_b {
            let (b0, b1) = b.edge(eb);
            let axis = (a1 - a0).cross(b1 - b0);
            let len = axis.length();
            if len < MIN_AXIS_LENGTH {
                continue;
            }
            let mut axis = axis / len;
            if axis.dot(towards_b) < 0.0 {
                axis = -axis;
            }
            let max_a = a.points[a.climb(axis, hull_a.edges[ea].0 as usize)].dot(axis);
            let min_b = b.points[b.climb(-axis, hull_b.edges[eb].0 as usize)].dot(axis);
            let depth = max_a - min_b;
            if depth < 0.0 {
                return 0;
            }
            // Only edges that actually realize the extremes can touch.
            if max_a - axis.dot(a0) > SUPPORT_EPS || axis.dot(b0) - min_b > SUPPORT_EPS {
                continue;
            }
            if depth * FACE_PREFERENCE < face_depth && depth < best_depth {
                best_depth = depth;
                best = Some((Feature::Edges(ea, eb), -axis));
            }
        }
    }

    let Some((feature, normal)) = best else {
        return 0;
    };

    let mut found = match feature {
        Feature::FaceA(i) => clip_faces(&a, i, &b, normal, o1, o2),
        Feature::FaceB(j) => clip_faces(&b, j, &a, normal, o1, o2),
        Feature::Edges(ea, eb) => {
            let (a0, a1) = a.edge(ea);
            let (b0, b1) = b.edge(eb);
            let (pa, pb) = closest_segment_points(a0, a1, b0, b1);
            vec![Contact::new((pa + pb) * 0.5, normal, best_depth, o1.id, o2.id)]
        }
    };

    if found.is_empty() {
        // Clipping lost every point; fall back to the deepest incident vertex.
        let (deepest, depth) = match feature {
            Feature::FaceB(_) => {
                let p = a.points[hull_a.support_index(o1.pose.inverse_transform_vector(normal))];
                (p, best_depth)
            }
            _ => {
                let p = b.points[hull_b.support_index(o2.pose.inverse_transform_vector(normal))];
                (p, best_depth)
            }
        };
        found.push(Contact::new(deepest, normal, depth, o1.id, o2.id));
    }

    keep_deepest(&mut found, contacts.len());
    emit(&found, contacts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrowphase::test_util::run;
    use glam::Mat3;
    use std::f32::consts::FRAC_PI_4;

    fn cube() -> Shape {
        Shape::convex(ConvexHull::cuboid(Vec3::splat(0.5)))
    }

    #[test]
    fn test_convex_sphere_face() {
        let sphere = Shape::sphere(0.5).unwrap();
        let contacts = run(
            collide_convex_sphere,
            &cube(),
            Pose::IDENTITY,
            &sphere,
            Pose::from_position(Vec3::new(0.9, 0.1, 0.0)),
            1,
        );
        assert_eq!(contacts.len(), 1);
        let eps = 1e-4;
        assert!((contacts[0].depth - 0.1).abs() < eps);
        assert!((contacts[0].normal - Vec3::NEG_X).length() < eps);
        assert!((contacts[0].position - Vec3::new(0.5, 0.1, 0.0)).length() < eps);
    }

    #[test]
    fn test_convex_sphere_edge() {
        let sphere = Shape::sphere(0.5).unwrap();
        let contacts = run(
            collide_convex_sphere,
            &cube(),
            Pose::IDENTITY,
            &sphere,
            Pose::from_position(Vec3::new(0.8, 0.8, 0.0)),
            1,
        );
        assert_eq!(contacts.len(), 1);
        let eps = 1e-4;
        let expected = 0.5 - 0.3 * std::f32::consts::SQRT_2;
        assert!((contacts[0].depth - expected).abs() < eps);
        assert!((contacts[0].normal - Vec3::new(-1.0, -1.0, 0.0).normalize()).length() < eps);
    }

    #[test]
    fn test_convex_sphere_center_inside() {
        let sphere = Shape::sphere(0.2).unwrap();
        let contacts = run(
            collide_convex_sphere,
            &cube(),
            Pose::IDENTITY,
            &sphere,
            Pose::from_position(Vec3::new(0.4, 0.0, 0.0)),
            1,
        );
        assert_eq!(contacts.len(), 1);
        let eps = 1e-4;
        assert!((contacts[0].depth - 0.3).abs() < eps);
        assert!((contacts[0].normal - Vec3::NEG_X).length() < eps);
    }

    #[test]
    fn test_convex_sphere_near_corner_separated() {
        let sphere = Shape::sphere(0.5).unwrap();
        // Inside every face slab margin but too far from the corner.
        let contacts = run(
            collide_convex_sphere,
            &cube(),
            Pose::IDENTITY,
            &sphere,
            Pose::from_position(Vec3::new(0.9, 0.9, 0.9)),
            1,
        );
        assert!(contacts.is_empty());
    }

    #[test]
    fn test_convex_plane_resting() {
        let plane = Shape::plane(Vec3::Y, 0.0).unwrap();
        let contacts = run(
            collide_convex_plane,
            &cube(),
            Pose::from_position(Vec3::new(0.0, 0.4, 0.0)),
            &plane,
            Pose::IDENTITY,
            8,
        );
        assert_eq!(contacts.len(), 4);
        let eps = 1e-4;
        for c in &contacts {
            assert!((c.depth - 0.1).abs() < eps);
            assert!((c.normal - Vec3::Y).length() < eps);
        }
    }

    #[test]
    fn test_convex_convex_face_contact() {
        let contacts = run(
            collide_convex_convex,
            &cube(),
            Pose::from_position(Vec3::new(0.3, 0.9, 0.0)),
            &cube(),
            Pose::IDENTITY,
            8,
        );
        assert_eq!(contacts.len(), 4);
        let eps = 1e-4;
        for c in &contacts {
            assert!((c.depth - 0.1).abs() < eps, "depth {}", c.depth);
            assert!((c.normal - Vec3::Y).length() < eps);
            assert!(c.position.x >= -0.2 - eps && c.position.x <= 0.5 + eps);
        }
    }

    #[test]
    fn test_convex_convex_capacity() {
        let contacts = run(
            collide_convex_convex,
            &cube(),
            Pose::from_position(Vec3::new(0.0, 0.9, 0.0)),
            &cube(),
            Pose::IDENTITY,
            2,
        );
        assert_eq!(contacts.len(), 2);
    }

    #[test]
    fn test_convex_convex_separated() {
        let contacts = run(
            collide_convex_convex,
            &cube(),
            Pose::from_position(Vec3::new(0.0, 1.2, 0.0)),
            &cube(),
            Pose::IDENTITY,
            8,
        );
        assert!(contacts.is_empty());
    }

    #[test]
    fn test_convex_convex_edge_edge() {
        // Bottom edge of the upper cube along Z, top edge of the lower cube along X.
        let upper = Pose::new(Vec3::new(0.0, 1.3142, 0.0), Mat3::from_rotation_z(FRAC_PI_4));
        let lower = Pose::new(Vec3::ZERO, Mat3::from_rotation_x(FRAC_PI_4));
        let contacts = run(collide_convex_convex, &cube(), upper, &cube(), lower, 4);
        assert_eq!(contacts.len(), 1);
        let eps = 1e-3;
        assert!((contacts[0].depth - 0.1).abs() < eps, "depth {}", contacts[0].depth);
        assert!((contacts[0].normal - Vec3::Y).length() < eps);
        assert!((contacts[0].position - Vec3::new(0.0, 0.6571, 0.0)).length() < eps);
    }

    #[test]
    fn test_convex_convex_edge_edge_swapped() {
        let upper = Pose::new(Vec3::new(0.0, 1.3142, 0.0), Mat3::from_rotation_z(FRAC_PI_4));
        let lower = Pose::new(Vec3::ZERO, Mat3::from_rotation_x(FRAC_PI_4));
        let contacts = run(collide_convex_convex, &cube(), lower, &cube(), upper, 4);
        assert_eq!(contacts.len(), 1);
        let eps = 1e-3;
        assert!((contacts[0].depth - 0.1).abs() < eps, "depth {}", contacts[0].depth);
        assert!((contacts[0].normal - Vec3::NEG_Y).length() < eps);
        assert!((contacts[0].position - Vec3::new(0.0, 0.6571, 0.0)).length() < eps);
    }

    #[test]
    fn test_extremal_edges_follow_support_vertices() {
        let hull = ConvexHull::cuboid(Vec3::splat(0.5));
        let world = WorldHull::new(&hull, &Pose::IDENTITY);

        // A single corner: its three edges.
        let corner = world.extremal_edges(&Pose::IDENTITY, &[Vec3::ONE.normalize()]);
        assert_eq!(corner.len(), 3);
        for &e in &corner {
            let (a, b) = hull.edges[e];
            assert!(a == 7 || b == 7, "edge {e} misses the corner");
        }

        // A whole face ties: its rim plus the four side edges.
        let face = world.extremal_edges(&Pose::IDENTITY, &[Vec3::Y]);
        assert_eq!(face.len(), 8);

        assert!(world.extremal_edges(&Pose::IDENTITY, &[Vec3::ZERO]).is_empty());
    }

    #[test]
    fn test_climb_reaches_support() {
        let hull = ConvexHull::cuboid(Vec3::new(0.5, 1.0, 1.5));
        let pose = Pose::new(
            Vec3::new(1.0, -2.0, 0.5),
            Mat3::from_rotation_x(0.3) * Mat3::from_rotation_y(1.1),
        );
        let world = WorldHull::new(&hull, &pose);
        let dirs = [
            Vec3::X,
            Vec3::NEG_Y,
            Vec3::new(0.3, -0.7, 0.2).normalize(),
            Vec3::new(-1.0, 1.0, 1.0).normalize(),
        ];
        for dir in dirs {
            for start in 0..hull.points.len() {
                let top = world.climb(dir, start);
                let best = world
                    .points
                    .iter()
                    .map(|p| p.dot(dir))
                    .fold(f32::NEG_INFINITY, f32::max);
                assert!(
                    (world.points[top].dot(dir) - best).abs() < 1e-5,
                    "climb from {start} along {dir:?} stopped short"
                );
            }
        }
    }
}
