//! GJK intersection test and EPA penetration depth over support mappings.
//!
//! Used for convex pairs without a closed-form collider: cylinder against
//! capsule, cylinder and convex, and convex against box and capsule.
//! Produces a single contact at the midpoint of the two witness points.

use glam::Vec3;

use super::GeomRef;
use crate::contact::Contact;
use crate::math::Pose;
use crate::shape::Shape;

const EPA_TOLERANCE: f32 = 1e-4;
const MAX_GJK_ITERATIONS: usize = 64;
const MAX_EPA_ITERATIONS: usize = 64;
const DEGENERATE_EPS: f32 = 1e-10;

/// Farthest point of a placed shape along `direction`. Shapes without a
/// bounded convex volume return their origin.
pub fn support(shape: &Shape, pose: &Pose, direction: Vec3) -> Vec3 {
    let local_dir = pose.inverse_transform_vector(direction);
    let local_point = match shape {
        Shape::Sphere { radius } => local_dir.normalize_or_zero() * *radius,
        Shape::Box { sides } => {
            let half = *sides * 0.5;
            Vec3::new(
                if local_dir.x >= 0.0 { half.x } else { -half.x },
                if local_dir.y >= 0.0 { half.y } else { -half.y },
                if local_dir.z >= 0.0 { half.z } else { -half.z },
            )
        }
        Shape::Capsule { radius, length } => {
            let half = length * 0.5;
            let tip = if local_dir.z >= 0.0 { half } else { -half };
            Vec3::new(0.0, 0.0, tip) + local_dir.normalize_or_zero() * *radius
        }
        Shape::Cylinder { radius, length } => {
            let radial = Vec3::new(local_dir.x, local_dir.y, 0.0);
            let len = radial.length();
            let rim = if len > 1e-12 {
                radial * (*radius / len)
            } else {
                Vec3::ZERO
            };
            let half = length * 0.5;
            rim + Vec3::new(0.0, 0.0, if local_dir.z >= 0.0 { half } else { -half })
        }
        Shape::Convex(hull) => hull.support(local_dir),
        _ => Vec3::ZERO,
    };
    pose.transform_point(local_point)
}

/// Vertex of the Minkowski difference `A - B`, remembering the point on `A`.
#[derive(Debug, Clone, Copy)]
struct SupportPoint {
    point: Vec3,
    on_a: Vec3,
}

impl SupportPoint {
    fn on_b(&self) -> Vec3 {
        self.on_a - self.point
    }
}

struct Pair<'a> {
    a: &'a GeomRef<'a>,
    b: &'a GeomRef<'a>,
}

impl Pair<'_> {
    fn support(&self, direction: Vec3) -> SupportPoint {
        let on_a = support(self.a.shape, &self.a.pose, direction);
        let on_b = support(self.b.shape, &self.b.pose, -direction);
        SupportPoint {
            point: on_a - on_b,
            on_a,
        }
    }
}

/// Point of segment `ab` nearest the origin, with the vertices of the
/// feature it lies on as a bit mask over `(a, b)`.
fn nearest_on_segment(a: Vec3, b: Vec3) -> (Vec3, u8) {
    let ab = b - a;
    let len2 = ab.length_squared();
    let t = if len2 > DEGENERATE_EPS {
        -a.dot(ab) / len2
    } else {
        0.0
    };
    if t <= 0.0 {
        (a, 0b01)
    } else if t >= 1.0 {
        (b, 0b10)
    } else {
        (a + ab * t, 0b11)
    }
}

/// Point of triangle `abc` nearest the origin, with the vertices of the
/// feature it lies on as a bit mask over `(a, b, c)`.
fn nearest_on_triangle(a: Vec3, b: Vec3, c: Vec3) -> (Vec3, u8) {
    let ab = b - a;
    let ac = c - a;

    let (a_ab, a_ac) = (-a.dot(ab), -a.dot(ac));
    if a_ab <= 0.0 && a_ac <= 0.0 {
        return (a, 0b001);
    }
    let (b_ab, b_ac) = (-b.dot(ab), -b.dot(ac));
    if b_ab >= 0.0 && b_ac <= b_ab {
        return (b, 0b010);
    }
    let (c_ab, c_ac) = (-c.dot(ab), -c.dot(ac));
    if c_ac >= 0.0 && c_ab <= c_ac {
        return (c, 0b100);
    }

    // Signed areas opposite each vertex, seen from the origin.
    let area_c = a_ab * b_ac - b_ab * a_ac;
    let area_b = c_ab * a_ac - a_ab * c_ac;
    let area_a = b_ab * c_ac - c_ab * b_ac;

    if area_c <= 0.0 && a_ab >= 0.0 && b_ab <= 0.0 {
        return (a + ab * (a_ab / (a_ab - b_ab)), 0b011);
    }
    if area_b <= 0.0 && a_ac >= 0.0 && c_ac <= 0.0 {
        return (a + ac * (a_ac / (a_ac - c_ac)), 0b101);
    }
    let (to_c, from_b) = (b_ac - b_ab, c_ab - c_ac);
    if area_a <= 0.0 && to_c >= 0.0 && from_b >= 0.0 {
        return (b + (c - b) * (to_c / (to_c + from_b)), 0b110);
    }

    let total = area_a + area_b + area_c;
    if total.abs() <= DEGENERATE_EPS {
        // Collinear: the nearest of the three edges.
        let edges = [
            (nearest_on_segment(a, b), [0b001, 0b010]),
            (nearest_on_segment(a, c), [0b001, 0b100]),
            (nearest_on_segment(b, c), [0b010, 0b100]),
        ];
        let mut best = (a, 0b001);
        for ((point, mask), bits) in edges {
            if point.length_squared() < best.0.length_squared() {
                let first = if mask & 0b01 != 0 { bits[0] } else { 0 };
                let second = if mask & 0b10 != 0 { bits[1] } else { 0 };
                best = (point, first | second);
            }
        }
        return best;
    }
    let v = area_b / total;
    let w = area_c / total;
    (a + ab * v + ac * w, 0b111)
}

/// Faces of a tetrahedron with the vertex each one leaves out.
const TETRA_FACES: [([usize; 3], usize); 4] = [
    ([0, 1, 2], 3),
    ([0, 1, 3], 2),
    ([0, 2, 3], 1),
    ([1, 2, 3], 0),
];

/// Point of tetrahedron `p` nearest the origin and its feature mask, or
/// `None` when the origin is inside.
fn nearest_on_tetrahedron(p: [Vec3; 4]) -> Option<(Vec3, u8)> {
    let mut best: Option<(Vec3, u8)> = None;
    for ([i, j, k], opposite) in TETRA_FACES {
        let normal = (p[j] - p[i]).cross(p[k] - p[i]);
        let origin_side = -p[i].dot(normal);
        let vertex_side = (p[opposite] - p[i]).dot(normal);
        let flat = vertex_side.abs() <= DEGENERATE_EPS;
        if !flat && origin_side * vertex_side >= 0.0 {
            continue;
        }
        let (point, mask) = nearest_on_triangle(p[i], p[j], p[k]);
        if best.map_or(true, |(q, _)| point.length_squared() < q.length_squared()) {
            let mut full = 0;
            for (bit, index) in [i, j, k].into_iter().enumerate() {
                if mask & (1 << bit) != 0 {
                    full |= 1 << index;
                }
            }
            best = Some((point, full));
        }
    }
    best
}

/// Up to four Minkowski vertices spanning the current GJK feature.
#[derive(Debug, Clone)]
struct Simplex {
    points: Vec<SupportPoint>,
}

impl Simplex {
    /// Shrink to the feature nearest the origin and return the nearest
    /// point. `None` means the simplex encloses the origin.
    fn reduce(&mut self) -> Option<Vec3> {
        let p: Vec<Vec3> = self.points.iter().map(|s| s.point).collect();
        let (nearest, mask) = match p.len() {
            1 => (p[0], 0b1),
            2 => nearest_on_segment(p[0], p[1]),
            3 => nearest_on_triangle(p[0], p[1], p[2]),
            _ => nearest_on_tetrahedron([p[0], p[1], p[2], p[3]])?,
        };
        let mut bit = 0;
        self.points.retain(|_| {
            let keep = mask & (1 << bit) != 0;
            bit += 1;
            keep
        });
        Some(nearest)
    }
}

/// GJK: walk the Minkowski difference toward the origin. Returns the final
/// simplex when the shapes overlap.
fn gjk_intersection(pair: &Pair<'_>) -> Option<Simplex> {
    let mut direction = pair.a.pose.position - pair.b.pose.position;
    if direction.length_squared() < DEGENERATE_EPS {
        direction = Vec3::X;
    }
    let first = pair.support(direction);
    let mut simplex = Simplex {
        points: Vec::with_capacity(4),
    };
    simplex.points.push(first);
    let mut nearest = first.point;

    for _ in 0..MAX_GJK_ITERATIONS {
        if nearest.length_squared() < DEGENERATE_EPS {
            return Some(simplex);
        }
        let next = pair.support(-nearest);
        if next.point.dot(nearest) > 0.0 {
            // The support plane toward the origin stops short of it.
            return None;
        }
        simplex.points.push(next);
        match simplex.reduce() {
            Some(point) => nearest = point,
            None => return Some(simplex),
        }
    }
    None
}

/// Grow a degenerate simplex into a tetrahedron by sampling the support
/// mapping in directions orthogonal to what it already spans.
fn complete_tetrahedron(points: &mut Vec<SupportPoint>, pair: &Pair<'_>) -> bool {
    const SPREAD_EPS: f32 = 1e-8;

    if points.len() == 1 {
        let origin = points[0].point;
        for dir in [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z] {
            let p = pair.support(dir);
            if (p.point - origin).length_squared() > SPREAD_EPS {
                points.push(p);
                break;
            }
        }
    }
    if points.len() == 2 {
        let line = points[1].point - points[0].point;
        let (u, v) = line.normalize_or(Vec3::X).any_orthonormal_pair();
        for dir in [u, -u, v, -v] {
            let p = pair.support(dir);
            if (p.point - points[0].point).cross(line).length_squared()
                > SPREAD_EPS * line.length_squared()
            {
                points.push(p);
                break;
            }
        }
    }
    if points.len() == 3 {
        let normal = (points[1].point - points[0].point)
            .cross(points[2].point - points[0].point)
            .normalize_or_zero();
        if normal == Vec3::ZERO {
            return false;
        }
        for dir in [normal, -normal] {
            let p = pair.support(dir);
            if (p.point - points[0].point).dot(normal).abs() > SPREAD_EPS.sqrt() {
                points.push(p);
                break;
            }
        }
    }
    points.len() == 4
}

/// Barycentric coordinates of `p` projected onto triangle `(a, b, c)`.
fn barycentric(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> (f32, f32, f32) {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let d00 = v0.dot(v0);
    let d01 = v0.dot(v1);
    let d11 = v1.dot(v1);
    let d20 = v2.dot(v0);
    let d21 = v2.dot(v1);
    let denom = d00 * d11 - d01 * d01;
    if denom.abs() < DEGENERATE_EPS {
        return (1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0);
    }
    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    (1.0 - v - w, v, w)
}

/// Outward triangle of the EPA polytope with its plane cached.
#[derive(Debug, Clone, Copy)]
struct Face {
    vertices: [usize; 3],
    normal: Vec3,
    distance: f32,
}

/// Convex polytope inside the Minkowski difference, grown toward its
/// boundary one support point at a time.
struct Polytope {
    vertices: Vec<SupportPoint>,
    faces: Vec<Face>,
}

impl Polytope {
    fn from_tetrahedron(vertices: Vec<SupportPoint>) -> Self {
        let interior = vertices.iter().map(|v| v.point).sum::<Vec3>() / 4.0;
        let mut polytope = Self {
            vertices,
            faces: Vec::new(),
        };
        for (face, _) in TETRA_FACES {
            polytope.add_face(face, interior);
        }
        polytope
    }

    /// Add a face wound away from `interior`. Degenerate faces are dropped.
    fn add_face(&mut self, [i, j, k]: [usize; 3], interior: Vec3) {
        let a = self.vertices[i].point;
        let normal = (self.vertices[j].point - a).cross(self.vertices[k].point - a);
        let len = normal.length();
        if len < DEGENERATE_EPS {
            return;
        }
        let (vertices, normal) = if normal.dot(a - interior) < 0.0 {
            ([i, k, j], -normal / len)
        } else {
            ([i, j, k], normal / len)
        };
        self.faces.push(Face {
            vertices,
            normal,
            distance: normal.dot(a),
        });
    }

    fn nearest_face(&self) -> Option<Face> {
        self.faces
            .iter()
            .copied()
            .min_by(|f, g| f.distance.total_cmp(&g.distance))
    }

    /// Replace every face that sees `point` with a fan from `point` to the
    /// hole's rim.
    fn expand(&mut self, point: SupportPoint, interior: Vec3) {
        let apex = self.vertices.len();
        self.vertices.push(point);

        // Rim edges are those owned by exactly one removed face.
        let mut rim: Vec<(usize, usize)> = Vec::new();
        self.faces.retain(|face| {
            let visible = face.normal.dot(point.point) > face.distance;
            if visible {
                let [a, b, c] = face.vertices;
                for (from, to) in [(a, b), (b, c), (c, a)] {
                    match rim.iter().position(|&edge| edge == (to, from)) {
                        Some(shared) => {
                            rim.swap_remove(shared);
                        }
                        None => rim.push((from, to)),
                    }
                }
            }
            !visible
        });
        for (from, to) in rim {
            self.add_face([from, to, apex], interior);
        }
    }
}

/// Penetration found by EPA.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Penetration {
    /// Direction in which `A - B` is shallowest; moving A by `-normal * depth`
    /// separates the shapes.
    pub normal: Vec3,
    pub depth: f32,
    pub point: Vec3,
}

fn epa_penetration(simplex: Simplex, pair: &Pair<'_>) -> Option<Penetration> {
    let mut vertices = simplex.points;
    if vertices.len() < 4 && !complete_tetrahedron(&mut vertices, pair) {
        return None;
    }
    let interior = vertices.iter().map(|v| v.point).sum::<Vec3>() / 4.0;
    let mut polytope = Polytope::from_tetrahedron(vertices);

    let mut nearest = polytope.nearest_face()?;
    for _ in 0..MAX_EPA_ITERATIONS {
        let next = pair.support(nearest.normal);
        if next.point.dot(nearest.normal) - nearest.distance < EPA_TOLERANCE {
            break;
        }
        polytope.expand(next, interior);
        match polytope.nearest_face() {
            Some(face) => nearest = face,
            None => break,
        }
    }

    let [a, b, c] = nearest.vertices.map(|i| polytope.vertices[i]);
    let depth = nearest.distance.max(0.0);
    let (u, v, w) = barycentric(nearest.normal * depth, a.point, b.point, c.point);
    let on_a = a.on_a * u + b.on_a * v + c.on_a * w;
    let on_b = a.on_b() * u + b.on_b() * v + c.on_b() * w;
    Some(Penetration {
        normal: nearest.normal,
        depth,
        point: (on_a + on_b) * 0.5,
    })
}

/// Penetration of two placed convex shapes, if they intersect.
pub(crate) fn penetration(a: &GeomRef<'_>, b: &GeomRef<'_>) -> Option<Penetration> {
    let pair = Pair { a, b };
    let simplex = gjk_intersection(&pair)?;
    epa_penetration(simplex, &pair)
}

/// Single-contact collider for any two convex shapes with a support mapping.
pub fn collide_gjk(o1: &GeomRef<'_>, o2: &GeomRef<'_>, contacts: &mut [Contact]) -> usize {
    match penetration(o1, o2) {
        Some(pen) if pen.normal.is_finite() => {
            contacts[0] = Contact::new(pen.point, -pen.normal, pen.depth, o1.id, o2.id);
            1
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrowphase::test_util::{ids, run};
    use crate::shape::ConvexHull;
    use glam::Mat3;

    fn intersects(s1: &Shape, p1: Pose, s2: &Shape, p2: Pose) -> bool {
        let (a, b) = ids();
        let g1 = GeomRef::new(a, s1, p1);
        let g2 = GeomRef::new(b, s2, p2);
        gjk_intersection(&Pair { a: &g1, b: &g2 }).is_some()
    }

    #[test]
    fn test_gjk_spheres_intersecting() {
        let s = Shape::sphere(1.0).unwrap();
        assert!(intersects(
            &s,
            Pose::IDENTITY,
            &s,
            Pose::from_position(Vec3::new(1.0, 0.0, 0.0))
        ));
    }

    #[test]
    fn test_gjk_spheres_not_intersecting() {
        let s = Shape::sphere(1.0).unwrap();
        assert!(!intersects(
            &s,
            Pose::IDENTITY,
            &s,
            Pose::from_position(Vec3::new(5.0, 0.0, 0.0))
        ));
    }

    #[test]
    fn test_support_cylinder_rim() {
        let cyl = Shape::cylinder(1.0, 2.0).unwrap();
        let p = support(&cyl, &Pose::IDENTITY, Vec3::new(1.0, 0.0, -1.0));
        assert!((p - Vec3::new(1.0, 0.0, -1.0)).length() < 1e-6);
        let top = support(&cyl, &Pose::IDENTITY, Vec3::Z);
        assert!((top.z - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_epa_boxes_depth_and_normal() {
        let cube = Shape::cuboid(Vec3::splat(2.0)).unwrap();
        let contacts = run(
            collide_gjk,
            &cube,
            Pose::from_position(Vec3::new(0.3, 1.8, 0.1)),
            &cube,
            Pose::IDENTITY,
            1,
        );
        assert_eq!(contacts.len(), 1);
        let eps = 1e-3;
        assert!((contacts[0].depth - 0.2).abs() < eps, "depth {}", contacts[0].depth);
        assert!((contacts[0].normal - Vec3::Y).length() < eps);
    }

    #[test]
    fn test_cylinder_on_box() {
        let cyl = Shape::cylinder(0.5, 2.0).unwrap();
        let cube = Shape::cuboid(Vec3::splat(2.0)).unwrap();
        let contacts = run(
            collide_gjk,
            &cyl,
            Pose::from_position(Vec3::new(0.2, 0.0, 1.9)),
            &cube,
            Pose::IDENTITY,
            1,
        );
        assert_eq!(contacts.len(), 1);
        let eps = 1e-3;
        assert!((contacts[0].depth - 0.1).abs() < eps, "depth {}", contacts[0].depth);
        assert!((contacts[0].normal - Vec3::Z).length() < eps);
        assert!((contacts[0].position.z - 0.95).abs() < 0.05);
    }

    #[test]
    fn test_cylinders_side_by_side() {
        let cyl = Shape::cylinder(0.5, 2.0).unwrap();
        let contacts = run(
            collide_gjk,
            &cyl,
            Pose::from_position(Vec3::new(0.9, 0.0, 0.0)),
            &cyl,
            Pose::IDENTITY,
            1,
        );
        assert_eq!(contacts.len(), 1);
        assert!((contacts[0].depth - 0.1).abs() < 2e-2, "depth {}", contacts[0].depth);
        assert!(contacts[0].normal.x > 0.95);
    }

    #[test]
    fn test_convex_capsule_separated() {
        let hull = Shape::convex(ConvexHull::cuboid(Vec3::splat(0.5)));
        let capsule = Shape::capsule(0.25, 1.0).unwrap();
        let pose = Pose::new(Vec3::new(2.0, 0.0, 0.0), Mat3::from_rotation_x(0.4));
        let contacts = run(collide_gjk, &hull, Pose::IDENTITY, &capsule, pose, 1);
        assert!(contacts.is_empty());
    }

    #[test]
    fn test_nearest_on_triangle_features() {
        let eps = 1e-6;
        let (p, mask) = nearest_on_triangle(
            Vec3::new(-1.0, -1.0, 1.0),
            Vec3::new(1.0, -1.0, 1.0),
            Vec3::new(0.0, 1.0, 1.0),
        );
        assert_eq!(mask, 0b111);
        assert!((p - Vec3::Z).length() < eps, "{p:?}");

        let (p, mask) = nearest_on_triangle(
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(2.0, 1.0, 0.0),
            Vec3::new(2.0, -1.0, 0.0),
        );
        assert_eq!(mask, 0b001);
        assert!((p - Vec3::X).length() < eps);

        let (p, mask) = nearest_on_triangle(
            Vec3::new(0.0, 3.0, 0.0),
            Vec3::new(-1.0, 1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
        );
        assert_eq!(mask, 0b110);
        assert!((p - Vec3::Y).length() < eps);

        // Collinear corners fall back to the nearest edge.
        let (p, mask) = nearest_on_triangle(
            Vec3::new(-1.0, 1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(3.0, 1.0, 0.0),
        );
        assert_eq!(mask, 0b011);
        assert!((p - Vec3::Y).length() < eps);
    }

    #[test]
    fn test_nearest_on_tetrahedron() {
        let corners = [
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(1.0, -1.0, -1.0),
            Vec3::new(-1.0, 1.0, -1.0),
            Vec3::new(-1.0, -1.0, 1.0),
        ];
        assert!(nearest_on_tetrahedron(corners).is_none());

        let shifted = corners.map(|c| c + Vec3::new(0.0, 0.0, 3.0));
        let (p, mask) = nearest_on_tetrahedron(shifted).unwrap();
        // The two low corners bound the nearest edge.
        assert_eq!(mask, 0b0110);
        assert!((p - Vec3::new(0.0, 0.0, 2.0)).length() < 1e-6, "{p:?}");
    }

    #[test]
    fn test_gjk_rotated_boxes_near_miss() {
        let cube = Shape::cuboid(Vec3::ONE).unwrap();
        // The tilted cube's corner reaches 0.7071 toward the other one.
        let tilted = Pose::new(
            Vec3::new(1.15, 0.0, 0.0),
            Mat3::from_rotation_z(std::f32::consts::FRAC_PI_4),
        );
        assert!(intersects(&cube, Pose::IDENTITY, &cube, tilted));
        let farther = Pose::new(Vec3::new(1.25, 0.0, 0.0), tilted.rotation);
        assert!(!intersects(&cube, Pose::IDENTITY, &cube, farther));
    }
}
