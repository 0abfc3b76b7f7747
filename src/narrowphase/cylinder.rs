//! Cylinder colliders with closed forms, and a separating-axis box test.
//! Cylinder pairs against capsules, cylinders and hulls go through
//! [`super::gjk`].

use std::f32::consts::{PI, TAU};

use glam::{Vec2, Vec3};

use super::util::{clip_polygon, cull_points, emit, keep_deepest};
use super::{shape_params, GeomRef};
use crate::contact::Contact;
use crate::math::Pose;
use crate::shape::Shape;

const PARALLEL_EPS: f32 = 1e-6;
/// Shorter candidate axes are skipped.
const MIN_AXIS_LENGTH: f32 = 1e-5;
/// Normals at least this aligned with the axis clip a box face to a cap.
const CAP_ALIGNMENT: f32 = 0.9;
/// Sides of the polygon inscribed in a cap circle for face clipping.
const CAP_SEGMENTS: usize = 16;

/// Box vertex index pairs; bit `k` of an index selects the sign on axis `k`.
const BOX_EDGES: [(usize, usize); 12] = [
    (0, 1),
    (2, 3),
    (4, 5),
    (6, 7),
    (0, 2),
    (1, 3),
    (4, 6),
    (5, 7),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

pub fn collide_cylinder_sphere(
    o1: &GeomRef<'_>,
    o2: &GeomRef<'_>,
    contacts: &mut [Contact],
) -> usize {
    let (radius, length) =
        shape_params!(o1, Shape::Cylinder { radius, length } => (*radius, *length));
    let sphere_radius = shape_params!(o2, Shape::Sphere { radius } => *radius);

    let half = length * 0.5;
    let center = o2.pose.position;
    let local = o1.pose.inverse_transform_point(center);
    let radial = Vec3::new(local.x, local.y, 0.0);
    let radial_len = radial.length();

    if radial_len <= radius && local.z.abs() <= half {
        // Sphere center inside the solid: leave through the side or a cap,
        // whichever is nearer.
        let side_push = radius - radial_len;
        let cap_push = half - local.z.abs();
        let (local_normal, push) = if side_push < cap_push {
            ((-radial).normalize_or(Vec3::NEG_X), side_push)
        } else {
            (Vec3::new(0.0, 0.0, -local.z.signum()), cap_push)
        };
        contacts[0] = Contact::new(
            center,
            o1.pose.transform_vector(local_normal),
            push + sphere_radius,
            o1.id,
            o2.id,
        );
        return 1;
    }

    let clamped_radial = if radial_len > radius {
        radial * (radius / radial_len)
    } else {
        radial
    };
    let closest_local = Vec3::new(
        clamped_radial.x,
        clamped_radial.y,
        local.z.clamp(-half, half),
    );
    let closest = o1.pose.transform_point(closest_local);
    let offset = closest - center;
    let dist = offset.length();
    if dist > sphere_radius {
        return 0;
    }
    let normal = if dist > f32::EPSILON {
        offset / dist
    } else {
        o1.pose.transform_vector(closest_local - local).normalize_or(Vec3::X)
    };
    contacts[0] = Contact::new(closest, normal, sphere_radius - dist, o1.id, o2.id);
    1
}

pub fn collide_cylinder_plane(
    o1: &GeomRef<'_>,
    o2: &GeomRef<'_>,
    contacts: &mut [Contact],
) -> usize {
    let (radius, length) =
        shape_params!(o1, Shape::Cylinder { radius, length } => (*radius, *length));
    let (normal, d) = shape_params!(o2, Shape::Plane { normal, d } => (*normal, *d));

    let axis = o1.pose.axis(2);
    let half = length * 0.5;

    // Rim direction pointing deepest into the plane.
    let down = -normal - axis * axis.dot(-normal);
    let down_len = down.length();

    let mut found = Vec::with_capacity(8);
    for sign in [-1.0f32, 1.0] {
        let cap = o1.pose.position + axis * (sign * half);
        let mut probe = |p: Vec3| {
            let depth = d - normal.dot(p);
            if depth >= 0.0 {
                found.push(Contact::new(p, normal, depth, o1.id, o2.id));
            }
        };
        if down_len > PARALLEL_EPS {
            probe(cap + down * (radius / down_len));
        } else {
            let (u, v) = axis.any_orthonormal_pair();
            for dir in [u, v, -u, -v] {
                probe(cap + dir * radius);
            }
        }
    }
    keep_deepest(&mut found, contacts.len());
    emit(&found, contacts)
}

/// Shallowest overlap found so far. `normal` points from the box into the
/// cylinder; the radii are the two shapes' extents along it.
struct Overlap {
    depth: f32,
    normal: Vec3,
    box_radius: f32,
    cylinder_radius: f32,
}

struct CylinderBox {
    center: Vec3,
    axis: Vec3,
    half: f32,
    radius: f32,
    box_center: Vec3,
    box_axes: [Vec3; 3],
    box_half: Vec3,
}

impl CylinderBox {
    fn cylinder_radius(&self, n: Vec3) -> f32 {
        let c = n.dot(self.axis).clamp(-1.0, 1.0);
        c.abs() * self.half + self.radius * (1.0 - c * c).sqrt()
    }

    fn box_radius(&self, n: Vec3) -> f32 {
        (0..3)
            .map(|k| self.box_axes[k].dot(n).abs() * self.box_half[k])
            .sum()
    }

    fn vertex(&self, i: usize) -> Vec3 {
        let mut v = self.box_center;
        for k in 0..3 {
            let sign = if i & (1 << k) != 0 { 1.0 } else { -1.0 };
            v += self.box_axes[k] * (sign * self.box_half[k]);
        }
        v
    }

    /// False when `axis` separates the pair.
    fn test_axis(&self, axis: Vec3, best: &mut Overlap) -> bool {
        let len = axis.length();
        if len < MIN_AXIS_LENGTH {
            return true;
        }
        let n = axis / len;
        let cylinder_radius = self.cylinder_radius(n);
        let box_radius = self.box_radius(n);
        let d = (self.center - self.box_center).dot(n);
        let depth = cylinder_radius + box_radius - d.abs();
        if depth < 0.0 {
            return false;
        }
        if depth < best.depth {
            *best = Overlap {
                depth,
                normal: if d < 0.0 { -n } else { n },
                box_radius,
                cylinder_radius,
            };
        }
        true
    }

    /// Axis between box edge `a..b` and the rim circle centered at `cap`.
    fn test_edge_rim(&self, cap: Vec3, a: Vec3, b: Vec3, best: &mut Overlap) -> bool {
        let dir = (b - a).normalize_or_zero();
        let along = dir.dot(self.axis);
        if along.abs() < MIN_AXIS_LENGTH {
            return true;
        }
        let hit = a + dir * ((cap - a).dot(self.axis) / along);
        let tangent = (cap - hit).cross(self.axis);
        self.test_axis(tangent.cross(dir), best)
    }

    fn overlap(&self) -> Option<Overlap> {
        let mut best = Overlap {
            depth: f32::INFINITY,
            normal: Vec3::ZERO,
            box_radius: 0.0,
            cylinder_radius: 0.0,
        };

        let mut axes = Vec::with_capacity(15);
        axes.extend(self.box_axes);
        axes.push(self.axis);
        axes.extend(self.box_axes.map(|u| self.axis.cross(u)));
        for i in 0..8 {
            let to_vertex = self.vertex(i) - self.center;
            axes.push(self.axis.cross(self.axis.cross(to_vertex)));
        }
        for axis in axes {
            if !self.test_axis(axis, &mut best) {
                return None;
            }
        }
        for sign in [1.0, -1.0] {
            let cap = self.center + self.axis * (sign * self.half);
            for (a, b) in BOX_EDGES {
                if !self.test_edge_rim(cap, self.vertex(a), self.vertex(b), &mut best) {
                    return None;
                }
            }
        }
        best.depth.is_finite().then_some(best)
    }

    /// The side line of the cylinder nearest the box, clipped to the box.
    fn side_contacts(&self, best: &Overlap) -> Vec<(Vec3, f32)> {
        let n = best.normal;
        let toward_box = -(n - self.axis * n.dot(self.axis)).normalize_or_zero();
        let base = self.center + toward_box * self.radius;
        let mut p0 = base + self.axis * self.half;
        let mut p1 = base - self.axis * self.half;
        for k in 0..3 {
            for sign in [1.0, -1.0] {
                let plane = self.box_axes[k] * sign;
                let offset = self.box_half[k] + plane.dot(self.box_center);
                if !clip_segment(&mut p0, &mut p1, plane, offset) {
                    return Vec::new();
                }
            }
        }
        let depth = |p: Vec3| (best.box_radius - (p - self.box_center).dot(n)).max(0.0);
        if p0.distance_squared(p1) <= PARALLEL_EPS {
            return vec![(p0, depth(p0))];
        }
        vec![(p0, depth(p0)), (p1, depth(p1))]
    }

    /// The box face nearest the cylinder, clipped to the facing cap disc.
    /// Points come back in cylinder-local coordinates.
    fn cap_contacts(&self, best: &Overlap, pose: &Pose) -> Vec<(Vec3, f32)> {
        let n = best.normal;
        let cap_sign = if n.dot(self.axis) > 0.0 { -1.0 } else { 1.0 };

        let mut k = 0;
        for j in 1..3 {
            if self.box_axes[j].dot(n).abs() > self.box_axes[k].dot(n).abs() {
                k = j;
            }
        }
        let face_sign = self.box_axes[k].dot(n).signum();
        let face_center = self.box_center + self.box_axes[k] * (face_sign * self.box_half[k]);
        let u = self.box_axes[(k + 1) % 3] * self.box_half[(k + 1) % 3];
        let v = self.box_axes[(k + 2) % 3] * self.box_half[(k + 2) % 3];
        let face = [
            face_center + u + v,
            face_center - u + v,
            face_center - u - v,
            face_center + u - v,
        ];

        let mut polygon: Vec<Vec3> = face
            .iter()
            .map(|&p| pose.inverse_transform_point(p))
            .collect();
        polygon = clip_polygon(&polygon, Vec3::Z * cap_sign, self.half);
        let inscribed = self.radius * (PI / CAP_SEGMENTS as f32).cos();
        for s in 0..CAP_SEGMENTS {
            if polygon.is_empty() {
                break;
            }
            let (sin, cos) = (s as f32 * TAU / CAP_SEGMENTS as f32).sin_cos();
            polygon = clip_polygon(&polygon, Vec3::new(cos, sin, 0.0), inscribed);
        }

        polygon
            .into_iter()
            .filter_map(|local| {
                let depth = best.cylinder_radius + (pose.transform_point(local) - self.center).dot(n);
                (depth > 0.0).then_some((local, depth))
            })
            .collect()
    }
}

/// Clip segment `p0..p1` to `plane . x <= offset`. False when nothing is left.
fn clip_segment(p0: &mut Vec3, p1: &mut Vec3, plane: Vec3, offset: f32) -> bool {
    let d0 = plane.dot(*p0) - offset;
    let d1 = plane.dot(*p1) - offset;
    if d0 > 0.0 && d1 > 0.0 {
        return false;
    }
    if d0 > 0.0 {
        *p0 += (*p1 - *p0) * (d0 / (d0 - d1));
    } else if d1 > 0.0 {
        *p1 += (*p0 - *p1) * (d1 / (d1 - d0));
    }
    true
}

/// Cylinder against box by separating axes over the box faces, the cylinder
/// axis, their cross products, the radial directions to the box corners and
/// the box edges against both rims. Normals near the cylinder axis clip the
/// nearest box face to the cap disc; others clip the nearest side line of the
/// cylinder to the box.
pub fn collide_cylinder_box(
    o1: &GeomRef<'_>,
    o2: &GeomRef<'_>,
    contacts: &mut [Contact],
) -> usize {
    let (radius, length) =
        shape_params!(o1, Shape::Cylinder { radius, length } => (*radius, *length));
    let sides = shape_params!(o2, Shape::Box { sides } => *sides);
    if contacts.is_empty() {
        return 0;
    }

    let pair = CylinderBox {
        center: o1.pose.position,
        axis: o1.pose.axis(2),
        half: length * 0.5,
        radius,
        box_center: o2.pose.position,
        box_axes: [o2.pose.axis(0), o2.pose.axis(1), o2.pose.axis(2)],
        box_half: sides * 0.5,
    };
    let Some(best) = pair.overlap() else {
        return 0;
    };
    let normal = best.normal;

    if normal.dot(pair.axis).abs() < CAP_ALIGNMENT {
        let mut found: Vec<Contact> = pair
            .side_contacts(&best)
            .into_iter()
            .map(|(p, depth)| Contact::new(p, normal, depth, o1.id, o2.id))
            .collect();
        keep_deepest(&mut found, contacts.len());
        return emit(&found, contacts);
    }

    let clipped = pair.cap_contacts(&best, &o1.pose);
    let mut chosen: Vec<usize> = (0..clipped.len()).collect();
    if clipped.len() > contacts.len() {
        let mut deepest = 0;
        for (i, (_, depth)) in clipped.iter().enumerate() {
            if *depth > clipped[deepest].1 {
                deepest = i;
            }
        }
        let planar: Vec<Vec2> = clipped.iter().map(|(p, _)| p.truncate()).collect();
        chosen = cull_points(&planar, contacts.len(), deepest);
    }
    let found: Vec<Contact> = chosen
        .into_iter()
        .map(|i| {
            let (local, depth) = clipped[i];
            Contact::new(o1.pose.transform_point(local), normal, depth, o1.id, o2.id)
        })
        .collect();
    emit(&found, contacts)
}
