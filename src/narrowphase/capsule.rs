//! Capsule colliders. A capsule is a segment along local Z inflated by its
//! radius, so most tests reduce to closest points plus a sphere test.

use glam::Vec3;

use super::boxes::box_box;
use super::util::{closest_segment_points, collide_spheres};
use super::{shape_params, GeomRef};
use crate::contact::Contact;
use crate::math::Pose;
use crate::shape::Shape;

/// Axes closer to parallel than this take the two-contact path.
const PARALLEL_TOLERANCE: f32 = 1e-5;
/// Segment closer to the box than this counts as penetrating it.
const MIN_SEGMENT_DISTANCE: f32 = 1e-6;

/// Endpoints of a capsule's inner segment.
pub(crate) fn segment(pose: &Pose, length: f32) -> (Vec3, Vec3) {
    let half = pose.axis(2) * (length * 0.5);
    (pose.position + half, pose.position - half)
}

/// Closest points between segment `[a, b]` and a solid box.
pub(crate) fn closest_segment_box_points(a: Vec3, b: Vec3, pose: &Pose, half: Vec3) -> (Vec3, Vec3) {
    let la = pose.inverse_transform_point(a);
    let lb = pose.inverse_transform_point(b);
    let dist = |t: f32| {
        let p = la.lerp(lb, t);
        (p - p.clamp(-half, half)).length_squared()
    };
    // Distance to a convex set is convex along a line.
    let (mut lo, mut hi) = (0.0f32, 1.0f32);
    for _ in 0..64 {
        let m1 = lo + (hi - lo) / 3.0;
        let m2 = hi - (hi - lo) / 3.0;
        if dist(m1) <= dist(m2) {
            hi = m2;
        } else {
            lo = m1;
        }
    }
    let t = (lo + hi) * 0.5;
    let p = la.lerp(lb, t);
    (
        pose.transform_point(p),
        pose.transform_point(p.clamp(-half, half)),
    )
}

pub fn collide_capsule_sphere(o1: &GeomRef<'_>, o2: &GeomRef<'_>, contacts: &mut [Contact]) -> usize {
    let (radius, length) = shape_params!(o1, Shape::Capsule { radius, length } => (*radius, *length));
    let sphere_radius = shape_params!(o2, Shape::Sphere { radius } => *radius);

    let axis = o1.pose.axis(2);
    let half = length * 0.5;
    let alpha = axis
        .dot(o2.pose.position - o1.pose.position)
        .clamp(-half, half);
    let p = o1.pose.position + axis * alpha;
    match collide_spheres(p, radius, o2.pose.position, sphere_radius, o1.id, o2.id) {
        Some(c) => {
            contacts[0] = c;
            1
        }
        None => 0,
    }
}

pub fn collide_capsule_box(o1: &GeomRef<'_>, o2: &GeomRef<'_>, contacts: &mut [Contact]) -> usize {
    let (radius, length) = shape_params!(o1, Shape::Capsule { radius, length } => (*radius, *length));
    let sides = shape_params!(o2, Shape::Box { sides } => *sides);

    let (a, b) = segment(&o1.pose, length);
    let (on_segment, on_box) = closest_segment_box_points(a, b, &o2.pose, sides * 0.5);

    if on_segment.distance(on_box) < MIN_SEGMENT_DISTANCE {
        // Axis inside the box: treat the capsule as a box.
        let d = radius * 2.0;
        let capsule_sides = Vec3::new(d, d, length + d);
        let Some(hit) = box_box(
            o2.pose.position,
            &o2.pose.rotation,
            sides,
            o1.pose.position,
            &o1.pose.rotation,
            capsule_sides,
            contacts.len(),
        ) else {
            return 0;
        };
        let mut n = 0;
        for (slot, (position, depth)) in contacts.iter_mut().zip(hit.points) {
            *slot = Contact::new(position, hit.normal, depth, o1.id, o2.id);
            n += 1;
        }
        return n;
    }

    match collide_spheres(on_segment, radius, on_box, 0.0, o1.id, o2.id) {
        Some(c) => {
            contacts[0] = c;
            1
        }
        None => 0,
    }
}

pub fn collide_capsule_capsule(o1: &GeomRef<'_>, o2: &GeomRef<'_>, contacts: &mut [Contact]) -> usize {
    let (r1, l1) = shape_params!(o1, Shape::Capsule { radius, length } => (*radius, *length));
    let (r2, l2) = shape_params!(o2, Shape::Capsule { radius, length } => (*radius, *length));

    let half1 = l1 * 0.5;
    let half2 = l2 * 0.5;
    let pos1 = o1.pose.position;
    let pos2 = o2.pose.position;
    let axis1 = o1.pose.axis(2);
    let mut axis2 = o2.pose.axis(2);

    let a1a2 = axis1.dot(axis2);
    let det = 1.0 - a1a2 * a1a2;
    if det < PARALLEL_TOLERANCE {
        if a1a2 < 0.0 {
            axis2 = -axis2;
        }
        // Overlap of the two segments measured along axis 1.
        let k = axis1.dot(pos1 - pos2);
        let lo = (-half1).max(-half2 - k);
        let hi = half1.min(half2 - k);
        if lo <= hi {
            if contacts.len() >= 2 && lo < hi {
                let first = collide_spheres(
                    pos1 + axis1 * lo,
                    r1,
                    pos2 + axis2 * (lo + k),
                    r2,
                    o1.id,
                    o2.id,
                );
                let second = collide_spheres(
                    pos1 + axis1 * hi,
                    r1,
                    pos2 + axis2 * (hi + k),
                    r2,
                    o1.id,
                    o2.id,
                );
                if let (Some(c1), Some(c2)) = (first, second) {
                    contacts[0] = c1;
                    contacts[1] = c2;
                    return 2;
                }
            }

            let alpha = (lo + hi) * 0.5;
            return match collide_spheres(
                pos1 + axis1 * alpha,
                r1,
                pos2 + axis2 * (alpha + k),
                r2,
                o1.id,
                o2.id,
            ) {
                Some(c) => {
                    contacts[0] = c;
                    1
                }
                None => 0,
            };
        }
    }

    let (a1, a2) = segment(&o1.pose, l1);
    let (b1, b2) = segment(&o2.pose, l2);
    let (p1, p2) = closest_segment_points(a1, a2, b1, b2);
    match collide_spheres(p1, r1, p2, r2, o1.id, o2.id) {
        Some(c) => {
            contacts[0] = c;
            1
        }
        None => 0,
    }
}

pub fn collide_capsule_plane(o1: &GeomRef<'_>, o2: &GeomRef<'_>, contacts: &mut [Contact]) -> usize {
    let (radius, length) = shape_params!(o1, Shape::Capsule { radius, length } => (*radius, *length));
    let (n, d) = shape_params!(o2, Shape::Plane { normal, d } => (*normal, *d));

    let axis = o1.pose.axis(2);
    // Cap furthest along -n first.
    let sign = if n.dot(axis) > 0.0 { -1.0 } else { 1.0 };
    let offset = axis * (length * 0.5 * sign);

    let cap_contact = |p: Vec3| {
        let depth = d - p.dot(n) + radius;
        (depth >= 0.0).then(|| Contact::new(p - n * radius, n, depth, o1.id, o2.id))
    };

    let Some(first) = cap_contact(o1.pose.position + offset) else {
        return 0;
    };
    contacts[0] = first;
    if contacts.len() >= 2 {
        if let Some(second) = cap_contact(o1.pose.position - offset) {
            contacts[1] = second;
            return 2;
        }
    }
    1
}
