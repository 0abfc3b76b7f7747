//! Ray casts against the primitive shapes.
//!
//! The ray is always the first geom. A hit reports the intersection point,
//! the surface normal facing the ray and the distance from the ray origin
//! as the depth. Rays starting inside a solid report the exit point with an
//! inward normal unless [`RayFlags::BACKFACE_CULL`] is set.

use glam::Vec3;

use super::{shape_params, GeomRef};
use crate::contact::Contact;
use crate::shape::{Ray, RayFlags, Shape};

const HULL_EPS: f32 = 1e-5;

/// World-space origin and unit direction of a ray geom.
pub(crate) fn ray_frame(geom: &GeomRef<'_>) -> (Vec3, Vec3) {
    (geom.pose.position, geom.pose.axis(2))
}

struct Hit {
    position: Vec3,
    normal: Vec3,
    distance: f32,
}

impl Hit {
    fn write(self, o1: &GeomRef<'_>, o2: &GeomRef<'_>, contacts: &mut [Contact]) -> usize {
        contacts[0] = Contact::new(self.position, self.normal, self.distance, o1.id, o2.id);
        1
    }
}

/// Intersect with a sphere. `exit` selects the far intersection when the
/// ray starts outside.
fn ray_sphere(
    start: Vec3,
    dir: Vec3,
    length: f32,
    center: Vec3,
    radius: f32,
    exit: bool,
) -> Option<Hit> {
    let q = start - center;
    let b = q.dot(dir);
    let c = q.length_squared() - radius * radius;
    let k = b * b - c;
    if k < 0.0 {
        return None;
    }
    let k = k.sqrt();
    let (alpha, nsign) = if exit && c >= 0.0 {
        (-b + k, -1.0)
    } else {
        let alpha = -b - k;
        if alpha < 0.0 {
            (-b + k, -1.0)
        } else {
            (alpha, 1.0)
        }
    };
    if alpha < 0.0 || alpha > length {
        return None;
    }
    let position = start + dir * alpha;
    Some(Hit {
        position,
        normal: (position - center).normalize_or(-dir) * nsign,
        distance: alpha,
    })
}

pub fn collide_ray_sphere(o1: &GeomRef<'_>, o2: &GeomRef<'_>, contacts: &mut [Contact]) -> usize {
    let ray = shape_params!(o1, Shape::Ray(ray) => *ray);
    let radius = shape_params!(o2, Shape::Sphere { radius } => *radius);
    let (start, dir) = ray_frame(o1);
    let center = o2.pose.position;

    if ray.flags.contains(RayFlags::BACKFACE_CULL)
        && (start - center).length_squared() < radius * radius
    {
        return 0;
    }
    match ray_sphere(start, dir, ray.length, center, radius, false) {
        Some(hit) => hit.write(o1, o2, contacts),
        None => 0,
    }
}

pub fn collide_ray_box(o1: &GeomRef<'_>, o2: &GeomRef<'_>, contacts: &mut [Contact]) -> usize {
    let ray = shape_params!(o1, Shape::Ray(ray) => *ray);
    let half = shape_params!(o2, Shape::Box { sides } => *sides * 0.5);
    let (start, dir) = ray_frame(o1);

    let mut s = o2.pose.inverse_transform_point(start);
    let mut v = o2.pose.inverse_transform_vector(dir);

    if ray.flags.contains(RayFlags::BACKFACE_CULL) && s.abs().cmple(half).all() {
        return 0;
    }

    // Mirror so every direction component is non-negative.
    let mut sign = Vec3::ZERO;
    for i in 0..3 {
        if v[i] < 0.0 {
            s[i] = -s[i];
            v[i] = -v[i];
            sign[i] = 1.0;
        } else {
            sign[i] = -1.0;
        }
    }

    for i in 0..3 {
        if (s[i] < -half[i] && v[i] <= 0.0) || s[i] > half[i] {
            return 0;
        }
    }
    if v == Vec3::ZERO {
        return 0;
    }

    let mut lo = f32::NEG_INFINITY;
    let mut hi = f32::INFINITY;
    let (mut nlo, mut nhi) = (0, 0);
    for i in 0..3 {
        if v[i] != 0.0 {
            let k = (-half[i] - s[i]) / v[i];
            if k > lo {
                lo = k;
                nlo = i;
            }
            let k = (half[i] - s[i]) / v[i];
            if k < hi {
                hi = k;
                nhi = i;
            }
        }
    }
    if lo > hi {
        return 0;
    }
    let (alpha, n) = if lo >= 0.0 { (lo, nlo) } else { (hi, nhi) };
    if alpha < 0.0 || alpha > ray.length {
        return 0;
    }
    Hit {
        position: start + dir * alpha,
        normal: o2.pose.axis(n) * sign[n],
        distance: alpha,
    }
    .write(o1, o2, contacts)
}

pub fn collide_ray_capsule(o1: &GeomRef<'_>, o2: &GeomRef<'_>, contacts: &mut [Contact]) -> usize {
    let ray = shape_params!(o1, Shape::Ray(ray) => *ray);
    let (radius, length) =
        shape_params!(o2, Shape::Capsule { radius, length } => (*radius, *length));
    let (start, dir) = ray_frame(o1);
    let center = o2.pose.position;
    let axis = o2.pose.axis(2);
    let half = length * 0.5;
    let r2 = radius * radius;

    let cs = start - center;
    // Ray start position along the capsule axis.
    let mut k = axis.dot(cs);
    let q = axis * k - cs;
    let c = q.length_squared() - r2;

    // c < 0: start lies within the infinite cylinder.
    let mut inside = false;
    if c < 0.0 {
        let clamped = k.clamp(-half, half);
        inside = (start - (center + axis * clamped)).length_squared() < r2;
        k = clamped;
    }

    if inside && ray.flags.contains(RayFlags::BACKFACE_CULL) {
        return 0;
    }

    if !inside && c < 0.0 {
        // Outside the capsule but inside the infinite cylinder: only the caps
        // can be hit.
        k = if k < 0.0 { -half } else { half };
    } else {
        let uv = axis.dot(dir);
        let r = axis * uv - dir;
        let a = r.length_squared();
        let b = 2.0 * q.dot(r);
        let disc = b * b - 4.0 * a * c;
        if disc < 0.0 || a <= f32::EPSILON {
            // Parallel to the axis or missing the infinite cylinder.
            if !inside {
                return 0;
            }
            k = if uv < 0.0 { -half } else { half };
        } else {
            let root = disc.sqrt();
            let inv = 1.0 / (2.0 * a);
            let mut alpha = (-b - root) * inv;
            if alpha < 0.0 {
                alpha = (-b + root) * inv;
                if alpha < 0.0 {
                    return 0;
                }
            }
            if alpha > ray.length {
                return 0;
            }
            let position = start + dir * alpha;
            let along = (position - center).dot(axis);
            if (-half..=half).contains(&along) {
                let nsign = if inside { -1.0 } else { 1.0 };
                let normal = (position - (center + axis * along)).normalize_or(-dir) * nsign;
                return Hit {
                    position,
                    normal,
                    distance: alpha,
                }
                .write(o1, o2, contacts);
            }
            k = if along < 0.0 { -half } else { half };
        }
    }

    match ray_sphere(start, dir, ray.length, center + axis * k, radius, inside) {
        Some(hit) => hit.write(o1, o2, contacts),
        None => 0,
    }
}

pub fn collide_ray_cylinder(
    o1: &GeomRef<'_>,
    o2: &GeomRef<'_>,
    contacts: &mut [Contact],
) -> usize {
    let ray = shape_params!(o1, Shape::Ray(ray) => *ray);
    let (radius, length) =
        shape_params!(o2, Shape::Cylinder { radius, length } => (*radius, *length));
    let (start, dir) = ray_frame(o1);
    let half = length * 0.5;
    let r2 = radius * radius;

    let s = o2.pose.inverse_transform_point(start);
    let v = o2.pose.inverse_transform_vector(dir);
    let inside = s.x * s.x + s.y * s.y < r2 && s.z.abs() < half;
    if inside && ray.flags.contains(RayFlags::BACKFACE_CULL) {
        return 0;
    }

    let mut best: Option<(f32, Vec3)> = None;
    let mut consider = |t: f32, local_normal: Vec3| {
        if (0.0..=ray.length).contains(&t) && best.map_or(true, |(bt, _)| t < bt) {
            best = Some((t, local_normal));
        }
    };

    // Curved side.
    let a = v.x * v.x + v.y * v.y;
    if a > f32::EPSILON {
        let b = 2.0 * (s.x * v.x + s.y * v.y);
        let c = s.x * s.x + s.y * s.y - r2;
        let disc = b * b - 4.0 * a * c;
        if disc >= 0.0 {
            let root = disc.sqrt();
            for t in [(-b - root) / (2.0 * a), (-b + root) / (2.0 * a)] {
                let p = s + v * t;
                if p.z.abs() <= half {
                    consider(t, Vec3::new(p.x, p.y, 0.0) / radius);
                }
            }
        }
    }

    // Caps.
    if v.z.abs() > f32::EPSILON {
        for z in [-half, half] {
            let t = (z - s.z) / v.z;
            let p = s + v * t;
            if p.x * p.x + p.y * p.y <= r2 {
                consider(t, Vec3::new(0.0, 0.0, z.signum()));
            }
        }
    }

    let Some((alpha, local_normal)) = best else {
        return 0;
    };
    let nsign = if inside { -1.0 } else { 1.0 };
    Hit {
        position: start + dir * alpha,
        normal: o2.pose.transform_vector(local_normal).normalize_or(-dir) * nsign,
        distance: alpha,
    }
    .write(o1, o2, contacts)
}

pub fn collide_ray_plane(o1: &GeomRef<'_>, o2: &GeomRef<'_>, contacts: &mut [Contact]) -> usize {
    let ray = shape_params!(o1, Shape::Ray(ray) => *ray);
    let (normal, d) = shape_params!(o2, Shape::Plane { normal, d } => (*normal, *d));
    let (start, dir) = ray_frame(o1);

    let alpha = d - normal.dot(start);
    // alpha > 0: start is below the plane
    let nsign = if alpha > 0.0 { -1.0 } else { 1.0 };
    let k = normal.dot(dir);
    if k == 0.0 {
        return 0;
    }
    let alpha = alpha / k;
    if alpha < 0.0 || alpha > ray.length {
        return 0;
    }
    Hit {
        position: start + dir * alpha,
        normal: normal * nsign,
        distance: alpha,
    }
    .write(o1, o2, contacts)
}

pub fn collide_ray_convex(o1: &GeomRef<'_>, o2: &GeomRef<'_>, contacts: &mut [Contact]) -> usize {
    let ray: Ray = shape_params!(o1, Shape::Ray(ray) => *ray);
    let hull = shape_params!(o2, Shape::Convex(hull) => hull);
    let (start, dir) = ray_frame(o1);

    let s = o2.pose.inverse_transform_point(start);
    let v = o2.pose.inverse_transform_vector(dir);
    let inside = hull.planes.iter().all(|plane| plane.distance(s) <= 0.0);

    let mut best: Option<(f32, Vec3)> = None;
    if inside {
        if ray.flags.contains(RayFlags::BACKFACE_CULL) {
            return 0;
        }
        // Nearest exit face.
        for plane in &hull.planes {
            let nv = plane.normal.dot(v);
            if nv <= 0.0 {
                continue;
            }
            let alpha = -plane.distance(s) / nv;
            if alpha <= ray.length && best.map_or(true, |(b, _)| alpha < b) {
                best = Some((alpha, -plane.normal));
            }
        }
    } else {
        // Nearest front face whose hit point lies on the hull.
        for (i, plane) in hull.planes.iter().enumerate() {
            let nv = plane.normal.dot(v);
            if nv >= 0.0 {
                continue;
            }
            let alpha = -plane.distance(s) / nv;
            if alpha < 0.0 || alpha > ray.length || best.is_some_and(|(b, _)| alpha >= b) {
                continue;
            }
            let p = s + v * alpha;
            let on_hull = hull
                .planes
                .iter()
                .enumerate()
                .all(|(j, other)| j == i || other.distance(p) <= HULL_EPS);
            if on_hull {
                best = Some((alpha, plane.normal));
            }
        }
    }

    let Some((alpha, local_normal)) = best else {
        return 0;
    };
    Hit {
        position: start + dir * alpha,
        normal: o2.pose.transform_vector(local_normal),
        distance: alpha,
    }
    .write(o1, o2, contacts)
}
