//! Geometry helpers shared by the colliders.

use glam::{Vec2, Vec3};

use crate::contact::Contact;
use crate::geom::GeomId;

const POLYGON_CLIP_EPS: f32 = 1e-6;

/// Contact between two spheres, or `None` when they are apart.
///
/// Coincident centers report an arbitrary X normal.
pub(crate) fn collide_spheres(
    p1: Vec3,
    r1: f32,
    p2: Vec3,
    r2: f32,
    g1: GeomId,
    g2: GeomId,
) -> Option<Contact> {
    let d = p1.distance(p2);
    if d > r1 + r2 {
        return None;
    }
    if d <= 0.0 {
        return Some(Contact::new(p1, Vec3::X, r1 + r2, g1, g2));
    }
    let n = (p1 - p2) / d;
    let position = p1 + n * (0.5 * (r2 - r1 - d));
    Some(Contact::new(position, n, r1 + r2 - d, g1, g2))
}

/// Parameters `(alpha, beta)` of the closest points `pa + alpha * ua` and
/// `pb + beta * ub` on two infinite lines with unit directions. Parallel lines
/// return zeros.
pub(crate) fn line_closest_approach(pa: Vec3, ua: Vec3, pb: Vec3, ub: Vec3) -> (f32, f32) {
    let p = pb - pa;
    let uaub = ua.dot(ub);
    let q1 = ua.dot(p);
    let q2 = -ub.dot(p);
    let d = 1.0 - uaub * uaub;
    if d <= 1e-4 {
        return (0.0, 0.0);
    }
    let d = 1.0 / d;
    ((q1 + uaub * q2) * d, (uaub * q1 + q2) * d)
}

/// Closest points between segments `[a1, a2]` and `[b1, b2]`.
pub(crate) fn closest_segment_points(a1: Vec3, a2: Vec3, b1: Vec3, b2: Vec3) -> (Vec3, Vec3) {
    let d1 = a2 - a1;
    let d2 = b2 - b1;
    let r = a1 - b1;
    let a = d1.length_squared();
    let e = d2.length_squared();
    let f = d2.dot(r);
    const EPS: f32 = 1e-12;

    let (s, t) = if a <= EPS && e <= EPS {
        (0.0, 0.0)
    } else if a <= EPS {
        (0.0, (f / e).clamp(0.0, 1.0))
    } else {
        let c = d1.dot(r);
        if e <= EPS {
            ((-c / a).clamp(0.0, 1.0), 0.0)
        } else {
            let b = d1.dot(d2);
            let denom = a * e - b * b;
            let mut s = if denom > EPS {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let mut t = (b * s + f) / e;
            if t < 0.0 {
                t = 0.0;
                s = (-c / a).clamp(0.0, 1.0);
            } else if t > 1.0 {
                t = 1.0;
                s = ((b - c) / a).clamp(0.0, 1.0);
            }
            (s, t)
        }
    };
    (a1 + d1 * s, b1 + d2 * t)
}

/// Clip quadrilateral `quad` against the rectangle `|x| < h.x, |y| < h.y`.
/// Returns at most 8 points.
pub(crate) fn intersect_rect_quad(h: Vec2, quad: &[Vec2; 4]) -> Vec<Vec2> {
    let mut current: Vec<Vec2> = quad.to_vec();
    let mut next: Vec<Vec2> = Vec::with_capacity(8);
    for dir in 0..2 {
        for sign in [-1.0f32, 1.0] {
            next.clear();
            let n = current.len();
            for i in 0..n {
                let p = current[i];
                let q = current[(i + 1) % n];
                let p_in = sign * p[dir] < h[dir];
                if p_in {
                    next.push(p);
                    if next.len() == 8 {
                        return next;
                    }
                }
                if p_in != (sign * q[dir] < h[dir]) {
                    let other = 1 - dir;
                    let mut cut = Vec2::ZERO;
                    cut[other] =
                        p[other] + (q[other] - p[other]) / (q[dir] - p[dir]) * (sign * h[dir] - p[dir]);
                    cut[dir] = sign * h[dir];
                    next.push(cut);
                    if next.len() == 8 {
                        return next;
                    }
                }
            }
            std::mem::swap(&mut current, &mut next);
        }
    }
    current
}

/// Pick `m` of the planar `points` that spread best around their centroid.
/// `first` is always the first index returned.
pub(crate) fn cull_points(points: &[Vec2], m: usize, first: usize) -> Vec<usize> {
    let n = points.len();
    let centroid = match n {
        0 => return Vec::new(),
        1 => points[0],
        2 => (points[0] + points[1]) * 0.5,
        _ => {
            let mut area = 0.0;
            let mut c = Vec2::ZERO;
            for i in 0..n {
                let p = points[i];
                let q = points[(i + 1) % n];
                let cross = p.x * q.y - q.x * p.y;
                area += cross;
                c += (p + q) * cross;
            }
            if area.abs() > f32::EPSILON {
                c / (3.0 * area)
            } else {
                points.iter().sum::<Vec2>() / n as f32
            }
        }
    };

    let angles: Vec<f32> = points
        .iter()
        .map(|p| (p.y - centroid.y).atan2(p.x - centroid.x))
        .collect();

    let two_pi = std::f32::consts::TAU;
    let mut available = vec![true; n];
    available[first] = false;
    let mut chosen = Vec::with_capacity(m);
    chosen.push(first);
    for j in 1..m.min(n) {
        let mut target = j as f32 * (two_pi / m as f32) + angles[first];
        if target > std::f32::consts::PI {
            target -= two_pi;
        }
        let mut best = None;
        let mut best_diff = f32::INFINITY;
        for i in 0..n {
            if !available[i] {
                continue;
            }
            let mut diff = (angles[i] - target).abs();
            if diff > std::f32::consts::PI {
                diff = two_pi - diff;
            }
            if diff < best_diff {
                best_diff = diff;
                best = Some(i);
            }
        }
        if let Some(i) = best {
            available[i] = false;
            chosen.push(i);
        }
    }
    chosen
}

/// Clip `polygon` to the half-space `normal . x <= offset`.
pub(crate) fn clip_polygon(polygon: &[Vec3], normal: Vec3, offset: f32) -> Vec<Vec3> {
    let mut out = Vec::with_capacity(polygon.len() + 1);
    for (k, &a) in polygon.iter().enumerate() {
        let b = polygon[(k + 1) % polygon.len()];
        let da = normal.dot(a) - offset;
        let db = normal.dot(b) - offset;
        if da <= POLYGON_CLIP_EPS {
            out.push(a);
        }
        if (da > POLYGON_CLIP_EPS) != (db > POLYGON_CLIP_EPS) && (da - db).abs() > f32::EPSILON {
            out.push(a + (b - a) * (da / (da - db)));
        }
    }
    out
}

/// Keep the `max` deepest entries of `candidates`, deepest first.
pub(crate) fn keep_deepest(candidates: &mut Vec<Contact>, max: usize) {
    if candidates.len() > max {
        candidates.sort_by(|a, b| b.depth.total_cmp(&a.depth));
        candidates.truncate(max);
    }
}

/// Copy `found` into the front of `out`, returning how many fit.
pub(crate) fn emit(found: &[Contact], out: &mut [Contact]) -> usize {
    let n = found.len().min(out.len());
    out[..n].copy_from_slice(&found[..n]);
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrowphase::test_util::ids;

    #[test]
    fn test_collide_spheres_overlap() {
        let (a, b) = ids();
        let c = collide_spheres(Vec3::ZERO, 1.0, Vec3::new(1.5, 0.0, 0.0), 1.0, a, b).unwrap();
        let eps = 1e-5;
        assert!((c.normal - Vec3::NEG_X).length() < eps);
        assert!((c.depth - 0.5).abs() < eps);
        assert!((c.position - Vec3::new(0.75, 0.0, 0.0)).length() < eps);
    }

    #[test]
    fn test_collide_spheres_apart_and_coincident() {
        let (a, b) = ids();
        assert!(collide_spheres(Vec3::ZERO, 1.0, Vec3::new(3.0, 0.0, 0.0), 1.0, a, b).is_none());
        let c = collide_spheres(Vec3::ONE, 1.0, Vec3::ONE, 0.5, a, b).unwrap();
        assert_eq!(c.normal, Vec3::X);
        assert_eq!(c.depth, 1.5);
    }

    #[test]
    fn test_line_closest_approach() {
        let (alpha, beta) = line_closest_approach(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::X,
            Vec3::new(2.0, 1.0, 3.0),
            Vec3::Z,
        );
        assert!((alpha - 2.0).abs() < 1e-5);
        assert!((beta + 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_closest_segment_points() {
        let (p, q) = closest_segment_points(
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(3.0, 1.0, 0.0),
            Vec3::new(3.0, 2.0, 0.0),
        );
        assert!((p - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-5);
        assert!((q - Vec3::new(3.0, 1.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_intersect_rect_quad_inside() {
        let quad = [
            Vec2::new(-0.5, -0.5),
            Vec2::new(-0.5, 0.5),
            Vec2::new(0.5, 0.5),
            Vec2::new(0.5, -0.5),
        ];
        let out = intersect_rect_quad(Vec2::ONE, &quad);
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn test_intersect_rect_quad_rotated_gives_octagon() {
        let r = 1.3;
        let quad = [
            Vec2::new(r, 0.0),
            Vec2::new(0.0, r),
            Vec2::new(-r, 0.0),
            Vec2::new(0.0, -r),
        ];
        let out = intersect_rect_quad(Vec2::ONE, &quad);
        assert_eq!(out.len(), 8);
        for p in out {
            assert!(p.x.abs() <= 1.0 + 1e-5 && p.y.abs() <= 1.0 + 1e-5);
        }
    }

    #[test]
    fn test_cull_points_spreads() {
        let points: Vec<Vec2> = (0..8)
            .map(|i| {
                let a = i as f32 * std::f32::consts::TAU / 8.0;
                Vec2::new(a.cos(), a.sin())
            })
            .collect();
        let chosen = cull_points(&points, 4, 0);
        assert_eq!(chosen, vec![0, 2, 4, 6]);
    }
}
