//! Box colliders: the 15-axis separating axis test with face clipping, and
//! box against plane.

use glam::{Mat3, Vec2, Vec3};

use super::util::{cull_points, intersect_rect_quad, line_closest_approach};
use super::{shape_params, GeomRef};
use crate::contact::Contact;
use crate::shape::Shape;

/// Edge axes must beat face axes by this factor to be chosen.
const FUDGE_FACTOR: f32 = 1.05;
/// Cross-product axes shorter than this are treated as parallel edges.
const MIN_AXIS_LENGTH: f32 = 1e-6;
/// Maximum contacts box against plane produces.
const MAX_PLANE_CONTACTS: usize = 3;

/// Result of [`box_box`].
#[derive(Debug, Clone)]
pub(crate) struct BoxBoxHit {
    /// Separating axis of least penetration, pointing from box 1 toward box 2.
    pub normal: Vec3,
    pub depth: f32,
    /// 1..=3 face of box 1, 4..=6 face of box 2, 7..=15 edge against edge.
    pub code: usize,
    /// Contact positions with their individual depths.
    pub points: Vec<(Vec3, f32)>,
}

const OTHER_AXES: [(usize, usize); 3] = [(1, 2), (0, 2), (0, 1)];

fn columns(m: &Mat3) -> [Vec3; 3] {
    [m.x_axis, m.y_axis, m.z_axis]
}

/// Collide two oriented boxes given by center, rotation and full side
/// lengths. Returns `None` when a separating axis exists.
pub(crate) fn box_box(
    p1: Vec3,
    r1: &Mat3,
    side1: Vec3,
    p2: Vec3,
    r2: &Mat3,
    side2: Vec3,
    max_contacts: usize,
) -> Option<BoxBoxHit> {
    let p = p2 - p1;
    let pp = r1.transpose() * p;
    let a = side1 * 0.5;
    let b = side2 * 0.5;
    let u = columns(r1);
    let v = columns(r2);

    let mut r = [[0.0f32; 3]; 3];
    let mut q = [[0.0f32; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            r[i][j] = u[i].dot(v[j]);
            q[i][j] = r[i][j].abs();
        }
    }

    let mut s = f32::NEG_INFINITY;
    let mut normal_r: Option<Vec3> = None;
    let mut normal_c = Vec3::ZERO;
    let mut invert = false;
    let mut code = 0;

    // Face normals of box 1.
    for i in 0..3 {
        let expr1 = pp[i];
        let expr2 = a[i] + b[0] * q[i][0] + b[1] * q[i][1] + b[2] * q[i][2];
        let s2 = expr1.abs() - expr2;
        if s2 > 0.0 {
            return None;
        }
        if s2 > s {
            s = s2;
            normal_r = Some(u[i]);
            invert = expr1 < 0.0;
            code = i + 1;
        }
    }

    // Face normals of box 2.
    for j in 0..3 {
        let expr1 = v[j].dot(p);
        let expr2 = a[0] * q[0][j] + a[1] * q[1][j] + a[2] * q[2][j] + b[j];
        let s2 = expr1.abs() - expr2;
        if s2 > 0.0 {
            return None;
        }
        if s2 > s {
            s = s2;
            normal_r = Some(v[j]);
            invert = expr1 < 0.0;
            code = 4 + j;
        }
    }

    // Edge cross products, expressed in box 1 coordinates.
    for i in 0..3 {
        for j in 0..3 {
            let w = Vec3::new(r[0][j], r[1][j], r[2][j]);
            let n = Vec3::AXES[i].cross(w);
            let expr1 = pp.dot(n);
            let (i1, i2) = OTHER_AXES[i];
            let (j1, j2) = OTHER_AXES[j];
            let expr2 =
                a[i1] * q[i2][j] + a[i2] * q[i1][j] + b[j1] * q[i][j2] + b[j2] * q[i][j1];
            let mut s2 = expr1.abs() - expr2;
            if s2 > 0.0 {
                return None;
            }
            let l = n.length();
            if l > MIN_AXIS_LENGTH {
                s2 /= l;
                if s2 * FUDGE_FACTOR > s {
                    s = s2;
                    normal_r = None;
                    normal_c = n / l;
                    invert = expr1 < 0.0;
                    code = 7 + 3 * i + j;
                }
            }
        }
    }

    if code == 0 {
        return None;
    }

    let mut normal = normal_r.unwrap_or(*r1 * normal_c);
    if invert {
        normal = -normal;
    }
    let depth = -s;

    if code > 6 {
        // Edge of box 1 against edge of box 2.
        let mut pa = p1;
        for j in 0..3 {
            let sign = if normal.dot(u[j]) > 0.0 { 1.0 } else { -1.0 };
            pa += u[j] * (sign * a[j]);
        }
        let mut pb = p2;
        for j in 0..3 {
            let sign = if normal.dot(v[j]) > 0.0 { -1.0 } else { 1.0 };
            pb += v[j] * (sign * b[j]);
        }
        let ua = u[(code - 7) / 3];
        let ub = v[(code - 7) % 3];
        let (alpha, beta) = line_closest_approach(pa, ua, pb, ub);
        let position = ((pa + ua * alpha) + (pb + ub * beta)) * 0.5;
        return Some(BoxBoxHit {
            normal,
            depth,
            code,
            points: vec![(position, depth)],
        });
    }

    // Face contact: box "a" owns the reference face, box "b" the incident face.
    let (ra, rb, pa, pb, sa, sb) = if code <= 3 {
        (u, v, p1, p2, a, b)
    } else {
        (v, u, p2, p1, b, a)
    };
    let normal2 = if code <= 3 { normal } else { -normal };
    let nr = Vec3::new(rb[0].dot(normal2), rb[1].dot(normal2), rb[2].dot(normal2));
    let anr = nr.abs();

    let (lanr, a1, a2) = if anr.y > anr.x {
        if anr.y > anr.z {
            (1, 0, 2)
        } else {
            (2, 0, 1)
        }
    } else if anr.x > anr.z {
        (0, 1, 2)
    } else {
        (2, 0, 1)
    };

    // Center of the incident face relative to the reference box.
    let center = if nr[lanr] < 0.0 {
        pb - pa + rb[lanr] * sb[lanr]
    } else {
        pb - pa - rb[lanr] * sb[lanr]
    };

    let code_n = if code <= 3 { code - 1 } else { code - 4 };
    let (code1, code2) = OTHER_AXES[code_n];

    let c1 = center.dot(ra[code1]);
    let c2 = center.dot(ra[code2]);
    let m11 = ra[code1].dot(rb[a1]);
    let m12 = ra[code1].dot(rb[a2]);
    let m21 = ra[code2].dot(rb[a1]);
    let m22 = ra[code2].dot(rb[a2]);

    let k1 = m11 * sb[a1];
    let k2 = m21 * sb[a1];
    let k3 = m12 * sb[a2];
    let k4 = m22 * sb[a2];
    let quad = [
        Vec2::new(c1 - k1 - k3, c2 - k2 - k4),
        Vec2::new(c1 - k1 + k3, c2 - k2 + k4),
        Vec2::new(c1 + k1 + k3, c2 + k2 + k4),
        Vec2::new(c1 + k1 - k3, c2 + k2 - k4),
    ];
    let rect = Vec2::new(sa[code1], sa[code2]);
    let clipped = intersect_rect_quad(rect, &quad);
    if clipped.is_empty() {
        return None;
    }

    let det = 1.0 / (m11 * m22 - m12 * m21);
    if !det.is_finite() {
        return None;
    }
    let (m11, m12, m21, m22) = (m11 * det, m12 * det, m21 * det, m22 * det);

    let mut kept_2d: Vec<Vec2> = Vec::with_capacity(clipped.len());
    let mut kept: Vec<(Vec3, f32)> = Vec::with_capacity(clipped.len());
    for pt in clipped {
        let k1 = m22 * (pt.x - c1) - m12 * (pt.y - c2);
        let k2 = -m21 * (pt.x - c1) + m11 * (pt.y - c2);
        let point = center + rb[a1] * k1 + rb[a2] * k2;
        let dep = sa[code_n] - normal2.dot(point);
        if dep >= 0.0 {
            kept_2d.push(pt);
            kept.push((point, dep));
        }
    }
    if kept.is_empty() {
        return None;
    }

    let maxc = max_contacts.clamp(1, kept.len());
    let points = if kept.len() <= maxc {
        kept.into_iter().map(|(pt, d)| (pt + pa, d)).collect()
    } else {
        let mut deepest = 0;
        for i in 1..kept.len() {
            if kept[i].1 > kept[deepest].1 {
                deepest = i;
            }
        }
        cull_points(&kept_2d, maxc, deepest)
            .into_iter()
            .map(|i| (kept[i].0 + pa, kept[i].1))
            .collect()
    };

    Some(BoxBoxHit {
        normal,
        depth,
        code,
        points,
    })
}

pub fn collide_box_box(o1: &GeomRef<'_>, o2: &GeomRef<'_>, contacts: &mut [Contact]) -> usize {
    let side1 = shape_params!(o1, Shape::Box { sides } => *sides);
    let side2 = shape_params!(o2, Shape::Box { sides } => *sides);
    let Some(hit) = box_box(
        o1.pose.position,
        &o1.pose.rotation,
        side1,
        o2.pose.position,
        &o2.pose.rotation,
        side2,
        contacts.len(),
    ) else {
        return 0;
    };
    let mut n = 0;
    for (slot, (position, depth)) in contacts.iter_mut().zip(hit.points) {
        *slot = Contact::new(position, -hit.normal, depth, o1.id, o2.id);
        n += 1;
    }
    n
}

pub fn collide_box_plane(o1: &GeomRef<'_>, o2: &GeomRef<'_>, contacts: &mut [Contact]) -> usize {
    let sides = shape_params!(o1, Shape::Box { sides } => *sides);
    let (n, d) = shape_params!(o2, Shape::Plane { normal, d } => (*normal, *d));

    let axes = columns(&o1.pose.rotation);
    let proj = Vec3::new(
        sides.x * n.dot(axes[0]),
        sides.y * n.dot(axes[1]),
        sides.z * n.dot(axes[2]),
    );
    let extent = proj.abs();

    let mut depth = d + 0.5 * (extent.x + extent.y + extent.z) - n.dot(o1.pose.position);
    if depth < 0.0 {
        return 0;
    }
    let maxc = contacts.len().min(MAX_PLANE_CONTACTS);

    // Deepest corner.
    let mut deepest = o1.pose.position;
    for i in 0..3 {
        let step = axes[i] * (0.5 * sides[i]);
        if proj[i] > 0.0 {
            deepest -= step;
        } else {
            deepest += step;
        }
    }
    contacts[0] = Contact::new(deepest, n, depth, o1.id, o2.id);
    let mut count = 1;

    // Walk from the deepest corner along the sides with the smallest
    // projected length.
    let mut order = [0usize, 1, 2];
    order.sort_by(|&i, &j| extent[i].total_cmp(&extent[j]));
    for &side in order.iter().take(maxc.saturating_sub(1)) {
        depth -= extent[side];
        if depth < 0.0 {
            break;
        }
        let step = axes[side] * sides[side];
        let position = if proj[side] > 0.0 {
            deepest + step
        } else {
            deepest - step
        };
        contacts[count] = Contact::new(position, n, depth, o1.id, o2.id);
        count += 1;
    }
    count
}
