//! Heightfield collider.
//!
//! The other geom is moved into the grid's corner-origin frame and tested
//! against the cells its AABB covers:
//!
//! 1. Trivial rejection when it is entirely above the covered samples, and a
//!    single push-up contact when it is entirely below them.
//! 2. A flat patch is treated as one plane.
//! 3. Otherwise each cell is split into two triangles, triangles sharing a
//!    plane are merged, and the shape's plane collider runs against every
//!    merged plane. Contacts are kept only if they fall on one of the
//!    plane's triangles.
//! 4. Shapes much larger than a cell additionally test the grid vertices of
//!    triangles that produced nothing, using the shape's point depth.
//!
//! The heightfield is always the first geom.

use glam::Vec3;

use super::util::emit;
use super::{boxes, capsule, convex, cylinder, ray, shape_params, sphere, ColliderFn, GeomRef};
use crate::contact::Contact;
use crate::math::Pose;
use crate::shape::{Heightfield, RayFlags, Shape, ShapeKind};

const EPS: f32 = f32::EPSILON;

/// Plane collider for shapes that can stand on a heightfield.
fn plane_collider(kind: ShapeKind) -> Option<ColliderFn> {
    match kind {
        ShapeKind::Sphere => Some(sphere::collide_sphere_plane),
        ShapeKind::Box => Some(boxes::collide_box_plane),
        ShapeKind::Capsule => Some(capsule::collide_capsule_plane),
        ShapeKind::Cylinder => Some(cylinder::collide_cylinder_plane),
        ShapeKind::Convex => Some(convex::collide_convex_plane),
        ShapeKind::Ray => Some(ray::collide_ray_plane),
        _ => None,
    }
}

struct GridVertex {
    position: Vec3,
    coords: (i32, i32),
    /// Already collided, below the shape, or on a concave edge.
    skip: bool,
}

struct Triangle {
    /// Up triangles are `A, B, C`; down triangles are `D, B, C`. The first
    /// vertex is the corner used by the cell membership test.
    vertices: [usize; 3],
    up: bool,
    normal: Vec3,
    d: f32,
    max_height: f32,
    plane_hit: bool,
}

struct MergedPlane {
    normal: Vec3,
    d: f32,
    triangles: Vec<usize>,
    max_height: f32,
}

/// Cell range covered by the other geom, in sample indices.
#[derive(Debug, Clone, Copy)]
struct Zone {
    min_x: i32,
    max_x: i32,
    min_z: i32,
    max_z: i32,
}

struct ZoneQuery<'a> {
    field: &'a Heightfield,
    other: GeomRef<'a>,
    /// Vertical extent of the other geom's AABB.
    other_min: f32,
    other_max: f32,
    is_ray: bool,
    further_passes: bool,
}

impl ZoneQuery<'_> {
    /// Whether `pos` lies on the triangle with corner `corner`. Every point
    /// of the XZ plane belongs to exactly one triangle.
    fn on_triangle(&self, corner: &GridVertex, pos: Vec3, up: bool) -> bool {
        let sw = self.field.sample_width();
        let sd = self.field.sample_depth();
        let aspect = self.field.aspect();
        if up {
            let min_x = corner.position.x;
            let max_x = (corner.coords.0 + 1) as f32 * sw;
            let min_z = corner.position.z;
            let max_z = (corner.coords.1 + 1) as f32 * sd;
            if pos.x < min_x || pos.x >= max_x || pos.z < min_z || pos.z >= max_z {
                return false;
            }
            (max_z - pos.z) > (pos.x - min_x) * aspect
        } else {
            let max_x = corner.position.x;
            let min_x = (corner.coords.0 - 1) as f32 * sw;
            let max_z = corner.position.z;
            let min_z = (corner.coords.1 - 1) as f32 * sd;
            if pos.x >= max_x || pos.x < min_x || pos.z >= max_z || pos.z < min_z {
                return false;
            }
            (max_z - pos.z) <= (pos.x - min_x) * aspect
        }
    }

    fn collide_plane(&self, collider: ColliderFn, normal: Vec3, d: f32, buf: &mut [Contact]) -> usize {
        let plane = Shape::Plane { normal, d };
        let plane_ref = GeomRef::new(self.other.id, &plane, Pose::IDENTITY);
        collider(&self.other, &plane_ref, buf)
    }

    fn collide(&self, zone: Zone, out: &mut Vec<Contact>, max: usize) {
        let Some(collider) = plane_collider(self.other.shape.kind()) else {
            return;
        };
        let sw = self.field.sample_width();
        let sd = self.field.sample_depth();
        let nx = (zone.max_x - zone.min_x + 1) as usize;
        let nz = (zone.max_z - zone.min_z + 1) as usize;

        let mut vertices = Vec::with_capacity(nx * nz);
        let mut max_y = f32::NEG_INFINITY;
        let mut min_y = f32::INFINITY;
        for x in zone.min_x..=zone.max_x {
            for z in zone.min_z..=zone.max_z {
                let h = self.field.sample(x, z);
                max_y = max_y.max(h);
                min_y = min_y.min(h);
                vertices.push(GridVertex {
                    position: Vec3::new(x as f32 * sw, h, z as f32 * sd),
                    coords: (x, z),
                    skip: h <= self.other_min,
                });
            }
        }
        let at = |xl: usize, zl: usize| xl * nz + zl;

        if self.other_min - max_y > -EPS {
            return;
        }
        if min_y - self.other_max > -EPS {
            let p = self.other.pose.position;
            out.push(Contact::new(
                Vec3::new(p.x, min_y, p.z),
                Vec3::NEG_Y,
                min_y - self.other_max,
                self.other.id,
                self.other.id,
            ));
            return;
        }

        let per_cell = self.field.config().max_contacts_per_cell.max(1);
        let mut plane_buf = vec![Contact::default(); per_cell];

        if max_y - min_y < EPS {
            let n = self.collide_plane(collider, Vec3::Y, min_y, &mut plane_buf);
            for c in &plane_buf[..n] {
                if out.len() == max {
                    return;
                }
                out.push(Contact {
                    normal: Vec3::NEG_Y,
                    ..*c
                });
            }
            return;
        }

        let mut triangles = Vec::new();
        for xl in 0..nx - 1 {
            for zl in 0..nz - 1 {
                let (a, b, c, d) = (at(xl, zl), at(xl + 1, zl), at(xl, zl + 1), at(xl + 1, zl + 1));
                let height = |i: usize| vertices[i].position.y;
                let hits = |i: usize| height(i) > self.other_min;

                if hits(a) || hits(b) || hits(c) {
                    triangles.push(self.triangle(&vertices, [a, b, c], true));
                }
                if hits(b) || hits(c) || hits(d) {
                    triangles.push(self.triangle(&vertices, [d, b, c], false));
                }
                if self.further_passes
                    && (hits(b) || hits(c))
                    && height(a) > height(c)
                    && height(a) > height(b)
                    && height(d) > height(c)
                    && height(d) > height(b)
                {
                    // Concave BC edge.
                    vertices[b].skip = true;
                    vertices[c].skip = true;
                }
            }
        }

        let mut planes = merge_planes(&triangles);
        planes.sort_by(|p, q| p.max_height.total_cmp(&q.max_height));

        for plane in &planes {
            let n = self.collide_plane(collider, plane.normal, plane.d, &mut plane_buf);
            let mut hit = false;
            for c in &plane_buf[..n] {
                let on_plane = plane.triangles.iter().any(|&t| {
                    let tri = &triangles[t];
                    self.on_triangle(&vertices[tri.vertices[0]], c.position, tri.up)
                });
                if on_plane {
                    out.push(Contact {
                        normal: -plane.normal,
                        ..*c
                    });
                    if out.len() == max {
                        return;
                    }
                    hit = true;
                }
            }
            for &t in &plane.triangles {
                triangles[t].plane_hit = hit;
                if hit {
                    for v in triangles[t].vertices {
                        vertices[v].skip = true;
                    }
                }
            }
        }

        if !self.further_passes || self.is_ray {
            return;
        }
        for tri in triangles.iter().filter(|t| !t.plane_hit) {
            for v in tri.vertices {
                if vertices[v].skip {
                    continue;
                }
                let position = vertices[v].position;
                let Some(depth) = self.other.shape.point_depth(&self.other.pose, position) else {
                    continue;
                };
                if depth > EPS {
                    out.push(Contact::new(
                        position,
                        -tri.normal,
                        depth,
                        self.other.id,
                        self.other.id,
                    ));
                    if out.len() == max {
                        return;
                    }
                    vertices[v].skip = true;
                }
            }
        }
    }

    fn triangle(&self, vertices: &[GridVertex], corners: [usize; 3], up: bool) -> Triangle {
        let [p0, p1, p2] = corners.map(|i| vertices[i].position);
        let normal = if up {
            (p2 - p0).cross(p1 - p0)
        } else {
            (p1 - p0).cross(p2 - p0)
        }
        .normalize_or(Vec3::Y);
        Triangle {
            vertices: corners,
            up,
            normal,
            d: normal.dot(p0),
            max_height: p0.y.max(p1.y).max(p2.y),
            plane_hit: false,
        }
    }
}

/// Group triangles whose plane coefficients agree within epsilon.
fn merge_planes(triangles: &[Triangle]) -> Vec<MergedPlane> {
    let mut merged = vec![false; triangles.len()];
    let mut planes = Vec::new();
    for (k, base) in triangles.iter().enumerate() {
        if merged[k] {
            continue;
        }
        merged[k] = true;
        let mut plane = MergedPlane {
            normal: base.normal,
            d: base.d,
            triangles: vec![k],
            max_height: base.max_height,
        };
        for (m, test) in triangles.iter().enumerate().skip(k + 1) {
            if merged[m] {
                continue;
            }
            let same = (base.normal.y - test.normal.y).abs() < EPS
                && (base.d - test.d).abs() < EPS
                && (base.normal.x - test.normal.x).abs() < EPS
                && (base.normal.z - test.normal.z).abs() < EPS;
            if same {
                merged[m] = true;
                plane.triangles.push(m);
                plane.max_height = plane.max_height.max(test.max_height);
            }
        }
        planes.push(plane);
    }
    planes
}

pub fn collide_heightfield(
    o1: &GeomRef<'_>,
    o2: &GeomRef<'_>,
    contacts: &mut [Contact],
) -> usize {
    let field = shape_params!(o1, Shape::Heightfield(field) => field);
    let desc = field.desc();

    // Other geom in the grid's corner-origin frame.
    let mut local = o1.pose.relative(&o2.pose);
    local.position.x += desc.width * 0.5;
    local.position.z += desc.depth * 0.5;
    let aabb = o2.shape.aabb(&local);
    if !aabb.is_finite() {
        return 0;
    }

    let wrapped = field.is_wrapped();
    if !wrapped
        && (aabb.min.x > desc.width
            || aabb.min.z > desc.depth
            || aabb.max.x < 0.0
            || aabb.max.z < 0.0)
    {
        return 0;
    }

    let sw = field.sample_width();
    let sd = field.sample_depth();
    let mut zone = Zone {
        min_x: (aabb.min.x / sw).floor() as i32,
        max_x: (aabb.max.x / sw).floor() as i32 + 1,
        min_z: (aabb.min.z / sd).floor() as i32,
        max_z: (aabb.max.z / sd).floor() as i32 + 1,
    };
    if !wrapped {
        zone.min_x = zone.min_x.max(0);
        zone.max_x = zone.max_x.min(desc.width_samples as i32 - 1);
        zone.min_z = zone.min_z.max(0);
        zone.max_z = zone.max_z.min(desc.depth_samples as i32 - 1);
    }
    if zone.min_x >= zone.max_x || zone.min_z >= zone.max_z {
        return 0;
    }

    let ray_flags = match o2.shape {
        Shape::Ray(r) => Some(r.flags),
        _ => None,
    };
    let size = aabb.size();
    let ratio = field.config().further_pass_ratio;
    let query = ZoneQuery {
        field,
        other: GeomRef::new(o2.id, o2.shape, local),
        other_min: aabb.min.y,
        other_max: aabb.max.y,
        is_ray: ray_flags.is_some(),
        further_passes: size.x / sw > ratio || size.z / sd > ratio,
    };

    let mut max = contacts.len();
    if ray_flags.is_some_and(|f| f.contains(RayFlags::FIRST_CONTACT)) {
        max = 1;
    }
    let mut found = Vec::with_capacity(max);
    query.collide(zone, &mut found, max);

    if ray_flags.is_some_and(|f| f.contains(RayFlags::CLOSEST_HIT)) && found.len() > 1 {
        let nearest = found
            .iter()
            .copied()
            .min_by(|a, b| a.depth.total_cmp(&b.depth));
        found = nearest.into_iter().collect();
    }

    for c in &mut found {
        let centered = c.position - Vec3::new(desc.width * 0.5, 0.0, desc.depth * 0.5);
        c.position = o1.pose.transform_point(centered);
        c.normal = o1.pose.transform_vector(c.normal);
        c.g1 = o1.id;
        c.g2 = o2.id;
    }
    emit(&found, contacts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeightfieldConfig;
    use crate::narrowphase::test_util::run;
    use crate::shape::HeightfieldDesc;
    use glam::Mat3;
    use std::f32::consts::{FRAC_PI_2, SQRT_2};

    fn grid(samples: Vec<f32>, config: HeightfieldConfig) -> Shape {
        let desc = HeightfieldDesc {
            width: 2.0,
            depth: 2.0,
            width_samples: 3,
            depth_samples: 3,
            config,
            ..Default::default()
        };
        Shape::heightfield(Heightfield::from_samples(desc, samples).unwrap())
    }

    /// Height equals the corner-frame x coordinate.
    fn ramp() -> Shape {
        grid(
            vec![0.0, 1.0, 2.0, 0.0, 1.0, 2.0, 0.0, 1.0, 2.0],
            HeightfieldConfig::default(),
        )
    }

    fn spike(config: HeightfieldConfig) -> Shape {
        grid(vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0], config)
    }

    #[test]
    fn test_flat_sphere_on_translated_field() {
        let field = grid(vec![0.0; 9], HeightfieldConfig::default());
        let sphere = Shape::sphere(0.5).unwrap();
        let contacts = run(
            collide_heightfield,
            &field,
            Pose::from_position(Vec3::new(10.0, 0.0, 0.0)),
            &sphere,
            Pose::from_position(Vec3::new(10.3, 0.4, 0.2)),
            4,
        );
        assert_eq!(contacts.len(), 1);
        let eps = 1e-4;
        assert!((contacts[0].depth - 0.1).abs() < eps);
        assert!((contacts[0].normal - Vec3::NEG_Y).length() < eps);
        assert!((contacts[0].position - Vec3::new(10.3, -0.1, 0.2)).length() < eps);
    }

    #[test]
    fn test_sphere_on_ramp() {
        let sphere = Shape::sphere(0.5).unwrap();
        let offset = 0.4 / SQRT_2;
        // 0.1 below the ramp surface point at corner x = 1.25.
        let center = Vec3::new(1.25 - offset - 1.0, 1.25 + offset, 0.0);
        let contacts = run(
            collide_heightfield,
            &ramp(),
            Pose::IDENTITY,
            &sphere,
            Pose::from_position(center),
            4,
        );
        assert_eq!(contacts.len(), 1);
        let eps = 1e-4;
        assert!((contacts[0].depth - 0.1).abs() < eps, "depth {}", contacts[0].depth);
        let expected = Vec3::new(1.0, -1.0, 0.0).normalize();
        assert!((contacts[0].normal - expected).length() < eps);
    }

    #[test]
    fn test_sphere_above_field() {
        let sphere = Shape::sphere(0.5).unwrap();
        let contacts = run(
            collide_heightfield,
            &ramp(),
            Pose::IDENTITY,
            &sphere,
            Pose::from_position(Vec3::new(0.0, 5.0, 0.0)),
            4,
        );
        assert!(contacts.is_empty());
    }

    #[test]
    fn test_sphere_below_field() {
        let field = grid(
            vec![1.0, 1.0, 1.0, 1.0, 2.0, 1.0, 1.0, 1.0, 1.0],
            HeightfieldConfig::default(),
        );
        let sphere = Shape::sphere(0.5).unwrap();
        let contacts = run(
            collide_heightfield,
            &field,
            Pose::IDENTITY,
            &sphere,
            Pose::from_position(Vec3::new(0.2, -1.0, 0.1)),
            4,
        );
        assert_eq!(contacts.len(), 1);
        let eps = 1e-4;
        assert!((contacts[0].depth - 1.5).abs() < eps);
        assert!((contacts[0].normal - Vec3::NEG_Y).length() < eps);
        assert!((contacts[0].position - Vec3::new(0.2, 1.0, 0.1)).length() < eps);
    }

    #[test]
    fn test_sphere_outside_grid() {
        let sphere = Shape::sphere(0.5).unwrap();
        let contacts = run(
            collide_heightfield,
            &ramp(),
            Pose::IDENTITY,
            &sphere,
            Pose::from_position(Vec3::new(5.0, 0.0, 0.0)),
            4,
        );
        assert!(contacts.is_empty());
    }

    #[test]
    fn test_box_over_spike_uses_vertex_pass() {
        let slab = Shape::cuboid(Vec3::new(3.0, 1.0, 3.0)).unwrap();
        let pose = Pose::from_position(Vec3::new(0.0, 1.4, 0.0));
        let contacts = run(
            collide_heightfield,
            &spike(HeightfieldConfig::default()),
            Pose::IDENTITY,
            &slab,
            pose,
            8,
        );
        assert_eq!(contacts.len(), 1);
        let eps = 1e-4;
        assert!((contacts[0].depth - 0.1).abs() < eps, "depth {}", contacts[0].depth);
        assert!((contacts[0].position - Vec3::new(0.0, 1.0, 0.0)).length() < eps);
        assert!(contacts[0].normal.y < 0.0);
    }

    #[test]
    fn test_further_pass_ratio_disables_vertex_pass() {
        let config = HeightfieldConfig {
            further_pass_ratio: 10.0,
            ..Default::default()
        };
        let slab = Shape::cuboid(Vec3::new(3.0, 1.0, 3.0)).unwrap();
        let pose = Pose::from_position(Vec3::new(0.0, 1.4, 0.0));
        let contacts = run(collide_heightfield, &spike(config), Pose::IDENTITY, &slab, pose, 8);
        assert!(contacts.is_empty());
    }

    #[test]
    fn test_ray_down_onto_ramp() {
        let ray = Shape::ray(10.0).unwrap();
        // Local Z mapped onto world -Y.
        let pose = Pose::new(Vec3::new(0.5, 5.0, 0.0), Mat3::from_rotation_x(FRAC_PI_2));
        let contacts = run(collide_heightfield, &ramp(), Pose::IDENTITY, &ray, pose, 4);
        assert_eq!(contacts.len(), 1);
        let eps = 1e-3;
        assert!((contacts[0].depth - 3.5).abs() < eps, "depth {}", contacts[0].depth);
        assert!((contacts[0].position - Vec3::new(0.5, 1.5, 0.0)).length() < eps);
    }
}
