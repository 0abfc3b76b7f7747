//! Sphere colliders.

use glam::Vec3;

use super::util::collide_spheres;
use super::{shape_params, GeomRef};
use crate::contact::Contact;
use crate::shape::Shape;

pub fn collide_sphere_sphere(o1: &GeomRef<'_>, o2: &GeomRef<'_>, contacts: &mut [Contact]) -> usize {
    let r1 = shape_params!(o1, Shape::Sphere { radius } => *radius);
    let r2 = shape_params!(o2, Shape::Sphere { radius } => *radius);
    match collide_spheres(o1.pose.position, r1, o2.pose.position, r2, o1.id, o2.id) {
        Some(c) => {
            contacts[0] = c;
            1
        }
        None => 0,
    }
}

pub fn collide_sphere_box(o1: &GeomRef<'_>, o2: &GeomRef<'_>, contacts: &mut [Contact]) -> usize {
    let radius = shape_params!(o1, Shape::Sphere { radius } => *radius);
    let half = shape_params!(o2, Shape::Box { sides } => *sides * 0.5);

    let center = o1.pose.position;
    let local = o2.pose.inverse_transform_point(center);
    let clamped = local.clamp(-half, half);
    let on_border = clamped != local;

    if !on_border {
        // Center inside the box: push out through the nearest face.
        let face_dist = half - local.abs();
        let mut axis = 0;
        for i in 1..3 {
            if face_dist[i] < face_dist[axis] {
                axis = i;
            }
        }
        let mut dir = Vec3::ZERO;
        dir[axis] = if local[axis] > 0.0 { 1.0 } else { -1.0 };
        contacts[0] = Contact::new(
            center,
            o2.pose.transform_vector(dir),
            face_dist[axis] + radius,
            o1.id,
            o2.id,
        );
        return 1;
    }

    let closest = o2.pose.transform_point(clamped);
    let offset = center - closest;
    let depth = radius - offset.length();
    if depth < 0.0 {
        return 0;
    }
    contacts[0] = Contact::new(
        closest,
        offset.normalize_or(o2.pose.transform_vector(local - clamped).normalize_or(Vec3::X)),
        depth,
        o1.id,
        o2.id,
    );
    1
}

pub fn collide_sphere_plane(o1: &GeomRef<'_>, o2: &GeomRef<'_>, contacts: &mut [Contact]) -> usize {
    let radius = shape_params!(o1, Shape::Sphere { radius } => *radius);
    let (normal, d) = shape_params!(o2, Shape::Plane { normal, d } => (*normal, *d));

    let center = o1.pose.position;
    let depth = d - normal.dot(center) + radius;
    if depth < 0.0 {
        return 0;
    }
    contacts[0] = Contact::new(center - normal * radius, normal, depth, o1.id, o2.id);
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Pose;
    use crate::narrowphase::test_util::run;
    use glam::Mat3;

    #[test]
    fn test_sphere_sphere_intersection() {
        let s = Shape::sphere(1.0).unwrap();
        let contacts = run(
            collide_sphere_sphere,
            &s,
            Pose::IDENTITY,
            &s,
            Pose::from_position(Vec3::new(1.5, 0.0, 0.0)),
            1,
        );
        assert_eq!(contacts.len(), 1);
        let eps = 1e-4;
        assert!((contacts[0].normal - Vec3::NEG_X).length() < eps);
        assert!((contacts[0].depth - 0.5).abs() < eps);
    }

    #[test]
    fn test_sphere_sphere_depth_matches_overlap() {
        let s = Shape::sphere(0.75).unwrap();
        for d in [0.1f32, 0.6, 1.2, 1.49] {
            let dir = Vec3::new(1.0, 2.0, -0.5).normalize();
            let contacts = run(
                collide_sphere_sphere,
                &s,
                Pose::from_position(dir * d),
                &s,
                Pose::IDENTITY,
                1,
            );
            assert_eq!(contacts.len(), 1, "missed contact at distance {d}");
            assert!((contacts[0].depth - (1.5 - d)).abs() < 1e-5);
            assert!(contacts[0].normal.cross(dir).length() < 1e-5);
        }
    }

    #[test]
    fn test_sphere_box_outside_face() {
        let sphere = Shape::sphere(0.5).unwrap();
        let cube = Shape::cuboid(Vec3::splat(2.0)).unwrap();
        let contacts = run(
            collide_sphere_box,
            &sphere,
            Pose::from_position(Vec3::new(0.0, 1.25, 0.0)),
            &cube,
            Pose::IDENTITY,
            1,
        );
        assert_eq!(contacts.len(), 1);
        let eps = 1e-5;
        assert!((contacts[0].normal - Vec3::Y).length() < eps);
        assert!((contacts[0].depth - 0.25).abs() < eps);
        assert!((contacts[0].position - Vec3::Y).length() < eps);
    }

    #[test]
    fn test_sphere_box_center_inside() {
        let sphere = Shape::sphere(0.5).unwrap();
        let cube = Shape::cuboid(Vec3::splat(2.0)).unwrap();
        let rotated = Pose::new(Vec3::ZERO, Mat3::from_rotation_z(std::f32::consts::FRAC_PI_2));
        let contacts = run(
            collide_sphere_box,
            &sphere,
            Pose::from_position(Vec3::new(0.8, 0.0, 0.0)),
            &cube,
            rotated,
            1,
        );
        assert_eq!(contacts.len(), 1);
        let eps = 1e-5;
        assert!((contacts[0].normal - Vec3::X).length() < eps);
        assert!((contacts[0].depth - 0.7).abs() < eps);
    }

    #[test]
    fn test_sphere_box_separated() {
        let sphere = Shape::sphere(0.5).unwrap();
        let cube = Shape::cuboid(Vec3::splat(2.0)).unwrap();
        let contacts = run(
            collide_sphere_box,
            &sphere,
            Pose::from_position(Vec3::new(1.5, 1.5, 0.0)),
            &cube,
            Pose::IDENTITY,
            1,
        );
        assert!(contacts.is_empty());
    }

    #[test]
    fn test_sphere_plane() {
        let sphere = Shape::sphere(1.0).unwrap();
        let plane = Shape::plane(Vec3::Y, 0.0).unwrap();
        let contacts = run(
            collide_sphere_plane,
            &sphere,
            Pose::from_position(Vec3::new(3.0, 0.5, 0.0)),
            &plane,
            Pose::IDENTITY,
            1,
        );
        assert_eq!(contacts.len(), 1);
        let eps = 1e-5;
        assert!((contacts[0].depth - 0.5).abs() < eps);
        assert!((contacts[0].position - Vec3::new(3.0, -0.5, 0.0)).length() < eps);
        assert_eq!(contacts[0].normal, Vec3::Y);

        let above = run(
            collide_sphere_plane,
            &sphere,
            Pose::from_position(Vec3::new(0.0, 1.5, 0.0)),
            &plane,
            Pose::IDENTITY,
            1,
        );
        assert!(above.is_empty());
    }
}
