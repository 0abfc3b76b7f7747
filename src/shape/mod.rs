//! Geometric primitives.
//!
//! A [`Shape`] holds only immutable parameters. Placement lives on the geom
//! that carries it (see [`World`](crate::World)).

pub mod convex;
pub mod heightfield;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use glam::Vec3;

use crate::error::ShapeError;
use crate::math::{Aabb, Pose};

pub use convex::{ConvexHull, HullPlane};
pub use heightfield::{HeightSource, Heightfield, HeightfieldDesc};

/// Number of built-in geom kinds, spaces included. Custom classes are
/// numbered from here.
pub const BUILTIN_KIND_COUNT: usize = 9;

/// Handle of a registered custom shape class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub(crate) u32);

/// Type tag of a geom. Indexes the collider dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    Sphere,
    Box,
    Capsule,
    Cylinder,
    Plane,
    Ray,
    Convex,
    Heightfield,
    Space,
    Custom(ClassId),
}

impl ShapeKind {
    pub const BUILTIN: [ShapeKind; BUILTIN_KIND_COUNT] = [
        ShapeKind::Sphere,
        ShapeKind::Box,
        ShapeKind::Capsule,
        ShapeKind::Cylinder,
        ShapeKind::Plane,
        ShapeKind::Ray,
        ShapeKind::Convex,
        ShapeKind::Heightfield,
        ShapeKind::Space,
    ];

    /// Dense index used by the dispatch table.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            ShapeKind::Sphere => 0,
            ShapeKind::Box => 1,
            ShapeKind::Capsule => 2,
            ShapeKind::Cylinder => 3,
            ShapeKind::Plane => 4,
            ShapeKind::Ray => 5,
            ShapeKind::Convex => 6,
            ShapeKind::Heightfield => 7,
            ShapeKind::Space => 8,
            ShapeKind::Custom(class) => BUILTIN_KIND_COUNT + class.0 as usize,
        }
    }
}

bitflags! {
    /// Ray traversal options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RayFlags: u32 {
        /// Stop at the first hit found.
        const FIRST_CONTACT = 1 << 0;
        /// Ignore hits on faces seen from behind, i.e. exits from inside a solid.
        const BACKFACE_CULL = 1 << 1;
        /// Report only the nearest hit.
        const CLOSEST_HIT = 1 << 2;
    }
}

/// A finite ray starting at the geom position and pointing along the geom's
/// local Z axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub length: f32,
    pub flags: RayFlags,
}

/// Opaque shape data belonging to a registered class.
#[derive(Clone)]
pub struct CustomShape {
    pub class: ClassId,
    pub data: Arc<dyn Any + Send + Sync>,
}

impl fmt::Debug for CustomShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomShape")
            .field("class", &self.class)
            .finish_non_exhaustive()
    }
}

/// Shape parameters.
#[derive(Debug, Clone)]
pub enum Shape {
    Sphere { radius: f32 },
    /// Full side lengths.
    Box { sides: Vec3 },
    /// `length` is the cylindrical part only; the caps add `radius` at each end.
    Capsule { radius: f32, length: f32 },
    Cylinder { radius: f32, length: f32 },
    /// Half-space `normal . p <= d`. Not placeable.
    Plane { normal: Vec3, d: f32 },
    Ray(Ray),
    Convex(Arc<ConvexHull>),
    Heightfield(Arc<Heightfield>),
    Custom(CustomShape),
}

fn check_dimension(what: &'static str, value: f32) -> Result<f32, ShapeError> {
    if value >= 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(ShapeError::NegativeDimension { what, value })
    }
}

impl Shape {
    pub fn sphere(radius: f32) -> Result<Self, ShapeError> {
        Ok(Shape::Sphere {
            radius: check_dimension("radius", radius)?,
        })
    }

    pub fn cuboid(sides: Vec3) -> Result<Self, ShapeError> {
        check_dimension("side x", sides.x)?;
        check_dimension("side y", sides.y)?;
        check_dimension("side z", sides.z)?;
        Ok(Shape::Box { sides })
    }

    pub fn capsule(radius: f32, length: f32) -> Result<Self, ShapeError> {
        Ok(Shape::Capsule {
            radius: check_dimension("radius", radius)?,
            length: check_dimension("length", length)?,
        })
    }

    pub fn cylinder(radius: f32, length: f32) -> Result<Self, ShapeError> {
        Ok(Shape::Cylinder {
            radius: check_dimension("radius", radius)?,
            length: check_dimension("length", length)?,
        })
    }

    /// Plane `normal . p = d`. The normal is normalized and `d` scaled with it.
    pub fn plane(normal: Vec3, d: f32) -> Result<Self, ShapeError> {
        let len = normal.length();
        if len <= 0.0 || !len.is_finite() {
            return Err(ShapeError::DegeneratePlane);
        }
        Ok(Shape::Plane {
            normal: normal / len,
            d: d / len,
        })
    }

    pub fn ray(length: f32) -> Result<Self, ShapeError> {
        Ok(Shape::Ray(Ray {
            length: check_dimension("length", length)?,
            flags: RayFlags::empty(),
        }))
    }

    pub fn convex(hull: ConvexHull) -> Self {
        Shape::Convex(Arc::new(hull))
    }

    pub fn heightfield(field: Heightfield) -> Self {
        Shape::Heightfield(Arc::new(field))
    }

    pub fn kind(&self) -> ShapeKind {
        match self {
            Shape::Sphere { .. } => ShapeKind::Sphere,
            Shape::Box { .. } => ShapeKind::Box,
            Shape::Capsule { .. } => ShapeKind::Capsule,
            Shape::Cylinder { .. } => ShapeKind::Cylinder,
            Shape::Plane { .. } => ShapeKind::Plane,
            Shape::Ray(_) => ShapeKind::Ray,
            Shape::Convex(_) => ShapeKind::Convex,
            Shape::Heightfield(_) => ShapeKind::Heightfield,
            Shape::Custom(custom) => ShapeKind::Custom(custom.class),
        }
    }

    /// Planes ignore their pose.
    pub fn is_placeable(&self) -> bool {
        !matches!(self, Shape::Plane { .. })
    }

    /// Degenerate shapes that must never produce contacts.
    pub fn is_zero_sized(&self) -> bool {
        match self {
            Shape::Sphere { radius } => *radius == 0.0,
            Shape::Box { sides } => sides.x == 0.0 || sides.y == 0.0 || sides.z == 0.0,
            Shape::Capsule { radius, .. } => *radius == 0.0,
            Shape::Cylinder { radius, length } => *radius == 0.0 || *length == 0.0,
            _ => false,
        }
    }

    /// World AABB at `pose`. Custom shapes are bounded by their class and
    /// return an infinite box here.
    pub fn aabb(&self, pose: &Pose) -> Aabb {
        match self {
            Shape::Sphere { radius } => {
                Aabb::from_center_half_extents(pose.position, Vec3::splat(*radius))
            }
            Shape::Box { sides } => {
                let half = *sides * 0.5;
                Aabb::from_local_bounds(pose, -half, half)
            }
            Shape::Capsule { radius, length } => {
                let axis = pose.axis(2).abs() * (length * 0.5);
                Aabb::from_center_half_extents(pose.position, axis + Vec3::splat(*radius))
            }
            Shape::Cylinder { radius, length } => {
                let half = Vec3::new(*radius, *radius, length * 0.5);
                Aabb::from_local_bounds(pose, -half, half)
            }
            Shape::Plane { normal, d } => plane_aabb(*normal, *d),
            Shape::Ray(ray) => {
                let end = pose.position + pose.axis(2) * ray.length;
                Aabb::new(pose.position.min(end), pose.position.max(end))
            }
            Shape::Convex(hull) => {
                let mut points = hull.points.iter().map(|p| pose.transform_point(*p));
                match points.next() {
                    Some(first) => {
                        let (min, max) =
                            points.fold((first, first), |(lo, hi), p| (lo.min(p), hi.max(p)));
                        Aabb::new(min, max)
                    }
                    None => Aabb::from_center_half_extents(pose.position, Vec3::ZERO),
                }
            }
            Shape::Heightfield(field) => field.aabb(pose),
            Shape::Custom(_) => Aabb::INFINITE,
        }
    }

    /// Signed depth of world point `p`: positive inside, zero on the surface,
    /// negative outside. `None` for shapes without a volume.
    pub fn point_depth(&self, pose: &Pose, p: Vec3) -> Option<f32> {
        let depth = match self {
            Shape::Sphere { radius } => radius - (p - pose.position).length(),
            Shape::Box { sides } => box_point_depth(*sides * 0.5, pose.inverse_transform_point(p)),
            Shape::Capsule { radius, length } => {
                let q = pose.inverse_transform_point(p);
                let half = length * 0.5;
                let on_axis = Vec3::new(0.0, 0.0, q.z.clamp(-half, half));
                radius - (q - on_axis).length()
            }
            Shape::Cylinder { radius, length } => {
                let q = pose.inverse_transform_point(p);
                let dr = radius - (q.x * q.x + q.y * q.y).sqrt();
                let dz = length * 0.5 - q.z.abs();
                if dr >= 0.0 && dz >= 0.0 {
                    dr.min(dz)
                } else {
                    let outside_r = (-dr).max(0.0);
                    let outside_z = (-dz).max(0.0);
                    -(outside_r * outside_r + outside_z * outside_z).sqrt()
                }
            }
            Shape::Plane { normal, d } => d - normal.dot(p),
            Shape::Convex(hull) => hull.point_depth(pose.inverse_transform_point(p)),
            Shape::Ray(_) | Shape::Heightfield(_) | Shape::Custom(_) => return None,
        };
        Some(depth)
    }
}

/// Depth of box-local point `q` in a box with half extents `half`.
pub(crate) fn box_point_depth(half: Vec3, q: Vec3) -> f32 {
    let inside = half - q.abs();
    if inside.min_element() >= 0.0 {
        inside.min_element()
    } else {
        -(q - q.clamp(-half, half)).length()
    }
}

fn plane_aabb(normal: Vec3, d: f32) -> Aabb {
    let mut aabb = Aabb::INFINITE;
    for axis in 0..3 {
        let others = [(axis + 1) % 3, (axis + 2) % 3];
        if normal[others[0]] != 0.0 || normal[others[1]] != 0.0 {
            continue;
        }
        if normal[axis] > 0.0 {
            aabb.max[axis] = d;
        } else {
            aabb.min[axis] = -d;
        }
    }
    aabb
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat3;

    #[test]
    fn test_constructors_reject_negative() {
        assert!(Shape::sphere(-1.0).is_err());
        assert!(Shape::cuboid(Vec3::new(1.0, -2.0, 1.0)).is_err());
        assert!(Shape::capsule(0.5, f32::NAN).is_err());
        assert!(Shape::plane(Vec3::ZERO, 1.0).is_err());
    }

    #[test]
    fn test_plane_is_normalized() {
        let shape = Shape::plane(Vec3::new(0.0, 2.0, 0.0), 4.0).unwrap();
        match shape {
            Shape::Plane { normal, d } => {
                assert!((normal - Vec3::Y).length() < 1e-6);
                assert!((d - 2.0).abs() < 1e-6);
            }
            _ => panic!("expected plane"),
        }
    }

    #[test]
    fn test_zero_sized() {
        assert!(Shape::sphere(0.0).unwrap().is_zero_sized());
        assert!(Shape::cuboid(Vec3::new(1.0, 0.0, 1.0)).unwrap().is_zero_sized());
        assert!(Shape::cylinder(1.0, 0.0).unwrap().is_zero_sized());
        assert!(!Shape::capsule(1.0, 0.0).unwrap().is_zero_sized());
    }

    #[test]
    fn test_capsule_aabb_along_axis() {
        let shape = Shape::capsule(0.5, 2.0).unwrap();
        let aabb = shape.aabb(&Pose::IDENTITY);
        assert!((aabb.max.z - 1.5).abs() < 1e-6);
        assert!((aabb.max.x - 0.5).abs() < 1e-6);

        let pose = Pose::new(Vec3::ZERO, Mat3::from_rotation_y(std::f32::consts::FRAC_PI_2));
        let aabb = shape.aabb(&pose);
        assert!((aabb.max.x - 1.5).abs() < 1e-5);
        assert!((aabb.max.z - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_plane_aabb_axis_aligned() {
        let up = plane_aabb(Vec3::Y, 1.0);
        assert_eq!(up.max.y, 1.0);
        assert!(up.min.y.is_infinite());
        assert!(up.max.x.is_infinite());

        let down = plane_aabb(-Vec3::Y, 1.0);
        assert_eq!(down.min.y, -1.0);

        let tilted = plane_aabb(Vec3::new(1.0, 1.0, 0.0).normalize(), 0.0);
        assert_eq!(tilted, Aabb::INFINITE);
    }

    #[test]
    fn test_ray_aabb() {
        let shape = Shape::ray(3.0).unwrap();
        let pose = Pose::new(Vec3::new(1.0, 0.0, 0.0), Mat3::IDENTITY);
        let aabb = shape.aabb(&pose);
        assert_eq!(aabb.min, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(aabb.max, Vec3::new(1.0, 0.0, 3.0));
    }

    #[test]
    fn test_point_depth() {
        let eps = 1e-5;
        let sphere = Shape::sphere(1.0).unwrap();
        let d = sphere.point_depth(&Pose::IDENTITY, Vec3::new(0.25, 0.0, 0.0));
        assert!((d.unwrap() - 0.75).abs() < eps);

        let cube = Shape::cuboid(Vec3::splat(2.0)).unwrap();
        let inside = cube.point_depth(&Pose::IDENTITY, Vec3::new(0.5, 0.0, 0.0)).unwrap();
        assert!((inside - 0.5).abs() < eps, "inside depth {inside}");
        let outside = cube.point_depth(&Pose::IDENTITY, Vec3::new(4.0, 0.0, 0.0)).unwrap();
        assert!((outside + 3.0).abs() < eps, "outside depth {outside}");

        let capsule = Shape::capsule(0.5, 2.0).unwrap();
        let tip = capsule.point_depth(&Pose::IDENTITY, Vec3::new(0.0, 0.0, 1.5)).unwrap();
        assert!(tip.abs() < eps);

        let cylinder = Shape::cylinder(1.0, 2.0).unwrap();
        let corner = cylinder.point_depth(&Pose::IDENTITY, Vec3::new(2.0, 0.0, 2.0)).unwrap();
        assert!((corner + std::f32::consts::SQRT_2).abs() < eps);

        let plane = Shape::plane(Vec3::Y, 0.0).unwrap();
        let below = plane.point_depth(&Pose::IDENTITY, Vec3::new(0.0, -2.0, 0.0)).unwrap();
        assert!((below - 2.0).abs() < eps);

        assert!(Shape::ray(1.0).unwrap().point_depth(&Pose::IDENTITY, Vec3::ZERO).is_none());
    }
}
