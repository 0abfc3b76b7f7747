//! Rigid poses and axis-aligned bounding boxes.

use glam::{Mat3, Vec3};

/// Position plus orthonormal rotation. The rotation's columns are the local
/// axes expressed in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Mat3,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Mat3::IDENTITY,
    };

    pub fn new(position: Vec3, rotation: Mat3) -> Self {
        Self { position, rotation }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Mat3::IDENTITY,
        }
    }

    #[inline]
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.position + self.rotation * p
    }

    #[inline]
    pub fn transform_vector(&self, v: Vec3) -> Vec3 {
        self.rotation * v
    }

    #[inline]
    pub fn inverse_transform_point(&self, p: Vec3) -> Vec3 {
        self.rotation.transpose() * (p - self.position)
    }

    #[inline]
    pub fn inverse_transform_vector(&self, v: Vec3) -> Vec3 {
        self.rotation.transpose() * v
    }

    /// `self * local`: places a pose given relative to `self` into world space.
    pub fn compose(&self, local: &Pose) -> Pose {
        Pose {
            position: self.transform_point(local.position),
            rotation: self.rotation * local.rotation,
        }
    }

    /// Pose of `other` expressed in this pose's frame.
    pub fn relative(&self, other: &Pose) -> Pose {
        let rt = self.rotation.transpose();
        Pose {
            position: rt * (other.position - self.position),
            rotation: rt * other.rotation,
        }
    }

    /// Local axis `i` in world space.
    #[inline]
    pub fn axis(&self, i: usize) -> Vec3 {
        self.rotation.col(i)
    }
}

/// Axis-aligned bounding box. Bounds may be infinite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Aabb {
    pub const ZERO: Self = Self {
        min: Vec3::ZERO,
        max: Vec3::ZERO,
    };

    pub const INFINITE: Self = Self {
        min: Vec3::NEG_INFINITY,
        max: Vec3::INFINITY,
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Box covering all of space.
    pub fn infinite() -> Self {
        Self::INFINITE
    }

    pub fn from_center_half_extents(center: Vec3, half: Vec3) -> Self {
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// World bounds of the local box `[lo, hi]` placed at `pose`.
    ///
    /// Zero rotation entries are skipped so infinite local bounds stay
    /// confined to the axes they actually map onto.
    pub fn from_local_bounds(pose: &Pose, lo: Vec3, hi: Vec3) -> Self {
        let mut min = pose.position;
        let mut max = pose.position;
        for j in 0..3 {
            let col = pose.rotation.col(j);
            for i in 0..3 {
                let r = col[i];
                if r == 0.0 {
                    continue;
                }
                let a = r * lo[j];
                let b = r * hi[j];
                min[i] += a.min(b);
                max[i] += a.max(b);
            }
        }
        Self { min, max }
    }

    /// Test whether two AABBs overlap. Touching boxes overlap.
    #[inline]
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    #[inline]
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pose_round_trip() {
        let pose = Pose::new(Vec3::new(1.0, 2.0, 3.0), Mat3::from_rotation_y(0.7));
        let p = Vec3::new(-0.5, 4.0, 2.0);
        let back = pose.inverse_transform_point(pose.transform_point(p));
        assert!((back - p).length() < 1e-5);
    }

    #[test]
    fn test_pose_compose_and_relative() {
        let a = Pose::new(Vec3::new(1.0, 0.0, 0.0), Mat3::from_rotation_z(1.0));
        let local = Pose::new(Vec3::new(0.0, 2.0, 0.0), Mat3::from_rotation_x(0.3));
        let world = a.compose(&local);
        let rel = a.relative(&world);
        assert!((rel.position - local.position).length() < 1e-5);
        assert!(rel.rotation.abs_diff_eq(local.rotation, 1e-5));
    }

    #[test]
    fn test_aabb_overlap_touching() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::new(Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 1.0, 1.0));
        let c = Aabb::new(Vec3::new(1.1, 0.0, 0.0), Vec3::new(2.0, 1.0, 1.0));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_local_bounds_rotated() {
        let pose = Pose::new(
            Vec3::new(5.0, 0.0, 0.0),
            Mat3::from_rotation_z(std::f32::consts::FRAC_PI_4),
        );
        let aabb = Aabb::from_local_bounds(&pose, Vec3::splat(-1.0), Vec3::splat(1.0));
        let h = std::f32::consts::SQRT_2;
        assert!((aabb.max.x - (5.0 + h)).abs() < 1e-5);
        assert!((aabb.min.y + h).abs() < 1e-5);
        assert!((aabb.max.z - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_local_bounds_infinite_axis_aligned() {
        let pose = Pose::from_position(Vec3::new(0.0, 3.0, 0.0));
        let lo = Vec3::new(f32::NEG_INFINITY, -1.0, f32::NEG_INFINITY);
        let hi = Vec3::new(f32::INFINITY, 1.0, f32::INFINITY);
        let aabb = Aabb::from_local_bounds(&pose, lo, hi);
        assert_eq!(aabb.min.y, 2.0);
        assert_eq!(aabb.max.y, 4.0);
        assert!(aabb.max.x.is_infinite());
        assert!(!aabb.is_finite());
    }
}
