//! Geom records stored in the [`World`](crate::World).

use bitflags::bitflags;
use slotmap::new_key_type;

use crate::math::{Aabb, Pose};
use crate::shape::{Shape, ShapeKind};

new_key_type! {
    /// Handle to a geom or space.
    pub struct GeomId;
    /// Handle to a rigid body that geoms can follow.
    pub struct BodyId;
}

bitflags! {
    /// Per-geom state bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GeomFlags: u32 {
        /// Moved since the owning space last cleaned it.
        const DIRTY = 1 << 0;
        /// Cached AABB is stale.
        const AABB_BAD = 1 << 1;
        /// World pose must be recomputed from the body.
        const POSE_BAD = 1 << 2;
        const ZERO_SIZED = 1 << 3;
        const ENABLED = 1 << 4;
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Geom {
    /// `None` for spaces.
    pub shape: Option<Shape>,
    pub flags: GeomFlags,
    /// Pose relative to the body. Unused while detached.
    pub offset: Pose,
    /// Cached world pose.
    pub pose: Pose,
    pub body: Option<BodyId>,
    pub parent: Option<GeomId>,
    pub category: u64,
    pub collide: u64,
    pub aabb: Aabb,
}

impl Geom {
    pub fn new(shape: Option<Shape>) -> Self {
        let mut flags = GeomFlags::DIRTY | GeomFlags::AABB_BAD | GeomFlags::ENABLED;
        if shape.as_ref().is_some_and(Shape::is_zero_sized) {
            flags |= GeomFlags::ZERO_SIZED;
        }
        Self {
            shape,
            flags,
            offset: Pose::IDENTITY,
            pose: Pose::IDENTITY,
            body: None,
            parent: None,
            category: u64::MAX,
            collide: u64::MAX,
            aabb: Aabb::ZERO,
        }
    }

    pub fn kind(&self) -> ShapeKind {
        self.shape.as_ref().map_or(ShapeKind::Space, Shape::kind)
    }

    pub fn is_space(&self) -> bool {
        self.shape.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Body {
    pub pose: Pose,
    pub geoms: Vec<GeomId>,
}
