//! Contact points produced by the narrowphase.

use glam::Vec3;

use crate::geom::GeomId;

/// A single contact between two geoms.
///
/// The normal points from `g2` into `g1`: moving `g1` along `normal` by
/// `depth` separates the pair.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Contact {
    /// Contact position in world space.
    pub position: Vec3,
    /// Unit contact normal.
    pub normal: Vec3,
    /// Penetration depth, non-negative for touching contacts.
    pub depth: f32,
    pub g1: GeomId,
    pub g2: GeomId,
    /// Feature of `g1` that produced the contact, if the collider tracks one.
    pub side1: Option<u32>,
    pub side2: Option<u32>,
}

impl Contact {
    pub fn new(position: Vec3, normal: Vec3, depth: f32, g1: GeomId, g2: GeomId) -> Self {
        Self {
            position,
            normal,
            depth,
            g1,
            g2,
            side1: None,
            side2: None,
        }
    }

    /// Swap the roles of the two geoms.
    pub fn flip(&mut self) {
        self.normal = -self.normal;
        std::mem::swap(&mut self.g1, &mut self.g2);
        std::mem::swap(&mut self.side1, &mut self.side2);
    }
}
