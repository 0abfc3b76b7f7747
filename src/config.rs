//! Tunables for the broadphase spaces and heightfield collision.
//!
//! Every value that used to be a compile-time constant is an explicit field
//! here, passed at construction time.

use glam::Vec3;

/// Configuration for the multi-resolution hash space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HashSpaceConfig {
    /// Smallest cell size is `2^min_level`. Default: -3.
    pub min_level: i32,
    /// Largest cell size is `2^max_level`. Boxes bigger than this go to the
    /// oversized list. Default: 10.
    pub max_level: i32,
}

impl Default for HashSpaceConfig {
    fn default() -> Self {
        Self {
            min_level: -3,
            max_level: 10,
        }
    }
}

/// World axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// Configuration for the quadtree space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadTreeConfig {
    /// Center of the root block. Default: origin.
    pub center: Vec3,
    /// Half extents of the root block. Default: (1000, 1000, 1000).
    pub extents: Vec3,
    /// Number of subdivision levels below the root. Default: 4.
    pub depth: u32,
    /// Axis the tree does not split along. Default: Y, so blocks tile X/Z.
    pub up_axis: Axis,
}

impl Default for QuadTreeConfig {
    fn default() -> Self {
        Self {
            center: Vec3::ZERO,
            extents: Vec3::splat(1000.0),
            depth: 4,
            up_axis: Axis::Y,
        }
    }
}

impl QuadTreeConfig {
    /// The two axes the tree splits along, in increasing order.
    pub fn plane_axes(&self) -> (usize, usize) {
        match self.up_axis {
            Axis::X => (1, 2),
            Axis::Y => (0, 2),
            Axis::Z => (0, 1),
        }
    }
}

/// Sort and test order for sweep-and-prune. The first axis is sorted, the
/// other two are tested per candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisOrder {
    Xyz,
    Xzy,
    Yxz,
    Yzx,
    Zxy,
    Zyx,
}

impl AxisOrder {
    pub fn axes(self) -> [usize; 3] {
        match self {
            AxisOrder::Xyz => [0, 1, 2],
            AxisOrder::Xzy => [0, 2, 1],
            AxisOrder::Yxz => [1, 0, 2],
            AxisOrder::Yzx => [1, 2, 0],
            AxisOrder::Zxy => [2, 0, 1],
            AxisOrder::Zyx => [2, 1, 0],
        }
    }
}

/// Configuration for the sweep-and-prune space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SapConfig {
    /// Default: `Xzy`.
    pub axis_order: AxisOrder,
}

impl Default for SapConfig {
    fn default() -> Self {
        Self {
            axis_order: AxisOrder::Xzy,
        }
    }
}

/// Heightfield collision tunables, stored with each heightfield.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightfieldConfig {
    /// Contacts requested from each merged triangle plane. Default: 10.
    pub max_contacts_per_cell: usize,
    /// When the other shape's AABB spans more than this many cells along X or
    /// Z, triangle vertices are also tested against it. Default: 1.5.
    pub further_pass_ratio: f32,
}

impl Default for HeightfieldConfig {
    fn default() -> Self {
        Self {
            max_contacts_per_cell: 10,
            further_pass_ratio: 1.5,
        }
    }
}

/// Broadphase strategy of a space, with its configuration.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SpaceKind {
    /// Tests every pair of members.
    #[default]
    Simple,
    /// Multi-resolution spatial hash.
    Hash(HashSpaceConfig),
    /// Fixed-depth quadtree over the plane perpendicular to `up_axis`.
    QuadTree(QuadTreeConfig),
    /// Sweep-and-prune along the first axis of `axis_order`.
    Sap(SapConfig),
}
