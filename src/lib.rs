//! Rein collision pipeline
//!
//! Rigid-body collision detection and the boxed LCP solver a stepper calls
//! once per step.
//!
//! # Architecture
//!
//! The library is organized into layers:
//!
//! 1. **math** - Poses and axis-aligned bounding boxes
//! 2. **shape** - Shape parameters, AABBs and point depth queries
//! 3. **narrowphase** - Pairwise contact generation (SAT, clipping, GJK/EPA)
//! 4. **dispatch** - Pair routing, symmetric flips and custom shape classes
//! 5. **space** - Broadphase strategies (simple, hash, quadtree, SAP)
//! 6. **world** - Geoms, bodies, nested spaces and the collide passes
//! 7. **lcp** - Dantzig boxed LCP solver with incremental factorization
//!
//! A typical pass creates a space, adds geoms, and calls
//! [`World::collide`]; the callback runs [`World::collide_pair`] on each
//! candidate and feeds the contacts to a constraint assembler.

pub mod config;
pub mod contact;
pub mod dispatch;
pub mod error;
pub mod geom;
pub mod lcp;
pub mod math;
pub mod narrowphase;
pub mod shape;
pub mod space;
pub mod world;

// Re-export commonly used types
pub use config::{
    Axis, AxisOrder, HashSpaceConfig, HeightfieldConfig, QuadTreeConfig, SapConfig, SpaceKind,
};
pub use contact::Contact;
pub use dispatch::{Dispatcher, ShapeClass};
pub use error::{LcpError, ShapeError};
pub use geom::{BodyId, GeomId};
pub use lcp::{LcpProblem, LcpSolution, SolveStatus};
pub use math::{Aabb, Pose};
pub use narrowphase::{ColliderFn, GeomRef};
pub use shape::{
    ClassId, ConvexHull, CustomShape, HeightSource, Heightfield, HeightfieldDesc, Ray, RayFlags,
    Shape, ShapeKind,
};
pub use space::BroadPhase;
pub use world::{NearCallback, World};
