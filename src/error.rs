//! Typed errors for shape construction and the LCP solver.

use thiserror::Error;

/// Malformed shape parameters passed to a shape constructor.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShapeError {
    #[error("{what} must be non-negative and finite, got {value}")]
    NegativeDimension { what: &'static str, value: f32 },
    #[error("plane normal must be non-zero")]
    DegeneratePlane,
    #[error("convex hull has {planes} planes but {polygons} polygons")]
    PolygonCountMismatch { planes: usize, polygons: usize },
    #[error("convex polygon {polygon} has {len} vertices, at least 3 required")]
    PolygonTooSmall { polygon: usize, len: usize },
    #[error("convex polygon {polygon} references point {index} but the hull has {points} points")]
    PointIndexOutOfRange {
        polygon: usize,
        index: u32,
        points: usize,
    },
    #[error("heightfield needs at least 2 samples per axis, got {width} x {depth}")]
    TooFewSamples { width: u32, depth: u32 },
    #[error("heightfield expects {expected} samples, got {actual}")]
    SampleCountMismatch { expected: usize, actual: usize },
    #[error("heightfield extent must be positive, got {width} x {depth}")]
    InvalidExtent { width: f32, depth: f32 },
}

/// Malformed LCP input. Numerical trouble during the solve is not an error,
/// see [`SolveStatus::Degraded`](crate::lcp::SolveStatus::Degraded).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LcpError {
    #[error("{what} has length {actual}, expected {expected}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("nub ({nub}) exceeds problem size ({n})")]
    NubOutOfRange { nub: usize, n: usize },
    #[error("bounds of variable {index} do not bracket zero (lo = {lo}, hi = {hi})")]
    InvalidBounds { index: usize, lo: f64, hi: f64 },
    #[error("findex of variable {index} points at {target}, outside the problem")]
    FindexOutOfRange { index: usize, target: usize },
    #[error("variable {index} uses itself as its friction reference")]
    FindexSelfReference { index: usize },
    #[error("variable {index} references friction variable {target}; references must be plain variables")]
    FindexChained { index: usize, target: usize },
    #[error("variable {index} is unbounded but has a friction reference")]
    FindexOnUnbounded { index: usize },
    #[error("equality block is singular at pivot {index}")]
    Singular { index: usize },
}
