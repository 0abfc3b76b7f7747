//! Boxed linear complementarity solver.
//!
//! Solves `A x = b + w` for a symmetric `A` where every variable satisfies
//! one of
//!
//! - `x = lo` and `w >= 0`
//! - `x = hi` and `w <= 0`
//! - `lo < x < hi` and `w = 0`
//!
//! The first `nub` variables are unbounded and always take the last case.
//! A variable with a friction reference `findex[i] = Some(j)` has its bounds
//! scaled by `x[j]` when the solver reaches it.

mod dantzig;
mod factor;

use crate::error::LcpError;

/// Outcome of a solve that did not fail on its input.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SolveStatus {
    #[default]
    Solved,
    /// The pivot search stalled at `index` with a non-positive or unbounded
    /// `step`.
    /// Variables from that point of the processing order on are left at zero.
    Degraded { index: usize, step: f64 },
}

impl SolveStatus {
    pub fn is_solved(&self) -> bool {
        matches!(self, Self::Solved)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LcpSolution {
    pub x: Vec<f64>,
    pub w: Vec<f64>,
    /// Bounds in effect at the solution, with friction references applied.
    pub lo: Vec<f64>,
    pub hi: Vec<f64>,
    pub status: SolveStatus,
}

/// A boxed LCP of size `n`. `a` is row-major `n x n` and must be symmetric.
#[derive(Debug, Clone, PartialEq)]
pub struct LcpProblem {
    pub n: usize,
    pub a: Vec<f64>,
    pub b: Vec<f64>,
    pub lo: Vec<f64>,
    pub hi: Vec<f64>,
    /// Number of leading unbounded variables.
    pub nub: usize,
    pub findex: Vec<Option<usize>>,
}

impl LcpProblem {
    /// Zero matrix and right-hand side, bounds `[0, inf)`.
    pub fn new(n: usize) -> Self {
        Self {
            n,
            a: vec![0.0; n * n],
            b: vec![0.0; n],
            lo: vec![0.0; n],
            hi: vec![f64::INFINITY; n],
            nub: 0,
            findex: vec![None; n],
        }
    }

    /// Set `A[i][j]` and `A[j][i]`.
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.a[i * self.n + j] = value;
        self.a[j * self.n + i] = value;
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.a[i * self.n + j]
    }

    pub fn set_bounds(&mut self, i: usize, lo: f64, hi: f64) {
        self.lo[i] = lo;
        self.hi[i] = hi;
    }

    pub fn validate(&self) -> Result<(), LcpError> {
        let n = self.n;
        let lengths = [
            ("a", n * n, self.a.len()),
            ("b", n, self.b.len()),
            ("lo", n, self.lo.len()),
            ("hi", n, self.hi.len()),
            ("findex", n, self.findex.len()),
        ];
        for (what, expected, actual) in lengths {
            if expected != actual {
                return Err(LcpError::DimensionMismatch {
                    what,
                    expected,
                    actual,
                });
            }
        }
        if self.nub > n {
            return Err(LcpError::NubOutOfRange { nub: self.nub, n });
        }
        for i in 0..n {
            let (lo, hi) = (self.lo[i], self.hi[i]);
            // also rejects NaN
            if !(lo <= 0.0 && hi >= 0.0) {
                return Err(LcpError::InvalidBounds { index: i, lo, hi });
            }
            let Some(target) = self.findex[i] else {
                continue;
            };
            if i < self.nub {
                return Err(LcpError::FindexOnUnbounded { index: i });
            }
            if target >= n {
                return Err(LcpError::FindexOutOfRange { index: i, target });
            }
            if target == i {
                return Err(LcpError::FindexSelfReference { index: i });
            }
            if self.findex[target].is_some() {
                return Err(LcpError::FindexChained { index: i, target });
            }
        }
        Ok(())
    }

    /// Validate and solve into fresh buffers.
    pub fn solve(&self) -> Result<LcpSolution, LcpError> {
        self.validate()?;
        let mut solver = dantzig::Dantzig::new(self);
        let status = solver.run()?;
        let (x, w, lo, hi) = solver.into_parts();
        Ok(LcpSolution {
            x,
            w,
            lo,
            hi,
            status,
        })
    }

    /// Validate and solve into caller buffers of length `n`.
    pub fn solve_in_place(&self, x: &mut [f64], w: &mut [f64]) -> Result<SolveStatus, LcpError> {
        for (what, actual) in [("x", x.len()), ("w", w.len())] {
            if actual != self.n {
                return Err(LcpError::DimensionMismatch {
                    what,
                    expected: self.n,
                    actual,
                });
            }
        }
        let solution = self.solve()?;
        x.copy_from_slice(&solution.x);
        w.copy_from_slice(&solution.w);
        Ok(solution.status)
    }
}
