//! Dantzig pivoting with an incrementally maintained factorization of the
//! clamped block.
//!
//! Variables keep their input indices throughout. The processing order
//! is a separate index list: the equality block first, then every other
//! plain variable, then the ones with friction references. The clamped set
//! lists its members in factorization order.

use tracing::{trace, warn};

use super::factor::Ldlt;
use super::{LcpProblem, SolveStatus};
use crate::error::LcpError;

/// Which event limited the current step.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Limit {
    /// The driving variable's residual reached zero.
    Clamp,
    /// The driving variable reached a bound.
    Lower,
    Upper,
    /// A bound variable's residual reached zero.
    Release(usize),
    /// A clamped variable reached a bound.
    ClampedLower(usize),
    ClampedUpper(usize),
}

pub(super) struct Dantzig<'a> {
    n: usize,
    a: &'a [f64],
    b: &'a [f64],
    scale: &'a [f64],
    findex: &'a [Option<usize>],
    lo: Vec<f64>,
    hi: Vec<f64>,
    x: Vec<f64>,
    w: Vec<f64>,
    order: Vec<usize>,
    nub: usize,
    clamped: Vec<usize>,
    bound: Vec<usize>,
    at_upper: Vec<bool>,
    factor: Ldlt,
    delta_x: Vec<f64>,
    delta_w: Vec<f64>,
}

impl<'a> Dantzig<'a> {
    pub fn new(problem: &'a LcpProblem) -> Self {
        let n = problem.n;
        let unbounded =
            |i: usize| problem.lo[i] == f64::NEG_INFINITY && problem.hi[i] == f64::INFINITY;

        let mut order: Vec<usize> = (0..problem.nub).collect();
        order.extend(
            (problem.nub..n).filter(|&i| problem.findex[i].is_none() && unbounded(i)),
        );
        let nub = order.len();
        order.extend(
            (problem.nub..n).filter(|&i| problem.findex[i].is_none() && !unbounded(i)),
        );
        order.extend((problem.nub..n).filter(|&i| problem.findex[i].is_some()));

        Self {
            n,
            a: &problem.a,
            b: &problem.b,
            scale: &problem.hi,
            findex: &problem.findex,
            lo: problem.lo.clone(),
            hi: problem.hi.clone(),
            x: vec![0.0; n],
            w: vec![0.0; n],
            order,
            nub,
            clamped: Vec::with_capacity(n),
            bound: Vec::with_capacity(n),
            at_upper: vec![false; n],
            factor: Ldlt::with_capacity(n),
            delta_x: vec![0.0; n],
            delta_w: vec![0.0; n],
        }
    }

    pub fn into_parts(self) -> (Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>) {
        (self.x, self.w, self.lo, self.hi)
    }

    #[inline]
    fn at(&self, i: usize, j: usize) -> f64 {
        self.a[i * self.n + j]
    }

    /// Column `i` of `A` restricted to the clamped set.
    fn clamped_column(&self, i: usize) -> Vec<f64> {
        self.clamped.iter().map(|&c| self.at(c, i)).collect()
    }

    fn push_clamped(&mut self, i: usize) -> Result<(), f64> {
        let col = self.clamped_column(i);
        self.factor.push(&col, self.at(i, i))?;
        self.clamped.push(i);
        Ok(())
    }

    fn release_clamped(&mut self, k: usize, upper: bool) {
        if let Some(pos) = self.clamped.iter().position(|&c| c == k) {
            self.factor.remove(pos);
            self.clamped.remove(pos);
        }
        self.x[k] = if upper { self.hi[k] } else { self.lo[k] };
        self.bind(k, upper);
    }

    fn bind(&mut self, k: usize, upper: bool) {
        self.bound.push(k);
        self.at_upper[k] = upper;
    }

    pub fn run(&mut self) -> Result<SolveStatus, LcpError> {
        // equality block
        for k in 0..self.nub {
            let i = self.order[k];
            if self.push_clamped(i).is_err() {
                return Err(LcpError::Singular { index: i });
            }
        }
        if self.nub > 0 {
            let mut x: Vec<f64> = self.clamped.iter().map(|&c| self.b[c]).collect();
            self.factor.solve(&mut x);
            for (&c, value) in self.clamped.iter().zip(x) {
                self.x[c] = value;
            }
        }
        if self.nub == self.n {
            trace!(n = self.n, "lcp solved as a linear system");
            return Ok(SolveStatus::Solved);
        }

        for pos in self.nub..self.n {
            let i = self.order[pos];
            if let Some(status) = self.drive(i) {
                for &k in &self.order[pos..] {
                    self.x[k] = 0.0;
                    self.w[k] = 0.0;
                }
                if let SolveStatus::Degraded { index, step } = status {
                    warn!(index, step, n = self.n, "lcp solver stalled, unresolved tail zeroed");
                }
                return Ok(status);
            }
        }
        trace!(
            n = self.n,
            clamped = self.clamped.len(),
            bound = self.bound.len(),
            "lcp solved"
        );
        Ok(SolveStatus::Solved)
    }

    /// Settle variable `i`. Returns a status only when the solve degrades.
    fn drive(&mut self, i: usize) -> Option<SolveStatus> {
        if let Some(j) = self.findex[i] {
            let hi = (self.scale[i] * self.x[j]).abs();
            self.hi[i] = hi;
            self.lo[i] = -hi;
        }
        let row = &self.a[i * self.n..(i + 1) * self.n];
        self.w[i] = row.iter().zip(&self.x).map(|(a, x)| a * x).sum::<f64>() - self.b[i];

        if self.lo[i] == 0.0 && self.w[i] >= 0.0 {
            self.bind(i, false);
            return None;
        }
        if self.hi[i] == 0.0 && self.w[i] <= 0.0 {
            self.bind(i, true);
            return None;
        }
        if self.w[i] == 0.0 {
            return match self.push_clamped(i) {
                Ok(()) => None,
                Err(_) => Some(SolveStatus::Degraded { index: i, step: 0.0 }),
            };
        }

        loop {
            let dir = if self.w[i] <= 0.0 { 1.0 } else { -1.0 };
            self.compute_direction(i, dir);

            let (step, limit) = self.limit(i, dir);
            if !(step > 0.0 && step.is_finite()) {
                return Some(SolveStatus::Degraded { index: i, step });
            }

            for &c in &self.clamped {
                self.x[c] += step * self.delta_x[c];
            }
            self.x[i] += step * dir;
            for &k in &self.bound {
                self.w[k] += step * self.delta_w[k];
            }
            self.w[i] += step * self.delta_w[i];

            match limit {
                Limit::Clamp => {
                    self.w[i] = 0.0;
                    return match self.push_clamped(i) {
                        Ok(()) => None,
                        Err(_) => Some(SolveStatus::Degraded { index: i, step }),
                    };
                }
                Limit::Lower => {
                    self.x[i] = self.lo[i];
                    self.bind(i, false);
                    return None;
                }
                Limit::Upper => {
                    self.x[i] = self.hi[i];
                    self.bind(i, true);
                    return None;
                }
                Limit::Release(k) => {
                    self.w[k] = 0.0;
                    if let Some(pos) = self.bound.iter().position(|&b| b == k) {
                        self.bound.swap_remove(pos);
                    }
                    if self.push_clamped(k).is_err() {
                        return Some(SolveStatus::Degraded { index: i, step });
                    }
                }
                Limit::ClampedLower(k) => self.release_clamped(k, false),
                Limit::ClampedUpper(k) => self.release_clamped(k, true),
            }
        }
    }

    /// Fill `delta_x` over the clamped set and `delta_w` over the bound set
    /// and `i` for a unit move of `x[i]` in direction `dir`.
    fn compute_direction(&mut self, i: usize, dir: f64) {
        let mut v = self.clamped_column(i);
        self.factor.solve(&mut v);
        for (&c, value) in self.clamped.iter().zip(v) {
            self.delta_x[c] = -dir * value;
        }

        let clamped_dot = |row: usize| -> f64 {
            self.clamped
                .iter()
                .map(|&c| self.at(row, c) * self.delta_x[c])
                .sum()
        };
        let delta_bound: Vec<f64> = self
            .bound
            .iter()
            .map(|&k| clamped_dot(k) + self.at(k, i) * dir)
            .collect();
        let delta_i = clamped_dot(i) + self.at(i, i) * dir;
        for (&k, value) in self.bound.iter().zip(delta_bound) {
            self.delta_w[k] = value;
        }
        self.delta_w[i] = delta_i;
    }

    /// Largest step along the current direction and what stops it.
    fn limit(&self, i: usize, dir: f64) -> (f64, Limit) {
        // A flat direction never brings w_i to zero.
        let mut step = if self.delta_w[i].abs() > f64::EPSILON {
            -self.w[i] / self.delta_w[i]
        } else {
            f64::INFINITY
        };
        let mut limit = Limit::Clamp;

        if dir > 0.0 {
            if self.hi[i] < f64::INFINITY {
                let s = (self.hi[i] - self.x[i]) / dir;
                if s < step {
                    step = s;
                    limit = Limit::Upper;
                }
            }
        } else if self.lo[i] > f64::NEG_INFINITY {
            let s = (self.lo[i] - self.x[i]) / dir;
            if s < step {
                step = s;
                limit = Limit::Lower;
            }
        }

        for &k in &self.bound {
            if self.lo[k] == 0.0 && self.hi[k] == 0.0 {
                continue;
            }
            let dw = self.delta_w[k];
            let leaving = if self.at_upper[k] { dw > 0.0 } else { dw < 0.0 };
            if leaving {
                let s = -self.w[k] / dw;
                if s < step {
                    step = s;
                    limit = Limit::Release(k);
                }
            }
        }

        for &k in &self.clamped[self.nub.min(self.clamped.len())..] {
            let dx = self.delta_x[k];
            if dx < 0.0 && self.lo[k] > f64::NEG_INFINITY {
                let s = (self.lo[k] - self.x[k]) / dx;
                if s < step {
                    step = s;
                    limit = Limit::ClampedLower(k);
                }
            } else if dx > 0.0 && self.hi[k] < f64::INFINITY {
                let s = (self.hi[k] - self.x[k]) / dx;
                if s < step {
                    step = s;
                    limit = Limit::ClampedUpper(k);
                }
            }
        }
        (step, limit)
    }
}
