//! Growable `L * D * L'` factorization of a symmetric matrix.
//!
//! Rows are appended one at a time and can be removed from the middle
//! without refactoring: the rows below are shifted up and the trailing
//! block gets a rank-one update with the removed column.

/// Unit lower-triangular `L` and diagonal `D`, stored densely with a fixed
/// row stride.
#[derive(Debug, Clone)]
pub(crate) struct Ldlt {
    stride: usize,
    len: usize,
    l: Vec<f64>,
    d: Vec<f64>,
}

impl Ldlt {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            stride: n,
            len: 0,
            l: vec![0.0; n * n],
            d: vec![0.0; n],
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    fn at(&self, r: usize, c: usize) -> f64 {
        self.l[r * self.stride + c]
    }

    /// Solve `L y = v` in place over the first `len` entries.
    pub fn solve_lower(&self, v: &mut [f64]) {
        for r in 1..self.len {
            let mut sum = v[r];
            for c in 0..r {
                sum -= self.at(r, c) * v[c];
            }
            v[r] = sum;
        }
    }

    /// Solve `L' y = v` in place over the first `len` entries.
    pub fn solve_upper(&self, v: &mut [f64]) {
        for r in (0..self.len).rev() {
            let mut sum = v[r];
            for c in r + 1..self.len {
                sum -= self.at(c, r) * v[c];
            }
            v[r] = sum;
        }
    }

    /// Solve `L D L' y = v` in place.
    pub fn solve(&self, v: &mut [f64]) {
        self.solve_lower(v);
        for (value, d) in v.iter_mut().zip(&self.d[..self.len]) {
            *value /= d;
        }
        self.solve_upper(v);
    }

    /// Append a row and column. `col` holds the new column's entries against
    /// the existing rows, `diag` its diagonal entry. Returns the new pivot,
    /// or `Err` with it when it vanishes and the factorization is unchanged.
    pub fn push(&mut self, col: &[f64], diag: f64) -> Result<f64, f64> {
        debug_assert_eq!(col.len(), self.len);
        debug_assert!(self.len < self.stride, "factorization is full");
        let mut y = col.to_vec();
        self.solve_lower(&mut y);
        let mut pivot = diag;
        let row = self.len * self.stride;
        for (k, yk) in y.iter().enumerate() {
            let ell = yk / self.d[k];
            pivot -= ell * yk;
            self.l[row + k] = ell;
        }
        let scale = diag.abs().max(1.0);
        if !pivot.is_finite() || pivot.abs() <= f64::EPSILON * scale {
            return Err(pivot);
        }
        self.d[self.len] = pivot;
        self.len += 1;
        Ok(pivot)
    }

    /// Remove row and column `j`.
    pub fn remove(&mut self, j: usize) {
        debug_assert!(j < self.len);
        let s = self.stride;
        let m = self.len;
        let mut z: Vec<f64> = (j + 1..m).map(|r| self.at(r, j)).collect();
        let mut alpha = self.d[j];

        for r in j + 1..m {
            for c in 0..j {
                self.l[(r - 1) * s + c] = self.l[r * s + c];
            }
            for c in j + 1..r {
                self.l[(r - 1) * s + c - 1] = self.l[r * s + c];
            }
            self.d[r - 1] = self.d[r];
        }
        self.len -= 1;

        // trailing block += alpha * z * z'
        for k in 0..z.len() {
            let kk = j + k;
            let p = z[k];
            let dk = self.d[kk];
            let d_new = dk + alpha * p * p;
            let beta = p * alpha / d_new;
            alpha = dk * alpha / d_new;
            self.d[kk] = d_new;
            for r in k + 1..z.len() {
                let rr = j + r;
                z[r] -= p * self.l[rr * s + kk];
                self.l[rr * s + kk] += beta * z[r];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    fn random_spd(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let m: Vec<f64> = (0..n * n).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let mut a = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..n {
                a[i * n + j] = (0..n).map(|k| m[k * n + i] * m[k * n + j]).sum::<f64>();
            }
            a[i * n + i] += 1.0;
        }
        a
    }

    fn factor(a: &[f64], n: usize, rows: &[usize]) -> Ldlt {
        let mut f = Ldlt::with_capacity(n);
        for (k, &r) in rows.iter().enumerate() {
            let col: Vec<f64> = rows[..k].iter().map(|&c| a[c * n + r]).collect();
            assert!(f.push(&col, a[r * n + r]).is_ok());
        }
        f
    }

    fn check_solve(f: &Ldlt, a: &[f64], n: usize, rows: &[usize]) {
        let rhs: Vec<f64> = (0..rows.len()).map(|k| k as f64 - 1.5).collect();
        let mut x = rhs.clone();
        f.solve(&mut x);
        for (k, &r) in rows.iter().enumerate() {
            let ax: f64 = rows.iter().zip(&x).map(|(&c, xc)| a[r * n + c] * xc).sum();
            assert!((ax - rhs[k]).abs() < 1e-9, "row {k}: {ax} vs {}", rhs[k]);
        }
    }

    #[test]
    fn test_push_and_solve() {
        let n = 8;
        let a = random_spd(n, 1);
        let rows: Vec<usize> = (0..n).collect();
        let f = factor(&a, n, &rows);
        assert_eq!(f.len(), n);
        check_solve(&f, &a, n, &rows);
    }

    #[test]
    fn test_remove_matches_refactor() {
        let n = 9;
        let a = random_spd(n, 2);
        let mut rows: Vec<usize> = vec![4, 0, 7, 2, 8, 1];
        let mut f = factor(&a, n, &rows);
        for j in [2, 0, 3] {
            f.remove(j);
            rows.remove(j);
            check_solve(&f, &a, n, &rows);
        }
        // removing the last row is a plain truncation
        let last = rows.len() - 1;
        f.remove(last);
        rows.remove(last);
        check_solve(&f, &a, n, &rows);
    }

    #[test]
    fn test_singular_pivot_is_rejected() {
        let mut f = Ldlt::with_capacity(2);
        assert!(f.push(&[], 2.0).is_ok());
        // second row is a copy of the first
        assert!(f.push(&[2.0], 2.0).is_err());
        assert_eq!(f.len(), 1);
    }
}
