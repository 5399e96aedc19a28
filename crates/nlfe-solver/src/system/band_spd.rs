//! Symmetric positive definite banded storage.
//!
//! Only the lower band is kept: row `i` stores `A[i, i−h..=i]` with `h` the
//! half-bandwidth of the DOF graph. The Cholesky factor has the same profile
//! and is computed into separate storage so A stays available.

use super::{LinearSoe, allocate, allocate_vector, check_finite, check_matrix_ids, scatter_add};
use crate::error::{SolverError, SolverResult};
use crate::model::DofGraph;
use nalgebra::{DMatrix, DVector};

#[derive(Debug, Clone)]
pub struct BandSpdSoe {
    n: usize,
    half_band: usize,
    band: Vec<f64>,
    factor: Option<Vec<f64>>,
    b: DVector<f64>,
    x: DVector<f64>,
}

impl BandSpdSoe {
    pub fn new() -> Self {
        Self {
            n: 0,
            half_band: 0,
            band: Vec::new(),
            factor: None,
            b: DVector::zeros(0),
            x: DVector::zeros(0),
        }
    }

    pub fn half_bandwidth(&self) -> usize {
        self.half_band
    }

    /// Storage index of (i, j), i ≥ j, inside the band
    fn index(&self, i: usize, j: usize) -> usize {
        i * (self.half_band + 1) + (i - j)
    }

    fn in_band(&self, i: usize, j: usize) -> bool {
        i >= j && i - j <= self.half_band
    }

    fn factorize(&self) -> SolverResult<Vec<f64>> {
        let h = self.half_band;
        let mut l = self.band.clone();
        for j in 0..self.n {
            let lo = j.saturating_sub(h);
            let mut diag = l[self.index(j, j)];
            for k in lo..j {
                let v = l[self.index(j, k)];
                diag -= v * v;
            }
            if diag <= 0.0 || !diag.is_finite() {
                return Err(SolverError::SingularSystem(format!(
                    "non-positive pivot {diag:.3e} at equation {j}"
                )));
            }
            let diag = diag.sqrt();
            let jj = self.index(j, j);
            l[jj] = diag;

            for i in (j + 1)..(j + h + 1).min(self.n) {
                let lo = i.saturating_sub(h);
                let mut sum = l[self.index(i, j)];
                for k in lo..j {
                    sum -= l[self.index(i, k)] * l[self.index(j, k)];
                }
                let ij = self.index(i, j);
                l[ij] = sum / diag;
            }
        }
        Ok(l)
    }

    fn back_substitute(&self, l: &[f64]) -> DVector<f64> {
        let (n, h) = (self.n, self.half_band);
        let mut y = self.b.clone();
        for i in 0..n {
            let mut sum = y[i];
            for k in i.saturating_sub(h)..i {
                sum -= l[self.index(i, k)] * y[k];
            }
            y[i] = sum / l[self.index(i, i)];
        }
        for i in (0..n).rev() {
            let mut sum = y[i];
            for k in (i + 1)..(i + h + 1).min(n) {
                sum -= l[self.index(k, i)] * y[k];
            }
            y[i] = sum / l[self.index(i, i)];
        }
        y
    }
}

impl Default for BandSpdSoe {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearSoe for BandSpdSoe {
    fn name(&self) -> &'static str {
        "BandSPD"
    }

    fn set_size(&mut self, graph: &DofGraph) -> SolverResult<()> {
        let n = graph.num_eqn();
        let h = graph.half_bandwidth();
        let len = h.checked_add(1).and_then(|w| w.checked_mul(n));
        self.band = allocate(n, len)?;
        self.n = n;
        self.half_band = h;
        self.factor = None;
        self.b = allocate_vector(n)?;
        self.x = allocate_vector(n)?;
        Ok(())
    }

    fn num_eqn(&self) -> usize {
        self.n
    }

    fn zero_a(&mut self) {
        self.band.fill(0.0);
        self.factor = None;
    }

    fn zero_b(&mut self) {
        self.b.fill(0.0);
    }

    fn add_a(&mut self, m: &DMatrix<f64>, ids: &[Option<usize>], factor: f64) {
        check_matrix_ids(m, ids);
        for (r, row) in ids.iter().enumerate() {
            let Some(i) = *row else { continue };
            for (c, col) in ids.iter().enumerate() {
                let Some(j) = *col else { continue };
                if i < j {
                    continue;
                }
                assert!(
                    self.in_band(i, j),
                    "entry ({i}, {j}) outside half-bandwidth {}",
                    self.half_band
                );
                let k = self.index(i, j);
                self.band[k] += factor * m[(r, c)];
            }
        }
        self.factor = None;
    }

    fn add_b(&mut self, v: &DVector<f64>, ids: &[Option<usize>], factor: f64) {
        scatter_add(&mut self.b, v, ids, factor);
    }

    fn set_b(&mut self, v: &DVector<f64>) {
        self.b.copy_from(v);
    }

    fn set_x(&mut self, v: &DVector<f64>) {
        self.x.copy_from(v);
    }

    fn solve(&mut self) -> SolverResult<()> {
        if self.n == 0 {
            return Ok(());
        }
        if self.factor.is_none() {
            self.factor = Some(self.factorize()?);
        }
        let x = match &self.factor {
            Some(l) => self.back_substitute(l),
            None => return Err(SolverError::SingularSystem("missing factorization".to_string())),
        };
        check_finite(&x, "banded Cholesky")?;
        self.x = x;
        Ok(())
    }

    fn x(&self) -> &DVector<f64> {
        &self.x
    }

    fn b(&self) -> &DVector<f64> {
        &self.b
    }

    fn a_entry(&self, i: usize, j: usize) -> f64 {
        let (r, c) = if i >= j { (i, j) } else { (j, i) };
        if self.in_band(r, c) {
            self.band[self.index(r, c)]
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EqnOwner;
    use approx::assert_relative_eq;
    use std::collections::BTreeSet;

    fn tridiagonal(n: usize) -> DofGraph {
        let sets = (0..n)
            .map(|i| {
                let mut s = BTreeSet::new();
                if i > 0 {
                    s.insert(i - 1);
                }
                if i + 1 < n {
                    s.insert(i + 1);
                }
                s
            })
            .collect();
        DofGraph::from_sets(sets, vec![EqnOwner::Node(1); n])
    }

    #[test]
    fn tridiagonal_spd_solve() {
        // K = [4 -1 0; -1 4 -1; 0 -1 4]
        let mut soe = BandSpdSoe::new();
        soe.set_size(&tridiagonal(3)).unwrap();
        assert_eq!(soe.half_bandwidth(), 1);
        let spring = DMatrix::from_row_slice(2, 2, &[2.0, -1.0, -1.0, 2.0]);
        soe.add_a(&spring, &[Some(0), Some(1)], 1.0);
        soe.add_a(&spring, &[Some(1), Some(2)], 1.0);
        soe.add_a(&DMatrix::from_element(1, 1, 2.0), &[Some(0)], 1.0);
        soe.add_a(&DMatrix::from_element(1, 1, 2.0), &[Some(2)], 1.0);
        assert_relative_eq!(soe.a_entry(1, 1), 4.0);
        assert_relative_eq!(soe.a_entry(0, 1), -1.0);

        let x0 = DVector::from_vec(vec![1.0, -2.0, 0.5]);
        let k = DMatrix::from_row_slice(3, 3, &[4.0, -1.0, 0.0, -1.0, 4.0, -1.0, 0.0, -1.0, 4.0]);
        soe.set_b(&(&k * &x0));
        soe.solve().unwrap();
        assert_relative_eq!(soe.x().clone(), x0, epsilon = 1e-12);
    }

    #[test]
    fn indefinite_matrix_is_singular() {
        let mut soe = BandSpdSoe::new();
        soe.set_size(&tridiagonal(2)).unwrap();
        soe.add_a(
            &DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]),
            &[Some(0), Some(1)],
            1.0,
        );
        assert!(matches!(soe.solve(), Err(SolverError::SingularSystem(_))));
    }
}
