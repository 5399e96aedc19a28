//! Dense general storage solved by LU with partial pivoting.

use super::{LinearSoe, allocate, allocate_vector, check_finite, check_matrix_ids, scatter_add};
use crate::error::{SolverError, SolverResult};
use crate::model::DofGraph;
use nalgebra::linalg::LU;
use nalgebra::{DMatrix, DVector, Dyn};

#[derive(Debug, Clone)]
pub struct FullGenSoe {
    a: DMatrix<f64>,
    b: DVector<f64>,
    x: DVector<f64>,
    factor: Option<LU<f64, Dyn, Dyn>>,
}

impl FullGenSoe {
    pub fn new() -> Self {
        Self {
            a: DMatrix::zeros(0, 0),
            b: DVector::zeros(0),
            x: DVector::zeros(0),
            factor: None,
        }
    }

    /// The assembled matrix
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.a
    }
}

impl Default for FullGenSoe {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearSoe for FullGenSoe {
    fn name(&self) -> &'static str {
        "FullGeneral"
    }

    fn set_size(&mut self, graph: &DofGraph) -> SolverResult<()> {
        let n = graph.num_eqn();
        let storage = allocate(n, n.checked_mul(n))?;
        self.a = DMatrix::from_vec(n, n, storage);
        self.b = allocate_vector(n)?;
        self.x = allocate_vector(n)?;
        self.factor = None;
        Ok(())
    }

    fn num_eqn(&self) -> usize {
        self.b.len()
    }

    fn zero_a(&mut self) {
        self.a.fill(0.0);
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
                if let Some(j) = *col {
                    self.a[(i, j)] += factor * m[(r, c)];
                }
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
        if self.num_eqn() == 0 {
            return Ok(());
        }
        if self.factor.is_none() {
            let lu = self.a.clone().lu();
            if !lu.is_invertible() {
                return Err(SolverError::SingularSystem(
                    "zero pivot in LU decomposition".to_string(),
                ));
            }
            self.factor = Some(lu);
        }
        let lu = self
            .factor
            .as_ref()
            .ok_or_else(|| SolverError::SingularSystem("missing factorization".to_string()))?;
        let x = lu
            .solve(&self.b)
            .ok_or_else(|| SolverError::SingularSystem("singular matrix in LU solve".to_string()))?;
        check_finite(&x, "LU")?;
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
        self.a[(i, j)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense_graph(n: usize) -> DofGraph {
        DofGraph::dense(n)
    }

    #[test]
    fn solve_trivial_system() {
        // [2 0; 0 3] x = [4; 9]
        let mut soe = FullGenSoe::new();
        soe.set_size(&dense_graph(2)).unwrap();
        soe.add_a(
            &DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 3.0]),
            &[Some(0), Some(1)],
            1.0,
        );
        soe.add_b(&DVector::from_vec(vec![4.0, 9.0]), &[Some(0), Some(1)], 1.0);
        soe.solve().unwrap();
        assert!((soe.x()[0] - 2.0).abs() < 1e-12);
        assert!((soe.x()[1] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn singular_matrix_is_reported() {
        let mut soe = FullGenSoe::new();
        soe.set_size(&dense_graph(2)).unwrap();
        soe.add_a(&DMatrix::from_element(2, 2, 1.0), &[Some(0), Some(1)], 1.0);
        soe.set_b(&DVector::from_vec(vec![1.0, 2.0]));
        assert!(matches!(soe.solve(), Err(SolverError::SingularSystem(_))));
    }

    #[test]
    fn factorization_is_reused_until_a_changes() {
        let mut soe = FullGenSoe::new();
        soe.set_size(&dense_graph(1)).unwrap();
        soe.add_a(&DMatrix::from_element(1, 1, 4.0), &[Some(0)], 1.0);
        soe.set_b(&DVector::from_element(1, 8.0));
        soe.solve().unwrap();
        assert!(soe.factor.is_some());

        soe.set_b(&DVector::from_element(1, 4.0));
        soe.solve().unwrap();
        assert!((soe.x()[0] - 1.0).abs() < 1e-14);

        soe.add_a(&DMatrix::from_element(1, 1, 4.0), &[Some(0)], 1.0);
        assert!(soe.factor.is_none());
    }
}
