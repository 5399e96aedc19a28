//! Compressed sparse row storage with pluggable sparse solvers.

use super::{LinearSoe, allocate, allocate_vector, check_finite, check_matrix_ids, scatter_add};
use crate::error::{SolverError, SolverResult};
use crate::model::DofGraph;
use log::{debug, warn};
use nalgebra::linalg::LU;
use nalgebra::{DMatrix, DVector, Dyn};
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::{CscMatrix, CsrMatrix, SparseEntryMut};

/// Solver operating on CSR storage
pub trait SparseSolver: std::fmt::Debug + Send {
    fn name(&self) -> &'static str;

    /// Prepare for solves with a new matrix (factorize, build preconditioner)
    fn factor(&mut self, a: &CsrMatrix<f64>) -> SolverResult<()>;

    fn solve(&mut self, a: &CsrMatrix<f64>, b: &DVector<f64>) -> SolverResult<DVector<f64>>;
}

/// y = A x
fn spmv(a: &CsrMatrix<f64>, x: &DVector<f64>) -> DVector<f64> {
    DVector::from_iterator(
        a.nrows(),
        a.row_iter().map(|row| {
            row.col_indices()
                .iter()
                .zip(row.values())
                .map(|(&j, v)| v * x[j])
                .sum::<f64>()
        }),
    )
}

/// Jacobi preconditioner; rows with a zero diagonal (Lagrange multipliers)
/// keep a unit entry
fn inverse_diagonal(a: &CsrMatrix<f64>) -> SolverResult<DVector<f64>> {
    let mut diag = DVector::zeros(a.nrows());
    for (i, row) in a.row_iter().enumerate() {
        let d = row
            .col_indices()
            .iter()
            .zip(row.values())
            .find(|&(&j, _)| j == i)
            .map_or(0.0, |(_, v)| *v);
        if !d.is_finite() {
            return Err(SolverError::SingularSystem(format!(
                "non-finite diagonal at equation {i}"
            )));
        }
        diag[i] = if d == 0.0 { 1.0 } else { 1.0 / d };
    }
    Ok(diag)
}

fn densify(a: &CsrMatrix<f64>) -> DMatrix<f64> {
    let mut dense = DMatrix::zeros(a.nrows(), a.ncols());
    for (i, row) in a.row_iter().enumerate() {
        for (&j, &v) in row.col_indices().iter().zip(row.values()) {
            dense[(i, j)] = v;
        }
    }
    dense
}

/// Direct solve of general (indefinite, unsymmetric) systems: the CSR matrix
/// is densified and LU-factored with partial pivoting
#[derive(Debug, Clone, Default)]
pub struct SparseLu {
    lu: Option<LU<f64, Dyn, Dyn>>,
}

impl SparseSolver for SparseLu {
    fn name(&self) -> &'static str {
        "SparseLU"
    }

    fn factor(&mut self, a: &CsrMatrix<f64>) -> SolverResult<()> {
        let lu = densify(a).lu();
        if !lu.is_invertible() {
            return Err(SolverError::SingularSystem(
                "sparse LU: matrix is singular".to_string(),
            ));
        }
        self.lu = Some(lu);
        Ok(())
    }

    fn solve(&mut self, _a: &CsrMatrix<f64>, b: &DVector<f64>) -> SolverResult<DVector<f64>> {
        self.lu
            .as_ref()
            .ok_or_else(|| SolverError::SingularSystem("matrix not factored".to_string()))?
            .solve(b)
            .ok_or_else(|| SolverError::SingularSystem("sparse LU solve failed".to_string()))
    }
}

/// Sparse Cholesky factorization for symmetric positive definite systems
#[derive(Default)]
pub struct SparseCholesky {
    factor: Option<CscCholesky<f64>>,
}

impl std::fmt::Debug for SparseCholesky {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparseCholesky")
            .field("factored", &self.factor.is_some())
            .finish()
    }
}

impl SparseSolver for SparseCholesky {
    fn name(&self) -> &'static str {
        "SparseCholesky"
    }

    fn factor(&mut self, a: &CsrMatrix<f64>) -> SolverResult<()> {
        let csc = CscMatrix::from(a);
        let factor = CscCholesky::factor(&csc)
            .map_err(|e| SolverError::SingularSystem(format!("sparse Cholesky: {e:?}")))?;
        self.factor = Some(factor);
        Ok(())
    }

    fn solve(&mut self, a: &CsrMatrix<f64>, b: &DVector<f64>) -> SolverResult<DVector<f64>> {
        let factor = self
            .factor
            .as_ref()
            .ok_or_else(|| SolverError::SingularSystem("matrix not factored".to_string()))?;
        let rhs = DMatrix::from_column_slice(a.nrows(), 1, b.as_slice());
        let solution = factor.solve(&rhs);
        Ok(DVector::from_column_slice(solution.as_slice()))
    }
}

/// Jacobi-preconditioned conjugate gradient (symmetric positive definite)
#[derive(Debug, Clone)]
pub struct ConjugateGradient {
    pub tolerance: f64,
    pub max_iterations: Option<usize>,
    inv_diag: DVector<f64>,
}

impl ConjugateGradient {
    pub fn new(tolerance: f64, max_iterations: Option<usize>) -> Self {
        Self {
            tolerance,
            max_iterations,
            inv_diag: DVector::zeros(0),
        }
    }
}

impl Default for ConjugateGradient {
    fn default() -> Self {
        Self::new(1e-12, None)
    }
}

impl SparseSolver for ConjugateGradient {
    fn name(&self) -> &'static str {
        "PCG"
    }

    fn factor(&mut self, a: &CsrMatrix<f64>) -> SolverResult<()> {
        self.inv_diag = inverse_diagonal(a)?;
        Ok(())
    }

    fn solve(&mut self, a: &CsrMatrix<f64>, b: &DVector<f64>) -> SolverResult<DVector<f64>> {
        let n = b.len();
        let max_iter = self.max_iterations.unwrap_or(10 * n.max(1));
        let b_norm = b.norm();
        let mut x = DVector::zeros(n);
        if b_norm == 0.0 {
            return Ok(x);
        }

        let mut r = b.clone();
        let mut z = r.component_mul(&self.inv_diag);
        let mut p = z.clone();
        let mut rz = r.dot(&z);
        for iter in 0..max_iter {
            let ap = spmv(a, &p);
            let pap = p.dot(&ap);
            if pap <= 0.0 {
                return Err(SolverError::SingularSystem(format!(
                    "matrix not positive definite (pᵀAp = {pap:.3e})"
                )));
            }
            let alpha = rz / pap;
            x.axpy(alpha, &p, 1.0);
            r.axpy(-alpha, &ap, 1.0);
            if r.norm() <= self.tolerance * b_norm {
                debug!("PCG converged in {} iterations", iter + 1);
                return Ok(x);
            }
            z = r.component_mul(&self.inv_diag);
            let rz_next = r.dot(&z);
            p = &z + (rz_next / rz) * &p;
            rz = rz_next;
        }
        warn!("PCG did not converge in {max_iter} iterations");
        Err(SolverError::SingularSystem(format!(
            "PCG did not converge in {max_iter} iterations"
        )))
    }
}

/// Jacobi-preconditioned BiCGSTAB for general systems
#[derive(Debug, Clone)]
pub struct BiCgStab {
    pub tolerance: f64,
    pub max_iterations: Option<usize>,
    inv_diag: DVector<f64>,
}

impl BiCgStab {
    pub fn new(tolerance: f64, max_iterations: Option<usize>) -> Self {
        Self {
            tolerance,
            max_iterations,
            inv_diag: DVector::zeros(0),
        }
    }
}

impl Default for BiCgStab {
    fn default() -> Self {
        Self::new(1e-12, None)
    }
}

impl SparseSolver for BiCgStab {
    fn name(&self) -> &'static str {
        "BiCGSTAB"
    }

    fn factor(&mut self, a: &CsrMatrix<f64>) -> SolverResult<()> {
        self.inv_diag = inverse_diagonal(a)?;
        Ok(())
    }

    fn solve(&mut self, a: &CsrMatrix<f64>, b: &DVector<f64>) -> SolverResult<DVector<f64>> {
        let n = b.len();
        let max_iter = self.max_iterations.unwrap_or(10 * n.max(1));
        let b_norm = b.norm();
        let mut x = DVector::zeros(n);
        if b_norm == 0.0 {
            return Ok(x);
        }

        let mut r = b.clone();
        let r_hat = r.clone();
        let (mut rho, mut alpha, mut omega) = (1.0, 1.0, 1.0);
        let mut v = DVector::zeros(n);
        let mut p = DVector::zeros(n);
        for iter in 0..max_iter {
            let rho_next = r_hat.dot(&r);
            if rho_next == 0.0 {
                break;
            }
            let beta = (rho_next / rho) * (alpha / omega);
            rho = rho_next;
            p = &r + beta * (&p - omega * &v);
            let p_hat = p.component_mul(&self.inv_diag);
            v = spmv(a, &p_hat);
            let denom = r_hat.dot(&v);
            if denom == 0.0 {
                break;
            }
            alpha = rho / denom;
            let s = &r - alpha * &v;
            if s.norm() <= self.tolerance * b_norm {
                x.axpy(alpha, &p_hat, 1.0);
                debug!("BiCGSTAB converged in {} half-iterations", 2 * iter + 1);
                return Ok(x);
            }
            let s_hat = s.component_mul(&self.inv_diag);
            let t = spmv(a, &s_hat);
            let tt = t.dot(&t);
            if tt == 0.0 {
                break;
            }
            omega = t.dot(&s) / tt;
            x.axpy(alpha, &p_hat, 1.0);
            x.axpy(omega, &s_hat, 1.0);
            r = &s - omega * &t;
            if r.norm() <= self.tolerance * b_norm {
                debug!("BiCGSTAB converged in {} iterations", iter + 1);
                return Ok(x);
            }
            if omega == 0.0 {
                break;
            }
        }
        warn!("BiCGSTAB failed to converge");
        Err(SolverError::SingularSystem(
            "BiCGSTAB breakdown or no convergence".to_string(),
        ))
    }
}

/// CSR storage sized from the DOF graph pattern
#[derive(Debug)]
pub struct SparseGenSoe {
    a: CsrMatrix<f64>,
    b: DVector<f64>,
    x: DVector<f64>,
    solver: Box<dyn SparseSolver>,
    factored: bool,
}

impl SparseGenSoe {
    pub fn new(solver: Box<dyn SparseSolver>) -> Self {
        Self {
            a: CsrMatrix::zeros(0, 0),
            b: DVector::zeros(0),
            x: DVector::zeros(0),
            solver,
            factored: false,
        }
    }

    pub fn solver_name(&self) -> &'static str {
        self.solver.name()
    }

    pub fn num_nonzeros(&self) -> usize {
        self.a.nnz()
    }
}

impl Default for SparseGenSoe {
    fn default() -> Self {
        Self::new(Box::new(SparseLu::default()))
    }
}

impl LinearSoe for SparseGenSoe {
    fn name(&self) -> &'static str {
        "SparseGeneral"
    }

    fn set_size(&mut self, graph: &DofGraph) -> SolverResult<()> {
        let n = graph.num_eqn();
        let (offsets, columns) = graph.csr_pattern();
        let values = allocate(n, Some(columns.len()))?;
        self.a = CsrMatrix::try_from_csr_data(n, n, offsets, columns, values).map_err(|e| {
            SolverError::Allocation {
                num_eqn: n,
                reason: format!("invalid sparsity pattern: {e}"),
            }
        })?;
        self.b = allocate_vector(n)?;
        self.x = allocate_vector(n)?;
        self.factored = false;
        debug!("sparse SOE sized: {n} equations, {} nonzeros", self.a.nnz());
        Ok(())
    }

    fn num_eqn(&self) -> usize {
        self.b.len()
    }

    fn zero_a(&mut self) {
        self.a.values_mut().fill(0.0);
        self.factored = false;
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
                match self.a.get_entry_mut(i, j) {
                    Some(SparseEntryMut::NonZero(v)) => *v += factor * m[(r, c)],
                    _ => panic!("entry ({i}, {j}) outside sparsity pattern"),
                }
            }
        }
        self.factored = false;
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
        if !self.factored {
            self.solver.factor(&self.a)?;
            self.factored = true;
        }
        let x = self.solver.solve(&self.a, &self.b)?;
        check_finite(&x, self.solver.name())?;
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
        self.a
            .get_entry(i, j)
            .map_or(0.0, |entry| entry.into_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn spd_system(solver: Box<dyn SparseSolver>) -> (SparseGenSoe, DVector<f64>) {
        let mut soe = SparseGenSoe::new(solver);
        soe.set_size(&DofGraph::dense(3)).unwrap();
        let k = DMatrix::from_row_slice(3, 3, &[4.0, -1.0, 0.0, -1.0, 4.0, -1.0, 0.0, -1.0, 4.0]);
        soe.add_a(&k, &[Some(0), Some(1), Some(2)], 1.0);
        let x0 = DVector::from_vec(vec![0.5, 1.0, -1.5]);
        soe.set_b(&(&k * &x0));
        (soe, x0)
    }

    #[test]
    fn every_sparse_solver_recovers_solution() {
        let solvers: Vec<Box<dyn SparseSolver>> = vec![
            Box::new(SparseCholesky::default()),
            Box::new(ConjugateGradient::default()),
            Box::new(BiCgStab::default()),
            Box::new(SparseLu::default()),
        ];
        for solver in solvers {
            let (mut soe, x0) = spd_system(solver);
            soe.solve().unwrap();
            assert_relative_eq!(soe.x().clone(), x0, epsilon = 1e-9);
        }
    }

    #[test]
    fn unsymmetric_bicgstab() {
        let mut soe = SparseGenSoe::new(Box::new(BiCgStab::default()));
        soe.set_size(&DofGraph::dense(2)).unwrap();
        let a = DMatrix::from_row_slice(2, 2, &[3.0, 1.0, -1.0, 2.0]);
        soe.add_a(&a, &[Some(0), Some(1)], 1.0);
        let x0 = DVector::from_vec(vec![1.0, 2.0]);
        soe.set_b(&(&a * &x0));
        soe.solve().unwrap();
        assert_relative_eq!(soe.x().clone(), x0, epsilon = 1e-9);
        assert_relative_eq!(soe.a_entry(1, 0), -1.0);
    }

    #[test]
    fn zero_diagonal_gets_unit_preconditioner() {
        let a = CsrMatrix::from(&nalgebra_sparse::CooMatrix::try_from_triplets(
            2,
            2,
            vec![0, 0, 1],
            vec![0, 1, 0],
            vec![4.0, 1.0, 1.0],
        )
        .unwrap());
        let inv = inverse_diagonal(&a).unwrap();
        assert_relative_eq!(inv[0], 0.25);
        assert_relative_eq!(inv[1], 1.0);
    }

    #[test]
    fn saddle_point_system_solves_with_default_solver() {
        // [k 1; 1 0] as left by a Lagrange multiplier on one DOF
        let mut soe = SparseGenSoe::default();
        soe.set_size(&DofGraph::dense(2)).unwrap();
        let a = DMatrix::from_row_slice(2, 2, &[1000.0, 1.0, 1.0, 0.0]);
        soe.add_a(&a, &[Some(0), Some(1)], 1.0);
        let x0 = DVector::from_vec(vec![0.01, -3.0]);
        soe.set_b(&(&a * &x0));
        soe.solve().unwrap();
        assert_eq!(soe.solver_name(), "SparseLU");
        assert_relative_eq!(soe.x().clone(), x0, epsilon = 1e-12);
    }
}
