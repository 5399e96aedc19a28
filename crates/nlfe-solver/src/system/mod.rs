//! Systems of equations `A x = b`.
//!
//! The storage scheme is independent of what is assembled into it: every
//! [`LinearSoe`] is sized from the model's [`DofGraph`], receives element
//! contributions through `add_a`/`add_b` and solves in place. A factorization
//! is kept until `A` is modified, so repeated solves against the same matrix
//! (modified Newton, displacement control) only back-substitute.

use crate::error::{SolverError, SolverResult};
use crate::model::DofGraph;
use nalgebra::{DMatrix, DVector};

pub mod band_spd;
pub mod full_general;
pub mod sparse_general;
pub mod substructured;

pub use band_spd::BandSpdSoe;
pub use full_general::FullGenSoe;
pub use sparse_general::{
    BiCgStab, ConjugateGradient, SparseCholesky, SparseGenSoe, SparseLu, SparseSolver,
};
pub use substructured::SubstructuredSoe;

pub trait LinearSoe: std::fmt::Debug + Send {
    fn name(&self) -> &'static str;

    /// Allocate storage for the equations of `graph`; zeroes A, b and x
    fn set_size(&mut self, graph: &DofGraph) -> SolverResult<()>;

    fn num_eqn(&self) -> usize;

    fn zero_a(&mut self);

    fn zero_b(&mut self);

    /// `A[ids, ids] += factor · m`; `None` ids are skipped.
    ///
    /// # Panics
    /// If `ids` does not match the size of `m`.
    fn add_a(&mut self, m: &DMatrix<f64>, ids: &[Option<usize>], factor: f64);

    /// `b[ids] += factor · v`; `None` ids are skipped.
    ///
    /// # Panics
    /// If `ids` does not match the size of `v`.
    fn add_b(&mut self, v: &DVector<f64>, ids: &[Option<usize>], factor: f64);

    fn set_b(&mut self, v: &DVector<f64>);

    fn set_x(&mut self, v: &DVector<f64>);

    /// Solve for x with the current A and b
    fn solve(&mut self) -> SolverResult<()>;

    fn x(&self) -> &DVector<f64>;

    fn b(&self) -> &DVector<f64>;

    fn a_entry(&self, i: usize, j: usize) -> f64;
}

/// Zeroed storage of `len` values, reported as an allocation failure rather
/// than aborting when the size overflows or memory is short.
pub(crate) fn allocate(num_eqn: usize, len: Option<usize>) -> SolverResult<Vec<f64>> {
    let len = len.ok_or_else(|| SolverError::Allocation {
        num_eqn,
        reason: "storage size overflows".to_string(),
    })?;
    let mut values = Vec::new();
    values
        .try_reserve_exact(len)
        .map_err(|e| SolverError::Allocation {
            num_eqn,
            reason: e.to_string(),
        })?;
    values.resize(len, 0.0);
    Ok(values)
}

pub(crate) fn allocate_vector(num_eqn: usize) -> SolverResult<DVector<f64>> {
    Ok(DVector::from_vec(allocate(num_eqn, Some(num_eqn))?))
}

pub(crate) fn scatter_add(
    target: &mut DVector<f64>,
    v: &DVector<f64>,
    ids: &[Option<usize>],
    factor: f64,
) {
    assert_eq!(
        v.len(),
        ids.len(),
        "vector of length {} assembled with {} ids",
        v.len(),
        ids.len()
    );
    for (k, id) in ids.iter().enumerate() {
        if let Some(i) = *id {
            target[i] += factor * v[k];
        }
    }
}

pub(crate) fn check_matrix_ids(m: &DMatrix<f64>, ids: &[Option<usize>]) {
    assert!(
        m.nrows() == ids.len() && m.ncols() == ids.len(),
        "{}x{} matrix assembled with {} ids",
        m.nrows(),
        m.ncols(),
        ids.len()
    );
}

pub(crate) fn check_finite(x: &DVector<f64>, solver: &str) -> SolverResult<()> {
    if x.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(SolverError::SingularSystem(format!(
            "{solver} produced a non-finite solution"
        )))
    }
}
