//! Modal analysis: `K φ = ω² M φ` on the numbered model.
//!
//! The generalized problem is reduced to a standard symmetric one with the
//! Cholesky factor of the mass matrix, `M = L Lᵀ`:
//!
//! ```text
//! (L⁻¹ K L⁻ᵀ) ψ = λ ψ,    φ = L⁻ᵀ ψ
//! ```
//!
//! Mode shapes come out mass-normalised (`φᵀ M φ = 1`).

use crate::error::{SolverError, SolverResult};
use crate::handler::ConstraintHandler;
use crate::integrator::assemble_tangent;
use crate::model::{AnalysisModel, RayleighDamping, TangentFactors};
use crate::numberer::DofNumberer;
use crate::system::{FullGenSoe, LinearSoe};
use log::info;
use nalgebra::linalg::{Cholesky, SymmetricEigen};
use nalgebra::{DMatrix, DVector};
use nlfe_domain::Domain;
use std::f64::consts::PI;

#[derive(Debug, Clone)]
pub struct ModalResults {
    /// λ = ω², ascending
    pub eigenvalues: Vec<f64>,
    /// One mass-normalised mode per column, in equation space
    pub mode_shapes: DMatrix<f64>,
}

impl ModalResults {
    pub fn num_modes(&self) -> usize {
        self.eigenvalues.len()
    }

    /// ω in rad/s
    pub fn circular_frequencies(&self) -> Vec<f64> {
        self.eigenvalues.iter().map(|&l| l.max(0.0).sqrt()).collect()
    }

    /// f in Hz
    pub fn frequencies(&self) -> Vec<f64> {
        self.circular_frequencies()
            .into_iter()
            .map(|w| w / (2.0 * PI))
            .collect()
    }

    /// T = 2π/ω; infinite for rigid-body modes
    pub fn periods(&self) -> Vec<f64> {
        self.circular_frequencies()
            .into_iter()
            .map(|w| if w > 0.0 { 2.0 * PI / w } else { f64::INFINITY })
            .collect()
    }

    pub fn mode_shape(&self, mode: usize) -> Option<DVector<f64>> {
        (mode < self.num_modes()).then(|| self.mode_shapes.column(mode).into_owned())
    }
}

#[derive(Debug)]
pub struct ModalAnalysis {
    handler: Box<dyn ConstraintHandler>,
    numberer: Box<dyn DofNumberer>,
    model: AnalysisModel,
}

impl ModalAnalysis {
    pub fn new(handler: Box<dyn ConstraintHandler>, numberer: Box<dyn DofNumberer>) -> Self {
        Self {
            handler,
            numberer,
            model: AnalysisModel::new(),
        }
    }

    pub fn model(&self) -> &AnalysisModel {
        &self.model
    }

    /// Lowest `num_modes` eigenpairs at the domain's current state
    pub fn solve(&mut self, domain: &mut Domain, num_modes: usize) -> SolverResult<ModalResults> {
        self.model.clear();
        self.handler.handle(domain, &mut self.model)?;
        let n = self.numberer.number_dof(&mut self.model, domain)?;
        if n == 0 {
            return Err(SolverError::InvalidInput(
                "modal analysis of a model without equations".to_string(),
            ));
        }

        let mut soe = FullGenSoe::new();
        soe.set_size(&self.model.dof_graph())?;
        let none = RayleighDamping::default();
        assemble_tangent(&self.model, domain, &mut soe, &TangentFactors::stiffness_only(), &none)?;
        let k = soe.matrix().clone();
        let mass_only = TangentFactors {
            mass: 1.0,
            ..TangentFactors::default()
        };
        assemble_tangent(&self.model, domain, &mut soe, &mass_only, &none)?;
        let m = soe.matrix().clone();

        let (eigenvalues, mode_shapes) = solve_generalized(k, m, num_modes.min(n))?;
        info!(
            "modal analysis: {} modes, ω1 = {:.4e} rad/s",
            eigenvalues.len(),
            eigenvalues.first().map_or(0.0, |l| l.max(0.0).sqrt())
        );
        Ok(ModalResults {
            eigenvalues,
            mode_shapes,
        })
    }
}

fn solve_generalized(
    k: DMatrix<f64>,
    m: DMatrix<f64>,
    num_modes: usize,
) -> SolverResult<(Vec<f64>, DMatrix<f64>)> {
    let n = k.nrows();
    let chol = Cholesky::new(m).ok_or_else(|| {
        SolverError::SingularSystem("mass matrix is not positive definite".to_string())
    })?;
    let l = chol.l();
    let reduce_err = || SolverError::SingularSystem("triangular solve with L failed".to_string());

    // L⁻¹ K L⁻ᵀ = L⁻¹ (L⁻¹ K)ᵀ for symmetric K
    let l_inv_k = l.solve_lower_triangular(&k).ok_or_else(reduce_err)?;
    let reduced = l
        .solve_lower_triangular(&l_inv_k.transpose())
        .ok_or_else(reduce_err)?;
    let reduced = 0.5 * (&reduced + reduced.transpose());

    let eigen = SymmetricEigen::new(reduced);
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));
    order.truncate(num_modes);

    let mut psi = DMatrix::zeros(n, order.len());
    for (col, &i) in order.iter().enumerate() {
        psi.set_column(col, &eigen.eigenvectors.column(i));
    }
    let phi = l
        .transpose()
        .solve_upper_triangular(&psi)
        .ok_or_else(reduce_err)?;
    let eigenvalues = order.iter().map(|&i| eigen.eigenvalues[i]).collect();
    Ok((eigenvalues, phi))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn two_dof_chain_frequencies() {
        // k = [2 -1; -1 1], m = I → λ = (3 ∓ √5)/2
        let k = DMatrix::from_row_slice(2, 2, &[2.0, -1.0, -1.0, 1.0]);
        let m = DMatrix::identity(2, 2);
        let (values, phi) = solve_generalized(k, m.clone(), 2).unwrap();
        assert_relative_eq!(values[0], (3.0 - 5f64.sqrt()) / 2.0, epsilon = 1e-12);
        assert_relative_eq!(values[1], (3.0 + 5f64.sqrt()) / 2.0, epsilon = 1e-12);

        let gram = phi.transpose() * &m * &phi;
        assert_relative_eq!(gram, DMatrix::identity(2, 2), epsilon = 1e-12);
    }

    #[test]
    fn singular_mass_is_reported() {
        let k = DMatrix::identity(2, 2);
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 0.0]);
        assert!(matches!(
            solve_generalized(k, m, 1),
            Err(SolverError::SingularSystem(_))
        ));
    }

    #[test]
    fn periods_follow_frequencies() {
        let results = ModalResults {
            eigenvalues: vec![4.0 * PI * PI, 0.0],
            mode_shapes: DMatrix::zeros(2, 2),
        };
        assert_relative_eq!(results.periods()[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(results.frequencies()[0], 1.0, epsilon = 1e-12);
        assert!(results.periods()[1].is_infinite());
    }
}
