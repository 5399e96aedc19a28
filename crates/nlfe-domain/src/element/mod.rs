//! Element interface and the reference element implementations.

use crate::codec::StateCodec;
use crate::error::DomainResult;
use crate::node::Node;
use nalgebra::{DMatrix, DVector};
use std::fmt::Debug;

pub mod truss;
pub mod zero_length;

pub use truss::Truss;
pub use zero_length::ZeroLength;

/// Element interface consumed by the solution core.
///
/// Element DOFs are the concatenation of the DOFs of [`Element::node_tags`],
/// in that order. All matrices are `num_dof × num_dof` and evaluated at the
/// state set by the last [`Element::update`].
pub trait Element: StateCodec + Debug + Send {
    fn tag(&self) -> i32;

    fn node_tags(&self) -> &[i32];

    fn num_dof(&self) -> usize;

    /// Bind to the nodes (in `node_tags` order) and compute geometry
    fn connect(&mut self, nodes: &[&Node]) -> DomainResult<()>;

    /// Recompute trial state from the nodes' trial response
    fn update(&mut self, nodes: &[&Node]) -> DomainResult<()>;

    fn tangent_stiff(&self) -> DMatrix<f64>;

    fn initial_stiff(&self) -> DMatrix<f64>;

    /// Element damping matrix (material viscosity)
    fn damp(&self) -> DMatrix<f64> {
        DMatrix::zeros(self.num_dof(), self.num_dof())
    }

    fn mass(&self) -> DMatrix<f64>;

    /// Internal force at trial state, material viscous forces included
    fn resisting_force(&self) -> DVector<f64>;

    fn commit_state(&mut self);
    fn revert_to_last_commit(&mut self);
    fn revert_to_start(&mut self);
}

/// Scatter `k * pattern` into the 2-node block layout `[+p -p; -p +p]`.
///
/// `dofs` are the local positions within one node; `ndof` is the DOF count of
/// each node.
pub(crate) fn two_node_block(pattern: &DMatrix<f64>, dofs: &[usize], ndof: usize) -> DMatrix<f64> {
    let mut out = DMatrix::zeros(2 * ndof, 2 * ndof);
    for (a, &i) in dofs.iter().enumerate() {
        for (b, &j) in dofs.iter().enumerate() {
            let v = pattern[(a, b)];
            out[(i, j)] += v;
            out[(i, ndof + j)] -= v;
            out[(ndof + i, j)] -= v;
            out[(ndof + i, ndof + j)] += v;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_layout_is_symmetric_and_balanced() {
        let pattern = DMatrix::from_row_slice(2, 2, &[1.0, 0.5, 0.5, 2.0]);
        let k = two_node_block(&pattern, &[0, 1], 3);

        assert_eq!(k.nrows(), 6);
        assert_eq!(k, k.transpose());
        for row in 0..6 {
            assert!(k.row(row).sum().abs() < 1e-14);
        }
        assert_eq!(k[(2, 2)], 0.0);
    }
}
