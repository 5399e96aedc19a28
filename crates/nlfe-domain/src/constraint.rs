//! Single-point and multi-point constraints.

use crate::error::{DomainError, DomainResult};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Degree of freedom index (0-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DofId {
    /// Node tag
    pub node: i32,
    /// DOF index within the node
    pub dof: usize,
}

impl DofId {
    pub fn new(node: i32, dof: usize) -> Self {
        Self { node, dof }
    }
}

/// Single-point constraint: `u[node, dof] = value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpConstraint {
    pub tag: i32,
    pub node: i32,
    pub dof: usize,
    pub value: f64,
}

impl SpConstraint {
    /// Homogeneous constraint (fixed DOF)
    pub fn fixed(tag: i32, node: i32, dof: usize) -> Self {
        Self::prescribed(tag, node, dof, 0.0)
    }

    pub fn prescribed(tag: i32, node: i32, dof: usize, value: f64) -> Self {
        Self {
            tag,
            node,
            dof,
            value,
        }
    }

    pub fn is_homogeneous(&self) -> bool {
        self.value == 0.0
    }

    pub fn dof_id(&self) -> DofId {
        DofId::new(self.node, self.dof)
    }
}

/// Multi-point constraint: `u_c = C · u_r`.
///
/// Row `i` of `C` belongs to `constrained_dofs[i]` of the constrained node,
/// column `j` to `retained_dofs[j]` of the retained node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MpConstraint {
    pub tag: i32,
    pub retained_node: i32,
    pub constrained_node: i32,
    pub retained_dofs: Vec<usize>,
    pub constrained_dofs: Vec<usize>,
    pub coefficients: DMatrix<f64>,
}

impl MpConstraint {
    pub fn new(
        tag: i32,
        retained_node: i32,
        constrained_node: i32,
        retained_dofs: Vec<usize>,
        constrained_dofs: Vec<usize>,
        coefficients: DMatrix<f64>,
    ) -> DomainResult<Self> {
        if retained_node == constrained_node {
            return Err(DomainError::InvalidInput(format!(
                "MP constraint {tag}: node {retained_node} cannot constrain itself"
            )));
        }
        if coefficients.nrows() != constrained_dofs.len() {
            return Err(DomainError::DimensionMismatch {
                expected: constrained_dofs.len(),
                found: coefficients.nrows(),
            });
        }
        if coefficients.ncols() != retained_dofs.len() {
            return Err(DomainError::DimensionMismatch {
                expected: retained_dofs.len(),
                found: coefficients.ncols(),
            });
        }
        if constrained_dofs.is_empty() {
            return Err(DomainError::InvalidInput(format!(
                "MP constraint {tag} constrains no DOFs"
            )));
        }
        Ok(Self {
            tag,
            retained_node,
            constrained_node,
            retained_dofs,
            constrained_dofs,
            coefficients,
        })
    }

    /// Constrained node follows the retained node on the listed DOFs.
    pub fn equal_dof(
        tag: i32,
        retained_node: i32,
        constrained_node: i32,
        dofs: &[usize],
    ) -> DomainResult<Self> {
        let n = dofs.len();
        Self::new(
            tag,
            retained_node,
            constrained_node,
            dofs.to_vec(),
            dofs.to_vec(),
            DMatrix::identity(n, n),
        )
    }

    /// Number of scalar conditions
    pub fn num_conditions(&self) -> usize {
        self.constrained_dofs.len()
    }

    pub fn constrained_dof_ids(&self) -> impl Iterator<Item = DofId> + '_ {
        self.constrained_dofs
            .iter()
            .map(|&d| DofId::new(self.constrained_node, d))
    }

    /// Constraint rows over `[u_r, u_c]`: `[−C  I] · [u_r; u_c] = 0`
    pub fn constraint_matrix(&self) -> DMatrix<f64> {
        let nr = self.retained_dofs.len();
        let nc = self.constrained_dofs.len();
        let mut g = DMatrix::zeros(nc, nr + nc);
        g.view_mut((0, 0), (nc, nr)).copy_from(&(-&self.coefficients));
        for i in 0..nc {
            g[(i, nr + i)] = 1.0;
        }
        g
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_dof_is_identity() {
        let mp = MpConstraint::equal_dof(1, 10, 20, &[0, 1]).unwrap();
        assert_eq!(mp.coefficients, DMatrix::identity(2, 2));
        assert_eq!(mp.num_conditions(), 2);

        let g = mp.constraint_matrix();
        assert_eq!(g.ncols(), 4);
        assert_eq!(g[(0, 0)], -1.0);
        assert_eq!(g[(1, 3)], 1.0);
    }

    #[test]
    fn shape_is_validated() {
        let bad = MpConstraint::new(1, 1, 2, vec![0], vec![0, 1], DMatrix::zeros(1, 1));
        assert!(bad.is_err());
        assert!(MpConstraint::equal_dof(1, 3, 3, &[0]).is_err());
    }

    #[test]
    fn sp_homogeneity() {
        assert!(SpConstraint::fixed(1, 1, 0).is_homogeneous());
        assert!(!SpConstraint::prescribed(2, 1, 0, 0.1).is_homogeneous());
    }
}
