//! Error types for nlfe-solver

use nlfe_domain::DomainError;
use thiserror::Error;

pub type SolverResult<T> = std::result::Result<T, SolverError>;

#[derive(Error, Debug)]
pub enum SolverError {
    #[error("DOF numbering failed: {0}")]
    Numbering(String),

    #[error("Constraint conflict at node {node} dof {dof}: {reason}")]
    ConstraintConflict {
        node: i32,
        dof: usize,
        reason: String,
    },

    #[error("Cannot allocate system storage for {num_eqn} equations: {reason}")]
    Allocation { num_eqn: usize, reason: String },

    #[error("Singular or ill-conditioned system: {0}")]
    SingularSystem(String),

    #[error("No convergence after {iterations} iterations (norm {norm:.3e})")]
    NonConvergence { iterations: usize, norm: f64 },

    #[error("Integration scheme not ready for {stage}: {reason}")]
    SchemeNotInitialized { stage: &'static str, reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

impl SolverError {
    /// Negative status code of the error kind
    pub fn status_code(&self) -> i32 {
        match self {
            SolverError::Numbering(_) => -1,
            SolverError::ConstraintConflict { .. } => -2,
            SolverError::Allocation { .. } => -3,
            SolverError::SingularSystem(_) => -4,
            SolverError::NonConvergence { .. } => -5,
            SolverError::SchemeNotInitialized { .. } => -6,
            SolverError::InvalidInput(_) => -7,
            SolverError::Domain(_) => -8,
            SolverError::Config(_) => -9,
        }
    }

    pub(crate) fn stage(stage: &'static str, reason: impl Into<String>) -> Self {
        SolverError::SchemeNotInitialized {
            stage,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_are_distinct_and_negative() {
        let errors = [
            SolverError::Numbering(String::new()),
            SolverError::ConstraintConflict {
                node: 1,
                dof: 0,
                reason: String::new(),
            },
            SolverError::Allocation {
                num_eqn: 1,
                reason: String::new(),
            },
            SolverError::SingularSystem(String::new()),
            SolverError::NonConvergence {
                iterations: 1,
                norm: 1.0,
            },
            SolverError::stage("update", "x"),
            SolverError::InvalidInput(String::new()),
            SolverError::Domain(DomainError::NodeNotFound(1)),
        ];
        let mut codes: Vec<i32> = errors.iter().map(|e| e.status_code()).collect();
        assert!(codes.iter().all(|&c| c < 0));
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
