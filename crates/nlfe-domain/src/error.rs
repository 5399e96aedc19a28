//! Error types for nlfe-domain

use thiserror::Error;

pub type DomainResult<T> = std::result::Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Node {0} not found in domain")]
    NodeNotFound(i32),

    #[error("Element {0} not found in domain")]
    ElementNotFound(i32),

    #[error("Constraint {0} not found in domain")]
    ConstraintNotFound(i32),

    #[error("Load pattern {0} not found in domain")]
    PatternNotFound(i32),

    #[error("Duplicate {kind} tag {tag}")]
    DuplicateTag { kind: &'static str, tag: i32 },

    #[error("DOF {dof} out of range for node {node} with {ndof} DOFs")]
    DofOutOfRange { node: i32, dof: usize, ndof: usize },

    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("State codec error: {0}")]
    Codec(#[from] serde_json::Error),
}
