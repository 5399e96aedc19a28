//! Reference finite element domain.
//!
//! Nodes, a small element and material set, single/multi-point constraints
//! and load patterns: everything the solution core in `nlfe-solver` consumes.

pub mod codec;
pub mod constraint;
pub mod domain;
pub mod element;
pub mod error;
pub mod load;
pub mod material;
pub mod node;

pub use codec::StateCodec;
pub use constraint::{DofId, MpConstraint, SpConstraint};
pub use domain::Domain;
pub use element::{Element, Truss, ZeroLength};
pub use error::{DomainError, DomainResult};
pub use load::{LoadPattern, NodalLoad, TimeSeries};
pub use material::{BilinearSteel, ElasticMaterial, UniaxialMaterial};
pub use node::{Node, NodeState};
