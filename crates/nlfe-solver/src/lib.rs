//! Incremental-iterative nonlinear solution core.
//!
//! The pieces of an analysis are independent and pluggable:
//!
//! - a [`ConstraintHandler`] builds the [`AnalysisModel`] (DOF groups and
//!   FE elements) from a [`Domain`](nlfe_domain::Domain),
//! - a [`DofNumberer`] assigns equation numbers,
//! - a [`LinearSoe`] stores and solves `A x = b`,
//! - an [`Integrator`] forms tangent and residual and updates the response,
//! - a [`SolutionAlgorithm`] iterates a step until the [`ConvergenceTest`]
//!   is satisfied.
//!
//! [`Analysis`] drives them step by step; [`ModalAnalysis`] solves the
//! undamped eigenproblem of the same model.

pub mod algorithm;
pub mod analysis;
pub mod config;
pub mod convergence;
pub mod eigen;
pub mod error;
pub mod handler;
pub mod integrator;
pub mod model;
pub mod numberer;
pub mod system;

pub use algorithm::{
    InitialInterpolatedLineSearch, Linear, ModifiedNewton, NewtonRaphson, SolutionAlgorithm,
    StepContext,
};
pub use analysis::{Analysis, StepReport};
pub use config::{
    AlgorithmConfig, AnalysisConfig, HandlerConfig, IntegratorConfig, NumbererConfig,
    SparseSolverConfig, SystemConfig, TestConfig,
};
pub use convergence::{ConvergenceTest, Criterion, FixedIterations, NormTest, NormType, TestOutcome};
pub use eigen::{ModalAnalysis, ModalResults};
pub use error::{SolverError, SolverResult};
pub use handler::{
    ConstraintHandler, LagrangeHandler, PenaltyHandler, PlainHandler, TransformationHandler,
};
pub use integrator::{
    DisplacementControl, GeneralizedAlpha, Integrator, IntegratorState, LoadControl, Newmark,
    StageTracker, TangentKind,
};
pub use model::{AnalysisModel, RayleighDamping, ResponseKind, TangentFactors};
pub use numberer::{DofNumberer, PlainNumberer, ReverseCuthillMcKee};
pub use system::{
    BandSpdSoe, BiCgStab, ConjugateGradient, FullGenSoe, LinearSoe, SparseCholesky, SparseGenSoe,
    SparseLu, SparseSolver, SubstructuredSoe,
};
