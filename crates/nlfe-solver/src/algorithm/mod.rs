//! Solution algorithms: the iteration loop of one step.

use crate::convergence::{ConvergenceTest, TestOutcome};
use crate::error::{SolverError, SolverResult};
use crate::integrator::{Integrator, TangentKind};
use crate::model::AnalysisModel;
use crate::system::LinearSoe;
use nlfe_domain::Domain;

pub mod line_search;
pub mod newton;

pub use line_search::InitialInterpolatedLineSearch;
pub use newton::{ModifiedNewton, NewtonRaphson};

/// Everything one step touches, borrowed for its duration
pub struct StepContext<'a> {
    pub domain: &'a mut Domain,
    pub model: &'a mut AnalysisModel,
    pub integrator: &'a mut dyn Integrator,
    pub soe: &'a mut dyn LinearSoe,
    pub test: &'a mut dyn ConvergenceTest,
}

impl StepContext<'_> {
    pub fn form_tangent(&mut self, kind: TangentKind) -> SolverResult<()> {
        self.integrator
            .form_tangent(kind, self.model, self.domain, self.soe)
    }

    pub fn form_unbalance(&mut self) -> SolverResult<()> {
        self.integrator
            .form_unbalance(self.model, self.domain, self.soe)
    }

    /// Solve the system and hand the increment to the integrator
    pub fn solve_and_update(&mut self) -> SolverResult<()> {
        self.soe.solve()?;
        let dx = self.soe.x().clone();
        self.integrator
            .update(&dx, self.model, self.domain, self.soe)
    }

    /// Run the convergence test on the current x and b. `Ok(Some(k))` on
    /// convergence at iteration k, `Ok(None)` to keep iterating.
    pub fn check(&mut self) -> SolverResult<Option<usize>> {
        match self.test.test(self.soe.x(), self.soe.b()) {
            TestOutcome::Converged(k) => Ok(Some(k)),
            TestOutcome::Continue => Ok(None),
            TestOutcome::Exhausted => Err(SolverError::NonConvergence {
                iterations: self.test.iterations(),
                norm: self.test.last_norm(),
            }),
            TestOutcome::NotStarted => Err(SolverError::stage("test", "start() was not called")),
        }
    }
}

pub trait SolutionAlgorithm: std::fmt::Debug + Send {
    fn name(&self) -> &'static str;

    /// Iterate the current step to equilibrium and return the number of
    /// iterations taken
    fn solve_current_step(&mut self, ctx: &mut StepContext<'_>) -> SolverResult<usize>;
}

/// One solve per step, no convergence test
#[derive(Debug, Clone, Copy, Default)]
pub struct Linear {
    tangent: TangentKind,
}

impl Linear {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tangent(tangent: TangentKind) -> Self {
        Self { tangent }
    }
}

impl SolutionAlgorithm for Linear {
    fn name(&self) -> &'static str {
        "Linear"
    }

    fn solve_current_step(&mut self, ctx: &mut StepContext<'_>) -> SolverResult<usize> {
        ctx.form_tangent(self.tangent)?;
        ctx.form_unbalance()?;
        ctx.solve_and_update()?;
        Ok(1)
    }
}
