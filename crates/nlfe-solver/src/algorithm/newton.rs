//! Newton-Raphson iteration.
//!
//! ```text
//! R_0 = P − F_int(u_0)
//! repeat:  K Δu = R_i,  u_{i+1} = u_i + Δu,  R_{i+1} = P − F_int(u_{i+1})
//! ```
//!
//! The full method re-forms K every iteration; the modified method forms it
//! once per step and reuses the factorization.

use super::line_search::InitialInterpolatedLineSearch;
use super::{SolutionAlgorithm, StepContext};
use crate::error::SolverResult;
use crate::integrator::TangentKind;
use log::debug;

#[derive(Debug, Clone, Default)]
pub struct NewtonRaphson {
    tangent: TangentKind,
    line_search: Option<InitialInterpolatedLineSearch>,
}

impl NewtonRaphson {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tangent(mut self, tangent: TangentKind) -> Self {
        self.tangent = tangent;
        self
    }

    pub fn with_line_search(mut self, line_search: InitialInterpolatedLineSearch) -> Self {
        self.line_search = Some(line_search);
        self
    }
}

impl SolutionAlgorithm for NewtonRaphson {
    fn name(&self) -> &'static str {
        "NewtonRaphson"
    }

    fn solve_current_step(&mut self, ctx: &mut StepContext<'_>) -> SolverResult<usize> {
        ctx.form_unbalance()?;
        ctx.test.start();
        loop {
            ctx.form_tangent(self.tangent)?;
            let r0 = ctx.soe.b().clone();
            ctx.solve_and_update()?;
            ctx.form_unbalance()?;
            if let Some(line_search) = &self.line_search {
                let dx = ctx.soe.x().clone();
                line_search.search(&dx, &r0, ctx)?;
            }
            if let Some(k) = ctx.check()? {
                debug!("Newton-Raphson converged in {k} iterations");
                return Ok(k);
            }
        }
    }
}

/// Newton iteration with the tangent formed once, at the start of the step
#[derive(Debug, Clone, Default)]
pub struct ModifiedNewton {
    tangent: TangentKind,
}

impl ModifiedNewton {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tangent(mut self, tangent: TangentKind) -> Self {
        self.tangent = tangent;
        self
    }
}

impl SolutionAlgorithm for ModifiedNewton {
    fn name(&self) -> &'static str {
        "ModifiedNewton"
    }

    fn solve_current_step(&mut self, ctx: &mut StepContext<'_>) -> SolverResult<usize> {
        ctx.form_unbalance()?;
        ctx.test.start();
        ctx.form_tangent(self.tangent)?;
        loop {
            ctx.solve_and_update()?;
            ctx.form_unbalance()?;
            if let Some(k) = ctx.check()? {
                debug!("modified Newton converged in {k} iterations");
                return Ok(k);
            }
        }
    }
}
