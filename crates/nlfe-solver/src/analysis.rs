//! The analysis driver.
//!
//! `Analysis` owns one of each component and drives steps against a
//! borrowed domain. Whenever the domain's change stamp differs from the one
//! the model was built for, the model is rebuilt, renumbered and the system
//! resized before the next step.

use crate::algorithm::{SolutionAlgorithm, StepContext};
use crate::config::AnalysisConfig;
use crate::convergence::ConvergenceTest;
use crate::error::SolverResult;
use crate::handler::ConstraintHandler;
use crate::integrator::Integrator;
use crate::model::{AnalysisModel, ResponseKind};
use crate::numberer::DofNumberer;
use crate::system::LinearSoe;
use log::{info, warn};
use nalgebra::DVector;
use nlfe_domain::Domain;

/// Outcome of one converged step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    pub iterations: usize,
    /// Domain time (or load factor) after the step
    pub time: f64,
}

#[derive(Debug)]
pub struct Analysis {
    handler: Box<dyn ConstraintHandler>,
    numberer: Box<dyn DofNumberer>,
    model: AnalysisModel,
    soe: Box<dyn LinearSoe>,
    integrator: Box<dyn Integrator>,
    algorithm: Box<dyn SolutionAlgorithm>,
    test: Box<dyn ConvergenceTest>,
    stamp: Option<u64>,
}

impl Analysis {
    pub fn new(
        handler: Box<dyn ConstraintHandler>,
        numberer: Box<dyn DofNumberer>,
        soe: Box<dyn LinearSoe>,
        integrator: Box<dyn Integrator>,
        algorithm: Box<dyn SolutionAlgorithm>,
        test: Box<dyn ConvergenceTest>,
    ) -> Self {
        Self {
            handler,
            numberer,
            model: AnalysisModel::new(),
            soe,
            integrator,
            algorithm,
            test,
            stamp: None,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> SolverResult<Self> {
        Ok(Self::new(
            config.handler.build(),
            config.numberer.build(),
            config.system.build(),
            config.integrator.build()?,
            config.algorithm.build(),
            config.test.build(),
        ))
    }

    pub fn model(&self) -> &AnalysisModel {
        &self.model
    }

    pub fn soe(&self) -> &dyn LinearSoe {
        self.soe.as_ref()
    }

    pub fn integrator(&self) -> &dyn Integrator {
        self.integrator.as_ref()
    }

    pub fn test(&self) -> &dyn ConvergenceTest {
        self.test.as_ref()
    }

    /// Rebuild the model from the domain, number it, size the system and
    /// re-initialise the integrator
    pub fn domain_changed(&mut self, domain: &mut Domain) -> SolverResult<()> {
        self.stamp = None;
        self.model.clear();
        self.handler.handle(domain, &mut self.model)?;
        let num_eqn = self.numberer.number_dof(&mut self.model, domain)?;
        self.soe.set_size(&self.model.dof_graph())?;
        self.integrator
            .domain_changed(&mut self.model, domain, self.soe.as_mut())?;
        self.stamp = Some(domain.change_stamp());
        info!(
            "analysis set up: {} equations ({} handler, {} numberer, {} system, {} integrator)",
            num_eqn,
            self.handler.name(),
            self.numberer.name(),
            self.soe.name(),
            self.integrator.name()
        );
        Ok(())
    }

    /// Advance one step. On failure the trial state of domain and
    /// integrator is reverted to the last commit before the error returns.
    pub fn analyze_step(&mut self, domain: &mut Domain, dt: f64) -> SolverResult<StepReport> {
        if self.stamp != Some(domain.change_stamp()) {
            self.domain_changed(domain)?;
        }
        match self.try_step(domain, dt) {
            Ok(report) => Ok(report),
            Err(err) => {
                warn!("step failed at t = {}: {err}", domain.current_time());
                if let Err(revert) = self
                    .integrator
                    .revert_to_last_step(&mut self.model, domain)
                {
                    warn!("revert after failed step also failed: {revert}");
                }
                Err(err)
            }
        }
    }

    /// Run `num_steps` steps, stopping at the first failure
    pub fn analyze(
        &mut self,
        domain: &mut Domain,
        num_steps: usize,
        dt: f64,
    ) -> SolverResult<Vec<StepReport>> {
        let mut reports = Vec::with_capacity(num_steps);
        for _ in 0..num_steps {
            reports.push(self.analyze_step(domain, dt)?);
        }
        Ok(reports)
    }

    /// Committed response gathered into equation space
    pub fn committed_response(
        &self,
        domain: &Domain,
        kind: ResponseKind,
    ) -> SolverResult<DVector<f64>> {
        self.model.response(domain, kind, true)
    }

    fn try_step(&mut self, domain: &mut Domain, dt: f64) -> SolverResult<StepReport> {
        self.integrator
            .new_step(dt, &mut self.model, domain, self.soe.as_mut())?;
        let iterations = {
            let mut ctx = StepContext {
                domain: &mut *domain,
                model: &mut self.model,
                integrator: self.integrator.as_mut(),
                soe: self.soe.as_mut(),
                test: self.test.as_mut(),
            };
            self.algorithm.solve_current_step(&mut ctx)?
        };
        self.integrator.record_iterations(iterations);
        self.integrator.commit(&mut self.model, domain)?;
        Ok(StepReport {
            iterations,
            time: domain.current_time(),
        })
    }
}
