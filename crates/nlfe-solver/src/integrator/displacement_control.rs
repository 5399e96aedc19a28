//! Static displacement control.
//!
//! The increment of one control DOF is prescribed and the load factor λ
//! becomes an unknown. With `K Δû = P_ref` (the reference load at λ = 1) a
//! step starts with `Δλ = Δ / Δû_c`, and every corrector `K Δu_r = R` is
//! augmented by `δλ Δû` with `δλ = −Δu_r,c / Δû_c` so that the control DOF
//! keeps its prescribed increment.

use super::{IntegratorState, Integrator, StageTracker, assemble_tangent, external_load};
use crate::error::{SolverError, SolverResult};
use crate::model::{AnalysisModel, RayleighDamping, TangentFactors};
use crate::system::LinearSoe;
use log::debug;
use nalgebra::DVector;
use nlfe_domain::Domain;

#[derive(Debug, Clone)]
pub struct DisplacementControl {
    node: i32,
    dof: usize,
    increment: f64,
    control_eqn: Option<usize>,
    reference_load: DVector<f64>,
    /// Δû for the current tangent
    reference_disp: DVector<f64>,
    lambda: f64,
    committed_lambda: f64,
    tracker: StageTracker,
}

impl DisplacementControl {
    pub fn new(node: i32, dof: usize, increment: f64) -> Self {
        Self {
            node,
            dof,
            increment,
            control_eqn: None,
            reference_load: DVector::zeros(0),
            reference_disp: DVector::zeros(0),
            lambda: 0.0,
            committed_lambda: 0.0,
            tracker: StageTracker::new(),
        }
    }

    pub fn load_factor(&self) -> f64 {
        self.lambda
    }

    fn control_eqn(&self, stage: &'static str) -> SolverResult<usize> {
        self.control_eqn
            .ok_or_else(|| SolverError::stage(stage, "control DOF has no equation"))
    }

    /// Solve `K Δû = P_ref` with the tangent already in the system
    fn solve_reference(&mut self, soe: &mut dyn LinearSoe, eqn: usize) -> SolverResult<f64> {
        soe.set_b(&self.reference_load);
        soe.solve()?;
        self.reference_disp = soe.x().clone();
        let du = self.reference_disp[eqn];
        if du.abs() < f64::EPSILON {
            return Err(SolverError::SingularSystem(format!(
                "reference load does not move node {} dof {}",
                self.node, self.dof
            )));
        }
        Ok(du)
    }

    fn apply_increment(
        &mut self,
        d_lambda: f64,
        du: &DVector<f64>,
        model: &mut AnalysisModel,
        domain: &mut Domain,
    ) -> SolverResult<()> {
        self.lambda += d_lambda;
        domain.apply_load(self.lambda)?;
        model.incr_disp(domain, du)?;
        model.update_domain(domain)?;
        Ok(())
    }
}

impl Integrator for DisplacementControl {
    fn name(&self) -> &'static str {
        "DisplacementControl"
    }

    fn tracker(&self) -> &StageTracker {
        &self.tracker
    }

    fn tracker_mut(&mut self) -> &mut StageTracker {
        &mut self.tracker
    }

    fn domain_changed(
        &mut self,
        model: &mut AnalysisModel,
        domain: &mut Domain,
        _soe: &mut dyn LinearSoe,
    ) -> SolverResult<()> {
        let eqn = model.eqn_of(self.node, self.dof).ok_or_else(|| {
            SolverError::InvalidInput(format!(
                "control DOF {} of node {} is constrained or missing",
                self.dof, self.node
            ))
        })?;
        self.control_eqn = Some(eqn);

        // pattern loads at unit factor, then back to the current level
        let current = domain.current_time();
        domain.apply_load(1.0)?;
        self.reference_load = external_load(model, domain)?;
        domain.apply_load(current)?;

        self.lambda = current;
        self.committed_lambda = domain.committed_time();
        self.reference_disp = DVector::zeros(model.num_eqn());
        self.tracker.set(IntegratorState::Initialized);
        Ok(())
    }

    fn new_step(
        &mut self,
        _delta: f64,
        model: &mut AnalysisModel,
        domain: &mut Domain,
        soe: &mut dyn LinearSoe,
    ) -> SolverResult<()> {
        self.tracker.require(
            "new_step",
            &[IntegratorState::Initialized, IntegratorState::Committed],
        )?;
        let eqn = self.control_eqn("new_step")?;
        assemble_tangent(
            model,
            domain,
            soe,
            &self.factors(),
            &RayleighDamping::default(),
        )?;
        let du_c = self.solve_reference(soe, eqn)?;
        let d_lambda = self.increment / du_c;
        let du = d_lambda * &self.reference_disp;
        debug!("displacement control: predictor Δλ = {d_lambda:.4e}");

        self.apply_increment(d_lambda, &du, model, domain)?;
        self.tracker.set(IntegratorState::StepStarted);
        Ok(())
    }

    fn update(
        &mut self,
        dx: &DVector<f64>,
        model: &mut AnalysisModel,
        domain: &mut Domain,
        soe: &mut dyn LinearSoe,
    ) -> SolverResult<()> {
        self.tracker.require_step("update")?;
        let eqn = self.control_eqn("update")?;
        let du_c = self.solve_reference(soe, eqn)?;
        let d_lambda = -dx[eqn] / du_c;
        let du = dx + d_lambda * &self.reference_disp;

        self.apply_increment(d_lambda, &du, model, domain)?;
        soe.set_x(&du);
        self.tracker.set(IntegratorState::IterationReady);
        Ok(())
    }

    fn commit(&mut self, model: &mut AnalysisModel, domain: &mut Domain) -> SolverResult<()> {
        self.tracker.require("commit", &[IntegratorState::IterationReady])?;
        model.commit(domain);
        self.committed_lambda = self.lambda;
        self.tracker.set(IntegratorState::Committed);
        Ok(())
    }

    fn revert_to_last_step(
        &mut self,
        model: &mut AnalysisModel,
        domain: &mut Domain,
    ) -> SolverResult<()> {
        self.tracker.require_initialized("revert_to_last_step")?;
        self.lambda = self.committed_lambda;
        model.revert(domain)?;
        domain.apply_load(self.lambda)?;
        self.tracker.set(IntegratorState::Committed);
        Ok(())
    }

    fn factors(&self) -> TangentFactors {
        TangentFactors::stiffness_only()
    }
}
