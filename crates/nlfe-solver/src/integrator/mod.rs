//! Integration schemes.
//!
//! An integrator turns a load or time increment into trial response on the
//! domain and tells the assembler which combination of stiffness, damping
//! and mass makes up the effective tangent:
//!
//! ```text
//! K_eff = c_K·K_T + c_K0·K_0 + c_C·C + c_M·M
//! R     = P − F_int            (static)
//! R     = P − F_int − C·v − M·a (dynamic)
//! ```
//!
//! Every integrator moves through the stages
//! `Uninitialized → Initialized → StepStarted → IterationReady → Committed`.
//! A stage called out of order fails with `SchemeNotInitialized`.

use crate::error::{SolverError, SolverResult};
use crate::model::{AnalysisModel, RayleighDamping, ResidualKind, TangentFactors};
use crate::system::LinearSoe;
use nalgebra::DVector;
use nlfe_domain::Domain;
use serde::{Deserialize, Serialize};

pub mod displacement_control;
pub mod generalized_alpha;
pub mod load_control;
pub mod newmark;

pub use displacement_control::DisplacementControl;
pub use generalized_alpha::GeneralizedAlpha;
pub use load_control::LoadControl;
pub use newmark::Newmark;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegratorState {
    Uninitialized,
    Initialized,
    StepStarted,
    IterationReady,
    Committed,
}

/// Which stiffness the tangent is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TangentKind {
    #[default]
    Current,
    Initial,
}

#[derive(Debug, Clone)]
pub struct StageTracker {
    state: IntegratorState,
}

impl StageTracker {
    pub fn new() -> Self {
        Self {
            state: IntegratorState::Uninitialized,
        }
    }

    pub fn state(&self) -> IntegratorState {
        self.state
    }

    pub(crate) fn set(&mut self, state: IntegratorState) {
        self.state = state;
    }

    /// Fail unless the current state is one of `allowed`
    pub(crate) fn require(
        &self,
        stage: &'static str,
        allowed: &[IntegratorState],
    ) -> SolverResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SolverError::stage(
                stage,
                format!("called in state {:?}", self.state),
            ))
        }
    }

    pub(crate) fn require_initialized(&self, stage: &'static str) -> SolverResult<()> {
        if self.state == IntegratorState::Uninitialized {
            Err(SolverError::stage(stage, "domain_changed has not been called"))
        } else {
            Ok(())
        }
    }

    pub(crate) fn require_step(&self, stage: &'static str) -> SolverResult<()> {
        self.require(
            stage,
            &[IntegratorState::StepStarted, IntegratorState::IterationReady],
        )
    }
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}

pub trait Integrator: std::fmt::Debug + Send {
    fn name(&self) -> &'static str;

    fn tracker(&self) -> &StageTracker;

    fn tracker_mut(&mut self) -> &mut StageTracker;

    /// Rebuild internal vectors after the model was renumbered
    fn domain_changed(
        &mut self,
        model: &mut AnalysisModel,
        domain: &mut Domain,
        soe: &mut dyn LinearSoe,
    ) -> SolverResult<()>;

    /// Advance the load factor or time and predict the trial response.
    /// `delta` is the time step of transient schemes; static schemes use
    /// their own increment and ignore it.
    fn new_step(
        &mut self,
        delta: f64,
        model: &mut AnalysisModel,
        domain: &mut Domain,
        soe: &mut dyn LinearSoe,
    ) -> SolverResult<()>;

    /// Apply an equation-space increment to the trial response
    fn update(
        &mut self,
        dx: &DVector<f64>,
        model: &mut AnalysisModel,
        domain: &mut Domain,
        soe: &mut dyn LinearSoe,
    ) -> SolverResult<()>;

    fn commit(&mut self, model: &mut AnalysisModel, domain: &mut Domain) -> SolverResult<()>;

    fn revert_to_last_step(
        &mut self,
        model: &mut AnalysisModel,
        domain: &mut Domain,
    ) -> SolverResult<()>;

    /// Effective tangent coefficients for the current step
    fn factors(&self) -> TangentFactors;

    fn residual_kind(&self) -> ResidualKind {
        ResidualKind::Static
    }

    fn rayleigh(&self) -> RayleighDamping {
        RayleighDamping::default()
    }

    /// Iterations the algorithm needed for the step about to be committed
    fn record_iterations(&mut self, _iterations: usize) {}

    fn form_tangent(
        &mut self,
        kind: TangentKind,
        model: &AnalysisModel,
        domain: &Domain,
        soe: &mut dyn LinearSoe,
    ) -> SolverResult<()> {
        self.tracker().require_step("form_tangent")?;
        let factors = match kind {
            TangentKind::Current => self.factors(),
            TangentKind::Initial => self.factors().to_initial(),
        };
        assemble_tangent(model, domain, soe, &factors, &self.rayleigh())
    }

    fn form_unbalance(
        &mut self,
        model: &AnalysisModel,
        domain: &Domain,
        soe: &mut dyn LinearSoe,
    ) -> SolverResult<()> {
        self.tracker().require_step("form_unbalance")?;
        assemble_unbalance(model, domain, soe, self.residual_kind(), &self.rayleigh())
    }
}

/// Zero A and add every FE element's and every nodal mass's tangent
pub fn assemble_tangent(
    model: &AnalysisModel,
    domain: &Domain,
    soe: &mut dyn LinearSoe,
    factors: &TangentFactors,
    rayleigh: &RayleighDamping,
) -> SolverResult<()> {
    soe.zero_a();
    for fe in model.fe_elements() {
        let k = fe.tangent(domain, model.groups(), factors, rayleigh)?;
        soe.add_a(&k, fe.ids(), 1.0);
    }

    let mass_factor = factors.mass + factors.damping * rayleigh.alpha_m;
    if mass_factor != 0.0 {
        for group in model.groups() {
            if group.is_multiplier() {
                continue;
            }
            if let Some(m) = model.group_node(domain, group)?.mass() {
                let m = model.matrix_to_model(group, m.clone());
                soe.add_a(&m, group.ids(), mass_factor);
            }
        }
    }
    Ok(())
}

/// Applied nodal loads gathered into equation space
pub fn external_load(model: &AnalysisModel, domain: &Domain) -> SolverResult<DVector<f64>> {
    let mut p = DVector::zeros(model.num_eqn());
    for group in model.groups() {
        if group.is_multiplier() {
            continue;
        }
        let load = model.group_node(domain, group)?.unbalanced_load().clone();
        let load = model.vector_to_model(group, load);
        for (value, id) in load.iter().zip(group.ids()) {
            if let Some(e) = *id {
                p[e] += value;
            }
        }
    }
    Ok(p)
}

/// Set b to the residual `P − F_int` (minus inertia and damping forces
/// for dynamic residuals)
pub fn assemble_unbalance(
    model: &AnalysisModel,
    domain: &Domain,
    soe: &mut dyn LinearSoe,
    kind: ResidualKind,
    rayleigh: &RayleighDamping,
) -> SolverResult<()> {
    soe.zero_b();
    soe.set_b(&external_load(model, domain)?);
    for fe in model.fe_elements() {
        let r = fe.residual(domain, model.groups(), kind, rayleigh)?;
        soe.add_b(&r, fe.ids(), 1.0);
    }

    if kind == ResidualKind::Dynamic {
        for group in model.groups() {
            if group.is_multiplier() {
                continue;
            }
            let node = model.group_node(domain, group)?;
            if let Some(m) = node.mass() {
                let mut inertia = m * node.trial_accel();
                if rayleigh.alpha_m != 0.0 {
                    inertia += rayleigh.alpha_m * (m * node.trial_vel());
                }
                let inertia = model.vector_to_model(group, inertia);
                soe.add_b(&inertia, group.ids(), -1.0);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_rejects_out_of_order_stage() {
        let mut tracker = StageTracker::new();
        assert!(matches!(
            tracker.require_step("update"),
            Err(SolverError::SchemeNotInitialized { stage: "update", .. })
        ));
        assert!(tracker.require_initialized("new_step").is_err());

        tracker.set(IntegratorState::Initialized);
        assert!(tracker.require_initialized("new_step").is_ok());
        assert!(tracker.require_step("form_tangent").is_err());

        tracker.set(IntegratorState::StepStarted);
        assert!(tracker.require_step("form_tangent").is_ok());
    }
}
