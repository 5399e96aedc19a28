//! Generalized-α time integration.
//!
//! Equilibrium is enforced at the weighted state
//!
//! ```text
//! U_α = (1−α_F)·U_n + α_F·U_{n+1}
//! V_α = (1−α_F)·V_n + α_F·V_{n+1}
//! A_α = (1−α_M)·A_n + α_M·A_{n+1}
//! ```
//!
//! with the Newmark relations between U, V and A and
//! `β = ¼(1 + α_M − α_F)², γ = ½ + α_M − α_F`. The HHT method is the
//! `α_M = 1` member. Elements are evaluated at the weighted state during
//! iteration and at the end-of-step state on commit.

use super::newmark::{Kinematics, check_step};
use super::{IntegratorState, Integrator, StageTracker};
use crate::error::{SolverError, SolverResult};
use crate::model::{AnalysisModel, RayleighDamping, ResidualKind, ResponseKind, TangentFactors};
use crate::system::LinearSoe;
use nalgebra::DVector;
use nlfe_domain::Domain;

#[derive(Debug, Clone)]
pub struct GeneralizedAlpha {
    alpha_m: f64,
    alpha_f: f64,
    gamma: f64,
    beta: f64,
    rayleigh: RayleighDamping,
    dt: f64,
    c_c: f64,
    c_m: f64,
    committed: Kinematics,
    trial: Kinematics,
    tracker: StageTracker,
}

impl GeneralizedAlpha {
    pub fn new(alpha_m: f64, alpha_f: f64) -> SolverResult<Self> {
        if !(alpha_f > 0.0 && alpha_f <= 1.0 && alpha_m >= alpha_f) {
            return Err(SolverError::InvalidInput(format!(
                "generalized-α needs 0 < α_F ≤ 1 and α_M ≥ α_F (got α_M = {alpha_m}, α_F = {alpha_f})"
            )));
        }
        let gamma = 0.5 + alpha_m - alpha_f;
        let beta = 0.25 * (1.0 + alpha_m - alpha_f).powi(2);
        Ok(Self {
            alpha_m,
            alpha_f,
            gamma,
            beta,
            rayleigh: RayleighDamping::default(),
            dt: 0.0,
            c_c: 0.0,
            c_m: 0.0,
            committed: Kinematics::zeros(0),
            trial: Kinematics::zeros(0),
            tracker: StageTracker::new(),
        })
    }

    /// Hilber-Hughes-Taylor, `α ∈ [2/3, 1]`
    pub fn hht(alpha: f64) -> SolverResult<Self> {
        if !(2.0 / 3.0..=1.0).contains(&alpha) {
            return Err(SolverError::InvalidInput(format!(
                "HHT α must lie in [2/3, 1], got {alpha}"
            )));
        }
        Self::new(1.0, alpha)
    }

    pub fn with_rayleigh(mut self, rayleigh: RayleighDamping) -> Self {
        self.rayleigh = rayleigh;
        self
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    fn weighted(&self) -> Kinematics {
        let (af, am) = (self.alpha_f, self.alpha_m);
        let (last, next) = (&self.committed, &self.trial);
        Kinematics {
            u: (1.0 - af) * &last.u + af * &next.u,
            v: (1.0 - af) * &last.v + af * &next.v,
            a: (1.0 - am) * &last.a + am * &next.a,
        }
    }

    fn scatter(
        state: &Kinematics,
        model: &mut AnalysisModel,
        domain: &mut Domain,
    ) -> SolverResult<()> {
        model.set_response(domain, ResponseKind::Disp, &state.u)?;
        state.scatter_rates(model, domain)?;
        model.update_domain(domain)
    }
}

impl Integrator for GeneralizedAlpha {
    fn name(&self) -> &'static str {
        "GeneralizedAlpha"
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
        self.trial = Kinematics::gather(model, domain, false)?;
        self.committed = self.trial.clone();
        self.tracker.set(IntegratorState::Initialized);
        Ok(())
    }

    fn new_step(
        &mut self,
        dt: f64,
        model: &mut AnalysisModel,
        domain: &mut Domain,
        _soe: &mut dyn LinearSoe,
    ) -> SolverResult<()> {
        self.tracker.require(
            "new_step",
            &[IntegratorState::Initialized, IntegratorState::Committed],
        )?;
        check_step(dt)?;
        let (gamma, beta) = (self.gamma, self.beta);
        self.dt = dt;
        self.c_c = gamma / (beta * dt);
        self.c_m = 1.0 / (beta * dt * dt);

        let last = &self.committed;
        self.trial = Kinematics {
            u: last.u.clone(),
            v: (1.0 - gamma / beta) * &last.v + dt * (1.0 - 0.5 * gamma / beta) * &last.a,
            a: (-1.0 / (beta * dt)) * &last.v + (1.0 - 0.5 / beta) * &last.a,
        };

        domain.apply_load(domain.committed_time() + self.alpha_f * dt)?;
        let state = self.weighted();
        Self::scatter(&state, model, domain)?;
        self.tracker.set(IntegratorState::StepStarted);
        Ok(())
    }

    fn update(
        &mut self,
        dx: &DVector<f64>,
        model: &mut AnalysisModel,
        domain: &mut Domain,
        _soe: &mut dyn LinearSoe,
    ) -> SolverResult<()> {
        self.tracker.require_step("update")?;
        self.trial.u += dx;
        self.trial.v += self.c_c * dx;
        self.trial.a += self.c_m * dx;
        let state = self.weighted();
        Self::scatter(&state, model, domain)?;
        self.tracker.set(IntegratorState::IterationReady);
        Ok(())
    }

    fn commit(&mut self, model: &mut AnalysisModel, domain: &mut Domain) -> SolverResult<()> {
        self.tracker.require("commit", &[IntegratorState::IterationReady])?;
        domain.set_current_time(domain.committed_time() + self.dt);
        let state = self.trial.clone();
        Self::scatter(&state, model, domain)?;
        model.commit(domain);
        self.committed = state;
        self.tracker.set(IntegratorState::Committed);
        Ok(())
    }

    fn revert_to_last_step(
        &mut self,
        model: &mut AnalysisModel,
        domain: &mut Domain,
    ) -> SolverResult<()> {
        self.tracker.require_initialized("revert_to_last_step")?;
        self.trial = self.committed.clone();
        model.revert(domain)?;
        domain.apply_load(domain.committed_time())?;
        self.tracker.set(IntegratorState::Committed);
        Ok(())
    }

    fn factors(&self) -> TangentFactors {
        TangentFactors {
            stiffness: self.alpha_f,
            initial_stiffness: 0.0,
            damping: self.alpha_f * self.c_c,
            mass: self.alpha_m * self.c_m,
        }
    }

    fn residual_kind(&self) -> ResidualKind {
        ResidualKind::Dynamic
    }

    fn rayleigh(&self) -> RayleighDamping {
        self.rayleigh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn hht_parameters() {
        let hht = GeneralizedAlpha::hht(0.9).unwrap();
        assert_relative_eq!(hht.gamma(), 0.6);
        assert_relative_eq!(hht.beta(), 0.3025);
        assert!(GeneralizedAlpha::hht(0.5).is_err());
    }

    #[test]
    fn unit_weights_reduce_to_average_acceleration() {
        let ga = GeneralizedAlpha::new(1.0, 1.0).unwrap();
        assert_relative_eq!(ga.gamma(), 0.5);
        assert_relative_eq!(ga.beta(), 0.25);
    }
}
