//! Newmark β-method with a displacement predictor.
//!
//! ```text
//! u_{n+1} = u_n + Δt·u̇_n + (Δt²/2)·[(1−2β)·ü_n + 2β·ü_{n+1}]
//! u̇_{n+1} = u̇_n + Δt·[(1−γ)·ü_n + γ·ü_{n+1}]
//! ```
//!
//! The predictor keeps U, so each correction Δ updates
//! `U += Δ, V += γ/(βΔt)·Δ, A += 1/(βΔt²)·Δ`.
//!
//! - **Average acceleration**: γ = 1/2, β = 1/4
//! - **Linear acceleration**: γ = 1/2, β = 1/6

use super::{IntegratorState, Integrator, StageTracker};
use crate::error::{SolverError, SolverResult};
use crate::model::{AnalysisModel, RayleighDamping, ResidualKind, ResponseKind, TangentFactors};
use crate::system::LinearSoe;
use nalgebra::DVector;
use nlfe_domain::Domain;

/// Committed and trial response in equation space
#[derive(Debug, Clone)]
pub(crate) struct Kinematics {
    pub u: DVector<f64>,
    pub v: DVector<f64>,
    pub a: DVector<f64>,
}

impl Kinematics {
    pub fn zeros(n: usize) -> Self {
        Self {
            u: DVector::zeros(n),
            v: DVector::zeros(n),
            a: DVector::zeros(n),
        }
    }

    pub fn gather(model: &AnalysisModel, domain: &Domain, committed: bool) -> SolverResult<Self> {
        Ok(Self {
            u: model.response(domain, ResponseKind::Disp, committed)?,
            v: model.response(domain, ResponseKind::Vel, committed)?,
            a: model.response(domain, ResponseKind::Accel, committed)?,
        })
    }

    /// Write velocity and acceleration to the nodes
    pub fn scatter_rates(&self, model: &mut AnalysisModel, domain: &mut Domain) -> SolverResult<()> {
        model.set_response(domain, ResponseKind::Vel, &self.v)?;
        model.set_response(domain, ResponseKind::Accel, &self.a)
    }
}

pub(crate) fn check_step(dt: f64) -> SolverResult<()> {
    if dt > 0.0 && dt.is_finite() {
        Ok(())
    } else {
        Err(SolverError::InvalidInput(format!(
            "time step must be positive, got {dt}"
        )))
    }
}

#[derive(Debug, Clone)]
pub struct Newmark {
    gamma: f64,
    beta: f64,
    rayleigh: RayleighDamping,
    c_c: f64,
    c_m: f64,
    committed: Kinematics,
    trial: Kinematics,
    tracker: StageTracker,
}

impl Newmark {
    pub fn new(gamma: f64, beta: f64) -> SolverResult<Self> {
        if gamma <= 0.0 || beta <= 0.0 {
            return Err(SolverError::InvalidInput(format!(
                "Newmark parameters must be positive (γ = {gamma}, β = {beta})"
            )));
        }
        Ok(Self {
            gamma,
            beta,
            rayleigh: RayleighDamping::default(),
            c_c: 0.0,
            c_m: 0.0,
            committed: Kinematics::zeros(0),
            trial: Kinematics::zeros(0),
            tracker: StageTracker::new(),
        })
    }

    /// γ = 1/2, β = 1/4
    pub fn average_acceleration() -> Self {
        Self {
            gamma: 0.5,
            beta: 0.25,
            rayleigh: RayleighDamping::default(),
            c_c: 0.0,
            c_m: 0.0,
            committed: Kinematics::zeros(0),
            trial: Kinematics::zeros(0),
            tracker: StageTracker::new(),
        }
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
}

impl Integrator for Newmark {
    fn name(&self) -> &'static str {
        "Newmark"
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
        self.c_c = gamma / (beta * dt);
        self.c_m = 1.0 / (beta * dt * dt);

        let last = &self.committed;
        self.trial = Kinematics {
            u: last.u.clone(),
            v: (1.0 - gamma / beta) * &last.v + dt * (1.0 - 0.5 * gamma / beta) * &last.a,
            a: (-1.0 / (beta * dt)) * &last.v + (1.0 - 0.5 / beta) * &last.a,
        };
        self.trial.scatter_rates(model, domain)?;

        domain.apply_load(domain.committed_time() + dt)?;
        model.update_domain(domain)?;
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
        model.incr_disp(domain, dx)?;
        self.trial.scatter_rates(model, domain)?;
        model.update_domain(domain)?;
        self.tracker.set(IntegratorState::IterationReady);
        Ok(())
    }

    fn commit(&mut self, model: &mut AnalysisModel, domain: &mut Domain) -> SolverResult<()> {
        self.tracker.require("commit", &[IntegratorState::IterationReady])?;
        model.commit(domain);
        self.committed = self.trial.clone();
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
            stiffness: 1.0,
            initial_stiffness: 0.0,
            damping: self.c_c,
            mass: self.c_m,
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
    fn coefficients_follow_step_size() {
        let mut nm = Newmark::average_acceleration();
        let mut model = AnalysisModel::new();
        model.finish_numbering(0).unwrap();
        let mut domain = Domain::new();
        let mut soe = crate::system::FullGenSoe::new();
        nm.domain_changed(&mut model, &mut domain, &mut soe).unwrap();
        nm.new_step(0.1, &mut model, &mut domain, &mut soe).unwrap();

        let f = nm.factors();
        assert_relative_eq!(f.damping, 20.0);
        assert_relative_eq!(f.mass, 400.0);
        assert_relative_eq!(domain.current_time(), 0.1);
    }

    #[test]
    fn non_positive_step_rejected() {
        let mut nm = Newmark::average_acceleration();
        let mut model = AnalysisModel::new();
        model.finish_numbering(0).unwrap();
        let mut domain = Domain::new();
        let mut soe = crate::system::FullGenSoe::new();
        nm.domain_changed(&mut model, &mut domain, &mut soe).unwrap();
        assert!(matches!(
            nm.new_step(0.0, &mut model, &mut domain, &mut soe),
            Err(SolverError::InvalidInput(_))
        ));
        assert!(Newmark::new(0.5, 0.0).is_err());
    }
}
