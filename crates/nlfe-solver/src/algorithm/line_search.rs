//! Line search along a Newton direction.

use super::StepContext;
use crate::error::SolverResult;
use log::debug;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// Interpolated line search on `s(η) = Δx · R(u + η Δx)`.
///
/// Starting from the full step, η is corrected by secant interpolation
/// between `(0, s0)` and `(η, s)` until `|s / s0| ≤ tol`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InitialInterpolatedLineSearch {
    pub tol: f64,
    pub max_iter: usize,
    pub min_eta: f64,
    pub max_eta: f64,
}

impl Default for InitialInterpolatedLineSearch {
    fn default() -> Self {
        Self {
            tol: 0.8,
            max_iter: 10,
            min_eta: 0.1,
            max_eta: 10.0,
        }
    }
}

impl InitialInterpolatedLineSearch {
    pub fn new(tol: f64, max_iter: usize, min_eta: f64, max_eta: f64) -> Self {
        Self {
            tol,
            max_iter,
            min_eta,
            max_eta,
        }
    }

    /// `dx` is the increment just applied and `r0` the residual it was
    /// solved against; the system must hold the residual after the full
    /// step. Leaves `η Δx` in x.
    pub fn search(
        &self,
        dx: &DVector<f64>,
        r0: &DVector<f64>,
        ctx: &mut StepContext<'_>,
    ) -> SolverResult<f64> {
        let s0 = dx.dot(r0);
        if s0 == 0.0 {
            return Ok(1.0);
        }
        let mut s = dx.dot(ctx.soe.b());
        let mut ratio = (s / s0).abs();
        let mut eta = 1.0;
        let mut eta_prev = 1.0;
        let mut count = 0;

        while ratio > self.tol && count < self.max_iter {
            count += 1;
            eta *= s0 / (s0 - s);
            if !eta.is_finite() {
                eta = 1.0;
            }
            eta = eta.clamp(self.min_eta, self.max_eta);

            let step = (eta - eta_prev) * dx;
            ctx.integrator
                .update(&step, ctx.model, ctx.domain, ctx.soe)?;
            ctx.form_unbalance()?;

            s = dx.dot(ctx.soe.b());
            ratio = (s / s0).abs();
            debug!("line search {count}: η = {eta:.4} |s/s0| = {ratio:.4e}");
            eta_prev = eta;
        }

        ctx.soe.set_x(&(eta * dx));
        Ok(eta)
    }
}
