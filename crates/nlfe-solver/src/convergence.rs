//! Convergence tests.
//!
//! A test is started once per step and then judges every iterate from the
//! solution increment `x` and the residual `b` left in the system after the
//! unbalance was re-formed.

use log::{debug, warn};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// Result of testing one iterate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOutcome {
    Converged(usize),
    Continue,
    /// Iteration cap reached without convergence
    Exhausted,
    /// `test` called before `start`
    NotStarted,
}

impl TestOutcome {
    /// k on convergence at iteration k, −1 to keep iterating, −2 on failure
    pub fn code(self) -> i32 {
        match self {
            TestOutcome::Converged(k) => k as i32,
            TestOutcome::Continue => -1,
            TestOutcome::Exhausted | TestOutcome::NotStarted => -2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormType {
    Max,
    L1,
    #[default]
    L2,
}

impl NormType {
    pub fn apply(self, v: &DVector<f64>) -> f64 {
        match self {
            NormType::Max => v.amax(),
            NormType::L1 => v.lp_norm(1),
            NormType::L2 => v.norm(),
        }
    }
}

/// Measured quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    /// ‖x‖
    DispIncr,
    /// ‖b‖
    Unbalance,
    /// |x·b| / 2
    EnergyIncr,
}

pub trait ConvergenceTest: std::fmt::Debug + Send {
    fn name(&self) -> &'static str;

    fn start(&mut self);

    fn test(&mut self, x: &DVector<f64>, b: &DVector<f64>) -> TestOutcome;

    /// Iterations tested since the last `start`
    fn iterations(&self) -> usize;

    /// Measured value of every iteration since the last `start`
    fn history(&self) -> &[f64];

    fn last_norm(&self) -> f64 {
        self.history().last().copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone)]
pub struct NormTest {
    criterion: Criterion,
    norm: NormType,
    relative: bool,
    tol: f64,
    max_iter: usize,
    started: bool,
    iteration: usize,
    reference: f64,
    history: Vec<f64>,
}

impl NormTest {
    pub fn new(criterion: Criterion, tol: f64, max_iter: usize) -> Self {
        Self {
            criterion,
            norm: NormType::default(),
            relative: false,
            tol,
            max_iter,
            started: false,
            iteration: 0,
            reference: 0.0,
            history: Vec::new(),
        }
    }

    pub fn disp_incr(tol: f64, max_iter: usize) -> Self {
        Self::new(Criterion::DispIncr, tol, max_iter)
    }

    pub fn unbalance(tol: f64, max_iter: usize) -> Self {
        Self::new(Criterion::Unbalance, tol, max_iter)
    }

    pub fn energy_incr(tol: f64, max_iter: usize) -> Self {
        Self::new(Criterion::EnergyIncr, tol, max_iter)
    }

    /// Measure relative to the first iteration of the step
    pub fn relative(mut self) -> Self {
        self.relative = true;
        self
    }

    pub fn with_norm(mut self, norm: NormType) -> Self {
        self.norm = norm;
        self
    }

    pub fn criterion(&self) -> Criterion {
        self.criterion
    }

    fn measure(&self, x: &DVector<f64>, b: &DVector<f64>) -> f64 {
        match self.criterion {
            Criterion::DispIncr => self.norm.apply(x),
            Criterion::Unbalance => self.norm.apply(b),
            Criterion::EnergyIncr => 0.5 * x.dot(b).abs(),
        }
    }
}

impl ConvergenceTest for NormTest {
    fn name(&self) -> &'static str {
        match (self.criterion, self.relative) {
            (Criterion::DispIncr, false) => "NormDispIncr",
            (Criterion::DispIncr, true) => "RelativeNormDispIncr",
            (Criterion::Unbalance, false) => "NormUnbalance",
            (Criterion::Unbalance, true) => "RelativeNormUnbalance",
            (Criterion::EnergyIncr, false) => "EnergyIncr",
            (Criterion::EnergyIncr, true) => "RelativeEnergyIncr",
        }
    }

    fn start(&mut self) {
        self.started = true;
        self.iteration = 0;
        self.reference = 0.0;
        self.history.clear();
    }

    fn test(&mut self, x: &DVector<f64>, b: &DVector<f64>) -> TestOutcome {
        if !self.started {
            warn!("{}: test called before start", self.name());
            return TestOutcome::NotStarted;
        }
        self.iteration += 1;
        let raw = self.measure(x, b);
        if self.iteration == 1 {
            self.reference = raw;
        }
        let value = if self.relative && self.reference > 0.0 {
            raw / self.reference
        } else {
            raw
        };
        self.history.push(value);
        debug!(
            "{}: iteration {} current {:.6e} (tol {:.3e})",
            self.name(),
            self.iteration,
            value,
            self.tol
        );

        if value <= self.tol {
            TestOutcome::Converged(self.iteration)
        } else if self.iteration >= self.max_iter {
            warn!(
                "{}: no convergence after {} iterations, current {:.6e}",
                self.name(),
                self.iteration,
                value
            );
            TestOutcome::Exhausted
        } else {
            TestOutcome::Continue
        }
    }

    fn iterations(&self) -> usize {
        self.iteration
    }

    fn history(&self) -> &[f64] {
        &self.history
    }
}

/// Converges at exactly the n-th iteration
#[derive(Debug, Clone)]
pub struct FixedIterations {
    count: usize,
    started: bool,
    iteration: usize,
    history: Vec<f64>,
}

impl FixedIterations {
    pub fn new(count: usize) -> Self {
        Self {
            count: count.max(1),
            started: false,
            iteration: 0,
            history: Vec::new(),
        }
    }
}

impl ConvergenceTest for FixedIterations {
    fn name(&self) -> &'static str {
        "FixedNumIter"
    }

    fn start(&mut self) {
        self.started = true;
        self.iteration = 0;
        self.history.clear();
    }

    fn test(&mut self, x: &DVector<f64>, _b: &DVector<f64>) -> TestOutcome {
        if !self.started {
            return TestOutcome::NotStarted;
        }
        self.iteration += 1;
        self.history.push(x.norm());
        if self.iteration >= self.count {
            TestOutcome::Converged(self.iteration)
        } else {
            TestOutcome::Continue
        }
    }

    fn iterations(&self) -> usize {
        self.iteration
    }

    fn history(&self) -> &[f64] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn v(values: &[f64]) -> DVector<f64> {
        DVector::from_column_slice(values)
    }

    #[test]
    fn test_norms() {
        let x = v(&[3.0, -4.0]);
        assert_relative_eq!(NormType::Max.apply(&x), 4.0);
        assert_relative_eq!(NormType::L1.apply(&x), 7.0);
        assert_relative_eq!(NormType::L2.apply(&x), 5.0);
    }

    #[test]
    fn test_energy_is_non_negative() {
        let mut t = NormTest::energy_incr(1e-20, 5);
        t.start();
        t.test(&v(&[1.0, 2.0]), &v(&[-3.0, -1.0]));
        assert_relative_eq!(t.last_norm(), 2.5);
    }

    #[test]
    fn test_relative_measure_uses_first_iteration() {
        let mut t = NormTest::disp_incr(0.1, 10).relative();
        t.start();
        let b = v(&[0.0]);
        assert_eq!(t.test(&v(&[2.0]), &b), TestOutcome::Continue);
        assert_eq!(t.test(&v(&[0.5]), &b), TestOutcome::Continue);
        assert_eq!(t.test(&v(&[0.1]), &b), TestOutcome::Converged(3));
        assert_relative_eq!(t.history()[1], 0.25);
    }

    #[test]
    fn test_cap_reached_without_convergence() {
        let mut t = NormTest::disp_incr(1e-6, 3);
        t.start();
        let b = v(&[0.0]);
        let codes: Vec<i32> = [1.0, 1.0, 1.0]
            .iter()
            .map(|&x| t.test(&v(&[x]), &b).code())
            .collect();
        assert_eq!(codes, vec![-1, -1, -2]);
        assert_eq!(t.iterations(), 3);
    }

    #[test]
    fn test_not_started() {
        let mut t = NormTest::unbalance(1.0, 3);
        let outcome = t.test(&v(&[0.0]), &v(&[0.0]));
        assert_eq!(outcome, TestOutcome::NotStarted);
        assert_eq!(outcome.code(), -2);
    }

    #[test]
    fn test_fixed_iterations() {
        let mut t = FixedIterations::new(3);
        t.start();
        let z = v(&[1.0]);
        assert_eq!(t.test(&z, &z).code(), -1);
        assert_eq!(t.test(&z, &z).code(), -1);
        assert_eq!(t.test(&z, &z).code(), 3);
    }
}
