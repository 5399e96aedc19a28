//! Analysis configuration.
//!
//! Every component choice is a serde-tagged enum, so a complete analysis
//! can be described in JSON:
//!
//! ```json
//! {
//!   "handler": { "type": "transformation" },
//!   "numberer": { "type": "rcm" },
//!   "system": { "type": "band_spd" },
//!   "integrator": { "type": "load_control", "increment": 0.1 },
//!   "algorithm": { "type": "newton_raphson" },
//!   "test": { "type": "norm_unbalance", "tol": 1e-8, "max_iter": 25 }
//! }
//! ```

use crate::algorithm::{InitialInterpolatedLineSearch, Linear, ModifiedNewton, NewtonRaphson, SolutionAlgorithm};
use crate::convergence::{ConvergenceTest, Criterion, FixedIterations, NormTest, NormType};
use crate::error::SolverResult;
use crate::handler::{ConstraintHandler, LagrangeHandler, PenaltyHandler, PlainHandler, TransformationHandler};
use crate::integrator::{DisplacementControl, GeneralizedAlpha, Integrator, LoadControl, Newmark, TangentKind};
use crate::model::RayleighDamping;
use crate::numberer::{DofNumberer, PlainNumberer, ReverseCuthillMcKee};
use crate::system::{BandSpdSoe, BiCgStab, ConjugateGradient, FullGenSoe, LinearSoe, SparseCholesky, SparseGenSoe, SparseLu, SparseSolver, SubstructuredSoe};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_penalty() -> f64 {
    1.0e12
}

fn default_one() -> f64 {
    1.0
}

fn default_tol() -> f64 {
    1.0e-12
}

fn default_max_iter() -> usize {
    1000
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HandlerConfig {
    Plain,
    #[default]
    Transformation,
    Penalty {
        #[serde(default = "default_penalty")]
        alpha_sp: f64,
        #[serde(default = "default_penalty")]
        alpha_mp: f64,
    },
    Lagrange {
        #[serde(default = "default_one")]
        alpha_sp: f64,
        #[serde(default = "default_one")]
        alpha_mp: f64,
    },
}

impl HandlerConfig {
    pub fn build(&self) -> Box<dyn ConstraintHandler> {
        match *self {
            HandlerConfig::Plain => Box::new(PlainHandler),
            HandlerConfig::Transformation => Box::new(TransformationHandler),
            HandlerConfig::Penalty { alpha_sp, alpha_mp } => {
                Box::new(PenaltyHandler::new(alpha_sp, alpha_mp))
            }
            HandlerConfig::Lagrange { alpha_sp, alpha_mp } => {
                Box::new(LagrangeHandler::new(alpha_sp, alpha_mp))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NumbererConfig {
    #[default]
    Plain,
    Rcm,
}

impl NumbererConfig {
    pub fn build(&self) -> Box<dyn DofNumberer> {
        match self {
            NumbererConfig::Plain => Box::new(PlainNumberer),
            NumbererConfig::Rcm => Box::new(ReverseCuthillMcKee),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SparseSolverConfig {
    #[default]
    Lu,
    Cholesky,
    Cg {
        #[serde(default = "default_tol")]
        tol: f64,
        #[serde(default = "default_max_iter")]
        max_iter: usize,
    },
    BiCgStab,
}

impl SparseSolverConfig {
    pub fn build(&self) -> Box<dyn SparseSolver> {
        match *self {
            SparseSolverConfig::Lu => Box::new(SparseLu::default()),
            SparseSolverConfig::Cholesky => Box::new(SparseCholesky::default()),
            SparseSolverConfig::Cg { tol, max_iter } => {
                Box::new(ConjugateGradient::new(tol, Some(max_iter)))
            }
            SparseSolverConfig::BiCgStab => Box::new(BiCgStab::default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SystemConfig {
    #[default]
    FullGeneral,
    BandSpd,
    SparseGeneral {
        #[serde(default)]
        solver: SparseSolverConfig,
    },
    /// Node tags of each subdomain, indexed by subdomain id
    Substructured { subdomains: Vec<Vec<i32>> },
}

impl SystemConfig {
    pub fn build(&self) -> Box<dyn LinearSoe> {
        match self {
            SystemConfig::FullGeneral => Box::new(FullGenSoe::new()),
            SystemConfig::BandSpd => Box::new(BandSpdSoe::new()),
            SystemConfig::SparseGeneral { solver } => Box::new(SparseGenSoe::new(solver.build())),
            SystemConfig::Substructured { subdomains } => {
                let partition: BTreeMap<i32, usize> = subdomains
                    .iter()
                    .enumerate()
                    .flat_map(|(id, nodes)| nodes.iter().map(move |&tag| (tag, id)))
                    .collect();
                Box::new(SubstructuredSoe::new(partition))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IntegratorConfig {
    LoadControl {
        increment: f64,
        /// Enables the adaptive increment
        #[serde(default)]
        desired_iterations: Option<usize>,
        #[serde(default)]
        min_increment: Option<f64>,
        #[serde(default)]
        max_increment: Option<f64>,
    },
    DisplacementControl {
        node: i32,
        dof: usize,
        increment: f64,
    },
    Newmark {
        gamma: f64,
        beta: f64,
        #[serde(default)]
        rayleigh: RayleighDamping,
    },
    GeneralizedAlpha {
        alpha_m: f64,
        alpha_f: f64,
        #[serde(default)]
        rayleigh: RayleighDamping,
    },
    Hht {
        alpha: f64,
        #[serde(default)]
        rayleigh: RayleighDamping,
    },
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        IntegratorConfig::LoadControl {
            increment: 1.0,
            desired_iterations: None,
            min_increment: None,
            max_increment: None,
        }
    }
}

impl IntegratorConfig {
    pub fn build(&self) -> SolverResult<Box<dyn Integrator>> {
        let integrator: Box<dyn Integrator> = match *self {
            IntegratorConfig::LoadControl {
                increment,
                desired_iterations,
                min_increment,
                max_increment,
            } => match desired_iterations {
                Some(desired) => Box::new(LoadControl::adaptive(
                    increment,
                    desired,
                    min_increment.unwrap_or(increment),
                    max_increment.unwrap_or(increment),
                )?),
                None => Box::new(LoadControl::new(increment)),
            },
            IntegratorConfig::DisplacementControl {
                node,
                dof,
                increment,
            } => Box::new(DisplacementControl::new(node, dof, increment)),
            IntegratorConfig::Newmark {
                gamma,
                beta,
                rayleigh,
            } => Box::new(Newmark::new(gamma, beta)?.with_rayleigh(rayleigh)),
            IntegratorConfig::GeneralizedAlpha {
                alpha_m,
                alpha_f,
                rayleigh,
            } => Box::new(GeneralizedAlpha::new(alpha_m, alpha_f)?.with_rayleigh(rayleigh)),
            IntegratorConfig::Hht { alpha, rayleigh } => {
                Box::new(GeneralizedAlpha::hht(alpha)?.with_rayleigh(rayleigh))
            }
        };
        Ok(integrator)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlgorithmConfig {
    Linear {
        #[serde(default)]
        tangent: TangentKind,
    },
    #[default]
    NewtonRaphson,
    NewtonLineSearch {
        #[serde(default)]
        tangent: TangentKind,
        #[serde(default)]
        line_search: InitialInterpolatedLineSearch,
    },
    ModifiedNewton {
        #[serde(default)]
        tangent: TangentKind,
    },
}

impl AlgorithmConfig {
    pub fn build(&self) -> Box<dyn SolutionAlgorithm> {
        match *self {
            AlgorithmConfig::Linear { tangent } => Box::new(Linear::with_tangent(tangent)),
            AlgorithmConfig::NewtonRaphson => Box::new(NewtonRaphson::new()),
            AlgorithmConfig::NewtonLineSearch {
                tangent,
                line_search,
            } => Box::new(
                NewtonRaphson::new()
                    .with_tangent(tangent)
                    .with_line_search(line_search),
            ),
            AlgorithmConfig::ModifiedNewton { tangent } => {
                Box::new(ModifiedNewton::new().with_tangent(tangent))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestConfig {
    NormDispIncr {
        tol: f64,
        max_iter: usize,
        #[serde(default)]
        relative: bool,
        #[serde(default)]
        norm: NormType,
    },
    NormUnbalance {
        tol: f64,
        max_iter: usize,
        #[serde(default)]
        relative: bool,
        #[serde(default)]
        norm: NormType,
    },
    EnergyIncr {
        tol: f64,
        max_iter: usize,
        #[serde(default)]
        relative: bool,
    },
    FixedIterations {
        iterations: usize,
    },
}

impl Default for TestConfig {
    fn default() -> Self {
        TestConfig::NormUnbalance {
            tol: 1.0e-8,
            max_iter: 25,
            relative: false,
            norm: NormType::L2,
        }
    }
}

impl TestConfig {
    pub fn build(&self) -> Box<dyn ConvergenceTest> {
        let norm_test = |criterion, tol, max_iter, relative: bool, norm| -> Box<dyn ConvergenceTest> {
            let test = NormTest::new(criterion, tol, max_iter).with_norm(norm);
            Box::new(if relative { test.relative() } else { test })
        };
        match *self {
            TestConfig::NormDispIncr {
                tol,
                max_iter,
                relative,
                norm,
            } => norm_test(Criterion::DispIncr, tol, max_iter, relative, norm),
            TestConfig::NormUnbalance {
                tol,
                max_iter,
                relative,
                norm,
            } => norm_test(Criterion::Unbalance, tol, max_iter, relative, norm),
            TestConfig::EnergyIncr {
                tol,
                max_iter,
                relative,
            } => norm_test(Criterion::EnergyIncr, tol, max_iter, relative, NormType::L2),
            TestConfig::FixedIterations { iterations } => {
                Box::new(FixedIterations::new(iterations))
            }
        }
    }
}

/// Complete description of an analysis
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub handler: HandlerConfig,
    pub numberer: NumbererConfig,
    pub system: SystemConfig,
    pub integrator: IntegratorConfig,
    pub algorithm: AlgorithmConfig,
    pub test: TestConfig,
}

impl AnalysisConfig {
    pub fn from_json(json: &str) -> SolverResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> SolverResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_handler(mut self, handler: HandlerConfig) -> Self {
        self.handler = handler;
        self
    }

    pub fn with_numberer(mut self, numberer: NumbererConfig) -> Self {
        self.numberer = numberer;
        self
    }

    pub fn with_system(mut self, system: SystemConfig) -> Self {
        self.system = system;
        self
    }

    pub fn with_integrator(mut self, integrator: IntegratorConfig) -> Self {
        self.integrator = integrator;
        self
    }

    pub fn with_algorithm(mut self, algorithm: AlgorithmConfig) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_test(mut self, test: TestConfig) -> Self {
        self.test = test;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_round_trips_through_json() {
        let config = AnalysisConfig::default();
        let json = config.to_json().unwrap();
        assert_eq!(AnalysisConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = AnalysisConfig::from_json(
            r#"{
                "handler": { "type": "penalty", "alpha_sp": 1e10 },
                "system": { "type": "substructured", "subdomains": [[1], [2, 3]] },
                "integrator": { "type": "hht", "alpha": 0.9 },
                "test": { "type": "energy_incr", "tol": 1e-10, "max_iter": 10 }
            }"#,
        )
        .unwrap();
        assert_eq!(
            config.handler,
            HandlerConfig::Penalty {
                alpha_sp: 1e10,
                alpha_mp: 1e12
            }
        );
        assert_eq!(config.numberer, NumbererConfig::Plain);
        match &config.system {
            SystemConfig::Substructured { subdomains } => assert_eq!(subdomains[1], vec![2, 3]),
            other => panic!("unexpected system {other:?}"),
        }
        assert_eq!(config.integrator.build().unwrap().name(), "GeneralizedAlpha");
        assert_eq!(config.test.build().name(), "EnergyIncr");
    }

    #[test]
    fn test_malformed_json_is_a_config_error() {
        let err = AnalysisConfig::from_json("{ \"handler\": 3 }").unwrap_err();
        assert!(matches!(err, crate::error::SolverError::Config(_)));
    }

    #[test]
    fn test_invalid_integrator_parameters_rejected() {
        let config = IntegratorConfig::Hht {
            alpha: 0.1,
            rayleigh: RayleighDamping::default(),
        };
        assert!(config.build().is_err());
    }

    #[test]
    fn test_sparse_solver_configs_build() {
        let cg: SparseSolverConfig =
            serde_json::from_str(r#"{ "type": "cg", "max_iter": 50 }"#).unwrap();
        assert_eq!(cg, SparseSolverConfig::Cg { tol: 1.0e-12, max_iter: 50 });
        assert_eq!(cg.build().name(), "PCG");
        assert_eq!(SparseSolverConfig::default().build().name(), "SparseLU");
        let system = SystemConfig::SparseGeneral {
            solver: SparseSolverConfig::Cg { tol: 1e-10, max_iter: 100 },
        };
        assert_eq!(system.build().name(), "SparseGeneral");
    }
}
