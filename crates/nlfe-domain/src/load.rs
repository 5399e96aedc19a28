//! Time series and nodal load patterns.

use crate::error::{DomainError, DomainResult};
use crate::node::Node;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::PI;

/// Load factor as a function of pseudo-time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimeSeries {
    Constant {
        factor: f64,
    },
    Linear {
        factor: f64,
    },
    /// `factor` inside `[start, end]`, zero outside
    Rectangular {
        start: f64,
        end: f64,
        factor: f64,
    },
    /// `factor · sin(2π (t − start) / period + phase)` inside `[start, end]`
    Trig {
        start: f64,
        end: f64,
        period: f64,
        phase: f64,
        factor: f64,
    },
    /// Piecewise linear through `(times[i], values[i])`, zero past the ends
    Path {
        times: Vec<f64>,
        values: Vec<f64>,
        factor: f64,
    },
}

impl TimeSeries {
    pub fn constant() -> Self {
        TimeSeries::Constant { factor: 1.0 }
    }

    pub fn linear() -> Self {
        TimeSeries::Linear { factor: 1.0 }
    }

    pub fn path(times: Vec<f64>, values: Vec<f64>) -> DomainResult<Self> {
        if times.len() != values.len() {
            return Err(DomainError::DimensionMismatch {
                expected: times.len(),
                found: values.len(),
            });
        }
        if times.windows(2).any(|w| w[1] <= w[0]) {
            return Err(DomainError::InvalidInput(
                "path time series needs strictly increasing times".to_string(),
            ));
        }
        Ok(TimeSeries::Path {
            times,
            values,
            factor: 1.0,
        })
    }

    pub fn factor(&self, t: f64) -> f64 {
        match self {
            TimeSeries::Constant { factor } => *factor,
            TimeSeries::Linear { factor } => factor * t,
            TimeSeries::Rectangular { start, end, factor } => {
                if t >= *start && t <= *end {
                    *factor
                } else {
                    0.0
                }
            }
            TimeSeries::Trig {
                start,
                end,
                period,
                phase,
                factor,
            } => {
                if t >= *start && t <= *end && *period > 0.0 {
                    factor * (2.0 * PI * (t - start) / period + phase).sin()
                } else {
                    0.0
                }
            }
            TimeSeries::Path {
                times,
                values,
                factor,
            } => factor * interpolate(times, values, t),
        }
    }
}

fn interpolate(times: &[f64], values: &[f64], t: f64) -> f64 {
    let (Some(&first), Some(&last)) = (times.first(), times.last()) else {
        return 0.0;
    };
    if t < first || t > last {
        return 0.0;
    }
    // first index with times[i] >= t
    let i = times.partition_point(|&ti| ti < t);
    if i == 0 {
        return values[0];
    }
    let (t0, t1) = (times[i - 1], times[i]);
    let (v0, v1) = (values[i - 1], values[i]);
    v0 + (v1 - v0) * (t - t0) / (t1 - t0)
}

/// Reference load on one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodalLoad {
    pub node: i32,
    pub values: DVector<f64>,
}

impl NodalLoad {
    pub fn new(node: i32, values: &[f64]) -> Self {
        Self {
            node,
            values: DVector::from_column_slice(values),
        }
    }
}

/// Set of nodal loads scaled by a time series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadPattern {
    pub tag: i32,
    pub series: TimeSeries,
    pub loads: Vec<NodalLoad>,
}

impl LoadPattern {
    pub fn new(tag: i32, series: TimeSeries) -> Self {
        Self {
            tag,
            series,
            loads: Vec::new(),
        }
    }

    pub fn with_load(mut self, load: NodalLoad) -> Self {
        self.loads.push(load);
        self
    }

    pub fn add_load(&mut self, load: NodalLoad) {
        self.loads.push(load);
    }

    /// Add `factor(t) · load` to every loaded node
    pub fn apply(&self, t: f64, nodes: &mut BTreeMap<i32, Node>) -> DomainResult<()> {
        let factor = self.series.factor(t);
        for load in &self.loads {
            let node = nodes
                .get_mut(&load.node)
                .ok_or(DomainError::NodeNotFound(load.node))?;
            node.add_unbalanced_load(&load.values, factor)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn series_factors() {
        assert_eq!(TimeSeries::constant().factor(12.0), 1.0);
        assert_eq!(TimeSeries::linear().factor(0.25), 0.25);

        let rect = TimeSeries::Rectangular {
            start: 1.0,
            end: 2.0,
            factor: 3.0,
        };
        assert_eq!(rect.factor(0.5), 0.0);
        assert_eq!(rect.factor(1.5), 3.0);

        let trig = TimeSeries::Trig {
            start: 0.0,
            end: 10.0,
            period: 4.0,
            phase: 0.0,
            factor: 2.0,
        };
        assert_relative_eq!(trig.factor(1.0), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn path_interpolates() {
        let path = TimeSeries::path(vec![0.0, 1.0, 3.0], vec![0.0, 2.0, 0.0]).unwrap();
        assert_relative_eq!(path.factor(0.5), 1.0);
        assert_relative_eq!(path.factor(2.0), 1.0);
        assert_relative_eq!(path.factor(1.0), 2.0);
        assert_eq!(path.factor(4.0), 0.0);
        assert!(TimeSeries::path(vec![1.0, 0.0], vec![0.0, 0.0]).is_err());
    }

    #[test]
    fn pattern_scales_loads() {
        let mut nodes = BTreeMap::new();
        nodes.insert(1, Node::new(1, 2, &[0.0, 0.0]));
        let pattern = LoadPattern::new(1, TimeSeries::linear()).with_load(NodalLoad::new(1, &[0.0, -10.0]));

        pattern.apply(0.5, &mut nodes).unwrap();
        assert_relative_eq!(nodes[&1].unbalanced_load()[1], -5.0);

        let missing = LoadPattern::new(2, TimeSeries::constant()).with_load(NodalLoad::new(9, &[1.0]));
        assert!(missing.apply(0.0, &mut nodes).is_err());
    }
}
