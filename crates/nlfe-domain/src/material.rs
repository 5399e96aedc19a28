//! Uniaxial material models used by the reference elements.

use crate::codec::{self, StateCodec};
use crate::error::{DomainError, DomainResult};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Stress-strain relation along a single axis.
///
/// The element sets a trial strain every iteration; the material answers
/// with stress and tangent at that trial strain. Trial state only becomes
/// history on [`UniaxialMaterial::commit_state`].
pub trait UniaxialMaterial: StateCodec + Debug + Send {
    fn tag(&self) -> i32;

    /// Set the trial strain and strain rate
    fn set_trial_strain(&mut self, strain: f64, strain_rate: f64) -> DomainResult<()>;

    fn strain(&self) -> f64;
    fn stress(&self) -> f64;
    fn tangent(&self) -> f64;
    fn initial_tangent(&self) -> f64;

    /// Viscous tangent dσ/dε̇
    fn damping_tangent(&self) -> f64 {
        0.0
    }

    fn commit_state(&mut self);
    fn revert_to_last_commit(&mut self);
    fn revert_to_start(&mut self);

    /// Fresh copy with the same parameters and state
    fn boxed_clone(&self) -> Box<dyn UniaxialMaterial>;
}

fn check_finite(strain: f64, strain_rate: f64) -> DomainResult<()> {
    if !strain.is_finite() || !strain_rate.is_finite() {
        return Err(DomainError::InvalidInput(format!(
            "non-finite trial strain {strain} (rate {strain_rate})"
        )));
    }
    Ok(())
}

/// Linear elastic material with optional viscous term: σ = E ε + η ε̇
#[derive(Debug, Clone, PartialEq)]
pub struct ElasticMaterial {
    tag: i32,
    e: f64,
    eta: f64,
    trial: ElasticState,
    committed: ElasticState,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
struct ElasticState {
    strain: f64,
    strain_rate: f64,
}

impl ElasticMaterial {
    pub fn new(tag: i32, e: f64) -> Self {
        Self::with_damping(tag, e, 0.0)
    }

    pub fn with_damping(tag: i32, e: f64, eta: f64) -> Self {
        Self {
            tag,
            e,
            eta,
            trial: ElasticState::default(),
            committed: ElasticState::default(),
        }
    }
}

impl UniaxialMaterial for ElasticMaterial {
    fn tag(&self) -> i32 {
        self.tag
    }

    fn set_trial_strain(&mut self, strain: f64, strain_rate: f64) -> DomainResult<()> {
        check_finite(strain, strain_rate)?;
        self.trial = ElasticState {
            strain,
            strain_rate,
        };
        Ok(())
    }

    fn strain(&self) -> f64 {
        self.trial.strain
    }

    fn stress(&self) -> f64 {
        self.e * self.trial.strain + self.eta * self.trial.strain_rate
    }

    fn tangent(&self) -> f64 {
        self.e
    }

    fn initial_tangent(&self) -> f64 {
        self.e
    }

    fn damping_tangent(&self) -> f64 {
        self.eta
    }

    fn commit_state(&mut self) {
        self.committed = self.trial;
    }

    fn revert_to_last_commit(&mut self) {
        self.trial = self.committed;
    }

    fn revert_to_start(&mut self) {
        self.trial = ElasticState::default();
        self.committed = ElasticState::default();
    }

    fn boxed_clone(&self) -> Box<dyn UniaxialMaterial> {
        Box::new(self.clone())
    }
}

impl StateCodec for ElasticMaterial {
    fn encode_state(&self) -> DomainResult<Vec<u8>> {
        codec::encode(&(self.committed, self.trial))
    }

    fn decode_state(&mut self, bytes: &[u8]) -> DomainResult<()> {
        let (committed, trial) = codec::decode(bytes)?;
        self.committed = committed;
        self.trial = trial;
        Ok(())
    }
}

/// Bilinear steel with kinematic hardening.
///
/// The elastic range is a band of width 2 f_y (1 − b) that translates along
/// the hardening line σ = E_sh ε, with E_sh = b E0.
#[derive(Debug, Clone, PartialEq)]
pub struct BilinearSteel {
    tag: i32,
    fy: f64,
    e0: f64,
    b: f64,
    trial: SteelState,
    committed: SteelState,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct SteelState {
    strain: f64,
    stress: f64,
    tangent: f64,
}

impl BilinearSteel {
    pub fn new(tag: i32, fy: f64, e0: f64, b: f64) -> DomainResult<Self> {
        if fy <= 0.0 || e0 <= 0.0 {
            return Err(DomainError::InvalidInput(format!(
                "steel {tag}: yield stress and modulus must be positive"
            )));
        }
        if !(0.0..1.0).contains(&b) {
            return Err(DomainError::InvalidInput(format!(
                "steel {tag}: hardening ratio {b} outside [0, 1)"
            )));
        }
        let start = SteelState {
            strain: 0.0,
            stress: 0.0,
            tangent: e0,
        };
        Ok(Self {
            tag,
            fy,
            e0,
            b,
            trial: start,
            committed: start,
        })
    }

    pub fn yield_stress(&self) -> f64 {
        self.fy
    }

    fn hardening_modulus(&self) -> f64 {
        self.b * self.e0
    }
}

impl UniaxialMaterial for BilinearSteel {
    fn tag(&self) -> i32 {
        self.tag
    }

    fn set_trial_strain(&mut self, strain: f64, strain_rate: f64) -> DomainResult<()> {
        check_finite(strain, strain_rate)?;

        let esh = self.hardening_modulus();
        let band = self.fy * (1.0 - self.b);
        let hardening = esh * strain;
        let elastic = self.committed.stress + self.e0 * (strain - self.committed.strain);

        let (stress, tangent) = if elastic > hardening + band {
            (hardening + band, esh)
        } else if elastic < hardening - band {
            (hardening - band, esh)
        } else {
            (elastic, self.e0)
        };

        self.trial = SteelState {
            strain,
            stress,
            tangent,
        };
        Ok(())
    }

    fn strain(&self) -> f64 {
        self.trial.strain
    }

    fn stress(&self) -> f64 {
        self.trial.stress
    }

    fn tangent(&self) -> f64 {
        self.trial.tangent
    }

    fn initial_tangent(&self) -> f64 {
        self.e0
    }

    fn commit_state(&mut self) {
        self.committed = self.trial;
    }

    fn revert_to_last_commit(&mut self) {
        self.trial = self.committed;
    }

    fn revert_to_start(&mut self) {
        let start = SteelState {
            strain: 0.0,
            stress: 0.0,
            tangent: self.e0,
        };
        self.trial = start;
        self.committed = start;
    }

    fn boxed_clone(&self) -> Box<dyn UniaxialMaterial> {
        Box::new(self.clone())
    }
}

impl StateCodec for BilinearSteel {
    fn encode_state(&self) -> DomainResult<Vec<u8>> {
        codec::encode(&(self.committed, self.trial))
    }

    fn decode_state(&mut self, bytes: &[u8]) -> DomainResult<()> {
        let (committed, trial) = codec::decode(bytes)?;
        self.committed = committed;
        self.trial = trial;
        Ok(())
    }
}
