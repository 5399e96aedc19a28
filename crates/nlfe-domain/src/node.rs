//! Nodes and their response history.
//!
//! A node carries three response quantities (displacement, velocity,
//! acceleration), each with a committed value (last converged step) and a
//! trial value (current iterate). Solvers write trial values; only
//! [`Node::commit_state`] promotes them.

use crate::codec::{self, StateCodec};
use crate::error::{DomainError, DomainResult};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Committed/trial pair for one response quantity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub committed: DVector<f64>,
    pub trial: DVector<f64>,
}

impl Response {
    fn zeros(ndof: usize) -> Self {
        Self {
            committed: DVector::zeros(ndof),
            trial: DVector::zeros(ndof),
        }
    }

    fn commit(&mut self) {
        self.committed.copy_from(&self.trial);
    }

    fn revert(&mut self) {
        self.trial.copy_from(&self.committed);
    }

    fn reset(&mut self) {
        self.committed.fill(0.0);
        self.trial.fill(0.0);
    }
}

/// Serializable history of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    pub disp: Response,
    pub vel: Response,
    pub accel: Response,
}

/// A node of the finite element model
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    tag: i32,
    coords: Vec<f64>,
    disp: Response,
    vel: Response,
    accel: Response,
    load: DVector<f64>,
    mass: Option<DMatrix<f64>>,
}

impl Node {
    /// Create a node with `ndof` degrees of freedom at `coords`
    pub fn new(tag: i32, ndof: usize, coords: &[f64]) -> Self {
        Self {
            tag,
            coords: coords.to_vec(),
            disp: Response::zeros(ndof),
            vel: Response::zeros(ndof),
            accel: Response::zeros(ndof),
            load: DVector::zeros(ndof),
            mass: None,
        }
    }

    pub fn tag(&self) -> i32 {
        self.tag
    }

    pub fn num_dof(&self) -> usize {
        self.disp.trial.len()
    }

    pub fn coords(&self) -> &[f64] {
        &self.coords
    }

    pub fn trial_disp(&self) -> &DVector<f64> {
        &self.disp.trial
    }

    pub fn committed_disp(&self) -> &DVector<f64> {
        &self.disp.committed
    }

    pub fn trial_vel(&self) -> &DVector<f64> {
        &self.vel.trial
    }

    pub fn committed_vel(&self) -> &DVector<f64> {
        &self.vel.committed
    }

    pub fn trial_accel(&self) -> &DVector<f64> {
        &self.accel.trial
    }

    pub fn committed_accel(&self) -> &DVector<f64> {
        &self.accel.committed
    }

    /// Trial displacement minus committed displacement
    pub fn incremental_disp(&self) -> DVector<f64> {
        &self.disp.trial - &self.disp.committed
    }

    pub fn set_trial_disp(&mut self, values: &DVector<f64>) -> DomainResult<()> {
        self.check_len(values.len())?;
        self.disp.trial.copy_from(values);
        Ok(())
    }

    pub fn set_trial_disp_component(&mut self, dof: usize, value: f64) -> DomainResult<()> {
        self.check_dof(dof)?;
        self.disp.trial[dof] = value;
        Ok(())
    }

    pub fn incr_trial_disp(&mut self, increment: &DVector<f64>) -> DomainResult<()> {
        self.check_len(increment.len())?;
        self.disp.trial += increment;
        Ok(())
    }

    pub fn set_trial_vel(&mut self, values: &DVector<f64>) -> DomainResult<()> {
        self.check_len(values.len())?;
        self.vel.trial.copy_from(values);
        Ok(())
    }

    pub fn set_trial_accel(&mut self, values: &DVector<f64>) -> DomainResult<()> {
        self.check_len(values.len())?;
        self.accel.trial.copy_from(values);
        Ok(())
    }

    /// Set an initial condition: both committed and trial values change.
    pub fn set_initial_disp(&mut self, values: &DVector<f64>) -> DomainResult<()> {
        self.check_len(values.len())?;
        self.disp.committed.copy_from(values);
        self.disp.trial.copy_from(values);
        Ok(())
    }

    /// Set an initial condition: both committed and trial values change.
    pub fn set_initial_vel(&mut self, values: &DVector<f64>) -> DomainResult<()> {
        self.check_len(values.len())?;
        self.vel.committed.copy_from(values);
        self.vel.trial.copy_from(values);
        Ok(())
    }

    pub fn commit_state(&mut self) {
        self.disp.commit();
        self.vel.commit();
        self.accel.commit();
    }

    pub fn revert_to_last_commit(&mut self) {
        self.disp.revert();
        self.vel.revert();
        self.accel.revert();
    }

    pub fn revert_to_start(&mut self) {
        self.disp.reset();
        self.vel.reset();
        self.accel.reset();
        self.load.fill(0.0);
    }

    /// Applied load currently acting on the node
    pub fn unbalanced_load(&self) -> &DVector<f64> {
        &self.load
    }

    pub fn zero_unbalanced_load(&mut self) {
        self.load.fill(0.0);
    }

    pub fn add_unbalanced_load(&mut self, load: &DVector<f64>, factor: f64) -> DomainResult<()> {
        self.check_len(load.len())?;
        self.load.axpy(factor, load, 1.0);
        Ok(())
    }

    /// Lumped nodal mass (ndof x ndof)
    pub fn mass(&self) -> Option<&DMatrix<f64>> {
        self.mass.as_ref()
    }

    pub fn set_mass(&mut self, mass: DMatrix<f64>) -> DomainResult<()> {
        let ndof = self.num_dof();
        if mass.nrows() != ndof || mass.ncols() != ndof {
            return Err(DomainError::DimensionMismatch {
                expected: ndof,
                found: mass.nrows().max(mass.ncols()),
            });
        }
        self.mass = Some(mass);
        Ok(())
    }

    pub fn state(&self) -> NodeState {
        NodeState {
            disp: self.disp.clone(),
            vel: self.vel.clone(),
            accel: self.accel.clone(),
        }
    }

    pub fn restore_state(&mut self, state: NodeState) -> DomainResult<()> {
        self.check_len(state.disp.trial.len())?;
        self.disp = state.disp;
        self.vel = state.vel;
        self.accel = state.accel;
        Ok(())
    }

    fn check_len(&self, len: usize) -> DomainResult<()> {
        if len != self.num_dof() {
            return Err(DomainError::DimensionMismatch {
                expected: self.num_dof(),
                found: len,
            });
        }
        Ok(())
    }

    fn check_dof(&self, dof: usize) -> DomainResult<()> {
        if dof >= self.num_dof() {
            return Err(DomainError::DofOutOfRange {
                node: self.tag,
                dof,
                ndof: self.num_dof(),
            });
        }
        Ok(())
    }
}

impl StateCodec for Node {
    fn encode_state(&self) -> DomainResult<Vec<u8>> {
        codec::encode(&self.state())
    }

    fn decode_state(&mut self, bytes: &[u8]) -> DomainResult<()> {
        self.restore_state(codec::decode(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_and_revert_trial_state() {
        let mut node = Node::new(1, 2, &[0.0, 0.0]);
        node.set_trial_disp(&DVector::from_vec(vec![1.0, 2.0])).unwrap();
        node.commit_state();
        node.incr_trial_disp(&DVector::from_vec(vec![0.5, 0.0])).unwrap();

        assert_eq!(node.incremental_disp()[0], 0.5);
        node.revert_to_last_commit();
        assert_eq!(node.trial_disp()[0], 1.0);
        assert_eq!(node.incremental_disp().norm(), 0.0);
    }

    #[test]
    fn rejects_wrong_sizes() {
        let mut node = Node::new(3, 2, &[0.0, 0.0]);
        assert!(node.set_trial_disp(&DVector::zeros(3)).is_err());
        assert!(node.set_trial_disp_component(2, 1.0).is_err());
        assert!(node.set_mass(DMatrix::identity(3, 3)).is_err());
    }

    #[test]
    fn state_codec_round_trip() {
        let mut node = Node::new(7, 1, &[0.0]);
        node.set_initial_vel(&DVector::from_vec(vec![3.0])).unwrap();
        let bytes = node.encode_state().unwrap();

        let mut other = Node::new(7, 1, &[0.0]);
        other.decode_state(&bytes).unwrap();
        assert_eq!(other.committed_vel()[0], 3.0);
        assert_eq!(other.trial_vel()[0], 3.0);
    }
}
