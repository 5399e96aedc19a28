//! Zero-length spring acting along one DOF between two nodes.

use super::{Element, two_node_block};
use crate::codec::{self, StateCodec};
use crate::error::{DomainError, DomainResult};
use crate::material::UniaxialMaterial;
use crate::node::Node;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

#[derive(Debug)]
pub struct ZeroLength {
    tag: i32,
    nodes: [i32; 2],
    dof: usize,
    material: Box<dyn UniaxialMaterial>,
    ndof: usize,
}

#[derive(Serialize, Deserialize)]
struct ZeroLengthState {
    material: Vec<u8>,
}

impl ZeroLength {
    pub fn new(
        tag: i32,
        node_i: i32,
        node_j: i32,
        dof: usize,
        material: Box<dyn UniaxialMaterial>,
    ) -> Self {
        Self {
            tag,
            nodes: [node_i, node_j],
            dof,
            material,
            ndof: 0,
        }
    }

    /// Spring force at trial state (positive when node j moves away from i)
    pub fn force(&self) -> f64 {
        self.material.stress()
    }

    fn spring_pattern(&self, k: f64) -> DMatrix<f64> {
        two_node_block(&DMatrix::from_element(1, 1, k), &[self.dof], self.ndof)
    }
}

impl Element for ZeroLength {
    fn tag(&self) -> i32 {
        self.tag
    }

    fn node_tags(&self) -> &[i32] {
        &self.nodes
    }

    fn num_dof(&self) -> usize {
        2 * self.ndof
    }

    fn connect(&mut self, nodes: &[&Node]) -> DomainResult<()> {
        if nodes.len() != 2 {
            return Err(DomainError::DimensionMismatch {
                expected: 2,
                found: nodes.len(),
            });
        }
        let ndof = nodes[0].num_dof();
        if nodes[1].num_dof() != ndof {
            return Err(DomainError::InvalidInput(format!(
                "zero-length {}: nodes have different DOF counts",
                self.tag
            )));
        }
        if self.dof >= ndof {
            return Err(DomainError::DofOutOfRange {
                node: nodes[0].tag(),
                dof: self.dof,
                ndof,
            });
        }
        self.ndof = ndof;
        Ok(())
    }

    fn update(&mut self, nodes: &[&Node]) -> DomainResult<()> {
        if self.ndof == 0 {
            return Err(DomainError::InvalidInput(format!(
                "zero-length {} updated before connect",
                self.tag
            )));
        }
        let d = self.dof;
        let deformation = nodes[1].trial_disp()[d] - nodes[0].trial_disp()[d];
        let rate = nodes[1].trial_vel()[d] - nodes[0].trial_vel()[d];
        self.material.set_trial_strain(deformation, rate)
    }

    fn tangent_stiff(&self) -> DMatrix<f64> {
        self.spring_pattern(self.material.tangent())
    }

    fn initial_stiff(&self) -> DMatrix<f64> {
        self.spring_pattern(self.material.initial_tangent())
    }

    fn damp(&self) -> DMatrix<f64> {
        self.spring_pattern(self.material.damping_tangent())
    }

    fn mass(&self) -> DMatrix<f64> {
        DMatrix::zeros(self.num_dof(), self.num_dof())
    }

    fn resisting_force(&self) -> DVector<f64> {
        let mut f = DVector::zeros(self.num_dof());
        f[self.dof] = -self.force();
        f[self.ndof + self.dof] = self.force();
        f
    }

    fn commit_state(&mut self) {
        self.material.commit_state();
    }

    fn revert_to_last_commit(&mut self) {
        self.material.revert_to_last_commit();
    }

    fn revert_to_start(&mut self) {
        self.material.revert_to_start();
    }
}

impl StateCodec for ZeroLength {
    fn encode_state(&self) -> DomainResult<Vec<u8>> {
        codec::encode(&ZeroLengthState {
            material: self.material.encode_state()?,
        })
    }

    fn decode_state(&mut self, bytes: &[u8]) -> DomainResult<()> {
        let state: ZeroLengthState = codec::decode(bytes)?;
        self.material.decode_state(&state.material)
    }
}
