//! 2-node small-strain truss.
//!
//! ```text
//! ε = c · (u2 − u1) / L        N = A σ(ε, ε̇)
//! K = (A E_t / L) [ c cᵀ  −c cᵀ ]
//!                 [−c cᵀ   c cᵀ ]
//! ```
//!
//! where `c` holds the direction cosines over the first `dim` DOFs of each
//! node, `dim = min(number of coordinates, node DOFs)`. Extra node DOFs
//! (rotations of frame nodes) receive no contribution. Mass is lumped:
//! `ρ L / 2` on each translational DOF, with `ρ` the mass per unit length.

use super::{Element, two_node_block};
use crate::codec::{self, StateCodec};
use crate::error::{DomainError, DomainResult};
use crate::material::UniaxialMaterial;
use crate::node::Node;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

#[derive(Debug)]
pub struct Truss {
    tag: i32,
    nodes: [i32; 2],
    area: f64,
    rho: f64,
    material: Box<dyn UniaxialMaterial>,
    geometry: Option<Geometry>,
}

#[derive(Debug, Clone)]
struct Geometry {
    length: f64,
    cosines: Vec<f64>,
    ndof: usize,
}

#[derive(Serialize, Deserialize)]
struct TrussState {
    material: Vec<u8>,
}

impl Truss {
    pub fn new(
        tag: i32,
        node_i: i32,
        node_j: i32,
        area: f64,
        material: Box<dyn UniaxialMaterial>,
    ) -> Self {
        Self {
            tag,
            nodes: [node_i, node_j],
            area,
            rho: 0.0,
            material,
            geometry: None,
        }
    }

    /// Set mass per unit length
    pub fn with_mass_density(mut self, rho: f64) -> Self {
        self.rho = rho;
        self
    }

    pub fn material(&self) -> &dyn UniaxialMaterial {
        self.material.as_ref()
    }

    /// Axial force at trial state
    pub fn axial_force(&self) -> f64 {
        self.area * self.material.stress()
    }

    pub fn length(&self) -> Option<f64> {
        self.geometry.as_ref().map(|g| g.length)
    }

    fn dims(&self) -> (usize, f64, &[f64]) {
        match &self.geometry {
            Some(g) => (g.ndof, g.length, &g.cosines),
            None => (0, 1.0, &[]),
        }
    }

    fn axial_pattern(&self, factor: f64) -> DMatrix<f64> {
        let (ndof, length, cosines) = self.dims();
        let dim = cosines.len();
        let k = factor * self.area / length;
        let mut pattern = DMatrix::zeros(dim, dim);
        for a in 0..dim {
            for b in 0..dim {
                pattern[(a, b)] = k * cosines[a] * cosines[b];
            }
        }
        let dofs: Vec<usize> = (0..dim).collect();
        two_node_block(&pattern, &dofs, ndof)
    }

    fn check_nodes(&self, nodes: &[&Node]) -> DomainResult<()> {
        if nodes.len() != 2 {
            return Err(DomainError::DimensionMismatch {
                expected: 2,
                found: nodes.len(),
            });
        }
        Ok(())
    }
}

impl Element for Truss {
    fn tag(&self) -> i32 {
        self.tag
    }

    fn node_tags(&self) -> &[i32] {
        &self.nodes
    }

    fn num_dof(&self) -> usize {
        self.geometry.as_ref().map_or(0, |g| 2 * g.ndof)
    }

    fn connect(&mut self, nodes: &[&Node]) -> DomainResult<()> {
        self.check_nodes(nodes)?;
        let (a, b) = (nodes[0], nodes[1]);
        if a.num_dof() != b.num_dof() {
            return Err(DomainError::InvalidInput(format!(
                "truss {}: nodes {} and {} have different DOF counts",
                self.tag,
                a.tag(),
                b.tag()
            )));
        }

        let ndof = a.num_dof();
        let dim = a.coords().len().min(b.coords().len()).min(ndof);
        let delta: Vec<f64> = (0..dim).map(|i| b.coords()[i] - a.coords()[i]).collect();
        let length = delta.iter().map(|d| d * d).sum::<f64>().sqrt();
        if length < 1e-10 {
            return Err(DomainError::InvalidInput(format!(
                "truss {} has zero or near-zero length: {length}",
                self.tag
            )));
        }

        self.geometry = Some(Geometry {
            length,
            cosines: delta.iter().map(|d| d / length).collect(),
            ndof,
        });
        Ok(())
    }

    fn update(&mut self, nodes: &[&Node]) -> DomainResult<()> {
        self.check_nodes(nodes)?;
        let Some(geometry) = &self.geometry else {
            return Err(DomainError::InvalidInput(format!(
                "truss {} updated before connect",
                self.tag
            )));
        };

        let du = nodes[1].trial_disp() - nodes[0].trial_disp();
        let dv = nodes[1].trial_vel() - nodes[0].trial_vel();
        let mut elongation = 0.0;
        let mut rate = 0.0;
        for (i, c) in geometry.cosines.iter().enumerate() {
            elongation += c * du[i];
            rate += c * dv[i];
        }
        let length = geometry.length;
        self.material
            .set_trial_strain(elongation / length, rate / length)
    }

    fn tangent_stiff(&self) -> DMatrix<f64> {
        self.axial_pattern(self.material.tangent())
    }

    fn initial_stiff(&self) -> DMatrix<f64> {
        self.axial_pattern(self.material.initial_tangent())
    }

    fn damp(&self) -> DMatrix<f64> {
        self.axial_pattern(self.material.damping_tangent())
    }

    fn mass(&self) -> DMatrix<f64> {
        let (ndof, length, cosines) = self.dims();
        let mut m = DMatrix::zeros(2 * ndof, 2 * ndof);
        let lumped = 0.5 * self.rho * length;
        for i in 0..cosines.len() {
            m[(i, i)] = lumped;
            m[(ndof + i, ndof + i)] = lumped;
        }
        m
    }

    fn resisting_force(&self) -> DVector<f64> {
        let (ndof, _, cosines) = self.dims();
        let n = self.axial_force();
        let mut f = DVector::zeros(2 * ndof);
        for (i, c) in cosines.iter().enumerate() {
            f[i] = -n * c;
            f[ndof + i] = n * c;
        }
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

impl StateCodec for Truss {
    fn encode_state(&self) -> DomainResult<Vec<u8>> {
        codec::encode(&TrussState {
            material: self.material.encode_state()?,
        })
    }

    fn decode_state(&mut self, bytes: &[u8]) -> DomainResult<()> {
        let state: TrussState = codec::decode(bytes)?;
        self.material.decode_state(&state.material)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::ElasticMaterial;
    use approx::assert_relative_eq;

    fn inclined() -> (Truss, Node, Node) {
        let n1 = Node::new(1, 2, &[0.0, 0.0]);
        let n2 = Node::new(2, 2, &[3.0, 4.0]);
        let mut truss = Truss::new(1, 1, 2, 0.01, Box::new(ElasticMaterial::new(1, 200e9)));
        truss.connect(&[&n1, &n2]).unwrap();
        (truss, n1, n2)
    }

    #[test]
    fn stiffness_of_inclined_bar() {
        let (truss, _, _) = inclined();
        let k = truss.tangent_stiff();
        let ea_l = 0.01 * 200e9 / 5.0;

        assert_eq!(truss.num_dof(), 4);
        assert_relative_eq!(k[(0, 0)], ea_l * 0.36, max_relative = 1e-12);
        assert_relative_eq!(k[(0, 1)], ea_l * 0.48, max_relative = 1e-12);
        assert_relative_eq!(k[(1, 1)], ea_l * 0.64, max_relative = 1e-12);
        assert_relative_eq!(k[(0, 2)], -ea_l * 0.36, max_relative = 1e-12);
        assert_eq!(k, k.transpose());
    }

    #[test]
    fn axial_elongation_gives_tension() {
        let (mut truss, n1, mut n2) = inclined();
        n2.set_trial_disp(&DVector::from_vec(vec![0.003, 0.004])).unwrap();
        truss.update(&[&n1, &n2]).unwrap();

        let strain = 0.005 / 5.0;
        assert_relative_eq!(truss.axial_force(), 0.01 * 200e9 * strain, max_relative = 1e-12);
        let f = truss.resisting_force();
        assert_relative_eq!(f[2], truss.axial_force() * 0.6, max_relative = 1e-12);
        assert_relative_eq!(f[0] + f[2], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn lumped_mass_on_translations_only() {
        let n1 = Node::new(1, 3, &[0.0, 0.0]);
        let n2 = Node::new(2, 3, &[2.0, 0.0]);
        let mut truss = Truss::new(1, 1, 2, 1.0, Box::new(ElasticMaterial::new(1, 1.0)))
            .with_mass_density(3.0);
        truss.connect(&[&n1, &n2]).unwrap();

        let m = truss.mass();
        assert_eq!(m.nrows(), 6);
        assert_relative_eq!(m[(0, 0)], 3.0);
        assert_relative_eq!(m[(4, 4)], 3.0);
        assert_eq!(m[(2, 2)], 0.0);
    }

    #[test]
    fn zero_length_is_rejected() {
        let n1 = Node::new(1, 2, &[1.0, 1.0]);
        let n2 = Node::new(2, 2, &[1.0, 1.0]);
        let mut truss = Truss::new(1, 1, 2, 1.0, Box::new(ElasticMaterial::new(1, 1.0)));
        assert!(truss.connect(&[&n1, &n2]).is_err());
    }
}
