//! Domain-decomposition system of equations.
//!
//! Equations are split by a node → subdomain map into the interior
//! equations of each subdomain and the interface equations shared between
//! subdomains. A solve condenses every subdomain onto the interface
//!
//! ```text
//! S = A_bb − Σ_s A_bs A_ss⁻¹ A_sb        g = b_b − Σ_s A_bs A_ss⁻¹ b_s
//! ```
//!
//! in parallel, solves `S x_b = g`, then back-substitutes
//! `x_s = A_ss⁻¹ (b_s − A_sb x_b)` in parallel. All condensations finish
//! before the interface solve starts.

use super::{LinearSoe, allocate, allocate_vector, check_finite, check_matrix_ids, scatter_add};
use crate::error::{SolverError, SolverResult};
use crate::model::{DofGraph, EqnOwner};
use log::debug;
use nalgebra::linalg::LU;
use nalgebra::{DMatrix, DVector, Dyn};
use rayon::prelude::*;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    Interior { sub: usize, local: usize },
    Interface(usize),
}

#[derive(Debug, Clone)]
struct Condensed {
    lu: LU<f64, Dyn, Dyn>,
    /// A_ss⁻¹ A_sb
    coupling: DMatrix<f64>,
}

#[derive(Debug, Clone)]
struct Subdomain {
    eqns: Vec<usize>,
    a_ss: DMatrix<f64>,
    a_sb: DMatrix<f64>,
    a_bs: DMatrix<f64>,
    condensed: Option<Condensed>,
}

impl Subdomain {
    fn new(eqns: Vec<usize>, nb: usize) -> SolverResult<Self> {
        let ni = eqns.len();
        let dense = |rows: usize, cols: usize| -> SolverResult<DMatrix<f64>> {
            Ok(DMatrix::from_vec(rows, cols, allocate(ni, rows.checked_mul(cols))?))
        };
        Ok(Self {
            a_ss: dense(ni, ni)?,
            a_sb: dense(ni, nb)?,
            a_bs: dense(nb, ni)?,
            eqns,
            condensed: None,
        })
    }

    fn zero(&mut self) {
        self.a_ss.fill(0.0);
        self.a_sb.fill(0.0);
        self.a_bs.fill(0.0);
        self.condensed = None;
    }

    /// Factor the interior block (once per matrix) and return this
    /// subdomain's interface contributions `(A_bs A_ss⁻¹ A_sb, A_bs A_ss⁻¹ b_s)`
    fn condense(&mut self, b_s: &DVector<f64>) -> SolverResult<(DMatrix<f64>, DVector<f64>)> {
        if self.condensed.is_none() {
            let lu = self.a_ss.clone().lu();
            if !lu.is_invertible() {
                return Err(SolverError::SingularSystem(
                    "singular subdomain interior block".to_string(),
                ));
            }
            let coupling = lu.solve(&self.a_sb).ok_or_else(|| {
                SolverError::SingularSystem("subdomain condensation failed".to_string())
            })?;
            self.condensed = Some(Condensed { lu, coupling });
        }
        let condensed = self
            .condensed
            .as_ref()
            .ok_or_else(|| SolverError::SingularSystem("missing condensation".to_string()))?;
        let y = condensed.lu.solve(b_s).ok_or_else(|| {
            SolverError::SingularSystem("subdomain interior solve failed".to_string())
        })?;
        Ok((&self.a_bs * &condensed.coupling, &self.a_bs * y))
    }

    fn back_substitute(&self, b_s: &DVector<f64>, x_b: &DVector<f64>) -> SolverResult<DVector<f64>> {
        let condensed = self
            .condensed
            .as_ref()
            .ok_or_else(|| SolverError::SingularSystem("subdomain not condensed".to_string()))?;
        let y = condensed.lu.solve(b_s).ok_or_else(|| {
            SolverError::SingularSystem("subdomain interior solve failed".to_string())
        })?;
        Ok(y - &condensed.coupling * x_b)
    }
}

#[derive(Debug, Clone)]
pub struct SubstructuredSoe {
    partition: BTreeMap<i32, usize>,
    locations: Vec<Location>,
    subdomains: Vec<Subdomain>,
    interface: Vec<usize>,
    a_bb: DMatrix<f64>,
    interface_lu: Option<LU<f64, Dyn, Dyn>>,
    b: DVector<f64>,
    x: DVector<f64>,
}

impl SubstructuredSoe {
    /// `partition` maps node tags to subdomain ids. Equations of unmapped
    /// nodes and Lagrange multipliers always belong to the interface.
    pub fn new(partition: BTreeMap<i32, usize>) -> Self {
        Self {
            partition,
            locations: Vec::new(),
            subdomains: Vec::new(),
            interface: Vec::new(),
            a_bb: DMatrix::zeros(0, 0),
            interface_lu: None,
            b: DVector::zeros(0),
            x: DVector::zeros(0),
        }
    }

    pub fn num_subdomains(&self) -> usize {
        self.subdomains.len()
    }

    pub fn interface_size(&self) -> usize {
        self.interface.len()
    }

    fn subdomain_of(&self, owner: EqnOwner) -> Option<usize> {
        match owner {
            EqnOwner::Node(tag) => self.partition.get(&tag).copied(),
            EqnOwner::Multiplier(_) => None,
        }
    }

    fn invalidate(&mut self) {
        self.interface_lu = None;
        for sub in &mut self.subdomains {
            sub.condensed = None;
        }
    }

    fn add_entry(&mut self, i: usize, j: usize, value: f64) {
        match (self.locations[i], self.locations[j]) {
            (Location::Interface(p), Location::Interface(q)) => self.a_bb[(p, q)] += value,
            (Location::Interior { sub, local: p }, Location::Interface(q)) => {
                self.subdomains[sub].a_sb[(p, q)] += value
            }
            (Location::Interface(p), Location::Interior { sub, local: q }) => {
                self.subdomains[sub].a_bs[(p, q)] += value
            }
            (Location::Interior { sub: s, local: p }, Location::Interior { sub: t, local: q }) => {
                assert_eq!(s, t, "equations {i} and {j} couple different subdomain interiors");
                self.subdomains[s].a_ss[(p, q)] += value;
            }
        }
    }

    fn interior_rhs(&self, sub: &Subdomain) -> DVector<f64> {
        DVector::from_iterator(sub.eqns.len(), sub.eqns.iter().map(|&e| self.b[e]))
    }
}

impl LinearSoe for SubstructuredSoe {
    fn name(&self) -> &'static str {
        "Substructured"
    }

    fn set_size(&mut self, graph: &DofGraph) -> SolverResult<()> {
        let n = graph.num_eqn();
        let home: Vec<Option<usize>> = (0..n).map(|e| self.subdomain_of(graph.owner(e))).collect();

        // interior: owned by a subdomain and coupled only within it
        let mut interior: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        let mut interface = Vec::new();
        for e in 0..n {
            let own = home[e];
            let isolated = own.is_some() && graph.neighbours(e).iter().all(|&k| home[k] == own);
            match own {
                Some(s) if isolated => interior.entry(s).or_default().push(e),
                _ => interface.push(e),
            }
        }

        let nb = interface.len();
        let mut locations = vec![Location::Interface(0); n];
        for (p, &e) in interface.iter().enumerate() {
            locations[e] = Location::Interface(p);
        }
        let mut subdomains = Vec::with_capacity(interior.len());
        for (sub, eqns) in interior.into_values().enumerate() {
            for (local, &e) in eqns.iter().enumerate() {
                locations[e] = Location::Interior { sub, local };
            }
            subdomains.push(Subdomain::new(eqns, nb)?);
        }

        self.a_bb = DMatrix::from_vec(nb, nb, allocate(n, nb.checked_mul(nb))?);
        self.locations = locations;
        self.subdomains = subdomains;
        self.interface = interface;
        self.interface_lu = None;
        self.b = allocate_vector(n)?;
        self.x = allocate_vector(n)?;
        debug!(
            "substructured SOE: {} subdomains, {nb} interface equations of {n}",
            self.subdomains.len()
        );
        Ok(())
    }

    fn num_eqn(&self) -> usize {
        self.b.len()
    }

    fn zero_a(&mut self) {
        self.a_bb.fill(0.0);
        for sub in &mut self.subdomains {
            sub.zero();
        }
        self.interface_lu = None;
    }

    fn zero_b(&mut self) {
        self.b.fill(0.0);
    }

    fn add_a(&mut self, m: &DMatrix<f64>, ids: &[Option<usize>], factor: f64) {
        check_matrix_ids(m, ids);
        for (r, row) in ids.iter().enumerate() {
            let Some(i) = *row else { continue };
            for (c, col) in ids.iter().enumerate() {
                if let Some(j) = *col {
                    self.add_entry(i, j, factor * m[(r, c)]);
                }
            }
        }
        self.invalidate();
    }

    fn add_b(&mut self, v: &DVector<f64>, ids: &[Option<usize>], factor: f64) {
        scatter_add(&mut self.b, v, ids, factor);
    }

    fn set_b(&mut self, v: &DVector<f64>) {
        self.b.copy_from(v);
    }

    fn set_x(&mut self, v: &DVector<f64>) {
        self.x.copy_from(v);
    }

    fn solve(&mut self) -> SolverResult<()> {
        if self.num_eqn() == 0 {
            return Ok(());
        }
        let rhs: Vec<DVector<f64>> = self.subdomains.iter().map(|s| self.interior_rhs(s)).collect();

        // condensation of all subdomains completes before the interface solve
        let contributions: Vec<SolverResult<(DMatrix<f64>, DVector<f64>)>> = self
            .subdomains
            .par_iter_mut()
            .zip(rhs.par_iter())
            .map(|(sub, b_s)| sub.condense(b_s))
            .collect();

        let nb = self.interface.len();
        let mut schur = self.a_bb.clone();
        let mut g = DVector::from_iterator(nb, self.interface.iter().map(|&e| self.b[e]));
        for contribution in contributions {
            let (s, gs) = contribution?;
            schur -= s;
            g -= gs;
        }

        let x_b = if nb == 0 {
            DVector::zeros(0)
        } else {
            if self.interface_lu.is_none() {
                let lu = schur.lu();
                if !lu.is_invertible() {
                    return Err(SolverError::SingularSystem(
                        "singular interface Schur complement".to_string(),
                    ));
                }
                self.interface_lu = Some(lu);
            }
            self.interface_lu
                .as_ref()
                .and_then(|lu| lu.solve(&g))
                .ok_or_else(|| SolverError::SingularSystem("interface solve failed".to_string()))?
        };

        let interiors: Vec<SolverResult<DVector<f64>>> = self
            .subdomains
            .par_iter()
            .zip(rhs.par_iter())
            .map(|(sub, b_s)| sub.back_substitute(b_s, &x_b))
            .collect();

        let mut x = DVector::zeros(self.num_eqn());
        for (p, &e) in self.interface.iter().enumerate() {
            x[e] = x_b[p];
        }
        for (sub, interior) in self.subdomains.iter().zip(interiors) {
            let x_s = interior?;
            for (local, &e) in sub.eqns.iter().enumerate() {
                x[e] = x_s[local];
            }
        }
        check_finite(&x, "substructured solve")?;
        self.x = x;
        Ok(())
    }

    fn x(&self) -> &DVector<f64> {
        &self.x
    }

    fn b(&self) -> &DVector<f64> {
        &self.b
    }

    fn a_entry(&self, i: usize, j: usize) -> f64 {
        match (self.locations[i], self.locations[j]) {
            (Location::Interface(p), Location::Interface(q)) => self.a_bb[(p, q)],
            (Location::Interior { sub, local: p }, Location::Interface(q)) => {
                self.subdomains[sub].a_sb[(p, q)]
            }
            (Location::Interface(p), Location::Interior { sub, local: q }) => {
                self.subdomains[sub].a_bs[(p, q)]
            }
            (Location::Interior { sub: s, local: p }, Location::Interior { sub: t, local: q }) => {
                if s == t {
                    self.subdomains[s].a_ss[(p, q)]
                } else {
                    0.0
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::collections::BTreeSet;

    /// Spring chain of 5 single-DOF nodes (tags 1..=5), equation i on node i+1
    fn chain_graph() -> DofGraph {
        let n = 5;
        let sets = (0..n)
            .map(|i| {
                let mut s = BTreeSet::new();
                if i > 0 {
                    s.insert(i - 1);
                }
                if i + 1 < n {
                    s.insert(i + 1);
                }
                s
            })
            .collect();
        DofGraph::from_sets(sets, (1..=5).map(EqnOwner::Node).collect())
    }

    #[test]
    fn partitioned_chain_matches_direct_solve() {
        let partition = BTreeMap::from([(1, 0), (2, 0), (3, 0), (4, 1), (5, 1)]);
        let mut soe = SubstructuredSoe::new(partition);
        soe.set_size(&chain_graph()).unwrap();
        assert_eq!(soe.num_subdomains(), 2);
        // equations 2 and 3 couple across the cut
        assert_eq!(soe.interface_size(), 2);

        let spring = DMatrix::from_row_slice(2, 2, &[2.0, -2.0, -2.0, 2.0]);
        let mut k = DMatrix::zeros(5, 5);
        for i in 0..4 {
            soe.add_a(&spring, &[Some(i), Some(i + 1)], 1.0);
            let mut block = k.view_mut((i, i), (2, 2));
            block += &spring;
        }
        soe.add_a(&DMatrix::from_element(1, 1, 3.0), &[Some(0)], 1.0);
        k[(0, 0)] += 3.0;

        let x0 = DVector::from_vec(vec![0.1, 0.4, -0.2, 0.3, 1.0]);
        soe.set_b(&(&k * &x0));
        soe.solve().unwrap();
        assert_relative_eq!(soe.x().clone(), x0, epsilon = 1e-10);
        assert_relative_eq!(soe.a_entry(2, 3), -2.0);

        // second solve reuses the condensation
        soe.set_b(&(&k * (2.0 * &x0)));
        soe.solve().unwrap();
        assert_relative_eq!(soe.x().clone(), 2.0 * x0, epsilon = 1e-10);
    }
}
