//! The analysis model: DOF groups and FE elements built from a domain by a
//! constraint handler, plus the transfer of response vectors between
//! equation space and the domain's nodes.

use crate::error::{SolverError, SolverResult};
use nalgebra::{DMatrix, DVector};
use nlfe_domain::{Domain, DomainError, Node, SpConstraint};
use std::collections::{BTreeMap, BTreeSet};

pub mod dof_group;
pub mod fe_element;
pub mod graph;

pub use dof_group::{ConstraintRef, DofGroup, DofSlot, GroupKind, ModelDof, Transformation};
pub use fe_element::{FeElement, FeKind, RayleighDamping, ResidualKind, TangentFactors};
pub use graph::{DofGraph, EqnOwner};

/// Response quantity carried by nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Disp,
    Vel,
    Accel,
}

fn node_response(node: &Node, kind: ResponseKind, committed: bool) -> &DVector<f64> {
    match (kind, committed) {
        (ResponseKind::Disp, false) => node.trial_disp(),
        (ResponseKind::Disp, true) => node.committed_disp(),
        (ResponseKind::Vel, false) => node.trial_vel(),
        (ResponseKind::Vel, true) => node.committed_vel(),
        (ResponseKind::Accel, false) => node.trial_accel(),
        (ResponseKind::Accel, true) => node.committed_accel(),
    }
}

#[derive(Debug, Default)]
pub struct AnalysisModel {
    groups: Vec<DofGroup>,
    node_groups: BTreeMap<i32, usize>,
    elements: Vec<FeElement>,
    num_eqn: usize,
    prescribed: Vec<SpConstraint>,
}

impl AnalysisModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn add_node_group(&mut self, tag: i32, ndof: usize) -> usize {
        let index = self.groups.len();
        self.groups.push(DofGroup::for_node(index, tag, ndof));
        self.node_groups.insert(tag, index);
        index
    }

    pub fn add_multiplier_group(&mut self, constraint: ConstraintRef, n: usize) -> usize {
        let index = self.groups.len();
        self.groups
            .push(DofGroup::for_multiplier(index, constraint, n));
        index
    }

    pub fn add_fe_element(&mut self, element: FeElement) {
        self.elements.push(element);
    }

    /// Value imposed on an eliminated DOF
    pub fn add_prescribed(&mut self, sp: SpConstraint) {
        self.prescribed.push(sp);
    }

    pub fn groups(&self) -> &[DofGroup] {
        &self.groups
    }

    pub fn group(&self, index: usize) -> Option<&DofGroup> {
        self.groups.get(index)
    }

    pub fn group_mut(&mut self, index: usize) -> Option<&mut DofGroup> {
        self.groups.get_mut(index)
    }

    pub fn node_group(&self, tag: i32) -> Option<usize> {
        self.node_groups.get(&tag).copied()
    }

    pub fn fe_elements(&self) -> &[FeElement] {
        &self.elements
    }

    pub fn num_eqn(&self) -> usize {
        self.num_eqn
    }

    /// Equation number of a node DOF, `None` when constrained
    pub fn eqn_of(&self, node: i32, dof: usize) -> Option<usize> {
        self.node_group(node)
            .and_then(|g| self.groups[g].slot(dof))
            .and_then(DofSlot::eqn)
    }

    pub(crate) fn reset_numbering(&mut self) {
        for group in &mut self.groups {
            group.reset_numbering();
        }
        self.num_eqn = 0;
    }

    /// Finish a numbering pass: check completeness, refresh the id maps of
    /// every DOF group and FE element.
    pub(crate) fn finish_numbering(&mut self, num_eqn: usize) -> SolverResult<()> {
        if let Some(group) = self.groups.iter().find(|g| g.has_unnumbered()) {
            return Err(SolverError::Numbering(format!(
                "DOF group {} left unnumbered",
                group.index()
            )));
        }

        let mut all_ids = Vec::with_capacity(self.groups.len());
        for group in &self.groups {
            let ids = match group.transformation() {
                Some(t) => t
                    .columns
                    .iter()
                    .map(|c| match *c {
                        ModelDof::Own(d) => group.slot(d).and_then(DofSlot::eqn),
                        ModelDof::Retained { group, dof } => self
                            .groups
                            .get(group)
                            .and_then(|g| g.slot(dof))
                            .and_then(DofSlot::eqn),
                    })
                    .collect(),
                None => group.slots().iter().map(|s| s.eqn()).collect(),
            };
            all_ids.push(ids);
        }
        for (group, ids) in self.groups.iter_mut().zip(all_ids) {
            group.set_ids(ids);
        }
        for element in &mut self.elements {
            element.set_ids(&self.groups)?;
        }
        self.num_eqn = num_eqn;
        Ok(())
    }

    /// Equation adjacency for sizing systems of equations
    pub fn dof_graph(&self) -> DofGraph {
        let mut sets = vec![BTreeSet::new(); self.num_eqn];
        let mut link = |ids: &[Option<usize>]| {
            let eqns: Vec<usize> = ids.iter().flatten().copied().collect();
            for &i in &eqns {
                sets[i].extend(eqns.iter().copied());
            }
        };
        for element in &self.elements {
            link(element.ids());
        }
        for group in &self.groups {
            link(group.ids());
        }

        let mut owners = vec![EqnOwner::Multiplier(usize::MAX); self.num_eqn];
        for group in &self.groups {
            let owner = match group.node_tag() {
                Some(tag) => EqnOwner::Node(tag),
                None => EqnOwner::Multiplier(group.index()),
            };
            for e in group.slots().iter().filter_map(|s| s.eqn()) {
                owners[e] = owner;
            }
        }
        DofGraph::from_sets(sets, owners)
    }

    /// DOF-group adjacency: groups sharing an FE element, and transformed
    /// groups with their retained groups
    pub fn group_graph(&self) -> Vec<Vec<usize>> {
        let mut sets = vec![BTreeSet::new(); self.groups.len()];
        for element in &self.elements {
            for &a in element.groups() {
                for &b in element.groups() {
                    if a != b {
                        sets[a].insert(b);
                    }
                }
            }
        }
        for group in &self.groups {
            if let Some(t) = group.transformation() {
                for column in &t.columns {
                    if let ModelDof::Retained { group: r, .. } = *column {
                        if r != group.index() {
                            sets[group.index()].insert(r);
                            sets[r].insert(group.index());
                        }
                    }
                }
            }
        }
        sets.into_iter().map(|s| s.into_iter().collect()).collect()
    }

    pub(crate) fn group_node<'a>(&self, domain: &'a Domain, group: &DofGroup) -> SolverResult<&'a Node> {
        let tag = group.node_tag().ok_or_else(|| {
            SolverError::Numbering(format!("DOF group {} has no node", group.index()))
        })?;
        Ok(domain.node(tag).ok_or(DomainError::NodeNotFound(tag))?)
    }

    /// Node-space vector of a group mapped to model space (`Tᵀ v`)
    pub fn vector_to_model(&self, group: &DofGroup, v: DVector<f64>) -> DVector<f64> {
        match group.transformation() {
            Some(t) => t.matrix.transpose() * v,
            None => v,
        }
    }

    /// Node-space matrix of a group mapped to model space (`Tᵀ M T`)
    pub fn matrix_to_model(&self, group: &DofGroup, m: DMatrix<f64>) -> DMatrix<f64> {
        match group.transformation() {
            Some(t) => t.matrix.transpose() * m * &t.matrix,
            None => m,
        }
    }

    /// Gather a response quantity into equation space
    pub fn response(
        &self,
        domain: &Domain,
        kind: ResponseKind,
        committed: bool,
    ) -> SolverResult<DVector<f64>> {
        let mut out = DVector::zeros(self.num_eqn);
        for group in &self.groups {
            match group.kind() {
                GroupKind::Node { .. } => {
                    let values = node_response(self.group_node(domain, group)?, kind, committed);
                    for (d, slot) in group.slots().iter().enumerate() {
                        if let Some(e) = slot.eqn() {
                            out[e] = values[d];
                        }
                    }
                }
                GroupKind::Multiplier {
                    trial,
                    committed: last,
                    ..
                } => {
                    if kind == ResponseKind::Disp {
                        let values = if committed { last } else { trial };
                        for (d, slot) in group.slots().iter().enumerate() {
                            if let Some(e) = slot.eqn() {
                                out[e] = values[d];
                            }
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    /// Set a trial response quantity from equation space. Eliminated DOFs
    /// keep their current value.
    pub fn set_response(
        &mut self,
        domain: &mut Domain,
        kind: ResponseKind,
        values: &DVector<f64>,
    ) -> SolverResult<()> {
        self.check_len(values.len())?;
        let mut updates = Vec::new();
        for group in &self.groups {
            let Some(tag) = group.node_tag() else {
                continue;
            };
            let current = node_response(self.group_node(domain, group)?, kind, false);
            let new = match group.transformation() {
                Some(t) => {
                    let mut model = DVector::zeros(t.columns.len());
                    for (c, column) in t.columns.iter().enumerate() {
                        model[c] = match group.ids()[c] {
                            Some(e) => values[e],
                            None => self.column_value(domain, group, *column, kind)?,
                        };
                    }
                    &t.matrix * model
                }
                None => {
                    let mut new = current.clone();
                    for (d, slot) in group.slots().iter().enumerate() {
                        if let Some(e) = slot.eqn() {
                            new[d] = values[e];
                        }
                    }
                    new
                }
            };
            updates.push((tag, new));
        }

        for (tag, new) in updates {
            let node = domain.node_mut(tag).ok_or(DomainError::NodeNotFound(tag))?;
            match kind {
                ResponseKind::Disp => node.set_trial_disp(&new)?,
                ResponseKind::Vel => node.set_trial_vel(&new)?,
                ResponseKind::Accel => node.set_trial_accel(&new)?,
            }
        }
        if kind == ResponseKind::Disp {
            for group in &mut self.groups {
                let eqns: Vec<Option<usize>> = group.slots().iter().map(|s| s.eqn()).collect();
                if let Some(lambda) = group.multipliers_mut() {
                    for (d, e) in eqns.into_iter().enumerate() {
                        if let Some(e) = e {
                            lambda[d] = values[e];
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Add an equation-space increment to the trial displacements and
    /// multipliers
    pub fn incr_disp(&mut self, domain: &mut Domain, dx: &DVector<f64>) -> SolverResult<()> {
        self.check_len(dx.len())?;
        let mut updates = Vec::new();
        for group in &self.groups {
            let Some(tag) = group.node_tag() else {
                continue;
            };
            let model = DVector::from_iterator(
                group.num_model_dof(),
                group.ids().iter().map(|id| id.map_or(0.0, |e| dx[e])),
            );
            let increment = match group.transformation() {
                Some(t) => &t.matrix * model,
                None => model,
            };
            updates.push((tag, increment));
        }

        for (tag, increment) in updates {
            domain
                .node_mut(tag)
                .ok_or(DomainError::NodeNotFound(tag))?
                .incr_trial_disp(&increment)?;
        }
        for group in &mut self.groups {
            let eqns: Vec<Option<usize>> = group.slots().iter().map(|s| s.eqn()).collect();
            if let Some(lambda) = group.multipliers_mut() {
                for (d, e) in eqns.into_iter().enumerate() {
                    if let Some(e) = e {
                        lambda[d] += dx[e];
                    }
                }
            }
        }
        Ok(())
    }

    fn column_value(
        &self,
        domain: &Domain,
        group: &DofGroup,
        column: ModelDof,
        kind: ResponseKind,
    ) -> SolverResult<f64> {
        let (source, dof) = match column {
            ModelDof::Own(d) => (group, d),
            ModelDof::Retained { group: g, dof } => (
                self.groups.get(g).ok_or_else(|| {
                    SolverError::Numbering(format!("transformation refers to missing group {g}"))
                })?,
                dof,
            ),
        };
        Ok(node_response(self.group_node(domain, source)?, kind, false)[dof])
    }

    fn check_len(&self, len: usize) -> SolverResult<()> {
        if len != self.num_eqn {
            return Err(SolverError::InvalidInput(format!(
                "vector of length {len} for {} equations",
                self.num_eqn
            )));
        }
        Ok(())
    }

    /// Write prescribed values onto eliminated DOFs
    pub fn impose_prescribed(&self, domain: &mut Domain) -> SolverResult<()> {
        for sp in &self.prescribed {
            domain
                .node_mut(sp.node)
                .ok_or(DomainError::NodeNotFound(sp.node))?
                .set_trial_disp_component(sp.dof, sp.value)?;
        }
        Ok(())
    }

    /// Bring element state in line with the nodes' trial response
    pub fn update_domain(&self, domain: &mut Domain) -> SolverResult<()> {
        self.impose_prescribed(domain)?;
        domain.update()?;
        Ok(())
    }

    pub fn commit(&mut self, domain: &mut Domain) {
        for group in &mut self.groups {
            group.commit();
        }
        domain.commit();
    }

    pub fn revert(&mut self, domain: &mut Domain) -> SolverResult<()> {
        for group in &mut self.groups {
            group.revert();
        }
        domain.revert_to_last_commit()?;
        self.update_domain(domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_groups() -> AnalysisModel {
        let mut model = AnalysisModel::new();
        let a = model.add_node_group(1, 2);
        model.add_node_group(2, 2);
        if let Some(g) = model.group_mut(a) {
            g.constrain(0);
        }
        model.add_fe_element(FeElement::new(FeKind::Element { tag: 1 }, vec![0, 1]));
        let mut next = 0;
        for g in 0..2 {
            if let Some(group) = model.group_mut(g) {
                next = group.number_free(next);
            }
        }
        model.finish_numbering(next).unwrap();
        model
    }

    #[test]
    fn ids_follow_slots() {
        let model = two_groups();
        assert_eq!(model.num_eqn(), 3);
        assert_eq!(model.eqn_of(1, 0), None);
        assert_eq!(model.eqn_of(2, 1), Some(2));
        assert_eq!(model.fe_elements()[0].ids(), &[None, Some(0), Some(1), Some(2)]);
    }

    #[test]
    fn graph_couples_element_equations() {
        let model = two_groups();
        let graph = model.dof_graph();
        assert_eq!(graph.neighbours(0), &[0, 1, 2]);
        assert_eq!(graph.owner(0), EqnOwner::Node(1));
        assert_eq!(graph.owner(2), EqnOwner::Node(2));
        assert_eq!(model.group_graph(), vec![vec![1], vec![0]]);
    }

    #[test]
    fn unnumbered_group_is_an_error() {
        let mut model = AnalysisModel::new();
        model.add_node_group(1, 1);
        assert!(matches!(
            model.finish_numbering(0),
            Err(SolverError::Numbering(_))
        ));
    }
}
