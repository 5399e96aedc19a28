//! The model container consumed by the solution core.
//!
//! Adding or removing nodes, elements or constraints changes the active DOF
//! set and bumps [`Domain::change_stamp`]; analyses compare stamps to decide
//! when to renumber. Load patterns only scale loads and leave it untouched.

use crate::codec::{self, StateCodec};
use crate::constraint::{MpConstraint, SpConstraint};
use crate::element::Element;
use crate::error::{DomainError, DomainResult};
use crate::load::LoadPattern;
use crate::node::{Node, NodeState};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct Domain {
    nodes: BTreeMap<i32, Node>,
    elements: BTreeMap<i32, Box<dyn Element>>,
    sp_constraints: BTreeMap<i32, SpConstraint>,
    mp_constraints: BTreeMap<i32, MpConstraint>,
    patterns: BTreeMap<i32, LoadPattern>,
    current_time: f64,
    committed_time: f64,
    change_stamp: u64,
}

#[derive(Serialize, Deserialize)]
struct DomainSnapshot {
    current_time: f64,
    committed_time: f64,
    nodes: BTreeMap<i32, NodeState>,
    elements: BTreeMap<i32, Vec<u8>>,
}

impl Domain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monotonic counter of topology changes
    pub fn change_stamp(&self) -> u64 {
        self.change_stamp
    }

    fn bump(&mut self) {
        self.change_stamp += 1;
    }

    // ---- nodes ----

    pub fn add_node(&mut self, node: Node) -> DomainResult<()> {
        let tag = node.tag();
        if self.nodes.contains_key(&tag) {
            return Err(DomainError::DuplicateTag { kind: "node", tag });
        }
        self.nodes.insert(tag, node);
        self.bump();
        Ok(())
    }

    /// Remove a node that no element or constraint refers to
    pub fn remove_node(&mut self, tag: i32) -> DomainResult<Node> {
        if !self.nodes.contains_key(&tag) {
            return Err(DomainError::NodeNotFound(tag));
        }
        let referenced = self.elements.values().any(|e| e.node_tags().contains(&tag))
            || self.sp_constraints.values().any(|sp| sp.node == tag)
            || self
                .mp_constraints
                .values()
                .any(|mp| mp.retained_node == tag || mp.constrained_node == tag);
        if referenced {
            return Err(DomainError::InvalidInput(format!(
                "node {tag} is still referenced"
            )));
        }
        let node = self.nodes.remove(&tag).ok_or(DomainError::NodeNotFound(tag))?;
        self.bump();
        Ok(node)
    }

    pub fn node(&self, tag: i32) -> Option<&Node> {
        self.nodes.get(&tag)
    }

    pub fn node_mut(&mut self, tag: i32) -> Option<&mut Node> {
        self.nodes.get_mut(&tag)
    }

    /// Nodes in ascending tag order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    // ---- elements ----

    /// Connect the element to its nodes and add it
    pub fn add_element(&mut self, mut element: Box<dyn Element>) -> DomainResult<()> {
        let tag = element.tag();
        if self.elements.contains_key(&tag) {
            return Err(DomainError::DuplicateTag {
                kind: "element",
                tag,
            });
        }
        let nodes = collect_nodes(&self.nodes, element.node_tags())?;
        element.connect(&nodes)?;
        element.update(&nodes)?;
        debug!("element {tag} connected to nodes {:?}", element.node_tags());
        self.elements.insert(tag, element);
        self.bump();
        Ok(())
    }

    pub fn remove_element(&mut self, tag: i32) -> DomainResult<Box<dyn Element>> {
        let element = self
            .elements
            .remove(&tag)
            .ok_or(DomainError::ElementNotFound(tag))?;
        self.bump();
        Ok(element)
    }

    pub fn element(&self, tag: i32) -> Option<&dyn Element> {
        self.elements.get(&tag).map(|e| e.as_ref())
    }

    /// Elements in ascending tag order
    pub fn elements(&self) -> impl Iterator<Item = &dyn Element> {
        self.elements.values().map(|e| e.as_ref())
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    /// Nodes of an element, in the element's DOF order
    pub fn element_nodes(&self, element: &dyn Element) -> DomainResult<Vec<&Node>> {
        collect_nodes(&self.nodes, element.node_tags())
    }

    // ---- constraints ----

    pub fn add_sp_constraint(&mut self, sp: SpConstraint) -> DomainResult<()> {
        if self.sp_constraints.contains_key(&sp.tag) {
            return Err(DomainError::DuplicateTag {
                kind: "sp constraint",
                tag: sp.tag,
            });
        }
        self.check_dofs(sp.node, &[sp.dof])?;
        self.sp_constraints.insert(sp.tag, sp);
        self.bump();
        Ok(())
    }

    pub fn remove_sp_constraint(&mut self, tag: i32) -> DomainResult<SpConstraint> {
        let sp = self
            .sp_constraints
            .remove(&tag)
            .ok_or(DomainError::ConstraintNotFound(tag))?;
        self.bump();
        Ok(sp)
    }

    pub fn sp_constraint(&self, tag: i32) -> Option<&SpConstraint> {
        self.sp_constraints.get(&tag)
    }

    pub fn sp_constraints(&self) -> impl Iterator<Item = &SpConstraint> {
        self.sp_constraints.values()
    }

    pub fn add_mp_constraint(&mut self, mp: MpConstraint) -> DomainResult<()> {
        if self.mp_constraints.contains_key(&mp.tag) {
            return Err(DomainError::DuplicateTag {
                kind: "mp constraint",
                tag: mp.tag,
            });
        }
        self.check_dofs(mp.retained_node, &mp.retained_dofs)?;
        self.check_dofs(mp.constrained_node, &mp.constrained_dofs)?;
        self.mp_constraints.insert(mp.tag, mp);
        self.bump();
        Ok(())
    }

    pub fn remove_mp_constraint(&mut self, tag: i32) -> DomainResult<MpConstraint> {
        let mp = self
            .mp_constraints
            .remove(&tag)
            .ok_or(DomainError::ConstraintNotFound(tag))?;
        self.bump();
        Ok(mp)
    }

    pub fn mp_constraint(&self, tag: i32) -> Option<&MpConstraint> {
        self.mp_constraints.get(&tag)
    }

    pub fn mp_constraints(&self) -> impl Iterator<Item = &MpConstraint> {
        self.mp_constraints.values()
    }

    fn check_dofs(&self, node: i32, dofs: &[usize]) -> DomainResult<()> {
        let ndof = self
            .nodes
            .get(&node)
            .ok_or(DomainError::NodeNotFound(node))?
            .num_dof();
        if let Some(&dof) = dofs.iter().find(|&&d| d >= ndof) {
            return Err(DomainError::DofOutOfRange { node, dof, ndof });
        }
        Ok(())
    }

    // ---- loads ----

    pub fn add_load_pattern(&mut self, pattern: LoadPattern) -> DomainResult<()> {
        if self.patterns.contains_key(&pattern.tag) {
            return Err(DomainError::DuplicateTag {
                kind: "load pattern",
                tag: pattern.tag,
            });
        }
        for load in &pattern.loads {
            let ndof = self
                .nodes
                .get(&load.node)
                .ok_or(DomainError::NodeNotFound(load.node))?
                .num_dof();
            if load.values.len() != ndof {
                return Err(DomainError::DimensionMismatch {
                    expected: ndof,
                    found: load.values.len(),
                });
            }
        }
        self.patterns.insert(pattern.tag, pattern);
        Ok(())
    }

    pub fn remove_load_pattern(&mut self, tag: i32) -> DomainResult<LoadPattern> {
        self.patterns
            .remove(&tag)
            .ok_or(DomainError::PatternNotFound(tag))
    }

    pub fn load_patterns(&self) -> impl Iterator<Item = &LoadPattern> {
        self.patterns.values()
    }

    /// Zero nodal loads, then apply every pattern at time `t`
    pub fn apply_load(&mut self, t: f64) -> DomainResult<()> {
        for node in self.nodes.values_mut() {
            node.zero_unbalanced_load();
        }
        for pattern in self.patterns.values() {
            pattern.apply(t, &mut self.nodes)?;
        }
        self.current_time = t;
        Ok(())
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn committed_time(&self) -> f64 {
        self.committed_time
    }

    pub fn set_current_time(&mut self, t: f64) {
        self.current_time = t;
    }

    // ---- state ----

    /// Push trial nodal response into every element
    pub fn update(&mut self) -> DomainResult<()> {
        for element in self.elements.values_mut() {
            let nodes = collect_nodes(&self.nodes, element.node_tags())?;
            element.update(&nodes)?;
        }
        Ok(())
    }

    pub fn commit(&mut self) {
        for node in self.nodes.values_mut() {
            node.commit_state();
        }
        for element in self.elements.values_mut() {
            element.commit_state();
        }
        self.committed_time = self.current_time;
    }

    /// Discard trial state of nodes and elements
    pub fn revert_to_last_commit(&mut self) -> DomainResult<()> {
        for node in self.nodes.values_mut() {
            node.revert_to_last_commit();
        }
        for element in self.elements.values_mut() {
            element.revert_to_last_commit();
        }
        self.current_time = self.committed_time;
        self.update()
    }

    pub fn revert_to_start(&mut self) -> DomainResult<()> {
        for node in self.nodes.values_mut() {
            node.revert_to_start();
        }
        for element in self.elements.values_mut() {
            element.revert_to_start();
        }
        self.current_time = 0.0;
        self.committed_time = 0.0;
        self.update()
    }

    /// Opaque checkpoint of all nodal and element state
    pub fn snapshot(&self) -> DomainResult<Vec<u8>> {
        self.encode_state()
    }

    pub fn restore(&mut self, bytes: &[u8]) -> DomainResult<()> {
        self.decode_state(bytes)
    }
}

impl StateCodec for Domain {
    fn encode_state(&self) -> DomainResult<Vec<u8>> {
        let mut elements = BTreeMap::new();
        for (tag, element) in &self.elements {
            elements.insert(*tag, element.encode_state()?);
        }
        codec::encode(&DomainSnapshot {
            current_time: self.current_time,
            committed_time: self.committed_time,
            nodes: self.nodes.iter().map(|(t, n)| (*t, n.state())).collect(),
            elements,
        })
    }

    fn decode_state(&mut self, bytes: &[u8]) -> DomainResult<()> {
        let snapshot: DomainSnapshot = codec::decode(bytes)?;
        for (tag, state) in snapshot.nodes {
            self.nodes
                .get_mut(&tag)
                .ok_or(DomainError::NodeNotFound(tag))?
                .restore_state(state)?;
        }
        for (tag, state) in snapshot.elements {
            self.elements
                .get_mut(&tag)
                .ok_or(DomainError::ElementNotFound(tag))?
                .decode_state(&state)?;
        }
        self.current_time = snapshot.current_time;
        self.committed_time = snapshot.committed_time;
        Ok(())
    }
}

fn collect_nodes<'a>(nodes: &'a BTreeMap<i32, Node>, tags: &[i32]) -> DomainResult<Vec<&'a Node>> {
    tags.iter()
        .map(|tag| nodes.get(tag).ok_or(DomainError::NodeNotFound(*tag)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Truss;
    use crate::material::ElasticMaterial;

    fn two_node_domain() -> Domain {
        let mut domain = Domain::new();
        domain.add_node(Node::new(1, 2, &[0.0, 0.0])).unwrap();
        domain.add_node(Node::new(2, 2, &[1.0, 0.0])).unwrap();
        domain
            .add_element(Box::new(Truss::new(1, 1, 2, 1.0, Box::new(ElasticMaterial::new(1, 100.0)))))
            .unwrap();
        domain
    }

    #[test]
    fn topology_changes_bump_stamp() {
        let mut domain = two_node_domain();
        let stamp = domain.change_stamp();

        domain.add_sp_constraint(SpConstraint::fixed(1, 1, 0)).unwrap();
        assert!(domain.change_stamp() > stamp);

        let stamp = domain.change_stamp();
        domain
            .add_load_pattern(LoadPattern::new(1, crate::load::TimeSeries::linear()))
            .unwrap();
        assert_eq!(domain.change_stamp(), stamp);
    }

    #[test]
    fn invalid_references_rejected() {
        let mut domain = two_node_domain();
        assert!(matches!(
            domain.add_sp_constraint(SpConstraint::fixed(1, 9, 0)),
            Err(DomainError::NodeNotFound(9))
        ));
        assert!(matches!(
            domain.add_sp_constraint(SpConstraint::fixed(1, 1, 4)),
            Err(DomainError::DofOutOfRange { .. })
        ));
        assert!(matches!(
            domain.add_node(Node::new(1, 2, &[0.0, 0.0])),
            Err(DomainError::DuplicateTag { .. })
        ));
        assert!(domain.remove_node(1).is_err());
    }

    #[test]
    fn revert_restores_committed_response() {
        let mut domain = two_node_domain();
        domain
            .node_mut(2)
            .unwrap()
            .set_trial_disp_component(0, 0.01)
            .unwrap();
        domain.update().unwrap();
        domain.revert_to_last_commit().unwrap();
        assert_eq!(domain.node(2).unwrap().trial_disp()[0], 0.0);
    }

    #[test]
    fn snapshot_restores_state() {
        let mut domain = two_node_domain();
        domain
            .node_mut(2)
            .unwrap()
            .set_trial_disp_component(0, 0.02)
            .unwrap();
        domain.update().unwrap();
        domain.set_current_time(1.0);
        domain.commit();
        let bytes = domain.snapshot().unwrap();

        domain.revert_to_start().unwrap();
        assert_eq!(domain.node(2).unwrap().committed_disp()[0], 0.0);

        domain.restore(&bytes).unwrap();
        assert_eq!(domain.node(2).unwrap().committed_disp()[0], 0.02);
        assert_eq!(domain.committed_time(), 1.0);
    }
}
