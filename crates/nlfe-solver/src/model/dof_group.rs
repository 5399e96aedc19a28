//! DOF groups: the equation-numbering ledger of one node or one multiplier set.

use nalgebra::{DMatrix, DVector};

/// State of one DOF of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DofSlot {
    /// Unknown, not yet numbered
    Free,
    /// Eliminated by a constraint; never receives an equation
    Constrained,
    /// Numbered unknown
    Eqn(usize),
}

impl DofSlot {
    pub fn eqn(self) -> Option<usize> {
        match self {
            DofSlot::Eqn(n) => Some(n),
            _ => None,
        }
    }

    pub fn is_constrained(self) -> bool {
        self == DofSlot::Constrained
    }
}

/// Constraint a multiplier group enforces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintRef {
    Sp(i32),
    Mp(i32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroupKind {
    Node {
        tag: i32,
    },
    Multiplier {
        constraint: ConstraintRef,
        trial: DVector<f64>,
        committed: DVector<f64>,
    },
}

/// Model DOF a transformation column stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelDof {
    /// A DOF of the group's own node
    Own(usize),
    /// A DOF of another group's node
    Retained { group: usize, dof: usize },
}

/// Node DOFs expressed through model DOFs: `u_node = matrix · u_model`
#[derive(Debug, Clone, PartialEq)]
pub struct Transformation {
    pub matrix: DMatrix<f64>,
    pub columns: Vec<ModelDof>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DofGroup {
    index: usize,
    kind: GroupKind,
    slots: Vec<DofSlot>,
    transformation: Option<Transformation>,
    ids: Vec<Option<usize>>,
}

impl DofGroup {
    pub fn for_node(index: usize, tag: i32, ndof: usize) -> Self {
        Self {
            index,
            kind: GroupKind::Node { tag },
            slots: vec![DofSlot::Free; ndof],
            transformation: None,
            ids: vec![None; ndof],
        }
    }

    pub fn for_multiplier(index: usize, constraint: ConstraintRef, n: usize) -> Self {
        Self {
            index,
            kind: GroupKind::Multiplier {
                constraint,
                trial: DVector::zeros(n),
                committed: DVector::zeros(n),
            },
            slots: vec![DofSlot::Free; n],
            transformation: None,
            ids: vec![None; n],
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn kind(&self) -> &GroupKind {
        &self.kind
    }

    pub fn node_tag(&self) -> Option<i32> {
        match self.kind {
            GroupKind::Node { tag } => Some(tag),
            GroupKind::Multiplier { .. } => None,
        }
    }

    pub fn is_multiplier(&self) -> bool {
        matches!(self.kind, GroupKind::Multiplier { .. })
    }

    /// Number of own DOFs (node DOFs or multipliers)
    pub fn num_dof(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[DofSlot] {
        &self.slots
    }

    pub fn slot(&self, dof: usize) -> Option<DofSlot> {
        self.slots.get(dof).copied()
    }

    pub fn constrain(&mut self, dof: usize) {
        if let Some(slot) = self.slots.get_mut(dof) {
            *slot = DofSlot::Constrained;
        }
    }

    /// Forget previous equation numbers; constrained slots stay constrained
    pub fn reset_numbering(&mut self) {
        for slot in &mut self.slots {
            if let DofSlot::Eqn(_) = slot {
                *slot = DofSlot::Free;
            }
        }
        self.ids.iter_mut().for_each(|id| *id = None);
    }

    /// Number every free slot starting at `next`; returns the next free number
    pub fn number_free(&mut self, mut next: usize) -> usize {
        for slot in &mut self.slots {
            if *slot == DofSlot::Free {
                *slot = DofSlot::Eqn(next);
                next += 1;
            }
        }
        next
    }

    pub fn has_unnumbered(&self) -> bool {
        self.slots.contains(&DofSlot::Free)
    }

    pub fn transformation(&self) -> Option<&Transformation> {
        self.transformation.as_ref()
    }

    pub fn set_transformation(&mut self, transformation: Transformation) {
        self.ids = vec![None; transformation.columns.len()];
        self.transformation = Some(transformation);
    }

    /// Equation ids of the model DOFs (columns of the transformation, or
    /// own DOFs when there is none)
    pub fn ids(&self) -> &[Option<usize>] {
        &self.ids
    }

    pub fn num_model_dof(&self) -> usize {
        self.ids.len()
    }

    pub(crate) fn set_ids(&mut self, ids: Vec<Option<usize>>) {
        self.ids = ids;
    }

    pub fn multipliers(&self) -> Option<&DVector<f64>> {
        match &self.kind {
            GroupKind::Multiplier { trial, .. } => Some(trial),
            GroupKind::Node { .. } => None,
        }
    }

    pub(crate) fn multipliers_mut(&mut self) -> Option<&mut DVector<f64>> {
        match &mut self.kind {
            GroupKind::Multiplier { trial, .. } => Some(trial),
            GroupKind::Node { .. } => None,
        }
    }

    pub fn committed_multipliers(&self) -> Option<&DVector<f64>> {
        match &self.kind {
            GroupKind::Multiplier { committed, .. } => Some(committed),
            GroupKind::Node { .. } => None,
        }
    }

    pub fn commit(&mut self) {
        if let GroupKind::Multiplier {
            trial, committed, ..
        } = &mut self.kind
        {
            committed.copy_from(trial);
        }
    }

    pub fn revert(&mut self) {
        if let GroupKind::Multiplier {
            trial, committed, ..
        } = &mut self.kind
        {
            trial.copy_from(committed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbering_skips_constrained_slots() {
        let mut group = DofGroup::for_node(0, 1, 3);
        group.constrain(1);
        let next = group.number_free(4);

        assert_eq!(next, 6);
        assert_eq!(
            group.slots(),
            &[DofSlot::Eqn(4), DofSlot::Constrained, DofSlot::Eqn(5)]
        );

        group.reset_numbering();
        assert!(group.has_unnumbered());
        assert!(group.slot(1).is_some_and(DofSlot::is_constrained));
    }

    #[test]
    fn multiplier_commit_and_revert() {
        let mut group = DofGroup::for_multiplier(3, ConstraintRef::Sp(1), 1);
        if let Some(l) = group.multipliers_mut() {
            l[0] = 2.5;
        }
        group.commit();
        if let Some(l) = group.multipliers_mut() {
            l[0] = 9.0;
        }
        group.revert();
        assert_eq!(group.multipliers().map(|l| l[0]), Some(2.5));
        assert_eq!(group.node_tag(), None);
    }
}
