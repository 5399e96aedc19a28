//! Constraint handlers: build the analysis model's DOF groups and FE
//! elements from a domain, deciding how SP and MP constraints are enforced.

use crate::error::{SolverError, SolverResult};
use crate::model::{
    AnalysisModel, ConstraintRef, FeElement, FeKind, ModelDof, Transformation,
};
use log::debug;
use nalgebra::DMatrix;
use nlfe_domain::{DofId, Domain, MpConstraint};
use std::collections::{BTreeMap, HashMap};

/// Strategy for turning a domain into DOF groups and FE elements
pub trait ConstraintHandler: std::fmt::Debug + Send {
    fn name(&self) -> &'static str;

    /// Clear `model` and rebuild it from `domain`
    fn handle(&self, domain: &mut Domain, model: &mut AnalysisModel) -> SolverResult<()>;
}

/// Groups and element FEs shared by every handler, after constraint checks
fn build_base(domain: &Domain, model: &mut AnalysisModel) -> SolverResult<()> {
    model.clear();
    check_constraints(domain)?;

    for node in domain.nodes() {
        model.add_node_group(node.tag(), node.num_dof());
    }
    for element in domain.elements() {
        let groups = element
            .node_tags()
            .iter()
            .map(|&tag| {
                model.node_group(tag).ok_or_else(|| {
                    SolverError::Numbering(format!(
                        "element {} refers to node {tag} without a DOF group",
                        element.tag()
                    ))
                })
            })
            .collect::<SolverResult<Vec<_>>>()?;
        model.add_fe_element(FeElement::new(FeKind::Element { tag: element.tag() }, groups));
    }
    Ok(())
}

/// Reject dangling references and DOFs targeted by more than one constraint
fn check_constraints(domain: &Domain) -> SolverResult<()> {
    let mut targets: HashMap<DofId, String> = HashMap::new();
    let mut claim = |id: DofId, owner: String| -> SolverResult<()> {
        if let Some(previous) = targets.insert(id, owner.clone()) {
            return Err(SolverError::ConstraintConflict {
                node: id.node,
                dof: id.dof,
                reason: format!("targeted by {previous} and {owner}"),
            });
        }
        Ok(())
    };

    for sp in domain.sp_constraints() {
        check_dof(domain, sp.node, sp.dof, "SP", sp.tag)?;
        claim(sp.dof_id(), format!("SP constraint {}", sp.tag))?;
    }
    for mp in domain.mp_constraints() {
        for &d in &mp.retained_dofs {
            check_dof(domain, mp.retained_node, d, "MP", mp.tag)?;
        }
        for id in mp.constrained_dof_ids() {
            check_dof(domain, id.node, id.dof, "MP", mp.tag)?;
            claim(id, format!("MP constraint {}", mp.tag))?;
        }
    }
    Ok(())
}

fn check_dof(domain: &Domain, node: i32, dof: usize, kind: &str, tag: i32) -> SolverResult<()> {
    let ndof = domain
        .node(node)
        .ok_or_else(|| {
            SolverError::Numbering(format!("{kind} constraint {tag} refers to missing node {node}"))
        })?
        .num_dof();
    if dof >= ndof {
        return Err(SolverError::Numbering(format!(
            "{kind} constraint {tag}: dof {dof} out of range for node {node} ({ndof} DOFs)"
        )));
    }
    Ok(())
}

fn node_group(model: &AnalysisModel, node: i32) -> SolverResult<usize> {
    model
        .node_group(node)
        .ok_or_else(|| SolverError::Numbering(format!("node {node} has no DOF group")))
}

/// Eliminate SP-constrained DOFs and impose their values on the nodes
fn eliminate_sp(domain: &mut Domain, model: &mut AnalysisModel) -> SolverResult<()> {
    let constraints: Vec<_> = domain.sp_constraints().cloned().collect();
    for sp in constraints {
        let g = node_group(model, sp.node)?;
        if let Some(group) = model.group_mut(g) {
            group.constrain(sp.dof);
        }
        model.add_prescribed(sp);
    }
    model.update_domain(domain)
}

/// SP constraints eliminate DOFs; MP constraints are not supported.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainHandler;

impl ConstraintHandler for PlainHandler {
    fn name(&self) -> &'static str {
        "Plain"
    }

    fn handle(&self, domain: &mut Domain, model: &mut AnalysisModel) -> SolverResult<()> {
        if let Some(mp) = domain.mp_constraints().next() {
            return Err(SolverError::InvalidInput(format!(
                "plain handler cannot enforce MP constraint {}",
                mp.tag
            )));
        }
        build_base(domain, model)?;
        eliminate_sp(domain, model)?;
        debug!(
            "plain handler: {} groups, {} FE elements",
            model.groups().len(),
            model.fe_elements().len()
        );
        Ok(())
    }
}

/// SP constraints eliminate DOFs; MP constraints become a transformation of
/// the constrained node onto the retained DOFs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformationHandler;

impl TransformationHandler {
    fn transformation(
        model: &AnalysisModel,
        ndof: usize,
        mps: &[&MpConstraint],
    ) -> SolverResult<(Transformation, Vec<usize>)> {
        let constrained: Vec<usize> = mps
            .iter()
            .flat_map(|mp| mp.constrained_dofs.iter().copied())
            .collect();

        let mut columns = Vec::new();
        let mut own_column = BTreeMap::new();
        for d in (0..ndof).filter(|d| !constrained.contains(d)) {
            own_column.insert(d, columns.len());
            columns.push(ModelDof::Own(d));
        }
        let mut retained_column = BTreeMap::new();
        for mp in mps {
            let group = node_group(model, mp.retained_node)?;
            for &dof in &mp.retained_dofs {
                retained_column.entry((group, dof)).or_insert_with(|| {
                    columns.push(ModelDof::Retained { group, dof });
                    columns.len() - 1
                });
            }
        }

        let mut matrix = DMatrix::zeros(ndof, columns.len());
        for (&d, &c) in &own_column {
            matrix[(d, c)] = 1.0;
        }
        for mp in mps {
            let group = node_group(model, mp.retained_node)?;
            for (i, &row) in mp.constrained_dofs.iter().enumerate() {
                for (j, &dof) in mp.retained_dofs.iter().enumerate() {
                    matrix[(row, retained_column[&(group, dof)])] += mp.coefficients[(i, j)];
                }
            }
        }
        Ok((Transformation { matrix, columns }, constrained))
    }
}

impl ConstraintHandler for TransformationHandler {
    fn name(&self) -> &'static str {
        "Transformation"
    }

    fn handle(&self, domain: &mut Domain, model: &mut AnalysisModel) -> SolverResult<()> {
        build_base(domain, model)?;

        let mut by_node: BTreeMap<i32, Vec<&MpConstraint>> = BTreeMap::new();
        for mp in domain.mp_constraints() {
            by_node.entry(mp.constrained_node).or_default().push(mp);
        }
        for mp in domain.mp_constraints() {
            if let Some(chained) = by_node.get(&mp.retained_node) {
                let hit = mp.retained_dofs.iter().find(|&&d| {
                    chained
                        .iter()
                        .any(|other| other.constrained_dofs.contains(&d))
                });
                if let Some(&dof) = hit {
                    return Err(SolverError::ConstraintConflict {
                        node: mp.retained_node,
                        dof,
                        reason: format!(
                            "retained DOF of MP constraint {} is itself MP-constrained",
                            mp.tag
                        ),
                    });
                }
            }
        }

        let mut transformed = Vec::new();
        for (node, mps) in &by_node {
            let g = node_group(model, *node)?;
            let ndof = domain
                .node(*node)
                .map(|n| n.num_dof())
                .ok_or_else(|| SolverError::Numbering(format!("missing node {node}")))?;
            let (transformation, constrained) = Self::transformation(model, ndof, mps)?;
            transformed.push((g, transformation, constrained));
        }
        let count = transformed.len();
        for (g, transformation, constrained) in transformed {
            if let Some(group) = model.group_mut(g) {
                for d in constrained {
                    group.constrain(d);
                }
                group.set_transformation(transformation);
            }
        }

        eliminate_sp(domain, model)?;
        debug!("transformation handler: {count} transformed groups");
        Ok(())
    }
}

/// SP and MP constraints enforced by penalty elements
#[derive(Debug, Clone, Copy)]
pub struct PenaltyHandler {
    pub alpha_sp: f64,
    pub alpha_mp: f64,
}

impl PenaltyHandler {
    pub fn new(alpha_sp: f64, alpha_mp: f64) -> Self {
        Self { alpha_sp, alpha_mp }
    }
}

impl Default for PenaltyHandler {
    fn default() -> Self {
        Self::new(1.0e12, 1.0e12)
    }
}

impl ConstraintHandler for PenaltyHandler {
    fn name(&self) -> &'static str {
        "Penalty"
    }

    fn handle(&self, domain: &mut Domain, model: &mut AnalysisModel) -> SolverResult<()> {
        build_base(domain, model)?;
        for sp in domain.sp_constraints() {
            let g = node_group(model, sp.node)?;
            model.add_fe_element(FeElement::new(
                FeKind::PenaltySp {
                    tag: sp.tag,
                    alpha: self.alpha_sp,
                },
                vec![g],
            ));
        }
        for mp in domain.mp_constraints() {
            let r = node_group(model, mp.retained_node)?;
            let c = node_group(model, mp.constrained_node)?;
            model.add_fe_element(FeElement::new(
                FeKind::PenaltyMp {
                    tag: mp.tag,
                    alpha: self.alpha_mp,
                },
                vec![r, c],
            ));
        }
        Ok(())
    }
}

/// SP and MP constraints enforced with Lagrange multipliers: one extra
/// equation per scalar condition.
#[derive(Debug, Clone, Copy)]
pub struct LagrangeHandler {
    pub alpha_sp: f64,
    pub alpha_mp: f64,
}

impl LagrangeHandler {
    pub fn new(alpha_sp: f64, alpha_mp: f64) -> Self {
        Self { alpha_sp, alpha_mp }
    }
}

impl Default for LagrangeHandler {
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}

impl ConstraintHandler for LagrangeHandler {
    fn name(&self) -> &'static str {
        "Lagrange"
    }

    fn handle(&self, domain: &mut Domain, model: &mut AnalysisModel) -> SolverResult<()> {
        build_base(domain, model)?;
        let mut added = 0;
        for sp in domain.sp_constraints() {
            let g = node_group(model, sp.node)?;
            let m = model.add_multiplier_group(ConstraintRef::Sp(sp.tag), 1);
            model.add_fe_element(FeElement::new(
                FeKind::LagrangeSp {
                    tag: sp.tag,
                    alpha: self.alpha_sp,
                },
                vec![g, m],
            ));
            added += 1;
        }
        for mp in domain.mp_constraints() {
            let r = node_group(model, mp.retained_node)?;
            let c = node_group(model, mp.constrained_node)?;
            let m = model.add_multiplier_group(ConstraintRef::Mp(mp.tag), mp.num_conditions());
            model.add_fe_element(FeElement::new(
                FeKind::LagrangeMp {
                    tag: mp.tag,
                    alpha: self.alpha_mp,
                },
                vec![r, c, m],
            ));
            added += mp.num_conditions();
        }
        debug!("lagrange handler: {added} multipliers");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nlfe_domain::{Node, SpConstraint};

    fn chain() -> Domain {
        let mut domain = Domain::new();
        for tag in 1..=3 {
            domain
                .add_node(Node::new(tag, 2, &[tag as f64, 0.0]))
                .unwrap();
        }
        domain
    }

    #[test]
    fn transformation_builds_equal_dof_map() {
        let mut domain = chain();
        domain
            .add_mp_constraint(MpConstraint::equal_dof(1, 1, 2, &[0]).unwrap())
            .unwrap();
        let mut model = AnalysisModel::new();
        TransformationHandler.handle(&mut domain, &mut model).unwrap();

        let group = model.group(model.node_group(2).unwrap()).unwrap();
        let t = group.transformation().unwrap();
        assert_eq!(t.columns, vec![ModelDof::Own(1), ModelDof::Retained { group: 0, dof: 0 }]);
        assert_eq!(t.matrix[(0, 1)], 1.0);
        assert_eq!(t.matrix[(1, 0)], 1.0);
        assert!(group.slot(0).unwrap().is_constrained());
    }

    #[test]
    fn chained_mp_is_a_conflict() {
        let mut domain = chain();
        domain
            .add_mp_constraint(MpConstraint::equal_dof(1, 1, 2, &[0]).unwrap())
            .unwrap();
        domain
            .add_mp_constraint(MpConstraint::equal_dof(2, 2, 3, &[0]).unwrap())
            .unwrap();
        let mut model = AnalysisModel::new();
        let err = TransformationHandler
            .handle(&mut domain, &mut model)
            .unwrap_err();
        assert!(matches!(err, SolverError::ConstraintConflict { node: 2, dof: 0, .. }));
    }

    #[test]
    fn plain_rejects_mp() {
        let mut domain = chain();
        domain
            .add_mp_constraint(MpConstraint::equal_dof(1, 1, 2, &[1]).unwrap())
            .unwrap();
        let mut model = AnalysisModel::new();
        assert!(matches!(
            PlainHandler.handle(&mut domain, &mut model),
            Err(SolverError::InvalidInput(_))
        ));
    }

    #[test]
    fn prescribed_value_is_imposed() {
        let mut domain = chain();
        domain
            .add_sp_constraint(SpConstraint::prescribed(1, 3, 1, 0.25))
            .unwrap();
        let mut model = AnalysisModel::new();
        PlainHandler.handle(&mut domain, &mut model).unwrap();
        assert_eq!(domain.node(3).unwrap().trial_disp()[1], 0.25);
    }

    #[test]
    fn lagrange_adds_multiplier_groups() {
        let mut domain = chain();
        domain.add_sp_constraint(SpConstraint::fixed(1, 1, 0)).unwrap();
        domain
            .add_mp_constraint(MpConstraint::equal_dof(2, 1, 2, &[0, 1]).unwrap())
            .unwrap();
        let mut model = AnalysisModel::new();
        LagrangeHandler::default()
            .handle(&mut domain, &mut model)
            .unwrap();
        let multipliers: usize = model
            .groups()
            .iter()
            .filter(|g| g.is_multiplier())
            .map(|g| g.num_dof())
            .sum();
        assert_eq!(multipliers, 3);
    }
}
