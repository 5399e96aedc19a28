//! FE elements: the per-element (or per-constraint) contribution to the
//! global system, mapped to equation ids through DOF groups.
//!
//! Contributions are first formed in *node space* (the concatenated DOFs of
//! the element's groups) and then mapped to *model space* with the groups'
//! transformations, `K_model = Tᵀ K T` and `R_model = Tᵀ R`.

use super::dof_group::DofGroup;
use crate::error::{SolverError, SolverResult};
use nalgebra::{DMatrix, DVector};
use nlfe_domain::{Domain, DomainError, Element, Node};
use serde::{Deserialize, Serialize};

/// What an FE element wraps
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeKind {
    Element { tag: i32 },
    PenaltySp { tag: i32, alpha: f64 },
    PenaltyMp { tag: i32, alpha: f64 },
    LagrangeSp { tag: i32, alpha: f64 },
    LagrangeMp { tag: i32, alpha: f64 },
}

/// Coefficients of the effective tangent
/// `c_K·K_T + c_K0·K_0 + c_C·C + c_M·M`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TangentFactors {
    pub stiffness: f64,
    pub initial_stiffness: f64,
    pub damping: f64,
    pub mass: f64,
}

impl TangentFactors {
    pub fn stiffness_only() -> Self {
        Self {
            stiffness: 1.0,
            ..Self::default()
        }
    }

    pub fn initial_only() -> Self {
        Self {
            initial_stiffness: 1.0,
            ..Self::default()
        }
    }

    /// Move the current-stiffness coefficient onto the initial stiffness
    pub fn to_initial(self) -> Self {
        Self {
            stiffness: 0.0,
            initial_stiffness: self.initial_stiffness + self.stiffness,
            ..self
        }
    }
}

/// Rayleigh damping `C = α_M·M + β_K·K_T + β_K0·K_0`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RayleighDamping {
    pub alpha_m: f64,
    pub beta_k: f64,
    pub beta_k_init: f64,
}

impl RayleighDamping {
    pub fn new(alpha_m: f64, beta_k: f64, beta_k_init: f64) -> Self {
        Self {
            alpha_m,
            beta_k,
            beta_k_init,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.alpha_m == 0.0 && self.beta_k == 0.0 && self.beta_k_init == 0.0
    }
}

/// Which forces enter the residual
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResidualKind {
    /// −F_int
    Static,
    /// −(F_int + C·v + M·a)
    Dynamic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeElement {
    kind: FeKind,
    groups: Vec<usize>,
    ids: Vec<Option<usize>>,
}

impl FeElement {
    pub fn new(kind: FeKind, groups: Vec<usize>) -> Self {
        Self {
            kind,
            groups,
            ids: Vec::new(),
        }
    }

    pub fn kind(&self) -> FeKind {
        self.kind
    }

    /// Indices of the DOF groups, in node-space order
    pub fn groups(&self) -> &[usize] {
        &self.groups
    }

    pub fn ids(&self) -> &[Option<usize>] {
        &self.ids
    }

    /// Gather equation ids from the DOF groups
    pub fn set_ids(&mut self, groups: &[DofGroup]) -> SolverResult<()> {
        let mut ids = Vec::new();
        for &g in &self.groups {
            let group = groups.get(g).ok_or_else(|| {
                SolverError::Numbering(format!("{:?} refers to missing DOF group {g}", self.kind))
            })?;
            ids.extend_from_slice(group.ids());
        }
        self.ids = ids;
        Ok(())
    }

    /// Effective tangent contribution in model space
    pub fn tangent(
        &self,
        domain: &Domain,
        groups: &[DofGroup],
        factors: &TangentFactors,
        rayleigh: &RayleighDamping,
    ) -> SolverResult<DMatrix<f64>> {
        let k = match self.kind {
            FeKind::Element { tag } => {
                let element = find_element(domain, tag)?;
                element_tangent(element, factors, rayleigh)
            }
            FeKind::PenaltySp { tag, alpha } => {
                let g = sp_rows(domain, groups, &self.groups, tag)?.0;
                (factors.stiffness + factors.initial_stiffness) * alpha * g.transpose() * &g
            }
            FeKind::PenaltyMp { tag, alpha } => {
                let g = mp_rows(domain, groups, &self.groups, tag)?;
                (factors.stiffness + factors.initial_stiffness) * alpha * g.transpose() * &g
            }
            FeKind::LagrangeSp { tag, alpha } => {
                let g = sp_rows(domain, groups, &self.groups, tag)?.0;
                (factors.stiffness + factors.initial_stiffness) * saddle(&g, alpha)
            }
            FeKind::LagrangeMp { tag, alpha } => {
                let g = mp_rows(domain, groups, &self.groups, tag)?;
                (factors.stiffness + factors.initial_stiffness) * saddle(&g, alpha)
            }
        };
        Ok(match self.transformation(groups) {
            Some(t) => t.transpose() * k * t,
            None => k,
        })
    }

    /// Residual (unbalance) contribution in model space
    pub fn residual(
        &self,
        domain: &Domain,
        groups: &[DofGroup],
        kind: ResidualKind,
        rayleigh: &RayleighDamping,
    ) -> SolverResult<DVector<f64>> {
        let r = match self.kind {
            FeKind::Element { tag } => {
                let element = find_element(domain, tag)?;
                let mut force = element.resisting_force();
                if kind == ResidualKind::Dynamic {
                    let nodes = domain.element_nodes(element)?;
                    let vel = concat(nodes.iter().map(|n| n.trial_vel()));
                    let accel = concat(nodes.iter().map(|n| n.trial_accel()));
                    force += element.mass() * accel;
                    if !rayleigh.is_zero() {
                        force += rayleigh_matrix(element, rayleigh) * vel;
                    }
                }
                -force
            }
            FeKind::PenaltySp { tag, alpha } => {
                let (g, value, u) = sp_rows(domain, groups, &self.groups, tag)?;
                let gap = value - (&g * &u)[0];
                g.transpose() * DVector::from_element(1, alpha * gap)
            }
            FeKind::PenaltyMp { tag, alpha } => {
                let g = mp_rows(domain, groups, &self.groups, tag)?;
                let u = node_space_disp(domain, groups, &self.groups[..2])?;
                -(alpha * g.transpose() * (&g * u))
            }
            FeKind::LagrangeSp { tag, alpha } => {
                let (g, value, u) = sp_rows(domain, groups, &self.groups, tag)?;
                let lambda = multipliers(groups, &self.groups, 1)?;
                let n = g.ncols();
                let mut r = DVector::zeros(n + 1);
                r.rows_mut(0, n).copy_from(&(-alpha * g.transpose() * lambda));
                r[n] = alpha * (value - (&g * &u)[0]);
                r
            }
            FeKind::LagrangeMp { tag, alpha } => {
                let g = mp_rows(domain, groups, &self.groups, tag)?;
                let u = node_space_disp(domain, groups, &self.groups[..2])?;
                let lambda = multipliers(groups, &self.groups, 2)?;
                let n = g.ncols();
                let m = g.nrows();
                let mut r = DVector::zeros(n + m);
                r.rows_mut(0, n).copy_from(&(-alpha * g.transpose() * lambda));
                r.rows_mut(n, m).copy_from(&(-alpha * (&g * u)));
                r
            }
        };
        Ok(match self.transformation(groups) {
            Some(t) => t.transpose() * r,
            None => r,
        })
    }

    /// Block-diagonal node→model map, if any group carries a transformation
    fn transformation(&self, groups: &[DofGroup]) -> Option<DMatrix<f64>> {
        let members: Vec<&DofGroup> = self.groups.iter().filter_map(|&g| groups.get(g)).collect();
        if members.iter().all(|g| g.transformation().is_none()) {
            return None;
        }
        let rows: usize = members.iter().map(|g| g.num_dof()).sum();
        let cols: usize = members.iter().map(|g| g.num_model_dof()).sum();
        let mut t = DMatrix::zeros(rows, cols);
        let (mut r0, mut c0) = (0, 0);
        for group in members {
            let (nr, nc) = (group.num_dof(), group.num_model_dof());
            match group.transformation() {
                Some(tr) => t.view_mut((r0, c0), (nr, nc)).copy_from(&tr.matrix),
                None => t.view_mut((r0, c0), (nr, nc)).fill_with_identity(),
            }
            r0 += nr;
            c0 += nc;
        }
        Some(t)
    }
}

fn find_element(domain: &Domain, tag: i32) -> SolverResult<&dyn Element> {
    Ok(domain
        .element(tag)
        .ok_or(DomainError::ElementNotFound(tag))?)
}

fn element_tangent(
    element: &dyn Element,
    factors: &TangentFactors,
    rayleigh: &RayleighDamping,
) -> DMatrix<f64> {
    let n = element.num_dof();
    let mut k = DMatrix::zeros(n, n);
    if factors.stiffness != 0.0 {
        k += factors.stiffness * element.tangent_stiff();
    }
    if factors.initial_stiffness != 0.0 {
        k += factors.initial_stiffness * element.initial_stiff();
    }
    if factors.damping != 0.0 {
        k += factors.damping * (element.damp() + rayleigh_matrix(element, rayleigh));
    }
    if factors.mass != 0.0 {
        k += factors.mass * element.mass();
    }
    k
}

fn rayleigh_matrix(element: &dyn Element, rayleigh: &RayleighDamping) -> DMatrix<f64> {
    let n = element.num_dof();
    let mut c = DMatrix::zeros(n, n);
    if rayleigh.alpha_m != 0.0 {
        c += rayleigh.alpha_m * element.mass();
    }
    if rayleigh.beta_k != 0.0 {
        c += rayleigh.beta_k * element.tangent_stiff();
    }
    if rayleigh.beta_k_init != 0.0 {
        c += rayleigh.beta_k_init * element.initial_stiff();
    }
    c
}

/// `[0 αGᵀ; αG 0]`
fn saddle(g: &DMatrix<f64>, alpha: f64) -> DMatrix<f64> {
    let (m, n) = g.shape();
    let mut k = DMatrix::zeros(n + m, n + m);
    k.view_mut((0, n), (n, m)).copy_from(&(alpha * g.transpose()));
    k.view_mut((n, 0), (m, n)).copy_from(&(alpha * g));
    k
}

fn concat<'a>(parts: impl Iterator<Item = &'a DVector<f64>>) -> DVector<f64> {
    let values: Vec<f64> = parts.flat_map(|v| v.iter().copied()).collect();
    DVector::from_vec(values)
}

fn node_of<'a>(domain: &'a Domain, groups: &[DofGroup], g: usize) -> SolverResult<&'a Node> {
    let tag = groups
        .get(g)
        .and_then(DofGroup::node_tag)
        .ok_or_else(|| SolverError::Numbering(format!("DOF group {g} is not a node group")))?;
    Ok(domain.node(tag).ok_or(DomainError::NodeNotFound(tag))?)
}

fn node_space_disp(
    domain: &Domain,
    groups: &[DofGroup],
    members: &[usize],
) -> SolverResult<DVector<f64>> {
    let mut parts = Vec::with_capacity(members.len());
    for &g in members {
        parts.push(node_of(domain, groups, g)?.trial_disp());
    }
    Ok(concat(parts.into_iter()))
}

fn multipliers(
    groups: &[DofGroup],
    members: &[usize],
    position: usize,
) -> SolverResult<DVector<f64>> {
    members
        .get(position)
        .and_then(|&g| groups.get(g))
        .and_then(DofGroup::multipliers)
        .cloned()
        .ok_or_else(|| SolverError::Numbering("constraint FE without multiplier group".to_string()))
}

/// Selection row of an SP constraint over its node's DOFs, with the
/// prescribed value and the node's trial displacement
fn sp_rows(
    domain: &Domain,
    groups: &[DofGroup],
    members: &[usize],
    tag: i32,
) -> SolverResult<(DMatrix<f64>, f64, DVector<f64>)> {
    let sp = domain
        .sp_constraint(tag)
        .ok_or(DomainError::ConstraintNotFound(tag))?;
    let node = node_of(domain, groups, members[0])?;
    let mut g = DMatrix::zeros(1, node.num_dof());
    g[(0, sp.dof)] = 1.0;
    Ok((g, sp.value, node.trial_disp().clone()))
}

/// Rows `[−C I]` of an MP constraint spread over the full DOF lists of the
/// retained and constrained nodes
fn mp_rows(
    domain: &Domain,
    groups: &[DofGroup],
    members: &[usize],
    tag: i32,
) -> SolverResult<DMatrix<f64>> {
    let mp = domain
        .mp_constraint(tag)
        .ok_or(DomainError::ConstraintNotFound(tag))?;
    let nr = node_of(domain, groups, members[0])?.num_dof();
    let nc = node_of(domain, groups, members[1])?.num_dof();
    let mut g = DMatrix::zeros(mp.num_conditions(), nr + nc);
    for (i, &c) in mp.constrained_dofs.iter().enumerate() {
        for (j, &r) in mp.retained_dofs.iter().enumerate() {
            g[(i, r)] = -mp.coefficients[(i, j)];
        }
        g[(i, nr + c)] = 1.0;
    }
    Ok(g)
}
