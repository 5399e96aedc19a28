//! DOF numberers: assign contiguous equation numbers to free DOFs.

use crate::error::{SolverError, SolverResult};
use crate::model::AnalysisModel;
use log::debug;
use nlfe_domain::Domain;
use std::collections::VecDeque;

pub trait DofNumberer: std::fmt::Debug + Send {
    fn name(&self) -> &'static str;

    /// Number every free DOF of `model` as `0..N`, refresh id maps, return N.
    fn number_dof(&self, model: &mut AnalysisModel, domain: &Domain) -> SolverResult<usize> {
        for node in domain.nodes() {
            if model.node_group(node.tag()).is_none() {
                return Err(SolverError::Numbering(format!(
                    "node {} has no DOF group",
                    node.tag()
                )));
            }
        }

        let order = self.group_order(model);
        model.reset_numbering();
        let mut next = 0;
        for g in order {
            if let Some(group) = model.group_mut(g) {
                next = group.number_free(next);
            }
        }
        model.finish_numbering(next)?;
        debug!("{} numberer: {next} equations", self.name());
        Ok(next)
    }

    /// Order in which DOF groups are numbered
    fn group_order(&self, model: &AnalysisModel) -> Vec<usize>;
}

/// Node groups in ascending node tag order, multiplier groups last
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainNumberer;

impl DofNumberer for PlainNumberer {
    fn name(&self) -> &'static str {
        "Plain"
    }

    fn group_order(&self, model: &AnalysisModel) -> Vec<usize> {
        let mut nodes: Vec<(i32, usize)> = model
            .groups()
            .iter()
            .filter_map(|g| g.node_tag().map(|t| (t, g.index())))
            .collect();
        nodes.sort_unstable();
        let multipliers = model
            .groups()
            .iter()
            .filter(|g| g.is_multiplier())
            .map(|g| g.index());
        nodes.into_iter().map(|(_, g)| g).chain(multipliers).collect()
    }
}

/// Reverse Cuthill-McKee ordering of the DOF-group graph
#[derive(Debug, Clone, Copy, Default)]
pub struct ReverseCuthillMcKee;

impl DofNumberer for ReverseCuthillMcKee {
    fn name(&self) -> &'static str {
        "RCM"
    }

    fn group_order(&self, model: &AnalysisModel) -> Vec<usize> {
        let graph = model.group_graph();
        let n = graph.len();
        let degree: Vec<usize> = graph.iter().map(Vec::len).collect();
        let mut visited = vec![false; n];
        let mut order = Vec::with_capacity(n);

        while order.len() < n {
            // each component starts at its minimum-degree vertex
            let Some(start) = (0..n)
                .filter(|&v| !visited[v])
                .min_by_key(|&v| (degree[v], v))
            else {
                break;
            };
            visited[start] = true;
            let mut queue = VecDeque::from([start]);
            while let Some(v) = queue.pop_front() {
                order.push(v);
                let mut next: Vec<usize> = graph[v].iter().copied().filter(|&w| !visited[w]).collect();
                next.sort_unstable_by_key(|&w| (degree[w], w));
                for w in next {
                    visited[w] = true;
                    queue.push_back(w);
                }
            }
        }
        order.reverse();
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FeElement, FeKind};

    /// Path 0-1-2-3 with the groups created in scrambled node order
    fn path_model() -> AnalysisModel {
        let mut model = AnalysisModel::new();
        for tag in [4, 1, 3, 2] {
            model.add_node_group(tag, 1);
        }
        let g = |m: &AnalysisModel, t| m.node_group(t).unwrap();
        for (a, b) in [(1, 2), (2, 3), (3, 4)] {
            let fe = FeElement::new(FeKind::Element { tag: a }, vec![g(&model, a), g(&model, b)]);
            model.add_fe_element(fe);
        }
        model
    }

    #[test]
    fn plain_orders_by_node_tag() {
        let model = path_model();
        let order = PlainNumberer.group_order(&model);
        let tags: Vec<i32> = order
            .iter()
            .map(|&g| model.group(g).unwrap().node_tag().unwrap())
            .collect();
        assert_eq!(tags, vec![1, 2, 3, 4]);
    }

    #[test]
    fn rcm_keeps_path_band_narrow() {
        let mut model = path_model();
        let domain = Domain::new();
        let n = ReverseCuthillMcKee.number_dof(&mut model, &domain).unwrap();
        assert_eq!(n, 4);
        assert_eq!(model.dof_graph().half_bandwidth(), 1);
    }
}
