//! Connectivity graphs derived from a numbered analysis model.

use std::collections::BTreeSet;

/// Who owns an equation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqnOwner {
    Node(i32),
    /// Lagrange multiplier of DOF group `index`
    Multiplier(usize),
}

/// Equation adjacency: `i` and `j` are adjacent when some FE element couples
/// them. Every equation is adjacent to itself.
#[derive(Debug, Clone, PartialEq)]
pub struct DofGraph {
    adjacency: Vec<Vec<usize>>,
    owners: Vec<EqnOwner>,
}

impl DofGraph {
    pub(crate) fn from_sets(sets: Vec<BTreeSet<usize>>, owners: Vec<EqnOwner>) -> Self {
        let adjacency = sets
            .into_iter()
            .enumerate()
            .map(|(i, mut set)| {
                set.insert(i);
                set.into_iter().collect()
            })
            .collect();
        Self { adjacency, owners }
    }

    pub fn num_eqn(&self) -> usize {
        self.adjacency.len()
    }

    /// Sorted neighbours of `eqn`, itself included
    pub fn neighbours(&self, eqn: usize) -> &[usize] {
        &self.adjacency[eqn]
    }

    pub fn owner(&self, eqn: usize) -> EqnOwner {
        self.owners[eqn]
    }

    /// max |i − j| over all couplings
    pub fn half_bandwidth(&self) -> usize {
        self.adjacency
            .iter()
            .enumerate()
            .flat_map(|(i, row)| row.iter().map(move |&j| i.abs_diff(j)))
            .max()
            .unwrap_or(0)
    }

    pub fn num_nonzeros(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum()
    }

    /// Row offsets and column indices of the full (unsymmetric) pattern
    pub fn csr_pattern(&self) -> (Vec<usize>, Vec<usize>) {
        let mut offsets = Vec::with_capacity(self.num_eqn() + 1);
        let mut columns = Vec::with_capacity(self.num_nonzeros());
        offsets.push(0);
        for row in &self.adjacency {
            columns.extend_from_slice(row);
            offsets.push(columns.len());
        }
        (offsets, columns)
    }
}

#[cfg(test)]
impl DofGraph {
    /// Fully coupled graph with every equation owned by node 1
    pub(crate) fn dense(n: usize) -> Self {
        let all: BTreeSet<usize> = (0..n).collect();
        Self::from_sets(vec![all; n], vec![EqnOwner::Node(1); n])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_graph_properties() {
        let sets = vec![
            BTreeSet::from([1]),
            BTreeSet::from([0, 2]),
            BTreeSet::from([1]),
        ];
        let owners = vec![EqnOwner::Node(1), EqnOwner::Node(2), EqnOwner::Node(3)];
        let graph = DofGraph::from_sets(sets, owners);

        assert_eq!(graph.half_bandwidth(), 1);
        assert_eq!(graph.neighbours(1), &[0, 1, 2]);
        let (offsets, columns) = graph.csr_pattern();
        assert_eq!(offsets, vec![0, 2, 5, 7]);
        assert_eq!(columns.len(), graph.num_nonzeros());
    }
}
