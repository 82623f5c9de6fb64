//! Deferred connection requests
//!
//! A [`Projection`] records one `connect` call. Projections are checked when
//! they are added and built together by `build_network`.

use crate::rules::{ConnSpec, ConnectivityRule};
use crate::spec::SynapseSpec;
use nestconn_core::NodeCollection;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub source: NodeCollection,
    pub target: NodeCollection,
    pub conn_spec: ConnSpec,
    /// One connection per spec per pair, in this order
    pub syn_specs: Vec<SynapseSpec>,
}

impl Projection {
    pub fn new(source: &NodeCollection, target: &NodeCollection, conn_spec: impl Into<ConnSpec>) -> Self {
        Self {
            source: source.clone(),
            target: target.clone(),
            conn_spec: conn_spec.into(),
            syn_specs: vec![SynapseSpec::default()],
        }
    }

    pub fn all_to_all(source: &NodeCollection, target: &NodeCollection) -> Self {
        Self::new(source, target, ConnectivityRule::AllToAll)
    }

    pub fn one_to_one(source: &NodeCollection, target: &NodeCollection) -> Self {
        Self::new(source, target, ConnectivityRule::OneToOne)
    }

    pub fn fixed_indegree(source: &NodeCollection, target: &NodeCollection, indegree: usize) -> Self {
        Self::new(source, target, ConnectivityRule::FixedIndegree { indegree })
    }

    pub fn fixed_outdegree(source: &NodeCollection, target: &NodeCollection, outdegree: usize) -> Self {
        Self::new(source, target, ConnectivityRule::FixedOutdegree { outdegree })
    }

    pub fn fixed_total_number(source: &NodeCollection, target: &NodeCollection, n: usize) -> Self {
        Self::new(source, target, ConnectivityRule::FixedTotalNumber { n })
    }

    pub fn pairwise_bernoulli(source: &NodeCollection, target: &NodeCollection, p: f64) -> Self {
        Self::new(source, target, ConnectivityRule::PairwiseBernoulli { p })
    }

    /// Symmetric Bernoulli within one population; sets the flags the rule needs
    pub fn symmetric_pairwise_bernoulli(nodes: &NodeCollection, p: f64) -> Self {
        let spec = ConnSpec::new(ConnectivityRule::SymmetricPairwiseBernoulli { p })
            .autapses(false)
            .multapses(true)
            .symmetric(true);
        Self::new(nodes, nodes, spec)
    }

    pub fn synapse(mut self, spec: SynapseSpec) -> Self {
        self.syn_specs = vec![spec];
        self
    }

    pub fn collocated(mut self, specs: Vec<SynapseSpec>) -> Self {
        self.syn_specs = specs;
        self
    }

    pub fn allow_autapses(mut self, allow: bool) -> Self {
        self.conn_spec.allow_autapses = allow;
        self
    }

    pub fn allow_multapses(mut self, allow: bool) -> Self {
        self.conn_spec.allow_multapses = allow;
        self
    }

    pub fn make_symmetric(mut self, on: bool) -> Self {
        self.conn_spec.make_symmetric = on;
        self
    }
}

/// Projections waiting for `build_network`
#[derive(Debug, Clone, Default)]
pub struct ProjectionCollection {
    pending: Vec<Projection>,
}

impl ProjectionCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, projection: Projection) {
        self.pending.push(projection);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Projection> {
        self.pending.iter()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let n = NodeCollection::range(1, 3);
        let p = Projection::one_to_one(&n, &n);
        assert_eq!(p.syn_specs, vec![SynapseSpec::default()]);
        assert!(p.conn_spec.allow_autapses);
        assert!(p.conn_spec.allow_multapses);
    }

    #[test]
    fn test_symmetric_bernoulli_flags() {
        let n = NodeCollection::range(1, 3);
        let p = Projection::symmetric_pairwise_bernoulli(&n, 0.2);
        assert!(p.conn_spec.make_symmetric);
        assert!(!p.conn_spec.allow_autapses);
        assert!(p.conn_spec.validate(&p.source, &p.target).is_ok());
    }

    #[test]
    fn test_collection() {
        let n = NodeCollection::range(1, 2);
        let mut pending = ProjectionCollection::new();
        pending.push(Projection::all_to_all(&n, &n).allow_autapses(false));
        pending.push(Projection::fixed_indegree(&n, &n, 1));
        assert_eq!(pending.len(), 2);
        assert!(!pending.iter().next().unwrap().conn_spec.allow_autapses);
        pending.clear();
        assert!(pending.is_empty());
    }
}
