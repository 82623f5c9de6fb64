//! Connectivity rules
//!
//! A rule turns a source and a target collection into an ordered sequence of
//! `(source, target)` pairs. Deterministic rules are enumerated lazily;
//! random rules draw from a single generator handed in by the caller, so the
//! sequence depends only on that generator's seed.

use crate::error::{NestError, Result};
use nestconn_core::{NodeCollection, NodeId};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub type Pair = (NodeId, NodeId);

/// Connection rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ConnectivityRule {
    AllToAll,
    OneToOne,
    /// Each target receives exactly `indegree` connections
    FixedIndegree { indegree: usize },
    /// Each source sends exactly `outdegree` connections
    FixedOutdegree { outdegree: usize },
    FixedTotalNumber { n: usize },
    PairwiseBernoulli { p: f64 },
    /// Bernoulli trial per unordered pair, created in both directions
    SymmetricPairwiseBernoulli { p: f64 },
}

impl ConnectivityRule {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AllToAll => "all_to_all",
            Self::OneToOne => "one_to_one",
            Self::FixedIndegree { .. } => "fixed_indegree",
            Self::FixedOutdegree { .. } => "fixed_outdegree",
            Self::FixedTotalNumber { .. } => "fixed_total_number",
            Self::PairwiseBernoulli { .. } => "pairwise_bernoulli",
            Self::SymmetricPairwiseBernoulli { .. } => "symmetric_pairwise_bernoulli",
        }
    }

    pub fn is_random(&self) -> bool {
        !matches!(self, Self::AllToAll | Self::OneToOne)
    }
}

fn yes() -> bool {
    true
}

/// Rule plus the flags that filter the pairs it produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnSpec {
    #[serde(flatten)]
    pub rule: ConnectivityRule,
    #[serde(default = "yes")]
    pub allow_autapses: bool,
    #[serde(default = "yes")]
    pub allow_multapses: bool,
    #[serde(default)]
    pub make_symmetric: bool,
}

impl Default for ConnSpec {
    fn default() -> Self {
        Self::new(ConnectivityRule::AllToAll)
    }
}

impl From<ConnectivityRule> for ConnSpec {
    fn from(rule: ConnectivityRule) -> Self {
        Self::new(rule)
    }
}

impl ConnSpec {
    pub fn new(rule: ConnectivityRule) -> Self {
        Self {
            rule,
            allow_autapses: true,
            allow_multapses: true,
            make_symmetric: false,
        }
    }

    pub fn autapses(mut self, allow: bool) -> Self {
        self.allow_autapses = allow;
        self
    }

    pub fn multapses(mut self, allow: bool) -> Self {
        self.allow_multapses = allow;
        self
    }

    pub fn symmetric(mut self, on: bool) -> Self {
        self.make_symmetric = on;
        self
    }

    /// Check the rule against the collections before any pair is made
    pub fn validate(&self, sources: &NodeCollection, targets: &NodeCollection) -> Result<()> {
        let rule = self.rule.name();
        for (role, nodes) in [("source", sources), ("target", targets)] {
            if let Some(id) = nodes.first_duplicate() {
                return Err(NestError::InvalidParameter(format!(
                    "{rule}: {role} collection lists node {id} more than once"
                )));
            }
        }
        match self.rule {
            ConnectivityRule::OneToOne if sources.len() != targets.len() => {
                return Err(NestError::SizeMismatch(format!(
                    "one_to_one needs equal sizes, got {} sources and {} targets",
                    sources.len(),
                    targets.len()
                )))
            }
            ConnectivityRule::PairwiseBernoulli { p }
            | ConnectivityRule::SymmetricPairwiseBernoulli { p }
                if !(0.0..=1.0).contains(&p) =>
            {
                return Err(NestError::InvalidRule(format!(
                    "{rule}: p must be in [0, 1], got {p}"
                )))
            }
            ConnectivityRule::SymmetricPairwiseBernoulli { .. } => {
                if sources != targets {
                    return Err(NestError::InvalidRule(
                        "symmetric_pairwise_bernoulli needs identical source and target collections"
                            .into(),
                    ));
                }
                if !self.make_symmetric || self.allow_autapses || !self.allow_multapses {
                    return Err(NestError::InvalidRule(
                        "symmetric_pairwise_bernoulli requires make_symmetric, no autapses and allowed multapses"
                            .into(),
                    ));
                }
            }
            _ => {}
        }
        if self.make_symmetric
            && !matches!(
                self.rule,
                ConnectivityRule::OneToOne
                    | ConnectivityRule::AllToAll
                    | ConnectivityRule::SymmetricPairwiseBernoulli { .. }
            )
        {
            return Err(NestError::InvalidRule(format!(
                "make_symmetric is not supported by {rule}"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// PAIR ENUMERATION
// ============================================================================

/// Ordered pair sequence of one rule application
pub struct Pairs<'a> {
    inner: Box<dyn Iterator<Item = Pair> + 'a>,
}

impl Iterator for Pairs<'_> {
    type Item = Pair;

    fn next(&mut self) -> Option<Pair> {
        self.inner.next()
    }
}

/// Enumerate the pairs of `spec` applied to `sources` x `targets`
///
/// Fails before producing anything when the rule cannot be satisfied.
pub fn enumerate<'a>(
    sources: &'a NodeCollection,
    targets: &'a NodeCollection,
    spec: &ConnSpec,
    mut rng: StdRng,
) -> Result<Pairs<'a>> {
    spec.validate(sources, targets)?;
    let autapses = spec.allow_autapses;
    let multapses = spec.allow_multapses;

    let pairs: Box<dyn Iterator<Item = Pair> + 'a> = match spec.rule {
        ConnectivityRule::AllToAll => Box::new(
            sources
                .iter()
                .flat_map(move |&s| targets.iter().map(move |&t| (s, t))),
        ),
        ConnectivityRule::OneToOne => Box::new(
            sources
                .iter()
                .copied()
                .zip(targets.iter().copied()),
        ),
        ConnectivityRule::FixedIndegree { indegree } => Box::new(
            fixed_degree(targets, sources, indegree, autapses, multapses, &mut rng)?
                .into_iter()
                .map(|(t, s)| (s, t)),
        ),
        ConnectivityRule::FixedOutdegree { outdegree } => Box::new(
            fixed_degree(sources, targets, outdegree, autapses, multapses, &mut rng)?.into_iter(),
        ),
        ConnectivityRule::FixedTotalNumber { n } => Box::new(
            fixed_total(sources, targets, n, autapses, multapses, &mut rng)?.into_iter(),
        ),
        ConnectivityRule::PairwiseBernoulli { p } => Box::new(
            sources
                .iter()
                .flat_map(move |&s| targets.iter().map(move |&t| (s, t)))
                .filter(move |&(s, t)| autapses || s != t)
                .filter(move |_| rng.gen_bool(p)),
        ),
        ConnectivityRule::SymmetricPairwiseBernoulli { p } => {
            let ids = &sources.ids;
            Box::new(
                (0..ids.len())
                    .flat_map(move |i| (i + 1..ids.len()).map(move |j| (ids[i], ids[j])))
                    .filter(move |_| rng.gen_bool(p))
                    .flat_map(|(a, b)| [(a, b), (b, a)]),
            )
        }
    };

    let pairs: Box<dyn Iterator<Item = Pair> + 'a> = match spec.rule {
        ConnectivityRule::AllToAll | ConnectivityRule::OneToOne if spec.make_symmetric => {
            Box::new(pairs.flat_map(|(s, t)| {
                let reverse = (s != t).then_some((t, s));
                std::iter::once((s, t)).chain(reverse)
            }))
        }
        _ => pairs,
    };

    let pairs: Box<dyn Iterator<Item = Pair> + 'a> = if autapses {
        pairs
    } else {
        Box::new(pairs.filter(|&(s, t)| s != t))
    };

    let inner: Box<dyn Iterator<Item = Pair> + 'a> = if multapses {
        pairs
    } else {
        let mut seen = HashSet::new();
        Box::new(pairs.filter(move |pair| seen.insert(*pair)))
    };

    Ok(Pairs { inner })
}

/// For every `anchor`, pick `k` partners from `pool`; yields `(anchor, partner)`
fn fixed_degree(
    anchors: &NodeCollection,
    pool: &NodeCollection,
    k: usize,
    autapses: bool,
    multapses: bool,
    rng: &mut StdRng,
) -> Result<Vec<Pair>> {
    let mut out = Vec::with_capacity(anchors.len() * k);
    if k == 0 {
        return Ok(out);
    }
    for &anchor in anchors {
        let candidates: Vec<NodeId> = pool
            .iter()
            .copied()
            .filter(|&p| autapses || p != anchor)
            .collect();
        if candidates.is_empty() || (!multapses && k > candidates.len()) {
            return Err(NestError::SizeMismatch(format!(
                "cannot draw {k} partners for node {anchor} from {} candidates{}",
                candidates.len(),
                if multapses { "" } else { " without multapses" }
            )));
        }
        if multapses {
            for _ in 0..k {
                out.push((anchor, candidates[rng.gen_range(0..candidates.len())]));
            }
        } else {
            for i in index::sample(rng, candidates.len(), k).into_iter() {
                out.push((anchor, candidates[i]));
            }
        }
    }
    Ok(out)
}

fn fixed_total(
    sources: &NodeCollection,
    targets: &NodeCollection,
    n: usize,
    autapses: bool,
    multapses: bool,
    rng: &mut StdRng,
) -> Result<Vec<Pair>> {
    let mut out = Vec::with_capacity(n);
    if n == 0 {
        return Ok(out);
    }
    let target_set: HashSet<NodeId> = targets.iter().copied().collect();
    let shared = if autapses {
        0
    } else {
        sources.iter().filter(|s| target_set.contains(s)).count()
    };
    let available = sources.len() * targets.len() - shared;
    if available == 0 || (!multapses && n > available) {
        return Err(NestError::SizeMismatch(format!(
            "cannot draw {n} connections from {available} admissible pairs"
        )));
    }

    let mut seen = HashSet::new();
    while out.len() < n {
        let s = sources.ids[rng.gen_range(0..sources.len())];
        let t = targets.ids[rng.gen_range(0..targets.len())];
        if !autapses && s == t {
            continue;
        }
        if !multapses && !seen.insert((s, t)) {
            continue;
        }
        out.push((s, t));
    }
    Ok(out)
}
