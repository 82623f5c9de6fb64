//! # NestConn Core
//!
//! Shared leaf types for building synaptic connections between populations
//! of model neurons.
//!
//! ## Contents
//!
//! | Type | Role |
//! |------|------|
//! | `NodeId`, `NodeCollection` | Node identifiers and ordered populations |
//! | `ParamValue` | Scalar, per-connection array or distributed parameter |
//! | `Distribution`, `Sampler` | Declared distributions and compiled samplers |
//! | `SeedStream` | Per-key deterministic random streams |
//!
//! ## Reproducibility
//!
//! Random draws never come from a shared mutable generator. Every consumer
//! derives its own generator from the base seed and a key (call number,
//! pair index, ...), so the sequence of values does not depend on how the
//! work is split across threads.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution as _, Exp, Gamma, LogNormal, Normal, Uniform};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use xxhash_rust::xxh64::xxh64;
use thiserror::Error;

/// Common errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    #[error("Invalid distribution: {0}")]
    InvalidDistribution(String),

    #[error("Index {index} out of range for array of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Simulation time (ms)
pub type Time = f64;

/// Global node identifier (NEST node ids start at 1)
pub type NodeId = usize;

/// Index of a worker thread
pub type ThreadIndex = usize;

// ============================================================================
// NODE COLLECTIONS
// ============================================================================

/// Ordered collection of node ids (like NEST's NodeCollection)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeCollection {
    pub ids: Vec<NodeId>,
}

impl NodeCollection {
    pub fn new(ids: Vec<NodeId>) -> Self {
        Self { ids }
    }

    /// Contiguous block `first..first + n`
    pub fn range(first: NodeId, n: usize) -> Self {
        Self::new((first..first + n).collect())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn first(&self) -> Option<NodeId> {
        self.ids.first().copied()
    }

    pub fn last(&self) -> Option<NodeId> {
        self.ids.last().copied()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.ids.contains(&id)
    }

    /// First id that occurs more than once
    pub fn first_duplicate(&self) -> Option<NodeId> {
        let mut seen = HashSet::with_capacity(self.ids.len());
        self.ids.iter().copied().find(|&id| !seen.insert(id))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NodeId> {
        self.ids.iter()
    }

    /// Sub-collection `start..end`, `None` if the range is out of bounds
    pub fn slice(&self, start: usize, end: usize) -> Option<Self> {
        self.ids.get(start..end).map(|ids| Self::new(ids.to_vec()))
    }
}

impl IntoIterator for NodeCollection {
    type Item = NodeId;
    type IntoIter = std::vec::IntoIter<NodeId>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.into_iter()
    }
}

impl<'a> IntoIterator for &'a NodeCollection {
    type Item = &'a NodeId;
    type IntoIter = std::slice::Iter<'a, NodeId>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.iter()
    }
}

impl FromIterator<NodeId> for NodeCollection {
    fn from_iter<I: IntoIterator<Item = NodeId>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

// ============================================================================
// DISTRIBUTIONS
// ============================================================================

/// Declared parameter distribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "distribution", rename_all = "snake_case")]
pub enum Distribution {
    Uniform { min: f64, max: f64 },
    Normal { mean: f64, std: f64 },
    Lognormal { mu: f64, sigma: f64 },
    /// Exponential with scale `beta` (mean = beta)
    Exponential { beta: f64 },
    Gamma { kappa: f64, theta: f64 },
}

impl Distribution {
    /// Check parameters and build a sampler
    pub fn sampler(&self) -> Result<Sampler> {
        let bad = |msg: String| CoreError::InvalidDistribution(msg);
        match *self {
            Self::Uniform { min, max } => {
                if !(min.is_finite() && max.is_finite()) || min >= max {
                    return Err(bad(format!("uniform requires finite min < max, got [{min}, {max})")));
                }
                Ok(Sampler::Uniform(Uniform::new(min, max)))
            }
            Self::Normal { mean, std } => Normal::new(mean, std)
                .map(Sampler::Normal)
                .map_err(|e| bad(format!("normal(mean={mean}, std={std}): {e}"))),
            Self::Lognormal { mu, sigma } => LogNormal::new(mu, sigma)
                .map(Sampler::Lognormal)
                .map_err(|e| bad(format!("lognormal(mu={mu}, sigma={sigma}): {e}"))),
            Self::Exponential { beta } => {
                if !(beta > 0.0 && beta.is_finite()) {
                    return Err(bad(format!("exponential requires beta > 0, got {beta}")));
                }
                Exp::new(1.0 / beta)
                    .map(Sampler::Exponential)
                    .map_err(|e| bad(format!("exponential(beta={beta}): {e}")))
            }
            Self::Gamma { kappa, theta } => Gamma::new(kappa, theta)
                .map(Sampler::Gamma)
                .map_err(|e| bad(format!("gamma(kappa={kappa}, theta={theta}): {e}"))),
        }
    }

    /// Expected value of the distribution
    pub fn mean(&self) -> f64 {
        match *self {
            Self::Uniform { min, max } => 0.5 * (min + max),
            Self::Normal { mean, .. } => mean,
            Self::Lognormal { mu, sigma } => (mu + 0.5 * sigma * sigma).exp(),
            Self::Exponential { beta } => beta,
            Self::Gamma { kappa, theta } => kappa * theta,
        }
    }
}

/// Validated, ready-to-draw form of a `Distribution`
#[derive(Debug, Clone)]
pub enum Sampler {
    Uniform(Uniform<f64>),
    Normal(Normal<f64>),
    Lognormal(LogNormal<f64>),
    Exponential(Exp<f64>),
    Gamma(Gamma<f64>),
}

impl Sampler {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            Self::Uniform(d) => d.sample(rng),
            Self::Normal(d) => d.sample(rng),
            Self::Lognormal(d) => d.sample(rng),
            Self::Exponential(d) => d.sample(rng),
            Self::Gamma(d) => d.sample(rng),
        }
    }
}

// ============================================================================
// PARAMETER VALUES
// ============================================================================

/// Declared value of a synapse parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Same value for every connection
    Scalar(f64),
    /// One entry per created connection, in creation order
    Array(Vec<f64>),
    /// One draw per connection
    Distribution(Distribution),
}

impl ParamValue {
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    pub fn array_len(&self) -> Option<usize> {
        match self {
            Self::Array(values) => Some(values.len()),
            _ => None,
        }
    }

    /// Scalar value, if this is a scalar
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    /// Element `index` of an array value
    pub fn array_at(&self, index: usize) -> Result<Option<f64>> {
        match self {
            Self::Array(values) => values
                .get(index)
                .copied()
                .map(Some)
                .ok_or(CoreError::IndexOutOfRange { index, len: values.len() }),
            _ => Ok(None),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Scalar(v)
    }
}

impl From<Vec<f64>> for ParamValue {
    fn from(values: Vec<f64>) -> Self {
        Self::Array(values)
    }
}

impl From<Distribution> for ParamValue {
    fn from(dist: Distribution) -> Self {
        Self::Distribution(dist)
    }
}

// ============================================================================
// SEED STREAMS
// ============================================================================

/// Deterministic source of independent generators
///
/// `rng_for(key)` always returns a generator in the same state for the same
/// base seed and key, regardless of which thread asks or in which order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedStream {
    seed: u64,
}

impl SeedStream {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Seed derived from the base seed and `key`
    pub fn derive<K: Hash>(&self, key: &K) -> u64 {
        calculate_hash(&(self.seed, key))
    }

    pub fn rng_for<K: Hash>(&self, key: &K) -> StdRng {
        StdRng::seed_from_u64(self.derive(key))
    }
}

/// Collects a key's bytes in little-endian order for xxh64
///
/// Integers are widened, so keys hash the same on every platform and
/// toolchain.
#[derive(Default)]
struct KeyBytes(Vec<u8>);

impl Hasher for KeyBytes {
    fn finish(&self) -> u64 {
        xxh64(&self.0, 0)
    }

    fn write(&mut self, bytes: &[u8]) {
        self.0.extend_from_slice(bytes);
    }

    fn write_u8(&mut self, i: u8) {
        self.0.push(i);
    }

    fn write_u16(&mut self, i: u16) {
        self.write_u64(i.into());
    }

    fn write_u32(&mut self, i: u32) {
        self.write_u64(i.into());
    }

    fn write_u64(&mut self, i: u64) {
        self.0.extend_from_slice(&i.to_le_bytes());
    }

    fn write_usize(&mut self, i: usize) {
        self.write_u64(i as u64);
    }

    fn write_i32(&mut self, i: i32) {
        self.write_i64(i.into());
    }

    fn write_i64(&mut self, i: i64) {
        self.write_u64(i as u64);
    }

    fn write_isize(&mut self, i: isize) {
        self.write_u64(i as i64 as u64);
    }
}

fn calculate_hash<T: Hash>(t: &T) -> u64 {
    let mut s = KeyBytes::default();
    t.hash(&mut s);
    s.finish()
}
