//! Connection storage and queries
//!
//! Connections live in one partition per thread; the partition is chosen by
//! the thread that owns the target node. Query results list partitions in
//! thread order, each in creation order.

use crate::error::{NestError, Result};
use crate::models::{ParamScope, SynapseId, SynapseRegistry, VOLUME_TRANSMITTER, WEIGHT};
use ndarray::Array2;
use nestconn_core::{NodeCollection, NodeId, ThreadIndex, Time};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One created synapse
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub source: NodeId,
    pub target: NodeId,
    pub synapse_model: Arc<str>,
    pub synapse_id: SynapseId,
    /// Thread owning the target
    pub thread: ThreadIndex,
    pub receptor: usize,
    /// Weight at creation; homogeneous-weight models report the model
    /// default instead, see [`SynapseCollection::weights`]
    pub weight: f64,
    pub delay: Time,
    /// Per-connection state of plastic models
    pub state: HashMap<&'static str, f64>,
}

/// Position of a connection in the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId {
    pub thread: ThreadIndex,
    pub index: usize,
}

/// Resolved connections of one or more build calls, not yet visible
#[derive(Debug, Clone, Default)]
pub struct StagedConnections {
    pub(crate) partitions: Vec<Vec<Connection>>,
}

impl StagedConnections {
    pub fn new(threads: usize) -> Self {
        Self {
            partitions: vec![Vec::new(); threads.max(1)],
        }
    }

    pub fn len(&self) -> usize {
        self.partitions.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn append(&mut self, other: StagedConnections) {
        for (mine, theirs) in self.partitions.iter_mut().zip(other.partitions) {
            mine.extend(theirs);
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionTable {
    partitions: Vec<Vec<Connection>>,
    delay_extrema: Option<(Time, Time)>,
}

impl ConnectionTable {
    pub fn new(threads: usize) -> Self {
        Self {
            partitions: vec![Vec::new(); threads.max(1)],
            delay_extrema: None,
        }
    }

    pub fn threads(&self) -> usize {
        self.partitions.len()
    }

    pub fn len(&self) -> usize {
        self.partitions.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything and repartition for `threads`
    pub fn reset(&mut self, threads: usize) {
        *self = Self::new(threads);
    }

    /// Make staged connections visible
    pub fn commit(&mut self, staged: StagedConnections) -> usize {
        let added = staged.len();
        for (partition, conns) in self.partitions.iter_mut().zip(staged.partitions) {
            for conn in &conns {
                self.delay_extrema = Some(match self.delay_extrema {
                    Some((lo, hi)) => (lo.min(conn.delay), hi.max(conn.delay)),
                    None => (conn.delay, conn.delay),
                });
            }
            partition.extend(conns);
        }
        added
    }

    /// Smallest and largest delay of any stored connection
    pub fn delay_extrema(&self) -> Option<(Time, Time)> {
        self.delay_extrema
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.partitions.get(id.thread)?.get(id.index)
    }

    pub(crate) fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.partitions.get_mut(id.thread)?.get_mut(id.index)
    }

    pub(crate) fn note_delay(&mut self, delay: Time) {
        self.delay_extrema = self
            .delay_extrema
            .map(|(lo, hi)| (lo.min(delay), hi.max(delay)))
            .or(Some((delay, delay)));
    }

    /// All connections in query order
    pub fn iter(&self) -> impl Iterator<Item = (ConnectionId, &Connection)> {
        self.partitions.iter().enumerate().flat_map(|(thread, part)| {
            part.iter()
                .enumerate()
                .map(move |(index, conn)| (ConnectionId { thread, index }, conn))
        })
    }

    pub fn select(&self, filter: &ConnectionFilter) -> Vec<ConnectionId> {
        let matcher = filter.matcher();
        self.iter()
            .filter(|(_, conn)| matcher.matches(conn))
            .map(|(id, _)| id)
            .collect()
    }
}

// ============================================================================
// FILTERS
// ============================================================================

/// Connection query; empty fields match everything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionFilter {
    #[serde(default)]
    pub source: Option<NodeCollection>,
    #[serde(default)]
    pub target: Option<NodeCollection>,
    #[serde(default)]
    pub synapse_model: Option<String>,
}

impl ConnectionFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn source(mut self, nodes: &NodeCollection) -> Self {
        self.source = Some(nodes.clone());
        self
    }

    pub fn target(mut self, nodes: &NodeCollection) -> Self {
        self.target = Some(nodes.clone());
        self
    }

    pub fn synapse_model(mut self, model: impl Into<String>) -> Self {
        self.synapse_model = Some(model.into());
        self
    }

    fn matcher(&self) -> Matcher<'_> {
        let set = |nodes: &Option<NodeCollection>| {
            nodes
                .as_ref()
                .map(|n| n.iter().copied().collect::<HashSet<NodeId>>())
        };
        Matcher {
            sources: set(&self.source),
            targets: set(&self.target),
            model: self.synapse_model.as_deref(),
        }
    }
}

struct Matcher<'a> {
    sources: Option<HashSet<NodeId>>,
    targets: Option<HashSet<NodeId>>,
    model: Option<&'a str>,
}

impl Matcher<'_> {
    fn matches(&self, conn: &Connection) -> bool {
        self.sources.as_ref().map_or(true, |s| s.contains(&conn.source))
            && self.targets.as_ref().map_or(true, |t| t.contains(&conn.target))
            && self.model.map_or(true, |m| &*conn.synapse_model == m)
    }
}

// ============================================================================
// SYNAPSE COLLECTION
// ============================================================================

/// Fields every connection reports
const RECORD_FIELDS: [&str; 8] = [
    "source",
    "target",
    "weight",
    "delay",
    "receptor",
    "receptor_type",
    "target_thread",
    "thread",
];

/// Read-only view of the connections matched by a filter
#[derive(Debug, Clone)]
pub struct SynapseCollection<'a> {
    table: &'a ConnectionTable,
    registry: &'a SynapseRegistry,
    ids: Vec<ConnectionId>,
}

impl<'a> SynapseCollection<'a> {
    pub(crate) fn new(
        table: &'a ConnectionTable,
        registry: &'a SynapseRegistry,
        ids: Vec<ConnectionId>,
    ) -> Self {
        Self {
            table,
            registry,
            ids,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[ConnectionId] {
        &self.ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Connection> + '_ {
        let table = self.table;
        self.ids.iter().filter_map(move |&id| table.get(id))
    }

    pub fn sources(&self) -> Vec<NodeId> {
        self.iter().map(|c| c.source).collect()
    }

    pub fn targets(&self) -> Vec<NodeId> {
        self.iter().map(|c| c.target).collect()
    }

    /// Weights in query order; models with a common weight report the model value
    pub fn weights(&self) -> Vec<f64> {
        self.iter().map(|c| self.weight_of(c)).collect()
    }

    pub fn delays(&self) -> Vec<Time> {
        self.iter().map(|c| c.delay).collect()
    }

    pub fn receptors(&self) -> Vec<usize> {
        self.iter().map(|c| c.receptor).collect()
    }

    pub fn synapse_models(&self) -> Vec<&'a str> {
        self.iter().map(|c| &*c.synapse_model).collect()
    }

    pub fn threads(&self) -> Vec<ThreadIndex> {
        self.iter().map(|c| c.thread).collect()
    }

    fn weight_of(&self, conn: &Connection) -> f64 {
        self.registry
            .by_id(conn.synapse_id)
            .and_then(|schema| schema.param(WEIGHT))
            .filter(|def| def.scope == ParamScope::Common)
            .map_or(conn.weight, |def| def.default)
    }

    /// Value of `name` on one connection; common parameters come from the model
    fn field(&self, conn: &Connection, name: &str) -> Option<f64> {
        let value = match name {
            "source" => conn.source as f64,
            "target" => conn.target as f64,
            "weight" => self.weight_of(conn),
            "delay" => conn.delay,
            "receptor" | "receptor_type" => conn.receptor as f64,
            "target_thread" | "thread" => conn.thread as f64,
            _ => {
                if let Some(v) = conn.state.get(name) {
                    return Some(*v);
                }
                let schema = self.registry.by_id(conn.synapse_id)?;
                if name == VOLUME_TRANSMITTER {
                    return schema.volume_transmitter.map(|vt| vt as f64);
                }
                let def = schema.param(name)?;
                (def.scope == ParamScope::Common).then_some(def.default)?
            }
        };
        Some(value)
    }

    /// Value of parameter `name` for every connection
    ///
    /// Fails if any matched connection's model lacks the parameter.
    pub fn get(&self, name: &str) -> Result<Vec<f64>> {
        if self.is_empty() && !RECORD_FIELDS.contains(&name) {
            return Err(NestError::unknown_parameter("<no connections>", name));
        }
        self.iter()
            .map(|conn| {
                self.field(conn, name)
                    .ok_or_else(|| NestError::unknown_parameter(&*conn.synapse_model, name))
            })
            .collect()
    }

    /// Full status record per connection
    pub fn get_status(&self) -> Vec<Value> {
        self.iter().map(|conn| self.status_of(conn)).collect()
    }

    fn status_of(&self, conn: &Connection) -> Value {
        let mut record = Map::new();
        record.insert("source".into(), json!(conn.source));
        record.insert("target".into(), json!(conn.target));
        record.insert("synapse_model".into(), json!(&*conn.synapse_model));
        record.insert("weight".into(), json!(self.weight_of(conn)));
        record.insert("delay".into(), json!(conn.delay));
        record.insert("receptor".into(), json!(conn.receptor));
        record.insert("target_thread".into(), json!(conn.thread));
        if let Some(schema) = self.registry.by_id(conn.synapse_id) {
            for def in schema.params.iter().filter(|d| d.scope == ParamScope::Common) {
                record.insert(def.name.into(), json!(def.default));
            }
            if let Some(vt) = schema.volume_transmitter {
                record.insert(VOLUME_TRANSMITTER.into(), json!(vt));
            }
        }
        for (name, value) in &conn.state {
            record.insert((*name).into(), json!(value));
        }
        Value::Object(record)
    }

    /// Connection counts, rows indexed by `sources` and columns by `targets`
    pub fn connectivity_matrix(
        &self,
        sources: &NodeCollection,
        targets: &NodeCollection,
    ) -> Array2<f64> {
        let position = |nodes: &NodeCollection| {
            nodes
                .iter()
                .enumerate()
                .map(|(i, &id)| (id, i))
                .collect::<HashMap<NodeId, usize>>()
        };
        let rows = position(sources);
        let cols = position(targets);
        let mut m = Array2::zeros((sources.len(), targets.len()));
        for conn in self.iter() {
            if let (Some(&i), Some(&j)) = (rows.get(&conn.source), cols.get(&conn.target)) {
                m[[i, j]] += 1.0;
            }
        }
        m
    }
}
