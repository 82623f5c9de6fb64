//! Simulation context
//!
//! Owns the nodes, the synapse registry, the connection table and the
//! pending projections of one network. Contexts are independent; there is no
//! global kernel.

use crate::builder::ConnectionBuilder;
use crate::config::KernelConfig;
use crate::error::{NestError, Result};
use crate::models::{ParamDef, ParamScope, SynapseId, SynapseRegistry, DELAY, VOLUME_TRANSMITTER, WEIGHT};
use crate::nodes::{Node, NodeModel, NodeStore};
use crate::params::{snap_delay, ValueSource};
use crate::projection::{Projection, ProjectionCollection};
use crate::rules::ConnSpec;
use crate::spec::SynapseSpec;
use crate::table::{ConnectionFilter, ConnectionTable, StagedConnections, SynapseCollection};
use nestconn_core::{NodeCollection, NodeId, ParamValue, SeedStream, Time};
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

/// Snapshot of kernel state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KernelStatus {
    pub threads: usize,
    pub rng_seed: u64,
    pub resolution: Time,
    pub node_count: usize,
    pub connection_count: usize,
    pub min_delay: Option<Time>,
    pub max_delay: Option<Time>,
    pub pending_projections: usize,
}

pub struct SimulationContext {
    config: KernelConfig,
    nodes: NodeStore,
    registry: SynapseRegistry,
    table: ConnectionTable,
    projections: ProjectionCollection,
    pool: ThreadPool,
    /// Key of the next random stream; one per build or status update
    calls: u64,
}

fn thread_pool(threads: usize) -> Result<ThreadPool> {
    ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("nestconn-{i}"))
        .build()
        .map_err(|e| NestError::Config(format!("cannot start {threads} worker threads: {e}")))
}

impl SimulationContext {
    pub fn new(config: KernelConfig) -> Result<Self> {
        config.validate()?;
        log::info!(
            "kernel: {} threads, seed {}, resolution {} ms",
            config.threads,
            config.rng_seed,
            config.resolution
        );
        Ok(Self {
            pool: thread_pool(config.threads)?,
            table: ConnectionTable::new(config.threads),
            nodes: NodeStore::new(),
            registry: SynapseRegistry::builtin(),
            projections: ProjectionCollection::new(),
            calls: 0,
            config,
        })
    }

    pub fn with_threads(threads: usize) -> Result<Self> {
        Self::new(KernelConfig {
            threads,
            ..KernelConfig::default()
        })
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn threads(&self) -> usize {
        self.config.threads
    }

    pub fn registry(&self) -> &SynapseRegistry {
        &self.registry
    }

    /// Back to the state of a fresh context with the same configuration
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.registry = SynapseRegistry::builtin();
        self.table.reset(self.config.threads);
        self.projections.clear();
        self.calls = 0;
        log::info!("kernel reset");
    }

    /// Change the thread count; only allowed before any node exists
    pub fn set_thread_count(&mut self, threads: usize) -> Result<()> {
        if !self.nodes.is_empty() {
            return Err(NestError::Config(
                "thread count can only change before nodes are created".into(),
            ));
        }
        let config = KernelConfig {
            threads,
            ..self.config.clone()
        };
        config.validate()?;
        self.pool = thread_pool(threads)?;
        self.table.reset(threads);
        self.config = config;
        log::info!("thread count set to {threads}");
        Ok(())
    }

    pub fn set_rng_seed(&mut self, seed: u64) {
        self.config.rng_seed = seed;
    }

    pub fn set_resolution(&mut self, resolution: Time) -> Result<()> {
        if !self.table.is_empty() {
            return Err(NestError::Config(
                "resolution can only change before connections are created".into(),
            ));
        }
        let config = KernelConfig {
            resolution,
            ..self.config.clone()
        };
        config.validate()?;
        self.config = config;
        Ok(())
    }

    // ========================================================================
    // NODES
    // ========================================================================

    pub fn create(&mut self, model: NodeModel, n: usize) -> Result<NodeCollection> {
        if n == 0 {
            return Err(NestError::InvalidParameter("cannot create 0 nodes".into()));
        }
        let nodes = self.nodes.create(&model, n, self.config.threads);
        log::debug!("created {n} x {} starting at {:?}", model.name(), nodes.first());
        Ok(nodes)
    }

    /// Create the auxiliary node used by neuromodulated synapses
    pub fn create_volume_transmitter(&mut self) -> Result<NodeId> {
        let nodes = self.create(NodeModel::VolumeTransmitter, 1)?;
        nodes
            .first()
            .ok_or_else(|| NestError::InvalidParameter("volume transmitter not created".into()))
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.require(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // ========================================================================
    // SYNAPSE MODELS
    // ========================================================================

    pub fn copy_model(&mut self, existing: &str, new_name: &str, params: &[(&str, f64)]) -> Result<()> {
        let overrides: BTreeMap<String, f64> =
            params.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        self.registry.copy_model(existing, new_name, &overrides)?;
        Ok(())
    }

    /// Change a model default; `vt` must name an existing volume transmitter
    pub fn set_model_default(&mut self, model: &str, param: &str, value: f64) -> Result<()> {
        if param != VOLUME_TRANSMITTER || !self.registry.requires_aux(model)? {
            return self.registry.set_default(model, param, value);
        }
        if value < 1.0 || value.fract() != 0.0 {
            return Err(NestError::InvalidParameter(format!(
                "{model}.vt must be a node id, got {value}"
            )));
        }
        let id = value as NodeId;
        let node = self.nodes.get(id).ok_or_else(|| {
            NestError::missing_dependency(model, format!("volume transmitter {id} does not exist"))
        })?;
        if !node.model.is_volume_transmitter() {
            return Err(NestError::missing_dependency(
                model,
                format!("node {id} is a {}, not a volume_transmitter", node.model.name()),
            ));
        }
        self.registry.set_volume_transmitter(model, id)
    }

    pub fn model_defaults(&self, model: &str) -> Result<BTreeMap<String, ParamValue>> {
        self.registry.defaults(model)
    }

    // ========================================================================
    // CONNECTIONS
    // ========================================================================

    fn builder(&self) -> ConnectionBuilder<'_> {
        ConnectionBuilder {
            nodes: &self.nodes,
            registry: &self.registry,
            pool: &self.pool,
            threads: self.config.threads,
            seeds: SeedStream::new(self.config.rng_seed),
            resolution: self.config.resolution,
        }
    }

    fn next_call(&mut self) -> u64 {
        let call = self.calls;
        self.calls += 1;
        call
    }

    /// Create connections now; returns the number created
    ///
    /// Either every connection of the call is created or none is.
    pub fn build(
        &mut self,
        sources: &NodeCollection,
        targets: &NodeCollection,
        conn_spec: &ConnSpec,
        syn_spec: &SynapseSpec,
    ) -> Result<usize> {
        self.build_collocated(sources, targets, conn_spec, std::slice::from_ref(syn_spec))
    }

    /// One connection per spec per pair, in spec order
    pub fn build_collocated(
        &mut self,
        sources: &NodeCollection,
        targets: &NodeCollection,
        conn_spec: &ConnSpec,
        syn_specs: &[SynapseSpec],
    ) -> Result<usize> {
        let call = self.next_call();
        let staged = self
            .builder()
            .stage(call, sources, targets, conn_spec, syn_specs)
            .map_err(|e| {
                log::warn!("build call {call} ({}) rejected: {e}", conn_spec.rule.name());
                e
            })?;
        Ok(self.table.commit(staged))
    }

    /// Check a projection that is about to be built
    fn check_projection(&self, projection: &Projection) -> Result<()> {
        self.nodes.check_all(&projection.source)?;
        self.nodes.check_all(&projection.target)?;
        projection
            .conn_spec
            .validate(&projection.source, &projection.target)?;
        if projection.syn_specs.is_empty() {
            return Err(NestError::InvalidParameter(
                "projection has no synapse spec".into(),
            ));
        }
        projection.syn_specs.iter().try_for_each(|spec| {
            if self.registry.lookup(&spec.synapse_model)?.missing_aux() {
                return Err(NestError::missing_dependency(
                    &spec.synapse_model,
                    "no volume transmitter set",
                ));
            }
            spec.validate(&self.registry)
        })
    }

    /// Queue a projection for `build_network`
    pub fn connect(&mut self, projection: Projection) -> Result<()> {
        self.check_projection(&projection)?;
        self.projections.push(projection);
        Ok(())
    }

    pub fn connect_immediately(&mut self, projection: Projection) -> Result<usize> {
        self.build_collocated(
            &projection.source,
            &projection.target,
            &projection.conn_spec,
            &projection.syn_specs,
        )
    }

    pub fn pending_projections(&self) -> &ProjectionCollection {
        &self.projections
    }

    /// Build every pending projection as one batch
    ///
    /// On failure nothing is created and the projections stay pending.
    pub fn build_network(&mut self) -> Result<usize> {
        let mut batch = StagedConnections::new(self.config.threads);
        let first_call = self.calls;
        for (i, projection) in self.projections.iter().enumerate() {
            let staged = self
                .builder()
                .stage(
                    first_call + i as u64,
                    &projection.source,
                    &projection.target,
                    &projection.conn_spec,
                    &projection.syn_specs,
                )
                .map_err(|e| {
                    log::warn!(
                        "build_network: projection {i} of {} rejected, nothing built: {e}",
                        self.projections.len()
                    );
                    e
                })?;
            batch.append(staged);
        }
        self.calls += self.projections.len() as u64;
        let created = self.table.commit(batch);
        log::info!(
            "built {} projections, {created} connections",
            self.projections.len()
        );
        self.projections.clear();
        Ok(created)
    }

    pub fn reset_projections(&mut self) {
        self.projections.clear();
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// Connections matching `filter`; pending projections are not included
    pub fn get_connections(&self, filter: &ConnectionFilter) -> SynapseCollection<'_> {
        SynapseCollection::new(&self.table, &self.registry, self.table.select(filter))
    }

    pub fn connection_count(&self) -> usize {
        self.table.len()
    }

    /// Set `name` on every connection matching `filter`
    ///
    /// Arrays are indexed in query order. All values are checked before any
    /// connection changes.
    pub fn set_connection_status(
        &mut self,
        filter: &ConnectionFilter,
        name: &str,
        value: impl Into<ParamValue>,
    ) -> Result<usize> {
        let value = value.into();
        let ids = self.table.select(filter);
        if let Some(len) = value.array_len() {
            if len != ids.len() {
                return Err(NestError::LengthMismatch {
                    param: name.to_string(),
                    expected: ids.len(),
                    actual: len,
                });
            }
        }

        let call = self.next_call();
        let seeds = SeedStream::new(self.config.rng_seed);
        let mut updates = Vec::with_capacity(ids.len());
        let mut compiled: HashMap<SynapseId, (ParamDef, ValueSource)> = HashMap::new();
        for (k, &id) in ids.iter().enumerate() {
            let conn = self
                .table
                .get(id)
                .ok_or_else(|| NestError::InvalidParameter(format!("stale connection {id:?}")))?;
            let schema = self
                .registry
                .by_id(conn.synapse_id)
                .ok_or_else(|| NestError::UnknownModel(conn.synapse_model.to_string()))?;
            let model = schema.name.as_str();
            let def = match schema.param(name) {
                Some(def) if def.scope == ParamScope::Common => {
                    return Err(NestError::immutable(
                        model,
                        name,
                        "common property, use set_model_default",
                    ))
                }
                Some(def) if def.name != WEIGHT && def.name != DELAY && !conn.state.contains_key(def.name) => {
                    return Err(NestError::immutable(model, name, "fixed at creation"))
                }
                Some(def) => *def,
                None => {
                    return Err(match name {
                        "source" | "target" | "synapse_model" | "receptor" | "target_thread"
                        | "thread" => NestError::immutable(model, name, "connection identity"),
                        VOLUME_TRANSMITTER if schema.requires_aux() => {
                            NestError::immutable(model, name, "common property, use set_model_default")
                        }
                        _ => NestError::unknown_parameter(model, name),
                    })
                }
            };
            let (def, source) = match compiled.entry(conn.synapse_id) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let source = ValueSource::compile(model, &def, &value)?;
                    entry.insert((def, source))
                }
            };
            let mut rng = None;
            let mut v = source.value_at(model, def, k, &mut rng, &mut || {
                seeds.rng_for(&(call, k))
            })?;
            if def.name == DELAY {
                v = snap_delay(v, self.config.resolution, schema.continuous_delay)?;
            }
            updates.push((id, def.name, v));
        }

        for &(id, param, v) in &updates {
            if param == DELAY {
                self.table.note_delay(v);
            }
            if let Some(conn) = self.table.get_mut(id) {
                match param {
                    WEIGHT => conn.weight = v,
                    DELAY => conn.delay = v,
                    _ => {
                        conn.state.insert(param, v);
                    }
                }
            }
        }
        Ok(updates.len())
    }

    pub fn status(&self) -> KernelStatus {
        let extrema = self.table.delay_extrema();
        KernelStatus {
            threads: self.config.threads,
            rng_seed: self.config.rng_seed,
            resolution: self.config.resolution,
            node_count: self.nodes.len(),
            connection_count: self.table.len(),
            min_delay: extrema.map(|(lo, _)| lo),
            max_delay: extrema.map(|(_, hi)| hi),
            pending_projections: self.projections.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::ConnectivityRule;

    fn ctx() -> SimulationContext {
        SimulationContext::new(KernelConfig::default()).unwrap()
    }

    #[test]
    fn test_build_and_status() {
        let mut ctx = ctx();
        let pre = ctx.create(NodeModel::IafPscAlpha, 3).unwrap();
        let post = ctx.create(NodeModel::IafPscAlpha, 3).unwrap();
        let n = ctx
            .build(&pre, &post, &ConnSpec::new(ConnectivityRule::OneToOne), &SynapseSpec::default().delay(2.0))
            .unwrap();
        assert_eq!(n, 3);
        let status = ctx.status();
        assert_eq!(status.node_count, 6);
        assert_eq!(status.connection_count, 3);
        assert_eq!(status.min_delay, Some(2.0));
        assert_eq!(status.max_delay, Some(2.0));
    }

    #[test]
    fn test_failed_build_creates_nothing() {
        let mut ctx = ctx();
        let pre = ctx.create(NodeModel::IafPscAlpha, 3).unwrap();
        let post = ctx.create(NodeModel::IafPscAlpha, 3).unwrap();
        let spec = SynapseSpec::default().weight(vec![1.0, 2.0]);
        let err = ctx
            .build(&pre, &post, &ConnSpec::new(ConnectivityRule::OneToOne), &spec)
            .unwrap_err();
        assert!(matches!(err, NestError::LengthMismatch { expected: 3, actual: 2, .. }));
        assert_eq!(ctx.connection_count(), 0);
    }

    #[test]
    fn test_thread_count_frozen_once_nodes_exist() {
        let mut ctx = ctx();
        ctx.set_thread_count(2).unwrap();
        assert_eq!(ctx.threads(), 2);
        ctx.create(NodeModel::IafPscAlpha, 1).unwrap();
        assert!(matches!(ctx.set_thread_count(4), Err(NestError::Config(_))));
        ctx.reset();
        ctx.set_thread_count(4).unwrap();
        assert_eq!(ctx.status().threads, 4);
    }

    #[test]
    fn test_reset_restores_registry() {
        let mut ctx = ctx();
        ctx.copy_model("static_synapse", "my_syn", &[("weight", 3.0)]).unwrap();
        ctx.set_model_default("static_synapse", "delay", 2.0).unwrap();
        ctx.reset();
        assert!(ctx.model_defaults("my_syn").is_err());
        assert_eq!(ctx.model_defaults("static_synapse").unwrap()["delay"], ParamValue::Scalar(1.0));
    }

    #[test]
    fn test_volume_transmitter_default() {
        let mut ctx = ctx();
        let neuron = ctx.create(NodeModel::IafPscAlpha, 1).unwrap();
        assert!(matches!(
            ctx.set_model_default("stdp_dopamine_synapse", "vt", 40.0),
            Err(NestError::MissingDependency { .. })
        ));
        assert!(matches!(
            ctx.set_model_default("stdp_dopamine_synapse", "vt", neuron.ids[0] as f64),
            Err(NestError::MissingDependency { .. })
        ));
        let vt = ctx.create_volume_transmitter().unwrap();
        ctx.set_model_default("stdp_dopamine_synapse", "vt", vt as f64).unwrap();
        assert_eq!(
            ctx.model_defaults("stdp_dopamine_synapse").unwrap()["vt"],
            ParamValue::Scalar(vt as f64)
        );
    }

    #[test]
    fn test_set_connection_status_is_atomic() {
        let mut ctx = ctx();
        let n = ctx.create(NodeModel::IafPscAlpha, 2).unwrap();
        ctx.build(&n, &n, &ConnSpec::default(), &SynapseSpec::new("tsodyks2_synapse"))
            .unwrap();
        let all = ConnectionFilter::all();
        ctx.set_connection_status(&all, "U", vec![0.1, 0.2, 0.3, 0.4]).unwrap();
        assert_eq!(ctx.get_connections(&all).get("U").unwrap(), vec![0.1, 0.2, 0.3, 0.4]);

        let err = ctx
            .set_connection_status(&all, "U", vec![0.9, 0.9, 0.9, 1.5])
            .unwrap_err();
        assert!(matches!(err, NestError::InvalidParameter(_)));
        assert_eq!(ctx.get_connections(&all).get("U").unwrap(), vec![0.1, 0.2, 0.3, 0.4]);

        assert!(matches!(
            ctx.set_connection_status(&all, "source", 1.0),
            Err(NestError::ImmutableParameter { .. })
        ));
        assert!(matches!(
            ctx.set_connection_status(&all, "weight", vec![1.0]),
            Err(NestError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_set_status_array_across_models() {
        let mut ctx = ctx();
        let pre = ctx.create(NodeModel::IafPscAlpha, 100).unwrap();
        let post = ctx.create(NodeModel::IafPscAlpha, 200).unwrap();
        let specs = [SynapseSpec::default(), SynapseSpec::new("stdp_synapse")];
        let rule = ConnSpec::default();
        ctx.build_collocated(&pre, &post, &rule, &specs).unwrap();
        let all = ConnectionFilter::all();
        let n = ctx.connection_count();
        assert_eq!(n, 40_000);

        let weights: Vec<f64> = (0..n).map(|i| i as f64 * 1e-3).collect();
        assert_eq!(ctx.set_connection_status(&all, "weight", weights.clone()).unwrap(), n);
        let conns = ctx.get_connections(&all);
        assert_eq!(conns.weights(), weights);
        let stdp_weights: Vec<f64> = conns
            .synapse_models()
            .into_iter()
            .zip(&weights)
            .filter(|(model, _)| *model == "stdp_synapse")
            .map(|(_, w)| *w)
            .collect();
        let stdp = ConnectionFilter::all().synapse_model("stdp_synapse");
        assert_eq!(ctx.get_connections(&stdp).weights(), stdp_weights);
    }

    #[test]
    fn test_set_delay_on_grid() {
        let mut ctx = ctx();
        let n = ctx.create(NodeModel::IafPscAlpha, 1).unwrap();
        ctx.build(&n, &n, &ConnSpec::default(), &SynapseSpec::default()).unwrap();
        ctx.set_connection_status(&ConnectionFilter::all(), "delay", 2.53).unwrap();
        let delays = ctx.get_connections(&ConnectionFilter::all()).delays();
        assert!((delays[0] - 2.5).abs() < 1e-9);
        assert_eq!(ctx.status().max_delay.map(|d| (d * 10.0).round()), Some(25.0));
    }
}
