//! Connection builder
//!
//! One build call runs in two phases. The rule's pairs are enumerated and
//! every synapse spec is compiled; then the pairs are resolved into
//! connections, one rayon task per thread partition. Nothing reaches the
//! table unless both phases succeed.
//!
//! Random parameter values for pair `k` and spec `j` come from a generator
//! keyed by `(call, k, j)`, so results do not depend on the thread count.

use crate::error::{NestError, Result};
use crate::models::SynapseRegistry;
use crate::nodes::NodeStore;
use crate::params::{snap_delay, ParamTemplate};
use crate::rules::{self, ConnSpec, Pair};
use crate::spec::SynapseSpec;
use crate::table::{Connection, StagedConnections};
use nestconn_core::{NodeCollection, SeedStream, Time};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::sync::Arc;

/// Borrowed view of everything a build call reads
pub struct ConnectionBuilder<'a> {
    pub nodes: &'a NodeStore,
    pub registry: &'a SynapseRegistry,
    pub pool: &'a ThreadPool,
    pub threads: usize,
    pub seeds: SeedStream,
    pub resolution: Time,
}

struct CompiledSpec {
    template: ParamTemplate,
    model: Arc<str>,
}

impl ConnectionBuilder<'_> {
    /// Resolve all connections of one rule application without storing them
    ///
    /// `call` must be unique per build call within a context.
    pub fn stage(
        &self,
        call: u64,
        sources: &NodeCollection,
        targets: &NodeCollection,
        conn_spec: &ConnSpec,
        syn_specs: &[SynapseSpec],
    ) -> Result<StagedConnections> {
        if syn_specs.is_empty() {
            return Err(NestError::InvalidParameter(
                "at least one synapse spec is required".into(),
            ));
        }
        let specs = syn_specs
            .iter()
            .map(|spec| self.compile(spec))
            .collect::<Result<Vec<_>>>()?;

        self.nodes.check_all(sources)?;
        self.nodes.check_all(targets)?;

        let rule_rng = self.seeds.rng_for(&(call, "rule"));
        let pairs: Vec<Pair> = rules::enumerate(sources, targets, conn_spec, rule_rng)?.collect();
        for spec in &specs {
            spec.template.check_lengths(pairs.len())?;
        }

        let mut buckets = vec![Vec::new(); self.threads.max(1)];
        for (k, &(_, target)) in pairs.iter().enumerate() {
            let node = self.nodes.require(target)?;
            buckets[node.thread].push(k);
        }

        let partitions = self.pool.install(|| {
            buckets
                .par_iter()
                .map(|bucket| self.resolve_bucket(call, bucket, &pairs, &specs))
                .collect::<Result<Vec<_>>>()
        })?;

        let staged = StagedConnections { partitions };
        log::debug!(
            "build call {call}: {} rule, {} pairs, {} connections across {} threads",
            conn_spec.rule.name(),
            pairs.len(),
            staged.len(),
            self.threads
        );
        Ok(staged)
    }

    fn compile(&self, spec: &SynapseSpec) -> Result<CompiledSpec> {
        let schema = self.registry.lookup(&spec.synapse_model)?;
        if schema.missing_aux() {
            return Err(NestError::missing_dependency(
                &spec.synapse_model,
                "no volume transmitter set, use set_model_default(model, \"vt\", id)",
            ));
        }
        let template = self
            .registry
            .instantiate_params(&spec.synapse_model, spec.params())?;
        Ok(CompiledSpec {
            template,
            model: Arc::from(spec.synapse_model.as_str()),
        })
    }

    /// Connections for the pairs whose target this bucket's thread owns
    fn resolve_bucket(
        &self,
        call: u64,
        bucket: &[usize],
        pairs: &[Pair],
        specs: &[CompiledSpec],
    ) -> Result<Vec<Connection>> {
        let mut out = Vec::with_capacity(bucket.len() * specs.len());
        for &k in bucket {
            let (source, target) = pairs[k];
            let node = self.nodes.require(target)?;
            for (j, spec) in specs.iter().enumerate() {
                let p = spec
                    .template
                    .resolve(k, || self.seeds.rng_for(&(call, k, j)))?;
                if !node.model.receptors().accepts(p.receptor) {
                    return Err(NestError::UnknownReceptor {
                        target,
                        model: node.model.name().to_string(),
                        port: p.receptor,
                    });
                }
                let delay = snap_delay(p.delay, self.resolution, spec.template.continuous_delay())?;
                out.push(Connection {
                    source,
                    target,
                    synapse_model: Arc::clone(&spec.model),
                    synapse_id: spec.template.synapse_id(),
                    thread: node.thread,
                    receptor: p.receptor,
                    weight: p.weight,
                    delay,
                    state: p.state.into_iter().collect(),
                });
            }
        }
        Ok(out)
    }
}
