//! JSON network descriptions
//!
//! ```json
//! {
//!   "populations": [
//!     {"name": "exc", "model": "iaf_psc_alpha", "n": 80},
//!     {"name": "inh", "model": "iaf_psc_exp_multisynapse", "n": 20, "tau_syn": [0.5, 2.0]}
//!   ],
//!   "volume_transmitters": ["dopa"],
//!   "copy_models": [{"from": "static_synapse", "to": "exc_syn", "params": {"weight": 0.5}}],
//!   "defaults": [{"model": "stdp_dopamine_synapse", "param": "vt", "volume_transmitter": "dopa"}],
//!   "projections": [
//!     {"source": "exc", "target": "inh",
//!      "conn": {"rule": "fixed_indegree", "indegree": 10},
//!      "synapses": [{"synapse_model": "exc_syn", "delay": 1.5}]}
//!   ]
//! }
//! ```

use anyhow::{anyhow, bail, Context, Result};
use nestconn::{ConnSpec, NodeCollection, NodeModel, Projection, SimulationContext, SynapseSpec};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Population {
    pub name: String,
    pub model: String,
    pub n: usize,
    #[serde(default)]
    pub tau_syn: Option<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CopyModel {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelDefault {
    pub model: String,
    pub param: String,
    #[serde(default)]
    pub value: Option<f64>,
    /// Name of a volume transmitter, for `vt`
    #[serde(default)]
    pub volume_transmitter: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectionDesc {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub conn: ConnSpec,
    /// Collocated synapse specs; defaults to one static synapse
    #[serde(default)]
    pub synapses: Vec<SynapseSpec>,
    /// Build now instead of with the batch
    #[serde(default)]
    pub immediate: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkDesc {
    pub populations: Vec<Population>,
    #[serde(default)]
    pub volume_transmitters: Vec<String>,
    #[serde(default)]
    pub copy_models: Vec<CopyModel>,
    #[serde(default)]
    pub defaults: Vec<ModelDefault>,
    #[serde(default)]
    pub projections: Vec<ProjectionDesc>,
}

/// Populations created for a description, by name
#[derive(Debug, Default)]
pub struct Built {
    pub populations: Vec<(String, NodeCollection)>,
    pub connections: usize,
}

impl NetworkDesc {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("invalid network description")
    }

    /// Create nodes, configure models and build every projection
    pub fn build(&self, ctx: &mut SimulationContext) -> Result<Built> {
        let mut built = Built::default();
        let mut by_name: HashMap<&str, NodeCollection> = HashMap::new();

        for pop in &self.populations {
            let mut model = NodeModel::from_name(&pop.model)?;
            if let Some(tau) = &pop.tau_syn {
                model = model.with_tau_syn(tau.clone())?;
            }
            let nodes = ctx
                .create(model, pop.n)
                .with_context(|| format!("population '{}'", pop.name))?;
            if by_name.insert(&pop.name, nodes.clone()).is_some() {
                bail!("population '{}' defined twice", pop.name);
            }
            built.populations.push((pop.name.clone(), nodes));
        }

        let mut transmitters = HashMap::new();
        for name in &self.volume_transmitters {
            transmitters.insert(name.as_str(), ctx.create_volume_transmitter()?);
        }

        for copy in &self.copy_models {
            let params: Vec<(&str, f64)> = copy.params.iter().map(|(k, v)| (k.as_str(), *v)).collect();
            ctx.copy_model(&copy.from, &copy.to, &params)
                .with_context(|| format!("copy {} -> {}", copy.from, copy.to))?;
        }

        for default in &self.defaults {
            let value = match (&default.volume_transmitter, default.value) {
                (Some(vt), _) => *transmitters
                    .get(vt.as_str())
                    .ok_or_else(|| anyhow!("unknown volume transmitter '{vt}'"))? as f64,
                (None, Some(v)) => v,
                (None, None) => bail!("default {}.{} has no value", default.model, default.param),
            };
            ctx.set_model_default(&default.model, &default.param, value)
                .with_context(|| format!("default {}.{}", default.model, default.param))?;
        }

        let lookup = |name: &str| {
            by_name
                .get(name)
                .ok_or_else(|| anyhow!("unknown population '{name}'"))
        };
        for (i, desc) in self.projections.iter().enumerate() {
            let mut projection = Projection::new(lookup(&desc.source)?, lookup(&desc.target)?, desc.conn.clone());
            if !desc.synapses.is_empty() {
                projection = projection.collocated(desc.synapses.clone());
            }
            let label = || format!("projection {i} ({} -> {})", desc.source, desc.target);
            if desc.immediate {
                built.connections += ctx.connect_immediately(projection).with_context(label)?;
            } else {
                ctx.connect(projection).with_context(label)?;
            }
        }
        built.connections += ctx.build_network().context("build_network")?;
        Ok(built)
    }
}
