//! Node models and the node store
//!
//! Only what connection construction needs is kept per node: its model
//! (which decides the receptor ports it offers) and the thread that owns it.

use crate::error::{NestError, Result};
use nestconn_core::{NodeCollection, NodeId, ThreadIndex};
use serde::{Deserialize, Serialize};

// ============================================================================
// NODE MODELS
// ============================================================================

/// NEST node model types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeModel {
    /// Integrate-and-fire with alpha-function PSCs
    IafPscAlpha,
    /// Integrate-and-fire with exponential PSCs
    IafPscExp,
    /// Integrate-and-fire with delta PSCs (instantaneous)
    IafPscDelta,
    /// Conductance-based IAF
    IafCondAlpha,
    /// Conductance-based with exponential conductances
    IafCondExp,
    /// Adaptive exponential integrate-and-fire
    AeifCondAlpha,
    /// Hodgkin-Huxley
    HhPscAlpha,
    Izhikevich,
    /// Repeats input spikes
    ParrotNeuron,

    /// Exponential PSCs, one receptor port per time constant
    IafPscExpMultisynapse { tau_syn: Vec<f64> },
    IafPscAlphaMultisynapse { tau_syn: Vec<f64> },
    AeifCondAlphaMultisynapse { tau_syn: Vec<f64> },

    PoissonGenerator,
    SpikeGenerator,
    DcGenerator,
    SpikeRecorder,

    /// Dopamine concentration source for neuromodulated synapses
    VolumeTransmitter,
}

/// Receptor ports a node accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceptorLayout {
    /// Only port 0
    Single,
    /// Ports `1..=n`
    Multi(usize),
}

impl ReceptorLayout {
    pub fn accepts(&self, port: usize) -> bool {
        match *self {
            Self::Single => port == 0,
            Self::Multi(n) => (1..=n).contains(&port),
        }
    }
}

impl NodeModel {
    /// Parse a model name; multisynapse models start without receptors
    pub fn from_name(name: &str) -> Result<Self> {
        let model = match name {
            "iaf_psc_alpha" => Self::IafPscAlpha,
            "iaf_psc_exp" => Self::IafPscExp,
            "iaf_psc_delta" => Self::IafPscDelta,
            "iaf_cond_alpha" => Self::IafCondAlpha,
            "iaf_cond_exp" => Self::IafCondExp,
            "aeif_cond_alpha" => Self::AeifCondAlpha,
            "hh_psc_alpha" => Self::HhPscAlpha,
            "izhikevich" => Self::Izhikevich,
            "parrot_neuron" => Self::ParrotNeuron,
            "iaf_psc_exp_multisynapse" => Self::IafPscExpMultisynapse { tau_syn: vec![] },
            "iaf_psc_alpha_multisynapse" => Self::IafPscAlphaMultisynapse { tau_syn: vec![] },
            "aeif_cond_alpha_multisynapse" => Self::AeifCondAlphaMultisynapse { tau_syn: vec![] },
            "poisson_generator" => Self::PoissonGenerator,
            "spike_generator" => Self::SpikeGenerator,
            "dc_generator" => Self::DcGenerator,
            "spike_recorder" => Self::SpikeRecorder,
            "volume_transmitter" => Self::VolumeTransmitter,
            other => return Err(NestError::UnknownModel(other.to_string())),
        };
        Ok(model)
    }

    /// Set the synaptic time constants of a multisynapse model
    pub fn with_tau_syn(self, tau: Vec<f64>) -> Result<Self> {
        if let Some(bad) = tau.iter().find(|t| !(**t > 0.0)) {
            return Err(NestError::InvalidParameter(format!(
                "tau_syn entries must be > 0, got {bad}"
            )));
        }
        match self {
            Self::IafPscExpMultisynapse { .. } => Ok(Self::IafPscExpMultisynapse { tau_syn: tau }),
            Self::IafPscAlphaMultisynapse { .. } => {
                Ok(Self::IafPscAlphaMultisynapse { tau_syn: tau })
            }
            Self::AeifCondAlphaMultisynapse { .. } => {
                Ok(Self::AeifCondAlphaMultisynapse { tau_syn: tau })
            }
            other => Err(NestError::InvalidParameter(format!(
                "{} has no tau_syn vector",
                other.name()
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::IafPscAlpha => "iaf_psc_alpha",
            Self::IafPscExp => "iaf_psc_exp",
            Self::IafPscDelta => "iaf_psc_delta",
            Self::IafCondAlpha => "iaf_cond_alpha",
            Self::IafCondExp => "iaf_cond_exp",
            Self::AeifCondAlpha => "aeif_cond_alpha",
            Self::HhPscAlpha => "hh_psc_alpha",
            Self::Izhikevich => "izhikevich",
            Self::ParrotNeuron => "parrot_neuron",
            Self::IafPscExpMultisynapse { .. } => "iaf_psc_exp_multisynapse",
            Self::IafPscAlphaMultisynapse { .. } => "iaf_psc_alpha_multisynapse",
            Self::AeifCondAlphaMultisynapse { .. } => "aeif_cond_alpha_multisynapse",
            Self::PoissonGenerator => "poisson_generator",
            Self::SpikeGenerator => "spike_generator",
            Self::DcGenerator => "dc_generator",
            Self::SpikeRecorder => "spike_recorder",
            Self::VolumeTransmitter => "volume_transmitter",
        }
    }

    pub fn receptors(&self) -> ReceptorLayout {
        match self {
            Self::IafPscExpMultisynapse { tau_syn }
            | Self::IafPscAlphaMultisynapse { tau_syn }
            | Self::AeifCondAlphaMultisynapse { tau_syn } => ReceptorLayout::Multi(tau_syn.len()),
            _ => ReceptorLayout::Single,
        }
    }

    pub fn is_volume_transmitter(&self) -> bool {
        matches!(self, Self::VolumeTransmitter)
    }
}

// ============================================================================
// NODE STORE
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub model: NodeModel,
    pub thread: ThreadIndex,
}

/// Nodes of one context; ids are dense and start at 1
#[derive(Debug, Clone, Default)]
pub struct NodeStore {
    nodes: Vec<Node>,
}

impl NodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Append `n` nodes of `model`, owned round-robin by `threads` workers
    pub fn create(&mut self, model: &NodeModel, n: usize, threads: usize) -> NodeCollection {
        let first = self.nodes.len() + 1;
        self.nodes.extend((first..first + n).map(|id| Node {
            id,
            model: model.clone(),
            thread: owner_thread(id, threads),
        }));
        NodeCollection::range(first, n)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        id.checked_sub(1).and_then(|idx| self.nodes.get(idx))
    }

    pub fn require(&self, id: NodeId) -> Result<&Node> {
        self.get(id).ok_or(NestError::NodeNotFound(id))
    }

    /// Fail on the first id of `nodes` that does not exist
    pub fn check_all(&self, nodes: &NodeCollection) -> Result<()> {
        nodes.iter().try_for_each(|&id| self.require(id).map(|_| ()))
    }
}

/// Thread that owns node `id`
pub fn owner_thread(id: NodeId, threads: usize) -> ThreadIndex {
    id % threads.max(1)
}
