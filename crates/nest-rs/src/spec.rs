//! Synapse specifications

use crate::error::Result;
use crate::models::{SynapseRegistry, DELAY, RECEPTOR, WEIGHT};
use nestconn_core::ParamValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn static_synapse() -> String {
    "static_synapse".to_string()
}

/// Synapse model name plus parameter overrides
///
/// Serializes flat, NEST style:
/// `{"synapse_model": "stdp_synapse", "weight": 2.0, "delay": [1.0, 1.5]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynapseSpec {
    #[serde(default = "static_synapse")]
    pub synapse_model: String,
    #[serde(flatten)]
    params: BTreeMap<String, ParamValue>,
}

impl Default for SynapseSpec {
    fn default() -> Self {
        Self::new(static_synapse())
    }
}

impl SynapseSpec {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            synapse_model: model.into(),
            params: BTreeMap::new(),
        }
    }

    /// Build and check against `registry` in one step
    pub fn checked(
        registry: &SynapseRegistry,
        model: impl Into<String>,
        params: impl IntoIterator<Item = (String, ParamValue)>,
    ) -> Result<Self> {
        let spec = Self {
            synapse_model: model.into(),
            params: params.into_iter().collect(),
        };
        spec.validate(registry)?;
        Ok(spec)
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn weight(self, value: impl Into<ParamValue>) -> Self {
        self.with(WEIGHT, value)
    }

    pub fn delay(self, value: impl Into<ParamValue>) -> Self {
        self.with(DELAY, value)
    }

    pub fn receptor_type(self, port: usize) -> Self {
        self.with(RECEPTOR, port as f64)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.params.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    pub fn params(&self) -> &BTreeMap<String, ParamValue> {
        &self.params
    }

    /// Model exists and every override is known and settable
    pub fn validate(&self, registry: &SynapseRegistry) -> Result<()> {
        registry
            .instantiate_params(&self.synapse_model, &self.params)
            .map(|_| ())
    }
}
