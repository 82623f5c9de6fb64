//! Synapse model registry
//!
//! Each synapse model is a named parameter schema. Every schema starts with
//! `weight`, `delay` and `receptor_type`; plastic models add their state
//! variables. Parameters are either per-connection (set in a synapse spec or
//! on existing connections) or common to the whole model (changed only
//! through [`SynapseRegistry::set_default`]).

use crate::error::{NestError, Result};
use crate::params::ParamTemplate;
use nestconn_core::{NodeId, ParamValue};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

// ============================================================================
// PARAMETER SCHEMA
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParamScope {
    PerConnection,
    Common,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParamKind {
    Real,
    Integer,
}

/// Valid range of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Bound {
    Any,
    Positive,
    NonNegative,
    /// Closed interval [0, 1]
    UnitInterval,
}

impl Bound {
    pub fn contains(&self, v: f64) -> bool {
        if !v.is_finite() {
            return false;
        }
        match self {
            Self::Any => true,
            Self::Positive => v > 0.0,
            Self::NonNegative => v >= 0.0,
            Self::UnitInterval => (0.0..=1.0).contains(&v),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Self::Any => "a finite number",
            Self::Positive => "> 0",
            Self::NonNegative => ">= 0",
            Self::UnitInterval => "in [0, 1]",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParamDef {
    pub name: &'static str,
    pub default: f64,
    pub scope: ParamScope,
    pub kind: ParamKind,
    pub bound: Bound,
}

impl ParamDef {
    /// Validate a concrete value against kind and range
    pub fn check(&self, model: &str, v: f64) -> Result<()> {
        if !self.bound.contains(v) {
            return Err(NestError::InvalidParameter(format!(
                "{model}.{} must be {}, got {v}",
                self.name,
                self.bound.describe()
            )));
        }
        if self.kind == ParamKind::Integer && v.fract() != 0.0 {
            return Err(NestError::InvalidParameter(format!(
                "{model}.{} must be an integer, got {v}",
                self.name
            )));
        }
        Ok(())
    }
}

pub const WEIGHT: &str = "weight";
pub const DELAY: &str = "delay";
pub const RECEPTOR: &str = "receptor_type";
/// Volume transmitter reference of neuromodulated models
pub const VOLUME_TRANSMITTER: &str = "vt";

// ============================================================================
// SYNAPSE SCHEMA
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynapseSchema {
    pub name: String,
    /// Built-in model this schema was copied from (itself for built-ins)
    pub base: &'static str,
    pub params: Vec<ParamDef>,
    /// Delays are kept off the resolution grid
    pub continuous_delay: bool,
    pub needs_volume_transmitter: bool,
    pub volume_transmitter: Option<NodeId>,
}

impl SynapseSchema {
    fn new(name: &'static str) -> Self {
        let base = |name, default, kind, bound| ParamDef {
            name,
            default,
            scope: ParamScope::PerConnection,
            kind,
            bound,
        };
        Self {
            name: name.to_string(),
            base: name,
            params: vec![
                base(WEIGHT, 1.0, ParamKind::Real, Bound::Any),
                base(DELAY, 1.0, ParamKind::Real, Bound::Positive),
                base(RECEPTOR, 0.0, ParamKind::Integer, Bound::NonNegative),
            ],
            continuous_delay: false,
            needs_volume_transmitter: false,
            volume_transmitter: None,
        }
    }

    fn push(mut self, name: &'static str, default: f64, scope: ParamScope, kind: ParamKind, bound: Bound) -> Self {
        self.params.push(ParamDef {
            name,
            default,
            scope,
            kind,
            bound,
        });
        self
    }

    fn conn(self, name: &'static str, default: f64, bound: Bound) -> Self {
        self.push(name, default, ParamScope::PerConnection, ParamKind::Real, bound)
    }

    fn conn_int(self, name: &'static str, default: f64) -> Self {
        self.push(name, default, ParamScope::PerConnection, ParamKind::Integer, Bound::NonNegative)
    }

    fn common(self, name: &'static str, default: f64, bound: Bound) -> Self {
        self.push(name, default, ParamScope::Common, ParamKind::Real, bound)
    }

    fn common_int(self, name: &'static str, default: f64) -> Self {
        self.push(name, default, ParamScope::Common, ParamKind::Integer, Bound::NonNegative)
    }

    /// Weight shared by all connections of the model
    fn homogeneous_weight(mut self) -> Self {
        if let Some(w) = self.params.iter_mut().find(|p| p.name == WEIGHT) {
            w.scope = ParamScope::Common;
        }
        self
    }

    fn continuous_delay(mut self) -> Self {
        self.continuous_delay = true;
        self
    }

    fn volume_transmitter(mut self) -> Self {
        self.needs_volume_transmitter = true;
        self
    }

    pub fn param(&self, name: &str) -> Option<&ParamDef> {
        self.params.iter().find(|p| p.name == name)
    }

    fn param_mut(&mut self, name: &str) -> Option<&mut ParamDef> {
        self.params.iter_mut().find(|p| p.name == name)
    }

    /// Model needs an auxiliary object before connections can be built
    pub fn requires_aux(&self) -> bool {
        self.needs_volume_transmitter
    }

    /// Aux object is required but not configured
    pub fn missing_aux(&self) -> bool {
        self.needs_volume_transmitter && self.volume_transmitter.is_none()
    }

    pub fn defaults(&self) -> BTreeMap<String, ParamValue> {
        let mut out: BTreeMap<String, ParamValue> = self
            .params
            .iter()
            .map(|p| (p.name.to_string(), ParamValue::Scalar(p.default)))
            .collect();
        if let Some(vt) = self.volume_transmitter {
            out.insert(VOLUME_TRANSMITTER.to_string(), ParamValue::Scalar(vt as f64));
        }
        out
    }
}

// ============================================================================
// BUILT-IN MODELS
// ============================================================================

fn builtin_models() -> Vec<SynapseSchema> {
    use Bound::*;
    let stdp_like = |name| {
        SynapseSchema::new(name)
            .conn("tau_plus", 20.0, Positive)
            .conn("lambda", 0.01, Any)
            .conn("alpha", 1.0, Any)
            .conn("mu_plus", 1.0, Any)
            .conn("mu_minus", 1.0, Any)
            .conn("Wmax", 100.0, Any)
    };
    let stdp_pl_hom = |name| {
        SynapseSchema::new(name)
            .common("tau_plus", 20.0, Positive)
            .common("lambda", 0.1, Any)
            .common("alpha", 1.0, Any)
            .common("mu", 0.4, Any)
            .conn("Kplus", 0.0, NonNegative)
    };

    vec![
        SynapseSchema::new("static_synapse"),
        SynapseSchema::new("static_synapse_hpc"),
        SynapseSchema::new("static_synapse_hom_w").homogeneous_weight(),
        SynapseSchema::new("cont_delay_synapse").continuous_delay(),
        SynapseSchema::new("bernoulli_synapse").conn("p_transmit", 1.0, UnitInterval),
        SynapseSchema::new("ht_synapse")
            .conn("tau_P", 500.0, Positive)
            .conn("delta_P", 0.125, UnitInterval)
            .conn("P", 1.0, UnitInterval),
        SynapseSchema::new("quantal_stp_synapse")
            .conn("U", 0.5, UnitInterval)
            .conn("u", 0.5, UnitInterval)
            .conn("tau_rec", 800.0, Positive)
            .conn("tau_fac", 0.0, NonNegative)
            .conn_int("n", 1.0)
            .conn_int("a", 1.0),
        SynapseSchema::new("tsodyks_synapse")
            .conn("U", 0.5, UnitInterval)
            .conn("tau_psc", 3.0, Positive)
            .conn("tau_fac", 0.0, NonNegative)
            .conn("tau_rec", 800.0, Positive)
            .conn("x", 1.0, UnitInterval)
            .conn("y", 0.0, UnitInterval)
            .conn("u", 0.0, UnitInterval),
        SynapseSchema::new("tsodyks_synapse_hom")
            .common("U", 0.5, UnitInterval)
            .common("tau_psc", 3.0, Positive)
            .common("tau_fac", 0.0, NonNegative)
            .common("tau_rec", 800.0, Positive)
            .conn("x", 1.0, UnitInterval)
            .conn("y", 0.0, UnitInterval)
            .conn("u", 0.0, UnitInterval),
        SynapseSchema::new("tsodyks2_synapse")
            .conn("U", 0.5, UnitInterval)
            .conn("u", 0.5, UnitInterval)
            .conn("x", 1.0, UnitInterval)
            .conn("tau_rec", 800.0, Positive)
            .conn("tau_fac", 0.0, NonNegative),
        stdp_like("stdp_synapse").conn("Kplus", 0.0, NonNegative),
        SynapseSchema::new("stdp_synapse_hom")
            .common("tau_plus", 20.0, Positive)
            .common("lambda", 0.01, Any)
            .common("alpha", 1.0, Any)
            .common("mu_plus", 1.0, Any)
            .common("mu_minus", 1.0, Any)
            .common("Wmax", 100.0, Any)
            .conn("Kplus", 0.0, NonNegative),
        stdp_pl_hom("stdp_pl_synapse_hom"),
        stdp_pl_hom("stdp_pl_synapse_hom_hpc"),
        SynapseSchema::new("stdp_triplet_synapse")
            .conn("tau_plus", 16.8, Positive)
            .conn("tau_plus_triplet", 101.0, Positive)
            .conn("Aplus", 5e-10, Any)
            .conn("Aminus", 7e-3, Any)
            .conn("Aplus_triplet", 6.2e-3, Any)
            .conn("Aminus_triplet", 2.3e-4, Any)
            .conn("Kplus", 0.0, NonNegative)
            .conn("Kplus_triplet", 0.0, NonNegative)
            .conn("Wmax", 100.0, Any),
        stdp_like("stdp_nn_symm_synapse"),
        stdp_like("stdp_nn_pre_centered_synapse"),
        stdp_like("stdp_nn_restr_synapse"),
        SynapseSchema::new("stdp_facetshw_synapse_hom")
            .common("tau_plus", 20.0, Positive)
            .common("tau_minus_stdp", 20.0, Positive)
            .common("Wmax", 100.0, Any)
            .common_int("no_synapses", 0.0)
            .common_int("synapses_per_driver", 50.0)
            .common("driver_readout_time", 15.0, Positive)
            .conn("a_causal", 0.0, Any)
            .conn("a_acausal", 0.0, Any)
            .conn("a_thresh_th", 21.835, Any)
            .conn("a_thresh_tl", 21.835, Any)
            .conn_int("init_flag", 0.0)
            .conn_int("synapse_id", 0.0)
            .conn("next_readout_time", 0.0, NonNegative)
            .conn_int("discrete_weight", 0.0),
        SynapseSchema::new("stdp_dopamine_synapse")
            .volume_transmitter()
            .common("A_plus", 1.0, Any)
            .common("A_minus", 1.5, Any)
            .common("tau_plus", 20.0, Positive)
            .common("tau_c", 1000.0, Positive)
            .common("tau_n", 200.0, Positive)
            .common("b", 0.0, Any)
            .common("Wmin", 0.0, Any)
            .common("Wmax", 200.0, Any)
            .conn("c", 0.0, Any)
            .conn("n", 0.0, Any),
        SynapseSchema::new("vogels_sprekeler_synapse")
            .conn("tau", 20.0, Positive)
            .conn("alpha", 0.12, Any)
            .conn("eta", 0.001, Any)
            .conn("Wmax", 1.0, Any)
            .conn("Kplus", 0.0, NonNegative),
        SynapseSchema::new("clopath_synapse")
            .conn("x_bar", 0.0, NonNegative)
            .conn("tau_x", 15.0, Positive)
            .conn("Wmin", 0.0, Any)
            .conn("Wmax", 100.0, Any),
        SynapseSchema::new("jonke_synapse")
            .common("alpha", 1.0, Any)
            .common("beta", 0.0, Any)
            .common("lambda", 0.01, Any)
            .common("mu_plus", 0.0, Any)
            .common("mu_minus", 0.0, Any)
            .common("tau_plus", 20.0, Positive)
            .common("Wmax", 100.0, Any)
            .conn("Kplus", 0.0, NonNegative),
        SynapseSchema::new("urbanczik_synapse")
            .conn("tau_Delta", 100.0, Positive)
            .conn("eta", 0.07, Any)
            .conn("Wmin", 0.0, Any)
            .conn("Wmax", 100.0, Any),
    ]
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Synapse model id (index into the registry)
pub type SynapseId = usize;

#[derive(Debug, Clone)]
pub struct SynapseRegistry {
    models: Vec<SynapseSchema>,
    index: HashMap<String, SynapseId>,
}

impl Default for SynapseRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SynapseRegistry {
    pub fn builtin() -> Self {
        let models = builtin_models();
        let index = models
            .iter()
            .enumerate()
            .map(|(i, m)| (m.name.clone(), i))
            .collect();
        Self { models, index }
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(|m| m.name.as_str())
    }

    pub fn id_of(&self, name: &str) -> Result<SynapseId> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| NestError::UnknownModel(name.to_string()))
    }

    pub fn lookup(&self, name: &str) -> Result<&SynapseSchema> {
        self.id_of(name).map(|id| &self.models[id])
    }

    pub fn by_id(&self, id: SynapseId) -> Option<&SynapseSchema> {
        self.models.get(id)
    }

    pub fn defaults(&self, name: &str) -> Result<BTreeMap<String, ParamValue>> {
        self.lookup(name).map(SynapseSchema::defaults)
    }

    pub fn requires_aux(&self, name: &str) -> Result<bool> {
        self.lookup(name).map(SynapseSchema::requires_aux)
    }

    /// Merge model defaults with `overrides` into a per-connection template
    pub fn instantiate_params(
        &self,
        name: &str,
        overrides: &BTreeMap<String, ParamValue>,
    ) -> Result<ParamTemplate> {
        let id = self.id_of(name)?;
        ParamTemplate::compile(id, &self.models[id], overrides)
    }

    /// Register `new_name` as a copy of `existing` with changed defaults
    pub fn copy_model(
        &mut self,
        existing: &str,
        new_name: &str,
        overrides: &BTreeMap<String, f64>,
    ) -> Result<SynapseId> {
        if self.index.contains_key(new_name) {
            return Err(NestError::DuplicateModel(new_name.to_string()));
        }
        let mut schema = self.lookup(existing)?.clone();
        schema.name = new_name.to_string();
        for (param, &value) in overrides {
            apply_default(&mut schema, param, value)?;
        }
        let id = self.models.len();
        log::debug!("copied synapse model {existing} -> {new_name}");
        self.models.push(schema);
        self.index.insert(new_name.to_string(), id);
        Ok(id)
    }

    /// Change a model default; common parameters may only change here
    pub fn set_default(&mut self, model: &str, param: &str, value: f64) -> Result<()> {
        let id = self.id_of(model)?;
        apply_default(&mut self.models[id], param, value)
    }

    /// Attach the volume transmitter used by a neuromodulated model
    pub fn set_volume_transmitter(&mut self, model: &str, vt: NodeId) -> Result<()> {
        let id = self.id_of(model)?;
        let schema = &mut self.models[id];
        if !schema.needs_volume_transmitter {
            return Err(NestError::unknown_parameter(model, VOLUME_TRANSMITTER));
        }
        schema.volume_transmitter = Some(vt);
        Ok(())
    }
}

fn apply_default(schema: &mut SynapseSchema, param: &str, value: f64) -> Result<()> {
    if param == VOLUME_TRANSMITTER && schema.needs_volume_transmitter {
        return Err(NestError::InvalidParameter(format!(
            "{}.vt must reference an existing volume_transmitter node",
            schema.name
        )));
    }
    let model = schema.name.clone();
    let def = schema
        .param_mut(param)
        .ok_or_else(|| NestError::unknown_parameter(&model, param))?;
    def.check(&model, value)?;
    def.default = value;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_defaults() {
        let reg = SynapseRegistry::builtin();
        let defaults = reg.defaults("static_synapse").unwrap();
        assert_eq!(defaults["weight"], ParamValue::Scalar(1.0));
        assert_eq!(defaults["delay"], ParamValue::Scalar(1.0));
        assert_eq!(defaults["receptor_type"], ParamValue::Scalar(0.0));
        assert_eq!(defaults.len(), 3);
    }

    #[test]
    fn test_unknown_model() {
        let reg = SynapseRegistry::builtin();
        assert_eq!(
            reg.lookup("no_such_synapse").unwrap_err(),
            NestError::UnknownModel("no_such_synapse".into())
        );
    }

    #[test]
    fn test_plastic_models_carry_state() {
        let reg = SynapseRegistry::builtin();
        let stdp = reg.lookup("stdp_synapse").unwrap();
        assert_eq!(stdp.param("Kplus").unwrap().scope, ParamScope::PerConnection);
        assert_eq!(stdp.param("Wmax").unwrap().default, 100.0);

        let hom = reg.lookup("stdp_synapse_hom").unwrap();
        assert_eq!(hom.param("tau_plus").unwrap().scope, ParamScope::Common);

        let facets = reg.lookup("stdp_facetshw_synapse_hom").unwrap();
        assert!(facets.param("a_causal").is_some());
        assert!(facets.param("next_readout_time").is_some());
    }

    #[test]
    fn test_homogeneous_weight_is_common() {
        let reg = SynapseRegistry::builtin();
        let hom_w = reg.lookup("static_synapse_hom_w").unwrap();
        assert_eq!(hom_w.param(WEIGHT).unwrap().scope, ParamScope::Common);
        assert_eq!(hom_w.param(DELAY).unwrap().scope, ParamScope::PerConnection);
    }

    #[test]
    fn test_requires_aux() {
        let reg = SynapseRegistry::builtin();
        assert!(reg.requires_aux("stdp_dopamine_synapse").unwrap());
        assert!(!reg.requires_aux("stdp_synapse").unwrap());
        assert!(reg.lookup("stdp_dopamine_synapse").unwrap().missing_aux());
    }

    #[test]
    fn test_copy_model() {
        let mut reg = SynapseRegistry::builtin();
        let mut params = BTreeMap::new();
        params.insert("weight".to_string(), 2.5);
        reg.copy_model("static_synapse", "test_syn", &params).unwrap();

        let copy = reg.lookup("test_syn").unwrap();
        assert_eq!(copy.base, "static_synapse");
        assert_eq!(copy.param(WEIGHT).unwrap().default, 2.5);
        assert_eq!(reg.lookup("static_synapse").unwrap().param(WEIGHT).unwrap().default, 1.0);

        assert_eq!(
            reg.copy_model("static_synapse", "test_syn", &BTreeMap::new()),
            Err(NestError::DuplicateModel("test_syn".into()))
        );
    }

    #[test]
    fn test_set_default_validates() {
        let mut reg = SynapseRegistry::builtin();
        reg.set_default("stdp_synapse_hom", "tau_plus", 15.0).unwrap();
        assert_eq!(
            reg.lookup("stdp_synapse_hom").unwrap().param("tau_plus").unwrap().default,
            15.0
        );
        assert!(matches!(
            reg.set_default("static_synapse", "delay", -1.0),
            Err(NestError::InvalidParameter(_))
        ));
        assert!(matches!(
            reg.set_default("static_synapse", "receptor_type", 1.5),
            Err(NestError::InvalidParameter(_))
        ));
        assert!(matches!(
            reg.set_default("static_synapse", "Kplus", 1.0),
            Err(NestError::UnknownParameter { .. })
        ));
    }

    #[test]
    fn test_volume_transmitter_only_for_neuromodulated() {
        let mut reg = SynapseRegistry::builtin();
        assert!(reg.set_volume_transmitter("stdp_synapse", 3).is_err());
        reg.set_volume_transmitter("stdp_dopamine_synapse", 3).unwrap();
        let defaults = reg.defaults("stdp_dopamine_synapse").unwrap();
        assert_eq!(defaults["vt"], ParamValue::Scalar(3.0));
    }
}
