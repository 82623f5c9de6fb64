//! Parameter resolution
//!
//! A [`ParamTemplate`] is a synapse spec checked against its model schema:
//! every per-connection parameter has exactly one source (fixed value, array
//! entry or distribution). Resolving connection `k` yields concrete values.

use crate::error::{NestError, Result};
use crate::models::{
    ParamDef, ParamScope, SynapseId, SynapseSchema, DELAY, RECEPTOR, VOLUME_TRANSMITTER, WEIGHT,
};
use nestconn_core::{CoreError, ParamValue, Sampler, Time};
use rand::rngs::StdRng;
use std::collections::BTreeMap;

/// Where the value of one parameter comes from
#[derive(Debug, Clone)]
pub(crate) enum ValueSource {
    Fixed(f64),
    Array(Vec<f64>),
    Drawn(Sampler),
}

impl ValueSource {
    /// Check a declared value once; drawn values are checked per draw
    pub(crate) fn compile(model: &str, def: &ParamDef, value: &ParamValue) -> Result<Self> {
        match value {
            ParamValue::Scalar(v) => {
                def.check(model, *v)?;
                Ok(Self::Fixed(*v))
            }
            ParamValue::Array(values) => {
                values.iter().try_for_each(|v| def.check(model, *v))?;
                Ok(Self::Array(values.clone()))
            }
            ParamValue::Distribution(dist) => Ok(Self::Drawn(dist.sampler()?)),
        }
    }

    pub(crate) fn array_len(&self) -> Option<usize> {
        match self {
            Self::Array(values) => Some(values.len()),
            _ => None,
        }
    }

    pub(crate) fn is_random(&self) -> bool {
        matches!(self, Self::Drawn(_))
    }

    pub(crate) fn value_at<F>(
        &self,
        model: &str,
        def: &ParamDef,
        index: usize,
        rng: &mut Option<StdRng>,
        make_rng: &mut F,
    ) -> Result<f64>
    where
        F: FnMut() -> StdRng,
    {
        match self {
            Self::Fixed(v) => Ok(*v),
            Self::Array(values) => values.get(index).copied().ok_or_else(|| {
                CoreError::IndexOutOfRange {
                    index,
                    len: values.len(),
                }
                .into()
            }),
            Self::Drawn(sampler) => {
                let v = sampler.sample(rng.get_or_insert_with(&mut *make_rng));
                def.check(model, v)?;
                Ok(v)
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    def: ParamDef,
    source: ValueSource,
}

/// Concrete parameters of one connection
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedParams {
    pub weight: f64,
    /// Declared delay, not yet placed on the time grid
    pub delay: Time,
    pub receptor: usize,
    pub state: Vec<(&'static str, f64)>,
}

#[derive(Debug, Clone)]
pub struct ParamTemplate {
    model: String,
    synapse_id: SynapseId,
    continuous_delay: bool,
    weight: Slot,
    delay: Slot,
    receptor: Slot,
    state: Vec<Slot>,
}

impl ParamTemplate {
    pub fn compile(
        synapse_id: SynapseId,
        schema: &SynapseSchema,
        overrides: &BTreeMap<String, ParamValue>,
    ) -> Result<Self> {
        let model = schema.name.as_str();
        for name in overrides.keys() {
            match schema.param(name) {
                Some(def) if def.scope == ParamScope::Common => {
                    return Err(NestError::immutable(
                        model,
                        name.as_str(),
                        "common property, use set_model_default",
                    ))
                }
                Some(_) => {}
                None if name == VOLUME_TRANSMITTER && schema.requires_aux() => {
                    return Err(NestError::immutable(
                        model,
                        name.as_str(),
                        "common property, use set_model_default",
                    ))
                }
                None => return Err(NestError::unknown_parameter(model, name.as_str())),
            }
        }

        let mut weight = None;
        let mut delay = None;
        let mut receptor = None;
        let mut state = Vec::new();
        for def in &schema.params {
            let source = match overrides.get(def.name) {
                Some(value) => ValueSource::compile(model, def, value)?,
                None if def.scope == ParamScope::Common && def.name != WEIGHT => continue,
                None => ValueSource::Fixed(def.default),
            };
            let slot = Slot { def: *def, source };
            match def.name {
                WEIGHT => weight = Some(slot),
                DELAY => delay = Some(slot),
                RECEPTOR => receptor = Some(slot),
                _ => state.push(slot),
            }
        }

        let base = |slot: Option<Slot>, name: &str| {
            slot.ok_or_else(|| NestError::unknown_parameter(model, name))
        };
        Ok(Self {
            model: model.to_string(),
            synapse_id,
            continuous_delay: schema.continuous_delay,
            weight: base(weight, WEIGHT)?,
            delay: base(delay, DELAY)?,
            receptor: base(receptor, RECEPTOR)?,
            state,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn synapse_id(&self) -> SynapseId {
        self.synapse_id
    }

    pub fn continuous_delay(&self) -> bool {
        self.continuous_delay
    }

    fn slots(&self) -> impl Iterator<Item = &Slot> {
        [&self.weight, &self.delay, &self.receptor]
            .into_iter()
            .chain(self.state.iter())
    }

    /// Any parameter is drawn from a distribution
    pub fn is_random(&self) -> bool {
        self.slots().any(|s| s.source.is_random())
    }

    /// Array parameters must match the number of connections exactly
    pub fn check_lengths(&self, total: usize) -> Result<()> {
        for slot in self.slots() {
            if let Some(actual) = slot.source.array_len() {
                if actual != total {
                    return Err(NestError::LengthMismatch {
                        param: slot.def.name.to_string(),
                        expected: total,
                        actual,
                    });
                }
            }
        }
        Ok(())
    }

    /// Parameters of connection `index`
    ///
    /// `make_rng` is called at most once, on the first drawn parameter.
    /// Draws happen in schema order.
    pub fn resolve<F>(&self, index: usize, mut make_rng: F) -> Result<ResolvedParams>
    where
        F: FnMut() -> StdRng,
    {
        let mut rng = None;
        let mut value = |slot: &Slot| {
            slot.source
                .value_at(&self.model, &slot.def, index, &mut rng, &mut make_rng)
        };
        let weight = value(&self.weight)?;
        let delay = value(&self.delay)?;
        let receptor = value(&self.receptor)? as usize;
        let state = self
            .state
            .iter()
            .map(|slot| value(slot).map(|v| (slot.def.name, v)))
            .collect::<Result<Vec<_>>>()?;
        Ok(ResolvedParams {
            weight,
            delay,
            receptor,
            state,
        })
    }
}

/// Place a delay on the simulation grid
///
/// Delays shorter than one resolution step are rejected; continuous-delay
/// models keep the declared value.
pub fn snap_delay(delay: Time, resolution: Time, continuous: bool) -> Result<Time> {
    if !(delay > 0.0 && delay.is_finite()) {
        return Err(NestError::InvalidParameter(format!(
            "delay must be > 0, got {delay}"
        )));
    }
    if continuous {
        return Ok(delay);
    }
    // steps per ms is integral for the usual resolutions; dividing by it
    // lands on the same double as the decimal literal
    let per_ms = 1.0 / resolution;
    let steps = (delay * per_ms).round();
    if steps < 1.0 {
        return Err(NestError::InvalidParameter(format!(
            "delay {delay} ms is shorter than the resolution {resolution} ms"
        )));
    }
    Ok(steps / per_ms)
}
