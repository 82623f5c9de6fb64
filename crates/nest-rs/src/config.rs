//! Kernel configuration
//!
//! Loaded from TOML, then overridden by `NESTCONN_*` environment variables:
//!
//! ```toml
//! threads = 4
//! rng_seed = 42
//! resolution = 0.1
//! verbosity = "M_INFO"
//! ```

use crate::error::{NestError, Result};
use log::LevelFilter;
use nestconn_core::Time;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

pub const ENV_THREADS: &str = "NESTCONN_THREADS";
pub const ENV_SEED: &str = "NESTCONN_SEED";
pub const ENV_RESOLUTION: &str = "NESTCONN_RESOLUTION";
pub const ENV_VERBOSITY: &str = "NESTCONN_VERBOSITY";

/// NEST message levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verbosity {
    #[serde(rename = "M_ALL")]
    All,
    #[serde(rename = "M_DEBUG")]
    Debug,
    #[serde(rename = "M_INFO")]
    Info,
    #[serde(rename = "M_WARNING")]
    Warning,
    #[serde(rename = "M_ERROR")]
    Error,
    #[serde(rename = "M_QUIET")]
    Quiet,
}

impl Verbosity {
    pub fn level_filter(&self) -> LevelFilter {
        match self {
            Self::All => LevelFilter::Trace,
            Self::Debug => LevelFilter::Debug,
            Self::Info => LevelFilter::Info,
            Self::Warning => LevelFilter::Warn,
            Self::Error => LevelFilter::Error,
            Self::Quiet => LevelFilter::Off,
        }
    }
}

impl FromStr for Verbosity {
    type Err = NestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().trim_start_matches("M_") {
            "ALL" => Ok(Self::All),
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARNING" | "WARN" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            "QUIET" => Ok(Self::Quiet),
            other => Err(NestError::Config(format!("unknown verbosity '{other}'"))),
        }
    }
}

/// Kernel settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KernelConfig {
    /// Worker threads (connection partitions)
    pub threads: usize,
    pub rng_seed: u64,
    /// Time step (ms); delays are rounded to multiples of it
    pub resolution: Time,
    pub verbosity: Verbosity,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            rng_seed: 12345,
            resolution: 0.1,
            verbosity: Verbosity::Warning,
        }
    }
}

impl KernelConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| NestError::Config(format!("invalid kernel config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NestError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| NestError::Config(format!("cannot serialize kernel config: {e}")))
    }

    /// Apply `NESTCONN_*` variables from the process environment
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T> {
            raw.trim()
                .parse()
                .map_err(|_| NestError::Config(format!("{key}: cannot parse '{raw}'")))
        }
        if let Some(raw) = lookup(ENV_THREADS) {
            self.threads = parse(ENV_THREADS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_SEED) {
            self.rng_seed = parse(ENV_SEED, &raw)?;
        }
        if let Some(raw) = lookup(ENV_RESOLUTION) {
            self.resolution = parse(ENV_RESOLUTION, &raw)?;
        }
        if let Some(raw) = lookup(ENV_VERBOSITY) {
            self.verbosity = raw.parse()?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(NestError::Config("threads must be >= 1".into()));
        }
        if !(self.resolution > 0.0 && self.resolution.is_finite()) {
            return Err(NestError::Config(format!(
                "resolution must be > 0, got {}",
                self.resolution
            )));
        }
        Ok(())
    }
}
