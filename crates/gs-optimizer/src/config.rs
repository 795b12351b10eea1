//! Sweep configuration.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use gs_store::StoreConfig;
use gs_types::{config_error, GsResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::evaluator::DEFAULT_SEED;
use crate::space::ParameterGrid;

/// Unique sweep identifier.
pub type SweepId = Uuid;

/// Top-level configuration for one sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "Uuid::new_v4")]
    pub id: SweepId,
    pub name: String,

    /// The parameter grid to enumerate.
    pub grid: ParameterGrid,

    /// Seed handed to every scorer call.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// How many evaluations may run at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Wall-clock limit for a single evaluation, in seconds.
    #[serde(default, with = "duration_secs")]
    pub per_evaluation_timeout: Option<Duration>,

    /// Attempts per configuration before it is marked failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "StoreConfig::from_env")]
    pub store: StoreConfig,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

fn default_concurrency() -> usize {
    1
}

fn default_max_attempts() -> u32 {
    1
}

impl SweepConfig {
    pub fn new(name: impl Into<String>, grid: ParameterGrid) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            grid,
            seed: default_seed(),
            concurrency: default_concurrency(),
            per_evaluation_timeout: None,
            max_attempts: default_max_attempts(),
            store: StoreConfig::from_env(),
            created_at: Utc::now(),
        }
    }

    /// Load a sweep config from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> GsResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.per_evaluation_timeout = Some(timeout);
        self
    }

    pub fn with_max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    pub fn validate(&self) -> GsResult<()> {
        if self.concurrency == 0 {
            return Err(config_error!("concurrency must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(config_error!("max_attempts must be at least 1"));
        }
        if self.per_evaluation_timeout == Some(Duration::ZERO) {
            return Err(config_error!("per_evaluation_timeout must be positive"));
        }
        self.grid.ensure_finite()?;
        self.store.validate()
    }
}

/// `Option<Duration>` as fractional seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs: Option<f64> = Option::deserialize(d)?;
        secs.map(|s| Duration::try_from_secs_f64(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
