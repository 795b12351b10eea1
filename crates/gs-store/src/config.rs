use std::path::PathBuf;

use gs_types::{config_error, GsResult};
use serde::{Deserialize, Serialize};

/// Environment variable that overrides the database path.
pub const DB_PATH_ENV: &str = "GRIDSWEEP_DB_PATH";

/// Default table holding sweep results.
pub const DEFAULT_TABLE: &str = "gridsearch_results";

/// Connection descriptor for a result store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database file; `None` opens a throwaway in-memory database.
    pub path: Option<PathBuf>,
    /// Table holding the results. Must be a plain SQL identifier.
    #[serde(default = "default_table")]
    pub table: String,
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gridsweep");

        Self {
            path: Some(data_dir.join("results.duckdb")),
            table: default_table(),
        }
    }
}

impl StoreConfig {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            table: default_table(),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            table: default_table(),
        }
    }

    /// Default config with the path taken from `GRIDSWEEP_DB_PATH` if set.
    pub fn from_env() -> Self {
        match std::env::var(DB_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::at(path),
            _ => Self::default(),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// The table name is spliced into SQL, so only `[A-Za-z_][A-Za-z0-9_]*`
    /// is accepted.
    pub fn validate(&self) -> GsResult<()> {
        let mut chars = self.table.chars();
        let valid = match chars.next() {
            Some(first) if first.is_ascii_alphabetic() || first == '_' => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            _ => false,
        };
        if !valid {
            return Err(config_error!("invalid table name: {:?}", self.table));
        }
        Ok(())
    }
}
