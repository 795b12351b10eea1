//! # gs-store
//!
//! Durable persistence of sweep results. Every backend keeps at most one row
//! per canonical configuration key and commits each write before returning,
//! so a sweep can be interrupted at any point and resumed later.

pub mod config;
pub mod duckdb_store;
pub mod memory;

pub use config::*;
pub use duckdb_store::DuckDbResultStore;
pub use memory::MemoryResultStore;

use std::collections::HashSet;

use gs_types::{validation_error, Configuration, EvaluationResult, GsResult};

/// Persistence and lookup of evaluation results.
pub trait ResultStore: Send + Sync {
    /// Create the backing structure if it is missing. Idempotent.
    fn ensure_schema(&self) -> GsResult<()>;

    /// Snapshot of every canonical key recorded so far.
    fn load_evaluated_keys(&self) -> GsResult<HashSet<String>>;

    /// Persist one result.
    ///
    /// Fails with `StoreError::DuplicateKey` when the configuration is already
    /// present; callers treat that as "already done". Non-finite scores and
    /// parameter values are refused with a validation error.
    fn record(&self, configuration: &Configuration, score: f64) -> GsResult<EvaluationResult>;

    /// Highest-scoring result, ties broken by lowest id. Fails with
    /// `StoreError::EmptyStore` when nothing has been recorded.
    fn best_result(&self) -> GsResult<EvaluationResult>;

    /// Number of recorded results.
    fn count(&self) -> GsResult<usize>;

    /// All recorded results in insertion order.
    fn results(&self) -> GsResult<Vec<EvaluationResult>>;
}

/// Shared precondition for `ResultStore::record`: only finite scores and
/// finite parameter values can be ranked and keyed.
pub(crate) fn check_record(configuration: &Configuration, score: f64) -> GsResult<()> {
    if !score.is_finite() {
        return Err(validation_error!(
            "refusing to record non-finite score {score} for {configuration}"
        ));
    }
    configuration.ensure_finite()
}
