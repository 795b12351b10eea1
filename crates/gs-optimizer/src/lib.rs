//! # gs-optimizer
//!
//! Exhaustive parameter sweeps with persistent, resumable result caching.
//!
//! A [`ParameterGrid`] enumerates configurations deterministically, an
//! [`Evaluator`] scores them, and the [`SweepController`] records every score
//! in a [`gs_store::ResultStore`] so a restarted sweep only evaluates what is
//! still missing.

mod config;
mod evaluator;
mod space;
mod sweep;

pub use config::{SweepConfig, SweepId};
pub use evaluator::{CrossValidation, Dataset, Evaluator, Fold, KFold, Scorer, DEFAULT_SEED};
pub use space::{ConfigurationIter, ParameterAxis, ParameterGrid};
pub use sweep::{run_sweep, FailedEvaluation, SweepController, SweepReport, SweepState};

use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
