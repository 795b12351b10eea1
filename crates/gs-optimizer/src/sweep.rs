//! Resumable sweep orchestration.
//!
//! A sweep snapshots the keys already in the store, enumerates the grid, and
//! evaluates only what is missing. Each result is committed as soon as it is
//! known, so an interrupted sweep resumes where it stopped.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use gs_store::{DuckDbResultStore, ResultStore};
use gs_types::{
    Configuration, ConfigurationRun, EvaluationError, EvaluationResult, GsError, GsResult,
};
use serde::{Deserialize, Serialize};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task::{self, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::{SweepConfig, SweepId};
use crate::evaluator::{Evaluator, Scorer};
use crate::space::ParameterGrid;

/// Sweep-level lifecycle. An interrupted sweep never reaches `Completed`; its
/// unevaluated configurations simply stay pending for the next run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepState {
    Running,
    Completed,
}

/// A configuration that could not be scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedEvaluation {
    pub configuration: Configuration,
    pub error: String,
    pub attempts: u32,
}

/// Summary of one sweep run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub sweep_id: SweepId,
    pub state: SweepState,
    /// Configurations enumerated from the grid.
    pub total: usize,
    /// Skipped because the store already had them.
    pub skipped: usize,
    /// Scorer invocations, retries included.
    pub evaluations: usize,
    /// Rows written by this run.
    pub recorded: usize,
    /// Scored, but another writer recorded them first.
    pub duplicates: usize,
    pub failures: Vec<FailedEvaluation>,
    /// Best result in the store after the run, `None` if the store is empty.
    pub best: Option<EvaluationResult>,
    pub runs: Vec<ConfigurationRun>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SweepReport {
    fn new(sweep_id: SweepId) -> Self {
        Self {
            sweep_id,
            state: SweepState::Running,
            total: 0,
            skipped: 0,
            evaluations: 0,
            recorded: 0,
            duplicates: 0,
            failures: Vec::new(),
            best: None,
            runs: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    fn mark_completed(&mut self) {
        self.state = SweepState::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }
}

/// Drives a sweep over a grid against a result store.
#[derive(Debug)]
pub struct SweepController<D> {
    id: SweepId,
    grid: ParameterGrid,
    evaluator: Evaluator<D>,
    concurrency: usize,
    max_attempts: u32,
}

impl<D: Send + Sync + 'static> SweepController<D> {
    /// Build a controller; the config's seed and timeout override whatever
    /// the evaluator carried.
    pub fn new(config: &SweepConfig, evaluator: Evaluator<D>) -> GsResult<Self> {
        config.validate()?;
        Ok(Self {
            id: config.id,
            grid: config.grid.clone(),
            evaluator: evaluator
                .with_seed(config.seed)
                .with_timeout(config.per_evaluation_timeout),
            concurrency: config.concurrency,
            max_attempts: config.max_attempts,
        })
    }

    pub fn grid(&self) -> &ParameterGrid {
        &self.grid
    }

    /// Run the sweep to completion.
    ///
    /// Store failures abort with an error; evaluation failures are logged,
    /// collected in the report and do not stop the sweep.
    pub async fn run<S: ResultStore>(&self, store: &S) -> GsResult<SweepReport> {
        let mut report = SweepReport::new(self.id);

        blocking(|| store.ensure_schema())?;
        let mut seen: HashSet<String> = blocking(|| store.load_evaluated_keys())?;
        info!(
            "Starting sweep {}: {} configurations in grid, {} already recorded",
            self.id,
            self.grid.size().map_or_else(|| "?".to_string(), |n| n.to_string()),
            seen.len()
        );

        let mut pending = self.grid.iter();
        let mut in_flight: JoinSet<(usize, Result<f64, EvaluationError>)> = JoinSet::new();

        loop {
            while in_flight.len() < self.concurrency {
                let Some(configuration) = pending.next() else {
                    break;
                };
                report.total += 1;

                // Claim the key now so logical duplicates later in the grid are
                // not dispatched while this one is still running.
                if !seen.insert(configuration.canonical_key()) {
                    debug!("Skipping already evaluated configuration {}", configuration);
                    report.skipped += 1;
                    continue;
                }

                let slot = report.runs.len();
                report.runs.push(ConfigurationRun::new(configuration));
                self.dispatch(&mut in_flight, &mut report, slot);
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            let (slot, outcome) = joined
                .map_err(|e| GsError::Internal(format!("evaluation task failed to join: {e}")))?;

            match outcome {
                Ok(score) => self.persist(store, &mut report, slot, score)?,
                Err(e) => {
                    let run = &mut report.runs[slot];
                    if run.attempts < self.max_attempts {
                        warn!(
                            "Evaluation of {} failed (attempt {}/{}): {}; retrying",
                            run.configuration, run.attempts, self.max_attempts, e
                        );
                        self.dispatch(&mut in_flight, &mut report, slot);
                    } else {
                        error!("Evaluation of {} failed: {}", run.configuration, e);
                        run.mark_failed(e.to_string());
                        report.failures.push(FailedEvaluation {
                            configuration: run.configuration.clone(),
                            error: e.to_string(),
                            attempts: run.attempts,
                        });
                    }
                }
            }
        }

        report.best = match blocking(|| store.best_result()) {
            Ok(best) => {
                info!(
                    "Best parameters: {}, Best score: {}",
                    best.configuration, best.score
                );
                Some(best)
            }
            Err(e) if e.is_empty_store() => {
                warn!("Sweep {} finished with no recorded results", self.id);
                None
            }
            Err(e) => return Err(e),
        };

        report.mark_completed();
        info!(
            "Sweep {} completed: {} evaluated, {} recorded, {} skipped, {} failed",
            self.id,
            report.evaluations,
            report.recorded,
            report.skipped,
            report.failed_count()
        );
        Ok(report)
    }

    fn dispatch(
        &self,
        in_flight: &mut JoinSet<(usize, Result<f64, EvaluationError>)>,
        report: &mut SweepReport,
        slot: usize,
    ) {
        let run = &mut report.runs[slot];
        run.mark_evaluating();
        report.evaluations += 1;

        let evaluator = self.evaluator.clone();
        let configuration = run.configuration.clone();
        in_flight.spawn(async move { (slot, evaluator.evaluate_bounded(configuration).await) });
    }

    fn persist<S: ResultStore>(
        &self,
        store: &S,
        report: &mut SweepReport,
        slot: usize,
        score: f64,
    ) -> GsResult<()> {
        let run = &mut report.runs[slot];
        info!("Evaluated: {}, Score: {}", run.configuration, score);

        match blocking(|| store.record(&run.configuration, score)) {
            Ok(_) => report.recorded += 1,
            Err(e) if e.is_duplicate_key() => {
                debug!(
                    "{} was recorded by another writer; keeping the stored score",
                    run.configuration
                );
                report.duplicates += 1;
            }
            Err(e) => {
                error!("Failed to record {}: {}", run.configuration, e);
                return Err(e);
            }
        }
        run.mark_recorded(score);
        Ok(())
    }
}

/// Run a synchronous store call without stalling the other tasks on this
/// worker. `block_in_place` needs the multi-threaded runtime; elsewhere the
/// call runs inline.
fn blocking<T>(call: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if matches!(handle.runtime_flavor(), RuntimeFlavor::MultiThread) => {
            task::block_in_place(call)
        }
        _ => call(),
    }
}

/// Open the store from `config`, run the sweep, and close the store on every
/// exit path.
pub async fn run_sweep<D, Sc>(config: &SweepConfig, scorer: Sc, dataset: D) -> GsResult<SweepReport>
where
    D: Send + Sync + 'static,
    Sc: Scorer<D> + 'static,
{
    let controller = SweepController::new(config, Evaluator::new(scorer, dataset))?;
    let store = DuckDbResultStore::open(&config.store)?;

    let outcome = controller.run(&store).await;
    let closed = store.close();

    let report = outcome?;
    closed?;
    Ok(report)
}
