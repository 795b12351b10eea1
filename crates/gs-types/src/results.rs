//! Evaluation results and per-configuration lifecycle tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::configuration::Configuration;

/// One recorded (configuration, score) row. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Store-assigned identity; doubles as the insertion sequence number.
    pub id: i64,
    pub configuration: Configuration,
    pub score: f64,
    pub recorded_at: DateTime<Utc>,
}

impl EvaluationResult {
    pub fn key(&self) -> String {
        self.configuration.canonical_key()
    }

    /// Ordering used to pick the best result: higher score wins, ties go to
    /// the earlier insertion.
    pub fn beats(&self, other: &EvaluationResult) -> bool {
        self.score > other.score || (self.score == other.score && self.id < other.id)
    }
}

/// Lifecycle state of a single configuration within a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvaluationState {
    Pending,
    Evaluating,
    Recorded,
    Failed,
}

/// Tracks one configuration as it moves through a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationRun {
    pub configuration: Configuration,
    pub state: EvaluationState,
    pub attempts: u32,
    pub score: Option<f64>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ConfigurationRun {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            configuration,
            state: EvaluationState::Pending,
            attempts: 0,
            score: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn mark_evaluating(&mut self) {
        self.state = EvaluationState::Evaluating;
        self.attempts += 1;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
    }

    pub fn mark_recorded(&mut self, score: f64) {
        self.state = EvaluationState::Recorded;
        self.score = Some(score);
        self.error = None;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.state = EvaluationState::Failed;
        self.error = Some(error);
        self.finished_at = Some(Utc::now());
    }
}
