//! Cell results, the experiment record, and the run state that owns both.
//!
//! [`RunState`] is written only by the run controller. Observers see it
//! through progress events or a cloned [`RunState::snapshot`].

use super::axes::Cell;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Per-cell lifecycle. Transitions only move forward:
/// `pending -> running -> {complete, error, cancelled}`, plus
/// `pending -> cancelled` for cells never dispatched.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CellStatus {
    Pending,
    Running,
    Complete,
    Error,
    Cancelled,
}

impl CellStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error | Self::Cancelled)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_become(self, next: CellStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Running | Self::Cancelled) => true,
            (Self::Running, next) => next.is_terminal(),
            _ => false,
        }
    }
}

/// Judge verdict attached to a cell.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AiEvaluation {
    /// Score in `[0, 10]`.
    pub score: f64,
    pub critique: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub ai: AiEvaluation,
}

/// Outcome of one cell. Exactly one exists per cell for the whole run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CellResult {
    pub config: Cell,
    pub status: CellStatus,
    pub blueprint_result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_reply: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Evaluation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl CellResult {
    pub fn pending(config: Cell) -> Self {
        Self {
            config,
            status: CellStatus::Pending,
            blueprint_result: String::new(),
            raw_reply: None,
            execution_result: None,
            execution_model_id: None,
            execution_error: None,
            judge_model_id: None,
            evaluation: None,
            error: None,
            duration_ms: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == CellStatus::Complete
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentStatus {
    Running,
    Complete,
    Failed,
}

/// Run-level record, persisted incrementally through the store.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Experiment {
    pub id: String,
    pub output_type: String,
    pub status: ExperimentStatus,
    pub total_cells: usize,
    pub completed_cells: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub cancelled_count: usize,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// Experiment plus its fixed-length cell result array.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RunState {
    pub experiment: Experiment,
    results: Box<[CellResult]>,
}

impl RunState {
    /// All cells start `pending`; the array length never changes afterwards.
    pub fn new(id: impl Into<String>, output_type: impl Into<String>, cells: Vec<Cell>) -> Self {
        let results: Box<[CellResult]> = cells.into_iter().map(CellResult::pending).collect();
        Self {
            experiment: Experiment {
                id: id.into(),
                output_type: output_type.into(),
                status: ExperimentStatus::Running,
                total_cells: results.len(),
                completed_cells: 0,
                success_count: 0,
                error_count: 0,
                cancelled_count: 0,
                created_at: Utc::now(),
                completed_at: None,
                failure: None,
            },
            results,
        }
    }

    pub fn results(&self) -> &[CellResult] {
        &self.results
    }

    pub fn result(&self, index: usize) -> Option<&CellResult> {
        self.results.get(index)
    }

    pub fn into_results(self) -> Vec<CellResult> {
        self.results.into_vec()
    }

    pub fn snapshot(&self) -> RunState {
        self.clone()
    }

    /// Mark cell `index` as running.
    pub(crate) fn begin(&mut self, index: usize) {
        self.transition(index, CellStatus::Running);
    }

    /// Overwrite cell `index` with its executor outcome and count it.
    ///
    /// The outcome must already carry a terminal status. Returns the stored
    /// result.
    pub(crate) fn complete(&mut self, index: usize, outcome: CellResult) -> &CellResult {
        let status = outcome.status;
        let current = self.results[index].status;
        if current.can_become(status) {
            self.results[index] = outcome;
            if status != CellStatus::Cancelled {
                self.experiment.completed_cells =
                    (self.experiment.completed_cells + 1).min(self.experiment.total_cells);
            }
        } else {
            warn!("Ignoring illegal cell transition {current:?} -> {status:?} at index {index}");
        }
        &self.results[index]
    }

    /// Cancel every cell from `from` on that has not reached a terminal
    /// state. Returns how many were cancelled.
    pub(crate) fn cancel_from(&mut self, from: usize) -> usize {
        let mut cancelled = 0;
        for result in self.results.iter_mut().skip(from) {
            if result.status.can_become(CellStatus::Cancelled) {
                result.status = CellStatus::Cancelled;
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Finalize as `complete` with aggregated counts.
    pub(crate) fn finalize_complete(&mut self) {
        self.finalize(ExperimentStatus::Complete, None);
    }

    /// Finalize as `failed` with the triggering message.
    pub(crate) fn finalize_failed(&mut self, message: impl Into<String>) {
        self.finalize(ExperimentStatus::Failed, Some(message.into()));
    }

    fn finalize(&mut self, status: ExperimentStatus, failure: Option<String>) {
        if self.experiment.status != ExperimentStatus::Running {
            warn!("Experiment {} already finalized", self.experiment.id);
            return;
        }
        let count = |s: CellStatus| self.results.iter().filter(|r| r.status == s).count();
        self.experiment.success_count = count(CellStatus::Complete);
        self.experiment.error_count = count(CellStatus::Error);
        self.experiment.cancelled_count = count(CellStatus::Cancelled);
        self.experiment.status = status;
        self.experiment.failure = failure;
        self.experiment.completed_at = Some(Utc::now());
    }

    fn transition(&mut self, index: usize, next: CellStatus) {
        let result = &mut self.results[index];
        if result.status.can_become(next) {
            result.status = next;
        } else {
            warn!(
                "Ignoring illegal cell transition {:?} -> {next:?} at index {index}",
                result.status
            );
        }
    }
}
