//! Run events and the handlers that observe them.
//!
//! The runner reports through [`RunEvent`] values borrowed from its own
//! state. [`RunEvent::Progress`] is the progress callback: it fires exactly
//! once per completed cell, in enumeration order, before the next cell
//! starts.
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or fire-and-forget runs |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnProgress`] | A closure over `(completed, total, result)` |
//! | [`CompositeHandler`] | Several handlers in order |

use crate::matrix::{Cell, CellResult, Experiment};
use tracing::{debug, info, warn};

/// Events emitted by [`MatrixRunner`](super::MatrixRunner) during a run.
#[derive(Debug, Clone, Copy)]
pub enum RunEvent<'a> {
    RunStarted {
        run_id: &'a str,
        output_type: &'a str,
        total: usize,
    },
    /// Cell `index` is about to be dispatched.
    CellStarted {
        index: usize,
        total: usize,
        cell: &'a Cell,
    },
    /// Cell `index` finished (complete or error).
    Progress {
        completed: usize,
        total: usize,
        index: usize,
        result: &'a CellResult,
    },
    /// Cell `index` was cancelled, in flight or before dispatch.
    CellCancelled { index: usize, cell: &'a Cell },
    RunFinished { experiment: &'a Experiment },
}

/// Observer of run events. All methods default to no-ops.
pub trait ProgressHandler: Send + Sync {
    fn on_event(&self, event: &RunEvent<'_>) {
        let _ = event;
    }
}

pub struct NoopHandler;
impl ProgressHandler for NoopHandler {}

/// Wraps a `Fn(completed, total, &CellResult)` closure; only
/// [`RunEvent::Progress`] reaches it.
///
/// ```ignore
/// let handler = FnProgress::new(|done, total, result| {
///     println!("{done}/{total} {}", result.config.label());
/// });
/// ```
pub struct FnProgress<F>(F)
where
    F: Fn(usize, usize, &CellResult) + Send + Sync;

impl<F> FnProgress<F>
where
    F: Fn(usize, usize, &CellResult) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> ProgressHandler for FnProgress<F>
where
    F: Fn(usize, usize, &CellResult) + Send + Sync,
{
    fn on_event(&self, event: &RunEvent<'_>) {
        if let RunEvent::Progress {
            completed,
            total,
            result,
            ..
        } = event
        {
            (self.0)(*completed, *total, result);
        }
    }
}

/// Dispatches every event to each inner handler in registration order.
pub struct CompositeHandler {
    handlers: Vec<Box<dyn ProgressHandler>>,
}

impl CompositeHandler {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn with(mut self, handler: impl ProgressHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Add a handler only when `condition` holds.
    pub fn with_if(self, condition: bool, handler: impl ProgressHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }
}

impl Default for CompositeHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressHandler for CompositeHandler {
    fn on_event(&self, event: &RunEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// Logs events via `tracing`.
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_event(&self, event: &RunEvent<'_>) {
        match event {
            RunEvent::RunStarted {
                run_id,
                output_type,
                total,
            } => {
                info!("Run {run_id} started: {total} cell(s), output type '{output_type}'");
            }
            RunEvent::CellStarted { index, total, cell } => {
                debug!("[cell {}/{}] {}", index + 1, total, cell.label());
            }
            RunEvent::Progress {
                completed,
                total,
                result,
                ..
            } => match &result.error {
                None => {
                    let score = result
                        .evaluation
                        .as_ref()
                        .map(|e| format!(", score {:.1}", e.ai.score))
                        .unwrap_or_default();
                    info!(
                        "[{completed}/{total}] {} complete ({} chars{score})",
                        result.config.label(),
                        result.blueprint_result.len()
                    );
                }
                Some(err) => {
                    warn!("[{completed}/{total}] {} failed: {err}", result.config.label());
                }
            },
            RunEvent::CellCancelled { index, cell } => {
                debug!("Cell {} ({}) cancelled", index + 1, cell.label());
            }
            RunEvent::RunFinished { experiment } => {
                info!(
                    "Run {} {:?}: {} complete, {} error, {} cancelled",
                    experiment.id,
                    experiment.status,
                    experiment.success_count,
                    experiment.error_count,
                    experiment.cancelled_count,
                );
                if let Some(failure) = &experiment.failure {
                    warn!("Run {} failed: {failure}", experiment.id);
                }
            }
        }
    }
}
