//! Best-effort persistence of runs.
//!
//! The runner forwards run creation, each finished cell, progress counters
//! and the final experiment to a [`Store`]. Every call is bounded by
//! [`EngineConfig::store_timeout`](crate::config::EngineConfig) and any
//! failure is logged and dropped; persistence never changes a run's
//! outcome.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::{MemoryStore, StoredRun};

use crate::error::PersistenceError;
use crate::matrix::{CellResult, Experiment};
use std::future::Future;
use std::pin::Pin;

/// Future returned by [`Store`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, PersistenceError>> + Send + 'a>>;

/// Persistence collaborator.
pub trait Store: Send + Sync {
    /// Register a new run. Returns the id the run should be recorded
    /// under, which may differ from `experiment.id`.
    fn create_run<'a>(&'a self, experiment: &'a Experiment) -> StoreFuture<'a, String>;

    /// Record the final result of cell `index`.
    fn record_cell_result<'a>(
        &'a self,
        run_id: &'a str,
        index: usize,
        result: &'a CellResult,
    ) -> StoreFuture<'a, ()>;

    /// Record updated counters.
    fn update_run_progress<'a>(&'a self, experiment: &'a Experiment) -> StoreFuture<'a, ()>;

    /// Record the finalized experiment.
    fn finalize_run<'a>(&'a self, experiment: &'a Experiment) -> StoreFuture<'a, ()>;
}

/// Persists nothing.
pub struct NoopStore;

impl Store for NoopStore {
    fn create_run<'a>(&'a self, experiment: &'a Experiment) -> StoreFuture<'a, String> {
        Box::pin(async move { Ok(experiment.id.clone()) })
    }

    fn record_cell_result<'a>(
        &'a self,
        _run_id: &'a str,
        _index: usize,
        _result: &'a CellResult,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }

    fn update_run_progress<'a>(&'a self, _experiment: &'a Experiment) -> StoreFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }

    fn finalize_run<'a>(&'a self, _experiment: &'a Experiment) -> StoreFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }
}
