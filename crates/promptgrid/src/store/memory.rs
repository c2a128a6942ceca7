use super::{Store, StoreFuture};
use crate::error::PersistenceError;
use crate::matrix::{CellResult, Experiment};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Everything recorded for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRun {
    pub experiment: Experiment,
    /// Cell index -> last recorded result.
    pub cells: BTreeMap<usize, CellResult>,
    /// How many progress updates were received.
    pub progress_updates: usize,
    pub finalized: bool,
}

/// In-process store, mostly for tests and inspection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    runs: Mutex<BTreeMap<String, StoredRun>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one run.
    pub fn run(&self, run_id: &str) -> Option<StoredRun> {
        self.lock().ok()?.get(run_id).cloned()
    }

    pub fn run_ids(&self) -> Vec<String> {
        self.lock()
            .map(|runs| runs.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, StoredRun>>, PersistenceError> {
        self.runs
            .lock()
            .map_err(|_| PersistenceError::Other("memory store lock poisoned".into()))
    }

    fn with_run<T>(
        &self,
        run_id: &str,
        f: impl FnOnce(&mut StoredRun) -> T,
    ) -> Result<T, PersistenceError> {
        let mut runs = self.lock()?;
        let run = runs
            .get_mut(run_id)
            .ok_or_else(|| PersistenceError::UnknownRun(run_id.to_string()))?;
        Ok(f(run))
    }
}

impl Store for MemoryStore {
    fn create_run<'a>(&'a self, experiment: &'a Experiment) -> StoreFuture<'a, String> {
        Box::pin(async move {
            let mut runs = self.lock()?;
            runs.insert(
                experiment.id.clone(),
                StoredRun {
                    experiment: experiment.clone(),
                    cells: BTreeMap::new(),
                    progress_updates: 0,
                    finalized: false,
                },
            );
            Ok(experiment.id.clone())
        })
    }

    fn record_cell_result<'a>(
        &'a self,
        run_id: &'a str,
        index: usize,
        result: &'a CellResult,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.with_run(run_id, |run| {
                run.cells.insert(index, result.clone());
            })
        })
    }

    fn update_run_progress<'a>(&'a self, experiment: &'a Experiment) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.with_run(&experiment.id, |run| {
                run.experiment = experiment.clone();
                run.progress_updates += 1;
            })
        })
    }

    fn finalize_run<'a>(&'a self, experiment: &'a Experiment) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.with_run(&experiment.id, |run| {
                run.experiment = experiment.clone();
                run.finalized = true;
            })
        })
    }
}
