//! The run controller: expand, dispatch cells in order, report, persist.

use super::events::{NoopHandler, ProgressHandler, RunEvent};
use super::executor::CellExecutor;
use crate::api::{cell_id, generate_run_id};
use crate::assembler::{Assembler, DescriptorCatalog, PromptPlan};
use crate::config::{EngineConfig, RunRequest};
use crate::error::{AssemblyError, PersistenceError, SpecError};
use crate::matrix::{Cell, CellResult, CellStatus, RunState, expand};
use crate::model::ModelCaller;
use crate::spec::PromptSpecRegistry;
use crate::store::{NoopStore, Store, StoreFuture};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Runs experiment matrices against a spec registry.
///
/// Collaborators are borrowed, so they must outlive the runner:
///
/// ```ignore
/// let store = MemoryStore::new();
/// let runner = MatrixRunner::new(&registry, &caller)
///     .with_progress_handler(&LoggingHandler)
///     .with_store(&store);
/// let state = runner.run(&request, &CancellationToken::new()).await?;
/// ```
pub struct MatrixRunner<'a> {
    registry: &'a PromptSpecRegistry,
    caller: &'a dyn ModelCaller,
    judge_caller: Option<&'a dyn ModelCaller>,
    handler: &'a dyn ProgressHandler,
    store: &'a dyn Store,
    config: EngineConfig,
    catalog: DescriptorCatalog,
}

impl<'a> MatrixRunner<'a> {
    pub fn new(registry: &'a PromptSpecRegistry, caller: &'a dyn ModelCaller) -> Self {
        Self {
            registry,
            caller,
            judge_caller: None,
            handler: &NoopHandler,
            store: &NoopStore,
            config: EngineConfig::default(),
            catalog: DescriptorCatalog::builtin(),
        }
    }

    /// Use a separate collaborator for judge calls.
    pub fn with_judge_caller(mut self, caller: &'a dyn ModelCaller) -> Self {
        self.judge_caller = Some(caller);
        self
    }

    pub fn with_progress_handler(mut self, handler: &'a dyn ProgressHandler) -> Self {
        self.handler = handler;
        self
    }

    pub fn with_store(mut self, store: &'a dyn Store) -> Self {
        self.store = store;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the base descriptor catalog. Request descriptors still
    /// merge on top.
    pub fn with_catalog(mut self, catalog: DescriptorCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Assemble every cell's prompts without calling any model.
    pub fn plan(
        &self,
        request: &RunRequest,
    ) -> Result<Vec<(Cell, Result<PromptPlan, AssemblyError>)>, SpecError> {
        let spec = self.registry.get(&request.inputs.output_type)?;
        let assembler = Assembler::new(self.registry, self.catalog.clone().merged_with(&request.descriptors));
        Ok(expand(&request.axes)
            .cells
            .into_iter()
            .map(|cell| {
                let plan = assembler.assemble(spec, &cell, &request.inputs);
                (cell, plan)
            })
            .collect())
    }

    /// Run every cell of `request` in enumeration order.
    ///
    /// Only an unknown output type fails the call. Every other failure is
    /// recorded on its cell, and the returned state always holds one result
    /// per cell.
    pub async fn run(
        &self,
        request: &RunRequest,
        cancel: &CancellationToken,
    ) -> Result<RunState, SpecError> {
        let spec = self.registry.get(&request.inputs.output_type)?;
        let expansion = expand(&request.axes);
        let total = expansion.total;

        let mut state = RunState::new(generate_run_id(), spec.id.clone(), expansion.cells);
        let created = self
            .persist("create_run", self.store.create_run(&state.experiment), Some(cancel))
            .await;
        // Fall back to the local id when the store is unavailable.
        if let Some(id) = created {
            state.experiment.id = id;
        }
        let run_id = state.experiment.id.clone();

        self.handler.on_event(&RunEvent::RunStarted {
            run_id: &run_id,
            output_type: &spec.id,
            total,
        });

        let assembler = Assembler::new(self.registry, self.catalog.clone().merged_with(&request.descriptors));
        let executor = CellExecutor::new(assembler, spec, request, &self.config, self.caller)
            .with_judge_caller(self.judge_caller.unwrap_or(self.caller));

        let mut failure = None;
        for index in 0..total {
            if cancel.is_cancelled() {
                info!("Run {run_id} cancelled before cell {}", index + 1);
                self.cancel_remaining(&mut state, index);
                break;
            }

            state.begin(index);
            let cell = state.results()[index].config.clone();
            debug!("Dispatching {} ({})", cell_id(&run_id, index), cell.label());
            self.handler.on_event(&RunEvent::CellStarted {
                index,
                total,
                cell: &cell,
            });

            let outcome = AssertUnwindSafe(executor.run(&cell, cancel))
                .catch_unwind()
                .await;
            match outcome {
                Ok(result) if result.status == CellStatus::Cancelled => {
                    state.complete(index, result);
                    self.handler.on_event(&RunEvent::CellCancelled { index, cell: &cell });
                }
                Ok(result) => {
                    state.complete(index, result);
                    self.report(&state, index, cancel).await;
                }
                Err(payload) => {
                    let message = format!("cell executor panicked: {}", panic_message(&*payload));
                    warn!("{message}");
                    let errored = CellResult {
                        status: CellStatus::Error,
                        error: Some(message.clone()),
                        ..CellResult::pending(cell)
                    };
                    state.complete(index, errored);
                    self.report(&state, index, cancel).await;
                    self.cancel_remaining(&mut state, index + 1);
                    failure = Some(message);
                    break;
                }
            }
        }

        match failure {
            Some(message) => state.finalize_failed(message),
            None => state.finalize_complete(),
        }
        self.handler.on_event(&RunEvent::RunFinished {
            experiment: &state.experiment,
        });
        // Not tied to the token: a cancelled run still records its final state.
        self.persist("finalize_run", self.store.finalize_run(&state.experiment), None)
            .await;
        Ok(state)
    }

    /// Fire the progress event for a finished cell, then forward it to the
    /// store.
    async fn report(&self, state: &RunState, index: usize, cancel: &CancellationToken) {
        let result = &state.results()[index];
        self.handler.on_event(&RunEvent::Progress {
            completed: state.experiment.completed_cells,
            total: state.experiment.total_cells,
            index,
            result,
        });
        let run_id = &state.experiment.id;
        self.persist(
            "record_cell_result",
            self.store.record_cell_result(run_id, index, result),
            Some(cancel),
        )
        .await;
        self.persist(
            "update_run_progress",
            self.store.update_run_progress(&state.experiment),
            Some(cancel),
        )
        .await;
    }

    fn cancel_remaining(&self, state: &mut RunState, from: usize) {
        let n = state.cancel_from(from);
        if n == 0 {
            return;
        }
        debug!("Cancelled {n} undispatched cell(s)");
        for (offset, result) in state.results().iter().enumerate().skip(from) {
            if result.status == CellStatus::Cancelled {
                self.handler.on_event(&RunEvent::CellCancelled {
                    index: offset,
                    cell: &result.config,
                });
            }
        }
    }

    /// Await a store call under the configured timeout. Failures are logged.
    ///
    /// With a token, a write still pending when the token fires is
    /// abandoned; a write that is already ready completes first.
    async fn persist<T>(
        &self,
        what: &str,
        call: StoreFuture<'_, T>,
        cancel: Option<&CancellationToken>,
    ) -> Option<T> {
        let limit = self.config.store_timeout;
        let bounded = tokio::time::timeout(limit, call);
        let outcome = match cancel {
            Some(token) => tokio::select! {
                biased;
                r = bounded => r,
                _ = token.cancelled() => {
                    warn!("Persistence {what} abandoned: run cancelled");
                    return None;
                }
            },
            None => bounded.await,
        };
        let err = match outcome {
            Ok(Ok(v)) => return Some(v),
            Ok(Err(e)) => e,
            Err(_) => PersistenceError::Timeout(limit),
        };
        warn!("Persistence {what} failed: {err}");
        None
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
