//! End-to-end runs of the matrix controller against scripted collaborators.

use promptgrid::api::RetryConfig;
use promptgrid::api::retry::retry_cancellable;
use promptgrid::error::PersistenceError;
use promptgrid::prelude::*;
use promptgrid::store::StoreFuture;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Scripted collaborators ─────────────────────────────────────────

type Script = dyn Fn(usize, &ModelRequest) -> Result<Value, ProviderError> + Send + Sync;

/// Answers each call from a closure over `(call_index, request)` and
/// records every request it sees.
struct ScriptedCaller {
    script: Box<Script>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedCaller {
    fn new(
        script: impl Fn(usize, &ModelRequest) -> Result<Value, ProviderError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn answering(reply: Value) -> Self {
        Self::new(move |_, _| Ok(reply.clone()))
    }

    fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn models(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.model_id.clone())
            .collect()
    }
}

impl ModelCaller for ScriptedCaller {
    fn call<'a>(&'a self, request: ModelRequest, cancel: &'a CancellationToken) -> ModelFuture<'a> {
        Box::pin(async move {
            if cancel.is_cancelled() {
                return Err(ProviderError::Cancelled);
            }
            let index = {
                let mut requests = self.requests.lock().unwrap();
                requests.push(request.clone());
                requests.len() - 1
            };
            (self.script)(index, &request)
        })
    }
}

fn blueprint(text: &str) -> Value {
    json!({
        "analysis": {"audience": "customers"},
        "reverse_prompting": {"ideal_answer": "..."},
        "final_output": {"expanded_prompt_text": text}
    })
}

fn request(tones: &[&str], lengths: &[&str], formats: &[&str]) -> RunRequest {
    RunRequest {
        inputs: GlobalInputs {
            brief: "Announce our new budgeting app to existing customers.".into(),
            output_type: "copy".into(),
            ..Default::default()
        },
        axes: AxisSelection::new(
            tones.iter().copied(),
            lengths.iter().copied(),
            formats.iter().copied(),
        ),
        models: RunModels {
            execution_model_id: "openai/gpt-4o".into(),
            api_keys: BTreeMap::from([("default".to_string(), "sk-test".to_string())]),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Records `(completed, total, index, status)` for every progress event
/// plus the indices of cancelled cells.
#[derive(Default, Clone)]
struct Recorder {
    progress: Arc<Mutex<Vec<(usize, usize, usize, CellStatus)>>>,
    cancelled: Arc<Mutex<Vec<usize>>>,
    finished: Arc<AtomicUsize>,
}

impl ProgressHandler for Recorder {
    fn on_event(&self, event: &RunEvent<'_>) {
        match event {
            RunEvent::Progress {
                completed,
                total,
                index,
                result,
            } => self
                .progress
                .lock()
                .unwrap()
                .push((*completed, *total, *index, result.status)),
            RunEvent::CellCancelled { index, .. } => self.cancelled.lock().unwrap().push(*index),
            RunEvent::RunFinished { .. } => {
                self.finished.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
    }
}

fn statuses(state: &RunState) -> Vec<CellStatus> {
    state.results().iter().map(|r| r.status).collect()
}

// ── Happy path ─────────────────────────────────────────────────────

#[tokio::test]
async fn two_cell_matrix_reports_progress_in_order() {
    let registry = builtin_registry().unwrap();
    let caller = ScriptedCaller::answering(blueprint("X"));
    let recorder = Recorder::default();

    let state = MatrixRunner::new(&registry, &caller)
        .with_progress_handler(&recorder)
        .run(&request(&["casual"], &["short"], &["paragraph", "bullets"]), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(state.experiment.total_cells, 2);
    assert_eq!(state.experiment.completed_cells, 2);
    assert_eq!(state.experiment.status, ExperimentStatus::Complete);
    assert_eq!(state.experiment.success_count, 2);
    assert_eq!(state.results()[0].config, Cell::new("casual", "short", "paragraph"));
    assert_eq!(state.results()[1].config, Cell::new("casual", "short", "bullets"));
    assert!(state.results().iter().all(|r| r.blueprint_result == "X"));
    assert_eq!(
        *recorder.progress.lock().unwrap(),
        vec![
            (1, 2, 0, CellStatus::Complete),
            (2, 2, 1, CellStatus::Complete)
        ]
    );
    assert_eq!(recorder.finished.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn each_cell_gets_its_own_prompt() {
    let registry = builtin_registry().unwrap();
    let caller = ScriptedCaller::answering(blueprint("X"));
    MatrixRunner::new(&registry, &caller)
        .run(&request(&["casual", "professional"], &["short"], &["table"]), &CancellationToken::new())
        .await
        .unwrap();

    let requests = caller.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].system_prompt.contains("Tone: Casual"));
    assert!(requests[1].system_prompt.contains("Tone: Professional"));
    assert!(requests.iter().all(|r| r.expect_json));
    assert_eq!(requests[0].api_key.as_deref(), Some("sk-test"));
    assert!(requests[0].user_prompt.contains("budgeting app"));
}

#[tokio::test]
async fn progress_is_monotonic_and_exactly_once_per_cell() {
    let registry = builtin_registry().unwrap();
    let caller = ScriptedCaller::new(|i, _| {
        if i % 3 == 1 {
            Err(ProviderError::request("OpenRouter API HTTP 500: boom"))
        } else {
            Ok(blueprint("ok"))
        }
    });
    let recorder = Recorder::default();
    let req = request(&["casual", "friendly"], &["short", "long"], &["paragraph", "bullets"]);

    let state = MatrixRunner::new(&registry, &caller)
        .with_progress_handler(&recorder)
        .run(&req, &CancellationToken::new())
        .await
        .unwrap();

    let progress = recorder.progress.lock().unwrap();
    assert_eq!(progress.len(), 8);
    for (i, (completed, total, index, _)) in progress.iter().enumerate() {
        assert_eq!(*completed, i + 1);
        assert_eq!(*total, 8);
        assert_eq!(*index, i);
    }
    assert_eq!(state.results().len(), 8);
    assert!(state.results().iter().all(|r| r.status.is_terminal()));
}

#[tokio::test]
async fn empty_axis_yields_empty_complete_run() {
    let registry = builtin_registry().unwrap();
    let caller = ScriptedCaller::answering(blueprint("X"));
    let recorder = Recorder::default();

    let state = MatrixRunner::new(&registry, &caller)
        .with_progress_handler(&recorder)
        .run(&request(&["casual"], &[], &["paragraph"]), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(state.experiment.total_cells, 0);
    assert!(state.results().is_empty());
    assert_eq!(state.experiment.status, ExperimentStatus::Complete);
    assert_eq!(caller.count(), 0);
    assert!(recorder.progress.lock().unwrap().is_empty());
}

// ── Failure isolation ──────────────────────────────────────────────

#[tokio::test]
async fn provider_failure_is_isolated_to_its_cell() {
    let registry = builtin_registry().unwrap();
    let caller = ScriptedCaller::new(|i, _| {
        if i == 1 {
            Err(ProviderError::request("OpenRouter API HTTP 401: unauthorized"))
        } else {
            Ok(blueprint("fine"))
        }
    });

    let state = MatrixRunner::new(&registry, &caller)
        .run(&request(&["casual"], &["short"], &["paragraph", "bullets", "table"]), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        statuses(&state),
        vec![CellStatus::Complete, CellStatus::Error, CellStatus::Complete]
    );
    let failed = &state.results()[1];
    assert!(failed.error.as_deref().unwrap().contains("HTTP 401"));
    assert_eq!(failed.blueprint_result, "");
    assert_eq!(state.experiment.completed_cells, 3);
    assert_eq!(state.experiment.error_count, 1);
    assert_eq!(state.experiment.success_count, 2);
    assert_eq!(state.experiment.status, ExperimentStatus::Complete);
}

#[tokio::test]
async fn empty_extraction_is_a_parse_error_that_keeps_the_reply() {
    let registry = builtin_registry().unwrap();
    let caller = ScriptedCaller::new(|i, _| Ok(if i == 0 { json!({}) } else { json!({"final_output": "Y"}) }));

    let state = MatrixRunner::new(&registry, &caller)
        .run(&request(&["casual"], &["short"], &["paragraph", "bullets"]), &CancellationToken::new())
        .await
        .unwrap();

    let first = &state.results()[0];
    assert_eq!(first.status, CellStatus::Error);
    assert!(first.error.as_deref().unwrap().contains("parse failed"));
    assert_eq!(first.raw_reply, Some(json!({})));
    let second = &state.results()[1];
    assert_eq!(second.status, CellStatus::Complete);
    assert_eq!(second.blueprint_result, "Y");
}

#[tokio::test]
async fn null_text_reply_is_a_parse_error() {
    let registry = builtin_registry().unwrap();
    let caller = ScriptedCaller::answering(json!("null"));

    let state = MatrixRunner::new(&registry, &caller)
        .run(&request(&["casual"], &["short"], &["paragraph"]), &CancellationToken::new())
        .await
        .unwrap();

    let cell = &state.results()[0];
    assert_eq!(cell.status, CellStatus::Error);
    assert_eq!(cell.blueprint_result, "");
    assert_eq!(cell.raw_reply, Some(json!("null")));
    assert_eq!(state.experiment.error_count, 1);
}

#[tokio::test]
async fn assembly_failure_skips_the_model_call() {
    let registry = builtin_registry().unwrap();
    let caller = ScriptedCaller::answering(blueprint("X"));

    let state = MatrixRunner::new(&registry, &caller)
        .run(&request(&["sarcastic", "casual"], &["short"], &["paragraph"]), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(statuses(&state), vec![CellStatus::Error, CellStatus::Complete]);
    assert!(state.results()[0].error.as_deref().unwrap().contains("sarcastic"));
    assert_eq!(caller.count(), 1);
}

#[tokio::test]
async fn missing_api_key_is_a_cell_error() {
    let registry = builtin_registry().unwrap();
    let caller = OpenRouterCaller::new().unwrap();
    let mut req = request(&["casual"], &["short"], &["paragraph"]);
    req.models.api_keys.clear();

    let state = MatrixRunner::new(&registry, &caller)
        .run(&req, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(statuses(&state), vec![CellStatus::Error]);
    assert!(state.results()[0].error.as_deref().unwrap().contains("no API key"));
}

#[tokio::test]
async fn unknown_output_type_fails_before_any_call() {
    let registry = builtin_registry().unwrap();
    let caller = ScriptedCaller::answering(blueprint("X"));
    let mut req = request(&["casual"], &["short"], &["paragraph"]);
    req.inputs.output_type = "sonnet".into();

    let err = MatrixRunner::new(&registry, &caller)
        .run(&req, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err, SpecError::UnknownOutputType("sonnet".into()));
    assert_eq!(caller.count(), 0);
}

#[tokio::test]
async fn panicking_collaborator_fails_the_run() {
    let registry = builtin_registry().unwrap();
    let caller = ScriptedCaller::new(|i, _| {
        if i == 1 {
            panic!("provider exploded");
        }
        Ok(blueprint("X"))
    });
    let recorder = Recorder::default();

    let state = MatrixRunner::new(&registry, &caller)
        .with_progress_handler(&recorder)
        .run(&request(&["casual"], &["short"], &["paragraph", "bullets", "table", "json"]), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        statuses(&state),
        vec![
            CellStatus::Complete,
            CellStatus::Error,
            CellStatus::Cancelled,
            CellStatus::Cancelled
        ]
    );
    assert_eq!(state.experiment.status, ExperimentStatus::Failed);
    assert!(state.experiment.failure.as_deref().unwrap().contains("provider exploded"));
    assert_eq!(*recorder.cancelled.lock().unwrap(), vec![2, 3]);
    assert_eq!(caller.count(), 2);
}

// ── Downstream pass and judging ────────────────────────────────────

#[tokio::test]
async fn downstream_failure_is_non_fatal() {
    let registry = builtin_registry().unwrap();
    let caller = ScriptedCaller::new(|_, req| {
        if req.model_id == "mistral/small" {
            Err(ProviderError::request("OpenRouter API HTTP 503: overloaded"))
        } else {
            Ok(blueprint("BP"))
        }
    });
    let mut req = request(&["casual"], &["short"], &["paragraph"]);
    req.models.downstream = Some(DownstreamConfig {
        model_id: "mistral/small".into(),
        system_prompt: None,
    });

    let state = MatrixRunner::new(&registry, &caller)
        .run(&req, &CancellationToken::new())
        .await
        .unwrap();

    let cell = &state.results()[0];
    assert_eq!(cell.status, CellStatus::Complete);
    assert_eq!(cell.blueprint_result, "BP");
    assert_eq!(cell.execution_model_id.as_deref(), Some("mistral/small"));
    assert!(cell.execution_error.as_deref().unwrap().contains("503"));
    assert!(cell.execution_result.is_none());
    assert!(cell.error.is_none());
}

#[tokio::test]
async fn downstream_runs_the_blueprint() {
    let registry = builtin_registry().unwrap();
    let caller = ScriptedCaller::new(|_, req| {
        if req.model_id == "mistral/small" {
            Ok(json!(format!("EXECUTED: {}", req.user_prompt)))
        } else {
            Ok(blueprint("BP"))
        }
    });
    let mut req = request(&["casual"], &["short"], &["paragraph"]);
    req.models.downstream = Some(DownstreamConfig {
        model_id: "mistral/small".into(),
        system_prompt: Some("Be brief.".into()),
    });

    let state = MatrixRunner::new(&registry, &caller)
        .run(&req, &CancellationToken::new())
        .await
        .unwrap();

    let cell = &state.results()[0];
    assert_eq!(cell.execution_result.as_deref(), Some("EXECUTED: BP"));
    let requests = caller.requests.lock().unwrap();
    assert_eq!(requests[1].system_prompt, "Be brief.");
    assert!(!requests[1].expect_json);
}

#[tokio::test]
async fn judge_scores_each_cell() {
    let registry = builtin_registry().unwrap();
    let caller = ScriptedCaller::answering(blueprint("BP"));
    let judge = ScriptedCaller::answering(json!({"score": 8, "critique": "Tight and specific."}));
    let mut req = request(&["casual"], &["short"], &["paragraph"]);
    req.models.enable_judge = true;
    req.models.judge_model_id = Some("anthropic/claude-sonnet-4".into());

    let state = MatrixRunner::new(&registry, &caller)
        .with_judge_caller(&judge)
        .run(&req, &CancellationToken::new())
        .await
        .unwrap();

    let cell = &state.results()[0];
    let eval = cell.evaluation.as_ref().unwrap();
    assert_eq!(eval.ai.score, 8.0);
    assert_eq!(eval.ai.critique, "Tight and specific.");
    assert_eq!(cell.judge_model_id.as_deref(), Some("anthropic/claude-sonnet-4"));
    assert_eq!(judge.models(), vec!["anthropic/claude-sonnet-4".to_string()]);
    assert_eq!(caller.count(), 1);
}

#[tokio::test]
async fn dual_judge_averages_scores() {
    let registry = builtin_registry().unwrap();
    let caller = ScriptedCaller::answering(blueprint("BP"));
    let judge = ScriptedCaller::new(|i, _| {
        let score = if i == 0 { 9 } else { 5 };
        Ok(json!({"score": score, "critique": format!("c{i}")}))
    });
    let mut req = request(&["casual"], &["short"], &["paragraph"]);
    req.models.enable_judge = true;
    req.judge_options.dual_judge = true;

    let state = MatrixRunner::new(&registry, &caller)
        .with_judge_caller(&judge)
        .run(&req, &CancellationToken::new())
        .await
        .unwrap();

    let eval = state.results()[0].evaluation.as_ref().unwrap();
    assert_eq!(eval.ai.score, 7.0);
    assert_eq!(eval.ai.critique, "c0\n\nc1");
    assert_eq!(judge.count(), 2);
}

#[tokio::test]
async fn judge_failure_leaves_evaluation_absent() {
    let registry = builtin_registry().unwrap();
    let caller = ScriptedCaller::answering(blueprint("BP"));
    let judge = ScriptedCaller::answering(json!({"critique": "forgot the score"}));
    let mut req = request(&["casual"], &["short"], &["paragraph"]);
    req.models.enable_judge = true;

    let state = MatrixRunner::new(&registry, &caller)
        .with_judge_caller(&judge)
        .run(&req, &CancellationToken::new())
        .await
        .unwrap();

    let cell = &state.results()[0];
    assert_eq!(cell.status, CellStatus::Complete);
    assert!(cell.evaluation.is_none());
    assert_eq!(judge.models(), vec!["openai/gpt-4o".to_string()]);
}

// ── Cancellation ───────────────────────────────────────────────────

#[tokio::test]
async fn cancellation_after_cell_k_stops_dispatch() {
    let registry = builtin_registry().unwrap();
    let caller = ScriptedCaller::answering(blueprint("X"));
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let handler = FnProgress::new(move |completed, _, _| {
        if completed == 2 {
            token.cancel();
        }
    });
    let recorder = Recorder::default();
    let composite = CompositeHandler::new().with(handler).with(recorder.clone());

    let state = MatrixRunner::new(&registry, &caller)
        .with_progress_handler(&composite)
        .run(&request(&["casual", "friendly"], &["short", "long"], &["paragraph"]), &cancel)
        .await
        .unwrap();

    assert_eq!(caller.count(), 2);
    assert_eq!(
        statuses(&state),
        vec![
            CellStatus::Complete,
            CellStatus::Complete,
            CellStatus::Cancelled,
            CellStatus::Cancelled
        ]
    );
    assert_eq!(state.experiment.completed_cells, 2);
    assert_eq!(state.experiment.cancelled_count, 2);
    assert_eq!(state.experiment.status, ExperimentStatus::Complete);
    assert_eq!(recorder.progress.lock().unwrap().len(), 2);
    assert_eq!(*recorder.cancelled.lock().unwrap(), vec![2, 3]);
}

#[tokio::test]
async fn pre_cancelled_run_dispatches_nothing() {
    let registry = builtin_registry().unwrap();
    let caller = ScriptedCaller::answering(blueprint("X"));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let state = MatrixRunner::new(&registry, &caller)
        .run(&request(&["casual"], &["short"], &["paragraph", "bullets"]), &cancel)
        .await
        .unwrap();

    assert_eq!(caller.count(), 0);
    assert_eq!(statuses(&state), vec![CellStatus::Cancelled; 2]);
    assert_eq!(state.experiment.completed_cells, 0);
}

#[tokio::test]
async fn in_flight_cancellation_marks_the_cell_cancelled() {
    let registry = builtin_registry().unwrap();
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let caller = ScriptedCaller::new(move |i, _| {
        if i == 1 {
            token.cancel();
            return Err(ProviderError::Cancelled);
        }
        Ok(blueprint("X"))
    });
    let recorder = Recorder::default();

    let state = MatrixRunner::new(&registry, &caller)
        .with_progress_handler(&recorder)
        .run(&request(&["casual"], &["short"], &["paragraph", "bullets", "table"]), &cancel)
        .await
        .unwrap();

    assert_eq!(
        statuses(&state),
        vec![CellStatus::Complete, CellStatus::Cancelled, CellStatus::Cancelled]
    );
    assert!(state.results()[1].error.is_none());
    assert_eq!(state.experiment.completed_cells, 1);
    assert_eq!(recorder.progress.lock().unwrap().len(), 1);
    assert_eq!(*recorder.cancelled.lock().unwrap(), vec![1, 2]);
}

/// Answers the first call, then blocks every later call until the token
/// fires, honoring it the same way the OpenRouter caller does.
struct HangingCaller {
    calls: AtomicUsize,
}

impl ModelCaller for HangingCaller {
    fn call<'a>(&'a self, _request: ModelRequest, cancel: &'a CancellationToken) -> ModelFuture<'a> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if index == 0 {
                return Ok(blueprint("X"));
            }
            retry_cancellable(&RetryConfig::none(), cancel, || std::future::pending()).await
        })
    }
}

#[tokio::test]
async fn token_fired_mid_call_aborts_the_pending_request() {
    let registry = builtin_registry().unwrap();
    let caller = HangingCaller {
        calls: AtomicUsize::new(0),
    };
    let recorder = Recorder::default();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let runner = MatrixRunner::new(&registry, &caller).with_progress_handler(&recorder);
    let req = request(&["casual"], &["short"], &["paragraph", "bullets", "table"]);
    let state = tokio::time::timeout(Duration::from_secs(5), runner.run(&req, &cancel))
        .await
        .expect("run did not stop after cancellation")
        .unwrap();

    assert_eq!(
        statuses(&state),
        vec![CellStatus::Complete, CellStatus::Cancelled, CellStatus::Cancelled]
    );
    assert_eq!(caller.calls.load(Ordering::SeqCst), 2);
    assert_eq!(state.experiment.completed_cells, 1);
    assert_eq!(*recorder.cancelled.lock().unwrap(), vec![1, 2]);
}

// ── Persistence ────────────────────────────────────────────────────

#[tokio::test]
async fn memory_store_sees_every_cell() {
    let registry = builtin_registry().unwrap();
    let caller = ScriptedCaller::answering(blueprint("X"));
    let store = MemoryStore::new();

    let state = MatrixRunner::new(&registry, &caller)
        .with_store(&store)
        .run(&request(&["casual"], &["short", "long"], &["paragraph"]), &CancellationToken::new())
        .await
        .unwrap();

    let stored = store.run(&state.experiment.id).unwrap();
    assert_eq!(stored.cells.len(), 2);
    assert_eq!(stored.progress_updates, 2);
    assert!(stored.finalized);
    assert_eq!(stored.experiment, state.experiment);
}

/// Fails or stalls every call.
struct BrokenStore {
    stall: bool,
    calls: AtomicUsize,
}

impl BrokenStore {
    fn answer<'a, T: Send + 'a>(&'a self) -> StoreFuture<'a, T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let stall = self.stall;
        Box::pin(async move {
            if stall {
                std::future::pending::<()>().await;
            }
            Err::<T, _>(PersistenceError::Other("disk on fire".into()))
        })
    }
}

impl Store for BrokenStore {
    fn create_run<'a>(&'a self, _: &'a Experiment) -> StoreFuture<'a, String> {
        self.answer()
    }
    fn record_cell_result<'a>(&'a self, _: &'a str, _: usize, _: &'a CellResult) -> StoreFuture<'a, ()> {
        self.answer()
    }
    fn update_run_progress<'a>(&'a self, _: &'a Experiment) -> StoreFuture<'a, ()> {
        self.answer()
    }
    fn finalize_run<'a>(&'a self, _: &'a Experiment) -> StoreFuture<'a, ()> {
        self.answer()
    }
}

#[tokio::test]
async fn failing_store_never_aborts_the_run() {
    let registry = builtin_registry().unwrap();
    let caller = ScriptedCaller::answering(blueprint("X"));
    let store = BrokenStore {
        stall: false,
        calls: AtomicUsize::new(0),
    };

    let state = MatrixRunner::new(&registry, &caller)
        .with_store(&store)
        .run(&request(&["casual"], &["short"], &["paragraph", "bullets"]), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(statuses(&state), vec![CellStatus::Complete; 2]);
    assert!(state.experiment.id.starts_with("run-"));
    // create + 2 x (record + progress) + finalize
    assert_eq!(store.calls.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn stalled_store_is_bounded_by_the_timeout() {
    let registry = builtin_registry().unwrap();
    let caller = ScriptedCaller::answering(blueprint("X"));
    let store = BrokenStore {
        stall: true,
        calls: AtomicUsize::new(0),
    };

    let state = MatrixRunner::new(&registry, &caller)
        .with_store(&store)
        .with_config(EngineConfig::default().with_store_timeout(Duration::from_millis(10)))
        .run(&request(&["casual"], &["short"], &["paragraph"]), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(statuses(&state), vec![CellStatus::Complete]);
    assert_eq!(state.experiment.status, ExperimentStatus::Complete);
}

/// Registers and finalizes runs at once but never finishes a cell write.
#[derive(Default)]
struct StallingCellStore {
    cell_writes: AtomicUsize,
    finalized: AtomicUsize,
}

impl Store for StallingCellStore {
    fn create_run<'a>(&'a self, experiment: &'a Experiment) -> StoreFuture<'a, String> {
        Box::pin(async move { Ok(experiment.id.clone()) })
    }
    fn record_cell_result<'a>(&'a self, _: &'a str, _: usize, _: &'a CellResult) -> StoreFuture<'a, ()> {
        self.cell_writes.fetch_add(1, Ordering::SeqCst);
        Box::pin(std::future::pending::<Result<(), PersistenceError>>())
    }
    fn update_run_progress<'a>(&'a self, _: &'a Experiment) -> StoreFuture<'a, ()> {
        self.cell_writes.fetch_add(1, Ordering::SeqCst);
        Box::pin(std::future::pending::<Result<(), PersistenceError>>())
    }
    fn finalize_run<'a>(&'a self, _: &'a Experiment) -> StoreFuture<'a, ()> {
        self.finalized.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }
}

#[tokio::test]
async fn cancellation_abandons_stalled_cell_writes() {
    let registry = builtin_registry().unwrap();
    let caller = ScriptedCaller::answering(blueprint("X"));
    let store = StallingCellStore::default();
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let handler = FnProgress::new(move |completed, _, _| {
        if completed == 1 {
            token.cancel();
        }
    });

    let runner = MatrixRunner::new(&registry, &caller)
        .with_store(&store)
        .with_progress_handler(&handler)
        .with_config(EngineConfig::default().with_store_timeout(Duration::from_secs(60)));
    let req = request(&["casual"], &["short"], &["paragraph", "bullets"]);
    let state = tokio::time::timeout(Duration::from_secs(5), runner.run(&req, &cancel))
        .await
        .expect("stalled store write outlived the cancelled run")
        .unwrap();

    assert_eq!(statuses(&state), vec![CellStatus::Complete, CellStatus::Cancelled]);
    assert_eq!(caller.count(), 1);
    assert_eq!(store.cell_writes.load(Ordering::SeqCst), 2);
    assert_eq!(store.finalized.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn file_store_persists_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let registry = builtin_registry().unwrap();
    let caller = ScriptedCaller::answering(blueprint("X"));
    let store = JsonFileStore::new(dir.path()).unwrap();

    let state = MatrixRunner::new(&registry, &caller)
        .with_store(&store)
        .run(&request(&["casual"], &["short"], &["paragraph", "bullets"]), &CancellationToken::new())
        .await
        .unwrap();

    let id = &state.experiment.id;
    let manifest = store.load_manifest(id).await.unwrap().unwrap();
    assert_eq!(manifest.status, ExperimentStatus::Complete);
    assert_eq!(manifest.completed_cells, 2);
    let cells = store.load_cells(id).await.unwrap();
    assert_eq!(cells.len(), 2);
    assert_eq!(cells[1].1.config.format, "bullets");
}

// ── Planning ───────────────────────────────────────────────────────

#[test]
fn plan_assembles_without_calls() {
    let registry = builtin_registry().unwrap();
    let caller = ScriptedCaller::answering(blueprint("X"));
    let runner = MatrixRunner::new(&registry, &caller);
    let plans = runner
        .plan(&request(&["casual", "sarcastic"], &["short"], &["paragraph"]))
        .unwrap();

    assert_eq!(plans.len(), 2);
    assert!(plans[0].1.is_ok());
    assert!(matches!(
        plans[1].1,
        Err(AssemblyError::UnknownAxisValue { axis: "tone", .. })
    ));
    assert_eq!(caller.count(), 0);
}

#[test]
fn custom_specs_from_json_are_runnable() {
    let registry = builtin_builder()
        .extend_from_json(
            r#"{
                "id": "tweet",
                "metadata": {"label": "Tweet"},
                "systemSteps": [
                    {"id": "limit", "template": "Stay under 280 characters."},
                    {"id": "hashtags", "template": "Use {{typeSpecific.hashtags}}.",
                     "conditions": [{"field": "typeSpecific.hashtags", "operator": "exists"}]}
                ]
            }"#,
        )
        .unwrap()
        .build()
        .unwrap();
    let caller = ScriptedCaller::answering(blueprint("X"));
    let mut req = request(&["playful"], &["short"], &["paragraph"]);
    req.inputs.output_type = "tweet".into();

    let plans = MatrixRunner::new(&registry, &caller).plan(&req).unwrap();
    let plan = plans[0].1.as_ref().unwrap();
    assert!(plan.system_prompt.contains("Stay under 280 characters."));
    assert!(!plan.system_prompt.contains("Use ."));
    assert!(plan.system_prompt.contains("- Output type: Tweet"));
}
