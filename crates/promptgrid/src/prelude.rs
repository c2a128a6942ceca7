//! Convenience re-exports for running matrices.
//!
//! ```ignore
//! use promptgrid::prelude::*;
//! ```
//!
//! Covers the registry, the run request, the runner and its collaborators.
//! Lower-level pieces (renderer, extractor, judge internals) are imported
//! from their modules when needed.

// ── Specs and assembly ──────────────────────────────────────────────
pub use crate::assembler::{Assembler, Descriptor, DescriptorCatalog, GlobalInputs, PromptPlan};
pub use crate::spec::{
    PromptSpec, PromptSpecRegistry, SpecOverrides, Step, base_spec, builtin_builder,
    builtin_registry,
};
pub use crate::template::Condition;

// ── Requests and results ────────────────────────────────────────────
pub use crate::config::{DownstreamConfig, EngineConfig, RunModels, RunRequest};
pub use crate::error::{AssemblyError, ProviderError, SpecError};
pub use crate::judge::{Baseline, JudgeOptions, Strictness};
pub use crate::matrix::{
    AxisSelection, Cell, CellResult, CellStatus, Experiment, ExperimentStatus, RunState,
};

// ── Runtime ─────────────────────────────────────────────────────────
pub use crate::model::{ModelCaller, ModelFuture, ModelRequest, OpenRouterCaller};
pub use crate::run::{
    CompositeHandler, FnProgress, LoggingHandler, MatrixRunner, NoopHandler, ProgressHandler,
    RunEvent,
};
pub use crate::store::{JsonFileStore, MemoryStore, NoopStore, Store};
pub use tokio_util::sync::CancellationToken;
