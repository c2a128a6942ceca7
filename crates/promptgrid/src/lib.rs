//! Matrix experiment engine for LLM prompt variants.
//!
//! `promptgrid` takes a brief plus three axes of stylistic variation (tone,
//! length, format), expands their cartesian product into cells, renders a
//! prompt for every cell from a declarative, conditional template spec,
//! runs each prompt through a model, extracts the deliverable, optionally
//! runs it through a second model and a judge, and reports progress cell by
//! cell while persisting results on a best-effort basis.
//!
//! # Getting started
//!
//! ```ignore
//! use promptgrid::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = builtin_registry()?;
//!     let caller = OpenRouterCaller::new()?;
//!
//!     let request = RunRequest {
//!         inputs: GlobalInputs {
//!             brief: "Announce our budgeting app to existing customers.".into(),
//!             output_type: "copy".into(),
//!             ..Default::default()
//!         },
//!         axes: AxisSelection::new(["casual", "professional"], ["short"], ["paragraph"]),
//!         models: RunModels {
//!             execution_model_id: "openai/gpt-4o".into(),
//!             api_keys: [("default".to_string(), std::env::var("OPENROUTER_KEY")?)].into(),
//!             ..Default::default()
//!         },
//!         ..Default::default()
//!     };
//!
//!     let state = MatrixRunner::new(&registry, &caller)
//!         .with_progress_handler(&LoggingHandler)
//!         .run(&request, &CancellationToken::new())
//!         .await?;
//!
//!     for result in state.results() {
//!         println!("{}: {:?}", result.config.label(), result.status);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Conditions and templates:** [`template`] resolves dot-paths against a
//!   JSON context, evaluates `exists` / `==` / `!=` conditions, and renders
//!   `{{dot.path}}` tokens. There is no expression language.
//!
//! - **Output types:** [`spec`] holds [`PromptSpec`](spec::PromptSpec), the
//!   merge of a base spec with per-type overrides, and the immutable
//!   [`PromptSpecRegistry`](spec::PromptSpecRegistry). New types can be
//!   registered from JSON with
//!   [`RegistryBuilder::extend_from_json`](spec::RegistryBuilder::extend_from_json).
//!
//! - **Prompt assembly:** [`assembler`] turns one cell plus the run's
//!   [`GlobalInputs`](assembler::GlobalInputs) into a
//!   [`PromptPlan`](assembler::PromptPlan).
//!
//! - **Running a matrix:** [`run::MatrixRunner`] drives the cells in order
//!   through [`run::CellExecutor`]. Observe it with a
//!   [`ProgressHandler`](run::ProgressHandler), persist it with a
//!   [`Store`](store::Store), and stop it with a `CancellationToken`.
//!
//! - **Talking to models:** implement [`ModelCaller`](model::ModelCaller), or
//!   use [`OpenRouterCaller`](model::OpenRouterCaller).
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`template`] | Context lookup, condition evaluation, token rendering |
//! | [`spec`] | Prompt specs, merge, registry, built-in output types |
//! | [`assembler`] | Axis descriptors and prompt plan assembly |
//! | [`extract`] | Deliverable extraction from model replies |
//! | [`matrix`] | Axis expansion, cell results, experiment state |
//! | [`model`] | Model collaborator trait and the OpenRouter caller |
//! | [`judge`] | Judge prompts and verdict parsing |
//! | [`run`] | Cell executor, run controller, progress events |
//! | [`store`] | Best-effort persistence collaborators |
//! | [`config`] | Engine config and the JSON run request |
//! | [`api`] | Retry/backoff and run ids |
//! | [`error`] | Error taxonomy |

pub mod api;
pub mod assembler;
pub mod config;
pub mod error;
pub mod extract;
pub mod judge;
pub mod matrix;
pub mod model;
pub mod prelude;
pub mod run;
pub mod spec;
pub mod store;
pub mod template;

// Re-export schemars for downstream crates deriving request schemas.
pub use schemars;
