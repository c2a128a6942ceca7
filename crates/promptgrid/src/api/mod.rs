//! Provider plumbing shared by the model collaborators.
//!
//! - [`retry`] - cancellable exponential backoff for transient failures.
//!   Used inside [`OpenRouterCaller`](crate::model::OpenRouterCaller); the
//!   engine itself never retries.
//! - [`ids`] - run and cell identifiers.

pub mod ids;
pub mod retry;

pub use ids::{cell_id, generate_run_id};
pub use retry::RetryConfig;
