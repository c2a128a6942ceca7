//! Executing a matrix: the per-cell pipeline, the run controller, and the
//! events observers receive.

pub mod controller;
pub mod events;
pub mod executor;

pub use controller::MatrixRunner;
pub use events::{
    CompositeHandler, FnProgress, LoggingHandler, NoopHandler, ProgressHandler, RunEvent,
};
pub use executor::CellExecutor;
