//! The experiment matrix: axis expansion and per-run state.

pub mod axes;
pub mod state;

pub use axes::{AxisSelection, Cell, Expansion, expand};
pub use state::{
    AiEvaluation, CellResult, CellStatus, Evaluation, Experiment, ExperimentStatus, RunState,
};
