//! Error taxonomy for the matrix engine.
//!
//! Only [`SpecError`] escapes a run; it is raised while the registry is
//! built or when an output type is looked up, before any cell dispatches.
//! Every other category is caught at the cell boundary and turned into a
//! [`CellResult`](crate::matrix::CellResult) status, or (for persistence)
//! logged and dropped.

use thiserror::Error;

/// Missing or malformed prompt spec. Fatal, raised before a run starts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SpecError {
    #[error("unknown output type '{0}'")]
    UnknownOutputType(String),

    #[error("output type '{0}' is registered twice")]
    DuplicateOutputType(String),

    #[error("spec has an empty id")]
    EmptyId,

    #[error("spec '{spec}': step id '{step}' is used more than once")]
    DuplicateStep { spec: String, step: String },

    #[error("spec '{spec}': step '{step}' has an empty template")]
    EmptyTemplate { spec: String, step: String },

    #[error("spec '{spec}': step '{step}' has an unterminated '{{{{' token at byte {offset}")]
    UnterminatedToken {
        spec: String,
        step: String,
        offset: usize,
    },

    #[error("spec '{spec}': step '{step}' has an invalid token path '{path}'")]
    InvalidTokenPath {
        spec: String,
        step: String,
        path: String,
    },

    #[error("spec '{spec}': step '{step}' has a '{operator}' condition on '{field}' without a value")]
    MissingConditionValue {
        spec: String,
        step: String,
        field: String,
        operator: String,
    },

    #[error("spec '{spec}': step '{step}' has a condition on invalid path '{field}'")]
    InvalidConditionPath {
        spec: String,
        step: String,
        field: String,
    },

    #[error("default output type '{0}' is not registered")]
    UnknownDefault(String),

    #[error("failed to parse spec overrides: {0}")]
    Parse(String),
}

/// A single cell's prompt could not be rendered.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("no {axis} descriptor for '{id}'")]
    UnknownAxisValue { axis: &'static str, id: String },

    #[error("step '{step}' requires '{field}', which is absent")]
    MissingField { step: String, field: String },

    #[error("assembled {channel} prompt is empty")]
    EmptyPrompt { channel: &'static str },
}

/// Failure reported by a model-calling collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("no API key available for model '{0}'")]
    MissingApiKey(String),

    #[error("{0}")]
    Request(String),

    #[error("model call cancelled")]
    Cancelled,
}

impl ProviderError {
    pub fn request(msg: impl Into<String>) -> Self {
        Self::Request(msg.into())
    }
}

/// The model reply did not yield an extractable deliverable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("model reply contained no extractable deliverable")]
    EmptyDeliverable,
}

/// A best-effort persistence write failed. Logged only.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("unknown run '{0}'")]
    UnknownRun(String),

    #[error("store call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("{0}")]
    Other(String),
}

/// Failure of steps 1-3 of the cell pipeline.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CellError {
    #[error("assembly failed: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("provider failed: {0}")]
    Provider(ProviderError),

    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),

    #[error("cancelled")]
    Cancelled,
}

impl From<ProviderError> for CellError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Cancelled => CellError::Cancelled,
            other => CellError::Provider(other),
        }
    }
}
