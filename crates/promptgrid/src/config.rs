//! Engine configuration and the serializable run request.

use crate::assembler::{DescriptorCatalog, GlobalInputs};
use crate::judge::{Baseline, JudgeOptions};
use crate::matrix::AxisSelection;
use crate::model::resolve_api_key;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

// ── Engine configuration ───────────────────────────────────────────

/// Knobs that apply to every run of a [`MatrixRunner`](crate::run::MatrixRunner).
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Max tokens for the blueprint call.
    pub max_tokens: u32,
    pub temperature: f32,
    /// Max tokens for the downstream execution pass.
    pub execution_max_tokens: u32,
    pub execution_temperature: f32,
    /// System prompt used for the downstream pass when the request sets none.
    pub execution_system_prompt: String,
    pub judge_max_tokens: u32,
    pub judge_temperature: f32,
    /// Upper bound on every persistence call.
    pub store_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.7,
            execution_max_tokens: 4096,
            execution_temperature: 0.7,
            execution_system_prompt: "Follow the instructions in the user message exactly. \
                                      Produce only the requested deliverable."
                .into(),
            judge_max_tokens: 1024,
            judge_temperature: 0.2,
            store_timeout: Duration::from_secs(5),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_execution_limits(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.execution_max_tokens = max_tokens;
        self.execution_temperature = temperature;
        self
    }

    pub fn with_execution_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.execution_system_prompt = prompt.into();
        self
    }

    pub fn with_judge_limits(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.judge_max_tokens = max_tokens;
        self.judge_temperature = temperature;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }
}

// ── Run request ────────────────────────────────────────────────────

/// Optional second pass that runs the blueprint through another model.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq)]
pub struct DownstreamConfig {
    pub model_id: String,
    /// Overrides [`EngineConfig::execution_system_prompt`].
    #[serde(default)]
    pub system_prompt: Option<String>,
}

/// Which models a run uses, and the keys to reach them.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct RunModels {
    /// Model that writes the blueprint for every cell.
    pub execution_model_id: String,
    pub downstream: Option<DownstreamConfig>,
    pub enable_judge: bool,
    /// Defaults to `execution_model_id` when judging is enabled.
    pub judge_model_id: Option<String>,
    /// Provider prefix (`openai`, `anthropic`, ...) or `default` -> key.
    #[serde(skip_serializing)]
    pub api_keys: BTreeMap<String, String>,
}

impl RunModels {
    pub fn judge_model(&self) -> Option<&str> {
        if !self.enable_judge {
            return None;
        }
        Some(
            self.judge_model_id
                .as_deref()
                .filter(|m| !m.is_empty())
                .unwrap_or(&self.execution_model_id),
        )
    }

    /// Every model the run calls: execution, then downstream, then judge.
    pub fn model_ids(&self) -> Vec<&str> {
        let mut ids = vec![self.execution_model_id.as_str()];
        ids.extend(self.downstream.as_ref().map(|d| d.model_id.as_str()));
        ids.extend(self.judge_model());
        ids
    }

    /// Models no entry of `api_keys` covers.
    pub fn models_without_key(&self) -> Vec<&str> {
        self.model_ids()
            .into_iter()
            .filter(|m| resolve_api_key(&self.api_keys, m).is_none())
            .collect()
    }
}

/// A complete description of one matrix run.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct RunRequest {
    pub inputs: GlobalInputs,
    pub axes: AxisSelection,
    pub models: RunModels,
    pub baselines: Vec<Baseline>,
    pub judge_options: JudgeOptions,
    /// Extra or replacement axis descriptors.
    pub descriptors: DescriptorCatalog,
}

impl RunRequest {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// JSON Schema of the request document.
    pub fn json_schema() -> serde_json::Value {
        json_schema_for::<RunRequest>()
    }
}

/// JSON Schema for any `schemars::JsonSchema` type.
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}
