//! The per-cell pipeline.
//!
//! 1. assemble the prompt plan
//! 2. call the execution model for the blueprint
//! 3. extract the deliverable
//! 4. optional downstream pass (non-fatal)
//! 5. optional judging (non-fatal)
//!
//! Failures in steps 1-3 mark the cell `error`; cancellation at any of
//! those steps marks it `cancelled`. Nothing escapes as an `Err`.

use crate::assembler::Assembler;
use crate::config::{EngineConfig, RunRequest};
use crate::error::{CellError, ParseError};
use crate::extract::extract_deliverable;
use crate::judge::{Judge, JudgeInput};
use crate::matrix::{Cell, CellResult, CellStatus};
use crate::model::{ModelCaller, ModelRequest, resolve_api_key};
use crate::spec::PromptSpec;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Runs cells of one request. Holds only shared, read-only state.
pub struct CellExecutor<'a> {
    assembler: Assembler<'a>,
    spec: &'a PromptSpec,
    request: &'a RunRequest,
    config: &'a EngineConfig,
    caller: &'a dyn ModelCaller,
    judge: Option<Judge<'a>>,
}

impl<'a> CellExecutor<'a> {
    pub fn new(
        assembler: Assembler<'a>,
        spec: &'a PromptSpec,
        request: &'a RunRequest,
        config: &'a EngineConfig,
        caller: &'a dyn ModelCaller,
    ) -> Self {
        Self {
            assembler,
            spec,
            request,
            config,
            caller,
            judge: None,
        }
    }

    /// Enable judging through `caller` when the request asks for it.
    pub fn with_judge_caller(mut self, caller: &'a dyn ModelCaller) -> Self {
        let request = self.request;
        let config = self.config;
        self.judge = request.models.judge_model().map(|model_id| {
            Judge::new(caller, model_id)
                .with_api_key(resolve_api_key(&request.models.api_keys, model_id))
                .with_options(request.judge_options)
                .with_limits(config.judge_max_tokens, config.judge_temperature)
        });
        self
    }

    /// Run the pipeline for one cell.
    pub async fn run(&self, cell: &Cell, cancel: &CancellationToken) -> CellResult {
        let start = Instant::now();
        let mut result = CellResult::pending(cell.clone());

        match self.blueprint(cell, cancel, &mut result).await {
            Ok(blueprint) => {
                result.blueprint_result = blueprint;
                result.status = CellStatus::Complete;
                self.downstream(cancel, &mut result).await;
                self.evaluate(cell, cancel, &mut result).await;
            }
            Err(CellError::Cancelled) => {
                debug!("Cell {} cancelled in flight", cell.label());
                result.status = CellStatus::Cancelled;
            }
            Err(e) => {
                result.status = CellStatus::Error;
                result.error = Some(e.to_string());
            }
        }

        result.duration_ms = Some(start.elapsed().as_millis() as u64);
        result
    }

    /// Steps 1-3. The raw reply is kept on `result` when extraction fails.
    async fn blueprint(
        &self,
        cell: &Cell,
        cancel: &CancellationToken,
        result: &mut CellResult,
    ) -> Result<String, CellError> {
        let plan = self.assembler.assemble(self.spec, cell, &self.request.inputs)?;

        let models = &self.request.models;
        let model_id = &models.execution_model_id;
        let request = ModelRequest::new(model_id, plan.system_prompt, plan.user_prompt)
            .with_api_key(resolve_api_key(&models.api_keys, model_id))
            .with_json(true)
            .with_max_tokens(self.config.max_tokens)
            .with_temperature(self.config.temperature);
        let reply = self.caller.call(request, cancel).await?;

        let blueprint = extract_deliverable(&reply);
        if blueprint.is_empty() {
            result.raw_reply = Some(reply);
            return Err(ParseError::EmptyDeliverable.into());
        }
        Ok(blueprint)
    }

    /// Step 4. Failures land in `execution_error`.
    async fn downstream(&self, cancel: &CancellationToken, result: &mut CellResult) {
        let Some(downstream) = &self.request.models.downstream else {
            return;
        };
        let system_prompt = downstream
            .system_prompt
            .clone()
            .unwrap_or_else(|| self.config.execution_system_prompt.clone());
        let request = ModelRequest::new(
            &downstream.model_id,
            system_prompt,
            result.blueprint_result.clone(),
        )
        .with_api_key(resolve_api_key(&self.request.models.api_keys, &downstream.model_id))
        .with_max_tokens(self.config.execution_max_tokens)
        .with_temperature(self.config.execution_temperature);

        result.execution_model_id = Some(downstream.model_id.clone());
        match self.caller.call(request, cancel).await {
            Ok(reply) => {
                let text = match reply {
                    serde_json::Value::String(s) => s.trim().to_string(),
                    other => extract_deliverable(&other),
                };
                result.execution_result = Some(text);
            }
            Err(e) => {
                warn!("Downstream pass for {} failed: {e}", result.config.label());
                result.execution_error = Some(e.to_string());
            }
        }
    }

    /// Step 5. `evaluation` stays `None` when judging fails.
    async fn evaluate(&self, cell: &Cell, cancel: &CancellationToken, result: &mut CellResult) {
        let Some(judge) = &self.judge else {
            return;
        };
        let input = JudgeInput {
            brief: &self.request.inputs.brief,
            output_type: &self.spec.id,
            cell,
            blueprint: &result.blueprint_result,
            execution: result.execution_result.as_deref(),
            baselines: &self.request.baselines,
        };
        let evaluation = judge.evaluate(&input, cancel).await;
        result.judge_model_id = Some(judge.model_id().to_string());
        result.evaluation = evaluation;
    }
}
