//! LLM-as-judge scoring of a cell's blueprint.
//!
//! The judge sees the brief, the cell's tone/length/format, the blueprint
//! (plus the downstream execution output when one exists) and up to
//! [`MAX_BASELINES`] scored anchors. It replies with `{score, critique}`.
//! Judging never fails a cell: [`Judge::evaluate`] returns `None` when no
//! verdict could be obtained.

use crate::error::ProviderError;
use crate::extract::strip_code_fences;
use crate::matrix::{AiEvaluation, Cell, Evaluation};
use crate::model::{ModelCaller, ModelRequest};
use crate::template::resolve;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Baselines beyond this count are ignored.
pub const MAX_BASELINES: usize = 3;

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 10.0;

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    Lenient,
    #[default]
    Balanced,
    Strict,
}

impl Strictness {
    fn rubric(self) -> &'static str {
        match self {
            Strictness::Lenient => {
                "Reward prompts that are usable even if imperfect. Reserve scores \
                 below 4 for prompts that ignore the brief."
            }
            Strictness::Balanced => {
                "A solid prompt that honors every control scores 7. Go above 8 only \
                 for prompts that would need no edits before use."
            }
            Strictness::Strict => {
                "Start from 5 and deduct for every missed control, vague instruction \
                 or invented fact. Scores above 8 are exceptional."
            }
        }
    }
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(default)]
pub struct JudgeOptions {
    /// Run a second, skeptical judge and merge the two verdicts.
    pub dual_judge: bool,
    pub strictness: Strictness,
}

/// A reference output with a known score, used to calibrate the judge.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq)]
pub struct Baseline {
    pub label: String,
    pub text: String,
    #[serde(default)]
    pub score: Option<f64>,
}

/// Which reviewer voice a judge call uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JudgePersona {
    Primary,
    Skeptic,
}

impl JudgePersona {
    fn preamble(self) -> &'static str {
        match self {
            JudgePersona::Primary => {
                "You are an impartial evaluator of prompts written for large language models."
            }
            JudgePersona::Skeptic => {
                "You are a skeptical reviewer. Look for every reason this prompt would \
                 fail in production before giving credit."
            }
        }
    }
}

/// Everything the judge is shown for one cell.
#[derive(Debug, Clone, Copy)]
pub struct JudgeInput<'a> {
    pub brief: &'a str,
    pub output_type: &'a str,
    pub cell: &'a Cell,
    pub blueprint: &'a str,
    pub execution: Option<&'a str>,
    pub baselines: &'a [Baseline],
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum JudgeError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("judge reply has no numeric score")]
    MissingScore,
}

// ── Prompt ─────────────────────────────────────────────────────────

/// Build `(system_prompt, user_prompt)` for one judge call.
pub fn judge_prompts(
    input: &JudgeInput<'_>,
    options: &JudgeOptions,
    persona: JudgePersona,
) -> (String, String) {
    let system = format!(
        "{}\n\n## Rubric\n{}\n\nReply with one JSON object and nothing else: \
         {{\"score\": <number 0-10>, \"critique\": \"<two to four sentences>\"}}",
        persona.preamble(),
        options.strictness.rubric(),
    );

    let mut user = String::new();
    let _ = writeln!(user, "## Brief\n{}\n", input.brief.trim());
    let _ = writeln!(
        user,
        "## Requested controls\n- Output type: {}\n- Tone: {}\n- Length: {}\n- Format: {}\n",
        input.output_type, input.cell.tone, input.cell.length, input.cell.format
    );
    let anchors: Vec<&Baseline> = input.baselines.iter().take(MAX_BASELINES).collect();
    if !anchors.is_empty() {
        user.push_str("## Calibration anchors\n");
        for b in anchors {
            match b.score {
                Some(score) => {
                    let _ = writeln!(user, "### {} (scored {score})\n{}\n", b.label, b.text.trim());
                }
                None => {
                    let _ = writeln!(user, "### {}\n{}\n", b.label, b.text.trim());
                }
            }
        }
    }
    let _ = writeln!(user, "## Prompt under review\n{}", input.blueprint.trim());
    if let Some(exec) = input.execution.filter(|e| !e.trim().is_empty()) {
        let _ = write!(user, "\n## Output produced by running the prompt\n{}\n", exec.trim());
    }
    (system, user.trim_end().to_string())
}

// ── Verdict parsing ────────────────────────────────────────────────

const SCORE_PATHS: &[&str] = &[
    "score",
    "rating",
    "overall_score",
    "overallScore",
    "evaluation.score",
];
const CRITIQUE_PATHS: &[&str] = &[
    "critique",
    "feedback",
    "reasoning",
    "comments",
    "evaluation.critique",
];

/// Parse a judge reply into a clamped score and critique.
pub fn parse_verdict(reply: &Value) -> Result<AiEvaluation, JudgeError> {
    if let Value::String(text) = reply {
        let stripped = strip_code_fences(text);
        if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(stripped) {
            return parse_verdict(&v);
        }
        return score_from(reply)
            .map(|score| AiEvaluation {
                score,
                critique: String::new(),
            })
            .ok_or(JudgeError::MissingScore);
    }

    let score = SCORE_PATHS
        .iter()
        .find_map(|p| resolve(reply, p).and_then(score_from))
        .ok_or(JudgeError::MissingScore)?;
    let critique = CRITIQUE_PATHS
        .iter()
        .find_map(|p| match resolve(reply, p) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        })
        .unwrap_or_default();
    Ok(AiEvaluation { score, critique })
}

/// Numbers, numeric strings and `"7/10"` forms, clamped to `[0, 10]`.
fn score_from(value: &Value) -> Option<f64> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let s = s.trim();
            match s.split_once('/') {
                Some((num, den)) => {
                    let num: f64 = num.trim().parse().ok()?;
                    let den: f64 = den.trim().parse().ok()?;
                    if den <= 0.0 {
                        return None;
                    }
                    num / den * MAX_SCORE
                }
                None => s.parse().ok()?,
            }
        }
        _ => return None,
    };
    raw.is_finite().then(|| raw.clamp(MIN_SCORE, MAX_SCORE))
}

/// Merge independent verdicts: mean score, critiques joined in order.
pub fn combine(verdicts: Vec<AiEvaluation>) -> Option<Evaluation> {
    if verdicts.is_empty() {
        return None;
    }
    let score = verdicts.iter().map(|v| v.score).sum::<f64>() / verdicts.len() as f64;
    let critique = verdicts
        .into_iter()
        .map(|v| v.critique)
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    Some(Evaluation {
        ai: AiEvaluation { score, critique },
    })
}

// ── Judge ──────────────────────────────────────────────────────────

/// A configured judge bound to a model collaborator.
pub struct Judge<'a> {
    caller: &'a dyn ModelCaller,
    model_id: String,
    api_key: Option<String>,
    options: JudgeOptions,
    max_tokens: u32,
    temperature: f32,
}

impl<'a> Judge<'a> {
    pub fn new(caller: &'a dyn ModelCaller, model_id: impl Into<String>) -> Self {
        Self {
            caller,
            model_id: model_id.into(),
            api_key: None,
            options: JudgeOptions::default(),
            max_tokens: 0,
            temperature: 0.0,
        }
    }

    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }

    pub fn with_options(mut self, options: JudgeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_limits(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Score one cell. `None` when every judge call failed.
    pub async fn evaluate(
        &self,
        input: &JudgeInput<'_>,
        cancel: &CancellationToken,
    ) -> Option<Evaluation> {
        let personas: &[JudgePersona] = if self.options.dual_judge {
            &[JudgePersona::Primary, JudgePersona::Skeptic]
        } else {
            &[JudgePersona::Primary]
        };

        let mut verdicts = Vec::with_capacity(personas.len());
        for &persona in personas {
            match self.verdict(input, persona, cancel).await {
                Ok(v) => {
                    debug!("Judge {persona:?} scored {:.1}", v.score);
                    verdicts.push(v);
                }
                Err(JudgeError::Provider(ProviderError::Cancelled)) => {
                    debug!("Judging cancelled");
                    return None;
                }
                Err(e) => warn!("Judge {persona:?} failed: {e}"),
            }
        }
        combine(verdicts)
    }

    async fn verdict(
        &self,
        input: &JudgeInput<'_>,
        persona: JudgePersona,
        cancel: &CancellationToken,
    ) -> Result<AiEvaluation, JudgeError> {
        let (system, user) = judge_prompts(input, &self.options, persona);
        let request = ModelRequest::new(&self.model_id, system, user)
            .with_api_key(self.api_key.clone())
            .with_json(true)
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature);
        let reply = self.caller.call(request, cancel).await?;
        parse_verdict(&reply)
    }
}
