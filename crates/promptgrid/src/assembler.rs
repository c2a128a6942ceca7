//! Prompt plan assembly: one cell + global inputs -> system/user prompts.
//!
//! [`Assembler::assemble`] builds a single JSON context for the cell, walks
//! the spec's system steps then user steps in declared order, keeps the
//! steps whose conditions hold, renders them, and joins the survivors with
//! blank lines. The output is a pure function of `(spec, cell, inputs,
//! catalog)`: no I/O, no clocks, no randomness, and all maps are ordered.

use crate::error::{AssemblyError, SpecError};
use crate::matrix::Cell;
use crate::spec::{Channel, PromptSpec, PromptSpecRegistry};
use crate::template::{all_hold, display_value, is_present, render, resolve};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

/// Separator between rendered steps.
pub const STEP_SEPARATOR: &str = "\n\n";

// ── Descriptors ────────────────────────────────────────────────────

/// What a tone, length, format or style identifier means to the model.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub id: String,
    pub label: String,
    pub guidance: String,
}

impl Descriptor {
    pub fn new(id: &str, label: &str, guidance: &str) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            guidance: guidance.into(),
        }
    }
}

/// Identifier -> descriptor tables for every axis.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct DescriptorCatalog {
    pub tones: BTreeMap<String, Descriptor>,
    pub lengths: BTreeMap<String, Descriptor>,
    pub formats: BTreeMap<String, Descriptor>,
    pub styles: BTreeMap<String, Descriptor>,
}

impl DescriptorCatalog {
    /// The built-in descriptors.
    pub fn builtin() -> Self {
        let table = |items: Vec<Descriptor>| {
            items
                .into_iter()
                .map(|d| (d.id.clone(), d))
                .collect::<BTreeMap<_, _>>()
        };
        Self {
            tones: table(vec![
                Descriptor::new("professional", "Professional", "polished, precise, no slang"),
                Descriptor::new("casual", "Casual", "relaxed, conversational, contractions welcome"),
                Descriptor::new("friendly", "Friendly", "warm and encouraging"),
                Descriptor::new("authoritative", "Authoritative", "confident, expert, decisive"),
                Descriptor::new("playful", "Playful", "light humor and energy"),
                Descriptor::new("empathetic", "Empathetic", "acknowledges the reader's situation first"),
            ]),
            lengths: table(vec![
                Descriptor::new("short", "Short", "under 150 words"),
                Descriptor::new("medium", "Medium", "150 to 400 words"),
                Descriptor::new("long", "Long", "400 to 1000 words"),
            ]),
            formats: table(vec![
                Descriptor::new("paragraph", "Paragraphs", "flowing prose paragraphs"),
                Descriptor::new("bullets", "Bullet list", "one idea per bullet"),
                Descriptor::new("numbered", "Numbered steps", "ordered, actionable steps"),
                Descriptor::new("table", "Table", "a markdown table with a header row"),
                Descriptor::new("json", "JSON", "a single valid JSON document"),
                Descriptor::new("markdown", "Markdown", "headings, lists and emphasis as needed"),
            ]),
            styles: table(vec![
                Descriptor::new("concise", "Concise", "no filler, every sentence earns its place"),
                Descriptor::new("storytelling", "Storytelling", "narrative arc with a concrete example"),
                Descriptor::new("technical", "Technical", "exact terminology, specifications first"),
                Descriptor::new("persuasive", "Persuasive", "benefit-led with a clear ask"),
            ]),
        }
    }

    /// Entries from `extra` are added, replacing same-id entries.
    pub fn merged_with(mut self, extra: &DescriptorCatalog) -> Self {
        let merge = |into: &mut BTreeMap<String, Descriptor>, from: &BTreeMap<String, Descriptor>| {
            into.extend(from.iter().map(|(k, v)| (k.clone(), v.clone())));
        };
        merge(&mut self.tones, &extra.tones);
        merge(&mut self.lengths, &extra.lengths);
        merge(&mut self.formats, &extra.formats);
        merge(&mut self.styles, &extra.styles);
        self
    }

    fn lookup<'a>(
        table: &'a BTreeMap<String, Descriptor>,
        axis: &'static str,
        id: &str,
    ) -> Result<&'a Descriptor, AssemblyError> {
        table.get(id).ok_or_else(|| AssemblyError::UnknownAxisValue {
            axis,
            id: id.to_string(),
        })
    }
}

// ── Inputs and output ──────────────────────────────────────────────

/// Experiment-wide inputs shared by every cell.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct GlobalInputs {
    /// Free-text brief.
    pub brief: String,
    /// Output-type id resolved against the spec registry.
    pub output_type: String,
    /// Optional style id.
    pub style: Option<String>,
    /// Named boolean flags, exposed to conditions as `toggles.<name>`.
    pub toggles: BTreeMap<String, bool>,
    pub notes: Option<String>,
    pub constraints: Vec<String>,
    /// Output-type-specific structured fields, exposed as `typeSpecific.*`.
    #[schemars(with = "BTreeMap<String, serde_json::Value>")]
    pub type_specific: Map<String, Value>,
}

/// The rendered prompt pair for one cell.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PromptPlan {
    pub system_prompt: String,
    pub user_prompt: String,
}

// ── Assembler ──────────────────────────────────────────────────────

/// Builds [`PromptPlan`]s from a registry and a descriptor catalog.
#[derive(Debug, Clone)]
pub struct Assembler<'a> {
    registry: &'a PromptSpecRegistry,
    catalog: DescriptorCatalog,
}

impl<'a> Assembler<'a> {
    pub fn new(registry: &'a PromptSpecRegistry, catalog: DescriptorCatalog) -> Self {
        Self { registry, catalog }
    }

    /// Resolve the spec for `inputs.output_type`. Fails fast on unknown ids.
    pub fn spec_for(&self, inputs: &GlobalInputs) -> Result<&'a PromptSpec, SpecError> {
        self.registry.get(&inputs.output_type)
    }

    /// Assemble the prompts for one cell.
    pub fn assemble(
        &self,
        spec: &PromptSpec,
        cell: &Cell,
        inputs: &GlobalInputs,
    ) -> Result<PromptPlan, AssemblyError> {
        let ctx = build_context(spec, cell, inputs, &self.catalog)?;
        let system_prompt = render_channel(spec, Channel::System, &ctx)?;
        let user_prompt = render_channel(spec, Channel::User, &ctx)?;
        Ok(PromptPlan {
            system_prompt,
            user_prompt,
        })
    }

    /// Resolve the spec and assemble in one call.
    pub fn assemble_for(&self, cell: &Cell, inputs: &GlobalInputs) -> Result<PromptPlan, AssembleFailure> {
        let spec = self.spec_for(inputs)?;
        Ok(self.assemble(spec, cell, inputs)?)
    }
}

/// Error from [`Assembler::assemble_for`], which can fail at either stage.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum AssembleFailure {
    #[error(transparent)]
    Spec(#[from] SpecError),
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
}

/// Build the context object every step of `spec` is evaluated against.
pub fn build_context(
    spec: &PromptSpec,
    cell: &Cell,
    inputs: &GlobalInputs,
    catalog: &DescriptorCatalog,
) -> Result<Value, AssemblyError> {
    let tone = DescriptorCatalog::lookup(&catalog.tones, "tone", &cell.tone)?;
    let length = DescriptorCatalog::lookup(&catalog.lengths, "length", &cell.length)?;
    let format = DescriptorCatalog::lookup(&catalog.formats, "format", &cell.format)?;
    let style = match inputs.style.as_deref().filter(|s| !s.is_empty()) {
        Some(id) => Some(DescriptorCatalog::lookup(&catalog.styles, "style", id)?),
        None => None,
    };

    let meta = &spec.metadata;
    Ok(json!({
        "brief": inputs.brief.trim(),
        "notes": inputs.notes.as_deref().map(str::trim),
        "constraints": bullet_list(&inputs.constraints),
        "tone": tone,
        "length": length,
        "format": format,
        "style": style,
        "outputType": {"id": spec.id, "label": meta.label},
        "toggles": inputs.toggles,
        "typeSpecific": inputs.type_specific,
        "typeSpecificList": key_value_list(&inputs.type_specific),
        "cell": cell,
        "spec": {
            "id": spec.id,
            "version": spec.version,
            "label": meta.label,
            "persona": meta.persona,
            "mission": meta.mission,
            "pipelineList": bullet_list(&meta.pipeline),
            "guardrailsList": bullet_list(&meta.guardrails),
            "enrichmentList": bullet_list(&meta.enrichment),
        },
    }))
}

fn render_channel(spec: &PromptSpec, channel: Channel, ctx: &Value) -> Result<String, AssemblyError> {
    let mut blocks = Vec::new();
    for step in spec.steps(channel) {
        if !all_hold(&step.conditions, ctx) {
            continue;
        }
        if let Some(missing) = step.required.iter().find(|p| !is_present(resolve(ctx, p))) {
            return Err(AssemblyError::MissingField {
                step: step.id.clone(),
                field: missing.clone(),
            });
        }
        let rendered = render(&step.template, ctx);
        let trimmed = rendered.trim();
        if !trimmed.is_empty() {
            blocks.push(trimmed.to_string());
        }
    }
    if blocks.is_empty() {
        return Err(AssemblyError::EmptyPrompt {
            channel: channel.as_str(),
        });
    }
    Ok(blocks.join(STEP_SEPARATOR))
}

/// `- item` lines; `None` when there are no non-blank items.
fn bullet_list(items: &[String]) -> Option<String> {
    let lines: Vec<String> = items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| format!("- {s}"))
        .collect();
    if lines.is_empty() { None } else { Some(lines.join("\n")) }
}

/// `- key: value` lines in key order; `None` when nothing is present.
fn key_value_list(fields: &Map<String, Value>) -> Option<String> {
    let mut entries: Vec<(&String, &Value)> = fields.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    let lines: Vec<String> = entries
        .into_iter()
        .filter(|(_, v)| is_present(Some(v)))
        .map(|(k, v)| format!("- {k}: {}", display_value(Some(v))))
        .collect();
    if lines.is_empty() { None } else { Some(lines.join("\n")) }
}
