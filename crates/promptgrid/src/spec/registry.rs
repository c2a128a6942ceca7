//! Immutable output-type registry built once at startup.
//!
//! [`RegistryBuilder`] collects a base spec and per-type [`SpecOverrides`],
//! merges and validates them in [`build`](RegistryBuilder::build), and
//! yields a [`PromptSpecRegistry`] that is never mutated afterwards. Adding
//! an output type only requires another set of overrides; the assembler and
//! renderer are untouched.

use super::types::{PromptSpec, SpecOverrides, Step, merge_spec};
use crate::error::SpecError;
use crate::template::{Operator, is_valid_path};
use crate::template::render::{TokenIssue, scan_tokens};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Read-only mapping from output-type id to merged [`PromptSpec`].
#[derive(Debug, Clone)]
pub struct PromptSpecRegistry {
    specs: BTreeMap<String, PromptSpec>,
    default_id: Option<String>,
}

impl PromptSpecRegistry {
    /// Start a builder on top of `base`.
    pub fn builder(base: PromptSpec) -> RegistryBuilder {
        RegistryBuilder {
            base,
            overrides: Vec::new(),
            default_id: None,
        }
    }

    /// Look up the spec for `output_type`.
    ///
    /// Unknown ids fail with [`SpecError::UnknownOutputType`] unless a
    /// default was designated with [`RegistryBuilder::with_default`].
    pub fn get(&self, output_type: &str) -> Result<&PromptSpec, SpecError> {
        if let Some(spec) = self.specs.get(output_type) {
            return Ok(spec);
        }
        match self.default_id.as_deref().and_then(|id| self.specs.get(id)) {
            Some(spec) => {
                debug!(
                    "Unknown output type '{output_type}', using default '{}'",
                    spec.id
                );
                Ok(spec)
            }
            None => Err(SpecError::UnknownOutputType(output_type.to_string())),
        }
    }

    /// Registered output-type ids, sorted.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    /// All registered specs, sorted by id.
    pub fn specs(&self) -> impl Iterator<Item = &PromptSpec> {
        self.specs.values()
    }

    /// The designated fallback output type, if any.
    pub fn default_id(&self) -> Option<&str> {
        self.default_id.as_deref()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// One-shot construction of a [`PromptSpecRegistry`].
#[derive(Debug, Clone)]
pub struct RegistryBuilder {
    base: PromptSpec,
    overrides: Vec<SpecOverrides>,
    default_id: Option<String>,
}

impl RegistryBuilder {
    /// Register an output type.
    pub fn register(mut self, overrides: SpecOverrides) -> Self {
        self.overrides.push(overrides);
        self
    }

    /// Register output types declared in JSON: a single overrides object or
    /// an array of them.
    pub fn extend_from_json(mut self, json: &str) -> Result<Self, SpecError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| SpecError::Parse(e.to_string()))?;
        let parsed: Vec<SpecOverrides> = if value.is_array() {
            serde_json::from_value(value)
        } else {
            serde_json::from_value(value).map(|one| vec![one])
        }
        .map_err(|e| SpecError::Parse(e.to_string()))?;
        self.overrides.extend(parsed);
        Ok(self)
    }

    /// Designate the output type used when a lookup misses.
    pub fn with_default(mut self, id: impl Into<String>) -> Self {
        self.default_id = Some(id.into());
        self
    }

    /// Merge, validate and freeze.
    pub fn build(self) -> Result<PromptSpecRegistry, SpecError> {
        let mut specs = BTreeMap::new();
        for overrides in self.overrides {
            let spec = merge_spec(&self.base, overrides);
            validate_spec(&spec)?;
            if specs.contains_key(&spec.id) {
                return Err(SpecError::DuplicateOutputType(spec.id));
            }
            specs.insert(spec.id.clone(), spec);
        }

        if let Some(ref id) = self.default_id
            && !specs.contains_key(id)
        {
            return Err(SpecError::UnknownDefault(id.clone()));
        }

        debug!("Prompt spec registry built with {} output type(s)", specs.len());
        Ok(PromptSpecRegistry {
            specs,
            default_id: self.default_id,
        })
    }
}

/// Reject specs that could only fail later, mid-run.
pub fn validate_spec(spec: &PromptSpec) -> Result<(), SpecError> {
    if spec.id.trim().is_empty() {
        return Err(SpecError::EmptyId);
    }
    let mut seen = HashSet::new();
    for step in spec.all_steps() {
        if !seen.insert(step.id.as_str()) {
            return Err(SpecError::DuplicateStep {
                spec: spec.id.clone(),
                step: step.id.clone(),
            });
        }
        validate_step(&spec.id, step)?;
    }
    Ok(())
}

fn validate_step(spec_id: &str, step: &Step) -> Result<(), SpecError> {
    if step.template.trim().is_empty() {
        return Err(SpecError::EmptyTemplate {
            spec: spec_id.to_string(),
            step: step.id.clone(),
        });
    }

    scan_tokens(&step.template).map_err(|issue| match issue {
        TokenIssue::Unterminated { offset } => SpecError::UnterminatedToken {
            spec: spec_id.to_string(),
            step: step.id.clone(),
            offset,
        },
        TokenIssue::InvalidPath(path) => SpecError::InvalidTokenPath {
            spec: spec_id.to_string(),
            step: step.id.clone(),
            path,
        },
    })?;

    for condition in &step.conditions {
        if !is_valid_path(&condition.field) {
            return Err(SpecError::InvalidConditionPath {
                spec: spec_id.to_string(),
                step: step.id.clone(),
                field: condition.field.clone(),
            });
        }
        if condition.operator != Operator::Exists && condition.value.is_none() {
            return Err(SpecError::MissingConditionValue {
                spec: spec_id.to_string(),
                step: step.id.clone(),
                field: condition.field.clone(),
                operator: condition.operator.to_string(),
            });
        }
    }
    Ok(())
}
