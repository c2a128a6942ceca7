//! Prompt spec data model and the additive merge.

use crate::template::Condition;
use serde::{Deserialize, Serialize};

/// Which prompt a step contributes to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[default]
    System,
    User,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::System => "system",
            Channel::User => "user",
        }
    }
}

/// One conditionally-included block of template text.
///
/// A step with no conditions always renders; otherwise every condition must
/// hold. `required` paths must be present whenever the step is active.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    #[serde(default)]
    pub channel: Channel,
    pub template: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

impl Step {
    pub fn system(id: impl Into<String>, template: impl Into<String>) -> Self {
        Self::new(id, Channel::System, template)
    }

    pub fn user(id: impl Into<String>, template: impl Into<String>) -> Self {
        Self::new(id, Channel::User, template)
    }

    fn new(id: impl Into<String>, channel: Channel, template: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            channel,
            template: template.into(),
            conditions: Vec::new(),
            required: Vec::new(),
        }
    }

    /// Add a condition (builder pattern). Conditions are AND-ed.
    pub fn when(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Mark a dot-path as required while this step is active.
    pub fn requires(mut self, path: impl Into<String>) -> Self {
        self.required.push(path.into());
        self
    }
}

/// Descriptive metadata exposed to templates under `spec.*`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SpecMetadata {
    pub label: String,
    pub persona: String,
    pub mission: String,
    #[serde(default)]
    pub pipeline: Vec<String>,
    #[serde(default)]
    pub guardrails: Vec<String>,
    #[serde(default)]
    pub enrichment: Vec<String>,
}

/// The complete, merged definition of one output type.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PromptSpec {
    pub id: String,
    pub version: String,
    pub metadata: SpecMetadata,
    pub system_steps: Vec<Step>,
    pub user_steps: Vec<Step>,
}

impl PromptSpec {
    /// Steps for one channel, in declared order.
    pub fn steps(&self, channel: Channel) -> &[Step] {
        match channel {
            Channel::System => &self.system_steps,
            Channel::User => &self.user_steps,
        }
    }

    /// Iterate every step, system channel first.
    pub fn all_steps(&self) -> impl Iterator<Item = &Step> {
        self.system_steps.iter().chain(self.user_steps.iter())
    }
}

/// Shallow metadata overrides. Scalars replace the base value when set;
/// lists are appended to the base lists.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct MetadataOverrides {
    pub label: Option<String>,
    pub persona: Option<String>,
    pub mission: Option<String>,
    pub pipeline: Vec<String>,
    pub guardrails: Vec<String>,
    pub enrichment: Vec<String>,
}

/// Everything an output type adds on top of the shared base spec.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpecOverrides {
    pub id: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub metadata: MetadataOverrides,
    #[serde(default)]
    pub system_steps: Vec<Step>,
    #[serde(default)]
    pub user_steps: Vec<Step>,
}

impl SpecOverrides {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: None,
            metadata: MetadataOverrides::default(),
            system_steps: Vec::new(),
            user_steps: Vec::new(),
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.metadata.label = Some(label.into());
        self
    }

    pub fn persona(mut self, persona: impl Into<String>) -> Self {
        self.metadata.persona = Some(persona.into());
        self
    }

    pub fn mission(mut self, mission: impl Into<String>) -> Self {
        self.metadata.mission = Some(mission.into());
        self
    }

    pub fn pipeline<I: IntoIterator<Item = S>, S: Into<String>>(mut self, items: I) -> Self {
        self.metadata.pipeline.extend(items.into_iter().map(Into::into));
        self
    }

    pub fn guardrails<I: IntoIterator<Item = S>, S: Into<String>>(mut self, items: I) -> Self {
        self.metadata.guardrails.extend(items.into_iter().map(Into::into));
        self
    }

    pub fn enrichment<I: IntoIterator<Item = S>, S: Into<String>>(mut self, items: I) -> Self {
        self.metadata.enrichment.extend(items.into_iter().map(Into::into));
        self
    }

    pub fn system_step(mut self, step: Step) -> Self {
        self.system_steps.push(step);
        self
    }

    pub fn user_step(mut self, step: Step) -> Self {
        self.user_steps.push(step);
        self
    }
}

/// Merge `overrides` onto `base`.
///
/// The result takes the override id, the override version when present,
/// shallow-overridden scalar metadata, and the base lists with the override
/// lists appended. Step channels are normalized to the list they sit in.
pub fn merge_spec(base: &PromptSpec, overrides: SpecOverrides) -> PromptSpec {
    let SpecOverrides {
        id,
        version,
        metadata: meta,
        system_steps,
        user_steps,
    } = overrides;

    let metadata = SpecMetadata {
        label: meta.label.unwrap_or_else(|| base.metadata.label.clone()),
        persona: meta.persona.unwrap_or_else(|| base.metadata.persona.clone()),
        mission: meta.mission.unwrap_or_else(|| base.metadata.mission.clone()),
        pipeline: appended(&base.metadata.pipeline, meta.pipeline),
        guardrails: appended(&base.metadata.guardrails, meta.guardrails),
        enrichment: appended(&base.metadata.enrichment, meta.enrichment),
    };

    PromptSpec {
        id,
        version: version.unwrap_or_else(|| base.version.clone()),
        metadata,
        system_steps: appended_steps(&base.system_steps, system_steps, Channel::System),
        user_steps: appended_steps(&base.user_steps, user_steps, Channel::User),
    }
}

fn appended(base: &[String], extra: Vec<String>) -> Vec<String> {
    let mut out = base.to_vec();
    out.extend(extra);
    out
}

fn appended_steps(base: &[Step], extra: Vec<Step>, channel: Channel) -> Vec<Step> {
    base.iter()
        .cloned()
        .chain(extra)
        .map(|mut step| {
            step.channel = channel;
            step
        })
        .collect()
}
