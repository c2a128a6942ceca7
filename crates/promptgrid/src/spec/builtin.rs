//! Built-in base spec and output types.
//!
//! The base spec carries the persona/mission boilerplate, the generic
//! controls block, the pipeline/guardrail/enrichment summaries, the response
//! contract, the user brief and the optional notes. Each output type adds
//! metadata and steps on top; sub-type blueprints are gated on
//! `typeSpecific.*` fields.

use super::registry::{PromptSpecRegistry, RegistryBuilder};
use super::types::{PromptSpec, SpecMetadata, SpecOverrides, Step};
use crate::error::SpecError;
use crate::template::Condition;

pub const BASE_SPEC_VERSION: &str = "1.0.0";

/// The shared base every output type is merged onto.
pub fn base_spec() -> PromptSpec {
    PromptSpec {
        id: "base".into(),
        version: BASE_SPEC_VERSION.into(),
        metadata: SpecMetadata {
            label: "Prompt".into(),
            persona: "a senior prompt engineer who turns rough briefs into precise, \
                      reusable instructions for large language models"
                .into(),
            mission: "Expand the brief into a complete prompt that another model can \
                      follow without further clarification."
                .into(),
            pipeline: vec![
                "Analyse the brief: audience, goal, implicit requirements.".into(),
                "Reverse-prompt: state what an ideal answer would contain.".into(),
                "Draft the final prompt honoring every control below.".into(),
            ],
            guardrails: vec![
                "Do not invent facts, figures or quotes that are not in the brief.".into(),
                "Keep placeholders for anything the brief leaves unspecified.".into(),
            ],
            enrichment: vec![
                "Name the target audience explicitly.".into(),
                "State the success criteria the output will be judged by.".into(),
            ],
        },
        system_steps: vec![
            Step::system(
                "persona",
                "You are {{spec.persona}}.\n\nMission: {{spec.mission}}",
            ),
            Step::system(
                "controls",
                "## Controls\n\
                 - Output type: {{outputType.label}}\n\
                 - Tone: {{tone.label}} ({{tone.guidance}})\n\
                 - Length: {{length.label}} ({{length.guidance}})\n\
                 - Format: {{format.label}} ({{format.guidance}})",
            ),
            Step::system("style", "- Style: {{style.label}} ({{style.guidance}})")
                .when(Condition::exists("style.id")),
            Step::system("pipeline", "## Pipeline\n{{spec.pipelineList}}")
                .when(Condition::exists("spec.pipelineList")),
            Step::system("guardrails", "## Guardrails\n{{spec.guardrailsList}}")
                .when(Condition::exists("spec.guardrailsList")),
            Step::system("enrichment", "## Enrichment\n{{spec.enrichmentList}}")
                .when(Condition::exists("spec.enrichmentList")),
            Step::system(
                "chain-of-thought",
                "The prompt you write must ask the model to reason step by step \
                 before giving its final answer.",
            )
            .when(Condition::eq("toggles.chain_of_thought", true)),
            Step::system(
                "variables",
                "Express every reusable input as a {placeholder} variable and list \
                 the variables at the top of the prompt.",
            )
            .when(Condition::eq("toggles.variables", true)),
            Step::system(
                "response-contract",
                "## Response contract\n\
                 Reply with one JSON object and nothing else:\n\
                 {\"analysis\": {\"audience\": \"...\", \"goal\": \"...\"}, \
                 \"reverse_prompting\": {\"ideal_answer\": \"...\"}, \
                 \"final_output\": {\"expanded_prompt_text\": \"...\"}}",
            ),
        ],
        user_steps: vec![
            Step::user("brief", "## Brief\n{{brief}}").requires("brief"),
            Step::user("details", "## Details\n{{typeSpecificList}}")
                .when(Condition::exists("typeSpecificList")),
            Step::user("constraints", "## Constraints\n{{constraints}}")
                .when(Condition::exists("constraints")),
            Step::user("notes", "## Notes\n{{notes}}").when(Condition::exists("notes")),
        ],
    }
}

/// Overrides for every built-in output type.
pub fn builtin_overrides() -> Vec<SpecOverrides> {
    vec![general(), copy(), document(), code(), image()]
}

/// Builder pre-loaded with the base spec and the built-in output types.
pub fn builtin_builder() -> RegistryBuilder {
    builtin_overrides()
        .into_iter()
        .fold(PromptSpecRegistry::builder(base_spec()), |b, o| b.register(o))
}

/// The built-in registry. Unknown output types fail fast.
pub fn builtin_registry() -> Result<PromptSpecRegistry, SpecError> {
    builtin_builder().build()
}

fn general() -> SpecOverrides {
    SpecOverrides::new("general").label("General prompt")
}

fn copy() -> SpecOverrides {
    SpecOverrides::new("copy")
        .label("Marketing copy")
        .persona("a conversion copywriter who writes prompts for marketing teams")
        .guardrails([
            "No unverifiable superlatives (\"best\", \"#1\") unless the brief supplies proof.",
        ])
        .enrichment(["Include one concrete call to action."])
        .system_step(
            Step::system(
                "copy-landing",
                "## Blueprint: landing page\nHero headline, subheadline, three benefit \
                 blocks, social proof slot, primary call to action.",
            )
            .when(Condition::eq("typeSpecific.copy_type", "landing")),
        )
        .system_step(
            Step::system(
                "copy-email",
                "## Blueprint: email\nSubject line, preview text, opening hook, body, \
                 single call to action, sign-off.",
            )
            .when(Condition::eq("typeSpecific.copy_type", "email")),
        )
        .system_step(
            Step::system(
                "copy-ad",
                "## Blueprint: ad\nHeadline under 40 characters, description under 90 \
                 characters, call to action.",
            )
            .when(Condition::eq("typeSpecific.copy_type", "ad")),
        )
        .system_step(
            Step::system(
                "copy-example",
                "## Example\nBrief: \"Promote our spring sale\" -> a prompt that fixes \
                 the audience (existing customers), the offer (20% off), the deadline \
                 and the channel before asking for copy.",
            )
            .when(Condition::eq("toggles.examples", true)),
        )
        .user_step(
            Step::user("copy-product", "Product: {{typeSpecific.product}}")
                .when(Condition::exists("typeSpecific.product")),
        )
}

fn document() -> SpecOverrides {
    SpecOverrides::new("document")
        .label("Long-form document")
        .persona("a technical editor who designs prompts for structured documents")
        .pipeline(["Outline the document sections before drafting any prose."])
        .guardrails(["Every section heading must map to a requirement in the brief."])
        .system_step(
            Step::system(
                "document-report",
                "## Blueprint: report\nExecutive summary, background, findings, \
                 recommendations, appendix.",
            )
            .when(Condition::eq("typeSpecific.document_type", "report")),
        )
        .system_step(
            Step::system(
                "document-proposal",
                "## Blueprint: proposal\nProblem, proposed approach, scope, timeline, \
                 budget, risks.",
            )
            .when(Condition::eq("typeSpecific.document_type", "proposal")),
        )
        .system_step(
            Step::system(
                "document-sop",
                "## Blueprint: standard operating procedure\nPurpose, scope, roles, \
                 numbered procedure, exceptions, revision history.",
            )
            .when(Condition::eq("typeSpecific.document_type", "sop")),
        )
        .system_step(
            Step::system(
                "document-generic",
                "## Blueprint\nTitle, purpose statement, logically ordered sections, \
                 conclusion.",
            )
            .when(Condition::ne("typeSpecific.document_type", "report"))
            .when(Condition::ne("typeSpecific.document_type", "proposal"))
            .when(Condition::ne("typeSpecific.document_type", "sop")),
        )
        .user_step(
            Step::user("document-audience", "Readers: {{typeSpecific.audience}}")
                .when(Condition::exists("typeSpecific.audience")),
        )
}

fn code() -> SpecOverrides {
    SpecOverrides::new("code")
        .label("Coding task")
        .persona("a staff engineer who writes precise prompts for coding assistants")
        .guardrails([
            "Ask for tests alongside any code change.",
            "Never request credentials or secrets in the prompt.",
        ])
        .system_step(Step::system(
            "code-structure",
            "## Structure\nContext, task, inputs and outputs, constraints, acceptance \
             tests, expected deliverable format.",
        ))
        .system_step(
            Step::system(
                "code-language",
                "Target language: {{typeSpecific.language}}. Follow its idiomatic style \
                 and standard tooling.",
            )
            .when(Condition::exists("typeSpecific.language")),
        )
        .system_step(
            Step::system(
                "code-example",
                "## Example\nBrief: \"parse a CSV\" -> a prompt naming the delimiter, \
                 header handling, error behavior on malformed rows and the test cases.",
            )
            .when(Condition::eq("toggles.examples", true)),
        )
}

fn image() -> SpecOverrides {
    SpecOverrides::new("image")
        .label("Image generation")
        .persona("an art director who writes prompts for text-to-image models")
        .mission(
            "Expand the brief into a single, vivid image-generation prompt with subject, \
             composition, lighting and style.",
        )
        .guardrails(["No real people's likenesses or trademarked characters."])
        .system_step(Step::system(
            "image-anatomy",
            "## Prompt anatomy\nSubject, setting, composition, lighting, color palette, \
             medium, style references, negative prompt.",
        ))
        .system_step(
            Step::system(
                "image-aspect",
                "Aspect ratio: {{typeSpecific.aspect_ratio}}.",
            )
            .when(Condition::exists("typeSpecific.aspect_ratio")),
        )
}
