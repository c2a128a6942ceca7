//! Locate the deliverable text inside a model reply.
//!
//! Models are asked for `{analysis, reverse_prompting, final_output}` but
//! providers and model versions drift: the text ends up under different
//! keys, the whole reply arrives as a fenced string, or `final_output` is a
//! bare string. [`extract_deliverable`] walks a fixed list of candidate
//! paths and then degrades to progressively coarser fallbacks.

use crate::template::resolve;
use serde_json::Value;
use tracing::debug;

/// Candidate dot-paths, tried in order. The first non-blank string wins.
pub const CANDIDATE_PATHS: &[&str] = &[
    "final_output.expanded_prompt_text",
    "final_output.expanded_prompt",
    "final_output.prompt_text",
    "final_output.final_prompt",
    "final_output.prompt",
    "final_output.text",
    "final_output.content",
    "final_output.output",
    "finalOutput.expandedPromptText",
    "finalOutput.expandedPrompt",
    "finalOutput.text",
    "expanded_prompt_text",
    "expandedPromptText",
    "final_prompt",
    "finalPrompt",
    "output.text",
    "result.text",
];

/// Extract the deliverable from `reply`.
///
/// Returns an empty string only for an empty reply (null, blank string,
/// empty object or array); callers treat that as a parse failure.
pub fn extract_deliverable(reply: &Value) -> String {
    match reply {
        Value::Null => String::new(),
        Value::String(s) => extract_from_text(s),
        Value::Object(map) if map.is_empty() => String::new(),
        Value::Array(items) if items.is_empty() => String::new(),
        other => extract_from_value(other),
    }
}

/// A reply that arrived as text: parse it as JSON if it looks like JSON,
/// otherwise the text itself is the deliverable.
fn extract_from_text(text: &str) -> String {
    let stripped = strip_code_fences(text);
    if stripped.is_empty() {
        return String::new();
    }
    match serde_json::from_str::<Value>(stripped) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => extract_deliverable(&value),
        Ok(Value::Null) => String::new(),
        // A JSON-encoded string: unwrap one level.
        Ok(Value::String(inner)) => extract_from_text(&inner),
        _ => stripped.to_string(),
    }
}

fn extract_from_value(reply: &Value) -> String {
    for path in CANDIDATE_PATHS {
        if let Some(Value::String(s)) = resolve(reply, path) {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }

    let final_output = reply.get("final_output").or_else(|| reply.get("finalOutput"));
    match final_output {
        Some(Value::String(s)) if !s.trim().is_empty() => {
            debug!("Deliverable taken from bare final_output string");
            return s.trim().to_string();
        }
        Some(obj @ Value::Object(map)) if !map.is_empty() => {
            debug!("No known deliverable key; serializing final_output");
            return obj.to_string();
        }
        _ => {}
    }

    debug!("No final_output; serializing entire reply");
    reply.to_string()
}

/// Remove a surrounding markdown code fence (```` ```json ... ``` ````).
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. `json`) on the opening line.
    let body = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
