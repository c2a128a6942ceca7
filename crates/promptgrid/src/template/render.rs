//! Closed-form `{{dot.path}}` renderer.
//!
//! The grammar is fixed: `{{`, optional whitespace, a dot-path of
//! `[A-Za-z0-9_-]` segments, optional whitespace, `}}`. Tokens are looked up
//! in the context and replaced by the value's string form; an unresolved
//! token renders as the empty string. Text that does not match the grammar
//! is copied through untouched. There is no iteration, no filters and no
//! expression evaluation.

use super::context::{display_value, is_valid_path, resolve};
use serde_json::Value;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Render `template` against `ctx`.
pub fn render(template: &str, ctx: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some((before, after_open)) = rest.split_once(OPEN) {
        out.push_str(before);
        match after_open.split_once(CLOSE) {
            Some((inner, after_close)) => {
                let path = inner.trim();
                if is_valid_path(path) {
                    out.push_str(&display_value(resolve(ctx, path)));
                } else {
                    out.push_str(OPEN);
                    out.push_str(inner);
                    out.push_str(CLOSE);
                }
                rest = after_close;
            }
            None => {
                out.push_str(OPEN);
                rest = after_open;
                break;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Problem found while scanning a template for tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenIssue {
    /// `{{` at this byte offset has no matching `}}`.
    Unterminated { offset: usize },
    /// A `{{ ... }}` pair whose content is not a valid dot-path.
    InvalidPath(String),
}

/// List every token path in `template`, in order of appearance.
///
/// Used at spec construction time to reject malformed templates before a
/// run can start.
pub fn scan_tokens(template: &str) -> Result<Vec<String>, TokenIssue> {
    let mut paths = Vec::new();
    let mut offset = 0;
    let mut rest = template;

    while let Some(open_at) = rest.find(OPEN) {
        let after_open = &rest[open_at + OPEN.len()..];
        let Some(close_at) = after_open.find(CLOSE) else {
            return Err(TokenIssue::Unterminated {
                offset: offset + open_at,
            });
        };
        let path = after_open[..close_at].trim();
        if !is_valid_path(path) {
            return Err(TokenIssue::InvalidPath(path.to_string()));
        }
        paths.push(path.to_string());

        let consumed = open_at + OPEN.len() + close_at + CLOSE.len();
        offset += consumed;
        rest = &rest[consumed..];
    }

    Ok(paths)
}
