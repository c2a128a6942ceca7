//! Dot-path resolution over a JSON context object.

use serde_json::Value;

/// Resolve `path` (e.g. `typeSpecific.copy_type`) against `ctx`.
///
/// Walks one segment at a time. Objects are indexed by key, arrays by a
/// numeric segment. Any missing intermediate segment, or a `null` at the
/// end of the walk, yields `None` ("absent") rather than an error.
pub fn resolve<'a>(ctx: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    let mut current = ctx;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    if current.is_null() { None } else { Some(current) }
}

/// Whether `value` counts as present: not absent, not null, not `""`.
pub fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

/// String form of a resolved value as it appears in rendered text.
///
/// Strings render verbatim, numbers and booleans in their canonical JSON
/// form, absent values as `""`. Arrays and objects render as compact JSON;
/// list sections are expected to be flattened into the context beforehand.
pub fn display_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// Whether `path` matches the token grammar: non-empty segments of
/// `[A-Za-z0-9_-]` separated by single dots.
pub fn is_valid_path(path: &str) -> bool {
    !path.is_empty()
        && path.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_nested_paths() {
        let ctx = json!({"typeSpecific": {"copy_type": "landing"}, "n": 3});
        assert_eq!(
            resolve(&ctx, "typeSpecific.copy_type"),
            Some(&json!("landing"))
        );
        assert_eq!(resolve(&ctx, "n"), Some(&json!(3)));
    }

    #[test]
    fn missing_intermediate_segment_is_absent() {
        let ctx = json!({"a": {"b": 1}});
        assert_eq!(resolve(&ctx, "x.y.z"), None);
        assert_eq!(resolve(&ctx, "a.b.c"), None);
        assert_eq!(resolve(&ctx, ""), None);
    }

    #[test]
    fn null_is_absent() {
        let ctx = json!({"a": null});
        assert_eq!(resolve(&ctx, "a"), None);
    }

    #[test]
    fn array_segments_index_by_position() {
        let ctx = json!({"items": ["zero", "one"]});
        assert_eq!(resolve(&ctx, "items.1"), Some(&json!("one")));
        assert_eq!(resolve(&ctx, "items.5"), None);
        assert_eq!(resolve(&ctx, "items.first"), None);
    }

    #[test]
    fn presence_rules() {
        assert!(!is_present(None));
        assert!(!is_present(Some(&json!(""))));
        assert!(is_present(Some(&json!(0))));
        assert!(is_present(Some(&json!(false))));
        assert!(is_present(Some(&json!([]))));
    }

    #[test]
    fn display_forms() {
        assert_eq!(display_value(None), "");
        assert_eq!(display_value(Some(&json!("x"))), "x");
        assert_eq!(display_value(Some(&json!(2.5))), "2.5");
        assert_eq!(display_value(Some(&json!(true))), "true");
        assert_eq!(display_value(Some(&json!(["a", 1]))), r#"["a",1]"#);
    }

    #[test]
    fn path_grammar() {
        assert!(is_valid_path("spec.guardrailsList"));
        assert!(is_valid_path("typeSpecific.document_type"));
        assert!(is_valid_path("a-b.c_d.0"));
        assert!(!is_valid_path(""));
        assert!(!is_valid_path("a..b"));
        assert!(!is_valid_path(".a"));
        assert!(!is_valid_path("a b"));
        assert!(!is_valid_path("a.b()"));
    }
}
