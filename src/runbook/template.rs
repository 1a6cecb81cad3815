//! Placeholder resolution for step parameters.
//!
//! String leaves may embed `{{ path.to.value }}` expressions. Each is replaced by
//! the string form of the value found by walking the dot-separated path through
//! the context. Unresolvable placeholders are left exactly as written so a later
//! step can still fill them in.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

use super::{Context, Params};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").expect("placeholder pattern is valid"));

/// Walk `path` (dot separated) through the context.
///
/// Returns `None` if any segment is missing or an intermediate value is not a map.
pub fn lookup<'a>(context: &'a Context, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.').map(str::trim);
    let first = segments.next().filter(|s| !s.is_empty())?;
    let mut current = context.get(first)?;

    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }

    Some(current)
}

/// String form used when substituting a value into a template.
pub fn display_value(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s),
        Value::Null => Cow::Borrowed("null"),
        other => Cow::Owned(other.to_string()),
    }
}

/// Resolve every placeholder in a single string.
pub fn resolve_str(template: &str, context: &Context) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match lookup(context, &caps[1]) {
            Some(value) => display_value(value).into_owned(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Resolve a value tree, preserving its shape.
pub fn resolve_value(value: &Value, context: &Context) -> Value {
    match value {
        Value::String(s) => Value::String(resolve_str(s, context)),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| resolve_value(v, context)).collect())
        }
        Value::Object(map) => Value::Object(resolve_params(map, context)),
        other => other.clone(),
    }
}

/// Resolve a parameter map.
pub fn resolve_params(params: &Params, context: &Context) -> Params {
    params.iter().map(|(k, v)| (k.clone(), resolve_value(v, context))).collect()
}

/// Placeholder paths referenced by a string, in order of appearance.
pub fn placeholders(template: &str) -> Vec<&str> {
    PLACEHOLDER.captures_iter(template).filter_map(|c| c.get(1)).map(|m| m.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(value: Value) -> Context {
        match value {
            Value::Object(map) => map,
            _ => panic!("context must be an object"),
        }
    }

    #[test]
    fn test_resolve_nested_path() {
        let context = ctx(json!({"a": {"b": 5}}));
        assert_eq!(resolve_str("{{ a.b }}", &context), "5");
        assert_eq!(resolve_str("{{a.b}}", &context), "5");
    }

    #[test]
    fn test_missing_path_left_untouched() {
        let context = ctx(json!({"a": {"b": 5}}));
        assert_eq!(resolve_str("{{ a.c }}", &context), "{{ a.c }}");
        assert_eq!(resolve_str("{{ missing }}", &context), "{{ missing }}");
    }

    #[test]
    fn test_non_map_intermediate_left_untouched() {
        let context = ctx(json!({"a": {"b": 5}, "list": [1, 2]}));
        assert_eq!(resolve_str("{{ a.b.c }}", &context), "{{ a.b.c }}");
        assert_eq!(resolve_str("{{ list.0 }}", &context), "{{ list.0 }}");
    }

    #[test]
    fn test_multiple_placeholders_resolved_independently() {
        let context = ctx(json!({"ns": "prod", "app": {"name": "api"}}));
        assert_eq!(
            resolve_str("{{ app.name }}.{{ ns }} / {{ nope }}", &context),
            "api.prod / {{ nope }}"
        );
    }

    #[test]
    fn test_value_string_forms() {
        let context = ctx(json!({
            "s": "text",
            "n": 1.5,
            "b": true,
            "z": null,
            "m": {"k": "v"},
            "l": [1, "two"]
        }));
        assert_eq!(resolve_str("{{ s }}", &context), "text");
        assert_eq!(resolve_str("{{ n }}", &context), "1.5");
        assert_eq!(resolve_str("{{ b }}", &context), "true");
        assert_eq!(resolve_str("{{ z }}", &context), "null");
        assert_eq!(resolve_str("{{ m }}", &context), r#"{"k":"v"}"#);
        assert_eq!(resolve_str("{{ l }}", &context), r#"[1,"two"]"#);
    }

    #[test]
    fn test_value_equal_to_context_still_resolves() {
        // A resolved value that happens to mirror the context is still a hit
        let context = ctx(json!({"self": {"self": 1}}));
        assert_eq!(resolve_str("{{ self }}", &context), r#"{"self":1}"#);
    }

    #[test]
    fn test_resolve_value_preserves_shape() {
        let context = ctx(json!({"name": "web", "limits": {"memory": "512Mi"}}));
        let params = json!({
            "name": "{{ name }}",
            "replicas": 3,
            "enabled": false,
            "patch": {"memory": "{{ limits.memory }}", "cpu": "{{ limits.cpu }}"},
            "tags": ["{{ name }}", 7, null]
        });

        let resolved = resolve_value(&params, &context);

        assert_eq!(
            resolved,
            json!({
                "name": "web",
                "replicas": 3,
                "enabled": false,
                "patch": {"memory": "512Mi", "cpu": "{{ limits.cpu }}"},
                "tags": ["web", 7, null]
            })
        );
    }

    #[test]
    fn test_empty_placeholder_untouched() {
        let context = ctx(json!({"a": 1}));
        assert_eq!(resolve_str("{{ }}", &context), "{{ }}");
        assert_eq!(resolve_str("plain text", &context), "plain text");
    }

    #[test]
    fn test_placeholders_listed() {
        assert_eq!(placeholders("{{ a.b }} and {{c}}"), vec!["a.b", "c"]);
        assert!(placeholders("nothing here").is_empty());
    }
}
