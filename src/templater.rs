//! Recursive `{{ identifier }}` substitution over nested JSON-like values.
//!
//! Grounded on the teacher's `substitute_string`/`substitute_params`/`substitute_value`
//! helpers in its capability executor: a regex-driven scan for bracketed
//! identifiers, substituted from a flat context map, walked recursively over
//! maps and sequences.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::{Error, Result};

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("valid token regex"));

/// Recursively substitute `{{ identifier }}` placeholders in `value` using
/// `context`. Strings, map values, and sequence elements are walked; any
/// other scalar is returned unchanged.
pub fn replace(value: &Value, context: &HashMap<String, Value>) -> Result<Value> {
    match value {
        Value::String(s) => Ok(Value::String(replace_string(s, context)?)),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), replace(v, context)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(replace(item, context)?);
            }
            Ok(Value::Array(out))
        }
        other => Ok(other.clone()),
    }
}

fn replace_string(input: &str, context: &HashMap<String, Value>) -> Result<String> {
    let mut result = String::with_capacity(input.len());
    let mut last = 0;
    for captures in TOKEN.captures_iter(input) {
        let whole = captures.get(0).expect("group 0 always present");
        let ident = &captures[1];
        result.push_str(&input[last..whole.start()]);
        let value = context
            .get(ident)
            .ok_or_else(|| Error::TemplateFailure(format!("unbound variable '{ident}'")))?;
        result.push_str(&stringify(ident, value)?);
        last = whole.end();
    }
    result.push_str(&input[last..]);
    Ok(result)
}

fn stringify(ident: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(Error::TemplateFailure(format!(
            "variable '{ident}' resolved to a non-templatable value: {other}"
        ))),
    }
}

/// Collect the set of distinct identifiers referenced anywhere in `value`.
pub fn extract_variables(value: &Value) -> HashSet<String> {
    let mut out = HashSet::new();
    collect_variables(value, &mut out);
    out
}

fn collect_variables(value: &Value, out: &mut HashSet<String>) {
    match value {
        Value::String(s) => {
            for captures in TOKEN.captures_iter(s) {
                out.insert(captures[1].to_string());
            }
        }
        Value::Object(map) => {
            for v in map.values() {
                collect_variables(v, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_variables(item, out);
            }
        }
        _ => {}
    }
}

/// Right-biased shallow merge of context maps: later maps override earlier
/// ones on key collision.
pub fn merge(contexts: &[&HashMap<String, Value>]) -> HashMap<String, Value> {
    let mut out = HashMap::new();
    for ctx in contexts {
        for (k, v) in ctx.iter() {
            out.insert(k.clone(), v.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn substitutes_scalar_types() {
        let context = ctx(&[
            ("name", json!("widget")),
            ("count", json!(3)),
            ("ratio", json!(1.5)),
            ("enabled", json!(true)),
            ("missing_val", Value::Null),
        ]);
        let value = json!("{{name}}-{{count}}-{{ratio}}-{{enabled}}-{{missing_val}}end");
        let result = replace(&value, &context).unwrap();
        assert_eq!(result, json!("widget-3-1.5-true-end"));
    }

    #[test]
    fn walks_maps_and_sequences() {
        let context = ctx(&[("id", json!("abc"))]);
        let value = json!({"label": "svc-{{id}}", "tags": ["{{id}}", "static"]});
        let result = replace(&value, &context).unwrap();
        assert_eq!(result, json!({"label": "svc-abc", "tags": ["abc", "static"]}));
    }

    #[test]
    fn unbound_variable_fails() {
        let context = ctx(&[]);
        let err = replace(&json!("{{missing}}"), &context).unwrap_err();
        assert!(matches!(err, Error::TemplateFailure(_)));
    }

    #[test]
    fn non_templatable_value_fails() {
        let context = ctx(&[("obj", json!({"nested": true}))]);
        let err = replace(&json!("{{obj}}"), &context).unwrap_err();
        assert!(matches!(err, Error::TemplateFailure(_)));
    }

    #[test]
    fn idempotent_on_already_substituted_value() {
        let context = ctx(&[("name", json!("widget"))]);
        let once = replace(&json!("{{name}}"), &context).unwrap();
        let twice = replace(&once, &context).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn extract_variables_deduplicates() {
        let value = json!({"a": "{{x}}-{{y}}", "b": ["{{x}}"]});
        let vars = extract_variables(&value);
        assert_eq!(vars.len(), 2);
        assert!(vars.contains("x"));
        assert!(vars.contains("y"));
    }

    #[test]
    fn merge_is_right_biased() {
        let base = ctx(&[("a", json!(1)), ("b", json!(2))]);
        let overlay = ctx(&[("b", json!(20)), ("c", json!(3))]);
        let merged = merge(&[&base, &overlay]);
        assert_eq!(merged.get("a"), Some(&json!(1)));
        assert_eq!(merged.get("b"), Some(&json!(20)));
        assert_eq!(merged.get("c"), Some(&json!(3)));
    }
}
