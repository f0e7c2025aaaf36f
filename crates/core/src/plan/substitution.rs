use crate::store::ResultStore;
use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::LazyLock;

/// Matches `${results.<path>}`; group 1 is the full dotted path
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{\s*(results(?:\.[^.}\s]+)+)\s*\}").expect("valid regex"));

/// Rewrite every placeholder in `value` using results already in the store.
///
/// A string made of exactly one placeholder is replaced by the raw resolved
/// value, keeping its type. Placeholders that cannot be resolved are left as
/// they are.
pub fn substitute(value: &Value, store: &ResultStore) -> Value {
    match value {
        Value::String(s) => substitute_str(s, store),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute(v, store)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute(v, store)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Substitute every argument of a step
pub fn substitute_args(
    args: &serde_json::Map<String, Value>,
    store: &ResultStore,
) -> serde_json::Map<String, Value> {
    args.iter()
        .map(|(k, v)| (k.clone(), substitute(v, store)))
        .collect()
}

fn substitute_str(input: &str, store: &ResultStore) -> Value {
    // Whole-string placeholder keeps the resolved type
    if let Some(caps) = PLACEHOLDER.captures(input) {
        let whole = caps.get(0).map(|m| m.as_str().len()) == Some(input.len());
        if whole {
            return match store.get(&caps[1]) {
                Some(resolved) => resolved.clone(),
                None => {
                    tracing::debug!("Unresolved placeholder left in place: {}", input);
                    Value::String(input.to_string())
                }
            };
        }
    } else {
        return Value::String(input.to_string());
    }

    let replaced = PLACEHOLDER.replace_all(input, |caps: &Captures| match store.get(&caps[1]) {
        Some(resolved) => render(resolved),
        None => {
            tracing::debug!("Unresolved placeholder left in place: {}", &caps[0]);
            caps[0].to_string()
        }
    });

    Value::String(replaced.into_owned())
}

/// String form of a value when interpolated into surrounding text
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
