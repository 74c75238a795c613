//! Loose parameter bags supplied by callers.

use std::collections::BTreeMap;

use serde_json::Value;

/// Caller-supplied parameters. Ordered so cache keys are deterministic.
pub type ParamBag = BTreeMap<String, Value>;

/// A parameter counts as present when it exists, is not JSON `null`, and is
/// not a blank string.
pub fn is_present(params: &ParamBag, name: &str) -> bool {
    params.get(name).is_some_and(|value| match value {
        Value::Null => false,
        Value::String(text) => !text.trim().is_empty(),
        _ => true,
    })
}

/// Renders a present parameter as the text sent upstream.
pub fn get_str(params: &ParamBag, name: &str) -> Option<String> {
    params.get(name).and_then(render)
}

/// Text form of a parameter value; `None` for JSON `null`.
pub fn render(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(render)
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Object(_) => Some(value.to_string()),
    }
}

/// Builds a bag from string pairs.
pub fn bag<I, K, V>(pairs: I) -> ParamBag
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}
