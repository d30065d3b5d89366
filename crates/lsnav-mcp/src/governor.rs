//! Character-window tier of output control. Item pagination happens where
//! results are gathered; this applies the final serialized-size ceiling.

use serde_json::{Map, Value, json};

use lsnav_core::page::{CharWindow, char_window, slice_chars};

use crate::structured::ensure_common_fields;

/// Apply the character window to `payload` in place.
///
/// A `has_results` payload whose serialized form exceeds `budget` gets its
/// `results` array replaced by `results_window`, a slice of the serialized
/// array, plus an `output_pagination` descriptor. Explicit `char_offset` /
/// `char_length` force a window even under budget and are honored exactly.
/// `empty` and `error` payloads pass through untouched.
pub(crate) fn enforce_output_budget(
    payload: &mut Value,
    budget: usize,
    char_offset: Option<usize>,
    char_length: Option<usize>,
) {
    ensure_common_fields(payload);

    if payload.get("status").and_then(Value::as_str) != Some("has_results") {
        return;
    }

    let explicit = char_offset.is_some() || char_length.is_some();
    if !explicit && serialized_chars(payload) <= budget {
        return;
    }

    let Some(obj) = payload.as_object_mut() else {
        return;
    };
    let results = obj
        .remove("results")
        .unwrap_or_else(|| Value::Array(Vec::new()));
    let Ok(serialized) = serde_json::to_string(&results) else {
        obj.insert("results".to_string(), results);
        return;
    };

    let total_chars = serialized.chars().count();
    let window = char_window(total_chars, char_offset, char_length, budget);
    let slice = slice_chars(&serialized, window.char_offset, window.char_length);

    obj.insert(
        "results_window".to_string(),
        Value::String(slice.to_string()),
    );
    obj.insert("output_pagination".to_string(), window_value(&window));
    push_warning(
        obj,
        json!({
            "kind": "output_window_applied",
            "message": "results are served as a character window over the serialized results array; request further windows via char_offset"
        }),
    );
}

fn window_value(window: &CharWindow) -> Value {
    serde_json::to_value(window).unwrap_or(Value::Null)
}

fn serialized_chars(value: &Value) -> usize {
    serde_json::to_string(value)
        .map(|s| s.chars().count())
        .unwrap_or(usize::MAX)
}

fn push_warning(obj: &mut Map<String, Value>, warning: Value) {
    match obj.get_mut("warnings").and_then(Value::as_array_mut) {
        Some(warnings) => warnings.push(warning),
        None => {
            obj.insert("warnings".to_string(), Value::Array(vec![warning]));
        }
    }
}
