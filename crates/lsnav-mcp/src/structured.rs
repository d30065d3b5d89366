use serde_json::{Value, json};

pub(crate) const STRUCTURED_SCHEMA_VERSION: u32 = 1;

/// Stamp the envelope fields onto a finished payload. Per-query payloads in a
/// bulk result skip this; the envelope is stamped once on the aggregate.
pub(crate) fn with_envelope(tool: &str, mut payload: Value) -> Value {
    if let Some(obj) = payload.as_object_mut() {
        obj.insert(
            "schema_version".to_string(),
            Value::Number(serde_json::Number::from(STRUCTURED_SCHEMA_VERSION)),
        );
        obj.insert("tool".to_string(), Value::String(tool.to_string()));
    }
    payload
}

pub(crate) fn structured_error(
    tool: &str,
    input: Option<Value>,
    kind: &str,
    message: &str,
) -> Value {
    json!({
        "schema_version": STRUCTURED_SCHEMA_VERSION,
        "tool": tool,
        "status": "error",
        "input": input,
        "is_fallback": false,
        "results": [],
        "error": {
            "kind": kind,
            "message": message
        },
        "warnings": [],
        "hints": []
    })
}

pub(crate) fn ensure_common_fields(payload: &mut Value) {
    let Some(obj) = payload.as_object_mut() else {
        return;
    };

    obj.entry("schema_version".to_string())
        .or_insert_with(|| Value::Number(serde_json::Number::from(STRUCTURED_SCHEMA_VERSION)));

    obj.entry("status".to_string())
        .or_insert_with(|| Value::String("error".to_string()));

    obj.entry("is_fallback".to_string())
        .or_insert_with(|| Value::Bool(false));

    obj.entry("results".to_string())
        .or_insert_with(|| Value::Array(Vec::new()));

    obj.entry("warnings".to_string())
        .or_insert_with(|| Value::Array(Vec::new()));

    obj.entry("hints".to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
}
