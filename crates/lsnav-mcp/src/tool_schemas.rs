use std::borrow::Cow;
use std::sync::Arc;

use rmcp::model::{JsonObject, Tool};
use serde_json::json;

pub(crate) fn tool_resolve_call_hierarchy() -> Tool {
    Tool::new(
        Cow::Borrowed("resolve_call_hierarchy"),
        Cow::Borrowed(
            "Resolve incoming or outgoing calls for a symbol and walk the call graph to a depth. Pass one query inline, or a queries array to run several in parallel (results come back in query order). Argument names also accept camelCase (filePath, symbolName, lineHint, charOffset, charLength).",
        ),
        Arc::new(schema(json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string", "description": "File containing the symbol, absolute or relative to the workspace root." },
                "symbol_name": { "type": "string" },
                "line_hint": { "type": "integer", "minimum": 1, "default": 1, "description": "1-based line near the symbol declaration." },
                "direction": { "type": "string", "enum": ["incoming", "outgoing"], "default": "incoming" },
                "depth": { "type": "integer", "minimum": 1, "default": 3, "description": "1 = direct calls only." },
                "page": { "type": "integer", "minimum": 1, "default": 1 },
                "char_offset": { "type": "integer", "minimum": 0, "description": "Continue a character window over the serialized results." },
                "char_length": { "type": "integer", "minimum": 1 },
                "queries": {
                    "type": "array",
                    "minItems": 1,
                    "description": "Bulk form; each query runs in its own language-server session with per-query isolation.",
                    "items": {
                        "type": "object",
                        "properties": {
                            "file_path": { "type": "string" },
                            "symbol_name": { "type": "string" },
                            "line_hint": { "type": "integer", "minimum": 1, "default": 1 },
                            "direction": { "type": "string", "enum": ["incoming", "outgoing"], "default": "incoming" },
                            "depth": { "type": "integer", "minimum": 1, "default": 3 },
                            "page": { "type": "integer", "minimum": 1, "default": 1 }
                        },
                        "anyOf": [
                            { "required": ["file_path", "symbol_name"] },
                            { "required": ["filePath", "symbolName"] }
                        ]
                    }
                }
            }
        }))),
    )
}

pub(crate) fn tool_resolve_references() -> Tool {
    Tool::new(
        Cow::Borrowed("resolve_references"),
        Cow::Borrowed(
            "Resolve every reference to a symbol across the workspace. Pass one query inline, or a queries array to run several in parallel. Argument names also accept camelCase (filePath, symbolName, lineHint, includeDeclaration, charOffset, charLength).",
        ),
        Arc::new(schema(json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string", "description": "File containing the symbol, absolute or relative to the workspace root." },
                "symbol_name": { "type": "string" },
                "line_hint": { "type": "integer", "minimum": 1, "default": 1, "description": "1-based line near the symbol declaration." },
                "include_declaration": { "type": "boolean", "default": true },
                "page": { "type": "integer", "minimum": 1, "default": 1 },
                "char_offset": { "type": "integer", "minimum": 0, "description": "Continue a character window over the serialized results." },
                "char_length": { "type": "integer", "minimum": 1 },
                "queries": {
                    "type": "array",
                    "minItems": 1,
                    "description": "Bulk form; each query runs in its own language-server session with per-query isolation.",
                    "items": {
                        "type": "object",
                        "properties": {
                            "file_path": { "type": "string" },
                            "symbol_name": { "type": "string" },
                            "line_hint": { "type": "integer", "minimum": 1, "default": 1 },
                            "include_declaration": { "type": "boolean", "default": true },
                            "page": { "type": "integer", "minimum": 1, "default": 1 }
                        },
                        "anyOf": [
                            { "required": ["file_path", "symbol_name"] },
                            { "required": ["filePath", "symbolName"] }
                        ]
                    }
                }
            }
        }))),
    )
}

pub(crate) fn tool_probe_servers() -> Tool {
    Tool::new(
        Cow::Borrowed("probe_servers"),
        Cow::Borrowed(
            "Probe every registered language server: resolved command, availability, version, and install hints.",
        ),
        Arc::new(schema(json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        }))),
    )
}

fn schema(value: serde_json::Value) -> JsonObject {
    #[expect(clippy::expect_used)]
    serde_json::from_value(value).expect("tool schema should deserialize")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    // The handlers accept camelCase aliases for every snake_case argument,
    // so the advertised schemas must not reject unknown property names.
    #[test]
    fn navigation_schemas_admit_alias_property_names() {
        for tool in [tool_resolve_call_hierarchy(), tool_resolve_references()] {
            assert!(
                tool.input_schema.get("additionalProperties").is_none(),
                "{} schema closes off alias names",
                tool.name
            );
            let items = &tool.input_schema["properties"]["queries"]["items"];
            assert!(items.get("additionalProperties").is_none());
            assert!(items.get("required").is_none());
            let spellings: Vec<&Value> = items["anyOf"].as_array().unwrap().iter().collect();
            assert_eq!(spellings.len(), 2);
        }
    }
}
