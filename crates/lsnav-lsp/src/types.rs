//! Protocol shapes shared by the session and the navigation engines.
//!
//! Only the slices of the protocol the engines actually touch are typed;
//! everything else stays `serde_json::Value` and is parsed tolerantly.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LspPosition {
    pub line: u32,
    pub character: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LspRange {
    pub start: LspPosition,
    pub end: LspPosition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LspLocation {
    pub uri: String,
    pub range: LspRange,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LspLocationLink {
    #[serde(rename = "targetUri")]
    pub target_uri: String,
    #[serde(rename = "targetRange")]
    pub target_range: LspRange,
    #[serde(rename = "targetSelectionRange")]
    pub target_selection_range: LspRange,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LspTextDocumentIdentifier {
    pub uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LspTextDocumentItem {
    pub uri: String,
    pub language_id: String,
    pub version: i32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LspDidOpenTextDocumentParams {
    pub text_document: LspTextDocumentItem,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LspTextDocumentPositionParams {
    pub text_document: LspTextDocumentIdentifier,
    pub position: LspPosition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LspReferenceContext {
    pub include_declaration: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LspReferenceParams {
    pub text_document: LspTextDocumentIdentifier,
    pub position: LspPosition,
    pub context: LspReferenceContext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LspCallHierarchyItem {
    pub name: String,
    pub kind: u32,
    pub uri: String,
    pub range: LspRange,
    pub selection_range: LspRange,
    #[serde(default)]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LspCallHierarchyIncomingCall {
    pub from: LspCallHierarchyItem,
    #[serde(default)]
    pub from_ranges: Vec<LspRange>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LspCallHierarchyOutgoingCall {
    pub to: LspCallHierarchyItem,
    #[serde(default)]
    pub from_ranges: Vec<LspRange>,
}

/// Normalize a definition-style response into locations. The protocol allows
/// `null`, a single `Location`, `Location[]`, or `LocationLink[]`.
pub fn parse_locations(value: Value) -> Result<Vec<LspLocation>> {
    if value.is_null() {
        return Ok(Vec::new());
    }
    let raw: Vec<Value> = match value {
        Value::Array(items) => items,
        Value::Object(_) => vec![value],
        other => return Err(anyhow!("location response is neither array nor object: {other}")),
    };
    raw.iter().map(to_location).collect()
}

fn to_location(value: &Value) -> Result<LspLocation> {
    if value.get("uri").is_some() {
        return serde_json::from_value(value.clone()).context("failed to parse Location");
    }
    if value.get("targetUri").is_some() {
        let link: LspLocationLink =
            serde_json::from_value(value.clone()).context("failed to parse LocationLink")?;
        return Ok(LspLocation {
            uri: link.target_uri,
            range: link.target_selection_range,
        });
    }
    Err(anyhow!("unknown location shape: {value}"))
}

/// Parse a `textDocument/prepareCallHierarchy` response. `null` means the
/// position does not name a callable symbol.
pub fn parse_call_hierarchy_items(value: Value) -> Result<Vec<LspCallHierarchyItem>> {
    if value.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(value).context("failed to parse CallHierarchyItem[]")
}

pub fn parse_incoming_calls(value: Value) -> Result<Vec<LspCallHierarchyIncomingCall>> {
    if value.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(value).context("failed to parse CallHierarchyIncomingCall[]")
}

pub fn parse_outgoing_calls(value: Value) -> Result<Vec<LspCallHierarchyOutgoingCall>> {
    if value.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(value).context("failed to parse CallHierarchyOutgoingCall[]")
}

pub fn path_to_uri(path: &Path) -> Result<String> {
    Url::from_file_path(path)
        .map_err(|_| anyhow!("failed to convert path to file URI: {path:?}"))
        .map(|u| u.to_string())
}

pub fn uri_to_path(uri: &str) -> Result<PathBuf> {
    let url = Url::parse(uri).with_context(|| format!("invalid URI: {uri}"))?;
    if url.scheme() != "file" {
        return Err(anyhow!("unsupported URI scheme: {}", url.scheme()));
    }
    url.to_file_path()
        .map_err(|_| anyhow!("failed to convert URI to path: {uri}"))
}

/// Human name for an LSP SymbolKind number. Unknown numbers render as
/// "symbol" rather than failing the row.
pub fn symbol_kind_name(kind: u32) -> &'static str {
    match kind {
        1 => "file",
        2 => "module",
        3 => "namespace",
        4 => "package",
        5 => "class",
        6 => "method",
        7 => "property",
        8 => "field",
        9 => "constructor",
        10 => "enum",
        11 => "interface",
        12 => "function",
        13 => "variable",
        14 => "constant",
        15 => "string",
        16 => "number",
        17 => "boolean",
        18 => "array",
        19 => "object",
        20 => "key",
        21 => "null",
        22 => "enum_member",
        23 => "struct",
        24 => "event",
        25 => "operator",
        26 => "type_parameter",
        _ => "symbol",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_null_locations_as_empty() {
        assert!(parse_locations(Value::Null).unwrap().is_empty());
    }

    #[test]
    fn parses_single_location_object() {
        let value = json!({
            "uri": "file:///tmp/a.rs",
            "range": {"start": {"line": 1, "character": 0}, "end": {"line": 1, "character": 4}}
        });
        let locations = parse_locations(value).unwrap();
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].uri, "file:///tmp/a.rs");
    }

    #[test]
    fn location_links_use_target_selection_range() {
        let value = json!([{
            "targetUri": "file:///tmp/b.rs",
            "targetRange": {"start": {"line": 0, "character": 0}, "end": {"line": 9, "character": 0}},
            "targetSelectionRange": {"start": {"line": 2, "character": 3}, "end": {"line": 2, "character": 8}}
        }]);
        let locations = parse_locations(value).unwrap();
        assert_eq!(locations[0].range.start.line, 2);
        assert_eq!(locations[0].range.start.character, 3);
    }

    #[test]
    fn scalar_location_response_is_an_error() {
        assert!(parse_locations(json!(42)).is_err());
    }

    #[test]
    fn parses_call_hierarchy_items_without_detail() {
        let value = json!([{
            "name": "run",
            "kind": 12,
            "uri": "file:///tmp/c.rs",
            "range": {"start": {"line": 5, "character": 0}, "end": {"line": 10, "character": 1}},
            "selectionRange": {"start": {"line": 5, "character": 3}, "end": {"line": 5, "character": 6}}
        }]);
        let items = parse_call_hierarchy_items(value).unwrap();
        assert_eq!(items[0].name, "run");
        assert!(items[0].detail.is_none());
    }

    #[test]
    fn incoming_calls_tolerate_missing_from_ranges() {
        let value = json!([{
            "from": {
                "name": "caller",
                "kind": 12,
                "uri": "file:///tmp/d.rs",
                "range": {"start": {"line": 0, "character": 0}, "end": {"line": 3, "character": 0}},
                "selectionRange": {"start": {"line": 0, "character": 3}, "end": {"line": 0, "character": 9}}
            }
        }]);
        let calls = parse_incoming_calls(value).unwrap();
        assert!(calls[0].from_ranges.is_empty());
    }

    #[test]
    fn uri_round_trips_through_path() {
        let path = Path::new("/tmp/project/src/main.rs");
        let uri = path_to_uri(path).unwrap();
        assert_eq!(uri_to_path(&uri).unwrap(), path);
    }

    #[test]
    fn rejects_non_file_uris() {
        assert!(uri_to_path("https://example.com/a.rs").is_err());
    }

    #[test]
    fn kind_names_cover_common_symbols() {
        assert_eq!(symbol_kind_name(12), "function");
        assert_eq!(symbol_kind_name(6), "method");
        assert_eq!(symbol_kind_name(99), "symbol");
    }
}
