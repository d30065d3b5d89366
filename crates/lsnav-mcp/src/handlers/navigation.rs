//! The two navigation tools. Each query resolves through the `Navigator`
//! (language server or text fallback), then the raw rows go through the item
//! page window, snippet enhancement for the visible page only, and finally
//! the character-window governor at the tool boundary.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rmcp::ErrorData as McpError;
use rmcp::model::{CallToolRequestParam, CallToolResult, Content};
use serde::Deserialize;
use serde_json::{Value, json};

use lsnav_core::config::Limits;
use lsnav_core::page::page_window;
use lsnav_core::parallel::{TaskError, run_bounded};
use lsnav_core::snippet::{Snippet, extract_snippet};
use lsnav_lsp::{
    CallDirection, CallRow, HierarchyQuery, HierarchyReply, LspRange, Navigator, ReferencesQuery,
    ReferencesReply, SessionError, session_error,
};

use crate::governor::enforce_output_budget;
use crate::guidance;
use crate::structured::with_envelope;
use crate::{LsnavMcpServer, parse_arguments};

fn default_line_hint() -> u32 {
    1
}

fn default_page() -> usize {
    1
}

#[derive(Debug, Clone, Deserialize)]
struct HierarchyArgs {
    #[serde(alias = "filePath")]
    file_path: String,
    #[serde(alias = "symbolName")]
    symbol_name: String,
    /// 1-based, the way editors display lines.
    #[serde(default = "default_line_hint", alias = "lineHint")]
    line_hint: u32,
    #[serde(default)]
    direction: Option<CallDirection>,
    #[serde(default)]
    depth: Option<u32>,
    #[serde(default = "default_page")]
    page: usize,
}

#[derive(Debug, Deserialize)]
struct HierarchyToolArgs {
    #[serde(default)]
    queries: Option<Vec<HierarchyArgs>>,
    #[serde(default, alias = "filePath")]
    file_path: Option<String>,
    #[serde(default, alias = "symbolName")]
    symbol_name: Option<String>,
    #[serde(default, alias = "lineHint")]
    line_hint: Option<u32>,
    #[serde(default)]
    direction: Option<CallDirection>,
    #[serde(default)]
    depth: Option<u32>,
    #[serde(default)]
    page: Option<usize>,
    #[serde(default, alias = "charOffset")]
    char_offset: Option<usize>,
    #[serde(default, alias = "charLength")]
    char_length: Option<usize>,
}

impl HierarchyToolArgs {
    fn into_single(self) -> Result<HierarchyArgs, McpError> {
        match (self.file_path, self.symbol_name) {
            (Some(file_path), Some(symbol_name)) => Ok(HierarchyArgs {
                file_path,
                symbol_name,
                line_hint: self.line_hint.unwrap_or(1),
                direction: self.direction,
                depth: self.depth,
                page: self.page.unwrap_or(1),
            }),
            _ => Err(McpError::invalid_params(
                "file_path and symbol_name are required unless a queries array is given",
                None,
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ReferencesArgs {
    #[serde(alias = "filePath")]
    file_path: String,
    #[serde(alias = "symbolName")]
    symbol_name: String,
    #[serde(default = "default_line_hint", alias = "lineHint")]
    line_hint: u32,
    #[serde(default, alias = "includeDeclaration")]
    include_declaration: Option<bool>,
    #[serde(default = "default_page")]
    page: usize,
}

#[derive(Debug, Deserialize)]
struct ReferencesToolArgs {
    #[serde(default)]
    queries: Option<Vec<ReferencesArgs>>,
    #[serde(default, alias = "filePath")]
    file_path: Option<String>,
    #[serde(default, alias = "symbolName")]
    symbol_name: Option<String>,
    #[serde(default, alias = "lineHint")]
    line_hint: Option<u32>,
    #[serde(default, alias = "includeDeclaration")]
    include_declaration: Option<bool>,
    #[serde(default)]
    page: Option<usize>,
    #[serde(default, alias = "charOffset")]
    char_offset: Option<usize>,
    #[serde(default, alias = "charLength")]
    char_length: Option<usize>,
}

impl ReferencesToolArgs {
    fn into_single(self) -> Result<ReferencesArgs, McpError> {
        match (self.file_path, self.symbol_name) {
            (Some(file_path), Some(symbol_name)) => Ok(ReferencesArgs {
                file_path,
                symbol_name,
                line_hint: self.line_hint.unwrap_or(1),
                include_declaration: self.include_declaration,
                page: self.page.unwrap_or(1),
            }),
            _ => Err(McpError::invalid_params(
                "file_path and symbol_name are required unless a queries array is given",
                None,
            )),
        }
    }
}

impl LsnavMcpServer {
    pub(crate) async fn resolve_call_hierarchy(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, McpError> {
        let args: HierarchyToolArgs = parse_arguments(request.arguments)?;
        let navigator = self.state.navigator.clone();
        let limits = navigator.limits();
        let (char_offset, char_length) = (args.char_offset, args.char_length);

        let mut payload = match args.queries {
            Some(queries) if queries.is_empty() => {
                return Err(McpError::invalid_params("queries must not be empty", None));
            }
            Some(queries) => {
                let tasks: Vec<_> = queries
                    .into_iter()
                    .map(|query| {
                        let navigator = navigator.clone();
                        async move {
                            Ok::<_, anyhow::Error>(hierarchy_payload(navigator, query).await)
                        }
                    })
                    .collect();
                run_bulk(tasks, limits).await
            }
            None => {
                let single = args.into_single()?;
                run_single(limits, hierarchy_payload(navigator, single)).await
            }
        };

        enforce_output_budget(
            &mut payload,
            limits.output_budget_chars,
            char_offset,
            char_length,
        );
        Ok(tool_result(with_envelope("resolve_call_hierarchy", payload)))
    }

    pub(crate) async fn resolve_references(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, McpError> {
        let args: ReferencesToolArgs = parse_arguments(request.arguments)?;
        let navigator = self.state.navigator.clone();
        let limits = navigator.limits();
        let (char_offset, char_length) = (args.char_offset, args.char_length);

        let mut payload = match args.queries {
            Some(queries) if queries.is_empty() => {
                return Err(McpError::invalid_params("queries must not be empty", None));
            }
            Some(queries) => {
                let tasks: Vec<_> = queries
                    .into_iter()
                    .map(|query| {
                        let navigator = navigator.clone();
                        async move {
                            Ok::<_, anyhow::Error>(references_payload(navigator, query).await)
                        }
                    })
                    .collect();
                run_bulk(tasks, limits).await
            }
            None => {
                let single = args.into_single()?;
                run_single(limits, references_payload(navigator, single)).await
            }
        };

        enforce_output_budget(
            &mut payload,
            limits.output_budget_chars,
            char_offset,
            char_length,
        );
        Ok(tool_result(with_envelope("resolve_references", payload)))
    }
}

/// One call-hierarchy query, start to finish, never failing: every outcome is
/// a tagged payload.
async fn hierarchy_payload(navigator: Arc<Navigator>, args: HierarchyArgs) -> Value {
    let limits = navigator.limits();
    let direction = args.direction.unwrap_or(CallDirection::Incoming);
    let depth = args.depth.unwrap_or(limits.default_depth).max(1);
    let input = json!({
        "file_path": args.file_path,
        "symbol_name": args.symbol_name,
        "line_hint": args.line_hint,
        "direction": direction.as_str(),
        "depth": depth,
        "page": args.page,
    });

    let query = HierarchyQuery {
        file_path: PathBuf::from(&args.file_path),
        symbol_name: args.symbol_name.clone(),
        line_hint: args.line_hint.saturating_sub(1),
        direction,
        max_depth: depth,
    };

    let reply = match navigator.call_hierarchy(&query).await {
        Ok(reply) => reply,
        Err(err) => return failure_payload(input, &err),
    };

    match reply {
        HierarchyReply::SymbolNotFound { searched_radius } => empty_payload(
            input,
            false,
            Vec::new(),
            guidance::symbol_not_found_hints(&args.symbol_name, searched_radius),
        ),
        HierarchyReply::Lsp {
            mut outcome,
            hit,
            server_id,
        } => {
            let mut warnings = locate_warnings(&args.symbol_name, args.line_hint, &hit);
            if outcome.truncated {
                warnings.push(json!({
                    "kind": "calls_truncated",
                    "message": format!(
                        "some nodes reported more than {} calls; the extra entries were dropped",
                        limits.calls_per_node
                    )
                }));
            }
            let interrupted = outcome.interrupted.take();

            if outcome.rows.is_empty() {
                if let Some(err) = interrupted {
                    return failure_payload(input, &err);
                }
                let hints = match &outcome.root {
                    Some(_) => guidance::no_calls_hints(direction),
                    None => vec![if outcome.auto_followed {
                        "the server could not prepare a call-hierarchy item here, even after following the definition; point line_hint at the function name itself".to_string()
                    } else {
                        "the server could not prepare a call-hierarchy item here; point line_hint at the function name itself".to_string()
                    }],
                };
                return empty_payload(input, false, warnings, hints);
            }

            let window = page_window(outcome.rows.len(), args.page, limits.items_per_page);
            let mut page_rows: Vec<CallRow> = outcome.rows[window.start..window.end].to_vec();
            let mut loader = SnippetLoader::new(limits);
            for row in &mut page_rows {
                row.snippet = loader
                    .load(&row.file_path, row.range.start.line, row.range.end.line)
                    .await;
            }
            loader.finish(&mut warnings);

            let results: Vec<Value> = page_rows.iter().map(|row| row_json(row, &row.range)).collect();
            let root = outcome
                .root
                .as_ref()
                .map(|item| {
                    let row = CallRow::new(item, Vec::new(), 0);
                    row_json(&row, &row.range)
                })
                .unwrap_or(Value::Null);

            let payload = json!({
                "status": "has_results",
                "input": input,
                "is_fallback": false,
                "server_id": server_id,
                "auto_followed": outcome.auto_followed,
                "direction": direction.as_str(),
                "root": root,
                "result_count": window.total_items,
                "results": results,
                "pagination": serde_json::to_value(window).unwrap_or(Value::Null),
                "warnings": warnings,
                "hints": [],
            });
            match interrupted {
                Some(err) => interrupted_payload(payload, &err),
                None => payload,
            }
        }
        HierarchyReply::Fallback { outcome, reason } => fallback_payload(
            input,
            reason,
            outcome,
            args.page,
            limits,
            guidance::no_calls_hints(direction),
        ),
        HierarchyReply::FallbackUnsupported { reason } => {
            let mut payload = empty_payload(
                input,
                false,
                Vec::new(),
                guidance::error_hints("fallback_unsupported"),
            );
            if let Some(obj) = payload.as_object_mut() {
                obj.insert("status".to_string(), Value::String("error".to_string()));
                obj.insert(
                    "error".to_string(),
                    json!({ "kind": "fallback_unsupported", "message": reason }),
                );
            }
            payload
        }
    }
}

/// One references query; same shape as `hierarchy_payload` without the graph
/// pieces.
async fn references_payload(navigator: Arc<Navigator>, args: ReferencesArgs) -> Value {
    let limits = navigator.limits();
    let include_declaration = args.include_declaration.unwrap_or(true);
    let input = json!({
        "file_path": args.file_path,
        "symbol_name": args.symbol_name,
        "line_hint": args.line_hint,
        "include_declaration": include_declaration,
        "page": args.page,
    });

    let query = ReferencesQuery {
        file_path: PathBuf::from(&args.file_path),
        symbol_name: args.symbol_name.clone(),
        line_hint: args.line_hint.saturating_sub(1),
        include_declaration,
    };

    let reply = match navigator.references(&query).await {
        Ok(reply) => reply,
        Err(err) => return failure_payload(input, &err),
    };

    match reply {
        ReferencesReply::SymbolNotFound { searched_radius } => empty_payload(
            input,
            false,
            Vec::new(),
            guidance::symbol_not_found_hints(&args.symbol_name, searched_radius),
        ),
        ReferencesReply::Lsp {
            rows,
            hit,
            server_id,
        } => {
            let mut warnings = locate_warnings(&args.symbol_name, args.line_hint, &hit);
            if rows.is_empty() {
                return empty_payload(
                    input,
                    false,
                    warnings,
                    guidance::no_references_hints(include_declaration),
                );
            }

            let window = page_window(rows.len(), args.page, limits.items_per_page);
            let mut page_rows = rows[window.start..window.end].to_vec();
            let mut loader = SnippetLoader::new(limits);
            for row in &mut page_rows {
                row.snippet = loader
                    .load(&row.file_path, row.range.start.line, row.range.end.line)
                    .await;
            }
            loader.finish(&mut warnings);

            let results: Vec<Value> = page_rows.iter().map(|row| row_json(row, &row.range)).collect();

            json!({
                "status": "has_results",
                "input": input,
                "is_fallback": false,
                "server_id": server_id,
                "result_count": window.total_items,
                "results": results,
                "pagination": serde_json::to_value(window).unwrap_or(Value::Null),
                "warnings": warnings,
                "hints": [],
            })
        }
        ReferencesReply::Fallback { outcome, reason } => fallback_payload(
            input,
            reason,
            outcome,
            args.page,
            limits,
            guidance::no_references_hints(include_declaration),
        ),
    }
}

fn fallback_payload(
    input: Value,
    reason: String,
    outcome: lsnav_lsp::FallbackOutcome,
    page: usize,
    limits: Limits,
    empty_hints: Vec<String>,
) -> Value {
    let mut warnings = vec![json!({
        "kind": "fallback",
        "message": format!("{reason}; matches come from a {} text search", outcome.tool.as_str())
    })];
    if outcome.truncated {
        warnings.push(json!({
            "kind": "matches_truncated",
            "message": format!("only the first {} matches were kept", limits.fallback_max_matches)
        }));
    }

    if outcome.rows.is_empty() {
        let mut hints = empty_hints;
        hints.extend(guidance::fallback_hints());
        return empty_payload(input, true, warnings, hints);
    }

    let window = page_window(outcome.rows.len(), page, limits.items_per_page);
    let results: Vec<Value> = outcome.rows[window.start..window.end]
        .iter()
        .map(|row| row_json(row, &row.range))
        .collect();

    json!({
        "status": "has_results",
        "input": input,
        "is_fallback": true,
        "search_tool": outcome.tool.as_str(),
        "result_count": window.total_items,
        "results": results,
        "pagination": serde_json::to_value(window).unwrap_or(Value::Null),
        "warnings": warnings,
        "hints": guidance::fallback_hints(),
    })
}

/// Wrap a single-query build in the overall query ceiling.
async fn run_single<F: Future<Output = Value>>(limits: Limits, build: F) -> Value {
    let ceiling = Duration::from_millis(limits.query_timeout_ms);
    match tokio::time::timeout(ceiling, build).await {
        Ok(payload) => payload,
        Err(_) => timeout_payload(ceiling),
    }
}

/// Run queries through the bounded executor and merge the per-query payloads.
/// A hung or failed query lands as an `error` payload in its slot; siblings
/// are untouched.
async fn run_bulk<Fut>(tasks: Vec<Fut>, limits: Limits) -> Value
where
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    let count = tasks.len();
    let results = run_bounded(
        tasks,
        limits.max_parallel_queries,
        Duration::from_millis(limits.query_timeout_ms),
    )
    .await;

    let payloads: Vec<Value> = results
        .into_iter()
        .map(|slot| match slot {
            Ok(payload) => payload,
            Err(TaskError::TimedOut(after)) => timeout_payload(after),
            Err(err) => {
                let mut payload = empty_payload(
                    Value::Null,
                    false,
                    Vec::new(),
                    guidance::error_hints("internal_error"),
                );
                if let Some(obj) = payload.as_object_mut() {
                    obj.insert("status".to_string(), Value::String("error".to_string()));
                    obj.insert(
                        "error".to_string(),
                        json!({ "kind": "internal_error", "message": err.to_string() }),
                    );
                }
                payload
            }
        })
        .collect();

    let status_count = |status: &str| {
        payloads
            .iter()
            .filter(|p| p.get("status").and_then(Value::as_str) == Some(status))
            .count()
    };
    let status = if status_count("has_results") > 0 {
        "has_results"
    } else if status_count("error") > 0 {
        "error"
    } else {
        "empty"
    };

    json!({
        "status": status,
        "input": { "queries": count },
        "is_fallback": false,
        "query_count": count,
        "results": payloads,
        "warnings": [],
        "hints": [],
    })
}

fn timeout_payload(after: Duration) -> Value {
    json!({
        "status": "error",
        "input": Value::Null,
        "is_fallback": false,
        "results": [],
        "error": {
            "kind": "query_timeout",
            "message": format!("query did not finish within {}ms", after.as_millis())
        },
        "warnings": [],
        "hints": guidance::error_hints("query_timeout"),
    })
}

/// A traversal that failed after gathering rows is still an error; the
/// partial rows ride along in `results`.
fn interrupted_payload(mut payload: Value, err: &anyhow::Error) -> Value {
    let kind = session_error(err).map(SessionError::kind).unwrap_or("io_error");
    if let Some(obj) = payload.as_object_mut() {
        obj.insert("status".to_string(), Value::String("error".to_string()));
        obj.insert(
            "error".to_string(),
            json!({ "kind": kind, "message": format!("{err:#}") }),
        );
        let mut hints = guidance::error_hints(kind);
        hints.push(guidance::partial_results_hint());
        obj.insert("hints".to_string(), json!(hints));
    }
    payload
}

fn failure_payload(input: Value, err: &anyhow::Error) -> Value {
    let kind = session_error(err).map(SessionError::kind).unwrap_or("io_error");
    json!({
        "status": "error",
        "input": input,
        "is_fallback": false,
        "results": [],
        "error": { "kind": kind, "message": format!("{err:#}") },
        "warnings": [],
        "hints": guidance::error_hints(kind),
    })
}

fn empty_payload(input: Value, is_fallback: bool, warnings: Vec<Value>, hints: Vec<String>) -> Value {
    json!({
        "status": "empty",
        "input": input,
        "is_fallback": is_fallback,
        "result_count": 0,
        "results": [],
        "warnings": warnings,
        "hints": hints,
    })
}

fn locate_warnings(symbol_name: &str, line_hint: u32, hit: &lsnav_core::locate::SymbolHit) -> Vec<Value> {
    let mut warnings = Vec::new();
    if hit.hint_clamped {
        warnings.push(json!({
            "kind": "line_hint_clamped",
            "message": format!("line_hint {line_hint} is past the end of the file and was clamped")
        }));
    }
    if hit.drift > 0 {
        warnings.push(json!({
            "kind": "line_drift",
            "message": format!(
                "'{symbol_name}' matched {} line(s) away from line_hint; pass line_hint={} next time",
                hit.drift,
                hit.position.line + 1
            )
        }));
    }
    warnings
}

fn row_json<T: serde::Serialize>(row: &T, range: &LspRange) -> Value {
    let mut value = serde_json::to_value(row).unwrap_or(Value::Null);
    if let Some(obj) = value.as_object_mut() {
        obj.insert("range_1based".to_string(), range_1based(range));
    }
    value
}

fn range_1based(range: &LspRange) -> Value {
    json!({
        "start": {
            "line": range.start.line.saturating_add(1),
            "character": range.start.character.saturating_add(1),
        },
        "end": {
            "line": range.end.line.saturating_add(1),
            "character": range.end.character.saturating_add(1),
        },
    })
}

fn tool_result(payload: Value) -> CallToolResult {
    let is_error = payload.get("status").and_then(Value::as_str) == Some("error");
    CallToolResult {
        content: vec![Content::text(summary_line(&payload))],
        structured_content: Some(payload),
        is_error: Some(is_error),
        meta: None,
    }
}

fn summary_line(payload: &Value) -> String {
    if let Some(count) = payload.get("query_count").and_then(Value::as_u64) {
        let with_results = payload["results"]
            .as_array()
            .map(|rows| {
                rows.iter()
                    .filter(|p| p.get("status").and_then(Value::as_str) == Some("has_results"))
                    .count()
            })
            .unwrap_or(0);
        return format!("Ran {count} queries; {with_results} returned results.");
    }
    match payload.get("status").and_then(Value::as_str) {
        Some("has_results") => {
            let total = payload["result_count"].as_u64().unwrap_or(0);
            match payload.get("pagination") {
                Some(p) if p["total_pages"].as_u64().unwrap_or(1) > 1 => format!(
                    "Found {total} result(s) (page {}/{}).",
                    p["page"], p["total_pages"]
                ),
                _ => format!("Found {total} result(s)."),
            }
        }
        Some("empty") => "No results found.".to_string(),
        _ => payload["error"]["message"]
            .as_str()
            .unwrap_or("query failed")
            .to_string(),
    }
}

/// Reads each referenced file at most once per query and remembers what could
/// not be read, so snippet cost stays bounded by the visible page.
struct SnippetLoader {
    context_lines: u32,
    max_chars: usize,
    cache: HashMap<String, Option<String>>,
    skipped: Vec<String>,
    truncated: usize,
}

impl SnippetLoader {
    fn new(limits: Limits) -> Self {
        Self {
            context_lines: limits.snippet_context_lines,
            max_chars: limits.snippet_max_chars,
            cache: HashMap::new(),
            skipped: Vec::new(),
            truncated: 0,
        }
    }

    async fn load(&mut self, file_path: &str, start_line: u32, end_line: u32) -> Option<Snippet> {
        let content = match self.cache.get(file_path) {
            Some(cached) => cached.clone(),
            None => {
                let read = tokio::fs::read_to_string(file_path).await.ok();
                if read.is_none() {
                    self.skipped.push(file_path.to_string());
                }
                self.cache.insert(file_path.to_string(), read.clone());
                read
            }
        };
        let snippet = extract_snippet(
            &content?,
            start_line,
            end_line,
            self.context_lines,
            self.max_chars,
        );
        if snippet.truncated {
            self.truncated += 1;
        }
        Some(snippet)
    }

    fn finish(self, warnings: &mut Vec<Value>) {
        for file in self.skipped {
            warnings.push(json!({
                "kind": "snippet_skipped",
                "message": format!("could not read {file}; its rows carry no snippet")
            }));
        }
        if self.truncated > 0 {
            warnings.push(json!({
                "kind": "snippet_truncated",
                "message": format!(
                    "{} snippet(s) were cut at {} characters",
                    self.truncated, self.max_chars
                )
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsnav_core::config::LimitsConfig;
    use tempfile::{TempDir, tempdir};

    fn workspace(files: &[(&str, &str)]) -> (TempDir, Arc<Navigator>) {
        let dir = tempdir().unwrap();
        for (name, content) in files {
            std::fs::write(dir.path().join(name), content).unwrap();
        }
        let navigator = Arc::new(Navigator::new(
            dir.path().to_path_buf(),
            Vec::new(),
            LimitsConfig::default().resolve(),
        ));
        (dir, navigator)
    }

    fn hierarchy_args(file: &str, symbol: &str) -> HierarchyArgs {
        HierarchyArgs {
            file_path: file.to_string(),
            symbol_name: symbol.to_string(),
            line_hint: 1,
            direction: None,
            depth: None,
            page: 1,
        }
    }

    fn references_args(file: &str, symbol: &str) -> ReferencesArgs {
        ReferencesArgs {
            file_path: file.to_string(),
            symbol_name: symbol.to_string(),
            line_hint: 1,
            include_declaration: None,
            page: 1,
        }
    }

    #[tokio::test]
    async fn unresolvable_symbol_is_an_empty_payload_with_hints() {
        let (_dir, navigator) = workspace(&[("app.zig", "fn compute() void {}\n")]);
        let payload = references_payload(navigator, references_args("app.zig", "ghost")).await;
        assert_eq!(payload["status"], "empty");
        assert!(payload.get("pagination").is_none());
        assert!(payload.get("output_pagination").is_none());
        assert!(!payload["hints"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unserved_language_answers_via_the_fallback() {
        let (_dir, navigator) = workspace(&[(
            "app.zig",
            "fn compute() void {}\n\npub fn main() void {\n    compute();\n}\n",
        )]);
        let payload = references_payload(navigator, references_args("app.zig", "compute")).await;
        assert_eq!(payload["status"], "has_results");
        assert_eq!(payload["is_fallback"], true);
        assert_eq!(payload["result_count"], 2);
        assert!(
            payload["warnings"]
                .as_array()
                .unwrap()
                .iter()
                .any(|w| w["kind"] == "fallback")
        );
        // Fallback rows carry the matched line text instead of snippets.
        assert!(payload["results"][0]["line_text"].is_string());
    }

    #[tokio::test]
    async fn callee_fallback_is_a_tagged_error() {
        let (_dir, navigator) = workspace(&[("app.zig", "fn compute() void {}\n")]);
        let mut args = hierarchy_args("app.zig", "compute");
        args.direction = Some(CallDirection::Outgoing);
        let payload = hierarchy_payload(navigator, args).await;
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error"]["kind"], "fallback_unsupported");
        assert!(!payload["hints"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn drifted_hint_surfaces_a_line_drift_warning() {
        let content = "// header\n// more\n// lines\nfn compute() void {}\nfn main() void { compute(); }\n";
        let (_dir, navigator) = workspace(&[("app.zig", content)]);
        // Hint points at line 1; the declaration is on line 4.
        let payload = references_payload(navigator, references_args("app.zig", "compute")).await;
        let warnings = payload["warnings"].as_array().unwrap();
        let drift = warnings.iter().find(|w| w["kind"] == "line_drift").unwrap();
        assert!(drift["message"].as_str().unwrap().contains("line_hint=4"));
    }

    #[tokio::test]
    async fn fallback_results_are_page_windowed() {
        let mut content = String::from("fn compute() void {}\n");
        for _ in 0..80 {
            content.push_str("compute();\n");
        }
        let (_dir, navigator) = workspace(&[("app.zig", &content)]);
        let mut args = references_args("app.zig", "compute");
        args.page = 2;
        let payload = references_payload(navigator, args).await;
        assert_eq!(payload["status"], "has_results");
        let pagination = &payload["pagination"];
        assert_eq!(pagination["page"], 2);
        assert_eq!(pagination["total_items"], 81);
        assert_eq!(payload["results"].as_array().unwrap().len(), 30);
    }

    #[tokio::test]
    async fn missing_file_is_a_tagged_error_not_a_fault() {
        let (_dir, navigator) = workspace(&[("app.zig", "fn compute() void {}\n")]);
        let payload = hierarchy_payload(navigator, hierarchy_args("gone.zig", "compute")).await;
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error"]["kind"], "io_error");
    }

    #[tokio::test]
    async fn bulk_isolates_a_hung_query_from_its_sibling() {
        let (_dir, navigator) = workspace(&[(
            "app.zig",
            "fn compute() void {}\n\npub fn main() void {\n    compute();\n}\n",
        )]);
        let quick = {
            let navigator = navigator.clone();
            async move {
                Ok::<_, anyhow::Error>(
                    references_payload(navigator, references_args("app.zig", "compute")).await,
                )
            }
        };
        let tasks: Vec<
            std::pin::Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send>>,
        > = vec![
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(600)).await;
                Ok(Value::Null)
            }),
            Box::pin(quick),
        ];

        let mut limits = LimitsConfig::default().resolve();
        limits.query_timeout_ms = 200;
        let payload = run_bulk(tasks, limits).await;

        assert_eq!(payload["status"], "has_results");
        assert_eq!(payload["query_count"], 2);
        let slots = payload["results"].as_array().unwrap();
        assert_eq!(slots[0]["status"], "error");
        assert_eq!(slots[0]["error"]["kind"], "query_timeout");
        assert_eq!(slots[1]["status"], "has_results");
    }

    #[test]
    fn interrupted_traversal_is_an_error_that_keeps_partial_rows() {
        let payload = json!({
            "status": "has_results",
            "result_count": 1,
            "results": [{ "name": "helper", "depth": 1 }],
            "warnings": [],
            "hints": [],
        });
        let err = anyhow::Error::from(SessionError::RequestTimeout {
            method: "callHierarchy/incomingCalls".to_string(),
            after: Duration::from_secs(30),
        });

        let payload = interrupted_payload(payload, &err);

        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error"]["kind"], "request_timeout");
        assert_eq!(payload["results"].as_array().unwrap().len(), 1);
        let hints = payload["hints"].as_array().unwrap();
        assert!(hints.iter().any(|h| h.as_str().unwrap().contains("request_timeout_ms")));
        assert!(hints.iter().any(|h| h.as_str().unwrap().contains("included in results")));
    }

    #[test]
    fn summary_names_the_page_for_multi_page_results() {
        let payload = json!({
            "status": "has_results",
            "result_count": 90,
            "pagination": { "page": 2, "total_pages": 3 }
        });
        assert_eq!(summary_line(&payload), "Found 90 result(s) (page 2/3).");
    }
}
