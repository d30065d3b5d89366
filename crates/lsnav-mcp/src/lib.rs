use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use rmcp::ErrorData as McpError;
use rmcp::ServiceExt;
use rmcp::handler::server::ServerHandler;
use rmcp::model::CallToolRequestParam;
use rmcp::model::CallToolResult;
use rmcp::model::Content;
use rmcp::model::JsonObject;
use rmcp::model::ListToolsResult;
use rmcp::model::PaginatedRequestParam;
use rmcp::model::ServerCapabilities;
use rmcp::model::ServerInfo;
use rmcp::model::Tool;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

mod governor;
mod guidance;
mod handlers;
mod structured;
mod tool_schemas;
mod tools;

use lsnav_lsp::Navigator;
use structured::structured_error;

pub async fn run_stdio() -> Result<()> {
    run_stdio_with_options(McpOptions::default()).await
}

#[derive(Debug, Clone, Default)]
pub struct McpOptions {
    pub config_path: Option<PathBuf>,
    pub workspace_root: Option<PathBuf>,
}

pub async fn run_stdio_with_options(options: McpOptions) -> Result<()> {
    let service = LsnavMcpServer::new(options)?;
    let running = service
        .serve((tokio::io::stdin(), tokio::io::stdout()))
        .await?;
    running.waiting().await?;
    Ok(())
}

#[derive(Clone)]
struct LsnavMcpServer {
    tools: Arc<Vec<Tool>>,
    state: Arc<ServerState>,
}

struct ServerState {
    navigator: Arc<Navigator>,
}

impl LsnavMcpServer {
    fn new(options: McpOptions) -> Result<Self> {
        let loaded = lsnav_core::config::load_config(
            options.config_path.as_deref(),
            options.workspace_root.as_deref(),
        )?;
        let servers = lsnav_core::config::resolved_servers(&loaded.config);
        let limits = loaded.config.limits();

        info!(
            workspace_root = %loaded.workspace_root.display(),
            servers = servers.len(),
            "starting lsnav MCP server"
        );

        let tools = tools::filter_tools_by_config(tools::all_tools(), loaded.config.mcp.as_ref());
        let navigator = Arc::new(Navigator::new(loaded.workspace_root, servers, limits));

        Ok(Self {
            tools: Arc::new(tools),
            state: Arc::new(ServerState { navigator }),
        })
    }
}

impl ServerHandler for LsnavMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..ServerInfo::default()
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let tools = self.tools.clone();
        async move {
            Ok(ListToolsResult {
                tools: (*tools).clone(),
                next_cursor: None,
            })
        }
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let tool = request.name.to_string();
        let input = request.arguments.clone().map(Value::Object);

        let result = match request.name.as_ref() {
            "resolve_call_hierarchy" => self.resolve_call_hierarchy(request).await,
            "resolve_references" => self.resolve_references(request).await,
            "probe_servers" => self.probe_servers(request).await,
            other => Ok(error_result(
                other,
                input.clone(),
                "unknown_tool",
                &format!("tool '{other}' does not exist; see list_tools"),
            )),
        };

        match result {
            Ok(r) => Ok(r),
            Err(err) => Ok(mcp_error_to_call_tool_result(&tool, input, err)),
        }
    }
}

fn mcp_error_kind_name(code: i32) -> &'static str {
    match code {
        -32600 => "invalid_request",
        -32601 => "method_not_found",
        -32602 => "invalid_params",
        -32603 => "internal_error",
        -32700 => "parse_error",
        _ => "mcp_error",
    }
}

fn mcp_error_to_call_tool_result(
    tool: &str,
    input: Option<Value>,
    err: McpError,
) -> CallToolResult {
    let kind = mcp_error_kind_name(err.code.0);
    error_result(tool, input, kind, err.message.as_ref())
}

/// A tagged `error` payload wrapped as a tool result. Hints are keyed off the
/// error kind; output windowing never applies here.
fn error_result(tool: &str, input: Option<Value>, kind: &str, message: &str) -> CallToolResult {
    let mut structured = structured_error(tool, input, kind, message);
    if let Some(obj) = structured.as_object_mut() {
        obj.insert(
            "hints".to_string(),
            json!(guidance::error_hints(kind)),
        );
    }
    CallToolResult {
        // Short text mirror for clients that ignore structuredContent.
        content: vec![Content::text(message.to_string())],
        structured_content: Some(structured),
        is_error: Some(true),
        meta: None,
    }
}

fn parse_arguments<T: for<'de> Deserialize<'de>>(
    arguments: Option<JsonObject>,
) -> Result<T, McpError> {
    let arguments = arguments.unwrap_or_default();
    serde_json::from_value::<T>(Value::Object(arguments.into_iter().collect()))
        .map_err(|e| McpError::invalid_params(e.to_string(), None))
}

#[cfg(test)]
mod error_result_tests {
    use super::*;

    #[test]
    fn error_results_carry_kind_and_hints() {
        let result = error_result(
            "resolve_references",
            Some(json!({"symbol_name": "x"})),
            "request_timeout",
            "request textDocument/references timed out after 30s",
        );
        assert_eq!(result.is_error, Some(true));
        let structured = result.structured_content.unwrap();
        assert_eq!(structured["status"], "error");
        assert_eq!(structured["error"]["kind"], "request_timeout");
        assert!(!structured["hints"].as_array().unwrap().is_empty());
        assert!(structured.get("output_pagination").is_none());
    }

    #[test]
    fn mcp_error_codes_map_to_stable_kinds() {
        assert_eq!(mcp_error_kind_name(-32602), "invalid_params");
        assert_eq!(mcp_error_kind_name(-32603), "internal_error");
        assert_eq!(mcp_error_kind_name(7), "mcp_error");
    }
}
