use rmcp::ErrorData as McpError;
use rmcp::model::{CallToolRequestParam, CallToolResult, Content};
use serde::Deserialize;
use serde_json::{Value, json};

use lsnav_lsp::{ProbeStatus, probe_servers};

use crate::structured::with_envelope;
use crate::{LsnavMcpServer, parse_arguments};

#[derive(Debug, Deserialize)]
struct ProbeServersArgs {}

impl LsnavMcpServer {
    pub(crate) async fn probe_servers(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, McpError> {
        let _args: ProbeServersArgs = parse_arguments(request.arguments)?;

        let servers = self.state.navigator.servers();
        let reports = probe_servers(servers).await;

        let available = reports.iter().filter(|r| r.is_available()).count();
        let missing = reports
            .iter()
            .filter(|r| r.status == ProbeStatus::Missing)
            .count();

        let results: Vec<Value> = reports
            .iter()
            .map(|report| serde_json::to_value(report).unwrap_or(Value::Null))
            .collect();

        let (status, hints) = if reports.is_empty() {
            (
                "empty",
                vec![
                    "no language servers are registered; add [[servers]] entries to the config"
                        .to_string(),
                ],
            )
        } else if available == 0 {
            (
                "has_results",
                vec![
                    "no probed server is currently usable; queries will answer via the text fallback"
                        .to_string(),
                ],
            )
        } else {
            ("has_results", Vec::new())
        };

        let payload = with_envelope(
            "probe_servers",
            json!({
                "status": status,
                "input": {},
                "is_fallback": false,
                "result_count": reports.len(),
                "results": results,
                "available": available,
                "missing": missing,
                "warnings": [],
                "hints": hints,
            }),
        );

        Ok(CallToolResult {
            content: vec![Content::text(format!(
                "Probed {} server(s): {} available, {} missing.",
                reports.len(),
                available,
                missing
            ))],
            structured_content: Some(payload),
            is_error: Some(false),
            meta: None,
        })
    }
}
