//! Hint strings for non-success payloads. Every `empty` or `error` status
//! carries at least one concrete next step.

use lsnav_lsp::CallDirection;

pub(crate) fn symbol_not_found_hints(symbol_name: &str, searched_radius: u32) -> Vec<String> {
    vec![
        format!(
            "no token-boundary match for '{symbol_name}' within {searched_radius} lines of line_hint; point line_hint at the declaration line"
        ),
        "matching is exact and case-sensitive; check the spelling".to_string(),
    ]
}

pub(crate) fn no_calls_hints(direction: CallDirection) -> Vec<String> {
    match direction {
        CallDirection::Incoming => vec![
            "no callers were reported; the symbol may be unused, invoked dynamically, or only called outside this workspace"
                .to_string(),
        ],
        CallDirection::Outgoing => vec![
            "no callees were reported; leaf functions and macro-generated calls commonly resolve to nothing"
                .to_string(),
        ],
    }
}

pub(crate) fn no_references_hints(include_declaration: bool) -> Vec<String> {
    let mut hints = vec![
        "no references were reported; the symbol may be unused or only consumed outside this workspace"
            .to_string(),
    ];
    if !include_declaration {
        hints.push("set include_declaration to true to count the declaration itself".to_string());
    }
    hints
}

pub(crate) fn fallback_hints() -> Vec<String> {
    vec![
        "matches come from text search and can include comments or shadowed names".to_string(),
        "run probe_servers and install the missing language server for semantic results"
            .to_string(),
    ]
}

pub(crate) fn error_hints(kind: &str) -> Vec<String> {
    match kind {
        "request_timeout" => vec![
            "reduce depth or split the request into smaller queries".to_string(),
            "raise limits.request_timeout_ms in the config if the server is just slow".to_string(),
        ],
        "handshake_timeout" => vec![
            "raise limits.initialize_timeout_ms; large workspaces can take a while to index"
                .to_string(),
            "run probe_servers to confirm the server binary works at all".to_string(),
        ],
        "query_timeout" => vec![
            "this query exceeded its overall ceiling; raise limits.query_timeout_ms or reduce depth"
                .to_string(),
        ],
        "server_unavailable" => vec![
            "run probe_servers for install commands and environment overrides".to_string(),
        ],
        "protocol_framing" => vec![
            "the server emitted an unreadable response stream; check its version with probe_servers"
                .to_string(),
        ],
        "process_crash" => vec![
            "the server process died mid-request; rerun with RUST_LOG=debug to capture its stderr"
                .to_string(),
        ],
        "server_error" => vec![
            "the language server rejected the request; point line_hint at the symbol declaration"
                .to_string(),
        ],
        "fallback_unsupported" => vec![
            "text search cannot identify callees; install the language server for this file type"
                .to_string(),
            "run probe_servers to see which servers are missing and how to install them"
                .to_string(),
        ],
        "invalid_params" => vec![
            "check the tool schema; file_path and symbol_name are required unless a queries array is given"
                .to_string(),
        ],
        _ => vec![
            "check that file_path exists inside the workspace root and is valid UTF-8".to_string(),
        ],
    }
}

pub(crate) fn partial_results_hint() -> String {
    "rows gathered before the failure are included in results".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_session_error_kind_has_hints() {
        for kind in [
            "server_unavailable",
            "handshake_timeout",
            "request_timeout",
            "protocol_framing",
            "process_crash",
            "server_error",
            "query_timeout",
            "fallback_unsupported",
            "invalid_params",
            "io_error",
        ] {
            assert!(!error_hints(kind).is_empty(), "no hints for {kind}");
        }
    }

    #[test]
    fn not_found_hints_name_the_symbol_and_radius() {
        let hints = symbol_not_found_hints("dispatch", 20);
        assert!(hints[0].contains("'dispatch'"));
        assert!(hints[0].contains("20 lines"));
    }

    #[test]
    fn reference_hints_mention_the_declaration_toggle_only_when_off() {
        assert!(
            no_references_hints(false)
                .iter()
                .any(|h| h.contains("include_declaration"))
        );
        assert!(
            !no_references_hints(true)
                .iter()
                .any(|h| h.contains("include_declaration"))
        );
    }
}
