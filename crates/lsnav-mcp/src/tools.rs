use std::collections::HashSet;

use rmcp::model::Tool;
use tracing::warn;

pub(crate) fn all_tools() -> Vec<Tool> {
    use crate::tool_schemas as schemas;
    vec![
        schemas::tool_resolve_call_hierarchy(),
        schemas::tool_resolve_references(),
        schemas::tool_probe_servers(),
    ]
}

/// Apply the config allow/exclude lists to the advertised tool set. Filtering
/// only changes what is advertised; `call_tool` still answers every name.
pub(crate) fn filter_tools_by_config(
    tools: Vec<Tool>,
    mcp: Option<&lsnav_core::config::McpConfig>,
) -> Vec<Tool> {
    let Some(tools_cfg) = mcp.and_then(|m| m.tools.as_ref()) else {
        return tools;
    };

    let normalize = |s: &str| s.trim().to_ascii_lowercase();
    let collect = |list: Option<&Vec<String>>| -> HashSet<String> {
        list.map(|items| {
            items
                .iter()
                .map(|item| normalize(item))
                .filter(|item| !item.is_empty())
                .collect()
        })
        .unwrap_or_default()
    };

    let known: HashSet<String> = tools.iter().map(|t| normalize(t.name.as_ref())).collect();
    let allow = collect(tools_cfg.allow.as_ref());
    let exclude = collect(tools_cfg.exclude.as_ref());

    for name in allow.union(&exclude) {
        if !known.contains(name) {
            warn!("mcp.tools names an unknown tool: {name}");
        }
    }

    tools
        .into_iter()
        .filter(|tool| {
            let name = normalize(tool.name.as_ref());
            if allow.is_empty() {
                !exclude.contains(&name)
            } else {
                allow.contains(&name)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsnav_core::config::{McpConfig, McpToolsConfig};

    fn names(tools: &[Tool]) -> Vec<String> {
        tools.iter().map(|t| t.name.to_string()).collect()
    }

    fn config(allow: Option<Vec<&str>>, exclude: Option<Vec<&str>>) -> McpConfig {
        let owned = |list: Option<Vec<&str>>| {
            list.map(|items| items.into_iter().map(str::to_string).collect())
        };
        McpConfig {
            tools: Some(McpToolsConfig {
                allow: owned(allow),
                exclude: owned(exclude),
            }),
        }
    }

    #[test]
    fn tool_names_are_unique_and_schemas_are_objects() {
        let tools = all_tools();
        let unique: HashSet<String> = tools.iter().map(|t| t.name.to_string()).collect();
        assert_eq!(unique.len(), tools.len());
        for tool in &tools {
            assert_eq!(
                tool.input_schema.get("type").and_then(|v| v.as_str()),
                Some("object"),
                "{} schema is not an object",
                tool.name
            );
        }
    }

    #[test]
    fn no_tools_config_advertises_everything() {
        let filtered = filter_tools_by_config(all_tools(), None);
        assert_eq!(filtered.len(), all_tools().len());
    }

    #[test]
    fn allow_list_wins_over_exclude() {
        let cfg = config(
            Some(vec!["probe_servers"]),
            Some(vec!["probe_servers", "resolve_references"]),
        );
        let filtered = filter_tools_by_config(all_tools(), Some(&cfg));
        assert_eq!(names(&filtered), vec!["probe_servers"]);
    }

    #[test]
    fn exclude_list_removes_named_tools() {
        let cfg = config(None, Some(vec![" Resolve_References "]));
        let filtered = filter_tools_by_config(all_tools(), Some(&cfg));
        let filtered = names(&filtered);
        assert!(!filtered.contains(&"resolve_references".to_string()));
        assert!(filtered.contains(&"resolve_call_hierarchy".to_string()));
    }

    #[test]
    fn unknown_names_are_ignored() {
        let cfg = config(None, Some(vec!["rename_symbol"]));
        let filtered = filter_tools_by_config(all_tools(), Some(&cfg));
        assert_eq!(filtered.len(), all_tools().len());
    }
}
