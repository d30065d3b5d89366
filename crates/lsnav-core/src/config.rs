use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct LsnavConfig {
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,
    #[serde(default)]
    pub servers: Option<Vec<ServerConfig>>,
    #[serde(default)]
    pub limits: Option<LimitsConfig>,
    #[serde(default)]
    pub mcp: Option<McpConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    /// Stable identifier; matching a built-in id (e.g. `rust-analyzer`)
    /// overrides that entry instead of adding a new one.
    #[serde(default)]
    pub id: Option<String>,
    /// Command to start the server.
    #[serde(default)]
    pub command: Option<String>,
    /// Arguments passed to the server (include `--stdio` only if the server
    /// needs it; stdio is the only supported transport).
    #[serde(default)]
    pub args: Option<Vec<String>>,
    /// File extensions (without a leading dot) routed to this server, e.g. `["rs"]`.
    #[serde(default)]
    pub extensions: Option<Vec<String>>,
    /// languageId sent in textDocument/didOpen for files routed here.
    #[serde(default)]
    #[serde(alias = "languageId")]
    pub language_id: Option<String>,
    /// Arguments for the availability probe (defaults to `--version`).
    #[serde(default)]
    #[serde(alias = "probeArgs")]
    pub probe_args: Option<Vec<String>>,
    /// Optional `initializationOptions` passed to the `initialize` request.
    #[serde(default)]
    #[serde(alias = "initializeOptions")]
    pub initialize_options: Option<JsonValue>,
    /// Set to false to skip this server (and any built-in it shadows).
    #[serde(default)]
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct LimitsConfig {
    #[serde(default)]
    pub items_per_page: Option<usize>,
    #[serde(default)]
    pub output_budget_chars: Option<usize>,
    #[serde(default)]
    pub default_depth: Option<u32>,
    #[serde(default)]
    pub calls_per_node: Option<usize>,
    #[serde(default)]
    pub search_radius_lines: Option<u32>,
    #[serde(default)]
    pub snippet_context_lines: Option<u32>,
    #[serde(default)]
    pub snippet_max_chars: Option<usize>,
    #[serde(default)]
    pub max_parallel_queries: Option<usize>,
    #[serde(default)]
    pub fallback_max_matches: Option<usize>,
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    #[serde(default)]
    pub initialize_timeout_ms: Option<u64>,
    #[serde(default)]
    pub query_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct McpConfig {
    #[serde(default)]
    pub tools: Option<McpToolsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct McpToolsConfig {
    /// If set and non-empty, only these tools are exposed through MCP.
    #[serde(default)]
    pub allow: Option<Vec<String>>,
    /// Tools to exclude from MCP exposure (ignored when `allow` is set and non-empty).
    #[serde(default)]
    pub exclude: Option<Vec<String>>,
}

/// Concrete limit values after defaulting and clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub items_per_page: usize,
    pub output_budget_chars: usize,
    pub default_depth: u32,
    pub calls_per_node: usize,
    pub search_radius_lines: u32,
    pub snippet_context_lines: u32,
    pub snippet_max_chars: usize,
    pub max_parallel_queries: usize,
    pub fallback_max_matches: usize,
    pub request_timeout_ms: u64,
    pub initialize_timeout_ms: u64,
    pub query_timeout_ms: u64,
}

pub const DEFAULT_ITEMS_PER_PAGE: usize = 30;
pub const DEFAULT_OUTPUT_BUDGET_CHARS: usize = 120_000;
pub const DEFAULT_DEPTH: u32 = 3;
pub const DEFAULT_CALLS_PER_NODE: usize = 50;
pub const DEFAULT_SEARCH_RADIUS_LINES: u32 = 20;
pub const DEFAULT_SNIPPET_CONTEXT_LINES: u32 = 2;
pub const DEFAULT_SNIPPET_MAX_CHARS: usize = 700;
pub const DEFAULT_MAX_PARALLEL_QUERIES: usize = 4;
pub const DEFAULT_FALLBACK_MAX_MATCHES: usize = 200;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_INITIALIZE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 60_000;

impl LimitsConfig {
    pub fn resolve(&self) -> Limits {
        Limits {
            items_per_page: self
                .items_per_page
                .unwrap_or(DEFAULT_ITEMS_PER_PAGE)
                .clamp(1, 200),
            output_budget_chars: self
                .output_budget_chars
                .unwrap_or(DEFAULT_OUTPUT_BUDGET_CHARS)
                .clamp(10_000, 2_000_000),
            // Depth has no upper bound; cycle guards bound the work instead.
            default_depth: self.default_depth.unwrap_or(DEFAULT_DEPTH).max(1),
            calls_per_node: self
                .calls_per_node
                .unwrap_or(DEFAULT_CALLS_PER_NODE)
                .clamp(1, 500),
            search_radius_lines: self
                .search_radius_lines
                .unwrap_or(DEFAULT_SEARCH_RADIUS_LINES)
                .clamp(0, 500),
            snippet_context_lines: self
                .snippet_context_lines
                .unwrap_or(DEFAULT_SNIPPET_CONTEXT_LINES)
                .clamp(0, 20),
            snippet_max_chars: self
                .snippet_max_chars
                .unwrap_or(DEFAULT_SNIPPET_MAX_CHARS)
                .clamp(80, 4_000),
            max_parallel_queries: self
                .max_parallel_queries
                .unwrap_or(DEFAULT_MAX_PARALLEL_QUERIES)
                .clamp(1, 16),
            fallback_max_matches: self
                .fallback_max_matches
                .unwrap_or(DEFAULT_FALLBACK_MAX_MATCHES)
                .clamp(10, 2_000),
            request_timeout_ms: self
                .request_timeout_ms
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS)
                .clamp(1_000, 300_000),
            initialize_timeout_ms: self
                .initialize_timeout_ms
                .unwrap_or(DEFAULT_INITIALIZE_TIMEOUT_MS)
                .clamp(1_000, 120_000),
            query_timeout_ms: self
                .query_timeout_ms
                .unwrap_or(DEFAULT_QUERY_TIMEOUT_MS)
                .clamp(5_000, 600_000),
        }
    }
}

impl LsnavConfig {
    pub fn limits(&self) -> Limits {
        self.limits.clone().unwrap_or_default().resolve()
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: LsnavConfig,
    pub workspace_root: PathBuf,
    pub source: ConfigSource,
}

#[derive(Debug, Clone)]
pub enum ConfigSource {
    None,
    Path(PathBuf),
    Env(PathBuf),
    Workspace(PathBuf),
}

/// A server entry after merging user config over the built-in registry.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedServer {
    pub id: String,
    pub command: String,
    pub args: Vec<String>,
    pub extensions: Vec<String>,
    pub language_id: String,
    pub probe_args: Vec<String>,
    pub initialize_options: Option<JsonValue>,
}

pub fn load_config(
    cli_config_path: Option<&Path>,
    cli_workspace_root: Option<&Path>,
) -> Result<LoadedConfig> {
    if let Some(path) = cli_config_path {
        let config = read_config_file(path)?;
        let workspace_root =
            resolve_workspace_root(cli_workspace_root, config.workspace_root.as_deref())?;
        return Ok(LoadedConfig {
            config,
            workspace_root,
            source: ConfigSource::Path(path.to_path_buf()),
        });
    }

    if let Ok(path) = std::env::var("LSNAV_CONFIG_PATH")
        && !path.trim().is_empty()
    {
        let path = PathBuf::from(path);
        let config = read_config_file(&path)?;
        let workspace_root =
            resolve_workspace_root(cli_workspace_root, config.workspace_root.as_deref())?;
        return Ok(LoadedConfig {
            config,
            workspace_root,
            source: ConfigSource::Env(path),
        });
    }

    let fallback_root = cli_workspace_root
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    let workspace_root = fallback_root
        .canonicalize()
        .unwrap_or(fallback_root.clone());

    for candidate in workspace_config_candidates(&workspace_root) {
        if candidate.exists() {
            let config = read_config_file(&candidate)?;
            let effective_root =
                resolve_workspace_root(Some(&workspace_root), config.workspace_root.as_deref())?;
            return Ok(LoadedConfig {
                config,
                workspace_root: effective_root,
                source: ConfigSource::Workspace(candidate),
            });
        }
    }

    Ok(LoadedConfig {
        config: LsnavConfig::default(),
        workspace_root,
        source: ConfigSource::None,
    })
}

fn resolve_workspace_root(cli: Option<&Path>, from_config: Option<&Path>) -> Result<PathBuf> {
    if let Some(cli) = cli {
        return cli
            .canonicalize()
            .with_context(|| format!("failed to canonicalize workspace_root: {cli:?}"));
    }
    if let Some(cfg) = from_config {
        return cfg
            .canonicalize()
            .with_context(|| format!("failed to canonicalize workspace_root: {cfg:?}"));
    }
    let cwd = std::env::current_dir().context("failed to get current_dir")?;
    Ok(cwd.canonicalize().unwrap_or(cwd))
}

fn workspace_config_candidates(workspace_root: &Path) -> Vec<PathBuf> {
    vec![
        workspace_root.join(".lsnav").join("config.toml"),
        workspace_root.join(".lsnav").join("config.json"),
        workspace_root.join("lsnav.toml"),
        workspace_root.join("lsnav.json"),
    ]
}

fn read_config_file(path: &Path) -> Result<LsnavConfig> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read config file: {path:?}"))?;
    let ext = path.extension().and_then(OsStr::to_str).unwrap_or("");

    if ext.eq_ignore_ascii_case("toml") {
        let s = String::from_utf8(bytes).context("config file is not valid UTF-8")?;
        let cfg: LsnavConfig = toml::from_str(&s).context("failed to parse TOML config")?;
        return Ok(cfg);
    }
    if ext.eq_ignore_ascii_case("json") {
        let cfg: LsnavConfig =
            serde_json::from_slice(&bytes).context("failed to parse JSON config")?;
        return Ok(cfg);
    }

    Err(anyhow!(
        "unsupported config extension (expected .toml or .json): {path:?}"
    ))
}

/// User entries first (their extension claims win during routing), then every
/// built-in whose id was not overridden.
pub fn resolved_servers(config: &LsnavConfig) -> Vec<ResolvedServer> {
    let builtins = builtin_servers();
    let user = config.servers.as_deref().unwrap_or_default();

    let mut out: Vec<ResolvedServer> = Vec::new();
    let mut shadowed: Vec<String> = Vec::new();

    for (idx, entry) in user.iter().enumerate() {
        let id = entry
            .id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("server-{}", idx + 1));
        let base = builtins.iter().find(|b| b.id == id);
        if base.is_some() {
            shadowed.push(id.clone());
        }
        if !entry.enabled.unwrap_or(true) {
            continue;
        }
        match merge_server(&id, entry, base) {
            Some(resolved) => out.push(resolved),
            None => warn!("ignoring server entry '{id}': no command and no built-in to inherit"),
        }
    }

    for builtin in builtins {
        if !shadowed.iter().any(|s| s == &builtin.id) {
            out.push(builtin);
        }
    }

    out
}

fn merge_server(
    id: &str,
    entry: &ServerConfig,
    base: Option<&ResolvedServer>,
) -> Option<ResolvedServer> {
    let command = entry
        .command
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| base.map(|b| b.command.clone()))?;

    let extensions: Vec<String> = match entry.extensions.as_ref() {
        Some(exts) => exts.iter().cloned().filter_map(normalize_extension).collect(),
        None => base.map(|b| b.extensions.clone()).unwrap_or_default(),
    };

    let language_id = entry
        .language_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| base.map(|b| b.language_id.clone()))
        .unwrap_or_else(|| "plaintext".to_string());

    Some(ResolvedServer {
        id: id.to_string(),
        command,
        args: entry
            .args
            .clone()
            .or_else(|| base.map(|b| b.args.clone()))
            .unwrap_or_default(),
        extensions,
        language_id,
        probe_args: entry
            .probe_args
            .clone()
            .or_else(|| base.map(|b| b.probe_args.clone()))
            .unwrap_or_else(|| vec!["--version".to_string()]),
        initialize_options: entry
            .initialize_options
            .clone()
            .or_else(|| base.and_then(|b| b.initialize_options.clone())),
    })
}

pub fn builtin_servers() -> Vec<ResolvedServer> {
    fn entry(
        id: &str,
        command: &str,
        args: &[&str],
        extensions: &[&str],
        language_id: &str,
        probe_args: &[&str],
    ) -> ResolvedServer {
        ResolvedServer {
            id: id.to_string(),
            command: command.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            extensions: extensions.iter().map(|s| s.to_string()).collect(),
            language_id: language_id.to_string(),
            probe_args: probe_args.iter().map(|s| s.to_string()).collect(),
            initialize_options: None,
        }
    }

    vec![
        entry(
            "rust-analyzer",
            "rust-analyzer",
            &[],
            &["rs"],
            "rust",
            &["--version"],
        ),
        entry("gopls", "gopls", &[], &["go"], "go", &["version"]),
        entry(
            "pyright",
            "pyright-langserver",
            &["--stdio"],
            &["py", "pyi"],
            "python",
            &["--version"],
        ),
        entry(
            "typescript",
            "typescript-language-server",
            &["--stdio"],
            &["ts", "tsx", "mts", "cts"],
            "typescript",
            &["--version"],
        ),
        entry(
            "javascript",
            "typescript-language-server",
            &["--stdio"],
            &["js", "jsx", "mjs", "cjs"],
            "javascript",
            &["--version"],
        ),
        entry(
            "clangd",
            "clangd",
            &[],
            &["c", "h", "cc", "cpp", "hpp", "cxx", "hxx"],
            "cpp",
            &["--version"],
        ),
    ]
}

pub fn route_server_by_path<'a>(
    file_path: &Path,
    servers: &'a [ResolvedServer],
) -> Option<&'a ResolvedServer> {
    let ext = file_path
        .extension()
        .and_then(OsStr::to_str)
        .map(|s| s.to_ascii_lowercase())?;

    servers
        .iter()
        .find(|s| s.extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)))
}

fn normalize_extension(ext: String) -> Option<String> {
    let ext = ext.trim();
    if ext.is_empty() {
        return None;
    }
    let ext = ext.strip_prefix('.').unwrap_or(ext);
    let ext = ext.trim();
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
