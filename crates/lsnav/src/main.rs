use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use lsnav_lsp::{ProbeStatus, command_env_var, probe_server};

#[derive(Debug, Parser)]
#[command(name = "lsnav")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the MCP server over stdio
    Mcp {
        /// Optional path to an lsnav config file (.toml or .json)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Override the workspace root (defaults to config or current directory)
        #[arg(long)]
        workspace_root: Option<PathBuf>,
    },
    /// Probe every registered language server and report availability
    Doctor {
        /// Optional path to an lsnav config file (.toml or .json)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Override the workspace root (defaults to config or current directory)
        #[arg(long)]
        workspace_root: Option<PathBuf>,
    },
    /// Generate a starter `.lsnav/config.toml` (prints by default)
    Init {
        /// Workspace root to generate the config for (defaults to current directory)
        #[arg(long)]
        workspace_root: Option<PathBuf>,
        /// Output path (defaults to `<workspace_root>/.lsnav/config.toml`)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Write the config file instead of printing it
        #[arg(long)]
        write: bool,
        /// Overwrite an existing config file when `--write` is set
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the MCP protocol under `mcp`.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    match args.command {
        Command::Mcp {
            config,
            workspace_root,
        } => {
            lsnav_mcp::run_stdio_with_options(lsnav_mcp::McpOptions {
                config_path: config,
                workspace_root,
            })
            .await
        }
        Command::Doctor {
            config,
            workspace_root,
        } => doctor(config, workspace_root).await,
        Command::Init {
            workspace_root,
            output,
            write,
            force,
        } => init(workspace_root, output, write, force).await,
    }
}

async fn doctor(config: Option<PathBuf>, workspace_root: Option<PathBuf>) -> Result<()> {
    let loaded = lsnav_core::config::load_config(config.as_deref(), workspace_root.as_deref())?;
    let servers = lsnav_core::config::resolved_servers(&loaded.config);
    let limits = loaded.config.limits();

    println!("config_source: {:?}", loaded.source);
    println!("workspace_root: {}", loaded.workspace_root.display());
    println!(
        "limits: items_per_page={} output_budget_chars={} depth={} request_timeout_ms={}",
        limits.items_per_page, limits.output_budget_chars, limits.default_depth,
        limits.request_timeout_ms
    );
    println!("servers.count: {}", servers.len());

    let mut available = 0usize;
    for server in &servers {
        let report = probe_server(server).await;
        println!(
            "server: id={} command={} extensions={:?}",
            report.server_id, report.command, report.extensions
        );
        if let Ok(value) = std::env::var(command_env_var(&server.id)) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                println!(
                    "  override: {}={trimmed}",
                    command_env_var(&server.id)
                );
            }
        }
        match report.status {
            ProbeStatus::Available => {
                available += 1;
                match &report.version {
                    Some(version) => println!("  status: available ({version})"),
                    None => println!("  status: available"),
                }
            }
            ProbeStatus::Missing => {
                println!("  status: missing");
                if let Some(detail) = &report.detail {
                    eprintln!("  hint: {detail}");
                }
            }
            ProbeStatus::Error => {
                println!("  status: error");
                if let Some(detail) = &report.detail {
                    eprintln!("  detail: {detail}");
                }
            }
        }
    }

    if !servers.is_empty() && available == 0 {
        anyhow::bail!(
            "none of the {} registered server(s) is usable; queries will answer via the text fallback",
            servers.len()
        );
    }
    Ok(())
}

async fn init(
    workspace_root: Option<PathBuf>,
    output: Option<PathBuf>,
    write: bool,
    force: bool,
) -> Result<()> {
    let workspace_root = workspace_root
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    let workspace_root = workspace_root.canonicalize().unwrap_or(workspace_root);

    let output_path = output.unwrap_or_else(|| workspace_root.join(".lsnav").join("config.toml"));
    let output_path = if output_path.is_absolute() {
        output_path
    } else {
        workspace_root.join(output_path)
    };

    let template = config_template();

    if !write {
        println!("# Would write to: {}", output_path.display());
        println!();
        print!("{template}");
        println!();
        println!("# Next steps:");
        println!("# 1) Verify servers: lsnav doctor --workspace-root .");
        println!("# 2) Register the MCP server with your client:");
        println!("#      command = \"lsnav\", args = [\"mcp\", \"--workspace-root\", \".\"]");
        return Ok(());
    }

    if output_path.exists() && !force {
        anyhow::bail!(
            "refusing to overwrite existing file: {} (use --force)",
            output_path.display()
        );
    }

    if let Some(parent) = output_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&output_path, template.as_bytes()).await?;

    println!("wrote: {}", output_path.display());
    println!(
        "next: lsnav doctor --workspace-root {}",
        workspace_root.display()
    );
    Ok(())
}

fn config_template() -> String {
    r#"# lsnav config (TOML)
#
# Discovered from, in order: --config, LSNAV_CONFIG_PATH,
# .lsnav/config.toml, .lsnav/config.json, lsnav.toml, lsnav.json.
#
# rust-analyzer, gopls, pyright, typescript-language-server, and clangd are
# registered out of the box; [[servers]] entries extend or override them by id.
# A server's binary can also be replaced per environment with
# LSNAV_<SERVER_ID>_COMMAND (id uppercased, `-` becomes `_`).

## Example: override the rust-analyzer binary and probe.
# [[servers]]
# id = "rust-analyzer"
# command = "/opt/rust-analyzer/bin/rust-analyzer"
# extensions = ["rs"]
# language_id = "rust"
# probe_args = ["--version"]

## Example: register a server lsnav does not know about.
# [[servers]]
# id = "zls"
# command = "zls"
# extensions = ["zig"]
# language_id = "zig"

[limits]
items_per_page = 30
output_budget_chars = 120000
default_depth = 3
request_timeout_ms = 30000
initialize_timeout_ms = 10000
query_timeout_ms = 60000

## Restrict the advertised MCP tools if needed.
# [mcp.tools]
# exclude = ["probe_servers"]
"#
    .to_string()
}
