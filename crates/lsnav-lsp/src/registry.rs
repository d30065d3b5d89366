//! Advisory availability probes over the configured server registry.
//!
//! Probing never mutates anything. A probe answers "would a session start?",
//! and a bad answer only changes the guidance we hand back, not the registry.

use std::time::Duration;

use lsnav_core::config::ResolvedServer;
use serde::Serialize;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Name of the environment variable that overrides a server's binary.
/// `rust-analyzer` becomes `LSNAV_RUST_ANALYZER_COMMAND`.
pub fn command_env_var(server_id: &str) -> String {
    format!(
        "LSNAV_{}_COMMAND",
        server_id.to_ascii_uppercase().replace('-', "_")
    )
}

/// The binary to launch for a server: the environment override when set and
/// non-empty, otherwise the configured command.
pub fn resolve_server_command(server: &ResolvedServer) -> String {
    let var = command_env_var(&server.id);
    if let Ok(value) = std::env::var(&var) {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            debug!("using {trimmed} for {} (from {var})", server.id);
            return trimmed.to_string();
        }
    }
    server.command.clone()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    /// The binary ran and exited cleanly.
    Available,
    /// The binary could not be spawned at all.
    Missing,
    /// The binary exists but the probe run failed.
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub server_id: String,
    pub command: String,
    pub language_id: String,
    pub extensions: Vec<String>,
    pub status: ProbeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ProbeReport {
    pub fn is_available(&self) -> bool {
        self.status == ProbeStatus::Available
    }
}

pub async fn probe_server(server: &ResolvedServer) -> ProbeReport {
    let command = resolve_server_command(server);
    let report = |status, version, detail| ProbeReport {
        server_id: server.id.clone(),
        command: command.clone(),
        language_id: server.language_id.clone(),
        extensions: server.extensions.clone(),
        status,
        version,
        detail,
    };

    let run = Command::new(&command).args(&server.probe_args).output();
    let output = match timeout(PROBE_TIMEOUT, run).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            return report(ProbeStatus::Missing, None, Some(missing_detail(server, &command)));
        }
        Ok(Err(err)) => {
            return report(
                ProbeStatus::Error,
                None,
                Some(format!("failed to run {command}: {err}")),
            );
        }
        Err(_) => {
            return report(
                ProbeStatus::Error,
                None,
                Some(format!(
                    "probe did not finish within {}s",
                    PROBE_TIMEOUT.as_secs()
                )),
            );
        }
    };

    if output.status.success() {
        report(ProbeStatus::Available, first_line(&output.stdout).or_else(|| first_line(&output.stderr)), None)
    } else {
        let detail = first_line(&output.stderr)
            .or_else(|| first_line(&output.stdout))
            .map(|line| format!("probe exited with {}: {line}", output.status))
            .unwrap_or_else(|| format!("probe exited with {}", output.status));
        report(ProbeStatus::Error, None, Some(detail))
    }
}

pub async fn probe_servers(servers: &[ResolvedServer]) -> Vec<ProbeReport> {
    let mut reports = Vec::with_capacity(servers.len());
    for server in servers {
        reports.push(probe_server(server).await);
    }
    reports
}

fn missing_detail(server: &ResolvedServer, command: &str) -> String {
    let var = command_env_var(&server.id);
    match install_hint(&server.id) {
        Some(hint) => format!("{command} was not found on PATH; {hint}, or set {var}"),
        None => format!("{command} was not found on PATH; set {var} to point at the binary"),
    }
}

fn install_hint(server_id: &str) -> Option<&'static str> {
    match server_id {
        "rust-analyzer" => Some("install it via `rustup component add rust-analyzer`"),
        "gopls" => Some("install it via `go install golang.org/x/tools/gopls@latest`"),
        "pyright" => Some("install it via `npm install -g pyright`"),
        "typescript" | "javascript" => {
            Some("install it via `npm install -g typescript-language-server typescript`")
        }
        "clangd" => Some("install clangd from your system package manager"),
        _ => None,
    }
}

fn first_line(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let line = text.lines().next()?.trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}
