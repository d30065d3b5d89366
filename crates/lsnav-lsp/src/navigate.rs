//! Per-query orchestration: resolve the position, pick a resolution strategy
//! (language server or text fallback), run the engine inside a disposable
//! session, and guarantee teardown on every path.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use lsnav_core::config::{Limits, ResolvedServer, route_server_by_path};
use lsnav_core::locate::{LocateLimits, SymbolHit, locate_symbol};
use tracing::debug;

use crate::error::{SessionError, session_error};
use crate::fallback::{FallbackOutcome, MatchKind, search_workspace};
use crate::hierarchy::{CallDirection, HierarchyOutcome, HierarchyRequest, resolve_hierarchy};
use crate::references::{ReferenceRow, ReferencesRequest, resolve_references};
use crate::registry::resolve_server_command;
use crate::session::{Session, SessionOptions};
use crate::types::LspPosition;

#[derive(Debug, Clone)]
pub struct HierarchyQuery {
    pub file_path: PathBuf,
    pub symbol_name: String,
    /// 0-based line hint.
    pub line_hint: u32,
    pub direction: CallDirection,
    pub max_depth: u32,
}

#[derive(Debug, Clone)]
pub struct ReferencesQuery {
    pub file_path: PathBuf,
    pub symbol_name: String,
    /// 0-based line hint.
    pub line_hint: u32,
    pub include_declaration: bool,
}

#[derive(Debug)]
pub enum HierarchyReply {
    /// No token-boundary match within the search radius. A normal outcome.
    SymbolNotFound { searched_radius: u32 },
    Lsp {
        outcome: HierarchyOutcome,
        hit: SymbolHit,
        server_id: String,
    },
    Fallback {
        outcome: FallbackOutcome,
        reason: String,
    },
    /// Callees cannot be approximated textually; only the reason survives.
    FallbackUnsupported { reason: String },
}

#[derive(Debug)]
pub enum ReferencesReply {
    SymbolNotFound { searched_radius: u32 },
    Lsp {
        rows: Vec<ReferenceRow>,
        hit: SymbolHit,
        server_id: String,
    },
    Fallback {
        outcome: FallbackOutcome,
        reason: String,
    },
}

pub struct Navigator {
    workspace_root: PathBuf,
    servers: Vec<ResolvedServer>,
    limits: Limits,
}

impl Navigator {
    pub fn new(workspace_root: PathBuf, servers: Vec<ResolvedServer>, limits: Limits) -> Self {
        let workspace_root = workspace_root.canonicalize().unwrap_or(workspace_root);
        Self {
            workspace_root,
            servers,
            limits,
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn servers(&self) -> &[ResolvedServer] {
        &self.servers
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    pub async fn call_hierarchy(&self, query: &HierarchyQuery) -> Result<HierarchyReply> {
        let file_path = self.workspace_file(&query.file_path).await?;
        let content = tokio::fs::read_to_string(&file_path)
            .await
            .with_context(|| format!("failed to read {}", file_path.display()))?;
        let Some(hit) = self.locate(&content, &query.symbol_name, query.line_hint) else {
            return Ok(HierarchyReply::SymbolNotFound {
                searched_radius: self.limits.search_radius_lines,
            });
        };

        let Some(server) = route_server_by_path(&file_path, &self.servers) else {
            let reason = format!(
                "no language server is registered for {}",
                describe_extension(&file_path)
            );
            return self.hierarchy_fallback(query, reason).await;
        };

        match self.run_hierarchy(server, &file_path, query, hit).await {
            Ok(reply) => Ok(reply),
            Err(err) if routes_to_fallback(&err) => {
                debug!("language server unusable, using text fallback: {err:#}");
                let reason = fallback_reason(&err);
                self.hierarchy_fallback(query, reason).await
            }
            Err(err) => Err(err),
        }
    }

    pub async fn references(&self, query: &ReferencesQuery) -> Result<ReferencesReply> {
        let file_path = self.workspace_file(&query.file_path).await?;
        let content = tokio::fs::read_to_string(&file_path)
            .await
            .with_context(|| format!("failed to read {}", file_path.display()))?;
        let Some(hit) = self.locate(&content, &query.symbol_name, query.line_hint) else {
            return Ok(ReferencesReply::SymbolNotFound {
                searched_radius: self.limits.search_radius_lines,
            });
        };

        let Some(server) = route_server_by_path(&file_path, &self.servers) else {
            let reason = format!(
                "no language server is registered for {}",
                describe_extension(&file_path)
            );
            return self.references_fallback(query, reason).await;
        };

        match self.run_references(server, &file_path, query, hit).await {
            Ok(reply) => Ok(reply),
            Err(err) if routes_to_fallback(&err) => {
                debug!("language server unusable, using text fallback: {err:#}");
                let reason = fallback_reason(&err);
                self.references_fallback(query, reason).await
            }
            Err(err) => Err(err),
        }
    }

    async fn run_hierarchy(
        &self,
        server: &ResolvedServer,
        file_path: &Path,
        query: &HierarchyQuery,
        hit: SymbolHit,
    ) -> Result<HierarchyReply> {
        let session = Session::start(self.session_options(server)).await?;
        if !session.capabilities().call_hierarchy {
            let detail = format!("{} does not advertise call-hierarchy support", server.id);
            if let Err(err) = session.stop().await {
                debug!("session teardown failed: {err:#}");
            }
            return Err(SessionError::Unavailable(detail).into());
        }
        let request = HierarchyRequest {
            file_path: file_path.to_path_buf(),
            position: protocol_position(hit),
            direction: query.direction,
            max_depth: query.max_depth,
            max_calls_per_node: self.limits.calls_per_node,
        };

        // The engine captures its own failures, so teardown always runs.
        let mut outcome = resolve_hierarchy(&session, &request).await;
        if let Err(err) = session.stop().await {
            debug!("session teardown failed: {err:#}");
        }

        // A dead-on-arrival session with nothing gathered gets a second
        // chance on the fallback path; partial results are kept as-is.
        if outcome.rows.is_empty()
            && let Some(err) = outcome.interrupted.take_if(|err| routes_to_fallback(err))
        {
            return Err(err);
        }

        Ok(HierarchyReply::Lsp {
            outcome,
            hit,
            server_id: server.id.clone(),
        })
    }

    async fn run_references(
        &self,
        server: &ResolvedServer,
        file_path: &Path,
        query: &ReferencesQuery,
        hit: SymbolHit,
    ) -> Result<ReferencesReply> {
        let session = Session::start(self.session_options(server)).await?;
        if !session.capabilities().references {
            let detail = format!("{} does not advertise references support", server.id);
            if let Err(err) = session.stop().await {
                debug!("session teardown failed: {err:#}");
            }
            return Err(SessionError::Unavailable(detail).into());
        }
        let request = ReferencesRequest {
            file_path: file_path.to_path_buf(),
            position: protocol_position(hit),
            include_declaration: query.include_declaration,
        };

        // Capture the result before teardown so stop runs on the error path too.
        let result = resolve_references(&session, &request).await;
        if let Err(err) = session.stop().await {
            debug!("session teardown failed: {err:#}");
        }
        let rows = result?;

        Ok(ReferencesReply::Lsp {
            rows,
            hit,
            server_id: server.id.clone(),
        })
    }

    async fn hierarchy_fallback(
        &self,
        query: &HierarchyQuery,
        reason: String,
    ) -> Result<HierarchyReply> {
        if query.direction == CallDirection::Outgoing {
            return Ok(HierarchyReply::FallbackUnsupported { reason });
        }
        let mut outcome = search_workspace(
            &self.workspace_root,
            &query.symbol_name,
            self.limits.fallback_max_matches,
        )
        .await?;
        // Callers are approximated by call-classified matches only.
        outcome.rows.retain(|row| row.kind == MatchKind::Call);
        Ok(HierarchyReply::Fallback { outcome, reason })
    }

    async fn references_fallback(
        &self,
        query: &ReferencesQuery,
        reason: String,
    ) -> Result<ReferencesReply> {
        let mut outcome = search_workspace(
            &self.workspace_root,
            &query.symbol_name,
            self.limits.fallback_max_matches,
        )
        .await?;
        if !query.include_declaration {
            outcome.rows.retain(|row| row.kind != MatchKind::Declaration);
        }
        Ok(ReferencesReply::Fallback { outcome, reason })
    }

    fn session_options(&self, server: &ResolvedServer) -> SessionOptions {
        SessionOptions {
            server_id: server.id.clone(),
            command: resolve_server_command(server),
            args: server.args.clone(),
            workspace_root: self.workspace_root.clone(),
            language_id: server.language_id.clone(),
            initialize_options: server.initialize_options.clone(),
            initialize_timeout: Duration::from_millis(self.limits.initialize_timeout_ms),
            request_timeout: Duration::from_millis(self.limits.request_timeout_ms),
        }
    }

    /// Resolve `path` against the workspace root and refuse anything that
    /// escapes it.
    async fn workspace_file(&self, path: &Path) -> Result<PathBuf> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        };
        let canonical = tokio::fs::canonicalize(&absolute)
            .await
            .with_context(|| format!("file not found: {}", absolute.display()))?;
        if !canonical.starts_with(&self.workspace_root) {
            return Err(anyhow!(
                "{} is outside the workspace root {}",
                canonical.display(),
                self.workspace_root.display()
            ));
        }
        Ok(canonical)
    }

    fn locate(&self, content: &str, symbol_name: &str, line_hint: u32) -> Option<SymbolHit> {
        locate_symbol(
            content,
            symbol_name,
            line_hint,
            LocateLimits {
                radius_lines: self.limits.search_radius_lines,
            },
        )
    }
}

fn protocol_position(hit: SymbolHit) -> LspPosition {
    LspPosition {
        line: hit.position.line,
        character: hit.position.character,
    }
}

fn routes_to_fallback(err: &anyhow::Error) -> bool {
    matches!(
        session_error(err),
        Some(SessionError::Unavailable(_) | SessionError::ProtocolFraming(_))
    )
}

fn fallback_reason(err: &anyhow::Error) -> String {
    match session_error(err) {
        Some(SessionError::Unavailable(detail)) => detail.clone(),
        Some(SessionError::ProtocolFraming(_)) => {
            "the language server produced an unreadable response stream".to_string()
        }
        _ => err.to_string(),
    }
}

fn describe_extension(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!(".{ext} files"),
        None => "files without an extension".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsnav_core::config::LimitsConfig;
    use tempfile::{TempDir, tempdir};

    fn workspace_with(name: &str, content: &str) -> (TempDir, Navigator) {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(name), content).unwrap();
        let navigator = Navigator::new(
            dir.path().to_path_buf(),
            Vec::new(),
            LimitsConfig::default().resolve(),
        );
        (dir, navigator)
    }

    fn hierarchy_query(name: &str, symbol: &str, direction: CallDirection) -> HierarchyQuery {
        HierarchyQuery {
            file_path: PathBuf::from(name),
            symbol_name: symbol.to_string(),
            line_hint: 0,
            direction,
            max_depth: 2,
        }
    }

    fn references_query(name: &str, symbol: &str, include_declaration: bool) -> ReferencesQuery {
        ReferencesQuery {
            file_path: PathBuf::from(name),
            symbol_name: symbol.to_string(),
            line_hint: 0,
            include_declaration,
        }
    }

    #[tokio::test]
    async fn relative_paths_resolve_against_the_workspace() {
        let (_dir, navigator) = workspace_with("app.zig", "fn compute() void {}\n");
        let resolved = navigator.workspace_file(Path::new("app.zig")).await.unwrap();
        assert!(resolved.starts_with(navigator.workspace_root()));
    }

    #[tokio::test]
    async fn paths_outside_the_workspace_are_rejected() {
        let (_dir, navigator) = workspace_with("app.zig", "fn compute() void {}\n");
        let outside = tempdir().unwrap();
        std::fs::write(outside.path().join("other.zig"), "x\n").unwrap();

        let err = navigator
            .workspace_file(&outside.path().join("other.zig"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("outside the workspace root"));
    }

    #[tokio::test]
    async fn missing_symbol_reports_not_found_before_any_strategy() {
        let (_dir, navigator) = workspace_with("app.zig", "fn compute() void {}\n");
        let reply = navigator
            .call_hierarchy(&hierarchy_query("app.zig", "does_not_exist", CallDirection::Incoming))
            .await
            .unwrap();
        assert!(matches!(reply, HierarchyReply::SymbolNotFound { .. }));
    }

    #[tokio::test]
    async fn unrouted_extension_uses_the_text_fallback() {
        let (_dir, navigator) = workspace_with(
            "app.zig",
            "fn compute() void {}\n\npub fn main() void {\n    compute();\n    compute();\n}\n",
        );

        let reply = navigator
            .call_hierarchy(&hierarchy_query("app.zig", "compute", CallDirection::Incoming))
            .await
            .unwrap();

        match reply {
            HierarchyReply::Fallback { outcome, reason } => {
                assert!(reason.contains("no language server is registered"));
                assert_eq!(outcome.rows.len(), 2);
                assert!(outcome.rows.iter().all(|r| r.kind == MatchKind::Call));
            }
            other => panic!("expected fallback, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn callee_fallback_is_reported_as_unsupported() {
        let (_dir, navigator) = workspace_with("app.zig", "fn compute() void {}\n");
        let reply = navigator
            .call_hierarchy(&hierarchy_query("app.zig", "compute", CallDirection::Outgoing))
            .await
            .unwrap();
        assert!(matches!(reply, HierarchyReply::FallbackUnsupported { .. }));
    }

    #[tokio::test]
    async fn reference_fallback_can_exclude_declarations() {
        let (_dir, navigator) = workspace_with(
            "app.zig",
            "fn compute() void {}\n\npub fn main() void {\n    compute();\n}\n",
        );

        let reply = navigator
            .references(&references_query("app.zig", "compute", false))
            .await
            .unwrap();

        match reply {
            ReferencesReply::Fallback { outcome, .. } => {
                assert!(outcome.rows.iter().all(|r| r.kind != MatchKind::Declaration));
                assert_eq!(outcome.rows.len(), 1);
            }
            other => panic!("expected fallback, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_server_binary_falls_back_instead_of_failing() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("web.py"),
            "def handle(req):\n    return req\n\nhandle(None)\n",
        )
        .unwrap();
        let server = ResolvedServer {
            id: "pyright".to_string(),
            command: "lsnav-no-such-binary-for-tests".to_string(),
            args: Vec::new(),
            extensions: vec!["py".to_string()],
            language_id: "python".to_string(),
            probe_args: vec!["--version".to_string()],
            initialize_options: None,
        };
        let navigator = Navigator::new(
            dir.path().to_path_buf(),
            vec![server],
            LimitsConfig::default().resolve(),
        );

        let reply = navigator
            .references(&references_query("web.py", "handle", true))
            .await
            .unwrap();

        match reply {
            ReferencesReply::Fallback { reason, outcome } => {
                assert!(reason.contains("failed to spawn"));
                assert!(!outcome.rows.is_empty());
            }
            other => panic!("expected fallback, got {other:?}"),
        }
    }
}
