//! One language-server subprocess, scoped to a single query.
//!
//! A `Session` is created for one `(workspace_root, language_id)` pair, used
//! for one navigation query, and then stopped. Sessions are never pooled or
//! reused across queries.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWrite, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, oneshot};
use tokio::time::timeout;
use tracing::{debug, warn};
use url::Url;

use crate::error::{SessionError, session_error};
use crate::transport::{FrameReader, write_frame};
use crate::types::{
    LspCallHierarchyItem, LspDidOpenTextDocumentParams, LspPosition, LspReferenceContext,
    LspReferenceParams, LspTextDocumentIdentifier, LspTextDocumentItem,
    LspTextDocumentPositionParams, path_to_uri,
};

const SHUTDOWN_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// After this many malformed frames in a row the stream is considered
/// unrecoverable and the session is marked dead.
const MAX_CONSECUTIVE_FRAMING_ERRORS: u32 = 3;

const STATE_ALIVE: u8 = 0;
const STATE_CRASHED: u8 = 1;
/// Dead specifically because of repeated malformed frames; callers route
/// this to the text fallback instead of reporting a crash.
const STATE_FRAMING_DEAD: u8 = 2;

#[derive(Debug)]
pub struct SessionOptions {
    pub server_id: String,
    pub command: String,
    pub args: Vec<String>,
    pub workspace_root: PathBuf,
    pub language_id: String,
    pub initialize_options: Option<Value>,
    pub initialize_timeout: Duration,
    pub request_timeout: Duration,
}

#[derive(Debug)]
struct SessionState {
    next_id: i64,
    pending: HashMap<i64, oneshot::Sender<Value>>,
}

/// What the server advertised in its `initialize` result. The provider
/// flags drive routing; `raw` keeps the full capabilities object.
#[derive(Debug, Clone, Default)]
pub struct ServerCapabilities {
    pub call_hierarchy: bool,
    pub references: bool,
    pub definition: bool,
    pub raw: Value,
}

impl ServerCapabilities {
    fn from_initialize_result(result: &Value) -> Self {
        let raw = result.get("capabilities").cloned().unwrap_or(Value::Null);
        Self {
            call_hierarchy: provider_enabled(raw.get("callHierarchyProvider")),
            references: provider_enabled(raw.get("referencesProvider")),
            definition: provider_enabled(raw.get("definitionProvider")),
            raw,
        }
    }
}

/// Servers advertise a provider as `true` or as an options object.
fn provider_enabled(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Object(_)) => true,
        _ => false,
    }
}

#[derive(Debug)]
pub struct Session {
    stdin: Arc<Mutex<ChildStdin>>,
    state: Arc<Mutex<SessionState>>,
    child: Child,
    liveness: Arc<AtomicU8>,
    root_uri: String,
    language_id: String,
    default_request_timeout: Duration,
    capabilities: ServerCapabilities,
}

impl Session {
    pub async fn start(options: SessionOptions) -> Result<Self> {
        let mut command = Command::new(&options.command);
        command
            .args(&options.args)
            .current_dir(&options.workspace_root)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|err| {
            SessionError::Unavailable(format!(
                "failed to spawn language server {:?}: {err}",
                options.command
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("failed to capture language server stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("failed to capture language server stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("failed to capture language server stderr"))?;

        let mut session = Self {
            stdin: Arc::new(Mutex::new(stdin)),
            state: Arc::new(Mutex::new(SessionState {
                next_id: 1,
                pending: HashMap::new(),
            })),
            child,
            liveness: Arc::new(AtomicU8::new(STATE_ALIVE)),
            root_uri: Url::from_directory_path(&options.workspace_root)
                .map_err(|_| anyhow!("failed to build rootUri for {:?}", options.workspace_root))?
                .to_string(),
            language_id: options.language_id,
            default_request_timeout: options.request_timeout,
            capabilities: ServerCapabilities::default(),
        };

        session.spawn_stdout_reader(stdout);
        spawn_stderr_logger(options.server_id, stderr);

        session.capabilities = session
            .initialize(options.initialize_options, options.initialize_timeout)
            .await?;

        Ok(session)
    }

    /// Capabilities recorded from the `initialize` handshake.
    pub fn capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }

    /// Read `path` from disk and announce it to the server.
    pub async fn open_from_disk(&self, path: &Path) -> Result<()> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        self.did_open(path, text).await
    }

    pub async fn did_open(&self, path: &Path, text: String) -> Result<()> {
        let uri = path_to_uri(path)?;
        let params = LspDidOpenTextDocumentParams {
            text_document: LspTextDocumentItem {
                uri,
                language_id: self.language_id.clone(),
                version: 0,
                text,
            },
        };
        self.send_notification("textDocument/didOpen", &params)
            .await
    }

    pub async fn definition(&self, path: &Path, position: LspPosition) -> Result<Value> {
        let params = self.position_params(path, position)?;
        self.send_request("textDocument/definition", &params, None)
            .await
    }

    pub async fn prepare_call_hierarchy(
        &self,
        path: &Path,
        position: LspPosition,
    ) -> Result<Value> {
        let params = self.position_params(path, position)?;
        self.send_request("textDocument/prepareCallHierarchy", &params, None)
            .await
    }

    pub async fn incoming_calls(&self, item: &LspCallHierarchyItem) -> Result<Value> {
        let params = json!({ "item": item });
        self.send_request("callHierarchy/incomingCalls", &params, None)
            .await
    }

    pub async fn outgoing_calls(&self, item: &LspCallHierarchyItem) -> Result<Value> {
        let params = json!({ "item": item });
        self.send_request("callHierarchy/outgoingCalls", &params, None)
            .await
    }

    pub async fn references(
        &self,
        path: &Path,
        position: LspPosition,
        include_declaration: bool,
    ) -> Result<Value> {
        let uri = path_to_uri(path)?;
        let params = LspReferenceParams {
            text_document: LspTextDocumentIdentifier { uri },
            position,
            context: LspReferenceContext {
                include_declaration,
            },
        };
        self.send_request("textDocument/references", &params, None)
            .await
    }

    pub async fn send_request<T: Serialize>(
        &self,
        method: &str,
        params: &T,
        request_timeout: Option<Duration>,
    ) -> Result<Value> {
        match self.liveness.load(Ordering::Acquire) {
            STATE_ALIVE => {}
            STATE_FRAMING_DEAD => {
                return Err(SessionError::ProtocolFraming(
                    "language server stream died on repeated malformed frames".to_string(),
                )
                .into());
            }
            _ => {
                return Err(SessionError::ProcessCrash(
                    "language server stream is closed".to_string(),
                )
                .into());
            }
        }

        let id = {
            let mut state = self.state.lock().await;
            let id = state.next_id;
            state.next_id += 1;
            id
        };

        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.state.lock().await;
            state.pending.insert(id, tx);
        }

        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        if let Err(err) = self.write_message(&request).await {
            self.state.lock().await.pending.remove(&id);
            return Err(err);
        }

        let wait = request_timeout.unwrap_or(self.default_request_timeout);
        let response = match timeout(wait, rx).await {
            Ok(Ok(message)) => message,
            Ok(Err(_)) => {
                let err = if self.liveness.load(Ordering::Acquire) == STATE_FRAMING_DEAD {
                    SessionError::ProtocolFraming(format!(
                        "language server stream died on malformed frames before answering {method}"
                    ))
                } else {
                    SessionError::ProcessCrash(format!(
                        "language server exited before answering {method}"
                    ))
                };
                return Err(err.into());
            }
            Err(_) => {
                // Drop the waiter so a late reply cannot land in a stale slot.
                self.state.lock().await.pending.remove(&id);
                return Err(SessionError::RequestTimeout {
                    method: method.to_string(),
                    after: wait,
                }
                .into());
            }
        };

        if let Some(error) = response.get("error") {
            let code = error.get("code").and_then(|c| c.as_i64()).unwrap_or(0);
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown server error")
                .to_string();
            return Err(SessionError::ServerError { code, message }.into());
        }

        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    pub async fn send_notification<T: Serialize>(&self, method: &str, params: &T) -> Result<()> {
        let message = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });
        self.write_message(&message).await
    }

    /// Tear the session down. Consuming `self` makes a second stop impossible
    /// and keeps the teardown scoped to this session's child only.
    pub async fn stop(mut self) -> Result<()> {
        // Best-effort graceful shutdown, then kill as fallback.
        let _ = self
            .send_request("shutdown", &Value::Null, Some(SHUTDOWN_REQUEST_TIMEOUT))
            .await;
        let _ = self.send_notification("exit", &Value::Null).await;

        let _ = self.child.kill().await;
        let _ = self.child.wait().await;
        Ok(())
    }

    async fn initialize(
        &self,
        initialize_options: Option<Value>,
        initialize_timeout: Duration,
    ) -> Result<ServerCapabilities> {
        let mut params = json!({
            "processId": null,
            "rootUri": self.root_uri,
            "capabilities": {
                "textDocument": {
                    "documentSymbol": {
                        "hierarchicalDocumentSymbolSupport": true
                    },
                    "definition": {
                        "linkSupport": true
                    },
                    "callHierarchy": {},
                    "references": {}
                }
            },
            "workspaceFolders": [
                { "uri": self.root_uri, "name": "workspace" }
            ]
        });
        if let Some(options) = initialize_options {
            params["initializationOptions"] = options;
        }

        let result = match self
            .send_request("initialize", &params, Some(initialize_timeout))
            .await
        {
            Ok(result) => result,
            Err(err) => {
                if matches!(session_error(&err), Some(SessionError::RequestTimeout { .. })) {
                    return Err(SessionError::HandshakeTimeout(initialize_timeout).into());
                }
                return Err(err.context("initialize request failed"));
            }
        };
        self.send_notification("initialized", &json!({})).await?;
        Ok(ServerCapabilities::from_initialize_result(&result))
    }

    fn position_params(
        &self,
        path: &Path,
        position: LspPosition,
    ) -> Result<LspTextDocumentPositionParams> {
        let uri = path_to_uri(path)?;
        Ok(LspTextDocumentPositionParams {
            text_document: LspTextDocumentIdentifier { uri },
            position,
        })
    }

    async fn write_message(&self, value: &Value) -> Result<()> {
        let mut stdin = self.stdin.lock().await;
        write_frame(&mut *stdin, value).await?;
        Ok(())
    }

    fn spawn_stdout_reader(&self, stdout: ChildStdout) {
        let state = self.state.clone();
        let stdin = self.stdin.clone();
        let liveness = self.liveness.clone();
        tokio::spawn(async move {
            let mut reader = FrameReader::new(stdout);
            let mut framing_errors: u32 = 0;
            let mut exit_state = STATE_CRASHED;
            loop {
                match reader.read_frame().await {
                    Ok(Some(message)) => {
                        framing_errors = 0;
                        dispatch_message(message, &state, &stdin).await;
                    }
                    Ok(None) => break,
                    Err(SessionError::ProtocolFraming(detail)) => {
                        framing_errors += 1;
                        warn!("dropped malformed frame ({framing_errors} in a row): {detail}");
                        if framing_errors >= MAX_CONSECUTIVE_FRAMING_ERRORS {
                            exit_state = STATE_FRAMING_DEAD;
                            break;
                        }
                    }
                    Err(err) => {
                        debug!("language server stream closed: {err}");
                        break;
                    }
                }
            }

            liveness.store(exit_state, Ordering::Release);
            // Wake every waiter so in-flight requests fail immediately
            // instead of running out their timeouts.
            let mut guard = state.lock().await;
            guard.pending.clear();
        });
    }
}

async fn dispatch_message<W: AsyncWrite + Unpin>(
    message: Value,
    state: &Mutex<SessionState>,
    writer: &Mutex<W>,
) {
    if let Some(method) = message.get("method").and_then(|m| m.as_str()) {
        // Server -> client request. Answer with a null result so servers that
        // block on configuration round-trips keep making progress.
        if let Some(id) = message.get("id") {
            let reply = json!({ "jsonrpc": "2.0", "id": id, "result": null });
            let mut guard = writer.lock().await;
            if let Err(err) = write_frame(&mut *guard, &reply).await {
                debug!("failed to answer server request {method}: {err}");
            }
        } else {
            debug!("ignoring server notification: {method}");
        }
        return;
    }

    let id = match message.get("id") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.parse::<i64>().ok(),
        _ => None,
    };

    if let Some(id) = id {
        let tx = {
            let mut guard = state.lock().await;
            guard.pending.remove(&id)
        };
        if let Some(tx) = tx {
            let _ = tx.send(message);
        } else {
            debug!("response for unknown or abandoned id: {id}");
        }
    }
}

fn spawn_stderr_logger(server_id: String, stderr: ChildStderr) {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stderr);
        loop {
            let mut line = String::new();
            match reader.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    debug!(target: "lsnav.server.stderr", server = %server_id, "{}", line.trim_end())
                }
                Err(_) => break,
            }
        }
    });
}
