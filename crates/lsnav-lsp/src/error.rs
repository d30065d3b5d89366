use std::time::Duration;

/// Failures the session layer can produce. Engines and the tool boundary
/// recover these into tagged result statuses; none of them is fatal to the
/// host process.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The server binary could not be spawned. Routes the caller to the
    /// pattern-matching fallback.
    #[error("language server unavailable: {0}")]
    Unavailable(String),
    #[error("initialize handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),
    #[error("request {method} timed out after {after:?}")]
    RequestTimeout { method: String, after: Duration },
    /// Malformed frame on the protocol stream. The reader resynchronizes;
    /// repeated occurrences mark the session dead.
    #[error("protocol framing error: {0}")]
    ProtocolFraming(String),
    /// The child exited or closed its stdout while requests were pending.
    #[error("language server process ended unexpectedly: {0}")]
    ProcessCrash(String),
    /// The server answered with a JSON-RPC error object.
    #[error("language server error {code}: {message}")]
    ServerError { code: i64, message: String },
}

impl SessionError {
    /// Stable kind string used in structured error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::Unavailable(_) => "server_unavailable",
            SessionError::HandshakeTimeout(_) => "handshake_timeout",
            SessionError::RequestTimeout { .. } => "request_timeout",
            SessionError::ProtocolFraming(_) => "protocol_framing",
            SessionError::ProcessCrash(_) => "process_crash",
            SessionError::ServerError { .. } => "server_error",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            SessionError::HandshakeTimeout(_) | SessionError::RequestTimeout { .. }
        )
    }
}

/// Find the session-layer cause inside an `anyhow` chain, if any.
pub fn session_error(err: &anyhow::Error) -> Option<&SessionError> {
    err.chain().find_map(|cause| cause.downcast_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn downcast_through_context_layers() {
        let base: anyhow::Error = SessionError::RequestTimeout {
            method: "textDocument/references".to_string(),
            after: Duration::from_secs(30),
        }
        .into();
        let wrapped = base.context("while gathering references");
        let found = session_error(&wrapped).unwrap();
        assert_eq!(found.kind(), "request_timeout");
        assert!(found.is_timeout());
    }

    #[test]
    fn unrelated_errors_have_no_session_cause() {
        let err = anyhow::anyhow!("plain failure");
        assert!(session_error(&err).is_none());
    }
}
