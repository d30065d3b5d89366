//! Content-Length framing for JSON-RPC over a child's standard streams.
//!
//! The reader is incremental: each call consumes exactly one frame. Malformed
//! input surfaces as `SessionError::ProtocolFraming` for that frame only; the
//! stream position always lands on the next header boundary, so a subsequent
//! call can pick up the next valid frame.

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::SessionError;

/// Upper bound on a single frame body. Anything larger is treated as a
/// corrupt length header rather than an allocation request.
const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    message: &Value,
) -> Result<(), SessionError> {
    let body = serde_json::to_vec(message)
        .map_err(|err| SessionError::ProtocolFraming(format!("unencodable message: {err}")))?;
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    writer
        .write_all(header.as_bytes())
        .await
        .map_err(|err| SessionError::ProcessCrash(format!("stdin write failed: {err}")))?;
    writer
        .write_all(&body)
        .await
        .map_err(|err| SessionError::ProcessCrash(format!("stdin write failed: {err}")))?;
    writer
        .flush()
        .await
        .map_err(|err| SessionError::ProcessCrash(format!("stdin flush failed: {err}")))?;
    Ok(())
}

pub struct FrameReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
        }
    }

    /// Read one frame. `Ok(None)` is clean end-of-stream; an `Err` covers the
    /// current frame only and leaves the reader positioned for the next one.
    pub async fn read_frame(&mut self) -> Result<Option<Value>, SessionError> {
        let mut content_length: Option<usize> = None;

        loop {
            let mut line = String::new();
            let bytes = self
                .reader
                .read_line(&mut line)
                .await
                .map_err(|err| SessionError::ProcessCrash(format!("stdout read failed: {err}")))?;
            if bytes == 0 {
                return if content_length.is_none() {
                    Ok(None)
                } else {
                    Err(SessionError::ProcessCrash(
                        "stream ended inside a frame header".to_string(),
                    ))
                };
            }

            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed.is_empty() {
                let Some(length) = content_length else {
                    return Err(SessionError::ProtocolFraming(
                        "frame without a Content-Length header".to_string(),
                    ));
                };
                return self.read_body(length).await.map(Some);
            }

            if let Some((name, value)) = trimmed.split_once(':') {
                if name.trim().eq_ignore_ascii_case("content-length") {
                    let parsed = value.trim().parse::<usize>().map_err(|_| {
                        SessionError::ProtocolFraming(format!(
                            "invalid Content-Length value: {:?}",
                            value.trim()
                        ))
                    })?;
                    if parsed > MAX_FRAME_BYTES {
                        return Err(SessionError::ProtocolFraming(format!(
                            "Content-Length {parsed} exceeds the {MAX_FRAME_BYTES} byte cap"
                        )));
                    }
                    content_length = Some(parsed);
                }
                // Other headers (Content-Type, ...) are tolerated and ignored.
            }
            // Lines without a colon are ignored too; the blank separator or a
            // later Content-Length resynchronizes the stream.
        }
    }

    async fn read_body(&mut self, length: usize) -> Result<Value, SessionError> {
        let mut body = vec![0u8; length];
        self.reader
            .read_exact(&mut body)
            .await
            .map_err(|err| SessionError::ProcessCrash(format!("stream ended inside a frame body: {err}")))?;
        serde_json::from_slice(&body)
            .map_err(|err| SessionError::ProtocolFraming(format!("invalid frame body: {err}")))
    }
}
