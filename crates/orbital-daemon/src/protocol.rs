// SPDX-License-Identifier: MIT

//! IPC protocol: length-prefixed JSON over a Unix socket (spec.md §6,
//! SPEC_FULL.md §6). Wire format: 4-byte big-endian length prefix + JSON
//! payload.

use orbital_core::{OutputMessage, Session};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

/// Maximum message size (200 MB), matching the scale a session's full
/// chat-response payload could plausibly reach.
pub const MAX_MESSAGE_SIZE: usize = 200 * 1024 * 1024;

/// Default IPC timeout.
pub const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Request from a client to the daemon (spec.md §4.11).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    StartSession {
        spec_files: Vec<String>,
        project_root: String,
        use_worktree: bool,
        #[serde(default)]
        worktree_name: Option<String>,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        checker_model: Option<String>,
        #[serde(default)]
        workflow_name: Option<String>,
        #[serde(default)]
        system_prompt: Option<String>,
        #[serde(default)]
        max_iterations: Option<u32>,
        #[serde(default)]
        max_budget_usd: Option<f64>,
    },
    StopSession {
        id: String,
    },
    ResumeSession {
        id: String,
    },
    TriggerMerge {
        id: String,
    },
    SendChat {
        id: String,
        message: String,
    },
    ListSessions,
    StreamOutput {
        id: String,
    },
}

/// Response from the daemon to a client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Response {
    SessionStarted { session: Box<Session> },
    SessionStopped { id: String },
    SessionResumed { session: Box<Session> },
    MergeTriggered { id: String },
    ChatReply { id: String, text: String },
    Sessions { sessions: Vec<Session> },
    /// One message in a `StreamOutput` response stream; the daemon writes a
    /// sequence of these followed by `StreamEnded`.
    OutputMessage { message: OutputMessage },
    StreamEnded,
    Error { message: String },
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },
    #[error("connection closed")]
    ConnectionClosed,
    #[error("timeout")]
    Timeout,
}

/// Encode a message to JSON bytes (without length prefix).
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    let json = serde_json::to_vec(msg)?;
    if json.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: json.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(json)
}

/// Decode a message from wire format.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Read one length-prefixed message from an async reader.
pub async fn read_message<R: tokio::io::AsyncReadExt + Unpin>(
    reader: &mut R,
) -> Result<Vec<u8>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed);
        }
        Err(e) => return Err(ProtocolError::Io(e)),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Write one length-prefixed message to an async writer.
pub async fn write_message<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    data: &[u8],
) -> Result<(), ProtocolError> {
    let len = data.len();
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }
    writer.write_all(&(len as u32).to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a request with a timeout.
pub async fn read_request<R: tokio::io::AsyncReadExt + Unpin>(
    reader: &mut R,
    timeout: std::time::Duration,
) -> Result<Request, ProtocolError> {
    let bytes = tokio::time::timeout(timeout, read_message(reader))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    decode(&bytes)
}

/// Write a response with a timeout.
pub async fn write_response<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    response: &Response,
    timeout: std::time::Duration,
) -> Result<(), ProtocolError> {
    let data = encode(response)?;
    tokio::time::timeout(timeout, write_message(writer, &data))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
