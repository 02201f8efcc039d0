//! Line protocol
//!
//! Plain text, one request per line. Besides source lines to evaluate, a few
//! slash commands are understood:
//!
//! ```text
//! // Client -> Server
//! 1+1
//! /session_id
//! /message eyJpZCI6MSwic3JjIjoiMSsxIn0=
//! /quit
//!
//! // Server -> Client
//! 2
//! /session_id 5f0c...
//! /message_response eyJzZXNzaW9uLWlkIjpudWxsLCJpZCI6MSwidHlwZSI6ImV2YWxfcmVzcG9uc2UiLC4uLn0=
//! Bye!
//! ```
//!
//! `/message` payloads are base64-encoded JSON objects, which lets tools send
//! multi-line source and correlate responses by `id`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::evaluator::{value::single_line, EvalError, Value};

/// Marker that starts every error response line
pub const ERROR_TAG: &str = "ERROR:";
/// Reply to `/q` and `/quit` before the connection closes
pub const BYE: &str = "Bye!";
/// Longest accepted request line, excluding the terminator
pub const MAX_LINE_BYTES: usize = 64 * 1024;

const MESSAGE_PREFIX: &str = "/message ";
const SESSION_ID_PREFIX: &str = "/session_id";
const MESSAGE_RESPONSE_PREFIX: &str = "/message_response";

/// A parsed request line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// Blank line; only the prompt is repeated
    Empty,
    Quit,
    SessionId,
    /// Base64 payload of a `/message` request
    Message(&'a str),
    /// Source text to evaluate
    Eval(&'a str),
}

impl<'a> Command<'a> {
    /// Classify a line that has already had its terminator removed
    pub fn parse(line: &'a str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }
        if trimmed == "/q" || trimmed == "/quit" {
            return Self::Quit;
        }
        if trimmed.starts_with(SESSION_ID_PREFIX) {
            return Self::SessionId;
        }
        if let Some(payload) = line.trim_start().strip_prefix(MESSAGE_PREFIX) {
            return Self::Message(payload.trim());
        }
        Self::Eval(line)
    }
}

/// Remove a trailing `\n` or `\r\n`
pub fn strip_line_terminator(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// Error-tagged response line for a failed evaluation
pub fn error_line(err: &EvalError) -> String {
    format!("{} {}", ERROR_TAG, single_line(&err.to_string()))
}

/// Error-tagged response line for a protocol-level problem
pub fn protocol_error_line(err: &ProtocolError) -> String {
    format!("{} {}", ERROR_TAG, single_line(&err.to_string()))
}

pub fn session_id_line(id: &str) -> String {
    format!("{} {}", SESSION_ID_PREFIX, id)
}

/// Failure to decode a `/message` payload
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("ProtocolError: message is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("ProtocolError: message is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("ProtocolError: message is not a valid request: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ProtocolError: line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
}

/// Request carried by a `/message` line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalRequest {
    #[serde(rename = "session-id", default)]
    pub session_id: Option<String>,
    pub id: i64,
    pub src: String,
}

/// Outcome of a `/message` request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Ok,
    Error,
}

/// Response carried by a `/message_response` line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalResponse {
    #[serde(rename = "session-id")]
    pub session_id: Option<String>,
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: ResponseStatus,
    pub result: serde_json::Value,
}

impl EvalResponse {
    pub fn from_outcome(request: &EvalRequest, outcome: Result<Value, EvalError>) -> Self {
        let (status, result) = match outcome {
            Ok(value) => (
                ResponseStatus::Ok,
                serde_json::to_value(&value).unwrap_or(serde_json::Value::Null),
            ),
            Err(err) => (ResponseStatus::Error, serde_json::Value::String(err.to_string())),
        };
        Self {
            session_id: request.session_id.clone(),
            id: request.id,
            kind: "eval_response".to_string(),
            status,
            result,
        }
    }
}

/// Decode the base64 JSON payload of a `/message` line
pub fn decode_request(payload: &str) -> Result<EvalRequest, ProtocolError> {
    let bytes = STANDARD.decode(payload.trim())?;
    let json = String::from_utf8(bytes)?;
    Ok(serde_json::from_str(&json)?)
}

/// Encode a response as a complete `/message_response` line
pub fn encode_response(response: &EvalResponse) -> Result<String, ProtocolError> {
    let json = serde_json::to_string(response)?;
    Ok(format!(
        "{} {}",
        MESSAGE_RESPONSE_PREFIX,
        STANDARD.encode(json.as_bytes())
    ))
}

/// Encode a request as a complete `/message` line (client side)
pub fn encode_request(request: &EvalRequest) -> Result<String, ProtocolError> {
    let json = serde_json::to_string(request)?;
    Ok(format!("{}{}", MESSAGE_PREFIX, STANDARD.encode(json.as_bytes())))
}

/// Decode a `/message_response` line (client side)
pub fn decode_response(line: &str) -> Result<EvalResponse, ProtocolError> {
    let payload = line
        .trim()
        .strip_prefix(MESSAGE_RESPONSE_PREFIX)
        .unwrap_or(line)
        .trim();
    let bytes = STANDARD.decode(payload)?;
    let json = String::from_utf8(bytes)?;
    Ok(serde_json::from_str(&json)?)
}
