//! JSON-RPC 2.0 envelopes for the relayed tool protocol.
//!
//! Requests go out as HTTP POST bodies; responses come back as frames on the
//! event stream and are handled as raw JSON objects until a caller extracts
//! what it needs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use sk_domain::config::SessionConfig;
use sk_domain::error::{Error, Result};

/// Returned by `tools/call` when the result carries no text items.
pub const NO_CONTENT_MESSAGE: &str = "Success, but no text content returned.";

/// A JSON object as received on the stream.
pub type Frame = Map<String, Value>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outgoing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A JSON-RPC 2.0 request (has an `id`; expects a response on the stream).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl JsonRpcRequest {
    /// `params` of `None` is sent as an empty object.
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            method: method.into(),
            params: params.unwrap_or_else(|| Value::Object(Map::new())),
        }
    }
}

/// A JSON-RPC 2.0 notification (no `id`; fire-and-forget).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Incoming
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The `error` member of a response frame. Both fields are optional because
/// the remote service does not always send a code.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcErrorObject {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorObject {
    pub fn into_error(self) -> Error {
        Error::Remote {
            code: self.code,
            message: self.message.unwrap_or_else(|| "Unknown error".into()),
        }
    }
}

/// Turn a response frame carrying `error` into [`Error::Remote`].
pub fn remote_error(frame: &Frame) -> Option<Error> {
    let raw = frame.get("error")?;
    let obj = serde_json::from_value::<JsonRpcErrorObject>(raw.clone()).unwrap_or_else(|_| {
        JsonRpcErrorObject {
            message: Some(raw.to_string()),
            ..Default::default()
        }
    });
    Some(obj.into_error())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handshake and tool payloads
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Client info sent during `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

/// Parameters for the `initialize` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub capabilities: Value,
    pub client_info: ClientInfo,
}

/// Build the `initialize` request parameters.
pub fn initialize_params(cfg: &SessionConfig) -> InitializeParams {
    InitializeParams {
        protocol_version: cfg.protocol_version.clone(),
        capabilities: serde_json::json!({}),
        client_info: ClientInfo {
            name: cfg.client_name.clone(),
            version: env!("CARGO_PKG_VERSION").into(),
        },
    }
}

/// Parameters for `tools/call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    pub arguments: Value,
}

/// Concatenate the text items of a `tools/call` response frame.
///
/// Non-text items are skipped. A present `result.content` wins over an
/// `error` member; a response with neither is a protocol error.
pub fn tool_call_text(frame: &Frame) -> Result<String> {
    if let Some(content) = frame.get("result").and_then(|r| r.get("content")) {
        let items = content.as_array().ok_or_else(|| {
            tracing::warn!(content = %content, "tools/call content is not a list");
            Error::Protocol("unexpected response format".into())
        })?;

        let text: String = items
            .iter()
            .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|item| item.get("text").and_then(Value::as_str))
            .collect();

        return Ok(if text.is_empty() {
            NO_CONTENT_MESSAGE.to_string()
        } else {
            text
        });
    }

    if let Some(err) = remote_error(frame) {
        return Err(err);
    }

    Err(Error::Protocol(format!(
        "unexpected response: {}",
        Value::Object(frame.clone())
    )))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
