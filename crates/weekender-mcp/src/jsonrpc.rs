//! JSON-RPC 2.0 framing for MCP communication.
//!
//! Outgoing messages are serialized from the typed structs below. Incoming
//! lines are classified by [`parse_incoming`] into responses, server requests
//! and server notifications.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Error code for a method the peer does not implement.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 notification (no id, no response expected).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }
}

/// Our answer to a request the server sent us.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcReply {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcReply {
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// Raw shape shared by every message a server can send.
#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

/// A classified inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// Reply to one of our requests. `id` is `None` when the server could not
    /// attribute the reply (e.g. `"id": null` on a parse error).
    Response {
        id: Option<u64>,
        outcome: Result<Value, JsonRpcError>,
    },
    /// The server is asking us something and expects a reply.
    Request { id: Value, method: String },
    /// Fire-and-forget message from the server.
    Notification { method: String },
}

/// Parse one line received from the server.
///
/// A response carrying neither `result` nor `error` yields `Ok(Value::Null)`;
/// callers decide whether a null result is acceptable for their method.
pub fn parse_incoming(line: &str) -> Result<Incoming, serde_json::Error> {
    let raw: RawMessage = serde_json::from_str(line)?;
    let id = raw.id.filter(|id| !id.is_null());

    Ok(match (raw.method, id) {
        (Some(method), Some(id)) => Incoming::Request { id, method },
        (Some(method), None) => Incoming::Notification { method },
        (None, id) => Incoming::Response {
            id: id.as_ref().and_then(Value::as_u64),
            outcome: match raw.error {
                Some(err) => Err(err),
                None => Ok(raw.result.unwrap_or(Value::Null)),
            },
        },
    })
}
