//! Error types for MCP operations.

use crate::session::SessionState;
use thiserror::Error;

/// Failures of the underlying byte channel.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("server closed the connection")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from MCP server communication.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Failed to spawn MCP server '{command}': {source}")]
    SpawnFailed {
        command: String,
        source: std::io::Error,
    },

    #[error("MCP server is already running (pid {pid:?})")]
    AlreadyStarted { pid: Option<u32> },

    #[error("MCP handshake failed: {0}")]
    Handshake(String),

    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("MCP session is closed")]
    SessionClosed,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("MCP request '{method}' timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
