//! MCP (Model Context Protocol) client for Weekender.
//!
//! Talks to a single stdio MCP server over newline-delimited JSON-RPC 2.0.
//! The server is spawned as a child process, initialized with a handshake,
//! and its tools are discovered once and then invoked by name.

pub mod channel;
pub mod config;
pub mod connection;
pub mod content;
pub mod error;
pub mod jsonrpc;
pub mod registry;
pub mod session;
pub mod transport;

pub use channel::Channel;
pub use config::ServerConfig;
pub use connection::Connection;
pub use content::{ContentBlock, ToolResult};
pub use error::{McpError, TransportError};
pub use registry::{ToolDescriptor, ToolRegistry};
pub use session::{ServerInfo, Session, SessionOptions, SessionState};
pub use transport::{Endpoint, StdioChannel, StdioTransport};
