//! MCP session over one [`Channel`].
//!
//! Handles the protocol handshake (initialize + initialized notification),
//! tool discovery (tools/list) and tool invocation (tools/call). Exactly one
//! request is in flight at a time; replies are matched to it by id.

use crate::channel::Channel;
use crate::content::ToolResult;
use crate::error::{McpError, TransportError};
use crate::jsonrpc::{
    Incoming, JsonRpcError, JsonRpcNotification, JsonRpcReply, JsonRpcRequest, METHOD_NOT_FOUND,
    parse_incoming,
};
use crate::registry::{ToolDescriptor, ToolRegistry};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// MCP protocol version we support.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Default bound on `initialize` and `tools/list`.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Lifecycle of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unstarted,
    Initializing,
    Ready,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Unstarted => "unstarted",
            SessionState::Initializing => "initializing",
            SessionState::Ready => "ready",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Timeouts applied by a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub handshake_timeout: Duration,
    /// `None` waits for a tool reply indefinitely.
    pub call_timeout: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            call_timeout: None,
        }
    }
}

/// Name and version the server reported during the handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Deserialize)]
struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    protocol_version: String,
    #[serde(default, rename = "serverInfo")]
    server_info: ServerInfo,
}

#[derive(Deserialize)]
struct ToolsListResult {
    tools: Vec<ToolEntry>,
}

#[derive(Deserialize)]
struct ToolEntry {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default = "default_schema", rename = "inputSchema")]
    input_schema: Value,
}

fn default_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

/// Protocol client for a single server connection.
pub struct Session {
    channel: Box<dyn Channel>,
    options: SessionOptions,
    state: SessionState,
    next_id: u64,
    registry: Option<ToolRegistry>,
    server_info: Option<ServerInfo>,
    channel_closed: bool,
}

impl Session {
    pub fn new(channel: Box<dyn Channel>, options: SessionOptions) -> Self {
        Self {
            channel,
            options,
            state: SessionState::Unstarted,
            next_id: 1,
            registry: None,
            server_info: None,
            channel_closed: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    /// The cached registry, once [`list_tools`](Self::list_tools) has succeeded.
    pub fn registry(&self) -> Option<&ToolRegistry> {
        self.registry.as_ref()
    }

    /// Perform the handshake. On failure the session is closed.
    pub async fn initialize(&mut self) -> Result<(), McpError> {
        match self.state {
            SessionState::Unstarted => {}
            SessionState::Closed => return Err(McpError::SessionClosed),
            state => {
                return Err(McpError::InvalidState {
                    operation: "initialize",
                    state,
                });
            }
        }

        self.state = SessionState::Initializing;
        match self.handshake().await {
            Ok(info) => {
                tracing::info!(
                    "MCP session ready (server '{}' {})",
                    info.name,
                    info.version
                );
                self.server_info = Some(info);
                self.state = SessionState::Ready;
                Ok(())
            }
            Err(e) => {
                self.close().await;
                Err(match e {
                    McpError::Handshake(_) => e,
                    other => McpError::Handshake(other.to_string()),
                })
            }
        }
    }

    async fn handshake(&mut self) -> Result<ServerInfo, McpError> {
        let init_params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "weekender",
                "version": env!("CARGO_PKG_VERSION")
            }
        });

        let timeout = Some(self.options.handshake_timeout);
        let reply = self
            .request("initialize", Some(init_params), timeout)
            .await?
            .map_err(|err| McpError::Handshake(format!("server rejected initialize: {err}")))?;

        let init: InitializeResult = serde_json::from_value(reply)
            .map_err(|e| McpError::Handshake(format!("invalid initialize result: {e}")))?;
        if init.protocol_version != PROTOCOL_VERSION {
            tracing::debug!(
                "MCP server negotiated protocol {} (requested {PROTOCOL_VERSION})",
                init.protocol_version
            );
        }

        self.notify("notifications/initialized", None).await?;
        Ok(init.server_info)
    }

    /// List the server's tools, fetching them on first use and caching after.
    pub async fn list_tools(&mut self) -> Result<&[ToolDescriptor], McpError> {
        self.ensure_ready("list tools")?;
        if self.registry.is_none() {
            self.refresh_tools().await?;
        }
        Ok(self
            .registry
            .as_ref()
            .map(ToolRegistry::descriptors)
            .unwrap_or_default())
    }

    /// Re-fetch the tool listing, replacing the cached registry.
    pub async fn refresh_tools(&mut self) -> Result<&ToolRegistry, McpError> {
        self.ensure_ready("list tools")?;

        let timeout = Some(self.options.handshake_timeout);
        let reply = self
            .request("tools/list", None, timeout)
            .await?
            .map_err(|err| McpError::ProtocolViolation(format!("tools/list failed: {err}")))?;

        let list: ToolsListResult = serde_json::from_value(reply).map_err(|e| {
            McpError::ProtocolViolation(format!("Failed to parse tools/list response: {e}"))
        })?;

        let registry = ToolRegistry::new(list.tools.into_iter().map(|t| ToolDescriptor {
            name: t.name,
            description: t.description.unwrap_or_default(),
            input_schema: t.input_schema,
        }));
        tracing::info!("MCP server exposes {} tools", registry.len());

        Ok(&*self.registry.insert(registry))
    }

    /// Call a tool by name.
    ///
    /// Unknown names fail with [`McpError::UnknownTool`] before anything is
    /// written to the channel.
    pub async fn call_tool(
        &mut self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolResult, McpError> {
        self.ensure_ready("call a tool")?;
        if self.registry.is_none() {
            self.refresh_tools().await?;
        }
        if let Some(registry) = &self.registry {
            registry.require(name)?;
        }

        let params = serde_json::json!({
            "name": name,
            "arguments": arguments,
        });
        tracing::debug!(tool = name, "calling MCP tool");

        let timeout = self.options.call_timeout;
        let reply = self.request("tools/call", Some(params), timeout).await?;
        ToolResult::from_reply(reply)
    }

    /// Close the channel. Idempotent.
    pub async fn close(&mut self) {
        if !self.channel_closed {
            self.channel.close().await;
            self.channel_closed = true;
            tracing::debug!("MCP session closed");
        }
        self.state = SessionState::Closed;
    }

    fn ensure_ready(&self, operation: &'static str) -> Result<(), McpError> {
        match self.state {
            SessionState::Ready => Ok(()),
            SessionState::Closed => Err(McpError::SessionClosed),
            state => Err(McpError::InvalidState { operation, state }),
        }
    }

    /// Send a request and wait for the reply with the same id.
    ///
    /// A dead channel moves the session to `Closed`; a timeout leaves it usable
    /// and the late reply is discarded when it arrives.
    async fn request(
        &mut self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Result<Value, JsonRpcError>, McpError> {
        let id = self.next_id;
        self.next_id += 1;
        let serialized = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;

        let sent = self.channel.send(serialized).await;
        let result = match sent {
            Ok(()) => match timeout {
                Some(limit) => tokio::time::timeout(limit, self.await_reply(id))
                    .await
                    .unwrap_or_else(|_| {
                        Err(McpError::Timeout {
                            method: method.to_string(),
                            timeout_ms: limit.as_millis() as u64,
                        })
                    }),
                None => self.await_reply(id).await,
            },
            Err(e) => Err(e.into()),
        };

        if let Err(McpError::Transport(e)) = &result {
            tracing::warn!("MCP channel failed during '{method}': {e}");
            self.state = SessionState::Closed;
        }
        result
    }

    async fn await_reply(&mut self, id: u64) -> Result<Result<Value, JsonRpcError>, McpError> {
        loop {
            let line = self.channel.recv().await?.ok_or(TransportError::Closed)?;
            let message = match parse_incoming(&line) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!("Failed to parse MCP message: {e}: {line}");
                    continue;
                }
            };

            match message {
                Incoming::Response {
                    id: Some(reply_id),
                    outcome,
                } if reply_id == id => return Ok(outcome),
                Incoming::Response { id: other, .. } => {
                    tracing::debug!("Discarding MCP reply for id {other:?} (waiting on {id})");
                }
                Incoming::Notification { method } => {
                    tracing::debug!("Ignoring MCP notification '{method}'");
                }
                Incoming::Request { id: request_id, method } => {
                    self.answer_server_request(request_id, &method).await?;
                }
            }
        }
    }

    async fn answer_server_request(&mut self, id: Value, method: &str) -> Result<(), McpError> {
        let reply = if method == "ping" {
            JsonRpcReply::result(id, serde_json::json!({}))
        } else {
            tracing::debug!("Rejecting unsupported server request '{method}'");
            JsonRpcReply::error(id, METHOD_NOT_FOUND, format!("Method not found: {method}"))
        };
        self.channel.send(serde_json::to_string(&reply)?).await?;
        Ok(())
    }

    async fn notify(&mut self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        let serialized = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        self.channel.send(serialized).await?;
        Ok(())
    }
}
