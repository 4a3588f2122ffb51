//! Connection — a started transport with an initialized session on top.
//!
//! Acquired in order (process, then session) and released in reverse.
//! A failure part-way through `open` releases whatever was already acquired.

use crate::config::ServerConfig;
use crate::error::McpError;
use crate::session::Session;
use crate::transport::StdioTransport;

/// A live connection to one MCP server.
pub struct Connection {
    session: Session,
    transport: StdioTransport,
}

impl Connection {
    /// Spawn the server, perform the handshake and discover its tools.
    pub async fn open(config: &ServerConfig) -> Result<Self, McpError> {
        let mut transport =
            StdioTransport::new(config.endpoint()).with_shutdown_grace(config.shutdown_grace());
        let channel = transport.start()?;
        let mut session = Session::new(Box::new(channel), config.session_options());

        if let Err(e) = Self::establish(&mut session).await {
            tracing::warn!("Failed to connect to MCP server '{}': {e}", config.command);
            session.close().await;
            transport.stop().await;
            return Err(e);
        }

        Ok(Self { session, transport })
    }

    async fn establish(session: &mut Session) -> Result<(), McpError> {
        session.initialize().await?;
        session.list_tools().await?;
        Ok(())
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// OS process id of the server, until the connection is closed.
    pub fn server_pid(&self) -> Option<u32> {
        self.transport.pid()
    }

    /// Names of the tools the server exposes, in listing order.
    pub fn tool_names(&self) -> Vec<&str> {
        self.session
            .registry()
            .map(|r| r.names())
            .unwrap_or_default()
    }

    /// Close the session, then stop the server process.
    pub async fn close(mut self) {
        self.session.close().await;
        self.transport.stop().await;
    }
}
