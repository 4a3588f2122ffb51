//! Configuration for the tool-provider server.

use crate::session::SessionOptions;
use crate::transport::Endpoint;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Interpreter used to launch the server script.
pub const DEFAULT_COMMAND: &str = "python";

/// Server script launched when none is given.
pub const DEFAULT_SERVER_PATH: &str = "server_fun.py";

fn default_command() -> String {
    DEFAULT_COMMAND.to_string()
}

fn default_args() -> Vec<String> {
    vec![DEFAULT_SERVER_PATH.to_string()]
}

fn default_handshake_timeout() -> u64 {
    30000
}

fn default_shutdown_grace() -> u64 {
    5000
}

/// How to launch and talk to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Command to run (e.g., "python", "uv").
    #[serde(default = "default_command")]
    pub command: String,
    /// Arguments to pass to the command.
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    /// Environment variables to set for the server process.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Bound on the handshake and tool listing (default: 30000).
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_ms: u64,
    /// Bound on each tool call; unbounded when absent.
    #[serde(default)]
    pub call_timeout_ms: Option<u64>,
    /// Time the server gets to exit on shutdown before it is killed (default: 5000).
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: default_args(),
            env: HashMap::new(),
            handshake_timeout_ms: default_handshake_timeout(),
            call_timeout_ms: None,
            shutdown_grace_ms: default_shutdown_grace(),
        }
    }
}

impl ServerConfig {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.command.clone(), self.args.clone()).with_env(self.env.clone())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            call_timeout: self.call_timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
