//! Stdio transport for MCP server communication.
//!
//! [`StdioTransport`] owns the child process lifecycle. Starting it yields a
//! [`StdioChannel`] carrying newline-delimited messages over the child's
//! stdin/stdout; the channel is what a session reads and writes.

use crate::channel::{Channel, ChannelFuture};
use crate::error::{McpError, TransportError};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Default time a child gets to exit after its stdin is closed before it is killed.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Buffered messages per direction.
const CHANNEL_CAPACITY: usize = 64;

/// The program to launch as the tool-provider process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
}

impl Endpoint {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            env: HashMap::new(),
        }
    }

    /// Add environment variables for the child process.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }
}

struct RunningProcess {
    child: Child,
    reader_handle: JoinHandle<()>,
    writer_handle: JoinHandle<()>,
}

/// Launches and stops the server process behind an [`Endpoint`].
///
/// At most one process runs per transport. The child is spawned with
/// `kill_on_drop`, so dropping the transport never leaks it.
pub struct StdioTransport {
    endpoint: Endpoint,
    shutdown_grace: Duration,
    running: Option<RunningProcess>,
}

impl StdioTransport {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            running: None,
        }
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Whether a process has been started and not yet stopped.
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// OS process id of the running child.
    pub fn pid(&self) -> Option<u32> {
        self.running.as_ref().and_then(|p| p.child.id())
    }

    /// Spawn the child process and start background reader/writer tasks.
    pub fn start(&mut self) -> Result<StdioChannel, McpError> {
        if self.running.is_some() {
            return Err(McpError::AlreadyStarted { pid: self.pid() });
        }

        let mut cmd = Command::new(self.endpoint.command());
        cmd.args(self.endpoint.args())
            .envs(self.endpoint.env())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let spawn_failed = |source| McpError::SpawnFailed {
            command: self.endpoint.command().to_string(),
            source,
        };

        let mut child = cmd.spawn().map_err(spawn_failed)?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_failed(std::io::Error::other("child stdin not captured")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_failed(std::io::Error::other("child stdout not captured")))?;

        // Writer task: drains channel and writes to child stdin
        let (write_tx, mut write_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
        let writer_handle = tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(msg) = write_rx.recv().await {
                let written = async {
                    stdin.write_all(msg.as_bytes()).await?;
                    stdin.write_all(b"\n").await?;
                    stdin.flush().await
                }
                .await;
                if let Err(e) = written {
                    tracing::debug!("MCP server stdin closed: {e}");
                    break;
                }
            }
        });

        // Reader task: forwards non-empty stdout lines; EOF closes the inbound half
        let (read_tx, read_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
        let reader_handle = tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = match String::from_utf8(std::mem::take(&mut buf)) {
                            Ok(line) => line,
                            Err(e) => {
                                tracing::warn!("Skipping non-UTF-8 line from MCP server: {e}");
                                continue;
                            }
                        };
                        let line = line.trim_end_matches(['\n', '\r']);
                        if line.trim().is_empty() {
                            continue;
                        }
                        if read_tx.send(line.to_string()).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to read from MCP server: {e}");
                        break;
                    }
                }
            }
        });

        tracing::debug!(
            command = self.endpoint.command(),
            pid = child.id(),
            "MCP server process started"
        );

        self.running = Some(RunningProcess {
            child,
            reader_handle,
            writer_handle,
        });

        Ok(StdioChannel {
            write_tx: Some(write_tx),
            read_rx,
        })
    }

    /// Stop the child: close its stdin, wait up to the grace period, then kill.
    ///
    /// Safe to call repeatedly and when `start` never succeeded.
    pub async fn stop(&mut self) {
        let Some(mut process) = self.running.take() else {
            return;
        };

        // Dropping the writer task drops the child's stdin, which sends EOF
        process.writer_handle.abort();
        let _ = process.writer_handle.await;

        match tokio::time::timeout(self.shutdown_grace, process.child.wait()).await {
            Ok(Ok(status)) => tracing::debug!("MCP server exited with {status}"),
            Ok(Err(e)) => tracing::warn!("Failed to wait for MCP server: {e}"),
            Err(_) => {
                tracing::debug!(
                    "MCP server did not exit within {}ms, killing",
                    self.shutdown_grace.as_millis()
                );
                if let Err(e) = process.child.kill().await {
                    tracing::warn!("Failed to kill MCP server: {e}");
                }
            }
        }

        process.reader_handle.abort();
    }
}

/// Line-framed channel over a child's stdin/stdout.
pub struct StdioChannel {
    write_tx: Option<mpsc::Sender<String>>,
    read_rx: mpsc::Receiver<String>,
}

impl Channel for StdioChannel {
    fn send(&mut self, message: String) -> ChannelFuture<'_, ()> {
        Box::pin(async move {
            let tx = self.write_tx.as_ref().ok_or(TransportError::Closed)?;
            tx.send(message).await.map_err(|_| TransportError::Closed)
        })
    }

    fn recv(&mut self) -> ChannelFuture<'_, Option<String>> {
        Box::pin(async move { Ok(self.read_rx.recv().await) })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.write_tx.take();
            self.read_rx.close();
        })
    }
}
