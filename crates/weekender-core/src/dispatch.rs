//! The dispatch loop: one decision per user turn, routed to an answer or a tool call.

use crate::decider::Decider;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use weekender_mcp::{Session, ToolResult};
use weekender_types::{Conversation, Decision, Message};

/// Inputs (compared case-insensitively) that end the loop.
const EXIT_COMMANDS: [&str; 2] = ["exit", "quit"];

/// Outcome of one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Turn {
    /// Show this reply and wait for the next input.
    Reply(String),
    /// The user asked to leave.
    Exit,
}

/// Whether `input` ends the session: empty after trimming, or an exit word.
pub fn is_exit_command(input: &str) -> bool {
    let input = input.trim();
    input.is_empty() || EXIT_COMMANDS.iter().any(|c| input.eq_ignore_ascii_case(c))
}

/// Text shown for a tool result: the first text block, else a JSON dump of the
/// whole result.
pub fn render_result(tool_name: &str, result: &ToolResult) -> String {
    match result {
        ToolResult::Failure { message } => format!("tool '{tool_name}' failed: {message}"),
        ToolResult::Content { .. } => match result.first_text() {
            Some(text) => text.to_string(),
            None => serde_json::to_string(result).unwrap_or_else(|_| format!("{result:?}")),
        },
    }
}

/// Drives turns against one session.
///
/// Tool and protocol errors are reported as replies; only an exit command (or
/// end of input) finishes the loop.
pub struct Dispatcher<'s> {
    session: &'s mut Session,
    decider: Arc<dyn Decider>,
    conversation: Conversation,
    finished: bool,
}

impl<'s> Dispatcher<'s> {
    pub fn new(session: &'s mut Session, decider: Arc<dyn Decider>) -> Self {
        Self {
            session,
            decider,
            conversation: Conversation::new(),
            finished: false,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Handle one line of user input. Once finished, every call returns [`Turn::Exit`].
    pub async fn turn(&mut self, input: &str) -> Turn {
        if self.finished {
            return Turn::Exit;
        }
        if is_exit_command(input) {
            tracing::debug!("exit requested");
            self.finished = true;
            return Turn::Exit;
        }

        self.conversation.push(Message::user(input.trim()));

        let decision = self.decider.decide(&self.conversation).await;
        let reply = match decision {
            Ok(Decision::Final { answer }) => answer,
            Ok(Decision::Invoke { tool_name, args }) => {
                tracing::debug!(tool = %tool_name, decider = self.decider.name(), "invoking tool");
                match self.session.call_tool(&tool_name, args).await {
                    Ok(result) => render_result(&tool_name, &result),
                    Err(e) => {
                        tracing::warn!("Tool '{tool_name}' failed: {e}");
                        format!("tool '{tool_name}' failed: {e}")
                    }
                }
            }
            Err(e) => {
                tracing::error!("Decider '{}' misbehaved: {e}", self.decider.name());
                format!("Sorry, I couldn't decide what to do: {e}")
            }
        };

        self.conversation.push(Message::assistant(reply.clone()));
        Turn::Reply(reply)
    }

    /// Read lines until exit or end of input, writing prompts and replies to `out`.
    pub async fn run<R, W>(&mut self, input: R, out: &mut W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut lines = input.lines();
        while !self.finished {
            self.prompt(out)?;
            let line = lines.next_line().await?;
            self.answer(line, out).await?;
        }
        Ok(())
    }

    /// Like [`run`](Self::run), but takes lines from a channel. A closed
    /// channel counts as end of input.
    pub async fn run_lines<W: Write>(
        &mut self,
        lines: &mut mpsc::Receiver<String>,
        out: &mut W,
    ) -> io::Result<()> {
        while !self.finished {
            self.prompt(out)?;
            let line = lines.recv().await;
            self.answer(line, out).await?;
        }
        Ok(())
    }

    fn prompt<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write!(out, "\nYou: ")?;
        out.flush()
    }

    async fn answer<W: Write>(&mut self, line: Option<String>, out: &mut W) -> io::Result<()> {
        let Some(line) = line else {
            writeln!(out)?;
            self.finished = true;
            return Ok(());
        };
        if let Turn::Reply(reply) = self.turn(&line).await {
            writeln!(out, "\nAgent: {reply}")?;
        }
        Ok(())
    }
}
