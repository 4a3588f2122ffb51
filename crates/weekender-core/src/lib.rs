//! Turn-by-turn dispatch of decisions to an MCP session for Weekender.

mod decider;
mod dispatch;

pub use decider::{Decider, DecisionFuture, HELP_ANSWER, JsonDecider, KeywordDecider};
pub use dispatch::{Dispatcher, Turn, is_exit_command, render_result};
