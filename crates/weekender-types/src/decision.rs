//! The per-turn routing outcome produced by a decision collaborator.

use crate::error::DecisionError;
use serde_json::{Map, Value};

/// Action name that marks a direct answer in a raw decision payload.
pub const FINAL_ACTION: &str = "final";

/// One turn's routing decision: answer directly or invoke a tool.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Reply with `answer` without touching the session.
    Final { answer: String },
    /// Call `tool_name` on the server with `args`.
    Invoke {
        tool_name: String,
        args: Map<String, Value>,
    },
}

impl Decision {
    pub fn final_answer(answer: impl Into<String>) -> Self {
        Decision::Final {
            answer: answer.into(),
        }
    }

    pub fn invoke(tool_name: impl Into<String>, args: Map<String, Value>) -> Self {
        Decision::Invoke {
            tool_name: tool_name.into(),
            args,
        }
    }
}

/// Validate an untyped payload of the form `{"action": "final", "answer": ..}`
/// or `{"action": "<tool>", "args": {..}}`.
///
/// Anything else is rejected rather than guessed at.
impl TryFrom<Value> for Decision {
    type Error = DecisionError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let mut obj = match value {
            Value::Object(obj) => obj,
            other => {
                return Err(DecisionError::ProtocolViolation(format!(
                    "decision must be a JSON object, got {other}"
                )));
            }
        };

        let action = match obj.remove("action") {
            Some(Value::String(action)) if !action.trim().is_empty() => action,
            Some(other) => {
                return Err(DecisionError::ProtocolViolation(format!(
                    "'action' must be a non-empty string, got {other}"
                )));
            }
            None => {
                return Err(DecisionError::ProtocolViolation(
                    "decision has no 'action' field".to_string(),
                ));
            }
        };

        if action == FINAL_ACTION {
            return match obj.remove("answer") {
                Some(Value::String(answer)) => Ok(Decision::Final { answer }),
                Some(other) => Err(DecisionError::ProtocolViolation(format!(
                    "'answer' must be a string, got {other}"
                ))),
                None => Err(DecisionError::ProtocolViolation(
                    "final decision has no 'answer' field".to_string(),
                )),
            };
        }

        let args = match obj.remove("args") {
            Some(Value::Object(args)) => args,
            None | Some(Value::Null) => Map::new(),
            Some(other) => {
                return Err(DecisionError::ProtocolViolation(format!(
                    "'args' for '{action}' must be an object, got {other}"
                )));
            }
        };

        Ok(Decision::Invoke {
            tool_name: action,
            args,
        })
    }
}
