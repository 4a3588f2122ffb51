//! Decoded outcomes of `tools/call`.

use crate::error::McpError;
use crate::jsonrpc::JsonRpcError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A content item in a tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Audio {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Resource {
        resource: Value,
    },
}

/// Outcome of one tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolResult {
    /// The tool ran and produced these content blocks, in order.
    Content { items: Vec<ContentBlock> },
    /// The tool or server reported an error.
    Failure { message: String },
}

impl ToolResult {
    /// The first text block, if the result has one.
    pub fn first_text(&self) -> Option<&str> {
        match self {
            ToolResult::Content { items } => items.iter().find_map(|item| match item {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            }),
            ToolResult::Failure { .. } => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ToolResult::Failure { .. })
    }

    /// Decode a `tools/call` reply.
    pub(crate) fn from_reply(reply: Result<Value, JsonRpcError>) -> Result<Self, McpError> {
        let value = match reply {
            Ok(value) => value,
            Err(err) => {
                return Ok(ToolResult::Failure {
                    message: err.to_string(),
                });
            }
        };

        let result: CallToolResult = serde_json::from_value(value).map_err(|e| {
            McpError::ProtocolViolation(format!("Failed to parse tools/call result: {e}"))
        })?;

        if !result.is_error {
            return Ok(ToolResult::Content {
                items: result.content,
            });
        }

        let texts: Vec<&str> = result
            .content
            .iter()
            .filter_map(|c| match c {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        let message = if texts.is_empty() {
            "tool reported an error without details".to_string()
        } else {
            texts.join("\n")
        };
        Ok(ToolResult::Failure { message })
    }
}

#[derive(Deserialize)]
struct CallToolResult {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default, rename = "isError")]
    is_error: bool,
}
