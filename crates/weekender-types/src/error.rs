//! Error hierarchy for Weekender.

use thiserror::Error;

/// Errors produced while obtaining a decision for a turn.
#[derive(Debug, Error)]
pub enum DecisionError {
    /// The collaborator returned something that is neither `final` nor a tool invocation.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// There is no user message to decide on.
    #[error("Conversation has no user message")]
    EmptyConversation,
}

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file parse error at {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Missing required configuration: {key}")]
    MissingKey { key: String },

    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}
