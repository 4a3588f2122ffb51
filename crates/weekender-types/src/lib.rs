//! Shared types and error hierarchy for Weekender.

pub mod decision;
pub mod error;
pub mod message;

pub use decision::*;
pub use error::{ConfigError, DecisionError};
pub use message::*;
