//! Agent Core error types.

use thiserror::Error;

/// Errors that end a conversation loop.
///
/// Tool and model failures never show up here; they become tool messages or
/// printed errors and the loop keeps going.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Reading the user's input or writing output failed.
    #[error("terminal I/O error: {reason}")]
    Io { reason: String },
}

impl From<std::io::Error> for AgentError {
    fn from(e: std::io::Error) -> Self {
        AgentError::Io {
            reason: e.to_string(),
        }
    }
}
