//! MCP Client error types.

use thiserror::Error;

/// Errors that can occur during MCP client operations.
///
/// Scope of each family:
/// - `Config` aborts startup.
/// - `SpawnFailed`, `HandshakeFailed`, `ProviderUnavailable`, `Protocol`,
///   `ProviderTimeout` isolate a single provider.
/// - `UnknownTool`, `InvalidArguments`, `ToolInvocation` are scoped to one call.
#[derive(Debug, Error)]
pub enum McpError {
    /// Configuration error (missing servers, bad config file).
    #[error("config error: {reason}")]
    Config {
        reason: String,
    },

    /// A provider process failed to start.
    #[error("failed to spawn server '{name}': {reason}")]
    SpawnFailed {
        name: String,
        reason: String,
    },

    /// The initialization handshake failed.
    #[error("server '{name}' initialization failed: {reason}")]
    HandshakeFailed {
        name: String,
        reason: String,
    },

    /// The provider process exited, its pipes broke, or its session is closed.
    #[error("server '{name}' unavailable: {reason}")]
    ProviderUnavailable {
        name: String,
        reason: String,
    },

    /// The provider broke the request/response contract.
    #[error("protocol error for server '{server}': {violation}")]
    Protocol {
        server: String,
        violation: ProtocolViolation,
    },

    /// A request did not complete within its deadline.
    #[error("server '{name}' timed out after {timeout_ms}ms waiting for '{method}'")]
    ProviderTimeout {
        name: String,
        method: String,
        timeout_ms: u64,
    },

    /// Server returned a JSON-RPC error response.
    #[error("server error [{code}]: {message}")]
    ServerError {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// Tool not found in the aggregated catalog.
    #[error("unknown tool: '{name}'{}", format_suggestions(.suggestions))]
    UnknownTool {
        name: String,
        suggestions: Vec<String>,
    },

    /// Tool call arguments failed schema validation.
    #[error("invalid arguments for '{tool}': {reason}")]
    InvalidArguments {
        tool: String,
        reason: String,
    },

    /// The provider reported an application-level failure for a tool call.
    #[error("tool '{tool}' failed [{code}]: {message}")]
    ToolInvocation {
        tool: String,
        code: i32,
        message: String,
    },

    /// An operation was attempted on a session before its handshake finished.
    #[error("server '{name}' used before initialization completed")]
    NotInitialized {
        name: String,
    },
}

/// Ways a provider can violate the request/response contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    /// A response arrived whose id matches no outstanding request.
    #[error("response id {id} matches no outstanding request")]
    UnmatchedResponse {
        id: String,
    },

    /// A second request was sent while one was still awaiting its response.
    #[error("request {outstanding} still in flight")]
    RequestInFlight {
        outstanding: u64,
    },

    /// A result payload did not have the expected shape.
    #[error("malformed payload: {reason}")]
    MalformedPayload {
        reason: String,
    },
}

impl McpError {
    /// Whether this error leaves the session unusable.
    ///
    /// After a timeout or an unmatched response the byte stream can no longer
    /// be trusted to line up with our request ids, so the session is closed.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            McpError::ProviderUnavailable { .. }
                | McpError::ProviderTimeout { .. }
                | McpError::Protocol {
                    violation: ProtocolViolation::UnmatchedResponse { .. },
                    ..
                }
        )
    }

    /// Shorthand for a malformed-payload protocol error.
    pub(crate) fn malformed(server: &str, reason: impl Into<String>) -> Self {
        McpError::Protocol {
            server: server.to_string(),
            violation: ProtocolViolation::MalformedPayload {
                reason: reason.into(),
            },
        }
    }
}

fn format_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" (did you mean: {}?)", suggestions.join(", "))
    }
}
