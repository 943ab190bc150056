//! Provider session — one initialized MCP conversation with one provider.
//!
//! Wraps a `StdioTransport` with the handshake and the typed operations the
//! orchestrator needs (`tools/list`, `tools/call`). The transport sits behind
//! an async mutex that is held for a full send/receive cycle, so a session
//! never has more than one request in flight.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;

use super::errors::McpError;
use super::transport::{extract_result, StdioTransport};
use super::types::{CallToolResult, InitializeResult, ListToolsResult, McpToolDefinition, PROTOCOL_VERSION};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Default deadline for a single request after the handshake.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound on `tools/list` pages, guards against a cursor that never ends.
const MAX_LIST_PAGES: usize = 100;

// ─── SessionState ────────────────────────────────────────────────────────────

/// Lifecycle of a provider session.
///
/// `Starting → Ready → Closed` or `Starting → Failed`. Both end states are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Ready,
    Closed,
    Failed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Starting => "starting",
            SessionState::Ready => "ready",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ─── ProviderSession ─────────────────────────────────────────────────────────

/// An MCP session with a single provider.
pub struct ProviderSession {
    provider_id: String,
    transport: Mutex<StdioTransport>,
    state: std::sync::Mutex<SessionState>,
    next_request_id: AtomicU64,
    request_timeout: Duration,
    init_result: std::sync::OnceLock<InitializeResult>,
}

impl ProviderSession {
    /// Wrap a transport. The session starts in `Starting` and must be
    /// initialized before anything else.
    pub fn new(provider_id: &str, transport: StdioTransport, request_timeout: Duration) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            transport: Mutex::new(transport),
            state: std::sync::Mutex::new(SessionState::Starting),
            next_request_id: AtomicU64::new(1),
            request_timeout,
            init_result: std::sync::OnceLock::new(),
        }
    }

    /// The provider id this session belongs to.
    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether the session accepts requests.
    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Capabilities and server info captured during the handshake.
    pub fn init_result(&self) -> Option<&InitializeResult> {
        self.init_result.get()
    }

    /// Move to `next` unless the session already reached a terminal state.
    fn transition(&self, next: SessionState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if matches!(*state, SessionState::Closed | SessionState::Failed) {
            return;
        }
        let previous = *state;
        if previous != next {
            tracing::debug!(server = %self.provider_id, from = %previous, to = %next, "session state change");
            *state = next;
        }
    }

    /// Mark the session closed (e.g. after the process was found dead).
    pub fn mark_closed(&self) {
        self.transition(SessionState::Closed);
    }

    // ─── Handshake ───────────────────────────────────────────────────────

    /// Perform the MCP initialization handshake.
    ///
    /// Sends `initialize`, then the `notifications/initialized` notification.
    /// Any failure moves the session to `Failed` and is reported as
    /// `HandshakeFailed`.
    pub async fn initialize(&self, timeout: Duration) -> Result<&InitializeResult, McpError> {
        if self.state() != SessionState::Starting {
            return Err(McpError::HandshakeFailed {
                name: self.provider_id.clone(),
                reason: format!("session is {}, expected starting", self.state()),
            });
        }

        match self.handshake(timeout).await {
            Ok(result) => {
                let result = self.init_result.get_or_init(|| result);
                self.transition(SessionState::Ready);
                tracing::info!(
                    server = %self.provider_id,
                    protocol = result.protocol_version.as_deref().unwrap_or("unknown"),
                    server_name = result
                        .server_info
                        .as_ref()
                        .and_then(|i| i.name.as_deref())
                        .unwrap_or("unknown"),
                    "provider session ready"
                );
                Ok(result)
            }
            Err(e) => {
                self.transition(SessionState::Failed);
                Err(match e {
                    McpError::HandshakeFailed { .. } => e,
                    other => McpError::HandshakeFailed {
                        name: self.provider_id.clone(),
                        reason: other.to_string(),
                    },
                })
            }
        }
    }

    async fn handshake(&self, timeout: Duration) -> Result<InitializeResult, McpError> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
        });

        let result = self.exchange("initialize", Some(params), timeout).await?;
        let init: InitializeResult =
            serde_json::from_value(result).map_err(|e| McpError::HandshakeFailed {
                name: self.provider_id.clone(),
                reason: format!("failed to parse initialize response: {e}"),
            })?;

        self.transport
            .lock()
            .await
            .notify("notifications/initialized", None)
            .await?;

        Ok(init)
    }

    // ─── Operations ──────────────────────────────────────────────────────

    /// Fetch the provider's full tool list, following pagination cursors.
    pub async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError> {
        self.ensure_ready()?;

        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let params = cursor.as_ref().map(|c| serde_json::json!({ "cursor": c }));
            let result = self.request("tools/list", params).await?;
            let page: ListToolsResult = serde_json::from_value(result).map_err(|e| {
                McpError::malformed(&self.provider_id, format!("invalid tools/list result: {e}"))
            })?;

            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tools),
            }
        }

        tracing::warn!(server = %self.provider_id, pages = MAX_LIST_PAGES, "tools/list pagination cut short");
        Ok(tools)
    }

    /// Invoke a tool by its provider-local name.
    ///
    /// No schema validation happens here. A JSON-RPC error response is
    /// reported as `ToolInvocation`.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<CallToolResult, McpError> {
        self.ensure_ready()?;

        let params = serde_json::json!({
            "name": name,
            "arguments": arguments,
        });

        let result = self
            .request("tools/call", Some(params))
            .await
            .map_err(|e| match e {
                McpError::ServerError { code, message, .. } => McpError::ToolInvocation {
                    tool: name.to_string(),
                    code,
                    message,
                },
                other => other,
            })?;

        serde_json::from_value(result).map_err(|e| {
            McpError::malformed(&self.provider_id, format!("invalid tools/call result: {e}"))
        })
    }

    /// Close the session's write side and mark it closed.
    ///
    /// Waits for any in-flight request to finish first.
    pub async fn close(&self) -> Result<(), McpError> {
        let mut transport = self.transport.lock().await;
        self.mark_closed();
        transport.close().await
    }

    // ─── Internals ───────────────────────────────────────────────────────

    fn ensure_ready(&self) -> Result<(), McpError> {
        match self.state() {
            SessionState::Ready => Ok(()),
            SessionState::Starting => Err(McpError::NotInitialized {
                name: self.provider_id.clone(),
            }),
            state => Err(McpError::ProviderUnavailable {
                name: self.provider_id.clone(),
                reason: format!("session is {state}"),
            }),
        }
    }

    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, McpError> {
        let result = self.exchange(method, params, self.request_timeout).await;
        if let Err(e) = &result {
            if e.is_session_fatal() {
                tracing::warn!(server = %self.provider_id, method, error = %e, "closing provider session");
                self.mark_closed();
            }
        }
        result
    }

    /// One request/response cycle under the session lock.
    async fn exchange(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<serde_json::Value, McpError> {
        let mut transport = self.transport.lock().await;
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);

        let response = tokio::time::timeout(timeout, transport.request(id, method, params))
            .await
            .map_err(|_| McpError::ProviderTimeout {
                name: self.provider_id.clone(),
                method: method.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })??;

        extract_result(response)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
