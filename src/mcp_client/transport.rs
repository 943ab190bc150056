//! JSON-RPC over stdio transport.
//!
//! Handles low-level communication with an MCP provider:
//! - Writing JSON-RPC requests to the provider's stdin
//! - Reading JSON-RPC responses from its stdout
//! - Line-delimited JSON protocol (one JSON object per line)
//!
//! The transport is generic over the byte streams so the same code runs over
//! child-process pipes and in-memory duplex pipes.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use super::errors::{McpError, ProtocolViolation};
use super::types::{error_codes, JsonRpcRequest, JsonRpcResponse};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

// ─── Transport ───────────────────────────────────────────────────────────────

/// Bi-directional JSON-RPC transport over a provider's byte streams.
///
/// At most one request is outstanding at a time: `send` refuses to write a
/// second request until `receive` has consumed the response to the first.
pub struct StdioTransport {
    server_name: String,
    /// `None` once closed; dropping the writer is what closes a pipe.
    writer: Option<BoxedWriter>,
    reader: BufReader<BoxedReader>,
    outstanding: Option<u64>,
}

impl StdioTransport {
    /// Create a new transport from a reader (provider stdout) and writer
    /// (provider stdin).
    pub fn new<R, W>(server_name: &str, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            server_name: server_name.to_string(),
            writer: Some(Box::new(writer)),
            reader: BufReader::new(Box::new(reader)),
            outstanding: None,
        }
    }

    /// The id of the request currently awaiting a response, if any.
    pub fn outstanding(&self) -> Option<u64> {
        self.outstanding
    }

    /// Write one request line carrying the caller-chosen correlation id.
    pub async fn send(
        &mut self,
        id: u64,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        if let Some(outstanding) = self.outstanding {
            return Err(McpError::Protocol {
                server: self.server_name.clone(),
                violation: ProtocolViolation::RequestInFlight { outstanding },
            });
        }

        let req = JsonRpcRequest::new(id, method, params);
        let mut json = serde_json::to_string(&req)
            .map_err(|e| McpError::malformed(&self.server_name, format!("failed to serialize request: {e}")))?;
        json.push('\n');

        self.write_line(&json).await?;
        self.outstanding = Some(id);
        Ok(())
    }

    /// Read lines until the response to the outstanding request arrives.
    ///
    /// Non-JSON lines (stray log output), notifications and server-initiated
    /// requests are skipped. A response whose id does not match the
    /// outstanding request is a protocol violation. An error with a null id
    /// is taken as the answer to the outstanding request.
    pub async fn receive(&mut self) -> Result<JsonRpcResponse, McpError> {
        let mut line_buf = String::new();

        loop {
            line_buf.clear();
            let bytes_read = match self.reader.read_line(&mut line_buf).await {
                Ok(n) => n,
                Err(e) => {
                    self.outstanding = None;
                    return Err(McpError::ProviderUnavailable {
                        name: self.server_name.clone(),
                        reason: format!("failed to read from stdout: {e}"),
                    });
                }
            };

            if bytes_read == 0 {
                self.outstanding = None;
                return Err(McpError::ProviderUnavailable {
                    name: self.server_name.clone(),
                    reason: "server stdout closed (process may have exited)".into(),
                });
            }

            let trimmed = line_buf.trim();
            if trimmed.is_empty() {
                continue;
            }

            let message = match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(message) => message,
                Err(_) => {
                    tracing::trace!(server = %self.server_name, line = %trimmed, "skipping non-JSON-RPC line");
                    continue;
                }
            };

            if message.is_unaddressed_error() {
                if let Some(id) = self.outstanding.take() {
                    tracing::warn!(
                        server = %self.server_name,
                        request_id = id,
                        "provider returned an error without an id"
                    );
                    return Ok(message);
                }
            }

            if !message.is_response() {
                tracing::debug!(
                    server = %self.server_name,
                    method = message.method.as_deref().unwrap_or(""),
                    "skipping provider-initiated message"
                );
                continue;
            }

            return match self.outstanding {
                Some(id) if message.matches(id) => {
                    self.outstanding = None;
                    Ok(message)
                }
                _ => {
                    self.outstanding = None;
                    Err(McpError::Protocol {
                        server: self.server_name.clone(),
                        violation: ProtocolViolation::UnmatchedResponse {
                            id: message.id_display(),
                        },
                    })
                }
            };
        }
    }

    /// Send a request and wait for its matching response.
    pub async fn request(
        &mut self,
        id: u64,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        self.send(id, method, params).await?;
        self.receive().await
    }

    /// Send a JSON-RPC notification (no response expected).
    pub async fn notify(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        let mut notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
        });
        if let Some(params) = params {
            notification["params"] = params;
        }

        let mut json = notification.to_string();
        json.push('\n');
        self.write_line(&json).await
    }

    /// Close the write side. Providers treat EOF on stdin as a request to exit.
    ///
    /// The writer is dropped even if the flush fails: a child's stdin pipe
    /// only reaches EOF when its handle is released.
    pub async fn close(&mut self) -> Result<(), McpError> {
        self.outstanding = None;
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        writer.shutdown().await.map_err(|e| McpError::ProviderUnavailable {
            name: self.server_name.clone(),
            reason: format!("failed to close stdin: {e}"),
        })
    }

    async fn write_line(&mut self, line: &str) -> Result<(), McpError> {
        let writer = self.writer.as_mut().ok_or_else(|| McpError::ProviderUnavailable {
            name: self.server_name.clone(),
            reason: "stdin already closed".into(),
        })?;
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| McpError::ProviderUnavailable {
                name: self.server_name.clone(),
                reason: format!("failed to write to stdin: {e}"),
            })?;
        writer
            .flush()
            .await
            .map_err(|e| McpError::ProviderUnavailable {
                name: self.server_name.clone(),
                reason: format!("failed to flush stdin: {e}"),
            })
    }
}

// ─── Response Helpers ────────────────────────────────────────────────────────

/// Extract the result from a JSON-RPC response, converting errors to `McpError`.
pub fn extract_result(response: JsonRpcResponse) -> Result<serde_json::Value, McpError> {
    if let Some(err) = response.error {
        return Err(McpError::ServerError {
            code: err.code,
            message: err.message,
            data: err.data,
        });
    }

    response.result.ok_or(McpError::ServerError {
        code: error_codes::INTERNAL_ERROR,
        message: "response missing both result and error".into(),
        data: None,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
