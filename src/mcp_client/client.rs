//! MCP Client — the orchestrator context.
//!
//! Owns the session registry and the tool catalog built from it, and routes
//! tool calls by qualified name. One instance is created at startup and
//! passed explicitly to whichever front-end drives the conversation.

use std::time::{Duration, Instant};

use super::catalog::{ToolCatalog, ToolDescriptor};
use super::content::CallResult;
use super::errors::McpError;
use super::lifecycle::Launcher;
use super::registry::{SessionRegistry, ShutdownReport, StartupOptions, StartupPolicy};
use super::types::{default_separator, ProviderSpec};

// ─── Options ─────────────────────────────────────────────────────────────────

/// Settings for `McpClient::start`.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Joins provider id and tool name.
    pub separator: String,
    pub startup: StartupOptions,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            separator: default_separator(),
            startup: StartupOptions::default(),
        }
    }
}

impl ClientOptions {
    pub fn with_policy(mut self, policy: StartupPolicy) -> Self {
        self.startup.policy = policy;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.startup.request_timeout = timeout;
        self
    }
}

// ─── McpClient ───────────────────────────────────────────────────────────────

/// Multi-provider MCP client with one tool namespace.
pub struct McpClient {
    registry: SessionRegistry,
    catalog: ToolCatalog,
}

impl McpClient {
    /// Start every provider and build the catalog from those that came up.
    pub async fn start(
        specs: &[ProviderSpec],
        launcher: &dyn Launcher,
        options: ClientOptions,
    ) -> Result<Self, McpError> {
        let registry = SessionRegistry::start_all(specs, launcher, options.startup).await?;
        let catalog = ToolCatalog::build(&registry, &options.separator).await;
        Ok(Self { registry, catalog })
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Catalog tools whose provider session is still ready.
    ///
    /// A provider that died mid-conversation keeps its catalog entries until
    /// `refresh_catalog`, but they are not offered from here on.
    pub fn available_tools(&self) -> Vec<&ToolDescriptor> {
        self.catalog
            .tools()
            .iter()
            .filter(|t| self.registry.get(&t.provider_id).is_some_and(|s| s.is_ready()))
            .collect()
    }

    /// `available_tools` in OpenAI function-calling format.
    pub fn tool_definitions(&self) -> Vec<serde_json::Value> {
        self.available_tools()
            .into_iter()
            .map(ToolDescriptor::to_tool_definition)
            .collect()
    }

    /// Rebuild the catalog from scratch, dropping providers that have died.
    pub async fn refresh_catalog(&mut self) {
        let reaped = self.registry.reap_dead();
        if !reaped.is_empty() {
            tracing::info!(servers = ?reaped, "dropping dead providers from catalog");
        }
        let separator = self.catalog.separator().to_string();
        self.catalog = ToolCatalog::build(&self.registry, &separator).await;
    }

    // ─── Dispatch ────────────────────────────────────────────────────────

    /// Route a call to the provider that owns `qualified_name`.
    ///
    /// Steps:
    /// 1. Resolve the name in the catalog (`UnknownTool`, no provider contacted)
    /// 2. Validate arguments against the input schema
    /// 3. Check the owning session is still ready
    /// 4. Forward the provider-local name and normalize the result
    ///
    /// A provider-reported tool failure is a result with `is_error` set, not
    /// an `Err`.
    pub async fn dispatch(
        &self,
        qualified_name: &str,
        arguments: serde_json::Value,
    ) -> Result<CallResult, McpError> {
        let start = Instant::now();

        let tool = self.catalog.resolve(qualified_name)?;
        let arguments = tool.validate_arguments(arguments)?;

        let session = self
            .registry
            .get(&tool.provider_id)
            .filter(|s| s.is_ready())
            .ok_or_else(|| McpError::ProviderUnavailable {
                name: tool.provider_id.clone(),
                reason: "session is not ready".into(),
            })?;

        let outcome = session.call_tool(&tool.original_name, arguments).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => {
                let result = CallResult::from(result);
                tracing::info!(
                    tool = %qualified_name,
                    server = %tool.provider_id,
                    elapsed_ms,
                    is_error = result.is_error,
                    "tool call complete"
                );
                Ok(result)
            }
            Err(e @ McpError::ToolInvocation { .. }) => {
                tracing::info!(tool = %qualified_name, elapsed_ms, error = %e, "tool reported failure");
                Ok(CallResult::error(e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// `dispatch`, with every failure turned into an error result.
    pub async fn invoke(&self, qualified_name: &str, arguments: serde_json::Value) -> CallResult {
        match self.dispatch(qualified_name, arguments).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(tool = %qualified_name, error = %e, "tool call failed");
                CallResult::error(format!("Error calling tool {qualified_name}: {e}"))
            }
        }
    }

    /// Release every provider. Safe to call more than once.
    pub async fn shutdown(&mut self) -> ShutdownReport {
        self.catalog = ToolCatalog::from_provider_tools(self.catalog.separator(), Vec::new());
        self.registry.shutdown_all().await
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp_client::testing::{spec, FakeProvider, MemoryLauncher};

    async fn two_pings() -> (McpClient, FakeProvider, FakeProvider) {
        let a = FakeProvider::new().with_tool("ping", "Ping from A");
        let b = FakeProvider::new().with_tool("ping", "Ping from B");
        let launcher = MemoryLauncher::new().with("A", a.clone()).with("B", b.clone());
        let client = McpClient::start(&[spec("A"), spec("B")], &launcher, ClientOptions::default())
            .await
            .unwrap();
        (client, a, b)
    }

    #[tokio::test]
    async fn test_dispatch_reaches_only_owning_provider() {
        let (mut client, a, b) = two_pings().await;

        let names: Vec<&str> = client
            .catalog()
            .tools()
            .iter()
            .map(|t| t.qualified_name.as_str())
            .collect();
        assert_eq!(names, vec!["A_ping", "B_ping"]);

        let result = client.dispatch("A_ping", serde_json::json!({})).await.unwrap();
        assert_eq!(result.display_text, "ping ok");
        assert!(!result.is_error);
        assert_eq!(a.calls().len(), 1);
        assert!(b.calls().is_empty());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_tool_contacts_no_provider() {
        let (mut client, a, b) = two_pings().await;

        let err = client.dispatch("C_ping", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::UnknownTool { .. }));
        assert!(a.calls().is_empty());
        assert!(b.calls().is_empty());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_arguments_are_not_forwarded() {
        let fake = FakeProvider::new().with_tool_schema(
            "square",
            "",
            serde_json::json!({
                "type": "object",
                "properties": {"n": {"type": "number"}},
                "required": ["n"]
            }),
        );
        let launcher = MemoryLauncher::new().with("math", fake.clone());
        let mut client = McpClient::start(&[spec("math")], &launcher, ClientOptions::default())
            .await
            .unwrap();

        let err = client
            .dispatch("math_square", serde_json::json!({"n": "abc"}))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::InvalidArguments { .. }));
        assert!(fake.calls().is_empty());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_tool_invocation_error_becomes_error_result() {
        let fake = FakeProvider::new()
            .with_tool("ping", "")
            .with_rpc_error("ping", -32000, "host unreachable");
        let launcher = MemoryLauncher::new().with("net", fake);
        let mut client = McpClient::start(&[spec("net")], &launcher, ClientOptions::default())
            .await
            .unwrap();

        let result = client.dispatch("net_ping", serde_json::json!({})).await.unwrap();
        assert!(result.is_error);
        assert!(result.display_text.contains("host unreachable"));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_dead_provider_is_unavailable_and_leaves_catalog() {
        let fake = FakeProvider::new().with_tool("ping", "").dying_on_call();
        let launcher = MemoryLauncher::new().with("A", fake);
        let mut client = McpClient::start(&[spec("A")], &launcher, ClientOptions::default())
            .await
            .unwrap();

        let first = client.invoke("A_ping", serde_json::json!({})).await;
        assert!(first.is_error);

        let err = client.dispatch("A_ping", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::ProviderUnavailable { .. }));

        client.refresh_catalog().await;
        assert!(client.catalog().is_empty());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_dead_provider_tools_are_not_offered() {
        let a = FakeProvider::new().with_tool("ping", "").dying_on_call();
        let b = FakeProvider::new().with_tool("ping", "");
        let launcher = MemoryLauncher::new().with("A", a).with("B", b);
        let mut client = McpClient::start(&[spec("A"), spec("B")], &launcher, ClientOptions::default())
            .await
            .unwrap();
        assert_eq!(client.tool_definitions().len(), 2);

        client.invoke("A_ping", serde_json::json!({})).await;

        let offered: Vec<&str> = client
            .available_tools()
            .iter()
            .map(|t| t.qualified_name.as_str())
            .collect();
        assert_eq!(offered, vec!["B_ping"]);
        let defs = client.tool_definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0]["function"]["name"], "B_ping");
        // The catalog itself is only rebuilt on refresh.
        assert_eq!(client.catalog().len(), 2);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_mixed_content_is_normalized_end_to_end() {
        let fake = FakeProvider::new().with_tool("snapshot", "").with_result(
            "snapshot",
            serde_json::json!({
                "content": [
                    {"type": "text", "text": "captured"},
                    {"type": "image", "data": "aGVsbG8gd29ybGQ=", "mimeType": "image/png"},
                    {"type": "resource", "resource": {"uri": "file:///notes.txt", "text": "short note"}},
                    {"type": "audio", "data": "AAAA", "mimeType": "audio/wav"}
                ],
                "isError": false
            }),
        );
        let launcher = MemoryLauncher::new().with("cam", fake);
        let mut client = McpClient::start(&[spec("cam")], &launcher, ClientOptions::default())
            .await
            .unwrap();

        let result = client.dispatch("cam_snapshot", serde_json::json!({})).await.unwrap();
        assert!(!result.is_error);
        let lines: Vec<&str> = result.display_text.lines().collect();
        assert_eq!(lines[0], "captured");
        assert!(lines[1].starts_with("[image image/png, 11 bytes, sha256:"));
        assert!(!result.display_text.contains("aGVsbG8gd29ybGQ="));
        assert_eq!(lines[2], "[resource file:///notes.txt]");
        assert_eq!(lines[3], "short note");
        assert_eq!(lines[4], "[/resource]");
        assert_eq!(lines[5], "[unsupported content: audio]");

        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_invoke_reports_error_text() {
        let (mut client, _a, _b) = two_pings().await;
        let result = client.invoke("A_pnig", serde_json::json!({})).await;
        assert!(result.is_error);
        assert!(result.display_text.starts_with("Error calling tool A_pnig:"));
        assert!(result.display_text.contains("did you mean"));
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_custom_separator() {
        let launcher = MemoryLauncher::new().with("A", FakeProvider::new().with_tool("ping", ""));
        let options = ClientOptions {
            separator: ".".into(),
            ..ClientOptions::default()
        };
        let mut client = McpClient::start(&[spec("A")], &launcher, options).await.unwrap();
        assert!(client.catalog().get("A.ping").is_some());
        client.shutdown().await;
    }
}
