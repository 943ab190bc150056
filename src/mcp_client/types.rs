//! Shared types for the MCP client.
//!
//! JSON-RPC 2.0 message types and MCP protocol structures.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// MCP protocol revision sent in the `initialize` request.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

// ─── JSON-RPC 2.0 ───────────────────────────────────────────────────────────

/// JSON-RPC 2.0 request message.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(id: u64, method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// Any JSON-RPC 2.0 message read from a provider.
///
/// Responses carry an `id` and no `method`. Notifications and server-initiated
/// requests carry a `method`; the transport skips those.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    #[allow(dead_code)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Whether this message is a response (as opposed to a notification or
    /// a request initiated by the server).
    pub fn is_response(&self) -> bool {
        self.method.is_none() && self.id.is_some()
    }

    /// An error reply with a null or missing id. JSON-RPC uses this when the
    /// provider could not read the request's id, e.g. after a parse error.
    pub fn is_unaddressed_error(&self) -> bool {
        self.method.is_none() && self.id.is_none() && self.error.is_some()
    }

    /// Whether the response id equals the given numeric request id.
    pub fn matches(&self, request_id: u64) -> bool {
        match &self.id {
            Some(serde_json::Value::Number(n)) => n.as_u64() == Some(request_id),
            // Some servers echo ids back as strings.
            Some(serde_json::Value::String(s)) => s.parse::<u64>().ok() == Some(request_id),
            _ => false,
        }
    }

    /// Printable form of the id, for error messages.
    pub fn id_display(&self) -> String {
        match &self.id {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "null".to_string(),
        }
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

// ─── MCP Protocol Types ──────────────────────────────────────────────────────

/// MCP tool definition as returned by `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "inputSchema", alias = "input_schema")]
    pub input_schema: serde_json::Value,
}

/// One page of a `tools/list` response.
#[derive(Debug, Clone, Deserialize)]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<McpToolDefinition>,
    #[serde(default, rename = "nextCursor")]
    pub next_cursor: Option<String>,
}

/// MCP initialize response payload.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResult {
    #[serde(default, rename = "protocolVersion")]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub capabilities: serde_json::Value,
    #[serde(default, rename = "serverInfo")]
    pub server_info: Option<ServerInfo>,
}

/// Server info returned in the initialize response.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: Option<String>,
    pub version: Option<String>,
}

/// `tools/call` response payload.
#[derive(Debug, Clone, Deserialize)]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

// ─── Content Blocks ──────────────────────────────────────────────────────────

/// One block of tool-call output.
///
/// Decided by the `type` discriminant. Anything that is not a well-formed
/// known variant becomes `Unsupported`, so a provider emitting a newer
/// content type never fails the whole call.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        data: String,
        mime_type: String,
    },
    Resource {
        resource: ResourceContents,
    },
    Unsupported {
        kind: String,
    },
}

/// Contents of an embedded resource.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ResourceContents {
    Text {
        uri: String,
        #[serde(default, rename = "mimeType")]
        mime_type: Option<String>,
        text: String,
    },
    Blob {
        uri: String,
        #[serde(default, rename = "mimeType")]
        mime_type: Option<String>,
        blob: String,
    },
}

/// Wire shape of the known content variants.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum KnownContent {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Resource {
        resource: ResourceContents,
    },
}

impl ContentBlock {
    /// Decode a single content block from its JSON form.
    pub fn from_value(value: serde_json::Value) -> Self {
        let kind = value
            .get("type")
            .and_then(|t| t.as_str())
            .unwrap_or("missing")
            .to_string();

        match serde_json::from_value::<KnownContent>(value) {
            Ok(KnownContent::Text { text }) => ContentBlock::Text { text },
            Ok(KnownContent::Image { data, mime_type }) => ContentBlock::Image { data, mime_type },
            Ok(KnownContent::Resource { resource }) => ContentBlock::Resource { resource },
            Err(_) => ContentBlock::Unsupported { kind },
        }
    }
}

impl<'de> Deserialize<'de> for ContentBlock {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(ContentBlock::from_value(value))
    }
}

// ─── Configuration ───────────────────────────────────────────────────────────

/// Server configuration entry from `server.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Working directory for the provider process.
    #[serde(default)]
    pub cwd: Option<String>,
}

/// Top-level provider configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct McpServersConfig {
    #[serde(rename = "mcpServers", alias = "servers")]
    pub servers: BTreeMap<String, ServerConfig>,
    /// Joins provider id and tool name into a qualified name.
    #[serde(default = "default_separator")]
    pub separator: String,
}

/// Default separator between provider id and tool name.
///
/// `_` keeps qualified names inside the `[a-zA-Z0-9_-]` alphabet that
/// OpenAI-style function names require.
pub fn default_separator() -> String {
    "_".to_string()
}

/// Launch description for one provider. Immutable once built from config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSpec {
    pub id: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub cwd: Option<String>,
}

impl ProviderSpec {
    /// Build a spec from a config entry.
    pub fn from_config(id: &str, config: &ServerConfig) -> Self {
        Self {
            id: id.to_string(),
            command: config.command.clone(),
            args: config.args.clone(),
            env: config.env.clone(),
            cwd: config.cwd.clone(),
        }
    }
}

// ─── Standard MCP Error Codes ────────────────────────────────────────────────

/// Well-known JSON-RPC error codes.
pub mod error_codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i32 = -32700;
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i32 = -32603;
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_rpc_request_serialization() {
        let req = JsonRpcRequest::new(1, "initialize", None);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"id\":1"));
        assert!(json.contains("\"method\":\"initialize\""));
        // params should be omitted when None
        assert!(!json.contains("params"));
    }

    #[test]
    fn test_json_rpc_response_matches_numeric_and_string_ids() {
        let numeric: JsonRpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":4,"result":{}}"#).unwrap();
        assert!(numeric.is_response());
        assert!(numeric.matches(4));
        assert!(!numeric.matches(5));

        let string: JsonRpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":"4","result":{}}"#).unwrap();
        assert!(string.matches(4));
        assert_eq!(string.id_display(), "4");
    }

    #[test]
    fn test_notification_is_not_a_response() {
        let note: JsonRpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","method":"notifications/message","params":{"level":"info"}}"#,
        )
        .unwrap();
        assert!(!note.is_response());

        let server_request: JsonRpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":9,"method":"ping"}"#).unwrap();
        assert!(!server_request.is_response());
    }

    #[test]
    fn test_json_rpc_error_response() {
        let json = r#"{
            "jsonrpc": "2.0",
            "id": 2,
            "error": {"code": -32601, "message": "Method not found"}
        }"#;
        let resp: JsonRpcResponse = serde_json::from_str(json).unwrap();
        let err = resp.error.unwrap();
        assert_eq!(err.code, error_codes::METHOD_NOT_FOUND);
    }

    #[test]
    fn test_tool_definition_reads_camel_case_schema() {
        let json = r#"{"name": "add", "inputSchema": {"type": "object", "required": ["a"]}}"#;
        let tool: McpToolDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(tool.description, "");
        assert_eq!(tool.input_schema["required"][0], "a");
    }

    #[test]
    fn test_content_block_known_variants() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "hello"},
                {"type": "image", "data": "aGk=", "mimeType": "image/png"},
                {"type": "resource", "resource": {"uri": "file:///a.txt", "text": "body"}},
                {"type": "resource", "resource": {"uri": "file:///a.bin", "blob": "AAEC", "mimeType": "application/octet-stream"}}
            ]
        }))
        .unwrap();

        assert!(!result.is_error);
        assert_eq!(result.content[0], ContentBlock::Text { text: "hello".into() });
        assert!(matches!(result.content[1], ContentBlock::Image { ref mime_type, .. } if mime_type == "image/png"));
        assert!(matches!(
            result.content[2],
            ContentBlock::Resource { resource: ResourceContents::Text { .. } }
        ));
        assert!(matches!(
            result.content[3],
            ContentBlock::Resource { resource: ResourceContents::Blob { .. } }
        ));
    }

    #[test]
    fn test_content_block_unknown_and_malformed_fall_back() {
        let audio = ContentBlock::from_value(json!({"type": "audio", "data": "..."}));
        assert_eq!(audio, ContentBlock::Unsupported { kind: "audio".into() });

        let broken_text = ContentBlock::from_value(json!({"type": "text"}));
        assert_eq!(broken_text, ContentBlock::Unsupported { kind: "text".into() });

        let untyped = ContentBlock::from_value(json!(42));
        assert_eq!(untyped, ContentBlock::Unsupported { kind: "missing".into() });
    }

    #[test]
    fn test_servers_config_defaults() {
        let config: McpServersConfig = serde_json::from_str(
            r#"{"mcpServers": {"python": {"command": "uv", "args": ["run", "server.py"]}}}"#,
        )
        .unwrap();
        assert_eq!(config.separator, "_");
        let python = &config.servers["python"];
        assert_eq!(python.args, vec!["run", "server.py"]);
        assert!(python.env.is_empty());
        assert!(python.cwd.is_none());
    }
}
