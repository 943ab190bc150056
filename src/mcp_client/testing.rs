//! In-memory MCP providers for tests.
//!
//! `FakeProvider` answers JSON-RPC over a tokio duplex pipe, so sessions,
//! the registry and the orchestrator can be exercised without spawning
//! processes. `MemoryLauncher` plugs fakes into `SessionRegistry::start_all`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Notify;

use super::errors::McpError;
use super::lifecycle::{LaunchedProvider, Launcher};
use super::transport::StdioTransport;
use super::types::{error_codes, ProviderSpec, PROTOCOL_VERSION};

// ─── FakeProvider ────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct FakeConfig {
    tools: Vec<Value>,
    page_size: Option<usize>,
    results: HashMap<String, Value>,
    rpc_errors: HashMap<String, (i32, String)>,
    fail_initialize: bool,
    fail_list: bool,
    die_on_call: bool,
    hang_on_call: bool,
}

#[derive(Default)]
struct FakeState {
    calls: Mutex<Vec<(String, Value)>>,
    methods: Mutex<Vec<String>>,
    closed: AtomicBool,
    notify: Notify,
}

/// A scripted MCP provider. Clones share the recorded traffic.
#[derive(Clone, Default)]
pub struct FakeProvider {
    config: FakeConfig,
    state: Arc<FakeState>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertise a tool taking no arguments.
    pub fn with_tool(self, name: &str, description: &str) -> Self {
        self.with_tool_schema(name, description, json!({"type": "object", "properties": {}}))
    }

    /// Advertise a tool with an explicit input schema.
    pub fn with_tool_schema(mut self, name: &str, description: &str, schema: Value) -> Self {
        self.config.tools.push(json!({
            "name": name,
            "description": description,
            "inputSchema": schema,
        }));
        self
    }

    /// Split `tools/list` into pages of `n`.
    pub fn with_page_size(mut self, n: usize) -> Self {
        self.config.page_size = Some(n);
        self
    }

    /// Reply to calls of `tool` with this `tools/call` result.
    pub fn with_result(mut self, tool: &str, result: Value) -> Self {
        self.config.results.insert(tool.to_string(), result);
        self
    }

    /// Reply to calls of `tool` with a JSON-RPC error.
    pub fn with_rpc_error(mut self, tool: &str, code: i32, message: &str) -> Self {
        self.config
            .rpc_errors
            .insert(tool.to_string(), (code, message.to_string()));
        self
    }

    pub fn failing_initialize(mut self) -> Self {
        self.config.fail_initialize = true;
        self
    }

    pub fn failing_list(mut self) -> Self {
        self.config.fail_list = true;
        self
    }

    /// Drop both pipes when a `tools/call` arrives, like a crashed process.
    pub fn dying_on_call(mut self) -> Self {
        self.config.die_on_call = true;
        self
    }

    /// Never answer `tools/call`.
    pub fn hanging_on_call(mut self) -> Self {
        self.config.hang_on_call = true;
        self
    }

    /// Start serving on a fresh pipe and return the client side.
    pub fn serve(&self, name: &str) -> StdioTransport {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client);
        let (server_read, server_write) = tokio::io::split(server);

        let config = self.config.clone();
        let state = Arc::clone(&self.state);
        tokio::spawn(run(config, state, BufReader::new(server_read), server_write));

        StdioTransport::new(name, client_read, client_write)
    }

    /// Whether any message with this method reached the provider.
    pub fn saw_method(&self, method: &str) -> bool {
        lock(&self.state.methods).iter().any(|m| m == method)
    }

    /// Every `tools/call` received, as `(name, arguments)`.
    pub fn calls(&self) -> Vec<(String, Value)> {
        lock(&self.state.calls).clone()
    }

    /// Resolve once the client side has closed the pipe.
    pub async fn wait_closed(&self) {
        loop {
            let notified = self.state.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.state.closed.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

async fn run<R, W>(config: FakeConfig, state: Arc<FakeState>, mut reader: BufReader<R>, mut writer: W)
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let Ok(message) = serde_json::from_str::<Value>(line.trim()) else {
            continue;
        };
        let method = message["method"].as_str().unwrap_or_default().to_string();
        lock(&state.methods).push(method.clone());

        // Notifications get no reply.
        let Some(id) = message.get("id").cloned() else {
            continue;
        };
        let params = message.get("params").cloned().unwrap_or(Value::Null);

        let reply = match method.as_str() {
            "initialize" if config.fail_initialize => error(id, error_codes::INTERNAL_ERROR, "initialize refused"),
            "initialize" => json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "fake", "version": "0.0.0"},
                },
            }),
            "tools/list" if config.fail_list => error(id, error_codes::INTERNAL_ERROR, "listing failed"),
            "tools/list" => list_page(&config, id, &params),
            "tools/call" => {
                let name = params["name"].as_str().unwrap_or_default().to_string();
                let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
                lock(&state.calls).push((name.clone(), arguments));

                if config.die_on_call {
                    break;
                }
                if config.hang_on_call {
                    continue;
                }
                call_reply(&config, id, &name)
            }
            _ => error(id, error_codes::METHOD_NOT_FOUND, "method not found"),
        };

        let mut out = reply.to_string();
        out.push('\n');
        if writer.write_all(out.as_bytes()).await.is_err() {
            break;
        }
    }

    state.closed.store(true, Ordering::SeqCst);
    state.notify.notify_waiters();
}

fn error(id: Value, code: i32, message: &str) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
}

fn list_page(config: &FakeConfig, id: Value, params: &Value) -> Value {
    let start: usize = params["cursor"]
        .as_str()
        .and_then(|c| c.parse().ok())
        .unwrap_or(0);
    let size = config.page_size.unwrap_or(config.tools.len().max(1));
    let end = (start + size).min(config.tools.len());
    let page: Vec<Value> = config.tools.get(start..end).unwrap_or_default().to_vec();

    let mut result = json!({ "tools": page });
    if end < config.tools.len() {
        result["nextCursor"] = json!(end.to_string());
    }
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

fn call_reply(config: &FakeConfig, id: Value, name: &str) -> Value {
    if let Some((code, message)) = config.rpc_errors.get(name) {
        return error(id, *code, message);
    }
    let known = config.tools.iter().any(|t| t["name"] == name);
    if !known {
        return error(id, error_codes::INVALID_PARAMS, &format!("Unknown tool: {name}"));
    }
    let result = config.results.get(name).cloned().unwrap_or_else(|| {
        json!({
            "content": [{"type": "text", "text": format!("{name} ok")}],
            "isError": false,
        })
    });
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

// ─── MemoryLauncher ──────────────────────────────────────────────────────────

/// Launches fakes by provider id. Unknown ids fail like a missing binary.
#[derive(Default)]
pub struct MemoryLauncher {
    providers: HashMap<String, FakeProvider>,
}

impl MemoryLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: &str, fake: FakeProvider) -> Self {
        self.providers.insert(id.to_string(), fake);
        self
    }
}

#[async_trait]
impl Launcher for MemoryLauncher {
    async fn launch(&self, spec: &ProviderSpec) -> Result<LaunchedProvider, McpError> {
        let fake = self.providers.get(&spec.id).ok_or_else(|| McpError::SpawnFailed {
            name: spec.id.clone(),
            reason: format!("{}: No such file or directory", spec.command),
        })?;
        Ok(LaunchedProvider {
            transport: fake.serve(&spec.id),
            process: None,
        })
    }
}

/// A provider spec whose command is never executed.
pub fn spec(id: &str) -> ProviderSpec {
    ProviderSpec {
        id: id.to_string(),
        command: format!("{id}-server"),
        args: vec![],
        env: HashMap::new(),
        cwd: None,
    }
}
