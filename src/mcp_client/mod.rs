//! MCP Client — many stdio providers behind one tool namespace.
//!
//! This module handles:
//! - Spawning provider child processes and draining their stderr
//! - JSON-RPC 2.0 over process stdio, one request in flight per session
//! - The initialize handshake and typed `tools/list` / `tools/call`
//! - Bulk startup and guaranteed bulk shutdown of every provider
//! - Aggregating tools under `provider<sep>tool` names and dispatching calls
//! - Normalizing tool results into text for conversation history

pub mod catalog;
pub mod client;
pub mod config;
pub mod content;
pub mod errors;
pub mod lifecycle;
pub mod registry;
pub mod session;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use catalog::{ToolCatalog, ToolDescriptor};
pub use client::{ClientOptions, McpClient};
pub use config::{load_servers_config, LoadedServers};
pub use content::{normalize_content, CallResult};
pub use errors::{McpError, ProtocolViolation};
pub use lifecycle::{Launcher, ProcessLauncher};
pub use registry::{SessionRegistry, ShutdownReport, StartupOptions, StartupPolicy};
pub use session::{ProviderSession, SessionState};
pub use types::{ContentBlock, McpToolDefinition, ProviderSpec};
