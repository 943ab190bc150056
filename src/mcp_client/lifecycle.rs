//! Provider process lifecycle management.
//!
//! Handles spawning and shutting down MCP provider child processes. Each
//! provider runs as a separate OS process communicating via JSON-RPC over
//! stdio. Spawning sits behind the `Launcher` trait so the session registry
//! can be driven by in-memory providers as well.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;

use super::errors::McpError;
use super::transport::StdioTransport;
use super::types::ProviderSpec;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Timeout for graceful exit after stdin is closed, before force-killing.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Number of trailing stderr lines kept for diagnostics.
const STDERR_TAIL_LINES: usize = 20;

/// Cap on the stderr excerpt appended to error messages.
const STDERR_EXCERPT_BYTES: usize = 2000;

// ─── Launcher ────────────────────────────────────────────────────────────────

/// A freshly launched provider: its transport plus the process handle, if
/// the provider is an OS process.
pub struct LaunchedProvider {
    pub transport: StdioTransport,
    pub process: Option<ProviderProcess>,
}

/// Starts providers. The session registry is the only caller.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Launch the provider described by `spec` and wire up its transport.
    async fn launch(&self, spec: &ProviderSpec) -> Result<LaunchedProvider, McpError>;
}

/// Launches providers as child processes with piped stdio.
#[derive(Debug, Clone, Default)]
pub struct ProcessLauncher {
    /// Working directory used when a spec does not set its own.
    working_dir: Option<PathBuf>,
}

impl ProcessLauncher {
    /// Create a launcher. `working_dir` is the fallback cwd for providers.
    pub fn new(working_dir: Option<PathBuf>) -> Self {
        Self { working_dir }
    }
}

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn launch(&self, spec: &ProviderSpec) -> Result<LaunchedProvider, McpError> {
        let name = spec.id.as_str();
        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args);

        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        // Per-provider cwd overrides the launcher-wide working directory
        let effective_dir = spec.cwd.as_ref().map(PathBuf::from).or_else(|| self.working_dir.clone());
        if let Some(dir) = effective_dir {
            cmd.current_dir(dir);
        }

        // Windows: prevent console window from appearing for child processes
        #[cfg(target_os = "windows")]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        cmd.stdin(std::process::Stdio::piped());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| McpError::SpawnFailed {
            name: name.to_string(),
            reason: format!("{}: {e}", spec.command),
        })?;

        let stdin = child.stdin.take().ok_or(McpError::SpawnFailed {
            name: name.to_string(),
            reason: "failed to capture stdin".into(),
        })?;

        let stdout = child.stdout.take().ok_or(McpError::SpawnFailed {
            name: name.to_string(),
            reason: "failed to capture stdout".into(),
        })?;

        let stderr_tail = Arc::new(Mutex::new(VecDeque::new()));
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| spawn_stderr_drain(name, stderr, Arc::clone(&stderr_tail)));

        tracing::info!(
            server = name,
            command = %spec.command,
            pid = child.id().unwrap_or_default(),
            "spawned provider process"
        );

        Ok(LaunchedProvider {
            transport: StdioTransport::new(name, stdout, stdin),
            process: Some(ProviderProcess {
                name: name.to_string(),
                child,
                stderr_tail,
                stderr_task,
            }),
        })
    }
}

// ─── ProviderProcess ─────────────────────────────────────────────────────────

/// A running provider process.
pub struct ProviderProcess {
    name: String,
    child: Child,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    stderr_task: Option<JoinHandle<()>>,
}

impl ProviderProcess {
    /// Check if the process is still running.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// The last lines the process wrote to stderr, joined and truncated.
    pub fn stderr_excerpt(&self) -> String {
        let tail = self.stderr_tail.lock().unwrap_or_else(|e| e.into_inner());
        let mut joined = tail.iter().cloned().collect::<Vec<_>>().join("\n");
        if joined.len() > STDERR_EXCERPT_BYTES {
            let cut = floor_char_boundary(&joined, STDERR_EXCERPT_BYTES);
            joined.truncate(cut);
            joined.push_str("...(truncated)");
        }
        joined
    }

    /// Wait for the process to exit, killing it after `SHUTDOWN_TIMEOUT`.
    ///
    /// The caller is expected to have closed the process's stdin already.
    pub async fn shutdown(&mut self) -> Result<(), McpError> {
        self.shutdown_within(SHUTDOWN_TIMEOUT).await
    }

    /// `shutdown` with an explicit grace period.
    pub async fn shutdown_within(&mut self, grace: Duration) -> Result<(), McpError> {
        let outcome = match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(server = %self.name, %status, "provider exited");
                Ok(())
            }
            _ => {
                tracing::warn!(server = %self.name, "provider did not exit in time, killing");
                self.child.kill().await.map_err(|e| McpError::ProviderUnavailable {
                    name: self.name.clone(),
                    reason: format!("failed to kill process: {e}"),
                })
            }
        };

        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        outcome
    }

    /// Kill the process immediately. Used when a handshake fails.
    pub async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::debug!(server = %self.name, error = %e, "kill after failed handshake");
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

/// Forward provider stderr into the log and keep the last few lines.
fn spawn_stderr_drain(
    name: &str,
    stderr: ChildStderr,
    tail: Arc<Mutex<VecDeque<String>>>,
) -> JoinHandle<()> {
    let name = name.to_string();
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(server = %name, "stderr: {line}");
            let mut tail = tail.lock().unwrap_or_else(|e| e.into_inner());
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
    })
}

/// Format a stderr suffix for error messages (empty string if no stderr).
pub fn format_stderr_suffix(stderr: &str) -> String {
    if stderr.trim().is_empty() {
        String::new()
    } else {
        format!(" | stderr: {}", stderr.trim())
    }
}

/// Largest index `<= max` that falls on a char boundary of `s`.
pub(crate) fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

// ─── Tests ───────────────────────────────────────────────────────────────────
