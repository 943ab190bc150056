pub mod agent_core;
pub mod inference;
pub mod mcp_client;

use std::io::Write;
use std::path::{Path, PathBuf};

/// Return the platform-standard data directory for the orchestrator.
///
/// - macOS: `~/Library/Application Support/mcp-orchestrator/`
/// - Windows: `{FOLDERID_RoamingAppData}\mcp-orchestrator\`
/// - Linux: `$XDG_DATA_HOME/mcp-orchestrator/` (fallback `~/.local/share/...`)
///
/// Falls back to `~/.mcp-orchestrator/` only if none of the above resolve.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("mcp-orchestrator");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mcp-orchestrator")
}

/// Initialize the tracing subscriber.
///
/// Stdout belongs to the interactive prompt, so logs go either to stderr or
/// to `<data_dir>/orchestrator.log`. Each run starts a fresh file and the
/// previous three runs are kept as `orchestrator.log.1` to `.3`.
///
/// The filter comes from `RUST_LOG` when set.
pub fn init_tracing(log_to_stderr: bool) -> std::io::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("mcp_orchestrator=info,warn"));

    if log_to_stderr {
        fmt::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .init();
        tracing::info!(
            version = env!("CARGO_PKG_VERSION"),
            pid = std::process::id(),
            "=== mcp-orchestrator starting ==="
        );
        return Ok(());
    }

    let log_dir = data_dir();
    std::fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join("orchestrator.log");

    rotate_log_file(&log_path, 3);

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    fmt::fmt()
        .with_env_filter(filter)
        .with_writer(SessionLog::new(log_file))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_file = %log_path.display(),
        pid = std::process::id(),
        "=== mcp-orchestrator starting ==="
    );
    Ok(())
}

/// Path of the `n`th previous log; generation 0 is the live file.
fn log_generation(base: &Path, n: u32) -> PathBuf {
    if n == 0 {
        return base.to_path_buf();
    }
    let mut name = base.as_os_str().to_os_string();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}

/// Shift each session's log one generation back and drop generation `keep`.
///
/// Gaps in the chain stay gaps. Failures are ignored: a log that cannot be
/// moved is appended to instead.
fn rotate_log_file(base: &Path, keep: u32) {
    let _ = std::fs::remove_file(log_generation(base, keep));
    for n in (1..=keep).rev() {
        let older = log_generation(base, n - 1);
        if older.exists() {
            let _ = std::fs::rename(&older, log_generation(base, n));
        }
    }
}

/// Log file handle shared by every event, flushed per write so the log is
/// complete even when the orchestrator is killed mid-session.
#[derive(Clone)]
struct SessionLog {
    file: std::sync::Arc<std::sync::Mutex<std::fs::File>>,
}

impl SessionLog {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: std::sync::Arc::new(std::sync::Mutex::new(file)),
        }
    }

    fn with_file<T>(&self, f: impl FnOnce(&mut std::fs::File) -> std::io::Result<T>) -> std::io::Result<T> {
        // A panic while logging must not silence the rest of the session.
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut file)
    }
}

impl Write for SessionLog {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.with_file(|file| {
            let n = file.write(buf)?;
            file.flush()?;
            Ok(n)
        })
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.with_file(|file| file.flush())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SessionLog {
    type Writer = SessionLog;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
