//! mcp-orchestrator: one interactive tool namespace over many MCP servers.
//!
//! Starts every configured stdio server, then runs either the manual picker
//! or the model-driven chat loop until the user quits. Every started server
//! is shut down on the way out, including after Ctrl-C.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};

use mcp_orchestrator::agent_core::{AgentError, ChatLoop, ManualPicker};
use mcp_orchestrator::inference::{load_models_config, InferenceClient};
use mcp_orchestrator::mcp_client::{
    load_servers_config, ClientOptions, McpClient, ProcessLauncher, StartupPolicy,
};

/// Connect to several MCP servers and use their tools as one catalog.
#[derive(Parser, Debug)]
#[command(name = "mcp-orchestrator")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Server configuration file (`mcpServers` JSON)
    #[arg(long, value_name = "FILE", default_value = "server.json")]
    config: PathBuf,

    /// Front-end to run once the servers are up
    #[arg(long, value_enum, default_value_t = Mode::Chat)]
    mode: Mode,

    /// Model configuration file (YAML), used by chat mode
    #[arg(long, value_name = "FILE", default_value = "models.yaml")]
    models: PathBuf,

    /// Abort startup if any server fails to start
    #[arg(long)]
    fail_fast: bool,

    /// Per-request timeout for tool calls, in seconds
    #[arg(long, value_name = "SECS")]
    call_timeout_secs: Option<u64>,

    /// Write logs to stderr instead of the log file
    #[arg(long)]
    log_stderr: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Pick tools by number and type their arguments
    Manual,
    /// Let the language model choose tools
    Chat,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    mcp_orchestrator::init_tracing(cli.log_stderr).context("failed to initialize logging")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create Tokio runtime")?;

    run_to_completion(runtime, run(cli))
}

/// Drive `future` to completion, then drop the runtime without waiting on
/// blocking tasks.
///
/// Tokio reads stdin on a blocking thread. After Ctrl-C that read is still
/// parked, and a plain runtime drop would wait for the user to press Enter.
fn run_to_completion<F: std::future::Future>(runtime: tokio::runtime::Runtime, future: F) -> F::Output {
    let output = runtime.block_on(future);
    runtime.shutdown_background();
    output
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Configuration errors abort before any server is spawned.
    let servers = load_servers_config(&cli.config)?;
    let model = match cli.mode {
        Mode::Chat => {
            let models = load_models_config(&cli.models)?;
            Some(InferenceClient::from_config(models)?)
        }
        Mode::Manual => None,
    };

    let mut options = ClientOptions {
        separator: servers.separator.clone(),
        ..ClientOptions::default()
    };
    if cli.fail_fast {
        options = options.with_policy(StartupPolicy::FailFast);
    }
    if let Some(secs) = cli.call_timeout_secs {
        options = options.with_request_timeout(Duration::from_secs(secs));
    }

    let launcher = ProcessLauncher::new(None);
    let mut client = McpClient::start(&servers.specs, &launcher, options).await?;

    for id in client.registry().ready_ids() {
        println!("Successfully connected to server: {id}");
    }
    for failure in client.registry().startup_failures() {
        eprintln!("Failed to connect to server {}: {}", failure.provider_id, failure.error);
    }
    tracing::info!(
        ready = client.registry().ready_ids().len(),
        tools = client.catalog().len(),
        "orchestrator ready"
    );

    let outcome = tokio::select! {
        result = run_front_end(&client, model) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
            println!();
            Ok(())
        }
    };

    println!("Closing all sessions...");
    let report = client.shutdown().await;
    for (id, error) in &report.failures {
        eprintln!("Error closing {id}: {error}");
    }
    println!("All sessions closed.");

    outcome.map_err(Into::into)
}

/// Run the manual picker, or the chat loop when a model is configured.
async fn run_front_end(client: &McpClient, model: Option<InferenceClient>) -> Result<(), AgentError> {
    let mut input = tokio::io::BufReader::new(tokio::io::stdin());
    let mut out = std::io::stdout();

    match model {
        Some(model) => {
            tracing::info!(model = %model.current_model_name(), "starting chat loop");
            let system_prompt = model.system_prompt().map(str::to_string);
            let mut chat = ChatLoop::new(client, model, system_prompt);
            chat.run(&mut input, &mut out).await
        }
        None => ManualPicker::new(client).run(&mut input, &mut out).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parked_blocking_read_does_not_delay_exit() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        // A receiver whose sender outlives the runtime stands in for stdin.
        let (keep_open, never_ready) = std::sync::mpsc::channel::<()>();

        let started = std::time::Instant::now();
        let winner = run_to_completion(runtime, async move {
            let read = tokio::task::spawn_blocking(move || never_ready.recv());
            tokio::select! {
                _ = read => "read",
                _ = tokio::time::sleep(Duration::from_millis(20)) => "interrupt",
            }
        });

        assert_eq!(winner, "interrupt");
        assert!(started.elapsed() < Duration::from_secs(5));
        drop(keep_open);
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["mcp-orchestrator"]);
        assert_eq!(cli.config, PathBuf::from("server.json"));
        assert_eq!(cli.mode, Mode::Chat);
        assert!(!cli.fail_fast);
        assert!(cli.call_timeout_secs.is_none());
    }

    #[test]
    fn test_manual_mode_flags() {
        let cli = Cli::parse_from([
            "mcp-orchestrator",
            "--mode",
            "manual",
            "--fail-fast",
            "--call-timeout-secs",
            "5",
        ]);
        assert_eq!(cli.mode, Mode::Manual);
        assert!(cli.fail_fast);
        assert_eq!(cli.call_timeout_secs, Some(5));
    }
}
