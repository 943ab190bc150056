//! Session registry — sole owner of every provider session and process.
//!
//! Provides:
//! - Bulk startup (launch + handshake) across all configured providers
//! - Lookup of a provider's session by id
//! - Bulk shutdown that releases every session even when some fail to close

use std::time::Duration;

use futures::future::join_all;

use super::errors::McpError;
use super::lifecycle::{format_stderr_suffix, LaunchedProvider, Launcher, ProviderProcess};
use super::session::{ProviderSession, SessionState, DEFAULT_REQUEST_TIMEOUT};
use super::types::ProviderSpec;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Timeout for the initialize handshake.
///
/// Generous because interpreted providers (`uv run`, `npx`) may resolve and
/// install dependencies on first launch.
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(30);

// ─── Options ─────────────────────────────────────────────────────────────────

/// What to do when a provider fails to launch or handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartupPolicy {
    /// Record the provider as failed, log it, keep starting the rest.
    #[default]
    Degrade,
    /// Shut down everything started so far and return the first error.
    FailFast,
}

/// Timeouts and policy applied during startup.
#[derive(Debug, Clone, Copy)]
pub struct StartupOptions {
    pub policy: StartupPolicy,
    pub init_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for StartupOptions {
    fn default() -> Self {
        Self {
            policy: StartupPolicy::default(),
            init_timeout: DEFAULT_INIT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

// ─── Reports ─────────────────────────────────────────────────────────────────

/// A provider that never reached `Ready`.
#[derive(Debug)]
pub struct StartupFailure {
    pub provider_id: String,
    pub error: McpError,
}

/// Outcome of `shutdown_all`.
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Providers whose sessions were closed cleanly.
    pub closed: Vec<String>,
    /// Providers that reported an error while being released.
    pub failures: Vec<(String, McpError)>,
}

impl ShutdownReport {
    /// Whether every session was released without error.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

// ─── SessionRegistry ─────────────────────────────────────────────────────────

/// A session plus the process backing it.
struct ManagedProvider {
    session: ProviderSession,
    process: Option<ProviderProcess>,
}

/// Owns every provider session acquired during startup.
///
/// Providers are kept in configuration order. Call `shutdown_all` before
/// dropping; child processes are also spawned with `kill_on_drop`, so a
/// registry dropped during unwinding still reaps them.
pub struct SessionRegistry {
    providers: Vec<ManagedProvider>,
    failures: Vec<StartupFailure>,
    shut_down: bool,
}

impl SessionRegistry {
    /// Launch and initialize every provider in `specs`.
    ///
    /// Providers start concurrently. Under `StartupPolicy::Degrade` a failed
    /// provider is recorded and skipped; under `FailFast` the first failure
    /// shuts down every provider that did start and is returned.
    pub async fn start_all(
        specs: &[ProviderSpec],
        launcher: &dyn Launcher,
        options: StartupOptions,
    ) -> Result<Self, McpError> {
        let attempts = join_all(specs.iter().map(|spec| start_one(spec, launcher, options))).await;

        let mut registry = Self {
            providers: Vec::new(),
            failures: Vec::new(),
            shut_down: false,
        };

        for (spec, attempt) in specs.iter().zip(attempts) {
            match attempt {
                Ok(managed) => registry.providers.push(managed),
                Err(error) => {
                    tracing::warn!(server = %spec.id, error = %error, "provider failed to start");
                    registry.failures.push(StartupFailure {
                        provider_id: spec.id.clone(),
                        error,
                    });
                }
            }
        }

        if options.policy == StartupPolicy::FailFast && !registry.failures.is_empty() {
            let report = registry.shutdown_all().await;
            if !report.is_clean() {
                tracing::warn!(failures = report.failures.len(), "errors while unwinding failed startup");
            }
            let first = registry.failures.remove(0);
            return Err(first.error);
        }

        tracing::info!(
            ready = registry.providers.len(),
            failed = registry.failures.len(),
            "provider startup complete"
        );
        Ok(registry)
    }

    /// Look up a provider's session by id.
    ///
    /// Returns the session whatever its state; callers check `is_ready()`.
    pub fn get(&self, provider_id: &str) -> Option<&ProviderSession> {
        self.providers
            .iter()
            .map(|p| &p.session)
            .find(|s| s.provider_id() == provider_id)
    }

    /// Lifecycle state of a provider, including providers that failed to start.
    pub fn state_of(&self, provider_id: &str) -> Option<SessionState> {
        if let Some(session) = self.get(provider_id) {
            return Some(session.state());
        }
        self.failures
            .iter()
            .any(|f| f.provider_id == provider_id)
            .then_some(SessionState::Failed)
    }

    /// Sessions currently in `Ready`, in configuration order.
    pub fn ready_sessions(&self) -> impl Iterator<Item = &ProviderSession> {
        self.providers.iter().map(|p| &p.session).filter(|s| s.is_ready())
    }

    /// Ids of providers currently in `Ready`.
    pub fn ready_ids(&self) -> Vec<String> {
        self.ready_sessions().map(|s| s.provider_id().to_string()).collect()
    }

    /// Providers that failed to launch or handshake.
    pub fn startup_failures(&self) -> &[StartupFailure] {
        &self.failures
    }

    /// Check every process and close sessions whose process has exited.
    ///
    /// Returns the ids of sessions closed by this sweep.
    pub fn reap_dead(&mut self) -> Vec<String> {
        let mut reaped = Vec::new();
        for managed in &mut self.providers {
            let dead = managed.process.as_mut().is_some_and(|p| !p.is_alive());
            if dead && managed.session.is_ready() {
                tracing::warn!(server = %managed.session.provider_id(), "provider process exited");
                managed.session.mark_closed();
                reaped.push(managed.session.provider_id().to_string());
            }
        }
        reaped
    }

    /// Release every session and process.
    ///
    /// Closing one provider never prevents closing the next; errors are
    /// collected in the report. Calling this again is a no-op.
    pub async fn shutdown_all(&mut self) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        if self.shut_down {
            return report;
        }
        self.shut_down = true;

        for managed in &mut self.providers {
            let id = managed.session.provider_id().to_string();
            let was_ready = managed.session.is_ready();
            let mut error = None;

            if let Err(e) = managed.session.close().await {
                // A provider that already died cannot have its stdin closed.
                if was_ready {
                    error = Some(e);
                }
            }
            if let Some(process) = managed.process.as_mut() {
                if let Err(e) = process.shutdown().await {
                    error.get_or_insert(e);
                }
            }

            match error {
                Some(e) => {
                    tracing::warn!(server = %id, error = %e, "error while shutting down provider");
                    report.failures.push((id, e));
                }
                None => {
                    tracing::info!(server = %id, "provider shut down");
                    report.closed.push(id);
                }
            }
        }

        report
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        if !self.shut_down && !self.providers.is_empty() {
            tracing::warn!(
                providers = self.providers.len(),
                "session registry dropped without shutdown; killing provider processes"
            );
        }
    }
}

/// Launch one provider and run its handshake.
async fn start_one(
    spec: &ProviderSpec,
    launcher: &dyn Launcher,
    options: StartupOptions,
) -> Result<ManagedProvider, McpError> {
    let LaunchedProvider { transport, mut process } = launcher.launch(spec).await?;
    let session = ProviderSession::new(&spec.id, transport, options.request_timeout);

    match session.initialize(options.init_timeout).await {
        Ok(_) => Ok(ManagedProvider { session, process }),
        Err(e) => {
            let stderr = process.as_ref().map(|p| p.stderr_excerpt()).unwrap_or_default();
            if let Some(p) = process.as_mut() {
                p.kill().await;
            }
            Err(match e {
                McpError::HandshakeFailed { name, reason } => McpError::HandshakeFailed {
                    name,
                    reason: format!("{reason}{}", format_stderr_suffix(&stderr)),
                },
                other => other,
            })
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
