//! Provider configuration loading.
//!
//! Reads the `mcpServers` JSON file, validates it and turns it into launch
//! specs. Any problem here is a `Config` error and aborts startup; unlike
//! provider connectivity, configuration is not partial-tolerant.

use std::path::Path;

use super::errors::McpError;
use super::types::{McpServersConfig, ProviderSpec};

/// Validated provider configuration.
#[derive(Debug, Clone)]
pub struct LoadedServers {
    /// One spec per provider, ordered by provider id.
    pub specs: Vec<ProviderSpec>,
    pub separator: String,
}

/// Load and validate a provider configuration file.
///
/// Relative `cwd` entries are resolved against the file's directory.
pub fn load_servers_config(path: &Path) -> Result<LoadedServers, McpError> {
    let raw = std::fs::read_to_string(path).map_err(|e| McpError::Config {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;

    let config: McpServersConfig = serde_json::from_str(&raw).map_err(|e| McpError::Config {
        reason: format!("failed to parse {}: {e}", path.display()),
    })?;

    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let loaded = validate(config, base_dir)?;
    tracing::info!(
        path = %path.display(),
        providers = loaded.specs.len(),
        "loaded provider configuration"
    );
    Ok(loaded)
}

/// Check a parsed configuration and build launch specs from it.
pub fn validate(config: McpServersConfig, base_dir: &Path) -> Result<LoadedServers, McpError> {
    let separator = config.separator;
    if separator.is_empty() {
        return Err(config_error("separator must not be empty"));
    }
    if config.servers.is_empty() {
        return Err(config_error("no servers configured under 'mcpServers'"));
    }

    let mut specs = Vec::with_capacity(config.servers.len());
    for (id, server) in &config.servers {
        if id.trim().is_empty() {
            return Err(config_error("server id must not be empty"));
        }
        if id.chars().any(char::is_whitespace) {
            return Err(config_error(&format!("server id '{id}' must not contain whitespace")));
        }
        if id.contains(separator.as_str()) {
            return Err(config_error(&format!(
                "server id '{id}' must not contain the separator '{separator}'"
            )));
        }
        if server.command.trim().is_empty() {
            return Err(config_error(&format!("server '{id}' has an empty command")));
        }

        let mut spec = ProviderSpec::from_config(id, server);
        if let Some(cwd) = &spec.cwd {
            if !Path::new(cwd).is_absolute() {
                spec.cwd = Some(base_dir.join(cwd).to_string_lossy().into_owned());
            }
        }
        specs.push(spec);
    }

    Ok(LoadedServers { specs, separator })
}

fn config_error(reason: &str) -> McpError {
    McpError::Config {
        reason: reason.to_string(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
