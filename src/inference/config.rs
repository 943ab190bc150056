//! Model configuration loading.
//!
//! Reads the models YAML file and resolves environment variables. The file
//! names the chat endpoints the automated loop may use and the order in
//! which to fall back between them.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use super::errors::InferenceError;

// ─── Public Types ────────────────────────────────────────────────────────────

/// A single model endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub display_name: String,
    /// OpenAI-compatible base URL, e.g. `http://localhost:11434/v1`.
    pub base_url: String,
    /// Model name sent in requests; defaults to the config key.
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Environment variable holding a bearer token, if the endpoint needs one.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}

/// Top-level models file.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    pub active_model: String,
    pub models: HashMap<String, ModelConfig>,
    /// Model keys to try, in order, when the current one is unavailable.
    #[serde(default)]
    pub fallback_chain: Vec<String>,
    /// Prepended to every conversation as a system message.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Load and parse the models configuration file.
///
/// Performs environment-variable interpolation on `${VAR_NAME}` and
/// `${VAR_NAME:-default}` before parsing.
pub fn load_models_config(path: &Path) -> Result<ModelsConfig, InferenceError> {
    let raw = std::fs::read_to_string(path).map_err(|e| InferenceError::ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;

    let interpolated = interpolate_env_vars(&raw);

    let config: ModelsConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| InferenceError::ConfigError {
            reason: format!("failed to parse {}: {e}", path.display()),
        })?;

    if config.models.is_empty() {
        return Err(InferenceError::ConfigError {
            reason: "no models configured".into(),
        });
    }

    Ok(config)
}

/// Resolve the active model, respecting the fallback chain.
///
/// Returns `(model_key, ModelConfig)` for the first model that exists in the
/// config. Connectivity is checked at request time by the client.
pub fn resolve_active_model(config: &ModelsConfig) -> Result<(String, ModelConfig), InferenceError> {
    if let Some(model) = config.models.get(&config.active_model) {
        return Ok((config.active_model.clone(), model.clone()));
    }

    for key in &config.fallback_chain {
        if let Some(model) = config.models.get(key) {
            return Ok((key.clone(), model.clone()));
        }
    }

    Err(InferenceError::ConfigError {
        reason: format!(
            "active model '{}' not found in config and no fallback available",
            config.active_model
        ),
    })
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((name, default)) => std::env::var(name).unwrap_or_else(|_| expand_tilde(default)),
        None => std::env::var(expr).unwrap_or_default(),
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
active_model: local
system_prompt: "You are a helpful assistant."
models:
  local:
    display_name: "Local Qwen"
    base_url: "http://localhost:11434/v1"
    model_name: "qwen2.5:7b"
  hosted:
    display_name: "Hosted"
    base_url: "https://api.example.com/v1"
    temperature: 0.2
    max_tokens: 4096
    api_key_env: EXAMPLE_API_KEY
fallback_chain: [local, hosted]
"#;

    #[test]
    fn test_load_models_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = load_models_config(file.path()).unwrap();
        assert_eq!(config.active_model, "local");
        assert_eq!(config.fallback_chain, vec!["local", "hosted"]);
        assert_eq!(config.system_prompt.as_deref(), Some("You are a helpful assistant."));

        let local = &config.models["local"];
        assert_eq!(local.max_tokens, 1024);
        assert!((local.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.models["hosted"].api_key_env.as_deref(), Some("EXAMPLE_API_KEY"));
    }

    #[test]
    fn test_load_rejects_empty_models() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"active_model: x\nmodels: {}\n").unwrap();
        assert!(matches!(
            load_models_config(file.path()),
            Err(InferenceError::ConfigError { .. })
        ));
    }

    #[test]
    fn test_interpolate_env_vars_with_default() {
        std::env::remove_var("__MCP_ORCH_TEST_UNSET__");
        let result = interpolate_env_vars("${__MCP_ORCH_TEST_UNSET__:-http://localhost:8080/v1}");
        assert_eq!(result, "http://localhost:8080/v1");
    }

    #[test]
    fn test_interpolate_env_vars_with_value() {
        std::env::set_var("__MCP_ORCH_TEST_URL__", "http://gpu-box:8000/v1");
        let result = interpolate_env_vars("base_url: ${__MCP_ORCH_TEST_URL__:-http://localhost/v1}");
        assert_eq!(result, "base_url: http://gpu-box:8000/v1");
        std::env::remove_var("__MCP_ORCH_TEST_URL__");
    }

    #[test]
    fn test_interpolate_no_vars() {
        let input = "plain text with $dollar but no braces";
        assert_eq!(interpolate_env_vars(input), input);
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde("/abs/path"), "/abs/path");
        if dirs::home_dir().is_some() {
            assert!(!expand_tilde("~/models").starts_with('~'));
        }
    }

    #[test]
    fn test_resolve_active_model_falls_back() {
        let mut config: ModelsConfig = serde_yaml::from_str(SAMPLE).unwrap();
        config.active_model = "missing".into();
        let (key, _) = resolve_active_model(&config).unwrap();
        assert_eq!(key, "local");

        config.fallback_chain.clear();
        assert!(resolve_active_model(&config).is_err());
    }
}
