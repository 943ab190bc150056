//! OpenAI-compatible inference client.
//!
//! Sends non-streaming chat completion requests and walks the fallback chain
//! when the current model is unavailable.

use std::time::Duration;

use reqwest::Client as HttpClient;

use super::config::{resolve_active_model, ModelConfig, ModelsConfig};
use super::errors::InferenceError;
use super::response::parse_chat_response;
use super::types::{ChatCompletionRequest, ChatMessage, ModelReply};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Total request timeout. Local models with a long history can take a while
/// before the first token.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// ─── InferenceClient ─────────────────────────────────────────────────────────

/// Client for an OpenAI-compatible chat endpoint.
pub struct InferenceClient {
    http: HttpClient,
    config: ModelsConfig,
    current_model_key: String,
    current_model: ModelConfig,
    /// Models that have already been tried and failed.
    exhausted_models: Vec<String>,
}

impl InferenceClient {
    /// Create a client for the active model. Does not check connectivity.
    pub fn from_config(config: ModelsConfig) -> Result<Self, InferenceError> {
        let (key, model) = resolve_active_model(&config)?;

        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: model.base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            config,
            current_model_key: key,
            current_model: model,
            exhausted_models: Vec::new(),
        })
    }

    /// The display name of the currently selected model.
    pub fn current_model_name(&self) -> &str {
        &self.current_model.display_name
    }

    /// System prompt from the models file, if any.
    pub fn system_prompt(&self) -> Option<&str> {
        self.config.system_prompt.as_deref()
    }

    // ─── Chat Completion ─────────────────────────────────────────────────

    /// Request the model's next message.
    ///
    /// `tools` are OpenAI function definitions; `None` forbids tool calls for
    /// this request. Retriable failures move on to the next model in the
    /// fallback chain.
    pub async fn chat_completion(
        &mut self,
        messages: &[ChatMessage],
        tools: Option<&[serde_json::Value]>,
    ) -> Result<ModelReply, InferenceError> {
        loop {
            match self.try_request(messages, tools).await {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_retriable() => {
                    tracing::warn!(model = %self.current_model_key, error = %e, "model unavailable");
                    self.try_next_fallback()?;
                    tracing::info!(model = %self.current_model_key, "falling back to next model");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Attempt a single request to the current model.
    async fn try_request(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[serde_json::Value]>,
    ) -> Result<ModelReply, InferenceError> {
        let url = format!("{}/chat/completions", self.current_model.base_url.trim_end_matches('/'));
        let tools = tools.filter(|t| !t.is_empty()).map(<[_]>::to_vec);

        let body = ChatCompletionRequest {
            model: self
                .current_model
                .model_name
                .clone()
                .unwrap_or_else(|| self.current_model_key.clone()),
            messages: messages.to_vec(),
            tool_choice: tools.as_ref().map(|_| "auto".to_string()),
            tools,
            temperature: self.current_model.temperature,
            max_tokens: self.current_model.max_tokens,
            stream: false,
        };

        tracing::info!(
            url = %url,
            model = %body.model,
            message_count = body.messages.len(),
            tool_count = body.tools.as_ref().map(|t| t.len()).unwrap_or(0),
            "chat completion request"
        );

        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = self.api_key() {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout {
                    duration_secs: REQUEST_TIMEOUT.as_secs(),
                }
            } else {
                InferenceError::ConnectionFailed {
                    endpoint: url.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let body_text = response.text().await.map_err(|e| InferenceError::MalformedResponse {
            reason: format!("failed to read response body: {e}"),
        })?;

        parse_chat_response(&body_text)
    }

    fn api_key(&self) -> Option<String> {
        let var = self.current_model.api_key_env.as_deref()?;
        std::env::var(var).ok().filter(|k| !k.is_empty())
    }

    // ─── Fallback Chain ──────────────────────────────────────────────────

    /// Move to the next untried model in the fallback chain.
    pub fn try_next_fallback(&mut self) -> Result<(), InferenceError> {
        self.exhausted_models.push(self.current_model_key.clone());

        for key in &self.config.fallback_chain {
            if self.exhausted_models.contains(key) {
                continue;
            }
            if let Some(model) = self.config.models.get(key) {
                self.current_model_key = key.clone();
                self.current_model = model.clone();
                return Ok(());
            }
        }

        Err(InferenceError::AllModelsUnavailable {
            attempted: self.exhausted_models.clone(),
        })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
