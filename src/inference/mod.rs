//! Inference Client — the language-model backend for the automated loop.
//!
//! This module handles all communication with the chat endpoint:
//! - Non-streaming chat completions with tool definitions
//! - Response parsing into text plus ordered tool calls
//! - Fallback chain management
//! - Model configuration loading from a YAML file
//!
//! The client speaks the OpenAI Chat Completions API, so switching between a
//! local runtime and a hosted endpoint is a config change.

pub mod client;
pub mod config;
pub mod errors;
pub mod response;
pub mod types;

// Re-exports for convenience
pub use client::InferenceClient;
pub use config::{load_models_config, ModelConfig, ModelsConfig};
pub use errors::InferenceError;
pub use types::{ChatMessage, ModelReply, Role, ToolCall};
