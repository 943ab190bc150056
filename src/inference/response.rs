//! Chat completion response parsing.

use serde::Deserialize;
use uuid::Uuid;

use super::errors::InferenceError;
use super::types::{ModelReply, ToolCall};

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireToolCall {
    id: Option<String>,
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    /// Usually a JSON-encoded string; some runtimes send an object.
    #[serde(default)]
    arguments: serde_json::Value,
}

/// Parse a non-streaming `/chat/completions` body into a `ModelReply`.
///
/// Empty content is treated as absent. Calls without an id get a generated
/// `call_<uuid>` id so tool results can be matched to them.
pub fn parse_chat_response(body: &str) -> Result<ModelReply, InferenceError> {
    let resp: CompletionResponse =
        serde_json::from_str(body).map_err(|e| InferenceError::MalformedResponse {
            reason: format!("failed to parse chat completion: {e}"),
        })?;

    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or(InferenceError::MalformedResponse {
            reason: "empty choices array".into(),
        })?;

    let content = choice.message.content.filter(|c| !c.trim().is_empty());

    let mut tool_calls = Vec::new();
    for tc in choice.message.tool_calls.unwrap_or_default() {
        let id = tc
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("call_{}", Uuid::new_v4()));
        let mut call = ToolCall::new(id, tc.function.name, serde_json::json!({}));
        match parse_arguments(tc.function.arguments) {
            Ok(arguments) => call.arguments = arguments,
            // One bad call does not sink its siblings; it is answered with
            // an error result instead of being dispatched.
            Err(InferenceError::ToolCallParseError { raw_arguments, reason }) => {
                tracing::warn!(tool = %call.name, %reason, "tool call arguments are not valid JSON");
                call.malformed_arguments = Some(raw_arguments);
            }
            Err(e) => return Err(e),
        }
        tool_calls.push(call);
    }

    Ok(ModelReply {
        content,
        tool_calls,
        finish_reason: choice.finish_reason,
    })
}

fn parse_arguments(raw: serde_json::Value) -> Result<serde_json::Value, InferenceError> {
    match raw {
        serde_json::Value::String(s) if s.trim().is_empty() => Ok(serde_json::json!({})),
        serde_json::Value::String(s) => {
            serde_json::from_str(&s).map_err(|e| InferenceError::ToolCallParseError {
                reason: format!("invalid JSON: {e}"),
                raw_arguments: s,
            })
        }
        serde_json::Value::Null => Ok(serde_json::json!({})),
        other => Ok(other),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
