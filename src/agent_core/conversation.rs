//! Conversation history.
//!
//! Append-only: messages are pushed in turn order and never edited or
//! removed. The history is converted to chat-completion messages on every
//! model call.

use crate::inference::types::{ChatMessage, Role};
use crate::mcp_client::CallResult;

use super::types::{Message, MessageRole};

/// Ordered, append-only message history for one run of the loop.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    // ─── Message Operations ─────────────────────────────────────────────

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn push_user(&mut self, content: &str) {
        self.push(Message::user(content));
    }

    /// Record a tool result under the call id and qualified name.
    pub fn push_tool_result(&mut self, call_id: &str, tool_name: &str, result: &CallResult) {
        self.push(Message::tool(call_id, tool_name, result.display_text.clone(), result.is_error));
    }

    // ─── Chat Messages ──────────────────────────────────────────────────

    /// Build the request messages: the optional system prompt, then history.
    pub fn to_chat_messages(&self, system_prompt: Option<&str>) -> Vec<ChatMessage> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        if let Some(prompt) = system_prompt.filter(|p| !p.trim().is_empty()) {
            out.push(ChatMessage::text(Role::System, prompt));
        }

        for msg in &self.messages {
            let chat = match msg.role {
                MessageRole::User => ChatMessage::text(Role::User, msg.content.clone()),
                MessageRole::Assistant => ChatMessage {
                    role: Role::Assistant,
                    content: Some(msg.content.clone()),
                    tool_call_id: None,
                    tool_calls: (!msg.tool_calls.is_empty())
                        .then(|| msg.tool_calls.iter().map(|tc| tc.to_response()).collect()),
                },
                MessageRole::Tool => ChatMessage {
                    role: Role::Tool,
                    content: Some(msg.content.clone()),
                    tool_call_id: msg.tool_call_id.clone(),
                    tool_calls: None,
                },
            };
            out.push(chat);
        }

        out
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
