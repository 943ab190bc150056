//! Automated conversation loop.
//!
//! One state is active at a time:
//!
//! ```text
//! AwaitInput → Routing → Invoking → Finalizing → AwaitInput
//!     └────────→ Terminated
//! ```
//!
//! A reply with no tool calls goes straight from `Routing` to `Finalizing`,
//! which then only prints it. Tool calls in one reply run sequentially in
//! the order the model listed them, and every result is in history before
//! the model is asked for its summary. A call whose arguments were not
//! valid JSON is answered with an error result and never dispatched.

use std::io::Write;

use tokio::io::AsyncBufRead;

use crate::inference::types::{ModelReply, ToolCall};
use crate::mcp_client::{CallResult, McpClient, McpError};

use super::conversation::Conversation;
use super::errors::AgentError;
use super::input::{is_exit_command, prompt_line};
use super::model::ChatModel;
use super::types::{Message, MessageRole};

const PROMPT: &str = "\nQuery: ";

/// Where the loop is in the current turn.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopState {
    AwaitInput,
    Routing,
    /// Calls requested by the last assistant message, in order.
    Invoking(Vec<ToolCall>),
    /// `called_tools` is whether the model must be asked for a summary.
    Finalizing { called_tools: bool },
    Terminated,
}

/// Drives an LLM-directed conversation over the catalog's tools.
pub struct ChatLoop<'a, M> {
    client: &'a McpClient,
    model: M,
    system_prompt: Option<String>,
    conversation: Conversation,
    state: LoopState,
}

impl<'a, M: ChatModel> ChatLoop<'a, M> {
    pub fn new(client: &'a McpClient, model: M, system_prompt: Option<String>) -> Self {
        Self {
            client,
            model,
            system_prompt,
            conversation: Conversation::new(),
            state: LoopState::AwaitInput,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    /// Run until the user exits or input ends.
    ///
    /// Tool and model failures are reported and the loop continues; only
    /// terminal I/O errors end it early.
    pub async fn run<R, W>(&mut self, input: &mut R, out: &mut W) -> Result<(), AgentError>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        loop {
            let state = std::mem::replace(&mut self.state, LoopState::Terminated);
            self.state = match state {
                LoopState::AwaitInput => self.await_input(input, out).await?,
                LoopState::Routing => self.route(out).await?,
                LoopState::Invoking(calls) => self.invoke(calls, out).await?,
                LoopState::Finalizing { called_tools } => self.finalize(called_tools, out).await?,
                LoopState::Terminated => return Ok(()),
            };
        }
    }

    async fn await_input<R, W>(&mut self, input: &mut R, out: &mut W) -> Result<LoopState, AgentError>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let Some(line) = prompt_line(input, out, PROMPT).await? else {
            return Ok(LoopState::Terminated);
        };
        if is_exit_command(&line) {
            return Ok(LoopState::Terminated);
        }
        let line = line.trim();
        if line.is_empty() {
            return Ok(LoopState::AwaitInput);
        }

        self.conversation.push_user(line);
        Ok(LoopState::Routing)
    }

    async fn route<W: Write>(&mut self, out: &mut W) -> Result<LoopState, AgentError> {
        // Tools of providers that died earlier in the session are left out.
        let tools = self.client.tool_definitions();
        let offered = (!tools.is_empty()).then_some(tools.as_slice());

        let Some(reply) = self.ask_model(offered, out).await? else {
            return Ok(LoopState::AwaitInput);
        };

        let ModelReply { content, tool_calls, .. } = reply;
        let content = content.unwrap_or_default();
        tracing::info!(tool_calls = tool_calls.len(), "model replied");

        if tool_calls.is_empty() {
            self.conversation.push(Message::assistant(content, Vec::new()));
            return Ok(LoopState::Finalizing { called_tools: false });
        }

        if !content.trim().is_empty() {
            writeln!(out, "\n{content}")?;
        }
        self.conversation.push(Message::assistant(content, tool_calls.clone()));
        Ok(LoopState::Invoking(tool_calls))
    }

    async fn invoke<W: Write>(&mut self, calls: Vec<ToolCall>, out: &mut W) -> Result<LoopState, AgentError> {
        for call in calls {
            let result = match call.malformed_arguments.as_deref() {
                Some(raw) => {
                    writeln!(out, "[Calling tool {} with args {raw}]", call.name)?;
                    let e = McpError::InvalidArguments {
                        tool: call.name.clone(),
                        reason: format!("arguments are not valid JSON: {raw}"),
                    };
                    CallResult::error(format!("Error calling tool {}: {e}", call.name))
                }
                None => {
                    writeln!(out, "[Calling tool {} with args {}]", call.name, call.arguments)?;
                    self.client.invoke(&call.name, call.arguments.clone()).await
                }
            };
            if result.is_error {
                writeln!(out, "[{} failed: {}]", call.name, result.display_text)?;
            }
            self.conversation.push_tool_result(&call.id, &call.name, &result);
        }
        Ok(LoopState::Finalizing { called_tools: true })
    }

    async fn finalize<W: Write>(&mut self, called_tools: bool, out: &mut W) -> Result<LoopState, AgentError> {
        if !called_tools {
            let text = self
                .conversation
                .messages()
                .last()
                .filter(|m| m.role == MessageRole::Assistant)
                .map(|m| m.content.clone())
                .unwrap_or_default();
            writeln!(out, "\n{text}")?;
            return Ok(LoopState::AwaitInput);
        }

        let Some(reply) = self.ask_model(None, out).await? else {
            return Ok(LoopState::AwaitInput);
        };
        if !reply.tool_calls.is_empty() {
            tracing::debug!(ignored = reply.tool_calls.len(), "tool calls in summary reply ignored");
        }
        let text = reply.content.unwrap_or_default();
        writeln!(out, "\n{text}")?;
        self.conversation.push(Message::assistant(text, Vec::new()));
        Ok(LoopState::AwaitInput)
    }

    /// Call the model with the full history. A model failure is printed and
    /// yields `None`; the turn is abandoned.
    async fn ask_model<W: Write>(
        &mut self,
        tools: Option<&[serde_json::Value]>,
        out: &mut W,
    ) -> Result<Option<ModelReply>, AgentError> {
        let messages = self.conversation.to_chat_messages(self.system_prompt.as_deref());
        match self.model.complete(&messages, tools).await {
            Ok(reply) => Ok(Some(reply)),
            Err(e) => {
                tracing::warn!(error = %e, "model request failed");
                writeln!(out, "\nError: {e}")?;
                Ok(None)
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
