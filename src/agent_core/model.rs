//! The language-model seam used by the automated loop.

use async_trait::async_trait;

use crate::inference::types::{ChatMessage, ModelReply};
use crate::inference::{InferenceClient, InferenceError};

/// Produces the next assistant message from history and tool definitions.
///
/// `tools` is `None` when the model must answer in text only.
#[async_trait]
pub trait ChatModel: Send {
    async fn complete(
        &mut self,
        messages: &[ChatMessage],
        tools: Option<&[serde_json::Value]>,
    ) -> Result<ModelReply, InferenceError>;
}

#[async_trait]
impl ChatModel for InferenceClient {
    async fn complete(
        &mut self,
        messages: &[ChatMessage],
        tools: Option<&[serde_json::Value]>,
    ) -> Result<ModelReply, InferenceError> {
        self.chat_completion(messages, tools).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Replays canned replies and records what it was asked.
    #[derive(Clone, Default)]
    pub struct ScriptedModel {
        replies: Arc<Mutex<VecDeque<Result<ModelReply, InferenceError>>>>,
        /// `(message count, tools offered)` per call.
        requests: Arc<Mutex<Vec<(usize, bool)>>>,
        /// Function names offered per call; empty when tools were withheld.
        offered: Arc<Mutex<Vec<Vec<String>>>>,
    }

    impl ScriptedModel {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn then(self, reply: ModelReply) -> Self {
            self.replies.lock().unwrap().push_back(Ok(reply));
            self
        }

        pub fn then_error(self, error: InferenceError) -> Self {
            self.replies.lock().unwrap().push_back(Err(error));
            self
        }

        pub fn requests(&self) -> Vec<(usize, bool)> {
            self.requests.lock().unwrap().clone()
        }

        pub fn offered_tools(&self) -> Vec<Vec<String>> {
            self.offered.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(
            &mut self,
            messages: &[ChatMessage],
            tools: Option<&[serde_json::Value]>,
        ) -> Result<ModelReply, InferenceError> {
            self.requests.lock().unwrap().push((messages.len(), tools.is_some()));
            let names: Vec<String> = tools
                .unwrap_or_default()
                .iter()
                .filter_map(|t| t["function"]["name"].as_str())
                .map(str::to_string)
                .collect();
            self.offered.lock().unwrap().push(names);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ModelReply::text("(no more scripted replies)")))
        }
    }
}
