//! Agent Core: the two interactive front-ends over the unified catalog.
//!
//! Submodules:
//! - `picker`: Manual mode; the user picks a tool and types its arguments
//! - `chat_loop`: Automated mode; the model routes queries to tools
//! - `conversation`: Append-only message history
//! - `model`: The `ChatModel` seam over the inference client
//! - `input`: Prompting and exit-command handling
//! - `types`: Shared message types
//! - `errors`: Agent-level error types

pub mod chat_loop;
pub mod conversation;
pub mod errors;
pub mod input;
pub mod model;
pub mod picker;
pub mod types;

// Re-exports for convenience
pub use chat_loop::{ChatLoop, LoopState};
pub use conversation::Conversation;
pub use errors::AgentError;
pub use model::ChatModel;
pub use picker::ManualPicker;
pub use types::{Message, MessageRole};
