pub mod client;
pub mod models;

pub use client::{pick_assistant_text, ChatBackend, ChatClient, LlmError};
pub use models::{ChatCompletionsResponse, ChatMessage, ChatRequest, Role};
