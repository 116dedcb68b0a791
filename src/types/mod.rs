//! Shared data structures modeling chat-completion requests and responses.
//!
//! Every supported backend speaks an OpenAI-compatible dialect, so these types stay
//! close to that wire shape while hiding vendor-specific envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Chat role string such as `system`, `user`, or `assistant`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(pub String);

impl Role {
    pub fn system() -> Self {
        Self("system".to_string())
    }

    pub fn user() -> Self {
        Self("user".to_string())
    }

    pub fn assistant() -> Self {
        Self("assistant".to_string())
    }
}

/// A single `{role, content}` entry of a conversation.
///
/// # Examples
///
/// ```
/// # use agentkit::types::{Message, Role};
/// let msg = Message::user("Summarize this paragraph");
/// assert_eq!(msg.role, Role::user());
/// assert_eq!(msg.content, "Summarize this paragraph");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::system(), content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::user(), content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::assistant(), content)
    }
}

/// Sampling and routing options attached to a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    /// Model or deployment name. Falls back to the provider default when absent.
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// A provider-agnostic completion request.
///
/// The stream flag is not part of the request; it is chosen by calling
/// [`crate::provider::LLMProvider::chat`] or
/// [`crate::provider::LLMProvider::stream_chat`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub options: ChatOptions,
}

impl ChatRequest {
    /// Wraps a bare prompt into a single user message.
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(prompt)],
            options: ChatOptions::default(),
        }
    }
}

/// Why the backend stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    Other(String),
}

/// Token accounting reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

/// Where a response came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub provider: String,
    pub request_id: Option<String>,
    pub endpoint: Option<String>,
    /// Untouched payload for debugging.
    pub raw: Option<Value>,
}

/// A fully received completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Assistant text of the first choice; empty when the backend returned none.
    pub text: String,
    pub finish_reason: Option<FinishReason>,
    pub usage: Option<TokenUsage>,
    pub model: Option<String>,
    pub provider: ProviderMetadata,
}

/// One incremental update of a streamed completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatChunk {
    /// Text fragment carried by this chunk, if any.
    pub delta: Option<String>,
    pub finish_reason: Option<FinishReason>,
    pub usage: Option<TokenUsage>,
    /// Set on the final `[DONE]` chunk.
    pub is_terminal: bool,
    pub provider: ProviderMetadata,
}

/// Outcome of a single item in a batch dispatch.
///
/// Results are position-correlated with the prompts that produced them; a failed item
/// keeps its slot as [`CompletionResult::Failure`] instead of being dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompletionResult {
    Success { text: String },
    Failure { reason: String },
}

impl CompletionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, CompletionResult::Success { .. })
    }

    /// Returns the text of a successful item, discarding the failure reason.
    pub fn into_text(self) -> Option<String> {
        match self {
            CompletionResult::Success { text } => Some(text),
            CompletionResult::Failure { .. } => None,
        }
    }
}
