//! OpenAI-compatible Chat Completions backend.
//!
//! OpenAI, DeepSeek, OpenRouter, and local servers such as vLLM share one wire format.
//! Azure OpenAI differs only in URL layout and auth header, captured by
//! [`EndpointStyle`].

mod error;
mod provider;
mod request;
mod response;
mod stream;
mod types;

pub use provider::{EndpointStyle, OpenAiChatProvider};
