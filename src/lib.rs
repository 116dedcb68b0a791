//! 多后端统一的 Chat Completion 客户端
//!
//! Pick a backend once with [`build_backend`], wrap it in a [`CompletionClient`] and
//! issue blocking, streaming or batched completions. Transient failures are retried
//! with linear backoff; see [`retry`].

pub mod batch;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod provider;
pub mod retry;
pub mod stream;
pub mod types;

pub use client::{CompletionClient, CompletionParams, TextStream};
pub use config::{BackendConfig, ProviderConfigs, ProviderKind, ProviderSettings, Secret, build_backend};
pub use error::LLMError;
pub use provider::{ChatStream, DynProvider, LLMProvider};
pub use retry::{RetryPolicy, with_retry};
pub use types::*;
