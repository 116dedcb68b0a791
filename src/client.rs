use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_util::StreamExt;
use tracing::{debug, info};

use crate::error::LLMError;
use crate::provider::{ChatStream, DynProvider};
use crate::retry::{RetryPolicy, with_retry};
use crate::types::{ChatOptions, ChatRequest, Message};

/// Default completion budget per request.
pub const DEFAULT_MAX_TOKENS: u32 = 512;
/// Default nucleus sampling mass.
pub const DEFAULT_TOP_P: f32 = 0.9;
/// Default sampling temperature of a new client.
pub const DEFAULT_TEMPERATURE: f32 = 1.0;

/// Per-call generation parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionParams {
    pub max_tokens: u32,
    pub top_p: f32,
    /// Receive the answer incrementally; the fragments are joined before returning.
    pub stream: bool,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            top_p: DEFAULT_TOP_P,
            stream: false,
        }
    }
}

impl CompletionParams {
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = top_p;
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

/// Chat-completion client bound to one backend and model.
///
/// Every request goes through [`with_retry`]. The client is cheap to clone: clones
/// share the same backend handle, which is how batch tasks get their copy.
#[derive(Clone)]
pub struct CompletionClient {
    backend: DynProvider,
    model: String,
    temperature: f32,
    retry: RetryPolicy,
}

impl CompletionClient {
    pub fn new(backend: DynProvider, model: impl Into<String>) -> Self {
        let model = model.into();
        info!("using model {} from provider {}", model, backend.name());
        Self {
            backend,
            model,
            temperature: DEFAULT_TEMPERATURE,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider_name(&self) -> &'static str {
        self.backend.name()
    }

    fn build_request(
        &self,
        messages: Vec<Message>,
        max_tokens: u32,
        top_p: Option<f32>,
    ) -> ChatRequest {
        ChatRequest {
            messages,
            options: ChatOptions {
                model: Some(self.model.clone()),
                temperature: Some(self.temperature),
                top_p,
                max_tokens: Some(max_tokens),
            },
        }
    }

    /// Sends `prompt` as a single user message and returns the assistant's text.
    ///
    /// # Errors
    ///
    /// Terminal errors surface at once; transient ones after the retry policy is
    /// exhausted.
    pub async fn complete(
        &self,
        prompt: &str,
        params: CompletionParams,
    ) -> Result<String, LLMError> {
        self.complete_messages(vec![Message::user(prompt)], params)
            .await
    }

    /// Sends a full conversation and returns the assistant's text.
    ///
    /// # Errors
    ///
    /// See [`CompletionClient::complete`].
    pub async fn complete_messages(
        &self,
        messages: Vec<Message>,
        params: CompletionParams,
    ) -> Result<String, LLMError> {
        let request = self.build_request(messages, params.max_tokens, Some(params.top_p));
        with_retry(
            || {
                let request = request.clone();
                async move {
                    if params.stream {
                        debug!(model = %self.model, "completing via stream");
                        let stream = self.backend.stream_chat(request).await?;
                        TextStream::new(stream).collect_text().await
                    } else {
                        self.backend.chat(request).await.map(|response| response.text)
                    }
                }
            },
            &self.retry,
        )
        .await
    }

    /// Opens a streaming completion and returns its text fragments.
    ///
    /// Opening the stream is retried like any other request. Once fragments start
    /// flowing, errors are handed to the consumer; a stream is never restarted.
    ///
    /// # Errors
    ///
    /// See [`CompletionClient::complete`].
    pub async fn stream_completion(
        &self,
        messages: Vec<Message>,
        max_tokens: u32,
    ) -> Result<TextStream, LLMError> {
        let request = self.build_request(messages, max_tokens, None);
        let stream = with_retry(|| self.backend.stream_chat(request.clone()), &self.retry).await?;
        Ok(TextStream::new(stream))
    }
}

/// Finite, non-restartable sequence of text fragments from one streamed completion.
///
/// Empty deltas are skipped. The running total of everything yielded so far is kept
/// in [`TextStream::accumulated`].
pub struct TextStream {
    inner: ChatStream,
    accumulated: String,
    finished: bool,
}

impl TextStream {
    pub fn new(inner: ChatStream) -> Self {
        Self {
            inner,
            accumulated: String::new(),
            finished: false,
        }
    }

    /// Text yielded so far.
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    /// `true` once the backend signalled the end of the completion.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Drains the remaining fragments and returns the full text.
    ///
    /// # Errors
    ///
    /// Returns the first error reported by the underlying stream.
    pub async fn collect_text(mut self) -> Result<String, LLMError> {
        while let Some(fragment) = self.next().await {
            fragment?;
        }
        Ok(self.accumulated)
    }
}

impl Stream for TextStream {
    type Item = Result<String, LLMError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if this.finished {
                return Poll::Ready(None);
            }
            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    if chunk.is_terminal {
                        this.finished = true;
                        continue;
                    }
                    if let Some(text) = chunk.delta.filter(|text| !text.is_empty()) {
                        this.accumulated.push_str(&text);
                        return Poll::Ready(Some(Ok(text)));
                    }
                }
                Poll::Ready(Some(Err(err))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => {
                    this.finished = true;
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
