use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use serde_json::json;

use crate::error::LLMError;
use crate::http::HttpBodyStream;
use crate::provider::ChatStream;
use crate::stream::{SseDecoder, SseEvent};
use crate::types::{ChatChunk, ProviderMetadata};

use super::error::parse_inline_stream_error;
use super::response::{convert_finish_reason, convert_usage};
use super::types::OpenAiStreamChunk;

pub(crate) fn create_stream(
    body: HttpBodyStream,
    provider: &'static str,
    endpoint: String,
) -> ChatStream {
    Box::pin(OpenAiChunkStream {
        events: SseDecoder::new(body, provider),
        provider,
        endpoint,
        saw_finish: false,
        ended: false,
    })
}

/// Maps SSE events onto [`ChatChunk`] values.
///
/// A body that closes without `[DONE]` and without any `finish_reason` yields a final
/// [`LLMError::StreamClosed`], so a truncated answer is never mistaken for a full one.
struct OpenAiChunkStream {
    events: SseDecoder,
    provider: &'static str,
    endpoint: String,
    saw_finish: bool,
    ended: bool,
}

impl OpenAiChunkStream {
    fn metadata(&self, request_id: Option<String>, raw: Option<serde_json::Value>) -> ProviderMetadata {
        ProviderMetadata {
            provider: self.provider.to_string(),
            request_id,
            endpoint: Some(self.endpoint.clone()),
            raw,
        }
    }

    fn convert(&mut self, data: &str) -> Result<ChatChunk, LLMError> {
        let chunk: OpenAiStreamChunk =
            serde_json::from_str(data).map_err(|err| LLMError::Provider {
                provider: self.provider,
                message: format!("failed to parse stream chunk: {err}"),
            })?;
        if let Some(error) = &chunk.error {
            return Err(parse_inline_stream_error(self.provider, error));
        }

        let raw = serde_json::to_value(&chunk).ok();
        let choice = chunk.choices.iter().min_by_key(|choice| choice.index);
        let delta = choice
            .and_then(|choice| choice.delta.as_ref())
            .and_then(|delta| delta.content.clone())
            .filter(|text| !text.is_empty());
        let finish_reason = choice
            .and_then(|choice| choice.finish_reason.as_deref())
            .map(convert_finish_reason);
        if finish_reason.is_some() {
            self.saw_finish = true;
        }

        Ok(ChatChunk {
            delta,
            finish_reason,
            usage: chunk.usage.clone().map(convert_usage),
            is_terminal: false,
            provider: self.metadata(chunk.id.clone(), raw),
        })
    }

    fn terminal(&self) -> ChatChunk {
        ChatChunk {
            delta: None,
            finish_reason: None,
            usage: None,
            is_terminal: true,
            provider: self.metadata(None, Some(json!({"event": "[DONE]"}))),
        }
    }
}

impl Stream for OpenAiChunkStream {
    type Item = Result<ChatChunk, LLMError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.ended {
            return Poll::Ready(None);
        }

        match Pin::new(&mut this.events).poll_next(cx) {
            Poll::Ready(Some(Ok(SseEvent::Data(data)))) => {
                let item = this.convert(&data);
                if item.is_err() {
                    this.ended = true;
                }
                Poll::Ready(Some(item))
            }
            Poll::Ready(Some(Ok(SseEvent::Done))) => {
                this.ended = true;
                Poll::Ready(Some(Ok(this.terminal())))
            }
            Poll::Ready(Some(Err(err))) => {
                this.ended = true;
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                this.ended = true;
                if this.saw_finish {
                    Poll::Ready(Some(Ok(this.terminal())))
                } else {
                    Poll::Ready(Some(Err(LLMError::StreamClosed {
                        message: format!("{} stream ended before [DONE]", this.provider),
                    })))
                }
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{StreamExt, stream};

    use super::*;

    fn body(chunks: &[&str]) -> HttpBodyStream {
        let chunks: Vec<Result<Vec<u8>, LLMError>> =
            chunks.iter().map(|c| Ok(c.as_bytes().to_vec())).collect();
        Box::pin(stream::iter(chunks))
    }

    #[tokio::test]
    async fn stream_yields_deltas_then_terminal_chunk() {
        let stream = create_stream(
            body(&[
                "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
                "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"}}]}\n\n",
                "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"},\"finish_reason\":\"stop\"}]}\n\n",
                "data: [DONE]\n\n",
            ]),
            "openai",
            "endpoint".to_string(),
        );
        let chunks: Vec<ChatChunk> = stream.map(|c| c.expect("chunk")).collect().await;

        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].delta, None);
        assert_eq!(chunks[1].delta.as_deref(), Some("Hel"));
        assert_eq!(chunks[2].delta.as_deref(), Some("lo"));
        assert_eq!(
            chunks[2].finish_reason,
            Some(crate::types::FinishReason::Stop)
        );
        assert_eq!(chunks[1].provider.request_id.as_deref(), Some("c1"));
        assert!(chunks[3].is_terminal);
    }

    #[tokio::test]
    async fn stream_without_done_after_finish_reason_terminates_cleanly() {
        let stream = create_stream(
            body(&["data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"x\"},\"finish_reason\":\"stop\"}]}\n\n"]),
            "local",
            "endpoint".to_string(),
        );
        let chunks: Vec<_> = stream.collect().await;
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].as_ref().expect("terminal").is_terminal);
    }

    #[tokio::test]
    async fn truncated_stream_reports_stream_closed() {
        let mut stream = create_stream(
            body(&["data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"par\"}}]}\n\n"]),
            "deepseek",
            "endpoint".to_string(),
        );
        assert!(stream.next().await.expect("first").is_ok());
        let err = stream.next().await.expect("error item").expect_err("closed");
        assert!(matches!(err, LLMError::StreamClosed { .. }));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn inline_error_chunk_is_mapped() {
        let mut stream = create_stream(
            body(&["data: {\"error\":{\"code\":502,\"message\":\"upstream failed\"}}\n\n"]),
            "openrouter",
            "endpoint".to_string(),
        );
        let err = stream.next().await.expect("item").expect_err("inline error");
        assert!(matches!(err, LLMError::Provider { provider: "openrouter", .. }));
        assert!(stream.next().await.is_none());
    }
}
