//! Server-Sent Events decoding shared by streaming providers.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_util::StreamExt;

use crate::error::LLMError;
use crate::http::HttpBodyStream;

/// One decoded SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Joined `data:` payload of one event.
    Data(String),
    /// The `[DONE]` terminal marker.
    Done,
}

/// Splits a raw HTTP body into [`SseEvent`] values.
///
/// Only `data:` fields are kept. Multi-line payloads are joined with `\n`, CRLF line
/// endings are accepted, and nothing is yielded after `[DONE]`. A body that ends
/// without a blank line still flushes its last event.
pub struct SseDecoder {
    body: HttpBodyStream,
    buffer: Vec<u8>,
    data_lines: Vec<Vec<u8>>,
    pending: VecDeque<Result<SseEvent, LLMError>>,
    provider: &'static str,
    body_finished: bool,
    done_received: bool,
}

impl SseDecoder {
    pub fn new(body: HttpBodyStream, provider: &'static str) -> Self {
        Self {
            body,
            buffer: Vec::new(),
            data_lines: Vec::new(),
            pending: VecDeque::new(),
            provider,
            body_finished: false,
            done_received: false,
        }
    }

    /// Returns `true` once the terminal marker has been decoded.
    pub fn done_received(&self) -> bool {
        self.done_received
    }

    fn push_line(&mut self, line: &[u8]) {
        if line.is_empty() {
            self.flush_event();
            return;
        }
        if let Some(rest) = line.strip_prefix(b"data:") {
            let data = rest.strip_prefix(b" ").unwrap_or(rest);
            self.data_lines.push(data.to_vec());
        }
    }

    fn flush_event(&mut self) {
        if self.data_lines.is_empty() {
            return;
        }
        let joined = self.data_lines.drain(..).collect::<Vec<_>>().join(&b'\n');
        if joined.is_empty() || self.done_received {
            return;
        }

        let event = String::from_utf8(joined)
            .map_err(|err| LLMError::Provider {
                provider: self.provider,
                message: format!("invalid UTF-8 in stream chunk: {err}"),
            })
            .map(|data| {
                if data.trim() == "[DONE]" {
                    self.done_received = true;
                    SseEvent::Done
                } else {
                    SseEvent::Data(data)
                }
            });
        self.pending.push_back(event);
    }

    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            self.push_line(&line);
        }
    }

    fn finish_body(&mut self) {
        self.body_finished = true;
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.push_line(&line);
        }
        self.flush_event();
    }
}

impl Stream for SseDecoder {
    type Item = Result<SseEvent, LLMError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(event) = this.pending.pop_front() {
                return Poll::Ready(Some(event));
            }
            if this.done_received || this.body_finished {
                return Poll::Ready(None);
            }

            match this.body.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.buffer.extend_from_slice(&bytes);
                    this.drain_lines();
                }
                Poll::Ready(Some(Err(err))) => return Poll::Ready(Some(Err(err))),
                Poll::Ready(None) => this.finish_body(),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Drains a streaming body into a string, used to read error payloads.
pub(crate) async fn collect_body_text(
    mut body: HttpBodyStream,
    provider: &'static str,
) -> Result<String, LLMError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = body.next().await {
        bytes.extend_from_slice(&chunk?);
    }
    String::from_utf8(bytes).map_err(|err| LLMError::Provider {
        provider,
        message: format!("failed to decode stream error body: {err}"),
    })
}
