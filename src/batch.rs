//! Parallel fan-out of independent prompts.
//!
//! Every prompt gets its own task and its own retry budget. Results are written back
//! by index, so the output lines up with the input no matter which request finishes
//! first.

use futures_util::future::join_all;
use tracing::{info, warn};

use crate::client::{CompletionClient, CompletionParams};
use crate::types::CompletionResult;

impl CompletionClient {
    /// Completes every prompt concurrently and reports each outcome at its index.
    ///
    /// One failed prompt never fails the batch. A task that panics or is cancelled
    /// is reported as a [`CompletionResult::Failure`] like any other error.
    pub async fn complete_batch_detailed<I, S>(
        &self,
        prompts: I,
        params: CompletionParams,
    ) -> Vec<CompletionResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prompts: Vec<String> = prompts.into_iter().map(Into::into).collect();
        info!(count = prompts.len(), "Processing {} prompts in parallel", prompts.len());

        let handles = prompts.into_iter().map(|prompt| {
            let client = self.clone();
            tokio::spawn(async move { client.complete(&prompt, params).await })
        });

        join_all(handles)
            .await
            .into_iter()
            .enumerate()
            .map(|(index, joined)| match joined {
                Ok(Ok(text)) => CompletionResult::Success { text },
                Ok(Err(err)) => {
                    warn!(index, error = %err, "batch item failed");
                    CompletionResult::Failure {
                        reason: err.to_string(),
                    }
                }
                Err(join_err) => {
                    warn!(index, error = %join_err, "batch task aborted");
                    CompletionResult::Failure {
                        reason: format!("task aborted: {join_err}"),
                    }
                }
            })
            .collect()
    }

    /// Like [`CompletionClient::complete_batch_detailed`], with failures collapsed to
    /// `None`.
    pub async fn complete_batch<I, S>(
        &self,
        prompts: I,
        params: CompletionParams,
    ) -> Vec<Option<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.complete_batch_detailed(prompts, params)
            .await
            .into_iter()
            .map(CompletionResult::into_text)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::error::LLMError;
    use crate::provider::{ChatStream, LLMProvider};
    use crate::retry::RetryPolicy;
    use crate::types::{ChatRequest, ChatResponse, ProviderMetadata};

    /// Echoes the prompt back in upper case. `fail` is rejected, `down` always hits a
    /// transport error, `boom` panics, and `slow` takes longer than the rest.
    #[derive(Default)]
    struct EchoProvider {
        down_attempts: AtomicU32,
    }

    fn prompt_of(request: &ChatRequest) -> String {
        request
            .messages
            .last()
            .map(|message| message.content.clone())
            .unwrap_or_default()
    }

    #[async_trait]
    impl LLMProvider for EchoProvider {
        async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LLMError> {
            let prompt = prompt_of(&request);
            match prompt.as_str() {
                "fail" => {
                    return Err(LLMError::Validation {
                        message: "rejected".into(),
                    });
                }
                "down" => {
                    self.down_attempts.fetch_add(1, Ordering::SeqCst);
                    return Err(LLMError::transport("connection reset"));
                }
                "boom" => panic!("backend exploded"),
                "slow" => tokio::time::sleep(Duration::from_millis(50)).await,
                _ => {}
            }
            Ok(ChatResponse {
                text: prompt.to_uppercase(),
                finish_reason: None,
                usage: None,
                model: None,
                provider: ProviderMetadata::default(),
            })
        }

        async fn stream_chat(&self, _request: ChatRequest) -> Result<ChatStream, LLMError> {
            Err(LLMError::provider("echo", "streaming unsupported"))
        }

        fn name(&self) -> &'static str {
            "echo"
        }
    }

    fn client() -> CompletionClient {
        CompletionClient::new(Arc::new(EchoProvider::default()), "echo-1")
            .with_retry_policy(RetryPolicy::no_retry())
    }

    #[tokio::test]
    async fn results_follow_input_order() {
        let results = client()
            .complete_batch(["slow", "a", "b"], CompletionParams::default())
            .await;
        assert_eq!(
            results,
            vec![
                Some("SLOW".to_string()),
                Some("A".to_string()),
                Some("B".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn failed_item_is_none_and_others_succeed() {
        let results = client()
            .complete_batch(vec!["a", "fail", "c"], CompletionParams::default())
            .await;
        assert_eq!(
            results,
            vec![Some("A".to_string()), None, Some("C".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_transient_failure_is_none_at_its_index() {
        let provider = Arc::new(EchoProvider::default());
        let client = CompletionClient::new(provider.clone(), "echo-1");
        let start = tokio::time::Instant::now();

        let results = client
            .complete_batch(["a", "down", "c"], CompletionParams::default())
            .await;

        assert_eq!(
            results,
            vec![Some("A".to_string()), None, Some("C".to_string())]
        );
        assert_eq!(
            provider.down_attempts.load(Ordering::SeqCst),
            RetryPolicy::default().max_retries + 1
        );
        // 1s + 2s + 3s of backoff inside the failing task only.
        assert!(start.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test]
    async fn panicking_task_becomes_failure_at_its_index() {
        let results = client()
            .complete_batch_detailed(["x", "boom"], CompletionParams::default())
            .await;
        assert_eq!(results.len(), 2);
        assert_eq!(
            results[0],
            CompletionResult::Success {
                text: "X".to_string()
            }
        );
        match &results[1] {
            CompletionResult::Failure { reason } => assert!(reason.contains("task aborted")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn detailed_failure_carries_error_text() {
        let results = client()
            .complete_batch_detailed(["fail"], CompletionParams::default())
            .await;
        match &results[0] {
            CompletionResult::Failure { reason } => assert!(reason.contains("rejected")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_batch_yields_empty_output() {
        let results = client()
            .complete_batch(Vec::<String>::new(), CompletionParams::default())
            .await;
        assert!(results.is_empty());
    }
}
