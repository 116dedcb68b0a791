use crate::error::LLMError;
use crate::types::{ChatResponse, FinishReason, ProviderMetadata, TokenUsage};

use super::types::{OpenAiChatResponse, OpenAiMessageContent, OpenAiUsage};

/// Converts a buffered completion into [`ChatResponse`], keeping the first choice.
pub(crate) fn map_response(
    resp: OpenAiChatResponse,
    provider: &'static str,
    endpoint: String,
) -> Result<ChatResponse, LLMError> {
    let raw = serde_json::to_value(&resp).ok();
    let choice = resp
        .choices
        .into_iter()
        .min_by_key(|choice| choice.index)
        .ok_or_else(|| LLMError::provider(provider, "response contained no choices"))?;

    let text = match choice.message.and_then(|message| message.content) {
        None => String::new(),
        Some(OpenAiMessageContent::Text(text)) => text,
        Some(OpenAiMessageContent::Parts(parts)) => parts
            .into_iter()
            .filter(|part| matches!(part.kind.as_str(), "text" | "output_text"))
            .filter_map(|part| part.text)
            .collect(),
    };

    Ok(ChatResponse {
        text,
        finish_reason: choice.finish_reason.as_deref().map(convert_finish_reason),
        usage: resp.usage.map(convert_usage),
        model: resp.model,
        provider: ProviderMetadata {
            provider: provider.to_string(),
            request_id: resp.id,
            endpoint: Some(endpoint),
            raw,
        },
    })
}

pub(crate) fn convert_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::Length,
        "tool_calls" | "function_call" => FinishReason::ToolCalls,
        "content_filter" => FinishReason::ContentFilter,
        other => FinishReason::Other(other.to_string()),
    }
}

pub(crate) fn convert_usage(usage: OpenAiUsage) -> TokenUsage {
    TokenUsage {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
    }
}
