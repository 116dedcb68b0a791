use crate::error::LLMError;
use crate::types::ChatRequest;

use super::types::OpenAiChatBody;

/// Checks the request locally so malformed input never reaches the network.
pub(crate) fn validate_request(request: &ChatRequest) -> Result<(), LLMError> {
    if request.messages.is_empty() {
        return Err(LLMError::Validation {
            message: "at least one message is required".to_string(),
        });
    }
    if let Some(message) = request.messages.iter().find(|m| m.role.0.trim().is_empty()) {
        return Err(LLMError::Validation {
            message: format!("message with empty role: {:?}", message.content),
        });
    }

    let options = &request.options;
    if let Some(temperature) = options.temperature {
        if !(0.0..=2.0).contains(&temperature) {
            return Err(LLMError::Validation {
                message: format!("temperature must be within [0, 2], got {temperature}"),
            });
        }
    }
    if let Some(top_p) = options.top_p {
        if !(top_p > 0.0 && top_p <= 1.0) {
            return Err(LLMError::Validation {
                message: format!("top_p must be within (0, 1], got {top_p}"),
            });
        }
    }
    if options.max_tokens == Some(0) {
        return Err(LLMError::Validation {
            message: "max_tokens must be positive".to_string(),
        });
    }
    Ok(())
}

pub(crate) fn build_openai_body<'a>(
    request: &'a ChatRequest,
    model: &'a str,
    stream: bool,
) -> Result<OpenAiChatBody<'a>, LLMError> {
    validate_request(request)?;
    Ok(OpenAiChatBody {
        model,
        messages: &request.messages,
        temperature: request.options.temperature,
        top_p: request.options.top_p,
        max_tokens: request.options.max_tokens,
        stream,
    })
}
