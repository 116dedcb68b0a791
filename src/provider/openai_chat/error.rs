use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{LLMError, extract_model_identifier, looks_like_token_limit_error};

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<InnerError>,
}

#[derive(Deserialize)]
struct InnerError {
    message: Option<String>,
    code: Option<Value>,
}

/// Maps a non-2xx response onto the error taxonomy.
///
/// Classification follows the HTTP status; the JSON `error` envelope only refines the
/// message. Bodies that are not JSON still classify by status.
pub(crate) fn parse_openai_error(
    provider: &'static str,
    status: u16,
    headers: &HashMap<String, String>,
    body: &str,
) -> LLMError {
    let inner = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.error);
    let code = inner.as_ref().and_then(|error| match &error.code {
        Some(Value::String(code)) => Some(code.clone()),
        Some(Value::Number(code)) => Some(code.to_string()),
        _ => None,
    });
    let message = match inner.and_then(|error| error.message) {
        Some(message) => match &code {
            Some(code) => format!("{message} ({code})"),
            None => message,
        },
        None => format!("status {status}: {body}"),
    };

    match status {
        400 | 422 if looks_like_token_limit_error(code.as_deref(), &message) => {
            LLMError::TokenLimitExceeded { message }
        }
        400 | 422 => LLMError::Validation { message },
        401 | 403 => LLMError::Auth { message },
        404 => LLMError::ModelNotFound {
            model: extract_model_identifier(&message),
            message,
        },
        429 => LLMError::RateLimit {
            message,
            retry_after: retry_after_from_headers(headers),
        },
        _ => LLMError::Provider { provider, message },
    }
}

/// Maps an `error` object sent inside a stream chunk.
pub(crate) fn parse_inline_stream_error(provider: &'static str, error: &Value) -> LLMError {
    let status = error
        .get("code")
        .and_then(Value::as_u64)
        .and_then(|code| u16::try_from(code).ok())
        .unwrap_or(500);
    let body = serde_json::json!({ "error": error }).to_string();
    parse_openai_error(provider, status, &HashMap::new(), &body)
}

/// Reads a numeric `Retry-After` header. HTTP-date values are ignored.
fn retry_after_from_headers(headers: &HashMap<String, String>) -> Option<Duration> {
    headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("retry-after"))
        .and_then(|(_, value)| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
