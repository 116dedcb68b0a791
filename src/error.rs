use std::time::Duration;

use thiserror::Error;

/// Aggregates every failure mode exposed by the completion client.
///
/// The variants fall into two groups. Terminal failures (configuration, malformed
/// requests, authentication) will not resolve by trying again; everything else is
/// treated as transient and handed to the retry wrapper. See [`LLMError::is_retryable`].
#[derive(Debug, Error)]
pub enum LLMError {
    /// Represents transport-layer or networking failures.
    #[error("transport error: {message}")]
    Transport { message: String },
    /// Reports invalid or expired credentials.
    #[error("auth failure: {message}")]
    Auth { message: String },
    /// Indicates that the backend throttled the request.
    #[error("rate limited: {message}")]
    RateLimit {
        /// Raw message returned by the upstream backend.
        message: String,
        /// Optional wait duration suggested by the backend before retrying.
        retry_after: Option<Duration>,
    },
    /// Indicates that the prompt or expected completion exceeds the allowed token budget.
    #[error("token limit exceeded: {message}")]
    TokenLimitExceeded {
        /// Raw message returned by the backend, kept verbatim for debugging.
        message: String,
    },
    /// Signals a malformed prompt or parameter set rejected before or by the backend.
    #[error("invalid request: {message}")]
    Validation { message: String },
    /// Indicates that a requested model or deployment could not be resolved.
    #[error("model not found: {message}")]
    ModelNotFound {
        /// Model identifier extracted from the error payload when available.
        model: Option<String>,
        /// Full error message returned by the backend.
        message: String,
    },
    /// Raised when selecting a backend or validating its configuration fails.
    #[error("invalid configuration for {field}: {reason}")]
    InvalidConfig {
        /// Name of the configuration field that failed validation.
        field: String,
        /// Additional context explaining why the field is invalid.
        reason: String,
    },
    /// Signals that an SSE channel closed before delivering a terminal marker.
    #[error("stream closed unexpectedly: {message}")]
    StreamClosed { message: String },
    /// Wraps backend-defined errors that cannot be normalized.
    #[error("provider {provider} error: {message}")]
    Provider {
        /// Name of the backend, such as `openai` or `deepseek`.
        provider: &'static str,
        /// Human-readable error message returned by the backend.
        message: String,
    },
    /// Catches opaque or unexpected failures.
    #[error("unknown error: {message}")]
    Unknown { message: String },
}

impl LLMError {
    /// Creates an [`LLMError::Transport`] from a textual description.
    ///
    /// # Examples
    ///
    /// ```
    /// use agentkit::error::LLMError;
    ///
    /// let err = LLMError::transport("dns lookup failed");
    /// assert!(matches!(err, LLMError::Transport { .. }));
    /// ```
    pub fn transport<T: Into<String>>(message: T) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates an [`LLMError::Provider`] with the given backend name and message.
    ///
    /// # Examples
    ///
    /// ```
    /// use agentkit::error::LLMError;
    ///
    /// let err = LLMError::provider("deepseek", "bad JSON payload");
    /// assert!(matches!(err, LLMError::Provider { provider: "deepseek", .. }));
    /// ```
    pub fn provider<T: Into<String>>(provider: &'static str, message: T) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
        }
    }

    /// Creates an [`LLMError::InvalidConfig`] for the named field.
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` when sending the same request again may succeed.
    ///
    /// Malformed requests, authentication failures, and configuration errors are
    /// terminal. Rate limits, network faults, and unclassified backend errors are not.
    ///
    /// # Examples
    ///
    /// ```
    /// use agentkit::error::LLMError;
    ///
    /// assert!(LLMError::transport("connection reset").is_retryable());
    /// assert!(!LLMError::Auth { message: "bad key".into() }.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            LLMError::Auth { .. }
                | LLMError::Validation { .. }
                | LLMError::TokenLimitExceeded { .. }
                | LLMError::InvalidConfig { .. }
        )
    }
}

/// Returns `true` when an error code or message suggests a context/window overflow.
pub(crate) fn looks_like_token_limit_error(code_hint: Option<&str>, message: &str) -> bool {
    if let Some(code) = code_hint {
        let lower = code.to_ascii_lowercase();
        if matches!(
            lower.as_str(),
            "context_length_exceeded" | "max_context_length_exceeded" | "prompt_tokens_exceeded"
        ) {
            return true;
        }
    }

    let lower_message = message.to_ascii_lowercase();
    const HINTS: [&str; 4] = [
        "context length",
        "context window",
        "maximum context",
        "prompt is too long",
    ];
    HINTS.iter().any(|needle| lower_message.contains(needle))
}

/// Attempts to pull a quoted model identifier out of an error message.
pub(crate) fn extract_model_identifier(message: &str) -> Option<String> {
    ['`', '"', '\''].into_iter().find_map(|delimiter| {
        let start = message.find(delimiter)? + delimiter.len_utf8();
        let len = message[start..].find(delimiter)?;
        let value = message[start..start + len].trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}
