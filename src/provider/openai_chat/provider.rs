use std::collections::HashMap;

use async_trait::async_trait;
use tracing::debug;

use crate::error::LLMError;
use crate::http::{
    DynHttpTransport, HttpResponse, post_json_stream_with_headers, post_json_with_headers,
};
use crate::provider::{ChatStream, LLMProvider};
use crate::stream::collect_body_text;
use crate::types::{ChatRequest, ChatResponse};

use super::error::parse_openai_error;
use super::request::build_openai_body;
use super::response::map_response;
use super::stream::create_stream;
use super::types::OpenAiChatResponse;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// URL layout and auth scheme of an OpenAI-compatible backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointStyle {
    /// `{base}/v1/chat/completions` with `Authorization: Bearer`.
    OpenAi,
    /// `{endpoint}/openai/deployments/{model}/chat/completions?api-version=…` with an
    /// `api-key` header.
    Azure { api_version: String },
}

/// OpenAI Chat Completions Provider
pub struct OpenAiChatProvider {
    pub(crate) transport: DynHttpTransport,
    pub(crate) name: &'static str,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) style: EndpointStyle,
    pub(crate) default_model: Option<String>,
}

impl OpenAiChatProvider {
    /// 创建带默认 base_url 的 Provider
    pub fn new(transport: DynHttpTransport, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            name: "openai",
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            style: EndpointStyle::OpenAi,
            default_model: None,
        }
    }

    /// 自定义 base_url
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Name reported in errors and response metadata.
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn with_style(mut self, style: EndpointStyle) -> Self {
        self.style = style;
        self
    }

    /// 设置默认模型
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub(crate) fn endpoint(&self, model: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        match &self.style {
            EndpointStyle::OpenAi if base.ends_with("/v1") => format!("{base}/chat/completions"),
            EndpointStyle::OpenAi => format!("{base}/v1/chat/completions"),
            EndpointStyle::Azure { api_version } => format!(
                "{base}/openai/deployments/{model}/chat/completions?api-version={api_version}"
            ),
        }
    }

    fn build_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        match self.style {
            EndpointStyle::OpenAi => {
                headers.insert(
                    "Authorization".to_string(),
                    format!("Bearer {}", self.api_key),
                );
            }
            EndpointStyle::Azure { .. } => {
                headers.insert("api-key".to_string(), self.api_key.clone());
            }
        }
        headers.insert("Accept".to_string(), "application/json".to_string());
        headers
    }

    fn resolve_model(&self, request: &ChatRequest) -> Result<String, LLMError> {
        request
            .options
            .model
            .clone()
            .or_else(|| self.default_model.clone())
            .ok_or_else(|| LLMError::Validation {
                message: format!("model is required for {}", self.name),
            })
    }

    fn ensure_success(&self, response: HttpResponse) -> Result<String, LLMError> {
        let status = response.status;
        let success = response.is_success();
        let headers = response.headers.clone();
        let text = response.into_string()?;
        if success {
            Ok(text)
        } else {
            Err(parse_openai_error(self.name, status, &headers, &text))
        }
    }
}

#[async_trait]
impl LLMProvider for OpenAiChatProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LLMError> {
        let model = self.resolve_model(&request)?;
        let body = build_openai_body(&request, &model, false)?;
        let endpoint = self.endpoint(&model);
        debug!(provider = self.name, %model, "sending chat completion");

        let response = post_json_with_headers(
            self.transport.as_ref(),
            endpoint.clone(),
            self.build_headers(),
            &body,
        )
        .await?;
        let text = self.ensure_success(response)?;
        let parsed: OpenAiChatResponse =
            serde_json::from_str(&text).map_err(|err| LLMError::Provider {
                provider: self.name,
                message: format!("failed to parse completion response: {err}"),
            })?;
        map_response(parsed, self.name, endpoint)
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<ChatStream, LLMError> {
        let model = self.resolve_model(&request)?;
        let body = build_openai_body(&request, &model, true)?;
        let endpoint = self.endpoint(&model);
        debug!(provider = self.name, %model, "opening chat completion stream");

        let mut headers = self.build_headers();
        headers.insert("Accept".to_string(), "text/event-stream".to_string());
        let response =
            post_json_stream_with_headers(self.transport.as_ref(), endpoint.clone(), headers, &body)
                .await?;
        if !(200..300).contains(&response.status) {
            let text = collect_body_text(response.body, self.name).await?;
            return Err(parse_openai_error(
                self.name,
                response.status,
                &response.headers,
                &text,
            ));
        }
        Ok(create_stream(response.body, self.name, endpoint))
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
