use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::LLMError;
use crate::http::DynHttpTransport;
use crate::provider::DynProvider;
use crate::provider::openai_chat::{EndpointStyle, OpenAiChatProvider};

/// Credential used by local servers that ignore authentication.
const LOCAL_PLACEHOLDER_KEY: &str = "empty";

/// 供应商类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "azure", alias = "azure_openai")]
    AzureOpenAi,
    #[serde(rename = "deepseek")]
    DeepSeek,
    #[serde(rename = "openrouter")]
    OpenRouter,
    /// Self-hosted OpenAI-compatible server such as vLLM.
    #[serde(rename = "local", alias = "vllm")]
    Local,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::OpenAi,
        ProviderKind::AzureOpenAi,
        ProviderKind::DeepSeek,
        ProviderKind::OpenRouter,
        ProviderKind::Local,
    ];

    /// Stable name used in logs, errors, and response metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::AzureOpenAi => "azure_openai",
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::OpenRouter => "openrouter",
            ProviderKind::Local => "local",
        }
    }

    /// Identifiers accepted for this provider, both as input and as config keys.
    fn aliases(&self) -> &'static [&'static str] {
        match self {
            ProviderKind::OpenAi => &["openai"],
            ProviderKind::AzureOpenAi => &["azure", "azure_openai"],
            ProviderKind::DeepSeek => &["deepseek"],
            ProviderKind::OpenRouter => &["openrouter"],
            ProviderKind::Local => &["local", "vllm"],
        }
    }

    fn default_base_url(&self) -> Option<&'static str> {
        match self {
            ProviderKind::OpenAi => Some("https://api.openai.com"),
            ProviderKind::DeepSeek => Some("https://api.deepseek.com"),
            ProviderKind::OpenRouter => Some("https://openrouter.ai/api/v1"),
            ProviderKind::AzureOpenAi | ProviderKind::Local => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = LLMError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.aliases().contains(&normalized.as_str()))
            .ok_or_else(|| {
                LLMError::invalid_config("provider", format!("unrecognized provider `{value}`"))
            })
    }
}

/// API key or token whose value never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// One entry of the provider configuration file.
///
/// Every field is optional here; which ones are required depends on the provider and
/// is checked by [`BackendConfig::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub api_key: Option<Secret>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default, alias = "endpoint")]
    pub azure_endpoint: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
    /// Model or Azure deployment used when a request does not name one.
    #[serde(default)]
    pub default_model: Option<String>,
}

/// Provider name → settings, as loaded from JSON.
///
/// ```
/// use agentkit::config::{ProviderConfigs, ProviderKind};
///
/// let configs = ProviderConfigs::from_json_str(r#"{
///     "deepseek": {"api_key": "sk-1", "base_url": "https://api.deepseek.com"},
///     "azure": {"api_key": "k", "endpoint": "https://res.openai.azure.com", "api_version": "2024-06-01"}
/// }"#).unwrap();
/// assert!(configs.get(ProviderKind::DeepSeek).is_some());
/// assert!(configs.get(ProviderKind::AzureOpenAi).is_some());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderConfigs {
    entries: HashMap<String, ProviderSettings>,
}

impl ProviderConfigs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the settings stored under `name`.
    pub fn insert(mut self, name: impl Into<String>, settings: ProviderSettings) -> Self {
        self.entries.insert(name.into(), settings);
        self
    }

    /// Looks up settings under any of the provider's accepted names.
    pub fn get(&self, kind: ProviderKind) -> Option<&ProviderSettings> {
        kind.aliases()
            .iter()
            .find_map(|alias| self.entries.get(*alias))
    }

    pub fn from_json_str(json: &str) -> Result<Self, LLMError> {
        serde_json::from_str(json)
            .map_err(|err| LLMError::invalid_config("providers", format!("malformed JSON: {err}")))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, LLMError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            LLMError::invalid_config(path.display().to_string(), format!("unreadable: {err}"))
        })?;
        Self::from_json_str(&text)
    }
}

/// Fully validated settings for exactly one backend.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    pub provider: ProviderKind,
    pub credential: Secret,
    pub endpoint: String,
    pub api_version: Option<String>,
    pub default_model: Option<String>,
}

impl BackendConfig {
    /// Picks and validates the settings for `provider`.
    ///
    /// `local_endpoint` is the caller-supplied URL required by the local provider; the
    /// `base_url` of a `local`/`vllm` entry is accepted when it is absent.
    ///
    /// # Errors
    ///
    /// Returns [`LLMError::InvalidConfig`] for an unrecognized provider, a missing
    /// configuration entry, or a missing/empty required field.
    pub fn resolve(
        provider: &str,
        configs: &ProviderConfigs,
        local_endpoint: Option<&str>,
    ) -> Result<Self, LLMError> {
        let kind: ProviderKind = provider.parse()?;
        let settings = configs.get(kind);

        let config = match kind {
            ProviderKind::Local => {
                let endpoint = non_empty(local_endpoint)
                    .or_else(|| settings.and_then(|s| non_empty(s.base_url.as_deref())))
                    .ok_or_else(|| {
                        LLMError::invalid_config("endpoint", "local provider requires an endpoint URL")
                    })?;
                let credential = settings
                    .and_then(|s| s.api_key.clone())
                    .filter(|key| !key.expose().is_empty())
                    .unwrap_or_else(|| Secret::new(LOCAL_PLACEHOLDER_KEY));
                BackendConfig {
                    provider: kind,
                    credential: check_credential(kind, credential)?,
                    endpoint: endpoint.to_string(),
                    api_version: None,
                    default_model: settings.and_then(|s| s.default_model.clone()),
                }
            }
            ProviderKind::AzureOpenAi => {
                let settings = require_entry(kind, settings)?;
                BackendConfig {
                    provider: kind,
                    credential: require_key(kind, settings)?,
                    endpoint: require_field(kind, "azure_endpoint", settings.azure_endpoint.as_deref())?,
                    api_version: Some(require_field(
                        kind,
                        "api_version",
                        settings.api_version.as_deref(),
                    )?),
                    default_model: settings.default_model.clone(),
                }
            }
            ProviderKind::OpenAi | ProviderKind::DeepSeek | ProviderKind::OpenRouter => {
                let settings = require_entry(kind, settings)?;
                let endpoint = non_empty(settings.base_url.as_deref())
                    .or(kind.default_base_url())
                    .ok_or_else(|| LLMError::invalid_config(format!("{kind}.base_url"), "missing"))?;
                BackendConfig {
                    provider: kind,
                    credential: require_key(kind, settings)?,
                    endpoint: endpoint.to_string(),
                    api_version: None,
                    default_model: settings.default_model.clone(),
                }
            }
        };

        config.validate_endpoint()?;
        Ok(config)
    }

    fn validate_endpoint(&self) -> Result<(), LLMError> {
        let valid = reqwest::Url::parse(&self.endpoint)
            .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
            .unwrap_or(false);
        if valid {
            Ok(())
        } else {
            Err(LLMError::invalid_config(
                format!("{}.endpoint", self.provider),
                format!("`{}` is not an http(s) URL", self.endpoint),
            ))
        }
    }

    /// Builds the backend handle. Performs no network I/O.
    pub fn into_provider(self, transport: DynHttpTransport) -> DynProvider {
        let style = match (self.provider, self.api_version) {
            (ProviderKind::AzureOpenAi, Some(api_version)) => EndpointStyle::Azure { api_version },
            _ => EndpointStyle::OpenAi,
        };
        let mut provider = OpenAiChatProvider::new(transport, self.credential.expose())
            .with_name(self.provider.as_str())
            .with_base_url(self.endpoint)
            .with_style(style);
        if let Some(model) = self.default_model {
            provider = provider.with_default_model(model);
        }
        Arc::new(provider)
    }
}

/// Selects, validates, and constructs the backend for `provider`.
///
/// # Errors
///
/// See [`BackendConfig::resolve`].
pub fn build_backend(
    provider: &str,
    configs: &ProviderConfigs,
    local_endpoint: Option<&str>,
    transport: DynHttpTransport,
) -> Result<DynProvider, LLMError> {
    let config = BackendConfig::resolve(provider, configs, local_endpoint)?;
    info!(provider = %config.provider, endpoint = %config.endpoint, "backend selected");
    Ok(config.into_provider(transport))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn require_entry(
    kind: ProviderKind,
    settings: Option<&ProviderSettings>,
) -> Result<&ProviderSettings, LLMError> {
    settings.ok_or_else(|| LLMError::invalid_config(kind.as_str(), "no configuration entry"))
}

fn require_key(kind: ProviderKind, settings: &ProviderSettings) -> Result<Secret, LLMError> {
    let key = settings
        .api_key
        .clone()
        .filter(|key| !key.expose().trim().is_empty())
        .ok_or_else(|| {
            LLMError::invalid_config(format!("{kind}.api_key"), format!("provider {kind} requires credential"))
        })?;
    check_credential(kind, key)
}

/// 凭据会原样写入请求头，不能含控制字符（如结尾换行）
fn check_credential(kind: ProviderKind, key: Secret) -> Result<Secret, LLMError> {
    if key.expose().chars().any(char::is_control) {
        return Err(LLMError::invalid_config(
            format!("{kind}.api_key"),
            "credential contains control characters",
        ));
    }
    Ok(key)
}

fn require_field(kind: ProviderKind, field: &str, value: Option<&str>) -> Result<String, LLMError> {
    non_empty(value)
        .map(str::to_string)
        .ok_or_else(|| LLMError::invalid_config(format!("{kind}.{field}"), "missing"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpRequest, HttpResponse, HttpStreamResponse, HttpTransport};
    use crate::provider::LLMProvider;
    use async_trait::async_trait;

    /// Construction must never touch the network.
    struct PanicTransport;

    #[async_trait]
    impl HttpTransport for PanicTransport {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, LLMError> {
            panic!("backend construction must not send requests");
        }

        async fn send_stream(&self, _request: HttpRequest) -> Result<HttpStreamResponse, LLMError> {
            panic!("backend construction must not send requests");
        }
    }

    fn key(value: &str) -> ProviderSettings {
        ProviderSettings {
            api_key: Some(Secret::new(value)),
            ..ProviderSettings::default()
        }
    }

    fn full_configs() -> ProviderConfigs {
        ProviderConfigs::new()
            .insert("openai", key("sk-openai"))
            .insert(
                "azure",
                ProviderSettings {
                    api_key: Some(Secret::new("az-key")),
                    azure_endpoint: Some("https://res.openai.azure.com".to_string()),
                    api_version: Some("2024-06-01".to_string()),
                    ..ProviderSettings::default()
                },
            )
            .insert("deepseek", key("sk-deepseek"))
            .insert(
                "openrouter",
                ProviderSettings {
                    base_url: Some("https://openrouter.ai/api/v1".to_string()),
                    ..key("sk-or")
                },
            )
    }

    fn assert_invalid_config(result: Result<BackendConfig, LLMError>, expected_field: &str) {
        match result {
            Err(LLMError::InvalidConfig { field, .. }) => assert_eq!(field, expected_field),
            other => panic!("expected invalid config for {expected_field}, got {other:?}"),
        }
    }

    #[test]
    fn every_provider_builds_from_complete_config() {
        let configs = full_configs();
        for name in ["openai", "azure", "deepseek", "openrouter"] {
            let backend = build_backend(name, &configs, None, Arc::new(PanicTransport))
                .unwrap_or_else(|err| panic!("{name} should build: {err}"));
            assert_eq!(
                backend.name(),
                name.parse::<ProviderKind>().expect("kind").as_str()
            );
        }
        let local = build_backend(
            "vllm",
            &configs,
            Some("http://localhost:8000/v1"),
            Arc::new(PanicTransport),
        )
        .expect("local backend");
        assert_eq!(local.name(), "local");
    }

    #[test]
    fn local_provider_requires_endpoint() {
        assert_invalid_config(
            BackendConfig::resolve("local", &ProviderConfigs::new(), None),
            "endpoint",
        );
        assert_invalid_config(
            BackendConfig::resolve("local", &ProviderConfigs::new(), Some("  ")),
            "endpoint",
        );
    }

    #[test]
    fn local_provider_uses_placeholder_credential() {
        let config =
            BackendConfig::resolve("local", &ProviderConfigs::new(), Some("http://127.0.0.1:8000"))
                .expect("local config");
        assert_eq!(config.credential.expose(), LOCAL_PLACEHOLDER_KEY);
        assert_eq!(config.endpoint, "http://127.0.0.1:8000");
    }

    #[test]
    fn local_provider_falls_back_to_configured_base_url() {
        let configs = ProviderConfigs::new().insert(
            "vllm",
            ProviderSettings {
                base_url: Some("http://gpu-box:8000/v1".to_string()),
                ..ProviderSettings::default()
            },
        );
        let config = BackendConfig::resolve("local", &configs, None).expect("local config");
        assert_eq!(config.endpoint, "http://gpu-box:8000/v1");
    }

    #[test]
    fn unrecognized_provider_is_rejected() {
        assert_invalid_config(
            BackendConfig::resolve("anthropic", &full_configs(), None),
            "provider",
        );
    }

    #[test]
    fn missing_entry_and_key_are_rejected() {
        assert_invalid_config(
            BackendConfig::resolve("deepseek", &ProviderConfigs::new(), None),
            "deepseek",
        );
        let configs = ProviderConfigs::new().insert("openai", key(" "));
        assert_invalid_config(BackendConfig::resolve("openai", &configs, None), "openai.api_key");
    }

    #[test]
    fn azure_requires_endpoint_and_version() {
        let configs = ProviderConfigs::new().insert(
            "azure",
            ProviderSettings {
                azure_endpoint: Some("https://res.openai.azure.com".to_string()),
                ..key("az")
            },
        );
        assert_invalid_config(
            BackendConfig::resolve("azure", &configs, None),
            "azure_openai.api_version",
        );
    }

    #[test]
    fn default_base_urls_are_applied() {
        let config = BackendConfig::resolve("deepseek", &full_configs(), None).expect("deepseek");
        assert_eq!(config.endpoint, "https://api.deepseek.com");
    }

    #[test]
    fn non_http_endpoint_is_rejected() {
        assert_invalid_config(
            BackendConfig::resolve("local", &ProviderConfigs::new(), Some("localhost:8000")),
            "local.endpoint",
        );
    }

    #[test]
    fn unparseable_http_endpoint_is_rejected() {
        for endpoint in ["http://", "http://bad host:8000/v1"] {
            assert_invalid_config(
                BackendConfig::resolve("local", &ProviderConfigs::new(), Some(endpoint)),
                "local.endpoint",
            );
        }
        let configs = ProviderConfigs::new().insert(
            "openai",
            ProviderSettings {
                base_url: Some("https://".to_string()),
                ..key("sk-openai")
            },
        );
        assert_invalid_config(
            BackendConfig::resolve("openai", &configs, None),
            "openai.endpoint",
        );
    }

    #[test]
    fn credential_with_control_characters_is_rejected() {
        let configs = ProviderConfigs::new()
            .insert("openai", key("sk-abc\n"))
            .insert("deepseek", key("sk-\tdeep"))
            .insert(
                "local",
                ProviderSettings {
                    base_url: Some("http://localhost:8000/v1".to_string()),
                    ..key("tok\r\n")
                },
            );
        assert_invalid_config(BackendConfig::resolve("openai", &configs, None), "openai.api_key");
        assert_invalid_config(
            BackendConfig::resolve("deepseek", &configs, None),
            "deepseek.api_key",
        );
        assert_invalid_config(BackendConfig::resolve("local", &configs, None), "local.api_key");
        assert!(!LLMError::invalid_config("openai.api_key", "x").is_retryable());
    }

    #[test]
    fn provider_names_parse_case_insensitively() {
        assert_eq!("OpenAI".parse::<ProviderKind>().expect("kind"), ProviderKind::OpenAi);
        assert_eq!(
            "azure_openai".parse::<ProviderKind>().expect("kind"),
            ProviderKind::AzureOpenAi
        );
        assert_eq!(" vllm ".parse::<ProviderKind>().expect("kind"), ProviderKind::Local);
    }

    #[test]
    fn secret_is_redacted_in_debug_output() {
        let config = BackendConfig::resolve("openai", &full_configs(), None).expect("openai");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-openai"), "secret leaked: {rendered}");
        assert!(rendered.contains("Secret(***)"));
    }

    #[test]
    fn json_config_accepts_legacy_endpoint_key() {
        let configs = ProviderConfigs::from_json_str(
            r#"{"azure": {"api_key": "k", "endpoint": "https://x.openai.azure.com", "api_version": "2024-02-01"}}"#,
        )
        .expect("configs");
        let config = BackendConfig::resolve("azure", &configs, None).expect("azure");
        assert_eq!(config.endpoint, "https://x.openai.azure.com");
        assert_eq!(config.api_version.as_deref(), Some("2024-02-01"));
    }

    #[test]
    fn malformed_json_is_invalid_config() {
        let err = ProviderConfigs::from_json_str("{not json").expect_err("malformed");
        assert!(matches!(err, LLMError::InvalidConfig { .. }));
    }

    #[test]
    fn missing_config_file_is_invalid_config() {
        let err = ProviderConfigs::from_json_file("/definitely/not/here.json").expect_err("missing");
        assert!(matches!(err, LLMError::InvalidConfig { .. }));
    }
}
