//! LLM provider trait.

use async_trait::async_trait;
use url::Url;

use super::catalog::ModelInfo;
use super::credentials::ResolvedCredentials;
use super::error::LLMError;
use super::types::{ChatRequest, ChatStream};

/// Static credential lookup keys of a provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Environment key holding the API key. `None` for credential-free backends.
    pub api_token_key: Option<String>,
    /// Environment key holding a base URL override.
    pub base_url_key: Option<String>,
}

impl ProviderConfig {
    pub fn new(api_token_key: Option<&str>, base_url_key: Option<&str>) -> Self {
        Self {
            api_token_key: api_token_key.map(str::to_string),
            base_url_key: base_url_key.map(str::to_string),
        }
    }

    pub fn requires_api_key(&self) -> bool {
        self.api_token_key.is_some()
    }
}

/// A pluggable backend: a name, credential keys, a static model list,
/// optionally a dynamic model listing, and streaming generation.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Registry key. Unique per registry.
    fn name(&self) -> &str;

    fn config(&self) -> &ProviderConfig;

    fn static_models(&self) -> &[ModelInfo];

    fn supports_dynamic_models(&self) -> bool {
        false
    }

    /// List models the backend reports at runtime.
    async fn fetch_dynamic_models(
        &self,
        _credentials: &ResolvedCredentials,
    ) -> Result<Vec<ModelInfo>, LLMError> {
        Err(LLMError::Unsupported("dynamic model listing"))
    }

    /// Start one streaming generation call.
    async fn chat_stream(
        &self,
        request: ChatRequest,
        credentials: &ResolvedCredentials,
    ) -> Result<ChatStream, LLMError>;
}

/// Return the API key, failing if the provider needs one and none resolved.
pub(crate) fn require_api_key<'a>(
    provider: &dyn LLMProvider,
    credentials: &'a ResolvedCredentials,
) -> Result<Option<&'a str>, LLMError> {
    match credentials.api_key.as_deref() {
        Some(key) => Ok(Some(key)),
        None if provider.config().requires_api_key() => Err(LLMError::MissingApiKey {
            provider: provider.name().to_string(),
        }),
        None => Ok(None),
    }
}

/// Join a base URL and an API path.
pub(crate) fn endpoint(base_url: &str, path: &str) -> Result<Url, LLMError> {
    let joined = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Ok(Url::parse(&joined)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        let url = endpoint("https://api.x.ai/v1/", "/chat/completions").unwrap();
        assert_eq!(url.as_str(), "https://api.x.ai/v1/chat/completions");
    }

    #[test]
    fn endpoint_rejects_garbage() {
        assert!(matches!(
            endpoint("not a url", "models"),
            Err(LLMError::InvalidUrl(_))
        ));
    }
}
