//! Per-request credential context and resolution.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::provider::ProviderConfig;

/// Client-side settings for one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSetting {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ProviderSetting {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            base_url: None,
            api_key: None,
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// Credentials a provider needs for one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedCredentials {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

/// Read-only credential sources for one request.
///
/// Priority for API keys: explicit user key, then the provider setting's
/// key, then the server environment.
#[derive(Debug, Clone, Default)]
pub struct CredentialContext {
    user_api_keys: HashMap<String, String>,
    provider_settings: HashMap<String, ProviderSetting>,
    server_env: Arc<HashMap<String, String>>,
}

impl CredentialContext {
    pub fn new(server_env: Arc<HashMap<String, String>>) -> Self {
        Self {
            server_env,
            ..Self::default()
        }
    }

    pub fn with_api_keys(mut self, keys: HashMap<String, String>) -> Self {
        self.user_api_keys = keys;
        self
    }

    pub fn with_api_key(mut self, provider: impl Into<String>, key: impl Into<String>) -> Self {
        self.user_api_keys.insert(provider.into(), key.into());
        self
    }

    pub fn with_provider_settings(mut self, settings: HashMap<String, ProviderSetting>) -> Self {
        self.provider_settings = settings;
        self
    }

    pub fn with_provider_setting(
        mut self,
        provider: impl Into<String>,
        setting: ProviderSetting,
    ) -> Self {
        self.provider_settings.insert(provider.into(), setting);
        self
    }

    pub fn provider_settings(&self) -> &HashMap<String, ProviderSetting> {
        &self.provider_settings
    }

    /// Non-blank user-supplied key for a provider.
    pub fn user_api_key(&self, provider: &str) -> Option<&str> {
        self.user_api_keys.get(provider).and_then(|k| non_blank(k))
    }

    /// Non-blank server environment value.
    pub fn env(&self, key: &str) -> Option<&str> {
        self.server_env.get(key).and_then(|v| non_blank(v))
    }

    /// Resolve the API key and base URL a provider should use.
    pub fn resolve(&self, provider: &str, config: &ProviderConfig) -> ResolvedCredentials {
        let setting = self.provider_settings.get(provider);

        let api_key = self
            .user_api_key(provider)
            .or_else(|| setting.and_then(|s| s.api_key.as_deref()).and_then(non_blank))
            .or_else(|| config.api_token_key.as_deref().and_then(|k| self.env(k)))
            .map(str::to_string);

        let base_url = setting
            .and_then(|s| s.base_url.as_deref())
            .and_then(non_blank)
            .or_else(|| config.base_url_key.as_deref().and_then(|k| self.env(k)))
            .map(str::to_string);

        ResolvedCredentials { api_key, base_url }
    }

    /// Stable identity of the credentials a provider would use.
    ///
    /// Used as the dynamic model cache key, so two contexts that resolve to
    /// the same key and base URL share cached models.
    pub fn fingerprint(&self, provider: &str, config: &ProviderConfig) -> String {
        let resolved = self.resolve(provider, config);
        let mut hasher = Sha256::new();
        hasher.update(provider.as_bytes());
        hasher.update([0]);
        hasher.update(resolved.api_key.as_deref().unwrap_or_default().as_bytes());
        hasher.update([0]);
        hasher.update(resolved.base_url.as_deref().unwrap_or_default().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProviderConfig {
        ProviderConfig::new(Some("XAI_API_KEY"), Some("XAI_API_BASE_URL"))
    }

    fn env(pairs: &[(&str, &str)]) -> Arc<HashMap<String, String>> {
        Arc::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn user_key_beats_environment() {
        let ctx = CredentialContext::new(env(&[("XAI_API_KEY", "env-key")]))
            .with_api_key("xAI", "user-key");

        let resolved = ctx.resolve("xAI", &config());
        assert_eq!(resolved.api_key.as_deref(), Some("user-key"));
    }

    #[test]
    fn blank_user_key_falls_back_to_environment() {
        let ctx = CredentialContext::new(env(&[("XAI_API_KEY", "env-key")]))
            .with_api_key("xAI", "   ");

        let resolved = ctx.resolve("xAI", &config());
        assert_eq!(resolved.api_key.as_deref(), Some("env-key"));
    }

    #[test]
    fn setting_overrides_base_url() {
        let setting = ProviderSetting {
            base_url: Some("http://proxy.local/v1".to_string()),
            ..ProviderSetting::default()
        };
        let ctx = CredentialContext::new(env(&[("XAI_API_BASE_URL", "http://env/v1")]))
            .with_provider_setting("xAI", setting);

        let resolved = ctx.resolve("xAI", &config());
        assert_eq!(resolved.base_url.as_deref(), Some("http://proxy.local/v1"));
    }

    #[test]
    fn nothing_resolves_without_sources() {
        let ctx = CredentialContext::default();
        assert_eq!(ctx.resolve("xAI", &config()), ResolvedCredentials::default());
    }

    #[test]
    fn fingerprint_tracks_resolved_credentials() {
        let a = CredentialContext::default().with_api_key("xAI", "one");
        let b = CredentialContext::default().with_api_key("xAI", "two");
        let a2 = CredentialContext::new(env(&[("UNRELATED", "x")])).with_api_key("xAI", "one");

        assert_ne!(a.fingerprint("xAI", &config()), b.fingerprint("xAI", &config()));
        assert_eq!(a.fingerprint("xAI", &config()), a2.fingerprint("xAI", &config()));
        assert_eq!(a.fingerprint("xAI", &config()).len(), 64);
    }

    #[test]
    fn setting_defaults_to_enabled() {
        let setting: ProviderSetting = serde_json::from_str("{}").unwrap();
        assert!(setting.enabled);

        let setting: ProviderSetting =
            serde_json::from_str(r#"{"enabled":false,"baseUrl":"http://x"}"#).unwrap();
        assert!(!setting.enabled);
        assert_eq!(setting.base_url.as_deref(), Some("http://x"));
    }
}
