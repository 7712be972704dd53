//! Built-in provider table.

use std::sync::Arc;

use reqwest::Client;
use tracing::debug;

use super::anthropic::AnthropicProvider;
use super::catalog::ModelInfo;
use super::openai::OpenAICompatibleProvider;
use super::provider::{LLMProvider, ProviderConfig};
use super::registry::ProviderRegistry;

/// Static description of an OpenAI-compatible backend.
pub struct ProviderDescriptor {
    pub name: &'static str,
    pub api_token_key: Option<&'static str>,
    pub base_url_key: Option<&'static str>,
    pub default_base_url: &'static str,
    /// `(name, label, max_token_allowed)`
    pub static_models: &'static [(&'static str, &'static str, u32)],
    pub dynamic: bool,
}

impl ProviderDescriptor {
    pub fn build(&self, client: Client) -> OpenAICompatibleProvider {
        let models = self
            .static_models
            .iter()
            .map(|(name, label, max)| ModelInfo::new(*name, *label, self.name, *max))
            .collect();
        let provider = OpenAICompatibleProvider::new(client, self.name, self.default_base_url)
            .with_config(ProviderConfig::new(self.api_token_key, self.base_url_key))
            .with_static_models(models);
        if self.dynamic {
            provider.with_dynamic_models()
        } else {
            provider
        }
    }
}

pub const LMSTUDIO: ProviderDescriptor = ProviderDescriptor {
    name: "LMStudio",
    api_token_key: None,
    base_url_key: Some("LMSTUDIO_API_BASE_URL"),
    default_base_url: "http://127.0.0.1:1234/v1",
    static_models: &[],
    dynamic: true,
};

pub const OLLAMA: ProviderDescriptor = ProviderDescriptor {
    name: "Ollama",
    api_token_key: None,
    base_url_key: Some("OLLAMA_API_BASE_URL"),
    default_base_url: "http://127.0.0.1:11434/v1",
    static_models: &[],
    dynamic: true,
};

pub const OPENAI: ProviderDescriptor = ProviderDescriptor {
    name: "OpenAI",
    api_token_key: Some("OPENAI_API_KEY"),
    base_url_key: Some("OPENAI_API_BASE_URL"),
    default_base_url: "https://api.openai.com/v1",
    static_models: &[
        ("gpt-4o", "GPT-4o", 8000),
        ("gpt-4o-mini", "GPT-4o Mini", 8000),
    ],
    dynamic: true,
};

pub const OPEN_ROUTER: ProviderDescriptor = ProviderDescriptor {
    name: "OpenRouter",
    api_token_key: Some("OPEN_ROUTER_API_KEY"),
    base_url_key: Some("OPEN_ROUTER_API_BASE_URL"),
    default_base_url: "https://openrouter.ai/api/v1",
    static_models: &[],
    dynamic: true,
};

pub const XAI: ProviderDescriptor = ProviderDescriptor {
    name: "xAI",
    api_token_key: Some("XAI_API_KEY"),
    base_url_key: Some("XAI_API_BASE_URL"),
    default_base_url: "https://api.x.ai/v1",
    static_models: &[
        ("grok-3-beta", "xAI Grok 3 Beta", 8000),
        ("grok-beta", "xAI Grok Beta", 8000),
        ("grok-2-1212", "xAI Grok2 1212", 8000),
    ],
    dynamic: false,
};

/// OpenAI-compatible backends, in registration order after Anthropic.
pub const OPENAI_COMPATIBLE: &[ProviderDescriptor] = &[LMSTUDIO, OLLAMA, OPENAI, OPEN_ROUTER, XAI];

/// Every built-in provider in registration order.
pub fn builtin_providers(client: &Client) -> Vec<Arc<dyn LLMProvider>> {
    let mut providers: Vec<Arc<dyn LLMProvider>> =
        vec![Arc::new(AnthropicProvider::new(client.clone()))];
    providers.extend(
        OPENAI_COMPATIBLE
            .iter()
            .map(|d| Arc::new(d.build(client.clone())) as Arc<dyn LLMProvider>),
    );
    providers
}

/// Register the built-in providers, skipping names listed in `disabled`.
///
/// Returns the number of providers registered.
pub fn register_builtin(registry: &mut ProviderRegistry, client: &Client, disabled: &[String]) -> usize {
    let mut registered = 0;
    for provider in builtin_providers(client) {
        if disabled
            .iter()
            .any(|d| d.eq_ignore_ascii_case(provider.name()))
        {
            debug!(provider = %provider.name(), "provider disabled by configuration");
            continue;
        }
        if registry.register(provider) {
            registered += 1;
        }
    }
    registered
}
