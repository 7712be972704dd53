use std::io::ErrorKind;
use std::path::Path;

use tokio::fs;

use serde::Deserialize;
use thiserror::Error;

use crate::llm::DEFAULT_LOCAL_PROVIDERS;

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

impl Config {
    /// Load a YAML config file. A missing file yields the defaults.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Ok(serde_saphyr::from_str(&contents)?)
    }
}

// ============================================================================
// ServerConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    300
}

// ============================================================================
// ChatConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Continuation handoffs allowed per turn.
    #[serde(default = "default_max_segments")]
    pub max_segments: u32,
    /// Per-call output ceiling.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Context window assumed for models missing from the catalog.
    #[serde(default = "default_context_window")]
    pub default_context_window: u32,
    #[serde(default = "default_large_request_warn_kb")]
    pub large_request_warn_kb: u64,
    #[serde(default)]
    pub default_provider: Option<String>,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Buffered events between a running turn and its HTTP response.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_segments: default_max_segments(),
            max_tokens: default_max_tokens(),
            default_context_window: default_context_window(),
            large_request_warn_kb: default_large_request_warn_kb(),
            default_provider: None,
            default_model: None,
            system_prompt: None,
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_max_segments() -> u32 {
    2
}

fn default_max_tokens() -> u32 {
    8000
}

fn default_context_window() -> u32 {
    8000
}

fn default_large_request_warn_kb() -> u64 {
    500
}

fn default_channel_capacity() -> usize {
    64
}

// ============================================================================
// ProvidersConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
    /// Provider names treated as local backends.
    #[serde(default = "default_local_providers")]
    pub local: Vec<String>,
    /// Built-in providers that are never registered.
    #[serde(default)]
    pub disabled: Vec<String>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            local: default_local_providers(),
            disabled: Vec::new(),
        }
    }
}

fn default_local_providers() -> Vec<String> {
    DEFAULT_LOCAL_PROVIDERS.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// ConfigError
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.request_timeout_seconds, 300);
        assert_eq!(config.chat.max_segments, 2);
        assert_eq!(config.chat.max_tokens, 8000);
        assert_eq!(config.chat.large_request_warn_kb, 500);
        assert_eq!(config.chat.channel_capacity, 64);
        assert!(config.chat.default_provider.is_none());
        assert_eq!(config.providers.local, vec!["ollama", "lmstudio"]);
        assert!(config.providers.disabled.is_empty());
    }

    #[tokio::test]
    async fn test_load_missing_file_returns_defaults() {
        let tmp_dir = TempDir::new().unwrap();
        let missing_path = tmp_dir.path().join("missing-config.yaml");
        let config = Config::load(&missing_path).await.unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.chat.max_segments, 2);
    }

    #[tokio::test]
    async fn test_load_valid_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
server:
  host: "127.0.0.1"
  port: 3000
  request_timeout_seconds: 60
chat:
  max_segments: 5
  max_tokens: 4096
  default_provider: "xAI"
  default_model: "grok-beta"
  system_prompt: "You are terse."
providers:
  local: ["Ollama", "vllm"]
  disabled: ["OpenRouter"]
"#
        )
        .unwrap();

        let config = Config::load(file.path()).await.unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.request_timeout_seconds, 60);
        assert_eq!(config.chat.max_segments, 5);
        assert_eq!(config.chat.max_tokens, 4096);
        assert_eq!(config.chat.default_provider.as_deref(), Some("xAI"));
        assert_eq!(config.chat.default_model.as_deref(), Some("grok-beta"));
        assert_eq!(config.chat.system_prompt.as_deref(), Some("You are terse."));
        assert_eq!(config.providers.local, vec!["Ollama", "vllm"]);
        assert_eq!(config.providers.disabled, vec!["OpenRouter"]);
    }

    #[tokio::test]
    async fn test_load_partial_yaml_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
chat:
  max_tokens: 2000
"#
        )
        .unwrap();

        let config = Config::load(file.path()).await.unwrap();
        assert_eq!(config.server.host, "0.0.0.0"); // default
        assert_eq!(config.chat.max_tokens, 2000);
        assert_eq!(config.chat.max_segments, 2); // default
        assert_eq!(config.chat.default_context_window, 8000); // default
        assert_eq!(config.providers.local, vec!["ollama", "lmstudio"]); // default
    }

    #[tokio::test]
    async fn test_load_invalid_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid: yaml: content: [").unwrap();

        let result = Config::load(file.path()).await;
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_config_error_display() {
        let io_error = ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "test",
        ));
        assert!(io_error.to_string().contains("failed to read config file"));
    }
}
