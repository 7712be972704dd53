//! Chat turn error taxonomy.

use modelgate_protocol::ErrorBody;
use thiserror::Error;

use crate::llm::{LLMError, RegistryError};

/// Errors raised by the context reducer. Never fatal to a turn.
#[derive(Debug, Error)]
pub enum ReductionError {
    #[error("context summary failed: {0}")]
    Summary(String),

    #[error("context selection failed: {0}")]
    Selection(String),

    #[error(transparent)]
    Llm(#[from] LLMError),
}

/// Errors raised by the tool service.
#[derive(Debug, Error)]
pub enum ToolCallError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments for tool {name}: {message}")]
    InvalidArguments { name: String, message: String },

    #[error("tool {name} failed: {message}")]
    Failed { name: String, message: String },
}

/// Errors that end a chat turn.
#[derive(Debug, Error)]
pub enum ChatError {
    /// No usable credential for the selected provider.
    #[error("Invalid or missing API key")]
    Credential { provider: String, detail: String },

    /// The backend rejected the request for its context or token length.
    #[error(
        "The conversation is too long for the current model. Please start a new conversation or try enabling context optimization."
    )]
    ContextLimit { provider: String, detail: String },

    /// The continuation ceiling was reached.
    #[error("Cannot continue message: Maximum segments reached")]
    SegmentLimitExceeded { provider: String, max: u32 },

    #[error("tool call failed: {source}")]
    ToolCall {
        provider: String,
        #[source]
        source: ToolCallError,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Neither the request nor the catalog names a model for the provider.
    #[error("no model available for provider {provider}")]
    NoModel { provider: String },

    #[error("{source}")]
    Upstream {
        provider: String,
        #[source]
        source: LLMError,
    },

    /// The client went away.
    #[error("client disconnected")]
    Disconnected,
}

impl ChatError {
    /// Classify a backend error for the provider that raised it.
    pub fn from_llm(provider: &str, error: LLMError) -> Self {
        let provider = provider.to_string();
        let message = error.to_string();

        match &error {
            LLMError::MissingApiKey { .. } | LLMError::Api { status: 401 | 403, .. } => {
                return ChatError::Credential {
                    provider,
                    detail: message,
                };
            }
            LLMError::Api { status: 413, .. } => {
                return ChatError::ContextLimit {
                    provider,
                    detail: message,
                };
            }
            _ => {}
        }

        if message.contains("API key") {
            ChatError::Credential {
                provider,
                detail: message,
            }
        } else if message.contains("context length")
            || message.contains("maximum context")
            || message.contains("token")
        {
            ChatError::ContextLimit {
                provider,
                detail: message,
            }
        } else {
            ChatError::Upstream {
                provider,
                source: error,
            }
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ChatError::Credential { .. } => 401,
            ChatError::ContextLimit { .. } => 413,
            ChatError::NoModel { .. } => 400,
            ChatError::Registry(RegistryError::ProviderNotFound(_)) => 404,
            ChatError::Upstream {
                source: LLMError::RateLimit { .. },
                ..
            } => 429,
            ChatError::Upstream {
                source: LLMError::Api { status, .. },
                ..
            } if (400..600).contains(status) => *status,
            ChatError::Disconnected => 499,
            ChatError::SegmentLimitExceeded { .. }
            | ChatError::ToolCall { .. }
            | ChatError::Registry(_)
            | ChatError::Upstream { .. } => 500,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            ChatError::Credential { .. }
            | ChatError::SegmentLimitExceeded { .. }
            | ChatError::NoModel { .. }
            | ChatError::Registry(_)
            | ChatError::ToolCall { .. }
            | ChatError::Disconnected => false,
            ChatError::ContextLimit { .. } => true,
            ChatError::Upstream { source, .. } => match source {
                LLMError::RateLimit { .. } | LLMError::Request(_) | LLMError::Stream(_) => true,
                LLMError::Api { status, .. } => *status >= 500,
                _ => false,
            },
        }
    }

    /// Provider the error is attributed to, if any.
    pub fn provider(&self) -> Option<&str> {
        match self {
            ChatError::Credential { provider, .. }
            | ChatError::ContextLimit { provider, .. }
            | ChatError::SegmentLimitExceeded { provider, .. }
            | ChatError::ToolCall { provider, .. }
            | ChatError::NoModel { provider }
            | ChatError::Upstream { provider, .. } => Some(provider),
            ChatError::Registry(RegistryError::ProviderNotFound(name)) => Some(name),
            ChatError::Registry(_) | ChatError::Disconnected => None,
        }
    }

    /// JSON body for failures reported before streaming starts.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: true,
            message: self.to_string(),
            status_code: self.status_code(),
            is_retryable: self.is_retryable(),
            provider: self.provider().unwrap_or("unknown").to_string(),
            context_error: matches!(self, ChatError::ContextLimit { .. }).then_some(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_a_credential_error() {
        let err = ChatError::from_llm(
            "xAI",
            LLMError::MissingApiKey {
                provider: "xAI".to_string(),
            },
        );
        assert!(matches!(err, ChatError::Credential { .. }));

        let body = err.to_body();
        assert_eq!(body.status_code, 401);
        assert!(!body.is_retryable);
        assert_eq!(body.provider, "xAI");
        assert_eq!(body.message, "Invalid or missing API key");
        assert!(body.context_error.is_none());
    }

    #[test]
    fn context_length_messages_map_to_413() {
        let err = ChatError::from_llm(
            "OpenAI",
            LLMError::Api {
                status: 400,
                message: "This model's maximum context length is 8192 tokens".to_string(),
            },
        );
        assert!(matches!(err, ChatError::ContextLimit { .. }));

        let body = err.to_body();
        assert_eq!(body.status_code, 413);
        assert!(body.is_retryable);
        assert_eq!(body.context_error, Some(true));
    }

    #[test]
    fn other_upstream_errors_keep_their_status() {
        let err = ChatError::from_llm(
            "OpenAI",
            LLMError::Api {
                status: 503,
                message: "overloaded".to_string(),
            },
        );
        assert_eq!(err.status_code(), 503);
        assert!(err.is_retryable());

        let err = ChatError::from_llm("OpenAI", LLMError::RateLimit { retry_after: Some(3) });
        assert_eq!(err.status_code(), 429);
        assert!(err.is_retryable());
    }

    #[test]
    fn segment_limit_is_fatal_500() {
        let err = ChatError::SegmentLimitExceeded {
            provider: "xAI".to_string(),
            max: 2,
        };
        assert_eq!(err.status_code(), 500);
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "Cannot continue message: Maximum segments reached"
        );
    }

    #[test]
    fn registry_errors_have_no_provider_unless_named() {
        let err = ChatError::from(RegistryError::NoProviders);
        assert_eq!(err.to_body().provider, "unknown");

        let err = ChatError::from(RegistryError::ProviderNotFound("Nope".to_string()));
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.provider(), Some("Nope"));
    }
}
