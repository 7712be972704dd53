//! LLM error types.

use thiserror::Error;

/// Check an HTTP response for rate-limit errors, returning `RateLimit` for 429.
pub fn check_response_error(response: &reqwest::Response) -> Option<LLMError> {
    if response.status().is_success() {
        return None;
    }
    if response.status().as_u16() == 429 {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        return Some(LLMError::RateLimit { retry_after });
    }
    None
}

/// Turn a non-success response into an error, reading the body as the message.
pub async fn error_from_response(response: reqwest::Response) -> LLMError {
    if let Some(err) = check_response_error(&response) {
        return err;
    }
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    LLMError::Api { status, message }
}

/// Errors that can occur when making LLM API calls.
#[derive(Debug, Error)]
pub enum LLMError {
    /// HTTP request failed
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// API returned an error response
    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Rate limited (429)
    #[error("rate limited (retry after {retry_after:?}s)")]
    RateLimit { retry_after: Option<u64> },

    /// No API key could be resolved for a provider that needs one
    #[error("Missing API key for {provider} provider")]
    MissingApiKey { provider: String },

    /// Base URL could not be turned into an endpoint
    #[error("invalid base url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Backend sent an error event mid-stream
    #[error("stream error: {0}")]
    Stream(String),

    /// Capability not offered by this provider
    #[error("{0} is not supported by this provider")]
    Unsupported(&'static str),
}

/// Errors raised by the provider registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no providers registered")]
    NoProviders,

    #[error("provider {0} not found")]
    ProviderNotFound(String),
}
