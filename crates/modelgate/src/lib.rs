//! Modelgate - a streaming chat gateway in front of interchangeable LLM backends.

// ============================================================================
// Always Available
// ============================================================================

pub mod chat;
pub mod config;
pub mod llm;
pub mod sse_parser;
pub mod wire;

// ============================================================================
// Server-only (behind `server` feature)
// ============================================================================

#[cfg(feature = "server")]
pub mod handlers;
#[cfg(feature = "server")]
pub mod response;
#[cfg(feature = "server")]
pub mod server;

use std::collections::HashMap;

use crate::config::ProvidersConfig;
use crate::llm::{ProviderRegistry, register_builtin};

/// Build the registry of built-in providers for a configuration.
pub fn build_registry(config: &ProvidersConfig, client: &reqwest::Client) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new().with_local_providers(&config.local);
    register_builtin(&mut registry, client, &config.disabled);
    registry
}

/// Snapshot of the process environment, used as the fallback credential source.
pub fn env_snapshot() -> HashMap<String, String> {
    std::env::vars().collect()
}
