//! LLM providers, credentials and the merged model catalog.

pub mod anthropic;
pub mod builtin;
mod cache;
mod catalog;
mod credentials;
mod error;
pub mod openai;
mod provider;
mod registry;
mod types;

pub use builtin::{builtin_providers, register_builtin};
pub use cache::DynamicModelCache;
pub use catalog::{ModelInfo, merge_catalog, merge_provider_models};
pub use credentials::{CredentialContext, ProviderSetting, ResolvedCredentials};
pub use error::{LLMError, RegistryError};
pub use provider::{LLMProvider, ProviderConfig};
pub use registry::{DEFAULT_LOCAL_PROVIDERS, ProviderFilter, ProviderRegistry};
pub use types::{
    ChatRequest, ChatStream, FinishReason, FunctionCall, FunctionDefinition, Message, Role,
    StreamEvent, ToolCall, ToolChoice, ToolDefinition, Usage,
};
