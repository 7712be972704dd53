//! Provider registry and merged model catalog.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use super::cache::DynamicModelCache;
use super::catalog::{ModelInfo, merge_catalog, merge_provider_models};
use super::credentials::{CredentialContext, ProviderSetting};
use super::error::RegistryError;
use super::provider::LLMProvider;

/// Provider names treated as local backends unless configured otherwise.
pub const DEFAULT_LOCAL_PROVIDERS: &[&str] = &["ollama", "lmstudio"];

/// Which providers take part in a catalog rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ProviderFilter {
    #[default]
    All,
    Only(HashSet<String>),
}

impl ProviderFilter {
    /// Derive the filter from client provider settings.
    ///
    /// An empty settings map enables everything. Otherwise a provider is
    /// enabled unless its setting says `enabled: false`.
    pub fn from_settings<'a>(
        settings: &HashMap<String, ProviderSetting>,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        if settings.is_empty() {
            return ProviderFilter::All;
        }
        let enabled = names
            .into_iter()
            .filter(|name| settings.get(*name).is_none_or(|s| s.enabled))
            .map(str::to_string)
            .collect();
        ProviderFilter::Only(enabled)
    }

    pub fn allows(&self, name: &str) -> bool {
        match self {
            ProviderFilter::All => true,
            ProviderFilter::Only(names) => names.contains(name),
        }
    }
}

/// Registry of LLM providers, in registration order.
///
/// Built once at startup and shared by cloning. Clones share the model
/// catalog and the dynamic model cache. Registering on a clone detaches its
/// catalog, so other clones never list models they cannot resolve.
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn LLMProvider>>,
    index: HashMap<String, usize>,
    catalog: Arc<RwLock<Arc<[ModelInfo]>>>,
    cache: DynamicModelCache,
    local_providers: Arc<HashSet<String>>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            index: HashMap::new(),
            catalog: Arc::new(RwLock::new(Arc::from(Vec::<ModelInfo>::new()))),
            cache: DynamicModelCache::new(),
            local_providers: Arc::new(
                DEFAULT_LOCAL_PROVIDERS.iter().map(|s| s.to_string()).collect(),
            ),
        }
    }

    /// Replace the set of provider names treated as local backends.
    pub fn with_local_providers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.local_providers = Arc::new(
            names
                .into_iter()
                .map(|n| n.as_ref().to_lowercase())
                .collect(),
        );
        self
    }

    /// Register a provider implementation.
    ///
    /// The first registration of a name wins; later ones are ignored with a
    /// warning. Returns whether the provider was added.
    /// The catalog becomes stale until the next rebuild.
    pub fn register(&mut self, provider: Arc<dyn LLMProvider>) -> bool {
        let name = provider.name().to_string();
        if self.index.contains_key(&name) {
            warn!(provider = %name, "Provider is already registered, skipping");
            return false;
        }

        info!(provider = %name, "Registering provider");
        let mut models = self.catalog().to_vec();
        models.extend(provider.static_models().iter().cloned());
        self.catalog = Arc::new(RwLock::new(models.into()));

        self.index.insert(name, self.providers.len());
        self.providers.push(provider);
        true
    }

    /// Get a provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn LLMProvider>> {
        self.index.get(name).map(|&i| self.providers[i].clone())
    }

    /// All providers in registration order.
    pub fn providers(&self) -> &[Arc<dyn LLMProvider>] {
        &self.providers
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn cache(&self) -> &DynamicModelCache {
        &self.cache
    }

    /// Current catalog snapshot.
    pub fn catalog(&self) -> Arc<[ModelInfo]> {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Static models of every provider, in registration order.
    pub fn static_models(&self) -> Vec<ModelInfo> {
        self.providers
            .iter()
            .flat_map(|p| p.static_models().iter().cloned())
            .collect()
    }

    /// Look up a model in the current catalog.
    pub fn find_model(&self, name: &str, provider: &str) -> Option<ModelInfo> {
        self.catalog()
            .iter()
            .find(|m| m.name == name && m.provider == provider)
            .cloned()
    }

    /// Rebuild the merged catalog for a credential context.
    ///
    /// Dynamic lists come from the cache when possible. A provider whose
    /// fetch fails contributes no dynamic models; the failure is logged and
    /// never propagated.
    pub async fn rebuild_catalog(
        &self,
        credentials: &CredentialContext,
        filter: &ProviderFilter,
    ) -> Arc<[ModelInfo]> {
        let fetches = self
            .providers
            .iter()
            .filter(|p| filter.allows(p.name()))
            .filter(|p| p.supports_dynamic_models())
            .map(|p| self.dynamic_models(p.as_ref(), credentials));

        let dynamic: Vec<ModelInfo> = join_all(fetches)
            .await
            .into_iter()
            .flat_map(|models| models.to_vec())
            .collect();

        let merged = merge_catalog(
            dynamic,
            self.providers.iter().flat_map(|p| p.static_models()),
        );
        let merged: Arc<[ModelInfo]> = merged.into();
        self.replace_catalog(merged.clone());

        debug!(models = merged.len(), "Rebuilt model catalog");
        merged
    }

    /// Models of a single provider, dynamic entries winning by name.
    pub async fn models_for_provider(
        &self,
        name: &str,
        credentials: &CredentialContext,
    ) -> Result<Vec<ModelInfo>, RegistryError> {
        let provider = self
            .get(name)
            .ok_or_else(|| RegistryError::ProviderNotFound(name.to_string()))?;

        if !provider.supports_dynamic_models() {
            return Ok(provider.static_models().to_vec());
        }

        let dynamic = self.dynamic_models(provider.as_ref(), credentials).await;
        Ok(merge_provider_models(
            dynamic.to_vec(),
            provider.static_models(),
        ))
    }

    /// First configured provider, else the first registered one.
    pub fn default_provider(
        &self,
        credentials: &CredentialContext,
    ) -> Result<Arc<dyn LLMProvider>, RegistryError> {
        if let Some(provider) = self
            .providers
            .iter()
            .find(|p| self.is_configured(p.as_ref(), credentials))
        {
            info!(provider = %provider.name(), "Using configured provider as default");
            return Ok(provider.clone());
        }

        let first = self.providers.first().ok_or(RegistryError::NoProviders)?;
        warn!(
            provider = %first.name(),
            "No configured providers found, falling back to first registered"
        );
        Ok(first.clone())
    }

    /// All configured providers, in registration order.
    pub fn configured_providers(&self, credentials: &CredentialContext) -> Vec<Arc<dyn LLMProvider>> {
        self.providers
            .iter()
            .filter(|p| self.is_configured(p.as_ref(), credentials))
            .cloned()
            .collect()
    }

    /// Whether a provider can be used with these credentials.
    ///
    /// Errors during the check count as unconfigured.
    pub fn is_configured(&self, provider: &dyn LLMProvider, credentials: &CredentialContext) -> bool {
        match self.check_configured(provider, credentials) {
            Ok(configured) => configured,
            Err(e) => {
                warn!(provider = %provider.name(), error = %e, "Failed to check provider configuration");
                false
            }
        }
    }

    fn check_configured(
        &self,
        provider: &dyn LLMProvider,
        credentials: &CredentialContext,
    ) -> Result<bool, RegistryError> {
        let name = provider.name();
        let config = provider.config();

        let Some(token_key) = config.api_token_key.as_deref() else {
            if !self.local_providers.contains(&name.to_lowercase()) {
                return Ok(true);
            }

            // Local backends are only actionable when they expose a model.
            let registered = self
                .get(name)
                .ok_or_else(|| RegistryError::ProviderNotFound(name.to_string()))?;
            let has_static = !registered.static_models().is_empty();
            let has_cached = self
                .cache
                .get(name, &credentials.fingerprint(name, config))
                .is_some_and(|models| !models.is_empty());

            if !has_static && !has_cached {
                warn!(provider = %name, "Local provider has no available models, considering it unconfigured");
            }
            return Ok(has_static || has_cached);
        };

        if credentials.user_api_key(name).is_some() {
            return Ok(true);
        }
        Ok(credentials.env(token_key).is_some())
    }

    async fn dynamic_models(
        &self,
        provider: &dyn LLMProvider,
        credentials: &CredentialContext,
    ) -> Arc<[ModelInfo]> {
        let name = provider.name();
        let fingerprint = credentials.fingerprint(name, provider.config());

        if let Some(cached) = self.cache.get(name, &fingerprint) {
            debug!(provider = %name, count = cached.len(), "Using cached dynamic models");
            return cached;
        }

        let resolved = credentials.resolve(name, provider.config());
        match provider.fetch_dynamic_models(&resolved).await {
            Ok(models) => {
                info!(provider = %name, count = models.len(), "Caching dynamic models");
                let models: Arc<[ModelInfo]> = models.into();
                self.cache.insert(name, fingerprint, models.clone());
                models
            }
            Err(e) => {
                error!(provider = %name, error = %e, "Failed to fetch dynamic models");
                Arc::from(Vec::<ModelInfo>::new())
            }
        }
    }

    fn replace_catalog(&self, models: Arc<[ModelInfo]>) {
        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = models;
    }
}
