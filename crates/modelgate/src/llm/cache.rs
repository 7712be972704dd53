//! Process-wide cache of dynamically fetched model lists.

use std::sync::Arc;

use dashmap::DashMap;

use super::catalog::ModelInfo;

/// Dynamic model lists keyed by `(provider, credential fingerprint)`.
///
/// Concurrent turns may race a read-then-write on the same key. That only
/// costs a duplicate fetch; the last writer wins.
#[derive(Clone, Default)]
pub struct DynamicModelCache {
    entries: Arc<DashMap<(String, String), Arc<[ModelInfo]>>>,
}

impl DynamicModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, provider: &str, fingerprint: &str) -> Option<Arc<[ModelInfo]>> {
        self.entries
            .get(&(provider.to_string(), fingerprint.to_string()))
            .map(|entry| entry.value().clone())
    }

    pub fn insert(&self, provider: &str, fingerprint: String, models: Arc<[ModelInfo]>) {
        self.entries
            .insert((provider.to_string(), fingerprint), models);
    }

    /// Drop every cached list for a provider.
    pub fn invalidate(&self, provider: &str) {
        self.entries.retain(|(name, _), _| name != provider);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyed_by_provider_and_fingerprint() {
        let cache = DynamicModelCache::new();
        let models: Arc<[ModelInfo]> = vec![ModelInfo::new("m", "m", "Ollama", 10)].into();
        cache.insert("Ollama", "fp1".to_string(), models);

        assert!(cache.get("Ollama", "fp1").is_some());
        assert!(cache.get("Ollama", "fp2").is_none());
        assert!(cache.get("LMStudio", "fp1").is_none());
    }

    #[test]
    fn last_writer_wins() {
        let cache = DynamicModelCache::new();
        cache.insert("A", "fp".to_string(), vec![ModelInfo::new("one", "one", "A", 1)].into());
        cache.insert("A", "fp".to_string(), vec![ModelInfo::new("two", "two", "A", 1)].into());

        let models = cache.get("A", "fp").unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].name, "two");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn invalidate_only_touches_one_provider() {
        let cache = DynamicModelCache::new();
        cache.insert("A", "fp".to_string(), Vec::<ModelInfo>::new().into());
        cache.insert("B", "fp".to_string(), Vec::<ModelInfo>::new().into());

        cache.invalidate("A");

        assert!(cache.get("A", "fp").is_none());
        assert!(cache.get("B", "fp").is_some());
    }
}
