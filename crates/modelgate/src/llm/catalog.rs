//! Model metadata and catalog merging.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// A model offered by one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    /// Unique within its provider.
    pub name: String,
    pub label: String,
    pub provider: String,
    /// Hard ceiling for the model's context.
    pub max_token_allowed: u32,
}

impl ModelInfo {
    pub fn new(
        name: impl Into<String>,
        label: impl Into<String>,
        provider: impl Into<String>,
        max_token_allowed: u32,
    ) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            provider: provider.into(),
            max_token_allowed: max_token_allowed.max(1),
        }
    }
}

/// Merge dynamic and static models across providers.
///
/// A static entry is dropped when a dynamic entry with the same
/// `(name, provider)` exists. The result is sorted by name.
pub fn merge_catalog<'a>(
    dynamic: Vec<ModelInfo>,
    static_models: impl IntoIterator<Item = &'a ModelInfo>,
) -> Vec<ModelInfo> {
    let dynamic_keys: HashSet<(&str, &str)> = dynamic
        .iter()
        .map(|m| (m.name.as_str(), m.provider.as_str()))
        .collect();
    let statics: Vec<ModelInfo> = static_models
        .into_iter()
        .filter(|m| !dynamic_keys.contains(&(m.name.as_str(), m.provider.as_str())))
        .cloned()
        .collect();

    let mut merged = dynamic;
    merged.extend(statics);
    merged.sort_by(|a, b| a.name.cmp(&b.name));
    merged
}

/// Merge one provider's dynamic and static models, deduplicating by name only.
pub fn merge_provider_models(dynamic: Vec<ModelInfo>, static_models: &[ModelInfo]) -> Vec<ModelInfo> {
    let dynamic_names: HashSet<&str> = dynamic.iter().map(|m| m.name.as_str()).collect();
    let statics: Vec<ModelInfo> = static_models
        .iter()
        .filter(|m| !dynamic_names.contains(m.name.as_str()))
        .cloned()
        .collect();

    let mut merged = dynamic;
    merged.extend(statics);
    merged.sort_by(|a, b| a.name.cmp(&b.name));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(name: &str, provider: &str, max: u32) -> ModelInfo {
        ModelInfo::new(name, name, provider, max)
    }

    #[test]
    fn dynamic_entry_replaces_static_duplicate() {
        let statics = vec![model("gpt-4o", "OpenAI", 8000), model("gpt-4o-mini", "OpenAI", 8000)];
        let dynamic = vec![model("gpt-4o", "OpenAI", 128000)];

        let merged = merge_catalog(dynamic, &statics);

        assert_eq!(merged.len(), 2);
        let gpt4o: Vec<_> = merged.iter().filter(|m| m.name == "gpt-4o").collect();
        assert_eq!(gpt4o.len(), 1);
        assert_eq!(gpt4o[0].max_token_allowed, 128000);
    }

    #[test]
    fn same_name_different_provider_is_kept() {
        let statics = vec![model("llama3", "Ollama", 8000)];
        let dynamic = vec![model("llama3", "LMStudio", 8000)];

        let merged = merge_catalog(dynamic, &statics);

        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn result_is_sorted_case_respecting() {
        let statics = vec![model("b", "X", 1), model("B", "X", 1), model("a", "X", 1)];

        let merged = merge_catalog(Vec::new(), &statics);
        let names: Vec<&str> = merged.iter().map(|m| m.name.as_str()).collect();

        assert_eq!(names, vec!["B", "a", "b"]);
    }

    #[test]
    fn provider_merge_dedups_by_name() {
        let statics = vec![model("m1", "A", 10), model("m2", "A", 10)];
        let dynamic = vec![model("m2", "A", 99), model("m0", "A", 5)];

        let merged = merge_provider_models(dynamic, &statics);
        let names: Vec<&str> = merged.iter().map(|m| m.name.as_str()).collect();

        assert_eq!(names, vec!["m0", "m1", "m2"]);
        assert_eq!(merged[2].max_token_allowed, 99);
    }

    #[test]
    fn zero_token_ceiling_is_clamped() {
        assert_eq!(model("x", "A", 0).max_token_allowed, 1);
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(model("grok-beta", "xAI", 8000)).unwrap();
        assert_eq!(json["maxTokenAllowed"], 8000);
        assert_eq!(json["provider"], "xAI");
    }
}
