//! Model catalog types

use crate::conversation::ModelSelection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A model offered by a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    /// Model identifier, e.g. `gpt-4`
    pub name: String,
    /// User-facing name; falls back to `name` when empty
    #[serde(default)]
    pub display_name: String,
}

impl ModelInfo {
    /// Create a new ModelInfo instance
    ///
    /// # Examples
    ///
    /// ```
    /// use chatloom::transport::ModelInfo;
    ///
    /// let model = ModelInfo::new("gpt-4", "GPT-4");
    /// assert_eq!(model.label(), "GPT-4");
    /// assert_eq!(ModelInfo::new("llama3", "").label(), "llama3");
    /// ```
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
        }
    }

    /// Name to show in model pickers
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }
}

/// Models available per provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelCatalog {
    providers: BTreeMap<String, Vec<ModelInfo>>,
}

impl ModelCatalog {
    /// Creates an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a model under `provider`, ignoring duplicates
    pub fn add(&mut self, provider: impl Into<String>, model: ModelInfo) {
        let models = self.providers.entry(provider.into()).or_default();
        if !models.iter().any(|m| m.name == model.name) {
            models.push(model);
        }
    }

    /// Builder form of [`ModelCatalog::add`]
    pub fn with_model(mut self, provider: impl Into<String>, model: ModelInfo) -> Self {
        self.add(provider, model);
        self
    }

    /// Provider names in sorted order
    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    /// Models of one provider
    pub fn models(&self, provider: &str) -> &[ModelInfo] {
        self.providers
            .get(provider)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns true when the catalog offers `selection`
    ///
    /// Agent selections are not listed in the catalog and always pass.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatloom::conversation::ModelSelection;
    /// use chatloom::transport::{ModelCatalog, ModelInfo};
    ///
    /// let catalog = ModelCatalog::new().with_model("openai", ModelInfo::new("gpt-4", "GPT-4"));
    /// assert!(catalog.contains(&ModelSelection::provider("openai", "gpt-4")));
    /// assert!(!catalog.contains(&ModelSelection::provider("openai", "gpt-5")));
    /// assert!(catalog.contains(&ModelSelection::agent("agent-1")));
    /// ```
    pub fn contains(&self, selection: &ModelSelection) -> bool {
        match selection {
            ModelSelection::Provider { provider, model } => {
                self.models(provider).iter().any(|m| &m.name == model)
            }
            ModelSelection::Agent { .. } => true,
        }
    }

    /// Returns true when no provider lists a model
    pub fn is_empty(&self) -> bool {
        self.providers.values().all(Vec::is_empty)
    }
}
