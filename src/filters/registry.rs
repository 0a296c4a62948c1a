//! Stage registry for managing available stage types.

use crate::core::stage::{Category, ProcessingStage, StageMetadata};
use indexmap::IndexMap;
use std::sync::Arc;

/// Factory function for creating stage instances.
pub type StageFactory = Arc<dyn Fn() -> Box<dyn ProcessingStage> + Send + Sync>;

/// Registry entry containing metadata and factory.
#[derive(Clone)]
pub struct RegistryEntry {
    /// Factory function to create instances.
    pub factory: StageFactory,
    /// Cached metadata (avoids creating an instance just to describe it).
    pub metadata: StageMetadata,
    /// Whether this stage can be created.
    pub enabled: bool,
    /// Tags for organization and search.
    pub tags: Vec<String>,
}

/// Registry for all available stage types.
///
/// Stages are indexed by the id in their metadata. Registering a second
/// factory under an existing id replaces the first.
pub struct StageRegistry {
    stages: IndexMap<String, RegistryEntry>,
    categories: IndexMap<Category, Vec<String>>,
}

impl StageRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            stages: IndexMap::new(),
            categories: IndexMap::new(),
        }
    }

    /// Create a registry pre-populated with the built-in stages.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::filters::builtin::register_all(&mut registry);
        registry
    }

    /// Register a stage type.
    pub fn register<F>(&mut self, factory: F)
    where
        F: Fn() -> Box<dyn ProcessingStage> + Send + Sync + 'static,
    {
        self.register_with_tags(factory, Vec::new());
    }

    /// Register a stage type with search tags.
    pub fn register_with_tags<F>(&mut self, factory: F, tags: Vec<String>)
    where
        F: Fn() -> Box<dyn ProcessingStage> + Send + Sync + 'static,
    {
        let metadata = factory().metadata();
        let id = metadata.id.clone();
        let category = metadata.category;

        if let Some(previous) = self.stages.get(&id) {
            log::debug!("Replacing registered stage '{}'", id);
            let old_category = previous.metadata.category;
            if let Some(ids) = self.categories.get_mut(&old_category) {
                ids.retain(|i| i != &id);
            }
        }

        self.stages.insert(
            id.clone(),
            RegistryEntry {
                factory: Arc::new(factory),
                metadata,
                enabled: true,
                tags,
            },
        );
        self.categories.entry(category).or_default().push(id);
    }

    /// Create a new instance of a stage by id.
    pub fn create(&self, id: &str) -> Option<Box<dyn ProcessingStage>> {
        self.stages
            .get(id)
            .filter(|e| e.enabled)
            .map(|e| (e.factory)())
    }

    /// Metadata for a stage without creating an instance.
    pub fn metadata(&self, id: &str) -> Option<&StageMetadata> {
        self.stages.get(id).map(|e| &e.metadata)
    }

    /// Get a registry entry.
    pub fn entry(&self, id: &str) -> Option<&RegistryEntry> {
        self.stages.get(id)
    }

    /// Check if a stage is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.stages.contains_key(id)
    }

    /// All registered stage ids, in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.stages.keys().map(|s| s.as_str())
    }

    /// Stage ids in a category.
    pub fn stages_by_category(&self, category: Category) -> Vec<&str> {
        self.categories
            .get(&category)
            .map(|ids| ids.iter().map(|s| s.as_str()).collect())
            .unwrap_or_default()
    }

    /// Categories with at least one registered stage.
    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories
            .iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(c, _)| c)
    }

    /// Search stages by id, name, description or tag.
    pub fn search(&self, query: &str) -> Vec<&str> {
        let query = query.to_lowercase();
        self.stages
            .iter()
            .filter(|(_, entry)| {
                entry.metadata.id.to_lowercase().contains(&query)
                    || entry.metadata.name.to_lowercase().contains(&query)
                    || entry.metadata.description.to_lowercase().contains(&query)
                    || entry.tags.iter().any(|t| t.to_lowercase().contains(&query))
            })
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Enable or disable a stage. Returns false for unknown ids.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> bool {
        match self.stages.get_mut(id) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Unregister a stage.
    pub fn unregister(&mut self, id: &str) -> bool {
        let Some(entry) = self.stages.shift_remove(id) else {
            return false;
        };
        if let Some(ids) = self.categories.get_mut(&entry.metadata.category) {
            ids.retain(|i| i != id);
        }
        true
    }

    /// Number of registered stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Enabled stages grouped by category, sorted by name.
    pub fn grouped_by_category(&self) -> IndexMap<Category, Vec<&StageMetadata>> {
        let mut grouped: IndexMap<Category, Vec<&StageMetadata>> = IndexMap::new();
        for entry in self.stages.values().filter(|e| e.enabled) {
            grouped
                .entry(entry.metadata.category)
                .or_default()
                .push(&entry.metadata);
        }
        for stages in grouped.values_mut() {
            stages.sort_by(|a, b| a.name.cmp(&b.name));
        }
        grouped
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stage::PassthroughStage;

    #[test]
    fn test_register_and_create() {
        let mut registry = StageRegistry::new();
        registry.register(|| Box::new(PassthroughStage));

        assert!(registry.contains("passthrough"));
        assert!(registry.create("passthrough").is_some());
        assert!(registry.create("missing").is_none());
    }

    #[test]
    fn test_metadata_lookup() {
        let mut registry = StageRegistry::new();
        registry.register(|| Box::new(PassthroughStage));

        let metadata = registry.metadata("passthrough").unwrap();
        assert_eq!(metadata.name, "Passthrough");
    }

    #[test]
    fn test_duplicate_registration_replaces() {
        let mut registry = StageRegistry::new();
        registry.register(|| Box::new(PassthroughStage));
        registry.register_with_tags(|| Box::new(PassthroughStage), vec!["copy".to_string()]);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.stages_by_category(Category::Utility), vec!["passthrough"]);
        assert_eq!(registry.search("copy"), vec!["passthrough"]);
    }

    #[test]
    fn test_enable_disable() {
        let mut registry = StageRegistry::new();
        registry.register(|| Box::new(PassthroughStage));

        registry.set_enabled("passthrough", false);
        assert!(registry.create("passthrough").is_none());
        assert!(registry.grouped_by_category().is_empty());

        registry.set_enabled("passthrough", true);
        assert!(registry.create("passthrough").is_some());
        assert!(!registry.set_enabled("missing", true));
    }

    #[test]
    fn test_unregister() {
        let mut registry = StageRegistry::new();
        registry.register(|| Box::new(PassthroughStage));

        assert!(registry.unregister("passthrough"));
        assert!(!registry.contains("passthrough"));
        assert_eq!(registry.categories().count(), 0);
    }

    #[test]
    fn test_builtins_cover_every_category_used() {
        let registry = StageRegistry::with_builtins();
        for id in [
            "synthetic_source",
            "shift_scale",
            "box_mean",
            "colormap",
            "texture_features",
            "file_source",
            "multi_resolution_pyramid",
        ] {
            assert!(registry.contains(id), "missing {}", id);
        }
    }
}
