//! Module registry - Manages loaded modules in registration order

use std::sync::{Arc, RwLock};
use crate::application::errors::ModuleError;
use crate::plugins::Module;

struct Entry {
    name: String,
    source: String,
    module: Arc<dyn Module>,
}

/// Registry for modules loaded into one manager
pub struct ModuleRegistry {
    entries: RwLock<Vec<Entry>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Register a module under its self-reported name
    pub fn register(&self, name: &str, source: &str, module: Arc<dyn Module>) -> Result<(), ModuleError> {
        let mut entries = self.entries.write()
            .map_err(|_| ModuleError::Internal("Lock poisoned".to_string()))?;

        if entries.iter().any(|e| e.name == name) {
            return Err(ModuleError::Duplicate(name.to_string()));
        }

        entries.push(Entry {
            name: name.to_string(),
            source: source.to_string(),
            module,
        });
        Ok(())
    }

    /// Get a module by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.entries.read()
            .ok()?
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.module.clone())
    }

    /// Name of the module loaded from `source`
    pub fn name_for_source(&self, source: &str) -> Option<String> {
        self.entries.read()
            .ok()?
            .iter()
            .find(|e| e.source == source)
            .map(|e| e.name.clone())
    }

    /// Source file stem of a loaded module
    pub fn source_of(&self, name: &str) -> Option<String> {
        self.entries.read()
            .ok()?
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.source.clone())
    }

    /// Module names in registration order
    pub fn names(&self) -> Vec<String> {
        self.entries.read()
            .ok()
            .map(|entries| entries.iter().map(|e| e.name.clone()).collect())
            .unwrap_or_default()
    }

    /// `(name, module)` pairs in registration order
    pub fn entries(&self) -> Vec<(String, Arc<dyn Module>)> {
        self.entries.read()
            .ok()
            .map(|entries| entries.iter().map(|e| (e.name.clone(), e.module.clone())).collect())
            .unwrap_or_default()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Remove a module, returning it
    pub fn remove(&self, name: &str) -> Option<Arc<dyn Module>> {
        let mut entries = self.entries.write().ok()?;
        let idx = entries.iter().position(|e| e.name == name)?;
        Some(entries.remove(idx).module)
    }

    pub fn len(&self) -> usize {
        self.entries.read()
            .ok()
            .map(|e| e.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl Module for Named {
        fn name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn test_registration_order_and_duplicates() {
        let registry = ModuleRegistry::new();
        registry.register("welcome", "greeter", Arc::new(Named("welcome"))).unwrap();
        registry.register("ledger", "economy", Arc::new(Named("ledger"))).unwrap();

        let err = registry.register("welcome", "other", Arc::new(Named("welcome"))).unwrap_err();
        assert!(matches!(err, ModuleError::Duplicate(name) if name == "welcome"));

        assert_eq!(registry.names(), vec!["welcome", "ledger"]);
        assert_eq!(registry.name_for_source("economy").as_deref(), Some("ledger"));
        assert_eq!(registry.source_of("welcome").as_deref(), Some("greeter"));

        assert!(registry.remove("welcome").is_some());
        assert!(registry.remove("welcome").is_none());
        assert_eq!(registry.len(), 1);
    }
}
