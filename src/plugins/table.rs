//! Registration table mapping factory names to module constructors

use std::collections::BTreeMap;
use std::sync::Arc;

use super::trait_def::{Module, ModuleContext};
use crate::application::errors::ModuleError;

pub type ModuleFactory = Arc<dyn Fn(ModuleContext) -> Result<Arc<dyn Module>, ModuleError> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ModuleTable {
    factories: BTreeMap<String, ModuleFactory>,
}

impl ModuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor. A later registration under the same name replaces it.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(ModuleContext) -> Result<Arc<dyn Module>, ModuleError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Builder form of [`register`](Self::register)
    pub fn with<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(ModuleContext) -> Result<Arc<dyn Module>, ModuleError> + Send + Sync + 'static,
    {
        self.register(name, factory);
        self
    }

    pub fn get(&self, name: &str) -> Option<ModuleFactory> {
        self.factories.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
