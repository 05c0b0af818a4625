//! Module loader - Discovers module sources and constructs them from the registration table

use std::path::{Path, PathBuf};
use std::sync::Arc;
use crate::application::errors::ModuleError;
use crate::plugins::{Module, ModuleContext, ModuleTable};
use super::manifest::ModuleManifest;

/// Source names starting with this are internal and never loaded
pub const INTERNAL_PREFIX: char = '_';

/// Options for `Manager::load_modules`
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Unload and reconstruct modules that are already loaded
    pub reload: bool,
}

/// Outcome of one `load_modules` pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// A module source file found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleCandidate {
    pub source: String,
    pub path: PathBuf,
}

impl ModuleCandidate {
    pub fn manifest(&self) -> Result<ModuleManifest, ModuleError> {
        ModuleManifest::from_file(&self.path)
    }
}

/// Module loader bound to one manager's module directory
pub struct ModuleLoader {
    modules_dir: PathBuf,
    table: ModuleTable,
}

impl ModuleLoader {
    pub fn new(modules_dir: impl Into<PathBuf>, table: ModuleTable) -> Self {
        Self {
            modules_dir: modules_dir.into(),
            table,
        }
    }

    pub fn modules_dir(&self) -> &Path {
        &self.modules_dir
    }

    pub fn table(&self) -> &ModuleTable {
        &self.table
    }

    /// List module sources, sorted by name
    pub async fn discover(&self) -> Result<Vec<ModuleCandidate>, ModuleError> {
        let mut candidates = Vec::new();

        if !self.modules_dir.exists() {
            tracing::warn!("Module directory does not exist: {}", self.modules_dir.display());
            return Ok(candidates);
        }

        let mut entries = tokio::fs::read_dir(&self.modules_dir).await
            .map_err(|e| ModuleError::Discovery(format!("{}: {}", self.modules_dir.display(), e)))?;

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Failed to read directory entry: {}", e);
                    continue;
                }
            };

            let path = entry.path();
            if let Some(candidate) = Self::candidate_from_path(&path) {
                candidates.push(candidate);
            }
        }

        candidates.sort_by(|a, b| a.source.cmp(&b.source));
        Ok(candidates)
    }

    /// Locate the source file for one module
    pub async fn find(&self, source: &str) -> Result<Option<ModuleCandidate>, ModuleError> {
        Ok(self.discover().await?.into_iter().find(|c| c.source == source))
    }

    fn candidate_from_path(path: &Path) -> Option<ModuleCandidate> {
        if !path.is_file() {
            return None;
        }

        let extension = path.extension().and_then(|e| e.to_str())?;
        if !matches!(extension, "yaml" | "yml") {
            return None;
        }

        let source = path.file_stem().and_then(|s| s.to_str())?;
        // Skip internal and hidden sources
        if source.starts_with(INTERNAL_PREFIX) || source.starts_with('.') {
            tracing::debug!(source = %source, "Skipping internal module source");
            return None;
        }

        Some(ModuleCandidate {
            source: source.to_string(),
            path: path.to_path_buf(),
        })
    }

    /// Construct a module through its registered factory
    pub fn instantiate(&self, manifest: &ModuleManifest, context: ModuleContext) -> Result<Arc<dyn Module>, ModuleError> {
        let factory_name = manifest.factory_name(&context.source).to_string();
        let factory = self.table.get(&factory_name)
            .ok_or(ModuleError::FactoryMissing(factory_name))?;
        factory(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_discover_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["welcome.yaml", "economy.yml", "_shared.yaml", "notes.txt", ".hidden.yaml"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.yaml")).unwrap();

        let loader = ModuleLoader::new(dir.path(), ModuleTable::new());
        let sources: Vec<String> = loader.discover().await.unwrap()
            .into_iter()
            .map(|c| c.source)
            .collect();

        assert_eq!(sources, vec!["economy", "welcome"]);
        assert!(loader.find("welcome").await.unwrap().is_some());
        assert!(loader.find("_shared").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ModuleLoader::new(dir.path().join("absent"), ModuleTable::new());
        assert!(loader.discover().await.unwrap().is_empty());
    }

    #[test]
    fn test_instantiate_without_factory() {
        let loader = ModuleLoader::new("unused", ModuleTable::new());
        let ctx = ModuleContext::new("welcome", "config", serde_json::Value::Null, std::sync::Weak::new());
        let err = loader.instantiate(&ModuleManifest::default(), ctx).err().unwrap();
        assert!(matches!(err, ModuleError::FactoryMissing(name) if name == "welcome"));
    }
}
