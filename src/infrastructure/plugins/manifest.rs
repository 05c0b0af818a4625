//! Module manifest definition

use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::application::errors::ModuleError;

/// Contents of a module source file
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModuleManifest {
    /// Registered factory name, defaults to the file stem
    #[serde(default)]
    pub factory: Option<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub description: Option<String>,

    /// Module config, merged over the manager's `modules.<stem>` section
    #[serde(default)]
    pub config: Value,
}

fn default_enabled() -> bool {
    true
}

impl Default for ModuleManifest {
    fn default() -> Self {
        Self {
            factory: None,
            enabled: true,
            description: None,
            config: Value::Null,
        }
    }
}

impl ModuleManifest {
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ModuleError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ModuleError::Manifest { path: path.display().to_string(), reason: e.to_string() })?;

        Self::parse(&content)
            .map_err(|reason| ModuleError::Manifest { path: path.display().to_string(), reason })
    }

    /// Parse manifest text. An empty file is a manifest with every default.
    pub fn parse(content: &str) -> Result<Self, String> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| e.to_string())
    }

    pub fn factory_name<'a>(&'a self, source: &'a str) -> &'a str {
        self.factory.as_deref().unwrap_or(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_manifest_uses_defaults() {
        let manifest = ModuleManifest::parse("").unwrap();
        assert!(manifest.enabled);
        assert_eq!(manifest.factory_name("welcome"), "welcome");
    }

    #[test]
    fn test_parse_manifest() {
        let manifest = ModuleManifest::parse(
            "factory: ledger\nenabled: false\nconfig:\n  currency: coins\n  start: 100\n",
        ).unwrap();
        assert_eq!(manifest.factory_name("economy"), "ledger");
        assert!(!manifest.enabled);
        assert_eq!(manifest.config, json!({"currency": "coins", "start": 100}));
    }

    #[test]
    fn test_invalid_manifest() {
        assert!(ModuleManifest::parse("enabled: [nope").is_err());
    }
}
