//! Configuration management

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use crate::application::errors::ConfigError;

/// Framework configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub paths: PathsConfig,
    pub database: DatabaseConfig,
    pub permissions: PermissionsConfig,
    /// Managers started by `carik run`, in order
    pub managers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PathsConfig {
    pub root: PathBuf,
    pub config: PathBuf,
    pub logs: PathBuf,
    pub data: PathBuf,
    /// Parent of the per-manager `<manager>/modules` directories
    pub modules: PathBuf,
    pub migrations: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub auto_migrate: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PermissionsConfig {
    /// Reject unknown role names instead of ignoring them
    pub strict_roles: bool,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            config: PathBuf::from("config"),
            logs: PathBuf::from("logs"),
            data: PathBuf::from("data"),
            modules: PathBuf::from("managers"),
            migrations: PathBuf::from("migrations"),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/carik.db"),
            auto_migrate: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            database: DatabaseConfig::default(),
            permissions: PermissionsConfig::default(),
            managers: vec![
                "config".to_string(),
                "database".to_string(),
                "updates".to_string(),
            ],
        }
    }
}

impl Config {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Read { path: path.display().to_string(), reason: e.to_string() })?;

        serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::Parse(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)
            .map_err(|e| ConfigError::Write { path: path.display().to_string(), reason: e.to_string() })
    }

    pub fn load_env() -> Self {
        Config::default().with_env()
    }

    /// Apply environment overrides on top of this config
    pub fn with_env(mut self) -> Self {
        if let Ok(root) = std::env::var("CARIK_ROOT") {
            self.paths.root = PathBuf::from(root);
        }

        if let Ok(db) = std::env::var("CARIK_DATABASE") {
            self.database.path = PathBuf::from(db);
        }

        if let Ok(strict) = std::env::var("CARIK_STRICT_ROLES") {
            self.permissions.strict_roles = matches!(strict.as_str(), "1" | "true" | "yes");
        }

        self
    }

    /// Resolved on-disk layout
    pub fn layout(&self) -> Layout {
        Layout::new(&self.paths)
    }

    pub fn database_path(&self) -> PathBuf {
        resolve(&self.paths.root, &self.database.path)
    }
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Absolute per-manager paths derived from [`PathsConfig`]
#[derive(Debug, Clone)]
pub struct Layout {
    config: PathBuf,
    logs: PathBuf,
    data: PathBuf,
    modules: PathBuf,
    migrations: PathBuf,
}

impl Layout {
    pub fn new(paths: &PathsConfig) -> Self {
        Self {
            config: resolve(&paths.root, &paths.config),
            logs: resolve(&paths.root, &paths.logs),
            data: resolve(&paths.root, &paths.data),
            modules: resolve(&paths.root, &paths.modules),
            migrations: resolve(&paths.root, &paths.migrations),
        }
    }

    /// Layout with every directory under `root` using default names
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        let paths = PathsConfig {
            root: root.into(),
            ..PathsConfig::default()
        };
        Self::new(&paths)
    }

    pub fn config_dir(&self, manager: &str) -> PathBuf {
        self.config.join(manager)
    }

    pub fn config_file(&self, manager: &str) -> PathBuf {
        self.config_dir(manager).join("config.json")
    }

    pub fn logs_dir(&self, manager: &str) -> PathBuf {
        self.logs.join(manager)
    }

    pub fn data_dir(&self, manager: &str) -> PathBuf {
        self.data.join(manager)
    }

    pub fn modules_dir(&self, manager: &str) -> PathBuf {
        self.modules.join(manager).join("modules")
    }

    pub fn migrations_dir(&self) -> PathBuf {
        self.migrations.clone()
    }
}

/// Recursively merge `overlay` into `base`
///
/// Objects merge key by key; any other overlay value replaces the base value.
/// A `null` overlay leaves the base untouched.
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        deep_merge(existing, value);
                    }
                    _ => {
                        if !value.is_null() {
                            base_map.insert(key.clone(), value.clone());
                        }
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// Create `path` if missing. Returns true when the directory was created.
pub async fn ensure_dir(path: impl AsRef<Path>) -> std::io::Result<bool> {
    let path = path.as_ref();
    if tokio::fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false) {
        return Ok(false);
    }
    tokio::fs::create_dir_all(path).await?;
    tracing::debug!(path = %path.display(), "Created directory");
    Ok(true)
}

/// Read a JSON document, `None` when the file does not exist
pub async fn read_json(path: impl AsRef<Path>) -> Result<Option<Value>, ConfigError> {
    let path = path.as_ref();
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(ConfigError::Read { path: path.display().to_string(), reason: e.to_string() });
        }
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))
}

/// Write a pretty-printed JSON document, creating parent directories
pub async fn write_json(path: impl AsRef<Path>, value: &Value) -> Result<(), ConfigError> {
    let path = path.as_ref();
    let write_err = |e: std::io::Error| ConfigError::Write { path: path.display().to_string(), reason: e.to_string() };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    let content = serde_json::to_string_pretty(value)
        .map_err(|e| ConfigError::Parse(e.to_string()))?;
    tokio::fs::write(path, content).await.map_err(write_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deep_merge_nested_objects() {
        let mut base = json!({"db": {"pool": 4, "path": "a.db"}, "debug": false});
        deep_merge(&mut base, &json!({"db": {"pool": 8}, "debug": true, "extra": [1, 2]}));
        assert_eq!(base, json!({"db": {"pool": 8, "path": "a.db"}, "debug": true, "extra": [1, 2]}));
    }

    #[test]
    fn test_deep_merge_replaces_arrays_and_skips_null() {
        let mut base = json!({"roles": ["a", "b"], "name": "x"});
        deep_merge(&mut base, &json!({"roles": ["c"], "name": null}));
        assert_eq!(base, json!({"roles": ["c"], "name": "x"}));
    }

    #[test]
    fn test_yaml_round_trip_uses_kebab_case() {
        let yaml = serde_yaml::to_string(&Config::default()).unwrap();
        assert!(yaml.contains("auto-migrate"));
        assert!(yaml.contains("strict-roles"));
    }

    #[test]
    fn test_layout_paths() {
        let layout = Layout::rooted("/srv/bot");
        assert_eq!(layout.config_file("database"), PathBuf::from("/srv/bot/config/database/config.json"));
        assert_eq!(layout.modules_dir("database"), PathBuf::from("/srv/bot/managers/database/modules"));
        assert_eq!(layout.logs_dir("database"), PathBuf::from("/srv/bot/logs/database"));
    }

    #[tokio::test]
    async fn test_read_json_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_json(dir.path().join("nope.json")).await.unwrap().is_none());

        let path = dir.path().join("nested/config.json");
        write_json(&path, &json!({"a": 1})).await.unwrap();
        assert_eq!(read_json(&path).await.unwrap(), Some(json!({"a": 1})));
    }
}
