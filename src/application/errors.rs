//! Application layer errors

use thiserror::Error;

/// Errors raised by the manager runtime
#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Manager '{manager}' failed to resolve required dependency '{dependency}': {reason}")]
    Dependency {
        manager: String,
        dependency: String,
        reason: String,
    },

    #[error("Dependency cycle detected: {0}")]
    DependencyCycle(String),

    #[error("Manager not found: {0}")]
    ManagerNotFound(String),

    #[error("Module error: {0}")]
    Module(#[from] ModuleError),

    #[error("Permission error: {0}")]
    Permission(#[from] PermissionError),

    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Manager '{0}' is not initialized")]
    NotInitialized(String),

    #[error("No database configured for manager '{0}'")]
    NoDatabase(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration load/save errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to write {path}: {reason}")]
    Write { path: String, reason: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Module load, lifecycle and status errors
#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("Module not found: {0}")]
    NotFound(String),

    #[error("Module '{0}' already loaded")]
    Duplicate(String),

    #[error("No factory registered under '{0}'")]
    FactoryMissing(String),

    #[error("Invalid module manifest {path}: {reason}")]
    Manifest { path: String, reason: String },

    #[error("Module '{module}' failed to initialize: {reason}")]
    Initialize { module: String, reason: String },

    #[error("Module '{module}' failed to shut down: {reason}")]
    Shutdown { module: String, reason: String },

    #[error("Module '{module}' status unavailable: {reason}")]
    Status { module: String, reason: String },

    #[error("Failed to read module directory: {0}")]
    Discovery(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Hook callback failures
#[derive(Error, Debug)]
pub enum HookError {
    #[error("Hook '{hook}' failed: {reason}")]
    Failed { hook: String, reason: String },

    #[error("{0}")]
    Callback(String),
}

impl HookError {
    pub fn failed(hook: impl Into<String>, reason: impl Into<String>) -> Self {
        HookError::Failed {
            hook: hook.into(),
            reason: reason.into(),
        }
    }
}

/// Permission table errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PermissionError {
    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("Invalid permission config: {0}")]
    InvalidConfig(String),
}

/// Database collaborator errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("A transaction is already active")]
    TransactionActive,

    #[error("No active transaction")]
    NoTransaction,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Schema migration errors
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Duplicate migration version {version}: {first} and {second}")]
    DuplicateVersion {
        version: i64,
        first: String,
        second: String,
    },

    #[error("Migration {0} has no file on disk")]
    MissingFile(i64),

    #[error("Migration {0} has no Down section")]
    MissingDown(i64),

    #[error("Migration {version} ({description}) failed: {source}")]
    Failed {
        version: i64,
        description: String,
        #[source]
        source: DatabaseError,
    },

    #[error("Invalid migration description: {0}")]
    InvalidDescription(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

pub type ManagerResult<T> = Result<T, ManagerError>;
