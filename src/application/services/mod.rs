//! Built-in managers
//!
//! - config: shared bot settings
//! - database: owns the database collaborator, optional `health` module
//! - updates: schema migrations, auto-applied after initialize

pub mod database;
pub mod updates;

use serde_json::json;
use std::sync::Arc;

use crate::application::errors::ManagerResult;
use crate::application::manager::{ManagerContext, ManagerDescriptor, RoleResolution};
use crate::domain::traits::Database;
use crate::infrastructure::config::Config;
use crate::infrastructure::database::SqliteDatabase;

pub use database::{database_descriptor, HealthModule};
pub use updates::{
    create_migration, migration_status, rollback_migrations, run_migrations, updates_descriptor, AutoMigrate,
};

/// Descriptor of the `config` manager
pub fn config_descriptor() -> ManagerDescriptor {
    ManagerDescriptor::new("config")
        .version(env!("CARGO_PKG_VERSION"))
        .with_defaults(json!({
            "locale": "en",
            "timezone": "UTC",
            "command_prefix": "!",
        }))
}

/// Every built-in manager descriptor
pub fn builtin_descriptors(config: &Config) -> Vec<ManagerDescriptor> {
    vec![
        config_descriptor(),
        database_descriptor(config),
        updates_descriptor(config),
    ]
}

pub fn role_resolution(config: &Config) -> RoleResolution {
    if config.permissions.strict_roles {
        RoleResolution::Strict
    } else {
        RoleResolution::Lenient
    }
}

/// Context wired from the framework config: SQLite database plus the built-in managers
pub fn build_context(config: &Config) -> ManagerResult<ManagerContext> {
    let database: Arc<dyn Database> = Arc::new(SqliteDatabase::open(config.database_path())?);

    Ok(ManagerContext::builder(config.layout())
        .role_resolution(role_resolution(config))
        .database(database)
        .register_all(builtin_descriptors(config))
        .build())
}
