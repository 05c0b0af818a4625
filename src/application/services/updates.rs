//! `updates` manager: schema migrations run through the manager's operation pipeline

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

use crate::application::errors::{HookError, ManagerError};
use crate::application::manager::{Hook, HookPoint, Manager, ManagerDescriptor};
use crate::application::migrations::MigrationEngine;
use crate::domain::entities::MigrationStatus;
use crate::infrastructure::config::Config;

pub fn updates_descriptor(config: &Config) -> ManagerDescriptor {
    let auto_migrate = config.database.auto_migrate;

    ManagerDescriptor::new("updates")
        .version(env!("CARGO_PKG_VERSION"))
        .requires("database")
        .with_defaults(json!({ "auto_migrate": true }))
        .on_setup(move |manager| {
            manager.register_hook(HookPoint::AfterInitialize, Arc::new(AutoMigrate { enabled: auto_migrate }));
        })
}

/// Applies pending migrations once the manager is up.
///
/// Runs only when both the framework flag (`database.auto-migrate`) and the
/// manager's own `auto_migrate` config value are on.
pub struct AutoMigrate {
    pub enabled: bool,
}

#[async_trait]
impl Hook for AutoMigrate {
    async fn call(&self, _data: &Value, manager: &Manager) -> Result<(), HookError> {
        let configured = manager.config_value("/auto_migrate").and_then(|v| v.as_bool()).unwrap_or(true);
        if !self.enabled || !configured {
            tracing::debug!(manager = %manager.name(), "Auto-migrate disabled");
            return Ok(());
        }

        let applied = run_migrations(manager, None)
            .await
            .map_err(|e| HookError::Callback(e.to_string()))?;
        if !applied.is_empty() {
            tracing::info!(manager = %manager.name(), count = applied.len(), "Auto-migrate applied migrations");
        }
        Ok(())
    }
}

fn engine(manager: &Manager) -> Result<MigrationEngine, ManagerError> {
    let db = manager.get_database()?;
    Ok(MigrationEngine::new(db, manager.context().layout().migrations_dir()))
}

/// Apply pending migrations up to `target`
pub async fn run_migrations(manager: &Manager, target: Option<i64>) -> Result<Vec<i64>, ManagerError> {
    let engine = engine(manager)?;
    manager
        .execute_operation("migrate", json!({ "target": target }), |_| async move {
            engine.migrate(target).await
        })
        .await
        .map_err(ManagerError::from)
}

/// Roll back the `steps` most recent migrations
pub async fn rollback_migrations(manager: &Manager, steps: usize) -> Result<Vec<i64>, ManagerError> {
    let engine = engine(manager)?;
    manager
        .execute_operation("rollback", json!({ "steps": steps }), |_| async move {
            engine.rollback(steps).await
        })
        .await
        .map_err(ManagerError::from)
}

pub async fn migration_status(manager: &Manager) -> Result<MigrationStatus, ManagerError> {
    let engine = engine(manager)?;
    manager
        .execute_operation("migration_status", Value::Null, |_| async move {
            engine.status().await
        })
        .await
        .map_err(ManagerError::from)
}

/// Scaffold the next migration file in the manager's migrations directory
pub async fn create_migration(manager: &Manager, description: &str) -> Result<PathBuf, ManagerError> {
    let engine = engine(manager)?;
    let description = description.to_string();
    manager
        .execute_operation("migration_create", json!({ "description": description }), |_| async move {
            engine.create(&description).await
        })
        .await
        .map_err(ManagerError::from)
}
