//! `database` manager and its `health` module

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

use crate::application::errors::ModuleError;
use crate::application::manager::ManagerDescriptor;
use crate::infrastructure::config::Config;
use crate::plugins::{Module, ModuleContext, ModuleEmitter};

pub fn database_descriptor(config: &Config) -> ManagerDescriptor {
    ManagerDescriptor::new("database")
        .version(env!("CARGO_PKG_VERSION"))
        .requires("config")
        .prefers("cache")
        .with_defaults(json!({
            "path": config.database_path().display().to_string(),
        }))
        .with_module("health", |ctx| Ok(Arc::new(HealthModule::new(ctx)) as Arc<dyn Module>))
}

/// Reports database reachability and schema version
pub struct HealthModule {
    context: ModuleContext,
    slow_ms: f64,
}

impl HealthModule {
    pub fn new(context: ModuleContext) -> Self {
        let slow_ms = context.config["slow_ms"].as_f64().unwrap_or(250.0);
        Self { context, slow_ms }
    }

    fn unavailable(&self, reason: impl ToString) -> ModuleError {
        ModuleError::Status {
            module: self.name().to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl Module for HealthModule {
    fn name(&self) -> &str {
        "health"
    }

    async fn initialize(&self) -> Result<(), ModuleError> {
        tracing::debug!(manager = %self.context.manager_name, slow_ms = self.slow_ms, "Health module ready");
        Ok(())
    }

    async fn status(&self) -> Result<Value, ModuleError> {
        let manager = self.context.manager().ok_or_else(|| self.unavailable("manager dropped"))?;
        let db = manager.get_database().map_err(|e| self.unavailable(e))?;

        let started = Instant::now();
        db.query("SELECT 1 AS ok", &[]).await.map_err(|e| self.unavailable(e))?;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        let schema_version = db.get_version().await.map_err(|e| self.unavailable(e))?;

        Ok(json!({
            "name": self.name(),
            "reachable": true,
            "slow": latency_ms > self.slow_ms,
            "latency_ms": latency_ms,
            "schema_version": schema_version,
        }))
    }

    fn register_event_listeners(&self, emitter: ModuleEmitter) {
        emitter.custom("health.ready", json!({ "slow_ms": self.slow_ms }));
    }
}
