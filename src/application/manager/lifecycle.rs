//! Initialize / shutdown and config persistence

use futures::future::{BoxFuture, FutureExt};
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::core::Manager;
use super::hooks::HookPoint;
use super::permissions::PermissionManager;
use super::{read_lock, write_lock};
use crate::application::errors::{ManagerError, ManagerResult};
use crate::domain::entities::ManagerEvent;
use crate::infrastructure::config::{deep_merge, ensure_dir, read_json, write_json};
use crate::infrastructure::plugins::LoadOptions;

impl Manager {
    /// Bring the manager up. A call while initialized or initializing is a no-op.
    pub async fn initialize(&self, config: Option<Value>) -> ManagerResult<()> {
        self.initialize_in_chain(config, Vec::new()).await
    }

    pub(crate) async fn initialize_in_chain(&self, config: Option<Value>, chain: Vec<String>) -> ManagerResult<()> {
        if self.is_initialized() {
            warn!(manager = %self.name, "Manager already initialized");
            return Ok(());
        }
        if self.initializing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!(manager = %self.name, "Manager initialization already in progress");
            return Ok(());
        }

        let started = Instant::now();
        let result = self.run_initialize(config, chain).await;

        match result {
            Ok(()) => {
                // Set before clearing `initializing` so no caller sees neither flag
                self.initialized.store(true, Ordering::SeqCst);
                self.initializing.store(false, Ordering::SeqCst);
                self.metrics.mark_started();
                let duration_ms = started.elapsed().as_millis() as u64;
                info!(manager = %self.name, duration_ms, "Manager initialized");
                self.emit(ManagerEvent::Initialized {
                    manager: self.name.clone(),
                    duration_ms,
                });
                Ok(())
            }
            Err(e) => {
                self.initializing.store(false, Ordering::SeqCst);
                tracing::error!(manager = %self.name, error = %e, "Manager initialization failed");
                Err(e)
            }
        }
    }

    async fn run_initialize(&self, config: Option<Value>, mut chain: Vec<String>) -> ManagerResult<()> {
        self.run_hook(HookPoint::BeforeInitialize, json!({ "manager": self.name })).await;

        self.load_config(config.as_ref()).await?;
        self.rebuild_permissions()?;
        self.ensure_directories().await?;

        chain.push(self.name.clone());
        self.resolve_dependencies(&chain).await?;

        let report = self.load_modules(LoadOptions::default()).await?;
        debug!(
            manager = %self.name,
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            "Modules loaded"
        );

        self.run_hook(HookPoint::AfterInitialize, json!({ "manager": self.name })).await;
        Ok(())
    }

    /// defaults <- persisted file <- supplied config
    async fn load_config(&self, supplied: Option<&Value>) -> ManagerResult<()> {
        let path = self.context.layout().config_file(&self.name);
        self.run_hook(HookPoint::BeforeConfigLoad, json!({ "path": path.display().to_string() })).await;

        let mut merged = self.defaults.clone();
        if let Some(persisted) = read_json(&path).await? {
            deep_merge(&mut merged, &persisted);
        }
        if let Some(supplied) = supplied {
            deep_merge(&mut merged, supplied);
        }
        *write_lock(&self.config) = merged.clone();

        self.run_hook(HookPoint::AfterConfigLoad, json!({ "config": merged })).await;
        Ok(())
    }

    fn rebuild_permissions(&self) -> ManagerResult<()> {
        let section = self.config_value("/permissions").unwrap_or(Value::Null);
        let permissions = PermissionManager::from_config(&section, self.context.role_resolution())?;
        *write_lock(&self.permissions) = permissions;
        Ok(())
    }

    async fn ensure_directories(&self) -> ManagerResult<()> {
        let layout = self.context.layout();
        for dir in [
            layout.logs_dir(&self.name),
            layout.data_dir(&self.name),
            layout.config_dir(&self.name),
            layout.modules_dir(&self.name),
        ] {
            ensure_dir(&dir).await?;
        }
        Ok(())
    }

    async fn resolve_dependencies(&self, chain: &[String]) -> ManagerResult<()> {
        let mut resolved = Vec::new();
        let mut unavailable = Vec::new();

        for dependency in &self.required {
            let manager = self.context
                .resolve(dependency.clone(), chain.to_vec())
                .await
                .map_err(|e| ManagerError::Dependency {
                    manager: self.name.clone(),
                    dependency: dependency.clone(),
                    reason: e.to_string(),
                })?;
            resolved.push((dependency.clone(), manager));
        }

        for dependency in &self.optional {
            match self.context.resolve(dependency.clone(), chain.to_vec()).await {
                Ok(manager) => resolved.push((dependency.clone(), manager)),
                Err(e) => {
                    warn!(
                        manager = %self.name,
                        dependency = %dependency,
                        error = %e,
                        "Optional dependency unavailable: {}", dependency
                    );
                    unavailable.push(dependency.clone());
                }
            }
        }

        *write_lock(&self.dependencies) = resolved;
        *write_lock(&self.unavailable) = unavailable;
        Ok(())
    }

    /// Tear the manager down, cascading to its dependencies
    pub fn shutdown(&self) -> BoxFuture<'_, ManagerResult<()>> {
        self.shutdown_with(true).boxed()
    }

    /// Tear down this manager only, leaving its dependencies running
    pub async fn discard(&self) -> ManagerResult<()> {
        self.shutdown_with(false).await
    }

    async fn shutdown_with(&self, cascade: bool) -> ManagerResult<()> {
        if !self.is_initialized() {
            warn!(manager = %self.name, "Shutdown requested for a manager that is not initialized");
            return Ok(());
        }
        if self.shutting_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(manager = %self.name, "Shutdown already in progress");
            return Ok(());
        }

        info!(manager = %self.name, "Shutting down manager");
        self.run_hook(HookPoint::BeforeShutdown, json!({ "manager": self.name })).await;

        if let Err(e) = self.save_config().await {
            warn!(manager = %self.name, error = %e, "Failed to persist config during shutdown");
        }

        for name in self.modules.names() {
            self.unload_module(&name).await;
        }

        if cascade {
            let dependencies: Vec<_> = read_lock(&self.dependencies)
                .iter()
                .map(|(_, manager)| manager.clone())
                .collect();
            for dependency in dependencies {
                if dependency.is_shutting_down() {
                    continue;
                }
                if let Err(e) = dependency.shutdown().await {
                    warn!(manager = %self.name, dependency = %dependency.name(), error = %e, "Dependency shutdown failed");
                }
            }
        }
        write_lock(&self.dependencies).clear();

        self.run_hook(HookPoint::AfterShutdown, json!({ "manager": self.name })).await;
        self.emit(ManagerEvent::Shutdown { manager: self.name.clone() });

        self.initialized.store(false, Ordering::SeqCst);
        self.shutting_down.store(false, Ordering::SeqCst);
        info!(manager = %self.name, "Manager shut down");
        Ok(())
    }

    /// Persist the current config to `config/<name>/config.json`
    pub async fn save_config(&self) -> ManagerResult<()> {
        let path = self.context.layout().config_file(&self.name);
        let config = self.config();
        self.run_hook(HookPoint::BeforeConfigSave, json!({ "path": path.display().to_string(), "config": config })).await;

        write_json(&path, &config).await?;
        debug!(manager = %self.name, path = %path.display(), "Config saved");

        self.run_hook(HookPoint::AfterConfigSave, json!({ "path": path.display().to_string() })).await;
        Ok(())
    }

    /// Re-read the persisted config over the defaults and rebuild permissions.
    ///
    /// Unsaved changes are dropped, including roles and grants made at runtime.
    /// Those are written into the `permissions` config section, so a
    /// `save_config` beforehand keeps them.
    pub async fn reload_config(&self) -> ManagerResult<()> {
        if !self.is_initialized() {
            return Err(ManagerError::NotInitialized(self.name.clone()));
        }
        self.load_config(None).await?;
        self.rebuild_permissions()?;
        info!(manager = %self.name, "Config reloaded");
        self.emit(ManagerEvent::ConfigReloaded { manager: self.name.clone() });
        Ok(())
    }
}
