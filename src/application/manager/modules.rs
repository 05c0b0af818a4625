//! Module loading, unloading and hot reload

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::core::Manager;
use super::hooks::HookPoint;
use crate::application::errors::{ManagerError, ManagerResult, ModuleError};
use crate::domain::entities::{ManagerEvent, ModuleSignal};
use crate::infrastructure::config::deep_merge;
use crate::infrastructure::plugins::{LoadOptions, LoadReport, ModuleCandidate};
use crate::plugins::{ModuleContext, ModuleEmitter};

impl Manager {
    /// Discover module sources and load each one.
    ///
    /// A module that fails to load is reported and skipped; the pass continues.
    pub async fn load_modules(&self, options: LoadOptions) -> ManagerResult<LoadReport> {
        let mut report = LoadReport::default();

        for candidate in self.loader.discover().await? {
            if let Some(loaded) = self.modules.name_for_source(&candidate.source) {
                if !options.reload {
                    debug!(manager = %self.name, module = %loaded, "Module already loaded, skipping");
                    report.skipped.push(loaded);
                    continue;
                }
                self.unload_module(&loaded).await;
            }

            match self.load_candidate(&candidate).await {
                Ok(Some(name)) => report.loaded.push(name),
                Ok(None) => report.skipped.push(candidate.source.clone()),
                Err(e) => {
                    self.module_failed(&candidate.source, &e);
                    report.failed.push((candidate.source.clone(), e.to_string()));
                }
            }
        }

        Ok(report)
    }

    /// Load one source. `Ok(None)` when its manifest is disabled.
    async fn load_candidate(&self, candidate: &ModuleCandidate) -> Result<Option<String>, ModuleError> {
        let source = candidate.source.as_str();
        let manifest = candidate.manifest()?;
        if !manifest.enabled {
            debug!(manager = %self.name, module = %source, "Module disabled");
            return Ok(None);
        }

        self.run_hook(HookPoint::BeforeModuleLoad, json!({
            "module": source,
            "path": candidate.path.display().to_string(),
        }))
        .await;

        let mut config = self.config_value(&format!("/modules/{}", source)).unwrap_or_else(|| json!({}));
        deep_merge(&mut config, &manifest.config);

        let context = ModuleContext::new(source, self.name.clone(), config, self.this.clone());
        let module = self.loader.instantiate(&manifest, context)?;
        let name = module.name().to_string();
        module.initialize().await.map_err(|e| initialize_failed(&name, e))?;

        self.run_hook(HookPoint::AfterModuleLoad, json!({
            "module": name,
            "source": source,
        }))
        .await;

        if let Err(e) = self.modules.register(&name, source, module.clone()) {
            if let Err(shutdown_err) = module.shutdown().await.map_err(|e| shutdown_failed(&name, e)) {
                warn!(manager = %self.name, module = %name, error = %shutdown_err, "Failed to shut down rejected module");
            }
            return Err(e);
        }

        let emitter = ModuleEmitter::new(self.name.clone(), name.clone(), self.events.clone());
        module.register_event_listeners(emitter.clone());
        emitter.emit(ModuleSignal::Initialized);

        info!(manager = %self.name, module = %name, version = %module.version(), "Module loaded");
        self.emit(ManagerEvent::ModuleLoaded {
            manager: self.name.clone(),
            module: name.clone(),
            version: module.version().to_string(),
        });
        Ok(Some(name))
    }

    fn module_failed(&self, module: &str, error: &ModuleError) {
        tracing::error!(manager = %self.name, module = %module, error = %error, "Failed to load module");
        self.emit(ManagerEvent::ModuleError {
            manager: self.name.clone(),
            module: module.to_string(),
            error: error.to_string(),
        });
    }

    /// Shut a module down and remove it from the registry.
    ///
    /// Returns false if it was not loaded or its shutdown failed. It is
    /// removed either way.
    pub async fn unload_module(&self, name: &str) -> bool {
        let Some(module) = self.modules.get(name) else {
            warn!(manager = %self.name, module = %name, "Module not loaded");
            return false;
        };

        let clean = match module.shutdown().await.map_err(|e| shutdown_failed(name, e)) {
            Ok(()) => true,
            Err(e) => {
                warn!(manager = %self.name, module = %name, error = %e, "Module shutdown failed");
                false
            }
        };

        self.modules.remove(name);
        ModuleEmitter::new(self.name.clone(), name, self.events.clone()).emit(ModuleSignal::Shutdown);
        self.emit(ManagerEvent::ModuleUnloaded {
            manager: self.name.clone(),
            module: name.to_string(),
        });
        debug!(manager = %self.name, module = %name, "Module unloaded");
        clean
    }

    /// Unload a module and reconstruct it from its source
    pub async fn reload_module(&self, name: &str) -> ManagerResult<()> {
        if !self.is_initialized() {
            return Err(ManagerError::NotInitialized(self.name.clone()));
        }
        let source = self.modules
            .source_of(name)
            .ok_or_else(|| ModuleError::NotFound(name.to_string()))?;

        self.unload_module(name).await;

        let candidate = self.loader
            .find(&source)
            .await?
            .ok_or_else(|| ModuleError::NotFound(source.clone()))?;

        match self.load_candidate(&candidate).await {
            Ok(loaded) => {
                info!(manager = %self.name, module = %name, reloaded = loaded.is_some(), "Module reloaded");
                Ok(())
            }
            Err(e) => {
                self.module_failed(&source, &e);
                Err(e.into())
            }
        }
    }

    /// Status of one loaded module
    pub async fn module_status(&self, name: &str) -> ManagerResult<Value> {
        let module = self.modules
            .get(name)
            .ok_or_else(|| ModuleError::NotFound(name.to_string()))?;
        Ok(module.status().await?)
    }
}

fn initialize_failed(module: &str, error: ModuleError) -> ModuleError {
    match error {
        ModuleError::Initialize { .. } => error,
        other => ModuleError::Initialize {
            module: module.to_string(),
            reason: other.to_string(),
        },
    }
}

fn shutdown_failed(module: &str, error: ModuleError) -> ModuleError {
    match error {
        ModuleError::Shutdown { .. } => error,
        other => ModuleError::Shutdown {
            module: module.to_string(),
            reason: other.to_string(),
        },
    }
}
