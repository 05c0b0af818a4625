//! Explicit dependency-injection context
//!
//! Managers never look each other up through global state. Every manager
//! holds a [`ManagerContext`] and resolves dependencies through it.

use futures::future::{BoxFuture, FutureExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use super::core::Manager;
use super::events::EventBus;
use super::permissions::RoleResolution;
use super::{read_lock, write_lock};
use crate::application::errors::{ManagerError, ManagerResult, ModuleError};
use crate::domain::traits::Database;
use crate::infrastructure::config::Layout;
use crate::plugins::{Module, ModuleContext, ModuleTable};

/// Runs once right after a manager is constructed, before `initialize`
pub type SetupFn = Arc<dyn Fn(&Manager) + Send + Sync>;

/// Everything needed to construct a manager
#[derive(Clone)]
pub struct ManagerDescriptor {
    pub name: String,
    pub version: String,
    pub required: Vec<String>,
    pub optional: Vec<String>,
    pub defaults: Value,
    pub modules: ModuleTable,
    pub(super) setup: Option<SetupFn>,
}

impl ManagerDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: "0.1.0".to_string(),
            required: Vec::new(),
            optional: Vec::new(),
            defaults: json!({}),
            modules: ModuleTable::new(),
            setup: None,
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Add a required dependency; failure to resolve it fails `initialize`
    pub fn requires(mut self, manager: impl Into<String>) -> Self {
        self.required.push(manager.into());
        self
    }

    /// Add an optional dependency; failure to resolve it only warns
    pub fn prefers(mut self, manager: impl Into<String>) -> Self {
        self.optional.push(manager.into());
        self
    }

    pub fn with_defaults(mut self, defaults: Value) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_modules(mut self, modules: ModuleTable) -> Self {
        self.modules = modules;
        self
    }

    pub fn with_module<F>(mut self, factory: impl Into<String>, f: F) -> Self
    where
        F: Fn(ModuleContext) -> Result<Arc<dyn Module>, ModuleError> + Send + Sync + 'static,
    {
        self.modules.register(factory, f);
        self
    }

    /// Register hooks or other wiring on every freshly constructed instance
    pub fn on_setup<F>(mut self, f: F) -> Self
    where
        F: Fn(&Manager) + Send + Sync + 'static,
    {
        self.setup = Some(Arc::new(f));
        self
    }
}

struct ContextInner {
    layout: Layout,
    role_resolution: RoleResolution,
    descriptors: RwLock<HashMap<String, ManagerDescriptor>>,
    instances: RwLock<Vec<Arc<Manager>>>,
    database: RwLock<Option<Arc<dyn Database>>>,
    event_bus: Arc<EventBus>,
}

/// Builder for [`ManagerContext`]
pub struct ContextBuilder {
    layout: Layout,
    role_resolution: RoleResolution,
    database: Option<Arc<dyn Database>>,
    descriptors: Vec<ManagerDescriptor>,
}

impl ContextBuilder {
    pub fn role_resolution(mut self, resolution: RoleResolution) -> Self {
        self.role_resolution = resolution;
        self
    }

    pub fn database(mut self, database: Arc<dyn Database>) -> Self {
        self.database = Some(database);
        self
    }

    pub fn register(mut self, descriptor: ManagerDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn register_all(mut self, descriptors: impl IntoIterator<Item = ManagerDescriptor>) -> Self {
        self.descriptors.extend(descriptors);
        self
    }

    pub fn build(self) -> ManagerContext {
        let descriptors = self.descriptors
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();

        ManagerContext {
            inner: Arc::new(ContextInner {
                layout: self.layout,
                role_resolution: self.role_resolution,
                descriptors: RwLock::new(descriptors),
                instances: RwLock::new(Vec::new()),
                database: RwLock::new(self.database),
                event_bus: Arc::new(EventBus::new()),
            }),
        }
    }
}

/// Shared handle to registered manager descriptors, live managers and collaborators
#[derive(Clone)]
pub struct ManagerContext {
    inner: Arc<ContextInner>,
}

impl ManagerContext {
    pub fn builder(layout: Layout) -> ContextBuilder {
        ContextBuilder {
            layout,
            role_resolution: RoleResolution::default(),
            database: None,
            descriptors: Vec::new(),
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.inner.layout
    }

    pub fn role_resolution(&self) -> RoleResolution {
        self.inner.role_resolution
    }

    pub fn database(&self) -> Option<Arc<dyn Database>> {
        read_lock(&self.inner.database).clone()
    }

    pub fn set_database(&self, database: Arc<dyn Database>) {
        *write_lock(&self.inner.database) = Some(database);
    }

    /// Process-wide bus shared by every manager of this context
    pub fn event_bus(&self) -> Arc<EventBus> {
        self.inner.event_bus.clone()
    }

    /// Register a descriptor. Returns true if it replaced an existing one.
    pub fn register(&self, descriptor: ManagerDescriptor) -> bool {
        write_lock(&self.inner.descriptors)
            .insert(descriptor.name.clone(), descriptor)
            .is_some()
    }

    pub fn descriptor(&self, name: &str) -> Option<ManagerDescriptor> {
        read_lock(&self.inner.descriptors).get(name).cloned()
    }

    pub fn descriptor_names(&self) -> Vec<String> {
        let mut names: Vec<String> = read_lock(&self.inner.descriptors).keys().cloned().collect();
        names.sort();
        names
    }

    /// Construct a manager without initializing or caching it
    pub fn construct(&self, name: &str) -> ManagerResult<Arc<Manager>> {
        let descriptor = self.descriptor(name)
            .ok_or_else(|| ManagerError::ManagerNotFound(name.to_string()))?;
        Ok(Manager::new(descriptor, self.clone()))
    }

    pub fn cached(&self, name: &str) -> Option<Arc<Manager>> {
        read_lock(&self.inner.instances)
            .iter()
            .find(|m| m.name() == name)
            .cloned()
    }

    /// Cached managers in the order they were first resolved
    pub fn managers(&self) -> Vec<Arc<Manager>> {
        read_lock(&self.inner.instances).clone()
    }

    /// Cached instance, or construct + initialize + cache
    pub fn get_manager(&self, name: &str) -> BoxFuture<'static, ManagerResult<Arc<Manager>>> {
        self.resolve(name.to_string(), Vec::new())
    }

    /// `chain` lists the managers whose initialization led to this lookup
    pub(crate) fn resolve(&self, name: String, chain: Vec<String>) -> BoxFuture<'static, ManagerResult<Arc<Manager>>> {
        let context = self.clone();
        async move {
            if chain.contains(&name) {
                let mut cycle = chain.clone();
                cycle.push(name);
                return Err(ManagerError::DependencyCycle(cycle.join(" -> ")));
            }

            if let Some(manager) = context.cached(&name) {
                if !manager.is_initialized() && !manager.is_shutting_down() {
                    debug!(manager = %name, "Re-initializing cached manager");
                    manager.initialize_in_chain(None, chain).await?;
                }
                return Ok(manager);
            }

            let manager = context.construct(&name)?;
            if !manager.is_initialized() {
                manager.initialize_in_chain(None, chain).await?;
            }
            Ok(context.adopt(manager).await)
        }
        .boxed()
    }

    // Lookups are not single-flight; the first instance cached wins
    async fn adopt(&self, manager: Arc<Manager>) -> Arc<Manager> {
        let winner = {
            let mut instances = write_lock(&self.inner.instances);
            match instances.iter().find(|m| m.name() == manager.name()) {
                Some(existing) => Some(existing.clone()),
                None => {
                    instances.push(manager.clone());
                    None
                }
            }
        };

        match winner {
            Some(existing) => {
                warn!(manager = %manager.name(), "Manager was constructed twice, discarding the duplicate");
                if let Err(e) = manager.discard().await {
                    warn!(manager = %manager.name(), error = %e, "Failed to discard duplicate manager");
                }
                existing
            }
            None => manager,
        }
    }

    /// Shut down every cached manager, most recently resolved first
    pub async fn shutdown_all(&self) {
        let managers = self.managers();
        for manager in managers.iter().rev() {
            if let Err(e) = manager.shutdown().await {
                warn!(manager = %manager.name(), error = %e, "Manager shutdown failed");
            }
        }
        info!(count = managers.len(), "All managers shut down");
    }
}
