//! Manager state and read-side API

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};

use super::context::{ManagerContext, ManagerDescriptor};
use super::events::EventBus;
use super::hooks::{Hook, HookHandle, HookPoint, HookRegistry};
use super::metrics::{Metrics, PerformanceMetrics};
use super::permissions::PermissionManager;
use super::{read_lock, write_lock};
use crate::application::errors::{ConfigError, ManagerError, ManagerResult, PermissionError};
use crate::domain::entities::ManagerEvent;
use crate::domain::traits::Database;
use crate::infrastructure::plugins::{ModuleLoader, ModuleRegistry};
use crate::plugins::Module;

/// A named, independently lifecycle-managed subsystem
pub struct Manager {
    pub(super) name: String,
    pub(super) version: String,
    pub(super) required: Vec<String>,
    pub(super) optional: Vec<String>,
    pub(super) defaults: Value,
    pub(super) context: ManagerContext,
    pub(super) this: Weak<Manager>,
    pub(super) config: RwLock<Value>,
    pub(super) hooks: HookRegistry,
    pub(super) permissions: RwLock<PermissionManager>,
    pub(super) metrics: Metrics,
    pub(super) events: Arc<EventBus>,
    pub(super) modules: ModuleRegistry,
    pub(super) loader: ModuleLoader,
    pub(super) dependencies: RwLock<Vec<(String, Arc<Manager>)>>,
    pub(super) unavailable: RwLock<Vec<String>>,
    pub(super) database: RwLock<Option<Arc<dyn Database>>>,
    pub(super) shared_bus: RwLock<Option<Arc<EventBus>>>,
    pub(super) initialized: AtomicBool,
    pub(super) initializing: AtomicBool,
    pub(super) shutting_down: AtomicBool,
}

/// Read-only snapshot returned by [`Manager::status`]
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStatus {
    pub name: String,
    pub version: String,
    pub initialized: bool,
    pub shutting_down: bool,
    pub dependencies: Vec<String>,
    pub unavailable_dependencies: Vec<String>,
    pub modules: BTreeMap<String, Value>,
    pub hooks: BTreeMap<String, usize>,
    pub operation_count: u64,
    pub error_count: u64,
    pub uptime_secs: u64,
}

impl Manager {
    /// Construct a manager from its descriptor. The manager is not initialized.
    pub fn new(descriptor: ManagerDescriptor, context: ManagerContext) -> Arc<Self> {
        let modules_dir = context.layout().modules_dir(&descriptor.name);
        let resolution = context.role_resolution();
        let setup = descriptor.setup.clone();

        let manager = Arc::new_cyclic(|this| Manager {
            loader: ModuleLoader::new(modules_dir, descriptor.modules),
            name: descriptor.name,
            version: descriptor.version,
            required: descriptor.required,
            optional: descriptor.optional,
            config: RwLock::new(descriptor.defaults.clone()),
            defaults: descriptor.defaults,
            context,
            this: this.clone(),
            hooks: HookRegistry::new(),
            permissions: RwLock::new(PermissionManager::with_default_roles(resolution)),
            metrics: Metrics::new(),
            events: Arc::new(EventBus::new()),
            modules: ModuleRegistry::new(),
            dependencies: RwLock::new(Vec::new()),
            unavailable: RwLock::new(Vec::new()),
            database: RwLock::new(None),
            shared_bus: RwLock::new(None),
            initialized: AtomicBool::new(false),
            initializing: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
        });

        if let Some(setup) = setup {
            setup(&manager);
        }
        manager
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn context(&self) -> &ManagerContext {
        &self.context
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn is_initializing(&self) -> bool {
        self.initializing.load(Ordering::SeqCst)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn required_dependencies(&self) -> &[String] {
        &self.required
    }

    pub fn optional_dependencies(&self) -> &[String] {
        &self.optional
    }

    /// A resolved dependency manager
    pub fn dependency(&self, name: &str) -> Option<Arc<Manager>> {
        read_lock(&self.dependencies)
            .iter()
            .find(|(dep, _)| dep == name)
            .map(|(_, manager)| manager.clone())
    }

    /// Optional dependencies that failed to resolve during the last initialize
    pub fn unavailable_dependencies(&self) -> Vec<String> {
        read_lock(&self.unavailable).clone()
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn register_hook(&self, point: impl Into<HookPoint>, hook: Arc<dyn Hook>) -> HookHandle {
        self.hooks.register(point, hook)
    }

    pub fn unregister_hook(&self, handle: &HookHandle) -> bool {
        self.hooks.unregister(handle)
    }

    /// Run a hook chain. Failures are logged and emitted as `Error` events.
    /// Returns the number of failed callbacks.
    pub async fn run_hook(&self, point: impl Into<HookPoint>, data: Value) -> usize {
        let point = point.into();
        let failures = self.hooks.run(&point, &data, self).await;
        for failure in &failures {
            self.emit(ManagerEvent::Error {
                manager: self.name.clone(),
                origin: format!("hook:{}", point),
                error: failure.to_string(),
            });
        }
        failures.len()
    }

    /// This manager's own event bus
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn emit(&self, event: ManagerEvent) -> usize {
        self.events.emit(&event)
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn performance_metrics(&self) -> PerformanceMetrics {
        self.metrics.snapshot()
    }

    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    pub fn module(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.modules.get(name)
    }

    pub fn module_names(&self) -> Vec<String> {
        self.modules.names()
    }

    pub fn loader(&self) -> &ModuleLoader {
        &self.loader
    }

    // ==================== Config ====================

    /// Current configuration
    pub fn config(&self) -> Value {
        read_lock(&self.config).clone()
    }

    /// Look up a config value by JSON pointer, e.g. `/pool/size`
    pub fn config_value(&self, pointer: &str) -> Option<Value> {
        read_lock(&self.config).pointer(pointer).cloned()
    }

    /// Set a config value by JSON pointer, creating intermediate objects
    pub fn set_config_value(&self, pointer: &str, value: Value) -> Result<(), ConfigError> {
        let mut config = write_lock(&self.config);
        set_pointer(&mut config, pointer, value)
    }

    pub fn defaults(&self) -> &Value {
        &self.defaults
    }

    // ==================== Permissions ====================
    //
    // Runtime changes are mirrored into the `permissions` config section so
    // `save_config` persists them and `from_config` rebuilds them on reload.

    pub fn define_role<I, S>(&self, name: &str, flags: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let flags: Vec<String> = flags.into_iter().map(|f| f.as_ref().to_string()).collect();
        write_lock(&self.permissions).define_role(name, &flags);
        self.mirror_grant(&format!("/permissions/roles/{}", pointer_segment(name)), Value::from(flags));
    }

    pub fn set_user_permissions<R, F>(&self, user_id: &str, roles: &[R], extra_flags: &[F]) -> Result<(), PermissionError>
    where
        R: AsRef<str>,
        F: AsRef<str>,
    {
        write_lock(&self.permissions).set_user_permissions(user_id, roles, extra_flags)?;

        let roles: Vec<&str> = roles.iter().map(|r| r.as_ref()).collect();
        let flags: Vec<&str> = extra_flags.iter().map(|f| f.as_ref()).collect();
        self.mirror_grant(
            &format!("/permissions/users/{}", pointer_segment(user_id)),
            serde_json::json!({ "roles": roles, "flags": flags }),
        );
        Ok(())
    }

    pub fn has_permission(&self, user_id: &str, flag: &str) -> bool {
        read_lock(&self.permissions).has_permission(user_id, flag)
    }

    pub fn has_any_permission<S: AsRef<str>>(&self, user_id: &str, flags: &[S]) -> bool {
        read_lock(&self.permissions).has_any_permission(user_id, flags)
    }

    pub fn has_all_permissions<S: AsRef<str>>(&self, user_id: &str, flags: &[S]) -> bool {
        read_lock(&self.permissions).has_all_permissions(user_id, flags)
    }

    pub fn remove_user_permissions(&self, user_id: &str) -> bool {
        if let Some(Value::Object(users)) = write_lock(&self.config).pointer_mut("/permissions/users") {
            users.remove(user_id);
        }
        write_lock(&self.permissions).remove_user(user_id)
    }

    fn mirror_grant(&self, pointer: &str, value: Value) {
        if let Err(e) = self.set_config_value(pointer, value) {
            tracing::warn!(manager = %self.name, error = %e, "Permission change not mirrored into config");
        }
    }

    /// Copy of the permission table
    pub fn permissions(&self) -> PermissionManager {
        read_lock(&self.permissions).clone()
    }

    // ==================== Service discovery ====================

    /// Resolve another manager through the shared context
    pub async fn get_manager(&self, name: &str) -> ManagerResult<Arc<Manager>> {
        self.context.get_manager(name).await
    }

    /// Database collaborator, cached after the first lookup
    pub fn get_database(&self) -> ManagerResult<Arc<dyn Database>> {
        if let Some(db) = read_lock(&self.database).clone() {
            return Ok(db);
        }

        let db = self.context.database()
            .ok_or_else(|| ManagerError::NoDatabase(self.name.clone()))?;
        *write_lock(&self.database) = Some(db.clone());
        Ok(db)
    }

    /// Shared event bus, cached after the first lookup
    pub fn get_event_bus(&self) -> Arc<EventBus> {
        if let Some(bus) = read_lock(&self.shared_bus).clone() {
            return bus;
        }

        let bus = self.context.event_bus();
        *write_lock(&self.shared_bus) = Some(bus.clone());
        bus
    }

    // ==================== Status ====================

    /// Snapshot of lifecycle state, modules and counters
    pub async fn status(&self) -> ManagerStatus {
        let mut modules = BTreeMap::new();
        for (name, module) in self.modules.entries() {
            let status = match module.status().await {
                Ok(status) => status,
                Err(e) => {
                    tracing::warn!(manager = %self.name, module = %name, error = %e, "Module status failed");
                    serde_json::json!({ "error": e.to_string() })
                }
            };
            modules.insert(name, status);
        }

        ManagerStatus {
            name: self.name.clone(),
            version: self.version.clone(),
            initialized: self.is_initialized(),
            shutting_down: self.is_shutting_down(),
            dependencies: read_lock(&self.dependencies).iter().map(|(name, _)| name.clone()).collect(),
            unavailable_dependencies: self.unavailable_dependencies(),
            modules,
            hooks: self.hooks.summary().into_iter().collect(),
            operation_count: self.metrics.operation_count(),
            error_count: self.metrics.error_count(),
            uptime_secs: self.metrics.uptime().as_secs(),
        }
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("initialized", &self.is_initialized())
            .field("modules", &self.modules.names())
            .finish_non_exhaustive()
    }
}

/// Escape a key for use as one JSON pointer segment
fn pointer_segment(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

fn set_pointer(root: &mut Value, pointer: &str, value: Value) -> Result<(), ConfigError> {
    if pointer.is_empty() {
        *root = value;
        return Ok(());
    }

    let Some(path) = pointer.strip_prefix('/') else {
        return Err(ConfigError::InvalidValue(format!("invalid pointer '{}'", pointer)));
    };
    let segments: Vec<String> = path
        .split('/')
        .map(|s| s.replace("~1", "/").replace("~0", "~"))
        .collect();
    let Some((last, parents)) = segments.split_last() else {
        return Err(ConfigError::InvalidValue(format!("invalid pointer '{}'", pointer)));
    };

    let not_object = || ConfigError::InvalidValue(format!("'{}' does not point into an object", pointer));
    let mut cursor = root;
    for segment in parents {
        if cursor.is_null() {
            *cursor = Value::Object(Map::new());
        }
        cursor = match cursor {
            Value::Object(map) => map.entry(segment.clone()).or_insert(Value::Null),
            _ => return Err(not_object()),
        };
    }

    if cursor.is_null() {
        *cursor = Value::Object(Map::new());
    }
    match cursor {
        Value::Object(map) => {
            map.insert(last.clone(), value);
            Ok(())
        }
        _ => Err(not_object()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_pointer_creates_objects() {
        let mut root = json!({"pool": {"size": 1}});
        set_pointer(&mut root, "/pool/size", json!(4)).unwrap();
        set_pointer(&mut root, "/cache/ttl/secs", json!(30)).unwrap();
        assert_eq!(root, json!({"pool": {"size": 4}, "cache": {"ttl": {"secs": 30}}}));
    }

    #[test]
    fn test_pointer_segment_round_trips_through_set_pointer() {
        let mut root = json!({});
        let pointer = format!("/users/{}", pointer_segment("team/a~b"));
        set_pointer(&mut root, &pointer, json!(1)).unwrap();
        assert_eq!(root, json!({"users": {"team/a~b": 1}}));
    }

    #[test]
    fn test_set_pointer_rejects_scalars() {
        let mut root = json!({"pool": 3});
        assert!(set_pointer(&mut root, "/pool/size", json!(1)).is_err());
        assert!(set_pointer(&mut root, "pool", json!(1)).is_err());
    }
}
