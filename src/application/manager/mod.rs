//! Manager orchestration runtime
//! 
//! - Context: explicit registry of manager descriptors and live instances
//! - Core: manager state, config, permissions, status
//! - Lifecycle: initialize / shutdown / dependency resolution
//! - Operations: hook- and metrics-wrapped execution
//! - Modules: load / unload / reload through the module loader

pub mod context;
pub mod core;
pub mod events;
pub mod hooks;
pub mod lifecycle;
pub mod metrics;
pub mod modules;
pub mod operations;
pub mod permissions;

pub use self::context::{ContextBuilder, ManagerContext, ManagerDescriptor, SetupFn};
pub use self::core::{Manager, ManagerStatus};
pub use events::{EventBus, EventHandler, Subscription};
pub use hooks::{hook_fn, FnHook, Hook, HookHandle, HookPoint, HookRegistry};
pub use metrics::{Metrics, OperationSnapshot, PerformanceMetrics, MAX_SAMPLES};
pub use permissions::{PermissionManager, RoleResolution, ALL_PERMISSIONS, SYSTEM_USER};

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

// Guarded data stays consistent across a panicking holder, so poisoning is ignored
pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
