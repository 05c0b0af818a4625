//! Hook registry - named, ordered extension points
//!
//! Every chain is best-effort: a failing callback is logged and reported,
//! and the remaining callbacks of the same chain still run.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use super::core::Manager;
use super::{read_lock, write_lock};
use crate::application::errors::HookError;

/// Named extension point
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HookPoint {
    BeforeInitialize,
    AfterInitialize,
    BeforeShutdown,
    AfterShutdown,
    BeforeOperation,
    AfterOperation,
    OnError,
    BeforeModuleLoad,
    AfterModuleLoad,
    BeforeConfigLoad,
    AfterConfigLoad,
    BeforeConfigSave,
    AfterConfigSave,
    Custom(String),
}

impl HookPoint {
    /// Chains every registry starts with
    pub fn builtin() -> [HookPoint; 13] {
        [
            HookPoint::BeforeInitialize,
            HookPoint::AfterInitialize,
            HookPoint::BeforeShutdown,
            HookPoint::AfterShutdown,
            HookPoint::BeforeOperation,
            HookPoint::AfterOperation,
            HookPoint::OnError,
            HookPoint::BeforeModuleLoad,
            HookPoint::AfterModuleLoad,
            HookPoint::BeforeConfigLoad,
            HookPoint::AfterConfigLoad,
            HookPoint::BeforeConfigSave,
            HookPoint::AfterConfigSave,
        ]
    }

    pub fn as_str(&self) -> &str {
        match self {
            HookPoint::BeforeInitialize => "beforeInitialize",
            HookPoint::AfterInitialize => "afterInitialize",
            HookPoint::BeforeShutdown => "beforeShutdown",
            HookPoint::AfterShutdown => "afterShutdown",
            HookPoint::BeforeOperation => "beforeOperation",
            HookPoint::AfterOperation => "afterOperation",
            HookPoint::OnError => "onError",
            HookPoint::BeforeModuleLoad => "beforeModuleLoad",
            HookPoint::AfterModuleLoad => "afterModuleLoad",
            HookPoint::BeforeConfigLoad => "beforeConfigLoad",
            HookPoint::AfterConfigLoad => "afterConfigLoad",
            HookPoint::BeforeConfigSave => "beforeConfigSave",
            HookPoint::AfterConfigSave => "afterConfigSave",
            HookPoint::Custom(name) => name,
        }
    }
}

impl From<&str> for HookPoint {
    fn from(name: &str) -> Self {
        HookPoint::builtin()
            .into_iter()
            .find(|point| point.as_str() == name)
            .unwrap_or_else(|| HookPoint::Custom(name.to_string()))
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A hook callback, invoked with the hook payload and the owning manager
#[async_trait]
pub trait Hook: Send + Sync {
    async fn call(&self, data: &Value, manager: &Manager) -> Result<(), HookError>;
}

/// Adapter turning a plain closure into a [`Hook`]
pub struct FnHook<F>(F);

#[async_trait]
impl<F> Hook for FnHook<F>
where
    F: Fn(&Value, &Manager) -> Result<(), String> + Send + Sync,
{
    async fn call(&self, data: &Value, manager: &Manager) -> Result<(), HookError> {
        (self.0)(data, manager).map_err(HookError::Callback)
    }
}

/// Wrap a synchronous closure as a hook
pub fn hook_fn<F>(f: F) -> Arc<dyn Hook>
where
    F: Fn(&Value, &Manager) -> Result<(), String> + Send + Sync + 'static,
{
    Arc::new(FnHook(f))
}

/// Handle returned by [`HookRegistry::register`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookHandle {
    point: HookPoint,
    id: Uuid,
}

impl HookHandle {
    pub fn point(&self) -> &HookPoint {
        &self.point
    }
}

pub struct HookRegistry {
    chains: RwLock<HashMap<HookPoint, Vec<(Uuid, Arc<dyn Hook>)>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        let chains = HookPoint::builtin()
            .into_iter()
            .map(|point| (point, Vec::new()))
            .collect();
        Self {
            chains: RwLock::new(chains),
        }
    }

    /// Append a callback to a chain, creating custom chains on demand
    pub fn register(&self, point: impl Into<HookPoint>, hook: Arc<dyn Hook>) -> HookHandle {
        let point = point.into();
        let id = Uuid::new_v4();
        write_lock(&self.chains)
            .entry(point.clone())
            .or_default()
            .push((id, hook));
        HookHandle { point, id }
    }

    pub fn unregister(&self, handle: &HookHandle) -> bool {
        let mut chains = write_lock(&self.chains);
        let Some(chain) = chains.get_mut(&handle.point) else {
            return false;
        };
        let before = chain.len();
        chain.retain(|(id, _)| *id != handle.id);
        before != chain.len()
    }

    /// Callbacks of a chain in registration order
    pub fn callbacks(&self, point: &HookPoint) -> Vec<Arc<dyn Hook>> {
        read_lock(&self.chains)
            .get(point)
            .map(|chain| chain.iter().map(|(_, hook)| hook.clone()).collect())
            .unwrap_or_default()
    }

    pub fn len(&self, point: &HookPoint) -> usize {
        read_lock(&self.chains).get(point).map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_registered(&self, point: &HookPoint) -> bool {
        read_lock(&self.chains).contains_key(point)
    }

    /// Chain names with their callback counts
    pub fn summary(&self) -> Vec<(String, usize)> {
        let mut summary: Vec<(String, usize)> = read_lock(&self.chains)
            .iter()
            .map(|(point, chain)| (point.to_string(), chain.len()))
            .collect();
        summary.sort();
        summary
    }

    /// Run every callback of a chain. Returns the failures, never aborts early.
    pub async fn run(&self, point: &HookPoint, data: &Value, manager: &Manager) -> Vec<HookError> {
        let callbacks = self.callbacks(point);
        let mut failures = Vec::new();

        for hook in callbacks {
            if let Err(e) = hook.call(data, manager).await {
                let reason = match e {
                    HookError::Callback(reason) => reason,
                    other => other.to_string(),
                };
                tracing::error!(manager = %manager.name(), hook = %point, error = %reason, "Hook callback failed");
                failures.push(HookError::failed(point.as_str(), reason));
            }
        }
        failures
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_chains_start_empty() {
        let registry = HookRegistry::new();
        for point in HookPoint::builtin() {
            assert!(registry.is_registered(&point));
            assert_eq!(registry.len(&point), 0);
        }
        assert!(!registry.is_registered(&HookPoint::Custom("onReward".into())));
    }

    #[test]
    fn test_names_round_trip() {
        assert_eq!(HookPoint::from("beforeOperation"), HookPoint::BeforeOperation);
        assert_eq!(HookPoint::from("onReward"), HookPoint::Custom("onReward".into()));
        assert_eq!(HookPoint::AfterConfigSave.to_string(), "afterConfigSave");
    }

    #[test]
    fn test_unregister() {
        let registry = HookRegistry::new();
        let handle = registry.register(HookPoint::OnError, hook_fn(|_, _| Ok(())));
        let other = registry.register("onReward", hook_fn(|_, _| Ok(())));
        assert_eq!(registry.len(&HookPoint::OnError), 1);
        assert!(registry.unregister(&handle));
        assert!(!registry.unregister(&handle));
        assert_eq!(registry.len(&HookPoint::OnError), 0);
        assert_eq!(other.point(), &HookPoint::Custom("onReward".into()));
    }
}
