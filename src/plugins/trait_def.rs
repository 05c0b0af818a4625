//! Module trait definitions

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Weak};

use crate::application::errors::ModuleError;
use crate::application::manager::{EventBus, Manager};
use crate::domain::entities::{ManagerEvent, ModuleSignal};

/// Core trait that all modules implement
///
/// Every lifecycle method has a no-op default.
#[async_trait]
pub trait Module: Send + Sync {
    /// Name the module is registered under. Need not match its source file.
    fn name(&self) -> &str;

    fn version(&self) -> &str {
        "0.1.0"
    }

    async fn initialize(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    async fn status(&self) -> Result<Value, ModuleError> {
        Ok(json!({
            "name": self.name(),
            "version": self.version(),
        }))
    }

    /// Called once after registration with an emitter bound to this module
    fn register_event_listeners(&self, _emitter: ModuleEmitter) {}
}

/// Everything a factory gets when constructing a module
#[derive(Clone)]
pub struct ModuleContext {
    /// Source file stem the module was loaded from
    pub source: String,
    pub manager_name: String,
    /// Manager `modules.<source>` config merged with the manifest config
    pub config: Value,
    manager: Weak<Manager>,
}

impl ModuleContext {
    pub fn new(source: impl Into<String>, manager_name: impl Into<String>, config: Value, manager: Weak<Manager>) -> Self {
        Self {
            source: source.into(),
            manager_name: manager_name.into(),
            config,
            manager,
        }
    }

    /// Owning manager, if it is still alive
    pub fn manager(&self) -> Option<Arc<Manager>> {
        self.manager.upgrade()
    }
}

/// Forwards module events onto the owning manager's bus, tagged with the module name
#[derive(Clone)]
pub struct ModuleEmitter {
    manager: String,
    module: String,
    bus: Arc<EventBus>,
}

impl ModuleEmitter {
    pub fn new(manager: impl Into<String>, module: impl Into<String>, bus: Arc<EventBus>) -> Self {
        Self {
            manager: manager.into(),
            module: module.into(),
            bus,
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn emit(&self, signal: ModuleSignal) -> usize {
        self.bus.emit(&ManagerEvent::Module {
            manager: self.manager.clone(),
            module: self.module.clone(),
            signal,
        })
    }

    pub fn error(&self, message: impl Into<String>) -> usize {
        self.emit(ModuleSignal::Error { message: message.into() })
    }

    pub fn custom(&self, name: impl Into<String>, data: Value) -> usize {
        self.emit(ModuleSignal::Custom { name: name.into(), data })
    }
}
