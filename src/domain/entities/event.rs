//! Typed manager events

use serde::Serialize;
use serde_json::Value;

/// Event raised by a module and forwarded to its manager's bus
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum ModuleSignal {
    Initialized,
    Shutdown,
    Error { message: String },
    Custom { name: String, data: Value },
}

/// Every event a manager can emit
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ManagerEvent {
    Initialized {
        manager: String,
        duration_ms: u64,
    },
    OperationComplete {
        manager: String,
        operation: String,
        duration_ms: f64,
    },
    ModuleLoaded {
        manager: String,
        module: String,
        version: String,
    },
    ModuleUnloaded {
        manager: String,
        module: String,
    },
    ModuleError {
        manager: String,
        module: String,
        error: String,
    },
    Module {
        manager: String,
        module: String,
        signal: ModuleSignal,
    },
    ConfigReloaded {
        manager: String,
    },
    Error {
        manager: String,
        origin: String,
        error: String,
    },
    Shutdown {
        manager: String,
    },
    Published {
        namespace: String,
        name: String,
        data: Value,
    },
}

/// Discriminant used for subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Initialized,
    OperationComplete,
    ModuleLoaded,
    ModuleUnloaded,
    ModuleError,
    Module,
    ConfigReloaded,
    Error,
    Shutdown,
    Published,
}

impl ManagerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ManagerEvent::Initialized { .. } => EventKind::Initialized,
            ManagerEvent::OperationComplete { .. } => EventKind::OperationComplete,
            ManagerEvent::ModuleLoaded { .. } => EventKind::ModuleLoaded,
            ManagerEvent::ModuleUnloaded { .. } => EventKind::ModuleUnloaded,
            ManagerEvent::ModuleError { .. } => EventKind::ModuleError,
            ManagerEvent::Module { .. } => EventKind::Module,
            ManagerEvent::ConfigReloaded { .. } => EventKind::ConfigReloaded,
            ManagerEvent::Error { .. } => EventKind::Error,
            ManagerEvent::Shutdown { .. } => EventKind::Shutdown,
            ManagerEvent::Published { .. } => EventKind::Published,
        }
    }
}
