//! carik-core - manager orchestration runtime for the carik bot
//!
//! Every functional area of the bot is a [`Manager`]: a named subsystem with
//! its own config, hooks, permissions, metrics and hot-reloadable modules,
//! resolved through an explicit [`ManagerContext`].

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod plugins;

pub use application::errors::{ManagerError, ManagerResult};
pub use application::manager::{
    hook_fn, EventBus, Hook, HookPoint, Manager, ManagerContext, ManagerDescriptor, ManagerStatus,
    PermissionManager, RoleResolution,
};
pub use application::migrations::MigrationEngine;
pub use domain::entities::{EventKind, ManagerEvent, ModuleSignal, PermissionLevel};
pub use domain::traits::Database;
pub use infrastructure::config::{Config, Layout};
pub use infrastructure::database::SqliteDatabase;
pub use plugins::{Module, ModuleContext, ModuleEmitter, ModuleTable};
