//! Domain entities - Core objects with no infrastructure dependencies

pub mod event;
pub mod migration;
pub mod permission;

pub use event::{EventKind, ManagerEvent, ModuleSignal};
pub use migration::{AppliedMigration, Migration, MigrationStatus, PendingMigration};
pub use permission::PermissionLevel;
