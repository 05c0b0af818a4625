//! Application layer - Use cases and business logic
//! 
//! This layer contains:
//! - Errors: Error taxonomy for managers, modules, migrations
//! - Manager: Manager lifecycle, hooks, permissions, metrics
//! - Migrations: Versioned SQL migration engine
//! - Services: Built-in managers (config, database, updates)

pub mod errors;
pub mod manager;
pub mod migrations;
pub mod services;
