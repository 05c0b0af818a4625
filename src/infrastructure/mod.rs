//! Infrastructure layer - External concerns
//! 
//! This layer contains:
//! - Config: Framework config and the on-disk layout
//! - Database: SQLite database collaborator
//! - Logging: tracing subscriber setup
//! - Plugins: Module manifests, discovery and registry

pub mod config;
pub mod database;
pub mod logging;
pub mod plugins;
