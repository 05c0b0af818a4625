//! Domain traits - Abstractions for infrastructure implementations

pub mod database;

pub use database::Database;
