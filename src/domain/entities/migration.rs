use serde::{Deserialize, Serialize};

/// A versioned schema change read from disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub version: i64,
    pub description: String,
    pub file_name: String,
    pub up: String,
    pub down: String,
}

impl Migration {
    pub fn has_down(&self) -> bool {
        !self.down.trim().is_empty()
    }
}

/// A row of the version table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedMigration {
    pub version: i64,
    pub description: String,
    pub applied_at: String,
}

/// A migration file not yet recorded in the version table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMigration {
    pub version: i64,
    pub description: String,
}

/// Snapshot of applied and pending migrations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationStatus {
    pub current_version: i64,
    pub applied: Vec<AppliedMigration>,
    pub pending: Vec<PendingMigration>,
}
