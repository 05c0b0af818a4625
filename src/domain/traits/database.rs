use async_trait::async_trait;
use serde_json::Value;
use crate::application::errors::DatabaseError;

/// Database trait - the storage collaborator managers and migrations talk to
///
/// Implementations serialize their own internal access. At most one
/// transaction is open at a time.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run a single statement, returning the number of affected rows
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<usize, DatabaseError>;

    /// Run several `;`-separated statements without parameters
    async fn execute_batch(&self, sql: &str) -> Result<(), DatabaseError>;

    /// Run a query, returning each row as a JSON object keyed by column name
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Value>, DatabaseError>;

    async fn begin_transaction(&self) -> Result<(), DatabaseError>;

    async fn commit(&self) -> Result<(), DatabaseError>;

    async fn rollback(&self) -> Result<(), DatabaseError>;

    fn in_transaction(&self) -> bool;

    /// Highest applied schema version, 0 when nothing has been migrated
    async fn get_version(&self) -> Result<i64, DatabaseError>;
}
