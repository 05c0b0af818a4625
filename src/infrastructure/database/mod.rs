//! SQLite implementation of the database collaborator

use async_trait::async_trait;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::application::errors::DatabaseError;
use crate::domain::traits::Database;

/// Table recording applied schema versions
pub const VERSION_TABLE: &str = "schema_migrations";

pub struct SqliteDatabase {
    conn: Mutex<Connection>,
}

impl SqliteDatabase {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DatabaseError::Internal(format!("Failed to create {}: {}", parent.display(), e)))?;
            }
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, DatabaseError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock()
            .map_err(|_| DatabaseError::Internal("Lock poisoned".to_string()))
    }
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else {
                SqlValue::Real(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => SqlValue::Text(s.clone()),
        // Nested values are stored as their JSON text
        other => SqlValue::Text(other.to_string()),
    }
}

fn from_sql_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Array(b.iter().map(|byte| Value::from(*byte)).collect()),
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<usize, DatabaseError> {
        let conn = self.lock()?;
        let rows = conn.execute(sql, params_from_iter(params.iter().map(to_sql_value)))?;
        Ok(rows)
    }

    async fn execute_batch(&self, sql: &str) -> Result<(), DatabaseError> {
        let conn = self.lock()?;
        conn.execute_batch(sql)?;
        Ok(())
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Value>, DatabaseError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let mut rows = stmt.query(params_from_iter(params.iter().map(to_sql_value)))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut object = Map::with_capacity(columns.len());
            for (idx, column) in columns.iter().enumerate() {
                object.insert(column.clone(), from_sql_ref(row.get_ref(idx)?));
            }
            out.push(Value::Object(object));
        }
        Ok(out)
    }

    async fn begin_transaction(&self) -> Result<(), DatabaseError> {
        let conn = self.lock()?;
        if !conn.is_autocommit() {
            return Err(DatabaseError::TransactionActive);
        }
        conn.execute_batch("BEGIN")?;
        Ok(())
    }

    async fn commit(&self) -> Result<(), DatabaseError> {
        let conn = self.lock()?;
        if conn.is_autocommit() {
            return Err(DatabaseError::NoTransaction);
        }
        conn.execute_batch("COMMIT")?;
        Ok(())
    }

    async fn rollback(&self) -> Result<(), DatabaseError> {
        let conn = self.lock()?;
        if conn.is_autocommit() {
            return Err(DatabaseError::NoTransaction);
        }
        conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.conn.lock()
            .map(|conn| !conn.is_autocommit())
            .unwrap_or(false)
    }

    async fn get_version(&self) -> Result<i64, DatabaseError> {
        let conn = self.lock()?;
        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [VERSION_TABLE],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Ok(0);
        }

        let version: i64 = conn.query_row(
            &format!("SELECT COALESCE(MAX(version), 0) FROM {}", VERSION_TABLE),
            [],
            |row| row.get(0),
        )?;
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_query_returns_json_rows() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        db.execute_batch("CREATE TABLE balances (user_id TEXT, amount INTEGER, note TEXT)").await.unwrap();
        db.execute(
            "INSERT INTO balances (user_id, amount, note) VALUES (?1, ?2, ?3)",
            &[json!("42"), json!(150), Value::Null],
        ).await.unwrap();

        let rows = db.query("SELECT user_id, amount, note FROM balances", &[]).await.unwrap();
        assert_eq!(rows, vec![json!({"user_id": "42", "amount": 150, "note": null})]);
    }

    #[tokio::test]
    async fn test_transaction_rollback_discards_writes() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        db.execute_batch("CREATE TABLE t (v INTEGER)").await.unwrap();

        db.begin_transaction().await.unwrap();
        assert!(db.in_transaction());
        db.execute("INSERT INTO t (v) VALUES (1)", &[]).await.unwrap();
        db.rollback().await.unwrap();
        assert!(!db.in_transaction());

        let rows = db.query("SELECT COUNT(*) AS n FROM t", &[]).await.unwrap();
        assert_eq!(rows[0]["n"], json!(0));
    }

    #[tokio::test]
    async fn test_transaction_state_errors() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        assert!(matches!(db.commit().await, Err(DatabaseError::NoTransaction)));

        db.begin_transaction().await.unwrap();
        assert!(matches!(db.begin_transaction().await, Err(DatabaseError::TransactionActive)));
        db.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_version_is_zero_without_table() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        assert_eq!(db.get_version().await.unwrap(), 0);
    }
}
