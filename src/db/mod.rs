//! Database abstraction layer for askdb.
//!
//! Provides a trait-based interface for database operations so the engine
//! can run against SQLite or a scripted test double.

mod mock;
mod schema;
mod sqlite;
mod types;

pub use mock::MockDatabaseClient;
pub use schema::{Column, ForeignKey, Schema, Table};
pub use sqlite::SqliteClient;
pub use types::{ColumnInfo, QueryResult, Row, Value, MAX_RESULT_ROWS_IN_PROMPT};

use crate::error::{AskError, Result};
use async_trait::async_trait;
use tracing::info;

/// Opens the SQLite database at `url`.
///
/// `read_only` opens the file without write access; pass `false` only when
/// the database has to be created or seeded.
pub async fn connect(url: &str, read_only: bool) -> Result<SqliteClient> {
    SqliteClient::connect(url, read_only).await
}

/// Runs a setup `script` against the database file at `url`, then reopens it read-only.
///
/// The writable connection is closed before the returned client is opened,
/// so generated queries never see write access. An in-memory database would
/// not survive that reconnect and is refused.
pub async fn seed(url: &str, script: &str) -> Result<SqliteClient> {
    if is_in_memory(url) {
        return Err(AskError::config(
            "Cannot seed an in-memory database: it would be lost when reopened read-only. Use a file path.",
        ));
    }

    let writable = connect(url, false).await?;
    writable.execute_script(script).await?;
    writable.close().await?;
    info!(url, "Seeded database; reopening read-only");

    connect(url, true).await
}

fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// Trait defining the interface for database clients.
///
/// All database operations are async and return Results with AskError.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Introspects the database schema, returning table and relationship information.
    async fn introspect_schema(&self) -> Result<Schema>;

    /// Executes a SQL query and returns the results.
    async fn execute_query(&self, sql: &str) -> Result<QueryResult>;

    /// Closes the database connection.
    async fn close(&self) -> Result<()>;
}

/// Supplies the schema text embedded in prompts.
///
/// Every call reads the live schema; nothing is cached between calls.
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    async fn schema_text(&self) -> Result<String>;
}

#[async_trait]
impl<T: DatabaseClient + ?Sized> SchemaProvider for T {
    async fn schema_text(&self) -> Result<String> {
        Ok(self.introspect_schema().await?.format_for_llm())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_urls() {
        assert!(is_in_memory("sqlite::memory:"));
        assert!(is_in_memory(":memory:"));
        assert!(is_in_memory("sqlite://shop?mode=memory&cache=shared"));
        assert!(!is_in_memory("sqlite://data/test_db.sqlite"));
        assert!(!is_in_memory("shop.sqlite"));
    }

    #[tokio::test]
    async fn test_seed_refuses_in_memory_database() {
        let err = seed("sqlite::memory:", "CREATE TABLE t (id INTEGER);")
            .await
            .unwrap_err();
        assert!(matches!(err, AskError::Config(_)));
    }
}
