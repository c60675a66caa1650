//! SQLite database client implementation.
//!
//! Provides the `SqliteClient` struct that implements the `DatabaseClient`
//! trait for SQLite databases using sqlx.

use crate::db::{
    Column, ColumnInfo, DatabaseClient, ForeignKey, QueryResult, Row, Schema, Table, Value,
};
use crate::error::{AskError, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column as SqlxColumn, Executor, Row as SqlxRow, TypeInfo, ValueRef};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// Query timeout in seconds.
const QUERY_TIMEOUT_SECS: u64 = 30;

/// Maximum rows to return from a query.
const MAX_ROWS: usize = 1000;

/// Rows per table included in the schema description.
const SAMPLE_ROWS_PER_TABLE: usize = 3;

/// SQLite database client.
#[derive(Debug, Clone)]
pub struct SqliteClient {
    pool: SqlitePool,
}

impl SqliteClient {
    /// Opens a database from a `sqlite:` URL or a plain file path.
    pub async fn connect(url: &str, read_only: bool) -> Result<Self> {
        let options = if url.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(url)
                .map_err(|e| AskError::connection(format!("Invalid database URL '{url}': {e}")))?
        } else {
            SqliteConnectOptions::new().filename(Path::new(url))
        };
        let options = options
            .read_only(read_only)
            .create_if_missing(!read_only);

        // One connection keeps `sqlite::memory:` databases alive and shared.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| map_connection_error(e, url))?;

        debug!(url, read_only, "Opened SQLite database");
        Ok(Self { pool })
    }

    /// Creates a client from an existing connection pool.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Runs a multi-statement SQL script (used for seeding).
    ///
    /// Bypasses the read-only gate; never call this with model output.
    pub async fn execute_script(&self, script: &str) -> Result<()> {
        sqlx::raw_sql(script)
            .execute(&self.pool)
            .await
            .map_err(|e| AskError::query(format_query_error(e)))?;
        Ok(())
    }

    /// Fetches column metadata for a statement that returned no rows.
    async fn fetch_column_metadata(&self, sql: &str) -> Vec<ColumnInfo> {
        match (&self.pool).describe(sql).await {
            Ok(describe) => describe
                .columns()
                .iter()
                .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                .collect(),
            Err(e) => {
                debug!("Could not describe empty result: {}", e);
                Vec::new()
            }
        }
    }

    async fn fetch_tables(&self) -> Result<Vec<Table>> {
        let table_names: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT name
            FROM sqlite_master
            WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AskError::query(format!("Failed to fetch tables: {e}")))?;

        let mut tables = Vec::with_capacity(table_names.len());
        for name in table_names {
            let (columns, primary_key) = self.fetch_columns(&name).await?;
            let sample_rows = self.fetch_sample_rows(&name).await;
            tables.push(Table {
                name,
                columns,
                primary_key,
                sample_rows,
            });
        }

        Ok(tables)
    }

    /// Returns the columns of a table and its primary key, in key order.
    async fn fetch_columns(&self, table_name: &str) -> Result<(Vec<Column>, Vec<String>)> {
        let rows: Vec<(String, String, i64, Option<String>, i64)> = sqlx::query_as(
            r#"SELECT name, type, "notnull", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid"#,
        )
        .bind(table_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AskError::query(format!("Failed to fetch columns of {table_name}: {e}")))?;

        let mut key_parts: Vec<(i64, String)> = rows
            .iter()
            .filter(|(_, _, _, _, pk)| *pk > 0)
            .map(|(name, _, _, _, pk)| (*pk, name.clone()))
            .collect();
        key_parts.sort();

        let columns = rows
            .into_iter()
            .map(|(name, data_type, not_null, default, _)| Column {
                name,
                data_type,
                is_nullable: not_null == 0,
                default,
            })
            .collect();

        Ok((columns, key_parts.into_iter().map(|(_, name)| name).collect()))
    }

    async fn fetch_sample_rows(&self, table_name: &str) -> Vec<Vec<String>> {
        let sql = format!(
            "SELECT * FROM {} LIMIT {}",
            quote_identifier(table_name),
            SAMPLE_ROWS_PER_TABLE
        );
        match sqlx::query(&sql).fetch_all(&self.pool).await {
            Ok(rows) => rows
                .iter()
                .map(|row| {
                    convert_row(row)
                        .iter()
                        .map(Value::to_display_string)
                        .collect()
                })
                .collect(),
            Err(e) => {
                debug!("Skipping sample rows for {}: {}", table_name, e);
                Vec::new()
            }
        }
    }

    async fn fetch_foreign_keys(&self, tables: &[Table]) -> Result<Vec<ForeignKey>> {
        let mut foreign_keys = Vec::new();

        for table in tables {
            let rows: Vec<(i64, String, String, Option<String>)> = sqlx::query_as(
                r#"SELECT id, "table", "from", "to" FROM pragma_foreign_key_list(?1) ORDER BY id, seq"#,
            )
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AskError::query(format!(
                    "Failed to fetch foreign keys of {}: {e}",
                    table.name
                ))
            })?;

            let mut current: Option<(i64, ForeignKey)> = None;
            for (id, to_table, from, to) in rows {
                if current.as_ref().map(|(cid, _)| *cid) != Some(id) {
                    if let Some((_, fk)) = current.take() {
                        foreign_keys.push(fk);
                    }
                    current = Some((id, ForeignKey::new(&table.name, vec![], to_table, vec![])));
                }
                if let Some((_, fk)) = current.as_mut() {
                    let position = fk.from_columns.len();
                    // A missing target column means the referenced table's primary key.
                    let to = to.or_else(|| {
                        tables
                            .iter()
                            .find(|t| t.name.eq_ignore_ascii_case(&fk.to_table))
                            .and_then(|t| t.primary_key.get(position).cloned())
                    });
                    fk.from_columns.push(from);
                    fk.to_columns.push(to.unwrap_or_else(|| "rowid".to_string()));
                }
            }
            if let Some((_, fk)) = current {
                foreign_keys.push(fk);
            }
        }

        Ok(foreign_keys)
    }
}

#[async_trait]
impl DatabaseClient for SqliteClient {
    async fn introspect_schema(&self) -> Result<Schema> {
        let tables = self.fetch_tables().await?;
        let foreign_keys = self.fetch_foreign_keys(&tables).await?;

        Ok(Schema {
            tables,
            foreign_keys,
        })
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        let result = tokio::time::timeout(
            Duration::from_secs(QUERY_TIMEOUT_SECS),
            sqlx::query(sql).fetch_all(&self.pool),
        )
        .await
        .map_err(|_| {
            AskError::query(format!(
                "Query timed out after {QUERY_TIMEOUT_SECS} seconds"
            ))
        })?
        .map_err(|e| AskError::query(format_query_error(e)))?;

        let columns: Vec<ColumnInfo> = if let Some(first_row) = result.first() {
            first_row
                .columns()
                .iter()
                .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                .collect()
        } else {
            self.fetch_column_metadata(sql).await
        };

        let total_rows = result.len();
        let was_truncated = total_rows > MAX_ROWS;

        if was_truncated {
            warn!(
                "Query returned {} rows, truncating to {} rows",
                total_rows, MAX_ROWS
            );
        }

        let rows: Vec<Row> = result.iter().take(MAX_ROWS).map(convert_row).collect();
        let row_count = rows.len();

        Ok(QueryResult {
            columns,
            rows,
            row_count,
            total_rows: Some(total_rows),
            was_truncated,
        })
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// Converts a sqlx SqliteRow to our Row type.
fn convert_row(row: &SqliteRow) -> Row {
    (0..row.columns().len())
        .map(|i| convert_value(row, i))
        .collect()
}

/// Converts one value by its runtime storage class.
///
/// SQLite is dynamically typed, so the declared column type is not used.
fn convert_value(row: &SqliteRow, index: usize) -> Value {
    let storage = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_uppercase(),
        Err(_) => return Value::Null,
    };

    match storage.as_str() {
        "INTEGER" => row
            .try_get::<i64, _>(index)
            .map(Value::Int)
            .unwrap_or(Value::Null),
        "REAL" => row
            .try_get::<f64, _>(index)
            .map(Value::Float)
            .unwrap_or(Value::Null),
        "BLOB" => row
            .try_get::<Vec<u8>, _>(index)
            .map(Value::Bytes)
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<String, _>(index)
            .map(Value::Text)
            .unwrap_or(Value::Null),
    }
}

/// Quotes an identifier for interpolation into SQL.
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn map_connection_error(error: sqlx::Error, url: &str) -> AskError {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("unable to open database file") {
        AskError::connection(format!(
            "Cannot open database '{url}'. Check the path, or create it with --seed."
        ))
    } else if error_str.contains("file is not a database") {
        AskError::connection(format!("'{url}' is not an SQLite database."))
    } else {
        AskError::connection(error.to_string())
    }
}

/// Returns the backend's own error text (e.g. `no such column: age`).
fn format_query_error(error: sqlx::Error) -> String {
    match error.as_database_error() {
        Some(db_error) => db_error.message().to_string(),
        None => error.to_string(),
    }
}
