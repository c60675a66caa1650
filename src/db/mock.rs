//! Mock database client for testing.
//!
//! Returns queued outcomes in order and records every executed statement and
//! schema fetch, so tests can check what the engine asked the database to do.

use super::{ColumnInfo, DatabaseClient, QueryResult, Schema, Value};
use crate::error::{AskError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A mock database client that returns scripted results.
#[derive(Debug, Clone, Default)]
pub struct MockDatabaseClient {
    schema: Schema,
    outcomes: Arc<Mutex<VecDeque<std::result::Result<QueryResult, String>>>>,
    executed: Arc<Mutex<Vec<String>>>,
    schema_fetches: Arc<AtomicUsize>,
}

impl MockDatabaseClient {
    /// Creates a new mock database client with an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new mock database client with the given schema.
    pub fn with_schema(schema: Schema) -> Self {
        Self {
            schema,
            ..Self::default()
        }
    }

    /// Queues a successful result for the next execution.
    pub fn then_return(self, result: QueryResult) -> Self {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.push_back(Ok(result));
        }
        self
    }

    /// Queues a backend error for the next execution.
    pub fn then_error(self, message: impl Into<String>) -> Self {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.push_back(Err(message.into()));
        }
        self
    }

    /// Returns every statement executed so far, oldest first.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Returns how many times the schema was introspected.
    pub fn schema_fetches(&self) -> usize {
        self.schema_fetches.load(Ordering::SeqCst)
    }

    /// Result returned once the queue is empty: one row echoing the statement.
    fn fallback_result(sql: &str) -> QueryResult {
        QueryResult::with_data(
            vec![ColumnInfo::new("result", "TEXT")],
            vec![vec![Value::Text(format!("Mock result for: {}", sql))]],
        )
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn introspect_schema(&self) -> Result<Schema> {
        self.schema_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.schema.clone())
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(sql.to_string());
        }

        let next = self.outcomes.lock().ok().and_then(|mut o| o.pop_front());
        match next {
            Some(Ok(result)) => Ok(result),
            Some(Err(message)) => Err(AskError::query(message)),
            None => Ok(Self::fallback_result(sql)),
        }
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
