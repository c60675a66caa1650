//! Query execution with safety classification.
//!
//! Every candidate statement is classified before it reaches the database.
//! Rejections and backend errors both come back as
//! [`ExecutionOutcome::Failure`], carrying the text the correction prompt
//! needs.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::db::{DatabaseClient, QueryResult};
use crate::error::AskError;
use crate::safety::SqlClassifier;

/// Outcome of one execution attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// The statement ran and produced rows (possibly none).
    Success(QueryResult),
    /// The statement was refused or failed; the message is shown to the model.
    Failure(String),
}

impl ExecutionOutcome {
    /// Returns true for a successful execution.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns the failure message, if any.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::Failure(message) => Some(message),
        }
    }
}

/// Query executor that classifies SQL and runs only read-only statements.
#[derive(Clone)]
pub struct QueryExecutor {
    db: Arc<dyn DatabaseClient>,
    classifier: Arc<SqlClassifier>,
}

impl QueryExecutor {
    /// Creates a new query executor over the given database.
    pub fn new(db: Arc<dyn DatabaseClient>) -> Self {
        Self {
            db,
            classifier: Arc::new(SqlClassifier::new()),
        }
    }

    /// Classifies and, if allowed, executes `sql`.
    ///
    /// Never returns an error: transport and backend problems alike become
    /// `Failure` so the correction loop can react to them.
    pub async fn run(&self, sql: &str) -> ExecutionOutcome {
        let classification = self.classifier.classify(sql);
        if let Some(reason) = classification.rejection_reason() {
            warn!(
                statement_type = %classification.statement_type,
                level = %classification.level,
                "Policy gate rejected candidate query"
            );
            return ExecutionOutcome::Failure(reason);
        }

        let start = Instant::now();
        let result = self.db.execute_query(sql).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(result) => {
                debug!(rows = result.row_count, duration_ms, "Query succeeded");
                ExecutionOutcome::Success(result)
            }
            Err(e) => {
                let message = backend_message(e);
                warn!(duration_ms, error = %message, "Query failed");
                ExecutionOutcome::Failure(message)
            }
        }
    }
}

/// Strips our own error prefix so the model sees the backend's wording.
fn backend_message(error: AskError) -> String {
    match error {
        AskError::Query(message) | AskError::Connection(message) => message,
        other => other.to_string(),
    }
}
