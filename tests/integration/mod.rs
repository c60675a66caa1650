//! Integration tests for askdb.

pub mod correction_test;
pub mod feedback_test;
pub mod sqlite_test;

use askdb::db::SqliteClient;
use askdb::engine::Assistant;
use askdb::llm::{MockLlmClient, PromptComposer};
use askdb::query::QueryExecutor;
use std::sync::Arc;

pub const SHOP_SQL: &str = include_str!("../fixtures/shop.sql");

pub const GENERATION_MARKER: &str = "You are an SQL expert";
pub const CORRECTION_MARKER: &str = "You are an SQL debugger";
pub const FEEDBACK_MARKER: &str = "refining a query based on user feedback";
pub const ANSWER_MARKER: &str = "You are a data assistant";

/// Opens a fresh in-memory shop database.
pub async fn shop_db() -> Arc<SqliteClient> {
    let client = SqliteClient::connect("sqlite::memory:", false)
        .await
        .expect("open in-memory database");
    client
        .execute_script(SHOP_SQL)
        .await
        .expect("seed shop database");
    Arc::new(client)
}

/// Builds an assistant over `db` driven by `llm`.
pub fn assistant(llm: &MockLlmClient, db: &Arc<SqliteClient>) -> Assistant {
    Assistant::new(
        Arc::new(llm.clone()),
        db.clone(),
        QueryExecutor::new(db.clone()),
        PromptComposer::default(),
    )
}
