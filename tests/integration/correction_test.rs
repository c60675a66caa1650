//! Correction loop against a real SQLite database.

use super::{assistant, shop_db, ANSWER_MARKER, CORRECTION_MARKER, GENERATION_MARKER};
use askdb::db::DatabaseClient;
use askdb::engine::{CorrectionLoop, Termination};
use askdb::error::EXHAUSTED_MESSAGE;
use askdb::llm::{MockLlmClient, PromptComposer};
use askdb::query::{ExecutionOutcome, QueryExecutor};
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[tokio::test]
async fn test_how_many_users_scenario() {
    let llm = MockLlmClient::new();
    let db = shop_db().await;

    let answer = assistant(&llm, &db).ask("How many users exist?").await.unwrap();

    let query = answer.query.clone().unwrap();
    assert!(query.contains("users"));
    assert!(answer.text.contains('3'), "answer was: {}", answer.text);
    assert_eq!(answer.attempts.len(), 1);
    assert_eq!(llm.calls_with_system(CORRECTION_MARKER), 0);
    assert_eq!(llm.calls_with_system(ANSWER_MARKER), 1);
}

#[tokio::test]
async fn test_missing_column_is_corrected_with_exact_error() {
    let llm = MockLlmClient::new()
        .then_reply("```sql\nSELECT name, age FROM users\n```")
        .then_reply("SELECT name FROM users")
        .then_reply("Ion Popescu, Maria Ionescu and Andrei Radu.");
    let db = shop_db().await;

    let answer = assistant(&llm, &db)
        .ask("List users and their age")
        .await
        .unwrap();

    assert_eq!(answer.query.as_deref(), Some("SELECT name FROM users"));
    assert_eq!(answer.attempts.len(), 2);
    assert_eq!(
        answer.attempts[0].outcome,
        ExecutionOutcome::Failure("no such column: age".to_string())
    );

    let calls = llm.calls();
    let correction_system = &calls[1][0].content;
    assert!(correction_system.starts_with(CORRECTION_MARKER));
    assert!(correction_system.contains("SELECT name, age FROM users"));
    assert!(correction_system.contains("caused the error:\nno such column: age\n"));
    assert!(correction_system.contains("Table: users"));
}

#[tokio::test]
async fn test_terminates_within_three_attempts() {
    let llm = MockLlmClient::new()
        .then_reply("SELECT nope FROM users")
        .then_reply("SELECT still_nope FROM users")
        .then_reply("SELECT never FROM users")
        .then_reply("SELECT name FROM users");
    let db = shop_db().await;

    let answer = assistant(&llm, &db).ask("Anything").await.unwrap();

    assert_eq!(answer.text, EXHAUSTED_MESSAGE);
    assert_eq!(answer.query, None);
    assert_eq!(answer.attempts.len(), 3);
    assert_eq!(llm.calls_with_system(GENERATION_MARKER), 1);
    assert_eq!(llm.calls_with_system(CORRECTION_MARKER), 2);
    assert_eq!(llm.calls_with_system(ANSWER_MARKER), 0);
}

#[tokio::test]
async fn test_write_statements_never_reach_database() {
    let llm = MockLlmClient::new()
        .then_reply("DELETE FROM users WHERE id = 1")
        .then_reply("DROP TABLE users")
        .then_reply("SELECT COUNT(*) FROM users; DELETE FROM users");
    let db = shop_db().await;

    let answer = assistant(&llm, &db).ask("Delete user 1").await.unwrap();

    assert!(answer.is_exhausted());
    for attempt in &answer.attempts {
        let error = attempt.outcome.error_message().unwrap();
        assert!(error.contains("read-only"), "unexpected error: {error}");
    }

    let count = db.execute_query("SELECT COUNT(*) FROM users").await.unwrap();
    assert_eq!(count.rows[0][0].to_display_string(), "3");
}

#[tokio::test]
async fn test_schema_is_read_fresh_for_each_question() {
    let llm = MockLlmClient::new()
        .then_reply("SELECT COUNT(*) FROM users")
        .then_reply("SELECT name FROM customers");
    let db = shop_db().await;
    let correction = CorrectionLoop::new(
        Arc::new(llm.clone()),
        db.clone(),
        QueryExecutor::new(db.clone()),
        Arc::new(PromptComposer::default()),
    );

    correction.run_from_question("How many users?").await.unwrap();
    db.execute_script("CREATE TABLE customers (name TEXT)")
        .await
        .unwrap();
    let termination = correction.run_from_question("Customers?").await.unwrap();

    assert!(matches!(termination, Termination::Succeeded(_)));
    let calls = llm.calls();
    assert!(!calls[0][0].content.contains("Table: customers"));
    assert!(calls[1][0].content.contains("Table: customers"));
}
