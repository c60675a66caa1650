//! Feedback revision against a real SQLite database.

use super::{assistant, shop_db, CORRECTION_MARKER, FEEDBACK_MARKER};
use askdb::engine::SessionContext;
use askdb::error::AskError;
use askdb::llm::MockLlmClient;
use askdb::persistence::{FeedbackEntry, FeedbackLog};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

#[tokio::test]
async fn test_dont_sort_by_name_scenario() {
    let llm = MockLlmClient::new()
        .then_reply("SELECT name FROM users ORDER BY name")
        .then_reply("Andrei Radu, Ion Popescu and Maria Ionescu, sorted by name.")
        .then_reply("```sql\nSELECT name FROM users\n```")
        .then_reply("The users are Ion Popescu, Maria Ionescu and Andrei Radu.");
    let db = shop_db().await;
    let assistant = assistant(&llm, &db);
    let mut session = SessionContext::new();

    let first = assistant.ask("List the users").await.unwrap();
    session.record("List the users", &first);
    let (question, rejected) = session.feedback_target().unwrap();
    assert_eq!(rejected, "SELECT name FROM users ORDER BY name");

    let revised = assistant
        .revise(question, rejected, "don't sort by name")
        .await
        .unwrap();

    let query = revised.query.clone().unwrap();
    assert!(!query.contains("ORDER BY name"));
    assert_eq!(revised.attempts.len(), 1);
    assert!(!revised.text.to_lowercase().contains("sorted"));
    assert_eq!(llm.calls_with_system(FEEDBACK_MARKER), 1);

    let feedback_system = &llm.calls()[2][0].content;
    assert!(feedback_system.contains("Original question: List the users"));
    assert!(feedback_system.contains("User feedback (why it was wrong): don't sort by name"));
}

#[tokio::test]
async fn test_failing_revision_is_corrected_not_reverted() {
    let llm = MockLlmClient::new()
        .then_reply("SELECT name, age FROM users")
        .then_reply("SELECT name, signup_date FROM users");
    let db = shop_db().await;

    let revised = assistant(&llm, &db)
        .revise("List users", "SELECT name FROM users", "also show when they joined")
        .await
        .unwrap();

    assert_eq!(
        revised.query.as_deref(),
        Some("SELECT name, signup_date FROM users")
    );
    assert_eq!(revised.attempts.len(), 2);
    assert_eq!(llm.calls_with_system(FEEDBACK_MARKER), 1);
    assert_eq!(llm.calls_with_system(CORRECTION_MARKER), 1);
}

#[tokio::test]
async fn test_exhausted_revision_does_not_restore_rejected_query() {
    let llm = MockLlmClient::new()
        .then_reply("SELECT a FROM users")
        .then_reply("SELECT b FROM users")
        .then_reply("SELECT c FROM users");
    let db = shop_db().await;

    let revised = assistant(&llm, &db)
        .revise("List users", "SELECT name FROM users", "wrong columns")
        .await
        .unwrap();

    assert!(revised.is_exhausted());
    assert_eq!(revised.attempts.len(), 3);
    assert!(revised
        .attempts
        .iter()
        .all(|a| a.query != "SELECT name FROM users"));
}

#[tokio::test]
async fn test_empty_feedback_is_refused() {
    let llm = MockLlmClient::new();
    let db = shop_db().await;

    let err = assistant(&llm, &db)
        .revise("List users", "SELECT name FROM users", "")
        .await
        .unwrap_err();

    assert!(matches!(err, AskError::EmptyFeedback));
    assert!(err.is_precondition());
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn test_feedback_is_logged_before_revision() {
    let dir = tempdir().unwrap();
    let log = FeedbackLog::new(dir.path().join("feedback_logs.jsonl"));
    let llm = MockLlmClient::new().then_reply("SELECT name FROM users");
    let db = shop_db().await;

    let entry = FeedbackEntry::new(
        "List the users",
        "SELECT name FROM users ORDER BY name",
        "don't sort by name",
    );
    log.append(&entry).await.unwrap();
    let revised = assistant(&llm, &db)
        .revise(&entry.question, &entry.rejected_sql, &entry.feedback)
        .await
        .unwrap();

    assert!(!revised.is_exhausted());
    let logged: Vec<FeedbackEntry> = std::fs::read_to_string(log.path())
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(logged, vec![entry]);
}
