//! SQLite client behaviour relied on by the engine.

use super::{shop_db, SHOP_SQL};
use askdb::db::{self, DatabaseClient, SchemaProvider};
use askdb::query::{ExecutionOutcome, QueryExecutor};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

#[tokio::test]
async fn test_schema_text_describes_shop() {
    let db = shop_db().await;

    let text = db.schema_text().await.unwrap();

    assert!(text.contains("Table: users"));
    assert!(text.contains("Table: orders"));
    assert!(text.contains("Table: products"));
    assert!(text.contains("total_amount: REAL"));
    assert!(text.contains("orders.user_id -> users.id"));
    assert!(text.contains("Ion Popescu"));
}

#[tokio::test]
async fn test_executor_success_and_backend_error() {
    let db = shop_db().await;
    let executor = QueryExecutor::new(db.clone());

    match executor
        .run("SELECT SUM(total_amount) AS spent FROM orders WHERE user_id = 1")
        .await
    {
        ExecutionOutcome::Success(result) => {
            assert_eq!(result.columns[0].name, "spent");
            assert_eq!(result.rows[0][0].to_display_string(), "1305.5");
        }
        other => panic!("Expected success, got {other:?}"),
    }

    assert_eq!(
        executor.run("SELECT age FROM users").await,
        ExecutionOutcome::Failure("no such column: age".to_string())
    );
}

#[tokio::test]
async fn test_read_only_connection_refuses_writes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("shop.sqlite");
    let url = format!("sqlite://{}", path.display());

    let writable = db::connect(&url, false).await.unwrap();
    writable.execute_script(SHOP_SQL).await.unwrap();
    writable.close().await.unwrap();

    let read_only = db::connect(&url, true).await.unwrap();
    let result = read_only.execute_query("SELECT COUNT(*) FROM orders").await.unwrap();
    assert_eq!(result.rows[0][0].to_display_string(), "3");

    let err = read_only
        .execute_query("DELETE FROM orders")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("readonly"), "unexpected: {err}");
}

#[tokio::test]
async fn test_read_only_missing_file_is_connection_error() {
    let dir = tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("absent.sqlite").display());

    let err = db::connect(&url, true).await.unwrap_err();
    assert_eq!(err.category(), "Connection Error");
}

#[tokio::test]
async fn test_seeded_database_is_reopened_read_only() {
    let dir = tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("seeded.sqlite").display());

    let seeded = db::seed(&url, SHOP_SQL).await.unwrap();

    let result = seeded.execute_query("SELECT COUNT(*) FROM orders").await.unwrap();
    assert_eq!(result.rows[0][0].to_display_string(), "3");

    let err = seeded
        .execute_query("UPDATE orders SET total_amount = 0")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("readonly"), "unexpected: {err}");
}

#[tokio::test]
async fn test_cte_delete_leaves_rows_in_place() {
    let db = shop_db().await;
    let executor = QueryExecutor::new(db.clone());

    let outcome = executor
        .run("WITH t AS (SELECT id FROM orders) DELETE FROM orders WHERE id IN (SELECT id FROM t)")
        .await;
    assert!(!outcome.is_success());

    let result = db.execute_query("SELECT COUNT(*) FROM orders").await.unwrap();
    assert_eq!(result.rows[0][0].to_display_string(), "3");
}
