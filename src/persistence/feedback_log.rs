//! Append-only record of answers the user rejected.
//!
//! One JSON object per line. The engine never reads the log back; it exists
//! for offline review of where generated queries went wrong.

use crate::error::{AskError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::info;

/// A single rejected answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub question: String,
    pub rejected_sql: String,
    pub feedback: String,
    pub recorded_at: DateTime<Utc>,
}

impl FeedbackEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(
        question: impl Into<String>,
        rejected_sql: impl Into<String>,
        feedback: impl Into<String>,
    ) -> Self {
        Self {
            question: question.into(),
            rejected_sql: rejected_sql.into(),
            feedback: feedback.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// JSON Lines feedback log.
#[derive(Debug, Clone)]
pub struct FeedbackLog {
    path: PathBuf,
}

impl FeedbackLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `entry`, creating the file and its parent directories if needed.
    pub async fn append(&self, entry: &FeedbackEntry) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                AskError::persistence(format!(
                    "Failed to create directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let mut line = serde_json::to_string(entry).map_err(|e| {
            AskError::persistence(format!("Failed to serialize feedback entry: {e}"))
        })?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| self.io_error(e))?;
        file.flush().await.map_err(|e| self.io_error(e))?;

        info!(path = %self.path.display(), "Recorded feedback");
        Ok(())
    }

    fn io_error(&self, e: std::io::Error) -> AskError {
        AskError::persistence(format!(
            "Failed to write feedback log {}: {e}",
            self.path.display()
        ))
    }
}
