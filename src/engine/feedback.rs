//! Revision of a working query the user rejected.

use tracing::info;

use super::correction::{CorrectionLoop, Termination};
use crate::error::{AskError, Result};

/// Turns user feedback on a previous query into a new correction session.
///
/// Exactly one feedback-revision prompt is sent. The revised candidate then
/// goes through a fresh correction loop with its own retry ceiling, and the
/// rejected query is never reused as a fallback.
#[derive(Clone)]
pub struct FeedbackLoop {
    correction: CorrectionLoop,
}

impl FeedbackLoop {
    pub fn new(correction: CorrectionLoop) -> Self {
        Self { correction }
    }

    pub async fn revise(
        &self,
        question: &str,
        rejected_sql: &str,
        feedback: &str,
    ) -> Result<Termination> {
        let feedback = feedback.trim();
        if feedback.is_empty() {
            return Err(AskError::EmptyFeedback);
        }

        info!(feedback_len = feedback.len(), "Revising query from feedback");
        let candidate = self
            .correction
            .revise_with_feedback(question, rejected_sql, feedback)
            .await?;

        self.correction.run_from_candidate(question, &candidate).await
    }
}
