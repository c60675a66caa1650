//! Question answering engine.
//!
//! Ties the correction loop, the feedback loop and answer synthesis together
//! behind [`Assistant`], the single entry point used by the binary.

mod answer;
mod correction;
mod feedback;

pub use answer::AnswerSynthesizer;
pub use correction::{CorrectionAttempt, CorrectionLoop, LoopState, SucceededQuery, Termination};
pub use feedback::FeedbackLoop;

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::db::SchemaProvider;
use crate::error::{AskError, Result, EXHAUSTED_MESSAGE};
use crate::llm::{LlmClient, PromptComposer};
use crate::query::QueryExecutor;
use crate::retry::RetryPolicy;

/// What the user sees after asking or revising.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    /// Answer text, or the fixed apology when every attempt failed.
    pub text: String,
    /// The query behind the answer. `None` when the session was exhausted.
    pub query: Option<String>,
    /// Every attempt made in the session.
    pub attempts: Vec<CorrectionAttempt>,
}

impl Answer {
    fn exhausted(attempts: Vec<CorrectionAttempt>) -> Self {
        Self {
            text: EXHAUSTED_MESSAGE.to_string(),
            query: None,
            attempts,
        }
    }

    /// Returns true if no working query was found.
    pub fn is_exhausted(&self) -> bool {
        self.query.is_none()
    }

    /// The exhaustion error for callers that treat it as a failure.
    pub fn exhausted_error(&self) -> Option<AskError> {
        self.is_exhausted()
            .then(|| correction::exhausted_error(&self.attempts))
    }
}

/// Natural-language question answering over a database.
///
/// Stateless between calls: follow-up context lives in [`SessionContext`],
/// owned by the caller.
#[derive(Clone)]
pub struct Assistant {
    correction: CorrectionLoop,
    feedback: FeedbackLoop,
    synthesizer: AnswerSynthesizer,
}

impl Assistant {
    /// Creates an assistant with the default ceiling and no retry delay.
    pub fn new(
        llm: Arc<dyn LlmClient>,
        schema: Arc<dyn SchemaProvider>,
        executor: QueryExecutor,
        composer: PromptComposer,
    ) -> Self {
        let composer = Arc::new(composer);
        let correction = CorrectionLoop::new(llm.clone(), schema, executor, composer.clone());
        Self {
            feedback: FeedbackLoop::new(correction.clone()),
            correction,
            synthesizer: AnswerSynthesizer::new(llm, composer),
        }
    }

    /// Creates an assistant configured from `config`.
    pub fn from_config(
        llm: Arc<dyn LlmClient>,
        schema: Arc<dyn SchemaProvider>,
        executor: QueryExecutor,
        config: &Config,
    ) -> Self {
        Self::new(llm, schema, executor, PromptComposer::from_config(&config.prompt))
            .with_max_attempts(config.correction.max_attempts as usize)
            .with_retry_policy(config.correction.retry.policy())
    }

    /// Sets the retry ceiling used by every session.
    pub fn with_max_attempts(self, max_attempts: usize) -> Self {
        self.rebuild(|c| c.with_max_attempts(max_attempts))
    }

    /// Sets the delay between a failure and the next correction.
    pub fn with_retry_policy(self, retry: RetryPolicy) -> Self {
        self.rebuild(|c| c.with_retry_policy(retry))
    }

    fn rebuild(self, f: impl FnOnce(CorrectionLoop) -> CorrectionLoop) -> Self {
        let correction = f(self.correction);
        Self {
            feedback: FeedbackLoop::new(correction.clone()),
            correction,
            synthesizer: self.synthesizer,
        }
    }

    /// Answers a new question.
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let termination = self.correction.run_from_question(question).await?;
        self.finish(question, termination).await
    }

    /// Retries a previous question after the user rejected its query.
    pub async fn revise(&self, question: &str, rejected_sql: &str, feedback: &str) -> Result<Answer> {
        let termination = self.feedback.revise(question, rejected_sql, feedback).await?;
        self.finish(question, termination).await
    }

    async fn finish(&self, question: &str, termination: Termination) -> Result<Answer> {
        match termination {
            Termination::Succeeded(succeeded) => {
                let text = self.synthesizer.answer(question, &succeeded).await?;
                let (query, _, attempts) = succeeded.into_parts();
                info!(attempts = attempts.len(), "Question answered");
                Ok(Answer {
                    text,
                    query: Some(query),
                    attempts,
                })
            }
            Termination::Exhausted { attempts } => {
                info!(attempts = attempts.len(), "Question not answered");
                Ok(Answer::exhausted(attempts))
            }
        }
    }
}

/// The last question and its working query, kept for follow-up feedback.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionContext {
    last_question: Option<String>,
    last_query: Option<String>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remembers the pair if the answer came from a working query.
    ///
    /// Exhausted answers leave the previous pair in place.
    pub fn record(&mut self, question: &str, answer: &Answer) {
        if let Some(query) = &answer.query {
            self.last_question = Some(question.to_string());
            self.last_query = Some(query.clone());
        }
    }

    /// Question and query that feedback would apply to.
    pub fn feedback_target(&self) -> Option<(&str, &str)> {
        match (&self.last_question, &self.last_query) {
            (Some(q), Some(sql)) => Some((q.as_str(), sql.as_str())),
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        self.last_question = None;
        self.last_query = None;
    }

    pub fn is_empty(&self) -> bool {
        self.feedback_target().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ColumnInfo, MockDatabaseClient, QueryResult, Value};
    use crate::llm::MockLlmClient;
    use pretty_assertions::assert_eq;

    fn assistant(llm: &MockLlmClient, db: &Arc<MockDatabaseClient>) -> Assistant {
        Assistant::new(
            Arc::new(llm.clone()),
            db.clone(),
            QueryExecutor::new(db.clone()),
            PromptComposer::default(),
        )
    }

    #[tokio::test]
    async fn test_ask_returns_answer_and_query() {
        let llm = MockLlmClient::new()
            .then_reply("SELECT COUNT(*) AS n FROM users")
            .then_reply("There are 3 users.");
        let db = Arc::new(MockDatabaseClient::new().then_return(QueryResult::with_data(
            vec![ColumnInfo::new("n", "INTEGER")],
            vec![vec![Value::Int(3)]],
        )));

        let answer = assistant(&llm, &db).ask("How many users exist?").await.unwrap();

        assert_eq!(answer.text, "There are 3 users.");
        assert_eq!(answer.query.as_deref(), Some("SELECT COUNT(*) AS n FROM users"));
        assert!(answer.exhausted_error().is_none());
        let answer_system = &llm.calls()[1][0].content;
        assert!(answer_system.contains("n\n3"));
    }

    #[tokio::test]
    async fn test_exhaustion_skips_synthesis() {
        let llm = MockLlmClient::new();
        let db = Arc::new(
            MockDatabaseClient::new()
                .then_error("e1")
                .then_error("e2")
                .then_error("e3"),
        );

        let answer = assistant(&llm, &db).ask("Show me all users").await.unwrap();

        assert_eq!(answer.text, EXHAUSTED_MESSAGE);
        assert!(answer.is_exhausted());
        assert_eq!(llm.calls_with_system("You are a data assistant"), 0);
        assert!(matches!(
            answer.exhausted_error(),
            Some(AskError::ExhaustedRetries { attempts: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_with_max_attempts_applies_to_feedback() {
        let llm = MockLlmClient::new();
        let db = Arc::new(MockDatabaseClient::new().then_error("e1").then_error("e2"));

        let answer = assistant(&llm, &db)
            .with_max_attempts(1)
            .revise("q", "SELECT 1", "wrong")
            .await
            .unwrap();

        assert!(answer.is_exhausted());
        assert_eq!(answer.attempts.len(), 1);
    }

    #[test]
    fn test_session_context_keeps_last_success() {
        let mut ctx = SessionContext::new();
        assert!(ctx.is_empty());

        let ok = Answer {
            text: "3".into(),
            query: Some("SELECT 3".into()),
            attempts: vec![],
        };
        ctx.record("How many?", &ok);
        assert_eq!(ctx.feedback_target(), Some(("How many?", "SELECT 3")));

        ctx.record("Other?", &Answer::exhausted(vec![]));
        assert_eq!(ctx.feedback_target(), Some(("How many?", "SELECT 3")));

        ctx.clear();
        assert!(ctx.is_empty());
    }
}
