//! The correction loop.
//!
//! Drives one question through generate, execute and correct steps until a
//! candidate query runs successfully or the retry ceiling is reached:
//!
//! ```text
//! Generating -> Executing -> Terminated(Succeeded)
//!                   |  ^
//!                   v  |
//!               Correcting        (failure, attempts left)
//!
//! Executing -> Terminated(Exhausted)   (failure, ceiling reached)
//! ```

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::DEFAULT_MAX_ATTEMPTS;
use crate::db::{QueryResult, SchemaProvider};
use crate::error::{AskError, Result};
use crate::llm::{sanitize_sql, Field, LlmClient, PromptComposer, PromptFields, PromptMode};
use crate::query::{ExecutionOutcome, QueryExecutor};
use crate::retry::RetryPolicy;

/// One execution of a candidate query within a session.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionAttempt {
    /// 1-based position within the session.
    pub index: usize,
    /// The sanitized SQL that was executed.
    pub query: String,
    /// What the executor reported.
    pub outcome: ExecutionOutcome,
}

/// A query that executed successfully, with its result.
///
/// Only the correction loop can build one, so holding a `SucceededQuery`
/// proves the query ran without error.
#[derive(Debug, Clone, PartialEq)]
pub struct SucceededQuery {
    query: String,
    result: QueryResult,
    attempts: Vec<CorrectionAttempt>,
}

impl SucceededQuery {
    /// The SQL that produced the result.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// The rows returned by the query.
    pub fn result(&self) -> &QueryResult {
        &self.result
    }

    /// All attempts of the session, the successful one last.
    pub fn attempts(&self) -> &[CorrectionAttempt] {
        &self.attempts
    }

    /// Splits into the query and the attempt history.
    pub fn into_parts(self) -> (String, QueryResult, Vec<CorrectionAttempt>) {
        (self.query, self.result, self.attempts)
    }
}

/// How a correction-loop session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    /// A candidate executed successfully.
    Succeeded(SucceededQuery),
    /// Every attempt failed and the ceiling was reached.
    Exhausted { attempts: Vec<CorrectionAttempt> },
}

impl Termination {
    /// Returns the attempts made in this session.
    pub fn attempts(&self) -> &[CorrectionAttempt] {
        match self {
            Self::Succeeded(succeeded) => succeeded.attempts(),
            Self::Exhausted { attempts } => attempts,
        }
    }

    /// Returns true if the session ended with a working query.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    /// Converts exhaustion into [`AskError::ExhaustedRetries`].
    pub fn into_succeeded(self) -> Result<SucceededQuery> {
        match self {
            Self::Succeeded(succeeded) => Ok(succeeded),
            Self::Exhausted { attempts } => Err(exhausted_error(&attempts)),
        }
    }
}

/// Builds the exhaustion error from an attempt history.
pub(crate) fn exhausted_error(attempts: &[CorrectionAttempt]) -> AskError {
    AskError::ExhaustedRetries {
        attempts: attempts.len(),
        last_error: attempts
            .last()
            .and_then(|a| a.outcome.error_message())
            .map(str::to_string),
    }
}

/// States of the correction loop.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopState {
    /// Asking the model for a first candidate.
    Generating,
    /// Running a candidate.
    Executing { candidate: String },
    /// Asking the model to repair a failed candidate.
    Correcting { failed_query: String, error: String },
    /// Finished.
    Terminated(Termination),
}

impl LoopState {
    /// Short state name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Generating => "generating",
            Self::Executing { .. } => "executing",
            Self::Correcting { .. } => "correcting",
            Self::Terminated(Termination::Succeeded(_)) => "succeeded",
            Self::Terminated(Termination::Exhausted { .. }) => "exhausted",
        }
    }
}

/// Bounded generate/execute/correct state machine.
///
/// The completion service, schema provider and executor are injected, so a
/// loop can run against test doubles and nothing is shared between sessions.
#[derive(Clone)]
pub struct CorrectionLoop {
    llm: Arc<dyn LlmClient>,
    schema: Arc<dyn SchemaProvider>,
    executor: QueryExecutor,
    composer: Arc<PromptComposer>,
    max_attempts: usize,
    retry: RetryPolicy,
}

impl CorrectionLoop {
    /// Creates a loop with the default ceiling of three attempts and no delay.
    pub fn new(
        llm: Arc<dyn LlmClient>,
        schema: Arc<dyn SchemaProvider>,
        executor: QueryExecutor,
        composer: Arc<PromptComposer>,
    ) -> Self {
        Self {
            llm,
            schema,
            executor,
            composer,
            max_attempts: DEFAULT_MAX_ATTEMPTS as usize,
            retry: RetryPolicy::Immediate,
        }
    }

    /// Sets the retry ceiling (total executions per session, at least 1).
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sets the delay between a failed execution and the next correction.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the retry ceiling.
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Runs a full session for `question`, starting from generation.
    pub async fn run_from_question(&self, question: &str) -> Result<Termination> {
        info!(question_len = question.len(), "Starting correction loop");
        self.drive(question, LoopState::Generating).await
    }

    /// Runs a session that starts by executing an existing candidate.
    pub async fn run_from_candidate(&self, question: &str, sql: &str) -> Result<Termination> {
        info!(
            question_len = question.len(),
            sql_len = sql.len(),
            "Starting correction loop from candidate"
        );
        self.drive(
            question,
            LoopState::Executing {
                candidate: sql.to_string(),
            },
        )
        .await
    }

    async fn drive(&self, question: &str, mut state: LoopState) -> Result<Termination> {
        let mut attempts: Vec<CorrectionAttempt> = Vec::with_capacity(self.max_attempts);

        loop {
            debug!(state = state.name(), attempt = attempts.len(), "Correction loop state");

            state = match state {
                LoopState::Generating => LoopState::Executing {
                    candidate: self.generate(question).await?,
                },

                LoopState::Executing { candidate } => {
                    let index = attempts.len() + 1;
                    let outcome = self.executor.run(&candidate).await;
                    attempts.push(CorrectionAttempt {
                        index,
                        query: candidate.clone(),
                        outcome: outcome.clone(),
                    });

                    match outcome {
                        ExecutionOutcome::Success(result) => {
                            LoopState::Terminated(Termination::Succeeded(SucceededQuery {
                                query: candidate,
                                result,
                                attempts: std::mem::take(&mut attempts),
                            }))
                        }
                        ExecutionOutcome::Failure(error) if index >= self.max_attempts => {
                            warn!(
                                attempt = index,
                                max_attempts = self.max_attempts,
                                error = %error,
                                "Retry ceiling reached"
                            );
                            LoopState::Terminated(Termination::Exhausted {
                                attempts: std::mem::take(&mut attempts),
                            })
                        }
                        ExecutionOutcome::Failure(error) => {
                            warn!(attempt = index, error = %error, "Candidate failed, correcting");
                            self.retry.wait(index as u32).await;
                            LoopState::Correcting {
                                failed_query: candidate,
                                error,
                            }
                        }
                    }
                }

                LoopState::Correcting {
                    failed_query,
                    error,
                } => LoopState::Executing {
                    candidate: self.correct(&failed_query, &error).await?,
                },

                LoopState::Terminated(termination) => return Ok(termination),
            };
        }
    }

    /// Produces the first candidate for a question.
    async fn generate(&self, question: &str) -> Result<String> {
        let fields = PromptFields::new()
            .with(Field::Schema, self.schema.schema_text().await?)
            .with(Field::Question, question);
        self.complete(PromptMode::Initial, &fields).await
    }

    /// Produces a repaired candidate from a failed query and its error.
    async fn correct(&self, failed_query: &str, error: &str) -> Result<String> {
        let fields = PromptFields::new()
            .with(Field::OriginalQuery, failed_query)
            .with(Field::ErrorMessage, error)
            .with(Field::Schema, self.schema.schema_text().await?);
        self.complete(PromptMode::TechnicalCorrection, &fields).await
    }

    /// Produces a candidate revised from user feedback.
    pub(crate) async fn revise_with_feedback(
        &self,
        question: &str,
        rejected_sql: &str,
        feedback: &str,
    ) -> Result<String> {
        let fields = PromptFields::new()
            .with(Field::Question, question)
            .with(Field::OriginalQuery, rejected_sql)
            .with(Field::FeedbackText, feedback)
            .with(Field::Schema, self.schema.schema_text().await?);
        self.complete(PromptMode::FeedbackRevision, &fields).await
    }

    /// Composes, sends and sanitizes one SQL-producing prompt.
    async fn complete(&self, mode: PromptMode, fields: &PromptFields) -> Result<String> {
        let prompt = self.composer.compose(mode, fields)?;
        let start = Instant::now();
        let raw = self.llm.complete(&prompt.to_messages()).await?;
        let sql = sanitize_sql(&raw);
        debug!(
            mode = mode.as_str(),
            duration_ms = start.elapsed().as_millis() as u64,
            sql_len = sql.len(),
            "Received candidate query"
        );
        Ok(sql)
    }
}
