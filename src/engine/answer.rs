//! Final-answer synthesis from a successful query result.

use std::sync::Arc;

use tracing::debug;

use super::correction::SucceededQuery;
use crate::error::Result;
use crate::llm::{Field, LlmClient, PromptComposer, PromptFields, PromptMode};

/// Asks the model to phrase a natural-language answer from query results.
///
/// Takes a [`SucceededQuery`], so it can never be invoked for a failed or
/// exhausted session.
#[derive(Clone)]
pub struct AnswerSynthesizer {
    llm: Arc<dyn LlmClient>,
    composer: Arc<PromptComposer>,
}

impl AnswerSynthesizer {
    pub fn new(llm: Arc<dyn LlmClient>, composer: Arc<PromptComposer>) -> Self {
        Self { llm, composer }
    }

    /// Returns the model's answer text unchanged.
    pub async fn answer(&self, question: &str, succeeded: &SucceededQuery) -> Result<String> {
        let fields = PromptFields::new()
            .with(Field::Question, question)
            .with(Field::Query, succeeded.query())
            .with(Field::Result, succeeded.result().format_for_prompt());
        let prompt = self.composer.compose(PromptMode::FinalAnswer, &fields)?;

        let text = self.llm.complete(&prompt.to_messages()).await?;
        debug!(answer_len = text.len(), "Synthesized answer");
        Ok(text)
    }
}
