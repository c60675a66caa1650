//! Mock LLM client for testing.
//!
//! Replies come from a scripted queue first, then from pattern mappings, and
//! finally from a small set of canned answers for the demo shop schema. Every
//! request is recorded so tests can assert which prompts were sent.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::error::{AskError, Result};
use crate::llm::types::{Message, Role};
use crate::llm::LlmClient;

#[derive(Debug, Clone)]
enum ScriptedReply {
    Text(String),
    Error(String),
}

/// Mock LLM client that returns canned responses.
///
/// Clones share the script and the call log, so a test can keep one handle
/// while the assistant owns another.
#[derive(Debug, Clone, Default)]
pub struct MockLlmClient {
    /// Custom response mappings (pattern -> response).
    custom_responses: Vec<(String, String)>,
    script: Arc<Mutex<VecDeque<ScriptedReply>>>,
    calls: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl MockLlmClient {
    /// Creates a new mock client with default responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a custom response mapping.
    ///
    /// When any message contains `pattern`, the mock returns `response`.
    pub fn with_response(
        mut self,
        pattern: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        self.custom_responses.push((pattern.into(), response.into()));
        self
    }

    /// Queues a reply returned by the next unscripted call.
    pub fn then_reply(self, response: impl Into<String>) -> Self {
        self.push(ScriptedReply::Text(response.into()));
        self
    }

    /// Queues a completion-service failure.
    pub fn then_fail(self, message: impl Into<String>) -> Self {
        self.push(ScriptedReply::Error(message.into()));
        self
    }

    fn push(&self, reply: ScriptedReply) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(reply);
        }
    }

    /// Returns every message list received so far, oldest first.
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Returns the number of completions requested.
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }

    /// Counts requests whose system message contains `marker`.
    pub fn calls_with_system(&self, marker: &str) -> usize {
        self.calls()
            .iter()
            .filter(|messages| {
                messages
                    .iter()
                    .any(|m| m.role == Role::System && m.content.contains(marker))
            })
            .count()
    }

    /// Generates a mock response based on the input.
    fn mock_response(&self, messages: &[Message]) -> String {
        let system = Self::content_of(messages, Role::System);
        let input = Self::content_of(messages, Role::User);
        let all_lower = messages
            .iter()
            .map(|m| m.content.to_lowercase())
            .collect::<Vec<_>>()
            .join("\n");

        for (pattern, response) in &self.custom_responses {
            if all_lower.contains(&pattern.to_lowercase()) {
                return response.clone();
            }
        }

        if system.starts_with("You are a data assistant") {
            let result = section(&system, "SQL result:\n", "\n\nCRITICAL").unwrap_or_default();
            return format!("Here is what I found:\n{}", result.trim());
        }

        if system.starts_with("You are an SQL debugger") {
            return section(&system, "The previous query:\n", "\ncaused the error:")
                .unwrap_or_default()
                .to_string();
        }

        if system.contains("refining a query based on user feedback") {
            return section(&system, "Previous SQL (rejected):\n", "\nUser feedback")
                .unwrap_or_default()
                .to_string();
        }

        let input_lower = input.to_lowercase();

        if input_lower.contains("all users") || input_lower.contains("show users") {
            return "```sql\nSELECT * FROM users LIMIT 5;\n```".to_string();
        }

        if input_lower.contains("count") && input_lower.contains("orders") {
            return "```sql\nSELECT COUNT(*) FROM orders;\n```".to_string();
        }

        if (input_lower.contains("count") || input_lower.contains("how many"))
            && input_lower.contains("users")
        {
            return "```sql\nSELECT COUNT(*) FROM users;\n```".to_string();
        }

        if input_lower.contains("best customer") {
            return "```sql\nSELECT u.name, SUM(o.total_amount) AS total_spent\nFROM users u\nJOIN orders o ON o.user_id = u.id\nGROUP BY u.id\nORDER BY total_spent DESC\nLIMIT 1;\n```".to_string();
        }

        if input_lower.contains("delete") && input_lower.contains("user") {
            return "```sql\nDELETE FROM users WHERE id = 1;\n```".to_string();
        }

        "I don't understand that question. Could you please rephrase it?".to_string()
    }

    fn content_of(messages: &[Message], role: Role) -> String {
        messages
            .iter()
            .rev()
            .find(|m| m.role == role)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }
}

/// Returns the text between `start` and the following `end` marker.
fn section<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = text.find(start)? + start.len();
    let to = text[from..].find(end).map_or(text.len(), |i| from + i);
    Some(&text[from..to])
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }

        let scripted = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match scripted {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Error(message)) => Err(AskError::llm(message)),
            None => Ok(self.mock_response(messages)),
        }
    }
}
