//! Prompt construction for LLM requests.
//!
//! Builds the four instruction contexts used by the assistant: initial SQL
//! generation, technical correction after an execution error, revision from
//! user feedback, and the final grounded answer. Templates are substituted in
//! a single pass, so user text containing `{placeholders}` is never expanded.

use crate::config::PromptConfig;
use crate::error::{AskError, Result};
use crate::llm::types::Message;
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

const INITIAL_SYSTEM_TEMPLATE: &str = r#"You are an SQL expert. Write a {dialect} query that answers the user's question.
Today's date is {today}.

DATABASE SCHEMA:
{schema}

RULES:
1. Return ONLY the SQL query, no markdown and no explanation.
2. If the user asks for a column that does NOT exist in the schema, do NOT invent it.
3. If the request is impossible with this schema, select the most relevant available columns.
4. Limit results to {row_limit} rows unless the user asks for a different amount.
5. Only read data: write a single SELECT statement.

AMBIGUITY RULES:
{rules}"#;

const CORRECTION_SYSTEM_TEMPLATE: &str = r#"You are an SQL debugger.
The previous query:
{original_query}
caused the error:
{error_message}

DATABASE SCHEMA:
{schema}

Fix the {dialect} query so that it resolves the error. Do not invent columns that are not present in the schema. Return ONLY the corrected SQL."#;

const FEEDBACK_SYSTEM_TEMPLATE: &str = r#"You are an SQL assistant refining a query based on user feedback.
Original question: {question}
Previous SQL (rejected):
{original_query}
User feedback (why it was wrong): {feedback}

DATABASE SCHEMA:
{schema}

INSTRUCTIONS:
1. Adjust the {dialect} query to satisfy the user's feedback.
2. If the user says a column does not exist, remove it from the SELECT list.
3. Do not invent columns that are not present in the schema.
4. Return ONLY the corrected SQL query."#;

const ANSWER_SYSTEM_TEMPLATE: &str = r#"You are a data assistant. Read the SQL query and the SQL result to answer the user question.

User question: {question}
SQL query used: {query}
SQL result:
{result}

CRITICAL INSTRUCTIONS FOR THE ANSWER:
1. Base your answer ONLY on the SQL result.
2. Restate only columns that are actually present in the result. If the query selects only 'name', do not mention 'age', dates or any other criteria.
3. Never claim a sort order the query does not apply. If the user asked to sort by 'age' but the query sorts by 'signup_date' (or not at all), do not claim the list is sorted by age; just list what was found.
4. Be literal. Do not hallucinate columns or values that are not in the result.

Answer in {language}."#;

const CORRECTION_USER_MESSAGE: &str = "Fix this query.";
const FEEDBACK_USER_MESSAGE: &str = "Fix the query based on my feedback.";
const ANSWER_USER_MESSAGE: &str = "Answer my question using only the result above.";

/// Which instruction context to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptMode {
    /// First SQL generation from the question.
    Initial,
    /// Repair of a query the database rejected.
    TechnicalCorrection,
    /// Revision of an accepted query the user was unhappy with.
    FeedbackRevision,
    /// Natural-language answer over an executed result.
    FinalAnswer,
}

impl PromptMode {
    /// Returns the mode name used in logs and errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::TechnicalCorrection => "technical-correction",
            Self::FeedbackRevision => "feedback-revision",
            Self::FinalAnswer => "final-answer",
        }
    }

    /// Fields the caller must supply for this mode.
    pub fn required_fields(&self) -> &'static [Field] {
        match self {
            Self::Initial => &[Field::Schema, Field::Question],
            Self::TechnicalCorrection => {
                &[Field::OriginalQuery, Field::ErrorMessage, Field::Schema]
            }
            Self::FeedbackRevision => &[
                Field::Question,
                Field::OriginalQuery,
                Field::FeedbackText,
                Field::Schema,
            ],
            Self::FinalAnswer => &[Field::Question, Field::Query, Field::Result],
        }
    }

    fn system_template(&self) -> &'static str {
        match self {
            Self::Initial => INITIAL_SYSTEM_TEMPLATE,
            Self::TechnicalCorrection => CORRECTION_SYSTEM_TEMPLATE,
            Self::FeedbackRevision => FEEDBACK_SYSTEM_TEMPLATE,
            Self::FinalAnswer => ANSWER_SYSTEM_TEMPLATE,
        }
    }
}

impl fmt::Display for PromptMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A caller-supplied value substituted into a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Schema,
    Question,
    OriginalQuery,
    ErrorMessage,
    FeedbackText,
    Query,
    Result,
}

impl Field {
    /// Placeholder name of the field inside templates.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Schema => "schema",
            Self::Question => "question",
            Self::OriginalQuery => "original_query",
            Self::ErrorMessage => "error_message",
            Self::FeedbackText => "feedback",
            Self::Query => "query",
            Self::Result => "result",
        }
    }
}

/// Named values for one prompt.
#[derive(Debug, Clone, Default)]
pub struct PromptFields {
    values: HashMap<Field, String>,
}

impl PromptFields {
    /// Creates an empty field set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field value (builder style).
    pub fn with(mut self, field: Field, value: impl Into<String>) -> Self {
        self.values.insert(field, value.into());
        self
    }

    /// Returns the value of a field, if supplied.
    pub fn get(&self, field: Field) -> Option<&str> {
        self.values.get(&field).map(String::as_str)
    }
}

/// A fully substituted prompt, ready for the completion service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPrompt {
    pub mode: PromptMode,
    pub system: String,
    pub user: String,
}

impl ComposedPrompt {
    /// Converts the prompt into the message list sent to the LLM.
    pub fn to_messages(&self) -> Vec<Message> {
        vec![
            Message::system(self.system.clone()),
            Message::user(self.user.clone()),
        ]
    }
}

/// One ambiguity-resolution rule: when a question matches `pattern`,
/// the model is told to resolve it as `resolution`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbiguityRule {
    pub pattern: String,
    pub resolution: String,
}

impl AmbiguityRule {
    pub fn new(pattern: impl Into<String>, resolution: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            resolution: resolution.into(),
        }
    }
}

/// Built-in ambiguity rules for the shop-style schemas the tool targets.
pub fn default_rules() -> Vec<AmbiguityRule> {
    vec![
        AmbiguityRule::new(
            "best customer / top client",
            "order by total money spent (SUM of total_amount) descending, not by number of orders",
        ),
        AmbiguityRule::new(
            "popular product",
            "order by quantity sold or number of orders descending",
        ),
        AmbiguityRule::new(
            "recent",
            "filter on the order_date column, comparing with today's date",
        ),
        AmbiguityRule::new(
            "partial or vaguely spelled names",
            "use fuzzy matching with LIKE and wildcards, e.g. name LIKE '%Popescu%'",
        ),
    ]
}

/// Composes prompts from fixed templates and configured policy data.
#[derive(Debug, Clone)]
pub struct PromptComposer {
    dialect: String,
    row_limit: u32,
    answer_language: String,
    rules: Vec<AmbiguityRule>,
    today: Option<NaiveDate>,
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self::from_config(&PromptConfig::default())
    }
}

impl PromptComposer {
    /// Creates a composer from the `[prompt]` config section.
    pub fn from_config(config: &PromptConfig) -> Self {
        Self {
            dialect: config.dialect.clone(),
            row_limit: config.row_limit,
            answer_language: config.answer_language.clone(),
            rules: config.rules.clone(),
            today: None,
        }
    }

    /// Pins the date written into generation prompts (defaults to the local date).
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    /// Returns the configured ambiguity rules.
    pub fn rules(&self) -> &[AmbiguityRule] {
        &self.rules
    }

    /// Builds the prompt for `mode`, failing if a required field is absent.
    pub fn compose(&self, mode: PromptMode, fields: &PromptFields) -> Result<ComposedPrompt> {
        for field in mode.required_fields() {
            if fields.get(*field).is_none() {
                return Err(AskError::MissingField {
                    mode: mode.as_str(),
                    field: field.name(),
                });
            }
        }

        let values = self.template_values(fields);
        let system = render(mode.system_template(), &values)?;
        let user = match mode {
            PromptMode::Initial => fields.get(Field::Question).unwrap_or_default().to_string(),
            PromptMode::TechnicalCorrection => CORRECTION_USER_MESSAGE.to_string(),
            PromptMode::FeedbackRevision => FEEDBACK_USER_MESSAGE.to_string(),
            PromptMode::FinalAnswer => ANSWER_USER_MESSAGE.to_string(),
        };

        tracing::debug!(
            mode = mode.as_str(),
            system_len = system.len(),
            user_len = user.len(),
            "Composed prompt"
        );

        Ok(ComposedPrompt { mode, system, user })
    }

    fn template_values<'a>(&'a self, fields: &'a PromptFields) -> HashMap<&'static str, String> {
        let today = self
            .today
            .unwrap_or_else(|| chrono::Local::now().date_naive());

        let mut values: HashMap<&'static str, String> = fields
            .values
            .iter()
            .map(|(field, value)| (field.name(), value.clone()))
            .collect();
        values.insert("dialect", self.dialect.clone());
        values.insert("row_limit", self.row_limit.to_string());
        values.insert("language", self.answer_language.clone());
        values.insert("today", today.format("%Y-%m-%d").to_string());
        values.insert("rules", self.format_rules());
        values
    }

    fn format_rules(&self) -> String {
        if self.rules.is_empty() {
            return "- none".to_string();
        }
        self.rules
            .iter()
            .map(|rule| format!("- \"{}\" -> {}", rule.pattern, rule.resolution))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Substitutes every `{name}` in `template` in one pass.
fn render(template: &str, values: &HashMap<&'static str, String>) -> Result<String> {
    let placeholder = Regex::new(r"\{([a-z_]+)\}")
        .map_err(|e| AskError::internal(format!("Invalid placeholder pattern: {e}")))?;
    let mut output = String::with_capacity(template.len());
    let mut last = 0;

    for caps in placeholder.captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let name = name.as_str();
        let value = values
            .get(name)
            .ok_or_else(|| AskError::internal(format!("Unbound template placeholder: {name}")))?;
        output.push_str(&template[last..whole.start()]);
        output.push_str(value);
        last = whole.end();
    }
    output.push_str(&template[last..]);

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SCHEMA: &str = "Table: users\n  - id: INTEGER (PK)\n  - name: TEXT\n";

    fn composer() -> PromptComposer {
        PromptComposer::default().with_today(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap())
    }

    #[test]
    fn test_initial_prompt_contains_schema_question_and_rules() {
        let fields = PromptFields::new()
            .with(Field::Schema, SCHEMA)
            .with(Field::Question, "Who is our best customer?");
        let prompt = composer().compose(PromptMode::Initial, &fields).unwrap();

        assert!(prompt.system.contains("Table: users"));
        assert!(prompt.system.contains("SQLite"));
        assert!(prompt.system.contains("Today's date is 2024-05-01"));
        assert!(prompt.system.contains("do NOT invent it"));
        assert!(prompt.system.contains("Limit results to 5 rows"));
        assert!(prompt.system.contains("total money spent"));
        assert!(prompt.system.contains("LIKE"));
        assert_eq!(prompt.user, "Who is our best customer?");
        assert!(!prompt.system.contains('{'));
    }

    #[test]
    fn test_correction_prompt_carries_exact_error() {
        let fields = PromptFields::new()
            .with(Field::OriginalQuery, "SELECT age FROM users")
            .with(Field::ErrorMessage, "no such column: age")
            .with(Field::Schema, SCHEMA);
        let prompt = composer()
            .compose(PromptMode::TechnicalCorrection, &fields)
            .unwrap();

        assert!(prompt.system.contains("SELECT age FROM users"));
        assert!(prompt.system.contains("no such column: age"));
        assert!(prompt.system.contains("Table: users"));
        assert_eq!(prompt.user, "Fix this query.");
    }

    #[test]
    fn test_feedback_prompt_contains_all_context() {
        let fields = PromptFields::new()
            .with(Field::Question, "List users")
            .with(Field::OriginalQuery, "SELECT name FROM users ORDER BY name")
            .with(Field::FeedbackText, "don't sort by name")
            .with(Field::Schema, SCHEMA);
        let prompt = composer()
            .compose(PromptMode::FeedbackRevision, &fields)
            .unwrap();

        assert!(prompt.system.contains("Original question: List users"));
        assert!(prompt.system.contains("ORDER BY name"));
        assert!(prompt.system.contains("User feedback (why it was wrong): don't sort by name"));
        assert!(prompt.system.contains("Table: users"));
        assert_eq!(prompt.user, "Fix the query based on my feedback.");
    }

    #[test]
    fn test_final_answer_prompt_has_grounding_rules() {
        let fields = PromptFields::new()
            .with(Field::Question, "How many users exist?")
            .with(Field::Query, "SELECT COUNT(*) FROM users")
            .with(Field::Result, "COUNT(*)\n3");
        let prompt = composer().compose(PromptMode::FinalAnswer, &fields).unwrap();

        assert!(prompt.system.contains("SQL query used: SELECT COUNT(*) FROM users"));
        assert!(prompt.system.contains("COUNT(*)\n3"));
        assert!(prompt.system.contains("only columns that are actually present"));
        assert!(prompt.system.contains("Never claim a sort order"));
        assert!(prompt.system.ends_with("Answer in English."));
    }

    #[test]
    fn test_missing_field_is_reported() {
        let fields = PromptFields::new().with(Field::Question, "How many users exist?");
        let err = composer().compose(PromptMode::Initial, &fields).unwrap_err();
        match err {
            AskError::MissingField { mode, field } => {
                assert_eq!(mode, "initial");
                assert_eq!(field, "schema");
            }
            other => panic!("Expected MissingField, got {other:?}"),
        }
    }

    #[test]
    fn test_every_mode_checks_its_fields() {
        let composer = composer();
        for mode in [
            PromptMode::Initial,
            PromptMode::TechnicalCorrection,
            PromptMode::FeedbackRevision,
            PromptMode::FinalAnswer,
        ] {
            let err = composer.compose(mode, &PromptFields::new()).unwrap_err();
            assert!(matches!(err, AskError::MissingField { .. }), "{mode}");
        }
    }

    #[test]
    fn test_user_text_placeholders_are_not_expanded() {
        let fields = PromptFields::new()
            .with(Field::Schema, SCHEMA)
            .with(Field::Question, "what is {schema}?");
        let prompt = composer().compose(PromptMode::Initial, &fields).unwrap();

        assert_eq!(prompt.user, "what is {schema}?");
        assert_eq!(prompt.system.matches("Table: users").count(), 1);
    }

    #[test]
    fn test_configured_rules_replace_defaults() {
        let config = PromptConfig {
            rules: vec![AmbiguityRule::new("top seller", "order by stock sold")],
            answer_language: "Romanian".to_string(),
            ..PromptConfig::default()
        };
        let composer = PromptComposer::from_config(&config);
        let fields = PromptFields::new()
            .with(Field::Schema, SCHEMA)
            .with(Field::Question, "top seller?");
        let prompt = composer.compose(PromptMode::Initial, &fields).unwrap();

        assert!(prompt.system.contains("- \"top seller\" -> order by stock sold"));
        assert!(!prompt.system.contains("total money spent"));
    }

    #[test]
    fn test_empty_rules_render_placeholder() {
        let config = PromptConfig {
            rules: vec![],
            ..PromptConfig::default()
        };
        let fields = PromptFields::new()
            .with(Field::Schema, SCHEMA)
            .with(Field::Question, "q");
        let prompt = PromptComposer::from_config(&config)
            .compose(PromptMode::Initial, &fields)
            .unwrap();
        assert!(prompt.system.contains("AMBIGUITY RULES:\n- none"));
    }

    #[test]
    fn test_to_messages_orders_system_then_user() {
        let fields = PromptFields::new()
            .with(Field::Schema, SCHEMA)
            .with(Field::Question, "How many users exist?");
        let messages = composer()
            .compose(PromptMode::Initial, &fields)
            .unwrap()
            .to_messages();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, crate::llm::types::Role::System);
        assert_eq!(messages[1].role, crate::llm::types::Role::User);
    }

    #[test]
    fn test_render_rejects_unbound_placeholder() {
        let err = render("hello {nobody}", &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("nobody"));
    }
}
