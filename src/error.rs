//! Error types for askdb.
//!
//! Defines the main error enum used throughout the crate.

use thiserror::Error;

/// Fixed message shown to the user when the correction loop gives up.
pub const EXHAUSTED_MESSAGE: &str =
    "Sorry, I could not produce a valid SQL query for that question.";

/// Main error type for askdb operations.
#[derive(Error, Debug)]
pub enum AskError {
    /// Database connection errors (missing file, bad URL, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution errors (syntax errors, unknown columns, etc.)
    #[error("Query error: {0}")]
    Query(String),

    /// LLM API errors (rate limits, auth, timeouts, etc.)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Configuration errors (invalid config file, bad flag combinations, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Feedback log errors (unwritable path, serialization).
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),

    /// A prompt template was composed without one of its required fields.
    #[error("Missing prompt field '{field}' for {mode} prompt")]
    MissingField {
        mode: &'static str,
        field: &'static str,
    },

    /// The correction loop hit its retry ceiling without a successful execution.
    #[error("{}", EXHAUSTED_MESSAGE)]
    ExhaustedRetries {
        attempts: usize,
        last_error: Option<String>,
    },

    /// The feedback loop was invoked without any feedback text.
    #[error("Feedback text must not be empty")]
    EmptyFeedback,
}

impl AskError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates an LLM error with the given message.
    pub fn llm(msg: impl Into<String>) -> Self {
        Self::Llm(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a persistence error with the given message.
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Llm(_) => "LLM Error",
            Self::Config(_) => "Configuration Error",
            Self::Persistence(_) => "Persistence Error",
            Self::Internal(_) => "Internal Error",
            Self::MissingField { .. } => "Prompt Error",
            Self::ExhaustedRetries { .. } => "Retries Exhausted",
            Self::EmptyFeedback => "Feedback Error",
        }
    }

    /// Returns true for caller-side mistakes that must never be retried.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::MissingField { .. } | Self::EmptyFeedback)
    }
}

/// Result type alias using AskError.
pub type Result<T> = std::result::Result<T, AskError>;
