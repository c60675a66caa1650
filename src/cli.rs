//! Command-line argument parsing for askdb.

use askdb::config::Config;
use askdb::error::{AskError, Result};
use askdb::llm::LlmProvider;
use clap::Parser;
use std::path::PathBuf;

/// Ask questions about a SQL database in natural language.
#[derive(Parser, Debug)]
#[command(name = "askdb")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// SQLite database URL or path (e.g., sqlite://data/test_db.sqlite)
    #[arg(short = 'd', long, value_name = "URL")]
    pub database: Option<String>,

    /// Config file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// LLM provider to use (openai or mock)
    #[arg(long, value_name = "PROVIDER")]
    pub llm: Option<String>,

    /// Answer a single question and exit
    #[arg(short = 'q', long, value_name = "TEXT")]
    pub question: Option<String>,

    /// Revise --previous-sql for --question using this feedback, then exit
    #[arg(long, value_name = "TEXT", requires = "question", requires = "previous_sql")]
    pub feedback: Option<String>,

    /// The query the feedback refers to
    #[arg(long, value_name = "SQL", requires = "feedback")]
    pub previous_sql: Option<String>,

    /// SQL script to run against the database before starting
    #[arg(long, value_name = "PATH")]
    pub seed: Option<PathBuf>,

    /// Log to stderr instead of the log file
    #[arg(short, long)]
    pub verbose: bool,
}

/// What the binary should do after startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Read questions from stdin until `exit`.
    Interactive,
    /// Answer one question.
    Ask { question: String },
    /// Revise one query from feedback.
    Revise {
        question: String,
        previous_sql: String,
        feedback: String,
    },
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Determines the run mode from the question and feedback flags.
    pub fn mode(&self) -> RunMode {
        match (&self.question, &self.feedback, &self.previous_sql) {
            (Some(question), Some(feedback), Some(previous_sql)) => RunMode::Revise {
                question: question.clone(),
                previous_sql: previous_sql.clone(),
                feedback: feedback.clone(),
            },
            (Some(question), _, _) => RunMode::Ask {
                question: question.clone(),
            },
            _ => RunMode::Interactive,
        }
    }

    /// Applies CLI flags on top of file and environment configuration.
    pub fn apply_to(&self, config: &mut Config) -> Result<()> {
        if let Some(database) = &self.database {
            config.database_url = Some(database.clone());
        }
        if let Some(llm) = &self.llm {
            let provider: LlmProvider = llm.parse().map_err(AskError::config)?;
            config.llm.provider = provider.as_str().to_string();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_args(args: &[&str]) -> Cli {
        Cli::parse_from(args)
    }

    #[test]
    fn test_no_args_is_interactive() {
        let cli = parse_args(&["askdb"]);
        assert_eq!(cli.mode(), RunMode::Interactive);
        assert!(!cli.verbose);
    }

    #[test]
    fn test_parse_question() {
        let cli = parse_args(&["askdb", "--question", "How many users exist?"]);
        assert_eq!(
            cli.mode(),
            RunMode::Ask {
                question: "How many users exist?".to_string()
            }
        );

        let cli = parse_args(&["askdb", "-q", "Top products?"]);
        assert_eq!(cli.question, Some("Top products?".to_string()));
    }

    #[test]
    fn test_parse_feedback_revision() {
        let cli = parse_args(&[
            "askdb",
            "--question",
            "List users",
            "--previous-sql",
            "SELECT name FROM users ORDER BY name",
            "--feedback",
            "don't sort by name",
        ]);
        assert_eq!(
            cli.mode(),
            RunMode::Revise {
                question: "List users".to_string(),
                previous_sql: "SELECT name FROM users ORDER BY name".to_string(),
                feedback: "don't sort by name".to_string(),
            }
        );
    }

    #[test]
    fn test_feedback_requires_question_and_sql() {
        let result = Cli::try_parse_from(["askdb", "--feedback", "wrong"]);
        assert!(result.is_err());

        let result = Cli::try_parse_from(["askdb", "--previous-sql", "SELECT 1"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_config_and_seed() {
        let cli = parse_args(&[
            "askdb",
            "--config",
            "/path/to/config.toml",
            "--seed",
            "tests/fixtures/shop.sql",
        ]);
        assert_eq!(cli.config_path(), PathBuf::from("/path/to/config.toml"));
        assert_eq!(cli.seed, Some(PathBuf::from("tests/fixtures/shop.sql")));
    }

    #[test]
    fn test_default_config_path() {
        let cli = parse_args(&["askdb"]);
        assert_eq!(cli.config_path(), Config::default_path());
    }

    #[test]
    fn test_apply_overrides_config() {
        let cli = parse_args(&["askdb", "--database", "sqlite::memory:", "--llm", "MOCK"]);
        let mut config = Config::default();
        cli.apply_to(&mut config).unwrap();

        assert_eq!(config.database_url.as_deref(), Some("sqlite::memory:"));
        assert_eq!(config.llm.provider, "mock");
    }

    #[test]
    fn test_apply_rejects_unknown_provider() {
        let cli = parse_args(&["askdb", "--llm", "anthropic"]);
        let err = cli.apply_to(&mut Config::default()).unwrap_err();
        assert!(err.to_string().contains("Unknown LLM provider"));
    }
}
