//! askdb - ask questions about a SQL database in natural language.

mod cli;

use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use askdb::config::Config;
use askdb::db::{self, DatabaseClient, SqliteClient};
use askdb::engine::{Answer, Assistant, SessionContext};
use askdb::error::AskError;
use askdb::llm::create_client;
use askdb::logging;
use askdb::persistence::{FeedbackEntry, FeedbackLog};
use askdb::query::QueryExecutor;
use cli::{Cli, RunMode};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn};

type InputLines = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    let mode = cli.mode();

    if cli.verbose || mode != RunMode::Interactive {
        logging::init_stderr_logging();
    } else {
        logging::init_file_logging();
    }

    match run(cli, mode).await {
        Ok(code) => code,
        Err(e) => {
            let category = e
                .downcast_ref::<AskError>()
                .map(AskError::category)
                .unwrap_or("Error");
            eprintln!("{category}: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, mode: RunMode) -> Result<ExitCode> {
    let config = load_config(&cli)?;

    let database_url = config.database_url.clone().ok_or_else(|| {
        AskError::config("No database configured. Use --database or set ASKDB_DATABASE_URL.")
    })?;
    let db = Arc::new(open_database(&database_url, cli.seed.as_deref()).await?);

    let llm = create_client(&config.llm, std::env::var("OPENAI_API_KEY").ok())?;
    info!(provider = %config.llm.provider, model = %config.llm.model, "LLM client ready");

    let assistant = Assistant::from_config(
        Arc::from(llm),
        db.clone(),
        QueryExecutor::new(db.clone()),
        &config,
    );
    let feedback_log = config.feedback.log_file().map(FeedbackLog::new);

    let outcome = match mode {
        RunMode::Interactive => interactive(&assistant, feedback_log.as_ref()).await,
        RunMode::Ask { question } => {
            let answer = assistant.ask(&question).await?;
            one_shot(answer)
        }
        RunMode::Revise {
            question,
            previous_sql,
            feedback,
        } => {
            let answer = assistant.revise(&question, &previous_sql, &feedback).await?;
            one_shot(answer)
        }
    };

    db.close().await?;
    outcome.map(|()| ExitCode::SUCCESS)
}

/// Builds the configuration: CLI flags over environment over file over defaults.
fn load_config(cli: &Cli) -> Result<Config> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());

    let mut config = Config::load_from_file(&config_path)?;
    config.apply_env_overrides();
    cli.apply_to(&mut config)?;
    config.validate()?;
    Ok(config)
}

/// Opens the database read-only, running the seed script first when given.
async fn open_database(url: &str, seed: Option<&Path>) -> Result<SqliteClient> {
    let Some(seed) = seed else {
        return Ok(db::connect(url, true).await?);
    };

    let script = tokio::fs::read_to_string(seed)
        .await
        .with_context(|| format!("Failed to read seed file {}", seed.display()))?;
    db::seed(url, &script)
        .await
        .with_context(|| format!("Failed to run seed file {}", seed.display()))
}

fn one_shot(answer: Answer) -> Result<()> {
    if let Some(err) = answer.exhausted_error() {
        return Err(err.into());
    }
    print_answer(&answer);
    Ok(())
}

fn print_answer(answer: &Answer) {
    println!("\n{}", answer.text.trim_end());
    if let Some(query) = &answer.query {
        println!("\nSQL used:\n{query}");
    }
    if answer.attempts.len() > 1 {
        println!("({} attempts)", answer.attempts.len());
    }
    println!();
}

async fn interactive(assistant: &Assistant, feedback_log: Option<&FeedbackLog>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut session = SessionContext::new();

    println!("askdb: ask a question about your data. '/reset' forgets the last answer.");

    while let Some(question) = read_line(&mut lines, "Question (or 'exit'): ").await? {
        match question.as_str() {
            "" => continue,
            "exit" | "quit" => break,
            "/reset" => {
                session.clear();
                println!("Context cleared.\n");
                continue;
            }
            _ => {}
        }

        let answer = match assistant.ask(&question).await {
            Ok(answer) => answer,
            Err(e) => {
                eprintln!("{}: {e}\n", e.category());
                continue;
            }
        };
        print_answer(&answer);
        session.record(&question, &answer);

        if answer.is_exhausted() {
            continue;
        }

        let Some(helpful) = read_line(&mut lines, "Was this helpful? (y/n): ").await? else {
            break;
        };
        if !matches!(helpful.to_lowercase().as_str(), "n" | "no") {
            continue;
        }

        let Some(feedback) = read_line(&mut lines, "What was wrong? ").await? else {
            break;
        };
        if feedback.is_empty() {
            println!("No feedback given.\n");
            continue;
        }

        let Some((question, rejected_sql)) = session
            .feedback_target()
            .map(|(q, sql)| (q.to_string(), sql.to_string()))
        else {
            continue;
        };

        if let Some(log) = feedback_log {
            let entry = FeedbackEntry::new(&question, &rejected_sql, &feedback);
            if let Err(e) = log.append(&entry).await {
                warn!(error = %e, "Could not record feedback");
                eprintln!("{}: {e}", e.category());
            }
        }

        println!("Revising the query...");
        match assistant.revise(&question, &rejected_sql, &feedback).await {
            Ok(revised) => {
                print_answer(&revised);
                session.record(&question, &revised);
            }
            Err(e) => eprintln!("{}: {e}\n", e.category()),
        }
    }

    Ok(())
}

async fn read_line(lines: &mut InputLines, label: &str) -> Result<Option<String>> {
    print!("{label}");
    std::io::stdout().flush()?;
    Ok(lines.next_line().await?.map(|line| line.trim().to_string()))
}
