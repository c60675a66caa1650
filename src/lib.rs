//! askdb - ask questions about a SQL database in natural language.
//!
//! Generated queries are executed read-only and repaired from their own
//! error messages until one runs, then the result is turned into an answer.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod llm;
pub mod logging;
pub mod persistence;
pub mod query;
pub mod retry;
pub mod safety;
