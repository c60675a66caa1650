//! Query execution for askdb.
//!
//! Runs candidate SQL behind the read-only policy gate and reports each
//! attempt as a success or a plain-text failure.

pub mod executor;

pub use executor::{ExecutionOutcome, QueryExecutor};
