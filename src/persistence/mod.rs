//! Persistence layer for askdb.
//!
//! The only artifact askdb keeps on disk is the append-only feedback log.

mod feedback_log;

pub use feedback_log::{FeedbackEntry, FeedbackLog};
