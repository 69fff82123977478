//! BigQuery query-job layer.
//!
//! This module provides everything between a query string and its rows:
//!
//! - **Wire client** for the jobs API, authenticated with a bearer token held
//!   in `secrecy::SecretString`
//! - **Job runner** that submits under a fresh UUID and waits for completion
//! - **Result pager** that walks result pages lazily
//! - **Safe logging** that never prints query text or the token

pub mod client;
pub mod job_runner;
pub mod pager;
pub mod types;

pub use client::{BigQueryClient, JobInfo, JobReference, QueryResultsPage};
pub use job_runner::{JobRunner, PollSettings};
pub use pager::ResultSet;
pub use types::{FieldValue, JobState, Row, TableSchema};

/// Redacts a job ID for logging (shows first 8 chars).
pub(crate) fn redact_id(id: &str) -> String {
    match id.char_indices().nth(8) {
        Some((cut, _)) => format!("{}...", &id[..cut]),
        None => id.to_string(),
    }
}
