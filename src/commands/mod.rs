//! Top-level operations of the export job.
//!
//! Each operation runs one query end to end and returns a typed result, so
//! the caller decides whether a failure stops the run:
//! - Unique user listing (in memory only)
//! - Daily session-count export to CSV

pub mod sessions;
pub mod users;

pub use sessions::{export_session_counts, ExportTarget};
pub use users::list_users;

use tracing::error;

use crate::bigquery::JobRunner;
use crate::error::AppError;
use crate::export::ExportSummary;
use crate::extract::User;
use crate::templates::DateRange;

/// Outcome of each stage of a run.
#[derive(Debug)]
pub struct RunReport {
    pub users: Result<Vec<User>, AppError>,
    pub export: Result<ExportSummary, AppError>,
}

/// Runs the user listing, then the session export.
///
/// A failed stage is logged and does not stop the other one.
pub async fn run(runner: &JobRunner, range: &DateRange, target: &ExportTarget) -> RunReport {
    let users = list_users(runner, range).await;
    if let Err(e) = &users {
        error!("[USERS] Listing failed: {}", e);
    }

    let export = export_session_counts(runner, range, target).await;
    if let Err(e) = &export {
        error!("[EXPORT] Session count export failed: {}", e);
    }

    RunReport { users, export }
}
