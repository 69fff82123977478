//! Unique-user listing.

use futures_util::{future, TryStreamExt};
use tracing::info;

use crate::bigquery::JobRunner;
use crate::error::AppError;
use crate::extract::User;
use crate::templates::{DateRange, QueryTemplate};

/// Lists every user seen in `range`, in the order the warehouse returns them.
///
/// A single malformed row fails the whole listing.
pub async fn list_users(runner: &JobRunner, range: &DateRange) -> Result<Vec<User>, AppError> {
    let sql = QueryTemplate::ListUniqueUsers.render_range(range)?;
    info!("[USERS] Listing unique users for {}", range);

    let result_set = runner.run_query(&sql).await?;
    let users: Vec<User> = result_set
        .into_stream()
        .and_then(|row| future::ready(User::from_row(&row)))
        .try_collect()
        .await?;

    info!("[USERS] Found {} users", users.len());
    Ok(users)
}
