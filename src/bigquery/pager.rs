//! Forward-only cursor over a finished query's result pages.

use futures_util::stream::{self, Stream};
use tracing::debug;

use crate::bigquery::client::{BigQueryClient, QueryResultsPage};
use crate::bigquery::redact_id;
use crate::bigquery::types::{Row, TableSchema};
use crate::error::AppError;

/// Rows of a completed query job, fetched one page at a time.
///
/// Pages are requested lazily as the current one runs out. The set is
/// consumed by iteration and cannot be restarted.
pub struct ResultSet {
    client: BigQueryClient,
    job_id: String,
    schema: TableSchema,
    total_rows: Option<u64>,
    page_size: Option<u32>,
    current: std::vec::IntoIter<Row>,
    next_page_token: Option<String>,
    pages_fetched: u32,
}

impl ResultSet {
    pub(crate) fn new(
        client: BigQueryClient,
        job_id: String,
        first_page: QueryResultsPage,
        page_size: Option<u32>,
    ) -> Self {
        Self {
            client,
            job_id,
            schema: first_page.schema.unwrap_or_default(),
            total_rows: first_page.total_rows,
            page_size,
            current: first_page.rows.into_iter(),
            next_page_token: first_page.page_token,
            pages_fetched: 1,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Row count reported by the service for the whole result, if known.
    pub fn total_rows(&self) -> Option<u64> {
        self.total_rows
    }

    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    /// Returns the next row, fetching the following page when needed.
    /// `Ok(None)` once the last page is exhausted.
    pub async fn next_row(&mut self) -> Result<Option<Row>, AppError> {
        loop {
            if let Some(row) = self.current.next() {
                return Ok(Some(row));
            }

            let Some(token) = self.next_page_token.take() else {
                return Ok(None);
            };

            let page = self
                .client
                .get_query_results(&self.job_id, Some(&token), self.page_size)
                .await?;
            self.pages_fetched += 1;

            debug!(
                "[PAGER] {} page {} ({} rows)",
                redact_id(&self.job_id),
                self.pages_fetched,
                page.rows.len()
            );

            self.next_page_token = page.page_token;
            self.current = page.rows.into_iter();
        }
    }

    /// Visits every remaining row in order, stopping at the first error.
    ///
    /// Returns the number of rows visited.
    pub async fn for_each_row<F>(mut self, mut visit: F) -> Result<u64, AppError>
    where
        F: FnMut(Row) -> Result<(), AppError>,
    {
        let mut visited = 0u64;
        while let Some(row) = self.next_row().await? {
            visit(row)?;
            visited += 1;
        }
        Ok(visited)
    }

    /// Turns the remaining rows into a stream.
    pub fn into_stream(self) -> impl Stream<Item = Result<Row, AppError>> {
        stream::try_unfold(self, |mut result_set| async move {
            let row = result_set.next_row().await?;
            Ok::<_, AppError>(row.map(|row| (row, result_set)))
        })
    }
}
