//! Daily session-count export.

use std::path::PathBuf;

use tracing::info;

use crate::bigquery::JobRunner;
use crate::error::AppError;
use crate::export::{CsvExporter, ExportSummary};
use crate::extract::flatten_row;
use crate::templates::{DateRange, QueryTemplate};

/// Where the session-count CSV goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTarget {
    pub dir: PathBuf,
    pub file_name: String,
}

impl ExportTarget {
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }
}

/// Runs the daily count query for `range` and writes it to `target`.
///
/// The header is the result schema; rows follow in result order. On any
/// error the target file is left as it was.
pub async fn export_session_counts(
    runner: &JobRunner,
    range: &DateRange,
    target: &ExportTarget,
) -> Result<ExportSummary, AppError> {
    let sql = QueryTemplate::AllEventsDailyCount.render_range(range)?;
    info!("[EXPORT] Exporting daily session counts for {}", range);

    let mut result_set = runner.run_query(&sql).await?;

    let mut exporter = CsvExporter::create(&target.dir, &target.file_name)?;
    exporter.write_header(&result_set.schema().field_names())?;

    while let Some(row) = result_set.next_row().await? {
        exporter.write_row(&flatten_row(&row)?)?;
    }

    exporter.finish()
}
