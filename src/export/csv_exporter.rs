//! Atomic CSV export with automatic cleanup on failure.
//!
//! Rows go to a temporary file next to the destination, which replaces the
//! destination on `finish()`. Dropping the exporter before that deletes the
//! temporary file and leaves any earlier export untouched.

use std::io::BufWriter;
use std::path::{Path, PathBuf};

use csv::{Writer, WriterBuilder};
use tempfile::NamedTempFile;
use tracing::info;

use crate::error::AppError;

/// Outcome of a finished export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub path: PathBuf,
    /// Data rows, not counting the header.
    pub rows_written: u64,
}

/// Writes a header record followed by data records to one CSV file.
pub struct CsvExporter {
    writer: Writer<BufWriter<NamedTempFile>>,
    final_path: PathBuf,
    header_written: bool,
    rows_written: u64,
}

impl CsvExporter {
    /// Creates an exporter targeting `dir/file_name`, creating `dir` if needed.
    pub fn create(dir: impl AsRef<Path>, file_name: &str) -> Result<Self, AppError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| {
            AppError::Export(format!(
                "Failed to create export directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Self::new(dir.join(file_name))
    }

    /// Creates an exporter targeting `final_path`.
    ///
    /// The temporary file lives in the same directory so the final rename
    /// stays on one filesystem.
    pub fn new(final_path: impl AsRef<Path>) -> Result<Self, AppError> {
        let final_path = final_path.as_ref().to_path_buf();

        let parent_dir = match final_path.parent() {
            Some(p) if p.as_os_str().is_empty() => Path::new("."),
            Some(p) => p,
            None => {
                return Err(AppError::Export(format!(
                    "Cannot determine parent directory for: {}",
                    final_path.display()
                )))
            }
        };

        let temp_file = NamedTempFile::new_in(parent_dir)
            .map_err(|e| AppError::Export(format!("Failed to create temporary file: {}", e)))?;

        let writer = WriterBuilder::new()
            .flexible(true)
            .from_writer(BufWriter::new(temp_file));

        Ok(Self {
            writer,
            final_path,
            header_written: false,
            rows_written: 0,
        })
    }

    /// Writes the header record. Must precede every data row.
    pub fn write_header<S: AsRef<[u8]>>(&mut self, columns: &[S]) -> Result<(), AppError> {
        if self.header_written || self.rows_written > 0 {
            return Err(AppError::Export(
                "Header must be written once, before any data row".to_string(),
            ));
        }
        self.writer.write_record(columns)?;
        self.header_written = true;
        Ok(())
    }

    /// Writes one data record as given; widths are not checked against the header.
    pub fn write_row<S: AsRef<[u8]>>(&mut self, fields: &[S]) -> Result<(), AppError> {
        if !self.header_written {
            return Err(AppError::Export(
                "Data row written before header".to_string(),
            ));
        }
        self.writer.write_record(fields)?;
        self.rows_written += 1;
        Ok(())
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Flushes and atomically moves the file into place.
    pub fn finish(self) -> Result<ExportSummary, AppError> {
        let buf_writer = self.writer.into_inner().map_err(|e| {
            AppError::Export(format!("Failed to flush CSV writer: {}", e.error()))
        })?;

        let named_temp = buf_writer
            .into_inner()
            .map_err(|e| AppError::Export(format!("Failed to flush buffer: {}", e.error())))?;

        named_temp.persist(&self.final_path).map_err(|e| {
            AppError::Export(format!(
                "Failed to persist file to {}: {}",
                self.final_path.display(),
                e.error
            ))
        })?;

        info!(
            "[EXPORT] Wrote {} rows to {}",
            self.rows_written,
            self.final_path.display()
        );

        Ok(ExportSummary {
            path: self.final_path,
            rows_written: self.rows_written,
        })
    }

    /// Writes a complete file in one call.
    pub fn export<H, R>(path: impl AsRef<Path>, header: &[H], rows: R) -> Result<ExportSummary, AppError>
    where
        H: AsRef<[u8]>,
        R: IntoIterator,
        R::Item: AsRef<[String]>,
    {
        let mut exporter = Self::new(path)?;
        exporter.write_header(header)?;
        for row in rows {
            exporter.write_row(row.as_ref())?;
        }
        exporter.finish()
    }
}
