//! CSV output for query results.
//!
//! Files are written atomically: a temporary file in the target directory is
//! persisted over the destination only once every row is written.

mod csv_exporter;

pub use csv_exporter::{CsvExporter, ExportSummary};
