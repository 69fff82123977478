//! Daily usage export from the BigQuery analytics event tables.
//!
//! Two stages share one [`bigquery::JobRunner`]: listing the unique users
//! seen in a date range, and exporting per-day session counts to CSV.

pub mod bigquery;
pub mod commands;
pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod templates;
