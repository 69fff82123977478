use thiserror::Error;

/// Patterns (lowercase) that indicate credentials echoed back by the API.
/// Used by `contains_sensitive()` for case-insensitive matching.
pub(crate) const SENSITIVE_PATTERNS: &[&str] = &[
    "bearer ",
    "access_token",
    "refresh_token",
    "client_secret",
    "authorization:",
];

/// Returns true if the message contains any sensitive pattern (case-insensitive).
fn contains_sensitive(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Replaces a message with `fallback` if it carries sensitive content.
pub(crate) fn sanitize_message(msg: &str, fallback: &str) -> String {
    if contains_sensitive(msg) {
        fallback.into()
    } else {
        msg.to_string()
    }
}

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Jobs ──────────────────────────────────────────────────────────────────
    #[error("Job no longer exists: {job_id}")]
    JobNotFound { job_id: String },

    #[error("Query job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    #[error("Timed out: {0}")]
    Timeout(String),

    // ── API ───────────────────────────────────────────────────────────────────
    #[error("BigQuery error: {0}")]
    Warehouse(String),

    #[error("Rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    // ── Network ───────────────────────────────────────────────────────────────
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    // ── Rows / Queries ────────────────────────────────────────────────────────
    #[error("Unexpected row shape: {0}")]
    RowShape(String),

    #[error("Query template error: {0}")]
    Template(String),

    // ── File / CSV ────────────────────────────────────────────────────────────
    #[error("Export failed: {0}")]
    Export(String),

    // ── Configuration ─────────────────────────────────────────────────────────
    #[error("Invalid configuration: {0}")]
    Config(String),

    // ── Generic fallback ──────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Builds a `Warehouse` error from an API-provided message, dropping it
    /// if it echoes credentials.
    pub fn warehouse(msg: impl AsRef<str>) -> Self {
        AppError::Warehouse(sanitize_message(
            msg.as_ref(),
            "BigQuery returned an error (details withheld)",
        ))
    }

    /// Maps a transport error, keeping timeouts distinct.
    pub(crate) fn from_transport(context: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::Timeout(format!("{}: {}", context, err))
        } else {
            AppError::ConnectionFailed(format!("{}: {}", context, err))
        }
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        AppError::Export(err.to_string())
    }
}
