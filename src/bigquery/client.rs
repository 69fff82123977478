//! BigQuery REST v2 client for query jobs.
//!
//! This module provides functionality to:
//! - Insert query jobs under a caller-chosen job id
//! - Fetch job status
//! - Fetch pages of query results by job id
//!
//! # Security
//!
//! - Query text is never logged
//! - The access token is never logged
//! - Only HTTP method, path shape, redacted job ids and status codes are logged

use std::sync::Arc;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use crate::bigquery::types::{ErrorProto, JobState, Row, TableSchema, WireRow};
use crate::bigquery::redact_id;
use crate::error::AppError;

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

/// Identifies a job within a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReference {
    pub project_id: String,
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Status block of a job resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub state: JobState,
    /// Final error; present only when a `DONE` job failed.
    #[serde(default)]
    pub error_result: Option<ErrorProto>,
    /// Every error encountered, including non-fatal ones.
    #[serde(default)]
    pub errors: Option<Vec<ErrorProto>>,
}

/// Job resource as returned by `jobs.insert` and `jobs.get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    #[serde(default)]
    pub job_reference: Option<JobReference>,
    pub status: JobStatus,
}

/// One page of `jobs.getQueryResults`.
#[derive(Debug, Clone, Default)]
pub struct QueryResultsPage {
    pub schema: Option<TableSchema>,
    pub rows: Vec<Row>,
    pub page_token: Option<String>,
    pub total_rows: Option<u64>,
    pub job_complete: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertJobRequest<'a> {
    job_reference: JobReference,
    configuration: JobConfiguration<'a>,
}

#[derive(Debug, Serialize)]
struct JobConfiguration<'a> {
    query: JobConfigurationQuery<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobConfigurationQuery<'a> {
    query: &'a str,
    use_legacy_sql: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireQueryResults {
    #[serde(default)]
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<WireRow>,
    #[serde(default)]
    page_token: Option<String>,
    /// Sent as a decimal string.
    #[serde(default)]
    total_rows: Option<String>,
    #[serde(default)]
    job_complete: Option<bool>,
}

/// Google API error envelope.
#[derive(Debug, Deserialize)]
struct WireErrorEnvelope {
    error: WireError,
}

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

// ─────────────────────────────────────────────────────────────────────────────
// BigQueryClient
// ─────────────────────────────────────────────────────────────────────────────

/// Client for the BigQuery jobs API of a single project.
#[derive(Clone)]
pub struct BigQueryClient {
    /// Shared HTTP client.
    client: Arc<Client>,
    /// API root (e.g., "https://bigquery.googleapis.com").
    base_url: Url,
    project_id: String,
    /// Job location, required for jobs outside US/EU multi-regions.
    location: Option<String>,
    access_token: SecretString,
}

impl std::fmt::Debug for BigQueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BigQueryClient")
            .field("base_url", &self.base_url.as_str())
            .field("project_id", &self.project_id)
            .field("location", &self.location)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl BigQueryClient {
    /// Creates a new client.
    ///
    /// # Arguments
    ///
    /// * `client` - Shared HTTP client
    /// * `base_url` - API root URL
    /// * `project_id` - Project that owns (and is billed for) the jobs
    /// * `location` - Optional job location
    /// * `access_token` - OAuth access token
    pub fn new(
        client: Arc<Client>,
        base_url: Url,
        project_id: impl Into<String>,
        location: Option<String>,
        access_token: SecretString,
    ) -> Self {
        Self {
            client,
            base_url,
            project_id: project_id.into(),
            location,
            access_token,
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Inserts a query job with the given id, using the legacy SQL dialect.
    ///
    /// # Errors
    ///
    /// - `AppError::Warehouse` - API error
    /// - `AppError::RateLimited` - Rate limit exceeded
    /// - `AppError::ConnectionFailed` / `AppError::Timeout` - Network error
    pub async fn insert_query_job(&self, job_id: &str, sql: &str) -> Result<JobInfo, AppError> {
        let url = self.build_url(&["jobs"], &[])?;

        let request_body = InsertJobRequest {
            job_reference: JobReference {
                project_id: self.project_id.clone(),
                job_id: job_id.to_string(),
                location: self.location.clone(),
            },
            configuration: JobConfiguration {
                query: JobConfigurationQuery {
                    query: sql,
                    use_legacy_sql: true,
                },
            },
        };

        info!("[BQ] POST /jobs (inserting {})", redact_id(job_id));

        let response = self
            .client
            .post(url)
            .bearer_auth(self.access_token.expose_secret())
            .json(&request_body)
            .send()
            .await
            .map_err(|e| AppError::from_transport("Job insert failed", e))?;

        let status = response.status();
        info!("[BQ] POST /jobs -> {}", status.as_u16());

        if !status.is_success() {
            return Err(parse_error_response(response, status).await);
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to parse job insert response: {}", e)))
    }

    /// Gets the current job resource.
    ///
    /// A 404 means the job no longer exists and maps to `AppError::JobNotFound`.
    pub async fn get_job(&self, job_id: &str) -> Result<JobInfo, AppError> {
        let url = self.build_url(&["jobs", job_id], &[])?;

        let response = self
            .client
            .get(url)
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await
            .map_err(|e| AppError::from_transport("Job status check failed", e))?;

        let status = response.status();
        info!("[BQ] GET /jobs/{} -> {}", redact_id(job_id), status.as_u16());

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::JobNotFound {
                job_id: job_id.to_string(),
            });
        }
        if !status.is_success() {
            return Err(parse_error_response(response, status).await);
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to parse job status response: {}", e)))
    }

    /// Fetches one page of a finished query's results.
    ///
    /// # Arguments
    ///
    /// * `job_id` - The query job
    /// * `page_token` - Token from the previous page, `None` for the first page
    /// * `max_results` - Optional page size cap
    pub async fn get_query_results(
        &self,
        job_id: &str,
        page_token: Option<&str>,
        max_results: Option<u32>,
    ) -> Result<QueryResultsPage, AppError> {
        let max_results = max_results.map(|n| n.to_string());
        let mut params: Vec<(&str, &str)> = Vec::new();
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }
        if let Some(n) = max_results.as_deref() {
            params.push(("maxResults", n));
        }
        let url = self.build_url(&["queries", job_id], &params)?;

        let response = self
            .client
            .get(url)
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await
            .map_err(|e| AppError::from_transport("Results fetch failed", e))?;

        let status = response.status();
        info!(
            "[BQ] GET /queries/{}{} -> {}",
            redact_id(job_id),
            if page_token.is_some() { " (paginated)" } else { "" },
            status.as_u16()
        );

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::JobNotFound {
                job_id: job_id.to_string(),
            });
        }
        if !status.is_success() {
            return Err(parse_error_response(response, status).await);
        }

        let wire: WireQueryResults = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to parse query results: {}", e)))?;

        let rows = wire
            .rows
            .into_iter()
            .map(Row::from_wire)
            .collect::<Result<Vec<_>, _>>()?;

        let total_rows = match wire.total_rows {
            Some(raw) => Some(raw.parse::<u64>().map_err(|_| {
                AppError::Internal(format!("Invalid totalRows value: {}", raw))
            })?),
            None => None,
        };

        Ok(QueryResultsPage {
            schema: wire.schema,
            rows,
            page_token: wire.page_token.filter(|t| !t.is_empty()),
            total_rows,
            job_complete: wire.job_complete.unwrap_or(true),
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // URL Builders
    // ─────────────────────────────────────────────────────────────────────────

    /// Builds `/bigquery/v2/projects/{project}/{segments...}` with the job
    /// location appended when configured.
    fn build_url(&self, segments: &[&str], params: &[(&str, &str)]) -> Result<Url, AppError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Internal("API base URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["bigquery", "v2", "projects", self.project_id.as_str()])
            .extend(segments);

        let has_params = !params.is_empty() || self.location.is_some();
        if has_params {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
            if let Some(location) = &self.location {
                pairs.append_pair("location", location);
            }
        }

        Ok(url)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Error Handling
// ─────────────────────────────────────────────────────────────────────────────

/// Parses an error response and maps to the appropriate AppError.
async fn parse_error_response(
    response: reqwest::Response,
    status: reqwest::StatusCode,
) -> AppError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        return AppError::RateLimited {
            retry_after_secs: retry_after,
        };
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("Unable to read error body"));

    if let Ok(envelope) = serde_json::from_str::<WireErrorEnvelope>(&body) {
        let error = envelope.error;
        if error.errors.iter().any(|e| {
            matches!(e.reason.as_deref(), Some("rateLimitExceeded") | Some("quotaExceeded"))
        }) {
            return AppError::RateLimited {
                retry_after_secs: None,
            };
        }

        let code = error
            .errors
            .first()
            .and_then(|e| e.reason.clone())
            .or(error.status)
            .unwrap_or_else(|| status.as_u16().to_string());
        return AppError::warehouse(format!("[{}] {}", code, error.message));
    }

    AppError::warehouse(format!(
        "HTTP {} - {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown error")
    ))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
