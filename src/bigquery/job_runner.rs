//! Submit a query, wait for it, hand back its result set.

use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bigquery::client::{BigQueryClient, JobInfo, QueryResultsPage};
use crate::bigquery::pager::ResultSet;
use crate::bigquery::redact_id;
use crate::error::AppError;

/// Result fetches tolerated with `jobComplete: false` before giving up.
const MAX_INCOMPLETE_FETCHES: u32 = 5;

/// Backoff used while waiting for a job to finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(1000),
            max: Duration::from_millis(10_000),
        }
    }
}

/// Runs one query job at a time against a project.
#[derive(Debug, Clone)]
pub struct JobRunner {
    client: BigQueryClient,
    poll: PollSettings,
    page_size: Option<u32>,
}

impl JobRunner {
    pub fn new(client: BigQueryClient, poll: PollSettings, page_size: Option<u32>) -> Self {
        Self {
            client,
            poll,
            page_size,
        }
    }

    /// Submits `sql` under a fresh job id and waits for it to finish.
    ///
    /// There is no overall deadline; `AppError::Timeout` only surfaces when an
    /// individual HTTP call times out.
    ///
    /// # Errors
    ///
    /// - `AppError::JobNotFound` - the job disappeared while waiting
    /// - `AppError::JobFailed` - the job finished with an error result
    /// - any transport or API error from the underlying calls
    pub async fn run_query(&self, sql: &str) -> Result<ResultSet, AppError> {
        let job_id = Uuid::new_v4().to_string();

        let job = self.client.insert_query_job(&job_id, sql).await?;
        info!("[JOB] Submitted {} ({:?})", redact_id(&job_id), job.status.state);

        let job = self.wait_for_completion(&job_id, job).await?;

        if let Some(error) = job.status.error_result {
            return Err(AppError::JobFailed {
                job_id,
                message: error.to_string(),
            });
        }
        if let Some(errors) = job.status.errors.as_ref().filter(|e| !e.is_empty()) {
            warn!(
                "[JOB] {} succeeded with {} non-fatal error(s)",
                redact_id(&job_id),
                errors.len()
            );
        }

        let first_page = self.fetch_first_page(&job_id).await?;

        info!(
            "[JOB] {} complete, {} total rows",
            redact_id(&job_id),
            first_page
                .total_rows
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        );

        Ok(ResultSet::new(
            self.client.clone(),
            job_id,
            first_page,
            self.page_size,
        ))
    }

    /// Fetches the first results page by job id, never from the job handle.
    ///
    /// A `DONE` job can still answer `jobComplete: false` for a short while;
    /// the page is re-fetched with the poll backoff a bounded number of times.
    async fn fetch_first_page(&self, job_id: &str) -> Result<QueryResultsPage, AppError> {
        let mut interval = self.poll.initial;
        let mut attempts = 1;

        loop {
            let page = self
                .client
                .get_query_results(job_id, None, self.page_size)
                .await?;
            if page.job_complete {
                return Ok(page);
            }
            if attempts >= MAX_INCOMPLETE_FETCHES {
                return Err(AppError::Warehouse(format!(
                    "Results for job {} not ready after {} attempts",
                    job_id, attempts
                )));
            }

            debug!("[JOB] {} results not ready, retrying", redact_id(job_id));
            tokio::time::sleep(interval).await;
            interval = (interval * 2).min(self.poll.max);
            attempts += 1;
        }
    }

    /// Polls the job with exponential backoff until it reaches `DONE`.
    async fn wait_for_completion(&self, job_id: &str, mut job: JobInfo) -> Result<JobInfo, AppError> {
        let mut interval = self.poll.initial;

        while !job.status.state.is_terminal() {
            tokio::time::sleep(interval).await;
            job = self.client.get_job(job_id).await?;
            interval = (interval * 2).min(self.poll.max);
        }

        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use secrecy::SecretString;
    use url::Url;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_runner(mock_url: &str) -> JobRunner {
        let client = BigQueryClient::new(
            Arc::new(reqwest::Client::new()),
            Url::parse(mock_url).unwrap(),
            "test-project",
            None,
            SecretString::from("test_token".to_string()),
        );
        let poll = PollSettings {
            initial: Duration::from_millis(5),
            max: Duration::from_millis(20),
        };
        JobRunner::new(client, poll, None)
    }

    async fn mount_insert(server: &MockServer, state: &str) {
        Mock::given(method("POST"))
            .and(path("/bigquery/v2/projects/test-project/jobs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": { "state": state }
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_run_query_success_returns_result_set() {
        let mock_server = MockServer::start().await;
        let runner = create_test_runner(&mock_server.uri());

        mount_insert(&mock_server, "DONE").await;

        Mock::given(method("GET"))
            .and(path_regex(r"^/bigquery/v2/projects/test-project/queries/[0-9a-f-]{36}$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jobComplete": true,
                "totalRows": "1",
                "schema": { "fields": [{ "name": "n", "type": "INTEGER" }] },
                "rows": [{ "f": [{ "v": "1" }] }]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result_set = runner.run_query("SELECT 1 AS n").await.unwrap();

        assert_eq!(result_set.schema().field_names(), vec!["n"]);
        assert_eq!(result_set.total_rows(), Some(1));
    }

    #[tokio::test]
    async fn test_run_query_polls_until_done() {
        let mock_server = MockServer::start().await;
        let runner = create_test_runner(&mock_server.uri());

        mount_insert(&mock_server, "PENDING").await;

        Mock::given(method("GET"))
            .and(path_regex(r"^/bigquery/v2/projects/test-project/jobs/[0-9a-f-]{36}$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": { "state": "RUNNING" }
            })))
            .up_to_n_times(2)
            .expect(2)
            .mount(&mock_server)
            .await;

        // Only reached once the RUNNING responses are used up.
        Mock::given(method("GET"))
            .and(path_regex(r"^/bigquery/v2/projects/test-project/jobs/[0-9a-f-]{36}$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": { "state": "DONE" }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path_regex(r"^/bigquery/v2/projects/test-project/queries/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jobComplete": true,
                "totalRows": "0",
                "schema": { "fields": [] }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = runner.run_query("SELECT 1").await;
        assert!(result.is_ok(), "got: {:?}", result.err());
    }

    #[tokio::test]
    async fn test_run_query_job_error_embeds_description() {
        let mock_server = MockServer::start().await;
        let runner = create_test_runner(&mock_server.uri());

        mount_insert(&mock_server, "RUNNING").await;

        Mock::given(method("GET"))
            .and(path_regex(r"^/bigquery/v2/projects/test-project/jobs/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": {
                    "state": "DONE",
                    "errorResult": {
                        "reason": "invalidQuery",
                        "message": "Field 'user_dim.bogus' not found"
                    }
                }
            })))
            .mount(&mock_server)
            .await;

        // No results may be fetched for a failed job.
        Mock::given(method("GET"))
            .and(path_regex(r"^/bigquery/v2/projects/test-project/queries/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        match runner.run_query("SELECT bogus").await {
            Err(AppError::JobFailed { job_id, message }) => {
                assert_eq!(job_id.len(), 36);
                assert!(message.contains("invalidQuery"));
                assert!(message.contains("Field 'user_dim.bogus' not found"));
            }
            other => panic!("Expected JobFailed, got: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_run_query_vanished_job() {
        let mock_server = MockServer::start().await;
        let runner = create_test_runner(&mock_server.uri());

        mount_insert(&mock_server, "PENDING").await;

        Mock::given(method("GET"))
            .and(path_regex(r"^/bigquery/v2/projects/test-project/jobs/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        assert!(matches!(
            runner.run_query("SELECT 1").await,
            Err(AppError::JobNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_each_call_uses_a_fresh_job_id() {
        let mock_server = MockServer::start().await;
        let runner = create_test_runner(&mock_server.uri());

        Mock::given(method("POST"))
            .and(path("/bigquery/v2/projects/test-project/jobs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": { "state": "DONE" }
            })))
            .expect(2)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path_regex(r"^/bigquery/v2/projects/test-project/queries/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jobComplete": true
            })))
            .mount(&mock_server)
            .await;

        runner.run_query("SELECT 1").await.unwrap();
        runner.run_query("SELECT 1").await.unwrap();

        let requests = mock_server.received_requests().await.unwrap();
        let job_ids: Vec<String> = requests
            .iter()
            .filter(|r| r.method.as_str() == "POST")
            .map(|r| {
                let body: serde_json::Value = serde_json::from_slice(&r.body).unwrap();
                body["jobReference"]["jobId"].as_str().unwrap().to_string()
            })
            .collect();

        assert_eq!(job_ids.len(), 2);
        assert_ne!(job_ids[0], job_ids[1]);
    }

    #[tokio::test]
    async fn test_incomplete_results_are_refetched() {
        let mock_server = MockServer::start().await;
        let runner = create_test_runner(&mock_server.uri());

        mount_insert(&mock_server, "DONE").await;

        Mock::given(method("GET"))
            .and(path_regex(r"^/bigquery/v2/projects/test-project/queries/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jobComplete": false
            })))
            .up_to_n_times(2)
            .expect(2)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path_regex(r"^/bigquery/v2/projects/test-project/queries/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jobComplete": true,
                "totalRows": "1",
                "schema": { "fields": [{ "name": "date" }] },
                "rows": [{ "f": [{ "v": "20170301" }] }]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result_set = runner.run_query("SELECT date").await.unwrap();

        assert_eq!(result_set.schema().field_names(), vec!["date"]);
        assert_eq!(result_set.total_rows(), Some(1));
    }

    #[tokio::test]
    async fn test_results_never_complete_is_an_error() {
        let mock_server = MockServer::start().await;
        let runner = create_test_runner(&mock_server.uri());

        mount_insert(&mock_server, "DONE").await;

        Mock::given(method("GET"))
            .and(path_regex(r"^/bigquery/v2/projects/test-project/queries/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jobComplete": false
            })))
            .expect(MAX_INCOMPLETE_FETCHES as u64)
            .mount(&mock_server)
            .await;

        match runner.run_query("SELECT 1").await {
            Err(AppError::Warehouse(msg)) => assert!(msg.contains("not ready")),
            other => panic!("Expected Warehouse error, got: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_default_poll_settings() {
        let poll = PollSettings::default();
        assert_eq!(poll.initial, Duration::from_secs(1));
        assert_eq!(poll.max, Duration::from_secs(10));
    }
}
