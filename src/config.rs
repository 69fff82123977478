//! Command-line and environment configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use secrecy::SecretString;
use url::Url;

use crate::bigquery::{BigQueryClient, JobRunner, PollSettings};
use crate::commands::ExportTarget;
use crate::error::AppError;
use crate::templates::DateRange;

const CLIENT_USER_AGENT: &str = concat!("bq-session-export/", env!("CARGO_PKG_VERSION"));

/// Raw arguments. The access token only leaves here wrapped in a secret.
#[derive(Parser)]
#[command(
    name = "bq-session-export",
    about = "List unique app users and export daily session counts from BigQuery",
    args_override_self = true
)]
pub struct Args {
    /// Project that owns the query jobs.
    #[arg(long, env = "BQ_PROJECT_ID")]
    pub project: String,

    /// OAuth2 bearer token for the BigQuery API.
    #[arg(long, env = "BQ_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: String,

    #[arg(long, env = "BQ_API_BASE", default_value = "https://bigquery.googleapis.com")]
    pub api_base: String,

    /// Processing location, e.g. `US` or `EU`.
    #[arg(long, env = "BQ_LOCATION")]
    pub location: Option<String>,

    /// First day of the range, `yyyy-MM-dd`.
    #[arg(long, env = "EXPORT_START_DATE", default_value = "2017-03-01")]
    pub start_date: String,

    /// Last day of the range, `yyyy-MM-dd`.
    #[arg(long, env = "EXPORT_END_DATE", default_value = "2017-04-07")]
    pub end_date: String,

    #[arg(long, env = "EXPORT_DIR", default_value = ".")]
    pub export_dir: PathBuf,

    #[arg(long, env = "EXPORT_FILE", default_value = "TotalCount.csv")]
    pub export_file: String,

    /// Rows per result page. Server default when unset.
    #[arg(long, env = "BQ_PAGE_SIZE")]
    pub page_size: Option<u32>,

    #[arg(long, default_value_t = 1000)]
    pub poll_initial_ms: u64,

    #[arg(long, default_value_t = 10_000)]
    pub poll_max_ms: u64,

    /// Per-request HTTP timeout.
    #[arg(long, env = "BQ_REQUEST_TIMEOUT_SECS", default_value_t = 300)]
    pub request_timeout_secs: u64,
}

/// Validated configuration for one run.
#[derive(Debug)]
pub struct Settings {
    pub project_id: String,
    pub access_token: SecretString,
    pub api_base: Url,
    pub location: Option<String>,
    pub range: DateRange,
    pub target: ExportTarget,
    pub page_size: Option<u32>,
    pub poll: PollSettings,
    pub request_timeout: Duration,
}

impl Settings {
    pub fn from_args(args: Args) -> Result<Self, AppError> {
        let project_id = args.project.trim().to_string();
        if project_id.is_empty() {
            return Err(AppError::Config("Project id must not be empty".to_string()));
        }

        let api_base = Url::parse(&args.api_base)
            .map_err(|e| AppError::Config(format!("Invalid API base URL: {}", e)))?;
        if !matches!(api_base.scheme(), "http" | "https") {
            return Err(AppError::Config(format!(
                "API base URL must be http or https, got {}",
                api_base.scheme()
            )));
        }

        if args.export_file.trim().is_empty() {
            return Err(AppError::Config("Export file name must not be empty".to_string()));
        }

        if args.page_size == Some(0) {
            return Err(AppError::Config("Page size must be positive".to_string()));
        }

        if args.poll_initial_ms == 0 || args.poll_initial_ms > args.poll_max_ms {
            return Err(AppError::Config(format!(
                "Poll interval must satisfy 0 < initial <= max, got {}ms / {}ms",
                args.poll_initial_ms, args.poll_max_ms
            )));
        }

        Ok(Self {
            project_id,
            access_token: SecretString::from(args.access_token),
            api_base,
            location: args.location.filter(|l| !l.trim().is_empty()),
            range: DateRange::new(args.start_date, args.end_date),
            target: ExportTarget {
                dir: args.export_dir,
                file_name: args.export_file,
            },
            page_size: args.page_size,
            poll: PollSettings {
                initial: Duration::from_millis(args.poll_initial_ms),
                max: Duration::from_millis(args.poll_max_ms),
            },
            request_timeout: Duration::from_secs(args.request_timeout_secs),
        })
    }

    /// Builds the HTTP client and the job runner on top of it.
    pub fn job_runner(&self) -> Result<JobRunner, AppError> {
        let client = BigQueryClient::new(
            Arc::new(build_http_client(self.request_timeout)?),
            self.api_base.clone(),
            self.project_id.clone(),
            self.location.clone(),
            self.access_token.clone(),
        );
        Ok(JobRunner::new(client, self.poll, self.page_size))
    }
}

fn build_http_client(timeout: Duration) -> Result<reqwest::Client, AppError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use secrecy::ExposeSecret;

    /// Every env-backed flag is given explicitly so the test environment
    /// cannot leak in; later flags in `extra` win.
    fn parse(extra: &[&str]) -> Result<Settings, AppError> {
        let mut argv = vec![
            "bq-session-export",
            "--project",
            "my-project",
            "--access-token",
            "ya29.secret",
            "--api-base",
            "https://bigquery.googleapis.com",
            "--start-date",
            "2017-03-01",
            "--end-date",
            "2017-04-07",
            "--export-dir",
            ".",
            "--export-file",
            "TotalCount.csv",
            "--request-timeout-secs",
            "300",
        ];
        argv.extend_from_slice(extra);
        Settings::from_args(Args::try_parse_from(argv).expect("arguments should parse"))
    }

    fn default_of(id: &str) -> Option<String> {
        let command = Args::command();
        let arg = command
            .get_arguments()
            .find(|a| a.get_id().as_str() == id)
            .unwrap_or_else(|| panic!("no argument {}", id));
        arg.get_default_values()
            .first()
            .map(|v| v.to_string_lossy().into_owned())
    }

    #[test]
    fn test_declared_defaults() {
        assert_eq!(default_of("api_base").as_deref(), Some("https://bigquery.googleapis.com"));
        assert_eq!(default_of("start_date").as_deref(), Some("2017-03-01"));
        assert_eq!(default_of("end_date").as_deref(), Some("2017-04-07"));
        assert_eq!(default_of("export_dir").as_deref(), Some("."));
        assert_eq!(default_of("export_file").as_deref(), Some("TotalCount.csv"));
        assert_eq!(default_of("request_timeout_secs").as_deref(), Some("300"));
        assert_eq!(default_of("poll_initial_ms").as_deref(), Some("1000"));
        assert_eq!(default_of("poll_max_ms").as_deref(), Some("10000"));
        assert_eq!(default_of("location"), None);
        assert_eq!(default_of("page_size"), None);
    }

    #[test]
    fn test_settings_from_flags() {
        let settings = parse(&[]).unwrap();

        assert_eq!(settings.project_id, "my-project");
        assert_eq!(settings.access_token.expose_secret(), "ya29.secret");
        assert_eq!(settings.api_base.as_str(), "https://bigquery.googleapis.com/");
        assert_eq!(settings.range, DateRange::new("2017-03-01", "2017-04-07"));
        assert_eq!(settings.target.path(), PathBuf::from("./TotalCount.csv"));
        assert_eq!(settings.poll, PollSettings::default());
        assert_eq!(settings.request_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_overrides() {
        let settings = parse(&[
            "--start-date",
            "2017-05-01",
            "--end-date",
            "2017-05-31",
            "--export-dir",
            "/tmp/usage",
            "--export-file",
            "May.csv",
            "--page-size",
            "500",
            "--location",
            "EU",
        ])
        .unwrap();

        assert_eq!(settings.range.to_string(), "2017-05-01..2017-05-31");
        assert_eq!(settings.target.path(), PathBuf::from("/tmp/usage/May.csv"));
        assert_eq!(settings.page_size, Some(500));
        assert_eq!(settings.location.as_deref(), Some("EU"));
    }

    #[test]
    fn test_invalid_api_base_is_rejected() {
        assert!(matches!(
            parse(&["--api-base", "not a url"]),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            parse(&["--api-base", "ftp://example.com"]),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_poll_ordering_is_enforced() {
        match parse(&["--poll-initial-ms", "5000", "--poll-max-ms", "1000"]) {
            Err(AppError::Config(msg)) => assert!(msg.contains("5000ms / 1000ms")),
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    #[test]
    fn test_zero_page_size_is_rejected() {
        assert!(matches!(
            parse(&["--page-size", "0"]),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_settings_debug_hides_token() {
        let settings = parse(&[]).unwrap();
        assert!(!format!("{:?}", settings).contains("ya29.secret"));
    }

    #[test]
    fn test_job_runner_builds() {
        assert!(parse(&["--location", "US", "--page-size", "100"])
            .unwrap()
            .job_runner()
            .is_ok());
    }
}
