use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use bq_session_export::commands;
use bq_session_export::config::{Args, Settings};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_logging();

    let settings = match Settings::from_args(Args::parse()) {
        Ok(settings) => settings,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let runner = match settings.job_runner() {
        Ok(runner) => runner,
        Err(e) => {
            error!("Failed to set up BigQuery client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        "Running against project {} for {}",
        settings.project_id, settings.range
    );

    let report = commands::run(&runner, &settings.range, &settings.target).await;

    if let Ok(users) = &report.users {
        for user in users {
            println!("{}", user.id());
        }
    }
    if let Ok(summary) = &report.export {
        info!(
            "[EXPORT] Session counts saved to {} ({} rows)",
            summary.path.display(),
            summary.rows_written
        );
    }

    ExitCode::SUCCESS
}
