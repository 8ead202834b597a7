//! k8s-gitlab-gc binary.
//!
//! Runs one collection and exits; schedule it with a Kubernetes CronJob.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use k8s_gitlab_gc::cli::{Cli, LogFormat};
use k8s_gitlab_gc::{run, GcConfig};

fn init_tracing(verbose: bool, format: LogFormat) {
    let default_directive = if verbose {
        "info,k8s_gitlab_gc=debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    let config = GcConfig::try_from(cli).context("Invalid configuration")?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %serde_json::to_string(&config)?,
        "Starting GitLab CI garbage collection"
    );

    let report = match run(&config).await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "Garbage collection failed");
            return Err(e).context("Garbage collection failed");
        }
    };

    if report.is_empty() {
        info!(dry_run = report.dry_run, "Nothing to clean up");
    } else {
        info!(
            executor_pods = report.executor_pods.len(),
            namespaces = report.namespaces.len(),
            dry_run = report.dry_run,
            "{report}"
        );
    }

    Ok(())
}
