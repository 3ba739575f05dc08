use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use results_service::{
    Config, DirectoryArchiver, PgMetadataStore, ResultsError, ResultsUploader, RunResultsQuery,
    S3ResultsRepository, SystemClock,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "results-service", about = "Package and upload FRED simulation results")]
struct Cli {
    /// Extra configuration file, layered under RESULTS__* environment variables
    #[arg(long, global = true, env = "RESULTS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Package a results directory, upload it and record it on the run
    Upload {
        #[arg(long)]
        job_id: i64,
        #[arg(long)]
        run_id: i64,
        #[arg(long)]
        results_dir: PathBuf,
    },
    /// Print presigned download URLs for every run of a job as JSON
    Urls {
        #[arg(long)]
        job_id: i64,
    },
    /// Apply database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(service = %config.service.name, "Starting results service");

    if let Some(port) = config.service.metrics_port {
        init_metrics(port)?;
    }

    let metadata_store = Arc::new(
        PgMetadataStore::new(&config.database)
            .await
            .context("Failed to initialize metadata store")?,
    );

    if config.database.run_migrations || matches!(cli.command, Command::Migrate) {
        metadata_store
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;
    }

    match cli.command {
        Command::Upload {
            job_id,
            run_id,
            results_dir,
        } => {
            let results_repository = Arc::new(
                S3ResultsRepository::new(&config.s3)
                    .await
                    .context("Failed to initialize S3 results repository")?,
            );

            let uploader = ResultsUploader::new(
                metadata_store.clone(),
                metadata_store.clone(),
                Arc::new(DirectoryArchiver::with_prefix(
                    config.packaging.run_dir_prefix.clone(),
                )),
                results_repository,
                Arc::new(SystemClock),
            );

            match uploader.upload_results(run_id, job_id, &results_dir).await {
                Ok(url) => println!("{}", url),
                Err(e @ ResultsError::Metadata { .. }) => {
                    error!(
                        job_id = job_id,
                        run_id = run_id,
                        orphaned_s3_url = e.orphaned_s3_url().unwrap_or_default(),
                        "Orphaned results upload requires reconciliation"
                    );
                    return Err(e.into());
                }
                Err(e) => return Err(e).context("Results upload failed"),
            }
        }
        Command::Urls { job_id } => {
            let results_repository = Arc::new(
                S3ResultsRepository::new(&config.s3)
                    .await
                    .context("Failed to initialize S3 results repository")?,
            );

            let query = RunResultsQuery::new(
                metadata_store.clone(),
                metadata_store.clone(),
                results_repository,
                config.s3.bucket.clone(),
                config.download_url_expiry(),
            );

            let results = query
                .get_run_results(job_id)
                .await
                .context("Failed to generate run results URLs")?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Command::Migrate => {}
    }

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}
