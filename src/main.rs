//! Harvest CLI: resumable batch retrieval of literature records.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use harvest::{
    BatchFetcher, CachedFetcher, CheckpointManager, Config, DeadLetterQueue, DiskCache,
    HttpBatchService, JsonLinesParser, LineFileSource, Pipeline, ServiceFetcher, init_tracing,
    shutdown_signal,
};

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "harvest", about = "Resumable batch harvester for literature records")]
struct CliArgs {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    config: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = CliArgs::parse();

    let config = match Config::from_file(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let Some(endpoint) = config.service.as_ref().map(|s| s.endpoint.clone()) else {
        eprintln!("No service endpoint configured");
        return ExitCode::FAILURE;
    };

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            shutdown.cancel();
        });
    }

    let service = Arc::new(HttpBatchService::new(endpoint));
    let mut fetcher: Arc<dyn BatchFetcher> =
        Arc::new(ServiceFetcher::new(service, Arc::new(JsonLinesParser)));

    if let Some(cache_path) = &config.cache_path {
        match DiskCache::open(cache_path).await {
            Ok(cache) => {
                info!(path = %cache_path, entries = cache.len(), "Cache enabled");
                fetcher = Arc::new(CachedFetcher::new(fetcher, cache));
            }
            Err(e) => {
                eprintln!("Failed to open cache: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    let source = Arc::new(LineFileSource::new(&config.input_path));
    let checkpoint = CheckpointManager::new(&config.output_dir, "harvest");
    let dlq_dir = config.dlq_path.clone().unwrap_or_else(|| config.output_dir.clone());
    let dlq = Some(DeadLetterQueue::new(dlq_dir));

    info!(
        input = %config.input_path,
        output = %config.output_dir,
        batch_size = config.batch_size,
        "Starting harvest pipeline"
    );

    let mut pipeline = Pipeline::new(
        source,
        fetcher,
        checkpoint,
        dlq,
        config.options(),
        shutdown,
    );

    match pipeline.run().await {
        Ok(report) => {
            info!(
                processed = report.summary.processed,
                succeeded = report.summary.succeeded,
                unparseable = report.summary.unparseable,
                not_found = report.summary.not_found,
                failed = report.summary.failed,
                interrupted = report.interrupted,
                "Harvest finished"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Pipeline failed: {e}");
            ExitCode::FAILURE
        }
    }
}
