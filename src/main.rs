//! mongo-scroll-extract
//!
//! Bulk-extracts every record of a MongoDB collection whose filter field
//! equals a given value, decodes the records concurrently and writes them to
//! a JSON file. A run either persists every matching record or nothing.
//!
//! # Usage
//!
//! ```bash
//! mongo-scroll-extract mongodb://localhost:27017 -d partner -c dhisco \
//!     --filter-value no_matching -o data.json
//! ```

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use mongo_scroll_extract::cli::CliInterface;
use mongo_scroll_extract::config::Config;
use mongo_scroll_extract::connection::ConnectionManager;
use mongo_scroll_extract::error::Result;
use mongo_scroll_extract::extract::{
    ExtractionCoordinator, ExtractionSummary, JsonFileSink, MongoCursorSource, PipelineOptions,
    ProgressTracker,
};

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Main application logic
///
/// 1. Parse command-line arguments and load configuration
/// 2. Initialize logging
/// 3. Handle subcommands or run one extraction
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;

    initialize_logging(cli.config());

    if cli.handle_subcommand()? {
        return Ok(());
    }

    let config = cli.config();
    config.validate()?;

    let summary = run_extraction(config, &cli.sanitized_uri()).await?;
    println!(
        "Extracted {} records to {} in {} ms",
        summary.records_extracted,
        config.output.path.display(),
        summary.elapsed_ms
    );
    Ok(())
}

/// Connect, wire the pipeline and run it until completion or Ctrl+C
async fn run_extraction(config: &Config, display_uri: &str) -> Result<ExtractionSummary> {
    let mut conn_manager = ConnectionManager::new(config.connection.clone());
    conn_manager.connect().await?;
    debug!("Using {}", display_uri);

    let source = Arc::new(MongoCursorSource::new(conn_manager.collection()?));
    let reporter = Arc::new(ProgressTracker::new(config.output.progress));
    let sink = Box::new(JsonFileSink::new(
        config.output.path.clone(),
        config.output.pretty,
    )?);

    let cancel_token = CancellationToken::new();
    let ctrl_c_handle = spawn_ctrl_c_listener(cancel_token.clone());

    let mut coordinator = ExtractionCoordinator::new(source, config.filter()?, reporter, sink)
        .with_options(PipelineOptions::from(&config.extraction))
        .with_cancellation(cancel_token);

    let outcome = coordinator.execute().await;
    ctrl_c_handle.abort();
    outcome
}

/// Cancel `token` on the first Ctrl+C
fn spawn_ctrl_c_listener(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupted, cancelling extraction");
                token.cancel();
            }
            Err(err) => {
                eprintln!("Failed to listen for Ctrl+C: {}", err);
            }
        }
    })
}

/// Initialize logging on stderr from the effective configuration
///
/// Stdout is kept for the run summary and subcommand output.
fn initialize_logging(config: &Config) {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(config.logging.level.to_tracing_level())
        .with_target(false)
        .with_writer(std::io::stderr);

    if config.logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
