//! tabexport - bulk table export
//!
//! Exports the tables of an analytical model to CSV files or to an XLSX
//! workbook. Ctrl+C cancels a running export; files written so far are kept.
//!
//! # Usage
//!
//! ```bash
//! # One CSV file per table
//! tabexport csv --server ./data --database Sales --tables Sales,Customers -o ./out
//!
//! # One workbook, one worksheet per table
//! tabexport xlsx --server ./data --database Sales --tables Sales -o sales.xlsx
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, info};

use tabexport::cli::summary::format_summary;
use tabexport::cli::{CliInterface, ExportRequest};
use tabexport::connection::JsonDataSource;
use tabexport::error::{ExportError, Result};
use tabexport::export::{ExportJobStatus, ProgressTracker};
use tabexport::service::{ExportDataService, ExportOutcome};
use tabexport::source::DefaultConnectionResolver;

/// Interval between progress polls
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Application entry point
#[tokio::main]
async fn main() {
    match run().await {
        Ok(status) if status == ExportJobStatus::Failed => std::process::exit(1),
        Ok(status) if status == ExportJobStatus::Canceled => std::process::exit(130),
        Ok(_) => {}
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Main application logic
///
/// 1. Parse command-line arguments and load configuration
/// 2. Initialize logging
/// 3. Handle utility subcommands or run the export
///
/// # Returns
/// * `Result<ExportJobStatus>` - Final job status or error
async fn run() -> Result<ExportJobStatus> {
    let cli = CliInterface::new()?;

    initialize_logging(&cli);

    if cli.handle_subcommand()? {
        return Ok(ExportJobStatus::Completed);
    }

    let Some(request) = cli.export_request()? else {
        return Ok(ExportJobStatus::Completed);
    };

    let service = Arc::new(ExportDataService::new(
        Arc::new(JsonDataSource::new()),
        Arc::new(DefaultConnectionResolver),
    ));

    let outcome = run_export(&service, &request).await;

    match outcome {
        Ok(outcome) => {
            let snapshot = outcome.job.snapshot();
            if !outcome.is_new {
                println!(
                    "An export of {} is already running; nothing was exported",
                    snapshot.source_key
                );
            } else if !cli.args().quiet {
                println!("{}", format_summary(&snapshot));
            }
            Ok(snapshot.status)
        }
        Err(ExportError::ExportFailed(cause)) => {
            eprintln!("Export failed: {}", cause);
            Ok(ExportJobStatus::Failed)
        }
        Err(e) => Err(e),
    }
}

/// Run one export with Ctrl+C cancellation and a progress spinner
async fn run_export(
    service: &Arc<ExportDataService>,
    request: &ExportRequest,
) -> Result<ExportOutcome> {
    let cancel_token = CancellationToken::new();

    // Setup Ctrl+C handler for this export
    let ctrl_c_token = cancel_token.clone();
    let ctrl_c_handle = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Cancellation requested");
                ctrl_c_token.cancel();
            }
            Err(err) => {
                eprintln!("Failed to listen for Ctrl+C: {}", err);
            }
        }
    });

    let progress_stop = CancellationToken::new();
    let progress_handle = request.show_progress().then(|| {
        let service = Arc::clone(service);
        let source = request.source().clone();
        let stop = progress_stop.clone();
        let tracker = ProgressTracker::new(request.table_count(), true);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(PROGRESS_INTERVAL);
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = interval.tick() => {
                        if let Some(snapshot) = service.query_export_job(&source) {
                            tracker.update(&snapshot);
                        }
                    }
                }
            }
            tracker.finish();
        })
    });

    debug!("Exporting {}", request.source().key());
    let result = match request {
        ExportRequest::DelimitedText {
            source,
            credentials,
            settings,
            ..
        } => {
            service
                .export_delimited_text(source, settings, credentials, cancel_token)
                .await
        }
        ExportRequest::Spreadsheet {
            source,
            credentials,
            settings,
            ..
        } => {
            service
                .export_spreadsheet(source, settings, credentials, cancel_token)
                .await
        }
    };

    progress_stop.cancel();
    if let Some(handle) = progress_handle {
        if let Err(e) = handle.await {
            debug!("Progress task ended abnormally: {}", e);
        }
    }
    ctrl_c_handle.abort();

    result
}

/// Initialize logging system based on configured level
///
/// # Arguments
/// * `cli` - CLI interface with verbosity already merged into the config
fn initialize_logging(cli: &CliInterface) {
    let level: Level = cli.config().logging.level.to_tracing_level();

    // Build subscriber with level filter; logs go to stderr
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    // Configure timestamps
    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
