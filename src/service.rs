//! Export data service
//!
//! Entry point for starting and polling exports. The service resolves
//! connection parameters, makes sure at most one export runs per source,
//! runs the pipeline on the calling task and maps its outcome onto the job
//! status before releasing the source.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::connection::DataSource;
use crate::error::{ExportError, Result};
use crate::export::writers::TableWriter;
use crate::export::{
    DelimitedTextSettings, DelimitedTextWriter, ExportCoordinator, ExportJob, ExportJobRegistry,
    ExportJobSnapshot, Flow, SpreadsheetSettings, SpreadsheetWriter,
};
use crate::source::{ConnectionResolver, Credentials, SourceEntity};

/// Result of an export request
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    /// The job that ran, or the one already running for the source
    pub job: ExportJob,
    /// Whether this request ran the export
    pub is_new: bool,
}

/// Facade over the export engine
///
/// Owns the job registry; separate service instances never share jobs.
pub struct ExportDataService {
    data_source: Arc<dyn DataSource>,
    resolver: Arc<dyn ConnectionResolver>,
    registry: Arc<ExportJobRegistry>,
}

impl ExportDataService {
    /// Create a new export service
    ///
    /// # Arguments
    /// * `data_source` - Opens connections to the analytical source
    /// * `resolver` - Turns source entities into connection parameters
    pub fn new(data_source: Arc<dyn DataSource>, resolver: Arc<dyn ConnectionResolver>) -> Self {
        Self {
            data_source,
            resolver,
            registry: Arc::new(ExportJobRegistry::new()),
        }
    }

    /// Registry of running jobs
    pub fn registry(&self) -> &ExportJobRegistry {
        &self.registry
    }

    /// Export tables of `source` to one delimited text file per table
    ///
    /// Returns once the export stopped. When a job is already running for
    /// the source, that job is returned with `is_new = false` and nothing is
    /// exported.
    ///
    /// # Returns
    /// * `Result<ExportOutcome>` - The job, or the resolve or export failure
    pub async fn export_delimited_text(
        &self,
        source: &SourceEntity,
        settings: &DelimitedTextSettings,
        credentials: &Credentials,
        cancel: CancellationToken,
    ) -> Result<ExportOutcome> {
        settings.validate()?;
        let writer = DelimitedTextWriter::new(settings);
        self.export(
            source,
            credentials,
            &settings.tables,
            Box::new(writer),
            settings.export_path.clone(),
            cancel,
        )
        .await
    }

    /// Export tables of `source` to a spreadsheet workbook
    ///
    /// Same contract as [`Self::export_delimited_text`]; tables larger than
    /// the worksheet row limit are truncated.
    pub async fn export_spreadsheet(
        &self,
        source: &SourceEntity,
        settings: &SpreadsheetSettings,
        credentials: &Credentials,
        cancel: CancellationToken,
    ) -> Result<ExportOutcome> {
        settings.validate()?;
        let writer = SpreadsheetWriter::new(&settings.export_path);
        let output_dir = settings
            .export_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        self.export(
            source,
            credentials,
            &settings.tables,
            Box::new(writer),
            output_dir,
            cancel,
        )
        .await
    }

    /// Snapshot of the job running for `source`, if any
    pub fn query_export_job(&self, source: &SourceEntity) -> Option<ExportJobSnapshot> {
        self.registry.try_get(&source.key()).map(|job| job.snapshot())
    }

    async fn export(
        &self,
        source: &SourceEntity,
        credentials: &Credentials,
        tables: &[String],
        writer: Box<dyn TableWriter>,
        output_dir: PathBuf,
        cancel: CancellationToken,
    ) -> Result<ExportOutcome> {
        let parameters = self.resolver.resolve(source, credentials)?;
        let key = source.key();

        let lease = match self.registry.start(&key) {
            Ok(lease) => lease,
            Err(job) => {
                info!("Export already running for {}", key);
                return Ok(ExportOutcome { job, is_new: false });
            }
        };
        let job = lease.job().clone();

        let mut coordinator =
            ExportCoordinator::new(Arc::clone(&self.data_source), parameters, writer, output_dir)
                .with_cancellation(cancel);
        let result = coordinator.execute(&job, tables).await;

        let result = match result {
            Ok(Flow::Completed) => {
                job.set_completed();
                Ok(())
            }
            Ok(Flow::Canceled) => {
                job.set_canceled();
                Ok(())
            }
            Err(e) => {
                warn!("Export failed for {}: {}", key, e);
                job.set_failed();
                Err(ExportError::export_failed(e))
            }
        };

        // The source is free again before the caller sees the outcome
        drop(lease);
        info!("Export for {} finished as {}", key, job.status());

        result.map(|()| ExportOutcome { job, is_new: true })
    }
}
