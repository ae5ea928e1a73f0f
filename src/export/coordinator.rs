//! Export coordinator for orchestrating export operations
//!
//! This module drives one export job: it opens a connection, queries each
//! requested table in turn and streams the rows into a [`TableWriter`] while
//! recording progress on the job's tables.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::{Connection, DataSource, QueryCanceller, RowCursor, evaluate_table_query};
use crate::error::Result;
use crate::source::ConnectionParameters;

use super::job::{ExportJob, ExportTable};
use super::killable::{OperationHandle, Step, client_id, run_killable};
use super::writers::TableWriter;

/// How the pipeline stopped when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Every requested table was processed
    Completed,
    /// The cancellation token fired
    Canceled,
}

/// Coordinator for export operations
///
/// Orchestrates the connection, the per-table queries and the table writer.
/// Cancellation is observed before every table, before every row and while
/// any remote call is pending.
pub struct ExportCoordinator {
    /// Data source connections are opened on
    data_source: Arc<dyn DataSource>,
    /// Resolved connection string and catalog
    parameters: ConnectionParameters,
    /// Output writer
    writer: Box<dyn TableWriter>,
    /// Directory created before the first file is written
    output_dir: PathBuf,
    /// Cancellation token for aborting the export
    cancel_token: CancellationToken,
    /// Identifier used in operation handles
    client_id: String,
    /// Whether the writer received any table
    writer_used: bool,
}

impl ExportCoordinator {
    /// Create a new export coordinator
    pub fn new(
        data_source: Arc<dyn DataSource>,
        parameters: ConnectionParameters,
        writer: Box<dyn TableWriter>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            data_source,
            parameters,
            writer,
            output_dir: output_dir.into(),
            cancel_token: CancellationToken::new(),
            client_id: client_id(),
            writer_used: false,
        }
    }

    /// Set cancellation token for this export operation
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// Execute the export
    ///
    /// 1. Create the output directory
    /// 2. Open the connection and select the catalog
    /// 3. Export every table in order
    /// 4. Finalize the writer, also after a cancellation
    ///
    /// The job's tables are created and updated along the way; setting the
    /// job's own terminal status is left to the caller.
    ///
    /// # Returns
    /// * `Result<Flow>` - How the export stopped, or the failure cause
    pub async fn execute(&mut self, job: &ExportJob, tables: &[String]) -> Result<Flow> {
        let start_time = Instant::now();
        info!("Starting export of {} tables for {}", tables.len(), job.source_key());

        match self.run(job, tables).await {
            Ok(flow) => {
                self.writer.finalize().await?;
                info!(
                    "Export {:?} for {}: {} rows in {} ms",
                    flow,
                    job.source_key(),
                    job.snapshot().total_rows(),
                    start_time.elapsed().as_millis()
                );
                Ok(flow)
            }
            Err(e) => {
                if self.writer_used {
                    if let Err(finalize_err) = self.writer.finalize().await {
                        warn!("Failed to finalize output after error: {}", finalize_err);
                    }
                }
                Err(e)
            }
        }
    }

    async fn run(&mut self, job: &ExportJob, tables: &[String]) -> Result<Flow> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let mut connection = self.data_source.connect(&self.parameters.connection_string).await?;
        connection.change_database(&self.parameters.database_name).await?;
        let canceller = connection.canceller();
        debug!("Connected to database {}", self.parameters.database_name);

        for name in tables {
            if self.cancel_token.is_cancelled() {
                info!("Export cancelled before table {}", name);
                return Ok(Flow::Canceled);
            }

            let table = job.add_table(name)?;
            let flow = self
                .export_table(connection.as_mut(), canceller.as_ref(), &table)
                .await?;
            if flow == Flow::Canceled {
                info!("Export cancelled during table {}", name);
                return Ok(Flow::Canceled);
            }
        }

        Ok(Flow::Completed)
    }

    async fn export_table(
        &mut self,
        connection: &mut dyn Connection,
        canceller: &dyn QueryCanceller,
        table: &ExportTable,
    ) -> Result<Flow> {
        let name = table.name();
        let handle = OperationHandle::new(&self.client_id);
        let query = evaluate_table_query(&name);
        debug!("Executing {} ({})", query, handle.comment());

        let mut cursor: Box<dyn RowCursor> = match run_killable(
            canceller,
            &handle,
            &self.cancel_token,
            connection.execute(&query, &handle),
        )
        .await?
        {
            Step::Ready(cursor) => cursor,
            Step::Cancelled => return Ok(Flow::Canceled),
        };

        self.writer_used = true;
        self.writer.begin_table(&name).await?;
        self.writer.write_header(cursor.columns()).await?;

        let row_limit = self.writer.row_limit();
        let mut rows_in_output: u64 = 1; // count header

        loop {
            if self.cancel_token.is_cancelled() {
                return Ok(Flow::Canceled);
            }

            let row = match run_killable(canceller, &handle, &self.cancel_token, cursor.next_row())
                .await?
            {
                Step::Ready(Some(row)) => row,
                Step::Ready(None) => {
                    table.set_completed();
                    break;
                }
                Step::Cancelled => return Ok(Flow::Canceled),
            };

            self.writer.write_row(&row).await?;
            let written = table.increment_rows();
            if written % 100_000 == 0 {
                debug!("Progress: {} rows of {} exported", written, name);
            }

            rows_in_output += 1;
            if row_limit.is_some_and(|limit| rows_in_output >= limit) {
                info!("Table {} truncated at {} rows", name, written);
                table.set_truncated();
                // Stop the server from streaming rows nobody reads
                if let Err(e) = canceller.cancel(&handle).await {
                    debug!("Failed to cancel truncated query: {}", e);
                }
                break;
            }
        }

        self.writer.end_table().await?;
        debug!("Exported {} rows of {}", table.row_count(), name);
        Ok(Flow::Completed)
    }
}
