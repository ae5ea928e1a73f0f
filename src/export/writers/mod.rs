//! Table writers for export operations
//!
//! A [`TableWriter`] receives tables one after the other: `begin_table`,
//! `write_header`, any number of `write_row`, `end_table`, and finally a
//! single `finalize` once the job stops. Writers never look at cancellation;
//! the pipeline decides when to stop feeding them.

use std::path::Path;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::BufWriter;

use crate::connection::CellValue;
use crate::error::Result;

pub mod csv;
pub mod xlsx;

pub use csv::DelimitedTextWriter;
pub use xlsx::SpreadsheetWriter;

/// Format-specific sink for exported tables
#[async_trait]
pub trait TableWriter: Send {
    /// Start a new table
    ///
    /// # Arguments
    /// * `name` - Table name as requested by the caller
    async fn begin_table(&mut self, name: &str) -> Result<()>;

    /// Write the column names of the current table
    async fn write_header(&mut self, columns: &[String]) -> Result<()>;

    /// Write one row of the current table
    async fn write_row(&mut self, values: &[CellValue]) -> Result<()>;

    /// Close the current table
    async fn end_table(&mut self) -> Result<()>;

    /// Finish the output after the last table or after a cancellation
    ///
    /// # Returns
    /// * `Result<()>` - Success or error
    async fn finalize(&mut self) -> Result<()>;

    /// Maximum rows per table including the header, if the format has one
    fn row_limit(&self) -> Option<u64> {
        None
    }
}

/// Characters that are not allowed in file names on common platforms
const INVALID_FILE_NAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Replace characters that cannot appear in a file name with `_`
pub fn sanitize_file_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control() || INVALID_FILE_NAME_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect();

    if sanitized.is_empty() {
        "_".to_string()
    } else {
        sanitized
    }
}

/// Helper function to create a buffered file writer
///
/// # Arguments
/// * `path` - File path to create, truncated if it exists
///
/// # Returns
/// * `Result<BufWriter<File>>` - Buffered writer or error
pub(crate) async fn create_writer(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).await?;
    Ok(BufWriter::with_capacity(1024 * 1024, file)) // 1MB buffer
}
