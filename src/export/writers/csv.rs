//! Delimited text writer for export operations
//!
//! Every table goes to its own `<directory>/<table>.csv` file. Records end
//! with CRLF; values are escaped only when they contain the delimiter, a
//! quote or a line break, unless text fields are configured to be quoted
//! always.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::connection::CellValue;
use crate::error::Result;
use crate::export::settings::{DelimitedTextSettings, TextEncoding};

use super::{TableWriter, create_writer, sanitize_file_name};

const RECORD_TERMINATOR: &str = "\r\n";
const UTF16_LE_BOM: [u8; 2] = [0xFF, 0xFE];

struct OpenFile {
    path: PathBuf,
    writer: BufWriter<File>,
    records: u64,
}

/// Writer producing one delimited text file per table
pub struct DelimitedTextWriter {
    /// Output directory
    directory: PathBuf,
    delimiter: String,
    quote_string_fields: bool,
    encoding: TextEncoding,
    /// File of the table being written
    current: Option<OpenFile>,
    /// Number of files created so far
    files_created: usize,
}

impl DelimitedTextWriter {
    /// Create a new delimited text writer
    ///
    /// The output directory must exist before the first table begins.
    pub fn new(settings: &DelimitedTextSettings) -> Self {
        Self {
            directory: settings.export_path.clone(),
            delimiter: settings.delimiter.clone(),
            quote_string_fields: settings.quote_string_fields,
            encoding: settings.encoding,
            current: None,
            files_created: 0,
        }
    }

    /// Escape a value if it contains the delimiter, a quote or a line break
    ///
    /// # Arguments
    /// * `value` - Value to escape
    /// * `always` - Quote even when not needed
    ///
    /// # Returns
    /// * `String` - Escaped value
    fn escape_value(&self, value: &str, always: bool) -> String {
        if always
            || value.contains(self.delimiter.as_str())
            || value.contains(['"', '\n', '\r'])
        {
            // Wrap in quotes and escape internal quotes by doubling them
            format!("\"{}\"", value.replace('"', "\"\""))
        } else {
            value.to_string()
        }
    }

    fn render(&self, value: &CellValue) -> String {
        match value {
            CellValue::Null => String::new(),
            CellValue::Text(s) => self.escape_value(s, self.quote_string_fields),
            other => self.escape_value(&other.to_string(), false),
        }
    }

    fn encode(&self, record: &str) -> Vec<u8> {
        match self.encoding {
            TextEncoding::Utf8 => record.as_bytes().to_vec(),
            TextEncoding::Utf16 => record
                .encode_utf16()
                .flat_map(|unit| unit.to_le_bytes())
                .collect(),
        }
    }

    async fn write_record(&mut self, fields: Vec<String>) -> Result<()> {
        let mut record = fields.join(self.delimiter.as_str());
        record.push_str(RECORD_TERMINATOR);
        let bytes = self.encode(&record);

        let Some(file) = self.current.as_mut() else {
            return Err("no table started".into());
        };
        file.writer.write_all(&bytes).await?;
        file.records += 1;
        Ok(())
    }

    async fn close_current(&mut self) -> Result<()> {
        if let Some(mut file) = self.current.take() {
            file.writer.flush().await?;
            file.writer.shutdown().await?;
            debug!(
                "Closed {} after {} records",
                file.path.display(),
                file.records
            );
        }
        Ok(())
    }
}

#[async_trait]
impl TableWriter for DelimitedTextWriter {
    async fn begin_table(&mut self, name: &str) -> Result<()> {
        self.close_current().await?;

        let path = self
            .directory
            .join(format!("{}.csv", sanitize_file_name(name)));
        let mut writer = create_writer(&path).await?;
        if self.encoding == TextEncoding::Utf16 {
            writer.write_all(&UTF16_LE_BOM).await?;
        }

        debug!("Created delimited text file: {}", path.display());
        self.files_created += 1;
        self.current = Some(OpenFile {
            path,
            writer,
            records: 0,
        });
        Ok(())
    }

    async fn write_header(&mut self, columns: &[String]) -> Result<()> {
        let fields = columns
            .iter()
            .map(|c| self.escape_value(c, self.quote_string_fields))
            .collect();
        self.write_record(fields).await
    }

    async fn write_row(&mut self, values: &[CellValue]) -> Result<()> {
        let fields = values.iter().map(|v| self.render(v)).collect();
        self.write_record(fields).await
    }

    async fn end_table(&mut self) -> Result<()> {
        self.close_current().await
    }

    async fn finalize(&mut self) -> Result<()> {
        self.close_current().await?;
        debug!("Delimited text export wrote {} files", self.files_created);
        Ok(())
    }
}
