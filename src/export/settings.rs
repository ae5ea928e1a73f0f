//! Export settings and their validation

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ExecutionError, Result};

/// Maximum rows of a spreadsheet worksheet, header included
pub const SPREADSHEET_ROW_LIMIT: u64 = 999_999;

/// Text encoding of delimited text files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    /// UTF-8 without byte order mark
    #[default]
    Utf8,
    /// UTF-16 little-endian with byte order mark
    Utf16,
}

impl FromStr for TextEncoding {
    type Err = ExecutionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "").as_str() {
            "utf8" => Ok(TextEncoding::Utf8),
            "utf16" | "utf16le" | "unicode" => Ok(TextEncoding::Utf16),
            _ => Err(ExecutionError::InvalidSettings(format!(
                "unknown encoding '{s}'"
            ))),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextEncoding::Utf8 => f.write_str("utf8"),
            TextEncoding::Utf16 => f.write_str("utf16"),
        }
    }
}

/// Settings for exporting tables to delimited text files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelimitedTextSettings {
    /// Directory receiving one file per table
    pub export_path: PathBuf,
    /// Tables to export, in order
    pub tables: Vec<String>,
    /// Field delimiter
    pub delimiter: String,
    /// Always quote text fields
    pub quote_string_fields: bool,
    pub encoding: TextEncoding,
}

impl DelimitedTextSettings {
    /// Create settings with a comma delimiter, quoted text and UTF-8
    pub fn new(export_path: impl Into<PathBuf>, tables: Vec<String>) -> Self {
        Self {
            export_path: export_path.into(),
            tables,
            delimiter: ",".to_string(),
            quote_string_fields: true,
            encoding: TextEncoding::Utf8,
        }
    }

    /// Check the settings before a job is started
    pub fn validate(&self) -> Result<()> {
        validate_tables(&self.tables)?;

        if self.delimiter.is_empty() {
            return Err(invalid("delimiter must not be empty"));
        }
        if self.delimiter.contains(['"', '\r', '\n']) {
            return Err(invalid(
                "delimiter must not contain quotes or line breaks",
            ));
        }
        Ok(())
    }
}

/// Settings for exporting tables to a spreadsheet workbook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpreadsheetSettings {
    /// Workbook file, one worksheet per table
    pub export_path: PathBuf,
    /// Tables to export, in order
    pub tables: Vec<String>,
}

impl SpreadsheetSettings {
    pub fn new(export_path: impl Into<PathBuf>, tables: Vec<String>) -> Self {
        Self {
            export_path: export_path.into(),
            tables,
        }
    }

    /// Check the settings before a job is started
    pub fn validate(&self) -> Result<()> {
        validate_tables(&self.tables)?;
        if self.export_path.file_name().is_none() {
            return Err(invalid("export path must name a file"));
        }
        Ok(())
    }
}

fn validate_tables(tables: &[String]) -> Result<()> {
    if tables.is_empty() {
        return Err(invalid("no tables selected"));
    }

    let mut seen = HashSet::new();
    for table in tables {
        if table.trim().is_empty() {
            return Err(invalid("table names must not be empty"));
        }
        if !seen.insert(table.as_str()) {
            return Err(invalid(&format!("table '{table}' selected twice")));
        }
    }
    Ok(())
}

fn invalid(msg: &str) -> crate::error::ExportError {
    ExecutionError::InvalidSettings(msg.to_string()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = DelimitedTextSettings::new("/tmp/out", tables(&["Sales"]));
        assert_eq!(settings.delimiter, ",");
        assert!(settings.quote_string_fields);
        assert_eq!(settings.encoding, TextEncoding::Utf8);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_table_lists() {
        assert!(DelimitedTextSettings::new("/tmp", vec![]).validate().is_err());
        assert!(
            DelimitedTextSettings::new("/tmp", tables(&["Sales", "Sales"]))
                .validate()
                .is_err()
        );
        assert!(
            SpreadsheetSettings::new("/tmp/out.xlsx", tables(&[" "]))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_rejects_bad_delimiters() {
        let mut settings = DelimitedTextSettings::new("/tmp", tables(&["Sales"]));
        for bad in ["", "\"", "\n", ";\r"] {
            settings.delimiter = bad.to_string();
            assert!(settings.validate().is_err(), "{bad:?} accepted");
        }
        settings.delimiter = "\t".to_string();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_encoding_from_str() {
        assert_eq!("UTF-8".parse::<TextEncoding>().unwrap(), TextEncoding::Utf8);
        assert_eq!("utf16".parse::<TextEncoding>().unwrap(), TextEncoding::Utf16);
        assert!("latin1".parse::<TextEncoding>().is_err());
    }
}
