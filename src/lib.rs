//! Table export library
//!
//! This library exports the tables of an analytical model to delimited text
//! files or to a spreadsheet workbook. Exports run as jobs that can be
//! cancelled and polled; at most one job runs per source.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and argument parsing
//! - `config`: Configuration management
//! - `connection`: Data source traits, cell values and bundled sources
//! - `error`: Error types and handling
//! - `export`: Jobs, registry, pipeline and writers
//! - `service`: Export entry points
//! - `source`: Source entities, credentials and connection resolution
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tabexport::connection::JsonDataSource;
//! use tabexport::export::DelimitedTextSettings;
//! use tabexport::source::{Credentials, DefaultConnectionResolver, DesktopReport};
//! use tabexport::ExportDataService;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = ExportDataService::new(
//!         Arc::new(JsonDataSource::new()),
//!         Arc::new(DefaultConnectionResolver),
//!     );
//!     let source = DesktopReport {
//!         report_path: "sales.pbix".into(),
//!         report_name: None,
//!         server_name: Some("./data".into()),
//!         database_name: Some("Sales".into()),
//!     }
//!     .into();
//!     let settings = DelimitedTextSettings::new("./out", vec!["Sales".into()]);
//!
//!     let outcome = service
//!         .export_delimited_text(&source, &settings, &Credentials::none(), CancellationToken::new())
//!         .await?;
//!     println!("{}", outcome.job.status());
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod export;
pub mod service;
pub mod source;

// Re-export commonly used types
pub use config::Config;
pub use error::{ExportError, Result};
pub use export::{ExportJob, ExportJobSnapshot, ExportJobStatus};
pub use service::{ExportDataService, ExportOutcome};
pub use source::{Credentials, SourceEntity, SourceKey};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
