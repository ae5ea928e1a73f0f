//! Error handling module for export operations.
//!
//! This module provides the error types shared by the whole crate:
//! - Connection and query errors raised by data sources
//! - Connection parameter resolution errors raised before a job exists
//! - The typed export failure reported once a job has been marked `Failed`
//!
//! Cancellation is deliberately absent here: a cancelled export is a job
//! status, not an error.
//!
//! # Example
//!
//! ```rust
//! use tabexport::error::{ExportError, ResolveError, Result};
//!
//! fn resolve(server: Option<&str>) -> Result<String> {
//!     server
//!         .map(str::to_owned)
//!         .ok_or_else(|| ResolveError::MissingServerName.into())
//! }
//!
//! assert!(matches!(resolve(None), Err(ExportError::Resolve(_))));
//! ```

pub mod kinds;

// Re-export commonly used types
pub use kinds::{
    ConfigError, ConnectionError, ExecutionError, ExportError, ResolveError, Result,
};
