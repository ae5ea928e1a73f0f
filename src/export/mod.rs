//! Export job engine
//!
//! This module provides everything needed to run bulk table exports:
//! - Job and table state with read-only snapshots for polling
//! - A registry enforcing one running job per source
//! - The pipeline streaming rows from a query cursor into a table writer
//! - Delimited text and spreadsheet writers
//!
//! # Architecture
//!
//! ```text
//! ExportDataService
//!   └─> ExportJobRegistry (one job per SourceKey)
//!         └─> ExportCoordinator
//!               ├─> Connection / RowCursor (killable remote calls)
//!               └─> TableWriter (DelimitedTextWriter, SpreadsheetWriter)
//! ```

pub mod coordinator;
pub mod job;
pub mod killable;
pub mod progress;
pub mod registry;
pub mod settings;
pub mod writers;

pub use coordinator::{ExportCoordinator, Flow};
pub use job::{
    ExportJob, ExportJobSnapshot, ExportJobStatus, ExportTable, ExportTableSnapshot,
    ExportTableStatus,
};
pub use killable::OperationHandle;
pub use progress::ProgressTracker;
pub use registry::ExportJobRegistry;
pub use settings::{DelimitedTextSettings, SPREADSHEET_ROW_LIMIT, SpreadsheetSettings, TextEncoding};
pub use writers::{DelimitedTextWriter, SpreadsheetWriter, TableWriter};
