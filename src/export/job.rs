//! Export job and table state
//!
//! An [`ExportJob`] is a cheap, clonable handle to the state of one export.
//! Readers only ever see the read methods and [`ExportJobSnapshot`]s; the
//! transition methods are crate-private and driven by the pipeline that owns
//! the job.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ExecutionError, Result};
use crate::source::SourceKey;

/// Status of an export job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExportJobStatus {
    /// Tables are being exported
    Running,
    /// Every requested table was processed
    Completed,
    /// Stopped by the caller's cancellation signal
    Canceled,
    /// Stopped by an unrecoverable error
    Failed,
}

impl ExportJobStatus {
    /// Check whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExportJobStatus::Running)
    }
}

impl fmt::Display for ExportJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportJobStatus::Running => "Running",
            ExportJobStatus::Completed => "Completed",
            ExportJobStatus::Canceled => "Canceled",
            ExportJobStatus::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// Status of one table within a job
///
/// A table left `Running` inside a terminal job was interrupted; the job
/// status tells why.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExportTableStatus {
    /// Rows are being written
    Running,
    /// All rows of the table were written
    Completed,
    /// The output format's row ceiling was reached
    Truncated,
}

impl fmt::Display for ExportTableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportTableStatus::Running => "Running",
            ExportTableStatus::Completed => "Completed",
            ExportTableStatus::Truncated => "Truncated",
        };
        f.write_str(name)
    }
}

/// Point-in-time copy of a table's progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportTableSnapshot {
    pub name: String,
    pub row_count: u64,
    pub status: ExportTableStatus,
}

/// Point-in-time copy of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportJobSnapshot {
    pub source_key: SourceKey,
    pub status: ExportJobStatus,
    pub tables: Vec<ExportTableSnapshot>,
}

impl ExportJobSnapshot {
    /// Total rows written across all tables
    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.row_count).sum()
    }

    /// Find a table by name
    pub fn table(&self, name: &str) -> Option<&ExportTableSnapshot> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Tables that never reached a final table status
    pub fn interrupted_tables(&self) -> impl Iterator<Item = &ExportTableSnapshot> {
        let terminal = self.status.is_terminal();
        self.tables
            .iter()
            .filter(move |t| terminal && t.status == ExportTableStatus::Running)
    }
}

#[derive(Debug)]
struct TableState {
    name: String,
    row_count: u64,
    status: ExportTableStatus,
}

#[derive(Debug)]
struct JobState {
    source_key: SourceKey,
    status: ExportJobStatus,
    tables: Vec<TableState>,
}

/// Handle to an export job
///
/// Clones share the same state.
#[derive(Debug, Clone)]
pub struct ExportJob {
    state: Arc<RwLock<JobState>>,
}

impl ExportJob {
    pub(crate) fn new(source_key: SourceKey) -> Self {
        Self {
            state: Arc::new(RwLock::new(JobState {
                source_key,
                status: ExportJobStatus::Running,
                tables: Vec::new(),
            })),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, JobState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, JobState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Source key this job exports
    pub fn source_key(&self) -> SourceKey {
        self.read().source_key.clone()
    }

    /// Current job status
    pub fn status(&self) -> ExportJobStatus {
        self.read().status
    }

    /// Check whether two handles point at the same job
    pub fn same_job(&self, other: &ExportJob) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Take a consistent copy of the job and its tables
    pub fn snapshot(&self) -> ExportJobSnapshot {
        let state = self.read();
        ExportJobSnapshot {
            source_key: state.source_key.clone(),
            status: state.status,
            tables: state
                .tables
                .iter()
                .map(|t| ExportTableSnapshot {
                    name: t.name.clone(),
                    row_count: t.row_count,
                    status: t.status,
                })
                .collect(),
        }
    }

    /// Append a table in `Running` state
    ///
    /// Adding a table to a job that already reached a terminal status is a
    /// contract violation of the pipeline.
    pub(crate) fn add_table(&self, name: &str) -> Result<ExportTable> {
        let mut state = self.write();
        debug_assert!(
            !state.status.is_terminal(),
            "table added to a {} job",
            state.status
        );
        if state.status.is_terminal() {
            return Err(ExecutionError::JobNotRunning(state.source_key.to_string()).into());
        }

        state.tables.push(TableState {
            name: name.to_string(),
            row_count: 0,
            status: ExportTableStatus::Running,
        });

        Ok(ExportTable {
            job: self.clone(),
            index: state.tables.len() - 1,
        })
    }

    pub(crate) fn set_completed(&self) {
        self.finish(ExportJobStatus::Completed);
    }

    pub(crate) fn set_canceled(&self) {
        self.finish(ExportJobStatus::Canceled);
    }

    pub(crate) fn set_failed(&self) {
        self.finish(ExportJobStatus::Failed);
    }

    fn finish(&self, status: ExportJobStatus) {
        let mut state = self.write();
        if state.status.is_terminal() {
            warn!(
                "Ignoring {} transition for {} job {}",
                status, state.status, state.source_key
            );
            return;
        }
        state.status = status;
    }
}

/// Handle to one table of an [`ExportJob`]
#[derive(Debug, Clone)]
pub struct ExportTable {
    job: ExportJob,
    index: usize,
}

impl ExportTable {
    /// Table name
    pub fn name(&self) -> String {
        self.job.read().tables[self.index].name.clone()
    }

    /// Rows written so far
    pub fn row_count(&self) -> u64 {
        self.job.read().tables[self.index].row_count
    }

    /// Current table status
    pub fn status(&self) -> ExportTableStatus {
        self.job.read().tables[self.index].status
    }

    /// Count one more written row, returning the new total
    pub(crate) fn increment_rows(&self) -> u64 {
        let mut state = self.job.write();
        let table = &mut state.tables[self.index];
        table.row_count += 1;
        table.row_count
    }

    pub(crate) fn set_completed(&self) {
        self.finish(ExportTableStatus::Completed);
    }

    pub(crate) fn set_truncated(&self) {
        self.finish(ExportTableStatus::Truncated);
    }

    fn finish(&self, status: ExportTableStatus) {
        let mut state = self.job.write();
        let table = &mut state.tables[self.index];
        if table.status != ExportTableStatus::Running {
            warn!(
                "Ignoring {} transition for {} table {}",
                status, table.status, table.name
            );
            return;
        }
        table.status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> ExportJob {
        ExportJob::new(SourceKey::Report("C:/reports/sales.pbix".into()))
    }

    #[test]
    fn test_new_job_is_running_and_empty() {
        let job = job();
        assert_eq!(job.status(), ExportJobStatus::Running);
        assert!(job.snapshot().tables.is_empty());
    }

    #[test]
    fn test_tables_keep_insertion_order() {
        let job = job();
        let sales = job.add_table("Sales").unwrap();
        job.add_table("Customers").unwrap();
        sales.increment_rows();
        sales.increment_rows();
        sales.set_completed();

        let snapshot = job.snapshot();
        let names: Vec<_> = snapshot.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["Sales", "Customers"]);
        assert_eq!(snapshot.tables[0].row_count, 2);
        assert_eq!(snapshot.tables[0].status, ExportTableStatus::Completed);
        assert_eq!(snapshot.tables[1].status, ExportTableStatus::Running);
        assert_eq!(snapshot.total_rows(), 2);
    }

    #[test]
    fn test_terminal_status_is_final() {
        let job = job();
        job.set_canceled();
        job.set_completed();
        job.set_failed();
        assert_eq!(job.status(), ExportJobStatus::Canceled);
    }

    #[test]
    fn test_table_status_transitions_once() {
        let job = job();
        let table = job.add_table("Sales").unwrap();
        table.set_truncated();
        table.set_completed();
        assert_eq!(table.status(), ExportTableStatus::Truncated);
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "table added"))]
    fn test_add_table_after_terminal_is_rejected() {
        let job = job();
        job.set_completed();
        let result = job.add_table("Late");
        assert!(result.is_err());
    }

    #[test]
    fn test_clones_share_state() {
        let job = job();
        let other = job.clone();
        other.add_table("Sales").unwrap().increment_rows();
        assert!(job.same_job(&other));
        assert_eq!(job.snapshot().total_rows(), 1);
    }

    #[test]
    fn test_interrupted_tables() {
        let job = job();
        job.add_table("Sales").unwrap().set_completed();
        job.add_table("Customers").unwrap();
        assert_eq!(job.snapshot().interrupted_tables().count(), 0);

        job.set_failed();
        let snapshot = job.snapshot();
        let interrupted: Vec<_> = snapshot.interrupted_tables().map(|t| &t.name).collect();
        assert_eq!(interrupted, ["Customers"]);
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let job = job();
        job.add_table("Sales").unwrap().increment_rows();
        let json = serde_json::to_value(job.snapshot()).unwrap();
        assert_eq!(json["status"], "Running");
        assert_eq!(json["tables"][0]["rowCount"], 1);
    }
}
