//! Progress display for export jobs
//!
//! The pipeline does not report progress itself. A tracker renders the
//! snapshots a caller polls while the export runs.

use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};

use super::job::ExportJobSnapshot;

/// Spinner showing the table being exported and the rows written so far
pub struct ProgressTracker {
    /// Number of tables requested
    total_tables: usize,
    /// Start time of the operation
    start_time: Instant,
    /// Progress spinner (optional, can be disabled)
    bar: Option<ProgressBar>,
}

impl ProgressTracker {
    /// Create a new progress tracker
    ///
    /// # Arguments
    /// * `total_tables` - Number of tables requested
    /// * `enable_bar` - Whether to display a spinner
    pub fn new(total_tables: usize, enable_bar: bool) -> Self {
        let bar = enable_bar.then(|| {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
                bar.set_style(style);
            }
            bar
        });

        Self {
            total_tables,
            start_time: Instant::now(),
            bar,
        }
    }

    /// Render the latest snapshot
    pub fn update(&self, snapshot: &ExportJobSnapshot) {
        if let Some(ref bar) = self.bar {
            bar.set_message(self.message(snapshot, self.start_time.elapsed().as_secs_f64()));
            bar.tick();
        }
    }

    fn message(&self, snapshot: &ExportJobSnapshot, elapsed: f64) -> String {
        let total = snapshot.total_rows();
        let table = snapshot
            .tables
            .last()
            .map(|t| format!("{} ({} rows)", t.name, t.row_count))
            .unwrap_or_else(|| "connecting".to_string());

        let mut message = format!(
            "table {}/{}: {}, {} rows total",
            snapshot.tables.len(),
            self.total_tables,
            table,
            total
        );
        if elapsed > 0.0 {
            message.push_str(&format!(" ({:.0} rows/sec)", total as f64 / elapsed));
        }
        message
    }

    /// Finish and clear the spinner
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}
