//! Export summary rendering using tabled

use tabled::{
    builder::Builder,
    settings::{Alignment, Modify, Style, object::Columns, object::Rows},
};

use crate::export::ExportJobSnapshot;

/// Render a per-table summary of a finished job
///
/// Tables left running by a canceled or failed job are reported as
/// interrupted.
pub fn format_summary(snapshot: &ExportJobSnapshot) -> String {
    let interrupted: Vec<&str> = snapshot
        .interrupted_tables()
        .map(|t| t.name.as_str())
        .collect();

    let mut builder = Builder::default();
    builder.push_record(["Table", "Rows", "Status"].map(String::from));
    for table in &snapshot.tables {
        let status = if interrupted.contains(&table.name.as_str()) {
            "Interrupted".to_string()
        } else {
            table.status.to_string()
        };
        builder.push_record([table.name.clone(), table.row_count.to_string(), status]);
    }

    let mut table = builder.build();
    table.with(Style::rounded());
    table.with(Modify::new(Columns::new(1..=1)).with(Alignment::right()));
    table.with(Modify::new(Rows::first()).with(Alignment::center()));

    format!(
        "{}\nExport of {} {}: {} rows in {} tables",
        table,
        snapshot.source_key,
        snapshot.status.to_string().to_lowercase(),
        snapshot.total_rows(),
        snapshot.tables.len()
    )
}
