//! Spreadsheet writer for export operations
//!
//! All tables of a job go into one workbook, one worksheet per table. Rows
//! are streamed to disk as they are written so memory stays flat for large
//! tables.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_xlsxwriter::{Color, ColNum, Format, RowNum, Workbook, Worksheet};
use tracing::debug;

use crate::connection::CellValue;
use crate::error::Result;
use crate::export::settings::SPREADSHEET_ROW_LIMIT;

/// Maximum length of a worksheet name
const SHEET_NAME_MAX_CHARS: usize = 31;
const INVALID_SHEET_NAME_CHARS: &[char] = &['[', ']', ':', '*', '?', '/', '\\'];

/// Serial number of 1970-01-01 in the 1900 date system
const UNIX_EPOCH_SERIAL: f64 = 25569.0;
const MILLIS_PER_DAY: f64 = 86_400_000.0;

struct SheetState {
    index: usize,
    next_row: RowNum,
    columns: ColNum,
}

/// Writer producing one workbook with a worksheet per table
pub struct SpreadsheetWriter {
    path: PathBuf,
    workbook: Workbook,
    header_format: Format,
    timestamp_format: Format,
    /// Lowercased names already used, sheet names are case-insensitive
    used_names: HashSet<String>,
    current: Option<SheetState>,
    sheets: usize,
    row_limit: u64,
}

impl SpreadsheetWriter {
    /// Create a new spreadsheet writer
    ///
    /// # Arguments
    /// * `path` - Workbook file, written on `finalize`
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            workbook: Workbook::new(),
            header_format: Format::new()
                .set_bold()
                .set_font_name("Segoe UI")
                .set_font_size(9)
                .set_font_color(Color::White)
                .set_background_color(Color::RGB(0x004586)),
            timestamp_format: Format::new().set_num_format("yyyy-mm-dd hh:mm:ss"),
            used_names: HashSet::new(),
            current: None,
            sheets: 0,
            row_limit: SPREADSHEET_ROW_LIMIT,
        }
    }

    /// Lower the row ceiling, header included
    #[cfg(test)]
    pub(crate) fn with_row_limit(mut self, limit: u64) -> Self {
        self.row_limit = limit;
        self
    }

    /// Pick a unique worksheet name for a table
    fn sheet_name(&mut self, table: &str) -> String {
        let base: String = table
            .chars()
            .filter(|c| !INVALID_SHEET_NAME_CHARS.contains(c))
            .collect();
        let base = base.trim_matches('\'');
        let base = if base.is_empty() { "Sheet" } else { base };

        let mut candidate = clip_sheet_name(base, SHEET_NAME_MAX_CHARS);
        let mut suffix = 2;
        while self.used_names.contains(&candidate.to_lowercase()) {
            let tail = format!(" ({suffix})");
            let keep = SHEET_NAME_MAX_CHARS - tail.chars().count();
            candidate = format!("{}{}", clip_sheet_name(base, keep), tail);
            suffix += 1;
        }

        self.used_names.insert(candidate.to_lowercase());
        candidate
    }
}

/// Truncate to `max` characters; names may not start or end with an apostrophe
fn clip_sheet_name(base: &str, max: usize) -> String {
    let clipped = truncate_chars(base, max);
    let clipped = clipped.trim_matches('\'');
    if clipped.is_empty() {
        "Sheet".to_string()
    } else {
        clipped.to_string()
    }
}

fn current_sheet<'a>(
    workbook: &'a mut Workbook,
    current: &'a mut Option<SheetState>,
) -> Result<(&'a mut Worksheet, &'a mut SheetState)> {
    let Some(state) = current.as_mut() else {
        return Err("no table started".into());
    };
    let worksheet = workbook.worksheet_from_index(state.index)?;
    Ok((worksheet, state))
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// Convert a timestamp into a spreadsheet date serial number
fn timestamp_serial(ts: &chrono::NaiveDateTime) -> f64 {
    UNIX_EPOCH_SERIAL + ts.and_utc().timestamp_millis() as f64 / MILLIS_PER_DAY
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: RowNum,
    col: ColNum,
    value: &CellValue,
    timestamp_format: &Format,
) -> Result<()> {
    match value {
        CellValue::Null => {}
        CellValue::Text(s) => {
            worksheet.write_string(row, col, s)?;
        }
        CellValue::Integer(n) => {
            worksheet.write_number(row, col, *n)?;
        }
        CellValue::LargeInteger(n) => {
            if *n > i64::from(i32::MIN) && *n < i64::from(i32::MAX) {
                worksheet.write_number(row, col, *n as f64)?;
            } else {
                worksheet.write_string(row, col, n.to_string())?;
            }
        }
        CellValue::Float(x) => {
            worksheet.write_number(row, col, *x)?;
        }
        CellValue::Decimal(d) => match d.to_f64() {
            Some(x) => {
                worksheet.write_number(row, col, x)?;
            }
            None => {
                worksheet.write_string(row, col, d.to_string())?;
            }
        },
        CellValue::Boolean(_) => {
            worksheet.write_string(row, col, value.to_string())?;
        }
        CellValue::Timestamp(ts) => {
            worksheet.write_number_with_format(row, col, timestamp_serial(ts), timestamp_format)?;
        }
    }
    Ok(())
}

#[async_trait]
impl super::TableWriter for SpreadsheetWriter {
    async fn begin_table(&mut self, name: &str) -> Result<()> {
        let sheet_name = self.sheet_name(name);
        let index = self.sheets;

        let worksheet = self.workbook.add_worksheet_with_constant_memory();
        worksheet.set_name(&sheet_name)?;
        worksheet.set_freeze_panes(1, 0)?;

        debug!("Started worksheet '{}' for table {}", sheet_name, name);
        self.sheets += 1;
        self.current = Some(SheetState {
            index,
            next_row: 0,
            columns: 0,
        });
        Ok(())
    }

    async fn write_header(&mut self, columns: &[String]) -> Result<()> {
        let (worksheet, state) = current_sheet(&mut self.workbook, &mut self.current)?;
        for (col, name) in columns.iter().enumerate() {
            worksheet.write_string_with_format(
                state.next_row,
                col as ColNum,
                name,
                &self.header_format,
            )?;
        }
        state.columns = state.columns.max(columns.len() as ColNum);
        state.next_row += 1;
        Ok(())
    }

    async fn write_row(&mut self, values: &[CellValue]) -> Result<()> {
        let (worksheet, state) = current_sheet(&mut self.workbook, &mut self.current)?;
        for (col, value) in values.iter().enumerate() {
            write_cell(
                worksheet,
                state.next_row,
                col as ColNum,
                value,
                &self.timestamp_format,
            )?;
        }
        state.columns = state.columns.max(values.len() as ColNum);
        state.next_row += 1;
        Ok(())
    }

    async fn end_table(&mut self) -> Result<()> {
        let (worksheet, state) = current_sheet(&mut self.workbook, &mut self.current)?;
        if state.columns > 0 && state.next_row > 0 {
            worksheet.autofilter(0, 0, state.next_row - 1, state.columns - 1)?;
        }
        debug!("Finished worksheet with {} rows", state.next_row);
        self.current = None;
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        self.current = None;
        self.workbook.save(&self.path)?;
        debug!(
            "Saved workbook {} with {} worksheets",
            self.path.display(),
            self.sheets
        );
        Ok(())
    }

    fn row_limit(&self) -> Option<u64> {
        Some(self.row_limit)
    }
}
