//! Cell values produced by row cursors
//!
//! Every value a data source hands to the export pipeline is one of the
//! variants of [`CellValue`]. Output formats map each variant explicitly, so
//! adding a format means writing one exhaustive `match`.

use std::fmt;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;

/// A single cell of a row returned by a [`RowCursor`](super::RowCursor)
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Missing value
    Null,
    /// Text value
    Text(String),
    /// 32-bit integer
    Integer(i32),
    /// 64-bit integer
    LargeInteger(i64),
    /// Double precision floating point
    Float(f64),
    /// Fixed point decimal (currency columns)
    Decimal(Decimal),
    /// Boolean value
    Boolean(bool),
    /// Date and time without time zone
    Timestamp(NaiveDateTime),
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Integer(n) => write!(f, "{n}"),
            CellValue::LargeInteger(n) => write!(f, "{n}"),
            CellValue::Float(x) => write!(f, "{x}"),
            CellValue::Decimal(d) => write!(f, "{d}"),
            CellValue::Boolean(true) => f.write_str("True"),
            CellValue::Boolean(false) => f.write_str("False"),
            CellValue::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
        }
    }
}

/// Sortable, locale independent timestamp layout used for text output
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_owned())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<i32> for CellValue {
    fn from(value: i32) -> Self {
        CellValue::Integer(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::LargeInteger(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Float(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Boolean(value)
    }
}

impl From<Decimal> for CellValue {
    fn from(value: Decimal) -> Self {
        CellValue::Decimal(value)
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(value: NaiveDateTime) -> Self {
        CellValue::Timestamp(value)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(CellValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::str::FromStr;

    #[test]
    fn test_display_text_forms() {
        assert_eq!(CellValue::Null.to_string(), "");
        assert_eq!(CellValue::Boolean(true).to_string(), "True");
        assert_eq!(CellValue::Float(0.1).to_string(), "0.1");
        assert_eq!(
            CellValue::Decimal(Decimal::from_str("12.50").unwrap()).to_string(),
            "12.50"
        );
    }

    #[test]
    fn test_timestamp_is_sortable() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 7)
            .unwrap()
            .and_hms_milli_opt(9, 5, 1, 42)
            .unwrap();
        assert_eq!(CellValue::Timestamp(ts).to_string(), "2024-03-07 09:05:01.042");
    }

    #[test]
    fn test_option_conversion() {
        let none: Option<&str> = None;
        assert_eq!(CellValue::from(none), CellValue::Null);
        assert_eq!(CellValue::from(Some(5i32)), CellValue::Integer(5));
    }
}
