//! Data source boundary for the export engine
//!
//! The export pipeline never talks to a concrete analytical engine. It sees
//! the data source through four small traits:
//! - [`DataSource`] opens a [`Connection`] from a connection string
//! - [`Connection`] selects a catalog and executes queries
//! - [`RowCursor`] is the forward-only result of a query
//! - [`QueryCanceller`] aborts an in-flight query on the server
//!
//! Two implementations ship with the crate: [`MemoryDataSource`] for
//! in-process tables and [`JsonDataSource`] for tables stored as JSON files.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{ConnectionError, Result};
use crate::export::killable::OperationHandle;

pub mod json;
pub mod memory;
pub mod value;

pub use json::JsonDataSource;
pub use memory::{MemoryDataSource, MemoryTable};
pub use value::CellValue;

/// Opens connections to an analytical data source
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Open a new connection
    ///
    /// # Arguments
    /// * `connection_string` - `key=value;` connection string
    ///
    /// # Returns
    /// * `Result<Box<dyn Connection>>` - Open connection or error
    async fn connect(&self, connection_string: &str) -> Result<Box<dyn Connection>>;
}

/// An open connection, exclusively owned by one export job
#[async_trait]
pub trait Connection: Send {
    /// Select the database (catalog) subsequent queries run against
    async fn change_database(&mut self, database: &str) -> Result<()>;

    /// Execute a query and return a forward-only row cursor
    ///
    /// # Arguments
    /// * `query` - Query text
    /// * `handle` - Identifies the query so it can be cancelled
    async fn execute(&mut self, query: &str, handle: &OperationHandle)
    -> Result<Box<dyn RowCursor>>;

    /// Get a canceller able to abort queries issued on this connection
    fn canceller(&self) -> Arc<dyn QueryCanceller>;
}

/// Forward-only, single-pass sequence of rows
#[async_trait]
pub trait RowCursor: Send {
    /// Column names in result order
    fn columns(&self) -> &[String];

    /// Fetch the next row, `None` once the cursor is exhausted
    async fn next_row(&mut self) -> Result<Option<Vec<CellValue>>>;
}

/// Aborts a running query on the server side
#[async_trait]
pub trait QueryCanceller: Send + Sync {
    /// Attempt to cancel the query identified by `handle`
    ///
    /// Cancelling a query that already finished is not an error.
    async fn cancel(&self, handle: &OperationHandle) -> Result<()>;
}

/// Build the query that evaluates a whole table
///
/// No predicate and no paging: row limits are enforced on the client.
pub fn evaluate_table_query(table: &str) -> String {
    format!("EVALUATE '{table}'")
}

/// Extract the table name from an `EVALUATE '<table>'` query
pub fn parse_evaluate_query(query: &str) -> Option<&str> {
    let rest = query.trim().strip_prefix("EVALUATE")?.trim_start();
    let inner = rest.strip_prefix('\'')?.strip_suffix('\'')?;
    if inner.is_empty() { None } else { Some(inner) }
}

/// Parsed `key=value;` connection string
///
/// Keys are case-insensitive; values keep their case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionString {
    pairs: HashMap<String, String>,
}

impl ConnectionString {
    /// Key naming the server or data directory
    pub const DATA_SOURCE: &'static str = "Data Source";
    /// Key naming the catalog
    pub const INITIAL_CATALOG: &'static str = "Initial Catalog";
    /// Key carrying an access token
    pub const PASSWORD: &'static str = "Password";

    /// Parse a connection string
    ///
    /// Values may be wrapped in double or single quotes; inside quotes the
    /// quote character is doubled and `;` or `=` are literal.
    ///
    /// # Arguments
    /// * `input` - Connection string such as `Data Source=localhost:5132`
    ///
    /// # Returns
    /// * `Result<Self>` - Parsed pairs or error on a malformed segment
    pub fn parse(input: &str) -> Result<Self> {
        let chars: Vec<char> = input.chars().collect();
        let mut pairs = HashMap::new();
        let mut pos = 0;

        loop {
            while pos < chars.len() && (chars[pos] == ';' || chars[pos].is_whitespace()) {
                pos += 1;
            }
            if pos == chars.len() {
                break;
            }

            let key_start = pos;
            while pos < chars.len() && chars[pos] != '=' && chars[pos] != ';' {
                pos += 1;
            }
            let key: String = chars[key_start..pos].iter().collect();
            if pos == chars.len() || chars[pos] == ';' {
                return Err(invalid(format!("missing '=' in '{}'", key.trim())));
            }
            let key = key.trim();
            if key.is_empty() {
                return Err(invalid("empty key".to_string()));
            }
            pos += 1;

            while pos < chars.len() && chars[pos] != ';' && chars[pos].is_whitespace() {
                pos += 1;
            }

            let value = match chars.get(pos) {
                Some(&quote) if quote == '"' || quote == '\'' => {
                    let (value, next) = read_quoted(&chars, pos + 1, quote)
                        .ok_or_else(|| invalid(format!("unterminated value for '{key}'")))?;
                    pos = next;
                    while pos < chars.len() && chars[pos].is_whitespace() {
                        pos += 1;
                    }
                    if pos < chars.len() && chars[pos] != ';' {
                        return Err(invalid(format!("text after quoted value of '{key}'")));
                    }
                    value
                }
                _ => {
                    let value_start = pos;
                    while pos < chars.len() && chars[pos] != ';' {
                        pos += 1;
                    }
                    chars[value_start..pos].iter().collect::<String>().trim().to_string()
                }
            };

            pairs.insert(key.to_ascii_lowercase(), value);
        }

        Ok(Self { pairs })
    }

    /// Render pairs as a connection string, quoting values where needed
    pub fn format(pairs: &[(&str, &str)]) -> String {
        pairs
            .iter()
            .map(|(key, value)| format!("{key}={}", quote_value(value)))
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Look up a value by key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    /// Value of `Data Source`
    pub fn data_source(&self) -> Option<&str> {
        self.get(Self::DATA_SOURCE)
    }
}

fn invalid(message: String) -> crate::error::ExportError {
    ConnectionError::InvalidConnectionString(message).into()
}

/// Read a quoted value starting after its opening quote
///
/// Returns the unescaped value and the position after the closing quote.
fn read_quoted(chars: &[char], mut pos: usize, quote: char) -> Option<(String, usize)> {
    let mut value = String::new();
    while pos < chars.len() {
        if chars[pos] == quote {
            if chars.get(pos + 1) == Some(&quote) {
                value.push(quote);
                pos += 2;
                continue;
            }
            return Some((value, pos + 1));
        }
        value.push(chars[pos]);
        pos += 1;
    }
    None
}

fn quote_value(value: &str) -> String {
    let needs_quotes = value.contains([';', '=', '"', '\''])
        || value.starts_with(char::is_whitespace)
        || value.ends_with(char::is_whitespace);
    if !needs_quotes {
        return value.to_string();
    }
    if value.contains('"') && !value.contains('\'') {
        format!("'{value}'")
    } else {
        format!("\"{}\"", value.replace('"', "\"\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluate_query_roundtrip() {
        let query = evaluate_table_query("Sales");
        assert_eq!(query, "EVALUATE 'Sales'");
        assert_eq!(parse_evaluate_query(&query), Some("Sales"));
    }

    #[test]
    fn test_parse_evaluate_query_rejects_other_text() {
        assert_eq!(parse_evaluate_query("SELECT * FROM Sales"), None);
        assert_eq!(parse_evaluate_query("EVALUATE Sales"), None);
        assert_eq!(parse_evaluate_query("EVALUATE ''"), None);
        assert_eq!(parse_evaluate_query("  EVALUATE 'Date Table' "), Some("Date Table"));
    }

    #[test]
    fn test_connection_string_parse() {
        let cs = ConnectionString::parse("Data Source=localhost:5132; initial catalog=Model;")
            .unwrap();
        assert_eq!(cs.data_source(), Some("localhost:5132"));
        assert_eq!(cs.get("Initial Catalog"), Some("Model"));
        assert_eq!(cs.get("Password"), None);
    }

    #[test]
    fn test_connection_string_keeps_equals_in_value() {
        let cs = ConnectionString::parse("Password=abc==;Data Source=x").unwrap();
        assert_eq!(cs.get("password"), Some("abc=="));
    }

    #[test]
    fn test_connection_string_invalid_segment() {
        assert!(ConnectionString::parse("Data Source").is_err());
        assert!(ConnectionString::parse("=value").is_err());
        assert!(ConnectionString::parse("Initial Catalog=\"open").is_err());
        assert!(ConnectionString::parse("Initial Catalog=\"a\"b").is_err());
    }

    #[test]
    fn test_connection_string_quoted_values() {
        let cs = ConnectionString::parse(
            "Data Source=x; Initial Catalog=\"Fin;Password=evil\"; Password='it''s'",
        )
        .unwrap();
        assert_eq!(cs.get("Initial Catalog"), Some("Fin;Password=evil"));
        assert_eq!(cs.get("Password"), Some("it's"));
    }

    #[test]
    fn test_format_quotes_values_that_need_it() {
        assert_eq!(
            ConnectionString::format(&[("Data Source", "localhost:5132"), ("Initial Catalog", "Sales Model")]),
            "Data Source=localhost:5132;Initial Catalog=Sales Model"
        );
        assert_eq!(ConnectionString::format(&[("A", "a;b")]), "A=\"a;b\"");
        assert_eq!(ConnectionString::format(&[("A", "say \"hi\"")]), "A='say \"hi\"'");
        assert_eq!(ConnectionString::format(&[("A", "it's \"x\"")]), "A=\"it's \"\"x\"\"\"");
        assert_eq!(ConnectionString::format(&[("A", " padded")]), "A=\" padded\"");
    }

    #[test]
    fn test_format_then_parse_keeps_values() {
        let values = ["Fin;Password=evil", "it's \"x\"", "say \"hi\"", "  spaced  ", "plain", "a=b"];
        for value in values {
            let rendered = ConnectionString::format(&[("Initial Catalog", value), ("Password", "tok")]);
            let cs = ConnectionString::parse(&rendered).unwrap();
            assert_eq!(cs.get("Initial Catalog"), Some(value), "{rendered}");
            assert_eq!(cs.get("Password"), Some("tok"));
        }
    }
}
