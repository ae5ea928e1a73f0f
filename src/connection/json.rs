//! JSON file data source
//!
//! `Data Source` names a directory; each database is a file
//! `<directory>/<database>.json` with the layout:
//!
//! ```json
//! {
//!   "tables": {
//!     "Sales": {
//!       "columns": ["Id", "Amount", "Date"],
//!       "rows": [[1, 9.5, {"datetime": "2024-01-31T10:00:00"}]]
//!     }
//!   }
//! }
//! ```
//!
//! Plain JSON values map onto [`CellValue`] by type. Objects with a single
//! `datetime` or `decimal` key carry timestamps and exact decimals.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{ConnectionError, Result};
use crate::export::killable::OperationHandle;

use super::{
    CellValue, Connection, ConnectionString, DataSource, QueryCanceller, RowCursor,
    parse_evaluate_query,
};

#[derive(Debug, Deserialize)]
struct JsonDatabase {
    #[serde(default)]
    tables: HashMap<String, JsonTable>,
}

#[derive(Debug, Clone, Deserialize)]
struct JsonTable {
    columns: Vec<String>,
    #[serde(default)]
    rows: Vec<Vec<Value>>,
}

/// Data source reading databases from JSON files
#[derive(Debug, Clone, Default)]
pub struct JsonDataSource;

impl JsonDataSource {
    /// Create a new JSON data source
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DataSource for JsonDataSource {
    async fn connect(&self, connection_string: &str) -> Result<Box<dyn Connection>> {
        let parsed = ConnectionString::parse(connection_string)?;
        let directory = parsed.data_source().map(PathBuf::from).ok_or_else(|| {
            ConnectionError::ConnectionFailed("connection string has no Data Source".to_string())
        })?;

        if !tokio::fs::metadata(&directory)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Err(ConnectionError::ConnectionFailed(format!(
                "data directory does not exist: {}",
                directory.display()
            ))
            .into());
        }

        debug!("Opened JSON data source at {}", directory.display());

        Ok(Box::new(JsonConnection {
            directory,
            tables: None,
        }))
    }
}

struct JsonConnection {
    directory: PathBuf,
    tables: Option<HashMap<String, JsonTable>>,
}

impl JsonConnection {
    fn database_path(&self, database: &str) -> PathBuf {
        self.directory.join(format!("{database}.json"))
    }
}

#[async_trait]
impl Connection for JsonConnection {
    async fn change_database(&mut self, database: &str) -> Result<()> {
        let path = self.database_path(database);
        let content = read_database(&path, database).await?;
        let parsed: JsonDatabase = serde_json::from_str(&content)?;
        debug!(
            "Loaded database {} with {} tables",
            database,
            parsed.tables.len()
        );
        self.tables = Some(parsed.tables);
        Ok(())
    }

    async fn execute(
        &mut self,
        query: &str,
        handle: &OperationHandle,
    ) -> Result<Box<dyn RowCursor>> {
        let tables = self.tables.as_ref().ok_or_else(|| {
            ConnectionError::QueryFailed("no database selected".to_string())
        })?;
        let name = parse_evaluate_query(query)
            .ok_or_else(|| ConnectionError::InvalidQuery(query.to_string()))?;
        let table = tables
            .get(name)
            .ok_or_else(|| ConnectionError::TableNotFound(name.to_string()))?;

        debug!("Executing {} as {}", query, handle.comment());

        Ok(Box::new(JsonCursor {
            columns: table.columns.clone(),
            rows: table.rows.clone().into_iter(),
        }))
    }

    fn canceller(&self) -> Arc<dyn QueryCanceller> {
        Arc::new(JsonCanceller)
    }
}

async fn read_database(path: &Path, database: &str) -> Result<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ConnectionError::DatabaseNotFound(database.to_string()).into())
        }
        Err(e) => Err(e.into()),
    }
}

struct JsonCursor {
    columns: Vec<String>,
    rows: std::vec::IntoIter<Vec<Value>>,
}

#[async_trait]
impl RowCursor for JsonCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<Vec<CellValue>>> {
        let Some(row) = self.rows.next() else {
            return Ok(None);
        };

        if row.len() != self.columns.len() {
            return Err(ConnectionError::CursorError(format!(
                "row has {} values, expected {}",
                row.len(),
                self.columns.len()
            ))
            .into());
        }

        row.into_iter().map(json_to_cell).collect::<Result<Vec<_>>>().map(Some)
    }
}

/// Rows are read locally, so stopping the fetch loop is enough.
struct JsonCanceller;

#[async_trait]
impl QueryCanceller for JsonCanceller {
    async fn cancel(&self, handle: &OperationHandle) -> Result<()> {
        debug!("Cancel requested for {}", handle.comment());
        Ok(())
    }
}

/// Convert a JSON value into a cell
fn json_to_cell(value: Value) -> Result<CellValue> {
    let cell = match value {
        Value::Null => CellValue::Null,
        Value::Bool(b) => CellValue::Boolean(b),
        Value::String(s) => CellValue::Text(s),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                match i32::try_from(i) {
                    Ok(small) => CellValue::Integer(small),
                    Err(_) => CellValue::LargeInteger(i),
                }
            } else if let Some(f) = n.as_f64() {
                CellValue::Float(f)
            } else {
                return Err(bad_value(&n.to_string()));
            }
        }
        Value::Object(map) => {
            if let Some(Value::String(raw)) = map.get("datetime") {
                let ts = NaiveDateTime::from_str(raw).map_err(|e| bad_value(&e.to_string()))?;
                CellValue::Timestamp(ts)
            } else if let Some(Value::String(raw)) = map.get("decimal") {
                let d = Decimal::from_str(raw).map_err(|e| bad_value(&e.to_string()))?;
                CellValue::Decimal(d)
            } else {
                return Err(bad_value("object without datetime or decimal key"));
            }
        }
        Value::Array(_) => return Err(bad_value("arrays are not cell values")),
    };
    Ok(cell)
}

fn bad_value(detail: &str) -> crate::error::ExportError {
    ConnectionError::CursorError(format!("unsupported cell value: {detail}")).into()
}
