//! In-process data source
//!
//! Serves tables held in memory through the regular [`DataSource`] traits.
//! Tables can be generated lazily so very large exports do not need the rows
//! materialized, and can be configured to fail, block or signal at given
//! points of the fetch, which makes the source useful for driving the
//! pipeline deterministically.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::{ConnectionError, Result};
use crate::export::killable::OperationHandle;

use super::{
    CellValue, Connection, ConnectionString, DataSource, QueryCanceller, RowCursor,
    parse_evaluate_query,
};

type RowGenerator = Arc<dyn Fn(u64) -> Vec<CellValue> + Send + Sync>;
type RowHook = Arc<dyn Fn(u64) + Send + Sync>;
type ExhaustedHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone)]
enum RowSource {
    Fixed(Arc<Vec<Vec<CellValue>>>),
    Generated { count: u64, generate: RowGenerator },
}

impl RowSource {
    fn len(&self) -> u64 {
        match self {
            RowSource::Fixed(rows) => rows.len() as u64,
            RowSource::Generated { count, .. } => *count,
        }
    }

    fn row(&self, index: u64) -> Vec<CellValue> {
        match self {
            RowSource::Fixed(rows) => rows[index as usize].clone(),
            RowSource::Generated { generate, .. } => generate(index),
        }
    }
}

/// A table served by [`MemoryDataSource`]
#[derive(Clone)]
pub struct MemoryTable {
    columns: Vec<String>,
    rows: RowSource,
    fail_after: Option<u64>,
    gate: Option<Arc<Semaphore>>,
    on_row: Option<RowHook>,
    on_exhausted: Option<ExhaustedHook>,
}

impl MemoryTable {
    /// Create a table from materialized rows
    pub fn new<C, S>(columns: C, rows: Vec<Vec<CellValue>>) -> Self
    where
        C: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_rows(columns, RowSource::Fixed(Arc::new(rows)))
    }

    /// Create a table whose rows are produced on demand
    ///
    /// # Arguments
    /// * `columns` - Column names
    /// * `count` - Number of rows the cursor yields
    /// * `generate` - Builds the row at a given zero-based index
    pub fn generated<C, S, F>(columns: C, count: u64, generate: F) -> Self
    where
        C: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(u64) -> Vec<CellValue> + Send + Sync + 'static,
    {
        Self::with_rows(
            columns,
            RowSource::Generated {
                count,
                generate: Arc::new(generate),
            },
        )
    }

    fn with_rows<C, S>(columns: C, rows: RowSource) -> Self
    where
        C: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows,
            fail_after: None,
            gate: None,
            on_row: None,
            on_exhausted: None,
        }
    }

    /// Make the cursor fail after `rows` rows were delivered
    pub fn fail_after(mut self, rows: u64) -> Self {
        self.fail_after = Some(rows);
        self
    }

    /// Block the first fetch until the semaphore has a permit
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Call `hook` with the index of every row before it is delivered
    pub fn on_row(mut self, hook: impl Fn(u64) + Send + Sync + 'static) -> Self {
        self.on_row = Some(Arc::new(hook));
        self
    }

    /// Call `hook` once the cursor reports exhaustion
    pub fn on_exhausted(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_exhausted = Some(Arc::new(hook));
        self
    }

    /// Number of rows the table holds
    pub fn row_count(&self) -> u64 {
        self.rows.len()
    }
}

#[derive(Default)]
struct MemoryState {
    databases: RwLock<HashMap<String, HashMap<String, MemoryTable>>>,
    queries: Mutex<Vec<String>>,
    cancelled: Mutex<Vec<String>>,
    connections: AtomicUsize,
}

/// Data source serving [`MemoryTable`]s grouped by database
#[derive(Clone, Default)]
pub struct MemoryDataSource {
    state: Arc<MemoryState>,
}

impl MemoryDataSource {
    /// Create an empty data source
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table to a database, creating the database if needed
    pub fn with_table(self, database: &str, name: &str, table: MemoryTable) -> Self {
        self.insert_table(database, name, table);
        self
    }

    /// Add or replace a table
    pub fn insert_table(&self, database: &str, name: &str, table: MemoryTable) {
        let mut databases = self
            .state
            .databases
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        databases
            .entry(database.to_string())
            .or_default()
            .insert(name.to_string(), table);
    }

    /// Queries executed so far, in order
    pub fn executed_queries(&self) -> Vec<String> {
        self.state
            .queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Operation comments of queries that were cancelled
    pub fn cancelled_queries(&self) -> Vec<String> {
        self.state
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of connections opened
    pub fn connection_count(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataSource for MemoryDataSource {
    async fn connect(&self, connection_string: &str) -> Result<Box<dyn Connection>> {
        let parsed = ConnectionString::parse(connection_string)?;
        if parsed.data_source().is_none() {
            return Err(ConnectionError::ConnectionFailed(
                "connection string has no Data Source".to_string(),
            )
            .into());
        }

        self.state.connections.fetch_add(1, Ordering::SeqCst);
        debug!("Opened in-memory connection");

        Ok(Box::new(MemoryConnection {
            state: Arc::clone(&self.state),
            tables: None,
        }))
    }
}

struct MemoryConnection {
    state: Arc<MemoryState>,
    tables: Option<HashMap<String, MemoryTable>>,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn change_database(&mut self, database: &str) -> Result<()> {
        let databases = self
            .state
            .databases
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let tables = databases
            .get(database)
            .ok_or_else(|| ConnectionError::DatabaseNotFound(database.to_string()))?;
        self.tables = Some(tables.clone());
        Ok(())
    }

    async fn execute(
        &mut self,
        query: &str,
        handle: &OperationHandle,
    ) -> Result<Box<dyn RowCursor>> {
        self.state
            .queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(query.to_string());

        let tables = self.tables.as_ref().ok_or_else(|| {
            ConnectionError::QueryFailed("no database selected".to_string())
        })?;
        let name = parse_evaluate_query(query)
            .ok_or_else(|| ConnectionError::InvalidQuery(query.to_string()))?;
        let table = tables
            .get(name)
            .ok_or_else(|| ConnectionError::TableNotFound(name.to_string()))?;

        debug!("Executing {} as {}", query, handle.comment());

        Ok(Box::new(MemoryCursor {
            table: table.clone(),
            position: 0,
            opened: false,
        }))
    }

    fn canceller(&self) -> Arc<dyn QueryCanceller> {
        Arc::new(MemoryCanceller {
            state: Arc::clone(&self.state),
        })
    }
}

struct MemoryCursor {
    table: MemoryTable,
    position: u64,
    opened: bool,
}

#[async_trait]
impl RowCursor for MemoryCursor {
    fn columns(&self) -> &[String] {
        &self.table.columns
    }

    async fn next_row(&mut self) -> Result<Option<Vec<CellValue>>> {
        if !self.opened {
            self.opened = true;
            if let Some(gate) = &self.table.gate {
                let _permit = gate
                    .acquire()
                    .await
                    .map_err(|e| ConnectionError::CursorError(e.to_string()))?;
            }
        }

        if self.table.fail_after == Some(self.position) {
            return Err(ConnectionError::CursorError(format!(
                "connection dropped after {} rows",
                self.position
            ))
            .into());
        }

        if self.position >= self.table.rows.len() {
            if let Some(hook) = &self.table.on_exhausted {
                hook();
            }
            return Ok(None);
        }

        let index = self.position;
        self.position += 1;
        if let Some(hook) = &self.table.on_row {
            hook(index);
        }

        Ok(Some(self.table.rows.row(index)))
    }
}

struct MemoryCanceller {
    state: Arc<MemoryState>,
}

#[async_trait]
impl QueryCanceller for MemoryCanceller {
    async fn cancel(&self, handle: &OperationHandle) -> Result<()> {
        self.state
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle.comment().to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> MemoryDataSource {
        MemoryDataSource::new().with_table(
            "Model",
            "Sales",
            MemoryTable::new(
                ["Id", "Amount"],
                vec![
                    vec![CellValue::Integer(1), CellValue::Float(9.5)],
                    vec![CellValue::Integer(2), CellValue::Null],
                ],
            ),
        )
    }

    async fn drain(cursor: &mut Box<dyn RowCursor>) -> Result<u64> {
        let mut count = 0;
        while cursor.next_row().await?.is_some() {
            count += 1;
        }
        Ok(count)
    }

    #[tokio::test]
    async fn test_query_returns_rows() {
        let source = source();
        let mut conn = source.connect("Data Source=memory").await.unwrap();
        conn.change_database("Model").await.unwrap();

        let handle = OperationHandle::new("test");
        let mut cursor = conn.execute("EVALUATE 'Sales'", &handle).await.unwrap();
        assert_eq!(cursor.columns(), ["Id", "Amount"]);
        assert_eq!(drain(&mut cursor).await.unwrap(), 2);
        assert_eq!(source.executed_queries(), vec!["EVALUATE 'Sales'"]);
        assert_eq!(source.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_database_and_table() {
        let source = source();
        let mut conn = source.connect("Data Source=memory").await.unwrap();
        assert!(conn.change_database("Other").await.is_err());

        conn.change_database("Model").await.unwrap();
        let handle = OperationHandle::new("test");
        let err = conn.execute("EVALUATE 'Missing'", &handle).await.err().unwrap();
        assert!(err.to_string().contains("Table not found"));
    }

    #[tokio::test]
    async fn test_generated_table_fails_after() {
        let table = MemoryTable::generated(["n"], 10, |i| vec![CellValue::LargeInteger(i as i64)])
            .fail_after(3);
        let source = MemoryDataSource::new().with_table("db", "Numbers", table);
        let mut conn = source.connect("Data Source=memory").await.unwrap();
        conn.change_database("db").await.unwrap();

        let handle = OperationHandle::new("test");
        let mut cursor = conn.execute("EVALUATE 'Numbers'", &handle).await.unwrap();
        assert!(drain(&mut cursor).await.is_err());
    }

    #[tokio::test]
    async fn test_canceller_records_handle() {
        let source = source();
        let conn = source.connect("Data Source=memory").await.unwrap();
        let handle = OperationHandle::new("test");
        conn.canceller().cancel(&handle).await.unwrap();
        assert_eq!(source.cancelled_queries(), vec![handle.comment().to_string()]);
    }
}
