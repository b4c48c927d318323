// ABOUTME: In-memory store used by unit tests
// ABOUTME: Evaluates built export queries over fixed tables and counts connections

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{RowStream, Store, StoreConnection, TextRow};
use crate::error::{ExportError, Result};
use crate::query::BuiltQuery;

#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    pub columns: Vec<String>,
    pub timestamp_columns: Vec<String>,
    pub rows: Vec<TextRow>,
}

/// Shared counters so tests can check connection discipline.
#[derive(Debug, Default)]
pub struct Counters {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub data_queries: AtomicUsize,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: BTreeMap<(String, String), MemoryTable>,
    pub counters: Arc<Counters>,
    pub executed: Arc<Mutex<Vec<BuiltQuery>>>,
    fail_catalog: bool,
    panic_on_rows: bool,
    /// Extra values appended to every returned row.
    pub pad_rows: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, database: &str, table: &str, fixture: MemoryTable) -> Self {
        self.tables
            .insert((database.to_string(), table.to_string()), fixture);
        self
    }

    pub fn failing_catalog(mut self) -> Self {
        self.fail_catalog = true;
        self
    }

    /// Panic inside `stream_rows`, standing in for a driver bug.
    pub fn panicking_rows(mut self) -> Self {
        self.panic_on_rows = true;
        self
    }

    pub fn opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    pub fn data_queries(&self) -> usize {
        self.counters.data_queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Connection = MemoryConnection;

    async fn connect(&self) -> Result<MemoryConnection> {
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            tables: self.tables.clone(),
            counters: self.counters.clone(),
            executed: self.executed.clone(),
            fail_catalog: self.fail_catalog,
            panic_on_rows: self.panic_on_rows,
            pad_rows: self.pad_rows,
        })
    }
}

pub struct MemoryConnection {
    tables: BTreeMap<(String, String), MemoryTable>,
    counters: Arc<Counters>,
    executed: Arc<Mutex<Vec<BuiltQuery>>>,
    fail_catalog: bool,
    panic_on_rows: bool,
    pad_rows: usize,
}

impl MemoryConnection {
    fn catalog_error(&self, database: &str) -> Result<()> {
        if self.fail_catalog {
            return Err(ExportError::SchemaQuery {
                database: database.to_string(),
                source: "access denied for user".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StoreConnection for MemoryConnection {
    async fn timestamp_columns(&mut self, database: &str) -> Result<Vec<(String, String)>> {
        self.catalog_error(database)?;
        Ok(self
            .tables
            .iter()
            .filter(|((db, _), _)| db == database)
            .flat_map(|((_, table), fixture)| {
                fixture.timestamp_columns
                    .iter()
                    .map(move |column| (table.clone(), column.clone()))
            })
            .collect())
    }

    async fn table_columns(&mut self, database: &str, table: &str) -> Result<Vec<String>> {
        self.catalog_error(database)?;
        Ok(self
            .tables
            .get(&(database.to_string(), table.to_string()))
            .map(|fixture| fixture.columns.clone())
            .unwrap_or_default())
    }

    async fn stream_rows(&mut self, query: BuiltQuery) -> Result<RowStream<'_>> {
        self.counters.data_queries.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_rows {
            panic!("row decoder blew up");
        }
        self.executed.lock().unwrap().push(query.clone());

        let fixture = self
            .tables
            .get(&(query.query.database.clone(), query.query.table.clone()))
            .ok_or_else(|| ExportError::DataQuery {
                database: query.query.database.clone(),
                table: query.query.table.clone(),
                source: "table does not exist".into(),
            })?;

        let index_of = |name: &str| fixture.columns.iter().position(|column| column == name);
        let ts_index = index_of(&query.query.timestamp_column).ok_or_else(|| {
            ExportError::DataQuery {
                database: query.query.database.clone(),
                table: query.query.table.clone(),
                source: "unknown timestamp column".into(),
            }
        })?;
        let projection: Vec<usize> = query
            .query
            .columns
            .iter()
            .filter_map(|column| index_of(column))
            .collect();

        // Timestamps are stored as `YYYY-MM-DD HH:MM:SS` text, so string
        // order is chronological order.
        let since = query.params.first().map(|since| since.to_string());
        let mut rows: Vec<&TextRow> = fixture
            .rows
            .iter()
            .filter(|row| match (&since, &row[ts_index]) {
                (Some(since), Some(ts)) => ts > since,
                (Some(_), None) => false,
                (None, _) => true,
            })
            .collect();
        rows.sort_by(|a, b| a[ts_index].cmp(&b[ts_index]));

        let pad = self.pad_rows;
        let projected: Vec<Result<TextRow>> = rows
            .into_iter()
            .map(|row| {
                let mut out: TextRow = projection.iter().map(|&i| row[i].clone()).collect();
                out.extend(std::iter::repeat(None).take(pad));
                Ok(out)
            })
            .collect();

        Ok(stream::iter(projected).boxed())
    }

    async fn close(self) {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
    }
}
