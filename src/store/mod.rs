// ABOUTME: Store abstraction used by the export engine
// ABOUTME: Catalog lookups plus a forward-only row stream over one connection

pub mod mysql;

#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::query::BuiltQuery;

pub use mysql::MySqlStore;

/// One fetched row rendered as text, `None` for SQL NULL.
pub type TextRow = Vec<Option<String>>;

/// Lazy, single-pass sequence of rows borrowed from an open connection.
pub type RowStream<'a> = BoxStream<'a, Result<TextRow>>;

/// A source of connections. Shared by every request.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    type Connection: StoreConnection;

    async fn connect(&self) -> Result<Self::Connection>;
}

/// One open connection to the store.
///
/// Owned by a single export for its whole lifetime and released through
/// [`StoreConnection::close`].
#[async_trait]
pub trait StoreConnection: Send + 'static {
    /// `(table, column)` pairs for every auto-updating timestamp column in
    /// `database`, ordered by table name then ordinal position.
    async fn timestamp_columns(&mut self, database: &str) -> Result<Vec<(String, String)>>;

    /// Column names of `database.table` in ordinal order.
    async fn table_columns(&mut self, database: &str, table: &str) -> Result<Vec<String>>;

    /// Execute a built export statement and stream its rows.
    async fn stream_rows(&mut self, query: BuiltQuery) -> Result<RowStream<'_>>;

    /// Release the connection.
    async fn close(self);
}
