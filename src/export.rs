// ABOUTME: Export orchestration for list-tables and changed-rows requests
// ABOUTME: Validates input, resolves schema and projection, streams CSV over one scoped connection

use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::{FutureExt, StreamExt};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::encoder::{encode_stream, CsvDialect, CsvEncoder};
use crate::error::{ExportError, Result};
use crate::projection::{resolve_projection, ProjectionFilter};
use crate::query::{build_query, BuiltQuery, ExportQuery};
use crate::schema::discover_timestamp_columns;
use crate::store::{Store, StoreConnection};
use crate::utils::{parse_datetime_arg, parse_list_arg};

/// Header of the list-tables CSV.
pub const TABLE_COLUMN: &str = "table";

/// Encoded CSV chunks, produced lazily.
pub type CsvStream<'a> = BoxStream<'a, Result<Bytes>>;

/// Raw parameters of an export request, exactly as the caller sent them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportRequest {
    pub database: String,
    pub table: String,
    pub since: Option<String>,
    pub include_columns: Option<String>,
    pub exclude_columns: Option<String>,
}

/// Work handed to [`spawn_export`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportJob {
    ListTables { database: String },
    Rows(ExportRequest),
}

/// Validate a request against the live catalog and build its statement.
///
/// Nothing is read from the data table here, so every client error is
/// reported before a single CSV byte exists.
pub async fn prepare_export<C>(conn: &mut C, request: &ExportRequest) -> Result<BuiltQuery>
where
    C: StoreConnection,
{
    let since = parse_datetime_arg("since", request.since.as_deref())?;
    let filter = ProjectionFilter::new(
        parse_list_arg(request.include_columns.as_deref()),
        parse_list_arg(request.exclude_columns.as_deref()),
    );

    let timestamp_columns = discover_timestamp_columns(conn, &request.database).await?;
    let timestamp_column = timestamp_columns
        .get(&request.table)
        .cloned()
        .ok_or_else(|| ExportError::NoTimestampColumn {
            database: request.database.clone(),
            table: request.table.clone(),
        })?;

    let columns = resolve_projection(conn, &request.database, &request.table, &filter).await?;
    if columns.is_empty() {
        return Err(ExportError::EmptyProjection {
            database: request.database.clone(),
            table: request.table.clone(),
        });
    }

    Ok(build_query(ExportQuery {
        database: request.database.clone(),
        table: request.table.clone(),
        columns,
        timestamp_column,
        since,
    }))
}

/// Stream the rows of `request.table` changed since `request.since` as CSV.
///
/// The returned stream borrows `conn`; the caller releases the connection
/// once the stream is finished or dropped.
pub async fn export<'c, C>(conn: &'c mut C, request: &ExportRequest) -> Result<CsvStream<'c>>
where
    C: StoreConnection,
{
    let built = prepare_export(conn, request).await?;
    let encoder = CsvEncoder::new(built.query.columns.clone(), CsvDialect::default());

    match built.params.first() {
        Some(since) => tracing::debug!("Executing: {} [since = {}]", built.sql, since),
        None => tracing::debug!("Executing: {}", built.sql),
    }

    let rows = conn.stream_rows(built).await?;
    Ok(encode_stream(rows, encoder))
}

/// CSV list of the tables of `database` that can be exported.
pub async fn list_tables<C>(conn: &mut C, database: &str) -> Result<CsvStream<'static>>
where
    C: StoreConnection,
{
    let tables = discover_timestamp_columns(conn, database).await?;
    let rows: Vec<Result<Vec<Option<String>>>> = tables
        .into_keys()
        .map(|table| Ok(vec![Some(table)]))
        .collect();

    let encoder = CsvEncoder::new(vec![TABLE_COLUMN.to_string()], CsvDialect::default());
    Ok(encode_stream(stream::iter(rows).boxed(), encoder))
}

/// Run `job` on its own task, sending CSV chunks into a bounded channel.
///
/// Exactly one connection is opened per job and it is closed on every
/// path: success, failure, or the receiver being dropped. At most one
/// error is sent, and nothing follows it.
pub fn spawn_export<S>(store: Arc<S>, job: ExportJob, capacity: usize) -> mpsc::Receiver<Result<Bytes>>
where
    S: Store,
{
    let (tx, rx) = mpsc::channel(capacity);
    tokio::spawn(async move {
        let mut conn = match AssertUnwindSafe(store.connect()).catch_unwind().await {
            Ok(Ok(conn)) => conn,
            Ok(Err(err)) => {
                let _ = tx.send(Err(err)).await;
                return;
            }
            Err(panic) => {
                report_panic(&tx, panic).await;
                return;
            }
        };

        if let Err(panic) = AssertUnwindSafe(run_job(&mut conn, &job, &tx))
            .catch_unwind()
            .await
        {
            report_panic(&tx, panic).await;
        }
        conn.close().await;
    });
    rx
}

/// Turn a panic inside an export into a terminal error for the receiver,
/// so it is never mistaken for an empty result.
async fn report_panic(tx: &mpsc::Sender<Result<Bytes>>, panic: Box<dyn Any + Send>) {
    let message = panic
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    tracing::error!("Export task panicked: {}", message);
    let _ = tx.send(Err(ExportError::TaskAborted(message))).await;
}

async fn run_job<C>(conn: &mut C, job: &ExportJob, tx: &mpsc::Sender<Result<Bytes>>)
where
    C: StoreConnection,
{
    let started = match job {
        ExportJob::ListTables { database } => list_tables(conn, database).await,
        ExportJob::Rows(request) => export(conn, request).await,
    };
    let mut chunks = match started {
        Ok(chunks) => chunks,
        Err(err) => {
            let _ = tx.send(Err(err)).await;
            return;
        }
    };

    loop {
        let next = tokio::select! {
            _ = tx.closed() => {
                tracing::debug!("Client disconnected, abandoning export");
                return;
            }
            next = chunks.next() => next,
        };
        let Some(chunk) = next else {
            return;
        };

        let failed = chunk.is_err();
        if tx.send(chunk).await.is_err() {
            tracing::debug!("Client disconnected, abandoning export");
            return;
        }
        if failed {
            return;
        }
    }
}
