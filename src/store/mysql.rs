// ABOUTME: MySQL store backed by mysql_async
// ABOUTME: Reads information_schema metadata and streams export rows as text

use async_trait::async_trait;
use chrono::{Datelike, NaiveDateTime, Timelike};
use futures::StreamExt;
use mysql_async::consts::ColumnType;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Opts, OptsBuilder, Params, Row, Value};

use super::{RowStream, Store, StoreConnection, TextRow};
use crate::config::{DatabaseConfig, CATALOG_DATABASE};
use crate::error::{ExportError, Result};
use crate::query::BuiltQuery;

/// Auto-updating timestamp columns of one schema.
///
/// MySQL 8 reports `DEFAULT_GENERATED on update CURRENT_TIMESTAMP` and
/// fractional columns report `CURRENT_TIMESTAMP(6)`, hence the LIKE.
pub const TIMESTAMP_COLUMNS_SQL: &str = "SELECT table_name, column_name \
     FROM information_schema.columns \
     WHERE table_schema = ? \
       AND data_type IN ('timestamp', 'datetime') \
       AND extra LIKE '%on update CURRENT_TIMESTAMP%' \
     ORDER BY table_name, ordinal_position";

/// Declared columns of one table.
pub const TABLE_COLUMNS_SQL: &str = "SELECT column_name \
     FROM information_schema.columns \
     WHERE table_schema = ? AND table_name = ? \
     ORDER BY ordinal_position";

/// Connection factory for a MySQL server.
#[derive(Clone)]
pub struct MySqlStore {
    opts: Opts,
}

impl MySqlStore {
    pub fn new(config: &DatabaseConfig) -> Self {
        let opts = OptsBuilder::default()
            .ip_or_hostname(config.host.clone())
            .tcp_port(config.port)
            .user(Some(config.username.clone()))
            .pass(Some(config.password.clone()))
            .db_name(Some(CATALOG_DATABASE));
        Self { opts: opts.into() }
    }
}

#[async_trait]
impl Store for MySqlStore {
    type Connection = MySqlConnection;

    async fn connect(&self) -> Result<MySqlConnection> {
        let conn = Conn::new(self.opts.clone())
            .await
            .map_err(|err| ExportError::StoreConnect(Box::new(err)))?;
        Ok(MySqlConnection { conn })
    }
}

/// One open MySQL connection.
pub struct MySqlConnection {
    conn: Conn,
}

#[async_trait]
impl StoreConnection for MySqlConnection {
    async fn timestamp_columns(&mut self, database: &str) -> Result<Vec<(String, String)>> {
        self.conn
            .exec::<(String, String), _, _>(TIMESTAMP_COLUMNS_SQL, (database,))
            .await
            .map_err(|err| ExportError::SchemaQuery {
                database: database.to_string(),
                source: Box::new(err),
            })
    }

    async fn table_columns(&mut self, database: &str, table: &str) -> Result<Vec<String>> {
        self.conn
            .exec::<String, _, _>(TABLE_COLUMNS_SQL, (database, table))
            .await
            .map_err(|err| ExportError::SchemaQuery {
                database: database.to_string(),
                source: Box::new(err),
            })
    }

    async fn stream_rows(&mut self, query: BuiltQuery) -> Result<RowStream<'_>> {
        let BuiltQuery { query, sql, params } = query;
        let params = if params.is_empty() {
            Params::Empty
        } else {
            Params::Positional(params.iter().map(datetime_value).collect::<Result<_>>()?)
        };

        let database = query.database;
        let table = query.table;
        let data_query_error = move |err: mysql_async::Error| ExportError::DataQuery {
            database: database.clone(),
            table: table.clone(),
            source: Box::new(err),
        };

        let rows = self
            .conn
            .exec_stream::<Row, _, _>(sql, params)
            .await
            .map_err(data_query_error.clone())?;

        Ok(rows
            .map(move |row| row.map(row_to_text).map_err(&data_query_error))
            .boxed())
    }

    async fn close(self) {
        if let Err(err) = self.conn.disconnect().await {
            tracing::warn!("Failed to close database connection cleanly: {}", err);
        }
    }
}

/// Bind a timestamp as a MySQL DATETIME value.
fn datetime_value(value: &NaiveDateTime) -> Result<Value> {
    let year = u16::try_from(value.year())
        .ok()
        .filter(|year| *year <= 9999)
        .ok_or_else(|| ExportError::InvalidTimestamp {
            parameter: "since".to_string(),
            value: value.to_string(),
        })?;
    Ok(Value::Date(
        year,
        value.month() as u8,
        value.day() as u8,
        value.hour() as u8,
        value.minute() as u8,
        value.second() as u8,
        value.nanosecond() / 1_000,
    ))
}

fn row_to_text(row: Row) -> TextRow {
    let columns = row.columns();
    row.unwrap_raw()
        .into_iter()
        .zip(columns.iter())
        .map(|(value, column)| value_to_text(value.unwrap_or(Value::NULL), column.column_type()))
        .collect()
}

/// Render one MySQL value the way it appears in the CSV body.
pub(crate) fn value_to_text(value: Value, column_type: ColumnType) -> Option<String> {
    match value {
        Value::NULL => None,
        Value::Bytes(bytes) => Some(match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
        }),
        Value::Int(v) => Some(v.to_string()),
        Value::UInt(v) => Some(v.to_string()),
        Value::Float(v) => Some(float_text(v, v.is_finite() && v.fract() == 0.0)),
        Value::Double(v) => Some(float_text(v, v.is_finite() && v.fract() == 0.0)),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            if matches!(
                column_type,
                ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_NEWDATE
            ) {
                return Some(format!("{:04}-{:02}-{:02}", year, month, day));
            }
            let mut text = format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                year, month, day, hour, minute, second
            );
            push_micros(&mut text, micros);
            Some(text)
        }
        Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let total_hours = u64::from(days) * 24 + u64::from(hours);
            let mut text = format!(
                "{}{}:{:02}:{:02}",
                if negative { "-" } else { "" },
                total_hours,
                minutes,
                seconds
            );
            push_micros(&mut text, micros);
            Some(text)
        }
    }
}

fn float_text<T: std::fmt::Display>(value: T, integral: bool) -> String {
    if integral {
        format!("{}.0", value)
    } else {
        value.to_string()
    }
}

fn push_micros(text: &mut String, micros: u32) {
    if micros != 0 {
        text.push_str(&format!(".{:06}", micros));
    }
}
