// ABOUTME: Error taxonomy for export requests
// ABOUTME: Separates client-correctable failures from store/server failures

use thiserror::Error;

/// Boxed error coming out of the store client.
pub type StoreError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Every way an export or list-tables request can fail.
///
/// Callers branch on [`ExportError::is_client_error`] instead of matching
/// message text.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("\"{parameter}\" argument is not in the correct format of YYYY-MM-DD HH:MM:SS")]
    InvalidTimestamp { parameter: String, value: String },

    #[error("Table \"{table}\" does not have an auto-updated timestamp column")]
    NoTimestampColumn { database: String, table: String },

    #[error("No matching columns found")]
    EmptyProjection { database: String, table: String },

    #[error("Failed to connect to the database server")]
    StoreConnect(#[source] StoreError),

    #[error("Catalog query failed for database {database}")]
    SchemaQuery {
        database: String,
        #[source]
        source: StoreError,
    },

    #[error("Data query failed for {database}.{table}")]
    DataQuery {
        database: String,
        table: String,
        #[source]
        source: StoreError,
    },

    #[error("Row has {actual} values but {expected} columns were projected")]
    RowArityMismatch { expected: usize, actual: usize },

    #[error("Export task aborted: {0}")]
    TaskAborted(String),
}

impl ExportError {
    /// True when the caller can fix the request and try again.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ExportError::InvalidTimestamp { .. }
                | ExportError::NoTimestampColumn { .. }
                | ExportError::EmptyProjection { .. }
        )
    }

    /// Stable short name used in structured error bodies and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ExportError::InvalidTimestamp { .. } => "invalid_timestamp",
            ExportError::NoTimestampColumn { .. } => "no_timestamp_column",
            ExportError::EmptyProjection { .. } => "empty_projection",
            ExportError::StoreConnect(_) => "store_connect",
            ExportError::SchemaQuery { .. } => "schema_query",
            ExportError::DataQuery { .. } => "data_query",
            ExportError::RowArityMismatch { .. } => "row_arity_mismatch",
            ExportError::TaskAborted(_) => "task_aborted",
        }
    }

    /// Message including the chain of underlying causes.
    pub fn detailed_message(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }
}

pub type Result<T, E = ExportError> = std::result::Result<T, E>;
