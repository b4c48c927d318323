// ABOUTME: Library root for change-exporter
// ABOUTME: Streams rows changed since a timestamp from MySQL tables as CSV

pub mod config;
pub mod encoder;
pub mod error;
pub mod export;
pub mod projection;
pub mod query;
pub mod schema;
pub mod server;
pub mod store;
pub mod utils;

pub use error::{ExportError, Result};
pub use export::{export, list_tables, prepare_export, ExportJob, ExportRequest};
