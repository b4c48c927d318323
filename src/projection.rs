// ABOUTME: Column projection for exports
// ABOUTME: Handles include/exclude column lists against the table's declared columns

use std::collections::HashSet;

use crate::error::Result;
use crate::store::StoreConnection;

/// Caller-supplied column filters. Empty lists mean "no filter".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectionFilter {
    include: HashSet<String>,
    exclude: HashSet<String>,
}

impl ProjectionFilter {
    pub fn new<I, E>(include: I, exclude: E) -> Self
    where
        I: IntoIterator<Item = String>,
        E: IntoIterator<Item = String>,
    {
        Self {
            include: include.into_iter().collect(),
            exclude: exclude.into_iter().collect(),
        }
    }

    pub fn should_export_column(&self, column: &str) -> bool {
        // If include list exists, column must be in it
        if !self.include.is_empty() && !self.include.contains(column) {
            return false;
        }

        // If exclude list exists, column must not be in it
        if self.exclude.contains(column) {
            return false;
        }

        true
    }

    /// Filter declared columns, keeping their catalog order.
    pub fn apply(&self, columns: Vec<String>) -> Vec<String> {
        columns
            .into_iter()
            .filter(|column| self.should_export_column(column))
            .collect()
    }
}

/// Ordered list of columns to export from `database.table`.
///
/// An empty result is returned as-is; the orchestrator turns it into a
/// client error.
pub async fn resolve_projection<C>(
    conn: &mut C,
    database: &str,
    table: &str,
    filter: &ProjectionFilter,
) -> Result<Vec<String>>
where
    C: StoreConnection,
{
    let declared = conn.table_columns(database, table).await?;
    let declared_count = declared.len();
    let columns = filter.apply(declared);

    tracing::debug!(
        "Projection for {}.{}: {} of {} columns",
        database,
        table,
        columns.len(),
        declared_count
    );

    Ok(columns)
}
