// ABOUTME: Discovers the auto-updating timestamp column of each table
// ABOUTME: Builds the per-request table -> change-detection column map

use std::collections::BTreeMap;

use crate::error::Result;
use crate::store::StoreConnection;

/// Table name to its auto-updating timestamp column, ordered by table name.
pub type TimestampColumnMap = BTreeMap<String, String>;

/// Map every table of `database` that has an auto-updating timestamp
/// column to that column.
///
/// Returns an empty map when no table qualifies. If the catalog reports
/// more than one such column for a table, the first one by ordinal
/// position is used and the others are logged.
pub async fn discover_timestamp_columns<C>(conn: &mut C, database: &str) -> Result<TimestampColumnMap>
where
    C: StoreConnection,
{
    let candidates = conn.timestamp_columns(database).await?;
    let columns = group_first_per_table(database, candidates);

    tracing::debug!(
        "Found {} tables with auto-updating timestamp columns in {}",
        columns.len(),
        database
    );

    Ok(columns)
}

fn group_first_per_table(database: &str, candidates: Vec<(String, String)>) -> TimestampColumnMap {
    let mut columns = TimestampColumnMap::new();
    for (table, column) in candidates {
        match columns.get(&table) {
            Some(kept) => {
                tracing::warn!(
                    "Table {}.{} has more than one auto-updating timestamp column; using `{}` and ignoring `{}`",
                    database,
                    table,
                    kept,
                    column
                );
            }
            None => {
                columns.insert(table, column);
            }
        }
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{MemoryStore, MemoryTable};
    use crate::store::Store;

    fn pair(table: &str, column: &str) -> (String, String) {
        (table.to_string(), column.to_string())
    }

    #[test]
    fn test_group_keeps_first_column_per_table() {
        let map = group_first_per_table(
            "lumaweb",
            vec![
                pair("job_app", "updated_at"),
                pair("job_app", "touched_at"),
                pair("user", "modified"),
            ],
        );

        assert_eq!(map.len(), 2);
        assert_eq!(map["job_app"], "updated_at");
        assert_eq!(map["user"], "modified");
    }

    #[test]
    fn test_group_empty() {
        assert!(group_first_per_table("lumaweb", Vec::new()).is_empty());
    }

    #[tokio::test]
    async fn test_discover_only_reports_requested_database() {
        let store = MemoryStore::new()
            .with_table(
                "lumaweb",
                "job_app",
                MemoryTable {
                    columns: vec!["id".into(), "updated_at".into()],
                    timestamp_columns: vec!["updated_at".into()],
                    rows: Vec::new(),
                },
            )
            .with_table(
                "lumaweb",
                "country",
                MemoryTable {
                    columns: vec!["code".into()],
                    timestamp_columns: Vec::new(),
                    rows: Vec::new(),
                },
            )
            .with_table(
                "other",
                "audit",
                MemoryTable {
                    columns: vec!["id".into(), "ts".into()],
                    timestamp_columns: vec!["ts".into()],
                    rows: Vec::new(),
                },
            );

        let mut conn = store.connect().await.unwrap();
        let map = discover_timestamp_columns(&mut conn, "lumaweb").await.unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("job_app").map(String::as_str), Some("updated_at"));
        assert!(!map.contains_key("country"));
    }

    #[tokio::test]
    async fn test_discover_propagates_catalog_failure() {
        let store = MemoryStore::new().failing_catalog();
        let mut conn = store.connect().await.unwrap();
        let err = discover_timestamp_columns(&mut conn, "lumaweb")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "schema_query");
        assert!(!err.is_client_error());
    }
}
