// ABOUTME: Builds the parameterized SELECT used to fetch changed rows
// ABOUTME: Quotes catalog-validated identifiers and binds the since value

use chrono::NaiveDateTime;

use crate::utils::quote_mysql_ident;

/// What one export request asks the store for.
///
/// Every identifier in here has already been matched against the catalog:
/// `table` came out of the timestamp column map and `columns` out of the
/// table's declared columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportQuery {
    pub database: String,
    pub table: String,
    pub columns: Vec<String>,
    pub timestamp_column: String,
    pub since: Option<NaiveDateTime>,
}

/// Statement text plus the values bound to its `?` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltQuery {
    pub query: ExportQuery,
    pub sql: String,
    pub params: Vec<NaiveDateTime>,
}

/// Compose the export statement.
///
/// Identifiers cannot be bound as parameters, so they are backtick-quoted
/// here. The since value is never written into the statement text.
pub fn build_query(query: ExportQuery) -> BuiltQuery {
    let projection = query
        .columns
        .iter()
        .map(|column| quote_mysql_ident(column))
        .collect::<Vec<_>>()
        .join(", ");
    let timestamp_column = quote_mysql_ident(&query.timestamp_column);

    let mut sql = format!(
        "SELECT {} FROM {}.{}",
        projection,
        quote_mysql_ident(&query.database),
        quote_mysql_ident(&query.table)
    );

    let mut params = Vec::new();
    if let Some(since) = query.since {
        sql.push_str(&format!(" WHERE {} > ?", timestamp_column));
        params.push(since);
    }

    sql.push_str(&format!(" ORDER BY {}", timestamp_column));

    BuiltQuery { query, sql, params }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_app_query(since: Option<NaiveDateTime>) -> ExportQuery {
        ExportQuery {
            database: "lumaweb".to_string(),
            table: "job_app".to_string(),
            columns: vec!["id".to_string(), "name".to_string()],
            timestamp_column: "updated_at".to_string(),
            since,
        }
    }

    #[test]
    fn test_build_query_without_since_has_no_where() {
        let built = build_query(job_app_query(None));
        assert_eq!(
            built.sql,
            "SELECT `id`, `name` FROM `lumaweb`.`job_app` ORDER BY `updated_at`"
        );
        assert!(built.params.is_empty());
    }

    #[test]
    fn test_build_query_binds_since() {
        let since =
            NaiveDateTime::parse_from_str("2014-09-01 01:23:45", "%Y-%m-%d %H:%M:%S").unwrap();
        let built = build_query(job_app_query(Some(since)));

        assert_eq!(
            built.sql,
            "SELECT `id`, `name` FROM `lumaweb`.`job_app` WHERE `updated_at` > ? ORDER BY `updated_at`"
        );
        assert_eq!(built.params, vec![since]);
        assert!(!built.sql.contains("2014"));
    }

    #[test]
    fn test_build_query_quotes_hostile_identifiers() {
        let built = build_query(ExportQuery {
            database: "db`x".to_string(),
            table: "t`; DROP TABLE users; --".to_string(),
            columns: vec!["c`1".to_string()],
            timestamp_column: "ts`".to_string(),
            since: None,
        });

        assert_eq!(
            built.sql,
            "SELECT `c``1` FROM `db``x`.`t``; DROP TABLE users; --` ORDER BY `ts```"
        );
    }

    #[test]
    fn test_build_query_keeps_export_query() {
        let query = job_app_query(None);
        let built = build_query(query.clone());
        assert_eq!(built.query, query);
    }
}
