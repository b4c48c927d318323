// ABOUTME: Utility functions for identifier quoting and request argument parsing
// ABOUTME: Provides MySQL identifier escaping and since/list argument parsing

use chrono::{Datelike, NaiveDate, NaiveDateTime};

use crate::error::{ExportError, Result};

/// Formats accepted for the `since` argument, tried in order.
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Largest year a MySQL DATETIME can hold.
const MAX_YEAR: i32 = 9999;

/// Quote a MySQL identifier (database, table, column)
///
/// MySQL uses backticks for identifier quoting. Escapes embedded backticks
/// by doubling them.
///
/// # Examples
///
/// ```
/// use change_exporter::utils::quote_mysql_ident;
/// assert_eq!(quote_mysql_ident("users"), "`users`");
/// assert_eq!(quote_mysql_ident("user`name"), "`user``name`");
/// ```
pub fn quote_mysql_ident(identifier: &str) -> String {
    let mut quoted = String::with_capacity(identifier.len() + 2);
    quoted.push('`');
    for ch in identifier.chars() {
        if ch == '`' {
            quoted.push('`');
        }
        quoted.push(ch);
    }
    quoted.push('`');
    quoted
}

/// Parse an optional timestamp argument.
///
/// Accepts `YYYY-MM-DD HH:MM:SS` first, then `YYYY-MM-DD` (midnight).
/// An absent argument is not an error; a present but malformed one is.
///
/// # Examples
///
/// ```
/// use change_exporter::utils::parse_datetime_arg;
/// let since = parse_datetime_arg("since", Some("2014-09-01")).unwrap().unwrap();
/// assert_eq!(since.to_string(), "2014-09-01 00:00:00");
/// assert!(parse_datetime_arg("since", None).unwrap().is_none());
/// assert!(parse_datetime_arg("since", Some("09/01/2014")).is_err());
/// ```
pub fn parse_datetime_arg(parameter: &str, raw: Option<&str>) -> Result<Option<NaiveDateTime>> {
    let Some(raw) = raw else {
        return Ok(None);
    };

    let invalid = || ExportError::InvalidTimestamp {
        parameter: parameter.to_string(),
        value: raw.to_string(),
    };

    // chrono's %Y also takes signed and wider years; only YYYY is valid here.
    if !has_four_digit_year(raw) {
        return Err(invalid());
    }

    let parsed = NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT).ok().or_else(|| {
        NaiveDate::parse_from_str(raw, DATE_FORMAT)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
    });

    match parsed {
        Some(value) if (0..=MAX_YEAR).contains(&value.year()) => Ok(Some(value)),
        _ => Err(invalid()),
    }
}

fn has_four_digit_year(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.len() > 4 && bytes[..4].iter().all(u8::is_ascii_digit) && bytes[4] == b'-'
}

/// Split a comma-separated argument into its items.
///
/// Absent and empty arguments yield an empty list, and empty items
/// (`a,,b`) are dropped.
pub fn parse_list_arg(raw: Option<&str>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(',')
            .filter(|item| !item.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}
