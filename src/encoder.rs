// ABOUTME: Streaming CSV encoder for export responses
// ABOUTME: Quotes every field and escapes quotes with a backslash, one row at a time

use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::StreamExt;

use crate::error::{ExportError, Result};
use crate::store::RowStream;

/// Separator, quoting and line-ending characters of the CSV output.
///
/// The default is the dialect downstream consumers already parse: every
/// non-NULL field wrapped in `"`, embedded quotes written as `\"` (not
/// doubled), `,` between fields and `\n` after every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvDialect {
    pub separator: char,
    pub quote: char,
    pub escape: char,
    pub newline: char,
}

impl Default for CsvDialect {
    fn default() -> Self {
        Self {
            separator: ',',
            quote: '"',
            escape: '\\',
            newline: '\n',
        }
    }
}

impl CsvDialect {
    fn push_field(&self, out: &mut String, value: Option<&str>) {
        let Some(value) = value else {
            return;
        };
        out.push(self.quote);
        for ch in value.chars() {
            if ch == self.quote {
                out.push(self.escape);
            }
            out.push(ch);
        }
        out.push(self.quote);
    }

    fn push_record<'v, I>(&self, out: &mut String, values: I)
    where
        I: IntoIterator<Item = Option<&'v str>>,
    {
        for (index, value) in values.into_iter().enumerate() {
            if index > 0 {
                out.push(self.separator);
            }
            self.push_field(out, value);
        }
        out.push(self.newline);
    }
}

/// Encodes rows of a fixed projection, writing the header in front of the
/// first row.
#[derive(Debug)]
pub struct CsvEncoder {
    dialect: CsvDialect,
    columns: Vec<String>,
    header_written: bool,
}

impl CsvEncoder {
    /// # Panics
    ///
    /// Panics if `columns` is empty; an export always projects at least
    /// one column.
    pub fn new(columns: Vec<String>, dialect: CsvDialect) -> Self {
        assert!(!columns.is_empty(), "CSV encoder needs at least one column");
        Self {
            dialect,
            columns,
            header_written: false,
        }
    }

    /// Encode one row, prefixed by the header on the first call.
    ///
    /// A row whose length differs from the projection is rejected before
    /// anything is written for it.
    pub fn encode_row(&mut self, row: &[Option<String>]) -> Result<Bytes> {
        if row.len() != self.columns.len() {
            return Err(ExportError::RowArityMismatch {
                expected: self.columns.len(),
                actual: row.len(),
            });
        }

        let mut out = String::new();
        if !self.header_written {
            self.dialect
                .push_record(&mut out, self.columns.iter().map(|c| Some(c.as_str())));
            self.header_written = true;
        }
        self.dialect
            .push_record(&mut out, row.iter().map(|value| value.as_deref()));

        Ok(Bytes::from(out))
    }
}

/// Lazily encode a row stream.
///
/// Pulls one row per output chunk and stops after the first error, so a
/// consumer that stops polling stops the underlying query as well.
pub fn encode_stream<'a>(rows: RowStream<'a>, encoder: CsvEncoder) -> BoxStream<'a, Result<Bytes>> {
    stream::unfold(Some((rows, encoder)), |state| async move {
        let (mut rows, mut encoder) = state?;
        match rows.next().await? {
            Ok(row) => match encoder.encode_row(&row) {
                Ok(chunk) => Some((Ok(chunk), Some((rows, encoder)))),
                Err(err) => Some((Err(err), None)),
            },
            Err(err) => Some((Err(err), None)),
        }
    })
    .boxed()
}
