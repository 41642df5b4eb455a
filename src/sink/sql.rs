//! SQL writer for relational exports
//!
//! The artifact is a plain SQL script: a comment header, one `CREATE TABLE`
//! statement per unit and one multi-row `INSERT` statement per batch.

use std::io::{BufWriter, Write};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::Result;
use crate::source::StoreKind;
use crate::source::sql_values::{self, Dialect};

use super::{Destination, HeaderState, Sink, format_timestamp, write_err};

/// Writer for SQL script output
pub struct SqlSink {
    /// Buffered destination
    writer: BufWriter<Destination>,
    /// Identifier quoting style
    dialect: Dialect,
    header: HeaderState,
    /// Number of records written
    written: u64,
}

impl SqlSink {
    /// Create a new SQL writer
    ///
    /// # Arguments
    /// * `destination` - Output stream
    /// * `kind` - Store kind, selects identifier quoting
    pub fn new(destination: Destination, kind: StoreKind) -> Self {
        let dialect = match kind {
            StoreKind::Mysql => Dialect::Mysql,
            _ => Dialect::Postgres,
        };

        Self {
            writer: BufWriter::with_capacity(1024 * 1024, destination),
            dialect,
            header: HeaderState::default(),
            written: 0,
        }
    }
}

impl Sink for SqlSink {
    fn write_header(&mut self, kind: StoreKind, generated_at: DateTime<Utc>) -> Result<()> {
        self.header.begin()?;
        write!(
            self.writer,
            "-- dbdump export\n-- type: {}\n-- generated: {}\n\n",
            kind,
            format_timestamp(generated_at)
        )
        .map_err(write_err)
    }

    fn write_schema(&mut self, unit: &str, schema: &str) -> Result<()> {
        self.header.require(unit)?;

        let schema = schema.trim_end();
        if schema.trim().is_empty() {
            return Ok(());
        }

        let terminator = if schema.ends_with(';') { "" } else { ";" };
        write!(
            self.writer,
            "-- Table: {unit}\n{schema}{terminator}\n\n"
        )
        .map_err(write_err)
    }

    fn write_batch(&mut self, unit: &str, records: &[String]) -> Result<usize> {
        self.header.require(unit)?;
        if records.is_empty() {
            return Ok(0);
        }

        let statement = format!(
            "INSERT INTO {} VALUES\n{};\n",
            sql_values::quote_ident(unit, self.dialect),
            records.join(",\n")
        );
        self.writer
            .write_all(statement.as_bytes())
            .map_err(write_err)?;

        self.written += records.len() as u64;
        debug!(
            "Wrote {} rows for {} (total: {})",
            records.len(),
            unit,
            self.written
        );
        Ok(records.len())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(write_err)?;
        debug!("Flushed SQL output ({} rows)", self.written);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.writer.flush().map_err(write_err)
    }
}
