//! JSON lines writer for document exports
//!
//! The first line is a header object, then one `{"table", "data"}` object per
//! record. Records that already are JSON are embedded as-is so key order from
//! the source survives; anything else is embedded as a JSON string.

use std::io::{BufWriter, Write};

use chrono::{DateTime, Utc};
use serde::de::IgnoredAny;
use tracing::debug;

use crate::error::{DumpError, Result};
use crate::source::StoreKind;

use super::{Destination, HeaderState, Sink, format_timestamp, write_err};

/// Writer for JSON lines output
pub struct JsonLinesSink {
    writer: BufWriter<Destination>,
    header: HeaderState,
    /// Number of records written
    written: u64,
}

impl JsonLinesSink {
    /// Create a new JSON lines writer
    pub fn new(destination: Destination) -> Self {
        Self {
            writer: BufWriter::with_capacity(1024 * 1024, destination),
            header: HeaderState::default(),
            written: 0,
        }
    }
}

/// Render a record as a JSON value, quoting it when it is not valid JSON
///
/// Valid JSON cannot hold raw line breaks inside strings, so any line break
/// in it is insignificant whitespace and is dropped to keep one record per
/// line.
fn embed_record(record: &str) -> Result<String> {
    if serde_json::from_str::<IgnoredAny>(record).is_ok() {
        let record = record.trim();
        if record.contains(&['\n', '\r'][..]) {
            return Ok(record.replace(&['\n', '\r'][..], ""));
        }
        return Ok(record.to_string());
    }
    serde_json::to_string(record).map_err(DumpError::from)
}

impl Sink for JsonLinesSink {
    fn write_header(&mut self, kind: StoreKind, generated_at: DateTime<Utc>) -> Result<()> {
        self.header.begin()?;
        writeln!(
            self.writer,
            "{{\"type\":{},\"generated\":{}}}",
            serde_json::to_string(kind.as_str())?,
            serde_json::to_string(&format_timestamp(generated_at))?
        )
        .map_err(write_err)
    }

    fn write_schema(&mut self, unit: &str, _schema: &str) -> Result<()> {
        self.header.require(unit)
    }

    fn write_batch(&mut self, unit: &str, records: &[String]) -> Result<usize> {
        self.header.require(unit)?;
        if records.is_empty() {
            return Ok(0);
        }

        let table = serde_json::to_string(unit)?;
        let mut chunk = String::new();
        for record in records {
            chunk.push_str("{\"table\":");
            chunk.push_str(&table);
            chunk.push_str(",\"data\":");
            chunk.push_str(&embed_record(record)?);
            chunk.push_str("}\n");
        }
        self.writer.write_all(chunk.as_bytes()).map_err(write_err)?;

        self.written += records.len() as u64;
        debug!(
            "Wrote {} documents for {} (total: {})",
            records.len(),
            unit,
            self.written
        );
        Ok(records.len())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(write_err)?;
        debug!("Flushed JSON lines output ({} documents)", self.written);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.writer.flush().map_err(write_err)
    }
}
