//! Output encodings for dump operations
//!
//! A [`Sink`] serializes the artifact header, per-unit schema text and
//! per-unit record batches into a byte destination. The destination is handed
//! in already wrapped in any requested compression, so encodings only deal
//! with framing.
//!
//! Sinks are not required to be thread-safe: the orchestrator serializes every
//! call to a single sink instance.

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DumpError, Result, SinkError};
use crate::source::StoreKind;

pub mod jsonl;
pub mod sql;

pub use jsonl::JsonLinesSink;
pub use sql::SqlSink;

/// Byte destination a sink writes into
pub type Destination = Box<dyn Write + Send>;

/// Trait for encoding an export artifact
pub trait Sink: Send {
    /// Write the one-time artifact header
    ///
    /// Must be the first call on a sink and must happen exactly once.
    fn write_header(&mut self, kind: StoreKind, generated_at: DateTime<Utc>) -> Result<()>;

    /// Write schema text for a unit (may be a no-op)
    fn write_schema(&mut self, unit: &str, schema: &str) -> Result<()>;

    /// Write a batch of pre-serialized records for a unit
    ///
    /// # Returns
    /// * `Result<usize>` - Number of records written
    fn write_batch(&mut self, unit: &str, records: &[String]) -> Result<usize>;

    /// Flush all buffered output to the destination
    fn flush(&mut self) -> Result<()>;

    /// Release sink-owned resources
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Output encoding selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkFormat {
    /// SQL for relational stores, JSON lines for document stores
    #[default]
    Auto,
    /// SQL statements
    Sql,
    /// One JSON object per line
    #[serde(rename = "jsonl")]
    JsonLines,
}

impl SinkFormat {
    /// Resolve `Auto` against the store kind
    pub fn resolve(self, kind: StoreKind) -> SinkFormat {
        match self {
            SinkFormat::Auto if kind.is_relational() => SinkFormat::Sql,
            SinkFormat::Auto => SinkFormat::JsonLines,
            other => other,
        }
    }
}

impl fmt::Display for SinkFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SinkFormat::Auto => "auto",
            SinkFormat::Sql => "sql",
            SinkFormat::JsonLines => "jsonl",
        };
        f.write_str(name)
    }
}

impl FromStr for SinkFormat {
    type Err = DumpError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(SinkFormat::Auto),
            "sql" => Ok(SinkFormat::Sql),
            "jsonl" | "json" | "jsonlines" => Ok(SinkFormat::JsonLines),
            other => Err(SinkError::UnknownFormat(other.to_string()).into()),
        }
    }
}

/// Build a sink for a store kind over a destination
///
/// # Arguments
/// * `format` - Requested encoding (`Auto` picks by store kind)
/// * `kind` - Kind of store being exported
/// * `destination` - Output stream, already compressed if requested
pub fn create_sink(format: SinkFormat, kind: StoreKind, destination: Destination) -> Box<dyn Sink> {
    match format.resolve(kind) {
        SinkFormat::JsonLines => Box::new(JsonLinesSink::new(destination)),
        _ => Box::new(SqlSink::new(destination, kind)),
    }
}

/// Header timestamp format shared by all encodings
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Guards the header-first contract shared by the encodings
#[derive(Debug, Default)]
pub(crate) struct HeaderState {
    written: bool,
}

impl HeaderState {
    pub(crate) fn begin(&mut self) -> Result<()> {
        if self.written {
            return Err(SinkError::HeaderOrder("header already written".to_string()).into());
        }
        self.written = true;
        Ok(())
    }

    pub(crate) fn require(&self, unit: &str) -> Result<()> {
        if !self.written {
            return Err(SinkError::HeaderOrder(format!("write for '{unit}' before header")).into());
        }
        Ok(())
    }
}

pub(crate) fn write_err(e: std::io::Error) -> DumpError {
    SinkError::WriteFailed(e.to_string()).into()
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    /// Destination that keeps everything in memory
    #[derive(Clone, Default)]
    pub(crate) struct Memory(Arc<Mutex<Vec<u8>>>);

    impl Write for Memory {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Memory {
        pub(crate) fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_format_resolution() {
        assert_eq!(SinkFormat::Auto.resolve(StoreKind::Postgres), SinkFormat::Sql);
        assert_eq!(SinkFormat::Auto.resolve(StoreKind::MongoDb), SinkFormat::JsonLines);
        assert_eq!(SinkFormat::Sql.resolve(StoreKind::MongoDb), SinkFormat::Sql);
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("JSONL".parse::<SinkFormat>().unwrap(), SinkFormat::JsonLines);
        assert_eq!("sql".parse::<SinkFormat>().unwrap(), SinkFormat::Sql);
        assert!("xlsx".parse::<SinkFormat>().is_err());
    }

    #[test]
    fn test_format_timestamp_is_utc_seconds() {
        let ts = DateTime::parse_from_rfc3339("2026-03-01T10:20:30.456+02:00")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_timestamp(ts), "2026-03-01T08:20:30Z");
    }

    #[test]
    fn test_header_state() {
        let mut state = HeaderState::default();
        assert!(state.require("t").is_err());
        state.begin().unwrap();
        assert!(state.require("t").is_ok());
        assert!(state.begin().is_err());
    }
}
