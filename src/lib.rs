//! dbdump library
//!
//! This library exports a whole data store into a single artifact: every
//! table or collection is streamed through a shared encoder under bounded
//! concurrency, with optional gzip compression.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and argument parsing
//! - `config`: Configuration management
//! - `connection`: Connecting and verifying data sources
//! - `dump`: Orchestration, resource lifecycle and sessions
//! - `error`: Error types and handling
//! - `sink`: Output encodings (SQL, JSON lines)
//! - `source`: Data sources (PostgreSQL, MySQL, MongoDB)
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use dbdump::config::Config;
//! use dbdump::dump::{DumpOptions, dump_database};
//! use dbdump::source::StoreKind;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let summary = dump_database(
//!         StoreKind::Postgres,
//!         "postgres://localhost/app",
//!         Path::new("app.sql"),
//!         DumpOptions::from(&config.dump),
//!         config.dump.format,
//!         &config.connection,
//!     )
//!     .await
//!     .into_result()?;
//!
//!     println!("Exported {} records", summary.records_written);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod connection;
pub mod dump;
pub mod error;
pub mod sink;
pub mod source;

// Re-export commonly used types
pub use config::Config;
pub use dump::{DumpOptions, DumpSummary, Dumper, dump_database};
pub use error::{DumpError, Result};
pub use sink::{Sink, SinkFormat};
pub use source::{Source, StoreKind};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
///
/// # Returns
/// * `&str` - Version string
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
