//! Error handling for dump operations.
//!
//! Errors are split by the layer that produces them:
//! - connection errors while establishing a data-source connection
//! - source errors while listing units or reading schema and data
//! - sink errors while encoding output
//! - configuration errors while loading or validating settings
//!
//! Driver errors (`sqlx`, `mongodb`) and I/O errors convert into [`DumpError`]
//! automatically so `?` works across layers.
//!
//! # Example
//!
//! ```rust,no_run
//! use dbdump::error::{DumpError, Result, SourceError};
//!
//! fn schema_for(unit: &str) -> Result<String> {
//!     Err(SourceError::SchemaUnavailable(unit.to_string()).into())
//! }
//! ```

pub mod kinds;

// Re-export commonly used types
pub use kinds::{ConfigError, ConnectionError, DumpError, Result, SinkError, SourceError};
