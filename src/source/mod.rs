//! Data sources for dump operations
//!
//! A [`Source`] enumerates the exportable units of a store (tables for
//! relational stores, `database.collection` names for document stores) and
//! streams their schema and records. Records are handed out pre-serialized so
//! the rest of the pipeline never needs to know the store's value model.
//!
//! Implementations:
//! - [`PostgresSource`]: public-schema base tables via `sqlx`
//! - [`MySqlSource`]: base tables of the current database via `sqlx`
//! - [`MongoSource`]: every collection of every non-system database

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ConnectionError, DumpError, Result};

pub mod mongo;
pub mod mysql;
pub mod postgres;
pub mod sql_values;
pub mod streaming;

pub use self::mongo::MongoSource;
pub use self::mysql::MySqlSource;
pub use self::postgres::PostgresSource;
pub use self::streaming::{BatchStream, CursorStream, RowStream};

/// Ordered, pre-serialized records of one unit
pub type Batch = Vec<String>;

/// Kind of data store being exported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Postgres,
    Mysql,
    #[serde(rename = "mongodb")]
    MongoDb,
}

impl StoreKind {
    /// Identifier written into artifact headers
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Postgres => "postgres",
            StoreKind::Mysql => "mysql",
            StoreKind::MongoDb => "mongodb",
        }
    }

    /// Whether units of this store carry SQL schema and value tuples
    pub fn is_relational(&self) -> bool {
        !matches!(self, StoreKind::MongoDb)
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreKind {
    type Err = DumpError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(StoreKind::Postgres),
            "mysql" | "mariadb" => Ok(StoreKind::Mysql),
            "mongodb" | "mongo" => Ok(StoreKind::MongoDb),
            other => Err(ConnectionError::UnsupportedKind(other.to_string()).into()),
        }
    }
}

/// Trait for reading exportable units from a data store
///
/// Implementations must be shareable across the concurrently running unit
/// tasks; every method takes `&self`.
#[async_trait]
pub trait Source: Send + Sync {
    /// Kind of store behind this source
    fn kind(&self) -> StoreKind;

    /// List unit names
    ///
    /// # Returns
    /// * `Result<Vec<String>>` - Unit names in no particular order
    async fn list_units(&self) -> Result<Vec<String>>;

    /// Fetch schema text for one unit
    ///
    /// An empty string is a valid result for schemaless stores. Sources that
    /// cannot describe the unit fail with `SourceError::SchemaUnavailable`.
    async fn fetch_schema(&self, unit: &str) -> Result<String>;

    /// Open a batch stream over all records of one unit
    ///
    /// # Arguments
    /// * `unit` - Unit name as returned by `list_units`
    /// * `batch_size` - Maximum records per batch
    async fn open_unit(&self, unit: &str, batch_size: usize) -> Result<Box<dyn BatchStream>>;

    /// Release the underlying connection
    async fn close(&self) -> Result<()>;
}
