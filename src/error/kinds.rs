use std::{fmt, io};

/// Crate-wide `Result` type using [`DumpError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, DumpError>;

/// Top-level error type for dump operations.
///
/// This type wraps more specific error kinds and provides a single
/// error type that can be used throughout the crate.
#[derive(Debug)]
pub enum DumpError {
    /// Connection-related errors.
    Connection(ConnectionError),

    /// Data-source errors (discovery, schema, data).
    Source(SourceError),

    /// Output encoding errors.
    Sink(SinkError),

    /// Configuration errors.
    Config(ConfigError),

    /// I/O errors.
    Io(io::Error),

    /// SQL driver errors.
    Sql(sqlx::Error),

    /// MongoDB driver errors.
    MongoDb(mongodb::error::Error),

    /// JSON encoding errors.
    Json(serde_json::Error),

    /// Generic error with a free-form message.
    Generic(String),
}

/// Connection-specific errors.
#[derive(Debug)]
pub enum ConnectionError {
    /// Failed to establish a connection.
    ConnectionFailed(String),

    /// Connection was not established within the connect timeout.
    Timeout(u64),

    /// Invalid connection URI.
    InvalidUri(String),

    /// Ping command failed.
    PingFailed(String),

    /// Store kind is not supported.
    UnsupportedKind(String),
}

/// Source-specific errors.
#[derive(Debug)]
pub enum SourceError {
    /// Listing units failed.
    DiscoveryFailed(String),

    /// The source cannot describe this unit.
    SchemaUnavailable(String),

    /// Unit name is malformed for this source.
    InvalidUnit(String),

    /// Reading a batch failed.
    FetchFailed { unit: String, reason: String },

    /// Value of a column could not be rendered.
    UnsupportedValue { column: String, type_name: String },
}

/// Sink-specific errors.
#[derive(Debug)]
pub enum SinkError {
    /// Writing to the output failed.
    WriteFailed(String),

    /// Header was written twice, or data was written before the header.
    HeaderOrder(String),

    /// Unknown output format name.
    UnknownFormat(String),
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Missing required field.
    MissingField(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for DumpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DumpError::Connection(e) => write!(f, "Connection error: {e}"),
            DumpError::Source(e) => write!(f, "Source error: {e}"),
            DumpError::Sink(e) => write!(f, "Sink error: {e}"),
            DumpError::Config(e) => write!(f, "Configuration error: {e}"),
            DumpError::Io(e) => write!(f, "I/O error: {e}"),
            DumpError::Sql(e) => write!(f, "SQL error: {e}"),
            DumpError::MongoDb(e) => write!(f, "MongoDB error: {e}"),
            DumpError::Json(e) => write!(f, "JSON error: {e}"),
            DumpError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::ConnectionFailed(msg) => write!(f, "Failed to connect: {msg}"),
            ConnectionError::Timeout(secs) => {
                write!(f, "Connection not established within {secs}s")
            }
            ConnectionError::InvalidUri(uri) => write!(f, "Invalid connection URI: {uri}"),
            ConnectionError::PingFailed(msg) => write!(f, "Ping failed: {msg}"),
            ConnectionError::UnsupportedKind(kind) => write!(f, "Unsupported store kind: {kind}"),
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::DiscoveryFailed(msg) => write!(f, "Unit discovery failed: {msg}"),
            SourceError::SchemaUnavailable(unit) => write!(f, "Schema unavailable for '{unit}'"),
            SourceError::InvalidUnit(unit) => write!(f, "Invalid unit name: {unit}"),
            SourceError::FetchFailed { unit, reason } => {
                write!(f, "Failed to fetch batch from '{unit}': {reason}")
            }
            SourceError::UnsupportedValue { column, type_name } => {
                write!(f, "Cannot render column '{column}' of type {type_name}")
            }
        }
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::WriteFailed(msg) => write!(f, "Write failed: {msg}"),
            SinkError::HeaderOrder(msg) => write!(f, "Header out of order: {msg}"),
            SinkError::UnknownFormat(name) => write!(f, "Unknown output format: {name}"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::MissingField(field) => write!(f, "Missing required field: {field}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl std::error::Error for DumpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DumpError::Io(e) => Some(e),
            DumpError::Sql(e) => Some(e),
            DumpError::MongoDb(e) => Some(e),
            DumpError::Json(e) => Some(e),
            _ => None,
        }
    }
}
impl std::error::Error for ConnectionError {}
impl std::error::Error for SourceError {}
impl std::error::Error for SinkError {}
impl std::error::Error for ConfigError {}

/* ========================= Conversions to DumpError ========================= */

impl From<io::Error> for DumpError {
    fn from(err: io::Error) -> Self {
        DumpError::Io(err)
    }
}

impl From<sqlx::Error> for DumpError {
    fn from(err: sqlx::Error) -> Self {
        DumpError::Sql(err)
    }
}

impl From<mongodb::error::Error> for DumpError {
    fn from(err: mongodb::error::Error) -> Self {
        DumpError::MongoDb(err)
    }
}

impl From<serde_json::Error> for DumpError {
    fn from(err: serde_json::Error) -> Self {
        DumpError::Json(err)
    }
}

impl From<ConnectionError> for DumpError {
    fn from(err: ConnectionError) -> Self {
        DumpError::Connection(err)
    }
}

impl From<SourceError> for DumpError {
    fn from(err: SourceError) -> Self {
        DumpError::Source(err)
    }
}

impl From<SinkError> for DumpError {
    fn from(err: SinkError) -> Self {
        DumpError::Sink(err)
    }
}

impl From<ConfigError> for DumpError {
    fn from(err: ConfigError) -> Self {
        DumpError::Config(err)
    }
}

impl From<String> for DumpError {
    fn from(msg: String) -> Self {
        DumpError::Generic(msg)
    }
}

impl From<&str> for DumpError {
    fn from(msg: &str) -> Self {
        DumpError::Generic(msg.to_owned())
    }
}
