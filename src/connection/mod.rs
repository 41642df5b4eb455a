//! Connection management for data sources
//!
//! This module turns a store kind and a connection string into a
//! connectivity-verified [`Source`]:
//! - connection string checks and credential redaction for logs
//! - pool tuning for the SQL drivers and the MongoDB driver
//! - a connect timeout covering establishment and the initial ping only
//!
//! Once a source is returned, its operations run without any deadline from
//! this module.

use std::sync::Arc;

use mongodb::Client;
use mongodb::bson::doc;
use mongodb::options::ClientOptions;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::error::{ConnectionError, DumpError, Result};
use crate::source::{MongoSource, MySqlSource, PostgresSource, Source, StoreKind};

/// Connect to a store and verify it answers
///
/// # Arguments
/// * `kind` - Store kind
/// * `uri` - Connection string
/// * `config` - Timeout and pool settings
///
/// # Returns
/// * `Result<Arc<dyn Source>>` - Connected source or a `ConnectionError`
pub async fn connect(kind: StoreKind, uri: &str, config: &ConnectionConfig) -> Result<Arc<dyn Source>> {
    check_scheme(kind, uri)?;
    debug!("Connecting to {} at {}", kind, sanitize_uri(uri));

    let establish = async {
        let source: Arc<dyn Source> = match kind {
            StoreKind::Postgres => Arc::new(connect_postgres(uri, config).await?),
            StoreKind::Mysql => Arc::new(connect_mysql(uri, config).await?),
            StoreKind::MongoDb => Arc::new(connect_mongodb(uri, config).await?),
        };
        Ok::<_, DumpError>(source)
    };

    let source = tokio::time::timeout(config.connect_timeout(), establish)
        .await
        .map_err(|_| ConnectionError::Timeout(config.connect_timeout))??;

    info!("Connected to {} at {}", kind, sanitize_uri(uri));
    Ok(source)
}

/// Adjust pool settings to the number of concurrently exported units
///
/// MongoDB cursors each hold a pooled connection, so the pool is sized at
/// twice the unit concurrency. SQL pools keep their configured size.
pub fn tune_for_workers(config: &ConnectionConfig, kind: StoreKind, workers: usize) -> ConnectionConfig {
    let mut tuned = config.clone();
    if kind == StoreKind::MongoDb {
        tuned.max_pool_size = u32::try_from(workers.saturating_mul(2)).unwrap_or(u32::MAX).max(1);
        tuned.min_pool_size = tuned.min_pool_size.min(tuned.max_pool_size);
    }
    tuned
}

async fn connect_postgres(uri: &str, config: &ConnectionConfig) -> Result<PostgresSource> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_pool_size)
        .min_connections(config.min_pool_size)
        .max_lifetime(config.max_lifetime())
        .idle_timeout(config.idle_timeout())
        .acquire_timeout(config.connect_timeout())
        .connect(uri)
        .await
        .map_err(|e| driver_error(uri, e))?;

    if let Err(e) = sqlx::query("SELECT 1").execute(&pool).await {
        pool.close().await;
        return Err(ConnectionError::PingFailed(e.to_string()).into());
    }

    Ok(PostgresSource::new(pool))
}

async fn connect_mysql(uri: &str, config: &ConnectionConfig) -> Result<MySqlSource> {
    let pool = MySqlPoolOptions::new()
        .max_connections(config.max_pool_size)
        .min_connections(config.min_pool_size)
        .max_lifetime(config.max_lifetime())
        .idle_timeout(config.idle_timeout())
        .acquire_timeout(config.connect_timeout())
        .connect(uri)
        .await
        .map_err(|e| driver_error(uri, e))?;

    let database: Option<String> = match sqlx::query_scalar("SELECT DATABASE()")
        .fetch_one(&pool)
        .await
    {
        Ok(name) => name,
        Err(e) => {
            pool.close().await;
            return Err(ConnectionError::PingFailed(e.to_string()).into());
        }
    };

    match database {
        Some(name) => Ok(MySqlSource::new(pool, name)),
        None => {
            pool.close().await;
            Err(ConnectionError::InvalidUri(format!(
                "{} (no database selected)",
                sanitize_uri(uri)
            ))
            .into())
        }
    }
}

async fn connect_mongodb(uri: &str, config: &ConnectionConfig) -> Result<MongoSource> {
    let mut options = ClientOptions::parse(uri)
        .await
        .map_err(|e| ConnectionError::InvalidUri(format!("{}: {}", sanitize_uri(uri), e)))?;

    options.max_pool_size = Some(config.max_pool_size);
    options.min_pool_size = Some(config.min_pool_size);
    options.max_idle_time = Some(config.idle_timeout());
    options.connect_timeout = Some(config.connect_timeout());
    options.server_selection_timeout = Some(config.connect_timeout());

    let client = Client::with_options(options)
        .map_err(|e| ConnectionError::ConnectionFailed(e.to_string()))?;

    if let Err(e) = client.database("admin").run_command(doc! { "ping": 1 }).await {
        client.shutdown().await;
        return Err(ConnectionError::PingFailed(e.to_string()).into());
    }

    Ok(MongoSource::new(client, config.cursor_max_time()))
}

fn driver_error(uri: &str, e: sqlx::Error) -> DumpError {
    match e {
        sqlx::Error::Configuration(reason) => {
            ConnectionError::InvalidUri(format!("{}: {}", sanitize_uri(uri), reason)).into()
        }
        other => ConnectionError::ConnectionFailed(other.to_string()).into(),
    }
}

/// Connection string schemes accepted for a store kind
pub fn accepted_schemes(kind: StoreKind) -> &'static [&'static str] {
    match kind {
        StoreKind::Postgres => &["postgres", "postgresql"],
        StoreKind::Mysql => &["mysql", "mariadb"],
        StoreKind::MongoDb => &["mongodb", "mongodb+srv"],
    }
}

fn check_scheme(kind: StoreKind, uri: &str) -> Result<()> {
    let scheme = uri.split_once("://").map(|(scheme, _)| scheme.to_lowercase());
    match scheme {
        Some(scheme) if accepted_schemes(kind).contains(&scheme.as_str()) => Ok(()),
        _ => Err(ConnectionError::InvalidUri(format!(
            "{} (expected {}://...)",
            sanitize_uri(uri),
            accepted_schemes(kind)[0]
        ))
        .into()),
    }
}

/// Sanitize URI by hiding credentials
///
/// # Arguments
/// * `uri` - The URI to sanitize
///
/// # Returns
/// * `String` - URI with everything between the scheme and the host replaced by `***`
pub fn sanitize_uri(uri: &str) -> String {
    let Some(host_start) = uri.rfind('@') else {
        return uri.to_string();
    };

    match uri.find("://") {
        Some(proto_end) if proto_end < host_start => {
            format!("{}***{}", &uri[..proto_end + 3], &uri[host_start..])
        }
        _ => format!("***{}", &uri[host_start..]),
    }
}
