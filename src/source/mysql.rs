//! MySQL source
//!
//! Exports the base tables of the connection's current database. Schema text
//! comes from `SHOW CREATE TABLE`; rows are streamed by a single query per
//! table, with columns of types lacking a native decoding read as text.

use async_trait::async_trait;
use futures::{TryStreamExt, future};
use sqlx::mysql::MySqlRow;
use sqlx::{Column, MySqlPool, Row, TypeInfo, ValueRef};
use tracing::{debug, info};

use crate::error::{DumpError, Result, SourceError};

use super::sql_values::{self, Dialect};
use super::streaming::{BatchStream, RowStream, forward_batches};
use super::{Source, StoreKind};

const LIST_TABLES_SQL: &str = "SELECT CAST(TABLE_NAME AS CHAR) FROM information_schema.TABLES \
     WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE' \
     ORDER BY TABLE_NAME";

const COLUMN_TYPES_SQL: &str = "SELECT CAST(COLUMN_NAME AS CHAR), CAST(DATA_TYPE AS CHAR) \
     FROM information_schema.COLUMNS \
     WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
     ORDER BY ORDINAL_POSITION";

/// Source over a MySQL connection pool
pub struct MySqlSource {
    pool: MySqlPool,
    database: String,
}

impl MySqlSource {
    /// Create a source over an already verified pool
    ///
    /// # Arguments
    /// * `pool` - Connected pool
    /// * `database` - Name of the database selected by the connection
    pub fn new(pool: MySqlPool, database: impl Into<String>) -> Self {
        Self {
            pool,
            database: database.into(),
        }
    }

    fn qualified(&self, unit: &str) -> String {
        format!(
            "{}.{}",
            sql_values::quote_ident(&self.database, Dialect::Mysql),
            sql_values::quote_ident(unit, Dialect::Mysql)
        )
    }
}

#[async_trait]
impl Source for MySqlSource {
    fn kind(&self) -> StoreKind {
        StoreKind::Mysql
    }

    async fn list_units(&self) -> Result<Vec<String>> {
        let tables: Vec<String> = sqlx::query_scalar(LIST_TABLES_SQL)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SourceError::DiscoveryFailed(e.to_string()))?;

        debug!("Discovered {} tables in database {}", tables.len(), self.database);
        Ok(tables)
    }

    async fn fetch_schema(&self, unit: &str) -> Result<String> {
        let sql = format!("SHOW CREATE TABLE {}", self.qualified(unit));
        let row = sqlx::query(&sql)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| SourceError::SchemaUnavailable(unit.to_string()))?;

        // Columns are (Table, Create Table)
        Ok(row.try_get::<String, _>(1)?)
    }

    async fn open_unit(&self, unit: &str, batch_size: usize) -> Result<Box<dyn BatchStream>> {
        let columns: Vec<(String, String)> = sqlx::query_as(COLUMN_TYPES_SQL)
            .bind(unit)
            .fetch_all(&self.pool)
            .await?;

        let sql = format!(
            "SELECT {} FROM {}",
            sql_values::select_list(&columns, Dialect::Mysql),
            self.qualified(unit)
        );
        debug!("Streaming {}: {}", unit, sql);
        let pool = self.pool.clone();

        let stream = RowStream::spawn(unit, move |batches| async move {
            let records = sqlx::query(&sql)
                .fetch(&pool)
                .map_err(DumpError::from)
                .and_then(|row| future::ready(render_row(&row)));
            forward_batches(records, batch_size, batches).await;
        });
        Ok(Box::new(stream))
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        info!("Closed MySQL connection pool");
        Ok(())
    }
}

fn render_row(row: &MySqlRow) -> Result<String> {
    let values = row
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| render_value(row, idx, column.name(), column.type_info().name()))
        .collect::<Result<Vec<_>>>()?;

    Ok(sql_values::render_tuple(&values))
}

/// Render one MySQL value as a SQL literal
fn render_value(row: &MySqlRow, idx: usize, column: &str, type_name: &str) -> Result<String> {
    const D: Dialect = Dialect::Mysql;

    if row.try_get_raw(idx)?.is_null() {
        return Ok(sql_values::NULL.to_string());
    }

    let rendered = match type_name {
        "BOOLEAN" => sql_values::render_bool(row.try_get(idx)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            row.try_get::<i64, _>(idx)?.to_string()
        }
        t if t.ends_with("UNSIGNED") => row.try_get::<u64, _>(idx)?.to_string(),
        "FLOAT" => sql_values::render_float(row.try_get::<f32, _>(idx)? as f64, D),
        "DOUBLE" => sql_values::render_float(row.try_get(idx)?, D),
        "DECIMAL" => row.try_get::<sqlx::types::BigDecimal, _>(idx)?.to_string(),
        "DATE" => sql_values::quote_string(&row.try_get::<chrono::NaiveDate, _>(idx)?.to_string(), D),
        "DATETIME" => {
            sql_values::quote_string(&row.try_get::<chrono::NaiveDateTime, _>(idx)?.to_string(), D)
        }
        "TIMESTAMP" => {
            let v: chrono::DateTime<chrono::Utc> = row.try_get(idx)?;
            sql_values::quote_string(&v.naive_utc().to_string(), D)
        }
        "TIME" => sql_values::quote_string(&row.try_get::<chrono::NaiveTime, _>(idx)?.to_string(), D),
        "JSON" => {
            let v: serde_json::Value = row.try_get(idx)?;
            sql_values::quote_string(&v.to_string(), D)
        }
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT" => {
            sql_values::quote_bytes(&row.try_get::<Vec<u8>, _>(idx)?, D)
        }
        _ => match row.try_get::<String, _>(idx) {
            Ok(v) => sql_values::quote_string(&v, D),
            Err(_) => {
                return Err(SourceError::UnsupportedValue {
                    column: column.to_string(),
                    type_name: type_name.to_string(),
                }
                .into());
            }
        },
    };

    Ok(rendered)
}
