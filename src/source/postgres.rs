//! PostgreSQL source
//!
//! Exports the base tables of the `public` schema. Schema text is a
//! `CREATE TABLE` statement rebuilt from `information_schema.columns`. Rows
//! are streamed by a single query per table and rendered as SQL value tuples;
//! columns of types without a native decoding are read as text.

use async_trait::async_trait;
use futures::{TryStreamExt, future};
use sqlx::postgres::PgRow;
use sqlx::{Column, PgPool, Row, TypeInfo, ValueRef};
use tracing::{debug, info};

use crate::error::{DumpError, Result, SourceError};

use super::sql_values::{self, Dialect};
use super::streaming::{BatchStream, RowStream, forward_batches};
use super::{Source, StoreKind};

const LIST_TABLES_SQL: &str = "SELECT table_name::text FROM information_schema.tables \
     WHERE table_schema = 'public' AND table_type = 'BASE TABLE' \
     ORDER BY table_name";

const CREATE_TABLE_SQL: &str = r#"
SELECT 'CREATE TABLE ' || quote_ident($1) || E' (\n  ' || string_agg(
           quote_ident(column_name::text) || ' ' || data_type::text
           || CASE WHEN is_nullable = 'NO' THEN ' NOT NULL' ELSE '' END
           || CASE WHEN column_default IS NOT NULL THEN ' DEFAULT ' || column_default::text ELSE '' END,
           E',\n  ' ORDER BY ordinal_position
       ) || E'\n)'
FROM information_schema.columns
WHERE table_schema = 'public' AND table_name = $1
"#;

const COLUMN_TYPES_SQL: &str = "SELECT column_name::text, udt_name::text \
     FROM information_schema.columns \
     WHERE table_schema = 'public' AND table_name = $1 \
     ORDER BY ordinal_position";

/// Source over a PostgreSQL connection pool
pub struct PostgresSource {
    pool: PgPool,
}

impl PostgresSource {
    /// Create a source over an already verified pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Source for PostgresSource {
    fn kind(&self) -> StoreKind {
        StoreKind::Postgres
    }

    async fn list_units(&self) -> Result<Vec<String>> {
        let tables: Vec<String> = sqlx::query_scalar(LIST_TABLES_SQL)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SourceError::DiscoveryFailed(e.to_string()))?;

        debug!("Discovered {} tables in schema public", tables.len());
        Ok(tables)
    }

    async fn fetch_schema(&self, unit: &str) -> Result<String> {
        let schema: Option<String> = sqlx::query_scalar(CREATE_TABLE_SQL)
            .bind(unit)
            .fetch_one(&self.pool)
            .await?;

        schema.ok_or_else(|| SourceError::SchemaUnavailable(unit.to_string()).into())
    }

    async fn open_unit(&self, unit: &str, batch_size: usize) -> Result<Box<dyn BatchStream>> {
        let columns: Vec<(String, String)> = sqlx::query_as(COLUMN_TYPES_SQL)
            .bind(unit)
            .fetch_all(&self.pool)
            .await?;

        let sql = format!(
            "SELECT {} FROM {}",
            sql_values::select_list(&columns, Dialect::Postgres),
            sql_values::quote_ident(unit, Dialect::Postgres)
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
        info!("Closed PostgreSQL connection pool");
        Ok(())
    }
}

fn render_row(row: &PgRow) -> Result<String> {
    let values = row
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| render_value(row, idx, column.name(), column.type_info().name()))
        .collect::<Result<Vec<_>>>()?;

    Ok(sql_values::render_tuple(&values))
}

/// Render one PostgreSQL value as a SQL literal
fn render_value(row: &PgRow, idx: usize, column: &str, type_name: &str) -> Result<String> {
    const D: Dialect = Dialect::Postgres;

    if row.try_get_raw(idx)?.is_null() {
        return Ok(sql_values::NULL.to_string());
    }

    let rendered = match type_name {
        "BOOL" => sql_values::render_bool(row.try_get(idx)?),
        "INT2" => row.try_get::<i16, _>(idx)?.to_string(),
        "INT4" => row.try_get::<i32, _>(idx)?.to_string(),
        "INT8" => row.try_get::<i64, _>(idx)?.to_string(),
        "FLOAT4" => sql_values::render_float(row.try_get::<f32, _>(idx)? as f64, D),
        "FLOAT8" => sql_values::render_float(row.try_get(idx)?, D),
        "NUMERIC" => row.try_get::<sqlx::types::BigDecimal, _>(idx)?.to_string(),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
            sql_values::quote_string(&row.try_get::<String, _>(idx)?, D)
        }
        "UUID" => sql_values::quote_string(&row.try_get::<uuid::Uuid, _>(idx)?.to_string(), D),
        "TIMESTAMP" => {
            sql_values::quote_string(&row.try_get::<chrono::NaiveDateTime, _>(idx)?.to_string(), D)
        }
        "TIMESTAMPTZ" => {
            let v: chrono::DateTime<chrono::Utc> = row.try_get(idx)?;
            sql_values::quote_string(&v.to_rfc3339(), D)
        }
        "DATE" => sql_values::quote_string(&row.try_get::<chrono::NaiveDate, _>(idx)?.to_string(), D),
        "TIME" => sql_values::quote_string(&row.try_get::<chrono::NaiveTime, _>(idx)?.to_string(), D),
        "JSON" | "JSONB" => {
            let v: serde_json::Value = row.try_get(idx)?;
            sql_values::quote_string(&v.to_string(), D)
        }
        "BYTEA" => sql_values::quote_bytes(&row.try_get::<Vec<u8>, _>(idx)?, D),
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
