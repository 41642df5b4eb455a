//! MongoDB source
//!
//! Every collection of every database whose name does not start with
//! `system.` is a unit named `database.collection`. Collections carry no
//! schema text; documents are streamed through a driver cursor.

use std::time::Duration;

use async_trait::async_trait;
use mongodb::Client;
use mongodb::bson::{Document, doc};
use tracing::{debug, info, warn};

use crate::error::{Result, SourceError};

use super::streaming::{BatchStream, CursorStream};
use super::{Source, StoreKind};

/// Source over a connected MongoDB client
pub struct MongoSource {
    client: Client,
    cursor_max_time: Duration,
}

impl MongoSource {
    /// Create a source over an already verified client
    ///
    /// # Arguments
    /// * `client` - Connected client
    /// * `cursor_max_time` - Server-side time limit applied to each cursor batch
    pub fn new(client: Client, cursor_max_time: Duration) -> Self {
        Self {
            client,
            cursor_max_time,
        }
    }
}

/// Split a `database.collection` unit name
///
/// Collection names may themselves contain dots, so only the first dot
/// separates the database.
pub fn split_unit(unit: &str) -> Result<(&str, &str)> {
    match unit.split_once('.') {
        Some((db, coll)) if !db.is_empty() && !coll.is_empty() => Ok((db, coll)),
        _ => Err(SourceError::InvalidUnit(unit.to_string()).into()),
    }
}

#[async_trait]
impl Source for MongoSource {
    fn kind(&self) -> StoreKind {
        StoreKind::MongoDb
    }

    async fn list_units(&self) -> Result<Vec<String>> {
        let databases = self
            .client
            .list_database_names()
            .await
            .map_err(|e| SourceError::DiscoveryFailed(e.to_string()))?;

        let mut units = Vec::new();
        for db_name in databases {
            if db_name.starts_with("system.") {
                continue;
            }

            let collections = match self.client.database(&db_name).list_collection_names().await {
                Ok(names) => names,
                Err(e) => {
                    warn!(database = %db_name, error = %e, "Skipping database, cannot list collections");
                    continue;
                }
            };

            debug!("Database {} has {} collections", db_name, collections.len());
            units.extend(collections.into_iter().map(|coll| format!("{db_name}.{coll}")));
        }

        Ok(units)
    }

    async fn fetch_schema(&self, _unit: &str) -> Result<String> {
        Ok(String::new())
    }

    async fn open_unit(&self, unit: &str, batch_size: usize) -> Result<Box<dyn BatchStream>> {
        let (db_name, coll_name) = split_unit(unit)?;
        let collection = self.client.database(db_name).collection::<Document>(coll_name);

        let cursor = collection
            .find(doc! {})
            .batch_size(batch_size.min(u32::MAX as usize) as u32)
            .max_time(self.cursor_max_time)
            .await?;

        Ok(Box::new(CursorStream::new(cursor, unit, batch_size)))
    }

    async fn close(&self) -> Result<()> {
        self.client.clone().shutdown().await;
        info!("Closed MongoDB client");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_unit() {
        assert_eq!(split_unit("shop.orders").unwrap(), ("shop", "orders"));
        assert_eq!(
            split_unit("shop.orders.archive").unwrap(),
            ("shop", "orders.archive")
        );
    }

    #[test]
    fn test_split_unit_rejects_malformed() {
        assert!(split_unit("orders").is_err());
        assert!(split_unit(".orders").is_err());
        assert!(split_unit("shop.").is_err());
    }
}
