//! Batch streams over the records of one unit
//!
//! This module provides a unified interface for reading a unit's records in
//! bounded batches without loading the whole unit into memory. Exhaustion is
//! reported as `Ok(None)` and is not an error.

use std::future::Future;
use std::pin::pin;

use async_trait::async_trait;
use futures::stream::TryChunksError;
use futures::{Stream, StreamExt, TryStreamExt};
use mongodb::Cursor;
use mongodb::bson::{Bson, Document};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{DumpError, Result};

use super::Batch;

/// Trait for streaming a unit's records in batches
#[async_trait]
pub trait BatchStream: Send {
    /// Fetch the next batch of records
    ///
    /// # Returns
    /// * `Result<Option<Batch>>` - Next non-empty batch, or None once the unit is exhausted
    async fn next_batch(&mut self) -> Result<Option<Batch>>;
}

/// Sending half used by a [`RowStream`] reader
pub type BatchSender = mpsc::Sender<Result<Batch>>;

/// Stream over the rows of a single query
///
/// The query runs once in a reader task that forwards chunks of rendered
/// rows through a single-slot channel, so the reader never runs more than
/// one batch ahead of the caller. The reader is aborted when the stream is
/// dropped.
pub struct RowStream {
    unit: String,
    batches: mpsc::Receiver<Result<Batch>>,
    reader: JoinHandle<()>,
    total_fetched: u64,
    finished: bool,
}

impl RowStream {
    /// Start a reader task and stream its batches
    ///
    /// # Arguments
    /// * `unit` - Unit name for logging
    /// * `read` - Builds the reader future from the channel's sending half
    pub fn spawn<F, Fut>(unit: impl Into<String>, read: F) -> Self
    where
        F: FnOnce(BatchSender) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(1);
        Self {
            unit: unit.into(),
            batches: rx,
            reader: tokio::spawn(read(tx)),
            total_fetched: 0,
            finished: false,
        }
    }
}

impl Drop for RowStream {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[async_trait]
impl BatchStream for RowStream {
    async fn next_batch(&mut self) -> Result<Option<Batch>> {
        if self.finished {
            return Ok(None);
        }

        match self.batches.recv().await {
            Some(Ok(batch)) => {
                self.total_fetched += batch.len() as u64;
                debug!(
                    "Fetched batch of {} rows from {} (total: {})",
                    batch.len(),
                    self.unit,
                    self.total_fetched
                );
                Ok(Some(batch))
            }
            Some(Err(e)) => {
                self.finished = true;
                Err(e)
            }
            None => {
                self.finished = true;
                // A closed channel is only exhaustion if the reader returned normally
                if let Err(e) = (&mut self.reader).await {
                    return Err(DumpError::Generic(format!(
                        "Row reader for {} failed: {e}",
                        self.unit
                    )));
                }
                debug!(
                    "Unit {} exhausted after {} rows",
                    self.unit, self.total_fetched
                );
                Ok(None)
            }
        }
    }
}

/// Chunk a stream of rendered rows into batches and send them
///
/// Stops at the first error (which is sent on) or when the receiver is gone.
pub async fn forward_batches<S>(records: S, batch_size: usize, batches: BatchSender)
where
    S: Stream<Item = Result<String>> + Send,
{
    let mut chunks = pin!(records.try_chunks(batch_size.max(1)));
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|TryChunksError(_, e)| e);
        let failed = chunk.is_err();
        if batches.send(chunk).await.is_err() || failed {
            break;
        }
    }
}

/// Cursor-backed stream for MongoDB collections
///
/// Documents are rendered as relaxed extended JSON, one string per document.
pub struct CursorStream {
    cursor: Option<Cursor<Document>>,
    unit: String,
    batch_size: usize,
    total_fetched: u64,
}

impl CursorStream {
    /// Create a new cursor stream
    ///
    /// # Arguments
    /// * `cursor` - MongoDB cursor from a find operation
    /// * `unit` - Unit name for logging
    /// * `batch_size` - Number of documents per batch
    pub fn new(cursor: Cursor<Document>, unit: impl Into<String>, batch_size: usize) -> Self {
        Self {
            cursor: Some(cursor),
            unit: unit.into(),
            batch_size: batch_size.max(1),
            total_fetched: 0,
        }
    }
}

#[async_trait]
impl BatchStream for CursorStream {
    async fn next_batch(&mut self) -> Result<Option<Batch>> {
        let cursor = match self.cursor.as_mut() {
            Some(c) => c,
            None => return Ok(None),
        };

        let mut batch = Vec::with_capacity(self.batch_size);

        while batch.len() < self.batch_size {
            match cursor.try_next().await {
                Ok(Some(doc)) => batch.push(document_to_json(doc)?),
                Ok(None) => break,
                Err(e) => {
                    // Release the server-side cursor
                    self.cursor = None;
                    return Err(e.into());
                }
            }
        }

        if batch.is_empty() {
            debug!(
                "Collection {} exhausted after {} documents",
                self.unit, self.total_fetched
            );
            self.cursor = None;
            return Ok(None);
        }

        self.total_fetched += batch.len() as u64;
        debug!(
            "Fetched batch of {} documents from {} (total: {})",
            batch.len(),
            self.unit,
            self.total_fetched
        );

        Ok(Some(batch))
    }
}

/// Render a BSON document as relaxed extended JSON
pub fn document_to_json(doc: Document) -> Result<String> {
    let value = Bson::Document(doc).into_relaxed_extjson();
    Ok(serde_json::to_string(&value)?)
}
