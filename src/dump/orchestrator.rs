//! Dump orchestrator
//!
//! Drives one export run: discover units, drop excluded ones, write the
//! header, then export every remaining unit in its own task with at most
//! `max_concurrent_units` tasks holding a slot. Each unit streams through a
//! producer feeding a single-slot channel, so fetching never runs more than
//! one batch ahead of writing.
//!
//! All sink calls go through one mutex and run on the blocking pool. Unit
//! failures are reported to the observer and never fail the run; only
//! discovery, the header and the final flush do.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{DumpError, Result};
use crate::sink::Sink;
use crate::source::{Batch, Source};

use super::observer::{DumpObserver, UnitStage};
use super::options::DumpOptions;

/// Sink shared by all unit tasks
pub type SharedSink = Arc<Mutex<Box<dyn Sink>>>;

/// Wrap a sink so unit tasks can share it
pub fn share_sink(sink: Box<dyn Sink>) -> SharedSink {
    Arc::new(Mutex::new(sink))
}

/// Statistics of a completed run
///
/// Failed units are not listed here; they are only reported to the observer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DumpSummary {
    /// Units returned by discovery
    pub units_discovered: usize,
    /// Units left after exclusion and handed to a task
    pub units_dispatched: usize,
    /// Records that reached the sink
    pub records_written: u64,
    /// Wall time of the run
    pub elapsed_ms: u64,
}

/// Remove excluded units, keeping the order of the rest
pub fn filter_units(units: Vec<String>, exclude: &HashSet<String>) -> Vec<String> {
    if exclude.is_empty() {
        return units;
    }
    units
        .into_iter()
        .filter(|unit| {
            let keep = !exclude.contains(unit);
            if !keep {
                debug!("Excluding {}", unit);
            }
            keep
        })
        .collect()
}

/// Run a closure against the shared sink on the blocking pool
///
/// The lock is held for this one call only. A lock poisoned by a panicking
/// call is recovered; that call's unit has already been reported as failed.
async fn with_sink<T, F>(sink: &SharedSink, op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut dyn Sink) -> Result<T> + Send + 'static,
{
    let sink = Arc::clone(sink);
    tokio::task::spawn_blocking(move || {
        let mut guard = sink.lock().unwrap_or_else(PoisonError::into_inner);
        op(&mut **guard)
    })
    .await
    .map_err(|e| DumpError::Generic(format!("Sink task failed: {e}")))?
}

/// Everything a unit task needs, cloned per task
#[derive(Clone)]
struct UnitContext {
    source: Arc<dyn Source>,
    sink: SharedSink,
    slots: Arc<Semaphore>,
    observer: Arc<dyn DumpObserver>,
    records: Arc<AtomicU64>,
    batch_size: usize,
}

type UnitFailure = (UnitStage, DumpError);

/// Orchestrates a full dump run
pub struct Dumper {
    options: DumpOptions,
}

impl Dumper {
    /// Create a dumper for the given run settings
    pub fn new(options: DumpOptions) -> Self {
        Self { options }
    }

    /// Export every non-excluded unit of `source` into `sink`
    ///
    /// # Arguments
    /// * `source` - Connected source
    /// * `sink` - Sink the header, schemas and batches are written to
    ///
    /// # Returns
    /// * `Result<DumpSummary>` - Statistics, or the first run-level failure
    pub async fn run(&self, source: Arc<dyn Source>, sink: SharedSink) -> Result<DumpSummary> {
        self.options.validate()?;
        let start_time = Instant::now();
        let kind = source.kind();

        info!("Starting {} dump", kind);
        let discovered = source.list_units().await?;
        let units_discovered = discovered.len();
        let units = filter_units(discovered, &self.options.exclude);
        info!(
            "Discovered {} units, exporting {}",
            units_discovered,
            units.len()
        );

        let generated_at = Utc::now();
        with_sink(&sink, move |s| s.write_header(kind, generated_at)).await?;

        let observer = Arc::clone(&self.options.observer);
        observer.run_started(units.len());

        let ctx = UnitContext {
            source,
            sink: Arc::clone(&sink),
            slots: Arc::new(Semaphore::new(self.options.max_concurrent_units)),
            observer: Arc::clone(&observer),
            records: Arc::new(AtomicU64::new(0)),
            batch_size: self.options.batch_size,
        };

        let units_dispatched = units.len();
        let mut tasks = JoinSet::new();
        for unit in units {
            tasks.spawn(run_unit(ctx.clone(), unit));
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!("Unit task did not complete: {}", e);
            }
        }

        with_sink(&sink, |s| s.flush()).await?;

        let summary = DumpSummary {
            units_discovered,
            units_dispatched,
            records_written: ctx.records.load(Ordering::Relaxed),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
        };
        observer.run_finished(&summary);

        info!(
            "Dump completed: {} units, {} records, {} ms",
            summary.units_dispatched, summary.records_written, summary.elapsed_ms
        );
        Ok(summary)
    }
}

/// Task body for one unit; never propagates an error
async fn run_unit(ctx: UnitContext, unit: String) {
    let _permit = match Arc::clone(&ctx.slots).acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return,
    };

    ctx.observer.unit_started(&unit);

    let outcome = AssertUnwindSafe(export_unit(&ctx, &unit)).catch_unwind().await;
    match outcome {
        Ok(Ok(records)) => ctx.observer.unit_finished(&unit, records),
        Ok(Err((stage, e))) => ctx.observer.unit_failed(&unit, stage, &e),
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            ctx.observer.unit_failed(
                &unit,
                UnitStage::Panicked,
                &DumpError::Generic(format!("Unit task panicked: {message}")),
            );
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Schema, then batches until exhaustion or the first error
async fn export_unit(ctx: &UnitContext, unit: &str) -> std::result::Result<u64, UnitFailure> {
    let schema = ctx
        .source
        .fetch_schema(unit)
        .await
        .map_err(|e| (UnitStage::Schema, e))?;

    let owned_unit = unit.to_string();
    with_sink(&ctx.sink, move |s| s.write_schema(&owned_unit, &schema))
        .await
        .map_err(|e| (UnitStage::SchemaWrite, e))?;

    let mut stream = ctx
        .source
        .open_unit(unit, ctx.batch_size)
        .await
        .map_err(|e| (UnitStage::Fetch, e))?;

    let (tx, mut rx) = mpsc::channel::<Result<Batch>>(1);
    let producer = tokio::spawn(async move {
        loop {
            match stream.next_batch().await {
                Ok(Some(batch)) => {
                    if tx.send(Ok(batch)).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    break;
                }
            }
        }
    });

    let mut written = 0u64;
    let mut failure: Option<UnitFailure> = None;
    while let Some(item) = rx.recv().await {
        let batch = match item {
            Ok(batch) => batch,
            Err(e) => {
                failure = Some((UnitStage::Fetch, e));
                break;
            }
        };

        let owned_unit = unit.to_string();
        match with_sink(&ctx.sink, move |s| s.write_batch(&owned_unit, &batch)).await {
            Ok(count) => {
                written += count as u64;
                ctx.records.fetch_add(count as u64, Ordering::Relaxed);
                ctx.observer.batch_written(unit, count);
            }
            Err(e) => {
                failure = Some((UnitStage::Write, e));
                break;
            }
        }
    }

    // Unblocks a producer waiting on send so it can stop
    drop(rx);
    let joined = producer.await;

    if let Some(failure) = failure {
        return Err(failure);
    }
    if let Err(e) = joined {
        return Err((
            UnitStage::Fetch,
            DumpError::Generic(format!("Batch producer failed: {e}")),
        ));
    }

    debug!("Exported {} records from {}", written, unit);
    Ok(written)
}
