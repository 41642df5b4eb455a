//! Run observers
//!
//! Per-unit failures never reach the run result, so observers are the only
//! place they become visible. An observer has no influence on the outcome.

use std::fmt;

use tracing::{debug, error, info};

use crate::error::DumpError;

use super::orchestrator::DumpSummary;

/// Step of a unit pipeline in which a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStage {
    /// Fetching schema text from the source
    Schema,
    /// Writing schema text to the sink
    SchemaWrite,
    /// Opening the unit or fetching a batch
    Fetch,
    /// Writing a batch to the sink
    Write,
    /// The unit task panicked
    Panicked,
}

impl fmt::Display for UnitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnitStage::Schema => "schema",
            UnitStage::SchemaWrite => "schema-write",
            UnitStage::Fetch => "fetch",
            UnitStage::Write => "write",
            UnitStage::Panicked => "panic",
        };
        f.write_str(name)
    }
}

/// Receives progress and failure events during a dump run
///
/// Methods are called from concurrently running unit tasks and must not
/// block for long.
pub trait DumpObserver: Send + Sync {
    /// Units are about to be dispatched
    fn run_started(&self, _units: usize) {}

    /// A unit acquired a slot and starts exporting
    fn unit_started(&self, _unit: &str) {}

    /// A batch of a unit reached the sink
    fn batch_written(&self, _unit: &str, _records: usize) {}

    /// A unit exported all of its records
    fn unit_finished(&self, _unit: &str, _records: u64) {}

    /// A unit stopped because of an error
    fn unit_failed(&self, unit: &str, stage: UnitStage, error: &DumpError);

    /// All units completed and the sink was flushed
    fn run_finished(&self, _summary: &DumpSummary) {}
}

/// Observer that turns events into `tracing` records
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl DumpObserver for TracingObserver {
    fn unit_started(&self, unit: &str) {
        debug!(unit, "Unit export started");
    }

    fn batch_written(&self, unit: &str, records: usize) {
        debug!(unit, records, "Batch written");
    }

    fn unit_finished(&self, unit: &str, records: u64) {
        info!(unit, records, "Unit exported");
    }

    fn unit_failed(&self, unit: &str, stage: UnitStage, error: &DumpError) {
        error!(unit, stage = %stage, error = %error, "Unit export failed");
    }
}
