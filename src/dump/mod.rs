//! Dump orchestration
//!
//! This module ties sources and sinks together:
//! - [`Dumper`] runs one export with bounded unit concurrency
//! - [`ResourceChain`] acquires and releases the output, compressor, sink and
//!   source in a fixed order
//! - [`dump_database`] is the session entry point used by the CLI
//! - observers ([`TracingObserver`], [`ProgressTracker`]) report per-unit
//!   progress and failures

pub mod observer;
pub mod options;
pub mod orchestrator;
pub mod progress;
pub mod resources;
pub mod session;

pub use observer::{DumpObserver, TracingObserver, UnitStage};
pub use options::DumpOptions;
pub use orchestrator::{DumpSummary, Dumper, SharedSink, filter_units, share_sink};
pub use progress::ProgressTracker;
pub use resources::{Resource, ResourceChain, SharedWriter};
pub use session::{SessionOutcome, dump_database, dump_with_source};
