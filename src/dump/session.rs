//! Top-level dump sessions
//!
//! A session owns the resource chain of one run: it opens the output file,
//! adds gzip when requested, builds the sink, connects the source, runs the
//! [`Dumper`] and finally tears everything down in reverse order.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::ConnectionConfig;
use crate::connection;
use crate::error::Result;
use crate::sink::{self, Destination, SinkFormat};
use crate::source::{Source, StoreKind};

use super::options::DumpOptions;
use super::orchestrator::{Dumper, DumpSummary, SharedSink, share_sink};
use super::resources::{
    FileResource, GzipResource, ResourceChain, SinkResource, SourceResource,
};

/// Outcome of a session
///
/// The run result and the teardown result are kept apart so a teardown
/// failure after a successful run is not lost, and vice versa.
#[derive(Debug)]
pub struct SessionOutcome {
    /// Result of the dump run, or of acquiring its resources
    pub summary: Result<DumpSummary>,
    /// Result of closing the resource chain
    pub teardown: Result<()>,
}

impl SessionOutcome {
    /// Collapse into one result, preferring the run error
    pub fn into_result(self) -> Result<DumpSummary> {
        match (self.summary, self.teardown) {
            (Ok(summary), Ok(())) => Ok(summary),
            (Ok(_), Err(teardown)) => Err(teardown),
            (Err(run), Ok(())) => Err(run),
            (Err(run), Err(teardown)) => {
                warn!("Teardown also failed: {}", teardown);
                Err(run)
            }
        }
    }
}

/// Acquire output, compressor, sink and source in that order
async fn acquire_resources<F, Fut>(
    chain: &mut ResourceChain,
    kind: StoreKind,
    output: &Path,
    options: &DumpOptions,
    format: SinkFormat,
    open_source: F,
) -> Result<(Arc<dyn Source>, SharedSink)>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Arc<dyn Source>>>,
{
    let file = chain
        .acquire("output file", || async { FileResource::create(output) })
        .await?;

    let destination: Destination = if options.compress {
        let gzip = chain
            .acquire("gzip compressor", || async {
                Ok(GzipResource::wrap(file, flate2::Compression::default()))
            })
            .await?;
        Box::new(gzip)
    } else {
        Box::new(file)
    };

    let sink = chain
        .acquire("sink", || async {
            let sink = share_sink(sink::create_sink(format, kind, destination));
            Ok((Arc::clone(&sink), SinkResource::new(sink)))
        })
        .await?;

    let source = chain
        .acquire("source connection", || async {
            let source = open_source().await?;
            Ok((Arc::clone(&source), SourceResource::new(source)))
        })
        .await?;

    Ok((source, sink))
}

/// Run a dump against a source produced by `open_source`
///
/// # Arguments
/// * `kind` - Store kind, selects the encoding when `format` is `Auto`
/// * `output` - Artifact path
/// * `options` - Run settings
/// * `format` - Requested encoding
/// * `open_source` - Connects the source; called after the sink exists
pub async fn dump_with_source<F, Fut>(
    kind: StoreKind,
    output: &Path,
    options: DumpOptions,
    format: SinkFormat,
    open_source: F,
) -> SessionOutcome
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Arc<dyn Source>>>,
{
    let mut chain = ResourceChain::new();

    let summary =
        match acquire_resources(&mut chain, kind, output, &options, format, open_source).await {
            Ok((source, sink)) => Dumper::new(options).run(source, sink).await,
            Err(e) => Err(e),
        };

    let teardown = chain.teardown_all().await;
    if let Err(ref e) = teardown {
        warn!("Failed to release dump resources: {}", e);
    }

    SessionOutcome { summary, teardown }
}

/// Connect to a store and dump it to `output`
///
/// # Arguments
/// * `kind` - Store kind
/// * `uri` - Connection string
/// * `output` - Artifact path
/// * `options` - Run settings
/// * `format` - Requested encoding
/// * `connection` - Timeout and pool settings
pub async fn dump_database(
    kind: StoreKind,
    uri: &str,
    output: &Path,
    options: DumpOptions,
    format: SinkFormat,
    connection: &ConnectionConfig,
) -> SessionOutcome {
    info!(
        "Dumping {} database {} to {}",
        kind,
        connection::sanitize_uri(uri),
        output.display()
    );

    let config = connection::tune_for_workers(connection, kind, options.max_concurrent_units);
    dump_with_source(kind, output, options, format, || async move {
        connection::connect(kind, uri, &config).await
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::error::DumpError;
    use crate::source::{Batch, BatchStream};

    struct OneUnit;

    struct Rows(Option<Batch>);

    #[async_trait]
    impl BatchStream for Rows {
        async fn next_batch(&mut self) -> Result<Option<Batch>> {
            Ok(self.0.take())
        }
    }

    #[async_trait]
    impl Source for OneUnit {
        fn kind(&self) -> StoreKind {
            StoreKind::Postgres
        }

        async fn list_units(&self) -> Result<Vec<String>> {
            Ok(vec!["users".to_string()])
        }

        async fn fetch_schema(&self, _unit: &str) -> Result<String> {
            Ok("CREATE TABLE users (id int)".to_string())
        }

        async fn open_unit(&self, _unit: &str, _batch_size: usize) -> Result<Box<dyn BatchStream>> {
            Ok(Box::new(Rows(Some(vec!["(1)".to_string()]))))
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_into_result_prefers_run_error() {
        let outcome = SessionOutcome {
            summary: Err(DumpError::from("run failed")),
            teardown: Err(DumpError::from("close failed")),
        };
        assert_eq!(outcome.into_result().unwrap_err().to_string(), "run failed");
    }

    #[test]
    fn test_into_result_surfaces_teardown_error() {
        let outcome = SessionOutcome {
            summary: Ok(DumpSummary::default()),
            teardown: Err(DumpError::from("close failed")),
        };
        assert_eq!(outcome.into_result().unwrap_err().to_string(), "close failed");
    }

    #[tokio::test]
    async fn test_session_writes_sql_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.sql");

        let outcome = dump_with_source(
            StoreKind::Postgres,
            &path,
            DumpOptions::default(),
            SinkFormat::Auto,
            || async { Ok(Arc::new(OneUnit) as Arc<dyn Source>) },
        )
        .await;
        let summary = outcome.into_result().unwrap();

        assert_eq!(summary.records_written, 1);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("-- dbdump export\n-- type: postgres\n"));
        assert!(text.contains("CREATE TABLE users (id int);"));
        assert!(text.ends_with("INSERT INTO \"users\" VALUES\n(1);\n"));
    }

    #[tokio::test]
    async fn test_connect_failure_surfaces_and_releases_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.sql");

        let outcome = dump_with_source(
            StoreKind::Postgres,
            &path,
            DumpOptions::default(),
            SinkFormat::Sql,
            || async { Err::<Arc<dyn Source>, _>(DumpError::from("connection refused")) },
        )
        .await;

        assert!(outcome.teardown.is_ok());
        assert_eq!(
            outcome.summary.unwrap_err().to_string(),
            "connection refused"
        );
        // No header is written when the source cannot be opened
        assert!(std::fs::read_to_string(&path).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_output_directory_fails_before_connecting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("dump.sql");
        let connected = std::sync::atomic::AtomicBool::new(false);

        let outcome = dump_with_source(
            StoreKind::Postgres,
            &path,
            DumpOptions::default(),
            SinkFormat::Sql,
            || async {
                connected.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(Arc::new(OneUnit) as Arc<dyn Source>)
            },
        )
        .await;

        assert!(outcome.summary.is_err());
        assert!(!connected.load(std::sync::atomic::Ordering::SeqCst));
    }
}
