//! Ordered acquisition and teardown of run resources
//!
//! A dump holds several nested resources: the output file, an optional gzip
//! layer over it, the sink encoding into that, and the source connection.
//! [`ResourceChain`] records them in acquisition order and closes them in
//! reverse, attempting every closer even when an earlier one fails.

use std::future::Future;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use flate2::write::GzEncoder;
use tracing::{debug, warn};

use crate::error::{DumpError, Result};
use crate::sink::Sink;
use crate::source::Source;

use super::orchestrator::SharedSink;

/// A resource with an asynchronous closer
#[async_trait]
pub trait Resource: Send {
    /// Human readable name used in logs
    fn name(&self) -> &str;

    /// Release the resource
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Stack of acquired resources with a single reverse-order teardown
#[derive(Default)]
pub struct ResourceChain {
    stack: Vec<Box<dyn Resource>>,
}

impl ResourceChain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of resources held
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// Whether nothing has been acquired yet
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Record an already acquired resource
    pub fn push<R: Resource + 'static>(&mut self, resource: R) {
        debug!("Acquired {}", resource.name());
        self.stack.push(Box::new(resource));
    }

    /// Acquire a resource and record its closer
    ///
    /// When the factory fails, everything acquired so far is torn down before
    /// the acquisition error is returned. Teardown errors on that path are
    /// logged only.
    ///
    /// # Arguments
    /// * `name` - Name used in logs for this step
    /// * `factory` - Produces the handle callers use plus the closer kept by the chain
    pub async fn acquire<T, R, F, Fut>(&mut self, name: &str, factory: F) -> Result<T>
    where
        R: Resource + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(T, R)>>,
    {
        match factory().await {
            Ok((handle, resource)) => {
                self.push(resource);
                Ok(handle)
            }
            Err(e) => {
                warn!("Failed to acquire {}: {}", name, e);
                let acquired = std::mem::take(self);
                if let Err(teardown) = acquired.teardown_all().await {
                    warn!("Teardown after failed acquisition of {} failed: {}", name, teardown);
                }
                Err(e)
            }
        }
    }

    /// Close every resource in reverse acquisition order
    ///
    /// # Returns
    /// * `Result<()>` - The first close error; later ones are logged
    pub async fn teardown_all(mut self) -> Result<()> {
        let mut first_error: Option<DumpError> = None;

        while let Some(resource) = self.stack.pop() {
            let name = resource.name().to_string();
            match resource.close().await {
                Ok(()) => debug!("Closed {}", name),
                Err(e) if first_error.is_none() => first_error = Some(e),
                Err(e) => warn!("Additional error while closing {}: {}", name, e),
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Writer layer shared between the writers above it and its closer
///
/// Once the closer takes the inner writer, further writes fail with
/// `BrokenPipe`.
pub struct SharedWriter<W> {
    inner: Arc<Mutex<Option<W>>>,
}

impl<W> SharedWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(writer))),
        }
    }

    /// Take the inner writer, closing this layer for every clone
    pub fn take(&self) -> Option<W> {
        self.lock().take()
    }

    fn lock(&self) -> MutexGuard<'_, Option<W>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W> Clone for SharedWriter<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn layer_closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "output layer already closed")
}

impl<W: Write> Write for SharedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.lock().as_mut() {
            Some(writer) => writer.write(buf),
            None => Err(layer_closed()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.lock().as_mut() {
            Some(writer) => writer.flush(),
            None => Err(layer_closed()),
        }
    }
}

/// Buffered output file layer
pub type FileLayer = SharedWriter<BufWriter<std::fs::File>>;

/// Gzip layer over the output file
pub type GzipLayer = SharedWriter<GzEncoder<FileLayer>>;

/// Closer for the output file: flush, then sync to disk
pub struct FileResource {
    name: String,
    path: PathBuf,
    layer: FileLayer,
}

impl FileResource {
    /// Create the output file and its shared layer
    pub fn create(path: &Path) -> Result<(FileLayer, Self)> {
        let file = std::fs::File::create(path)?;
        let layer = SharedWriter::new(BufWriter::with_capacity(1024 * 1024, file));
        let resource = Self {
            name: format!("output file {}", path.display()),
            path: path.to_path_buf(),
            layer: layer.clone(),
        };
        Ok((layer, resource))
    }
}

#[async_trait]
impl Resource for FileResource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let Some(writer) = self.layer.take() else {
            return Ok(());
        };
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        debug!("Synced {}", self.path.display());
        Ok(())
    }
}

/// Closer for the gzip layer: writes the gzip trailer
pub struct GzipResource {
    layer: GzipLayer,
}

impl GzipResource {
    /// Wrap the file layer in a gzip encoder
    pub fn wrap(file: FileLayer, level: flate2::Compression) -> (GzipLayer, Self) {
        let layer = SharedWriter::new(GzEncoder::new(file, level));
        (layer.clone(), Self { layer })
    }
}

#[async_trait]
impl Resource for GzipResource {
    fn name(&self) -> &str {
        "gzip compressor"
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let Some(encoder) = self.layer.take() else {
            return Ok(());
        };
        let mut file = encoder.finish()?;
        file.flush()?;
        Ok(())
    }
}

/// Closer for the sink's own resources
pub struct SinkResource {
    sink: SharedSink,
}

impl SinkResource {
    pub fn new(sink: SharedSink) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Resource for SinkResource {
    fn name(&self) -> &str {
        "sink"
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let sink = self.sink;
        tokio::task::spawn_blocking(move || {
            let mut guard = sink.lock().unwrap_or_else(PoisonError::into_inner);
            guard.close()
        })
        .await
        .map_err(|e| DumpError::Generic(format!("Sink close task failed: {e}")))?
    }
}

/// Closer for the data source connection
pub struct SourceResource {
    source: Arc<dyn Source>,
}

impl SourceResource {
    pub fn new(source: Arc<dyn Source>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Resource for SourceResource {
    fn name(&self) -> &str {
        "source connection"
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.source.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    use flate2::read::GzDecoder;

    /// Resource that records its close in a shared log
    struct Recorded {
        name: String,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    fn recorded(name: &str, log: &Arc<Mutex<Vec<String>>>, fail: bool) -> Recorded {
        Recorded {
            name: name.to_string(),
            log: Arc::clone(log),
            fail,
        }
    }

    #[async_trait]
    impl Resource for Recorded {
        fn name(&self) -> &str {
            &self.name
        }

        async fn close(self: Box<Self>) -> Result<()> {
            self.log.lock().unwrap().push(self.name.clone());
            if self.fail {
                Err(DumpError::Generic(format!("{} failed", self.name)))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_empty_chain_teardown_succeeds() {
        assert!(ResourceChain::new().teardown_all().await.is_ok());
    }

    #[tokio::test]
    async fn test_teardown_runs_in_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = ResourceChain::new();
        chain.push(recorded("file", &log, false));
        chain.push(recorded("gzip", &log, false));
        chain.push(recorded("sink", &log, false));
        chain.push(recorded("source", &log, false));

        chain.teardown_all().await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["source", "sink", "gzip", "file"]);
    }

    #[tokio::test]
    async fn test_teardown_attempts_all_and_returns_first_error() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = ResourceChain::new();
        chain.push(recorded("file", &log, true));
        chain.push(recorded("sink", &log, false));
        chain.push(recorded("source", &log, true));

        let err = chain.teardown_all().await.unwrap_err();
        assert_eq!(err.to_string(), "source failed");
        assert_eq!(log.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_acquisition_unwinds_acquired() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = ResourceChain::new();

        let first = recorded("file", &log, false);
        chain
            .acquire("file", || async move { Ok(((), first)) })
            .await
            .unwrap();
        let second = recorded("sink", &log, false);
        chain
            .acquire("sink", || async move { Ok(((), second)) })
            .await
            .unwrap();

        let result: Result<()> = chain
            .acquire("source", || async {
                Err::<((), Recorded), _>(DumpError::from("connection refused"))
            })
            .await;

        assert_eq!(result.unwrap_err().to_string(), "connection refused");
        assert!(chain.is_empty());
        assert_eq!(*log.lock().unwrap(), vec!["sink", "file"]);
    }

    #[tokio::test]
    async fn test_acquisition_error_wins_over_unwind_error() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = ResourceChain::new();
        chain.push(recorded("file", &log, true));

        let result: Result<()> = chain
            .acquire("sink", || async {
                Err::<((), Recorded), _>(DumpError::from("bad format"))
            })
            .await;
        assert_eq!(result.unwrap_err().to_string(), "bad format");
    }

    #[test]
    fn test_shared_writer_closed_is_broken_pipe() {
        let layer = SharedWriter::new(Vec::<u8>::new());
        let mut writer = layer.clone();
        writer.write_all(b"abc").unwrap();

        assert_eq!(layer.take().unwrap(), b"abc");
        let err = writer.write_all(b"more").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_file_and_gzip_close_produce_valid_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.sql.gz");

        let mut chain = ResourceChain::new();
        let (file, file_resource) = FileResource::create(&path).unwrap();
        chain.push(file_resource);
        let (mut gz, gz_resource) = GzipResource::wrap(file, flate2::Compression::default());
        chain.push(gz_resource);

        gz.write_all(b"hello gzip").unwrap();
        chain.teardown_all().await.unwrap();

        let mut decoded = String::new();
        GzDecoder::new(std::fs::File::open(&path).unwrap())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "hello gzip");
    }
}
