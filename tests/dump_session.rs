//! End-to-end dump sessions over in-memory sources

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use flate2::read::GzDecoder;

use dbdump::dump::{DumpObserver, DumpOptions, UnitStage, dump_with_source};
use dbdump::error::{DumpError, Result, SourceError};
use dbdump::sink::SinkFormat;
use dbdump::source::{Batch, BatchStream, Source, StoreKind};

/// Source backed by a map of unit name to pre-serialized records
struct FixtureSource {
    kind: StoreKind,
    units: Vec<(String, Vec<String>)>,
    closed: Arc<Mutex<bool>>,
}

impl FixtureSource {
    fn new(kind: StoreKind, units: &[(&str, &[&str])]) -> Self {
        Self {
            kind,
            units: units
                .iter()
                .map(|(name, records)| {
                    (
                        name.to_string(),
                        records.iter().map(|r| r.to_string()).collect(),
                    )
                })
                .collect(),
            closed: Arc::new(Mutex::new(false)),
        }
    }
}

struct FixtureStream {
    records: Vec<String>,
    batch_size: usize,
}

#[async_trait]
impl BatchStream for FixtureStream {
    async fn next_batch(&mut self) -> Result<Option<Batch>> {
        if self.records.is_empty() {
            return Ok(None);
        }
        let take = self.batch_size.min(self.records.len());
        Ok(Some(self.records.drain(..take).collect()))
    }
}

#[async_trait]
impl Source for FixtureSource {
    fn kind(&self) -> StoreKind {
        self.kind
    }

    async fn list_units(&self) -> Result<Vec<String>> {
        Ok(self.units.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn fetch_schema(&self, unit: &str) -> Result<String> {
        if self.kind.is_relational() {
            Ok(format!("CREATE TABLE \"{unit}\" (\n  id integer NOT NULL\n)"))
        } else {
            Ok(String::new())
        }
    }

    async fn open_unit(&self, unit: &str, batch_size: usize) -> Result<Box<dyn BatchStream>> {
        let records = self
            .units
            .iter()
            .find(|(name, _)| name == unit)
            .map(|(_, records)| records.clone())
            .ok_or_else(|| SourceError::InvalidUnit(unit.to_string()))?;
        Ok(Box::new(FixtureStream {
            records,
            batch_size,
        }))
    }

    async fn close(&self) -> Result<()> {
        *self.closed.lock().unwrap() = true;
        Ok(())
    }
}

#[derive(Default)]
struct CountingObserver {
    failed: Mutex<Vec<(String, UnitStage)>>,
    finished: Mutex<HashMap<String, u64>>,
}

impl DumpObserver for CountingObserver {
    fn unit_finished(&self, unit: &str, records: u64) {
        self.finished.lock().unwrap().insert(unit.to_string(), records);
    }

    fn unit_failed(&self, unit: &str, stage: UnitStage, _error: &DumpError) {
        self.failed.lock().unwrap().push((unit.to_string(), stage));
    }
}

async fn run_fixture(
    source: FixtureSource,
    path: &Path,
    options: DumpOptions,
    format: SinkFormat,
) -> Result<dbdump::DumpSummary> {
    let kind = source.kind;
    let source: Arc<dyn Source> = Arc::new(source);
    dump_with_source(kind, path, options, format, || async move { Ok(source) })
        .await
        .into_result()
}

fn body_without_header(text: &str, header_lines: usize) -> String {
    text.lines().skip(header_lines).collect::<Vec<_>>().join("\n")
}

#[tokio::test]
async fn test_postgres_style_dump_layout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.sql");
    let source = FixtureSource::new(
        StoreKind::Postgres,
        &[("users", &["(1, 'ann')", "(2, 'bob')", "(3, NULL)"])],
    );
    let closed = Arc::clone(&source.closed);

    let options = DumpOptions {
        batch_size: 2,
        max_concurrent_units: 1,
        ..DumpOptions::default()
    };
    let summary = run_fixture(source, &path, options, SinkFormat::Auto)
        .await
        .unwrap();

    assert_eq!(summary.units_discovered, 1);
    assert_eq!(summary.records_written, 3);
    assert!(*closed.lock().unwrap());

    let text = std::fs::read_to_string(&path).unwrap();
    let body = body_without_header(&text, 3);
    assert_eq!(
        body,
        "\n-- Table: users\n\
         CREATE TABLE \"users\" (\n  id integer NOT NULL\n);\n\n\
         INSERT INTO \"users\" VALUES\n(1, 'ann'),\n(2, 'bob');\n\
         INSERT INTO \"users\" VALUES\n(3, NULL);"
    );
}

#[tokio::test]
async fn test_mongo_style_dump_is_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shop.jsonl");
    let source = FixtureSource::new(
        StoreKind::MongoDb,
        &[
            ("shop.orders", &[r#"{"_id":1,"total":9.5}"#, r#"{"_id":2}"#]),
            ("shop.customers", &[r#"{"_id":"c1"}"#]),
        ],
    );

    run_fixture(source, &path, DumpOptions::default(), SinkFormat::Auto)
        .await
        .unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<serde_json::Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(lines[0]["type"], "mongodb");
    assert!(lines[0]["generated"].as_str().unwrap().ends_with('Z'));
    assert_eq!(lines.len(), 4);
    let orders: Vec<_> = lines[1..]
        .iter()
        .filter(|line| line["table"] == "shop.orders")
        .collect();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0]["data"]["total"], 9.5);
}

#[tokio::test]
async fn test_compressed_output_matches_plain_output() {
    let dir = tempfile::tempdir().unwrap();
    let plain_path = dir.path().join("plain.sql");
    let gz_path = dir.path().join("packed.sql.gz");
    let units: &[(&str, &[&str])] = &[("items", &["(1)", "(2)", "(3)", "(4)", "(5)"])];

    let options = DumpOptions {
        batch_size: 2,
        max_concurrent_units: 1,
        ..DumpOptions::default()
    };
    run_fixture(
        FixtureSource::new(StoreKind::Mysql, units),
        &plain_path,
        options.clone(),
        SinkFormat::Sql,
    )
    .await
    .unwrap();

    let compressed = DumpOptions {
        compress: true,
        ..options
    };
    run_fixture(
        FixtureSource::new(StoreKind::Mysql, units),
        &gz_path,
        compressed,
        SinkFormat::Sql,
    )
    .await
    .unwrap();

    let plain = std::fs::read_to_string(&plain_path).unwrap();
    let mut unpacked = String::new();
    GzDecoder::new(std::fs::File::open(&gz_path).unwrap())
        .read_to_string(&mut unpacked)
        .unwrap();

    // Only the generation timestamp may differ
    assert_eq!(body_without_header(&unpacked, 3), body_without_header(&plain, 3));
    assert!(unpacked.starts_with("-- dbdump export\n-- type: mysql\n"));
    assert!(unpacked.contains("INSERT INTO `items` VALUES\n(5);\n"));
}

#[tokio::test]
async fn test_exclusion_and_unit_isolation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.sql");
    let source = FixtureSource::new(
        StoreKind::Postgres,
        &[("t1", &["(1)"]), ("t2", &["(2)"]), ("t3", &["(3)"])],
    );
    let observer = Arc::new(CountingObserver::default());

    let options = DumpOptions::default()
        .with_exclude(["t2"])
        .with_observer(observer.clone());
    let summary = run_fixture(source, &path, options, SinkFormat::Sql)
        .await
        .unwrap();

    assert_eq!(summary.units_dispatched, 2);
    let finished = observer.finished.lock().unwrap();
    assert_eq!(finished.get("t1"), Some(&1));
    assert_eq!(finished.get("t3"), Some(&1));
    assert!(!finished.contains_key("t2"));
    assert!(observer.failed.lock().unwrap().is_empty());

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(!text.contains("\"t2\""));
}

#[tokio::test]
async fn test_empty_store_produces_header_only() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.sql");

    let summary = run_fixture(
        FixtureSource::new(StoreKind::Postgres, &[]),
        &path,
        DumpOptions::default(),
        SinkFormat::Sql,
    )
    .await;
    tokio_test::assert_ok!(&summary);

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("-- dbdump export\n-- type: postgres\n-- generated: "));
    assert_eq!(text.lines().count(), 4);
}
