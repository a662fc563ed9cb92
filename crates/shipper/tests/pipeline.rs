//! End-to-end pipeline runs against an in-memory sink.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use shipper::conf::{ShipperConfig, DEFAULT_LOG_FORMAT};
use shipper::metrics::ShipperMetrics;
use shipper::parser::LogFormat;
use shipper::pipeline::{BatchProcessor, IngestEnd, LineBuffer, Pipeline, PipelineState};
use shipper::runtime::boot::Shipper;
use shipper::runtime::serve;
use shipper::sink::{FakeSink, Sink};
use shipper::source::{FileFollower, FollowConfig, LineSource, StartPosition, StaticLines};

const LINE_A: &str = r#"10.0.0.1 - - [10/Oct/2000:13:55:36 -0700] "GET /a HTTP/1.1" 200 512 "-" "curl/8.0""#;
const LINE_B: &str = r#"10.0.0.2 - alice [10/Oct/2000:13:55:37 -0700] "POST /b HTTP/1.1" 201 64 "https://example.com/" "Mozilla/5.0""#;
const LINE_C: &str = r#"10.0.0.3 - - [10/Oct/2000:13:55:38 -0700] "GET /c HTTP/1.1" 404 0 "-" "-""#;

// ── Helpers ──────────────────────────────────────────────────────

fn append(path: &Path, text: &str) {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .expect("open for append");
    file.write_all(text.as_bytes()).expect("append");
}

fn addrs(sink: &FakeSink) -> Vec<String> {
    sink.committed_records()
        .iter()
        .map(|r| r.get("remote_addr").unwrap_or_default().to_string())
        .collect()
}

fn pipeline(sink: Arc<FakeSink>, metrics: Arc<ShipperMetrics>, interval: Duration) -> Pipeline {
    let format = LogFormat::compile("main", DEFAULT_LOG_FORMAT).expect("default format compiles");
    let processor = BatchProcessor::new(
        Arc::new(LineBuffer::new()),
        Arc::new(format),
        sink as Arc<dyn Sink>,
        metrics,
    );
    Pipeline::new(processor, interval)
}

async fn wait_for(mut done: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition reached before timeout");
}

// ── Scenarios ────────────────────────────────────────────────────

#[tokio::test]
async fn test_followed_file_reaches_sink_in_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("access.log");
    append(&path, &format!("{LINE_A}\n\n"));

    let follower = FileFollower::open(
        &path,
        StartPosition::Beginning,
        FollowConfig {
            poll_interval: Duration::from_millis(10),
            reopen: true,
        },
    )
    .await
    .expect("open log");

    let sink = Arc::new(FakeSink::new());
    let metrics = Arc::new(ShipperMetrics::new());
    let pipeline = pipeline(Arc::clone(&sink), Arc::clone(&metrics), Duration::from_millis(50));
    let state = pipeline.state();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(pipeline.run(follower.into_lines(), shutdown.clone()));

    wait_for(|| metrics.committed() == 1).await;
    append(&path, &format!("{LINE_B}\n{LINE_C}\n"));
    wait_for(|| metrics.committed() == 3).await;
    assert_eq!(state.get(), PipelineState::Running);

    shutdown.cancel();
    let report = task.await.expect("pipeline joins").expect("pipeline runs");

    assert_eq!(report.ended_by, IngestEnd::Cancelled);
    assert_eq!(addrs(&sink), vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
    assert_eq!(metrics.failed(), 0);
    assert_eq!(state.get(), PipelineState::Stopped);

    let records = sink.committed_records();
    assert_eq!(records[1].get("remote_user"), Some("alice"));
    assert_eq!(records[1].get("request"), Some("POST /b HTTP/1.1"));
}

#[tokio::test]
async fn test_sink_outage_loses_only_the_failed_batch() {
    let sink = Arc::new(FakeSink::new());
    let metrics = Arc::new(ShipperMetrics::new());
    let pipeline = pipeline(Arc::clone(&sink), Arc::clone(&metrics), Duration::from_millis(20));
    let shutdown = CancellationToken::new();

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    let lines = Box::pin(tokio_stream::StreamExt::map(
        tokio_stream::wrappers::UnboundedReceiverStream::new(rx),
        Ok::<String, shipper::source::SourceError>,
    ));
    let task = tokio::spawn(pipeline.run(lines, shutdown.clone()));

    sink.fail_next(1);
    tx.send(LINE_A.to_string()).expect("send");
    wait_for(|| metrics.failed() == 1).await;

    tx.send(LINE_B.to_string()).expect("send");
    wait_for(|| metrics.committed() == 1).await;

    shutdown.cancel();
    task.await.expect("pipeline joins").expect("pipeline runs");

    assert_eq!(addrs(&sink), vec!["10.0.0.2"]);
    assert_eq!(sink.calls(), 2);
    assert_eq!(metrics.failed(), 1);
}

#[tokio::test]
async fn test_serve_runs_assembled_shipper_to_completion() {
    let mut config = ShipperConfig::default();
    config.settings.interval = 3600;
    config.metrics.enabled = false;

    let sink = Arc::new(FakeSink::new());
    let lines = StaticLines(vec![LINE_A.into(), "   ".into(), "not an access log line".into(), LINE_C.into()]);
    let shipper = Shipper::assemble(config, sink.clone(), lines.into_lines()).expect("assembles");
    let metrics = Arc::clone(&shipper.metrics);

    let report = serve::run(shipper, std::future::pending()).await.expect("runs");

    // Batch-level counting: the malformed line is counted with its batch.
    assert_eq!(report.ingest.appended, 3);
    assert_eq!(report.ingest.skipped_empty, 1);
    assert_eq!(metrics.committed(), 3);
    assert_eq!(addrs(&sink), vec!["10.0.0.1", "10.0.0.3"]);
}

#[test]
fn test_sample_config_is_consistent() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/shipper.toml");
    let config = ShipperConfig::from_file(path).expect("sample config loads");
    config.validate().expect("sample config validates");
    let format = shipper::runtime::boot::compile_format(&config).expect("columns match format");
    assert_eq!(format.variables().len(), 8);
}
