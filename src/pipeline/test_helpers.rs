//! Shared test helpers for building SectorPipeline instances in tests.

use crate::clients::{OutcomeReport, OutcomeReporter, SectorDeclarer};
use crate::config::{Config, RetryConfig};
use crate::error::{Error, Result};
use crate::pipeline::SectorPipeline;
use crate::transfer::ChunkFetcher;
use crate::transfer::test_server::RangeResponder;
use crate::types::{Event, SectorFileKind, SectorId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Miner every test pipeline runs as
pub(crate) const MINER: &str = "t01000";

/// Declarer that records calls and fails a configured number of times per sector
#[derive(Default)]
pub(crate) struct MockDeclarer {
    pub(crate) calls: Mutex<Vec<(SectorId, SectorFileKind)>>,
    failures: Mutex<HashMap<SectorId, usize>>,
}

impl MockDeclarer {
    pub(crate) fn fail_times(&self, id: SectorId, times: usize) {
        self.failures.lock().unwrap().insert(id, times);
    }

    pub(crate) fn calls(&self) -> Vec<(SectorId, SectorFileKind)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SectorDeclarer for MockDeclarer {
    async fn declare(&self, id: SectorId, kind: SectorFileKind) -> Result<()> {
        self.calls.lock().unwrap().push((id, kind));
        let mut failures = self.failures.lock().unwrap();
        if let Some(left) = failures.get_mut(&id)
            && *left > 0
        {
            *left -= 1;
            return Err(Error::Declare {
                sector_id: id,
                kind,
                reason: "declared but not found".to_string(),
            });
        }
        Ok(())
    }
}

/// Reporter that records every report and can fail the first N success reports
#[derive(Default)]
pub(crate) struct MockReporter {
    pub(crate) reports: Mutex<Vec<OutcomeReport>>,
    fail_successes: Mutex<usize>,
}

impl MockReporter {
    pub(crate) fn fail_successes(&self, times: usize) {
        *self.fail_successes.lock().unwrap() = times;
    }

    pub(crate) fn reports(&self) -> Vec<OutcomeReport> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl OutcomeReporter for MockReporter {
    async fn report(&self, report: &OutcomeReport) -> Result<()> {
        self.reports.lock().unwrap().push(report.clone());
        let mut left = self.fail_successes.lock().unwrap();
        if report.status == crate::clients::OutcomeStatus::Success && *left > 0 {
            *left -= 1;
            return Err(Error::Platform("callback endpoint returned HTTP 502".to_string()));
        }
        Ok(())
    }
}

/// A pipeline wired to a mock download server and mock collaborators
pub(crate) struct TestPipeline {
    pub(crate) pipeline: SectorPipeline,
    pub(crate) declarer: Arc<MockDeclarer>,
    pub(crate) reporter: Arc<MockReporter>,
    pub(crate) server: MockServer,
    pub(crate) temp_dir: TempDir,
}

/// Configuration with every directory inside `temp_dir` and fast retries
pub(crate) fn test_config(temp_dir: &TempDir, download_url: &str) -> Config {
    let mut config = Config::default();
    config.miner.id = MINER.to_string();
    config.miner.sealed_dir = temp_dir.path().join("sealed");
    config.miner.cache_dir = temp_dir.path().join("cache");
    config.platform.download_url = download_url.to_string();
    config.platform.token = "download-token".to_string();
    config.transfer.work_dir = temp_dir.path().join("work");
    config.transfer.max_downloader = 2;
    config.transfer.max_download_retry = 3;
    config.transfer.part_size = 512;
    config.transfer.workers_per_download = 2;
    config.transfer.part_retry = RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        backoff_multiplier: 2.0,
        jitter: false,
    };
    config
}

/// Build a pipeline against a fresh mock server (not started)
pub(crate) async fn create_test_pipeline() -> TestPipeline {
    create_test_pipeline_with(|_| {}).await
}

/// Build a pipeline, letting the caller adjust the configuration first
pub(crate) async fn create_test_pipeline_with(adjust: impl FnOnce(&mut Config)) -> TestPipeline {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();

    let mut config = test_config(&temp_dir, &server.uri());
    adjust(&mut config);

    let fetcher = ChunkFetcher::with_client(
        reqwest::Client::new(),
        config.platform.token.clone(),
        config.transfer.part_retry.clone(),
    );
    let declarer = Arc::new(MockDeclarer::default());
    let reporter = Arc::new(MockReporter::default());

    let pipeline = SectorPipeline::with_collaborators(
        config,
        fetcher,
        declarer.clone(),
        reporter.clone(),
    )
    .unwrap();

    TestPipeline {
        pipeline,
        declarer,
        reporter,
        server,
        temp_dir,
    }
}

/// Sealed file contents served for `id`
pub(crate) fn sealed_bytes(id: SectorId) -> Vec<u8> {
    (0..1500u32).map(|i| (i as u64 + id.get()) as u8).collect()
}

/// Cache tree archive served for `id`
pub(crate) fn cache_archive(id: SectorId) -> Vec<u8> {
    let root = format!("s-{}-{}", MINER, id);
    let mut builder = ::tar::Builder::new(Vec::new());
    for (name, content) in [
        ("p_aux", b"p-aux".to_vec()),
        ("t_aux", b"t-aux".to_vec()),
        ("sc-02-data-tree-r-last-0.dat", vec![7u8; 900]),
    ] {
        let mut header = ::tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{}/{}", root, name), content.as_slice())
            .unwrap();
    }
    builder.into_inner().unwrap()
}

/// Serve both payloads of `id`
pub(crate) async fn serve_sector(server: &MockServer, id: SectorId) {
    Mock::given(method("GET"))
        .and(path(format!("/sealedsectors/{}/{}", MINER, id)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(sealed_bytes(id)))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/sectortree/{}/32/{}", MINER, id)))
        .respond_with(RangeResponder::new(cache_archive(id), 0))
        .mount(server)
        .await;
}

/// Receive events until one matches `predicate`, returning every event seen
pub(crate) async fn collect_until(
    events: &mut broadcast::Receiver<Event>,
    predicate: impl Fn(&Event) -> bool,
) -> Vec<Event> {
    let mut seen = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let event = events.recv().await.unwrap();
            let done = predicate(&event);
            seen.push(event);
            if done {
                break;
            }
        }
    })
    .await
    .expect("timed out waiting for pipeline event");
    seen
}
