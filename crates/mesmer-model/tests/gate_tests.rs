//! Model gate tests
//!
//! The fetcher is scripted so download lifecycles are deterministic: a
//! `Notify` holds the fetch open while assertions run against the
//! `downloading` state, and failure scripts drive the retry path.

use async_trait::async_trait;
use mesmer_foundation::error::ModelError;
use mesmer_model::gate::REQUIRED_FILES;
use mesmer_model::{ModelFetcher, ModelGate, ModelStatus};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

fn write_model_files(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    for file in REQUIRED_FILES {
        std::fs::write(dir.join(file), b"stub").unwrap();
    }
}

/// Fetcher that blocks until released, then succeeds (writing the marker
/// files) or fails, failing for the first `fail_times` calls.
struct ScriptedFetcher {
    calls: AtomicUsize,
    release: Notify,
    fail_times: usize,
}

impl ScriptedFetcher {
    fn new(fail_times: usize) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            release: Notify::new(),
            fail_times,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelFetcher for ScriptedFetcher {
    async fn fetch(&self, dest: &Path) -> Result<(), ModelError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.release.notified().await;
        if call <= self.fail_times {
            return Err(ModelError::DownloadFailed("mirror unreachable".to_string()));
        }
        write_model_files(dest);
        Ok(())
    }
}

fn model_dir() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let model_dir = dir.path().join("tts_model");
    std::fs::create_dir_all(&model_dir).unwrap();
    (dir, model_dir)
}

async fn wait_for(gate: &Arc<ModelGate>, wanted: ModelStatus) {
    for _ in 0..1000 {
        if gate.status().status == wanted {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("gate never reached {wanted:?}");
}

#[tokio::test]
async fn gate_seeds_downloaded_from_existing_files() {
    let (_tmp, dir) = model_dir();
    write_model_files(&dir);
    let gate = ModelGate::new(dir, ScriptedFetcher::new(0));
    assert_eq!(gate.status().status, ModelStatus::Downloaded);
    assert!(gate.is_ready());
}

#[tokio::test]
async fn gate_starts_not_downloaded_and_probes_out_of_band_provisioning() {
    let (_tmp, dir) = model_dir();
    let gate = ModelGate::new(dir.clone(), ScriptedFetcher::new(0));
    assert_eq!(gate.status().status, ModelStatus::NotDownloaded);
    assert!(!gate.is_ready());

    // Someone rsyncs the model into place while the process runs.
    write_model_files(&dir);
    assert_eq!(gate.status().status, ModelStatus::Downloaded);
}

#[tokio::test]
async fn concurrent_start_download_runs_one_fetch() {
    let (_tmp, dir) = model_dir();
    let fetcher = ScriptedFetcher::new(0);
    let gate = ModelGate::new(dir, Arc::clone(&fetcher) as Arc<dyn ModelFetcher>);

    let first = gate.start_download();
    let second = gate.start_download();
    assert_eq!(first.status, ModelStatus::Downloading);
    assert_eq!(second.status, ModelStatus::Downloading);

    // Let the spawned fetch reach the release point, then let it through.
    // notify_one stores a permit, so this cannot race the fetch task.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(fetcher.calls(), 1);
    fetcher.release.notify_one();

    wait_for(&gate, ModelStatus::Downloaded).await;
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn start_download_is_a_noop_once_downloaded() {
    let (_tmp, dir) = model_dir();
    write_model_files(&dir);
    let fetcher = ScriptedFetcher::new(0);
    let gate = ModelGate::new(dir, Arc::clone(&fetcher) as Arc<dyn ModelFetcher>);

    let report = gate.start_download();
    assert_eq!(report.status, ModelStatus::Downloaded);
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test]
async fn failed_download_is_retryable() {
    let (_tmp, dir) = model_dir();
    let fetcher = ScriptedFetcher::new(1);
    let gate = ModelGate::new(dir, Arc::clone(&fetcher) as Arc<dyn ModelFetcher>);

    assert_eq!(gate.start_download().status, ModelStatus::Downloading);
    fetcher.release.notify_one();
    wait_for(&gate, ModelStatus::Failed).await;

    let report = gate.status();
    assert_eq!(report.status, ModelStatus::Failed);
    assert!(report.error.unwrap().contains("mirror unreachable"));

    // Retry succeeds and clears the recorded error.
    assert_eq!(gate.start_download().status, ModelStatus::Downloading);
    fetcher.release.notify_one();
    wait_for(&gate, ModelStatus::Downloaded).await;

    let report = gate.status();
    assert_eq!(report.status, ModelStatus::Downloaded);
    assert!(report.error.is_none());
    assert_eq!(fetcher.calls(), 2);
}
