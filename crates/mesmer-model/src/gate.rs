//! Model gate: singleton download/presence state.
//!
//! The gate answers one question for the task runner (is the voice model
//! usable right now) and owns the only code path allowed to start a
//! download. State lives in one `RwLock`'d cell; the transition into
//! `Downloading` happens under the write lock, which is what makes concurrent
//! `start_download` calls collapse into a single fetch.

use crate::download::ModelFetcher;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Files that must exist inside the model directory for the XTTS model to be
/// considered usable.
pub const REQUIRED_FILES: [&str; 4] = [
    "model.pth",
    "config.json",
    "vocab.json",
    "speakers_xtts.pth",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    NotDownloaded,
    Downloading,
    Downloaded,
    Failed,
}

impl std::fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ModelStatus::NotDownloaded => "not_downloaded",
            ModelStatus::Downloading => "downloading",
            ModelStatus::Downloaded => "downloaded",
            ModelStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Snapshot handed to callers; `error` is set only when `status` is `Failed`.
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatusReport {
    pub status: ModelStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug)]
struct GateState {
    status: ModelStatus,
    error: Option<String>,
}

pub struct ModelGate {
    model_dir: PathBuf,
    fetcher: Arc<dyn ModelFetcher>,
    state: RwLock<GateState>,
}

impl ModelGate {
    /// Build a gate seeded from the filesystem: a model provisioned before
    /// this process started is observed as `Downloaded` without re-fetching.
    pub fn new(model_dir: PathBuf, fetcher: Arc<dyn ModelFetcher>) -> Arc<Self> {
        let status = if model_present(&model_dir) {
            info!(dir = %model_dir.display(), "Voice model found on disk");
            ModelStatus::Downloaded
        } else {
            ModelStatus::NotDownloaded
        };
        Arc::new(Self {
            model_dir,
            fetcher,
            state: RwLock::new(GateState {
                status,
                error: None,
            }),
        })
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    /// Current state. Re-probes the filesystem so a model dropped into place
    /// out-of-band flips the gate open without a restart.
    pub fn status(&self) -> ModelStatusReport {
        {
            let state = self.state.read();
            if matches!(
                state.status,
                ModelStatus::Downloaded | ModelStatus::Downloading
            ) {
                return ModelStatusReport {
                    status: state.status,
                    error: state.error.clone(),
                };
            }
        }

        if model_present(&self.model_dir) {
            let mut state = self.state.write();
            // Re-check: a download may have finished between the locks.
            if !matches!(state.status, ModelStatus::Downloading) {
                state.status = ModelStatus::Downloaded;
                state.error = None;
            }
        }

        let state = self.state.read();
        ModelStatusReport {
            status: state.status,
            error: state.error.clone(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status().status == ModelStatus::Downloaded
    }

    /// Begin the background download if the model is absent.
    ///
    /// Idempotent: while a download runs, or once the model is present,
    /// further calls are no-ops returning the current state. A `Failed` gate
    /// is retryable.
    pub fn start_download(self: &Arc<Self>) -> ModelStatusReport {
        // status() first so a model already on disk short-circuits the fetch.
        let current = self.status();
        if matches!(
            current.status,
            ModelStatus::Downloading | ModelStatus::Downloaded
        ) {
            return current;
        }

        {
            let mut state = self.state.write();
            // Another caller may have won the race between the probe above
            // and this lock; only the one that flips the status spawns.
            if matches!(
                state.status,
                ModelStatus::Downloading | ModelStatus::Downloaded
            ) {
                return ModelStatusReport {
                    status: state.status,
                    error: state.error.clone(),
                };
            }
            state.status = ModelStatus::Downloading;
            state.error = None;
        }

        info!("Starting voice model download");
        let gate = Arc::clone(self);
        tokio::spawn(async move {
            match gate.fetcher.fetch(&gate.model_dir).await {
                Ok(()) => {
                    if model_present(&gate.model_dir) {
                        info!("Voice model download finished");
                        let mut state = gate.state.write();
                        state.status = ModelStatus::Downloaded;
                        state.error = None;
                    } else {
                        warn!("Model archive fetched but required files are missing");
                        let mut state = gate.state.write();
                        state.status = ModelStatus::Failed;
                        state.error =
                            Some("archive did not contain the expected model files".to_string());
                    }
                }
                Err(e) => {
                    error!("Voice model download failed: {}", e);
                    let mut state = gate.state.write();
                    state.status = ModelStatus::Failed;
                    state.error = Some(e.to_string());
                }
            }
        });

        ModelStatusReport {
            status: ModelStatus::Downloading,
            error: None,
        }
    }
}

fn model_present(model_dir: &Path) -> bool {
    REQUIRED_FILES
        .iter()
        .all(|file| model_dir.join(file).is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_requires_all_marker_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!model_present(dir.path()));

        for file in &REQUIRED_FILES[..3] {
            std::fs::write(dir.path().join(file), b"x").unwrap();
        }
        assert!(!model_present(dir.path()));

        std::fs::write(dir.path().join(REQUIRED_FILES[3]), b"x").unwrap();
        assert!(model_present(dir.path()));
    }
}
