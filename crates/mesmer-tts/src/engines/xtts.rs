//! XTTS process engine
//!
//! Drives a local XTTS inference CLI. The command is configurable so
//! deployments can point at `xtts-cli`, a wrapper script, or a pinned
//! virtualenv entry point; the contract is only that it accepts the argument
//! set below and writes a wav to `--out`.

use crate::engine::TtsEngine;
use crate::error::{TtsError, TtsResult};
use crate::next_synthesis_id;
use crate::types::{SynthesisOutput, SynthesisRequest};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, error};

pub struct XttsProcessEngine {
    command: String,
    extra_args: Vec<String>,
    model_dir: PathBuf,
}

impl XttsProcessEngine {
    pub fn new(command: impl Into<String>, extra_args: Vec<String>, model_dir: PathBuf) -> Self {
        Self {
            command: command.into(),
            extra_args,
            model_dir,
        }
    }

    fn build_args(&self, request: &SynthesisRequest, out_path: &Path) -> Vec<String> {
        let mut args = vec![
            "--model-dir".to_string(),
            self.model_dir.display().to_string(),
            "--language".to_string(),
            request.language.clone(),
            "--speaker-wav".to_string(),
            request.voice_reference.display().to_string(),
            "--out".to_string(),
            out_path.display().to_string(),
        ];
        args.extend(self.extra_args.iter().cloned());
        args.push("--text".to_string());
        args.push(request.text.clone());
        args
    }
}

#[async_trait]
impl TtsEngine for XttsProcessEngine {
    fn name(&self) -> &str {
        "xtts"
    }

    async fn is_available(&self) -> bool {
        Command::new(&self.command)
            .arg("--version")
            .output()
            .await
            .is_ok()
    }

    async fn synthesize(
        &self,
        request: &SynthesisRequest,
        out_path: &Path,
    ) -> TtsResult<SynthesisOutput> {
        if request.text.trim().is_empty() {
            return Err(TtsError::InvalidInput("empty text".to_string()));
        }
        if !request.voice_reference.is_file() {
            return Err(TtsError::VoiceReference(format!(
                "{} does not exist",
                request.voice_reference.display()
            )));
        }

        let synthesis_id = next_synthesis_id();
        let args = self.build_args(request, out_path);
        debug!(synthesis_id, command = %self.command, "Running XTTS synthesis");

        let output = Command::new(&self.command)
            .args(&args)
            .output()
            .await
            .map_err(|e| {
                TtsError::EngineNotAvailable(format!("{}: {}", self.command, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(synthesis_id, "XTTS synthesis failed: {}", stderr.trim());
            // Never leave a half-written wav where the runner could find it.
            let _ = tokio::fs::remove_file(out_path).await;
            return Err(TtsError::SynthesisFailed(stderr.trim().to_string()));
        }

        let meta = tokio::fs::metadata(out_path).await.map_err(|_| {
            TtsError::SynthesisFailed(format!(
                "engine reported success but wrote no file at {}",
                out_path.display()
            ))
        })?;
        if meta.len() == 0 {
            let _ = tokio::fs::remove_file(out_path).await;
            return Err(TtsError::SynthesisFailed(
                "engine produced an empty file".to_string(),
            ));
        }

        debug!(synthesis_id, bytes = meta.len(), "XTTS synthesis finished");
        Ok(SynthesisOutput { bytes: meta.len() })
    }
}
