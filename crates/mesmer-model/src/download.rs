//! Model archive fetching.
//!
//! The gate depends only on the `ModelFetcher` trait; the HTTP + zip
//! implementation below is the production path. Extraction goes through a
//! staging directory and is renamed into place, so a crash mid-extract never
//! leaves the model directory half-populated enough to pass the presence
//! probe.

use async_trait::async_trait;
use mesmer_foundation::error::ModelError;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use zip::ZipArchive;

#[async_trait]
pub trait ModelFetcher: Send + Sync {
    /// Provision the model files into `dest`. On `Ok` the gate re-probes the
    /// directory; the fetcher does not decide success on its own.
    async fn fetch(&self, dest: &Path) -> Result<(), ModelError>;
}

/// Downloads a zip archive over HTTP and unpacks it into the model directory.
pub struct HttpZipFetcher {
    url: String,
    client: reqwest::Client,
}

impl HttpZipFetcher {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ModelFetcher for HttpZipFetcher {
    async fn fetch(&self, dest: &Path) -> Result<(), ModelError> {
        if self.url.is_empty() {
            return Err(ModelError::DownloadFailed(
                "model.archive_url is not configured".to_string(),
            ));
        }

        let staging = tempfile::Builder::new()
            .prefix(".mesmer-model-")
            .tempdir_in(dest.parent().unwrap_or(Path::new(".")))
            .map_err(ModelError::Io)?;
        let archive_path = staging.path().join("model.zip");

        info!(url = %self.url, "Fetching model archive");
        let mut response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ModelError::DownloadFailed(e.to_string()))?;

        let mut file = tokio::fs::File::create(&archive_path)
            .await
            .map_err(ModelError::Io)?;
        let mut written: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ModelError::DownloadFailed(e.to_string()))?
        {
            file.write_all(&chunk).await.map_err(ModelError::Io)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(ModelError::Io)?;
        debug!(bytes = written, "Model archive fetched");

        let unpack_dir = staging.path().join("unpacked");
        let archive_for_blocking = archive_path.clone();
        let unpack_for_blocking = unpack_dir.clone();
        tokio::task::spawn_blocking(move || {
            extract_archive(&archive_for_blocking, &unpack_for_blocking)
        })
        .await
        .map_err(|e| ModelError::ExtractionFailed(format!("extraction task died: {e}")))??;

        move_into_place(&unpack_dir, dest)?;
        info!(dir = %dest.display(), "Model files installed");
        Ok(())
    }
}

fn extract_archive(archive_path: &Path, out_dir: &Path) -> Result<(), ModelError> {
    std::fs::create_dir_all(out_dir).map_err(ModelError::Io)?;
    let file = std::fs::File::open(archive_path).map_err(ModelError::Io)?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| ModelError::ExtractionFailed(e.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| ModelError::ExtractionFailed(e.to_string()))?;
        let outpath = out_dir.join(entry.enclosed_name().ok_or_else(|| {
            ModelError::ExtractionFailed("invalid file path in archive".to_string())
        })?);

        if entry.name().ends_with('/') {
            std::fs::create_dir_all(&outpath).map_err(ModelError::Io)?;
        } else {
            if let Some(parent) = outpath.parent() {
                std::fs::create_dir_all(parent).map_err(ModelError::Io)?;
            }
            let mut outfile = std::fs::File::create(&outpath).map_err(ModelError::Io)?;
            io::copy(&mut entry, &mut outfile).map_err(ModelError::Io)?;
        }
    }
    Ok(())
}

/// Move extracted content into the model directory, flattening a single root
/// directory if the archive has one.
fn move_into_place(unpack_dir: &Path, dest: &Path) -> Result<(), ModelError> {
    std::fs::create_dir_all(dest).map_err(ModelError::Io)?;

    let entries: Vec<PathBuf> = std::fs::read_dir(unpack_dir)
        .map_err(ModelError::Io)?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .collect();

    let source_root = match entries.as_slice() {
        [only] if only.is_dir() => only.clone(),
        _ => unpack_dir.to_path_buf(),
    };

    for entry in std::fs::read_dir(&source_root).map_err(ModelError::Io)? {
        let entry = entry.map_err(ModelError::Io)?;
        let target = dest.join(entry.file_name());
        if target.exists() {
            if target.is_dir() {
                std::fs::remove_dir_all(&target).map_err(ModelError::Io)?;
            } else {
                std::fs::remove_file(&target).map_err(ModelError::Io)?;
            }
        }
        std::fs::rename(entry.path(), &target).map_err(ModelError::Io)?;
    }
    Ok(())
}
