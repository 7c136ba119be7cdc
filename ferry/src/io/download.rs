//! Streaming bundle downloads into scoped temporary files.
//!
//! The temp file is deleted when the returned [`DownloadedBundle`] is dropped,
//! on success and failure paths alike. Deletion is best effort.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("download timed out: {0}")]
    Timeout(String),

    #[error("{0}")]
    Failed(String),
}

/// A bundle on local disk, removed on drop.
#[derive(Debug)]
pub struct DownloadedBundle {
    pub file: NamedTempFile,
    pub bytes: u64,
    /// Lowercase hex SHA-256 of the downloaded bytes.
    pub sha256: String,
}

impl DownloadedBundle {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    temp_dir: Option<PathBuf>,
}

impl Downloader {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ferry/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            temp_dir: None,
        })
    }

    /// Place temp files in `dir` instead of the system temp directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Stream `url` into a new process-specific temp file.
    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<DownloadedBundle, DownloadError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| classify(url, err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Failed(format!("GET {url} returned {status}")));
        }

        let mut file = self
            .temp_file()
            .map_err(|err| DownloadError::Failed(format!("create temp file: {err}")))?;
        let mut hasher = Sha256::new();
        let mut bytes = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(|err| classify(url, err))? {
            hasher.update(&chunk);
            bytes += chunk.len() as u64;
            file.write_all(&chunk)
                .map_err(|err| DownloadError::Failed(format!("write bundle: {err}")))?;
        }
        file.flush()
            .map_err(|err| DownloadError::Failed(format!("flush bundle: {err}")))?;

        debug!(bytes, path = %file.path().display(), "bundle downloaded");
        Ok(DownloadedBundle {
            file,
            bytes,
            sha256: hex::encode(hasher.finalize()),
        })
    }

    fn temp_file(&self) -> std::io::Result<NamedTempFile> {
        let prefix = format!("ferry-{}-", std::process::id());
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix).suffix(".bundle");
        match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
    }
}

fn classify(url: &str, err: reqwest::Error) -> DownloadError {
    if err.is_timeout() {
        DownloadError::Timeout(url.to_string())
    } else {
        DownloadError::Failed(format!("GET {url}: {err}"))
    }
}
