//! Bundle transport: remote bundle → verified quarantine branch.
//!
//! On success exactly one new local branch exists and the working tree is
//! untouched. The downloaded bundle only ever lives in a scoped temp file.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::changeset::ChangesetId;
use crate::error::{FerryError, Result};
use crate::io::api::{BundleLocation, ChangesetApi};
use crate::io::config::BundleConfig;
use crate::io::download::{DownloadError, Downloader};
use crate::io::git::GitAdapter;

/// How patiently to wait for the remote to finish packaging a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportPolicy {
    pub poll_attempts: u32,
    pub poll_interval: Duration,
}

impl Default for TransportPolicy {
    fn default() -> Self {
        Self::from(&BundleConfig::default())
    }
}

impl From<&BundleConfig> for TransportPolicy {
    fn from(cfg: &BundleConfig) -> Self {
        Self {
            poll_attempts: cfg.poll_attempts.max(1),
            poll_interval: cfg.poll_interval(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchOutcome {
    /// The bundle now sits on a quarantine branch.
    Fetched { branch: String, bundle_bytes: u64 },
    /// The changeset finished without touching any file. No branch was created.
    NoChanges,
}

/// Download, verify, and stage a changeset's bundle into its quarantine branch.
#[instrument(skip_all, fields(id = %id))]
pub async fn fetch_changeset<G, A>(
    git: &G,
    api: &A,
    downloader: &Downloader,
    id: &ChangesetId,
    policy: &TransportPolicy,
) -> Result<FetchOutcome>
where
    G: GitAdapter,
    A: ChangesetApi + ?Sized,
{
    let branch = id.branch_name();
    if git.branch_exists(&branch)? {
        return Err(FerryError::BranchExists {
            id: id.raw().to_string(),
            branch,
        });
    }

    let location = wait_for_bundle(api, id, policy).await?;
    let Some(url) = location.download_url.filter(|_| location.has_changes) else {
        info!("remote reports no changes");
        return Ok(FetchOutcome::NoChanges);
    };

    let bundle = downloader.fetch(&url).await.map_err(|err| match err {
        DownloadError::Timeout(what) => FerryError::Timeout(format!("downloading {what}")),
        DownloadError::Failed(reason) => FerryError::DownloadFailed {
            id: id.raw().to_string(),
            reason,
        },
    })?;

    if let Some(expected) = location.sha256.as_deref()
        && !expected.trim().eq_ignore_ascii_case(&bundle.sha256)
    {
        return Err(FerryError::InvalidBundle {
            id: id.raw().to_string(),
            reason: format!("sha256 mismatch: expected {expected}, got {}", bundle.sha256),
        });
    }
    if !git.verify_bundle(bundle.path()) {
        return Err(FerryError::InvalidBundle {
            id: id.raw().to_string(),
            reason: "git bundle verify failed".to_string(),
        });
    }

    git.fetch_bundle_to_branch(bundle.path(), &branch)?;
    let bundle_bytes = bundle.bytes;
    if let Err(err) = bundle.file.close() {
        warn!(err = %err, "failed to remove temp bundle");
    }

    info!(%branch, bundle_bytes, "bundle fetched");
    Ok(FetchOutcome::Fetched {
        branch,
        bundle_bytes,
    })
}

/// Ask for the bundle location until it has a URL or reports no changes.
async fn wait_for_bundle<A: ChangesetApi + ?Sized>(
    api: &A,
    id: &ChangesetId,
    policy: &TransportPolicy,
) -> Result<BundleLocation> {
    for attempt in 1..=policy.poll_attempts {
        let location = api.bundle_location(id).await?;
        if !location.has_changes || location.download_url.is_some() {
            return Ok(location);
        }
        debug!(attempt, attempts = policy.poll_attempts, "bundle not ready yet");
        if attempt < policy.poll_attempts {
            tokio::time::sleep(policy.poll_interval).await;
        }
    }
    Err(FerryError::Timeout(format!(
        "bundle for {id} not ready after {} attempts",
        policy.poll_attempts
    )))
}
