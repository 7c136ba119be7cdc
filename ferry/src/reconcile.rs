//! Reconciliation: bringing a quarantine branch into the current branch.
//!
//! Per changeset id the lifecycle is `absent → fetched → applied | discarded`.
//! Only `fetched` (the quarantine branch exists) permits apply. Discard is valid
//! from any state. This is the only module that moves the user's branch.

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::changeset::ChangesetId;
use crate::core::types::{MergeOptions, MergeOutcome, MergeStrategy};
use crate::error::{FerryError, Result};
use crate::io::api::ChangesetApi;
use crate::io::download::Downloader;
use crate::io::git::GitAdapter;
use crate::summarize::require_branch;
use crate::transport::{FetchOutcome, TransportPolicy, fetch_changeset};
use crate::workspace::ensure_clean;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Create a merge commit even when a fast-forward is possible.
    pub force: bool,
}

/// Result of a successful apply.
///
/// Counts describe the quarantine branch as it was before merging, so a
/// fallback merge commit is never counted as agent work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyOutcome {
    pub id: String,
    pub branch: String,
    pub strategy: MergeStrategy,
    pub commits: usize,
    pub files: usize,
    pub insertions: u64,
    pub deletions: u64,
    /// HEAD after the merge.
    pub head: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscardOutcome {
    pub id: String,
    pub branch: String,
    /// False when there was nothing to discard.
    pub existed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PullOutcome {
    Applied(ApplyOutcome),
    NoChanges,
}

/// Merge the quarantine branch for `id` into HEAD, then delete it.
///
/// Fast-forwards when possible. Diverged histories fall back to a
/// `Merge <branch>` commit automatically. On conflict the repository is left
/// mid-merge and the quarantine branch is kept. A branch HEAD already contains
/// is reported as [`MergeStrategy::UpToDate`] and deleted.
#[instrument(skip_all, fields(id = %id, force = options.force))]
pub fn apply<G: GitAdapter>(git: &G, id: &ChangesetId, options: ApplyOptions) -> Result<ApplyOutcome> {
    let branch = require_branch(git, id)?;
    ensure_clean(&git.repo_info())?;

    let pending = git.diff_stats(&branch)?;
    debug!(
        commits = pending.commits,
        files = pending.file_count(),
        "pending changes"
    );

    let mut outcome = git.merge_branch(&branch, MergeOptions { force: options.force })?;
    if outcome == MergeOutcome::Diverged && !options.force {
        info!(%branch, "histories diverged; creating merge commit");
        outcome = git.merge_branch(&branch, MergeOptions { force: true })?;
    }

    let strategy = match outcome {
        MergeOutcome::Merged { strategy, .. } => strategy,
        MergeOutcome::Conflict { files } => {
            warn!(%branch, files = files.len(), "merge conflict; leaving repository for manual resolution");
            return Err(FerryError::MergeConflict { branch, files });
        }
        MergeOutcome::Diverged => {
            return Err(FerryError::Internal(anyhow::anyhow!(
                "merge of {branch} reported divergence while creating a merge commit"
            )));
        }
    };

    git.delete_branch(&branch, true)?;
    let head = git.repo_info().head_commit;
    info!(%branch, ?strategy, commits = pending.commits, "changes applied");

    Ok(ApplyOutcome {
        id: id.raw().to_string(),
        branch,
        strategy,
        commits: pending.commits,
        files: pending.file_count(),
        insertions: pending.insertions,
        deletions: pending.deletions,
        head,
    })
}

/// Delete the quarantine branch for `id` if there is one.
#[instrument(skip_all, fields(id = %id))]
pub fn discard<G: GitAdapter>(git: &G, id: &ChangesetId) -> Result<DiscardOutcome> {
    let branch = id.branch_name();
    let existed = git.branch_exists(&branch)?;
    git.delete_branch(&branch, true)?;
    debug!(%branch, existed, "discarded");
    Ok(DiscardOutcome {
        id: id.raw().to_string(),
        branch,
        existed,
    })
}

/// Fetch then apply. A changeset without changes skips the apply.
#[instrument(skip_all, fields(id = %id))]
pub async fn pull<G, A>(
    git: &G,
    api: &A,
    downloader: &Downloader,
    id: &ChangesetId,
    policy: &TransportPolicy,
    options: ApplyOptions,
) -> Result<PullOutcome>
where
    G: GitAdapter,
    A: ChangesetApi + ?Sized,
{
    // Refuse before downloading so a dirty tree never strands a fetched branch.
    ensure_clean(&git.repo_info())?;
    match fetch_changeset(git, api, downloader, id, policy).await? {
        FetchOutcome::NoChanges => Ok(PullOutcome::NoChanges),
        FetchOutcome::Fetched { .. } => Ok(PullOutcome::Applied(apply(git, id, options)?)),
    }
}
