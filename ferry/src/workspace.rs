//! Workspace preflight checks and the pre-deploy snapshot commit.

use std::path::Path;

use serde::Serialize;
use tracing::{info, instrument};

use crate::core::types::RepoInfo;
use crate::error::{FerryError, Result};
use crate::io::git::GitAdapter;

/// Default message for [`snapshot`] commits.
pub const SNAPSHOT_MESSAGE: &str = "ferry: snapshot workspace before deploy";

/// Inspect the repository, failing if `path` is not inside one.
pub fn ensure_repository<G: GitAdapter>(git: &G, path: &Path) -> Result<RepoInfo> {
    let info = git.repo_info();
    if !info.is_repo {
        return Err(FerryError::NotGitRepo {
            path: path.display().to_string(),
        });
    }
    Ok(info)
}

/// Fail with the dirty file list if tracked files have uncommitted changes.
///
/// Untracked files are allowed; git itself refuses a merge that would
/// overwrite one.
pub fn ensure_clean(info: &RepoInfo) -> Result<()> {
    if info.is_dirty {
        return Err(FerryError::DirtyWorkspace {
            files: info.dirty_files.clone(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotOutcome {
    pub committed: bool,
    pub head: String,
    pub files: Vec<String>,
}

/// Commit every pending change so the workspace can be archived from HEAD.
///
/// A clean workspace is left alone and reports the current HEAD.
#[instrument(skip_all)]
pub fn snapshot<G: GitAdapter>(git: &G, path: &Path, message: &str) -> Result<SnapshotOutcome> {
    let info = ensure_repository(git, path)?;
    let files = info.pending_files();
    if files.is_empty()
        && let Some(head) = &info.head_commit
    {
        return Ok(SnapshotOutcome {
            committed: false,
            head: head.clone(),
            files: Vec::new(),
        });
    }
    let head = git.auto_commit(message)?;
    let committed = info.head_commit.as_deref() != Some(head.as_str());
    info!(%head, files = files.len(), committed, "workspace snapshot");
    Ok(SnapshotOutcome {
        committed,
        head,
        files,
    })
}
