//! Read-only views of a quarantine branch: stats, full diff, commit log.

use serde::Serialize;

use crate::core::changeset::ChangesetId;
use crate::core::summary::ChangeSummary;
use crate::core::types::{CommitInfo, DiffOutput};
use crate::error::{FerryError, Result};
use crate::io::git::GitAdapter;

/// What `ferry diff` shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum DiffView {
    Full {
        summary: ChangeSummary,
        diff: String,
    },
    /// The diff did not fit in the output buffer.
    StatsOnly {
        summary: ChangeSummary,
        notice: String,
    },
}

/// Quarantine branch for `id`, or `branch_not_found`.
pub fn require_branch<G: GitAdapter>(git: &G, id: &ChangesetId) -> Result<String> {
    let branch = id.branch_name();
    if !git.branch_exists(&branch)? {
        return Err(FerryError::BranchNotFound {
            id: id.raw().to_string(),
            branch,
        });
    }
    Ok(branch)
}

pub fn summary<G: GitAdapter>(git: &G, id: &ChangesetId) -> Result<ChangeSummary> {
    let branch = require_branch(git, id)?;
    Ok(git.diff_stats(&branch)?)
}

/// Full diff, degrading to stats plus a notice when the diff is too large.
pub fn diff<G: GitAdapter>(git: &G, id: &ChangesetId) -> Result<DiffView> {
    let branch = require_branch(git, id)?;
    let summary = git.diff_stats(&branch)?;
    match git.full_diff(&branch)? {
        DiffOutput::Complete(diff) => Ok(DiffView::Full { summary, diff }),
        DiffOutput::TooLarge { limit_bytes } => Ok(DiffView::StatsOnly {
            summary,
            notice: format!(
                "diff exceeds {limit_bytes} bytes; showing stats only (use `ferry diff --stat` or git directly)"
            ),
        }),
    }
}

pub fn log<G: GitAdapter>(git: &G, id: &ChangesetId) -> Result<Vec<CommitInfo>> {
    let branch = require_branch(git, id)?;
    Ok(git.commit_log(&branch)?)
}

/// Human-readable lines for a summary.
pub fn summary_lines(summary: &ChangeSummary) -> Vec<String> {
    let mut lines = vec![format!(
        "{} commit(s), {} file(s) changed, +{} -{}",
        summary.commits,
        summary.file_count(),
        summary.insertions,
        summary.deletions
    )];
    lines.extend(summary.files_added.iter().map(|f| format!("  A {f}")));
    lines.extend(summary.files_modified.iter().map(|f| format!("  M {f}")));
    lines.extend(summary.files_deleted.iter().map(|f| format!("  D {f}")));
    lines
}
