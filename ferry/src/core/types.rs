//! Shared types passed between the git adapter and the orchestration modules.

use serde::Serialize;

/// Snapshot of the repository at the working directory.
///
/// `Default` is the conservative answer used whenever git cannot be queried:
/// not a repository, nothing known about HEAD.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepoInfo {
    pub is_repo: bool,
    /// True when the working directory is the top level of the work tree.
    pub is_repo_root: bool,
    /// `None` on an unborn branch.
    pub head_commit: Option<String>,
    /// True when tracked files differ from HEAD (staged or not).
    pub is_dirty: bool,
    /// Tracked paths with uncommitted changes.
    pub dirty_files: Vec<String>,
    /// Untracked, non-ignored paths. These do not make the tree dirty.
    pub untracked_files: Vec<String>,
}

impl RepoInfo {
    /// Every path a snapshot commit would pick up.
    pub fn pending_files(&self) -> Vec<String> {
        self.dirty_files
            .iter()
            .chain(&self.untracked_files)
            .cloned()
            .collect()
    }
}

/// One commit on a quarantine branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitInfo {
    pub hash: String,
    /// Subject line.
    pub message: String,
    pub file_count: usize,
}

/// How a quarantine branch ended up in the current branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// HEAD moved to the quarantine tip; no new commit.
    FastForward,
    /// An explicit `Merge <branch>` commit was created.
    MergeCommit,
    /// HEAD already contained the branch; nothing moved.
    UpToDate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOptions {
    /// Skip the fast-forward attempt and always create a merge commit.
    pub force: bool,
}

/// Result of asking git to merge a branch into HEAD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged {
        strategy: MergeStrategy,
        /// Commits on the branch that were not in HEAD before the merge.
        commits: usize,
        /// Paths changed by those commits.
        files: usize,
    },
    /// Fast-forward-only merge refused because the histories diverged.
    Diverged,
    /// Overlapping edits. The repository is left mid-merge.
    Conflict { files: Vec<String> },
}

/// Full diff text, or a marker that it exceeded the buffer limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffOutput {
    Complete(String),
    TooLarge { limit_bytes: usize },
}
