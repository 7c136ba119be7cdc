//! Conditions ferry commands can end in.
//!
//! Every variant maps to one stable string tag (used in JSON output) and one
//! exit code from [`crate::exit_codes`].

use thiserror::Error;

use crate::exit_codes;

#[derive(Error, Debug)]
pub enum FerryError {
    #[error("{path} is not inside a git repository")]
    NotGitRepo { path: String },

    #[error("working tree has uncommitted changes; commit or stash them first")]
    DirtyWorkspace { files: Vec<String> },

    #[error("branch {branch} already exists; run `ferry apply {id}` or `ferry discard {id}` first")]
    BranchExists { id: String, branch: String },

    #[error("no fetched changes for {id} (branch {branch} not found); run `ferry fetch {id}` first")]
    BranchNotFound { id: String, branch: String },

    #[error("{id} produced no file changes")]
    NoChanges { id: String },

    #[error("bundle for {id} is invalid: {reason}")]
    InvalidBundle { id: String, reason: String },

    #[error("merging {branch} stopped on conflicts; resolve them and commit, or run `git merge --abort`")]
    MergeConflict { branch: String, files: Vec<String> },

    #[error("downloading bundle for {id} failed: {reason}")]
    DownloadFailed { id: String, reason: String },

    #[error("changeset {id} not found")]
    ChangesetNotFound { id: String },

    #[error("id prefix {prefix} is ambiguous: matches {}", .matches.join(", "))]
    AmbiguousId { prefix: String, matches: Vec<String> },

    #[error("remote API error: {0}")]
    Api(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl FerryError {
    /// Stable machine-readable tag.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::NotGitRepo { .. } => "not_a_git_repo",
            Self::DirtyWorkspace { .. } => "dirty_workspace",
            Self::BranchExists { .. } => "branch_exists",
            Self::BranchNotFound { .. } => "branch_not_found",
            Self::NoChanges { .. } => "no_changes",
            Self::InvalidBundle { .. } => "invalid_bundle",
            Self::MergeConflict { .. } => "merge_conflict",
            Self::DownloadFailed { .. } => "download_failed",
            Self::ChangesetNotFound { .. } => "changeset_not_found",
            Self::AmbiguousId { .. } => "ambiguous_id",
            Self::Api(_) => "api_error",
            Self::Timeout(_) => "timeout",
            Self::Internal(_) => "internal",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotGitRepo { .. } => exit_codes::NOT_GIT_REPO,
            Self::DirtyWorkspace { .. } => exit_codes::DIRTY_WORKSPACE,
            Self::BranchExists { .. } | Self::MergeConflict { .. } => exit_codes::CONFLICT,
            Self::BranchNotFound { .. }
            | Self::ChangesetNotFound { .. }
            | Self::AmbiguousId { .. } => exit_codes::NOT_FOUND,
            Self::NoChanges { .. } => exit_codes::NO_CHANGES,
            Self::DownloadFailed { .. } | Self::Api(_) => exit_codes::NETWORK_ERROR,
            Self::Timeout(_) => exit_codes::TIMEOUT,
            Self::InvalidBundle { .. } | Self::Internal(_) => exit_codes::ERROR,
        }
    }

    /// Files worth listing alongside the message.
    pub fn files(&self) -> &[String] {
        match self {
            Self::DirtyWorkspace { files } | Self::MergeConflict { files, .. } => files,
            _ => &[],
        }
    }
}

pub type Result<T> = std::result::Result<T, FerryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conditions_map_to_documented_exit_codes() {
        let cases = [
            (
                FerryError::BranchExists {
                    id: "run_1".into(),
                    branch: "ferry/job-run_1".into(),
                },
                "branch_exists",
                exit_codes::CONFLICT,
            ),
            (
                FerryError::BranchNotFound {
                    id: "run_1".into(),
                    branch: "ferry/job-run_1".into(),
                },
                "branch_not_found",
                exit_codes::NOT_FOUND,
            ),
            (
                FerryError::NoChanges { id: "run_1".into() },
                "no_changes",
                exit_codes::NO_CHANGES,
            ),
            (
                FerryError::InvalidBundle {
                    id: "run_1".into(),
                    reason: "bad".into(),
                },
                "invalid_bundle",
                exit_codes::ERROR,
            ),
            (
                FerryError::MergeConflict {
                    branch: "b".into(),
                    files: vec![],
                },
                "merge_conflict",
                exit_codes::CONFLICT,
            ),
            (
                FerryError::DownloadFailed {
                    id: "run_1".into(),
                    reason: "404".into(),
                },
                "download_failed",
                exit_codes::NETWORK_ERROR,
            ),
        ];
        for (err, tag, code) in cases {
            assert_eq!(err.tag(), tag);
            assert_eq!(err.exit_code(), code, "{tag}");
        }
    }

    #[test]
    fn branch_errors_name_the_corrective_command() {
        let err = FerryError::BranchNotFound {
            id: "abc".into(),
            branch: "ferry/session-abc".into(),
        };
        assert!(err.to_string().contains("ferry fetch abc"));
    }

    #[test]
    fn internal_errors_keep_their_message() {
        let err = FerryError::from(anyhow::anyhow!("git exploded"));
        assert_eq!(err.tag(), "internal");
        assert_eq!(err.to_string(), "git exploded");
    }
}
