//! Stable exit codes for ferry CLI commands.
//!
//! `2` is deliberately unused: clap exits with it on usage errors.

/// Command succeeded.
pub const OK: i32 = 0;
/// Unexpected failure (git error, corrupt bundle, bad config, ...).
pub const ERROR: i32 = 1;
/// A quarantine branch is in the way, or a merge stopped on conflicts.
pub const CONFLICT: i32 = 3;
/// Changeset or quarantine branch does not exist (or an id is ambiguous).
pub const NOT_FOUND: i32 = 4;
/// Target directory is not inside a git repository.
pub const NOT_GIT_REPO: i32 = 5;
/// Remote API or bundle download failed.
pub const NETWORK_ERROR: i32 = 6;
/// Working tree has uncommitted changes.
pub const DIRTY_WORKSPACE: i32 = 7;
/// Bundle was not ready in time, or a request timed out.
pub const TIMEOUT: i32 = 8;
/// The changeset produced no file changes.
pub const NO_CHANGES: i32 = 9;
