//! Pure parsing of git diff/log output into change summaries.
//!
//! Every parser here works on captured text only, so the same inputs always
//! produce the same summary.

use anyhow::{Result, anyhow};
use serde::Serialize;

use crate::core::types::CommitInfo;

/// Field separator between commits in [`LOG_FORMAT`] output.
pub const RECORD_SEP: char = '\u{1e}';
/// Separator between hash and subject in [`LOG_FORMAT`] output.
pub const UNIT_SEP: char = '\u{1f}';
/// `git log --format` string understood by [`parse_commit_log`].
pub const LOG_FORMAT: &str = "%x1e%H%x1f%s";

/// What changed between HEAD and a quarantine branch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    pub commits: usize,
    pub files_added: Vec<String>,
    pub files_modified: Vec<String>,
    pub files_deleted: Vec<String>,
    pub insertions: u64,
    pub deletions: u64,
}

impl ChangeSummary {
    pub fn file_count(&self) -> usize {
        self.files_added.len() + self.files_modified.len() + self.files_deleted.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

/// One `git diff --numstat` record. Binary files have no line counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub path: String,
    pub insertions: Option<u64>,
    pub deletions: Option<u64>,
}

/// Parse `git diff --name-status --no-renames -z` output.
///
/// Type changes and anything else that is neither an add nor a delete count
/// as modifications.
pub fn parse_name_status_z(out: &str) -> Result<Vec<(ChangeKind, String)>> {
    let mut fields = out.split('\0').filter(|field| !field.is_empty());
    let mut entries = Vec::new();
    while let Some(status) = fields.next() {
        let path = fields
            .next()
            .ok_or_else(|| anyhow!("name-status entry '{status}' missing path"))?;
        let kind = match status.chars().next() {
            Some('A') => ChangeKind::Added,
            Some('D') => ChangeKind::Deleted,
            Some(_) => ChangeKind::Modified,
            None => return Err(anyhow!("empty name-status code")),
        };
        entries.push((kind, path.to_string()));
    }
    Ok(entries)
}

/// Parse `git diff --numstat --no-renames -z` output.
pub fn parse_numstat_z(out: &str) -> Result<Vec<FileStat>> {
    let mut stats = Vec::new();
    for record in out.split('\0').filter(|record| !record.is_empty()) {
        let mut parts = record.splitn(3, '\t');
        let (Some(ins), Some(del), Some(path)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(anyhow!("unexpected numstat record: '{record}'"));
        };
        stats.push(FileStat {
            path: path.to_string(),
            insertions: parse_count(ins)?,
            deletions: parse_count(del)?,
        });
    }
    Ok(stats)
}

fn parse_count(field: &str) -> Result<Option<u64>> {
    if field == "-" {
        return Ok(None);
    }
    field
        .parse::<u64>()
        .map(Some)
        .map_err(|err| anyhow!("bad numstat count '{field}': {err}"))
}

/// Combine classified paths and line counts into a summary.
///
/// Binary files still appear in the file lists but add nothing to the line
/// totals.
pub fn build_summary(
    commits: usize,
    classified: Vec<(ChangeKind, String)>,
    stats: &[FileStat],
) -> ChangeSummary {
    let mut summary = ChangeSummary {
        commits,
        ..ChangeSummary::default()
    };
    for (kind, path) in classified {
        match kind {
            ChangeKind::Added => summary.files_added.push(path),
            ChangeKind::Modified => summary.files_modified.push(path),
            ChangeKind::Deleted => summary.files_deleted.push(path),
        }
    }
    for stat in stats {
        summary.insertions += stat.insertions.unwrap_or(0);
        summary.deletions += stat.deletions.unwrap_or(0);
    }
    summary
}

/// Parse `git log --format=<LOG_FORMAT> --name-only` output.
pub fn parse_commit_log(out: &str) -> Result<Vec<CommitInfo>> {
    let mut commits = Vec::new();
    for record in out.split(RECORD_SEP) {
        if record.trim().is_empty() {
            continue;
        }
        let mut lines = record.lines();
        let header = lines.next().unwrap_or_default();
        let (hash, message) = header
            .split_once(UNIT_SEP)
            .ok_or_else(|| anyhow!("malformed log header: '{header}'"))?;
        let file_count = lines.filter(|line| !line.trim().is_empty()).count();
        commits.push(CommitInfo {
            hash: hash.trim().to_string(),
            message: message.trim().to_string(),
            file_count,
        });
    }
    Ok(commits)
}
