//! Git adapter for ferry commands.
//!
//! Repository state is owned by the `git` executable. Everything ferry does to
//! a repository goes through the [`GitAdapter`] trait, whose one production
//! implementation shells out to `git` in a fixed working directory. Orchestration
//! code branches on the typed outcomes here (diverged vs. conflict vs. failure),
//! so implementations must keep those signals distinct.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use tracing::{debug, instrument, warn};

use crate::core::summary::{
    ChangeSummary, LOG_FORMAT, build_summary, parse_commit_log, parse_name_status_z,
    parse_numstat_z,
};
use crate::core::types::{
    CommitInfo, DiffOutput, MergeOptions, MergeOutcome, MergeStrategy, RepoInfo,
};
use crate::io::process::run_bounded;

pub const DEFAULT_DIFF_LIMIT_BYTES: usize = 5_000_000;
pub const DEFAULT_DIFF_TIMEOUT: Duration = Duration::from_secs(120);

static NOT_FAST_FORWARD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)not possible to fast-forward|diverging branches|cannot fast-forward")
        .expect("valid regex")
});

/// Typed operations ferry needs from a git repository.
pub trait GitAdapter {
    /// Inspect the repository. Never fails: anything git cannot answer is
    /// reported as "not a repository".
    fn repo_info(&self) -> RepoInfo;

    /// Check a bundle's structure and prerequisites. Any error means `false`.
    fn verify_bundle(&self, bundle: &Path) -> bool;

    /// Fetch the bundle's head into a new local branch.
    ///
    /// Errors if the branch already exists or the bundle cannot be read.
    fn fetch_bundle_to_branch(&self, bundle: &Path, branch: &str) -> Result<()>;

    fn branch_exists(&self, branch: &str) -> Result<bool>;

    /// Local branch names starting with `prefix`, sorted.
    fn branches_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Summary of the branch's changes relative to its merge base with HEAD.
    fn diff_stats(&self, branch: &str) -> Result<ChangeSummary>;

    /// Unified diff of the branch's changes, unless it is too large to buffer.
    fn full_diff(&self, branch: &str) -> Result<DiffOutput>;

    /// Commits on the branch that HEAD does not have, oldest first.
    fn commit_log(&self, branch: &str) -> Result<Vec<CommitInfo>>;

    /// Merge `branch` into HEAD. A branch HEAD already contains is `UpToDate`.
    fn merge_branch(&self, branch: &str, options: MergeOptions) -> Result<MergeOutcome>;

    /// Delete a local branch. Deleting a branch that does not exist is a no-op.
    fn delete_branch(&self, branch: &str, force: bool) -> Result<()>;

    /// Stage everything and commit. Returns the resulting HEAD.
    fn auto_commit(&self, message: &str) -> Result<String>;
}

/// Parsed `git status --porcelain=v1 -z` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path as stored in the index, unquoted. For renames and copies, the new path.
    pub path: String,
}

impl StatusEntry {
    pub fn is_untracked(&self) -> bool {
        self.code == "??"
    }
}

/// [`GitAdapter`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
    diff_limit_bytes: usize,
    diff_timeout: Duration,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            diff_limit_bytes: DEFAULT_DIFF_LIMIT_BYTES,
            diff_timeout: DEFAULT_DIFF_TIMEOUT,
        }
    }

    /// Override how much `git diff` output [`GitAdapter::full_diff`] will buffer.
    pub fn with_diff_limits(mut self, limit_bytes: usize, timeout: Duration) -> Self {
        self.diff_limit_bytes = limit_bytes;
        self.diff_timeout = timeout;
        self
    }

    /// Full SHA of HEAD, or `None` on an unborn branch.
    pub fn head_commit(&self) -> Result<Option<String>> {
        let out = self.run(&["rev-parse", "--verify", "--quiet", "HEAD"])?;
        if !out.status.success() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&out.stdout).trim().to_string()))
    }

    /// Get status entries (including untracked) in porcelain format.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-z", "-uall"])?;
        parse_status_z(&out)
    }

    /// Stage all changes (respects .gitignore).
    pub fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    /// True if there is anything staged for commit.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let out = self.run(&["diff", "--cached", "--name-only"])?;
        Ok(!String::from_utf8_lossy(&out.stdout).trim().is_empty())
    }

    /// Commit staged changes with a message.
    ///
    /// If there are no staged changes, this returns Ok(false) and does nothing.
    #[instrument(skip_all)]
    pub fn commit_staged(&self, message: &str) -> Result<bool> {
        if !self.has_staged_changes()? {
            debug!("no staged changes, skipping commit");
            return Ok(false);
        }
        self.run_checked(&["commit", "--quiet", "-m", message])?;
        Ok(true)
    }

    /// Paths with unresolved merge conflicts.
    pub fn unmerged_files(&self) -> Result<Vec<String>> {
        let out = self.run_capture(&["diff", "--name-only", "--diff-filter=U", "-z"])?;
        Ok(split_z(&out))
    }

    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool> {
        let out = self.run(&["merge-base", "--is-ancestor", ancestor, descendant])?;
        match out.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(anyhow!(
                "git merge-base --is-ancestor {ancestor} {descendant} failed: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            )),
        }
    }

    /// Ref the bundle advertises, preferring `HEAD`.
    fn bundle_head(&self, bundle: &str) -> Result<String> {
        let out = self.run_capture(&["bundle", "list-heads", bundle])?;
        let refs: Vec<&str> = out
            .lines()
            .filter_map(|line| line.split_whitespace().nth(1))
            .collect();
        if refs.contains(&"HEAD") {
            return Ok("HEAD".to_string());
        }
        refs.first()
            .map(|r| r.to_string())
            .ok_or_else(|| anyhow!("bundle {bundle} advertises no refs"))
    }

    fn try_repo_info(&self) -> Result<RepoInfo> {
        let inside = self.run(&["rev-parse", "--is-inside-work-tree"])?;
        if !inside.status.success() || String::from_utf8_lossy(&inside.stdout).trim() != "true" {
            return Ok(RepoInfo::default());
        }
        let toplevel = self.run_capture(&["rev-parse", "--show-toplevel"])?;
        let is_repo_root = same_dir(Path::new(toplevel.trim()), &self.workdir);
        let head_commit = self.head_commit()?;
        let (untracked, tracked): (Vec<StatusEntry>, Vec<StatusEntry>) = self
            .status_porcelain()?
            .into_iter()
            .partition(StatusEntry::is_untracked);
        let dirty_files: Vec<String> = tracked.into_iter().map(|entry| entry.path).collect();
        Ok(RepoInfo {
            is_repo: true,
            is_repo_root,
            head_commit,
            is_dirty: !dirty_files.is_empty(),
            dirty_files,
            untracked_files: untracked.into_iter().map(|entry| entry.path).collect(),
        })
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        self.command(args)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.args(args)
            .current_dir(&self.workdir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("LC_ALL", "C");
        cmd
    }
}

impl GitAdapter for Git {
    fn repo_info(&self) -> RepoInfo {
        match self.try_repo_info() {
            Ok(info) => info,
            Err(err) => {
                debug!(err = %err, "repo inspection failed; treating as not a repo");
                RepoInfo::default()
            }
        }
    }

    #[instrument(skip_all, fields(bundle = %bundle.display()))]
    fn verify_bundle(&self, bundle: &Path) -> bool {
        let Some(path) = bundle.to_str() else {
            warn!("bundle path is not valid UTF-8");
            return false;
        };
        match self.run(&["bundle", "verify", path]) {
            Ok(out) if out.status.success() => true,
            Ok(out) => {
                warn!(stderr = %String::from_utf8_lossy(&out.stderr).trim(), "bundle verification failed");
                false
            }
            Err(err) => {
                warn!(err = %err, "bundle verification could not run");
                false
            }
        }
    }

    #[instrument(skip_all, fields(branch))]
    fn fetch_bundle_to_branch(&self, bundle: &Path, branch: &str) -> Result<()> {
        if self.branch_exists(branch)? {
            bail!("branch {branch} already exists");
        }
        let path = bundle
            .to_str()
            .ok_or_else(|| anyhow!("bundle path is not valid UTF-8: {}", bundle.display()))?;
        let head = self.bundle_head(path)?;
        let refspec = format!("{head}:refs/heads/{branch}");
        debug!(%refspec, "fetching bundle");
        self.run_checked(&["fetch", "--quiet", "--no-tags", path, &refspec])?;
        Ok(())
    }

    fn branch_exists(&self, branch: &str) -> Result<bool> {
        let status = self
            .run(&[
                "show-ref",
                "--verify",
                "--quiet",
                &format!("refs/heads/{branch}"),
            ])?
            .status;
        Ok(status.success())
    }

    fn branches_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let pattern = format!("refs/heads/{prefix}*");
        let out = self.run_capture(&["for-each-ref", "--format=%(refname:short)", &pattern])?;
        let mut branches: Vec<String> = out
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        branches.sort();
        Ok(branches)
    }

    #[instrument(skip_all, fields(branch))]
    fn diff_stats(&self, branch: &str) -> Result<ChangeSummary> {
        let new_commits = format!("HEAD..{branch}");
        let since_base = format!("HEAD...{branch}");
        let count = self.run_capture(&["rev-list", "--count", &new_commits, "--"])?;
        let commits = count
            .trim()
            .parse::<usize>()
            .with_context(|| format!("parse commit count '{}'", count.trim()))?;
        let names = self.run_capture(&[
            "diff",
            "--no-color",
            "--name-status",
            "--no-renames",
            "-z",
            &since_base,
            "--",
        ])?;
        let numstat = self.run_capture(&[
            "diff",
            "--no-color",
            "--numstat",
            "--no-renames",
            "-z",
            &since_base,
            "--",
        ])?;
        let summary = build_summary(
            commits,
            parse_name_status_z(&names)?,
            &parse_numstat_z(&numstat)?,
        );
        debug!(
            commits = summary.commits,
            files = summary.file_count(),
            "computed diff stats"
        );
        Ok(summary)
    }

    #[instrument(skip_all, fields(branch))]
    fn full_diff(&self, branch: &str) -> Result<DiffOutput> {
        let since_base = format!("HEAD...{branch}");
        let cmd = self.command(&[
            "diff",
            "--no-color",
            "--no-ext-diff",
            "--no-renames",
            &since_base,
            "--",
        ]);
        let out = run_bounded(cmd, self.diff_timeout, self.diff_limit_bytes)
            .with_context(|| format!("run git diff {since_base}"))?;
        if out.overflowed() {
            warn!(
                limit_bytes = self.diff_limit_bytes,
                dropped = out.stdout_dropped,
                "diff too large"
            );
            return Ok(DiffOutput::TooLarge {
                limit_bytes: self.diff_limit_bytes,
            });
        }
        if out.timed_out {
            bail!("git diff {since_base} timed out after {:?}", self.diff_timeout);
        }
        if !out.status.success() {
            bail!("git diff {since_base} failed: {}", out.stderr_lossy());
        }
        Ok(DiffOutput::Complete(
            String::from_utf8_lossy(&out.stdout).to_string(),
        ))
    }

    fn commit_log(&self, branch: &str) -> Result<Vec<CommitInfo>> {
        let format = format!("--format={LOG_FORMAT}");
        let range = format!("HEAD..{branch}");
        let out = self.run_capture(&[
            "log",
            "--reverse",
            "--no-color",
            "--no-renames",
            "--name-only",
            &format,
            &range,
            "--",
        ])?;
        parse_commit_log(&out)
    }

    #[instrument(skip_all, fields(branch, force = options.force))]
    fn merge_branch(&self, branch: &str, options: MergeOptions) -> Result<MergeOutcome> {
        let pending = self.diff_stats(branch)?;
        let commits = pending.commits;
        let files = pending.file_count();

        if self.is_ancestor(branch, "HEAD")? {
            debug!("branch already contained in HEAD");
            return Ok(MergeOutcome::Merged {
                strategy: MergeStrategy::UpToDate,
                commits,
                files,
            });
        }

        if !options.force {
            if !self.is_ancestor("HEAD", branch)? {
                debug!("HEAD is not an ancestor of branch; fast-forward impossible");
                return Ok(MergeOutcome::Diverged);
            }
            let out = self.run(&["merge", "--ff-only", "--quiet", branch])?;
            if out.status.success() {
                return Ok(MergeOutcome::Merged {
                    strategy: MergeStrategy::FastForward,
                    commits,
                    files,
                });
            }
            let stderr = String::from_utf8_lossy(&out.stderr);
            if NOT_FAST_FORWARD.is_match(&stderr) {
                return Ok(MergeOutcome::Diverged);
            }
            bail!("git merge --ff-only {branch} failed: {}", stderr.trim());
        }

        let message = format!("Merge {branch}");
        let out = self.run(&["merge", "--no-ff", "--no-edit", "--quiet", "-m", &message, branch])?;
        if out.status.success() {
            return Ok(MergeOutcome::Merged {
                strategy: MergeStrategy::MergeCommit,
                commits,
                files,
            });
        }
        let conflicted = self.unmerged_files()?;
        if !conflicted.is_empty() {
            warn!(files = conflicted.len(), "merge stopped on conflicts");
            return Ok(MergeOutcome::Conflict { files: conflicted });
        }
        Err(anyhow!(
            "git merge {branch} failed: {}",
            String::from_utf8_lossy(&out.stderr).trim()
        ))
    }

    #[instrument(skip_all, fields(branch, force))]
    fn delete_branch(&self, branch: &str, force: bool) -> Result<()> {
        if !self.branch_exists(branch)? {
            debug!("branch already gone");
            return Ok(());
        }
        let flag = if force { "-D" } else { "-d" };
        self.run_checked(&["branch", "--quiet", flag, branch])?;
        Ok(())
    }

    #[instrument(skip_all)]
    fn auto_commit(&self, message: &str) -> Result<String> {
        self.add_all()?;
        self.commit_staged(message)?;
        self.head_commit()?
            .ok_or_else(|| anyhow!("HEAD is unborn after commit"))
    }
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn split_z(out: &str) -> Vec<String> {
    out.split('\0')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse NUL-separated porcelain v1 records.
///
/// Renames and copies carry their source path as an extra field, which is
/// skipped. Paths are taken verbatim: `-z` disables quoting.
fn parse_status_z(out: &str) -> Result<Vec<StatusEntry>> {
    let mut fields = out.split('\0').filter(|field| !field.is_empty());
    let mut entries = Vec::new();
    while let Some(record) = fields.next() {
        let (Some(code), Some(path)) = (record.get(..2), record.get(3..)) else {
            return Err(anyhow!("unexpected porcelain record: '{record}'"));
        };
        if code.contains('R') || code.contains('C') {
            fields
                .next()
                .ok_or_else(|| anyhow!("porcelain record '{record}' missing source path"))?;
        }
        entries.push(StatusEntry {
            code: code.to_string(),
            path: path.to_string(),
        });
    }
    Ok(entries)
}
