//! Test-only helpers: scratch repositories, agent clones that produce real
//! bundles, and a scripted remote API.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use tempfile::TempDir;

use crate::core::changeset::ChangesetId;
use crate::error::{FerryError, Result as FerryResult};
use crate::io::api::{BundleLocation, ChangesetApi};
use crate::io::git::{Git, GitAdapter};

/// Run git in `dir` and return trimmed stdout, failing on non-zero exit.
pub fn git_in(dir: &Path, args: &[&str]) -> Result<String> {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("LC_ALL", "C")
        .output()
        .with_context(|| format!("run git {args:?}"))?;
    if !out.status.success() {
        bail!(
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&out.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
}

fn configure_identity(dir: &Path, name: &str) -> Result<()> {
    git_in(dir, &["config", "user.name", name])?;
    git_in(dir, &["config", "user.email", "ferry-tests@local.invalid"])?;
    git_in(dir, &["config", "commit.gpgsign", "false"])?;
    Ok(())
}

fn write_file(root: &Path, rel: &str, contents: &str) -> Result<()> {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
}

fn commit_all(root: &Path, message: &str) -> Result<String> {
    git_in(root, &["add", "-A"])?;
    git_in(root, &["commit", "--quiet", "-m", message])?;
    git_in(root, &["rev-parse", "HEAD"])
}

/// A user repository with one initial commit, living in a temp directory.
pub struct TestRepo {
    temp: TempDir,
    root: PathBuf,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("tempdir")?;
        let root = temp.path().join("work");
        fs::create_dir_all(&root).context("create work dir")?;
        git_in(&root, &["init", "--quiet"])?;
        configure_identity(&root, "Ferry User")?;
        write_file(&root, "README.md", "base\n")?;
        commit_all(&root, "initial commit")?;
        Ok(Self { temp, root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scratch directory next to the repository (not inside it).
    pub fn scratch(&self) -> &Path {
        self.temp.path()
    }

    pub fn git(&self) -> Git {
        Git::new(&self.root)
    }

    pub fn write(&self, rel: &str, contents: &str) -> Result<()> {
        write_file(&self.root, rel, contents)
    }

    pub fn read(&self, rel: &str) -> Result<String> {
        let path = self.root.join(rel);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }

    /// Write a file and commit it. Returns the new HEAD.
    pub fn commit_file(&self, rel: &str, contents: &str, message: &str) -> Result<String> {
        self.write(rel, contents)?;
        commit_all(&self.root, message)
    }

    pub fn head(&self) -> Result<String> {
        git_in(&self.root, &["rev-parse", "HEAD"])
    }

    pub fn capture(&self, args: &[&str]) -> Result<String> {
        git_in(&self.root, args)
    }

    /// Parents of `rev`, first parent first.
    pub fn parents(&self, rev: &str) -> Result<Vec<String>> {
        let out = git_in(&self.root, &["rev-list", "--parents", "-n", "1", rev])?;
        Ok(out.split_whitespace().skip(1).map(str::to_string).collect())
    }

    /// Clone the repository as a remote agent would see it.
    pub fn agent(&self, name: &str) -> Result<AgentClone> {
        let root = self.temp.path().join(format!("agent-{name}"));
        let src = self
            .root
            .to_str()
            .ok_or_else(|| anyhow!("non-utf8 repo path"))?;
        let dst = root.to_str().ok_or_else(|| anyhow!("non-utf8 agent path"))?;
        git_in(self.temp.path(), &["clone", "--quiet", src, dst])?;
        configure_identity(&root, "Ferry Agent")?;
        let base = git_in(&root, &["rev-parse", "HEAD"])?;
        Ok(AgentClone { root, base })
    }

    /// Fetch an agent's bundle straight into the quarantine branch for `id`.
    pub fn quarantine(&self, agent: &AgentClone, id: &ChangesetId) -> Result<PathBuf> {
        let bundle = agent.bundle(&self.temp.path().join(format!("{}.bundle", id.raw())))?;
        self.git().fetch_bundle_to_branch(&bundle, &id.branch_name())?;
        Ok(bundle)
    }
}

/// A clone standing in for the remote agent's workspace.
pub struct AgentClone {
    root: PathBuf,
    base: String,
}

impl AgentClone {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn write(&self, rel: &str, contents: &str) -> Result<()> {
        write_file(&self.root, rel, contents)
    }

    pub fn remove(&self, rel: &str) -> Result<()> {
        fs::remove_file(self.root.join(rel)).with_context(|| format!("remove {rel}"))
    }

    pub fn commit_file(&self, rel: &str, contents: &str, message: &str) -> Result<String> {
        self.write(rel, contents)?;
        commit_all(&self.root, message)
    }

    /// Commit whatever is in the clone's working tree.
    pub fn commit(&self, message: &str) -> Result<String> {
        commit_all(&self.root, message)
    }

    /// Bundle every commit made since the clone was taken.
    pub fn bundle(&self, out: &Path) -> Result<PathBuf> {
        let out_str = out.to_str().ok_or_else(|| anyhow!("non-utf8 bundle path"))?;
        let range = format!("{}..HEAD", self.base);
        git_in(&self.root, &["bundle", "create", out_str, &range])?;
        Ok(out.to_path_buf())
    }

    pub fn bundle_bytes(&self, out: &Path) -> Result<Vec<u8>> {
        let path = self.bundle(out)?;
        fs::read(&path).with_context(|| format!("read {}", path.display()))
    }
}

/// In-memory [`ChangesetApi`] returning queued bundle locations in order.
///
/// The last queued location repeats once the queue is down to one entry.
#[derive(Default)]
pub struct ScriptedApi {
    locations: Mutex<VecDeque<BundleLocation>>,
    sessions: Vec<String>,
    location_calls: AtomicUsize,
}

impl ScriptedApi {
    pub fn new(locations: Vec<BundleLocation>) -> Self {
        Self {
            locations: Mutex::new(locations.into()),
            ..Self::default()
        }
    }

    pub fn with_sessions(mut self, sessions: &[&str]) -> Self {
        self.sessions = sessions.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn location_calls(&self) -> usize {
        self.location_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChangesetApi for ScriptedApi {
    async fn resolve_session_prefix(&self, prefix: &str) -> FerryResult<String> {
        let matches: Vec<String> = self
            .sessions
            .iter()
            .filter(|s| s.starts_with(prefix))
            .cloned()
            .collect();
        match matches.as_slice() {
            [] => Err(FerryError::ChangesetNotFound {
                id: prefix.to_string(),
            }),
            [one] => Ok(one.clone()),
            _ => Err(FerryError::AmbiguousId {
                prefix: prefix.to_string(),
                matches,
            }),
        }
    }

    async fn bundle_location(&self, id: &ChangesetId) -> FerryResult<BundleLocation> {
        self.location_calls.fetch_add(1, Ordering::SeqCst);
        let mut queue = self
            .locations
            .lock()
            .map_err(|_| FerryError::Api("scripted api poisoned".to_string()))?;
        let next = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        next.ok_or_else(|| FerryError::ChangesetNotFound {
            id: id.raw().to_string(),
        })
    }
}

/// A location pointing at `url` with changes.
pub fn ready_at(url: &str) -> BundleLocation {
    BundleLocation {
        download_url: Some(url.to_string()),
        has_changes: true,
        sha256: None,
    }
}

/// A location that reports changes whose bundle is not packaged yet.
pub fn pending() -> BundleLocation {
    BundleLocation {
        download_url: None,
        has_changes: true,
        sha256: None,
    }
}

/// A location for a changeset that changed nothing.
pub fn no_changes() -> BundleLocation {
    BundleLocation {
        download_url: None,
        has_changes: false,
        sha256: None,
    }
}
