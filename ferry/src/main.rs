//! Ferry: pull remote agent changes into a local git repository.
//!
//! Every subcommand produces a [`Report`]; `--json` and `--silent` only change
//! how it is printed. Exit codes are listed in `ferry::exit_codes`.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{debug, warn};

use ferry::core::changeset::{BRANCH_NAMESPACE, ChangesetId};
use ferry::core::summary::ChangeSummary;
use ferry::core::types::MergeStrategy;
use ferry::error::{FerryError, Result};
use ferry::io::api::HttpChangesetApi;
use ferry::io::config::{FerryConfig, default_config_path, load_effective_config, write_config};
use ferry::io::download::Downloader;
use ferry::io::git::{Git, GitAdapter};
use ferry::reconcile::{self, ApplyOptions, PullOutcome};
use ferry::report::{OutputMode, Report};
use ferry::resolve::{parse_id, resolve_local, resolve_remote};
use ferry::summarize::{self, DiffView, summary_lines};
use ferry::transport::{FetchOutcome, TransportPolicy, fetch_changeset};
use ferry::workspace::{self, SNAPSHOT_MESSAGE};
use ferry::logging;

#[derive(Parser)]
#[command(
    name = "ferry",
    version,
    about = "Fetch, review, and apply remote agent changes as git history"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Print one JSON object on stdout instead of text.
    #[arg(long, global = true, conflicts_with = "silent")]
    json: bool,

    /// Print nothing; report only through the exit code.
    #[arg(long, global = true)]
    silent: bool,

    /// Enable debug logging on stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Run as if started in DIR.
    #[arg(short = 'C', long = "dir", global = true, value_name = "DIR")]
    dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Download a changeset's bundle into its quarantine branch.
    Fetch { id: String },
    /// Show what a fetched changeset would change.
    Diff {
        id: String,
        /// Summary only, no patch text.
        #[arg(long)]
        stat: bool,
    },
    /// List the commits on a fetched changeset.
    Log { id: String },
    /// Merge a fetched changeset into the current branch.
    Apply {
        id: String,
        /// Always create a merge commit.
        #[arg(short, long)]
        force: bool,
    },
    /// Delete a fetched changeset's quarantine branch.
    Discard { id: String },
    /// Fetch and apply in one step.
    Pull {
        id: String,
        /// Always create a merge commit.
        #[arg(short, long)]
        force: bool,
    },
    /// Show repository state and pending quarantine branches.
    Status,
    /// Commit all pending changes so the workspace can be deployed from HEAD.
    Snapshot {
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Manage the ferry config file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default config file if none exists.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Print the effective configuration.
    Show,
}

/// Per-invocation state handed to every command.
struct Context {
    dir: PathBuf,
    config_path: PathBuf,
    config: FerryConfig,
}

impl Context {
    fn load(dir: Option<PathBuf>) -> Result<Self> {
        let dir = match dir {
            Some(dir) => dir,
            None => std::env::current_dir().context("resolve current directory")?,
        };
        let (config_path, config) = load_effective_config()?;
        debug!(dir = %dir.display(), config = %config_path.display(), "context loaded");
        Ok(Self {
            dir,
            config_path,
            config,
        })
    }

    fn git(&self) -> Git {
        Git::new(&self.dir).with_diff_limits(
            self.config.diff.output_limit_bytes,
            self.config.diff.timeout(),
        )
    }

    /// Git adapter for a directory known to be inside a repository.
    fn repo(&self) -> Result<Git> {
        let git = self.git();
        workspace::ensure_repository(&git, &self.dir)?;
        Ok(git)
    }

    fn api(&self) -> Result<HttpChangesetApi> {
        Ok(HttpChangesetApi::new(&self.config.api)?)
    }

    fn downloader(&self) -> Result<Downloader> {
        Ok(Downloader::new(self.config.bundle.download_timeout())?)
    }

    fn policy(&self) -> TransportPolicy {
        TransportPolicy::from(&self.config.bundle)
    }

    fn local_id(&self, git: &Git, raw: &str) -> Result<ChangesetId> {
        resolve_local(git, parse_id(raw)?)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let mode = if cli.silent {
        OutputMode::Silent
    } else if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };
    let report = match run(cli.command, cli.dir).await {
        Ok(report) => report,
        Err(err) => Report::from(&err),
    };
    std::process::exit(report.emit(mode));
}

async fn run(command: Command, dir: Option<PathBuf>) -> Result<Report> {
    // Init never parses the existing file, so it can replace a broken one.
    if let Command::Config {
        action: ConfigAction::Init { force },
    } = command
    {
        return init_config(&default_config_path()?, force);
    }
    let ctx = Context::load(dir)?;
    match command {
        Command::Fetch { id } => cmd_fetch(&ctx, &id).await,
        Command::Diff { id, stat } => cmd_diff(&ctx, &id, stat),
        Command::Log { id } => cmd_log(&ctx, &id),
        Command::Apply { id, force } => cmd_apply(&ctx, &id, force),
        Command::Discard { id } => cmd_discard(&ctx, &id),
        Command::Pull { id, force } => cmd_pull(&ctx, &id, force).await,
        Command::Status => cmd_status(&ctx),
        Command::Snapshot { message } => cmd_snapshot(&ctx, message.as_deref()),
        Command::Config { .. } => cmd_config_show(&ctx),
    }
}

async fn cmd_fetch(ctx: &Context, raw: &str) -> Result<Report> {
    let git = ctx.repo()?;
    let api = ctx.api()?;
    let id = resolve_remote(&api, parse_id(raw)?).await?;
    let downloader = ctx.downloader()?;
    match fetch_changeset(&git, &api, &downloader, &id, &ctx.policy()).await? {
        FetchOutcome::NoChanges => Err(FerryError::NoChanges {
            id: id.raw().to_string(),
        }),
        FetchOutcome::Fetched {
            branch,
            bundle_bytes,
        } => Ok(fetched_report(
            &id,
            &branch,
            bundle_bytes,
            git.diff_stats(&branch),
        )),
    }
}

/// The branch already exists at this point, so a failed summary only loses detail.
fn fetched_report(
    id: &ChangesetId,
    branch: &str,
    bundle_bytes: u64,
    summary: anyhow::Result<ChangeSummary>,
) -> Report {
    let summary = match summary {
        Ok(summary) => Some(summary),
        Err(err) => {
            warn!(err = %format!("{err:#}"), %branch, "could not summarize fetched branch");
            None
        }
    };
    let mut lines = vec![format!("Fetched {id} into {branch}")];
    if let Some(summary) = &summary {
        lines.extend(summary_lines(summary));
    }
    lines.push(format!(
        "Review with `ferry diff {id}`, then `ferry apply {id}` or `ferry discard {id}`."
    ));
    Report::success(
        lines,
        &json!({
            "id": id.raw(),
            "branch": branch,
            "bundle_bytes": bundle_bytes,
            "summary": summary,
        }),
    )
}

fn cmd_diff(ctx: &Context, raw: &str, stat_only: bool) -> Result<Report> {
    let git = ctx.repo()?;
    let id = ctx.local_id(&git, raw)?;
    if stat_only {
        let summary = summarize::summary(&git, &id)?;
        return Ok(Report::success(
            summary_lines(&summary),
            &json!({ "id": id.raw(), "summary": summary }),
        ));
    }
    let view = summarize::diff(&git, &id)?;
    let lines = match &view {
        DiffView::Full { summary, diff } => {
            let mut lines = summary_lines(summary);
            lines.push(String::new());
            lines.extend(diff.lines().map(str::to_string));
            lines
        }
        DiffView::StatsOnly { summary, notice } => {
            let mut lines = summary_lines(summary);
            lines.push(notice.clone());
            lines
        }
    };
    Ok(Report::success(lines, &view))
}

fn cmd_log(ctx: &Context, raw: &str) -> Result<Report> {
    let git = ctx.repo()?;
    let id = ctx.local_id(&git, raw)?;
    let commits = summarize::log(&git, &id)?;
    let lines = commits
        .iter()
        .map(|c| {
            let short = c.hash.get(..10).unwrap_or(&c.hash);
            format!("{short} {} ({} file(s))", c.message, c.file_count)
        })
        .collect();
    Ok(Report::success(
        lines,
        &json!({ "id": id.raw(), "commits": commits }),
    ))
}

fn cmd_apply(ctx: &Context, raw: &str, force: bool) -> Result<Report> {
    let git = ctx.repo()?;
    let id = ctx.local_id(&git, raw)?;
    let outcome = reconcile::apply(&git, &id, ApplyOptions { force })?;
    Ok(Report::success(vec![apply_line(&outcome)], &outcome))
}

fn cmd_discard(ctx: &Context, raw: &str) -> Result<Report> {
    let git = ctx.repo()?;
    let id = ctx.local_id(&git, raw)?;
    let outcome = reconcile::discard(&git, &id)?;
    let line = if outcome.existed {
        format!("Discarded {}", outcome.branch)
    } else {
        format!("Nothing to discard for {}", outcome.id)
    };
    Ok(Report::success(vec![line], &outcome))
}

async fn cmd_pull(ctx: &Context, raw: &str, force: bool) -> Result<Report> {
    let git = ctx.repo()?;
    let api = ctx.api()?;
    let id = resolve_remote(&api, parse_id(raw)?).await?;
    let downloader = ctx.downloader()?;
    let outcome = reconcile::pull(
        &git,
        &api,
        &downloader,
        &id,
        &ctx.policy(),
        ApplyOptions { force },
    )
    .await?;
    match outcome {
        PullOutcome::NoChanges => Err(FerryError::NoChanges {
            id: id.raw().to_string(),
        }),
        PullOutcome::Applied(applied) => Ok(Report::success(vec![apply_line(&applied)], &applied)),
    }
}

fn apply_line(outcome: &reconcile::ApplyOutcome) -> String {
    let how = match outcome.strategy {
        MergeStrategy::FastForward => "fast-forward",
        MergeStrategy::MergeCommit => "merge commit",
        MergeStrategy::UpToDate => "already up to date",
    };
    format!(
        "Applied {} ({how}): {} commit(s), {} file(s), +{} -{}",
        outcome.id, outcome.commits, outcome.files, outcome.insertions, outcome.deletions
    )
}

fn cmd_status(ctx: &Context) -> Result<Report> {
    let git = ctx.git();
    let info = workspace::ensure_repository(&git, &ctx.dir)?;
    let pending = git.branches_with_prefix(&format!("{BRANCH_NAMESPACE}/"))?;
    let mut lines = vec![
        format!(
            "HEAD: {}",
            info.head_commit.as_deref().unwrap_or("(no commits)")
        ),
        format!(
            "Working tree: {}",
            if info.is_dirty { "dirty" } else { "clean" }
        ),
    ];
    if !info.is_repo_root {
        lines.push(format!("Note: {} is not the repository root", ctx.dir.display()));
    }
    lines.extend(info.dirty_files.iter().map(|f| format!("  M {f}")));
    lines.extend(info.untracked_files.iter().map(|f| format!("  ? {f}")));
    if pending.is_empty() {
        lines.push("No fetched changesets.".to_string());
    } else {
        lines.push("Fetched changesets:".to_string());
        lines.extend(pending.iter().map(|b| format!("  {b}")));
    }
    Ok(Report::success(
        lines,
        &json!({ "repo": info, "quarantine_branches": pending }),
    ))
}

fn cmd_snapshot(ctx: &Context, message: Option<&str>) -> Result<Report> {
    let git = ctx.git();
    let outcome = workspace::snapshot(&git, &ctx.dir, message.unwrap_or(SNAPSHOT_MESSAGE))?;
    let line = if outcome.committed {
        format!(
            "Committed {} file(s) as {}",
            outcome.files.len(),
            outcome.head
        )
    } else {
        format!("Workspace clean at {}", outcome.head)
    };
    Ok(Report::success(vec![line], &outcome))
}

fn cmd_config_show(ctx: &Context) -> Result<Report> {
    let mut shown = ctx.config.clone();
    if shown.api.token.is_some() {
        shown.api.token = Some("********".to_string());
    }
    let text = toml::to_string_pretty(&shown).context("serialize config")?;
    let mut lines = vec![format!("# {}", ctx.config_path.display())];
    lines.extend(text.lines().map(str::to_string));
    Ok(Report::success(lines, &shown))
}

fn init_config(path: &Path, force: bool) -> Result<Report> {
    if path.exists() && !force {
        return Ok(Report::success(
            vec![format!("Config already exists at {}", path.display())],
            &json!({ "path": path, "written": false }),
        ));
    }
    write_config(path, &FerryConfig::default())?;
    Ok(Report::success(
        vec![format!("Wrote {}", path.display())],
        &json!({ "path": path, "written": true }),
    ))
}
