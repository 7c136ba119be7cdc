//! Quarantine branch lifecycle: fetched → applied | discarded.
//!
//! Bundles come from a real agent clone and are fetched directly, so these tests
//! exercise git behavior without any network.

use std::fs;

use ferry::core::changeset::ChangesetId;
use ferry::core::types::MergeStrategy;
use ferry::exit_codes;
use ferry::io::git::GitAdapter;
use ferry::reconcile::{ApplyOptions, apply, discard};
use ferry::summarize::{self, DiffView};
use ferry::test_support::TestRepo;

const SESSION: &str = "3f2a9c1e-7b4d-4e8a-9c2f-1a2b3c4d5e6f";

fn id(raw: &str) -> ChangesetId {
    ChangesetId::parse(raw).expect("id")
}

#[test]
fn fast_forward_moves_head_and_deletes_branch() {
    let repo = TestRepo::new().expect("repo");
    let agent = repo.agent("ff").expect("agent");
    let agent_head = agent
        .commit_file("feature.txt", "hello\n", "add feature")
        .expect("commit");
    let changeset = id("run_ff");
    repo.quarantine(&agent, &changeset).expect("quarantine");
    let git = repo.git();

    let outcome = apply(&git, &changeset, ApplyOptions::default()).expect("apply");

    assert_eq!(outcome.strategy, MergeStrategy::FastForward);
    assert_eq!(outcome.commits, 1);
    assert_eq!(outcome.files, 1);
    assert_eq!(outcome.insertions, 1);
    assert_eq!(outcome.deletions, 0);
    assert_eq!(outcome.head.as_deref(), Some(agent_head.as_str()));
    assert_eq!(repo.head().expect("head"), agent_head);
    assert_eq!(repo.read("feature.txt").expect("read"), "hello\n");
    assert!(!git.branch_exists("ferry/job-run_ff").expect("branch exists"));
}

#[test]
fn diverged_history_falls_back_to_merge_commit() {
    let repo = TestRepo::new().expect("repo");
    let agent = repo.agent("div").expect("agent");
    let agent_head = agent
        .commit_file("feature.txt", "hello\n", "add feature")
        .expect("agent commit");
    let changeset = id(SESSION);
    repo.quarantine(&agent, &changeset).expect("quarantine");
    let local_head = repo
        .commit_file("local.txt", "mine\n", "local work")
        .expect("local commit");

    let outcome = apply(&repo.git(), &changeset, ApplyOptions::default()).expect("apply");

    assert_eq!(outcome.strategy, MergeStrategy::MergeCommit);
    assert_eq!(outcome.commits, 1);
    assert_eq!(outcome.files, 1);
    assert_eq!(
        repo.parents("HEAD").expect("parents"),
        vec![local_head, agent_head]
    );
    assert_eq!(
        repo.capture(&["log", "-1", "--format=%s"]).expect("log"),
        format!("Merge ferry/session-{SESSION}")
    );
    assert_eq!(repo.read("local.txt").expect("read"), "mine\n");
    assert_eq!(repo.read("feature.txt").expect("read"), "hello\n");
}

#[test]
fn force_creates_merge_commit_when_fast_forward_is_possible() {
    let repo = TestRepo::new().expect("repo");
    let base = repo.head().expect("head");
    let agent = repo.agent("force").expect("agent");
    let agent_head = agent
        .commit_file("feature.txt", "hello\n", "add feature")
        .expect("commit");
    let changeset = id("run_force");
    repo.quarantine(&agent, &changeset).expect("quarantine");

    let outcome = apply(&repo.git(), &changeset, ApplyOptions { force: true }).expect("apply");

    assert_eq!(outcome.strategy, MergeStrategy::MergeCommit);
    assert_eq!(repo.parents("HEAD").expect("parents"), vec![base, agent_head]);
}

#[test]
fn conflict_keeps_branch_and_leaves_markers() {
    let repo = TestRepo::new().expect("repo");
    let agent = repo.agent("conflict").expect("agent");
    agent
        .commit_file("README.md", "agent version\n", "agent edit")
        .expect("agent commit");
    let changeset = id("run_conflict");
    repo.quarantine(&agent, &changeset).expect("quarantine");
    repo.commit_file("README.md", "local version\n", "local edit")
        .expect("local commit");
    let git = repo.git();

    let err = apply(&git, &changeset, ApplyOptions::default()).expect_err("conflict");

    assert_eq!(err.tag(), "merge_conflict");
    assert_eq!(err.exit_code(), exit_codes::CONFLICT);
    assert_eq!(err.files(), ["README.md".to_string()]);
    assert!(git.branch_exists("ferry/job-run_conflict").expect("branch exists"));
    assert!(repo.read("README.md").expect("read").contains("<<<<<<<"));
}

#[test]
fn dirty_tree_is_refused_and_branch_kept() {
    let repo = TestRepo::new().expect("repo");
    let agent = repo.agent("dirty").expect("agent");
    agent
        .commit_file("feature.txt", "hello\n", "add feature")
        .expect("commit");
    let changeset = id("run_dirty");
    repo.quarantine(&agent, &changeset).expect("quarantine");
    repo.write("README.md", "base\nwip\n").expect("write");
    let git = repo.git();

    let err = apply(&git, &changeset, ApplyOptions::default()).expect_err("dirty");

    assert_eq!(err.tag(), "dirty_workspace");
    assert_eq!(err.exit_code(), exit_codes::DIRTY_WORKSPACE);
    assert_eq!(err.files(), ["README.md".to_string()]);
    assert!(git.branch_exists("ferry/job-run_dirty").expect("branch exists"));
}

#[test]
fn untracked_files_do_not_block_apply() {
    let repo = TestRepo::new().expect("repo");
    let agent = repo.agent("untracked").expect("agent");
    agent
        .commit_file("feature.txt", "hello\n", "add feature")
        .expect("commit");
    let changeset = id("run_untracked");
    repo.quarantine(&agent, &changeset).expect("quarantine");
    repo.write("build/output.log", "artifact\n").expect("write");

    let outcome = apply(&repo.git(), &changeset, ApplyOptions::default()).expect("apply");

    assert_eq!(outcome.strategy, MergeStrategy::FastForward);
    assert_eq!(repo.read("feature.txt").expect("read"), "hello\n");
    assert_eq!(repo.read("build/output.log").expect("read"), "artifact\n");
}

#[test]
fn branch_already_in_history_is_up_to_date() {
    let repo = TestRepo::new().expect("repo");
    let agent = repo.agent("merged").expect("agent");
    agent
        .commit_file("feature.txt", "hello\n", "add feature")
        .expect("commit");
    let changeset = id("run_merged");
    repo.quarantine(&agent, &changeset).expect("quarantine");
    repo.capture(&["merge", "--ff-only", "--quiet", "ferry/job-run_merged"])
        .expect("manual merge");
    let local_head = repo
        .commit_file("local.txt", "mine\n", "local work")
        .expect("local commit");
    let git = repo.git();

    let outcome = apply(&git, &changeset, ApplyOptions::default()).expect("apply");

    assert_eq!(outcome.strategy, MergeStrategy::UpToDate);
    assert_eq!(outcome.commits, 0);
    assert_eq!(outcome.files, 0);
    assert_eq!(outcome.head.as_deref(), Some(local_head.as_str()));
    assert!(!git.branch_exists("ferry/job-run_merged").expect("branch exists"));

    let again = id("run_merged_again");
    repo.quarantine(&agent, &again).expect("quarantine again");
    let forced = apply(&git, &again, ApplyOptions { force: true }).expect("forced apply");

    assert_eq!(forced.strategy, MergeStrategy::UpToDate);
    assert_eq!(repo.head().expect("head"), local_head);
    assert!(!git.branch_exists("ferry/job-run_merged_again").expect("branch exists"));
}

#[test]
fn apply_without_fetch_reports_missing_branch() {
    let repo = TestRepo::new().expect("repo");
    let err = apply(&repo.git(), &id("run_never"), ApplyOptions::default()).expect_err("missing");
    assert_eq!(err.tag(), "branch_not_found");
    assert_eq!(err.exit_code(), exit_codes::NOT_FOUND);
    assert!(err.to_string().contains("ferry fetch run_never"));
}

#[test]
fn discard_is_idempotent() {
    let repo = TestRepo::new().expect("repo");
    let agent = repo.agent("discard").expect("agent");
    agent
        .commit_file("feature.txt", "hello\n", "add feature")
        .expect("commit");
    let changeset = id("run_discard");
    repo.quarantine(&agent, &changeset).expect("quarantine");
    let git = repo.git();
    let head_before = repo.head().expect("head");

    let first = discard(&git, &changeset).expect("discard");
    assert!(first.existed);
    assert!(!git.branch_exists("ferry/job-run_discard").expect("branch exists"));

    let second = discard(&git, &changeset).expect("discard again");
    assert!(!second.existed);
    assert_eq!(repo.head().expect("head"), head_before);
    assert!(!repo.root().join("feature.txt").exists());
}

#[test]
fn stats_cover_every_change_kind_and_skip_binary_line_counts() {
    let repo = TestRepo::new().expect("repo");
    repo.commit_file("old.txt", "gone soon\n", "add old")
        .expect("commit");
    let agent = repo.agent("stats").expect("agent");
    agent.write("README.md", "base\nmore\n").expect("write");
    agent.write("notes.txt", "a\nb\n").expect("write");
    fs::write(agent.root().join("logo.bin"), [0u8, 159, 146, 150, 0, 255]).expect("write binary");
    agent.commit("first batch").expect("commit");
    agent.remove("old.txt").expect("remove");
    agent.commit("drop old").expect("commit");
    let changeset = id("run_stats");
    repo.quarantine(&agent, &changeset).expect("quarantine");
    let git = repo.git();

    let summary = summarize::summary(&git, &changeset).expect("summary");
    assert_eq!(summary.commits, 2);
    assert_eq!(
        summary.files_added,
        vec!["logo.bin".to_string(), "notes.txt".to_string()]
    );
    assert_eq!(summary.files_modified, vec!["README.md".to_string()]);
    assert_eq!(summary.files_deleted, vec!["old.txt".to_string()]);
    assert_eq!(summary.insertions, 3);
    assert_eq!(summary.deletions, 1);

    let log = summarize::log(&git, &changeset).expect("log");
    let messages: Vec<&str> = log.iter().map(|c| c.message.as_str()).collect();
    assert_eq!(messages, vec!["first batch", "drop old"]);
    assert_eq!(log[0].file_count, 3);
    assert_eq!(log[1].file_count, 1);

    let outcome = apply(&git, &changeset, ApplyOptions::default()).expect("apply");
    assert_eq!(outcome.commits, summary.commits);
    assert_eq!(outcome.files, summary.file_count());
    assert_eq!(outcome.insertions, summary.insertions);
    assert_eq!(outcome.deletions, summary.deletions);
}

#[test]
fn diff_shows_patch_text() {
    let repo = TestRepo::new().expect("repo");
    let agent = repo.agent("diff").expect("agent");
    agent
        .commit_file("feature.txt", "hello\n", "add feature")
        .expect("commit");
    let changeset = id("run_diff");
    repo.quarantine(&agent, &changeset).expect("quarantine");

    let view = summarize::diff(&repo.git(), &changeset).expect("diff");

    let DiffView::Full { summary, diff } = view else {
        panic!("expected full diff, got {view:?}");
    };
    assert_eq!(summary.files_added, vec!["feature.txt".to_string()]);
    assert!(diff.contains("+hello"));
}

#[test]
fn oversized_diff_degrades_to_stats() {
    let repo = TestRepo::new().expect("repo");
    let agent = repo.agent("big").expect("agent");
    agent
        .commit_file("big.txt", &"line\n".repeat(200), "add big file")
        .expect("commit");
    let changeset = id("run_big");
    repo.quarantine(&agent, &changeset).expect("quarantine");
    let git = repo
        .git()
        .with_diff_limits(64, std::time::Duration::from_secs(30));

    let view = summarize::diff(&git, &changeset).expect("diff");

    let DiffView::StatsOnly { summary, notice } = view else {
        panic!("expected stats-only view, got {view:?}");
    };
    assert_eq!(summary.insertions, 200);
    assert!(notice.contains("64 bytes"));
}

#[test]
fn diff_without_fetch_reports_missing_branch() {
    let repo = TestRepo::new().expect("repo");
    let err = summarize::diff(&repo.git(), &id("run_nothing")).expect_err("missing");
    assert_eq!(err.tag(), "branch_not_found");
}
