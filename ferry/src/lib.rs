//! Fetch, review, and apply remote agent changes as local git history.
//!
//! A remote job or session produces a git bundle. Ferry downloads it, verifies
//! it, and parks its commits on a quarantine branch (`ferry/job-<id>` or
//! `ferry/session-<id>`) where they can be inspected, merged, or thrown away.
//!
//! - **[`core`]**: Pure logic (id classification, branch naming, diff parsing).
//! - **[`io`]**: Side effects (git subprocesses, HTTP, config file).
//!
//! The orchestration modules ([`transport`], [`reconcile`], [`summarize`],
//! [`workspace`]) sequence the two, and [`report`] renders their results.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod reconcile;
pub mod report;
pub mod resolve;
pub mod summarize;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod transport;
pub mod workspace;
