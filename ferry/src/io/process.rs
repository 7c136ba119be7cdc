//! Bounded subprocess capture for commands whose output can be huge.
//!
//! `git diff` on a large changeset can print far more than we are willing to
//! hold in memory. Output beyond the limit is drained and counted but not kept,
//! so the caller can tell a complete capture from a cut-off one.

use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// Output of a bounded capture.
#[derive(Debug)]
pub struct BoundedOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Stdout bytes discarded past the limit.
    pub stdout_dropped: usize,
    pub timed_out: bool,
}

impl BoundedOutput {
    /// True if stdout did not fit within the limit.
    pub fn overflowed(&self) -> bool {
        self.stdout_dropped > 0
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

/// Run `cmd` with a timeout, keeping at most `limit_bytes` of stdout and stderr.
///
/// Both pipes are drained on reader threads while the child runs, so a chatty
/// child can never block on a full pipe.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), limit_bytes))]
pub fn run_bounded(mut cmd: Command, timeout: Duration, limit_bytes: usize) -> Result<BoundedOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().context("spawn command")?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_limited(stdout, limit_bytes));
    let stderr_handle = thread::spawn(move || read_limited(stderr, limit_bytes));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let (stdout, stdout_dropped) = join_reader(stdout_handle).context("join stdout")?;
    let (stderr, _) = join_reader(stderr_handle).context("join stderr")?;

    if stdout_dropped > 0 {
        debug!(stdout_dropped, "stdout exceeded limit");
    }
    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(BoundedOutput {
        status,
        stdout,
        stderr,
        stdout_dropped,
        timed_out,
    })
}

fn join_reader(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut dropped = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(buf.len());
        let keep = n.min(room);
        buf.extend_from_slice(&chunk[..keep]);
        dropped += n - keep;
    }

    Ok((buf, dropped))
}
