//! Turning user-supplied ids into full changeset ids.
//!
//! Ids are classified once at the entry point. Abbreviated session ids are then
//! expanded either against local quarantine branches (commands that never
//! touch the network) or against the remote API (fetch and pull).

use anyhow::anyhow;
use tracing::debug;

use crate::core::changeset::{ChangesetId, id_from_branch, session_branch_prefix};
use crate::error::{FerryError, Result};
use crate::io::api::ChangesetApi;
use crate::io::git::GitAdapter;

/// Classify a raw id, rejecting ones that cannot name a branch.
pub fn parse_id(raw: &str) -> Result<ChangesetId> {
    ChangesetId::parse(raw)
        .ok_or_else(|| FerryError::Internal(anyhow!("invalid changeset id '{raw}'")))
}

/// Expand an abbreviated session id using existing quarantine branches.
///
/// One match resolves; no match leaves the id unchanged (so the caller reports
/// a missing branch, or discard no-ops); several matches are ambiguous.
pub fn resolve_local<G: GitAdapter>(git: &G, id: ChangesetId) -> Result<ChangesetId> {
    if !id.is_abbreviated() {
        return Ok(id);
    }
    if git.branch_exists(&id.branch_name())? {
        return Ok(id);
    }
    let branches = git.branches_with_prefix(&session_branch_prefix(id.raw()))?;
    let mut matches: Vec<ChangesetId> = branches
        .iter()
        .filter_map(|branch| id_from_branch(branch))
        .collect();
    match matches.len() {
        0 => Ok(id),
        1 => {
            let resolved = matches.remove(0);
            debug!(prefix = %id, resolved = %resolved, "resolved id from local branch");
            Ok(resolved)
        }
        _ => Err(FerryError::AmbiguousId {
            prefix: id.raw().to_string(),
            matches: matches.iter().map(|m| m.raw().to_string()).collect(),
        }),
    }
}

/// Expand an abbreviated session id through the remote API.
pub async fn resolve_remote<A: ChangesetApi + ?Sized>(api: &A, id: ChangesetId) -> Result<ChangesetId> {
    if !id.is_abbreviated() {
        return Ok(id);
    }
    let full = api.resolve_session_prefix(id.raw()).await?;
    debug!(prefix = %id, resolved = %full, "resolved id from remote");
    Ok(id.with_raw(full))
}
