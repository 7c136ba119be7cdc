//! Changeset identity and quarantine branch naming.

use std::fmt;

/// Namespace prefix for every branch ferry creates.
pub const BRANCH_NAMESPACE: &str = "ferry";

/// Literal prefix that marks a job id. Anything else is a session id.
pub const JOB_ID_PREFIX: &str = "run_";

/// Length of a full (hyphenated) session UUID. Shorter session ids are abbreviations.
pub const FULL_SESSION_ID_LEN: usize = 36;

/// One unit of remote agent work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChangesetId {
    Job(String),
    Session(String),
}

impl ChangesetId {
    /// Classify a raw id by prefix. Surrounding whitespace is ignored.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() || raw.chars().any(|ch| ch.is_whitespace() || ch == '/') {
            return None;
        }
        if raw.starts_with(JOB_ID_PREFIX) {
            Some(Self::Job(raw.to_string()))
        } else {
            Some(Self::Session(raw.to_string()))
        }
    }

    pub fn raw(&self) -> &str {
        match self {
            Self::Job(id) | Self::Session(id) => id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Job(_) => "job",
            Self::Session(_) => "session",
        }
    }

    /// Quarantine branch that holds this changeset's commits.
    pub fn branch_name(&self) -> String {
        format!("{}/{}-{}", BRANCH_NAMESPACE, self.kind(), self.raw())
    }

    /// Session ids shorter than a full UUID need resolving before use.
    pub fn is_abbreviated(&self) -> bool {
        match self {
            Self::Job(_) => false,
            Self::Session(id) => id.len() < FULL_SESSION_ID_LEN,
        }
    }

    /// Same namespace, different raw id.
    pub fn with_raw(&self, raw: impl Into<String>) -> Self {
        match self {
            Self::Job(_) => Self::Job(raw.into()),
            Self::Session(_) => Self::Session(raw.into()),
        }
    }
}

impl fmt::Display for ChangesetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.raw())
    }
}

/// Branch prefix matching every session whose id starts with `prefix`.
pub fn session_branch_prefix(prefix: &str) -> String {
    format!("{BRANCH_NAMESPACE}/session-{prefix}")
}

/// Inverse of [`ChangesetId::branch_name`].
pub fn id_from_branch(branch: &str) -> Option<ChangesetId> {
    let rest = branch.strip_prefix(BRANCH_NAMESPACE)?.strip_prefix('/')?;
    if let Some(raw) = rest.strip_prefix("job-") {
        return Some(ChangesetId::Job(raw.to_string()));
    }
    rest.strip_prefix("session-")
        .map(|raw| ChangesetId::Session(raw.to_string()))
}
