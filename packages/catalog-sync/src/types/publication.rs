//! Publication targets and coordinator states.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::version::VersionRecord;

/// Branch chosen for one run's output. Resolved once, never changed mid-run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "branch", rename_all = "snake_case")]
pub enum PublicationTarget {
    /// The integration branch; the change publishes without review
    Canonical(String),

    /// A branch for this data type already awaiting review
    Pending(String),

    /// A fresh `<dataType>_<ms since epoch>` branch
    Review(String),
}

impl PublicationTarget {
    pub fn branch(&self) -> &str {
        match self {
            PublicationTarget::Canonical(b)
            | PublicationTarget::Pending(b)
            | PublicationTarget::Review(b) => b,
        }
    }

    pub fn is_canonical(&self) -> bool {
        matches!(self, PublicationTarget::Canonical(_))
    }

    /// Name of a fresh review branch for `data_type`.
    pub fn review_branch_name(data_type: &str, run_started_at: DateTime<Utc>) -> String {
        format!("{}_{}", data_type, run_started_at.timestamp_millis())
    }
}

impl fmt::Display for PublicationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.branch())
    }
}

/// Coordinator state for one run.
///
/// `Idle → BranchResolved → Staged → Committed → Pushed → Done`, with
/// `Failed` reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicationState {
    Idle,
    BranchResolved,
    Staged,
    Committed,
    Pushed,
    Done,
    Failed,
}

impl PublicationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PublicationState::Done | PublicationState::Failed)
    }
}

/// What a successful publication produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicationReceipt {
    pub target: PublicationTarget,
    pub commit: String,
    pub version: VersionRecord,
}
