//! Typed errors for the catalog-sync library.
//!
//! One enum per stage of a run, so callers can tell a fatal acquisition
//! failure from a retryable push rejection without string matching.

use thiserror::Error;

use crate::types::publication::PublicationState;

/// A snapshot document could not be read or written.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The document root is not a JSON object
    #[error("snapshot root must be an object")]
    NotAnObject,

    /// An entity maps to something other than an object of fields
    #[error("record {key} must be an object")]
    RecordNotAnObject { key: String },

    /// A field holds an array or object
    #[error("field {field} of record {key} is not a scalar")]
    NonScalarField { key: String, field: String },

    /// JSON parsing or serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Startup-time configuration problems.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Threshold is negative or not a finite number
    #[error("invalid threshold for {name}: {value}")]
    InvalidThreshold { name: String, value: f64 },

    /// Data type identifier has characters that would break branch naming
    #[error("invalid data type identifier: '{0}'")]
    InvalidDataType(String),

    /// Data type was registered twice
    #[error("data type already registered: '{0}'")]
    DuplicateDataType(String),

    /// Data type has no registered source
    #[error("unknown data type: '{0}'")]
    UnknownDataType(String),
}

/// Fetching or parsing a new snapshot failed. Fatal for the run.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// Transport-level failure talking to the upstream
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Upstream answered with a non-success status
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    /// All retry attempts failed
    #[error("gave up on {url} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    /// Document did not have the expected structure
    #[error("parse error: {reason}")]
    Parse { reason: String },

    /// Parsed data does not form a valid snapshot
    #[error("invalid snapshot: {0}")]
    Snapshot(#[from] SnapshotError),

    /// Source-specific failure
    #[error("source error: {0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Low-level version store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A git invocation exited unsuccessfully
    #[error("git {command} failed: {stderr}")]
    Command { command: String, stderr: String },

    /// The remote refused the push (usually non-fast-forward)
    #[error("push of {branch} rejected: {reason}")]
    PushRejected { branch: String, reason: String },

    /// Branch or commit does not exist
    #[error("unknown reference: {0}")]
    UnknownRef(String),

    /// Path escapes the working copy
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Remote URL could not be parsed
    #[error("invalid remote URL: {0}")]
    InvalidRemote(String),

    /// Connection to the remote is unavailable
    #[error("remote unavailable: {0}")]
    Unavailable(String),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Loading the version store at the start of a run failed. Fatal.
#[derive(Debug, Error)]
pub enum RepositoryLoadError {
    /// Clone, branch listing or checkout failed
    #[error("failed to load repository: {0}")]
    Store(#[from] StoreError),

    /// The published snapshot file is unreadable
    #[error("published snapshot {path} is invalid: {source}")]
    CorruptSnapshot {
        path: String,
        #[source]
        source: SnapshotError,
    },

    /// The versions index is unreadable
    #[error("version history {path} is invalid: {source}")]
    CorruptHistory {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Staging, committing or pushing failed after a change was detected.
#[derive(Debug, Error)]
pub enum PublicationError {
    /// Operation called in the wrong state
    #[error("cannot {operation} while {state:?}")]
    InvalidTransition {
        state: PublicationState,
        operation: &'static str,
    },

    /// Staged content matched the branch head, so no commit was produced
    #[error("nothing to commit on {branch}: staged content is unchanged")]
    NothingToCommit { branch: String },

    /// A concurrent run pushed to the same branch first
    #[error("push of {branch} rejected: {reason}")]
    PushRejected { branch: String, reason: String },

    /// Any other version store failure
    #[error("version store error: {0}")]
    Store(#[source] StoreError),

    /// Snapshot could not be serialized
    #[error("snapshot serialization failed: {0}")]
    Snapshot(#[from] SnapshotError),

    /// Version history could not be read or written
    #[error("version history error: {0}")]
    History(#[from] serde_json::Error),
}

impl PublicationError {
    /// Whether a fresh run has a chance of succeeding without intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PublicationError::PushRejected { .. })
    }
}

impl From<StoreError> for PublicationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::PushRejected { branch, reason } => {
                PublicationError::PushRejected { branch, reason }
            }
            other => PublicationError::Store(other),
        }
    }
}

/// Creating, querying or commenting on a review request failed.
///
/// Never fatal: the branch is already pushed when the workflow runs.
#[derive(Debug, Error)]
pub enum ReviewWorkflowError {
    /// Network or client failure
    #[error("review surface request failed: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The review surface rejected the request
    #[error("review surface returned {status}: {message}")]
    Api { status: u16, message: String },
}

/// Failure of a whole run.
#[derive(Debug, Error)]
pub enum RunError {
    /// No source registered for the requested data type
    #[error("unknown data type: '{0}'")]
    UnknownDataType(String),

    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    RepositoryLoad(#[from] RepositoryLoadError),

    #[error(transparent)]
    Publication(#[from] PublicationError),
}

impl RunError {
    /// Whether the run failed because of a race with another run.
    pub fn is_retryable(&self) -> bool {
        match self {
            RunError::Publication(err) => err.is_retryable(),
            _ => false,
        }
    }
}

/// Result type alias for snapshot operations.
pub type SnapshotResult<T> = std::result::Result<T, SnapshotError>;

/// Result type alias for acquisition.
pub type AcquisitionResult<T> = std::result::Result<T, AcquisitionError>;

/// Result type alias for version store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for review surface operations.
pub type ReviewResult<T> = std::result::Result<T, ReviewWorkflowError>;
