//! Version store contract.
//!
//! A [`StoreConnector`] hands out one [`VersionStore`] working copy per run.
//! The working copy is owned by the run and dropped when it ends, so a
//! failed run never leaves state behind for the next one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// A branch as seen on the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBranch {
    pub name: String,

    /// Whether the branch is already merged into the canonical branch
    pub merged: bool,
}

impl RemoteBranch {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            merged: false,
        }
    }

    pub fn merged(mut self) -> Self {
        self.merged = true;
        self
    }
}

/// Identity recorded on commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
}

impl CommitAuthor {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

impl Default for CommitAuthor {
    fn default() -> Self {
        Self::new("catalog-sync", "catalog-sync@users.noreply.github.com")
    }
}

/// A local working copy of the versioned data repository.
///
/// Paths are relative to the repository root and use `/` separators.
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Switch to an existing local or remote branch.
    async fn checkout(&mut self, reference: &str) -> StoreResult<()>;

    /// Name of the checked-out branch, `None` when detached.
    async fn current_branch(&self) -> StoreResult<Option<String>>;

    /// Branches present on the remote.
    async fn list_remote_branches(&self) -> StoreResult<Vec<RemoteBranch>>;

    /// Create a branch at the current commit.
    async fn create_branch(&mut self, name: &str, checkout: bool) -> StoreResult<()>;

    /// Read a file from the working tree, `None` if it does not exist.
    async fn read_file(&self, path: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Overwrite a file in the working tree, creating parent directories.
    async fn write_file(&mut self, path: &str, contents: &[u8]) -> StoreResult<()>;

    /// Add a path to the next commit.
    async fn stage(&mut self, path: &str) -> StoreResult<()>;

    /// Commit staged changes. Returns `None` when nothing differs from HEAD.
    async fn commit(&mut self, message: &str, author: &CommitAuthor)
        -> StoreResult<Option<String>>;

    /// Push a local branch to the remote under the same name.
    async fn push(&mut self, branch: &str) -> StoreResult<()>;

    /// Store name for logging.
    fn name(&self) -> &str {
        "unknown"
    }
}

/// Acquires fresh working copies.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    type Store: VersionStore;

    /// Clone the remote into a new, independent working copy.
    async fn connect(&self) -> StoreResult<Self::Store>;
}
