//! Version store implementations.
//!
//! - `GitConnector` / `GitWorkingCopy` - temporary clones of a git remote
//! - `MemoryRemote` / `MemoryWorkingCopy` - in-process remote for tests

pub mod git;
pub mod memory;

use std::path::{Component, Path};

use crate::error::{StoreError, StoreResult};

pub use git::{GitConnector, GitCredentials, GitRemoteConfig, GitWorkingCopy};
pub use memory::{MemoryRemote, MemoryWorkingCopy};

/// Reject absolute paths and anything that climbs out of the working copy.
pub(crate) fn validate_path(path: &str) -> StoreResult<()> {
    let safe = !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if safe {
        Ok(())
    } else {
        Err(StoreError::InvalidPath(path.to_string()))
    }
}
