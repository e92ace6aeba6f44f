//! In-memory version store for testing and development.
//!
//! [`MemoryRemote`] plays the part of the hosted repository and
//! [`MemoryWorkingCopy`] the per-run clone. Clones see the remote as it was
//! when they connected, and a push only succeeds if the remote branch has
//! not moved since, just like a non-fast-forward rejection.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::validate_path;
use crate::error::{StoreError, StoreResult};
use crate::traits::store::{CommitAuthor, RemoteBranch, StoreConnector, VersionStore};
use crate::types::snapshot::content_hash;

type Files = BTreeMap<String, Vec<u8>>;

#[derive(Debug, Clone, Default)]
struct RemoteBranchState {
    head: String,
    files: Files,

    /// Commit messages, oldest first
    log: Vec<String>,
}

#[derive(Debug, Default)]
struct RemoteState {
    branches: BTreeMap<String, RemoteBranchState>,
    merged: BTreeSet<String>,
    pushes: Vec<String>,
    reject_next_push: bool,
    unavailable: bool,
    connections: usize,
}

/// Shared in-process remote. Clones share state with the original.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    state: Arc<RwLock<RemoteState>>,
}

impl MemoryRemote {
    /// Create an empty remote with no branches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a file directly on a remote branch, creating the branch if
    /// needed. Moves the branch head, as if someone else had pushed.
    pub fn seed_file(&self, branch: &str, path: &str, contents: impl Into<Vec<u8>>) {
        let mut state = self.state.write().unwrap();
        let entry = state.branches.entry(branch.to_string()).or_default();
        entry.files.insert(path.to_string(), contents.into());
        let message = format!("seed {}", path);
        entry.head = commit_id(&entry.head, &message, &entry.files);
        entry.log.push(message);
    }

    /// Create a remote branch as a copy of `from`.
    pub fn create_remote_branch(&self, name: &str, from: &str) {
        let mut state = self.state.write().unwrap();
        let copy = state.branches.get(from).cloned().unwrap_or_default();
        state.branches.insert(name.to_string(), copy);
    }

    /// Mark a branch as merged into the canonical branch.
    pub fn mark_merged(&self, name: &str) {
        self.state.write().unwrap().merged.insert(name.to_string());
    }

    /// Make the next push fail with a rejection.
    pub fn reject_next_push(&self) {
        self.state.write().unwrap().reject_next_push = true;
    }

    /// Make `connect` fail until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.write().unwrap().unavailable = unavailable;
    }

    pub fn file(&self, branch: &str, path: &str) -> Option<Vec<u8>> {
        self.state
            .read()
            .unwrap()
            .branches
            .get(branch)
            .and_then(|b| b.files.get(path).cloned())
    }

    pub fn head(&self, branch: &str) -> Option<String> {
        self.state
            .read()
            .unwrap()
            .branches
            .get(branch)
            .map(|b| b.head.clone())
    }

    /// Commit messages on a branch, oldest first.
    pub fn log(&self, branch: &str) -> Vec<String> {
        self.state
            .read()
            .unwrap()
            .branches
            .get(branch)
            .map(|b| b.log.clone())
            .unwrap_or_default()
    }

    pub fn branches(&self) -> Vec<String> {
        self.state.read().unwrap().branches.keys().cloned().collect()
    }

    /// Branches pushed so far, in push order.
    pub fn pushes(&self) -> Vec<String> {
        self.state.read().unwrap().pushes.clone()
    }

    pub fn push_count(&self) -> usize {
        self.state.read().unwrap().pushes.len()
    }

    /// Number of working copies handed out.
    pub fn connection_count(&self) -> usize {
        self.state.read().unwrap().connections
    }
}

#[async_trait]
impl StoreConnector for MemoryRemote {
    type Store = MemoryWorkingCopy;

    async fn connect(&self) -> StoreResult<MemoryWorkingCopy> {
        let mut state = self.state.write().unwrap();
        if state.unavailable {
            return Err(StoreError::Unavailable("memory remote is offline".to_string()));
        }
        state.connections += 1;

        Ok(MemoryWorkingCopy {
            remote: self.clone(),
            remote_branches: state.branches.clone(),
            merged: state.merged.clone(),
            local: BTreeMap::new(),
            current: None,
            worktree: Files::new(),
            staged: BTreeSet::new(),
        })
    }
}

#[derive(Debug, Clone, Default)]
struct LocalBranch {
    head: Option<String>,
    files: Files,
    log: Vec<String>,

    /// Remote head this branch was last synced with
    upstream: Option<String>,
}

/// A clone of a [`MemoryRemote`] taken at connect time.
#[derive(Debug)]
pub struct MemoryWorkingCopy {
    remote: MemoryRemote,
    remote_branches: BTreeMap<String, RemoteBranchState>,
    merged: BTreeSet<String>,
    local: BTreeMap<String, LocalBranch>,
    current: Option<String>,
    worktree: Files,
    staged: BTreeSet<String>,
}

impl MemoryWorkingCopy {
    fn current_local(&self) -> StoreResult<&LocalBranch> {
        self.current
            .as_ref()
            .and_then(|name| self.local.get(name))
            .ok_or_else(|| StoreError::UnknownRef("HEAD".to_string()))
    }

    fn switch_to(&mut self, name: &str) {
        if let Some(branch) = self.local.get(name) {
            self.worktree = branch.files.clone();
        }
        self.staged.clear();
        self.current = Some(name.to_string());
    }
}

#[async_trait]
impl VersionStore for MemoryWorkingCopy {
    async fn checkout(&mut self, reference: &str) -> StoreResult<()> {
        if !self.local.contains_key(reference) {
            let branch = match self.remote_branches.get(reference) {
                Some(remote) => LocalBranch {
                    head: Some(remote.head.clone()),
                    files: remote.files.clone(),
                    log: remote.log.clone(),
                    upstream: Some(remote.head.clone()),
                },
                None if self.remote_branches.is_empty() && self.local.is_empty() => {
                    LocalBranch::default()
                }
                None => return Err(StoreError::UnknownRef(reference.to_string())),
            };
            self.local.insert(reference.to_string(), branch);
        }

        self.switch_to(reference);
        Ok(())
    }

    async fn current_branch(&self) -> StoreResult<Option<String>> {
        Ok(self.current.clone())
    }

    async fn list_remote_branches(&self) -> StoreResult<Vec<RemoteBranch>> {
        Ok(self
            .remote_branches
            .keys()
            .map(|name| RemoteBranch {
                name: name.clone(),
                merged: self.merged.contains(name),
            })
            .collect())
    }

    async fn create_branch(&mut self, name: &str, checkout: bool) -> StoreResult<()> {
        if self.local.contains_key(name) {
            return Err(StoreError::Command {
                command: format!("branch {}", name),
                stderr: format!("a branch named '{}' already exists", name),
            });
        }

        let base = self.current_local()?;
        let branch = LocalBranch {
            head: base.head.clone(),
            files: base.files.clone(),
            log: base.log.clone(),
            upstream: None,
        };
        self.local.insert(name.to_string(), branch);

        if checkout {
            // Uncommitted changes carry over to the new branch
            let staged = std::mem::take(&mut self.staged);
            let worktree = std::mem::take(&mut self.worktree);
            self.current = Some(name.to_string());
            self.staged = staged;
            self.worktree = worktree;
        }
        Ok(())
    }

    async fn read_file(&self, path: &str) -> StoreResult<Option<Vec<u8>>> {
        validate_path(path)?;
        Ok(self.worktree.get(path).cloned())
    }

    async fn write_file(&mut self, path: &str, contents: &[u8]) -> StoreResult<()> {
        validate_path(path)?;
        self.worktree.insert(path.to_string(), contents.to_vec());
        Ok(())
    }

    async fn stage(&mut self, path: &str) -> StoreResult<()> {
        validate_path(path)?;
        let tracked = self.current_local()?.files.contains_key(path);
        if !tracked && !self.worktree.contains_key(path) {
            return Err(StoreError::Command {
                command: format!("add {}", path),
                stderr: format!("pathspec '{}' did not match any files", path),
            });
        }
        self.staged.insert(path.to_string());
        Ok(())
    }

    async fn commit(
        &mut self,
        message: &str,
        _author: &CommitAuthor,
    ) -> StoreResult<Option<String>> {
        let branch = self.current_local()?;
        let parent = branch.head.clone().unwrap_or_default();

        let mut files = branch.files.clone();
        for path in &self.staged {
            match self.worktree.get(path) {
                Some(contents) => {
                    files.insert(path.clone(), contents.clone());
                }
                None => {
                    files.remove(path);
                }
            }
        }

        let unchanged = files == branch.files;
        if unchanged {
            self.staged.clear();
            return Ok(None);
        }

        let id = commit_id(&parent, message, &files);

        let name = self.current.clone().unwrap_or_default();
        if let Some(branch) = self.local.get_mut(&name) {
            branch.head = Some(id.clone());
            branch.files = files;
            branch.log.push(message.to_string());
        }
        self.staged.clear();

        Ok(Some(id))
    }

    async fn push(&mut self, branch: &str) -> StoreResult<()> {
        let local = self
            .local
            .get(branch)
            .cloned()
            .ok_or_else(|| StoreError::UnknownRef(branch.to_string()))?;
        let head = local
            .head
            .clone()
            .ok_or_else(|| StoreError::UnknownRef(branch.to_string()))?;

        {
            let mut state = self.remote.state.write().unwrap();

            if state.reject_next_push {
                state.reject_next_push = false;
                return Err(StoreError::PushRejected {
                    branch: branch.to_string(),
                    reason: "remote rejected the update".to_string(),
                });
            }

            let remote_head = state.branches.get(branch).map(|b| b.head.clone());
            if remote_head.is_some() && remote_head != local.upstream {
                return Err(StoreError::PushRejected {
                    branch: branch.to_string(),
                    reason: "non-fast-forward: remote contains work you do not have".to_string(),
                });
            }

            state.branches.insert(
                branch.to_string(),
                RemoteBranchState {
                    head: head.clone(),
                    files: local.files.clone(),
                    log: local.log.clone(),
                },
            );
            state.pushes.push(branch.to_string());
        }

        if let Some(local) = self.local.get_mut(branch) {
            local.upstream = Some(head);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

fn commit_id(parent: &str, message: &str, files: &Files) -> String {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(parent.as_bytes());
    bytes.push(0);
    bytes.extend_from_slice(message.as_bytes());
    for (path, contents) in files {
        bytes.push(0);
        bytes.extend_from_slice(path.as_bytes());
        bytes.push(0);
        bytes.extend_from_slice(contents);
    }
    content_hash(&bytes)[..12].to_string()
}
