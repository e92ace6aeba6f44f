//! Publication coordinator: branch resolution, stage, commit and push.
//!
//! One [`Publisher`] drives one run through
//! `Idle → BranchResolved → Staged → Committed → Pushed → Done`. Any failing
//! step moves it to `Failed` and surfaces the error immediately. Local
//! mutations are not rolled back; the working copy is owned by the
//! publisher and discarded with it, and the next run starts from a fresh
//! clone.
//!
//! The working copy is not synchronized. Callers must not run two
//! publishers for the same data type at the same time; the push is the only
//! cross-process check and a lost race comes back as a retryable
//! [`PublicationError::PushRejected`].

use std::collections::BTreeSet;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, error, info};

use crate::error::{PublicationError, RepositoryLoadError};
use crate::traits::store::{CommitAuthor, RemoteBranch, VersionStore};
use crate::types::decision::ApprovalDecision;
use crate::types::diff::DiffResult;
use crate::types::publication::{PublicationReceipt, PublicationState, PublicationTarget};
use crate::types::snapshot::{content_hash, Snapshot};
use crate::types::version::{VersionHistory, VersionRecord};

/// Path of the version index inside the store.
pub const VERSIONS_PATH: &str = "versions.json";

/// Path of the published snapshot for a data type.
pub fn snapshot_path(data_type: &str) -> String {
    format!("current/{}.json", data_type)
}

/// Settings shared by every run.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Integration branch auto-publishable changes go to
    pub canonical_branch: String,

    pub author: CommitAuthor,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            canonical_branch: "main".to_string(),
            author: CommitAuthor::default(),
        }
    }
}

impl PublisherConfig {
    pub fn new(canonical_branch: impl Into<String>) -> Self {
        Self {
            canonical_branch: canonical_branch.into(),
            ..Default::default()
        }
    }

    pub fn with_author(mut self, author: CommitAuthor) -> Self {
        self.author = author;
        self
    }
}

/// Find an unmerged branch already awaiting review for `data_type`.
///
/// Branch names are `<dataType>_<ms since epoch>`; when several are open the
/// newest wins. Branches in `retired` belong to closed review requests and
/// are never picked.
pub fn find_pending_branch(
    branches: &[RemoteBranch],
    data_type: &str,
    canonical_branch: &str,
    retired: &BTreeSet<String>,
) -> Option<String> {
    let prefix = format!("{}_", data_type);

    branches
        .iter()
        .filter(|b| !b.merged && b.name != canonical_branch && !retired.contains(&b.name))
        .filter_map(|b| {
            let rank = b.name.strip_prefix(&prefix)?.parse::<u64>().ok()?;
            Some((rank, b.name.as_str()))
        })
        .max()
        .map(|(_, name)| name.to_string())
}

/// Drives one run's publication through the version store.
pub struct Publisher<S: VersionStore> {
    store: S,
    config: PublisherConfig,
    data_type: String,
    run_started_at: DateTime<Utc>,
    pending_branch: Option<String>,
    state: PublicationState,
    target: Option<PublicationTarget>,
    staged: Option<VersionRecord>,
    commit_id: Option<String>,
}

impl<S: VersionStore> Publisher<S> {
    /// Take ownership of a fresh working copy for one run.
    ///
    /// Looks for a branch already awaiting review for this data type and, if
    /// there is one, checks it out so the published state is read from it.
    pub async fn open(
        store: S,
        config: PublisherConfig,
        data_type: impl Into<String>,
        run_started_at: DateTime<Utc>,
    ) -> Result<Self, RepositoryLoadError> {
        Self::open_excluding(store, config, data_type, run_started_at, &BTreeSet::new()).await
    }

    /// Like [`Publisher::open`], but never reuses a branch in `retired`.
    pub async fn open_excluding(
        mut store: S,
        config: PublisherConfig,
        data_type: impl Into<String>,
        run_started_at: DateTime<Utc>,
        retired: &BTreeSet<String>,
    ) -> Result<Self, RepositoryLoadError> {
        let data_type = data_type.into();

        let branches = store.list_remote_branches().await?;
        let pending_branch =
            find_pending_branch(&branches, &data_type, &config.canonical_branch, retired);
        if !retired.is_empty() {
            debug!(data_type = %data_type, retired = retired.len(), "Skipping retired review branches");
        }

        match &pending_branch {
            Some(branch) => {
                store.checkout(branch).await?;
                info!(
                    data_type = %data_type,
                    branch = %branch,
                    "Existing review branch found, using it"
                );
            }
            None => {
                store.checkout(&config.canonical_branch).await?;
                debug!(data_type = %data_type, "No pending review branch");
            }
        }

        Ok(Self {
            store,
            config,
            data_type,
            run_started_at,
            pending_branch,
            state: PublicationState::Idle,
            target: None,
            staged: None,
            commit_id: None,
        })
    }

    pub fn state(&self) -> PublicationState {
        self.state
    }

    pub fn data_type(&self) -> &str {
        &self.data_type
    }

    pub fn pending_branch(&self) -> Option<&str> {
        self.pending_branch.as_deref()
    }

    pub fn target(&self) -> Option<&PublicationTarget> {
        self.target.as_ref()
    }

    pub fn commit_id(&self) -> Option<&str> {
        self.commit_id.as_deref()
    }

    /// Version index on the checked-out branch. Missing means empty.
    pub async fn load_history(&self) -> Result<VersionHistory, RepositoryLoadError> {
        match self.store.read_file(VERSIONS_PATH).await? {
            None => Ok(VersionHistory::default()),
            Some(bytes) => VersionHistory::from_json(&bytes).map_err(|source| {
                RepositoryLoadError::CorruptHistory {
                    path: VERSIONS_PATH.to_string(),
                    source,
                }
            }),
        }
    }

    /// Raw bytes of the published snapshot file, if any.
    pub async fn load_current_bytes(&self) -> Result<Option<Vec<u8>>, RepositoryLoadError> {
        Ok(self.store.read_file(&snapshot_path(&self.data_type)).await?)
    }

    /// Published snapshot on the checked-out branch. Missing means empty.
    pub async fn load_current(&self) -> Result<Snapshot, RepositoryLoadError> {
        let path = snapshot_path(&self.data_type);
        match self.store.read_file(&path).await? {
            None => Ok(Snapshot::default()),
            Some(bytes) => Snapshot::from_json(&bytes)
                .map_err(|source| RepositoryLoadError::CorruptSnapshot { path, source }),
        }
    }

    /// Choose the branch this run publishes to.
    ///
    /// A pending review branch is sticky. Otherwise auto-publishable changes
    /// go to the canonical branch and everything else to a new
    /// `<dataType>_<run start ms>` branch.
    pub fn resolve_branch(
        &mut self,
        decision: &ApprovalDecision,
    ) -> Result<PublicationTarget, PublicationError> {
        self.require_state(PublicationState::Idle, "resolve branch")?;

        let target = match &self.pending_branch {
            Some(branch) => PublicationTarget::Pending(branch.clone()),
            None if decision.auto_publishable => {
                PublicationTarget::Canonical(self.config.canonical_branch.clone())
            }
            None => PublicationTarget::Review(PublicationTarget::review_branch_name(
                &self.data_type,
                self.run_started_at,
            )),
        };

        info!(
            data_type = %self.data_type,
            branch = %target,
            auto_publishable = decision.auto_publishable,
            "Selected branch based on approval requirements"
        );

        self.target = Some(target.clone());
        self.state = PublicationState::BranchResolved;
        Ok(target)
    }

    /// Write the next snapshot and the updated version index, and stage both.
    pub async fn stage(
        &mut self,
        next: &Snapshot,
        diff: &DiffResult,
        now: DateTime<Utc>,
    ) -> Result<VersionRecord, PublicationError> {
        self.require_state(PublicationState::BranchResolved, "stage")?;
        let result = self.try_stage(next, diff, now).await;
        let record = self.settle(result)?;

        self.staged = Some(record.clone());
        self.state = PublicationState::Staged;
        Ok(record)
    }

    async fn try_stage(
        &mut self,
        next: &Snapshot,
        diff: &DiffResult,
        now: DateTime<Utc>,
    ) -> Result<VersionRecord, PublicationError> {
        let target = self.resolved_target()?;
        let branch = target.branch().to_string();

        if self.store.current_branch().await?.as_deref() != Some(branch.as_str()) {
            match target {
                PublicationTarget::Review(_) => self.store.create_branch(&branch, true).await?,
                _ => self.store.checkout(&branch).await?,
            }
            info!(branch = %branch, "Switched to target branch");
        }

        let bytes = next.to_canonical_json()?;
        let record = VersionRecord {
            timestamp: now,
            content_hash: content_hash(&bytes),
            changed_ids: diff.changed_ids(),
        };

        let data_path = snapshot_path(&self.data_type);
        self.store.write_file(&data_path, &bytes).await?;
        debug!(path = %data_path, "Updated data file");

        let mut history = match self.store.read_file(VERSIONS_PATH).await? {
            Some(existing) => VersionHistory::from_json(&existing)?,
            None => VersionHistory::default(),
        };
        history.record(&self.data_type, record.clone());
        self.store
            .write_file(VERSIONS_PATH, &history.to_json()?)
            .await?;
        debug!(path = VERSIONS_PATH, "Updated versions file");

        self.store.stage(&data_path).await?;
        self.store.stage(VERSIONS_PATH).await?;
        info!(branch = %branch, changed = record.changed_ids.len(), "Staged changes");

        Ok(record)
    }

    /// Commit the staged files. A commit that would change nothing fails.
    pub async fn commit(&mut self) -> Result<String, PublicationError> {
        self.require_state(PublicationState::Staged, "commit")?;
        let result = self.try_commit().await;
        let commit = self.settle(result)?;

        self.commit_id = Some(commit.clone());
        self.state = PublicationState::Committed;
        Ok(commit)
    }

    async fn try_commit(&mut self) -> Result<String, PublicationError> {
        let branch = self.resolved_target()?.branch().to_string();
        let timestamp = self
            .staged
            .as_ref()
            .map(|record| record.timestamp)
            .unwrap_or_else(Utc::now);
        let message = format!(
            "update in {} ({})",
            self.data_type,
            timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
        );

        match self.store.commit(&message, &self.config.author).await? {
            Some(commit) => {
                info!(branch = %branch, commit = %commit, "Committed changes");
                Ok(commit)
            }
            None => Err(PublicationError::NothingToCommit { branch }),
        }
    }

    /// Push the target branch under the same name.
    pub async fn push(&mut self) -> Result<(), PublicationError> {
        self.require_state(PublicationState::Committed, "push")?;
        let result = match self.resolved_target() {
            Ok(target) => {
                let branch = target.branch().to_string();
                self.store
                    .push(&branch)
                    .await
                    .map_err(PublicationError::from)
                    .map(|()| branch)
            }
            Err(err) => Err(err),
        };
        let branch = self.settle(result)?;

        info!(branch = %branch, "Changes pushed to repository");
        self.state = PublicationState::Pushed;
        Ok(())
    }

    /// Complete the run and release the working copy.
    pub fn finish(mut self) -> Result<PublicationReceipt, PublicationError> {
        self.require_state(PublicationState::Pushed, "finish")?;

        let (Some(target), Some(commit), Some(version)) =
            (self.target.take(), self.commit_id.take(), self.staged.take())
        else {
            return Err(self.invalid("finish"));
        };

        self.state = PublicationState::Done;
        Ok(PublicationReceipt {
            target,
            commit,
            version,
        })
    }

    /// Stage, commit, push and finish in one call.
    pub async fn publish(
        mut self,
        next: &Snapshot,
        diff: &DiffResult,
        now: DateTime<Utc>,
    ) -> Result<PublicationReceipt, PublicationError> {
        self.stage(next, diff, now).await?;
        self.commit().await?;
        self.push().await?;
        self.finish()
    }

    fn resolved_target(&self) -> Result<PublicationTarget, PublicationError> {
        self.target.clone().ok_or_else(|| self.invalid("use target"))
    }

    /// Out-of-order calls fail the publication.
    fn require_state(
        &mut self,
        expected: PublicationState,
        operation: &'static str,
    ) -> Result<(), PublicationError> {
        if self.state == expected {
            return Ok(());
        }
        let err = self.invalid(operation);
        self.settle(Err(err))
    }

    fn invalid(&self, operation: &'static str) -> PublicationError {
        PublicationError::InvalidTransition {
            state: self.state,
            operation,
        }
    }

    /// Move to `Failed` if `result` is an error.
    fn settle<T>(&mut self, result: Result<T, PublicationError>) -> Result<T, PublicationError> {
        if let Err(err) = &result {
            error!(
                data_type = %self.data_type,
                state = ?self.state,
                error = %err,
                retryable = err.is_retryable(),
                "Publication failed"
            );
            self.state = PublicationState::Failed;
        }
        result
    }
}
