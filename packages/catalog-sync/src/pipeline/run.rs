//! One end-to-end run for a data type.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};

use super::classify::classify;
use super::diff::compare;
use super::publish::{find_pending_branch, Publisher, PublisherConfig};
use super::review::{ReviewOutcome, ReviewWorkflow};
use crate::error::{AcquisitionError, RepositoryLoadError, RunError};
use crate::sources::SourceRegistry;
use crate::traits::review::ReviewSurface;
use crate::traits::store::{StoreConnector, VersionStore};
use crate::types::config::ThresholdConfig;
use crate::types::publication::PublicationTarget;
use crate::types::snapshot::content_hash;

/// Summary of a published run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub data_type: String,
    pub target: PublicationTarget,
    pub commit: String,
    pub content_hash: String,
    pub added: usize,
    pub removed: usize,
    pub changed: usize,
    pub approvals_needed: Vec<String>,

    /// `None` when the review surface failed; the branch is pushed either way
    pub review: Option<ReviewOutcome>,
}

/// How a successful run ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The new snapshot equals the published one; nothing was written
    Unchanged {
        data_type: String,
        content_hash: String,
    },

    Published(RunReport),
}

impl RunOutcome {
    pub fn data_type(&self) -> &str {
        match self {
            RunOutcome::Unchanged { data_type, .. } => data_type,
            RunOutcome::Published(report) => &report.data_type,
        }
    }

    pub fn is_published(&self) -> bool {
        matches!(self, RunOutcome::Published(_))
    }
}

/// Wires acquisition, comparison, classification, publication and review.
///
/// Runs for different data types may proceed concurrently, each with its own
/// working copy. Runs for the same data type must be serialized by the
/// caller.
pub struct Pipeline<C: StoreConnector, R: ReviewSurface> {
    sources: SourceRegistry,
    connector: C,
    review: ReviewWorkflow<R>,
    thresholds: ThresholdConfig,
    publisher: PublisherConfig,
}

impl<C: StoreConnector, R: ReviewSurface> Pipeline<C, R> {
    pub fn new(
        sources: SourceRegistry,
        connector: C,
        review: ReviewWorkflow<R>,
        thresholds: ThresholdConfig,
        publisher: PublisherConfig,
    ) -> Self {
        Self {
            sources,
            connector,
            review,
            thresholds,
            publisher,
        }
    }

    pub fn sources(&self) -> &SourceRegistry {
        &self.sources
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn review(&self) -> &ReviewWorkflow<R> {
        &self.review
    }

    /// Run the pipeline for `data_type` starting now.
    pub async fn run(&self, data_type: &str) -> Result<RunOutcome, RunError> {
        self.run_at(data_type, Utc::now()).await
    }

    /// Run the pipeline with an explicit start time, which names any new
    /// review branch.
    pub async fn run_at(
        &self,
        data_type: &str,
        started_at: DateTime<Utc>,
    ) -> Result<RunOutcome, RunError> {
        let span = info_span!("run", data_type = %data_type);
        self.execute(data_type, started_at).instrument(span).await
    }

    async fn execute(
        &self,
        data_type: &str,
        started_at: DateTime<Utc>,
    ) -> Result<RunOutcome, RunError> {
        let source = self
            .sources
            .get(data_type)
            .ok_or_else(|| RunError::UnknownDataType(data_type.to_string()))?;

        info!(source = source.name(), "Acquiring snapshot");
        let next = source.acquire().await?;
        let bytes = next
            .to_canonical_json()
            .map_err(AcquisitionError::from)?;
        let next_hash = content_hash(&bytes);
        info!(entries = next.len(), hash = %next_hash, "Acquired snapshot");

        let store = self
            .connector
            .connect()
            .await
            .map_err(RepositoryLoadError::from)?;
        let retired = self.retired_branches(&store, data_type).await?;
        let mut publisher = Publisher::open_excluding(
            store,
            self.publisher.clone(),
            data_type,
            started_at,
            &retired,
        )
        .await?;

        let history = publisher.load_history().await?;
        let unchanged_hash = history.current_hash(data_type) == Some(next_hash.as_str());
        let unchanged_bytes =
            publisher.load_current_bytes().await?.as_deref() == Some(bytes.as_slice());
        if unchanged_hash || unchanged_bytes {
            info!(hash = %next_hash, "Data unchanged since last publication");
            return Ok(RunOutcome::Unchanged {
                data_type: data_type.to_string(),
                content_hash: next_hash,
            });
        }

        let current = publisher.load_current().await?;
        let diff = compare(&current, &next);
        let decision = classify(&diff, current.len(), &self.thresholds);
        info!(
            added = diff.added.len(),
            removed = diff.removed.len(),
            changed = diff.changed.len(),
            auto_publishable = decision.auto_publishable,
            "Compared with published snapshot"
        );
        for reason in &decision.approvals_needed {
            info!(reason = %reason, "Approval needed");
        }

        publisher.resolve_branch(&decision)?;
        let receipt = publisher.publish(&next, &diff, Utc::now()).await?;

        let review = match self
            .review
            .ensure_review(&receipt.target, &decision.approvals_needed)
            .await
        {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                warn!(
                    branch = %receipt.target,
                    error = %err,
                    "Review request failed; branch was pushed"
                );
                None
            }
        };

        info!(branch = %receipt.target, commit = %receipt.commit, "Run complete");

        Ok(RunOutcome::Published(RunReport {
            data_type: data_type.to_string(),
            target: receipt.target,
            commit: receipt.commit,
            content_hash: receipt.version.content_hash,
            added: diff.added.len(),
            removed: diff.removed.len(),
            changed: diff.changed.len(),
            approvals_needed: decision.approvals_needed,
            review,
        }))
    }

    /// Review branches whose request was closed, looked up only when a
    /// candidate branch exists. A failing review surface counts as none.
    async fn retired_branches(
        &self,
        store: &C::Store,
        data_type: &str,
    ) -> Result<BTreeSet<String>, RepositoryLoadError> {
        let branches = store.list_remote_branches().await?;
        let candidate = find_pending_branch(
            &branches,
            data_type,
            &self.publisher.canonical_branch,
            &BTreeSet::new(),
        );
        if candidate.is_none() {
            return Ok(BTreeSet::new());
        }

        match self.review.retired_branches(data_type).await {
            Ok(retired) => Ok(retired),
            Err(err) => {
                warn!(error = %err, "Could not list closed review requests");
                Ok(BTreeSet::new())
            }
        }
    }
}
