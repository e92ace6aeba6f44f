//! Opens or updates the human review request for a pushed branch.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::ReviewWorkflowError;
use crate::traits::review::{NewReviewRequest, ReviewState, ReviewSurface};
use crate::types::publication::PublicationTarget;

/// Settings for review requests.
#[derive(Debug, Clone)]
pub struct ReviewConfig {
    /// Base branch review requests merge into
    pub canonical_branch: String,

    /// Fixed reviewer handles assigned to every new request
    pub reviewers: Vec<String>,
}

impl ReviewConfig {
    pub fn new(canonical_branch: impl Into<String>) -> Self {
        Self {
            canonical_branch: canonical_branch.into(),
            reviewers: Vec::new(),
        }
    }

    pub fn with_reviewers(mut self, reviewers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.reviewers = reviewers.into_iter().map(Into::into).collect();
        self
    }
}

/// What the workflow did for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReviewOutcome {
    /// Published to the canonical branch, nothing to review
    NotRequired,

    /// Opened a new request
    Created { number: u64 },

    /// Commented on the request already open for the branch
    Commented { number: u64 },

    /// A request is already open for the branch and nothing new needs approval
    AlreadyOpen { number: u64 },
}

/// Creates or updates review requests through a [`ReviewSurface`].
pub struct ReviewWorkflow<R: ReviewSurface> {
    surface: R,
    config: ReviewConfig,
}

impl<R: ReviewSurface> ReviewWorkflow<R> {
    pub fn new(surface: R, config: ReviewConfig) -> Self {
        Self { surface, config }
    }

    pub fn surface(&self) -> &R {
        &self.surface
    }

    /// Make sure a review request exists for `target`.
    ///
    /// Never opens a second request for the same branch: if one is open, the
    /// new reasons are added as a comment instead.
    pub async fn ensure_review(
        &self,
        target: &PublicationTarget,
        approvals_needed: &[String],
    ) -> Result<ReviewOutcome, ReviewWorkflowError> {
        let branch = target.branch();
        if target.is_canonical() || branch == self.config.canonical_branch {
            return Ok(ReviewOutcome::NotRequired);
        }

        let existing = self
            .surface
            .list_open_requests()
            .await?
            .into_iter()
            .find(|r| r.head == branch && r.state == ReviewState::Open);

        match existing {
            Some(request) if approvals_needed.is_empty() => {
                debug!(branch = %branch, number = request.number, "Review request already open");
                Ok(ReviewOutcome::AlreadyOpen {
                    number: request.number,
                })
            }
            Some(request) => {
                info!(branch = %branch, number = request.number, "Found open review request, commenting");
                self.surface
                    .add_comment(request.number, &comment_body(approvals_needed))
                    .await?;
                Ok(ReviewOutcome::Commented {
                    number: request.number,
                })
            }
            None => {
                info!(
                    branch = %branch,
                    approvals = approvals_needed.len(),
                    "Creating review request"
                );
                let request = NewReviewRequest {
                    title: review_title(branch),
                    head: branch.to_string(),
                    base: self.config.canonical_branch.clone(),
                    body: review_body(branch, approvals_needed, &self.config.reviewers),
                    reviewers: self.config.reviewers.clone(),
                };
                let number = self.surface.create_review_request(&request).await?;
                info!(branch = %branch, number, "Created review request");
                Ok(ReviewOutcome::Created { number })
            }
        }
    }
}

impl<R: ReviewSurface> ReviewWorkflow<R> {
    /// Branches of `data_type` whose review request was closed and that no
    /// open request still uses.
    ///
    /// A closed request means its branch was either merged (possibly as a
    /// squash, which leaves the branch unmerged in git history) or rejected.
    /// Either way new changes must not be piled onto it.
    pub async fn retired_branches(
        &self,
        data_type: &str,
    ) -> Result<BTreeSet<String>, ReviewWorkflowError> {
        let prefix = format!("{}_", data_type);

        let open: BTreeSet<String> = self
            .surface
            .list_open_requests()
            .await?
            .into_iter()
            .map(|r| r.head)
            .collect();

        Ok(self
            .surface
            .list_closed_requests()
            .await?
            .into_iter()
            .map(|r| r.head)
            .filter(|head| head.starts_with(&prefix) && !open.contains(head))
            .collect())
    }
}

pub fn review_title(branch: &str) -> String {
    format!("Unconfirmed Changes ({})", branch)
}

/// Markdown body for a new review request.
pub fn review_body(branch: &str, approvals_needed: &[String], reviewers: &[String]) -> String {
    let mut body = format!(
        "# Unconfirmed Changes ({branch})\n\n\
         Changes were found in `{branch}` that require approval and cannot be \
         merged automatically. Please review them before merging. If these \
         changes should have been merged automatically, adjust the approval \
         thresholds.\n\n\
         ## Approvals Needed\n\n{}\n",
        bullets(approvals_needed)
    );

    if !reviewers.is_empty() {
        body.push_str("\n## Reviewers\n\n");
        for reviewer in reviewers {
            body.push_str(&format!("- @{}\n", reviewer.trim_start_matches('@')));
        }
    }

    body
}

/// Markdown comment for further changes pushed to an open request.
pub fn comment_body(approvals_needed: &[String]) -> String {
    format!(
        "Additional changes were found on this branch that require approval:\n{}\n",
        bullets(approvals_needed)
    )
}

fn bullets(items: &[String]) -> String {
    if items.is_empty() {
        return "_None_".to_string();
    }
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}
