//! Review surface contract (pull requests or equivalent).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ReviewResult;

/// State of a review request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewState {
    Open,
    Closed,
}

/// An existing review request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub number: u64,

    /// Branch the request proposes to merge
    pub head: String,

    pub state: ReviewState,
}

/// A review request to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReviewRequest {
    pub title: String,
    pub head: String,
    pub base: String,

    /// Markdown body
    pub body: String,

    pub reviewers: Vec<String>,
}

/// Human-facing review surface.
#[async_trait]
pub trait ReviewSurface: Send + Sync {
    /// All requests that are still open.
    async fn list_open_requests(&self) -> ReviewResult<Vec<ReviewRequest>>;

    /// Requests that were closed, merged or not.
    async fn list_closed_requests(&self) -> ReviewResult<Vec<ReviewRequest>>;

    /// Open a new request and return its number.
    async fn create_review_request(&self, request: &NewReviewRequest) -> ReviewResult<u64>;

    /// Comment on an existing request.
    async fn add_comment(&self, number: u64, body: &str) -> ReviewResult<()>;
}
