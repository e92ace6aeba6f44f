use serde::{Deserialize, Serialize};

/// Branch reference on either side of a pull request.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PullRef {
    #[serde(rename = "ref")]
    pub ref_name: String,

    #[serde(default)]
    pub sha: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PullRequest {
    pub number: u64,
    pub state: String,
    pub title: String,
    pub head: PullRef,
    pub base: PullRef,

    #[serde(default)]
    pub html_url: Option<String>,

    /// Set once merged, including squash and rebase merges
    #[serde(default)]
    pub merged_at: Option<String>,
}

impl PullRequest {
    pub fn is_open(&self) -> bool {
        self.state == "open"
    }

    pub fn is_merged(&self) -> bool {
        self.merged_at.is_some()
    }
}

/// `state` filter for listing pull requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullState {
    Open,
    Closed,
}

impl PullState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PullState::Open => "open",
            PullState::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatePullRequest {
    pub title: String,
    pub head: String,
    pub base: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestReviewers {
    pub reviewers: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateComment {
    pub body: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct IssueComment {
    pub id: u64,

    #[serde(default)]
    pub body: String,
}

/// Error payload returned by the REST API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub message: String,
}
