//! Minimal GitHub REST client for pull requests and their comments.

pub mod models;

pub use models::{CreatePullRequest, IssueComment, PullRef, PullRequest, PullState};

use reqwest::{header, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::models::{ApiErrorBody, CreateComment, RequestReviewers};

const DEFAULT_API_ROOT: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";
const PAGE_SIZE: usize = 100;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GitHub returned {status}: {message}")]
    Api { status: u16, message: String },
}

pub type Result<T> = std::result::Result<T, GitHubError>;

#[derive(Clone)]
pub struct GitHubOptions {
    pub owner: String,
    pub repo: String,
    pub token: String,

    /// Sent as the User-Agent, which GitHub requires
    pub user_agent: String,
}

impl std::fmt::Debug for GitHubOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubOptions")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("token", &"[REDACTED]")
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct GitHubService {
    options: GitHubOptions,
    api_root: String,
    client: Client,
}

impl GitHubService {
    pub fn new(options: GitHubOptions) -> Self {
        Self {
            options,
            api_root: DEFAULT_API_ROOT.to_string(),
            client: Client::new(),
        }
    }

    /// Point at a different API root, e.g. GitHub Enterprise.
    pub fn with_api_root(mut self, api_root: impl Into<String>) -> Self {
        self.api_root = api_root.into().trim_end_matches('/').to_string();
        self
    }

    pub fn options(&self) -> &GitHubOptions {
        &self.options
    }

    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_root,
            self.options.owner,
            self.options.repo,
            path.trim_start_matches('/')
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.options.token)
            .header(header::ACCEPT, "application/vnd.github+json")
            .header(header::USER_AGENT, &self.options.user_agent)
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    /// All open pull requests, following pagination.
    pub async fn list_open_pulls(&self) -> Result<Vec<PullRequest>> {
        self.list_pulls(PullState::Open).await
    }

    /// All closed pull requests, merged or not, following pagination.
    pub async fn list_closed_pulls(&self) -> Result<Vec<PullRequest>> {
        self.list_pulls(PullState::Closed).await
    }

    pub async fn list_pulls(&self, state: PullState) -> Result<Vec<PullRequest>> {
        let mut pulls = Vec::new();
        let mut page = 1;

        loop {
            let url = self.repo_url("pulls");
            let request = self.client.get(&url).query(&[
                ("state", state.as_str().to_string()),
                ("per_page", PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ]);
            let batch: Vec<PullRequest> = parse(self.authorized(request).send().await?).await?;

            let done = batch.len() < PAGE_SIZE;
            pulls.extend(batch);
            if done {
                break;
            }
            page += 1;
        }

        tracing::debug!(state = state.as_str(), count = pulls.len(), "Listed pull requests");
        Ok(pulls)
    }

    pub async fn create_pull(&self, pull: &CreatePullRequest) -> Result<PullRequest> {
        let request = self.client.post(self.repo_url("pulls")).json(pull);
        let created: PullRequest = parse(self.authorized(request).send().await?).await?;
        tracing::info!(number = created.number, head = %pull.head, "Created pull request");
        Ok(created)
    }

    pub async fn request_reviewers(&self, number: u64, reviewers: &[String]) -> Result<()> {
        let body = RequestReviewers {
            reviewers: reviewers.to_vec(),
        };
        let request = self
            .client
            .post(self.repo_url(&format!("pulls/{}/requested_reviewers", number)))
            .json(&body);
        let _: serde_json::Value = parse(self.authorized(request).send().await?).await?;
        Ok(())
    }

    pub async fn create_issue_comment(&self, number: u64, body: &str) -> Result<IssueComment> {
        let request = self
            .client
            .post(self.repo_url(&format!("issues/{}/comments", number)))
            .json(&CreateComment {
                body: body.to_string(),
            });
        parse(self.authorized(request).send().await?).await
    }
}

async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&text)
            .map(|body| body.message)
            .unwrap_or(text);
        return Err(GitHubError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response.json::<T>().await?)
}
