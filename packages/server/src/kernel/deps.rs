//! Server dependencies for the pipeline (using traits for testability)
//!
//! Wires the catalog-sync pipeline to its production collaborators: the git
//! data repository, the GitHub review surface and the registered sources.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use catalog_sync::{
    GitConnector, GitCredentials, GitRemoteConfig, HttpFetcher, HttpFetcherConfig,
    NewReviewRequest, OrcSource, Pipeline, PublisherConfig, ReviewConfig, ReviewRequest,
    ReviewResult, ReviewState, ReviewSurface, ReviewWorkflow, ReviewWorkflowError,
    SnapshotSource, SourceRegistry, TimetableSource,
};
use github::{CreatePullRequest, GitHubError, GitHubOptions, GitHubService, PullRequest};
use std::sync::Arc;

use crate::config::Config;

/// Pipeline as wired in production.
pub type ServerPipeline = Pipeline<GitConnector, GitHubAdapter>;

// =============================================================================
// GitHubService Adapter (implements ReviewSurface trait)
// =============================================================================

/// Wrapper around GitHubService that implements ReviewSurface
#[derive(Clone)]
pub struct GitHubAdapter(pub Arc<GitHubService>);

impl GitHubAdapter {
    pub fn new(service: Arc<GitHubService>) -> Self {
        Self(service)
    }
}

#[async_trait]
impl ReviewSurface for GitHubAdapter {
    async fn list_open_requests(&self) -> ReviewResult<Vec<ReviewRequest>> {
        let pulls = self.0.list_open_pulls().await.map_err(review_error)?;

        Ok(pulls
            .into_iter()
            .filter(|pull| pull.is_open())
            .map(|pull| review_request(pull, ReviewState::Open))
            .collect())
    }

    async fn list_closed_requests(&self) -> ReviewResult<Vec<ReviewRequest>> {
        let pulls = self.0.list_closed_pulls().await.map_err(review_error)?;

        Ok(pulls
            .into_iter()
            .filter(|pull| !pull.is_open())
            .map(|pull| review_request(pull, ReviewState::Closed))
            .collect())
    }

    async fn create_review_request(&self, request: &NewReviewRequest) -> ReviewResult<u64> {
        let pull = self
            .0
            .create_pull(&CreatePullRequest {
                title: request.title.clone(),
                head: request.head.clone(),
                base: request.base.clone(),
                body: request.body.clone(),
            })
            .await
            .map_err(review_error)?;

        if !request.reviewers.is_empty() {
            if let Err(e) = self.0.request_reviewers(pull.number, &request.reviewers).await {
                tracing::warn!(
                    number = pull.number,
                    error = %e,
                    "Failed to request reviewers"
                );
            }
        }

        Ok(pull.number)
    }

    async fn add_comment(&self, number: u64, body: &str) -> ReviewResult<()> {
        self.0
            .create_issue_comment(number, body)
            .await
            .map(|_| ())
            .map_err(review_error)
    }
}

fn review_request(pull: PullRequest, state: ReviewState) -> ReviewRequest {
    ReviewRequest {
        number: pull.number,
        head: pull.head.ref_name,
        state,
    }
}

fn review_error(err: GitHubError) -> ReviewWorkflowError {
    match err {
        GitHubError::Api { status, message } => ReviewWorkflowError::Api { status, message },
        other => ReviewWorkflowError::Transport(Box::new(other)),
    }
}

// =============================================================================
// Builders
// =============================================================================

/// Register a source for every enabled data type.
///
/// Fails on a data type this build has no source for.
pub fn build_source_registry(config: &Config) -> Result<SourceRegistry> {
    let mut registry = SourceRegistry::new();

    for data_type in &config.enabled_data_types {
        let source: Arc<dyn SnapshotSource> = match data_type.as_str() {
            "timetable" => {
                let mut source = TimetableSource::new(http_fetcher()?);
                if let Some(url) = &config.timetable_url {
                    source = source.with_url(url.clone());
                }
                Arc::new(source)
            }
            "orc" => {
                let mut source = OrcSource::new(http_fetcher()?);
                if let Some(root) = &config.orc_url {
                    source = source.with_root(root.clone());
                }
                Arc::new(source)
            }
            other => bail!("ENABLED_DATA_TYPES names unknown data type '{}'", other),
        };

        registry
            .register(data_type.clone(), source)
            .with_context(|| format!("Failed to register '{}'", data_type))?;
    }

    registry
        .validate_enabled(&config.enabled_data_types)
        .context("Enabled data types are not all registered")?;
    Ok(registry)
}

fn http_fetcher() -> Result<HttpFetcher> {
    HttpFetcher::new(HttpFetcherConfig::default()).context("Failed to create HTTP client")
}

/// Build the production pipeline from configuration.
pub fn build_pipeline(config: &Config) -> Result<ServerPipeline> {
    let sources = build_source_registry(config)?;

    let connector = GitConnector::new(
        GitRemoteConfig::new(config.data_repository_url.clone())
            .with_credentials(GitCredentials::new(
                config.gh_username.clone(),
                config.gh_token.clone(),
            ))
            .with_base_branch(config.canonical_branch.clone()),
    );

    let github = GitHubService::new(GitHubOptions {
        owner: config.repository_owner.clone(),
        repo: config.repository_name.clone(),
        token: config.gh_token.clone(),
        user_agent: format!("catalog-sync/{}", env!("CARGO_PKG_VERSION")),
    });
    let review = ReviewWorkflow::new(
        GitHubAdapter::new(Arc::new(github)),
        ReviewConfig::new(config.canonical_branch.clone())
            .with_reviewers(config.reviewers.clone()),
    );

    let publisher = PublisherConfig::new(config.canonical_branch.clone())
        .with_author(config.commit_author.clone());

    Ok(Pipeline::new(
        sources,
        connector,
        review,
        config.thresholds.clone(),
        publisher,
    ))
}
